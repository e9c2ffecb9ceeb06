//
// Copyright 2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! The transport chain.
//!
//! Each layer is a small capability — `start`, `oneway`, `request`,
//! `set_listener`, `close` — that owns the next layer by reference:
//!
//! - [`IoTransport`] pumps commands over a socket pair,
//! - [`WireFormatNegotiator`] gates traffic until the handshake settles,
//! - [`ResponseCorrelator`] turns correlation ids into synchronous requests,
//! - [`FailoverTransport`](failover::FailoverTransport) supervises a pool of
//!   such chains and survives broker loss.
//!
//! [`TransportFactory`] assembles chains from connect URIs.

mod correlator;
mod error;
pub mod factory;
pub mod failover;
mod io;
pub mod memory;
mod negotiator;
pub mod tcp;

pub use correlator::ResponseCorrelator;
pub use error::TransportError;
pub use factory::TransportFactory;
pub use io::IoTransport;
pub use negotiator::WireFormatNegotiator;

use crate::command::Command;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};

/// Type-erased read half of a stream pair.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
/// Type-erased write half of a stream pair.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// One layer of the transport chain.
///
/// Implementations are shared behind `Arc` and internally synchronized;
/// `close` is idempotent everywhere.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Starts background work (reader tasks, handshakes, reconnect loops).
    async fn start(&self) -> Result<(), TransportError>;

    /// Sends a command without waiting for any response.
    async fn oneway(&self, command: Command) -> Result<(), TransportError>;

    /// Sends a command and waits for its correlated response.
    ///
    /// `timeout` of `None` waits indefinitely. Layers that cannot correlate
    /// return [`TransportError::UnsupportedOperation`].
    async fn request(
        &self,
        command: Command,
        timeout: Option<Duration>,
    ) -> Result<Command, TransportError>;

    /// Registers the upward listener for inbound commands and failures.
    fn set_listener(&self, listener: Arc<dyn TransportListener>);

    /// Closes the transport. Safe to call any number of times.
    async fn close(&self) -> Result<(), TransportError>;
}

/// Receives what a transport produces: inbound commands and fatal errors.
///
/// Callbacks run on the transport's reader task; implementations must not
/// block for long and must not call back into the transport's blocking
/// operations.
pub trait TransportListener: Send + Sync {
    /// One inbound command, ownership transferred.
    fn on_command(&self, command: Command);

    /// One fatal transport failure; the transport is unusable afterwards.
    fn on_exception(&self, error: TransportError);
}
