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

//! The wire codec layer.
//!
//! A [`WireFormat`] turns commands into bytes and back. Two implementations
//! exist: [`StompWireFormat`](stomp::StompWireFormat) for the line-oriented
//! text protocol, and [`OpenWireFormat`](openwire::OpenWireFormat) for the
//! compact binary protocol with version negotiation and tight encoding.
//! The transport chain holds the codec behind this trait and never cares
//! which protocol is active.

mod error;
mod info;
pub mod openwire;
pub mod stomp;

pub use error::CodecError;
pub use info::{WireFormatInfo, MAGIC, MAX_WIRE_VERSION, MIN_WIRE_VERSION};

use crate::command::Command;
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

/// Maximum encoded command size accepted in either protocol (16 MB).
pub const MAX_COMMAND_SIZE: u64 = 16 * 1024 * 1024;

/// A dual-direction command codec bound to one protocol.
///
/// Implementations carry their own negotiated state (mode flags, caches)
/// behind interior mutability: the reader task and writer threads share one
/// codec per transport.
#[async_trait]
pub trait WireFormat: Send + Sync {
    /// Encodes one command onto the writer.
    async fn marshal(
        &self,
        command: &Command,
        writer: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<(), CodecError>;

    /// Decodes the next command from the reader.
    ///
    /// Blocks until a full command is available or the stream fails.
    async fn unmarshal(
        &self,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<Command, CodecError>;

    /// The command to send at connect time, if this protocol handshakes at
    /// the codec level.
    fn handshake_command(&self) -> Option<Command>;

    /// Offers an inbound command to the negotiation state machine.
    ///
    /// Returns `Ok(true)` when the command was a handshake command this codec
    /// consumed (negotiated settings now apply to subsequent frames), and
    /// `Ok(false)` when the command is ordinary traffic to pass along.
    fn negotiate(&self, command: &Command) -> Result<bool, CodecError>;

    /// Short protocol name for logs.
    fn name(&self) -> &'static str;
}
