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

//! The crate-level error type.
//!
//! Each layer keeps its own error enum; [`MqwireError`] wraps them for
//! callers that cross layers (the factory, application code). Every error
//! classifies into one of four kinds, which is what failure-handling policy
//! keys on: protocol errors and I/O errors are fatal for a transport,
//! semantic errors are surfaced synchronously and harmless, interruptions
//! are what waiters see on close and timeout.

use crate::command::CommandError;
use crate::transport::TransportError;
use crate::util::uri::UriError;
use crate::wireformat::CodecError;
use thiserror::Error;

/// The four failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed frames, unknown verbs or tags, version mismatch. Fatal for
    /// the transport that saw them.
    Protocol,
    /// Stream closed, truncated read, write failure, retries exhausted.
    /// Fatal for the transport; the failover supervisor reconnects.
    Io,
    /// Reserved property name, invalid destination or URI, unsupported
    /// operation. Surfaced to the caller; the transport is untouched.
    Semantic,
    /// Close, timeout, cancellation. Surfaced to waiters.
    Interruption,
}

/// Any failure this crate can produce.
#[derive(Debug, Error)]
pub enum MqwireError {
    /// Transport chain failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Wire codec failure.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Command model misuse.
    #[error(transparent)]
    Command(#[from] CommandError),

    /// Connect URI problem.
    #[error(transparent)]
    Uri(#[from] UriError),
}

impl MqwireError {
    /// Classifies this error into the four-kind taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            MqwireError::Transport(error) => match error {
                TransportError::ConnectionFailed { .. }
                | TransportError::ConnectionLost { .. }
                | TransportError::WriteFailed { .. }
                | TransportError::Closed
                | TransportError::NotStarted
                | TransportError::RetriesExhausted { .. } => ErrorKind::Io,
                TransportError::Codec { source } => codec_kind(source),
                TransportError::Timeout { .. } | TransportError::Interrupted { .. } => {
                    ErrorKind::Interruption
                }
                TransportError::UnsupportedOperation { .. }
                | TransportError::RequestIdExhausted => ErrorKind::Semantic,
            },
            MqwireError::Codec(error) => codec_kind(error),
            MqwireError::Command(_) | MqwireError::Uri(_) => ErrorKind::Semantic,
        }
    }
}

fn codec_kind(error: &CodecError) -> ErrorKind {
    if error.is_io() {
        ErrorKind::Io
    } else {
        ErrorKind::Protocol
    }
}
