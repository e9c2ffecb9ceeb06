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

//! Transport layer error types.
//!
//! Transport errors are the I/O and interruption half of the error taxonomy:
//! connection failures, stream breakage, timeouts, and cancellation. Codec
//! failures travel through [`TransportError::Codec`] so a transport can
//! report exactly one error per failure with the underlying cause attached.

use crate::wireformat::CodecError;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by the transport chain.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Failed to establish a connection to the remote broker.
    #[error("failed to connect to {address}: {source}")]
    ConnectionFailed {
        /// The address that failed to connect.
        address: String,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// An established connection became unusable.
    #[error("connection lost: {reason}")]
    ConnectionLost {
        /// Why the connection was lost.
        reason: String,
        /// The underlying I/O error, when one was observed.
        #[source]
        source: Option<io::Error>,
    },

    /// Writing a command to the stream failed.
    #[error("write failed: {source}")]
    WriteFailed {
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The codec rejected a frame, inbound or outbound.
    #[error("codec failure: {source}")]
    Codec {
        /// The codec error, protocol or I/O kind.
        #[source]
        source: CodecError,
    },

    /// The transport has been closed; close is terminal.
    #[error("transport is closed")]
    Closed,

    /// The transport was used before `start`.
    #[error("transport is not started")]
    NotStarted,

    /// This layer does not implement the requested operation.
    #[error("unsupported operation: {operation}")]
    UnsupportedOperation {
        /// The operation that is not available.
        operation: &'static str,
    },

    /// An operation exceeded its time budget.
    #[error("operation timed out after {duration:?}")]
    Timeout {
        /// The exceeded budget.
        duration: Duration,
    },

    /// A waiter was cancelled by close or connection reset.
    #[error("interrupted: {reason}")]
    Interrupted {
        /// What interrupted the wait.
        reason: &'static str,
    },

    /// The 32-bit request id space was exhausted.
    ///
    /// Ids are never reused, so after 2^31-1 requests on one transport the
    /// generator refuses further requests rather than wrapping.
    #[error("request id space exhausted")]
    RequestIdExhausted,

    /// The failover supervisor gave up after its configured attempts.
    #[error("reconnection abandoned after {attempts} attempts")]
    RetriesExhausted {
        /// How many attempts were made.
        attempts: u32,
    },
}

impl TransportError {
    /// True when the failover supervisor may retry past this error.
    ///
    /// Connection failures and losses trigger reconnects; protocol
    /// violations, semantic misuse, and terminal states do not.
    pub fn is_recoverable(&self) -> bool {
        match self {
            TransportError::ConnectionFailed { .. }
            | TransportError::ConnectionLost { .. }
            | TransportError::WriteFailed { .. }
            | TransportError::Timeout { .. } => true,
            TransportError::Codec { source } => source.is_io(),
            TransportError::Closed
            | TransportError::NotStarted
            | TransportError::UnsupportedOperation { .. }
            | TransportError::Interrupted { .. }
            | TransportError::RequestIdExhausted
            | TransportError::RetriesExhausted { .. } => false,
        }
    }
}

impl From<CodecError> for TransportError {
    fn from(source: CodecError) -> Self {
        TransportError::Codec { source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_failures_are_recoverable() {
        let error = TransportError::ConnectionFailed {
            address: "broker:61616".to_string(),
            source: io::Error::new(io::ErrorKind::ConnectionRefused, "refused"),
        };
        assert!(error.is_recoverable());
    }

    #[test]
    fn test_protocol_violations_are_not_recoverable() {
        let error = TransportError::Codec {
            source: CodecError::BadMagic,
        };
        assert!(!error.is_recoverable());
    }

    #[test]
    fn test_codec_truncation_is_recoverable() {
        let error = TransportError::Codec {
            source: CodecError::Io {
                source: io::Error::new(io::ErrorKind::UnexpectedEof, "eof"),
            },
        };
        assert!(error.is_recoverable());
    }

    #[test]
    fn test_terminal_states_are_not_recoverable() {
        assert!(!TransportError::Closed.is_recoverable());
        assert!(!TransportError::RetriesExhausted { attempts: 5 }.is_recoverable());
    }
}
