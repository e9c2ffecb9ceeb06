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

//! Codec error types.
//!
//! Every decode or encode failure surfaces as one [`CodecError`] carrying the
//! underlying cause. I/O variants (truncation, stream closed) are
//! I/O-kind; everything else is a protocol error and fatal for the transport
//! that observed it.

use std::io;
use thiserror::Error;

/// Errors raised by the wire codecs.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Reading or writing the underlying stream failed.
    ///
    /// Truncation mid-frame arrives here as `UnexpectedEof`.
    #[error("command I/O failed: {source}")]
    Io {
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A text-protocol header line had no `name:value` shape.
    #[error("malformed header line '{line}'")]
    MalformedHeader {
        /// The offending line.
        line: String,
    },

    /// A text-protocol frame used a verb outside the closed set.
    #[error("unknown frame verb '{verb}'")]
    UnknownVerb {
        /// The offending verb.
        verb: String,
    },

    /// A binary frame used a type tag outside the closed set.
    #[error("unknown command type tag {tag}")]
    UnknownTag {
        /// The offending tag.
        tag: u8,
    },

    /// A binary field held a value outside its closed value set.
    #[error("unknown {what} value {value}")]
    UnknownValue {
        /// Which field was malformed.
        what: &'static str,
        /// The offending value.
        value: u8,
    },

    /// The wire-format handshake did not start with the magic marker.
    #[error("bad wire-format magic")]
    BadMagic,

    /// The peer required a protocol version this client cannot speak.
    #[error("unsupported wire-format version {requested} (max supported {supported})")]
    UnsupportedVersion {
        /// The version that was asked for.
        requested: i32,
        /// The highest version this codec implements.
        supported: i32,
    },

    /// A string field carried invalid UTF-8.
    #[error("invalid UTF-8 in string field")]
    InvalidUtf8 {
        /// The underlying decode error.
        #[source]
        source: std::string::FromUtf8Error,
    },

    /// Body length and terminator disagreed, or a terminator was missing.
    #[error("frame body mismatch: {reason}")]
    BodyMismatch {
        /// What was wrong.
        reason: &'static str,
    },

    /// A frame announced a size beyond the allowed maximum.
    #[error("frame size {size} exceeds maximum allowed size {max}")]
    FrameTooLarge {
        /// The announced size.
        size: u64,
        /// The configured ceiling.
        max: u64,
    },

    /// The decoder was told to use a cache index it has never seen.
    #[error("wire-format cache has no entry at index {index}")]
    CacheMiss {
        /// The missing index.
        index: u16,
    },
}

impl CodecError {
    /// True when this error is an I/O failure rather than a protocol
    /// violation. Both are fatal for the transport; the distinction only
    /// matters for error reporting.
    pub fn is_io(&self) -> bool {
        matches!(self, CodecError::Io { .. })
    }
}

impl From<io::Error> for CodecError {
    fn from(source: io::Error) -> Self {
        CodecError::Io { source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_classification() {
        let truncated = CodecError::Io {
            source: io::Error::new(io::ErrorKind::UnexpectedEof, "eof"),
        };
        assert!(truncated.is_io());
        assert!(!CodecError::BadMagic.is_io());
    }
}
