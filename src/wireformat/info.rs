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

//! The wire-format handshake command.
//!
//! At connect time each peer sends a [`WireFormatInfo`] advertising its
//! preferred protocol version and capability flags. The codec then settles on
//! the minimum common version and the AND of the boolean features, so a
//! capability is only active when both sides asked for it.

use crate::wireformat::CodecError;

/// Magic marker identifying a wire-format handshake at connection start.
pub const MAGIC: [u8; 8] = *b"ActiveMQ";

/// Highest binary protocol version this codec implements.
pub const MAX_WIRE_VERSION: i32 = 3;

/// Lowest binary protocol version this codec still speaks.
pub const MIN_WIRE_VERSION: i32 = 1;

/// Handshake command carrying version and capability flags.
///
/// # Examples
///
/// ```rust
/// use mqwire::wireformat::WireFormatInfo;
///
/// let ours = WireFormatInfo::default();
/// let mut theirs = WireFormatInfo::default();
/// theirs.version = 2;
/// theirs.tight_encoding_enabled = false;
///
/// let agreed = ours.negotiate(&theirs).unwrap();
/// assert_eq!(agreed.version, 2);
/// assert!(!agreed.tight_encoding_enabled);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct WireFormatInfo {
    /// Preferred protocol version.
    pub version: i32,
    /// Bit-packed tight encoding mode.
    pub tight_encoding_enabled: bool,
    /// When true, frames are written without the 4-byte length prefix.
    pub size_prefix_disabled: bool,
    /// Symmetric string cache.
    pub cache_enabled: bool,
    /// Maximum number of cache entries.
    pub cache_size: i32,
    /// Maximum quiet period in milliseconds before keep-alives are expected.
    pub max_inactivity_duration: i64,
    /// Whether error responses should carry broker stack traces.
    pub stack_trace_enabled: bool,
}

impl Default for WireFormatInfo {
    fn default() -> Self {
        Self {
            version: MAX_WIRE_VERSION,
            tight_encoding_enabled: true,
            size_prefix_disabled: false,
            cache_enabled: true,
            cache_size: 1024,
            max_inactivity_duration: 30_000,
            stack_trace_enabled: true,
        }
    }
}

impl WireFormatInfo {
    /// Computes the settings both peers can live with.
    ///
    /// Version is the minimum of the two preferences; boolean capabilities
    /// are AND-merged; cache size and inactivity duration take the smaller
    /// value. Negotiating down always succeeds. A peer that can only speak a
    /// version below [`MIN_WIRE_VERSION`] is rejected with a protocol error,
    /// as is a local preference above [`MAX_WIRE_VERSION`].
    pub fn negotiate(&self, remote: &WireFormatInfo) -> Result<WireFormatInfo, CodecError> {
        if self.version > MAX_WIRE_VERSION {
            return Err(CodecError::UnsupportedVersion {
                requested: self.version,
                supported: MAX_WIRE_VERSION,
            });
        }
        let version = self.version.min(remote.version);
        if version < MIN_WIRE_VERSION {
            return Err(CodecError::UnsupportedVersion {
                requested: version,
                supported: MAX_WIRE_VERSION,
            });
        }
        Ok(WireFormatInfo {
            version,
            tight_encoding_enabled: self.tight_encoding_enabled && remote.tight_encoding_enabled,
            size_prefix_disabled: self.size_prefix_disabled && remote.size_prefix_disabled,
            cache_enabled: self.cache_enabled && remote.cache_enabled,
            cache_size: self.cache_size.min(remote.cache_size),
            max_inactivity_duration: self
                .max_inactivity_duration
                .min(remote.max_inactivity_duration),
            stack_trace_enabled: self.stack_trace_enabled && remote.stack_trace_enabled,
        })
    }
}
