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

//! Bit stream for the tight encoding mode.
//!
//! Tight encoding aggregates every boolean-valued field of a command —
//! including nullability presence bits and integer size classes — into one
//! leading bit stream, written in field declaration order and consumed in
//! the same order on decode. On the wire the stream is its byte length
//! followed by the packed bits; lengths of 64 and above use an escape
//! marker so one byte covers the common case.

use crate::wireformat::CodecError;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Escape marker for stream lengths that fit a byte but not 6 bits.
const LENGTH_BYTE_MARKER: u8 = 0xC0;
/// Escape marker for stream lengths that need a short.
const LENGTH_SHORT_MARKER: u8 = 0x80;

/// An append-then-replay bit stream.
#[derive(Debug, Default)]
pub struct BooleanStream {
    data: Vec<u8>,
    bit_count: usize,
    read_pos: usize,
}

impl BooleanStream {
    /// Creates an empty stream.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one bit.
    pub fn write_bool(&mut self, value: bool) {
        let byte = self.bit_count / 8;
        if byte == self.data.len() {
            self.data.push(0);
        }
        if value {
            self.data[byte] |= 1 << (self.bit_count % 8);
        }
        self.bit_count += 1;
    }

    /// Consumes the next bit.
    pub fn read_bool(&mut self) -> Result<bool, CodecError> {
        if self.read_pos >= self.data.len() * 8 {
            return Err(CodecError::BodyMismatch {
                reason: "boolean stream exhausted",
            });
        }
        let bit = self.data[self.read_pos / 8] & (1 << (self.read_pos % 8)) != 0;
        self.read_pos += 1;
        Ok(bit)
    }

    /// Byte length of the packed bits, excluding the length header.
    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// Appends the length header and the packed bits to `out`.
    pub fn append_to(&self, out: &mut Vec<u8>) {
        let len = self.data.len();
        if len < 64 {
            out.push(len as u8);
        } else if len < 256 {
            out.push(LENGTH_BYTE_MARKER);
            out.push(len as u8);
        } else {
            out.push(LENGTH_SHORT_MARKER);
            out.extend_from_slice(&(len as u16).to_be_bytes());
        }
        out.extend_from_slice(&self.data);
    }

    /// Reads a stream back from its wire form.
    pub async fn read_from(
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<Self, CodecError> {
        let first = reader.read_u8().await?;
        let len = match first {
            LENGTH_BYTE_MARKER => reader.read_u8().await? as usize,
            LENGTH_SHORT_MARKER => reader.read_u16().await? as usize,
            n if n < 64 => n as usize,
            other => {
                return Err(CodecError::UnknownValue {
                    what: "boolean stream length",
                    value: other,
                })
            }
        };
        let mut data = vec![0u8; len];
        reader.read_exact(&mut data).await?;
        Ok(Self {
            bit_count: len * 8,
            data,
            read_pos: 0,
        })
    }
}
