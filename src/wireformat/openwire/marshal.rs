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

//! Field-level encoders and decoders for the binary protocol.
//!
//! A command schema is written once against the [`FieldWriter`] and
//! [`FieldReader`] traits; the tight and loose implementations differ only
//! in where booleans go (the leading bit stream versus inline bytes) and in
//! how integers and cached strings are shrunk. Field order is the contract:
//! both sides walk the schema in declaration order, with booleans consumed
//! from the tight bit stream in exactly the order they were written.

use crate::wireformat::openwire::boolean_stream::BooleanStream;
use crate::wireformat::openwire::cache::{CacheOutcome, MarshalCache};
use crate::wireformat::{CodecError, MAX_COMMAND_SIZE};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Sink for one command's fields.
pub trait FieldWriter {
    /// Writes a boolean field.
    fn bool(&mut self, value: bool);
    /// Writes a raw byte.
    fn u8(&mut self, value: u8);
    /// Writes a fixed-width big-endian i32.
    fn i32(&mut self, value: i32);
    /// Writes an i64; the tight mode shrinks small values.
    fn i64(&mut self, value: i64);
    /// Writes fixed bytes with no framing (magic markers).
    fn raw(&mut self, value: &[u8]);
    /// Writes a length-prefixed UTF-8 string.
    fn string(&mut self, value: &str) -> Result<(), CodecError>;
    /// Writes an optional string with a presence flag.
    fn string_opt(&mut self, value: Option<&str>) -> Result<(), CodecError>;
    /// Writes an optional string through the negotiated cache, when active.
    fn cached_string_opt(&mut self, value: Option<&str>) -> Result<(), CodecError>;
    /// Writes an optional byte array with a presence flag and i32 length.
    fn bytes_opt(&mut self, value: Option<&[u8]>) -> Result<(), CodecError>;
}

/// Source for one command's fields.
#[async_trait]
pub trait FieldReader: Send {
    /// Reads a boolean field.
    async fn bool(&mut self) -> Result<bool, CodecError>;
    /// Reads a raw byte.
    async fn u8(&mut self) -> Result<u8, CodecError>;
    /// Reads a fixed-width big-endian i32.
    async fn i32(&mut self) -> Result<i32, CodecError>;
    /// Reads an i64 in whatever width the writer chose.
    async fn i64(&mut self) -> Result<i64, CodecError>;
    /// Reads `len` fixed bytes.
    async fn raw(&mut self, len: usize) -> Result<Vec<u8>, CodecError>;
    /// Reads a length-prefixed UTF-8 string.
    async fn string(&mut self) -> Result<String, CodecError>;
    /// Reads an optional string.
    async fn string_opt(&mut self) -> Result<Option<String>, CodecError>;
    /// Reads an optional string through the negotiated cache, when active.
    async fn cached_string_opt(&mut self) -> Result<Option<String>, CodecError>;
    /// Reads an optional byte array.
    async fn bytes_opt(&mut self) -> Result<Option<Bytes>, CodecError>;
}

fn push_string(out: &mut Vec<u8>, value: &str) -> Result<(), CodecError> {
    let bytes = value.as_bytes();
    if bytes.len() > u16::MAX as usize {
        return Err(CodecError::FrameTooLarge {
            size: bytes.len() as u64,
            max: u16::MAX as u64,
        });
    }
    out.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
    out.extend_from_slice(bytes);
    Ok(())
}

/// Writer for the single-pass loose mode: every field is self-framed.
pub struct LooseWriter<'a> {
    out: &'a mut Vec<u8>,
    cache: Option<&'a Mutex<MarshalCache>>,
}

impl<'a> LooseWriter<'a> {
    /// Creates a loose writer over `out`.
    pub fn new(out: &'a mut Vec<u8>, cache: Option<&'a Mutex<MarshalCache>>) -> Self {
        Self { out, cache }
    }
}

impl FieldWriter for LooseWriter<'_> {
    fn bool(&mut self, value: bool) {
        self.out.push(value as u8);
    }

    fn u8(&mut self, value: u8) {
        self.out.push(value);
    }

    fn i32(&mut self, value: i32) {
        self.out.extend_from_slice(&value.to_be_bytes());
    }

    fn i64(&mut self, value: i64) {
        self.out.extend_from_slice(&value.to_be_bytes());
    }

    fn raw(&mut self, value: &[u8]) {
        self.out.extend_from_slice(value);
    }

    fn string(&mut self, value: &str) -> Result<(), CodecError> {
        push_string(self.out, value)
    }

    fn string_opt(&mut self, value: Option<&str>) -> Result<(), CodecError> {
        match value {
            Some(value) => {
                self.out.push(1);
                push_string(self.out, value)
            }
            None => {
                self.out.push(0);
                Ok(())
            }
        }
    }

    fn cached_string_opt(&mut self, value: Option<&str>) -> Result<(), CodecError> {
        let Some(cache) = self.cache else {
            return self.string_opt(value);
        };
        match value {
            None => {
                self.out.push(0);
                Ok(())
            }
            Some(value) => {
                self.out.push(1);
                match cache.lock().resolve(value) {
                    CacheOutcome::Hit(index) => {
                        self.out.push(0);
                        self.out.extend_from_slice(&index.to_be_bytes());
                        Ok(())
                    }
                    CacheOutcome::New(index) => {
                        self.out.push(1);
                        self.out.extend_from_slice(&index.to_be_bytes());
                        push_string(self.out, value)
                    }
                }
            }
        }
    }

    fn bytes_opt(&mut self, value: Option<&[u8]>) -> Result<(), CodecError> {
        match value {
            Some(value) => {
                self.out.push(1);
                self.out.extend_from_slice(&(value.len() as i32).to_be_bytes());
                self.out.extend_from_slice(value);
                Ok(())
            }
            None => {
                self.out.push(0);
                Ok(())
            }
        }
    }
}

/// Writer for the two-pass tight mode: booleans land in the bit stream,
/// everything else in the byte body that follows it.
pub struct TightWriter<'a> {
    bools: &'a mut BooleanStream,
    out: &'a mut Vec<u8>,
    cache: Option<&'a Mutex<MarshalCache>>,
}

impl<'a> TightWriter<'a> {
    /// Creates a tight writer over the bit stream and byte body.
    pub fn new(
        bools: &'a mut BooleanStream,
        out: &'a mut Vec<u8>,
        cache: Option<&'a Mutex<MarshalCache>>,
    ) -> Self {
        Self { bools, out, cache }
    }
}

impl FieldWriter for TightWriter<'_> {
    fn bool(&mut self, value: bool) {
        self.bools.write_bool(value);
    }

    fn u8(&mut self, value: u8) {
        self.out.push(value);
    }

    fn i32(&mut self, value: i32) {
        self.out.extend_from_slice(&value.to_be_bytes());
    }

    fn i64(&mut self, value: i64) {
        // Two bits of size class, then 0, 2, 4, or 8 bytes.
        if value == 0 {
            self.bools.write_bool(false);
            self.bools.write_bool(false);
        } else if i16::try_from(value).is_ok() {
            self.bools.write_bool(false);
            self.bools.write_bool(true);
            self.out.extend_from_slice(&(value as i16).to_be_bytes());
        } else if i32::try_from(value).is_ok() {
            self.bools.write_bool(true);
            self.bools.write_bool(false);
            self.out.extend_from_slice(&(value as i32).to_be_bytes());
        } else {
            self.bools.write_bool(true);
            self.bools.write_bool(true);
            self.out.extend_from_slice(&value.to_be_bytes());
        }
    }

    fn raw(&mut self, value: &[u8]) {
        self.out.extend_from_slice(value);
    }

    fn string(&mut self, value: &str) -> Result<(), CodecError> {
        push_string(self.out, value)
    }

    fn string_opt(&mut self, value: Option<&str>) -> Result<(), CodecError> {
        match value {
            Some(value) => {
                self.bools.write_bool(true);
                push_string(self.out, value)
            }
            None => {
                self.bools.write_bool(false);
                Ok(())
            }
        }
    }

    fn cached_string_opt(&mut self, value: Option<&str>) -> Result<(), CodecError> {
        let Some(cache) = self.cache else {
            return self.string_opt(value);
        };
        match value {
            None => {
                self.bools.write_bool(false);
                Ok(())
            }
            Some(value) => {
                self.bools.write_bool(true);
                match cache.lock().resolve(value) {
                    CacheOutcome::Hit(index) => {
                        self.bools.write_bool(false);
                        self.out.extend_from_slice(&index.to_be_bytes());
                        Ok(())
                    }
                    CacheOutcome::New(index) => {
                        self.bools.write_bool(true);
                        self.out.extend_from_slice(&index.to_be_bytes());
                        push_string(self.out, value)
                    }
                }
            }
        }
    }

    fn bytes_opt(&mut self, value: Option<&[u8]>) -> Result<(), CodecError> {
        match value {
            Some(value) => {
                self.bools.write_bool(true);
                self.out.extend_from_slice(&(value.len() as i32).to_be_bytes());
                self.out.extend_from_slice(value);
                Ok(())
            }
            None => {
                self.bools.write_bool(false);
                Ok(())
            }
        }
    }
}

async fn pull_string(
    src: &mut (dyn AsyncRead + Send + Unpin),
) -> Result<String, CodecError> {
    let len = src.read_u16().await? as usize;
    let mut bytes = vec![0u8; len];
    src.read_exact(&mut bytes).await?;
    String::from_utf8(bytes).map_err(|source| CodecError::InvalidUtf8 { source })
}

async fn pull_bytes(src: &mut (dyn AsyncRead + Send + Unpin)) -> Result<Bytes, CodecError> {
    let len = src.read_i32().await?;
    if len < 0 {
        return Err(CodecError::BodyMismatch {
            reason: "negative byte array length",
        });
    }
    if len as u64 > MAX_COMMAND_SIZE {
        return Err(CodecError::FrameTooLarge {
            size: len as u64,
            max: MAX_COMMAND_SIZE,
        });
    }
    let mut bytes = vec![0u8; len as usize];
    src.read_exact(&mut bytes).await?;
    Ok(Bytes::from(bytes))
}

/// Reader for the loose mode.
pub struct LooseReader<'a> {
    src: &'a mut (dyn AsyncRead + Send + Unpin),
    cache: Option<&'a Mutex<MarshalCache>>,
}

impl<'a> LooseReader<'a> {
    /// Creates a loose reader over `src`.
    pub fn new(
        src: &'a mut (dyn AsyncRead + Send + Unpin),
        cache: Option<&'a Mutex<MarshalCache>>,
    ) -> Self {
        Self { src, cache }
    }
}

#[async_trait]
impl FieldReader for LooseReader<'_> {
    async fn bool(&mut self) -> Result<bool, CodecError> {
        Ok(self.src.read_u8().await? != 0)
    }

    async fn u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.src.read_u8().await?)
    }

    async fn i32(&mut self) -> Result<i32, CodecError> {
        Ok(self.src.read_i32().await?)
    }

    async fn i64(&mut self) -> Result<i64, CodecError> {
        Ok(self.src.read_i64().await?)
    }

    async fn raw(&mut self, len: usize) -> Result<Vec<u8>, CodecError> {
        let mut bytes = vec![0u8; len];
        self.src.read_exact(&mut bytes).await?;
        Ok(bytes)
    }

    async fn string(&mut self) -> Result<String, CodecError> {
        pull_string(self.src).await
    }

    async fn string_opt(&mut self) -> Result<Option<String>, CodecError> {
        if self.src.read_u8().await? == 0 {
            return Ok(None);
        }
        pull_string(self.src).await.map(Some)
    }

    async fn cached_string_opt(&mut self) -> Result<Option<String>, CodecError> {
        let Some(cache) = self.cache else {
            return self.string_opt().await;
        };
        if self.src.read_u8().await? == 0 {
            return Ok(None);
        }
        let is_new = self.src.read_u8().await? != 0;
        let index = self.src.read_u16().await?;
        if is_new {
            let value = pull_string(self.src).await?;
            cache.lock().store(index, value.clone());
            Ok(Some(value))
        } else {
            cache
                .lock()
                .lookup(index)
                .map(|value| Some(value.to_string()))
                .ok_or(CodecError::CacheMiss { index })
        }
    }

    async fn bytes_opt(&mut self) -> Result<Option<Bytes>, CodecError> {
        if self.src.read_u8().await? == 0 {
            return Ok(None);
        }
        pull_bytes(self.src).await.map(Some)
    }
}

/// Reader for the tight mode: booleans come from the pre-read bit stream.
pub struct TightReader<'a> {
    src: &'a mut (dyn AsyncRead + Send + Unpin),
    bools: BooleanStream,
    cache: Option<&'a Mutex<MarshalCache>>,
}

impl<'a> TightReader<'a> {
    /// Creates a tight reader over `src` and the already-read bit stream.
    pub fn new(
        src: &'a mut (dyn AsyncRead + Send + Unpin),
        bools: BooleanStream,
        cache: Option<&'a Mutex<MarshalCache>>,
    ) -> Self {
        Self { src, bools, cache }
    }
}

#[async_trait]
impl FieldReader for TightReader<'_> {
    async fn bool(&mut self) -> Result<bool, CodecError> {
        self.bools.read_bool()
    }

    async fn u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.src.read_u8().await?)
    }

    async fn i32(&mut self) -> Result<i32, CodecError> {
        Ok(self.src.read_i32().await?)
    }

    async fn i64(&mut self) -> Result<i64, CodecError> {
        let high = self.bools.read_bool()?;
        let low = self.bools.read_bool()?;
        Ok(match (high, low) {
            (false, false) => 0,
            (false, true) => self.src.read_i16().await? as i64,
            (true, false) => self.src.read_i32().await? as i64,
            (true, true) => self.src.read_i64().await?,
        })
    }

    async fn raw(&mut self, len: usize) -> Result<Vec<u8>, CodecError> {
        let mut bytes = vec![0u8; len];
        self.src.read_exact(&mut bytes).await?;
        Ok(bytes)
    }

    async fn string(&mut self) -> Result<String, CodecError> {
        pull_string(self.src).await
    }

    async fn string_opt(&mut self) -> Result<Option<String>, CodecError> {
        if !self.bools.read_bool()? {
            return Ok(None);
        }
        pull_string(self.src).await.map(Some)
    }

    async fn cached_string_opt(&mut self) -> Result<Option<String>, CodecError> {
        if self.cache.is_none() {
            return self.string_opt().await;
        }
        if !self.bools.read_bool()? {
            return Ok(None);
        }
        let is_new = self.bools.read_bool()?;
        let index = self.src.read_u16().await?;
        if is_new {
            let value = pull_string(self.src).await?;
            if let Some(cache) = self.cache {
                cache.lock().store(index, value.clone());
            }
            Ok(Some(value))
        } else {
            let Some(cache) = self.cache else {
                return Err(CodecError::CacheMiss { index });
            };
            cache
                .lock()
                .lookup(index)
                .map(|value| Some(value.to_string()))
                .ok_or(CodecError::CacheMiss { index })
        }
    }

    async fn bytes_opt(&mut self) -> Result<Option<Bytes>, CodecError> {
        if !self.bools.read_bool()? {
            return Ok(None);
        }
        pull_bytes(self.src).await.map(Some)
    }
}
