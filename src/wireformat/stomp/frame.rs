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

//! Text-protocol frame grammar.
//!
//! A frame is a verb line, `name:value` header lines, a blank line, the
//! body, and a single NUL terminator:
//!
//! ```text
//! SEND\n
//! destination:/queue/ORDERS\n
//! content-length:5\n
//! \n
//! hello\0
//! ```
//!
//! When a `content-length` header is present it is authoritative: exactly
//! that many body bytes are read and the NUL after them is still mandatory.
//! Without it the body runs to the first NUL. Blank lines between frames are
//! heart-beats and are skipped on decode.

use crate::wireformat::{CodecError, MAX_COMMAND_SIZE};
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Header carrying the authoritative body length.
pub const CONTENT_LENGTH: &str = "content-length";

/// The closed set of frame verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Verb {
    Connect,
    Connected,
    Send,
    Subscribe,
    Unsubscribe,
    Message,
    Begin,
    Commit,
    Abort,
    Ack,
    Disconnect,
    Error,
    Receipt,
}

impl Verb {
    /// The wire spelling of this verb.
    pub fn as_str(self) -> &'static str {
        match self {
            Verb::Connect => "CONNECT",
            Verb::Connected => "CONNECTED",
            Verb::Send => "SEND",
            Verb::Subscribe => "SUBSCRIBE",
            Verb::Unsubscribe => "UNSUBSCRIBE",
            Verb::Message => "MESSAGE",
            Verb::Begin => "BEGIN",
            Verb::Commit => "COMMIT",
            Verb::Abort => "ABORT",
            Verb::Ack => "ACK",
            Verb::Disconnect => "DISCONNECT",
            Verb::Error => "ERROR",
            Verb::Receipt => "RECEIPT",
        }
    }

    /// Parses a verb line; unknown verbs are a protocol error.
    pub fn parse(line: &str) -> Result<Self, CodecError> {
        match line {
            "CONNECT" => Ok(Verb::Connect),
            "CONNECTED" => Ok(Verb::Connected),
            "SEND" => Ok(Verb::Send),
            "SUBSCRIBE" => Ok(Verb::Subscribe),
            "UNSUBSCRIBE" => Ok(Verb::Unsubscribe),
            "MESSAGE" => Ok(Verb::Message),
            "BEGIN" => Ok(Verb::Begin),
            "COMMIT" => Ok(Verb::Commit),
            "ABORT" => Ok(Verb::Abort),
            "ACK" => Ok(Verb::Ack),
            "DISCONNECT" => Ok(Verb::Disconnect),
            "ERROR" => Ok(Verb::Error),
            "RECEIPT" => Ok(Verb::Receipt),
            other => Err(CodecError::UnknownVerb {
                verb: other.to_string(),
            }),
        }
    }
}

/// Insertion-ordered header collection with first-wins lookup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    /// Creates an empty header collection.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Appends a header, keeping insertion order.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    /// First value for `name`, if present.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Number of occurrences of `name`.
    pub fn count(&self, name: &str) -> usize {
        self.0.iter().filter(|(n, _)| n == name).count()
    }

    /// Iterates headers in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Whether the collection is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One text-protocol frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// The frame verb.
    pub verb: Verb,
    /// Ordered headers.
    pub headers: Headers,
    /// Opaque body, excluding the NUL terminator.
    pub body: Bytes,
}

impl Frame {
    /// Creates a body-less frame.
    pub fn new(verb: Verb) -> Self {
        Self {
            verb,
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }
}

/// Writes one frame, terminated by a single NUL.
pub async fn write_frame(
    frame: &Frame,
    writer: &mut (dyn AsyncWrite + Send + Unpin),
) -> Result<(), CodecError> {
    let mut out = Vec::with_capacity(64 + frame.body.len());
    out.extend_from_slice(frame.verb.as_str().as_bytes());
    out.push(b'\n');
    for (name, value) in frame.headers.iter() {
        out.extend_from_slice(name.as_bytes());
        out.push(b':');
        out.extend_from_slice(value.as_bytes());
        out.push(b'\n');
    }
    out.push(b'\n');
    out.extend_from_slice(&frame.body);
    out.push(0);
    writer.write_all(&out).await?;
    writer.flush().await?;
    Ok(())
}

/// Writes a heart-beat: a single newline, no frame.
pub async fn write_heart_beat(
    writer: &mut (dyn AsyncWrite + Send + Unpin),
) -> Result<(), CodecError> {
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

/// Reads the next frame, skipping heart-beat blank lines before the verb.
pub async fn read_frame(
    reader: &mut (dyn AsyncRead + Send + Unpin),
) -> Result<Frame, CodecError> {
    // Skip leading blank lines left over from prior frames or heart-beats.
    let verb_line = loop {
        let line = read_line(reader).await?;
        if !line.is_empty() {
            break line;
        }
    };
    let verb = Verb::parse(&verb_line)?;

    let mut headers = Headers::new();
    loop {
        let line = read_line(reader).await?;
        if line.is_empty() {
            break;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| CodecError::MalformedHeader { line: line.clone() })?;
        headers.push(name, value);
    }

    let body = match headers.get(CONTENT_LENGTH) {
        Some(len) => {
            let len: u64 = len
                .parse()
                .map_err(|_| CodecError::MalformedHeader {
                    line: format!("{CONTENT_LENGTH}:{len}"),
                })?;
            if len > MAX_COMMAND_SIZE {
                return Err(CodecError::FrameTooLarge {
                    size: len,
                    max: MAX_COMMAND_SIZE,
                });
            }
            let mut body = vec![0u8; len as usize];
            reader.read_exact(&mut body).await?;
            if reader.read_u8().await? != 0 {
                return Err(CodecError::BodyMismatch {
                    reason: "counted body not followed by NUL terminator",
                });
            }
            Bytes::from(body)
        }
        None => {
            let mut body = Vec::new();
            loop {
                let byte = reader.read_u8().await?;
                if byte == 0 {
                    break;
                }
                if body.len() as u64 >= MAX_COMMAND_SIZE {
                    return Err(CodecError::FrameTooLarge {
                        size: body.len() as u64,
                        max: MAX_COMMAND_SIZE,
                    });
                }
                body.push(byte);
            }
            Bytes::from(body)
        }
    };

    Ok(Frame { verb, headers, body })
}

/// Reads one `\n`-terminated line, tolerating `\r\n` endings.
async fn read_line(reader: &mut (dyn AsyncRead + Send + Unpin)) -> Result<String, CodecError> {
    let mut line = Vec::new();
    loop {
        let byte = reader.read_u8().await?;
        if byte == b'\n' {
            break;
        }
        if line.len() as u64 >= MAX_COMMAND_SIZE {
            return Err(CodecError::FrameTooLarge {
                size: line.len() as u64,
                max: MAX_COMMAND_SIZE,
            });
        }
        line.push(byte);
    }
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    String::from_utf8(line).map_err(|source| CodecError::InvalidUtf8 { source })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn round_trip(frame: &Frame) -> Frame {
        let mut buffer = Vec::new();
        write_frame(frame, &mut buffer).await.unwrap();
        read_frame(&mut buffer.as_slice()).await.unwrap()
    }

    #[tokio::test]
    async fn test_frame_round_trip() {
        let mut frame = Frame::new(Verb::Send);
        frame.headers.push("destination", "/queue/Q");
        frame.headers.push(CONTENT_LENGTH, "5");
        frame.body = Bytes::from_static(b"hello");

        assert_eq!(round_trip(&frame).await, frame);
    }

    #[tokio::test]
    async fn test_body_without_content_length_runs_to_nul() {
        let raw = b"MESSAGE\ndestination:/queue/Q\n\nhej\0";
        let frame = read_frame(&mut raw.as_slice()).await.unwrap();
        assert_eq!(&frame.body[..], b"hej");
    }

    #[tokio::test]
    async fn test_leading_heart_beats_are_skipped() {
        let raw = b"\n\nACK\nmessage-id:1\nsubscription:c:1:1\n\n\0";
        let frame = read_frame(&mut raw.as_slice()).await.unwrap();
        assert_eq!(frame.verb, Verb::Ack);
    }

    #[tokio::test]
    async fn test_unknown_verb_is_protocol_error() {
        let raw = b"NACK\n\n\0";
        let err = read_frame(&mut raw.as_slice()).await.unwrap_err();
        assert!(matches!(err, CodecError::UnknownVerb { .. }));
    }

    #[tokio::test]
    async fn test_missing_nul_after_counted_body() {
        let raw = b"SEND\ncontent-length:2\n\nabX";
        let err = read_frame(&mut raw.as_slice()).await.unwrap_err();
        assert!(matches!(err, CodecError::BodyMismatch { .. }));
    }

    #[tokio::test]
    async fn test_truncated_frame_is_io_error() {
        let raw = b"SEND\ndestina";
        let err = read_frame(&mut raw.as_slice()).await.unwrap_err();
        assert!(err.is_io());
    }

    #[tokio::test]
    async fn test_malformed_header_line() {
        let raw = b"SEND\nno-colon-here\n\n\0";
        let err = read_frame(&mut raw.as_slice()).await.unwrap_err();
        assert!(matches!(err, CodecError::MalformedHeader { .. }));
    }

    #[tokio::test]
    async fn test_counted_body_may_contain_nul() {
        let raw = b"SEND\ncontent-length:3\n\na\0b\0";
        let frame = read_frame(&mut raw.as_slice()).await.unwrap();
        assert_eq!(&frame.body[..], b"a\0b");
    }
}
