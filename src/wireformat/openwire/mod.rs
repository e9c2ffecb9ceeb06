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

//! The binary wire protocol.
//!
//! Frames are an optional 4-byte big-endian length prefix, a 1-byte type
//! tag, and the command's field schema. In loose mode every field is
//! self-framed; in tight mode all boolean-valued fields (including presence
//! bits and integer size classes) are gathered into a leading
//! [`BooleanStream`](boolean_stream::BooleanStream) and the remaining bytes
//! follow it. A negotiated string cache shrinks repeated destinations and
//! connection ids to small indices, symmetrically on both peers.
//!
//! Before negotiation the codec runs in a baseline mode — loose encoding,
//! no cache, size prefix on — so peers with different preferences can
//! always read each other's handshake. The peer's [`WireFormatInfo`]
//! switches the codec to the negotiated settings; renegotiation with
//! identical settings leaves the caches untouched.

pub mod boolean_stream;
pub mod cache;
mod marshal;

use crate::command::{
    data_type, Command, CommandBody, ConnectionId, ConnectionInfo, ConsumerId, ConsumerInfo,
    Destination, ExceptionResponse, Message, MessageAck, MessageKind, ProducerId, ProducerInfo,
    RemoveInfo, ResourceId, Response, SessionId, SessionInfo, TransactionId, TransactionInfo,
    TransactionKind,
};
use crate::command::AckKind;
use crate::wireformat::{CodecError, WireFormat, WireFormatInfo, MAGIC, MAX_COMMAND_SIZE};
use async_trait::async_trait;
use boolean_stream::BooleanStream;
use cache::MarshalCache;
use marshal::{FieldReader, FieldWriter, LooseReader, LooseWriter, TightReader, TightWriter};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Upper bound on marshalled property counts, to stop hostile frames from
/// forcing huge allocations.
const MAX_PROPERTY_COUNT: i32 = 65_536;

/// Codec for the binary protocol.
///
/// # Examples
///
/// ```rust
/// use mqwire::command::{Command, CommandBody};
/// use mqwire::wireformat::openwire::OpenWireFormat;
/// use mqwire::wireformat::{WireFormat, WireFormatInfo};
///
/// # async fn example() -> Result<(), mqwire::wireformat::CodecError> {
/// let codec = OpenWireFormat::new(WireFormatInfo::default());
/// let command = Command::oneway(CommandBody::KeepAlive);
///
/// let mut wire = Vec::new();
/// codec.marshal(&command, &mut wire).await?;
/// let decoded = codec.unmarshal(&mut wire.as_slice()).await?;
/// assert_eq!(decoded, command);
/// # Ok(())
/// # }
/// ```
pub struct OpenWireFormat {
    preferred: WireFormatInfo,
    active: Mutex<WireFormatInfo>,
    encode_cache: Mutex<MarshalCache>,
    decode_cache: Mutex<MarshalCache>,
}

impl OpenWireFormat {
    /// Creates a codec that will advertise `preferred` at the handshake.
    ///
    /// Until negotiation completes, frames use the baseline settings
    /// (loose, uncached, size-prefixed) so any peer can read them.
    pub fn new(preferred: WireFormatInfo) -> Self {
        let cache_size = preferred.cache_size;
        let baseline = WireFormatInfo {
            tight_encoding_enabled: false,
            size_prefix_disabled: false,
            cache_enabled: false,
            ..preferred.clone()
        };
        Self {
            active: Mutex::new(baseline),
            preferred,
            encode_cache: Mutex::new(MarshalCache::new(cache_size)),
            decode_cache: Mutex::new(MarshalCache::new(cache_size)),
        }
    }

    /// The settings currently applied to frames.
    pub fn active_info(&self) -> WireFormatInfo {
        self.active.lock().clone()
    }

    async fn decode_frame(
        &self,
        reader: &mut (dyn AsyncRead + Send + Unpin),
        active: &WireFormatInfo,
    ) -> Result<Command, CodecError> {
        let tag = reader.read_u8().await?;
        if active.tight_encoding_enabled {
            let bools = BooleanStream::read_from(reader).await?;
            let cache = active.cache_enabled.then_some(&self.decode_cache);
            let mut fields = TightReader::new(reader, bools, cache);
            read_command(&mut fields, tag).await
        } else {
            let cache = active.cache_enabled.then_some(&self.decode_cache);
            let mut fields = LooseReader::new(reader, cache);
            read_command(&mut fields, tag).await
        }
    }
}

#[async_trait]
impl WireFormat for OpenWireFormat {
    async fn marshal(
        &self,
        command: &Command,
        writer: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<(), CodecError> {
        let active = self.active_info();
        let mut frame = vec![command.type_tag()];

        if active.tight_encoding_enabled {
            // Pass 1 walks the schema collecting booleans and the byte body;
            // pass 2 is the assembly below: tag, bit stream, body.
            let mut bools = BooleanStream::new();
            let mut body = Vec::new();
            let cache = active.cache_enabled.then_some(&self.encode_cache);
            let mut fields = TightWriter::new(&mut bools, &mut body, cache);
            write_command(&mut fields, command)?;
            bools.append_to(&mut frame);
            frame.extend_from_slice(&body);
        } else {
            let cache = active.cache_enabled.then_some(&self.encode_cache);
            let mut fields = LooseWriter::new(&mut frame, cache);
            write_command(&mut fields, command)?;
        }

        if frame.len() as u64 > MAX_COMMAND_SIZE {
            return Err(CodecError::FrameTooLarge {
                size: frame.len() as u64,
                max: MAX_COMMAND_SIZE,
            });
        }
        if !active.size_prefix_disabled {
            writer.write_u32(frame.len() as u32).await?;
        }
        writer.write_all(&frame).await?;
        writer.flush().await?;
        Ok(())
    }

    async fn unmarshal(
        &self,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<Command, CodecError> {
        let active = self.active_info();
        if active.size_prefix_disabled {
            self.decode_frame(reader, &active).await
        } else {
            let size = reader.read_u32().await? as u64;
            if size > MAX_COMMAND_SIZE {
                return Err(CodecError::FrameTooLarge {
                    size,
                    max: MAX_COMMAND_SIZE,
                });
            }
            let mut frame = vec![0u8; size as usize];
            reader.read_exact(&mut frame).await?;
            let mut slice: &[u8] = &frame;
            self.decode_frame(&mut slice, &active).await
        }
    }

    fn handshake_command(&self) -> Option<Command> {
        Some(Command::oneway(CommandBody::WireFormatInfo(
            self.preferred.clone(),
        )))
    }

    fn negotiate(&self, command: &Command) -> Result<bool, CodecError> {
        let CommandBody::WireFormatInfo(remote) = &command.body else {
            return Ok(false);
        };
        let negotiated = self.preferred.negotiate(remote)?;
        let mut active = self.active.lock();
        if *active != negotiated {
            debug!(
                version = negotiated.version,
                tight = negotiated.tight_encoding_enabled,
                cache = negotiated.cache_enabled,
                "wire format negotiated"
            );
            self.encode_cache.lock().clear();
            self.decode_cache.lock().clear();
            *active = negotiated;
        }
        Ok(true)
    }

    fn name(&self) -> &'static str {
        "openwire"
    }
}

fn write_command<W: FieldWriter>(w: &mut W, command: &Command) -> Result<(), CodecError> {
    w.i32(command.command_id);
    w.bool(command.response_required);
    match &command.body {
        CommandBody::WireFormatInfo(info) => {
            w.raw(&MAGIC);
            w.i32(info.version);
            w.bool(info.tight_encoding_enabled);
            w.bool(info.size_prefix_disabled);
            w.bool(info.cache_enabled);
            w.i32(info.cache_size);
            w.i64(info.max_inactivity_duration);
            w.bool(info.stack_trace_enabled);
            Ok(())
        }
        CommandBody::ConnectionInfo(info) => {
            w.cached_string_opt(Some(info.connection_id.as_str()))?;
            w.string_opt(info.client_id.as_deref())?;
            w.string_opt(info.user_name.as_deref())?;
            w.string_opt(info.password.as_deref())
        }
        CommandBody::SessionInfo(info) => {
            w.cached_string_opt(Some(info.session_id.connection_id.as_str()))?;
            w.i64(info.session_id.value);
            Ok(())
        }
        CommandBody::ProducerInfo(info) => {
            write_child_id(
                w,
                &info.producer_id.connection_id,
                info.producer_id.session_id,
                info.producer_id.value,
            )?;
            write_destination_opt(w, info.destination.as_ref())
        }
        CommandBody::ConsumerInfo(info) => {
            write_child_id(
                w,
                &info.consumer_id.connection_id,
                info.consumer_id.session_id,
                info.consumer_id.value,
            )?;
            write_destination_opt(w, Some(&info.destination))?;
            w.string_opt(info.selector.as_deref())?;
            w.string_opt(info.subscription_name.as_deref())?;
            w.i32(info.prefetch_size);
            w.bool(info.no_local);
            Ok(())
        }
        CommandBody::TransactionInfo(info) => {
            w.cached_string_opt(Some(info.connection_id.as_str()))?;
            w.i64(info.transaction_id.value);
            w.u8(info.kind.as_u8());
            Ok(())
        }
        CommandBody::Message(message) => {
            w.string_opt(message.message_id.as_deref())?;
            write_destination_opt(w, message.destination.as_ref())?;
            write_destination_opt(w, message.reply_to.as_ref())?;
            w.string_opt(message.correlation_id.as_deref())?;
            w.i64(message.expiration);
            w.bool(message.persistent);
            w.u8(message.priority);
            w.bool(message.redelivered);
            w.i32(message.redelivery_count);
            w.i64(message.timestamp);
            w.string_opt(message.type_name.as_deref())?;
            w.i32(message.properties.len() as i32);
            for (name, value) in &message.properties {
                w.string(name)?;
                w.string(value)?;
            }
            let body = (!message.body.is_empty()).then_some(&message.body[..]);
            w.bytes_opt(body)
        }
        CommandBody::MessageAck(ack) => {
            write_child_id(
                w,
                &ack.consumer_id.connection_id,
                ack.consumer_id.session_id,
                ack.consumer_id.value,
            )?;
            write_destination_opt(w, ack.destination.as_ref())?;
            match &ack.transaction_id {
                Some(tx) => {
                    w.bool(true);
                    w.cached_string_opt(Some(tx.connection_id.as_str()))?;
                    w.i64(tx.value);
                }
                None => w.bool(false),
            }
            w.string_opt(ack.first_message_id.as_deref())?;
            w.string_opt(ack.last_message_id.as_deref())?;
            w.u8(ack.kind.as_u8());
            w.i32(ack.message_count);
            Ok(())
        }
        CommandBody::RemoveInfo(remove) => {
            w.u8(remove.id.kind_u8());
            match &remove.id {
                ResourceId::Connection(id) => w.cached_string_opt(Some(id.as_str())),
                ResourceId::Session(id) => {
                    w.cached_string_opt(Some(id.connection_id.as_str()))?;
                    w.i64(id.value);
                    Ok(())
                }
                ResourceId::Producer(id) => {
                    write_child_id(w, &id.connection_id, id.session_id, id.value)
                }
                ResourceId::Consumer(id) => {
                    write_child_id(w, &id.connection_id, id.session_id, id.value)
                }
            }
        }
        CommandBody::KeepAlive | CommandBody::Shutdown => Ok(()),
        CommandBody::Response(response) => {
            w.i32(response.correlation_id);
            Ok(())
        }
        CommandBody::ExceptionResponse(response) => {
            w.i32(response.correlation_id);
            w.string_opt(response.exception_class.as_deref())?;
            w.string_opt(response.message.as_deref())
        }
    }
}

async fn read_command<R: FieldReader>(r: &mut R, tag: u8) -> Result<Command, CodecError> {
    let command_id = r.i32().await?;
    let response_required = r.bool().await?;
    let body = match tag {
        data_type::WIREFORMAT_INFO => {
            let magic = r.raw(MAGIC.len()).await?;
            if magic != MAGIC {
                return Err(CodecError::BadMagic);
            }
            CommandBody::WireFormatInfo(WireFormatInfo {
                version: r.i32().await?,
                tight_encoding_enabled: r.bool().await?,
                size_prefix_disabled: r.bool().await?,
                cache_enabled: r.bool().await?,
                cache_size: r.i32().await?,
                max_inactivity_duration: r.i64().await?,
                stack_trace_enabled: r.bool().await?,
            })
        }
        data_type::CONNECTION_INFO => CommandBody::ConnectionInfo(ConnectionInfo {
            connection_id: read_connection_id(r).await?,
            client_id: r.string_opt().await?,
            user_name: r.string_opt().await?,
            password: r.string_opt().await?,
        }),
        data_type::SESSION_INFO => {
            let connection_id = read_connection_id(r).await?;
            CommandBody::SessionInfo(SessionInfo {
                session_id: SessionId {
                    connection_id,
                    value: r.i64().await?,
                },
            })
        }
        data_type::PRODUCER_INFO => {
            let (connection_id, session_id, value) = read_child_id(r).await?;
            CommandBody::ProducerInfo(ProducerInfo {
                producer_id: ProducerId {
                    connection_id,
                    session_id,
                    value,
                },
                destination: read_destination_opt(r).await?,
            })
        }
        data_type::CONSUMER_INFO => {
            let (connection_id, session_id, value) = read_child_id(r).await?;
            CommandBody::ConsumerInfo(ConsumerInfo {
                consumer_id: ConsumerId {
                    connection_id,
                    session_id,
                    value,
                },
                destination: read_destination_opt(r).await?.ok_or(
                    CodecError::BodyMismatch {
                        reason: "consumer info without destination",
                    },
                )?,
                selector: r.string_opt().await?,
                subscription_name: r.string_opt().await?,
                prefetch_size: r.i32().await?,
                no_local: r.bool().await?,
            })
        }
        data_type::TRANSACTION_INFO => {
            let connection_id = read_connection_id(r).await?;
            let value = r.i64().await?;
            let kind_value = r.u8().await?;
            let kind = TransactionKind::from_u8(kind_value).ok_or(CodecError::UnknownValue {
                what: "transaction kind",
                value: kind_value,
            })?;
            CommandBody::TransactionInfo(TransactionInfo {
                transaction_id: TransactionId {
                    connection_id: connection_id.clone(),
                    value,
                },
                connection_id,
                kind,
            })
        }
        data_type::TEXT_MESSAGE
        | data_type::BYTES_MESSAGE
        | data_type::MAP_MESSAGE
        | data_type::STREAM_MESSAGE
        | data_type::OBJECT_MESSAGE => {
            let mut message = Message {
                message_id: r.string_opt().await?,
                destination: read_destination_opt(r).await?,
                reply_to: read_destination_opt(r).await?,
                correlation_id: r.string_opt().await?,
                expiration: r.i64().await?,
                persistent: r.bool().await?,
                priority: r.u8().await?,
                redelivered: r.bool().await?,
                redelivery_count: r.i32().await?,
                timestamp: r.i64().await?,
                type_name: r.string_opt().await?,
                kind: match tag {
                    data_type::TEXT_MESSAGE => MessageKind::Text,
                    data_type::BYTES_MESSAGE => MessageKind::Bytes,
                    data_type::MAP_MESSAGE => MessageKind::Map,
                    data_type::STREAM_MESSAGE => MessageKind::Stream,
                    _ => MessageKind::Object,
                },
                properties: Vec::new(),
                body: bytes::Bytes::new(),
            };
            let count = r.i32().await?;
            if !(0..=MAX_PROPERTY_COUNT).contains(&count) {
                return Err(CodecError::BodyMismatch {
                    reason: "property count out of range",
                });
            }
            for _ in 0..count {
                let name = r.string().await?;
                let value = r.string().await?;
                message.properties.push((name, value));
            }
            if let Some(body) = r.bytes_opt().await? {
                message.body = body;
            }
            CommandBody::Message(message)
        }
        data_type::MESSAGE_ACK => {
            let (connection_id, session_id, value) = read_child_id(r).await?;
            let destination = read_destination_opt(r).await?;
            let transaction_id = if r.bool().await? {
                let tx_connection = read_connection_id(r).await?;
                Some(TransactionId {
                    connection_id: tx_connection,
                    value: r.i64().await?,
                })
            } else {
                None
            };
            let first_message_id = r.string_opt().await?;
            let last_message_id = r.string_opt().await?;
            let kind_value = r.u8().await?;
            let kind = AckKind::from_u8(kind_value).ok_or(CodecError::UnknownValue {
                what: "ack kind",
                value: kind_value,
            })?;
            CommandBody::MessageAck(MessageAck {
                consumer_id: ConsumerId {
                    connection_id,
                    session_id,
                    value,
                },
                destination,
                transaction_id,
                first_message_id,
                last_message_id,
                kind,
                message_count: r.i32().await?,
            })
        }
        data_type::REMOVE_INFO => {
            let resource_kind = r.u8().await?;
            let id = match resource_kind {
                0 => ResourceId::Connection(read_connection_id(r).await?),
                1 => {
                    let connection_id = read_connection_id(r).await?;
                    ResourceId::Session(SessionId {
                        connection_id,
                        value: r.i64().await?,
                    })
                }
                2 => {
                    let (connection_id, session_id, value) = read_child_id(r).await?;
                    ResourceId::Producer(ProducerId {
                        connection_id,
                        session_id,
                        value,
                    })
                }
                3 => {
                    let (connection_id, session_id, value) = read_child_id(r).await?;
                    ResourceId::Consumer(ConsumerId {
                        connection_id,
                        session_id,
                        value,
                    })
                }
                other => {
                    return Err(CodecError::UnknownValue {
                        what: "resource kind",
                        value: other,
                    })
                }
            };
            CommandBody::RemoveInfo(RemoveInfo { id })
        }
        data_type::KEEP_ALIVE => CommandBody::KeepAlive,
        data_type::SHUTDOWN => CommandBody::Shutdown,
        data_type::RESPONSE => CommandBody::Response(Response {
            correlation_id: r.i32().await?,
        }),
        data_type::EXCEPTION_RESPONSE => CommandBody::ExceptionResponse(ExceptionResponse {
            correlation_id: r.i32().await?,
            exception_class: r.string_opt().await?,
            message: r.string_opt().await?,
        }),
        other => return Err(CodecError::UnknownTag { tag: other }),
    };
    Ok(Command {
        command_id,
        response_required,
        body,
    })
}

fn write_child_id<W: FieldWriter>(
    w: &mut W,
    connection_id: &ConnectionId,
    session_id: i64,
    value: i64,
) -> Result<(), CodecError> {
    w.cached_string_opt(Some(connection_id.as_str()))?;
    w.i64(session_id);
    w.i64(value);
    Ok(())
}

async fn read_child_id<R: FieldReader>(
    r: &mut R,
) -> Result<(ConnectionId, i64, i64), CodecError> {
    let connection_id = read_connection_id(r).await?;
    let session_id = r.i64().await?;
    let value = r.i64().await?;
    Ok((connection_id, session_id, value))
}

async fn read_connection_id<R: FieldReader>(r: &mut R) -> Result<ConnectionId, CodecError> {
    r.cached_string_opt()
        .await?
        .map(ConnectionId)
        .ok_or(CodecError::BodyMismatch {
            reason: "missing connection id",
        })
}

fn write_destination_opt<W: FieldWriter>(
    w: &mut W,
    destination: Option<&Destination>,
) -> Result<(), CodecError> {
    let text = destination.map(|d| d.to_string());
    w.cached_string_opt(text.as_deref())
}

async fn read_destination_opt<R: FieldReader>(
    r: &mut R,
) -> Result<Option<Destination>, CodecError> {
    match r.cached_string_opt().await? {
        Some(text) => text
            .parse()
            .map(Some)
            .map_err(|_| CodecError::BodyMismatch {
                reason: "invalid destination",
            }),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn loose_info() -> WireFormatInfo {
        WireFormatInfo {
            tight_encoding_enabled: false,
            cache_enabled: false,
            ..WireFormatInfo::default()
        }
    }

    /// A codec that already agreed with an identical peer, so its active
    /// settings equal `info` rather than the pre-negotiation baseline.
    fn negotiated(info: WireFormatInfo) -> OpenWireFormat {
        let codec = OpenWireFormat::new(info.clone());
        codec
            .negotiate(&Command::oneway(CommandBody::WireFormatInfo(info)))
            .unwrap();
        codec
    }

    fn sample_message() -> Command {
        let mut message = Message::new(Destination::queue("ORDERS"));
        message.set_text("hello");
        message.message_id = Some("ID:c1:1:1:42".to_string());
        message.reply_to = Some(Destination::temp_queue("REPLIES"));
        message.correlation_id = Some("corr".to_string());
        message.expiration = 90_000;
        message.timestamp = 1_700_000_000_000;
        message.set_string_property("shop", "north").unwrap();
        let mut command = Command::oneway(CommandBody::Message(message));
        command.command_id = 12;
        command.response_required = true;
        command
    }

    async fn round_trip(codec: &OpenWireFormat, command: &Command) -> Command {
        let mut wire = Vec::new();
        codec.marshal(command, &mut wire).await.unwrap();
        codec.unmarshal(&mut wire.as_slice()).await.unwrap()
    }

    #[tokio::test]
    async fn test_loose_message_round_trip() {
        let codec = OpenWireFormat::new(loose_info());
        let command = sample_message();
        assert_eq!(round_trip(&codec, &command).await, command);
    }

    #[tokio::test]
    async fn test_tight_message_round_trip() {
        let codec = negotiated(WireFormatInfo::default());
        let command = sample_message();
        assert_eq!(round_trip(&codec, &command).await, command);
    }

    #[tokio::test]
    async fn test_tight_wireformat_info_round_trip_has_boolean_stream() {
        let codec = negotiated(WireFormatInfo {
            version: 3,
            tight_encoding_enabled: true,
            cache_enabled: false,
            ..WireFormatInfo::default()
        });
        let info = WireFormatInfo {
            version: 3,
            tight_encoding_enabled: true,
            ..WireFormatInfo::default()
        };
        let command = Command::oneway(CommandBody::WireFormatInfo(info));

        let mut wire = Vec::new();
        codec.marshal(&command, &mut wire).await.unwrap();
        // Frame: 4-byte prefix, tag, then the boolean stream length header.
        assert_eq!(wire[4], data_type::WIREFORMAT_INFO);
        assert!(wire[5] >= 1, "boolean stream must not be empty");

        let decoded = codec.unmarshal(&mut wire.as_slice()).await.unwrap();
        assert_eq!(decoded, command);
    }

    #[tokio::test]
    async fn test_cached_destination_shrinks_second_frame() {
        let codec = negotiated(WireFormatInfo::default());
        let command = sample_message();

        let mut first = Vec::new();
        codec.marshal(&command, &mut first).await.unwrap();
        let mut second = Vec::new();
        codec.marshal(&command, &mut second).await.unwrap();
        assert!(
            second.len() < first.len(),
            "second frame should reuse cache indices"
        );

        // A symmetric decoder must resolve both frames.
        let peer = negotiated(WireFormatInfo::default());
        let mut wire = first.clone();
        wire.extend_from_slice(&second);
        let mut slice = wire.as_slice();
        assert_eq!(peer.unmarshal(&mut slice).await.unwrap(), command);
        assert_eq!(peer.unmarshal(&mut slice).await.unwrap(), command);
    }

    #[tokio::test]
    async fn test_cache_miss_is_protocol_error() {
        let encoder = negotiated(WireFormatInfo::default());
        let command = sample_message();
        let mut first = Vec::new();
        encoder.marshal(&command, &mut first).await.unwrap();
        let mut second = Vec::new();
        encoder.marshal(&command, &mut second).await.unwrap();

        // A decoder that never saw the first frame has no cache entries.
        let cold = negotiated(WireFormatInfo::default());
        let err = cold.unmarshal(&mut second.as_slice()).await.unwrap_err();
        assert!(matches!(err, CodecError::CacheMiss { .. }));
    }

    #[tokio::test]
    async fn test_unknown_tag() {
        let codec = OpenWireFormat::new(loose_info());
        // Prefix of 6, tag 200, command id 0, response-required 0.
        let wire = [0, 0, 0, 6, 200, 0, 0, 0, 0, 0];
        let err = codec.unmarshal(&mut wire.as_slice()).await.unwrap_err();
        assert!(matches!(err, CodecError::UnknownTag { tag: 200 }));
    }

    #[tokio::test]
    async fn test_truncated_frame_is_io_error() {
        let codec = OpenWireFormat::new(loose_info());
        let command = sample_message();
        let mut wire = Vec::new();
        codec.marshal(&command, &mut wire).await.unwrap();
        wire.truncate(wire.len() - 3);
        let err = codec.unmarshal(&mut wire.as_slice()).await.unwrap_err();
        assert!(err.is_io());
    }

    #[tokio::test]
    async fn test_negotiation_switches_active_settings() {
        let codec = OpenWireFormat::new(WireFormatInfo::default());
        let remote = WireFormatInfo {
            version: 2,
            tight_encoding_enabled: false,
            cache_enabled: false,
            ..WireFormatInfo::default()
        };
        let consumed = codec
            .negotiate(&Command::oneway(CommandBody::WireFormatInfo(remote)))
            .unwrap();
        assert!(consumed);
        let active = codec.active_info();
        assert_eq!(active.version, 2);
        assert!(!active.tight_encoding_enabled);

        // Frames written after negotiation are loose and a loose peer
        // decodes them.
        let command = sample_message();
        let decoded = round_trip(&codec, &command).await;
        assert_eq!(decoded, command);
    }

    #[tokio::test]
    async fn test_renegotiation_with_identical_info_keeps_cache() {
        let codec = negotiated(WireFormatInfo::default());
        let command = sample_message();
        let mut first = Vec::new();
        codec.marshal(&command, &mut first).await.unwrap();

        // Same peer info again: a no-op on features and caches.
        codec
            .negotiate(&Command::oneway(CommandBody::WireFormatInfo(
                WireFormatInfo::default(),
            )))
            .unwrap();

        // Cache survived: the next frame still uses bare indices.
        let mut second = Vec::new();
        codec.marshal(&command, &mut second).await.unwrap();
        assert!(second.len() < first.len());
    }

    #[tokio::test]
    async fn test_ordinary_command_is_not_negotiation() {
        let codec = OpenWireFormat::new(WireFormatInfo::default());
        let consumed = codec
            .negotiate(&Command::oneway(CommandBody::KeepAlive))
            .unwrap();
        assert!(!consumed);
    }

    #[tokio::test]
    async fn test_size_prefix_disabled_round_trip() {
        let codec = negotiated(WireFormatInfo {
            size_prefix_disabled: true,
            tight_encoding_enabled: false,
            cache_enabled: false,
            ..WireFormatInfo::default()
        });
        let command = Command::oneway(CommandBody::Shutdown);
        let mut wire = Vec::new();
        codec.marshal(&command, &mut wire).await.unwrap();
        assert_eq!(wire[0], data_type::SHUTDOWN);
        assert_eq!(round_trip(&codec, &command).await, command);
    }

    #[tokio::test]
    async fn test_all_command_variants_round_trip_tight() {
        let connection_id = ConnectionId("c1".to_string());
        let consumer_id = ConsumerId {
            connection_id: connection_id.clone(),
            session_id: 1,
            value: 2,
        };
        let commands = vec![
            Command::oneway(CommandBody::ConnectionInfo(ConnectionInfo {
                connection_id: connection_id.clone(),
                client_id: Some("client".to_string()),
                user_name: Some("user".to_string()),
                password: None,
            })),
            Command::oneway(CommandBody::SessionInfo(SessionInfo {
                session_id: SessionId {
                    connection_id: connection_id.clone(),
                    value: 1,
                },
            })),
            Command::oneway(CommandBody::ProducerInfo(ProducerInfo {
                producer_id: ProducerId {
                    connection_id: connection_id.clone(),
                    session_id: 1,
                    value: 1,
                },
                destination: Some(Destination::queue("Q")),
            })),
            Command::oneway(CommandBody::ConsumerInfo(ConsumerInfo {
                consumer_id: consumer_id.clone(),
                destination: Destination::topic("T"),
                selector: Some("a > 1".to_string()),
                subscription_name: None,
                prefetch_size: 100,
                no_local: true,
            })),
            Command::oneway(CommandBody::TransactionInfo(TransactionInfo {
                connection_id: connection_id.clone(),
                transaction_id: TransactionId {
                    connection_id: connection_id.clone(),
                    value: 9,
                },
                kind: TransactionKind::Commit,
            })),
            Command::oneway(CommandBody::MessageAck(MessageAck {
                consumer_id,
                destination: Some(Destination::queue("Q")),
                transaction_id: Some(TransactionId {
                    connection_id: connection_id.clone(),
                    value: 9,
                }),
                first_message_id: Some("ID:1".to_string()),
                last_message_id: Some("ID:3".to_string()),
                kind: AckKind::Standard,
                message_count: 3,
            })),
            Command::oneway(CommandBody::RemoveInfo(RemoveInfo {
                id: ResourceId::Session(SessionId {
                    connection_id,
                    value: 1,
                }),
            })),
            Command::oneway(CommandBody::KeepAlive),
            Command::oneway(CommandBody::Shutdown),
            Command::oneway(CommandBody::Response(Response { correlation_id: 5 })),
            Command::oneway(CommandBody::ExceptionResponse(ExceptionResponse {
                correlation_id: 5,
                exception_class: Some("io.IOException".to_string()),
                message: Some("boom".to_string()),
            })),
        ];

        let codec = negotiated(WireFormatInfo::default());
        for command in commands {
            assert_eq!(round_trip(&codec, &command).await, command);
        }
    }

    #[tokio::test]
    async fn test_empty_body_round_trips_as_empty() {
        let codec = negotiated(WireFormatInfo::default());
        let mut message = Message::new(Destination::queue("Q"));
        message.set_body(Bytes::new());
        let command = Command::oneway(CommandBody::Message(message));
        assert_eq!(round_trip(&codec, &command).await, command);
    }
}
