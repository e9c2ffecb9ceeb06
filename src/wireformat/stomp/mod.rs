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

//! The text wire protocol.
//!
//! [`StompWireFormat`] projects commands onto text frames and back. Reserved
//! headers carry the typed message fields; every other header becomes a user
//! property. Commands with no text-protocol representation (session and
//! producer infos — those are client-side concepts here) marshal to zero
//! bytes.
//!
//! The `CONNECT`/`CONNECTED` exchange is the protocol's handshake: the codec
//! remembers the id of the outbound `CONNECT` and surfaces the `CONNECTED`
//! answer as a correlated [`Response`], since the frame itself carries no
//! receipt id.

pub mod frame;

use crate::command::{
    AckKind, Command, CommandBody, ConnectionId, ConnectionInfo, ConsumerId, ConsumerInfo,
    Destination, ExceptionResponse, Message, MessageAck, MessageKind, RemoveInfo, ResourceId,
    Response, TransactionId, TransactionInfo, TransactionKind,
};
use crate::wireformat::{CodecError, WireFormat};
use async_trait::async_trait;
use frame::{read_frame, write_frame, write_heart_beat, Frame, Verb, CONTENT_LENGTH};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::trace;

/// Codec for the line-oriented text protocol.
#[derive(Debug, Default)]
pub struct StompWireFormat {
    /// Command id of the in-flight CONNECT, so CONNECTED can be correlated.
    pending_connect: Mutex<Option<i32>>,
}

impl StompWireFormat {
    /// Creates a text-protocol codec.
    pub fn new() -> Self {
        Self::default()
    }

    fn command_to_frame(&self, command: &Command) -> Result<Option<Frame>, CodecError> {
        let mut frame = match &command.body {
            CommandBody::ConnectionInfo(info) => {
                *self.pending_connect.lock() = Some(command.command_id);
                let mut frame = Frame::new(Verb::Connect);
                if let Some(user) = &info.user_name {
                    frame.headers.push("login", user);
                }
                if let Some(pass) = &info.password {
                    frame.headers.push("passcode", pass);
                }
                if let Some(client) = &info.client_id {
                    frame.headers.push("client-id", client);
                }
                frame
            }
            CommandBody::Message(message) => message_to_frame(message, Verb::Send)?,
            CommandBody::ConsumerInfo(info) => {
                let mut frame = Frame::new(Verb::Subscribe);
                frame
                    .headers
                    .push("destination", info.destination.to_string());
                frame.headers.push("id", info.consumer_id.to_string());
                frame.headers.push("ack", "auto");
                if let Some(selector) = &info.selector {
                    frame.headers.push("selector", selector);
                }
                if let Some(name) = &info.subscription_name {
                    frame.headers.push("subscription", name);
                }
                frame
            }
            CommandBody::RemoveInfo(remove) => match &remove.id {
                ResourceId::Consumer(id) => {
                    let mut frame = Frame::new(Verb::Unsubscribe);
                    frame.headers.push("id", id.to_string());
                    frame
                }
                ResourceId::Connection(_) => Frame::new(Verb::Disconnect),
                ResourceId::Session(_) | ResourceId::Producer(_) => return Ok(None),
            },
            CommandBody::TransactionInfo(info) => {
                let verb = match info.kind {
                    TransactionKind::Begin => Verb::Begin,
                    TransactionKind::Commit => Verb::Commit,
                    TransactionKind::Rollback => Verb::Abort,
                };
                let mut frame = Frame::new(verb);
                frame
                    .headers
                    .push("transaction", info.transaction_id.to_string());
                frame
            }
            CommandBody::MessageAck(ack) => {
                let mut frame = Frame::new(Verb::Ack);
                if let Some(id) = ack.last_message_id.as_ref().or(ack.first_message_id.as_ref()) {
                    frame.headers.push("message-id", id);
                }
                frame
                    .headers
                    .push("subscription", ack.consumer_id.to_string());
                if let Some(dest) = &ack.destination {
                    frame.headers.push("destination", dest.to_string());
                }
                if let Some(tx) = &ack.transaction_id {
                    frame.headers.push("transaction", tx.to_string());
                }
                frame
            }
            CommandBody::Shutdown => Frame::new(Verb::Disconnect),
            CommandBody::Response(response) => {
                let mut frame = Frame::new(Verb::Receipt);
                frame
                    .headers
                    .push("receipt-id", response.correlation_id.to_string());
                frame
            }
            CommandBody::ExceptionResponse(response) => {
                let mut frame = Frame::new(Verb::Error);
                if response.correlation_id != 0 {
                    frame
                        .headers
                        .push("receipt-id", response.correlation_id.to_string());
                }
                if let Some(message) = &response.message {
                    frame.headers.push("message", message);
                }
                frame
            }
            // Sessions and producers are client-side concepts in the text
            // protocol; the handshake happens via CONNECT, not a wire-format
            // command. Nothing goes on the wire.
            CommandBody::SessionInfo(_)
            | CommandBody::ProducerInfo(_)
            | CommandBody::WireFormatInfo(_) => return Ok(None),
            // Heart-beats are handled by the caller.
            CommandBody::KeepAlive => return Ok(None),
        };

        if command.response_required && command.command_id != 0 {
            frame.headers.push("receipt", command.command_id.to_string());
        }
        Ok(Some(frame))
    }

    fn frame_to_command(&self, frame: Frame) -> Result<Command, CodecError> {
        let receipt = frame.headers.get("receipt").map(str::to_string);
        let body = match frame.verb {
            Verb::Connect => CommandBody::ConnectionInfo(ConnectionInfo {
                connection_id: ConnectionId(
                    frame.headers.get("client-id").unwrap_or_default().to_string(),
                ),
                client_id: frame.headers.get("client-id").map(str::to_string),
                user_name: frame.headers.get("login").map(str::to_string),
                password: frame.headers.get("passcode").map(str::to_string),
            }),
            Verb::Connected => {
                let correlation_id = self.pending_connect.lock().take().unwrap_or(0);
                CommandBody::Response(Response { correlation_id })
            }
            Verb::Send | Verb::Message => CommandBody::Message(frame_to_message(&frame)?),
            Verb::Subscribe => {
                let destination = require_destination(&frame)?;
                CommandBody::ConsumerInfo(ConsumerInfo {
                    consumer_id: parse_consumer_id(frame.headers.get("id").unwrap_or_default()),
                    destination,
                    selector: frame.headers.get("selector").map(str::to_string),
                    subscription_name: frame.headers.get("subscription").map(str::to_string),
                    prefetch_size: 0,
                    no_local: false,
                })
            }
            Verb::Unsubscribe => CommandBody::RemoveInfo(RemoveInfo {
                id: ResourceId::Consumer(parse_consumer_id(
                    frame.headers.get("id").unwrap_or_default(),
                )),
            }),
            Verb::Begin | Verb::Commit | Verb::Abort => {
                let transaction_id =
                    parse_transaction_id(frame.headers.get("transaction").unwrap_or_default());
                let kind = match frame.verb {
                    Verb::Begin => TransactionKind::Begin,
                    Verb::Commit => TransactionKind::Commit,
                    _ => TransactionKind::Rollback,
                };
                CommandBody::TransactionInfo(TransactionInfo {
                    connection_id: transaction_id.connection_id.clone(),
                    transaction_id,
                    kind,
                })
            }
            Verb::Ack => CommandBody::MessageAck(MessageAck {
                consumer_id: parse_consumer_id(
                    frame.headers.get("subscription").unwrap_or_default(),
                ),
                destination: match frame.headers.get("destination") {
                    Some(raw) => Some(parse_destination(raw)?),
                    None => None,
                },
                transaction_id: frame
                    .headers
                    .get("transaction")
                    .map(parse_transaction_id),
                first_message_id: None,
                last_message_id: frame.headers.get("message-id").map(str::to_string),
                kind: AckKind::Standard,
                message_count: 1,
            }),
            Verb::Disconnect => CommandBody::Shutdown,
            Verb::Receipt => CommandBody::Response(Response {
                correlation_id: parse_i32(frame.headers.get("receipt-id").unwrap_or_default())?,
            }),
            Verb::Error => {
                let message = frame
                    .headers
                    .get("message")
                    .map(str::to_string)
                    .or_else(|| String::from_utf8(frame.body.to_vec()).ok());
                CommandBody::ExceptionResponse(ExceptionResponse {
                    correlation_id: frame
                        .headers
                        .get("receipt-id")
                        .map(parse_i32)
                        .transpose()?
                        .unwrap_or(0),
                    exception_class: None,
                    message,
                })
            }
        };

        let mut command = Command::oneway(body);
        if let Some(receipt) = receipt {
            command.command_id = parse_i32(&receipt)?;
            command.response_required = true;
        }
        Ok(command)
    }
}

#[async_trait]
impl WireFormat for StompWireFormat {
    async fn marshal(
        &self,
        command: &Command,
        writer: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<(), CodecError> {
        if matches!(command.body, CommandBody::KeepAlive) {
            return write_heart_beat(writer).await;
        }
        match self.command_to_frame(command)? {
            Some(frame) => write_frame(&frame, writer).await,
            None => {
                trace!(tag = command.type_tag(), "command has no text-protocol frame");
                Ok(())
            }
        }
    }

    async fn unmarshal(
        &self,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<Command, CodecError> {
        let frame = read_frame(reader).await?;
        self.frame_to_command(frame)
    }

    fn handshake_command(&self) -> Option<Command> {
        // The text protocol handshakes at the application level (CONNECT),
        // not at the codec level.
        None
    }

    fn negotiate(&self, _command: &Command) -> Result<bool, CodecError> {
        Ok(false)
    }

    fn name(&self) -> &'static str {
        "stomp"
    }
}

fn message_to_frame(message: &Message, verb: Verb) -> Result<Frame, CodecError> {
    let destination = message
        .destination
        .as_ref()
        .ok_or(CodecError::BodyMismatch {
            reason: "message has no destination",
        })?;
    let mut frame = Frame::new(verb);
    frame.headers.push("destination", destination.to_string());
    if let Some(id) = &message.message_id {
        frame.headers.push("message-id", id);
    }
    if let Some(correlation) = &message.correlation_id {
        frame.headers.push("correlation-id", correlation);
    }
    if let Some(reply_to) = &message.reply_to {
        frame.headers.push("reply-to", reply_to.to_string());
    }
    if let Some(type_name) = &message.type_name {
        frame.headers.push("type", type_name);
    }
    frame
        .headers
        .push("persistent", if message.persistent { "true" } else { "false" });
    frame.headers.push("priority", message.priority.to_string());
    if message.expiration != 0 {
        frame.headers.push("expires", message.expiration.to_string());
    }
    if message.timestamp != 0 {
        frame.headers.push("timestamp", message.timestamp.to_string());
    }
    if message.redelivered {
        frame.headers.push("redelivered", "true");
        frame
            .headers
            .push("redelivery-count", message.redelivery_count.to_string());
    }
    for (name, value) in &message.properties {
        frame.headers.push(name, value);
    }
    frame
        .headers
        .push(CONTENT_LENGTH, message.body.len().to_string());
    frame.body = message.body.clone();
    Ok(frame)
}

fn frame_to_message(frame: &Frame) -> Result<Message, CodecError> {
    let destination = require_destination(frame)?;
    let mut message = Message::new(destination);
    // Without an authoritative length the body ran to the first NUL, which
    // is the protocol's way of saying "text".
    message.kind = if frame.headers.get(CONTENT_LENGTH).is_some() {
        MessageKind::Bytes
    } else {
        MessageKind::Text
    };
    message.body = frame.body.clone();
    message.persistent = false;
    message.priority = 4;

    for (name, value) in frame.headers.iter() {
        match name {
            "destination" | CONTENT_LENGTH | "receipt" => {}
            "message-id" => message.message_id = Some(value.to_string()),
            "correlation-id" => message.correlation_id = Some(value.to_string()),
            "reply-to" => message.reply_to = Some(parse_destination(value)?),
            "type" => message.type_name = Some(value.to_string()),
            "persistent" => message.persistent = value == "true",
            "priority" => message.priority = parse_i32(value)?.clamp(0, 9) as u8,
            "expires" => message.expiration = parse_i64(value)?,
            "timestamp" => message.timestamp = parse_i64(value)?,
            "redelivered" => message.redelivered = value == "true",
            "redelivery-count" => message.redelivery_count = parse_i32(value)?,
            // Delivery routing headers that have no message field.
            "subscription" | "transaction" | "session" | "ack" => {
                trace!(header = name, "dropping routing header on inbound message");
            }
            reserved if crate::command::is_reserved_header(reserved) => {
                trace!(header = reserved, "ignoring reserved header on message");
            }
            _ => message.properties.push((name.to_string(), value.to_string())),
        }
    }
    Ok(message)
}

fn require_destination(frame: &Frame) -> Result<Destination, CodecError> {
    match frame.headers.get("destination") {
        Some(raw) => parse_destination(raw),
        None => Err(CodecError::MalformedHeader {
            line: "destination: (missing)".to_string(),
        }),
    }
}

fn parse_destination(raw: &str) -> Result<Destination, CodecError> {
    raw.parse().map_err(|_| CodecError::MalformedHeader {
        line: format!("destination:{raw}"),
    })
}

/// Parses `connection:session:value`; broker-assigned ids that do not match
/// are kept whole as the connection part.
fn parse_consumer_id(raw: &str) -> ConsumerId {
    let mut parts = raw.rsplitn(3, ':');
    let value = parts.next().and_then(|p| p.parse().ok());
    let session = parts.next().and_then(|p| p.parse().ok());
    match (parts.next(), session, value) {
        (Some(connection), Some(session_id), Some(value)) => ConsumerId {
            connection_id: ConnectionId(connection.to_string()),
            session_id,
            value,
        },
        _ => ConsumerId {
            connection_id: ConnectionId(raw.to_string()),
            session_id: 0,
            value: 0,
        },
    }
}

/// Parses the `TX:connection:value` spelling of a transaction id.
fn parse_transaction_id(raw: &str) -> TransactionId {
    let trimmed = raw.strip_prefix("TX:").unwrap_or(raw);
    match trimmed.rsplit_once(':') {
        Some((connection, value)) => match value.parse() {
            Ok(value) => TransactionId {
                connection_id: ConnectionId(connection.to_string()),
                value,
            },
            Err(_) => TransactionId {
                connection_id: ConnectionId(trimmed.to_string()),
                value: 0,
            },
        },
        None => TransactionId {
            connection_id: ConnectionId(trimmed.to_string()),
            value: 0,
        },
    }
}

fn parse_i32(raw: &str) -> Result<i32, CodecError> {
    raw.parse().map_err(|_| CodecError::MalformedHeader {
        line: raw.to_string(),
    })
}

fn parse_i64(raw: &str) -> Result<i64, CodecError> {
    raw.parse().map_err(|_| CodecError::MalformedHeader {
        line: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::SessionInfo;
    use crate::command::SessionId;
    use bytes::Bytes;

    async fn encode(codec: &StompWireFormat, command: &Command) -> Vec<u8> {
        let mut buffer = Vec::new();
        codec.marshal(command, &mut buffer).await.unwrap();
        buffer
    }

    async fn decode(codec: &StompWireFormat, raw: &[u8]) -> Command {
        codec.unmarshal(&mut &raw[..]).await.unwrap()
    }

    #[tokio::test]
    async fn test_send_frame_layout() {
        let codec = StompWireFormat::new();
        let mut message = Message::new(Destination::queue("Q"));
        message.set_text("hello");
        let command = Command::oneway(CommandBody::Message(message));

        let raw = encode(&codec, &command).await;
        let text = String::from_utf8_lossy(&raw);
        assert!(text.starts_with("SEND\n"));
        assert_eq!(text.matches("destination:/queue/Q\n").count(), 1);
        assert_eq!(text.matches("content-length:5\n").count(), 1);
        assert_eq!(raw[raw.len() - 1], 0);
        assert_eq!(&raw[raw.len() - 6..raw.len() - 1], b"hello");
    }

    #[tokio::test]
    async fn test_send_round_trip_preserves_properties() {
        let codec = StompWireFormat::new();
        let mut message = Message::new(Destination::queue("Q"));
        message.set_body(Bytes::from_static(b"payload"));
        message.correlation_id = Some("corr-1".to_string());
        message.set_string_property("shop", "north").unwrap();
        let command = Command::oneway(CommandBody::Message(message.clone()));

        let raw = encode(&codec, &command).await;
        let decoded = decode(&codec, &raw).await;
        let CommandBody::Message(out) = decoded.body else {
            panic!("expected message");
        };
        assert_eq!(out.destination, message.destination);
        assert_eq!(out.correlation_id, message.correlation_id);
        assert_eq!(out.string_property("shop"), Some("north"));
        assert_eq!(out.body, message.body);
    }

    #[tokio::test]
    async fn test_receipt_header_round_trips_command_id() {
        let codec = StompWireFormat::new();
        let mut command = Command::oneway(CommandBody::TransactionInfo(TransactionInfo {
            connection_id: ConnectionId("c1".to_string()),
            transaction_id: TransactionId {
                connection_id: ConnectionId("c1".to_string()),
                value: 4,
            },
            kind: TransactionKind::Begin,
        }));
        command.command_id = 17;
        command.response_required = true;

        let raw = encode(&codec, &command).await;
        let decoded = decode(&codec, &raw).await;
        assert_eq!(decoded.command_id, 17);
        assert!(decoded.response_required);
        assert!(matches!(
            decoded.body,
            CommandBody::TransactionInfo(TransactionInfo {
                kind: TransactionKind::Begin,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_connected_is_correlated_to_connect() {
        let codec = StompWireFormat::new();
        let mut connect = Command::oneway(CommandBody::ConnectionInfo(ConnectionInfo {
            connection_id: ConnectionId("c1".to_string()),
            client_id: Some("c1".to_string()),
            user_name: Some("user".to_string()),
            password: Some("pass".to_string()),
        }));
        connect.command_id = 1;
        connect.response_required = true;
        let _ = encode(&codec, &connect).await;

        let decoded = decode(&codec, b"CONNECTED\nsession:abc\n\n\0").await;
        assert_eq!(
            decoded.body,
            CommandBody::Response(Response { correlation_id: 1 })
        );
    }

    #[tokio::test]
    async fn test_session_info_marshals_to_nothing() {
        let codec = StompWireFormat::new();
        let command = Command::oneway(CommandBody::SessionInfo(SessionInfo {
            session_id: SessionId {
                connection_id: ConnectionId("c1".to_string()),
                value: 1,
            },
        }));
        assert!(encode(&codec, &command).await.is_empty());
    }

    #[tokio::test]
    async fn test_keep_alive_is_heart_beat() {
        let codec = StompWireFormat::new();
        let raw = encode(&codec, &Command::oneway(CommandBody::KeepAlive)).await;
        assert_eq!(raw, b"\n");
    }

    #[tokio::test]
    async fn test_error_frame_becomes_exception_response() {
        let codec = StompWireFormat::new();
        let decoded =
            decode(&codec, b"ERROR\nreceipt-id:9\nmessage:no such queue\n\n\0").await;
        let CommandBody::ExceptionResponse(response) = decoded.body else {
            panic!("expected exception response");
        };
        assert_eq!(response.correlation_id, 9);
        assert_eq!(response.message.as_deref(), Some("no such queue"));
    }

    #[tokio::test]
    async fn test_subscribe_round_trip() {
        let codec = StompWireFormat::new();
        let info = ConsumerInfo {
            consumer_id: ConsumerId {
                connection_id: ConnectionId("c1".to_string()),
                session_id: 2,
                value: 5,
            },
            destination: Destination::topic("PRICES"),
            selector: Some("region = 'eu'".to_string()),
            subscription_name: None,
            prefetch_size: 0,
            no_local: false,
        };
        let command = Command::oneway(CommandBody::ConsumerInfo(info.clone()));
        let raw = encode(&codec, &command).await;
        let decoded = decode(&codec, &raw).await;
        let CommandBody::ConsumerInfo(out) = decoded.body else {
            panic!("expected consumer info");
        };
        assert_eq!(out.consumer_id, info.consumer_id);
        assert_eq!(out.destination, info.destination);
        assert_eq!(out.selector, info.selector);
    }
}
