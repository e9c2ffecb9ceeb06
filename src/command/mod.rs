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

//! The closed command set.
//!
//! A [`Command`] is the atomic protocol unit exchanged with the broker. Every
//! command has a stable integer type tag, an optional correlation id
//! (`command_id`, 0 = unassigned), a response-required flag, and a
//! type-specific payload in [`CommandBody`]. The set is closed: both wire
//! codecs map exactly these variants and nothing else.

mod destination;
mod error;
mod ids;
mod message;

pub use destination::{Destination, DestinationKind};
pub use error::CommandError;
pub use ids::{ConnectionId, ConsumerId, ProducerId, SessionId, TransactionId};
pub use message::{is_reserved_header, Message, MessageKind, RESERVED_HEADERS};

/// Stable wire type tags, one per command variant.
///
/// The values are part of the binary protocol and never change.
pub mod data_type {
    /// Wire-format negotiation command.
    pub const WIREFORMAT_INFO: u8 = 1;
    /// Connection creation info.
    pub const CONNECTION_INFO: u8 = 3;
    /// Session creation info.
    pub const SESSION_INFO: u8 = 4;
    /// Consumer creation info.
    pub const CONSUMER_INFO: u8 = 5;
    /// Producer creation info.
    pub const PRODUCER_INFO: u8 = 6;
    /// Transaction control.
    pub const TRANSACTION_INFO: u8 = 7;
    /// Keep-alive ping.
    pub const KEEP_ALIVE: u8 = 10;
    /// Orderly shutdown notice.
    pub const SHUTDOWN: u8 = 11;
    /// Resource removal.
    pub const REMOVE_INFO: u8 = 12;
    /// Message acknowledgement.
    pub const MESSAGE_ACK: u8 = 22;
    /// Bytes message.
    pub const BYTES_MESSAGE: u8 = 24;
    /// Map message.
    pub const MAP_MESSAGE: u8 = 25;
    /// Object message.
    pub const OBJECT_MESSAGE: u8 = 26;
    /// Stream message.
    pub const STREAM_MESSAGE: u8 = 27;
    /// Text message.
    pub const TEXT_MESSAGE: u8 = 28;
    /// Generic response carrying a correlation id.
    pub const RESPONSE: u8 = 30;
    /// Error response carrying a correlation id and a cause.
    pub const EXCEPTION_RESPONSE: u8 = 31;
}

/// Connection creation info, replayed first after a reconnect.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionInfo {
    /// The connection being created.
    pub connection_id: ConnectionId,
    /// Optional durable client identity.
    pub client_id: Option<String>,
    /// Credentials passed through to the broker.
    pub user_name: Option<String>,
    /// Credentials passed through to the broker.
    pub password: Option<String>,
}

/// Session creation info.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionInfo {
    /// The session being created.
    pub session_id: SessionId,
}

/// Producer creation info.
#[derive(Debug, Clone, PartialEq)]
pub struct ProducerInfo {
    /// The producer being created.
    pub producer_id: ProducerId,
    /// Fixed destination, absent for anonymous producers.
    pub destination: Option<Destination>,
}

/// Consumer creation info.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsumerInfo {
    /// The consumer being created.
    pub consumer_id: ConsumerId,
    /// What the consumer subscribes to.
    pub destination: Destination,
    /// Optional message selector expression.
    pub selector: Option<String>,
    /// Durable subscription name, when durable.
    pub subscription_name: Option<String>,
    /// Broker-side prefetch window.
    pub prefetch_size: i32,
    /// Suppress deliveries published on the same connection.
    pub no_local: bool,
}

/// Transaction control verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionKind {
    /// Open a local transaction.
    Begin,
    /// Commit it.
    Commit,
    /// Roll it back.
    Rollback,
}

impl TransactionKind {
    /// Stable wire value for this verb.
    pub fn as_u8(self) -> u8 {
        match self {
            TransactionKind::Begin => 0,
            TransactionKind::Commit => 1,
            TransactionKind::Rollback => 2,
        }
    }

    /// Parses the wire value back into a verb.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(TransactionKind::Begin),
            1 => Some(TransactionKind::Commit),
            2 => Some(TransactionKind::Rollback),
            _ => None,
        }
    }
}

/// Transaction control command.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionInfo {
    /// The owning connection.
    pub connection_id: ConnectionId,
    /// The transaction being controlled.
    pub transaction_id: TransactionId,
    /// Begin, commit, or rollback.
    pub kind: TransactionKind,
}

/// Acknowledgement modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckKind {
    /// Delivery receipt only; the broker keeps the message.
    Delivered,
    /// The message is poisoned and should not be redelivered.
    Poison,
    /// Standard consume acknowledgement.
    Standard,
}

impl AckKind {
    /// Stable wire value for this mode.
    pub fn as_u8(self) -> u8 {
        match self {
            AckKind::Delivered => 0,
            AckKind::Poison => 1,
            AckKind::Standard => 2,
        }
    }

    /// Parses the wire value back into a mode.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(AckKind::Delivered),
            1 => Some(AckKind::Poison),
            2 => Some(AckKind::Standard),
            _ => None,
        }
    }
}

/// Message acknowledgement.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageAck {
    /// The consumer acknowledging.
    pub consumer_id: ConsumerId,
    /// Destination the deliveries came from.
    pub destination: Option<Destination>,
    /// Transaction the ack belongs to, when transacted.
    pub transaction_id: Option<TransactionId>,
    /// First message id of the acked range.
    pub first_message_id: Option<String>,
    /// Last message id of the acked range.
    pub last_message_id: Option<String>,
    /// Acknowledgement mode.
    pub kind: AckKind,
    /// Number of deliveries covered.
    pub message_count: i32,
}

/// The resource a [`RemoveInfo`] tears down.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceId {
    /// A whole connection.
    Connection(ConnectionId),
    /// A session.
    Session(SessionId),
    /// A producer.
    Producer(ProducerId),
    /// A consumer.
    Consumer(ConsumerId),
}

impl ResourceId {
    /// Stable wire value for the resource kind.
    pub fn kind_u8(&self) -> u8 {
        match self {
            ResourceId::Connection(_) => 0,
            ResourceId::Session(_) => 1,
            ResourceId::Producer(_) => 2,
            ResourceId::Consumer(_) => 3,
        }
    }
}

/// Resource removal command.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoveInfo {
    /// The resource to remove.
    pub id: ResourceId,
}

/// Generic response to a command that required one.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// The `command_id` of the request this answers.
    pub correlation_id: i32,
}

/// Error response to a command that required a response.
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptionResponse {
    /// The `command_id` of the request this answers, 0 for async errors.
    pub correlation_id: i32,
    /// Broker-side exception class name, when known.
    pub exception_class: Option<String>,
    /// Human-readable cause.
    pub message: Option<String>,
}

/// The type-specific payload of a [`Command`].
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum CommandBody {
    WireFormatInfo(crate::wireformat::WireFormatInfo),
    ConnectionInfo(ConnectionInfo),
    SessionInfo(SessionInfo),
    ProducerInfo(ProducerInfo),
    ConsumerInfo(ConsumerInfo),
    TransactionInfo(TransactionInfo),
    Message(Message),
    MessageAck(MessageAck),
    RemoveInfo(RemoveInfo),
    KeepAlive,
    Shutdown,
    Response(Response),
    ExceptionResponse(ExceptionResponse),
}

impl CommandBody {
    /// The stable wire type tag for this body.
    pub fn type_tag(&self) -> u8 {
        match self {
            CommandBody::WireFormatInfo(_) => data_type::WIREFORMAT_INFO,
            CommandBody::ConnectionInfo(_) => data_type::CONNECTION_INFO,
            CommandBody::SessionInfo(_) => data_type::SESSION_INFO,
            CommandBody::ConsumerInfo(_) => data_type::CONSUMER_INFO,
            CommandBody::ProducerInfo(_) => data_type::PRODUCER_INFO,
            CommandBody::TransactionInfo(_) => data_type::TRANSACTION_INFO,
            CommandBody::KeepAlive => data_type::KEEP_ALIVE,
            CommandBody::Shutdown => data_type::SHUTDOWN,
            CommandBody::RemoveInfo(_) => data_type::REMOVE_INFO,
            CommandBody::MessageAck(_) => data_type::MESSAGE_ACK,
            CommandBody::Message(message) => match message.kind {
                MessageKind::Text => data_type::TEXT_MESSAGE,
                MessageKind::Bytes => data_type::BYTES_MESSAGE,
                MessageKind::Map => data_type::MAP_MESSAGE,
                MessageKind::Stream => data_type::STREAM_MESSAGE,
                MessageKind::Object => data_type::OBJECT_MESSAGE,
            },
            CommandBody::Response(_) => data_type::RESPONSE,
            CommandBody::ExceptionResponse(_) => data_type::EXCEPTION_RESPONSE,
        }
    }
}

/// One atomic protocol unit.
///
/// Commands are owned by their issuing layer until handed off; every send
/// transfers ownership down the transport chain.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    /// Correlation id assigned by the correlator, 0 = unassigned.
    pub command_id: i32,
    /// Whether the sender expects exactly one correlated response.
    pub response_required: bool,
    /// The type-specific payload.
    pub body: CommandBody,
}

impl Command {
    /// Creates a one-way command with no correlation id.
    pub fn oneway(body: CommandBody) -> Self {
        Self {
            command_id: 0,
            response_required: false,
            body,
        }
    }

    /// The stable wire type tag of this command's body.
    pub fn type_tag(&self) -> u8 {
        self.body.type_tag()
    }

    /// True for message commands, which get preferential treatment in the
    /// failover outbound buffer.
    pub fn is_message(&self) -> bool {
        matches!(self.body, CommandBody::Message(_))
    }

    /// The correlation id this command answers, for response bodies.
    pub fn response_correlation_id(&self) -> Option<i32> {
        match &self.body {
            CommandBody::Response(response) => Some(response.correlation_id),
            CommandBody::ExceptionResponse(response) if response.correlation_id != 0 => {
                Some(response.correlation_id)
            }
            _ => None,
        }
    }
}
