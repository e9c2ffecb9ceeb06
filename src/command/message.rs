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

//! The message command and its property namespace.
//!
//! A message carries typed reserved fields (destination, ids, delivery
//! metadata) plus an ordered set of user properties. Reserved header names
//! travel as typed fields on the wire, so the user-property namespace must
//! stay disjoint from them: [`Message::set_string_property`] rejects any
//! reserved name with a semantic error and leaves the message unchanged.

use crate::command::{CommandError, Destination};
use bytes::Bytes;

/// Header names that carry typed message fields on the wire.
///
/// These names are never valid as user properties, in either protocol.
pub const RESERVED_HEADERS: &[&str] = &[
    "destination",
    "reply-to",
    "message-id",
    "correlation-id",
    "expires",
    "persistent",
    "priority",
    "redelivered",
    "timestamp",
    "type",
    "content-length",
    "ack",
    "transaction",
    "subscription",
    "selector",
    "receipt",
    "receipt-id",
    "login",
    "passcode",
    "client-id",
    "session",
    "redelivery-count",
];

/// Returns true if `name` is part of the reserved header set.
pub fn is_reserved_header(name: &str) -> bool {
    RESERVED_HEADERS.contains(&name)
}

/// The message payload subvariants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// UTF-8 text body.
    Text,
    /// Opaque byte body.
    Bytes,
    /// Marshalled name/value map body.
    Map,
    /// Marshalled primitive stream body.
    Stream,
    /// Serialized object body.
    Object,
}

/// A message command.
///
/// # Examples
///
/// ```rust
/// use mqwire::command::{Destination, Message};
///
/// let mut message = Message::new(Destination::queue("ORDERS"));
/// message.set_text("hello");
/// message.set_string_property("shop", "north").unwrap();
///
/// // Reserved names are rejected and the message is unchanged.
/// assert!(message.set_string_property("destination", "/queue/X").is_err());
/// assert_eq!(message.text().as_deref(), Some("hello"));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Broker-assigned or producer-assigned message identity.
    pub message_id: Option<String>,
    /// Where this message is (or was) sent.
    pub destination: Option<Destination>,
    /// Where replies should be sent.
    pub reply_to: Option<Destination>,
    /// Application-level correlation string.
    pub correlation_id: Option<String>,
    /// Expiration time in milliseconds since the epoch, 0 = never.
    pub expiration: i64,
    /// Whether the broker should persist this message.
    pub persistent: bool,
    /// Delivery priority, 0-9.
    pub priority: u8,
    /// Set by the broker when this delivery is a redelivery.
    pub redelivered: bool,
    /// How many times this message has been redelivered.
    pub redelivery_count: i32,
    /// Broker timestamp in milliseconds since the epoch.
    pub timestamp: i64,
    /// Application-level message type name.
    pub type_name: Option<String>,
    /// The body subvariant.
    pub kind: MessageKind,
    /// Ordered user properties; names are disjoint from [`RESERVED_HEADERS`].
    pub properties: Vec<(String, String)>,
    /// The opaque message body.
    pub body: Bytes,
}

impl Message {
    /// Creates an empty bytes message addressed to `destination`.
    pub fn new(destination: Destination) -> Self {
        Self {
            message_id: None,
            destination: Some(destination),
            reply_to: None,
            correlation_id: None,
            expiration: 0,
            persistent: true,
            priority: 4,
            redelivered: false,
            redelivery_count: 0,
            timestamp: 0,
            type_name: None,
            kind: MessageKind::Bytes,
            properties: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// Sets a UTF-8 text body and switches the message to [`MessageKind::Text`].
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.kind = MessageKind::Text;
        self.body = Bytes::from(text.into());
    }

    /// Returns the body as text when this is a text message with valid UTF-8.
    pub fn text(&self) -> Option<String> {
        if self.kind != MessageKind::Text {
            return None;
        }
        std::str::from_utf8(&self.body).ok().map(str::to_string)
    }

    /// Sets an opaque byte body and switches the message to [`MessageKind::Bytes`].
    pub fn set_body(&mut self, body: Bytes) {
        self.kind = MessageKind::Bytes;
        self.body = body;
    }

    /// Sets a user property, replacing any previous value for the name.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::ReservedProperty`] when `name` is in the
    /// reserved header set; the message is left unchanged.
    pub fn set_string_property(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), CommandError> {
        let name = name.into();
        if is_reserved_header(&name) {
            return Err(CommandError::ReservedProperty { name });
        }
        let value = value.into();
        if let Some(slot) = self.properties.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value;
        } else {
            self.properties.push((name, value));
        }
        Ok(())
    }

    /// Looks up a user property by name.
    pub fn string_property(&self, name: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}
