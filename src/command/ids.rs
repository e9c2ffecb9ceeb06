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

//! Typed resource identifiers.
//!
//! Every broker-side resource created over a connection (session, producer,
//! consumer, transaction) is addressed by a small immutable id value. The
//! session-state tracker keys its insertion-ordered maps by these ids, and
//! removal commands name the resource they tear down with them.

use std::fmt;

/// Identifier of one logical connection to the broker.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    /// Returns the connection id string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a session within a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId {
    /// The owning connection.
    pub connection_id: ConnectionId,
    /// Session sequence within the connection.
    pub value: i64,
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.connection_id, self.value)
    }
}

/// Identifier of a message producer within a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProducerId {
    /// The owning connection.
    pub connection_id: ConnectionId,
    /// Session sequence within the connection.
    pub session_id: i64,
    /// Producer sequence within the session.
    pub value: i64,
}

impl fmt::Display for ProducerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.connection_id, self.session_id, self.value)
    }
}

/// Identifier of a message consumer within a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConsumerId {
    /// The owning connection.
    pub connection_id: ConnectionId,
    /// Session sequence within the connection.
    pub session_id: i64,
    /// Consumer sequence within the session.
    pub value: i64,
}

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.connection_id, self.session_id, self.value)
    }
}

/// Identifier of a local transaction on a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransactionId {
    /// The owning connection.
    pub connection_id: ConnectionId,
    /// Transaction sequence within the connection.
    pub value: i64,
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TX:{}:{}", self.connection_id, self.value)
    }
}
