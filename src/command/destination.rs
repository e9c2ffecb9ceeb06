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

//! Broker destinations.
//!
//! A destination names where messages are sent or consumed from. The text
//! form is the kind prefix followed by the destination name, e.g.
//! `/queue/ORDERS`. Destinations are small immutable value types: messages
//! hold them by value and clone freely rather than sharing mutable state.

use crate::command::CommandError;
use std::fmt;
use std::str::FromStr;

/// The four destination kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DestinationKind {
    /// Point-to-point queue.
    Queue,
    /// Publish/subscribe topic.
    Topic,
    /// Connection-scoped temporary queue.
    TempQueue,
    /// Connection-scoped temporary topic.
    TempTopic,
}

impl DestinationKind {
    /// Text-protocol path prefix for this kind, including both slashes.
    pub fn prefix(self) -> &'static str {
        match self {
            DestinationKind::Queue => "/queue/",
            DestinationKind::Topic => "/topic/",
            DestinationKind::TempQueue => "/temp-queue/",
            DestinationKind::TempTopic => "/temp-topic/",
        }
    }
}

/// An immutable destination value.
///
/// # Examples
///
/// ```rust
/// use mqwire::command::{Destination, DestinationKind};
///
/// let dest = Destination::queue("ORDERS");
/// assert_eq!(dest.kind(), DestinationKind::Queue);
/// assert_eq!(dest.to_string(), "/queue/ORDERS");
///
/// let parsed: Destination = "/topic/PRICES".parse().unwrap();
/// assert_eq!(parsed, Destination::topic("PRICES"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Destination {
    kind: DestinationKind,
    name: String,
}

impl Destination {
    /// Creates a queue destination.
    pub fn queue(name: impl Into<String>) -> Self {
        Self {
            kind: DestinationKind::Queue,
            name: name.into(),
        }
    }

    /// Creates a topic destination.
    pub fn topic(name: impl Into<String>) -> Self {
        Self {
            kind: DestinationKind::Topic,
            name: name.into(),
        }
    }

    /// Creates a temporary queue destination.
    pub fn temp_queue(name: impl Into<String>) -> Self {
        Self {
            kind: DestinationKind::TempQueue,
            name: name.into(),
        }
    }

    /// Creates a temporary topic destination.
    pub fn temp_topic(name: impl Into<String>) -> Self {
        Self {
            kind: DestinationKind::TempTopic,
            name: name.into(),
        }
    }

    /// The destination kind.
    pub fn kind(&self) -> DestinationKind {
        self.kind
    }

    /// The destination name without the kind prefix.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind.prefix(), self.name)
    }
}

impl FromStr for Destination {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        const KINDS: [DestinationKind; 4] = [
            // temp-* first: "/queue/" is not a prefix of "/temp-queue/" but
            // keeping the longer prefixes first makes the intent obvious.
            DestinationKind::TempQueue,
            DestinationKind::TempTopic,
            DestinationKind::Queue,
            DestinationKind::Topic,
        ];
        for kind in KINDS {
            if let Some(name) = s.strip_prefix(kind.prefix()) {
                if name.is_empty() {
                    return Err(CommandError::InvalidDestination {
                        value: s.to_string(),
                        reason: "empty destination name",
                    });
                }
                return Ok(Destination {
                    kind,
                    name: name.to_string(),
                });
            }
        }
        Err(CommandError::InvalidDestination {
            value: s.to_string(),
            reason: "unknown destination kind prefix",
        })
    }
}
