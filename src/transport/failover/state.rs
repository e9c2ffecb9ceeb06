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

//! The session-state shadow.
//!
//! [`ConnectionStateTracker`] watches outbound commands and retains the
//! minimal set needed to rebuild broker-side state on a fresh transport:
//! info creations in insertion order (removals delete them), message
//! acknowledgements until their response has been observed, and — when
//! message tracking is on — recent message sends that have not been
//! acknowledged by the broker yet.
//!
//! Replay re-issues everything as one-way commands with cleared ids; the new
//! transport's correlator owns a fresh id space, so retained correlation ids
//! from the old transport are never re-used on the wire.

use crate::command::{
    Command, CommandBody, ConnectionId, ConsumerId, ProducerId, ResourceId, SessionId,
    TransactionId, TransactionKind,
};
use crate::transport::{Transport, TransportError};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex as StdMutex;
use tracing::{debug, warn};

/// What the tracker did with one outbound command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tracked {
    /// Retained in an insertion-ordered info map.
    Info,
    /// Retained until a response resolves the returned token.
    Pending(u64),
    /// Not retained; lost if the transport fails mid-send.
    Untracked,
}

#[derive(Default)]
struct Shadow {
    connections: Vec<(ConnectionId, Command)>,
    sessions: Vec<(SessionId, Command)>,
    producers: Vec<(ProducerId, Command)>,
    consumers: Vec<(ConsumerId, Command)>,
    transactions: Vec<(TransactionId, Command)>,
    acks: VecDeque<(u64, Option<TransactionId>, Command)>,
    messages: VecDeque<(u64, Command)>,
}

fn upsert<K: PartialEq>(entries: &mut Vec<(K, Command)>, key: K, command: Command) {
    if let Some(slot) = entries.iter_mut().find(|(k, _)| *k == key) {
        slot.1 = command;
    } else {
        entries.push((key, command));
    }
}

fn remove<K: PartialEq>(entries: &mut Vec<(K, Command)>, key: &K) {
    entries.retain(|(k, _)| k != key);
}

/// Observes outbound traffic and rebuilds broker state after reconnect.
pub struct ConnectionStateTracker {
    track_messages: bool,
    max_cache_size: usize,
    next_token: AtomicU64,
    shadow: StdMutex<Shadow>,
}

impl ConnectionStateTracker {
    /// Creates a tracker.
    ///
    /// `max_cache_size` bounds the pending ack and message queues;
    /// `track_messages` enables retention of message sends for replay.
    pub fn new(track_messages: bool, max_cache_size: usize) -> Self {
        Self {
            track_messages,
            max_cache_size: max_cache_size.max(1),
            next_token: AtomicU64::new(1),
            shadow: StdMutex::new(Shadow::default()),
        }
    }

    /// Observes one outbound command.
    pub fn track(&self, command: &Command) -> Tracked {
        let mut shadow = self.shadow.lock().expect("shadow lock");
        match &command.body {
            CommandBody::ConnectionInfo(info) => {
                upsert(
                    &mut shadow.connections,
                    info.connection_id.clone(),
                    command.clone(),
                );
                Tracked::Info
            }
            CommandBody::SessionInfo(info) => {
                upsert(&mut shadow.sessions, info.session_id.clone(), command.clone());
                Tracked::Info
            }
            CommandBody::ProducerInfo(info) => {
                upsert(
                    &mut shadow.producers,
                    info.producer_id.clone(),
                    command.clone(),
                );
                Tracked::Info
            }
            CommandBody::ConsumerInfo(info) => {
                upsert(
                    &mut shadow.consumers,
                    info.consumer_id.clone(),
                    command.clone(),
                );
                Tracked::Info
            }
            CommandBody::TransactionInfo(info) => match info.kind {
                TransactionKind::Begin => {
                    upsert(
                        &mut shadow.transactions,
                        info.transaction_id.clone(),
                        command.clone(),
                    );
                    Tracked::Info
                }
                TransactionKind::Commit | TransactionKind::Rollback => {
                    remove(&mut shadow.transactions, &info.transaction_id);
                    // Replaying acks of a settled transaction would double-ack.
                    shadow
                        .acks
                        .retain(|(_, tx, _)| tx.as_ref() != Some(&info.transaction_id));
                    Tracked::Untracked
                }
            },
            CommandBody::RemoveInfo(remove_info) => {
                match &remove_info.id {
                    ResourceId::Connection(id) => {
                        remove(&mut shadow.connections, id);
                        shadow.sessions.retain(|(k, _)| &k.connection_id != id);
                        shadow.producers.retain(|(k, _)| &k.connection_id != id);
                        shadow.consumers.retain(|(k, _)| &k.connection_id != id);
                        shadow.transactions.retain(|(k, _)| &k.connection_id != id);
                    }
                    ResourceId::Session(id) => {
                        remove(&mut shadow.sessions, id);
                        shadow.producers.retain(|(k, _)| {
                            k.connection_id != id.connection_id || k.session_id != id.value
                        });
                        shadow.consumers.retain(|(k, _)| {
                            k.connection_id != id.connection_id || k.session_id != id.value
                        });
                    }
                    ResourceId::Producer(id) => remove(&mut shadow.producers, id),
                    ResourceId::Consumer(id) => remove(&mut shadow.consumers, id),
                }
                Tracked::Untracked
            }
            CommandBody::MessageAck(ack) => {
                // Only acks that can still produce a response (or sit in an
                // open transaction) are worth replaying; an untracked ack
                // that never arrives is redelivered by the broker anyway.
                if !command.response_required && ack.transaction_id.is_none() {
                    return Tracked::Untracked;
                }
                let token = self.next_token.fetch_add(1, Ordering::Relaxed);
                shadow
                    .acks
                    .push_back((token, ack.transaction_id.clone(), command.clone()));
                if shadow.acks.len() > self.max_cache_size {
                    shadow.acks.pop_front();
                    warn!("ack cache overflow, dropping oldest tracked ack");
                }
                Tracked::Pending(token)
            }
            CommandBody::Message(_) => {
                if !self.track_messages {
                    return Tracked::Untracked;
                }
                let token = self.next_token.fetch_add(1, Ordering::Relaxed);
                shadow.messages.push_back((token, command.clone()));
                if shadow.messages.len() > self.max_cache_size {
                    shadow.messages.pop_front();
                    warn!("message cache overflow, dropping oldest tracked send");
                }
                Tracked::Pending(token)
            }
            CommandBody::Shutdown => {
                *shadow = Shadow::default();
                Tracked::Untracked
            }
            CommandBody::WireFormatInfo(_)
            | CommandBody::KeepAlive
            | CommandBody::Response(_)
            | CommandBody::ExceptionResponse(_) => Tracked::Untracked,
        }
    }

    /// Marks a pending ack or message as answered; it will not be replayed.
    pub fn resolve(&self, token: u64) {
        let mut shadow = self.shadow.lock().expect("shadow lock");
        shadow.acks.retain(|(t, _, _)| *t != token);
        shadow.messages.retain(|(t, _)| *t != token);
    }

    /// The commands a fresh transport must see, in replay order.
    pub fn restore_commands(&self) -> Vec<Command> {
        let shadow = self.shadow.lock().expect("shadow lock");
        let mut commands = Vec::new();
        for (_, command) in &shadow.connections {
            commands.push(command.clone());
        }
        for (_, command) in &shadow.sessions {
            commands.push(command.clone());
        }
        for (_, command) in &shadow.producers {
            commands.push(command.clone());
        }
        for (_, command) in &shadow.consumers {
            commands.push(command.clone());
        }
        for (_, command) in &shadow.transactions {
            commands.push(command.clone());
        }
        for (_, _, command) in &shadow.acks {
            commands.push(command.clone());
        }
        for (_, command) in &shadow.messages {
            commands.push(command.clone());
        }
        commands
    }

    /// Replays the retained state over `transport` as one-way commands with
    /// fresh (cleared) correlation ids.
    pub async fn restore(&self, transport: &dyn Transport) -> Result<(), TransportError> {
        let commands = self.restore_commands();
        debug!(count = commands.len(), "replaying session state");
        for mut command in commands {
            command.command_id = 0;
            command.response_required = false;
            transport.oneway(command).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{
        AckKind, ConnectionInfo, ConsumerInfo, Destination, Message, MessageAck, RemoveInfo,
        SessionInfo, TransactionInfo,
    };

    fn connection_id() -> ConnectionId {
        ConnectionId("c1".to_string())
    }

    fn connection_info() -> Command {
        Command::oneway(CommandBody::ConnectionInfo(ConnectionInfo {
            connection_id: connection_id(),
            client_id: None,
            user_name: None,
            password: None,
        }))
    }

    fn session_info(value: i64) -> Command {
        Command::oneway(CommandBody::SessionInfo(SessionInfo {
            session_id: SessionId {
                connection_id: connection_id(),
                value,
            },
        }))
    }

    fn consumer_info(session: i64, value: i64) -> Command {
        Command::oneway(CommandBody::ConsumerInfo(ConsumerInfo {
            consumer_id: ConsumerId {
                connection_id: connection_id(),
                session_id: session,
                value,
            },
            destination: Destination::queue("Q"),
            selector: None,
            subscription_name: None,
            prefetch_size: 100,
            no_local: false,
        }))
    }

    fn ack(required: bool) -> Command {
        let mut command = Command::oneway(CommandBody::MessageAck(MessageAck {
            consumer_id: ConsumerId {
                connection_id: connection_id(),
                session_id: 1,
                value: 1,
            },
            destination: None,
            transaction_id: None,
            first_message_id: None,
            last_message_id: Some("ID:1".to_string()),
            kind: AckKind::Standard,
            message_count: 1,
        }));
        command.response_required = required;
        command
    }

    #[test]
    fn test_infos_replay_in_insertion_order() {
        let tracker = ConnectionStateTracker::new(false, 16);
        tracker.track(&connection_info());
        tracker.track(&session_info(1));
        tracker.track(&consumer_info(1, 1));
        tracker.track(&session_info(2));

        let replay = tracker.restore_commands();
        let tags: Vec<u8> = replay.iter().map(Command::type_tag).collect();
        // Connection, then sessions (both), then the consumer.
        assert_eq!(
            tags,
            vec![
                crate::command::data_type::CONNECTION_INFO,
                crate::command::data_type::SESSION_INFO,
                crate::command::data_type::SESSION_INFO,
                crate::command::data_type::CONSUMER_INFO,
            ]
        );
    }

    #[test]
    fn test_removal_deletes_entry() {
        let tracker = ConnectionStateTracker::new(false, 16);
        tracker.track(&consumer_info(1, 1));
        tracker.track(&Command::oneway(CommandBody::RemoveInfo(RemoveInfo {
            id: ResourceId::Consumer(ConsumerId {
                connection_id: connection_id(),
                session_id: 1,
                value: 1,
            }),
        })));
        assert!(tracker.restore_commands().is_empty());
    }

    #[test]
    fn test_connection_removal_cascades() {
        let tracker = ConnectionStateTracker::new(false, 16);
        tracker.track(&connection_info());
        tracker.track(&session_info(1));
        tracker.track(&consumer_info(1, 1));
        tracker.track(&Command::oneway(CommandBody::RemoveInfo(RemoveInfo {
            id: ResourceId::Connection(connection_id()),
        })));
        assert!(tracker.restore_commands().is_empty());
    }

    #[test]
    fn test_ack_retained_until_resolved() {
        let tracker = ConnectionStateTracker::new(false, 16);
        let Tracked::Pending(token) = tracker.track(&ack(true)) else {
            panic!("responded ack should be pending");
        };
        assert_eq!(tracker.restore_commands().len(), 1);

        tracker.resolve(token);
        assert!(tracker.restore_commands().is_empty());
    }

    #[test]
    fn test_fire_and_forget_ack_untracked() {
        let tracker = ConnectionStateTracker::new(false, 16);
        assert_eq!(tracker.track(&ack(false)), Tracked::Untracked);
    }

    #[test]
    fn test_commit_drops_transaction_and_its_acks() {
        let tracker = ConnectionStateTracker::new(false, 16);
        let tx = TransactionId {
            connection_id: connection_id(),
            value: 7,
        };
        tracker.track(&Command::oneway(CommandBody::TransactionInfo(
            TransactionInfo {
                connection_id: connection_id(),
                transaction_id: tx.clone(),
                kind: TransactionKind::Begin,
            },
        )));
        let mut transacted_ack = ack(false);
        if let CommandBody::MessageAck(ref mut a) = transacted_ack.body {
            a.transaction_id = Some(tx.clone());
        }
        tracker.track(&transacted_ack);
        assert_eq!(tracker.restore_commands().len(), 2);

        tracker.track(&Command::oneway(CommandBody::TransactionInfo(
            TransactionInfo {
                connection_id: connection_id(),
                transaction_id: tx,
                kind: TransactionKind::Commit,
            },
        )));
        assert!(tracker.restore_commands().is_empty());
    }

    #[test]
    fn test_messages_tracked_only_when_enabled() {
        let message = Command::oneway(CommandBody::Message(Message::new(
            Destination::queue("Q"),
        )));

        let without = ConnectionStateTracker::new(false, 16);
        assert_eq!(without.track(&message), Tracked::Untracked);

        let with = ConnectionStateTracker::new(true, 16);
        assert!(matches!(with.track(&message), Tracked::Pending(_)));
        assert_eq!(with.restore_commands().len(), 1);
    }

    #[test]
    fn test_message_cache_is_bounded() {
        let tracker = ConnectionStateTracker::new(true, 2);
        for _ in 0..5 {
            tracker.track(&Command::oneway(CommandBody::Message(Message::new(
                Destination::queue("Q"),
            ))));
        }
        assert_eq!(tracker.restore_commands().len(), 2);
    }

    #[test]
    fn test_replay_clears_ids() {
        let tracker = ConnectionStateTracker::new(false, 16);
        let mut info = connection_info();
        info.command_id = 42;
        info.response_required = true;
        tracker.track(&info);

        // restore() clears ids; restore_commands returns the raw clones.
        let raw = tracker.restore_commands();
        assert_eq!(raw[0].command_id, 42);
    }
}
