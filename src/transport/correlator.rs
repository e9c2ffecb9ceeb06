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

//! Request/response correlation.
//!
//! [`ResponseCorrelator`] wraps the next transport and turns the protocol's
//! correlation ids into synchronous call semantics. `request` assigns the
//! next id from a monotonic 32-bit counter, registers a one-shot slot,
//! forwards the command, and parks the caller on the slot. Inbound commands
//! carrying a correlation id resolve their slot; everything else flows to
//! the outer listener.
//!
//! A slot resolves at most once. Timed-out slots stay reserved so a late
//! response is recognized and discarded instead of being mistaken for
//! traffic; ids are never reused. Close fails every outstanding slot with an
//! interruption error.

use crate::command::Command;
use crate::transport::{Transport, TransportError, TransportListener};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, trace};

enum Slot {
    Waiting(oneshot::Sender<Command>),
    /// The waiter gave up; the id stays reserved until the response shows up.
    TimedOut,
}

struct CorrelatorState {
    next_id: AtomicI32,
    pending: StdMutex<HashMap<i32, Slot>>,
    listener: StdMutex<Option<Arc<dyn TransportListener>>>,
    shutdown: AtomicBool,
}

impl CorrelatorState {
    fn listener(&self) -> Option<Arc<dyn TransportListener>> {
        self.listener.lock().expect("listener lock").clone()
    }

    fn next_request_id(&self) -> Result<i32, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        // The counter starts at 1; a non-positive value means the 32-bit
        // space wrapped, which is an error rather than a reuse.
        if id <= 0 {
            return Err(TransportError::RequestIdExhausted);
        }
        Ok(id)
    }

    fn fail_pending(&self) {
        let drained: Vec<Slot> = {
            let mut pending = self.pending.lock().expect("pending lock");
            pending.drain().map(|(_, slot)| slot).collect()
        };
        // Dropping the senders wakes every waiter with an interruption.
        drop(drained);
    }
}

struct CorrelatorListener {
    state: Arc<CorrelatorState>,
}

impl TransportListener for CorrelatorListener {
    fn on_command(&self, command: Command) {
        if let Some(correlation_id) = command.response_correlation_id() {
            let slot = self
                .state
                .pending
                .lock()
                .expect("pending lock")
                .remove(&correlation_id);
            match slot {
                Some(Slot::Waiting(sender)) => {
                    if sender.send(command).is_err() {
                        debug!(correlation_id, "response receiver went away");
                    }
                    return;
                }
                Some(Slot::TimedOut) => {
                    debug!(correlation_id, "discarding late response");
                    return;
                }
                None => {
                    trace!(correlation_id, "response with no slot, forwarding");
                }
            }
        }
        match self.state.listener() {
            Some(listener) => listener.on_command(command),
            None => trace!("dropping inbound command, no listener"),
        }
    }

    fn on_exception(&self, error: TransportError) {
        // The transport below is gone; every waiter is interrupted.
        self.state.fail_pending();
        if let Some(listener) = self.state.listener() {
            listener.on_exception(error);
        }
    }
}

/// Middleware transport adding synchronous request semantics.
pub struct ResponseCorrelator {
    inner: Arc<dyn Transport>,
    state: Arc<CorrelatorState>,
}

impl ResponseCorrelator {
    /// Wraps `inner`, registering itself as its listener.
    pub fn new(inner: Arc<dyn Transport>) -> Self {
        let state = Arc::new(CorrelatorState {
            next_id: AtomicI32::new(1),
            pending: StdMutex::new(HashMap::new()),
            listener: StdMutex::new(None),
            shutdown: AtomicBool::new(false),
        });
        inner.set_listener(Arc::new(CorrelatorListener {
            state: state.clone(),
        }));
        Self { inner, state }
    }
}

#[async_trait]
impl Transport for ResponseCorrelator {
    async fn start(&self) -> Result<(), TransportError> {
        self.inner.start().await
    }

    async fn oneway(&self, command: Command) -> Result<(), TransportError> {
        if self.state.shutdown.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.inner.oneway(command).await
    }

    async fn request(
        &self,
        mut command: Command,
        timeout: Option<Duration>,
    ) -> Result<Command, TransportError> {
        if self.state.shutdown.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        if command.command_id == 0 {
            command.command_id = self.state.next_request_id()?;
        }
        command.response_required = true;
        let request_id = command.command_id;

        let (sender, receiver) = oneshot::channel();
        self.state
            .pending
            .lock()
            .expect("pending lock")
            .insert(request_id, Slot::Waiting(sender));

        if let Err(error) = self.inner.oneway(command).await {
            self.state
                .pending
                .lock()
                .expect("pending lock")
                .remove(&request_id);
            return Err(error);
        }

        match timeout {
            None => receiver.await.map_err(|_| TransportError::Interrupted {
                reason: "transport closed while awaiting response",
            }),
            Some(duration) => match tokio::time::timeout(duration, receiver).await {
                Ok(Ok(response)) => Ok(response),
                Ok(Err(_)) => Err(TransportError::Interrupted {
                    reason: "transport closed while awaiting response",
                }),
                Err(_elapsed) => {
                    // Keep the id reserved; a late response must not be
                    // mistaken for unsolicited traffic.
                    let mut pending = self.state.pending.lock().expect("pending lock");
                    if let Some(slot) = pending.get_mut(&request_id) {
                        *slot = Slot::TimedOut;
                    }
                    Err(TransportError::Timeout { duration })
                }
            },
        }
    }

    fn set_listener(&self, listener: Arc<dyn TransportListener>) {
        *self.state.listener.lock().expect("listener lock") = Some(listener);
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.state.shutdown.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.state.fail_pending();
        *self.state.listener.lock().expect("listener lock") = None;
        self.inner.close().await
    }
}
