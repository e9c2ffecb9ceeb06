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

//! The failover supervisor.
//!
//! [`FailoverTransport`] presents one transport-shaped interface backed by
//! an evolving pool: at most one connected chain, up to `backupPoolSize`
//! warm backups, and an outbound buffer for sends that arrive while
//! disconnected. A cooperative reconnect task (driven by the
//! [`TaskRunner`](crate::util::TaskRunner)) picks candidates from the URI
//! pool, negotiates, replays the session-state shadow, flushes the buffer,
//! and only then publishes the new transport to senders.
//!
//! The supervisor mutex guards the pool state and is never held across
//! network I/O: connecting and negotiating happen on a detached chain that
//! is swapped in under the lock afterwards.

pub mod state;
pub mod uri_pool;

pub use state::{ConnectionStateTracker, Tracked};

use crate::command::{Command, CommandBody};
use crate::transport::factory::{self, TransportFactory};
use crate::transport::{Transport, TransportError, TransportListener};
use crate::util::uri::{ConnectUri, UriError};
use crate::util::{Task, TaskRunner};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, OnceLock, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};
use uri_pool::UriPool;

/// Supervisor configuration, fed from the `failover:(...)` URI options.
#[derive(Debug, Clone)]
pub struct FailoverOptions {
    /// Shuffle the pool and pick candidates uniformly at random.
    pub randomize: bool,
    /// Maintain warm backup transports.
    pub backup: bool,
    /// How many warm backups to keep.
    pub backup_pool_size: usize,
    /// First reconnect backoff delay.
    pub initial_reconnect_delay: Duration,
    /// Ceiling for the backoff delay.
    pub max_reconnect_delay: Duration,
    /// Grow the delay by `backoff_multiplier` after each failure.
    pub use_exponential_backoff: bool,
    /// Backoff growth factor.
    pub backoff_multiplier: f64,
    /// Give up after this many consecutive failures; 0 means never.
    pub max_reconnect_attempts: u32,
    /// How long sends may wait for a connection, in milliseconds; -1 waits
    /// forever.
    pub timeout_millis: i64,
    /// Retain message sends for replay after reconnect.
    pub track_messages: bool,
    /// Bound for the outbound buffer and the tracker's pending caches.
    pub max_cache_size: usize,
    /// Time budget for one socket connect.
    pub connect_timeout: Duration,
}

impl Default for FailoverOptions {
    fn default() -> Self {
        Self {
            randomize: true,
            backup: false,
            backup_pool_size: 1,
            initial_reconnect_delay: Duration::from_millis(10),
            max_reconnect_delay: Duration::from_secs(30),
            use_exponential_backoff: true,
            backoff_multiplier: 2.0,
            max_reconnect_attempts: 0,
            timeout_millis: -1,
            track_messages: false,
            max_cache_size: 128,
            connect_timeout: factory::DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl FailoverOptions {
    /// Reads the recognized options from a composite URI, warning about the
    /// rest.
    pub fn from_uri(uri: &ConnectUri) -> Result<Self, UriError> {
        let mut options = Self::default();
        for (name, value) in uri.options() {
            match name.as_str() {
                "randomize" => options.randomize = factory::parse_option(name, value)?,
                "backup" => options.backup = factory::parse_option(name, value)?,
                "backupPoolSize" => {
                    options.backup_pool_size = factory::parse_option(name, value)?
                }
                "initialReconnectDelay" => {
                    options.initial_reconnect_delay =
                        Duration::from_millis(factory::parse_option(name, value)?)
                }
                "maxReconnectDelay" => {
                    options.max_reconnect_delay =
                        Duration::from_millis(factory::parse_option(name, value)?)
                }
                "useExponentialBackOff" => {
                    options.use_exponential_backoff = factory::parse_option(name, value)?
                }
                "backOffMultiplier" => {
                    options.backoff_multiplier = factory::parse_option(name, value)?
                }
                "maxReconnectAttempts" => {
                    options.max_reconnect_attempts = factory::parse_option(name, value)?
                }
                "timeout" => options.timeout_millis = factory::parse_option(name, value)?,
                "trackMessages" => options.track_messages = factory::parse_option(name, value)?,
                "maxCacheSize" => options.max_cache_size = factory::parse_option(name, value)?,
                "connectionTimeout" => {
                    options.connect_timeout =
                        Duration::from_millis(factory::parse_option(name, value)?)
                }
                other => warn!(option = other, "ignoring unknown failover option"),
            }
        }
        Ok(options)
    }

    fn send_timeout(&self) -> Option<Duration> {
        if self.timeout_millis < 0 {
            None
        } else {
            Some(Duration::from_millis(self.timeout_millis as u64))
        }
    }
}

/// Supervisor lifecycle phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailoverPhase {
    /// No live transport and no connect in progress.
    Disconnected,
    /// A connect attempt is running.
    Connecting,
    /// A live transport is published.
    Connected,
    /// The live transport just failed; being torn down.
    Interrupted,
    /// Terminal: closed, or reconnect attempts exhausted.
    Closed,
}

struct BackupEntry {
    uri: ConnectUri,
    transport: Arc<dyn Transport>,
}

struct SupervisorState {
    phase: FailoverPhase,
    connected: Option<Arc<dyn Transport>>,
    connected_uri: Option<ConnectUri>,
    backups: Vec<BackupEntry>,
    buffer: VecDeque<Command>,
    reconnect_delay: Duration,
    attempts: u32,
    terminal_attempts: Option<u32>,
    dropped_sends: u64,
}

struct FailoverInner {
    options: FailoverOptions,
    pool: StdMutex<UriPool>,
    state: StdMutex<SupervisorState>,
    tracker: ConnectionStateTracker,
    listener: StdMutex<Option<Arc<dyn TransportListener>>>,
    /// Bumped whenever connectivity state changes; `watch` makes the
    /// subscribe-then-check pattern in waiters race-free.
    connectivity: watch::Sender<()>,
    closed: AtomicBool,
    runner: OnceLock<TaskRunner>,
}

impl FailoverInner {
    fn listener(&self) -> Option<Arc<dyn TransportListener>> {
        self.listener.lock().expect("listener lock").clone()
    }

    fn wake_runner(&self) {
        if let Some(runner) = self.runner.get() {
            runner.wakeup();
        }
    }

    /// True for errors that mean the connection itself is gone, as opposed
    /// to per-call failures like timeouts.
    fn is_connection_failure(error: &TransportError) -> bool {
        match error {
            TransportError::ConnectionFailed { .. }
            | TransportError::ConnectionLost { .. }
            | TransportError::WriteFailed { .. } => true,
            TransportError::Codec { source } => source.is_io(),
            _ => false,
        }
    }

    /// Clears the failed transport and schedules a reconnect. The error is
    /// suppressed from the application until retries are exhausted.
    fn handle_transport_failure(&self, error: &TransportError) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        let old = {
            let mut state = self.state.lock().expect("state lock");
            match state.connected.take() {
                Some(transport) => {
                    state.connected_uri = None;
                    state.phase = FailoverPhase::Interrupted;
                    Some(transport)
                }
                None => None,
            }
        };
        let Some(old) = old else {
            return;
        };
        warn!(%error, "transport interrupted, scheduling reconnect");
        {
            let mut state = self.state.lock().expect("state lock");
            state.phase = FailoverPhase::Disconnected;
        }
        tokio::spawn(async move {
            let _ = old.close().await;
        });
        self.wake_runner();
    }

    /// Parks the caller until a transport is published, the supervisor
    /// terminates, or `budget` runs out.
    async fn wait_until_connected(
        &self,
        budget: Option<Duration>,
    ) -> Result<Arc<dyn Transport>, TransportError> {
        let deadline = budget.map(|duration| tokio::time::Instant::now() + duration);
        let mut connectivity = self.connectivity.subscribe();
        loop {
            if self.closed.load(Ordering::SeqCst) {
                return Err(TransportError::Closed);
            }
            {
                let state = self.state.lock().expect("state lock");
                if let Some(attempts) = state.terminal_attempts {
                    return Err(TransportError::RetriesExhausted { attempts });
                }
                if let Some(transport) = &state.connected {
                    return Ok(transport.clone());
                }
            }
            self.wake_runner();
            match deadline {
                None => {
                    if connectivity.changed().await.is_err() {
                        return Err(TransportError::Closed);
                    }
                }
                Some(deadline) => {
                    let now = tokio::time::Instant::now();
                    if now >= deadline {
                        return Err(TransportError::Timeout {
                            duration: budget.unwrap_or_default(),
                        });
                    }
                    match tokio::time::timeout_at(deadline, connectivity.changed()).await {
                        Err(_elapsed) => {
                            return Err(TransportError::Timeout {
                                duration: budget.unwrap_or_default(),
                            });
                        }
                        Ok(Err(_gone)) => return Err(TransportError::Closed),
                        Ok(Ok(())) => {}
                    }
                }
            }
        }
    }

    /// One reconnect attempt. Returns true when the runner should iterate
    /// again (connected, or failure with retries remaining).
    async fn do_reconnect(self: &Arc<Self>) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }
        {
            let mut state = self.state.lock().expect("state lock");
            state.phase = FailoverPhase::Connecting;
        }

        // Warm backups are already connected and negotiated; prefer them.
        let backup = {
            let mut state = self.state.lock().expect("state lock");
            if state.backups.is_empty() {
                None
            } else {
                Some(state.backups.remove(0))
            }
        };

        let (uri, transport) = match backup {
            Some(entry) => {
                debug!(uri = %entry.uri, "promoting backup transport");
                entry.transport.set_listener(Arc::new(ConnectedListener {
                    inner: Arc::downgrade(self),
                }));
                (entry.uri, entry.transport)
            }
            None => {
                let candidate = {
                    let mut pool = self.pool.lock().expect("pool lock");
                    pool.next()
                };
                let Some(uri) = candidate else {
                    error!("failover pool is empty");
                    return false;
                };
                debug!(%uri, "connecting");
                match TransportFactory::create_member(&uri, self.options.connect_timeout).await
                {
                    Ok(transport) => {
                        transport.set_listener(Arc::new(ConnectedListener {
                            inner: Arc::downgrade(self),
                        }));
                        if let Err(start_error) = transport.start().await {
                            debug!(%uri, error = %start_error, "start failed");
                            let _ = transport.close().await;
                            return self.handle_connect_failure().await;
                        }
                        (uri, transport)
                    }
                    Err(connect_error) => {
                        debug!(%uri, error = %connect_error, "connect failed");
                        return self.handle_connect_failure().await;
                    }
                }
            }
        };

        // Rebuild broker-side state before anything buffered is released.
        // The first replayed oneway also waits out the wire-format
        // handshake, so negotiation completes here too.
        if let Err(replay_error) = self.tracker.restore(transport.as_ref()).await {
            warn!(%uri, error = %replay_error, "state replay failed");
            let _ = transport.close().await;
            return self.handle_connect_failure().await;
        }

        // Flush the outbound buffer in arrival order, then publish. Sends
        // that race in during the flush land in the buffer and are drained
        // before the transport becomes visible.
        loop {
            if self.closed.load(Ordering::SeqCst) {
                let _ = transport.close().await;
                return false;
            }
            let batch: Vec<Command> = {
                let mut state = self.state.lock().expect("state lock");
                if state.buffer.is_empty() {
                    state.connected = Some(transport.clone());
                    state.connected_uri = Some(uri.clone());
                    state.phase = FailoverPhase::Connected;
                    state.reconnect_delay = self.options.initial_reconnect_delay;
                    state.attempts = 0;
                    Vec::new()
                } else {
                    state.buffer.drain(..).collect()
                }
            };
            if batch.is_empty() {
                break;
            }
            for command in batch {
                self.tracker.track(&command);
                if let Err(flush_error) = transport.oneway(command).await {
                    warn!(%uri, error = %flush_error, "buffered send failed");
                    let _ = transport.close().await;
                    return self.handle_connect_failure().await;
                }
            }
        }

        info!(%uri, "failover connected");
        let _ = self.connectivity.send(());

        let dropped = {
            let mut state = self.state.lock().expect("state lock");
            std::mem::take(&mut state.dropped_sends)
        };
        if dropped > 0 {
            warn!(count = dropped, "sends were dropped while reconnecting");
            if let Some(listener) = self.listener() {
                listener.on_exception(TransportError::Interrupted {
                    reason: "sends dropped during reconnect",
                });
            }
        }
        true
    }

    /// Backoff bookkeeping after a failed attempt. Returns true when another
    /// attempt should run.
    async fn handle_connect_failure(self: &Arc<Self>) -> bool {
        let (delay, attempts) = {
            let mut state = self.state.lock().expect("state lock");
            state.phase = FailoverPhase::Disconnected;
            state.attempts += 1;
            let delay = state.reconnect_delay;
            if self.options.use_exponential_backoff {
                state.reconnect_delay = state
                    .reconnect_delay
                    .mul_f64(self.options.backoff_multiplier)
                    .min(self.options.max_reconnect_delay);
            }
            (delay, state.attempts)
        };

        let max = self.options.max_reconnect_attempts;
        if max > 0 && attempts >= max {
            error!(attempts, "reconnection abandoned");
            {
                let mut state = self.state.lock().expect("state lock");
                state.phase = FailoverPhase::Closed;
                state.terminal_attempts = Some(attempts);
            }
            let _ = self.connectivity.send(());
            if let Some(listener) = self.listener() {
                listener.on_exception(TransportError::RetriesExhausted { attempts });
            }
            return false;
        }

        debug!(attempt = attempts, ?delay, "reconnect failed, backing off");
        tokio::time::sleep(delay).await;
        !self.closed.load(Ordering::SeqCst)
    }

    /// Tops the backup pool up to its configured size.
    async fn build_backups(self: &Arc<Self>) {
        if !self.options.backup || self.closed.load(Ordering::SeqCst) {
            return;
        }
        loop {
            let (needed, exclude) = {
                let state = self.state.lock().expect("state lock");
                let mut exclude: Vec<ConnectUri> =
                    state.backups.iter().map(|entry| entry.uri.clone()).collect();
                if let Some(uri) = &state.connected_uri {
                    exclude.push(uri.clone());
                }
                (
                    self.options
                        .backup_pool_size
                        .saturating_sub(state.backups.len()),
                    exclude,
                )
            };
            if needed == 0 {
                return;
            }
            let candidate = {
                let mut pool = self.pool.lock().expect("pool lock");
                let exclude_refs: Vec<&ConnectUri> = exclude.iter().collect();
                pool.next_excluding(&exclude_refs)
            };
            let Some(uri) = candidate else {
                return;
            };
            match TransportFactory::create_member(&uri, self.options.connect_timeout).await {
                Ok(transport) => {
                    transport.set_listener(Arc::new(BackupListener {
                        inner: Arc::downgrade(self),
                        uri: uri.clone(),
                    }));
                    if transport.start().await.is_err() {
                        let _ = transport.close().await;
                        return;
                    }
                    debug!(%uri, "backup transport ready");
                    let mut state = self.state.lock().expect("state lock");
                    state.backups.push(BackupEntry { uri, transport });
                }
                Err(backup_error) => {
                    debug!(%uri, error = %backup_error, "backup connect failed");
                    return;
                }
            }
        }
    }
}

/// The reconnect work unit: one cycle per wake.
struct ReconnectTask {
    inner: Weak<FailoverInner>,
}

#[async_trait]
impl Task for ReconnectTask {
    async fn iterate(&self) -> bool {
        let Some(inner) = self.inner.upgrade() else {
            return false;
        };
        if inner.closed.load(Ordering::SeqCst) {
            return false;
        }
        let needs_reconnect = {
            let state = inner.state.lock().expect("state lock");
            state.connected.is_none() && state.terminal_attempts.is_none()
        };
        if needs_reconnect {
            let again = inner.do_reconnect().await;
            // A successful reconnect leaves backup building to the next
            // pass; wake once more so that pass actually runs.
            if again {
                inner.wake_runner();
            }
            return again;
        }
        inner.build_backups().await;
        false
    }
}

/// Listener bridging the connected chain into the supervisor.
struct ConnectedListener {
    inner: Weak<FailoverInner>,
}

impl TransportListener for ConnectedListener {
    fn on_command(&self, command: Command) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        match &command.body {
            CommandBody::Shutdown => {
                debug!("broker announced shutdown");
                inner.handle_transport_failure(&TransportError::ConnectionLost {
                    reason: "broker shutdown".to_string(),
                    source: None,
                });
            }
            CommandBody::KeepAlive => trace!("keep-alive consumed"),
            CommandBody::WireFormatInfo(_) => trace!("wire format info consumed"),
            _ => match inner.listener() {
                Some(listener) => listener.on_command(command),
                None => trace!("dropping inbound command, no listener"),
            },
        }
    }

    fn on_exception(&self, error: TransportError) {
        if let Some(inner) = self.inner.upgrade() {
            inner.handle_transport_failure(&error);
        }
    }
}

/// Listener watching a warm backup for failure.
struct BackupListener {
    inner: Weak<FailoverInner>,
    uri: ConnectUri,
}

impl TransportListener for BackupListener {
    fn on_command(&self, command: Command) {
        trace!(tag = command.type_tag(), "dropping command on backup transport");
    }

    fn on_exception(&self, error: TransportError) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        debug!(uri = %self.uri, %error, "backup transport failed");
        let removed = {
            let mut state = inner.state.lock().expect("state lock");
            state
                .backups
                .iter()
                .position(|entry| entry.uri == self.uri)
                .map(|index| state.backups.remove(index))
        };
        if let Some(entry) = removed {
            tokio::spawn(async move {
                let _ = entry.transport.close().await;
            });
        }
        inner.wake_runner();
    }
}

/// One transport-shaped interface over an evolving pool of chains.
pub struct FailoverTransport {
    inner: Arc<FailoverInner>,
}

impl FailoverTransport {
    /// Builds a supervisor from a composite `failover:(...)` URI.
    pub fn new(uri: &ConnectUri) -> Result<Self, UriError> {
        let options = FailoverOptions::from_uri(uri)?;
        if uri.members().is_empty() {
            return Err(UriError::EmptyAuthority {
                uri: uri.to_string(),
            });
        }
        // Validate member codecs now, not in the middle of a reconnect.
        for member in uri.members() {
            factory::wire_format_for(member)?;
        }
        let pool = UriPool::new(uri.members().to_vec(), options.randomize);
        let tracker =
            ConnectionStateTracker::new(options.track_messages, options.max_cache_size);
        let inner = Arc::new(FailoverInner {
            state: StdMutex::new(SupervisorState {
                phase: FailoverPhase::Disconnected,
                connected: None,
                connected_uri: None,
                backups: Vec::new(),
                buffer: VecDeque::new(),
                reconnect_delay: options.initial_reconnect_delay,
                attempts: 0,
                terminal_attempts: None,
                dropped_sends: 0,
            }),
            options,
            pool: StdMutex::new(pool),
            tracker,
            listener: StdMutex::new(None),
            connectivity: watch::channel(()).0,
            closed: AtomicBool::new(false),
            runner: OnceLock::new(),
        });
        Ok(Self { inner })
    }

    /// The current lifecycle phase.
    pub fn phase(&self) -> FailoverPhase {
        self.inner.state.lock().expect("state lock").phase
    }

    /// True when a live transport is published.
    pub fn is_connected(&self) -> bool {
        self.inner
            .state
            .lock()
            .expect("state lock")
            .connected
            .is_some()
    }

    /// The URI of the live transport, when connected.
    pub fn connected_uri(&self) -> Option<ConnectUri> {
        self.inner
            .state
            .lock()
            .expect("state lock")
            .connected_uri
            .clone()
    }

    /// Waits until connected, for tests and connection setup.
    pub async fn await_connected(&self, timeout: Duration) -> Result<(), TransportError> {
        self.inner.wait_until_connected(Some(timeout)).await?;
        Ok(())
    }

    #[cfg(test)]
    fn buffered(&self) -> usize {
        self.inner.state.lock().expect("state lock").buffer.len()
    }
}

#[async_trait]
impl Transport for FailoverTransport {
    async fn start(&self) -> Result<(), TransportError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let inner = self.inner.clone();
        self.inner.runner.get_or_init(move || {
            TaskRunner::new(Arc::new(ReconnectTask {
                inner: Arc::downgrade(&inner),
            }))
        });
        self.inner.wake_runner();
        Ok(())
    }

    async fn oneway(&self, command: Command) -> Result<(), TransportError> {
        let inner = &self.inner;
        if inner.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let mut command = command;
        loop {
            if let Some(attempts) = inner.state.lock().expect("state lock").terminal_attempts {
                return Err(TransportError::RetriesExhausted { attempts });
            }
            let connected = inner.state.lock().expect("state lock").connected.clone();
            match connected {
                Some(transport) => {
                    let tracked = inner.tracker.track(&command);
                    match transport.oneway(command).await {
                        Ok(()) => return Ok(()),
                        Err(send_error)
                            if FailoverInner::is_connection_failure(&send_error) =>
                        {
                            inner.handle_transport_failure(&send_error);
                            if tracked == Tracked::Untracked {
                                let mut state = inner.state.lock().expect("state lock");
                                state.dropped_sends += 1;
                            }
                            // Tracked commands are replayed after reconnect;
                            // untracked ones are dropped by design. Either
                            // way the failure stays inside the supervisor.
                            return Ok(());
                        }
                        Err(send_error) => return Err(send_error),
                    }
                }
                None if command.is_message() => {
                    // Message sends block until connected or the configured
                    // timeout elapses.
                    inner.wake_runner();
                    inner
                        .wait_until_connected(inner.options.send_timeout())
                        .await?;
                }
                None => {
                    let mut state = inner.state.lock().expect("state lock");
                    if state.connected.is_some() {
                        // Lost the race with a reconnect; send directly.
                        continue;
                    }
                    state.buffer.push_back(command);
                    while state.buffer.len() > inner.options.max_cache_size {
                        // Oldest non-message entries go first.
                        let victim = state
                            .buffer
                            .iter()
                            .position(|buffered| !buffered.is_message())
                            .unwrap_or(0);
                        state.buffer.remove(victim);
                        state.dropped_sends += 1;
                        warn!("outbound buffer overflow, dropping oldest entry");
                    }
                    drop(state);
                    inner.wake_runner();
                    return Ok(());
                }
            }
        }
    }

    async fn request(
        &self,
        command: Command,
        timeout: Option<Duration>,
    ) -> Result<Command, TransportError> {
        let inner = &self.inner;
        if inner.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let transport = inner
            .wait_until_connected(inner.options.send_timeout())
            .await?;
        let tracked = inner.tracker.track(&command);
        match transport.request(command, timeout).await {
            Ok(response) => {
                if let Tracked::Pending(token) = tracked {
                    inner.tracker.resolve(token);
                }
                Ok(response)
            }
            Err(request_error) => {
                if FailoverInner::is_connection_failure(&request_error) {
                    inner.handle_transport_failure(&request_error);
                }
                Err(request_error)
            }
        }
    }

    fn set_listener(&self, listener: Arc<dyn TransportListener>) {
        *self.inner.listener.lock().expect("listener lock") = Some(listener);
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let (connected, backups) = {
            let mut state = self.inner.state.lock().expect("state lock");
            state.phase = FailoverPhase::Closed;
            state.buffer.clear();
            (state.connected.take(), std::mem::take(&mut state.backups))
        };
        let _ = self.inner.connectivity.send(());
        if let Some(transport) = connected {
            let _ = transport.close().await;
        }
        for entry in backups {
            let _ = entry.transport.close().await;
        }
        if let Some(runner) = self.inner.runner.get() {
            runner.shutdown_timeout(Duration::from_secs(1)).await;
        }
        *self.inner.listener.lock().expect("listener lock") = None;
        info!("failover transport closed");
        Ok(())
    }
}
