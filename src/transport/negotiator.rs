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

//! Wire-format negotiation as a chain layer.
//!
//! On `start`, [`WireFormatNegotiator`] sends the codec's handshake command
//! and holds back every outbound command until the peer's answer has been
//! consumed by the codec. Protocols that handshake at the application level
//! (the text protocol) have no codec handshake and pass straight through.
//! The handshake command itself never reaches the outer listener.

use crate::command::{Command, CommandBody};
use crate::transport::{Transport, TransportError, TransportListener};
use crate::wireformat::WireFormat;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, trace};

/// How long senders wait for the handshake before giving up.
pub const DEFAULT_NEGOTIATE_TIMEOUT: Duration = Duration::from_secs(15);

struct NegotiatorState {
    wire_format: Arc<dyn WireFormat>,
    negotiated: AtomicBool,
    failed: AtomicBool,
    closed: AtomicBool,
    /// Our own handshake is on the wire; inbound handshakes may be applied.
    handshake_sent: AtomicBool,
    /// Peer handshake that arrived before ours went out. Applying it early
    /// would switch the codec before our handshake was encoded, leaving the
    /// peer unable to read it.
    pending_remote: StdMutex<Option<Command>>,
    /// Bumped on every settle; `watch` makes subscribe-then-check race-free.
    settled: watch::Sender<()>,
    listener: StdMutex<Option<Arc<dyn TransportListener>>>,
}

impl NegotiatorState {
    fn listener(&self) -> Option<Arc<dyn TransportListener>> {
        self.listener.lock().expect("listener lock").clone()
    }

    fn settle(&self, flag: &AtomicBool) {
        flag.store(true, Ordering::SeqCst);
        let _ = self.settled.send(());
    }

    /// Feeds one inbound command through the codec's negotiation.
    fn apply(&self, command: Command) {
        match self.wire_format.negotiate(&command) {
            Ok(true) => {
                debug!(
                    protocol = self.wire_format.name(),
                    "wire format handshake complete"
                );
                self.settle(&self.negotiated);
            }
            Ok(false) => match self.listener() {
                Some(listener) => listener.on_command(command),
                None => trace!("dropping inbound command, no listener"),
            },
            Err(error) => {
                self.settle(&self.failed);
                if let Some(listener) = self.listener() {
                    listener.on_exception(TransportError::Codec { source: error });
                }
            }
        }
    }
}

struct NegotiatorListener {
    state: Arc<NegotiatorState>,
}

impl TransportListener for NegotiatorListener {
    fn on_command(&self, command: Command) {
        if matches!(command.body, CommandBody::WireFormatInfo(_))
            && !self.state.handshake_sent.load(Ordering::SeqCst)
        {
            trace!("holding peer handshake until ours is sent");
            *self.state.pending_remote.lock().expect("pending lock") = Some(command);
            return;
        }
        self.state.apply(command);
    }

    fn on_exception(&self, error: TransportError) {
        // Senders parked on the handshake must not wait out the full timeout
        // for a connection that is already gone.
        self.state.settle(&self.state.failed);
        if let Some(listener) = self.state.listener() {
            listener.on_exception(error);
        }
    }
}

/// Chain layer gating sends until the wire-format handshake settles.
pub struct WireFormatNegotiator {
    inner: Arc<dyn Transport>,
    state: Arc<NegotiatorState>,
    negotiate_timeout: Duration,
}

impl WireFormatNegotiator {
    /// Wraps `inner`, registering itself as its listener.
    pub fn new(inner: Arc<dyn Transport>, wire_format: Arc<dyn WireFormat>) -> Self {
        Self::with_timeout(inner, wire_format, DEFAULT_NEGOTIATE_TIMEOUT)
    }

    /// Same as [`new`](Self::new) with an explicit handshake timeout.
    pub fn with_timeout(
        inner: Arc<dyn Transport>,
        wire_format: Arc<dyn WireFormat>,
        negotiate_timeout: Duration,
    ) -> Self {
        let state = Arc::new(NegotiatorState {
            wire_format,
            negotiated: AtomicBool::new(false),
            failed: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            handshake_sent: AtomicBool::new(false),
            pending_remote: StdMutex::new(None),
            settled: watch::channel(()).0,
            listener: StdMutex::new(None),
        });
        inner.set_listener(Arc::new(NegotiatorListener {
            state: state.clone(),
        }));
        Self {
            inner,
            state,
            negotiate_timeout,
        }
    }

    async fn await_negotiated(&self) -> Result<(), TransportError> {
        if self.state.negotiated.load(Ordering::SeqCst) {
            return Ok(());
        }
        let mut settled = self.state.settled.subscribe();
        let wait = async {
            loop {
                if self.state.negotiated.load(Ordering::SeqCst)
                    || self.state.failed.load(Ordering::SeqCst)
                    || self.state.closed.load(Ordering::SeqCst)
                {
                    break;
                }
                if settled.changed().await.is_err() {
                    break;
                }
            }
        };
        if tokio::time::timeout(self.negotiate_timeout, wait).await.is_err() {
            return Err(TransportError::Timeout {
                duration: self.negotiate_timeout,
            });
        }
        if self.state.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        if self.state.failed.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionLost {
                reason: "wire format negotiation failed".to_string(),
                source: None,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for WireFormatNegotiator {
    async fn start(&self) -> Result<(), TransportError> {
        self.inner.start().await?;
        match self.state.wire_format.handshake_command() {
            Some(handshake) => {
                trace!(
                    protocol = self.state.wire_format.name(),
                    "sending wire format preferences"
                );
                self.inner.oneway(handshake).await?;
                self.state.handshake_sent.store(true, Ordering::SeqCst);
                let held = self
                    .state
                    .pending_remote
                    .lock()
                    .expect("pending lock")
                    .take();
                if let Some(remote) = held {
                    self.state.apply(remote);
                }
                Ok(())
            }
            None => {
                self.state.handshake_sent.store(true, Ordering::SeqCst);
                self.state.settle(&self.state.negotiated);
                Ok(())
            }
        }
    }

    async fn oneway(&self, command: Command) -> Result<(), TransportError> {
        self.await_negotiated().await?;
        self.inner.oneway(command).await
    }

    async fn request(
        &self,
        command: Command,
        timeout: Option<Duration>,
    ) -> Result<Command, TransportError> {
        self.await_negotiated().await?;
        self.inner.request(command, timeout).await
    }

    fn set_listener(&self, listener: Arc<dyn TransportListener>) {
        *self.state.listener.lock().expect("listener lock") = Some(listener);
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.state.settle(&self.state.closed);
        *self.state.listener.lock().expect("listener lock") = None;
        self.inner.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{Command, CommandBody};
    use crate::transport::memory::memory_pair;
    use crate::transport::IoTransport;
    use crate::wireformat::openwire::OpenWireFormat;
    use crate::wireformat::WireFormatInfo;
    use crate::wireformat::stomp::StompWireFormat;

    fn chain_over_memory(
        wire_format: Arc<dyn WireFormat>,
    ) -> (
        Arc<WireFormatNegotiator>,
        (crate::transport::BoxedReader, crate::transport::BoxedWriter),
    ) {
        let ((reader, writer), peer) = memory_pair();
        let io = Arc::new(IoTransport::new(reader, writer, wire_format.clone()));
        let negotiator = Arc::new(WireFormatNegotiator::with_timeout(
            io,
            wire_format,
            Duration::from_millis(200),
        ));
        (negotiator, peer)
    }

    #[tokio::test]
    async fn test_start_sends_preferences_and_gates_until_answer() {
        let ours: Arc<dyn WireFormat> =
            Arc::new(OpenWireFormat::new(WireFormatInfo::default()));
        let (negotiator, (mut peer_reader, mut peer_writer)) = chain_over_memory(ours);
        negotiator.start().await.unwrap();

        // The peer sees our preferences.
        let peer_codec = OpenWireFormat::new(WireFormatInfo::default());
        let inbound = peer_codec.unmarshal(&mut peer_reader).await.unwrap();
        assert!(matches!(inbound.body, CommandBody::WireFormatInfo(_)));

        // A send before the peer answers times out at the gate.
        let gated = negotiator
            .oneway(Command::oneway(CommandBody::KeepAlive))
            .await;
        assert!(matches!(gated, Err(TransportError::Timeout { .. })));

        // Answer; the gate opens.
        peer_codec
            .marshal(
                &Command::oneway(CommandBody::WireFormatInfo(WireFormatInfo::default())),
                &mut peer_writer,
            )
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        negotiator
            .oneway(Command::oneway(CommandBody::KeepAlive))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_text_protocol_passes_straight_through() {
        let codec: Arc<dyn WireFormat> = Arc::new(StompWireFormat::new());
        let (negotiator, _peer) = chain_over_memory(codec);
        negotiator.start().await.unwrap();
        negotiator
            .oneway(Command::oneway(CommandBody::KeepAlive))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_close_releases_gated_senders() {
        let ours: Arc<dyn WireFormat> =
            Arc::new(OpenWireFormat::new(WireFormatInfo::default()));
        let ((reader, writer), _peer) = memory_pair();
        let io = Arc::new(IoTransport::new(reader, writer, ours.clone()));
        let negotiator = Arc::new(WireFormatNegotiator::with_timeout(
            io,
            ours,
            Duration::from_secs(5),
        ));
        negotiator.start().await.unwrap();

        let sender = tokio::spawn({
            let negotiator = negotiator.clone();
            async move {
                negotiator
                    .oneway(Command::oneway(CommandBody::KeepAlive))
                    .await
            }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        negotiator.close().await.unwrap();

        let result = tokio::time::timeout(Duration::from_secs(1), sender)
            .await
            .expect("gated sender must be released")
            .unwrap();
        assert!(matches!(result, Err(TransportError::Closed)));
    }
}
