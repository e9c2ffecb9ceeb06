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

//! Failover integration against scripted TCP brokers: reconnect to the next
//! pool member, session-state replay before buffered sends, backup
//! promotion, and retry exhaustion.

use mqwire::command::{
    Command, CommandBody, ConnectionId, ConnectionInfo, ConsumerId, ConsumerInfo, Destination,
    Response, SessionId, SessionInfo, TransactionId, TransactionInfo, TransactionKind,
};
use mqwire::transport::failover::{FailoverPhase, FailoverTransport};
use mqwire::transport::{Transport, TransportError, TransportListener};
use mqwire::util::uri::ConnectUri;
use mqwire::wireformat::openwire::OpenWireFormat;
use mqwire::wireformat::{WireFormat, WireFormatInfo};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// A minimal broker: negotiates the wire format, records every command, and
/// answers anything that requires a response.
struct StubBroker {
    port: u16,
    received: Arc<Mutex<Vec<Command>>>,
    connections: Arc<Mutex<Vec<JoinHandle<()>>>>,
    accept: JoinHandle<()>,
}

impl StubBroker {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let received: Arc<Mutex<Vec<Command>>> = Arc::new(Mutex::new(Vec::new()));
        let connections: Arc<Mutex<Vec<JoinHandle<()>>>> = Arc::new(Mutex::new(Vec::new()));

        let accept = tokio::spawn({
            let received = received.clone();
            let connections = connections.clone();
            async move {
                loop {
                    let Ok((socket, _)) = listener.accept().await else {
                        break;
                    };
                    let handle = tokio::spawn(serve(socket, received.clone()));
                    connections.lock().unwrap().push(handle);
                }
            }
        });

        Self {
            port,
            received,
            connections,
            accept,
        }
    }

    fn uri(&self) -> String {
        format!("tcp://127.0.0.1:{}", self.port)
    }

    /// Drops the listener and every live connection.
    fn kill(&self) {
        self.accept.abort();
        for connection in self.connections.lock().unwrap().drain(..) {
            connection.abort();
        }
    }

    fn received(&self) -> Vec<Command> {
        self.received.lock().unwrap().clone()
    }

    fn connection_count(&self) -> usize {
        self.connections.lock().unwrap().len()
    }
}

async fn serve(socket: TcpStream, received: Arc<Mutex<Vec<Command>>>) {
    let _ = socket.set_nodelay(true);
    let (reader, mut writer) = socket.into_split();
    let mut reader = BufReader::new(reader);
    let codec = OpenWireFormat::new(WireFormatInfo::default());
    loop {
        let command = match codec.unmarshal(&mut reader).await {
            Ok(command) => command,
            Err(_) => return,
        };
        if matches!(command.body, CommandBody::WireFormatInfo(_)) {
            // Answer before applying negotiation: the reply must still be
            // readable by a peer that has not switched modes yet.
            let answer = Command::oneway(CommandBody::WireFormatInfo(WireFormatInfo::default()));
            if codec.marshal(&answer, &mut writer).await.is_err() {
                return;
            }
            let _ = codec.negotiate(&command);
            continue;
        }
        let wants_response = command.response_required;
        let id = command.command_id;
        received.lock().unwrap().push(command);
        if wants_response {
            let answer = Command::oneway(CommandBody::Response(Response {
                correlation_id: id,
            }));
            if codec.marshal(&answer, &mut writer).await.is_err() {
                return;
            }
        }
    }
}

struct Quiet;

impl TransportListener for Quiet {
    fn on_command(&self, _command: Command) {}
    fn on_exception(&self, _error: TransportError) {}
}

fn connection_info() -> Command {
    Command::oneway(CommandBody::ConnectionInfo(ConnectionInfo {
        connection_id: ConnectionId("client-1".to_string()),
        client_id: Some("client-1".to_string()),
        user_name: None,
        password: None,
    }))
}

fn consumer_info() -> Command {
    Command::oneway(CommandBody::ConsumerInfo(ConsumerInfo {
        consumer_id: ConsumerId {
            connection_id: ConnectionId("client-1".to_string()),
            session_id: 1,
            value: 1,
        },
        destination: Destination::queue("ORDERS"),
        selector: None,
        subscription_name: None,
        prefetch_size: 100,
        no_local: false,
    }))
}

fn session_info(value: i64) -> Command {
    Command::oneway(CommandBody::SessionInfo(SessionInfo {
        session_id: SessionId {
            connection_id: ConnectionId("client-1".to_string()),
            value,
        },
    }))
}

fn begin_transaction(value: i64) -> Command {
    Command::oneway(CommandBody::TransactionInfo(TransactionInfo {
        connection_id: ConnectionId("client-1".to_string()),
        transaction_id: TransactionId {
            connection_id: ConnectionId("client-1".to_string()),
            value,
        },
        kind: TransactionKind::Begin,
    }))
}

fn tag_positions(commands: &[Command], tag: u8) -> Vec<usize> {
    commands
        .iter()
        .enumerate()
        .filter(|(_, command)| command.type_tag() == tag)
        .map(|(index, _)| index)
        .collect()
}

async fn wait_for<F: Fn() -> bool>(condition: F, budget: Duration, what: &str) {
    let deadline = tokio::time::Instant::now() + budget;
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Scenario: connected to A, A dies, the supervisor reconnects to B and
/// replays the session state before releasing anything buffered.
#[tokio::test]
async fn reconnect_replays_state_before_buffered_sends() {
    let broker_a = StubBroker::start().await;
    let broker_b = StubBroker::start().await;

    let uri: ConnectUri = format!(
        "failover:({},{})?randomize=false&initialReconnectDelay=10&maxReconnectDelay=200",
        broker_a.uri(),
        broker_b.uri()
    )
    .parse()
    .unwrap();
    let transport = FailoverTransport::new(&uri).unwrap();
    transport.set_listener(Arc::new(Quiet));
    transport.start().await.unwrap();
    transport
        .await_connected(Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(
        transport.connected_uri().unwrap().authority(),
        format!("127.0.0.1:{}", broker_a.port)
    );

    // Establish state on A.
    transport.oneway(connection_info()).await.unwrap();
    transport.oneway(consumer_info()).await.unwrap();
    wait_for(
        || broker_a.received().len() == 2,
        Duration::from_secs(5),
        "state to reach broker A",
    )
    .await;

    // A goes away; the very next send lands in the outbound buffer (or, if
    // the loss has not been noticed yet, is recovered through the tracker).
    // A transaction begin replays after every info, so in every interleaving
    // it must appear on B after the replayed connection and consumer state.
    broker_a.kill();
    transport.oneway(begin_transaction(9)).await.unwrap();

    transport
        .await_connected(Duration::from_secs(5))
        .await
        .unwrap();
    wait_for(
        || {
            transport
                .connected_uri()
                .map(|uri| uri.authority() == format!("127.0.0.1:{}", broker_b.port))
                .unwrap_or(false)
        },
        Duration::from_secs(5),
        "connection to broker B",
    )
    .await;

    wait_for(
        || broker_b.received().len() >= 3,
        Duration::from_secs(5),
        "replay plus late send on broker B",
    )
    .await;

    let seen = broker_b.received();
    let connection_positions =
        tag_positions(&seen, mqwire::command::data_type::CONNECTION_INFO);
    let consumer_positions = tag_positions(&seen, mqwire::command::data_type::CONSUMER_INFO);
    let transaction_positions =
        tag_positions(&seen, mqwire::command::data_type::TRANSACTION_INFO);
    assert_eq!(connection_positions.len(), 1, "replayed connection info");
    assert_eq!(consumer_positions.len(), 1, "replayed consumer info");
    assert_eq!(transaction_positions.len(), 1, "late transaction begin");
    assert!(
        connection_positions[0] < transaction_positions[0]
            && consumer_positions[0] < transaction_positions[0],
        "replayed state must precede the late send: {seen:#?}"
    );

    transport.close().await.unwrap();
    broker_b.kill();
}

/// With `backup=true` a warm secondary exists before the primary dies, and
/// promotion reuses it.
#[tokio::test]
async fn backup_transport_is_built_and_promoted() {
    let broker_a = StubBroker::start().await;
    let broker_b = StubBroker::start().await;

    let uri: ConnectUri = format!(
        "failover:({},{})?randomize=false&backup=true&initialReconnectDelay=10",
        broker_a.uri(),
        broker_b.uri()
    )
    .parse()
    .unwrap();
    let transport = FailoverTransport::new(&uri).unwrap();
    transport.set_listener(Arc::new(Quiet));
    transport.start().await.unwrap();
    transport
        .await_connected(Duration::from_secs(5))
        .await
        .unwrap();

    // The warm backup shows up as a connection on B.
    wait_for(
        || broker_b.connection_count() >= 1,
        Duration::from_secs(5),
        "backup connection on broker B",
    )
    .await;

    broker_a.kill();
    wait_for(
        || {
            transport
                .connected_uri()
                .map(|uri| uri.authority() == format!("127.0.0.1:{}", broker_b.port))
                .unwrap_or(false)
        },
        Duration::from_secs(5),
        "promotion to broker B",
    )
    .await;

    transport.close().await.unwrap();
    broker_b.kill();
}

/// With a bounded attempt budget and no reachable broker, the supervisor
/// reaches the terminal phase and tells the exception listener.
#[tokio::test]
async fn retries_exhausted_reaches_terminal_state() {
    // Grab a port that refuses connections.
    let dead = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = dead.local_addr().unwrap().port();
    drop(dead);

    struct CaptureErrors(Mutex<Vec<TransportError>>);
    impl TransportListener for CaptureErrors {
        fn on_command(&self, _command: Command) {}
        fn on_exception(&self, error: TransportError) {
            self.0.lock().unwrap().push(error);
        }
    }

    let uri: ConnectUri = format!(
        "failover:(tcp://127.0.0.1:{port})?randomize=false&initialReconnectDelay=1\
         &maxReconnectAttempts=3"
    )
    .parse()
    .unwrap();
    let transport = FailoverTransport::new(&uri).unwrap();
    let errors = Arc::new(CaptureErrors(Mutex::new(Vec::new())));
    transport.set_listener(errors.clone());
    transport.start().await.unwrap();

    wait_for(
        || transport.phase() == FailoverPhase::Closed,
        Duration::from_secs(5),
        "terminal phase",
    )
    .await;

    let captured = errors.0.lock().unwrap();
    assert!(
        captured
            .iter()
            .any(|error| matches!(error, TransportError::RetriesExhausted { attempts: 3 })),
        "listener must see the exhaustion: {captured:?}"
    );
    drop(captured);

    let result = transport.oneway(session_info(1)).await;
    assert!(matches!(
        result,
        Err(TransportError::RetriesExhausted { .. })
    ));

    transport.close().await.unwrap();
}

/// Requests cross the supervisor to the live chain and come back correlated.
#[tokio::test]
async fn request_through_failover_is_answered() {
    let broker = StubBroker::start().await;
    let uri: ConnectUri = format!("failover:({})?randomize=false", broker.uri())
        .parse()
        .unwrap();
    let transport = FailoverTransport::new(&uri).unwrap();
    transport.set_listener(Arc::new(Quiet));
    transport.start().await.unwrap();

    let response = transport
        .request(connection_info(), Some(Duration::from_secs(5)))
        .await
        .unwrap();
    assert!(response.response_correlation_id().is_some());

    transport.close().await.unwrap();
    broker.kill();
}
