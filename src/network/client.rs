//! Subscription client
//!
//! Binds a private Unix datagram endpoint, subscribes it to the ranging
//! daemon's candidate-node feed and keeps the latest decoded snapshot.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use bytes::BytesMut;
use thiserror::Error;
use tokio::net::UnixDatagram;
use tokio::sync::{mpsc, RwLock};

use super::IpcConfig;
use crate::protocol::{self, CodecError, Command, NodeCollection};

/// Receive buffer size. UDP datagrams cap out at 64k; this holds a single
/// collection of roughly 850 node records, far beyond what the daemon emits.
const RECV_BUFFER_BYTES: usize = 32768;

/// Client errors
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("endpoint error: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Already started")]
    AlreadyStarted,

    #[error("Not started")]
    NotStarted,

    #[error("receive socket path is not valid UTF-8: {0}")]
    ReceivePathNotUtf8(PathBuf),
}

pub type ClientResult<T> = Result<T, ClientError>;

/// Events emitted by the client
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// A valid collection arrived and replaced the snapshot
    SnapshotUpdated { collection: NodeCollection },
    /// An inbound datagram failed to decode; the snapshot is unchanged
    DecodeFailed { message: String },
}

/// Client subscription state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Idle,
    Subscribed,
    Unsubscribed,
}

/// The most recently decoded collection, wholesale-replaced on each update
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub collection: NodeCollection,
    pub received_at: SystemTime,
}

/// Candidate-node subscription client
pub struct SubscriptionClient {
    /// Channel configuration
    config: IpcConfig,
    /// Current state
    state: Arc<RwLock<ClientState>>,
    /// Latest successfully decoded collection
    snapshot: Arc<RwLock<Option<Snapshot>>>,
    /// Event sender
    event_tx: mpsc::Sender<ClientEvent>,
    /// Event receiver (for consumers)
    event_rx: Option<mpsc::Receiver<ClientEvent>>,
    /// Bound datagram endpoint, shared with the receive loop
    socket: Arc<RwLock<Option<Arc<UnixDatagram>>>>,
    /// Shutdown signal
    shutdown_tx: Arc<RwLock<Option<mpsc::Sender<()>>>>,
}

impl SubscriptionClient {
    /// Create a new client
    pub fn new(config: IpcConfig) -> Self {
        let (event_tx, event_rx) = mpsc::channel(config.event_capacity);

        Self {
            config,
            state: Arc::new(RwLock::new(ClientState::Idle)),
            snapshot: Arc::new(RwLock::new(None)),
            event_tx,
            event_rx: Some(event_rx),
            socket: Arc::new(RwLock::new(None)),
            shutdown_tx: Arc::new(RwLock::new(None)),
        }
    }

    /// Take the event receiver (can only be called once)
    pub fn take_event_receiver(&mut self) -> Option<mpsc::Receiver<ClientEvent>> {
        self.event_rx.take()
    }

    /// The receive socket path as it goes on the wire
    fn wire_path(&self) -> ClientResult<String> {
        self.config
            .receive_socket
            .to_str()
            .map(str::to_owned)
            .ok_or_else(|| ClientError::ReceivePathNotUtf8(self.config.receive_socket.clone()))
    }

    /// Bind the receive endpoint, subscribe, and spawn the receive loop
    pub async fn start(&self) -> ClientResult<()> {
        {
            let state = self.state.read().await;
            if *state != ClientState::Idle {
                return Err(ClientError::AlreadyStarted);
            }
        }

        let wire_path = self.wire_path()?;

        // A stale socket file from a previous run blocks the bind
        if self.config.receive_socket.exists() {
            std::fs::remove_file(&self.config.receive_socket)?;
        }

        let socket = Arc::new(UnixDatagram::bind(&self.config.receive_socket)?);

        tracing::info!(
            "Listening on {}, daemon at {}",
            self.config.receive_socket.display(),
            self.config.daemon_socket.display()
        );

        {
            let mut s = self.socket.write().await;
            *s = Some(socket.clone());
        }

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        {
            let mut st = self.shutdown_tx.write().await;
            *st = Some(shutdown_tx);
        }

        self.send(&Command::subscribe(wire_path)).await?;

        {
            let mut state = self.state.write().await;
            *state = ClientState::Subscribed;
        }

        // Spawn the receive loop
        let loop_socket = socket;
        let snapshot = self.snapshot.clone();
        let event_tx = self.event_tx.clone();
        let receive_path = self.config.receive_socket.clone();

        tokio::spawn(async move {
            let mut buf = vec![0u8; RECV_BUFFER_BYTES];

            loop {
                tokio::select! {
                    result = loop_socket.recv_from(&mut buf) => {
                        match result {
                            Ok((n, _)) => {
                                Self::handle_datagram(&buf[..n], &snapshot, &event_tx).await;
                            }
                            Err(e) => {
                                tracing::error!("Receive endpoint failed: {}", e);
                                break;
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }

            let _ = std::fs::remove_file(&receive_path);
            tracing::info!("Receive loop stopped");
        });

        Ok(())
    }

    /// Decode one inbound datagram and publish the result.
    ///
    /// Decode failures are reported but never touch the held snapshot.
    async fn handle_datagram(
        datagram: &[u8],
        snapshot: &Arc<RwLock<Option<Snapshot>>>,
        event_tx: &mpsc::Sender<ClientEvent>,
    ) {
        match protocol::decode_collection(datagram) {
            Ok(collection) => {
                tracing::debug!(
                    "Snapshot update: {} nodes, version {}, payload type {}",
                    collection.nodes.len(),
                    collection.version_id,
                    collection.payload_type
                );

                {
                    let mut snap = snapshot.write().await;
                    *snap = Some(Snapshot {
                        collection: collection.clone(),
                        received_at: SystemTime::now(),
                    });
                }

                let _ = event_tx
                    .send(ClientEvent::SnapshotUpdated { collection })
                    .await;
            }
            Err(e) => {
                tracing::warn!("Dropping undecodable datagram ({} bytes): {}", datagram.len(), e);
                let _ = event_tx
                    .send(ClientEvent::DecodeFailed {
                        message: e.to_string(),
                    })
                    .await;
            }
        }
    }

    /// Encode and send a command to the daemon.
    ///
    /// Encode errors surface here synchronously; nothing is sent for a
    /// command that fails to encode.
    pub async fn send(&self, command: &Command) -> ClientResult<()> {
        let mut buf = BytesMut::new();
        protocol::encode_command(command, &mut buf)?;

        let socket = self.socket.read().await;
        let socket = socket.as_ref().ok_or(ClientError::NotStarted)?;
        socket.send_to(&buf, &self.config.daemon_socket).await?;

        Ok(())
    }

    /// Update the daemon's position
    pub async fn set_location(&self, lat: f64, lon: f64) -> ClientResult<()> {
        self.send(&Command::set_position(lat, lon)).await
    }

    /// Update the daemon's coordination range
    pub async fn set_coordination_range(&self, range: u16) -> ClientResult<()> {
        self.send(&Command::set_coordination_range(range)).await
    }

    /// Re-send the subscription for this client's receive path.
    ///
    /// The daemon expires subscribers on its own schedule; callers that need
    /// a long-lived feed drive this periodically.
    pub async fn subscribe(&self) -> ClientResult<()> {
        let wire_path = self.wire_path()?;
        self.send(&Command::subscribe(wire_path)).await?;

        let mut state = self.state.write().await;
        *state = ClientState::Subscribed;
        Ok(())
    }

    /// Ask the daemon to stop pushing updates.
    ///
    /// The endpoint stays open and late datagrams are still processed; only
    /// shutdown closes the channel.
    pub async fn unsubscribe(&self) -> ClientResult<()> {
        let wire_path = self.wire_path()?;
        self.send(&Command::unsubscribe(wire_path)).await?;

        let mut state = self.state.write().await;
        *state = ClientState::Unsubscribed;
        Ok(())
    }

    /// Stop the receive loop and release the endpoint
    pub async fn shutdown(&self) {
        if let Some(tx) = self.shutdown_tx.write().await.take() {
            let _ = tx.send(()).await;
        }

        let mut socket = self.socket.write().await;
        *socket = None;
    }

    /// Get the current state
    pub async fn state(&self) -> ClientState {
        *self.state.read().await
    }

    /// Get the latest snapshot (if any datagram decoded so far)
    pub async fn snapshot(&self) -> Option<Snapshot> {
        self.snapshot.read().await.clone()
    }

    /// Check if the subscription is active
    pub async fn is_subscribed(&self) -> bool {
        *self.state.read().await == ClientState::Subscribed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{decode_command, encode_collection, Node, NodeCollection};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::time::timeout;

    struct Harness {
        _dir: TempDir,
        daemon: UnixDatagram,
        client: SubscriptionClient,
        events: mpsc::Receiver<ClientEvent>,
        receive_path: PathBuf,
    }

    /// Bind a fake daemon socket and build a client pointed at it
    fn harness() -> Harness {
        let dir = TempDir::new().unwrap();
        let daemon_path = dir.path().join("daemon.sock");
        let receive_path = dir.path().join("client.sock");

        let daemon = UnixDatagram::bind(&daemon_path).unwrap();
        let mut client = SubscriptionClient::new(IpcConfig::new(&daemon_path, &receive_path));
        let events = client.take_event_receiver().unwrap();

        Harness {
            _dir: dir,
            daemon,
            client,
            events,
            receive_path,
        }
    }

    async fn recv_command(daemon: &UnixDatagram) -> Command {
        let mut buf = vec![0u8; 1024];
        let (n, _) = timeout(Duration::from_secs(5), daemon.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        decode_command(&buf[..n]).unwrap()
    }

    fn sample_collection() -> NodeCollection {
        NodeCollection::new(
            1,
            2,
            vec![
                Node::new(123, 45.45, 23.34, 12, "127.0.0.1", 12345, "128.0.0.1", 54321, 456789),
                Node::new(321, 54.45, 11.98, 10, "128.0.0.1", 12345, "127.0.0.1", 36412, 985446),
            ],
        )
    }

    #[tokio::test]
    async fn test_client_creation() {
        let h = harness();
        assert_eq!(h.client.state().await, ClientState::Idle);
        assert!(h.client.snapshot().await.is_none());
    }

    #[tokio::test]
    async fn test_start_subscribes_and_receives_snapshot() {
        let mut h = harness();
        h.client.start().await.unwrap();
        assert_eq!(h.client.state().await, ClientState::Subscribed);

        // The daemon sees exactly our receive path in the subscribe payload
        let subscribe = recv_command(&h.daemon).await;
        assert_eq!(
            subscribe,
            Command::subscribe(h.receive_path.to_str().unwrap())
        );

        // Push one collection and expect exactly one event, nodes in order
        let collection = sample_collection();
        let mut buf = BytesMut::new();
        encode_collection(&collection, &mut buf).unwrap();
        h.daemon.send_to(&buf, &h.receive_path).await.unwrap();

        let event = timeout(Duration::from_secs(5), h.events.recv())
            .await
            .unwrap()
            .unwrap();
        match event {
            ClientEvent::SnapshotUpdated { collection: got } => {
                assert_eq!(got, collection);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(h.events.try_recv().is_err());

        let snapshot = h.client.snapshot().await.unwrap();
        assert_eq!(snapshot.collection, collection);

        h.client.shutdown().await;
    }

    #[tokio::test]
    async fn test_malformed_datagram_keeps_previous_snapshot() {
        let mut h = harness();
        h.client.start().await.unwrap();
        let _ = recv_command(&h.daemon).await;

        let collection = sample_collection();
        let mut buf = BytesMut::new();
        encode_collection(&collection, &mut buf).unwrap();
        h.daemon.send_to(&buf, &h.receive_path).await.unwrap();

        match timeout(Duration::from_secs(5), h.events.recv()).await.unwrap().unwrap() {
            ClientEvent::SnapshotUpdated { .. } => {}
            other => panic!("unexpected event: {:?}", other),
        }

        // Truncated inside the second record
        h.daemon
            .send_to(&buf[..buf.len() - 10], &h.receive_path)
            .await
            .unwrap();

        match timeout(Duration::from_secs(5), h.events.recv()).await.unwrap().unwrap() {
            ClientEvent::DecodeFailed { .. } => {}
            other => panic!("unexpected event: {:?}", other),
        }

        let snapshot = h.client.snapshot().await.unwrap();
        assert_eq!(snapshot.collection, collection);

        h.client.shutdown().await;
    }

    #[tokio::test]
    async fn test_unsubscribed_client_still_processes_datagrams() {
        let mut h = harness();
        h.client.start().await.unwrap();
        let _ = recv_command(&h.daemon).await;

        h.client.unsubscribe().await.unwrap();
        assert_eq!(h.client.state().await, ClientState::Unsubscribed);
        let unsubscribe = recv_command(&h.daemon).await;
        assert_eq!(
            unsubscribe,
            Command::unsubscribe(h.receive_path.to_str().unwrap())
        );

        // The daemon may keep pushing; late datagrams still update the snapshot
        let collection = sample_collection();
        let mut buf = BytesMut::new();
        encode_collection(&collection, &mut buf).unwrap();
        h.daemon.send_to(&buf, &h.receive_path).await.unwrap();

        match timeout(Duration::from_secs(5), h.events.recv()).await.unwrap().unwrap() {
            ClientEvent::SnapshotUpdated { collection: got } => assert_eq!(got, collection),
            other => panic!("unexpected event: {:?}", other),
        }

        // Resubscribing re-enters the subscribed state
        h.client.subscribe().await.unwrap();
        assert!(h.client.is_subscribed().await);

        h.client.shutdown().await;
    }

    #[tokio::test]
    async fn test_commands_require_start() {
        let h = harness();
        let err = h.client.set_location(45.45, 23.34).await.unwrap_err();
        assert!(matches!(err, ClientError::NotStarted));
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let h = harness();
        h.client.start().await.unwrap();
        let err = h.client.start().await.unwrap_err();
        assert!(matches!(err, ClientError::AlreadyStarted));
        h.client.shutdown().await;
    }

    #[tokio::test]
    async fn test_stale_receive_socket_is_replaced() {
        let h = harness();
        std::fs::write(&h.receive_path, b"stale").unwrap();

        h.client.start().await.unwrap();
        assert_eq!(h.client.state().await, ClientState::Subscribed);
        h.client.shutdown().await;
    }

    #[tokio::test]
    async fn test_position_and_range_commands_reach_daemon() {
        let h = harness();
        h.client.start().await.unwrap();
        let _ = recv_command(&h.daemon).await;

        h.client.set_location(11.43, 67.65).await.unwrap();
        assert_eq!(
            recv_command(&h.daemon).await,
            Command::set_position(11.43, 67.65)
        );

        h.client.set_coordination_range(23).await.unwrap();
        assert_eq!(
            recv_command(&h.daemon).await,
            Command::set_coordination_range(23)
        );

        h.client.shutdown().await;
    }
}
