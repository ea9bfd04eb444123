//! Network module - Handles the Unix datagram channel to the ranging daemon
//!
//! Provides:
//! - Subscription client for receiving candidate-node snapshots
//! - One-shot command sends for driving a daemon without subscribing

mod client;

pub use client::*;

use std::path::{Path, PathBuf};

use crate::protocol::DEFAULT_DAEMON_SOCKET;

/// Configuration for the IPC channel
#[derive(Debug, Clone)]
pub struct IpcConfig {
    /// Well-known control socket of the ranging daemon
    pub daemon_socket: PathBuf,
    /// Private address this client binds for inbound snapshots
    pub receive_socket: PathBuf,
    /// Depth of the client event channel
    pub event_capacity: usize,
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            daemon_socket: PathBuf::from(DEFAULT_DAEMON_SOCKET),
            receive_socket: PathBuf::from("/tmp/dprd-ipc.sock"),
            event_capacity: 256,
        }
    }
}

impl IpcConfig {
    pub fn new(daemon_socket: impl Into<PathBuf>, receive_socket: impl Into<PathBuf>) -> Self {
        Self {
            daemon_socket: daemon_socket.into(),
            receive_socket: receive_socket.into(),
            ..Default::default()
        }
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }
}

/// Send a single command datagram from an unbound socket.
///
/// Used by callers that only want to drive the daemon (position or range
/// updates) without holding a subscription endpoint open.
pub async fn send_oneshot(
    daemon_socket: &Path,
    command: &crate::protocol::Command,
) -> Result<(), ClientError> {
    use bytes::BytesMut;
    use tokio::net::UnixDatagram;

    let mut buf = BytesMut::new();
    crate::protocol::encode_command(command, &mut buf)?;

    let socket = UnixDatagram::unbound()?;
    socket.send_to(&buf, daemon_socket).await?;

    tracing::debug!("Sent {} byte command to {}", buf.len(), daemon_socket.display());
    Ok(())
}
