//! Protocol module - Defines the wire protocol spoken over the p2p-dprd IPC socket
//!
//! Two message families share the channel:
//! - Outbound commands: 1 byte message type followed by a type-specific
//!   payload (big-endian)
//! - Inbound node collections: a 5 byte header followed by consecutive
//!   fixed-size 38-byte node records
//!
//! Datagram framing delimits messages; there is no length prefix.

mod message;
mod codec;

pub use message::*;
pub use codec::*;

/// Packed size of a single candidate-node record in bytes
pub const NODE_PACKED_SIZE: usize = 38;

/// NodeCollection header size: version_id(2) + payload_type(1) + node_count(2)
pub const COLLECTION_HEADER_SIZE: usize = 5;

/// Maximum byte length of a subscriber socket path in Subscribe/Unsubscribe
pub const MAX_SOCKET_PATH_BYTES: usize = 512;

/// Control socket path used by the stock daemon distribution
pub const DEFAULT_DAEMON_SOCKET: &str = "/tmp/p2p-dprd.sock";
