//! Protocol message definitions
//!
//! Defines the node records pushed by the ranging daemon and the command
//! messages sent to it.

/// Payload type discriminators carried in a NodeCollection header.
///
/// The daemon uses these to mark what a collection contains; the client
/// treats the value as opaque and passes it through unchanged.
pub mod payload_types {
    pub const RND_NOREQ: u8 = 0;
    pub const RND_REQ: u8 = 1;
    pub const IMP_NOREQ: u8 = 2;
    pub const IMP_REQ: u8 = 3;
    pub const INTERNAL: u8 = 4;
}

/// One candidate peer as tracked by the ranging daemon
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Node identifier
    pub node_id: u32,
    /// Latitudinal coordinate of node position
    pub lat: f64,
    /// Longitudinal coordinate of node position
    pub lon: f64,
    /// Coordination range in metres
    pub coord_range: u16,
    /// Primary control address, dotted-quad form
    pub ip: String,
    /// Primary control port
    pub port: u16,
    /// Address of the associated RADAC instance
    pub radac_ip: String,
    /// Port of the associated RADAC instance
    pub radac_port: u16,
    /// Creation time, daemon epoch
    pub timestamp: u32,
}

impl Node {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        node_id: u32,
        lat: f64,
        lon: f64,
        coord_range: u16,
        ip: impl Into<String>,
        port: u16,
        radac_ip: impl Into<String>,
        radac_port: u16,
        timestamp: u32,
    ) -> Self {
        Self {
            node_id,
            lat,
            lon,
            coord_range,
            ip: ip.into(),
            port,
            radac_ip: radac_ip.into(),
            radac_port,
            timestamp,
        }
    }
}

/// A versioned batch of candidate nodes, in wire order.
///
/// The on-wire node count is always derived from `nodes.len()`; holding the
/// count in a separate field would let the two drift apart.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeCollection {
    /// Protocol/program version that generated the collection
    pub version_id: u16,
    /// Opaque payload discriminator, see [`payload_types`]
    pub payload_type: u8,
    /// Node records in the order they appeared on the wire
    pub nodes: Vec<Node>,
}

impl NodeCollection {
    pub fn new(version_id: u16, payload_type: u8, nodes: Vec<Node>) -> Self {
        Self {
            version_id,
            payload_type,
            nodes,
        }
    }

    /// Size of the packed representation in bytes
    pub fn encoded_len(&self) -> usize {
        super::COLLECTION_HEADER_SIZE + super::NODE_PACKED_SIZE * self.nodes.len()
    }
}

/// Control commands understood by the ranging daemon
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Update the daemon's own position
    SetPosition { lat: f64, lon: f64 },

    /// Update the daemon's coordination range
    SetCoordinationRange { range: u16 },

    /// Combined position/range update. Deprecated in the daemon; encoding
    /// it is refused rather than producing an empty-payload datagram.
    SetPositionAndRange,

    /// Subscribe the given socket path to candidate-node updates
    Subscribe { path: String },

    /// Remove the given socket path from the subscriber list
    Unsubscribe { path: String },
}

impl Command {
    /// Get the wire type identifier
    pub fn type_id(&self) -> u8 {
        match self {
            Command::SetPosition { .. } => 0,
            Command::SetCoordinationRange { .. } => 1,
            Command::SetPositionAndRange => 2,
            Command::Subscribe { .. } => 3,
            Command::Unsubscribe { .. } => 4,
        }
    }

    pub fn set_position(lat: f64, lon: f64) -> Self {
        Command::SetPosition { lat, lon }
    }

    pub fn set_coordination_range(range: u16) -> Self {
        Command::SetCoordinationRange { range }
    }

    pub fn subscribe(path: impl Into<String>) -> Self {
        Command::Subscribe { path: path.into() }
    }

    pub fn unsubscribe(path: impl Into<String>) -> Self {
        Command::Unsubscribe { path: path.into() }
    }
}
