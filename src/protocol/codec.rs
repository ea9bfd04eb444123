//! Protocol codec for encoding/decoding messages
//!
//! Handles packing of outbound commands and unpacking of inbound node
//! collections. All multi-byte fields are big-endian. Every message maps to
//! exactly one datagram, so no streaming state is kept here.

use bytes::{Buf, BufMut, BytesMut};
use std::net::Ipv4Addr;
use thiserror::Error;

use super::{
    Command, Node, NodeCollection, COLLECTION_HEADER_SIZE, MAX_SOCKET_PATH_BYTES, NODE_PACKED_SIZE,
};

/// Codec errors
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("collection declares {declared} node records but {available} bytes follow the header")]
    MalformedCollection { declared: usize, available: usize },

    #[error("unknown message type: {0:#04x}")]
    UnknownMessageType(u8),

    #[error("not a dotted-quad IPv4 address: {0:?}")]
    AddressFormat(String),

    #[error("socket path is {len} bytes (max: {MAX_SOCKET_PATH_BYTES})")]
    OversizedPayload { len: usize },

    #[error("message type 2 (set position and range) is deprecated and unsupported")]
    UnsupportedOperation,

    #[error("collection holds {0} nodes, more than the count field can carry")]
    CollectionTooLarge(usize),

    #[error("socket path is not valid UTF-8")]
    PathNotUtf8(#[from] std::string::FromUtf8Error),
}

fn ip_to_bits(addr: &str) -> Result<u32, CodecError> {
    addr.parse::<Ipv4Addr>()
        .map(u32::from)
        .map_err(|_| CodecError::AddressFormat(addr.to_string()))
}

fn bits_to_ip(bits: u32) -> String {
    Ipv4Addr::from(bits).to_string()
}

/// Encode a single node record into the buffer.
///
/// Appends exactly [`NODE_PACKED_SIZE`] bytes on success. Address strings
/// that fail to parse abort the encode; nothing is silently zeroed.
pub fn encode_node(node: &Node, buf: &mut BytesMut) -> Result<(), CodecError> {
    let ip = ip_to_bits(&node.ip)?;
    let radac_ip = ip_to_bits(&node.radac_ip)?;

    buf.reserve(NODE_PACKED_SIZE);
    buf.put_u32(node.node_id);
    buf.put_f64(node.lat);
    buf.put_f64(node.lon);
    buf.put_u16(node.coord_range);
    buf.put_u32(ip);
    buf.put_u16(node.port);
    buf.put_u32(radac_ip);
    buf.put_u16(node.radac_port);
    buf.put_u32(node.timestamp);

    Ok(())
}

/// Decode a single node record from an exactly 38-byte buffer
pub fn decode_node(buf: &[u8]) -> Result<Node, CodecError> {
    if buf.len() != NODE_PACKED_SIZE {
        return Err(CodecError::SizeMismatch {
            expected: NODE_PACKED_SIZE,
            actual: buf.len(),
        });
    }

    let mut buf = buf;
    let node_id = buf.get_u32();
    let lat = buf.get_f64();
    let lon = buf.get_f64();
    let coord_range = buf.get_u16();
    let ip = bits_to_ip(buf.get_u32());
    let port = buf.get_u16();
    let radac_ip = bits_to_ip(buf.get_u32());
    let radac_port = buf.get_u16();
    let timestamp = buf.get_u32();

    Ok(Node {
        node_id,
        lat,
        lon,
        coord_range,
        ip,
        port,
        radac_ip,
        radac_port,
        timestamp,
    })
}

/// Encode a node collection into the buffer.
///
/// The node count field is derived from the sequence length, so header and
/// contents cannot disagree.
pub fn encode_collection(
    collection: &NodeCollection,
    buf: &mut BytesMut,
) -> Result<(), CodecError> {
    let count = collection.nodes.len();
    if count > u16::MAX as usize {
        return Err(CodecError::CollectionTooLarge(count));
    }

    buf.reserve(collection.encoded_len());
    buf.put_u16(collection.version_id);
    buf.put_u8(collection.payload_type);
    buf.put_u16(count as u16);

    for node in &collection.nodes {
        encode_node(node, buf)?;
    }

    Ok(())
}

/// Decode a node collection from a complete datagram.
///
/// The buffer must hold exactly the declared number of records: a short
/// buffer never yields a partial node list, and trailing bytes are rejected.
pub fn decode_collection(buf: &[u8]) -> Result<NodeCollection, CodecError> {
    if buf.len() < COLLECTION_HEADER_SIZE {
        return Err(CodecError::SizeMismatch {
            expected: COLLECTION_HEADER_SIZE,
            actual: buf.len(),
        });
    }

    let mut header = &buf[..COLLECTION_HEADER_SIZE];
    let version_id = header.get_u16();
    let payload_type = header.get_u8();
    let node_count = header.get_u16() as usize;

    let body = &buf[COLLECTION_HEADER_SIZE..];
    if body.len() != node_count * NODE_PACKED_SIZE {
        return Err(CodecError::MalformedCollection {
            declared: node_count,
            available: body.len(),
        });
    }

    let mut nodes = Vec::with_capacity(node_count);
    for record in body.chunks_exact(NODE_PACKED_SIZE) {
        nodes.push(decode_node(record)?);
    }

    Ok(NodeCollection {
        version_id,
        payload_type,
        nodes,
    })
}

/// Encode a command into the buffer.
///
/// Subscribe/Unsubscribe paths carry no length prefix; the datagram boundary
/// delimits them on the receiving side. Paths over the 512-byte budget are
/// rejected rather than truncated, and the deprecated combined update is
/// refused outright instead of producing an empty-payload datagram.
pub fn encode_command(command: &Command, buf: &mut BytesMut) -> Result<(), CodecError> {
    match command {
        Command::SetPosition { lat, lon } => {
            buf.put_u8(command.type_id());
            buf.put_f64(*lat);
            buf.put_f64(*lon);
        }
        Command::SetCoordinationRange { range } => {
            buf.put_u8(command.type_id());
            buf.put_u16(*range);
        }
        Command::SetPositionAndRange => {
            return Err(CodecError::UnsupportedOperation);
        }
        Command::Subscribe { path } | Command::Unsubscribe { path } => {
            let len = path.len();
            if len > MAX_SOCKET_PATH_BYTES {
                return Err(CodecError::OversizedPayload { len });
            }
            buf.put_u8(command.type_id());
            buf.put_slice(path.as_bytes());
        }
    }

    Ok(())
}

/// Decode a command from a complete datagram.
///
/// The daemon never sends commands back; this path exists for diagnostics
/// and for verifying outbound traffic in tests.
pub fn decode_command(buf: &[u8]) -> Result<Command, CodecError> {
    if buf.is_empty() {
        return Err(CodecError::SizeMismatch {
            expected: 1,
            actual: 0,
        });
    }

    let tag = buf[0];
    let mut payload = &buf[1..];

    match tag {
        0 => {
            if payload.len() != 16 {
                return Err(CodecError::SizeMismatch {
                    expected: 16,
                    actual: payload.len(),
                });
            }
            let lat = payload.get_f64();
            let lon = payload.get_f64();
            Ok(Command::SetPosition { lat, lon })
        }
        1 => {
            if payload.len() != 2 {
                return Err(CodecError::SizeMismatch {
                    expected: 2,
                    actual: payload.len(),
                });
            }
            Ok(Command::SetCoordinationRange {
                range: payload.get_u16(),
            })
        }
        2 => Err(CodecError::UnsupportedOperation),
        3 => Ok(Command::Subscribe {
            path: String::from_utf8(payload.to_vec())?,
        }),
        4 => Ok(Command::Unsubscribe {
            path: String::from_utf8(payload.to_vec())?,
        }),
        other => Err(CodecError::UnknownMessageType(other)),
    }
}
