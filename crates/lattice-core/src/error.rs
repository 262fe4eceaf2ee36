//! Error types for the Lattice core protocol.

use thiserror::Error;

/// Core protocol errors
#[derive(Debug, Error)]
pub enum Error {
    /// Frame parsing error
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Packet decoding error
    #[error("packet error: {0}")]
    Packet(#[from] PacketError),

    /// Channel error
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Cryptographic error
    #[error("crypto error: {0}")]
    Crypto(#[from] lattice_crypto::CryptoError),
}

/// Frame-level errors. Any of these means the input is malformed and
/// should be dropped.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// Buffer too short to hold the frame header
    #[error("frame too short: expected at least {expected}, got {actual}")]
    TooShort {
        /// Expected minimum size
        expected: usize,
        /// Actual size received
        actual: usize,
    },

    /// Control byte has reserved bits set
    #[error("reserved control bits set: 0x{0:02X}")]
    ReservedFlags(u8),

    /// Varint longer than 10 bytes or overflowing u64
    #[error("length varint overflow")]
    VarintOverflow,

    /// Declared body length exceeds the remaining buffer
    #[error("declared length {declared} exceeds available {available}")]
    LengthOverflow {
        /// Length claimed by the header
        declared: u64,
        /// Bytes actually available
        available: usize,
    },

    /// Payload length exceeds the frame body
    #[error("payload length exceeds frame body")]
    PayloadOverflow,

    /// Children flag disagrees with the children region
    #[error("children flag does not match body")]
    ChildrenMismatch,

    /// Bytes left over after a complete top-level frame
    #[error("{0} trailing bytes after frame")]
    TrailingBytes(usize),

    /// Nesting deeper than the decoder allows
    #[error("frame nesting exceeds depth {0}")]
    TooDeep(usize),
}

/// Packet-level errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    /// Underlying frame is malformed
    #[error("malformed frame: {0}")]
    Malformed(#[from] FrameError),

    /// Root tag does not belong to the expected taxonomy
    #[error("unexpected root tag 0x{0:02X}")]
    UnexpectedRoot(u8),

    /// Packet tag not known in this taxonomy
    #[error("unknown packet tag 0x{0:02X}")]
    UnknownTag(u8),

    /// Required field absent
    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

/// Channel handshake and session errors
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Handshake did not complete in time; retry through the bootstrap cache
    #[error("peer unreachable: {0:016x}")]
    PeerUnreachable(u64),

    /// Operation needs an established channel
    #[error("channel to {0:016x} not established")]
    NotEstablished(u64),

    /// Pending send queue is full
    #[error("send queue full for {0:016x}")]
    QueueFull(u64),

    /// No public key known for the peer
    #[error("no public key known for {0:016x}")]
    UnknownPeerKey(u64),

    /// Packet not valid in the current session state
    #[error("unexpected {packet} in state {state}")]
    UnexpectedPacket {
        /// Packet name
        packet: &'static str,
        /// Session state name
        state: &'static str,
    },

    /// State machine transition not allowed
    #[error("invalid session transition {from} -> {to}")]
    InvalidTransition {
        /// Current state name
        from: &'static str,
        /// Requested state name
        to: &'static str,
    },

    /// Requested cipher algorithm not supported
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Session has been closed
    #[error("session closed")]
    Closed,

    /// Packet decoding failed
    #[error("packet error: {0}")]
    Packet(#[from] PacketError),

    /// Cryptographic failure
    #[error("crypto error: {0}")]
    Crypto(#[from] lattice_crypto::CryptoError),
}
