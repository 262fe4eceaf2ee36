//! # Lattice Core
//!
//! Wire protocol for the Lattice connectivity layer.
//!
//! This crate provides:
//! - The nested tag/length/value frame codec used by every message
//! - The packet taxonomy: network bootstrap and relay packets, channel
//!   handshake packets, reliable-datagram headers, persisted cache entries
//! - The encrypted channel handshake and a channel manager implementing the
//!   upstream send/receive contract
//! - An explicit second/minute scheduler for periodic maintenance
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      ChannelManager                              │
//! │   (sessions by peer, reliable send queues, handshake timers)    │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                         Packets                                  │
//! │   (Network / Channel / Datagram / cached entries)               │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                         Frames                                   │
//! │   (tag, control byte, varint length, payload, children)         │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod channel;
pub mod error;
pub mod frame;
pub mod packet;
pub mod scheduler;

pub use channel::{
    ChannelConfig, ChannelManager, ChannelSession, DatagramSink, Delivery, KeyExchange,
    ReceiveHandler, SessionState, TickReport,
};
pub use error::{ChannelError, Error, FrameError, PacketError};
pub use frame::{Frame, FrameView, FrameWriter};
pub use packet::{ContactInfo, DhtSource, FirewallState, PeerAddress, RootTag};
pub use scheduler::{Scheduler, Ticks};

/// Protocol version advertised in `Syn` datagrams
pub const PROTOCOL_VERSION: u16 = 1;

/// Software version reported in crawl replies
pub const SOFTWARE_VERSION: &str = env!("CARGO_PKG_VERSION");
