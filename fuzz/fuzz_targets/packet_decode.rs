//! Fuzz target for packet decoding
//!
//! Every root packet type and the inspector must reject bad input without panicking.

#![no_main]

use lattice_core::packet::cache::{CachedContact, CachedWebCache};
use lattice_core::packet::channel::ChannelFrame;
use lattice_core::packet::datagram::DatagramPacket;
use lattice_core::packet::inspect::describe;
use lattice_core::packet::network::NetworkPacket;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(packet) = NetworkPacket::decode(data) {
        let _ = packet.message();
    }
    let _ = ChannelFrame::decode(data);
    let _ = DatagramPacket::decode(data);

    if let Ok(contact) = CachedContact::decode(data) {
        assert_eq!(CachedContact::decode(&contact.encode()).ok(), Some(contact));
    }
    let _ = CachedWebCache::decode(data);

    let _ = describe(data);
});
