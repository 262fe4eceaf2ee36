//! Property-based tests for Lattice
//!
//! Uses proptest to check codec and bookkeeping invariants over large input spaces.

use proptest::prelude::*;

// ============================================================================
// Frame codec
// ============================================================================

mod frame_properties {
    use super::*;
    use lattice_core::frame::{Frame, FrameView, read_varint, write_varint};

    fn frame_tree() -> impl Strategy<Value = Frame> {
        let leaf = (any::<u8>(), prop::option::of(prop::collection::vec(any::<u8>(), 0..64)))
            .prop_map(|(tag, payload)| match payload {
                Some(payload) => Frame::leaf(tag, payload),
                None => Frame::new(tag),
            });

        leaf.prop_recursive(4, 64, 6, |inner| {
            (
                any::<u8>(),
                prop::option::of(prop::collection::vec(any::<u8>(), 0..32)),
                prop::collection::vec(inner, 0..6),
            )
                .prop_map(|(tag, payload, children)| {
                    let mut frame = match payload {
                        Some(payload) => Frame::leaf(tag, payload),
                        None => Frame::new(tag),
                    };
                    for child in children {
                        frame.push_child(child);
                    }
                    frame
                })
        })
    }

    proptest! {
        /// Any tree decodes back to itself
        #[test]
        fn test_frame_tree_round_trip(frame in frame_tree()) {
            let bytes = frame.encode();
            prop_assert_eq!(bytes.len(), frame.encoded_len());
            prop_assert_eq!(Frame::decode(&bytes).unwrap(), frame);
        }

        /// Concatenated frames split back apart at the right boundary
        #[test]
        fn test_parse_prefix_leaves_rest(first in frame_tree(), second in frame_tree()) {
            let mut bytes = first.encode();
            let boundary = bytes.len();
            second.encode_into(&mut bytes);

            let (view, rest) = FrameView::parse_prefix(&bytes).unwrap();
            prop_assert_eq!(view.to_frame().unwrap(), first);
            prop_assert_eq!(rest, &bytes[boundary..]);
        }

        /// Truncated input is an error, never a panic
        #[test]
        fn test_truncated_frame_rejected(frame in frame_tree(), cut in any::<prop::sample::Index>()) {
            let bytes = frame.encode();
            let cut = cut.index(bytes.len());
            prop_assert!(Frame::decode(&bytes[..cut]).is_err());
        }

        /// Mutated input may decode or fail, but never panics
        #[test]
        fn test_mutated_frame_never_panics(
            frame in frame_tree(),
            position in any::<prop::sample::Index>(),
            value in any::<u8>(),
        ) {
            let mut bytes = frame.encode();
            let position = position.index(bytes.len());
            bytes[position] = value;
            let _ = Frame::decode(&bytes);
            let _ = FrameView::parse_prefix(&bytes);
        }

        #[test]
        fn test_varint_round_trip(value in any::<u64>()) {
            let mut out = Vec::new();
            write_varint(&mut out, value);
            prop_assert_eq!(read_varint(&out).unwrap(), (value, out.len()));
        }
    }
}

// ============================================================================
// Packet taxonomy
// ============================================================================

mod packet_properties {
    use super::*;
    use lattice_core::packet::inspect::describe;
    use lattice_core::packet::network::{NetworkMessage, NetworkPacket, Ping, StoreRequest};
    use lattice_core::{DhtSource, FirewallState};
    use std::net::Ipv4Addr;

    fn firewall() -> impl Strategy<Value = FirewallState> {
        prop_oneof![
            Just(FirewallState::Open),
            Just(FirewallState::Nat),
            Just(FirewallState::Blocked),
        ]
    }

    fn dht_source() -> impl Strategy<Value = DhtSource> {
        (any::<u64>(), any::<u16>(), any::<u16>(), any::<u16>(), firewall()).prop_map(
            |(peer_id, client_id, tcp_port, udp_port, firewall)| DhtSource {
                peer_id,
                client_id,
                tcp_port,
                udp_port,
                firewall,
            },
        )
    }

    fn message() -> impl Strategy<Value = NetworkMessage> {
        let ping = (dht_source(), prop::option::of(any::<u32>())).prop_map(|(source, ip)| {
            NetworkMessage::Ping(Ping {
                source,
                remote_ip: ip.map(Ipv4Addr::from),
            })
        });
        let store = (
            dht_source(),
            any::<u64>(),
            any::<u16>(),
            prop::collection::vec(any::<u8>(), 0..128),
            any::<u16>(),
        )
            .prop_map(|(source, key, component, value, ttl)| {
                NetworkMessage::StoreRequest(StoreRequest {
                    source,
                    key,
                    component,
                    value,
                    ttl,
                })
            });
        prop_oneof![ping, store]
    }

    proptest! {
        /// Messages survive the envelope and can always be described
        #[test]
        fn test_message_survives_envelope(source_id in any::<u64>(), message in message()) {
            let bytes = NetworkPacket::wrap(source_id, &message).encode();
            let packet = NetworkPacket::decode(&bytes).unwrap();
            prop_assert_eq!(packet.source_id, source_id);
            prop_assert_eq!(packet.message().unwrap(), message);
            prop_assert!(describe(&bytes).is_ok());
        }

        /// Arbitrary bytes never panic the packet decoders
        #[test]
        fn test_packet_decode_never_panics(data in prop::collection::vec(any::<u8>(), 0..256)) {
            if let Ok(packet) = NetworkPacket::decode(&data) {
                let _ = packet.message();
            }
            let _ = NetworkMessage::decode(&data);
            let _ = describe(&data);
        }
    }
}

// ============================================================================
// Bootstrap bookkeeping
// ============================================================================

mod bootstrap_properties {
    use super::*;
    use lattice_core::{ContactInfo, FirewallState, PeerAddress};
    use lattice_discovery::retry::{RETRY_INTERVALS_MINUTES, RetrySchedule};
    use lattice_discovery::{BootstrapConfig, Bootstrapper, LocalEndpoint, Timestamp};
    use std::net::Ipv4Addr;

    fn contact(peer_id: u64, port: u16) -> ContactInfo {
        ContactInfo {
            address: PeerAddress {
                peer_id,
                ip: Ipv4Addr::new(10, 0, (peer_id >> 8) as u8, peer_id as u8),
                udp_port: port,
            },
            tcp_port: port,
            client_id: 0,
        }
    }

    proptest! {
        /// The contact cache never grows past its capacity and keeps the newest
        #[test]
        fn test_contact_cache_bounded(
            capacity in 1usize..16,
            packets in prop::collection::vec((0u64..64, 1u16..4, 0i64..10_000), 1..200),
        ) {
            let config = BootstrapConfig {
                max_contacts: capacity,
                ..BootstrapConfig::default()
            };
            let local = LocalEndpoint {
                peer_id: 1_000,
                ip: Ipv4Addr::new(192, 168, 0, 1),
                tcp_port: 6881,
                udp_port: 6881,
            };
            let mut boot = Bootstrapper::new(config, local, Timestamp::from_millis(0)).unwrap();

            let mut at = 0;
            let mut last = None;
            for (peer_id, port, gap) in packets {
                at += gap;
                let info = contact(peer_id, port);
                boot.on_packet(info, FirewallState::Open, Timestamp::from_millis(at));
                prop_assert!(boot.contacts().len() <= capacity);
                last = Some(info.address);
            }
            let first = boot.contacts().iter().next().unwrap();
            prop_assert_eq!(Some(first.info.address), last);
            prop_assert_eq!(first.last_seen, Timestamp::from_millis(at));
        }

        /// Steps never go backwards and never pass the last interval
        #[test]
        fn test_retry_step_monotone(gaps in prop::collection::vec(0i64..40 * 60_000, 1..100)) {
            let mut now = 1_000_000i64;
            let mut retry = RetrySchedule::new(Timestamp::from_millis(now));
            let mut previous = retry.step();
            for gap in gaps {
                now += gap;
                retry.advance(Timestamp::from_millis(now));
                prop_assert!(retry.step() >= previous);
                prop_assert!(retry.step() <= previous + 1);
                prop_assert!(retry.step() < RETRY_INTERVALS_MINUTES.len());
                previous = retry.step();
            }
        }
    }
}

// ============================================================================
// Web cache cipher
// ============================================================================

mod webcache_properties {
    use super::*;
    use lattice_crypto::webcache::WebCacheCipher;

    proptest! {
        #[test]
        fn test_cipher_round_trip(
            key in prop::array::uniform32(any::<u8>()),
            text in "[a-zA-Z0-9:=&./ -]{0,200}",
        ) {
            let cipher = WebCacheCipher::new(&key).unwrap();
            let wire = cipher.encrypt_request(&text).unwrap();
            prop_assert_eq!(cipher.decrypt_response(&wire).unwrap(), text);
        }
    }
}
