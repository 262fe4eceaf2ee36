//! Two channel peers wired together in memory.
//!
//! # Example
//!
//! ```
//! use lattice_integration_tests::fixtures::TwoPeerFixture;
//!
//! let mut fixture = TwoPeerFixture::new(1, 2);
//! let now = fixture.now;
//! fixture.x.send(2, 7, b"hi".to_vec(), true, now).unwrap();
//! let (_, at_y) = fixture.pump();
//! assert_eq!(at_y[0].payload, b"hi");
//! ```

use lattice_core::{ChannelConfig, ChannelManager, Delivery};
use lattice_crypto::x25519::PrivateKey;
use rand_core::OsRng;
use std::time::Instant;

/// Outbox sink: `(destination, datagram)`
pub type Outbox = Vec<(u64, Vec<u8>)>;

/// A pair of channel managers that know each other's keys
pub struct TwoPeerFixture {
    /// First peer
    pub x: ChannelManager<Outbox>,
    /// Second peer
    pub y: ChannelManager<Outbox>,
    /// Clock shared by both peers
    pub now: Instant,
}

impl TwoPeerFixture {
    /// Peers with default channel settings
    pub fn new(x_id: u64, y_id: u64) -> Self {
        Self::with_config(x_id, y_id, ChannelConfig::default())
    }

    /// Peers sharing one channel configuration
    pub fn with_config(x_id: u64, y_id: u64, config: ChannelConfig) -> Self {
        let mut x = ChannelManager::new(
            x_id,
            PrivateKey::generate(&mut OsRng),
            config.clone(),
            Outbox::new(),
        );
        let mut y = ChannelManager::new(y_id, PrivateKey::generate(&mut OsRng), config, Outbox::new());
        x.add_peer_key(y_id, y.public_key());
        y.add_peer_key(x_id, x.public_key());

        Self {
            x,
            y,
            now: Instant::now(),
        }
    }

    /// Move datagrams both ways until both outboxes are empty. Returns the
    /// deliveries at `x` and at `y`.
    pub fn pump(&mut self) -> (Vec<Delivery>, Vec<Delivery>) {
        self.pump_filtered(|_, _| true)
    }

    /// Like [`TwoPeerFixture::pump`], but only datagrams for which
    /// `keep(sender, datagram)` holds are delivered
    pub fn pump_filtered(
        &mut self,
        mut keep: impl FnMut(u64, &[u8]) -> bool,
    ) -> (Vec<Delivery>, Vec<Delivery>) {
        let x_id = self.x.local_id();
        let y_id = self.y.local_id();
        let mut at_x = Vec::new();
        let mut at_y = Vec::new();

        loop {
            let from_x = std::mem::take(self.x.sink_mut());
            let from_y = std::mem::take(self.y.sink_mut());
            if from_x.is_empty() && from_y.is_empty() {
                break;
            }
            for (_, datagram) in from_x {
                if !keep(x_id, &datagram) {
                    continue;
                }
                if let Ok(deliveries) = self.y.handle_datagram(x_id, &datagram, self.now) {
                    at_y.extend(deliveries);
                }
            }
            for (_, datagram) in from_y {
                if !keep(y_id, &datagram) {
                    continue;
                }
                if let Ok(deliveries) = self.x.handle_datagram(y_id, &datagram, self.now) {
                    at_x.extend(deliveries);
                }
            }
        }

        (at_x, at_y)
    }
}
