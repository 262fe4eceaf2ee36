//! Test fixtures: in-memory channel peers, a fake web cache, a DHT store.

pub mod two_node;
pub mod web_cache;

use lattice_core::packet::relay::DhtStore;
use std::collections::HashMap;
use std::time::Duration;

pub use two_node::TwoPeerFixture;
pub use web_cache::FakeWebCache;

/// In-memory [`DhtStore`] remembering the TTL each value arrived with
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: HashMap<(u64, u16), Vec<(Vec<u8>, u16)>>,
}

impl MemoryStore {
    /// TTLs seen for `key`
    pub fn ttls(&self, key: u64, component: u16) -> Vec<u16> {
        self.values
            .get(&(key, component))
            .map(|v| v.iter().map(|(_, ttl)| *ttl).collect())
            .unwrap_or_default()
    }
}

impl DhtStore for MemoryStore {
    fn lookup(&self, key: u64, component: u16) -> Vec<Vec<u8>> {
        self.values
            .get(&(key, component))
            .map(|v| v.iter().map(|(value, _)| value.clone()).collect())
            .unwrap_or_default()
    }

    fn store(&mut self, key: u64, component: u16, value: Vec<u8>, ttl: u16) {
        self.values
            .entry((key, component))
            .or_default()
            .push((value, ttl));
    }
}

/// Check if running in a CI environment
pub fn is_ci_environment() -> bool {
    std::env::var("CI").is_ok() || std::env::var("GITHUB_ACTIONS").is_ok()
}

/// Timeout stretched for slow CI machines
pub fn ci_timeout(base_timeout: Duration) -> Duration {
    if is_ci_environment() {
        base_timeout.mul_f32(3.0)
    } else {
        base_timeout
    }
}
