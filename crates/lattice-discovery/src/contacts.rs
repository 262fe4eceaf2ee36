//! Bounded cache of recently seen peers.
//!
//! Entries are kept newest-first by `last_seen`. Inserting past capacity
//! evicts from the tail, so the oldest contact always goes first.

use crate::clock::Timestamp;
use lattice_core::packet::cache::CachedContact;
use lattice_core::{ContactInfo, FirewallState, PeerAddress};

/// Default number of cached contacts
pub const MAX_CONTACTS: usize = 200;

/// A remembered peer with retry bookkeeping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    /// Address and ports
    pub info: ContactInfo,
    /// Firewall state the peer last reported
    pub firewall: FirewallState,
    /// Last time any packet arrived from the peer
    pub last_seen: Timestamp,
    /// Earliest time of the next UDP ping
    pub next_try_udp: Timestamp,
    /// Earliest time of the next outbound TCP attempt
    pub next_try_proxy: Timestamp,
}

impl Contact {
    /// Fresh contact, eligible for immediate retry
    #[must_use]
    pub fn new(info: ContactInfo, firewall: FirewallState, last_seen: Timestamp) -> Self {
        Self {
            info,
            firewall,
            last_seen,
            next_try_udp: Timestamp::ZERO,
            next_try_proxy: Timestamp::ZERO,
        }
    }

    /// Persisted form
    #[must_use]
    pub fn to_cached(&self) -> CachedContact {
        CachedContact {
            contact: self.info,
            firewall: self.firewall,
            last_seen: self.last_seen.as_millis(),
        }
    }

    /// Restore from the persisted form
    #[must_use]
    pub fn from_cached(cached: &CachedContact) -> Self {
        Self::new(
            cached.contact,
            cached.firewall,
            Timestamp::from_millis(cached.last_seen),
        )
    }
}

/// Contacts ordered newest first
#[derive(Debug, Clone)]
pub struct ContactCache {
    entries: Vec<Contact>,
    capacity: usize,
}

impl Default for ContactCache {
    fn default() -> Self {
        Self::new(MAX_CONTACTS)
    }
}

impl ContactCache {
    /// Empty cache holding at most `capacity` contacts
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            capacity: capacity.max(1),
        }
    }

    /// Record a packet from `info`. An existing entry for the same address
    /// keeps its retry timers. Returns `true` if the contact is new.
    pub fn upsert(&mut self, info: ContactInfo, firewall: FirewallState, now: Timestamp) -> bool {
        let mut contact = Contact::new(info, firewall, now);
        let is_new = match self.position(&info.address) {
            Some(index) => {
                let old = self.entries.remove(index);
                contact.next_try_udp = old.next_try_udp;
                contact.next_try_proxy = old.next_try_proxy;
                false
            }
            None => true,
        };
        self.insert_sorted(contact);
        is_new
    }

    /// Insert a restored contact, replacing any entry for the same address
    pub fn insert(&mut self, contact: Contact) {
        if let Some(index) = self.position(&contact.info.address) {
            self.entries.remove(index);
        }
        self.insert_sorted(contact);
    }

    fn insert_sorted(&mut self, contact: Contact) {
        let index = self
            .entries
            .partition_point(|c| c.last_seen > contact.last_seen);
        self.entries.insert(index, contact);
        self.entries.truncate(self.capacity);
    }

    fn position(&self, address: &PeerAddress) -> Option<usize> {
        self.entries.iter().position(|c| &c.info.address == address)
    }

    /// Look up by address
    #[must_use]
    pub fn get(&self, address: &PeerAddress) -> Option<&Contact> {
        self.entries.iter().find(|c| &c.info.address == address)
    }

    /// Remove by address
    pub fn remove(&mut self, address: &PeerAddress) -> Option<Contact> {
        self.position(address).map(|index| self.entries.remove(index))
    }

    /// Pick up to `limit` contacts whose UDP retry time has passed and
    /// push their next attempt to `next_try`
    pub fn take_udp_due(
        &mut self,
        now: Timestamp,
        limit: usize,
        next_try: Timestamp,
    ) -> Vec<ContactInfo> {
        let mut due = Vec::new();
        for contact in &mut self.entries {
            if due.len() >= limit {
                break;
            }
            if now < contact.next_try_udp {
                continue;
            }
            contact.next_try_udp = next_try;
            due.push(contact.info);
        }
        due
    }

    /// Pick one contact whose TCP retry time has passed
    pub fn take_proxy_due(&mut self, now: Timestamp, next_try: Timestamp) -> Option<ContactInfo> {
        let contact = self.entries.iter_mut().find(|c| now >= c.next_try_proxy)?;
        contact.next_try_proxy = next_try;
        Some(contact.info)
    }

    /// Make every contact eligible for immediate retry
    pub fn reset_retry_timers(&mut self) {
        for contact in &mut self.entries {
            contact.next_try_udp = Timestamp::ZERO;
            contact.next_try_proxy = Timestamp::ZERO;
        }
    }

    /// Contacts newest first
    pub fn iter(&self) -> impl Iterator<Item = &Contact> {
        self.entries.iter()
    }

    /// Number of contacts
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of contacts
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::net::Ipv4Addr;

    fn info(id: u64) -> ContactInfo {
        ContactInfo {
            address: PeerAddress::new(id, Ipv4Addr::new(10, 1, (id >> 8) as u8, id as u8), 4000),
            tcp_port: 4001,
            client_id: 0,
        }
    }

    #[test]
    fn test_newest_first() {
        let mut cache = ContactCache::default();
        cache.upsert(info(1), FirewallState::Open, Timestamp::from_millis(10));
        cache.upsert(info(2), FirewallState::Open, Timestamp::from_millis(30));
        cache.upsert(info(3), FirewallState::Nat, Timestamp::from_millis(20));

        let ids: Vec<u64> = cache.iter().map(|c| c.info.address.peer_id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[test]
    fn test_upsert_keeps_retry_state() {
        let mut cache = ContactCache::default();
        assert!(cache.upsert(info(1), FirewallState::Open, Timestamp::from_millis(1)));
        let due = cache.take_udp_due(Timestamp::from_millis(2), 10, Timestamp::from_millis(500));
        assert_eq!(due.len(), 1);

        assert!(!cache.upsert(info(1), FirewallState::Nat, Timestamp::from_millis(3)));
        let contact = cache.get(&info(1).address).unwrap();
        assert_eq!(contact.next_try_udp, Timestamp::from_millis(500));
        assert_eq!(contact.last_seen, Timestamp::from_millis(3));
        assert_eq!(contact.firewall, FirewallState::Nat);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_evicts_oldest() {
        let mut cache = ContactCache::new(3);
        for id in 1..=3 {
            cache.upsert(info(id), FirewallState::Open, Timestamp::from_millis(id as i64 * 10));
        }
        cache.upsert(info(9), FirewallState::Open, Timestamp::from_millis(25));

        assert_eq!(cache.len(), 3);
        assert!(cache.get(&info(1).address).is_none());
        assert!(cache.get(&info(9).address).is_some());
    }

    #[test]
    fn test_udp_due_respects_limit_and_timer() {
        let mut cache = ContactCache::default();
        for id in 1..=15 {
            cache.upsert(info(id), FirewallState::Open, Timestamp::from_millis(id as i64));
        }
        let now = Timestamp::from_millis(100);
        let later = Timestamp::from_millis(60_100);

        assert_eq!(cache.take_udp_due(now, 10, later).len(), 10);
        assert_eq!(cache.take_udp_due(now, 10, later).len(), 5);
        assert!(cache.take_udp_due(now, 10, later).is_empty());

        cache.reset_retry_timers();
        assert_eq!(cache.take_udp_due(now, 10, later).len(), 10);
    }

    #[test]
    fn test_proxy_due_one_at_a_time() {
        let mut cache = ContactCache::default();
        cache.upsert(info(1), FirewallState::Open, Timestamp::from_millis(1));
        cache.upsert(info(2), FirewallState::Open, Timestamp::from_millis(2));
        let now = Timestamp::from_millis(10);
        let next = Timestamp::from_millis(1_000);

        let first = cache.take_proxy_due(now, next).unwrap();
        let second = cache.take_proxy_due(now, next).unwrap();
        assert_ne!(first, second);
        assert!(cache.take_proxy_due(now, next).is_none());
    }

    #[test]
    fn test_cached_roundtrip() {
        let contact = Contact::new(info(4), FirewallState::Blocked, Timestamp::from_millis(77));
        let restored = Contact::from_cached(&contact.to_cached());
        assert_eq!(restored, contact);
    }

    proptest! {
        #[test]
        fn test_bound_and_order(ops in prop::collection::vec((0u64..400, 0i64..10_000), 0..600)) {
            let mut cache = ContactCache::default();
            for (id, seen) in ops {
                cache.upsert(info(id), FirewallState::Open, Timestamp::from_millis(seen));
                prop_assert!(cache.len() <= MAX_CONTACTS);
            }
            let seen: Vec<Timestamp> = cache.iter().map(|c| c.last_seen).collect();
            prop_assert!(seen.windows(2).all(|w| w[0] >= w[1]));
        }
    }
}
