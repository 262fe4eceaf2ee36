//! Persisted bootstrap-cache entries.
//!
//! Timestamps are unix milliseconds so they survive a restart, unlike the
//! monotonic instants the live cache uses.

use super::{ContactInfo, FirewallState, RootTag, expect_root, field, push_opt, read};
use crate::error::PacketError;
use crate::frame::Frame;

const CONTACT_LAST_SEEN: u8 = 0x10;
const CONTACT_INFO: u8 = 0x20;
const CONTACT_FIREWALL: u8 = 0x30;

const WEB_ADDRESS: u8 = 0x20;
const WEB_ACCESS_KEY: u8 = 0x30;
const WEB_LAST_SEEN: u8 = 0x40;
const WEB_LAST_TRIED: u8 = 0x50;

/// Saved bootstrap contact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachedContact {
    /// Contact record
    pub contact: ContactInfo,
    /// Last observed firewall state
    pub firewall: FirewallState,
    /// Last time a packet was received, unix ms
    pub last_seen: i64,
}

impl CachedContact {
    /// Diagnostic name of a child field
    #[must_use]
    pub fn field_name(child: u8) -> Option<&'static str> {
        Some(match child {
            CONTACT_LAST_SEEN => "LastSeen",
            CONTACT_INFO => "Contact",
            CONTACT_FIREWALL => "Firewall",
            _ => return None,
        })
    }

    /// Encode as a root `CachedContact` frame
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        Frame::new(RootTag::CachedContact as u8)
            .with_child(field(CONTACT_LAST_SEEN, &self.last_seen))
            .with_child(field(CONTACT_INFO, &self.contact))
            .with_child(field(CONTACT_FIREWALL, &(self.firewall as u8)))
            .encode()
    }

    /// Decode a root `CachedContact` frame.
    ///
    /// # Errors
    ///
    /// Returns a [`PacketError`] for malformed frames, a wrong root, or a missing contact.
    pub fn decode(data: &[u8]) -> Result<Self, PacketError> {
        let view = expect_root(data, RootTag::CachedContact)?;
        let mut contact = None;
        let mut last_seen = 0;
        let mut firewall = FirewallState::Blocked;

        for child in view.children() {
            let child = child?;
            match child.tag() {
                CONTACT_LAST_SEEN => last_seen = read(&child).unwrap_or(0),
                CONTACT_INFO => contact = read(&child),
                CONTACT_FIREWALL => {
                    firewall = read::<u8>(&child).map_or(FirewallState::Blocked, FirewallState::from_u8);
                }
                _ => {}
            }
        }

        Ok(Self {
            contact: contact.ok_or(PacketError::MissingField("contact"))?,
            firewall,
            last_seen,
        })
    }
}

/// Saved web-cache entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedWebCache {
    /// Cache URL
    pub address: String,
    /// Shared AES key
    pub access_key: Vec<u8>,
    /// Last successful response, unix ms
    pub last_seen: Option<i64>,
    /// Last attempt, unix ms
    pub last_tried: Option<i64>,
}

impl CachedWebCache {
    /// Diagnostic name of a child field
    #[must_use]
    pub fn field_name(child: u8) -> Option<&'static str> {
        Some(match child {
            WEB_ADDRESS => "Address",
            WEB_ACCESS_KEY => "AccessKey",
            WEB_LAST_SEEN => "LastSeen",
            WEB_LAST_TRIED => "LastTried",
            _ => return None,
        })
    }

    /// Encode as a root `CachedWebCache` frame
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut frame = Frame::new(RootTag::CachedWebCache as u8)
            .with_child(field(WEB_ADDRESS, &self.address))
            .with_child(field(WEB_ACCESS_KEY, &self.access_key));
        push_opt(&mut frame, WEB_LAST_SEEN, self.last_seen.as_ref());
        push_opt(&mut frame, WEB_LAST_TRIED, self.last_tried.as_ref());
        frame.encode()
    }

    /// Decode a root `CachedWebCache` frame.
    ///
    /// # Errors
    ///
    /// Returns a [`PacketError`] for malformed frames, a wrong root, or a missing address.
    pub fn decode(data: &[u8]) -> Result<Self, PacketError> {
        let view = expect_root(data, RootTag::CachedWebCache)?;
        let mut entry = Self {
            address: String::new(),
            access_key: Vec::new(),
            last_seen: None,
            last_tried: None,
        };
        let mut address = None;

        for child in view.children() {
            let child = child?;
            match child.tag() {
                WEB_ADDRESS => address = read(&child),
                WEB_ACCESS_KEY => entry.access_key = read(&child).unwrap_or_default(),
                WEB_LAST_SEEN => entry.last_seen = read(&child),
                WEB_LAST_TRIED => entry.last_tried = read(&child),
                _ => {}
            }
        }

        entry.address = address.ok_or(PacketError::MissingField("address"))?;
        Ok(entry)
    }
}
