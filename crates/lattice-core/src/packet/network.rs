//! Network (bootstrap/relay) packets.
//!
//! Every network packet travels inside a [`NetworkPacket`] envelope: a root
//! `Network` frame whose children name the sender and optional proxied
//! endpoints, and whose payload is the inner packet frame. A relay can read
//! and rewrite the envelope without decoding the inner packet.

use super::{
    ContactInfo, ContactList, DhtSource, PeerAddress, RootTag, expect_root, field, push_flag,
    push_opt, read,
};
use crate::error::PacketError;
use crate::frame::{Frame, FrameView};
use std::net::Ipv4Addr;

const ENVELOPE_SOURCE_ID: u8 = 0x01;
const ENVELOPE_TO: u8 = 0x02;
const ENVELOPE_FROM: u8 = 0x03;

/// Inner packet tags of the network family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum NetworkTag {
    /// DHT search
    SearchRequest = 0x10,
    /// Search result
    SearchAck = 0x20,
    /// DHT store
    StoreRequest = 0x30,
    /// Liveness probe
    Ping = 0x40,
    /// Liveness reply
    Pong = 0x50,
    /// Graceful departure
    Bye = 0x60,
    /// Ask to use the receiver as a TCP relay
    ProxyRequest = 0x70,
    /// Relay decision
    ProxyAck = 0x80,
    /// Topology crawl
    CrawlRequest = 0x90,
    /// Crawl reply
    CrawlAck = 0xA0,
}

impl NetworkTag {
    /// Diagnostic name
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::SearchRequest => "SearchRequest",
            Self::SearchAck => "SearchAck",
            Self::StoreRequest => "StoreRequest",
            Self::Ping => "Ping",
            Self::Pong => "Pong",
            Self::Bye => "Bye",
            Self::ProxyRequest => "ProxyRequest",
            Self::ProxyAck => "ProxyAck",
            Self::CrawlRequest => "CrawlRequest",
            Self::CrawlAck => "CrawlAck",
        }
    }

    /// Diagnostic name of a child field of this packet
    #[must_use]
    pub fn field_name(self, child: u8) -> Option<&'static str> {
        let name = match (self, child) {
            (Self::SearchRequest, 0x10) => "Source",
            (Self::SearchRequest, 0x20) => "WantNodes",
            (Self::SearchRequest, 0x30) => "SearchId",
            (Self::SearchRequest, 0x40) => "Target",
            (Self::SearchRequest, 0x50) => "Component",
            (Self::SearchRequest, 0x60) => "Parameters",
            (Self::SearchRequest, 0x70) => "EndProxySearch",
            (Self::SearchAck, 0x10) => "Source",
            (Self::SearchAck, 0x20) => "SearchId",
            (Self::SearchAck, 0x30) => "Proxied",
            (Self::SearchAck, 0x40) => "Contacts",
            (Self::SearchAck, 0x50) => "Value",
            (Self::SearchAck, 0x60) => "Component",
            (Self::StoreRequest, 0x10) => "Source",
            (Self::StoreRequest, 0x20) => "Key",
            (Self::StoreRequest, 0x30) => "Component",
            (Self::StoreRequest, 0x40) => "Value",
            (Self::StoreRequest, 0x50) => "Ttl",
            (Self::Ping | Self::Pong, 0x10) => "Source",
            (Self::Ping | Self::Pong, 0x20) => "RemoteIp",
            (Self::Bye, 0x10) => "SenderId",
            (Self::Bye, 0x20) => "Contacts",
            (Self::Bye, 0x30) => "Reason",
            (Self::ProxyRequest, 0x10) => "SenderId",
            (Self::ProxyRequest, 0x20) => "Blocked",
            (Self::ProxyRequest, 0x30) => "Nat",
            (Self::ProxyAck, 0x10) => "Source",
            (Self::ProxyAck, 0x20) => "Accept",
            (Self::ProxyAck, 0x30) => "Contacts",
            (Self::CrawlRequest, 0x10) => "Source",
            (Self::CrawlRequest, 0x20) => "Target",
            (Self::CrawlAck, 0x10) => "Source",
            (Self::CrawlAck, 0x20) => "Version",
            (Self::CrawlAck, 0x30) => "Uptime",
            (Self::CrawlAck, 0x40) => "Depth",
            (Self::CrawlAck, 0x50) => "Proxies",
            _ => return None,
        };
        Some(name)
    }
}

impl TryFrom<u8> for NetworkTag {
    type Error = PacketError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x10 => Ok(Self::SearchRequest),
            0x20 => Ok(Self::SearchAck),
            0x30 => Ok(Self::StoreRequest),
            0x40 => Ok(Self::Ping),
            0x50 => Ok(Self::Pong),
            0x60 => Ok(Self::Bye),
            0x70 => Ok(Self::ProxyRequest),
            0x80 => Ok(Self::ProxyAck),
            0x90 => Ok(Self::CrawlRequest),
            0xA0 => Ok(Self::CrawlAck),
            _ => Err(PacketError::UnknownTag(value)),
        }
    }
}

/// Envelope around every network packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkPacket {
    /// Node that originated the packet
    pub source_id: u64,
    /// Final destination when delivered through a proxy
    pub to: Option<PeerAddress>,
    /// Original sender when delivered through a proxy
    pub from: Option<PeerAddress>,
    /// Encoded inner packet frame
    pub internal: Vec<u8>,
}

impl NetworkPacket {
    /// Wrap an inner message
    #[must_use]
    pub fn wrap(source_id: u64, message: &NetworkMessage) -> Self {
        Self {
            source_id,
            to: None,
            from: None,
            internal: message.encode(),
        }
    }

    /// Build the envelope frame
    #[must_use]
    pub fn to_frame(&self) -> Frame {
        let mut frame = Frame::leaf(RootTag::Network as u8, self.internal.clone());
        frame.push_child(field(ENVELOPE_SOURCE_ID, &self.source_id));
        push_opt(&mut frame, ENVELOPE_TO, self.to.as_ref());
        push_opt(&mut frame, ENVELOPE_FROM, self.from.as_ref());
        frame
    }

    /// Encode the envelope
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        self.to_frame().encode()
    }

    /// Decode an envelope without touching the inner packet.
    ///
    /// # Errors
    ///
    /// Returns a [`PacketError`] for malformed frames, a non-network root, or a missing source id.
    pub fn decode(data: &[u8]) -> Result<Self, PacketError> {
        let view = expect_root(data, RootTag::Network)?;

        let mut source_id = None;
        let mut to = None;
        let mut from = None;
        for child in view.children() {
            let child = child?;
            match child.tag() {
                ENVELOPE_SOURCE_ID => source_id = read(&child),
                ENVELOPE_TO => to = read(&child),
                ENVELOPE_FROM => from = read(&child),
                _ => {}
            }
        }

        Ok(Self {
            source_id: source_id.ok_or(PacketError::MissingField("source_id"))?,
            to,
            from,
            internal: view.payload().unwrap_or_default().to_vec(),
        })
    }

    /// Inner packet tag, read from the first byte of the inner frame
    #[must_use]
    pub fn inner_tag(&self) -> Option<NetworkTag> {
        self.internal
            .first()
            .and_then(|&tag| NetworkTag::try_from(tag).ok())
    }

    /// Decode the inner packet.
    ///
    /// # Errors
    ///
    /// Returns a [`PacketError`] if the inner frame is malformed or of an unknown type.
    pub fn message(&self) -> Result<NetworkMessage, PacketError> {
        NetworkMessage::decode(&self.internal)
    }
}

/// Decoded inner network packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkMessage {
    /// DHT search
    SearchRequest(SearchRequest),
    /// Search result
    SearchAck(SearchAck),
    /// DHT store
    StoreRequest(StoreRequest),
    /// Liveness probe
    Ping(Ping),
    /// Liveness reply
    Pong(Ping),
    /// Graceful departure
    Bye(Bye),
    /// Relay request
    ProxyRequest(ProxyRequest),
    /// Relay decision
    ProxyAck(ProxyAck),
    /// Topology crawl
    CrawlRequest(CrawlRequest),
    /// Crawl reply
    CrawlAck(CrawlAck),
}

impl NetworkMessage {
    /// Packet tag
    #[must_use]
    pub fn tag(&self) -> NetworkTag {
        match self {
            Self::SearchRequest(_) => NetworkTag::SearchRequest,
            Self::SearchAck(_) => NetworkTag::SearchAck,
            Self::StoreRequest(_) => NetworkTag::StoreRequest,
            Self::Ping(_) => NetworkTag::Ping,
            Self::Pong(_) => NetworkTag::Pong,
            Self::Bye(_) => NetworkTag::Bye,
            Self::ProxyRequest(_) => NetworkTag::ProxyRequest,
            Self::ProxyAck(_) => NetworkTag::ProxyAck,
            Self::CrawlRequest(_) => NetworkTag::CrawlRequest,
            Self::CrawlAck(_) => NetworkTag::CrawlAck,
        }
    }

    /// Build the inner packet frame
    #[must_use]
    pub fn to_frame(&self) -> Frame {
        let mut frame = Frame::new(self.tag() as u8);
        match self {
            Self::SearchRequest(p) => p.write(&mut frame),
            Self::SearchAck(p) => p.write(&mut frame),
            Self::StoreRequest(p) => p.write(&mut frame),
            Self::Ping(p) | Self::Pong(p) => p.write(&mut frame),
            Self::Bye(p) => p.write(&mut frame),
            Self::ProxyRequest(p) => p.write(&mut frame),
            Self::ProxyAck(p) => p.write(&mut frame),
            Self::CrawlRequest(p) => p.write(&mut frame),
            Self::CrawlAck(p) => p.write(&mut frame),
        }
        frame
    }

    /// Encode the inner packet frame
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        self.to_frame().encode()
    }

    /// Decode an inner packet frame.
    ///
    /// # Errors
    ///
    /// Returns a [`PacketError`] for malformed frames, unknown tags, or missing required fields.
    pub fn decode(data: &[u8]) -> Result<Self, PacketError> {
        let view = FrameView::parse(data)?;
        let message = match NetworkTag::try_from(view.tag())? {
            NetworkTag::SearchRequest => Self::SearchRequest(SearchRequest::parse(&view)?),
            NetworkTag::SearchAck => Self::SearchAck(SearchAck::parse(&view)?),
            NetworkTag::StoreRequest => Self::StoreRequest(StoreRequest::parse(&view)?),
            NetworkTag::Ping => Self::Ping(Ping::parse(&view)?),
            NetworkTag::Pong => Self::Pong(Ping::parse(&view)?),
            NetworkTag::Bye => Self::Bye(Bye::parse(&view)?),
            NetworkTag::ProxyRequest => Self::ProxyRequest(ProxyRequest::parse(&view)?),
            NetworkTag::ProxyAck => Self::ProxyAck(ProxyAck::parse(&view)?),
            NetworkTag::CrawlRequest => Self::CrawlRequest(CrawlRequest::parse(&view)?),
            NetworkTag::CrawlAck => Self::CrawlAck(CrawlAck::parse(&view)?),
        };
        Ok(message)
    }
}

fn require<T>(value: Option<T>, name: &'static str) -> Result<T, PacketError> {
    value.ok_or(PacketError::MissingField(name))
}

/// DHT search for `target` on behalf of `component`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    /// Sender reachability
    pub source: DhtSource,
    /// Whether closer nodes should be returned along with values
    pub want_nodes: bool,
    /// Search identifier, echoed in acks
    pub search_id: u32,
    /// Target id
    pub target: u64,
    /// Subsystem the search is for
    pub component: u16,
    /// Opaque, component-defined parameters
    pub parameters: Option<Vec<u8>>,
    /// Tells a relay to stop forwarding matches for this search id
    pub end_proxy_search: bool,
}

impl SearchRequest {
    const SOURCE: u8 = 0x10;
    const NODES: u8 = 0x20;
    const SEARCH_ID: u8 = 0x30;
    const TARGET: u8 = 0x40;
    const COMPONENT: u8 = 0x50;
    const PARAMETERS: u8 = 0x60;
    const END_SEARCH: u8 = 0x70;

    fn write(&self, frame: &mut Frame) {
        frame.push_child(field(Self::SOURCE, &self.source));
        frame.push_child(field(Self::NODES, &self.want_nodes));
        frame.push_child(field(Self::SEARCH_ID, &self.search_id));
        frame.push_child(field(Self::TARGET, &self.target));
        frame.push_child(field(Self::COMPONENT, &self.component));
        push_opt(frame, Self::PARAMETERS, self.parameters.as_ref());
        push_flag(frame, Self::END_SEARCH, self.end_proxy_search);
    }

    fn parse(view: &FrameView<'_>) -> Result<Self, PacketError> {
        let mut source = None;
        let mut req = Self {
            source: DhtSource::default(),
            want_nodes: false,
            search_id: 0,
            target: 0,
            component: 0,
            parameters: None,
            end_proxy_search: false,
        };

        for child in view.children() {
            let child = child?;
            match child.tag() {
                Self::SOURCE => source = read(&child),
                Self::NODES => req.want_nodes = read(&child).unwrap_or(false),
                Self::SEARCH_ID => req.search_id = read(&child).unwrap_or(0),
                Self::TARGET => req.target = read(&child).unwrap_or(0),
                Self::COMPONENT => req.component = read(&child).unwrap_or(0),
                Self::PARAMETERS => req.parameters = read(&child),
                Self::END_SEARCH => req.end_proxy_search = true,
                _ => {}
            }
        }

        req.source = require(source, "source")?;
        Ok(req)
    }
}

/// Result of a search: values and/or closer contacts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchAck {
    /// Responder reachability
    pub source: DhtSource,
    /// Search identifier from the request
    pub search_id: u32,
    /// Set when the ack was produced by a relay on the searcher's behalf
    pub proxied: bool,
    /// Closer contacts
    pub contacts: Vec<ContactInfo>,
    /// Values found; each travels as its own child
    pub values: Vec<Vec<u8>>,
    /// Subsystem the values belong to
    pub component: Option<u16>,
}

impl SearchAck {
    const SOURCE: u8 = 0x10;
    const SEARCH_ID: u8 = 0x20;
    const PROXIED: u8 = 0x30;
    const CONTACTS: u8 = 0x40;
    const VALUES: u8 = 0x50;
    const COMPONENT: u8 = 0x60;

    fn write(&self, frame: &mut Frame) {
        frame.push_child(field(Self::SOURCE, &self.source));
        frame.push_child(field(Self::SEARCH_ID, &self.search_id));
        push_flag(frame, Self::PROXIED, self.proxied);
        if !self.contacts.is_empty() {
            frame.push_child(field(Self::CONTACTS, &ContactList(self.contacts.clone())));
        }
        for value in &self.values {
            frame.push_child(field(Self::VALUES, value));
        }
        push_opt(frame, Self::COMPONENT, self.component.as_ref());
    }

    fn parse(view: &FrameView<'_>) -> Result<Self, PacketError> {
        let mut source = None;
        let mut ack = Self {
            source: DhtSource::default(),
            search_id: 0,
            proxied: false,
            contacts: Vec::new(),
            values: Vec::new(),
            component: None,
        };

        for child in view.children() {
            let child = child?;
            match child.tag() {
                Self::SOURCE => source = read(&child),
                Self::SEARCH_ID => ack.search_id = read(&child).unwrap_or(0),
                Self::PROXIED => ack.proxied = true,
                Self::CONTACTS => {
                    if let Some(ContactList(list)) = read(&child) {
                        ack.contacts.extend(list);
                    }
                }
                Self::VALUES => ack.values.extend(read::<Vec<u8>>(&child)),
                Self::COMPONENT => ack.component = read(&child),
                _ => {}
            }
        }

        ack.source = require(source, "source")?;
        Ok(ack)
    }
}

/// DHT store, forwarded hop by hop until its TTL runs out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreRequest {
    /// Sender reachability
    pub source: DhtSource,
    /// Storage key
    pub key: u64,
    /// Subsystem that owns the value
    pub component: u16,
    /// Opaque value
    pub value: Vec<u8>,
    /// Remaining hops
    pub ttl: u16,
}

impl StoreRequest {
    const SOURCE: u8 = 0x10;
    const KEY: u8 = 0x20;
    const COMPONENT: u8 = 0x30;
    const DATA: u8 = 0x40;
    const TTL: u8 = 0x50;

    /// TTL assumed when the field is absent
    pub const DEFAULT_TTL: u16 = u16::MAX;

    fn write(&self, frame: &mut Frame) {
        frame.push_child(field(Self::SOURCE, &self.source));
        frame.push_child(field(Self::KEY, &self.key));
        frame.push_child(field(Self::COMPONENT, &self.component));
        frame.push_child(field(Self::DATA, &self.value));
        frame.push_child(field(Self::TTL, &self.ttl));
    }

    fn parse(view: &FrameView<'_>) -> Result<Self, PacketError> {
        let mut source = None;
        let mut req = Self {
            source: DhtSource::default(),
            key: 0,
            component: 0,
            value: Vec::new(),
            ttl: Self::DEFAULT_TTL,
        };

        for child in view.children() {
            let child = child?;
            match child.tag() {
                Self::SOURCE => source = read(&child),
                Self::KEY => req.key = read(&child).unwrap_or(0),
                Self::COMPONENT => req.component = read(&child).unwrap_or(0),
                Self::DATA => req.value = read(&child).unwrap_or_default(),
                Self::TTL => req.ttl = read(&child).unwrap_or(Self::DEFAULT_TTL),
                _ => {}
            }
        }

        req.source = require(source, "source")?;
        Ok(req)
    }
}

/// Ping/Pong body: sender reachability plus the address it saw us at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ping {
    /// Sender reachability
    pub source: DhtSource,
    /// Receiver's public IP as observed by the sender
    pub remote_ip: Option<Ipv4Addr>,
}

/// Pong shares the ping body
pub type Pong = Ping;

impl Ping {
    const SOURCE: u8 = 0x10;
    const REMOTE_IP: u8 = 0x20;

    fn write(&self, frame: &mut Frame) {
        frame.push_child(field(Self::SOURCE, &self.source));
        push_opt(frame, Self::REMOTE_IP, self.remote_ip.as_ref());
    }

    fn parse(view: &FrameView<'_>) -> Result<Self, PacketError> {
        let mut source = None;
        let mut remote_ip = None;
        for child in view.children() {
            let child = child?;
            match child.tag() {
                Self::SOURCE => source = read(&child),
                Self::REMOTE_IP => remote_ip = read(&child),
                _ => {}
            }
        }
        Ok(Self {
            source: require(source, "source")?,
            remote_ip,
        })
    }
}

/// Sent on graceful disconnect so the remote can route around us
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bye {
    /// Departing node
    pub sender_id: u64,
    /// Alternate contacts
    pub contacts: Vec<ContactInfo>,
    /// Human-readable reason
    pub reason: Option<String>,
}

impl Bye {
    const SENDER: u8 = 0x10;
    const CONTACTS: u8 = 0x20;
    const REASON: u8 = 0x30;

    fn write(&self, frame: &mut Frame) {
        frame.push_child(field(Self::SENDER, &self.sender_id));
        if !self.contacts.is_empty() {
            frame.push_child(field(Self::CONTACTS, &ContactList(self.contacts.clone())));
        }
        push_opt(frame, Self::REASON, self.reason.as_ref());
    }

    fn parse(view: &FrameView<'_>) -> Result<Self, PacketError> {
        let mut sender_id = None;
        let mut contacts = Vec::new();
        let mut reason = None;
        for child in view.children() {
            let child = child?;
            match child.tag() {
                Self::SENDER => sender_id = read(&child),
                Self::CONTACTS => {
                    if let Some(ContactList(list)) = read(&child) {
                        contacts.extend(list);
                    }
                }
                Self::REASON => reason = read(&child),
                _ => {}
            }
        }
        Ok(Self {
            sender_id: require(sender_id, "sender_id")?,
            contacts,
            reason,
        })
    }
}

/// Why a node asks for a relay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProxyType {
    /// Not stated
    #[default]
    Unset,
    /// Requester accepts no inbound traffic at all
    ClientBlocked,
    /// Requester is behind a NAT
    ClientNat,
}

/// Ask the receiver to act as a TCP relay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProxyRequest {
    /// Requesting node
    pub sender_id: u64,
    /// Reason for the request
    pub proxy_type: ProxyType,
}

impl ProxyRequest {
    const SENDER: u8 = 0x10;
    const BLOCKED: u8 = 0x20;
    const NAT: u8 = 0x30;

    fn write(&self, frame: &mut Frame) {
        frame.push_child(field(Self::SENDER, &self.sender_id));
        push_flag(
            frame,
            Self::BLOCKED,
            self.proxy_type == ProxyType::ClientBlocked,
        );
        push_flag(frame, Self::NAT, self.proxy_type == ProxyType::ClientNat);
    }

    fn parse(view: &FrameView<'_>) -> Result<Self, PacketError> {
        let mut sender_id = None;
        let mut proxy_type = ProxyType::Unset;
        for child in view.children() {
            let child = child?;
            match child.tag() {
                Self::SENDER => sender_id = read(&child),
                Self::BLOCKED => proxy_type = ProxyType::ClientBlocked,
                Self::NAT => proxy_type = ProxyType::ClientNat,
                _ => {}
            }
        }
        Ok(Self {
            sender_id: require(sender_id, "sender_id")?,
            proxy_type,
        })
    }
}

/// Relay decision; a refusal carries contacts to try instead
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyAck {
    /// Responder reachability
    pub source: DhtSource,
    /// Zero-length marker; presence means accepted
    pub accept: bool,
    /// Alternative relays
    pub contacts: Vec<ContactInfo>,
}

impl ProxyAck {
    const SOURCE: u8 = 0x10;
    const ACCEPT: u8 = 0x20;
    const CONTACTS: u8 = 0x30;

    fn write(&self, frame: &mut Frame) {
        frame.push_child(field(Self::SOURCE, &self.source));
        push_flag(frame, Self::ACCEPT, self.accept);
        if !self.contacts.is_empty() {
            frame.push_child(field(Self::CONTACTS, &ContactList(self.contacts.clone())));
        }
    }

    fn parse(view: &FrameView<'_>) -> Result<Self, PacketError> {
        let mut source = None;
        let mut accept = false;
        let mut contacts = Vec::new();
        for child in view.children() {
            let child = child?;
            match child.tag() {
                Self::SOURCE => source = read(&child),
                Self::ACCEPT => accept = true,
                Self::CONTACTS => {
                    if let Some(ContactList(list)) = read(&child) {
                        contacts.extend(list);
                    }
                }
                _ => {}
            }
        }
        Ok(Self {
            source: require(source, "source")?,
            accept,
            contacts,
        })
    }
}

/// Topology crawl request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrawlRequest {
    /// Sender reachability
    pub source: DhtSource,
    /// Node whose neighbourhood is requested
    pub target: Option<PeerAddress>,
}

impl CrawlRequest {
    const SOURCE: u8 = 0x10;
    const TARGET: u8 = 0x20;

    fn write(&self, frame: &mut Frame) {
        frame.push_child(field(Self::SOURCE, &self.source));
        push_opt(frame, Self::TARGET, self.target.as_ref());
    }

    fn parse(view: &FrameView<'_>) -> Result<Self, PacketError> {
        let mut source = None;
        let mut target = None;
        for child in view.children() {
            let child = child?;
            match child.tag() {
                Self::SOURCE => source = read(&child),
                Self::TARGET => target = read(&child),
                _ => {}
            }
        }
        Ok(Self {
            source: require(source, "source")?,
            target,
        })
    }
}

/// Crawl reply describing the responder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlAck {
    /// Responder reachability
    pub source: DhtSource,
    /// Software version string
    pub version: Option<String>,
    /// Seconds since start
    pub uptime: Option<i32>,
    /// Crawl depth at which the responder was reached
    pub depth: Option<i32>,
    /// Relays the responder is using or serving
    pub proxies: Vec<ContactInfo>,
}

impl CrawlAck {
    const SOURCE: u8 = 0x10;
    const VERSION: u8 = 0x20;
    const UPTIME: u8 = 0x30;
    const DEPTH: u8 = 0x40;
    const PROXIES: u8 = 0x50;

    fn write(&self, frame: &mut Frame) {
        frame.push_child(field(Self::SOURCE, &self.source));
        push_opt(frame, Self::VERSION, self.version.as_ref());
        push_opt(frame, Self::UPTIME, self.uptime.as_ref());
        push_opt(frame, Self::DEPTH, self.depth.as_ref());
        if !self.proxies.is_empty() {
            frame.push_child(field(Self::PROXIES, &ContactList(self.proxies.clone())));
        }
    }

    fn parse(view: &FrameView<'_>) -> Result<Self, PacketError> {
        let mut source = None;
        let mut ack = Self {
            source: DhtSource::default(),
            version: None,
            uptime: None,
            depth: None,
            proxies: Vec::new(),
        };
        for child in view.children() {
            let child = child?;
            match child.tag() {
                Self::SOURCE => source = read(&child),
                Self::VERSION => ack.version = read(&child),
                Self::UPTIME => ack.uptime = read(&child),
                Self::DEPTH => ack.depth = read(&child),
                Self::PROXIES => {
                    if let Some(ContactList(list)) = read(&child) {
                        ack.proxies.extend(list);
                    }
                }
                _ => {}
            }
        }
        ack.source = require(source, "source")?;
        Ok(ack)
    }
}
