//! Encrypted-channel packets.
//!
//! On the wire a channel packet sits inside a root `Channel` frame, either as
//! its only child (plaintext, during the handshake) or as the plaintext of an
//! encrypted record carried in the root payload.

use super::{RootTag, expect_root, field, push_opt, read};
use crate::error::PacketError;
use crate::frame::{Frame, FrameView};

/// `SessionAck` feature bit: rich text supported
pub const FEATURE_RICH_TEXT: u8 = 0x01;

/// Packet tags of the channel family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ChannelTag {
    /// Sealed session key proposal
    SessionRequest = 0x10,
    /// Session accepted, with local time offset and features
    SessionAck = 0x20,
    /// Key proposal with explicit algorithm
    KeyRequest = 0x30,
    /// Key accepted, with responder identity
    KeyAck = 0x40,
    /// Everything after this in the same direction is encrypted
    EncryptionStart = 0x50,
    /// Random filler, dropped after decryption
    EncryptionPadding = 0x60,
    /// Component payload
    Data = 0x70,
    /// Session teardown
    Close = 0x80,
}

impl ChannelTag {
    /// Diagnostic name
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::SessionRequest => "SessionRequest",
            Self::SessionAck => "SessionAck",
            Self::KeyRequest => "KeyRequest",
            Self::KeyAck => "KeyAck",
            Self::EncryptionStart => "EncryptionStart",
            Self::EncryptionPadding => "EncryptionPadding",
            Self::Data => "Data",
            Self::Close => "Close",
        }
    }

    /// Diagnostic name of a child field of this packet
    #[must_use]
    pub fn field_name(self, child: u8) -> Option<&'static str> {
        let name = match (self, child) {
            (Self::SessionRequest, 0x10) => "SealedKey",
            (Self::SessionAck, 0x10) => "GmtOffset",
            (Self::SessionAck, 0x20) => "Features",
            (Self::KeyRequest, 0x10) => "Algorithm",
            (Self::KeyRequest, 0x20) => "SealedKey",
            (Self::KeyRequest, 0x30) => "Iv",
            (Self::KeyAck, 0x10) => "Name",
            (Self::KeyAck, 0x20) => "PublicKey",
            (Self::Data, 0x10) => "Component",
            (Self::Data, 0x20) => "Payload",
            (Self::Data, 0x30) => "SubChannel",
            (Self::Close, 0x10) => "Reason",
            _ => return None,
        };
        Some(name)
    }
}

impl TryFrom<u8> for ChannelTag {
    type Error = PacketError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x10 => Ok(Self::SessionRequest),
            0x20 => Ok(Self::SessionAck),
            0x30 => Ok(Self::KeyRequest),
            0x40 => Ok(Self::KeyAck),
            0x50 => Ok(Self::EncryptionStart),
            0x60 => Ok(Self::EncryptionPadding),
            0x70 => Ok(Self::Data),
            0x80 => Ok(Self::Close),
            _ => Err(PacketError::UnknownTag(value)),
        }
    }
}

const SESSION_REQUEST_KEY: u8 = 0x10;
const SESSION_ACK_GMT: u8 = 0x10;
const SESSION_ACK_FEATURES: u8 = 0x20;
const KEY_REQUEST_ALGORITHM: u8 = 0x10;
const KEY_REQUEST_KEY: u8 = 0x20;
const KEY_REQUEST_IV: u8 = 0x30;
const KEY_ACK_NAME: u8 = 0x10;
const KEY_ACK_PUBLIC_KEY: u8 = 0x20;
const DATA_COMPONENT: u8 = 0x10;
const DATA_PAYLOAD: u8 = 0x20;
const DATA_SUB_CHANNEL: u8 = 0x30;
const CLOSE_REASON: u8 = 0x10;

/// One decoded channel packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelPacket {
    /// Session key and IV sealed to the recipient's public key
    SessionRequest {
        /// Sealed `key || iv`
        sealed_key: Vec<u8>,
    },
    /// Session accepted
    SessionAck {
        /// Sender's offset from UTC in minutes
        gmt_offset: Option<i16>,
        /// Feature bitmask, see [`FEATURE_RICH_TEXT`]
        features: Option<u8>,
    },
    /// Key proposal naming its cipher
    KeyRequest {
        /// Cipher name
        algorithm: String,
        /// Session key sealed to the recipient's public key
        sealed_key: Vec<u8>,
        /// Record IV
        iv: Vec<u8>,
    },
    /// Key accepted
    KeyAck {
        /// Responder's display name
        name: Option<String>,
        /// Responder's public key
        public_key: Option<Vec<u8>>,
    },
    /// Encryption boundary marker
    EncryptionStart,
    /// Filler
    EncryptionPadding {
        /// Random bytes
        filler: Vec<u8>,
    },
    /// Component payload
    Data {
        /// Destination component
        component: u16,
        /// Multiplexed sub-channel within the component
        sub_channel: u16,
        /// Payload bytes
        payload: Vec<u8>,
    },
    /// Session teardown
    Close {
        /// Optional reason
        reason: Option<String>,
    },
}

impl ChannelPacket {
    /// Packet tag
    #[must_use]
    pub fn tag(&self) -> ChannelTag {
        match self {
            Self::SessionRequest { .. } => ChannelTag::SessionRequest,
            Self::SessionAck { .. } => ChannelTag::SessionAck,
            Self::KeyRequest { .. } => ChannelTag::KeyRequest,
            Self::KeyAck { .. } => ChannelTag::KeyAck,
            Self::EncryptionStart => ChannelTag::EncryptionStart,
            Self::EncryptionPadding { .. } => ChannelTag::EncryptionPadding,
            Self::Data { .. } => ChannelTag::Data,
            Self::Close { .. } => ChannelTag::Close,
        }
    }

    /// Build the packet frame
    #[must_use]
    pub fn to_frame(&self) -> Frame {
        let mut frame = Frame::new(self.tag() as u8);
        match self {
            Self::SessionRequest { sealed_key } => {
                frame.push_child(field(SESSION_REQUEST_KEY, sealed_key));
            }
            Self::SessionAck {
                gmt_offset,
                features,
            } => {
                push_opt(&mut frame, SESSION_ACK_GMT, gmt_offset.as_ref());
                push_opt(&mut frame, SESSION_ACK_FEATURES, features.as_ref());
            }
            Self::KeyRequest {
                algorithm,
                sealed_key,
                iv,
            } => {
                frame.push_child(field(KEY_REQUEST_ALGORITHM, algorithm));
                frame.push_child(field(KEY_REQUEST_KEY, sealed_key));
                frame.push_child(field(KEY_REQUEST_IV, iv));
            }
            Self::KeyAck { name, public_key } => {
                push_opt(&mut frame, KEY_ACK_NAME, name.as_ref());
                push_opt(&mut frame, KEY_ACK_PUBLIC_KEY, public_key.as_ref());
            }
            Self::EncryptionStart => {}
            Self::EncryptionPadding { filler } => {
                frame = frame.with_payload(filler.clone());
            }
            Self::Data {
                component,
                sub_channel,
                payload,
            } => {
                frame.push_child(field(DATA_COMPONENT, component));
                frame.push_child(field(DATA_PAYLOAD, payload));
                if *sub_channel != 0 {
                    frame.push_child(field(DATA_SUB_CHANNEL, sub_channel));
                }
            }
            Self::Close { reason } => {
                push_opt(&mut frame, CLOSE_REASON, reason.as_ref());
            }
        }
        frame
    }

    /// Encode the bare packet frame, as carried inside an encrypted record
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        self.to_frame().encode()
    }

    /// Decode a bare packet frame.
    ///
    /// # Errors
    ///
    /// Returns a [`PacketError`] for malformed frames, unknown tags, or missing required fields.
    pub fn decode(data: &[u8]) -> Result<Self, PacketError> {
        Self::from_view(&FrameView::parse(data)?)
    }

    fn from_view(view: &FrameView<'_>) -> Result<Self, PacketError> {
        let tag = ChannelTag::try_from(view.tag())?;

        let packet = match tag {
            ChannelTag::SessionRequest => {
                let mut sealed_key = None;
                for child in view.children() {
                    let child = child?;
                    if child.tag() == SESSION_REQUEST_KEY {
                        sealed_key = read(&child);
                    }
                }
                Self::SessionRequest {
                    sealed_key: sealed_key.ok_or(PacketError::MissingField("sealed_key"))?,
                }
            }
            ChannelTag::SessionAck => {
                let mut gmt_offset = None;
                let mut features = None;
                for child in view.children() {
                    let child = child?;
                    match child.tag() {
                        SESSION_ACK_GMT => gmt_offset = read(&child),
                        SESSION_ACK_FEATURES => features = read(&child),
                        _ => {}
                    }
                }
                Self::SessionAck {
                    gmt_offset,
                    features,
                }
            }
            ChannelTag::KeyRequest => {
                let mut algorithm = None;
                let mut sealed_key = None;
                let mut iv = None;
                for child in view.children() {
                    let child = child?;
                    match child.tag() {
                        KEY_REQUEST_ALGORITHM => algorithm = read(&child),
                        KEY_REQUEST_KEY => sealed_key = read(&child),
                        KEY_REQUEST_IV => iv = read(&child),
                        _ => {}
                    }
                }
                Self::KeyRequest {
                    algorithm: algorithm.ok_or(PacketError::MissingField("algorithm"))?,
                    sealed_key: sealed_key.ok_or(PacketError::MissingField("sealed_key"))?,
                    iv: iv.ok_or(PacketError::MissingField("iv"))?,
                }
            }
            ChannelTag::KeyAck => {
                let mut name = None;
                let mut public_key = None;
                for child in view.children() {
                    let child = child?;
                    match child.tag() {
                        KEY_ACK_NAME => name = read(&child),
                        KEY_ACK_PUBLIC_KEY => public_key = read(&child),
                        _ => {}
                    }
                }
                Self::KeyAck { name, public_key }
            }
            ChannelTag::EncryptionStart => Self::EncryptionStart,
            ChannelTag::EncryptionPadding => Self::EncryptionPadding {
                filler: view.payload().unwrap_or_default().to_vec(),
            },
            ChannelTag::Data => {
                let mut component = None;
                let mut sub_channel = 0;
                let mut payload = None;
                for child in view.children() {
                    let child = child?;
                    match child.tag() {
                        DATA_COMPONENT => component = read(&child),
                        DATA_PAYLOAD => payload = read(&child),
                        DATA_SUB_CHANNEL => sub_channel = read(&child).unwrap_or(0),
                        _ => {}
                    }
                }
                Self::Data {
                    component: component.ok_or(PacketError::MissingField("component"))?,
                    sub_channel,
                    payload: payload.unwrap_or_default(),
                }
            }
            ChannelTag::Close => {
                let mut reason = None;
                for child in view.children() {
                    let child = child?;
                    if child.tag() == CLOSE_REASON {
                        reason = read(&child);
                    }
                }
                Self::Close { reason }
            }
        };

        Ok(packet)
    }
}

/// Root `Channel` frame as it appears on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelFrame {
    /// Handshake packet sent in the clear
    Plain(ChannelPacket),
    /// Encrypted record; its plaintext is an encoded [`ChannelPacket`]
    Encrypted(Vec<u8>),
}

impl ChannelFrame {
    /// Encode the root frame
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let root = Frame::new(RootTag::Channel as u8);
        match self {
            Self::Plain(packet) => root.with_child(packet.to_frame()).encode(),
            Self::Encrypted(record) => root.with_payload(record.clone()).encode(),
        }
    }

    /// Decode a root `Channel` frame.
    ///
    /// # Errors
    ///
    /// Returns a [`PacketError`] for malformed frames, a wrong root, or an
    /// empty channel frame.
    pub fn decode(data: &[u8]) -> Result<Self, PacketError> {
        let view = expect_root(data, RootTag::Channel)?;

        if let Some(record) = view.payload() {
            return Ok(Self::Encrypted(record.to_vec()));
        }

        match view.children().next() {
            Some(child) => Ok(Self::Plain(ChannelPacket::from_view(&child?)?)),
            None => Err(PacketError::MissingField("packet")),
        }
    }
}
