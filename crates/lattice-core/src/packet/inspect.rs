//! Human-readable dump of any packet, using the per-family tag name maps.

use super::cache::{CachedContact, CachedWebCache};
use super::channel::ChannelTag;
use super::datagram;
use super::network::NetworkTag;
use super::RootTag;
use crate::error::PacketError;
use crate::frame::Frame;
use std::fmt;

/// Payload bytes shown before truncating
const HEX_PREVIEW: usize = 48;

/// One node of an annotated frame tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InspectNode {
    /// Raw tag
    pub tag: u8,
    /// Name from the tag map, if the tag is known at this position
    pub name: Option<&'static str>,
    /// Payload bytes
    pub payload: Option<Vec<u8>>,
    /// Annotated children
    pub children: Vec<InspectNode>,
    /// Packet nested inside the payload (network envelopes)
    pub inner: Option<Box<InspectNode>>,
}

impl InspectNode {
    fn plain(frame: &Frame, name: Option<&'static str>) -> Self {
        Self {
            tag: frame.tag(),
            name,
            payload: frame.payload().map(<[u8]>::to_vec),
            children: frame
                .children()
                .iter()
                .map(|child| Self::plain(child, None))
                .collect(),
            inner: None,
        }
    }

    fn named(
        frame: &Frame,
        name: Option<&'static str>,
        fields: impl Fn(u8) -> Option<&'static str>,
    ) -> Self {
        let mut node = Self::plain(frame, name);
        for (node_child, child) in node.children.iter_mut().zip(frame.children()) {
            node_child.name = fields(child.tag());
        }
        node
    }

    fn write_tree(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let indent = "  ".repeat(depth);
        write!(f, "{indent}{} (0x{:02X})", self.name.unwrap_or("?"), self.tag)?;
        match &self.payload {
            Some(payload) if self.inner.is_some() => write!(f, " [{} bytes]", payload.len())?,
            Some(payload) if payload.is_empty() => write!(f, " = <marker>")?,
            Some(payload) if payload.len() > HEX_PREVIEW => write!(
                f,
                " = {}.. ({} bytes)",
                hex::encode(&payload[..HEX_PREVIEW]),
                payload.len()
            )?,
            Some(payload) => write!(f, " = {}", hex::encode(payload))?,
            None => {}
        }
        writeln!(f)?;

        if let Some(inner) = &self.inner {
            inner.write_tree(f, depth + 1)?;
        }
        for child in &self.children {
            child.write_tree(f, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for InspectNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_tree(f, 0)
    }
}

fn envelope_field(tag: u8) -> Option<&'static str> {
    match tag {
        0x01 => Some("SourceId"),
        0x02 => Some("To"),
        0x03 => Some("From"),
        _ => None,
    }
}

/// Annotate a packet of any family.
///
/// Unknown root tags are still dumped, just without names.
///
/// # Errors
///
/// Returns a [`PacketError`] if the bytes are not a well-formed frame.
pub fn inspect(data: &[u8]) -> Result<InspectNode, PacketError> {
    let frame = Frame::decode(data)?;

    let Ok(root) = RootTag::try_from(frame.tag()) else {
        return Ok(InspectNode::plain(&frame, None));
    };
    let name = Some(root.name());

    let node = match root {
        RootTag::Network => {
            let mut node = InspectNode::named(&frame, name, envelope_field);
            if let Some(inner) = frame.payload().and_then(|p| Frame::decode(p).ok()) {
                let inner_node = match NetworkTag::try_from(inner.tag()) {
                    Ok(tag) => InspectNode::named(&inner, Some(tag.name()), |c| tag.field_name(c)),
                    Err(_) => InspectNode::plain(&inner, None),
                };
                node.inner = Some(Box::new(inner_node));
            }
            node
        }
        RootTag::Channel => {
            let mut node = InspectNode::plain(&frame, name);
            for (node_child, child) in node.children.iter_mut().zip(frame.children()) {
                if let Ok(tag) = ChannelTag::try_from(child.tag()) {
                    *node_child = InspectNode::named(child, Some(tag.name()), |c| tag.field_name(c));
                }
            }
            node
        }
        RootTag::Datagram => InspectNode::named(&frame, name, datagram::field_name),
        RootTag::Padding => InspectNode::plain(&frame, name),
        RootTag::CachedContact => InspectNode::named(&frame, name, CachedContact::field_name),
        RootTag::CachedWebCache => InspectNode::named(&frame, name, CachedWebCache::field_name),
    };

    Ok(node)
}

/// Render a packet as an indented text tree
///
/// # Errors
///
/// Returns a [`PacketError`] if the bytes are not a well-formed frame.
pub fn describe(data: &[u8]) -> Result<String, PacketError> {
    Ok(inspect(data)?.to_string())
}
