//! Nested tag/length/value frame codec.
//!
//! Every message on the wire is a tree of frames. A frame carries a one-byte
//! tag, an optional payload, and any number of child frames:
//!
//! ```text
//! frame   = tag (u8) | control (u8) | body_len (varint) | body
//! control = bit0: payload present, bit1: children present, bits 2-7 reserved
//! body    = [payload_len (varint) | payload]  if payload present
//!           child frame*                      fills the rest of body_len
//! varint  = unsigned LEB128, at most 10 bytes
//! ```
//!
//! There is no end-of-children marker: the parent's `body_len`, computed after
//! the children are serialised, bounds the children region. A payload may be
//! present and empty, which is how zero-length marker children are written.
//!
//! [`Frame`] is the owned tree used for encoding and for full decodes.
//! [`FrameView`] parses one header at a time without copying, and its
//! [`Children`] iterator walks a parent's children one by one.

use crate::error::FrameError;
use parking_lot::Mutex;

/// Control bit: payload present
pub const FLAG_PAYLOAD: u8 = 0b0000_0001;

/// Control bit: children present
pub const FLAG_CHILDREN: u8 = 0b0000_0010;

const RESERVED_MASK: u8 = !(FLAG_PAYLOAD | FLAG_CHILDREN);

/// Smallest possible encoded frame (tag, control, zero body length)
pub const MIN_FRAME_SIZE: usize = 3;

/// Deepest nesting accepted by [`Frame::decode`]
pub const MAX_DEPTH: usize = 32;

const MAX_VARINT_LEN: usize = 10;

/// Append `value` as an unsigned LEB128 varint.
pub fn write_varint(out: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        out.push((value as u8) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

/// Encoded size of `value` as a varint.
#[must_use]
pub fn varint_len(value: u64) -> usize {
    let mut len = 1;
    let mut rest = value >> 7;
    while rest != 0 {
        len += 1;
        rest >>= 7;
    }
    len
}

/// Read an unsigned LEB128 varint, returning the value and bytes consumed.
///
/// # Errors
///
/// Returns `FrameError::TooShort` if the buffer ends mid-varint and
/// `FrameError::VarintOverflow` if it does not fit in a `u64`.
pub fn read_varint(data: &[u8]) -> Result<(u64, usize), FrameError> {
    let mut value = 0u64;
    for (i, &byte) in data.iter().enumerate().take(MAX_VARINT_LEN) {
        let bits = u64::from(byte & 0x7F);
        if i == MAX_VARINT_LEN - 1 && bits > 1 {
            return Err(FrameError::VarintOverflow);
        }
        value |= bits << (7 * i);
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }

    if data.len() >= MAX_VARINT_LEN {
        Err(FrameError::VarintOverflow)
    } else {
        Err(FrameError::TooShort {
            expected: data.len() + 1,
            actual: data.len(),
        })
    }
}

/// Owned frame tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    tag: u8,
    payload: Option<Vec<u8>>,
    children: Vec<Frame>,
}

impl Frame {
    /// Create a frame with no payload and no children
    #[must_use]
    pub fn new(tag: u8) -> Self {
        Self {
            tag,
            payload: None,
            children: Vec::new(),
        }
    }

    /// Create a frame carrying only a payload
    #[must_use]
    pub fn leaf(tag: u8, payload: impl Into<Vec<u8>>) -> Self {
        Self::new(tag).with_payload(payload)
    }

    /// Create a zero-length marker frame (payload present, empty)
    #[must_use]
    pub fn marker(tag: u8) -> Self {
        Self::leaf(tag, Vec::new())
    }

    /// Set the payload
    #[must_use]
    pub fn with_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    /// Append a child
    #[must_use]
    pub fn with_child(mut self, child: Frame) -> Self {
        self.children.push(child);
        self
    }

    /// Append a child in place
    pub fn push_child(&mut self, child: Frame) {
        self.children.push(child);
    }

    /// Frame tag
    #[must_use]
    pub fn tag(&self) -> u8 {
        self.tag
    }

    /// Payload, if present
    #[must_use]
    pub fn payload(&self) -> Option<&[u8]> {
        self.payload.as_deref()
    }

    /// Children in wire order
    #[must_use]
    pub fn children(&self) -> &[Frame] {
        &self.children
    }

    /// First child with the given tag
    #[must_use]
    pub fn child(&self, tag: u8) -> Option<&Frame> {
        self.children.iter().find(|c| c.tag == tag)
    }

    /// Exact encoded size of this frame
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        let body = self.body_len();
        2 + varint_len(body as u64) + body
    }

    fn body_len(&self) -> usize {
        let payload = self
            .payload
            .as_ref()
            .map_or(0, |p| varint_len(p.len() as u64) + p.len());
        payload + self.children.iter().map(Frame::encoded_len).sum::<usize>()
    }

    /// Encode into a fresh buffer
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut out);
        out
    }

    /// Append the encoding to `out`
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        let mut body = Vec::new();
        let mut control = 0u8;

        if let Some(payload) = &self.payload {
            control |= FLAG_PAYLOAD;
            write_varint(&mut body, payload.len() as u64);
            body.extend_from_slice(payload);
        }
        if !self.children.is_empty() {
            control |= FLAG_CHILDREN;
            for child in &self.children {
                child.encode_into(&mut body);
            }
        }

        out.push(self.tag);
        out.push(control);
        write_varint(out, body.len() as u64);
        out.extend_from_slice(&body);
    }

    /// Decode exactly one frame tree from `data`.
    ///
    /// # Errors
    ///
    /// Returns a [`FrameError`] for truncated, overlong, or otherwise malformed input.
    pub fn decode(data: &[u8]) -> Result<Self, FrameError> {
        FrameView::parse(data)?.to_frame()
    }
}

/// Zero-copy view of one frame inside a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameView<'a> {
    tag: u8,
    payload: Option<&'a [u8]>,
    children: &'a [u8],
}

impl<'a> FrameView<'a> {
    /// Parse a frame that must span all of `data`.
    ///
    /// Only this frame's header is validated; children are checked as they
    /// are read.
    ///
    /// # Errors
    ///
    /// Returns a [`FrameError`] for malformed input or trailing bytes.
    pub fn parse(data: &'a [u8]) -> Result<Self, FrameError> {
        let (view, rest) = Self::parse_prefix(data)?;
        if !rest.is_empty() {
            return Err(FrameError::TrailingBytes(rest.len()));
        }
        Ok(view)
    }

    /// Parse the frame at the start of `data`, returning the unread remainder.
    ///
    /// # Errors
    ///
    /// Returns a [`FrameError`] for malformed input.
    pub fn parse_prefix(data: &'a [u8]) -> Result<(Self, &'a [u8]), FrameError> {
        if data.len() < MIN_FRAME_SIZE {
            return Err(FrameError::TooShort {
                expected: MIN_FRAME_SIZE,
                actual: data.len(),
            });
        }

        let tag = data[0];
        let control = data[1];
        if control & RESERVED_MASK != 0 {
            return Err(FrameError::ReservedFlags(control));
        }

        let (declared, header_extra) = read_varint(&data[2..])?;
        let start = 2 + header_extra;
        let available = data.len() - start;
        let body_len = usize::try_from(declared)
            .ok()
            .filter(|&len| len <= available)
            .ok_or(FrameError::LengthOverflow {
                declared,
                available,
            })?;
        let end = start + body_len;
        let body = &data[start..end];

        let (payload, children) = if control & FLAG_PAYLOAD != 0 {
            let (declared, consumed) = read_varint(body)?;
            let remaining = body.len() - consumed;
            let payload_len = usize::try_from(declared)
                .ok()
                .filter(|&len| len <= remaining)
                .ok_or(FrameError::PayloadOverflow)?;
            let payload_end = consumed + payload_len;
            (Some(&body[consumed..payload_end]), &body[payload_end..])
        } else {
            (None, body)
        };

        let has_children = control & FLAG_CHILDREN != 0;
        if has_children == children.is_empty() {
            return Err(FrameError::ChildrenMismatch);
        }

        Ok((
            Self {
                tag,
                payload,
                children,
            },
            &data[end..],
        ))
    }

    /// Frame tag
    #[must_use]
    pub fn tag(&self) -> u8 {
        self.tag
    }

    /// Payload, if present
    #[must_use]
    pub fn payload(&self) -> Option<&'a [u8]> {
        self.payload
    }

    /// Whether the frame has any children
    #[must_use]
    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// Iterate over the children without materialising them
    #[must_use]
    pub fn children(&self) -> Children<'a> {
        Children {
            rest: self.children,
        }
    }

    /// Convert into an owned tree, validating every descendant.
    ///
    /// # Errors
    ///
    /// Returns a [`FrameError`] for any malformed descendant or excessive depth.
    pub fn to_frame(&self) -> Result<Frame, FrameError> {
        self.to_frame_at(0)
    }

    fn to_frame_at(&self, depth: usize) -> Result<Frame, FrameError> {
        if depth >= MAX_DEPTH {
            return Err(FrameError::TooDeep(MAX_DEPTH));
        }

        let mut children = Vec::new();
        for child in self.children() {
            children.push(child?.to_frame_at(depth + 1)?);
        }

        Ok(Frame {
            tag: self.tag,
            payload: self.payload.map(<[u8]>::to_vec),
            children,
        })
    }
}

/// Streaming reader over a parent's children region.
///
/// After a malformed child the iterator yields the error once and then ends.
#[derive(Debug, Clone)]
pub struct Children<'a> {
    rest: &'a [u8],
}

impl<'a> Children<'a> {
    /// Read the next child frame
    pub fn next_child(&mut self) -> Option<Result<FrameView<'a>, FrameError>> {
        if self.rest.is_empty() {
            return None;
        }

        match FrameView::parse_prefix(self.rest) {
            Ok((view, rest)) => {
                self.rest = rest;
                Some(Ok(view))
            }
            Err(e) => {
                self.rest = &[];
                Some(Err(e))
            }
        }
    }
}

impl<'a> Iterator for Children<'a> {
    type Item = Result<FrameView<'a>, FrameError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_child()
    }
}

/// Shared encoder for one protocol instance.
///
/// Several senders may format frames through the same writer; the scratch
/// buffer is guarded by a mutex so each encode runs as a critical section.
#[derive(Debug, Default)]
pub struct FrameWriter {
    buffer: Mutex<Vec<u8>>,
}

impl FrameWriter {
    /// Create a writer with a pre-sized scratch buffer
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Mutex::new(Vec::with_capacity(capacity)),
        }
    }

    /// Encode `frame` and return an owned copy of the bytes
    #[must_use]
    pub fn write(&self, frame: &Frame) -> Vec<u8> {
        self.write_with(frame, <[u8]>::to_vec)
    }

    /// Encode `frame` and hand the encoded bytes to `sink` while the buffer is held
    pub fn write_with<R>(&self, frame: &Frame, sink: impl FnOnce(&[u8]) -> R) -> R {
        let mut buffer = self.buffer.lock();
        buffer.clear();
        frame.encode_into(&mut buffer);
        sink(&buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Frame {
        Frame::new(0x10)
            .with_payload(b"root".to_vec())
            .with_child(Frame::leaf(0x01, 42u64.to_le_bytes()))
            .with_child(Frame::marker(0x20))
            .with_child(
                Frame::new(0x30)
                    .with_child(Frame::leaf(0x31, b"deep".to_vec()))
                    .with_child(Frame::new(0x32)),
            )
    }

    #[test]
    fn test_frame_roundtrip() {
        let frame = sample();
        let bytes = frame.encode();
        assert_eq!(bytes.len(), frame.encoded_len());
        assert_eq!(Frame::decode(&bytes).unwrap(), frame);
    }

    #[test]
    fn test_bare_frame_bytes() {
        assert_eq!(Frame::new(0x40).encode(), vec![0x40, 0x00, 0x00]);
        assert_eq!(Frame::marker(0x40).encode(), vec![0x40, 0x01, 0x01, 0x00]);
        assert_eq!(
            Frame::leaf(0x40, vec![0xAB]).encode(),
            vec![0x40, 0x01, 0x02, 0x01, 0xAB]
        );
    }

    #[test]
    fn test_empty_payload_distinct_from_absent() {
        let absent = Frame::decode(&Frame::new(1).encode()).unwrap();
        let empty = Frame::decode(&Frame::marker(1).encode()).unwrap();
        assert_eq!(absent.payload(), None);
        assert_eq!(empty.payload(), Some(&[][..]));
    }

    #[test]
    fn test_varint_roundtrip_edges() {
        for value in [0u64, 1, 127, 128, 300, 16_383, 16_384, u64::from(u32::MAX), u64::MAX] {
            let mut buf = Vec::new();
            write_varint(&mut buf, value);
            assert_eq!(buf.len(), varint_len(value));
            assert_eq!(read_varint(&buf).unwrap(), (value, buf.len()));
        }
    }

    #[test]
    fn test_varint_overflow() {
        let buf = [0xFFu8; 11];
        assert_eq!(read_varint(&buf), Err(FrameError::VarintOverflow));
        let mut ten = [0x80u8; 10];
        ten[9] = 0x02;
        assert_eq!(read_varint(&ten), Err(FrameError::VarintOverflow));
    }

    #[test]
    fn test_frame_too_short() {
        assert!(matches!(
            Frame::decode(&[0x10, 0x00]),
            Err(FrameError::TooShort { .. })
        ));
    }

    #[test]
    fn test_declared_length_exceeds_buffer() {
        let mut bytes = sample().encode();
        bytes.truncate(bytes.len() - 1);
        assert!(matches!(
            Frame::decode(&bytes),
            Err(FrameError::LengthOverflow { .. })
        ));
    }

    #[test]
    fn test_payload_overflow() {
        // body_len 2, payload_len 5
        assert_eq!(
            Frame::decode(&[0x10, FLAG_PAYLOAD, 0x02, 0x05, 0xAA]),
            Err(FrameError::PayloadOverflow)
        );
    }

    #[test]
    fn test_reserved_flags_rejected() {
        assert_eq!(
            Frame::decode(&[0x10, 0x80, 0x00]),
            Err(FrameError::ReservedFlags(0x80))
        );
    }

    #[test]
    fn test_children_flag_mismatch() {
        assert_eq!(
            Frame::decode(&[0x10, FLAG_CHILDREN, 0x00]),
            Err(FrameError::ChildrenMismatch)
        );
        assert_eq!(
            Frame::decode(&[0x10, 0x00, 0x03, 0x01, 0x00, 0x00]),
            Err(FrameError::ChildrenMismatch)
        );
    }

    #[test]
    fn test_trailing_bytes() {
        let mut bytes = Frame::new(1).encode();
        bytes.push(0);
        assert_eq!(Frame::decode(&bytes), Err(FrameError::TrailingBytes(1)));
    }

    #[test]
    fn test_parse_prefix_returns_rest() {
        let mut bytes = Frame::marker(7).encode();
        bytes.extend_from_slice(&Frame::new(8).encode());
        let (first, rest) = FrameView::parse_prefix(&bytes).unwrap();
        assert_eq!(first.tag(), 7);
        assert_eq!(FrameView::parse(rest).unwrap().tag(), 8);
    }

    #[test]
    fn test_children_stream_one_at_a_time() {
        let bytes = sample().encode();
        let view = FrameView::parse(&bytes).unwrap();
        assert_eq!(view.payload(), Some(&b"root"[..]));

        let mut children = view.children();
        let first = children.next_child().unwrap().unwrap();
        assert_eq!(first.tag(), 0x01);
        assert_eq!(first.payload(), Some(&42u64.to_le_bytes()[..]));
        assert_eq!(children.next_child().unwrap().unwrap().tag(), 0x20);
        let nested = children.next_child().unwrap().unwrap();
        assert_eq!(nested.children().count(), 2);
        assert!(children.next_child().is_none());
    }

    #[test]
    fn test_bad_child_reported_after_good_ones() {
        let mut body = Frame::marker(1).encode();
        body.extend_from_slice(&[0x02, 0x00, 0x09]);
        let mut bytes = vec![0x10, FLAG_CHILDREN];
        write_varint(&mut bytes, body.len() as u64);
        bytes.extend_from_slice(&body);

        let view = FrameView::parse(&bytes).unwrap();
        let items: Vec<_> = view.children().collect();
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(items[1].is_err());
        assert!(Frame::decode(&bytes).is_err());
    }

    #[test]
    fn test_depth_limit() {
        let mut frame = Frame::new(0);
        for _ in 0..MAX_DEPTH {
            frame = Frame::new(0).with_child(frame);
        }
        assert_eq!(
            Frame::decode(&frame.encode()),
            Err(FrameError::TooDeep(MAX_DEPTH))
        );
    }

    #[test]
    fn test_writer_shared_across_threads() {
        let writer = FrameWriter::with_capacity(64);
        let expected = sample().encode();

        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..100 {
                        assert_eq!(writer.write(&sample()), expected);
                    }
                });
            }
        });
    }

    #[test]
    fn test_writer_sink_sees_encoding() {
        let writer = FrameWriter::default();
        let len = writer.write_with(&Frame::marker(3), |bytes| bytes.len());
        assert_eq!(len, 4);
    }
}
