//! Fuzz target for the frame codec
//!
//! Arbitrary bytes must decode to an error or to a tree that survives re-encoding.

#![no_main]

use lattice_core::frame::{Frame, FrameView};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(frame) = Frame::decode(data) {
        assert_eq!(Frame::decode(&frame.encode()).as_ref(), Ok(&frame));
    }

    // Walk a stream of concatenated frames the way a reader would
    let mut rest = data;
    while let Ok((view, tail)) = FrameView::parse_prefix(rest) {
        for child in view.children() {
            if child.is_err() {
                break;
            }
        }
        if tail.len() == rest.len() {
            break;
        }
        rest = tail;
    }
});
