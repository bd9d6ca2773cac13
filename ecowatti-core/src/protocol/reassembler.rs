use tracing::trace;

use super::*;

/// Buffered bytes kept while no frame marker has been seen.
const MAX_UNMARKED_BYTES: usize = 4096;

/// Reassembles frames from a byte stream that arrives in arbitrary chunks.
///
/// Frames have no trailing delimiter: a frame starts at the first marker byte
/// and ends where its declared size says. A marker value inside a payload is
/// indistinguishable from a real frame start, so junk can occasionally
/// produce a false frame; the decoder's length and discriminator checks are
/// what keep those from being interpreted.
#[derive(Debug, Default)]
pub struct StreamReassembler {
    buf: Vec<u8>,
}

impl StreamReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);

        if self.buf.len() > MAX_UNMARKED_BYTES && !self.buf.contains(&FRAME_MARKER) {
            trace!(dropped = self.buf.len(), "Dropping unmarked bytes");
            self.buf.clear();
        }
    }

    /// Drain every complete frame currently buffered, front to back.
    ///
    /// Frames are decoded lazily; bytes are consumed only as each frame is
    /// confirmed complete. An incomplete trailing frame stays buffered.
    pub fn drain_frames(&mut self) -> Drain<'_> {
        Drain { reassembler: self }
    }

    /// Bytes received but not yet consumed by a frame.
    pub fn buffered(&self) -> &[u8] {
        &self.buf
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    fn next_frame(&mut self) -> Option<Frame> {
        loop {
            let start = self.buf.iter().position(|&b| b == FRAME_MARKER)?;

            let decoded = match Frame::decode(&self.buf[start..]) {
                Ok(decoded) => decoded,
                // The window always starts at the marker we just found.
                Err(_) => return None,
            };

            match decoded {
                Decoded::Incomplete { needed, available } => {
                    trace!(needed, available, "Waiting for the rest of the frame");
                    return None;
                }
                Decoded::Ignored { consumed } => {
                    trace!("Skipping zero-size frame");
                    self.buf.drain(..start + consumed);
                }
                Decoded::Frame { frame, consumed } => {
                    self.buf.drain(..start + consumed);
                    return Some(frame);
                }
            }
        }
    }
}

/// Iterator returned by [`StreamReassembler::drain_frames`].
pub struct Drain<'a> {
    reassembler: &'a mut StreamReassembler,
}

impl Iterator for Drain<'_> {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        self.reassembler.next_frame()
    }
}
