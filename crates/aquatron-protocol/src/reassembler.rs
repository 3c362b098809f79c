//! Stream reassembler for Aquatron frames.
//!
//! Every transport delivers bytes in arbitrary chunks: a serial read may stop
//! in the middle of a frame, a TCP segment may carry three frames at once,
//! and line noise may precede a valid header. The [`Reassembler`] owns one
//! growable buffer per adapter, runs the frame scanner over it after every
//! chunk and queues the frames it finds in arrival order.
//!
//! # Usage
//!
//! ```
//! use aquatron_protocol::Reassembler;
//!
//! let mut reassembler = Reassembler::new();
//!
//! // A ready frame split across two reads
//! reassembler.feed(&[0xAA, 0x03]);
//! assert!(reassembler.next_frame().is_none());
//!
//! reassembler.feed(&[0x00, 0xA9, 0x55]);
//! let frame = reassembler.next_frame().unwrap();
//! assert_eq!(frame.cmd(), 0x03);
//! ```

use bytes::{Buf, BytesMut};
use std::collections::VecDeque;

use crate::frame::{Frame, scan};

/// Initial buffer capacity; comfortably holds a few maximum-size frames.
const INITIAL_BUFFER_CAPACITY: usize = 512;

/// Recommended initial capacity for the frame queue.
const INITIAL_FRAME_QUEUE_CAPACITY: usize = 4;

/// Per-adapter frame reassembler.
///
/// The buffer never grows without bound: the scanner discards bytes that
/// cannot start a frame, and an incomplete candidate is at most one
/// maximum-size frame long.
#[derive(Debug)]
pub struct Reassembler {
    buffer: BytesMut,
    frames: VecDeque<Frame>,
}

impl Reassembler {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            frames: VecDeque::with_capacity(INITIAL_FRAME_QUEUE_CAPACITY),
        }
    }

    /// Append a chunk and extract every frame it completes.
    ///
    /// Returns the number of frames newly queued by this call.
    pub fn feed(&mut self, chunk: &[u8]) -> usize {
        self.buffer.extend_from_slice(chunk);

        let outcome = scan(&self.buffer);
        self.buffer.advance(outcome.consumed);

        let found = outcome.frames.len();
        self.frames.extend(outcome.frames);
        found
    }

    /// Next queued frame in arrival order.
    pub fn next_frame(&mut self) -> Option<Frame> {
        self.frames.pop_front()
    }

    pub fn frames_available(&self) -> usize {
        self.frames.len()
    }

    /// Bytes held back waiting for the rest of a frame.
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }

    /// Drop buffered bytes and queued frames, e.g. after a reconnect.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.frames.clear();
    }

    /// Iterator over the currently queued frames.
    ///
    /// Does not read more data; call [`feed()`] first.
    ///
    /// ```
    /// use aquatron_protocol::Reassembler;
    ///
    /// let mut reassembler = Reassembler::new();
    /// reassembler.feed(&[0xAA, 0x03, 0x00, 0xA9, 0x55, 0xAA, 0x05, 0x00, 0xAF, 0x55]);
    ///
    /// let cmds: Vec<u8> = reassembler.drain_frames().map(|f| f.cmd()).collect();
    /// assert_eq!(cmds, vec![0x03, 0x05]);
    /// assert_eq!(reassembler.frames_available(), 0);
    /// ```
    ///
    /// [`feed()`]: Reassembler::feed
    pub fn drain_frames(&mut self) -> DrainFrames<'_> {
        DrainFrames { reassembler: self }
    }
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator returned by [`Reassembler::drain_frames`].
pub struct DrainFrames<'a> {
    reassembler: &'a mut Reassembler,
}

impl Iterator for DrainFrames<'_> {
    type Item = Frame;

    fn next(&mut self) -> Option<Self::Item> {
        self.reassembler.next_frame()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = self.reassembler.frames_available();
        (len, Some(len))
    }
}

impl ExactSizeIterator for DrainFrames<'_> {
    fn len(&self) -> usize {
        self.reassembler.frames_available()
    }
}
