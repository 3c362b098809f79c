use crate::commands::CommandCode;
use aquatron_core::{Error, Result, constants::*};
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

/// A validated binary frame as it travels on the wire.
///
/// # Wire Format
///
/// ```text
/// AA  <cmd>  <len>  <payload: len bytes>  <checksum>  55
/// ```
///
/// - `len` is at most [`MAX_PAYLOAD_LEN`] (64)
/// - `checksum` is the XOR of header, cmd, len and every payload byte
///
/// A `Frame` is immutable once built. It can only be obtained through
/// [`Frame::encode`] or through the scanner, so every instance satisfies the
/// checksum and terminator invariants.
///
/// # Example
///
/// ```
/// use aquatron_protocol::{CommandCode, Frame};
///
/// let frame = Frame::encode(CommandCode::GetDeviceReady, &[]).unwrap();
/// assert_eq!(frame.as_bytes(), &[0xAA, 0x02, 0x00, 0xA8, 0x55]);
/// assert_eq!(frame.command(), Some(CommandCode::GetDeviceReady));
/// assert_eq!(frame.to_string(), "AA 02 00 A8 55");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Frame {
    /// Complete wire bytes, header through end byte.
    data: Bytes,
}

impl Frame {
    /// Build a frame for `cmd` carrying `payload`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PayloadTooLarge`] if the payload exceeds 64 bytes.
    pub fn encode(cmd: impl Into<u8>, payload: &[u8]) -> Result<Self> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(Error::PayloadTooLarge {
                len: payload.len(),
                max: MAX_PAYLOAD_LEN,
            });
        }

        let cmd = cmd.into();
        let mut buf = BytesMut::with_capacity(FRAME_OVERHEAD + payload.len());
        buf.put_u8(PACKET_HEADER);
        buf.put_u8(cmd);
        buf.put_u8(payload.len() as u8);
        buf.put_slice(payload);
        let checksum = calculate_checksum(&buf);
        buf.put_u8(checksum);
        buf.put_u8(PACKET_END);

        Ok(Self { data: buf.freeze() })
    }

    /// Build a frame with no payload. Never fails.
    pub fn command_only(cmd: impl Into<u8>) -> Self {
        let cmd = cmd.into();
        let checksum = PACKET_HEADER ^ cmd;
        Self {
            data: Bytes::copy_from_slice(&[PACKET_HEADER, cmd, 0x00, checksum, PACKET_END]),
        }
    }

    /// Raw command byte.
    pub fn cmd(&self) -> u8 {
        self.data[1]
    }

    /// Typed command, if the byte is a known code.
    pub fn command(&self) -> Option<CommandCode> {
        CommandCode::from_u8(self.cmd())
    }

    /// Declared payload length.
    pub fn payload_len(&self) -> usize {
        self.data[2] as usize
    }

    pub fn payload(&self) -> &[u8] {
        &self.data[FRAME_PREFIX_LEN..FRAME_PREFIX_LEN + self.payload_len()]
    }

    pub fn checksum(&self) -> u8 {
        self.data[self.data.len() - 2]
    }

    /// Complete wire bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Bytes {
        self.data
    }

    /// Total size on the wire.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Payload rendered as uppercase hex without separators.
    pub fn payload_hex(&self) -> String {
        to_hex(self.payload())
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.data.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{:02X}", byte)?;
        }
        Ok(())
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

/// XOR of every byte in `bytes`.
pub fn calculate_checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, &b| acc ^ b)
}

/// Uppercase hex rendering used for `raw` fields and device ids.
pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02X}", b)).collect()
}

/// Result of checking for a frame at the start of a buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Candidate {
    /// A valid frame of the given total size.
    Valid(usize),
    /// Not a frame here; resume one byte later.
    Invalid,
    /// Could be a frame but the buffer ends first.
    Incomplete,
}

fn check_candidate(buf: &[u8]) -> Candidate {
    if buf.first() != Some(&PACKET_HEADER) {
        return Candidate::Invalid;
    }
    if buf.len() < FRAME_PREFIX_LEN {
        return Candidate::Incomplete;
    }

    let len = buf[2] as usize;
    if len > MAX_PAYLOAD_LEN {
        return Candidate::Invalid;
    }

    let total = FRAME_OVERHEAD + len;
    if buf.len() < total {
        return Candidate::Incomplete;
    }

    let checksum_pos = FRAME_PREFIX_LEN + len;
    if buf[total - 1] != PACKET_END || calculate_checksum(&buf[..checksum_pos]) != buf[checksum_pos] {
        return Candidate::Invalid;
    }

    Candidate::Valid(total)
}

/// Find the first valid frame in `buf`.
///
/// Returns the frame (if any) and the number of leading bytes that can be
/// dropped: garbage skipped during resynchronization plus the frame itself.
///
/// A candidate whose declared length runs past the buffer is held back,
/// unless a complete valid frame already starts after it. In that case the
/// candidate is a corrupted header and the scanner resumes at that frame.
pub fn scan_first(buf: &[u8]) -> (Option<Frame>, usize) {
    let mut offset = 0;

    while offset < buf.len() {
        match check_candidate(&buf[offset..]) {
            Candidate::Valid(size) => {
                let frame = Frame {
                    data: Bytes::copy_from_slice(&buf[offset..offset + size]),
                };
                return (Some(frame), offset + size);
            }
            Candidate::Invalid => offset += 1,
            Candidate::Incomplete => match next_valid(&buf[offset + 1..]) {
                Some(skip) => offset += 1 + skip,
                None => return (None, offset),
            },
        }
    }

    (None, offset)
}

/// Offset of the first complete valid frame in `buf`.
fn next_valid(buf: &[u8]) -> Option<usize> {
    (0..buf.len()).find(|&i| matches!(check_candidate(&buf[i..]), Candidate::Valid(_)))
}

/// Frames found by [`scan`] and how many bytes they used up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanOutcome {
    pub frames: Vec<Frame>,
    pub consumed: usize,
}

/// Extract every complete frame from `buf`.
///
/// Bad checksums, wrong end bytes and oversized lengths make the scanner
/// advance one byte and try again. So does a length that points past the end
/// of the buffer when a valid frame follows. Bytes from `consumed` onward
/// belong to an incomplete frame and must be kept for the next call.
///
/// # Example
///
/// ```
/// use aquatron_protocol::frame::scan;
///
/// let mut bytes = vec![0x00, 0x13];
/// bytes.extend_from_slice(&[0xAA, 0x03, 0x00, 0xA9, 0x55]);
/// bytes.extend_from_slice(&[0xAA, 0x05]);
///
/// let outcome = scan(&bytes);
/// assert_eq!(outcome.frames.len(), 1);
/// assert_eq!(outcome.consumed, 7);
/// ```
pub fn scan(buf: &[u8]) -> ScanOutcome {
    let mut outcome = ScanOutcome::default();

    loop {
        let (frame, consumed) = scan_first(&buf[outcome.consumed..]);
        outcome.consumed += consumed;
        match frame {
            Some(frame) => outcome.frames.push(frame),
            None => break,
        }
    }

    outcome
}
