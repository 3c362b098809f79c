//! Tokio codec for Aquatron frames.
//!
//! [`PacketCodec`] plugs the frame scanner into `tokio_util`'s
//! [`FramedRead`]/[`Framed`] machinery so stream transports (TCP, the
//! instrument emulator) get resynchronizing frame extraction for free.
//!
//! ```text
//! TcpStream -> Decoder -> Frame (validated)
//! Frame     -> Encoder -> TcpStream
//! ```
//!
//! # Usage with Tokio Framed
//!
//! ```rust,no_run
//! use tokio::net::TcpStream;
//! use tokio_util::codec::Framed;
//! use aquatron_protocol::{CommandCode, Frame, PacketCodec};
//! use futures::{SinkExt, StreamExt};
//!
//! # async fn example() -> aquatron_core::Result<()> {
//! let stream = TcpStream::connect("127.0.0.1:3333").await?;
//! let mut framed = Framed::new(stream, PacketCodec::new());
//!
//! framed.send(Frame::command_only(CommandCode::GetDeviceReady)).await?;
//!
//! if let Some(Ok(frame)) = framed.next().await {
//!     println!("Received: {}", frame);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Decoding never fails on malformed input: corrupted bytes are skipped the
//! same way the [`Reassembler`](crate::Reassembler) skips them. Errors only
//! come from the underlying I/O.
//!
//! [`FramedRead`]: tokio_util::codec::FramedRead
//! [`Framed`]: tokio_util::codec::Framed

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::frame::{Frame, scan_first};
use aquatron_core::{Error, Result};

#[derive(Debug, Clone, Copy, Default)]
pub struct PacketCodec {
    _private: (),
}

impl PacketCodec {
    /// ```
    /// use aquatron_protocol::PacketCodec;
    ///
    /// let codec = PacketCodec::new();
    /// ```
    pub fn new() -> Self {
        Self { _private: () }
    }
}

impl Decoder for PacketCodec {
    type Item = Frame;
    type Error = Error;

    /// Decode the next frame from the byte stream.
    ///
    /// Garbage ahead of the frame is removed from `src`; an incomplete frame
    /// is left in place until more bytes arrive.
    ///
    /// ```
    /// use bytes::BytesMut;
    /// use tokio_util::codec::Decoder;
    /// use aquatron_protocol::PacketCodec;
    ///
    /// let mut codec = PacketCodec::new();
    /// let mut buffer = BytesMut::from(&[0x00, 0xAA, 0x03, 0x00, 0xA9, 0x55, 0xAA][..]);
    ///
    /// let frame = codec.decode(&mut buffer).unwrap().unwrap();
    /// assert_eq!(frame.cmd(), 0x03);
    /// assert_eq!(&buffer[..], &[0xAA]);
    /// ```
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        let (frame, consumed) = scan_first(src);
        src.advance(consumed);
        Ok(frame)
    }
}

impl Encoder<Frame> for PacketCodec {
    type Error = Error;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<()> {
        dst.extend_from_slice(item.as_bytes());
        Ok(())
    }
}

impl Encoder<&Frame> for PacketCodec {
    type Error = Error;

    fn encode(&mut self, item: &Frame, dst: &mut BytesMut) -> Result<()> {
        dst.extend_from_slice(item.as_bytes());
        Ok(())
    }
}
