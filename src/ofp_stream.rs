//! Reassembly of OpenFlow messages from a byte stream.
//!
//! TCP hands the controller arbitrary chunks; a chunk can hold a partial
//! message, several messages, or the tail of one and the head of the next.
//! `OfpStream` buffers chunks and yields every complete message framed by the
//! `length` field of its header.

use byteorder::{BigEndian, ByteOrder};

use crate::error::CodecError;
use crate::ofp_header::{LENGTH_OFFSET, OFP_HEADER_SIZE};
use crate::ofp_message::{parse_buffer, DecodedMessage};

/// Accumulates stream bytes and splits them into OpenFlow messages.
#[derive(Debug, Default)]
pub struct OfpStream {
    buf: Vec<u8>,
    poisoned: bool,
}

impl OfpStream {
    pub fn new() -> OfpStream {
        OfpStream::default()
    }

    /// Bytes buffered but not yet framed into a message.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// True once framing has been lost. A poisoned stream stays silent; the
    /// underlying connection has to be dropped.
    pub fn poisoned(&self) -> bool {
        self.poisoned
    }

    /// Feed one chunk of stream bytes and collect every message completed by
    /// it, in arrival order.
    ///
    /// A message that decodes as unsupported (foreign version byte or a type
    /// code outside the handled set) is reported as an error item and skipped
    /// over; its `length` field still frames it, so later messages survive.
    /// Any other decode failure means the peer and this stream no longer
    /// agree on framing, and the stream poisons itself.
    pub fn receive(&mut self, chunk: &[u8]) -> Vec<Result<DecodedMessage, CodecError>> {
        if self.poisoned {
            return vec![];
        }
        self.buf.extend_from_slice(chunk);
        let mut out = vec![];
        loop {
            if self.buf.len() < OFP_HEADER_SIZE {
                break;
            }
            let total = BigEndian::read_u16(&self.buf[LENGTH_OFFSET..]) as usize;
            if total < OFP_HEADER_SIZE {
                // No length to resynchronize on.
                out.push(Err(CodecError::MalformedHeader {
                    needed: OFP_HEADER_SIZE,
                    available: total,
                }));
                self.poisoned = true;
                break;
            }
            if self.buf.len() < total {
                break;
            }
            match parse_buffer(&self.buf[..total]) {
                Ok(decoded) => {
                    self.buf.drain(..total);
                    out.push(Ok(decoded));
                }
                Err(err) => {
                    let recoverable = matches!(
                        err,
                        CodecError::UnsupportedVersion { .. }
                            | CodecError::UnsupportedMessageType { .. }
                    );
                    out.push(Err(err));
                    if recoverable {
                        self.buf.drain(..total);
                    } else {
                        self.poisoned = true;
                        break;
                    }
                }
            }
        }
        out
    }
}
