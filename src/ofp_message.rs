//! Version-agnostic API for handling OpenFlow messages at the byte-buffer
//! level, and the registry of protocol versions this crate understands.

use crate::error::CodecError;
use crate::ofp_header::{OfpHeader, OFP_HEADER_SIZE};
use crate::openflow0x02::message::Message;
use crate::openflow0x02::OFP_VERSION;

/// OpenFlow protocol versions, by wire version byte.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OfpVersion {
    OpenFlow0x02,
}

impl OfpVersion {
    /// Map a header version byte to a supported protocol version.
    pub fn of_int(version: u8) -> Result<OfpVersion, CodecError> {
        match version {
            OFP_VERSION => Ok(OfpVersion::OpenFlow0x02),
            v => Err(CodecError::UnsupportedVersion { version: v }),
        }
    }

    /// The wire version byte written into headers.
    pub fn to_int(v: OfpVersion) -> u8 {
        match v {
            OfpVersion::OpenFlow0x02 => OFP_VERSION,
        }
    }
}

/// OpenFlow Message
///
/// Version-agnostic API for handling OpenFlow messages at the byte-buffer level.
pub trait OfpMessage: Sized {
    /// Return the byte-size of an `OfpMessage`.
    fn size_of(msg: &Self) -> usize;
    /// Create an `OfpHeader` for the given transaction id and OpenFlow message.
    fn header_of(xid: u32, msg: &Self) -> OfpHeader;
    /// Return a marshaled buffer containing an OpenFlow header and the message `msg`.
    fn marshal(xid: u32, msg: Self) -> Vec<u8>;
    /// Returns a pair `(u32, OfpMessage)` of the transaction id and OpenFlow message parsed from
    /// the given OpenFlow header `header`, and buffer `buf`.
    fn parse(header: &OfpHeader, buf: &[u8]) -> Result<(u32, Self), CodecError>;
}

/// One message decoded from the front of a buffer, along with how many bytes
/// of that buffer it occupied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedMessage {
    pub consumed: usize,
    pub xid: u32,
    pub message: Message,
}

/// Decode the message at the front of `buf`.
///
/// The buffer must hold at least the `length` declared in the leading header;
/// callers reading from a stream buffer until that is true. Bytes past the
/// declared length are left untouched, so back-to-back messages decode one
/// call at a time.
pub fn parse_buffer(buf: &[u8]) -> Result<DecodedMessage, CodecError> {
    let header = OfpHeader::parse(buf)?;
    let total = header.length();
    if total < OFP_HEADER_SIZE {
        return Err(CodecError::MalformedHeader {
            needed: OFP_HEADER_SIZE,
            available: total,
        });
    }
    if buf.len() < total {
        return Err(CodecError::BufferUnderrun {
            needed: total,
            available: buf.len(),
        });
    }
    OfpVersion::of_int(header.version())?;
    let (xid, message) = Message::parse(&header, &buf[OFP_HEADER_SIZE..total])?;
    Ok(DecodedMessage {
        consumed: total,
        xid,
        message,
    })
}
