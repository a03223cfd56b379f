use crate::bytes::ByteCursor;
use crate::error::CodecError;

/// Byte-size of the common OpenFlow header.
pub const OFP_HEADER_SIZE: usize = 8;

/// Offset of the `version` byte. Common to every protocol version, so the
/// dialect of a buffer can be determined before anything else is decoded.
pub const VERSION_OFFSET: usize = 0;
/// Offset of the message type byte.
pub const TYPE_OFFSET: usize = 1;
/// Offset of the 16-bit total message length.
pub const LENGTH_OFFSET: usize = 2;
/// Offset of the 32-bit transaction id.
pub const XID_OFFSET: usize = 4;

/// OpenFlow Header
///
/// The first fields of every OpenFlow message, no matter the protocol version.
/// This is parsed to determine version and length of the remaining message, so
/// that it can be properly handled. The type byte is kept raw here; it is only
/// meaningful relative to the version, and the registry interprets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OfpHeader {
    version: u8,
    typ: u8,
    length: u16,
    xid: u32,
}

impl OfpHeader {
    /// Create an `OfpHeader` out of the arguments.
    pub fn new(version: u8, typ: u8, length: u16, xid: u32) -> OfpHeader {
        OfpHeader {
            version,
            typ,
            length,
            xid,
        }
    }

    /// Return the byte-size of an `OfpHeader`.
    pub fn size() -> usize {
        OFP_HEADER_SIZE
    }

    /// Fills a message buffer with the header fields of an `OfpHeader`.
    pub fn marshal(bytes: &mut Vec<u8>, header: OfpHeader) {
        bytes.push(header.version);
        bytes.push(header.typ);
        bytes.extend_from_slice(&header.length.to_be_bytes());
        bytes.extend_from_slice(&header.xid.to_be_bytes());
    }

    /// Parse an `OfpHeader` from the front of `buf`.
    pub fn parse(buf: &[u8]) -> Result<OfpHeader, CodecError> {
        if buf.len() < OFP_HEADER_SIZE {
            return Err(CodecError::MalformedHeader {
                needed: OFP_HEADER_SIZE,
                available: buf.len(),
            });
        }
        let mut cur = ByteCursor::new(buf);
        Ok(OfpHeader {
            version: cur.read_u8()?,
            typ: cur.read_u8()?,
            length: cur.read_u16()?,
            xid: cur.read_u32()?,
        })
    }

    /// Return the `version` field of a header.
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Return the raw message type byte of a header.
    pub fn type_code(&self) -> u8 {
        self.typ
    }

    /// Return the `length` field of a header. Includes the length of the
    /// header itself.
    pub fn length(&self) -> usize {
        self.length as usize
    }

    /// Return the `xid` field of a header, the transaction id associated with
    /// this message. Replies use the same id to facilitate pairing.
    pub fn xid(&self) -> u32 {
        self.xid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marshal_then_parse() {
        let header = OfpHeader::new(0x02, 0, 8, 0xDEAD_BEEF);
        let mut bytes = Vec::new();
        OfpHeader::marshal(&mut bytes, header);
        assert_eq!(bytes, vec![0x02, 0x00, 0x00, 0x08, 0xDE, 0xAD, 0xBE, 0xEF]);

        let parsed = OfpHeader::parse(&bytes).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(parsed.version(), 0x02);
        assert_eq!(parsed.type_code(), 0);
        assert_eq!(parsed.length(), 8);
        assert_eq!(parsed.xid(), 0xDEAD_BEEF);
    }

    #[test]
    fn short_buffer_is_malformed() {
        let err = OfpHeader::parse(&[0x02, 0x00, 0x00]).unwrap_err();
        assert_eq!(
            err,
            CodecError::MalformedHeader {
                needed: OFP_HEADER_SIZE,
                available: 3,
            }
        );
    }
}
