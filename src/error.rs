//! Error types for the OpenFlow codec and the flow channel.

use std::io;

use thiserror::Error;

use crate::ofp_channel::ChannelState;

/// Errors raised while decoding OpenFlow wire data.
///
/// Decoders never return partially populated messages: any of these means
/// the affected message is unusable. In-body errors additionally mean the
/// byte-stream position can no longer be trusted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Fewer bytes than a full header, or a length field smaller than the
    /// header itself.
    #[error("malformed header: need {needed} bytes, {available} available")]
    MalformedHeader { needed: usize, available: usize },

    /// The version byte names a protocol dialect this crate does not speak.
    #[error("unsupported OpenFlow version {version:#04x}")]
    UnsupportedVersion { version: u8 },

    /// The type byte is not registered for the given version.
    #[error("unsupported message type {type_code} for version {version:#04x}")]
    UnsupportedMessageType { version: u8, type_code: u8 },

    /// A nested structure carries a type tag outside the supported subset.
    #[error("unsupported {structure} type {type_code}")]
    UnsupportedStructureType {
        structure: &'static str,
        type_code: u32,
    },

    /// A declared length disagrees with the bytes actually present.
    #[error("{structure} length mismatch: declared {declared}, actual {actual}")]
    LengthMismatch {
        structure: &'static str,
        declared: usize,
        actual: usize,
    },

    /// A read would run past the end of the buffer.
    #[error("buffer underrun: needed {needed} bytes, {available} available")]
    BufferUnderrun { needed: usize, available: usize },
}

/// Errors raised while parsing rule-intent fields from their string forms.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    #[error("invalid IP address '{addr}'")]
    InvalidAddress { addr: String },

    #[error("invalid CIDR prefix /{prefix}: must be between 0 and 32")]
    InvalidPrefix { prefix: u32 },

    #[error("unknown protocol '{0}', expected ip, tcp, or udp")]
    UnknownProtocol(String),

    #[error("unknown direction '{0}', expected from, to, or both")]
    UnknownDirection(String),
}

/// Errors surfaced by the channel controller's public API.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The handshake has not completed. Rule intents submitted before the
    /// channel reaches `Ready` are rejected, never queued.
    #[error("channel is not ready for rule intents (state {state:?})")]
    NotReady { state: ChannelState },

    /// The transport rejected an outbound write.
    #[error("transport write failed: {0}")]
    TransportWrite(#[from] io::Error),

    /// The transport or its driver is gone.
    #[error("transport closed")]
    TransportClosed,

    /// The inbound byte stream could not be decoded.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// A rule intent could not be parsed.
    #[error(transparent)]
    Rule(#[from] RuleError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_error_display() {
        let err = CodecError::UnsupportedMessageType {
            version: 0x02,
            type_code: 19,
        };
        assert_eq!(
            err.to_string(),
            "unsupported message type 19 for version 0x02"
        );

        let err = CodecError::LengthMismatch {
            structure: "match",
            declared: 40,
            actual: 88,
        };
        assert_eq!(
            err.to_string(),
            "match length mismatch: declared 40, actual 88"
        );
    }

    #[test]
    fn channel_error_wraps_codec_error() {
        let codec = CodecError::UnsupportedVersion { version: 0x05 };
        let chan: ChannelError = codec.clone().into();
        assert_eq!(chan.to_string(), codec.to_string());
    }

    #[test]
    fn rule_error_display() {
        let err = RuleError::InvalidPrefix { prefix: 40 };
        assert_eq!(
            err.to_string(),
            "invalid CIDR prefix /40: must be between 0 and 32"
        );
    }
}
