//! OpenFlow 1.1 (wire version 0x02) codec and switch-channel controller.
//!
//! The crate splits along the protocol's own seams: [`ofp_header`] and
//! [`openflow0x02`] cover the wire format, [`ofp_stream`] reassembles
//! messages out of a byte stream, [`ofp_channel`] runs the handshake and
//! translates rule intents into flow-mods, and [`driver`] wraps the whole
//! thing in a reconnecting tokio loop.

pub mod bytes;
pub mod driver;
pub mod error;
pub mod ofp_channel;
pub mod ofp_header;
pub mod ofp_message;
pub mod ofp_stream;
pub mod openflow0x02;
pub mod rule;
