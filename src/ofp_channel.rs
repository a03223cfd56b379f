//! The controller end of one switch connection, as a sans-I/O state machine.
//!
//! `OfpChannel` owns no socket. Bytes read from the wire are pushed in
//! through [`OfpChannel::receive`], outbound messages leave through the
//! [`Transport`] it was built around, and everything the caller might care
//! about comes back as [`ChannelEvent`]s. The async dial/reconnect loop that
//! feeds a channel lives in [`crate::driver`].
//!
//! A channel drives the OpenFlow handshake on its own: hello exchange,
//! features request, config request. Once `Ready`, rule intents translate
//! to flow-mods; before that they are rejected with
//! [`ChannelError::NotReady`], never queued, so callers keep control over
//! ordering relative to reconnects.
//!
//! A transport write failure is reported to whoever triggered the send and
//! leaves the channel state alone. Teardown comes from the read path
//! ([`OfpChannel::receive`] on lost framing, [`OfpChannel::transport_closed`])
//! or from a keepalive reply that cannot leave.

use std::collections::HashMap;
use std::io;

use tracing::{debug, error, info, warn};

use crate::error::{ChannelError, CodecError};
use crate::ofp_message::{DecodedMessage, OfpMessage};
use crate::ofp_stream::OfpStream;
use crate::openflow0x02::message::{self, Message};
use crate::openflow0x02::{
    Action, FlowRemoved, Instruction, PacketIn, PortDesc, PortReason, PortStatus, PseudoPort,
    DEFAULT_PRIORITY,
};
use crate::rule::RuleSpec;

/// Where a switch connection stands in its lifecycle.
///
/// The sans-I/O channel itself only moves between `AwaitingHello` and
/// `Closed`; `Disconnected` and `Connecting` belong to the driver that dials
/// the transport, and are part of this enum so every layer reports progress
/// in the same vocabulary.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    AwaitingHello,
    AwaitingFeatures,
    AwaitingConfig,
    Ready,
    Closed,
}

/// Why a connection ended, carried by [`ChannelEvent::Closed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The switch closed its end of the connection.
    PeerClosed,
    /// The transport failed mid-connection.
    Transport(String),
    /// A handshake stage outlived its deadline.
    HandshakeTimeout { stage: ChannelState },
    /// Message framing was lost; see the preceding `ProtocolFailure`.
    Protocol,
    /// Local shutdown request.
    Shutdown,
}

/// Write half of a connected transport, as seen by the state machine.
pub trait Transport {
    fn write(&mut self, buf: &[u8]) -> io::Result<()>;
}

/// Knobs for one channel.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Record port inventories from features replies and port-status
    /// messages, queryable through [`OfpChannel::bridges`].
    pub track_ports: bool,
    /// Priority for flows installed through rule intents.
    pub flow_priority: u16,
}

impl Default for ChannelConfig {
    fn default() -> ChannelConfig {
        ChannelConfig {
            track_ports: true,
            flow_priority: DEFAULT_PRIORITY,
        }
    }
}

/// Everything a channel can tell the layer above it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// Handshake finished; rule intents are accepted from here on.
    Ready { datapath_id: u64 },
    /// The switch reported an error. Connection stays up.
    SwitchError { error_type: u16, code: u16 },
    /// A port appeared, vanished, or changed.
    PortStatus(PortStatus),
    /// A flow left the flow table (timeout or deletion).
    FlowRemoved(FlowRemoved),
    /// The switch punted a packet to the controller.
    PacketIn(PacketIn),
    /// Message framing was lost; the channel is closed. Terminal.
    ProtocolFailure(CodecError),
    /// The connection ended. Emitted by the driver, never by the sans-I/O
    /// core.
    Closed { reason: CloseReason },
}

/// One switch connection.
pub struct OfpChannel<T: Transport> {
    transport: T,
    config: ChannelConfig,
    state: ChannelState,
    stream: OfpStream,
    datapath_id: Option<u64>,
    bridges: HashMap<u64, Vec<PortDesc>>,
    next_xid: u32,
}

impl<T: Transport> OfpChannel<T> {
    /// Wrap an already-connected transport. The switch speaks first, so the
    /// channel starts out waiting for its hello.
    pub fn new(transport: T) -> OfpChannel<T> {
        OfpChannel::with_config(transport, ChannelConfig::default())
    }

    pub fn with_config(transport: T, config: ChannelConfig) -> OfpChannel<T> {
        OfpChannel {
            transport,
            config,
            state: ChannelState::AwaitingHello,
            stream: OfpStream::new(),
            datapath_id: None,
            bridges: HashMap::new(),
            next_xid: 0,
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// Datapath id learned from the features reply, if the handshake got
    /// that far.
    pub fn datapath_id(&self) -> Option<u64> {
        self.datapath_id
    }

    /// Port inventory per datapath id. Empty unless
    /// [`ChannelConfig::track_ports`] is set.
    pub fn bridges(&self) -> &HashMap<u64, Vec<PortDesc>> {
        &self.bridges
    }

    /// Feed bytes read from the wire and collect the events they produce.
    pub fn receive(&mut self, chunk: &[u8]) -> Vec<ChannelEvent> {
        let mut events = vec![];
        if self.state == ChannelState::Closed {
            return events;
        }
        for item in self.stream.receive(chunk) {
            match item {
                Ok(decoded) => self.handle_message(decoded, &mut events),
                Err(err) => {
                    let recoverable = matches!(
                        err,
                        CodecError::UnsupportedVersion { .. }
                            | CodecError::UnsupportedMessageType { .. }
                    );
                    if recoverable {
                        warn!(error = %err, "ignoring unsupported message");
                    } else {
                        error!(error = %err, "lost message framing, closing channel");
                        self.state = ChannelState::Closed;
                        events.push(ChannelEvent::ProtocolFailure(err));
                    }
                }
            }
            if self.state == ChannelState::Closed {
                break;
            }
        }
        events
    }

    /// Mark the channel closed because the transport is gone. Any later
    /// `receive` or rule intent is a no-op or an error.
    pub fn transport_closed(&mut self) {
        self.state = ChannelState::Closed;
    }

    /// Install the flows for one rule intent.
    ///
    /// `allow` wires matching sessions through the switch's normal L2/L3
    /// pipeline; without it the flows carry an empty apply-actions set, so
    /// matching packets are dropped at the table. `vif_port` is the caller's
    /// interface hint and is currently only logged.
    ///
    /// A write failure surfaces as [`ChannelError::TransportWrite`] and
    /// leaves the channel `Ready`; the intent can simply be retried.
    // TODO: scope the compiled patterns to `vif_port` via `in_port` once the
    // per-interface semantics are settled.
    pub fn add_rule(
        &mut self,
        vif_port: Option<u32>,
        allow: bool,
        rule: &RuleSpec,
    ) -> Result<(), ChannelError> {
        self.ensure_ready()?;
        let instructions = if allow {
            vec![Instruction::ApplyActions(vec![Action::Output(
                PseudoPort::Normal,
            )])]
        } else {
            vec![Instruction::ApplyActions(vec![])]
        };
        let patterns = rule.flow_matches();
        info!(allow, vif_port, flows = patterns.len(), rule = ?rule, "installing rule");
        for pattern in patterns {
            let flow_mod =
                message::add_flow(self.config.flow_priority, pattern, instructions.clone());
            let xid = self.fresh_xid();
            self.send(xid, Message::FlowMod(flow_mod))?;
        }
        Ok(())
    }

    /// Remove the flows installed for one rule intent. Deletion is
    /// non-strict, so the allow/deny variant does not matter.
    pub fn delete_rule(
        &mut self,
        vif_port: Option<u32>,
        rule: &RuleSpec,
    ) -> Result<(), ChannelError> {
        self.ensure_ready()?;
        let patterns = rule.flow_matches();
        info!(vif_port, flows = patterns.len(), rule = ?rule, "removing rule");
        for pattern in patterns {
            let flow_mod = message::delete_flows(pattern);
            let xid = self.fresh_xid();
            self.send(xid, Message::FlowMod(flow_mod))?;
        }
        Ok(())
    }

    fn handle_message(&mut self, decoded: DecodedMessage, events: &mut Vec<ChannelEvent>) {
        let DecodedMessage { xid, message, .. } = decoded;
        match message {
            Message::Hello if self.state == ChannelState::AwaitingHello => {
                debug!(xid, "hello received, requesting features");
                if self.send(xid, Message::Hello).is_err() {
                    return;
                }
                let features_xid = self.fresh_xid();
                if self.send(features_xid, Message::FeaturesReq).is_err() {
                    return;
                }
                self.state = ChannelState::AwaitingFeatures;
            }
            Message::FeaturesReply(features) if self.state == ChannelState::AwaitingFeatures => {
                info!(
                    datapath_id = features.datapath_id,
                    ports = features.ports.len(),
                    "switch features received"
                );
                self.datapath_id = Some(features.datapath_id);
                if self.config.track_ports {
                    self.bridges.insert(features.datapath_id, features.ports);
                }
                let xid = self.fresh_xid();
                if self.send(xid, Message::GetConfigReq).is_err() {
                    return;
                }
                self.state = ChannelState::AwaitingConfig;
            }
            Message::GetConfigReply(config) if self.state == ChannelState::AwaitingConfig => {
                debug!(
                    flags = config.flags,
                    miss_send_len = config.miss_send_len,
                    "switch config received, channel ready"
                );
                self.state = ChannelState::Ready;
                events.push(ChannelEvent::Ready {
                    datapath_id: self.datapath_id.unwrap_or(0),
                });
            }
            Message::EchoRequest(payload) if self.state != ChannelState::AwaitingHello => {
                debug!(xid, len = payload.len(), "echo request");
                // The one send whose failure closes the channel.
                if self.send(xid, Message::EchoReply(payload)).is_err() {
                    error!("keepalive reply failed, closing channel");
                    self.state = ChannelState::Closed;
                }
            }
            Message::EchoReply(_) => {
                debug!(xid, "echo reply");
            }
            Message::Error(err) => {
                error!(
                    xid,
                    error_type = err.error_type,
                    code = err.code,
                    "switch reported an error"
                );
                events.push(ChannelEvent::SwitchError {
                    error_type: err.error_type,
                    code: err.code,
                });
            }
            Message::PortStatus(status) => {
                debug!(
                    xid,
                    port = status.desc.port_no,
                    reason = ?status.reason,
                    "port status"
                );
                if self.config.track_ports {
                    self.note_port_status(&status);
                }
                events.push(ChannelEvent::PortStatus(status));
            }
            Message::FlowRemoved(removed) => {
                debug!(
                    xid,
                    cookie = removed.cookie,
                    reason = ?removed.reason,
                    "flow removed"
                );
                events.push(ChannelEvent::FlowRemoved(removed));
            }
            Message::PacketIn(packet_in) => {
                debug!(
                    xid,
                    port = packet_in.port,
                    total_len = packet_in.total_len,
                    "packet in"
                );
                events.push(ChannelEvent::PacketIn(packet_in));
            }
            other => {
                warn!(
                    xid,
                    code = ?Message::msg_code_of_message(&other),
                    state = ?self.state,
                    "protocol violation, ignoring message"
                );
            }
        }
    }

    fn note_port_status(&mut self, status: &PortStatus) {
        let dpid = match self.datapath_id {
            Some(d) => d,
            None => return,
        };
        let ports = self.bridges.entry(dpid).or_default();
        match status.reason {
            PortReason::PortDelete => ports.retain(|p| p.port_no != status.desc.port_no),
            PortReason::PortAdd | PortReason::PortModify => {
                match ports.iter_mut().find(|p| p.port_no == status.desc.port_no) {
                    Some(slot) => *slot = status.desc.clone(),
                    None => ports.push(status.desc.clone()),
                }
            }
        }
    }

    fn ensure_ready(&self) -> Result<(), ChannelError> {
        if self.state == ChannelState::Ready {
            Ok(())
        } else {
            Err(ChannelError::NotReady { state: self.state })
        }
    }

    fn fresh_xid(&mut self) -> u32 {
        self.next_xid = self.next_xid.wrapping_add(1);
        self.next_xid
    }

    fn send(&mut self, xid: u32, msg: Message) -> Result<(), ChannelError> {
        let bytes = Message::marshal(xid, msg);
        self.transport.write(&bytes).map_err(|err| {
            warn!(error = %err, "transport write failed");
            ChannelError::TransportWrite(err)
        })
    }
}
