//! Drives the sans-I/O channel through its handshake and rule workflows with
//! a recording transport, asserting on the exact frames it emits.

use std::cell::RefCell;
use std::io;
use std::net::Ipv4Addr;
use std::rc::Rc;

use ofp11::ofp_channel::{
    ChannelConfig, ChannelEvent, ChannelState, OfpChannel, Transport,
};
use ofp11::ofp_message::{parse_buffer, OfpMessage};
use ofp11::openflow0x02::message::Message;
use ofp11::openflow0x02::{
    Action, Capabilities, FlowMod, FlowModCmd, Instruction, PortConfig, PortDesc, PortFeatures,
    PortReason, PortState, PortStatus, PseudoPort, SwitchConfig, SwitchFeatures,
    DEFAULT_PRIORITY, ETH_TYPE_IP, IP_PROTO_TCP,
};
use ofp11::rule::{RuleDirection, RuleProtocol, RuleSpec};

const DPID: u64 = 0x0000_00ab_cdef_0123;

#[derive(Clone, Default)]
struct Recorder {
    frames: Rc<RefCell<Vec<Vec<u8>>>>,
    broken: Rc<RefCell<bool>>,
}

impl Recorder {
    fn take(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut *self.frames.borrow_mut())
    }
}

impl Transport for Recorder {
    fn write(&mut self, buf: &[u8]) -> io::Result<()> {
        if *self.broken.borrow() {
            return Err(io::Error::from(io::ErrorKind::BrokenPipe));
        }
        self.frames.borrow_mut().push(buf.to_vec());
        Ok(())
    }
}

fn decode(frame: &[u8]) -> (u32, Message) {
    let decoded = parse_buffer(frame).expect("controller frames must decode");
    assert_eq!(decoded.consumed, frame.len());
    (decoded.xid, decoded.message)
}

fn port(port_no: u32, name: &str) -> PortDesc {
    PortDesc {
        port_no,
        hw_addr: [2, 0, 0, 0, 0, port_no as u8],
        name: name.to_string(),
        config: PortConfig::default(),
        state: PortState::default(),
        curr: PortFeatures::default(),
        advertised: PortFeatures::default(),
        supported: PortFeatures::default(),
        peer: PortFeatures::default(),
        curr_speed: 1_000_000,
        max_speed: 1_000_000,
    }
}

fn features_reply(xid: u32) -> Vec<u8> {
    Message::marshal(
        xid,
        Message::FeaturesReply(SwitchFeatures {
            datapath_id: DPID,
            num_buffers: 256,
            num_tables: 255,
            supported_capabilities: Capabilities {
                flow_stats: true,
                ..Default::default()
            },
            ports: vec![port(1, "xenbr0"), port(2, "vif1.0")],
        }),
    )
}

fn config_reply(xid: u32) -> Vec<u8> {
    Message::marshal(
        xid,
        Message::GetConfigReply(SwitchConfig {
            flags: SwitchConfig::FRAG_NORMAL,
            miss_send_len: 128,
        }),
    )
}

fn sip_rule(direction: RuleDirection) -> RuleSpec {
    RuleSpec {
        protocol: RuleProtocol::Tcp,
        port: 5060,
        range: "192.168.42.42/17".parse().unwrap(),
        direction,
    }
}

/// Walk a fresh channel to `Ready`, returning it with the recorder drained.
fn ready_channel(config: ChannelConfig) -> (OfpChannel<Recorder>, Recorder) {
    let recorder = Recorder::default();
    let mut chan = OfpChannel::with_config(recorder.clone(), config);

    let events = chan.receive(&Message::marshal(42, Message::Hello));
    assert!(events.is_empty());
    let frames = recorder.take();
    assert_eq!(frames.len(), 2);
    let features_xid = decode(&frames[1]).0;

    let events = chan.receive(&features_reply(features_xid));
    assert!(events.is_empty());
    let frames = recorder.take();
    assert_eq!(frames.len(), 1);
    let config_xid = decode(&frames[0]).0;

    let events = chan.receive(&config_reply(config_xid));
    assert_eq!(events, vec![ChannelEvent::Ready { datapath_id: DPID }]);
    assert_eq!(chan.state(), ChannelState::Ready);
    (chan, recorder)
}

#[test]
fn handshake_sends_hello_features_config_in_order() {
    let recorder = Recorder::default();
    let mut chan = OfpChannel::new(recorder.clone());
    assert_eq!(chan.state(), ChannelState::AwaitingHello);

    chan.receive(&Message::marshal(42, Message::Hello));
    assert_eq!(chan.state(), ChannelState::AwaitingFeatures);
    {
        let frames = recorder.frames.borrow();
        assert_eq!(frames.len(), 2);
        assert_eq!(decode(&frames[0]), (42, Message::Hello));
        let (features_xid, msg) = decode(&frames[1]);
        assert_eq!(msg, Message::FeaturesReq);
        assert_ne!(features_xid, 42, "requests take fresh xids");
    }

    let features_xid = decode(&recorder.frames.borrow()[1]).0;
    chan.receive(&features_reply(features_xid));
    assert_eq!(chan.state(), ChannelState::AwaitingConfig);
    {
        let frames = recorder.frames.borrow();
        assert_eq!(frames.len(), 3);
        let (config_xid, msg) = decode(&frames[2]);
        assert_eq!(msg, Message::GetConfigReq);
        assert_ne!(config_xid, features_xid);
    }

    let config_xid = decode(&recorder.frames.borrow()[2]).0;
    let events = chan.receive(&config_reply(config_xid));
    assert_eq!(events, vec![ChannelEvent::Ready { datapath_id: DPID }]);
    assert_eq!(chan.state(), ChannelState::Ready);
    assert_eq!(chan.datapath_id(), Some(DPID));

    // Nothing but the three handshake frames went out.
    let frames = recorder.frames.borrow();
    assert_eq!(frames.len(), 3);
    for frame in frames.iter() {
        assert!(
            matches!(frame[1], 0 | 5 | 7),
            "no flow-mod before ready, got type {}",
            frame[1]
        );
    }
}

#[test]
fn whole_handshake_can_arrive_in_one_chunk() {
    let recorder = Recorder::default();
    let mut chan = OfpChannel::new(recorder.clone());

    // The switch speaks eagerly; replies carry the xids this channel will
    // pick (the first two fresh xids).
    let mut burst = Message::marshal(7, Message::Hello);
    burst.extend_from_slice(&features_reply(1));
    burst.extend_from_slice(&config_reply(2));
    let events = chan.receive(&burst);

    assert_eq!(events, vec![ChannelEvent::Ready { datapath_id: DPID }]);
    assert_eq!(chan.state(), ChannelState::Ready);
    assert_eq!(recorder.frames.borrow().len(), 3);
}

#[test]
fn ports_are_tracked_from_the_features_reply() {
    let (chan, _recorder) = ready_channel(ChannelConfig::default());
    let ports = &chan.bridges()[&DPID];
    assert_eq!(ports.len(), 2);
    assert_eq!(ports[0].name, "xenbr0");
    assert_eq!(ports[1].name, "vif1.0");
}

#[test]
fn port_tracking_can_be_disabled() {
    let (chan, _recorder) = ready_channel(ChannelConfig {
        track_ports: false,
        ..Default::default()
    });
    assert!(chan.bridges().is_empty());
    assert_eq!(chan.datapath_id(), Some(DPID));
}

#[test]
fn echo_requests_are_answered_in_kind() {
    let (mut chan, recorder) = ready_channel(ChannelConfig::default());

    let events = chan.receive(&Message::marshal(
        909,
        Message::EchoRequest(b"ping".to_vec()),
    ));
    assert!(events.is_empty());
    let frames = recorder.take();
    assert_eq!(frames.len(), 1);
    assert_eq!(decode(&frames[0]), (909, Message::EchoReply(b"ping".to_vec())));
}

#[test]
fn echo_works_mid_handshake() {
    let recorder = Recorder::default();
    let mut chan = OfpChannel::new(recorder.clone());
    chan.receive(&Message::marshal(1, Message::Hello));
    recorder.take();

    // AwaitingFeatures: keepalives must still flow.
    chan.receive(&Message::marshal(55, Message::EchoRequest(vec![9])));
    let frames = recorder.take();
    assert_eq!(frames.len(), 1);
    assert_eq!(decode(&frames[0]), (55, Message::EchoReply(vec![9])));
    assert_eq!(chan.state(), ChannelState::AwaitingFeatures);
}

#[test]
fn features_reply_before_hello_is_a_violation() {
    let recorder = Recorder::default();
    let mut chan = OfpChannel::new(recorder.clone());
    let events = chan.receive(&features_reply(5));
    assert!(events.is_empty());
    assert!(recorder.frames.borrow().is_empty());
    assert_eq!(chan.state(), ChannelState::AwaitingHello);
    assert_eq!(chan.datapath_id(), None);
}

#[test]
fn allow_rule_compiles_to_two_normal_output_flows() {
    let (mut chan, recorder) = ready_channel(ChannelConfig::default());

    chan.add_rule(None, true, &sip_rule(RuleDirection::From))
        .unwrap();
    let frames = recorder.take();
    assert_eq!(frames.len(), 2);

    let mut seen_xids = vec![];
    let mut flow_mods: Vec<FlowMod> = vec![];
    for frame in &frames {
        let (xid, msg) = decode(frame);
        seen_xids.push(xid);
        match msg {
            Message::FlowMod(fm) => flow_mods.push(fm),
            other => panic!("expected flow-mod, got {other:?}"),
        }
    }
    assert_ne!(seen_xids[0], seen_xids[1]);

    let range = Ipv4Addr::new(192, 168, 42, 42);
    let mask = Ipv4Addr::new(0, 0, 127, 255);
    for fm in &flow_mods {
        assert_eq!(fm.command, FlowModCmd::AddFlow);
        assert_eq!(fm.priority, DEFAULT_PRIORITY);
        assert!(fm.notify_when_removed);
        assert_eq!(fm.pattern.dl_type, Some(ETH_TYPE_IP));
        assert_eq!(fm.pattern.nw_proto, Some(IP_PROTO_TCP));
        assert_eq!(
            fm.instructions,
            vec![Instruction::ApplyActions(vec![Action::Output(
                PseudoPort::Normal,
            )])]
        );
    }

    // One half matches traffic to the range on tp_src, the other matches
    // traffic from the range on tp_dst.
    assert_eq!(flow_mods[0].pattern.nw_dst, Some(range));
    assert_eq!(flow_mods[0].pattern.nw_dst_mask, Some(mask));
    assert_eq!(flow_mods[0].pattern.tp_src, Some(5060));
    assert_eq!(flow_mods[0].pattern.tp_dst, None);

    assert_eq!(flow_mods[1].pattern.nw_src, Some(range));
    assert_eq!(flow_mods[1].pattern.nw_src_mask, Some(mask));
    assert_eq!(flow_mods[1].pattern.tp_dst, Some(5060));
    assert_eq!(flow_mods[1].pattern.tp_src, None);
}

#[test]
fn deny_rule_compiles_to_empty_action_sets() {
    let (mut chan, recorder) = ready_channel(ChannelConfig::default());

    chan.add_rule(None, false, &sip_rule(RuleDirection::From))
        .unwrap();
    for frame in &recorder.take() {
        match decode(frame).1 {
            Message::FlowMod(fm) => {
                assert_eq!(fm.instructions, vec![Instruction::ApplyActions(vec![])]);
            }
            other => panic!("expected flow-mod, got {other:?}"),
        }
    }
}

#[test]
fn both_direction_installs_four_flows() {
    let (mut chan, recorder) = ready_channel(ChannelConfig::default());
    chan.add_rule(None, true, &sip_rule(RuleDirection::Both))
        .unwrap();
    assert_eq!(recorder.take().len(), 4);
}

#[test]
fn delete_rule_sends_nonstrict_deletes_without_instructions() {
    let (mut chan, recorder) = ready_channel(ChannelConfig::default());

    chan.delete_rule(None, &sip_rule(RuleDirection::From)).unwrap();
    let frames = recorder.take();
    assert_eq!(frames.len(), 2);
    for frame in &frames {
        match decode(frame).1 {
            Message::FlowMod(fm) => {
                assert_eq!(fm.command, FlowModCmd::DeleteFlow);
                assert!(fm.instructions.is_empty());
                assert_eq!(fm.out_port, None);
                assert_eq!(fm.out_group, None);
            }
            other => panic!("expected flow-mod, got {other:?}"),
        }
    }
}

#[test]
fn configured_priority_reaches_the_flow_mods() {
    let (mut chan, recorder) = ready_channel(ChannelConfig {
        flow_priority: 0x9000,
        ..Default::default()
    });
    chan.add_rule(None, true, &sip_rule(RuleDirection::From))
        .unwrap();
    for frame in &recorder.take() {
        match decode(frame).1 {
            Message::FlowMod(fm) => assert_eq!(fm.priority, 0x9000),
            other => panic!("expected flow-mod, got {other:?}"),
        }
    }
}

#[test]
fn one_write_failure_leaves_a_ready_channel_usable() {
    let (mut chan, recorder) = ready_channel(ChannelConfig::default());

    *recorder.broken.borrow_mut() = true;
    let err = chan
        .add_rule(None, true, &sip_rule(RuleDirection::From))
        .unwrap_err();
    assert!(matches!(
        err,
        ofp11::error::ChannelError::TransportWrite(_)
    ));
    assert_eq!(chan.state(), ChannelState::Ready);

    // The transport recovers; the same intent goes straight through.
    *recorder.broken.borrow_mut() = false;
    chan.add_rule(None, true, &sip_rule(RuleDirection::From))
        .unwrap();
    assert_eq!(recorder.take().len(), 2);
}

#[test]
fn wildcard_range_rules_survive_the_wire() {
    let (mut chan, recorder) = ready_channel(ChannelConfig::default());
    let rule = RuleSpec {
        protocol: RuleProtocol::Tcp,
        port: 5060,
        range: "0.0.0.0/0".parse().unwrap(),
        direction: RuleDirection::From,
    };
    let compiled = rule.flow_matches();

    chan.add_rule(None, true, &rule).unwrap();
    let frames = recorder.take();
    assert_eq!(frames.len(), 2);
    for (frame, pattern) in frames.iter().zip(&compiled) {
        match decode(frame).1 {
            Message::FlowMod(fm) => {
                // The address pair stays unset rather than riding along as
                // an all-ones mask, so what comes back off the wire is what
                // was compiled.
                assert_eq!(fm.pattern.nw_dst, None);
                assert_eq!(fm.pattern.nw_dst_mask, None);
                assert_eq!(fm.pattern, *pattern);
            }
            other => panic!("expected flow-mod, got {other:?}"),
        }
    }
}

#[test]
fn switch_errors_surface_without_closing() {
    let (mut chan, _recorder) = ready_channel(ChannelConfig::default());
    let events = chan.receive(&Message::marshal(
        3,
        Message::Error(ofp11::openflow0x02::ErrorMsg {
            error_type: 3,
            code: 1,
            data: vec![],
        }),
    ));
    assert_eq!(
        events,
        vec![ChannelEvent::SwitchError {
            error_type: 3,
            code: 1,
        }]
    );
    assert_eq!(chan.state(), ChannelState::Ready);
}

#[test]
fn port_status_keeps_the_bridge_inventory_current() {
    let (mut chan, _recorder) = ready_channel(ChannelConfig::default());
    assert_eq!(chan.bridges()[&DPID].len(), 2);

    let added = PortStatus {
        reason: PortReason::PortAdd,
        desc: port(5, "vif5.0"),
    };
    let events = chan.receive(&Message::marshal(0, Message::PortStatus(added.clone())));
    assert_eq!(events, vec![ChannelEvent::PortStatus(added)]);
    assert_eq!(chan.bridges()[&DPID].len(), 3);

    let renamed = PortStatus {
        reason: PortReason::PortModify,
        desc: port(5, "vif5.1"),
    };
    chan.receive(&Message::marshal(0, Message::PortStatus(renamed)));
    let ports = &chan.bridges()[&DPID];
    assert_eq!(ports.len(), 3);
    assert_eq!(ports.iter().find(|p| p.port_no == 5).unwrap().name, "vif5.1");

    let removed = PortStatus {
        reason: PortReason::PortDelete,
        desc: port(1, "xenbr0"),
    };
    chan.receive(&Message::marshal(0, Message::PortStatus(removed)));
    assert_eq!(chan.bridges()[&DPID].len(), 2);
}

#[test]
fn framing_loss_emits_protocol_failure_and_closes() {
    let (mut chan, _recorder) = ready_channel(ChannelConfig::default());
    let events = chan.receive(&[0x02, 0x00, 0x00, 0x03, 0, 0, 0, 0]);
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], ChannelEvent::ProtocolFailure(_)));
    assert_eq!(chan.state(), ChannelState::Closed);

    let err = chan
        .add_rule(None, true, &sip_rule(RuleDirection::From))
        .unwrap_err();
    assert!(matches!(
        err,
        ofp11::error::ChannelError::NotReady {
            state: ChannelState::Closed,
        }
    ));
}

#[test]
fn handshake_in_progress_rejects_intents_at_every_stage() {
    let recorder = Recorder::default();
    let mut chan = OfpChannel::new(recorder.clone());
    let rule = sip_rule(RuleDirection::From);

    assert!(chan.add_rule(None, true, &rule).is_err());
    chan.receive(&Message::marshal(1, Message::Hello));
    assert!(chan.add_rule(None, true, &rule).is_err());

    let features_xid = decode(&recorder.frames.borrow()[1]).0;
    recorder.take();
    chan.receive(&features_reply(features_xid));
    assert!(chan.add_rule(None, true, &rule).is_err());

    // Only handshake traffic went out.
    for frame in recorder.frames.borrow().iter() {
        assert_ne!(frame[1], 14, "no flow-mod may leave before ready");
    }
}
