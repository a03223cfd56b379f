//! End-to-end driver tests over an in-memory duplex pipe: a scripted switch
//! on one side, the reconnecting runner on the other.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::Mutex;

use ofp11::driver::{channel, Connector, DriverConfig};
use ofp11::ofp_channel::{ChannelEvent, ChannelState, CloseReason};
use ofp11::ofp_message::{parse_buffer, OfpMessage};
use ofp11::openflow0x02::message::Message;
use ofp11::openflow0x02::{Capabilities, FlowModCmd, SwitchConfig, SwitchFeatures};
use ofp11::rule::{RuleDirection, RuleProtocol, RuleSpec};

const DPID: u64 = 0x00ab_cdef_0000_0042;

/// Hands out one pre-built stream, then refuses further dials.
struct OneShotConnector {
    stream: Mutex<Option<DuplexStream>>,
}

impl OneShotConnector {
    fn holding(stream: DuplexStream) -> OneShotConnector {
        OneShotConnector {
            stream: Mutex::new(Some(stream)),
        }
    }
}

#[async_trait]
impl Connector for OneShotConnector {
    type Stream = DuplexStream;

    async fn connect(&self, _host: &str, _port: u16) -> io::Result<DuplexStream> {
        self.stream
            .lock()
            .await
            .take()
            .ok_or_else(|| io::Error::from(io::ErrorKind::ConnectionRefused))
    }
}

async fn read_frame(stream: &mut DuplexStream) -> Vec<u8> {
    let mut header = [0u8; 8];
    stream.read_exact(&mut header).await.unwrap();
    let total = u16::from_be_bytes([header[2], header[3]]) as usize;
    let mut frame = header.to_vec();
    frame.resize(total, 0);
    stream.read_exact(&mut frame[8..]).await.unwrap();
    frame
}

fn parse(frame: &[u8]) -> (u32, Message) {
    let decoded = parse_buffer(frame).unwrap();
    (decoded.xid, decoded.message)
}

fn sip_rule() -> RuleSpec {
    RuleSpec {
        protocol: RuleProtocol::Tcp,
        port: 5060,
        range: "192.168.42.42/17".parse().unwrap(),
        direction: RuleDirection::From,
    }
}

/// Play the switch's half of the handshake.
async fn drive_handshake(switch: &mut DuplexStream) {
    switch
        .write_all(&Message::marshal(7, Message::Hello))
        .await
        .unwrap();

    let hello = read_frame(switch).await;
    assert_eq!(parse(&hello), (7, Message::Hello));

    let features_req = read_frame(switch).await;
    let (features_xid, msg) = parse(&features_req);
    assert_eq!(msg, Message::FeaturesReq);
    let reply = Message::FeaturesReply(SwitchFeatures {
        datapath_id: DPID,
        num_buffers: 256,
        num_tables: 16,
        supported_capabilities: Capabilities::default(),
        ports: vec![],
    });
    switch
        .write_all(&Message::marshal(features_xid, reply))
        .await
        .unwrap();

    let config_req = read_frame(switch).await;
    let (config_xid, msg) = parse(&config_req);
    assert_eq!(msg, Message::GetConfigReq);
    let reply = Message::GetConfigReply(SwitchConfig {
        flags: SwitchConfig::FRAG_NORMAL,
        miss_send_len: 128,
    });
    switch
        .write_all(&Message::marshal(config_xid, reply))
        .await
        .unwrap();
}

#[tokio::test]
async fn runner_reaches_ready_and_relays_rules() {
    let (driver_side, mut switch) = tokio::io::duplex(4096);
    let (runner, handle, mut events) = channel(
        OneShotConnector::holding(driver_side),
        "switch.test",
        DriverConfig::default(),
    );
    let runner_task = tokio::spawn(runner.run());
    let mut handle = handle;

    drive_handshake(&mut switch).await;

    handle.wait_for(ChannelState::Ready).await.unwrap();
    assert_eq!(handle.state(), ChannelState::Ready);
    assert_eq!(
        events.recv().await,
        Some(ChannelEvent::Ready { datapath_id: DPID })
    );

    handle.add_rule(None, true, sip_rule()).unwrap();
    for _ in 0..2 {
        let frame = read_frame(&mut switch).await;
        match parse(&frame).1 {
            Message::FlowMod(fm) => assert_eq!(fm.command, FlowModCmd::AddFlow),
            other => panic!("expected flow-mod, got {other:?}"),
        }
    }

    handle.delete_rule(None, sip_rule()).unwrap();
    for _ in 0..2 {
        let frame = read_frame(&mut switch).await;
        match parse(&frame).1 {
            Message::FlowMod(fm) => assert_eq!(fm.command, FlowModCmd::DeleteFlow),
            other => panic!("expected flow-mod, got {other:?}"),
        }
    }

    handle.shutdown();
    assert_eq!(
        events.recv().await,
        Some(ChannelEvent::Closed {
            reason: CloseReason::Shutdown,
        })
    );
    runner_task.await.unwrap();
}

#[tokio::test]
async fn silent_switch_hits_the_handshake_deadline() {
    let (driver_side, _switch) = tokio::io::duplex(4096);
    let config = DriverConfig {
        handshake_timeout: Duration::from_millis(50),
        ..Default::default()
    };
    let (runner, handle, mut events) = channel(
        OneShotConnector::holding(driver_side),
        "switch.test",
        config,
    );
    let runner_task = tokio::spawn(runner.run());

    assert_eq!(
        events.recv().await,
        Some(ChannelEvent::Closed {
            reason: CloseReason::HandshakeTimeout {
                stage: ChannelState::AwaitingHello,
            },
        })
    );

    handle.shutdown();
    assert_eq!(
        events.recv().await,
        Some(ChannelEvent::Closed {
            reason: CloseReason::Shutdown,
        })
    );
    runner_task.await.unwrap();
}

#[tokio::test]
async fn peer_close_is_reported_and_runner_backs_off() {
    let (driver_side, mut switch) = tokio::io::duplex(4096);
    let (runner, handle, mut events) = channel(
        OneShotConnector::holding(driver_side),
        "switch.test",
        DriverConfig::default(),
    );
    let runner_task = tokio::spawn(runner.run());

    drive_handshake(&mut switch).await;
    assert_eq!(
        events.recv().await,
        Some(ChannelEvent::Ready { datapath_id: DPID })
    );

    drop(switch);
    assert_eq!(
        events.recv().await,
        Some(ChannelEvent::Closed {
            reason: CloseReason::PeerClosed,
        })
    );

    // The runner is waiting out its reconnect delay now; rule intents fail
    // fast instead of queueing.
    handle.shutdown();
    assert_eq!(
        events.recv().await,
        Some(ChannelEvent::Closed {
            reason: CloseReason::Shutdown,
        })
    );
    runner_task.await.unwrap();
}
