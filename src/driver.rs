//! Async runtime around the sans-I/O channel: dialing, reconnect with
//! backoff, pumping bytes, and a cloneable handle for rule intents.
//!
//! The split keeps the protocol logic synchronous and testable while this
//! module owns everything tokio: the read loop, a writer task fed through an
//! unbounded frame queue, per-stage handshake deadlines, and the command
//! mailbox behind [`ChannelHandle`].

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::error::ChannelError;
use crate::ofp_channel::{
    ChannelConfig, ChannelEvent, ChannelState, CloseReason, OfpChannel, Transport,
};
use crate::openflow0x02::OPENFLOW_SSL_PORT;
use crate::rule::RuleSpec;

/// Dials the transport for a channel.
///
/// TLS and certificate handling live outside this crate; implement this
/// trait around your TLS stack and hand it to [`channel`]. The in-crate
/// [`TcpConnector`] covers demos and tests.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    async fn connect(&self, host: &str, port: u16) -> io::Result<Self::Stream>;
}

/// Plain-TCP connector.
#[derive(Debug, Clone, Default)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(&self, host: &str, port: u16) -> io::Result<TcpStream> {
        TcpStream::connect((host, port)).await
    }
}

/// Knobs for the driver loop.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Switch-side TCP port.
    pub port: u16,
    /// Deadline for each handshake stage; restarts whenever the handshake
    /// advances.
    pub handshake_timeout: Duration,
    /// First reconnect delay. Doubles per failed attempt.
    pub reconnect_initial: Duration,
    /// Ceiling for the reconnect delay.
    pub reconnect_max: Duration,
    /// Passed through to each connection's `OfpChannel`.
    pub channel: ChannelConfig,
}

impl Default for DriverConfig {
    fn default() -> DriverConfig {
        DriverConfig {
            port: OPENFLOW_SSL_PORT,
            handshake_timeout: Duration::from_secs(15),
            reconnect_initial: Duration::from_secs(1),
            reconnect_max: Duration::from_secs(60),
            channel: ChannelConfig::default(),
        }
    }
}

enum ChannelCommand {
    AddRule {
        vif_port: Option<u32>,
        allow: bool,
        rule: RuleSpec,
    },
    DeleteRule {
        vif_port: Option<u32>,
        rule: RuleSpec,
    },
    Shutdown,
}

/// Build the driver for one switch.
///
/// Returns the runner (spawn [`ChannelRunner::run`] on your runtime), a
/// cloneable handle for rule intents and state queries, and the stream of
/// [`ChannelEvent`]s.
pub fn channel<C: Connector>(
    connector: C,
    host: impl Into<String>,
    config: DriverConfig,
) -> (
    ChannelRunner<C>,
    ChannelHandle,
    mpsc::UnboundedReceiver<ChannelEvent>,
) {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (state_tx, state_rx) = watch::channel(ChannelState::Disconnected);
    let runner = ChannelRunner {
        connector,
        host: host.into(),
        config,
        commands: command_rx,
        events: event_tx,
        state_tx,
    };
    let handle = ChannelHandle {
        commands: command_tx,
        state: state_rx,
    };
    (runner, handle, event_rx)
}

/// Caller's end of a running channel.
#[derive(Clone)]
pub struct ChannelHandle {
    commands: mpsc::UnboundedSender<ChannelCommand>,
    state: watch::Receiver<ChannelState>,
}

impl ChannelHandle {
    /// Queue an add-rule intent. Errors only if the driver is gone; a
    /// not-ready channel rejects the intent on the driver side, where it is
    /// logged.
    pub fn add_rule(
        &self,
        vif_port: Option<u32>,
        allow: bool,
        rule: RuleSpec,
    ) -> Result<(), ChannelError> {
        self.commands
            .send(ChannelCommand::AddRule {
                vif_port,
                allow,
                rule,
            })
            .map_err(|_| ChannelError::TransportClosed)
    }

    /// Queue a delete-rule intent.
    pub fn delete_rule(&self, vif_port: Option<u32>, rule: RuleSpec) -> Result<(), ChannelError> {
        self.commands
            .send(ChannelCommand::DeleteRule { vif_port, rule })
            .map_err(|_| ChannelError::TransportClosed)
    }

    /// Ask the driver to stop. The runner emits a final
    /// `Closed {reason: Shutdown}` and returns.
    pub fn shutdown(&self) {
        let _ = self.commands.send(ChannelCommand::Shutdown);
    }

    /// Last published lifecycle state.
    pub fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    /// Wait until the channel reaches `target`.
    pub async fn wait_for(&mut self, target: ChannelState) -> Result<(), ChannelError> {
        self.state
            .wait_for(|s| *s == target)
            .await
            .map(|_| ())
            .map_err(|_| ChannelError::TransportClosed)
    }
}

/// Write side of a live connection, fed to the sans-I/O channel. Frames go
/// through a queue so the state machine never blocks on the socket.
struct FrameQueue {
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl Transport for FrameQueue {
    fn write(&mut self, buf: &[u8]) -> io::Result<()> {
        self.tx
            .send(buf.to_vec())
            .map_err(|_| io::Error::from(io::ErrorKind::BrokenPipe))
    }
}

/// Owns the dial/reconnect loop for one switch.
pub struct ChannelRunner<C: Connector> {
    connector: C,
    host: String,
    config: DriverConfig,
    commands: mpsc::UnboundedReceiver<ChannelCommand>,
    events: mpsc::UnboundedSender<ChannelEvent>,
    state_tx: watch::Sender<ChannelState>,
}

impl<C: Connector> ChannelRunner<C> {
    /// Run until shut down. Reconnects with exponential backoff; the backoff
    /// resets once a connection completes its handshake.
    pub async fn run(mut self) {
        let mut delay = self.config.reconnect_initial;
        loop {
            self.publish(ChannelState::Connecting);
            info!(host = %self.host, port = self.config.port, "connecting to switch");
            match self.connector.connect(&self.host, self.config.port).await {
                Ok(stream) => {
                    let (reason, reached_ready) = self.run_connection(stream).await;
                    info!(reason = ?reason, "connection closed");
                    let shutting_down = reason == CloseReason::Shutdown;
                    let _ = self.events.send(ChannelEvent::Closed { reason });
                    if shutting_down {
                        self.publish(ChannelState::Disconnected);
                        return;
                    }
                    if reached_ready {
                        delay = self.config.reconnect_initial;
                    }
                }
                Err(err) => {
                    warn!(error = %err, "connect failed");
                }
            }
            self.publish(ChannelState::Disconnected);
            debug!(delay = ?delay, "reconnecting after backoff");
            if self.backoff(delay).await {
                let _ = self.events.send(ChannelEvent::Closed {
                    reason: CloseReason::Shutdown,
                });
                return;
            }
            delay = (delay * 2).min(self.config.reconnect_max);
        }
    }

    /// Sleep out the backoff window, still answering the mailbox. Returns
    /// true on shutdown.
    async fn backoff(&mut self, delay: Duration) -> bool {
        let deadline = Instant::now() + delay;
        loop {
            tokio::select! {
                _ = sleep_until(deadline) => return false,
                cmd = self.commands.recv() => match cmd {
                    None | Some(ChannelCommand::Shutdown) => return true,
                    Some(_) => {
                        warn!(state = ?self.state(), "channel not ready, rejecting rule intent");
                    }
                },
            }
        }
    }

    async fn run_connection(&mut self, stream: C::Stream) -> (CloseReason, bool) {
        let (mut read_half, mut write_half) = tokio::io::split(stream);

        let (frame_tx, mut frame_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let writer = tokio::spawn(async move {
            while let Some(frame) = frame_rx.recv().await {
                if let Err(err) = write_half.write_all(&frame).await {
                    debug!(error = %err, "write side closed");
                    break;
                }
            }
        });

        let mut chan =
            OfpChannel::with_config(FrameQueue { tx: frame_tx }, self.config.channel.clone());
        self.publish(ChannelState::AwaitingHello);

        let mut reached_ready = false;
        let mut buf = [0u8; 4096];
        let handshake = sleep(self.config.handshake_timeout);
        tokio::pin!(handshake);

        let reason = loop {
            tokio::select! {
                read = read_half.read(&mut buf) => match read {
                    Ok(0) => break CloseReason::PeerClosed,
                    Ok(n) => {
                        let before = chan.state();
                        let mut framing_lost = false;
                        for event in chan.receive(&buf[..n]) {
                            match &event {
                                ChannelEvent::Ready { datapath_id } => {
                                    info!(datapath_id = *datapath_id, "channel ready");
                                    reached_ready = true;
                                }
                                ChannelEvent::ProtocolFailure(_) => framing_lost = true,
                                _ => {}
                            }
                            let _ = self.events.send(event);
                        }
                        let now = chan.state();
                        if now != before {
                            self.publish(now);
                            // Each handshake stage gets a fresh deadline.
                            handshake
                                .as_mut()
                                .reset(Instant::now() + self.config.handshake_timeout);
                        }
                        if framing_lost {
                            break CloseReason::Protocol;
                        }
                        if now == ChannelState::Closed {
                            // Only a failed keepalive reply closes without a
                            // ProtocolFailure.
                            break CloseReason::Transport("keepalive reply failed".to_string());
                        }
                    }
                    Err(err) => break CloseReason::Transport(err.to_string()),
                },
                cmd = self.commands.recv() => match cmd {
                    None | Some(ChannelCommand::Shutdown) => break CloseReason::Shutdown,
                    Some(ChannelCommand::AddRule { vif_port, allow, rule }) => {
                        if let Err(err) = chan.add_rule(vif_port, allow, &rule) {
                            warn!(error = %err, "rule intent failed");
                        }
                    }
                    Some(ChannelCommand::DeleteRule { vif_port, rule }) => {
                        if let Err(err) = chan.delete_rule(vif_port, &rule) {
                            warn!(error = %err, "rule intent failed");
                        }
                    }
                },
                _ = &mut handshake, if chan.state() != ChannelState::Ready => {
                    break CloseReason::HandshakeTimeout { stage: chan.state() };
                }
            }
        };

        // Dropping the channel closes the frame queue; the writer drains what
        // is left and exits.
        drop(chan);
        let _ = writer.await;
        (reason, reached_ready)
    }

    fn state(&self) -> ChannelState {
        *self.state_tx.borrow()
    }

    fn publish(&self, state: ChannelState) {
        let _ = self.state_tx.send(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_use_the_tls_port() {
        let config = DriverConfig::default();
        assert_eq!(config.port, OPENFLOW_SSL_PORT);
        assert!(config.reconnect_initial <= config.reconnect_max);
    }
}
