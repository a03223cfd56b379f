use anyhow::Result;
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ofp11::driver::{channel, DriverConfig, TcpConnector};
use ofp11::ofp_channel::{ChannelEvent, ChannelState};
use ofp11::openflow0x02::OPENFLOW_SSL_PORT;
use ofp11::rule::{IpRange, RuleDirection, RuleProtocol, RuleSpec};

/// Dial an OpenFlow 1.1 switch, hold the channel open, and manage one flow
/// rule over it.
///
/// The rule is installed every time the switch completes its handshake, so
/// it survives switch restarts. Ctrl-c removes the rule and exits.
#[derive(Debug, Parser)]
#[command(name = "ofp11_channel", version)]
struct Args {
    /// Switch host to dial.
    host: String,

    /// Switch OpenFlow port.
    #[arg(long, default_value_t = OPENFLOW_SSL_PORT)]
    port: u16,

    /// Rule transport protocol: ip, tcp, or udp.
    #[arg(long, default_value = "tcp")]
    protocol: RuleProtocol,

    /// Service port the rule constrains.
    #[arg(long, default_value_t = 5060)]
    service_port: u16,

    /// Address range the rule covers, bare IPv4 or CIDR.
    #[arg(long, default_value = "192.168.42.42/17")]
    range: IpRange,

    /// Side of the session the range is on: from, to, or both.
    #[arg(long, default_value = "from")]
    direction: RuleDirection,

    /// Install the rule as a drop instead of an allow.
    #[arg(long)]
    deny: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let rule = RuleSpec {
        protocol: args.protocol,
        port: args.service_port,
        range: args.range,
        direction: args.direction,
    };

    let (runner, handle, mut events) = channel(
        TcpConnector,
        args.host.clone(),
        DriverConfig {
            port: args.port,
            ..Default::default()
        },
    );
    let runner = tokio::spawn(runner.run());
    info!(host = %args.host, port = args.port, allow = !args.deny, rule = ?rule, "channel driver started");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                None => break,
                Some(ChannelEvent::Ready { datapath_id }) => {
                    info!(datapath_id, "switch ready, installing rule");
                    handle.add_rule(None, !args.deny, rule)?;
                }
                Some(ChannelEvent::Closed { reason }) => {
                    warn!(reason = ?reason, "connection closed");
                }
                Some(event) => info!(event = ?event, "channel event"),
            },
            _ = signal::ctrl_c() => {
                info!("interrupt, removing rule and shutting down");
                if handle.state() == ChannelState::Ready {
                    let _ = handle.delete_rule(None, rule);
                }
                handle.shutdown();
            }
        }
    }

    runner.await?;
    Ok(())
}
