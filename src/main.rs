use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser};
use dhcpc::{
    conf::{ClientConfig, TransportKind, MAX_WAIT_SECS},
    dhcp::v4::{Client, DryRun, IpCommand, LeaseApplier},
    transport::{udp::UdpTransport, Transport},
};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "dhcpc", version)]
#[command(about = "Acquire an IPv4 lease over DHCP", long_about = None)]
struct Args {
    /// Network interface to configure
    #[arg(value_name = "INTERFACE")]
    interface: Option<String>,

    /// Same as INTERFACE
    #[arg(
        short = 'i',
        long = "interface",
        value_name = "INTERFACE",
        conflicts_with = "interface"
    )]
    interface_flag: Option<String>,

    /// More output; repeat for packet dumps
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Seconds to wait for each reply
    #[arg(
        short,
        long,
        value_name = "SECONDS",
        value_parser = clap::value_parser!(u64).range(1..=MAX_WAIT_SECS)
    )]
    timeout: Option<u64>,

    /// DISCOVER attempts before giving up
    #[arg(short, long, value_name = "COUNT", value_parser = clap::value_parser!(u32).range(1..))]
    retries: Option<u32>,

    /// Send hand-built Ethernet frames on a packet socket
    #[arg(long)]
    raw: bool,

    /// Negotiate only; leave the interface untouched
    #[arg(long)]
    no_apply: bool,

    /// Configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
}

impl Args {
    fn apply_to(&self, config: &mut ClientConfig) {
        if let Some(interface) = self.interface.as_ref().or(self.interface_flag.as_ref()) {
            config.interface = Some(interface.clone());
        }
        if let Some(timeout) = self.timeout {
            config.timeout = timeout;
        }
        if let Some(retries) = self.retries {
            config.retries = retries;
        }
        if self.raw {
            config.transport = TransportKind::Raw;
        }
        if self.no_apply {
            config.apply = false;
        }
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn,dhcpc=info",
        1 => "info,dhcpc=debug",
        _ => "debug,dhcpc=trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .init();
}

#[cfg(target_os = "linux")]
fn open_raw(interface: &str) -> Result<Box<dyn Transport>> {
    let transport = dhcpc::transport::raw::RawTransport::open(interface)?;
    Ok(Box::new(transport))
}

#[cfg(not(target_os = "linux"))]
fn open_raw(_interface: &str) -> Result<Box<dyn Transport>> {
    bail!("the raw transport is only available on Linux")
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let mut config = ClientConfig::load(args.config.as_deref())?;
    args.apply_to(&mut config);
    config.validate()?;
    let Some(interface) = config.interface.clone() else {
        bail!("no interface given; name one on the command line or set `interface` in the config");
    };

    let transport: Box<dyn Transport> = match config.transport {
        TransportKind::Udp => Box::new(UdpTransport::open(&interface)?),
        TransportKind::Raw => open_raw(&interface)?,
    };
    let applier: Box<dyn LeaseApplier> = if config.apply {
        Box::new(IpCommand)
    } else {
        Box::new(DryRun)
    };
    info!(
        %interface,
        mac = %transport.hardware_address(),
        transport = ?config.transport,
        "starting DHCP negotiation"
    );

    let lease = Client::new(config, transport, applier)
        .run()
        .await
        .with_context(|| format!("failed to acquire a lease on {interface}"))?;
    print!("{lease}");
    Ok(())
}

#[test]
fn args_test() {
    let args = Args::try_parse_from(["dhcpc", "-i", "eth0", "-t", "10"]).unwrap();
    let mut config = ClientConfig::default();
    args.apply_to(&mut config);
    assert_eq!(config.interface.as_deref(), Some("eth0"));
    assert_eq!(config.timeout, 10);

    assert!(Args::try_parse_from(["dhcpc", "eth0", "-t", "0"]).is_err());
    assert!(Args::try_parse_from(["dhcpc", "eth0", "-t", "18446744073709551615"]).is_err());
    let max = MAX_WAIT_SECS.to_string();
    assert!(Args::try_parse_from(["dhcpc", "eth0", "-t", max.as_str()]).is_ok());
    assert!(Args::try_parse_from(["dhcpc", "eth0", "-i", "eth1"]).is_err());
}
