use std::{fmt, io, net::Ipv4Addr, ops::Add, process::ExitStatus};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Local};
use ipnet::Ipv4Net;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

/// What a bound client learned from its ACK.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Lease {
    pub interface: String,
    pub address: Ipv4Addr,
    pub subnet_mask: Option<Ipv4Addr>,
    pub router: Option<Ipv4Addr>,
    pub dns_servers: Vec<Ipv4Addr>,
    pub server_identifier: Ipv4Addr,
    /// Seconds, as granted by option 51.
    pub lease_time: Option<u32>,
    pub obtained_at: DateTime<Local>,
}

impl Lease {
    pub fn expires_at(&self) -> Option<DateTime<Local>> {
        self.lease_time
            .map(|seconds| self.obtained_at.add(Duration::seconds(seconds.into())))
    }

    /// The granted mask, or the classful default for the address when the
    /// server sent none.
    pub fn netmask(&self) -> Ipv4Addr {
        self.subnet_mask
            .unwrap_or_else(|| classful_netmask(self.address))
    }

    pub fn network(&self) -> Ipv4Net {
        with_netmask(self.address, self.netmask())
    }
}

fn classful_netmask(address: Ipv4Addr) -> Ipv4Addr {
    match address.octets()[0] {
        0..=127 => Ipv4Addr::new(255, 0, 0, 0),
        128..=191 => Ipv4Addr::new(255, 255, 0, 0),
        _ => Ipv4Addr::new(255, 255, 255, 0),
    }
}

/// Non-contiguous masks are cut at the first zero bit.
fn with_netmask(address: Ipv4Addr, netmask: Ipv4Addr) -> Ipv4Net {
    let prefix_len = u32::from(netmask).leading_ones() as u8;
    Ipv4Net::new(address, prefix_len).unwrap_or_else(|_| Ipv4Net::from(address))
}

impl fmt::Display for Lease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Interface:   {}", self.interface)?;
        writeln!(f, "IP Address:  {}", self.address)?;
        writeln!(f, "Subnet Mask: {}", self.netmask())?;
        if let Some(router) = self.router {
            writeln!(f, "Router:      {router}")?;
        }
        if !self.dns_servers.is_empty() {
            let servers: Vec<String> = self.dns_servers.iter().map(|s| s.to_string()).collect();
            writeln!(f, "DNS Servers: {}", servers.join(", "))?;
        }
        writeln!(f, "DHCP Server: {}", self.server_identifier)?;
        match (self.lease_time, self.expires_at()) {
            (Some(seconds), Some(expires_at)) => writeln!(
                f,
                "Lease Time:  {seconds} seconds (until {})",
                expires_at.format("%Y-%m-%d %H:%M:%S")
            ),
            _ => writeln!(f, "Lease Time:  unspecified"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("`{command}` exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: ExitStatus,
        stderr: String,
    },
}

/// Host side effects of a negotiation.
#[async_trait]
pub trait LeaseApplier: Send {
    async fn bring_up(&mut self, interface: &str) -> Result<(), ApplyError>;

    async fn apply_lease(
        &mut self,
        interface: &str,
        address: Ipv4Addr,
        netmask: Ipv4Addr,
    ) -> Result<(), ApplyError>;

    async fn set_default_route(&mut self, interface: &str, gateway: Ipv4Addr)
        -> Result<(), ApplyError>;
}

#[async_trait]
impl<A: LeaseApplier + ?Sized> LeaseApplier for Box<A> {
    async fn bring_up(&mut self, interface: &str) -> Result<(), ApplyError> {
        (**self).bring_up(interface).await
    }

    async fn apply_lease(
        &mut self,
        interface: &str,
        address: Ipv4Addr,
        netmask: Ipv4Addr,
    ) -> Result<(), ApplyError> {
        (**self).apply_lease(interface, address, netmask).await
    }

    async fn set_default_route(
        &mut self,
        interface: &str,
        gateway: Ipv4Addr,
    ) -> Result<(), ApplyError> {
        (**self).set_default_route(interface, gateway).await
    }
}

/// Configures the interface through iproute2's `ip`.
#[derive(Clone, Copy, Default, Debug)]
pub struct IpCommand;

impl IpCommand {
    async fn run(&self, args: &[String]) -> Result<(), ApplyError> {
        let command = format!("ip {}", args.join(" "));
        debug!(%command, "running");
        let output = Command::new("ip")
            .args(args)
            .output()
            .await
            .map_err(|source| ApplyError::Spawn {
                command: command.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(ApplyError::Failed {
                command,
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

fn link_up_args(interface: &str) -> Vec<String> {
    ["link", "set", "dev", interface, "up"].map(String::from).to_vec()
}

fn address_args(interface: &str, address: Ipv4Addr, netmask: Ipv4Addr) -> Vec<String> {
    let cidr = with_netmask(address, netmask).to_string();
    ["addr", "replace", cidr.as_str(), "dev", interface].map(String::from).to_vec()
}

fn route_args(interface: &str, gateway: Ipv4Addr) -> Vec<String> {
    let gateway = gateway.to_string();
    ["route", "replace", "default", "via", gateway.as_str(), "dev", interface]
        .map(String::from)
        .to_vec()
}

#[async_trait]
impl LeaseApplier for IpCommand {
    async fn bring_up(&mut self, interface: &str) -> Result<(), ApplyError> {
        self.run(&link_up_args(interface)).await
    }

    async fn apply_lease(
        &mut self,
        interface: &str,
        address: Ipv4Addr,
        netmask: Ipv4Addr,
    ) -> Result<(), ApplyError> {
        self.run(&address_args(interface, address, netmask)).await
    }

    async fn set_default_route(
        &mut self,
        interface: &str,
        gateway: Ipv4Addr,
    ) -> Result<(), ApplyError> {
        self.run(&route_args(interface, gateway)).await
    }
}

/// Logs what would be configured and changes nothing.
#[derive(Clone, Copy, Default, Debug)]
pub struct DryRun;

#[async_trait]
impl LeaseApplier for DryRun {
    async fn bring_up(&mut self, interface: &str) -> Result<(), ApplyError> {
        info!("dry run: would bring {interface} up");
        Ok(())
    }

    async fn apply_lease(
        &mut self,
        interface: &str,
        address: Ipv4Addr,
        netmask: Ipv4Addr,
    ) -> Result<(), ApplyError> {
        info!(
            "dry run: would assign {} to {interface}",
            with_netmask(address, netmask)
        );
        Ok(())
    }

    async fn set_default_route(
        &mut self,
        interface: &str,
        gateway: Ipv4Addr,
    ) -> Result<(), ApplyError> {
        info!("dry run: would route default via {gateway} dev {interface}");
        Ok(())
    }
}

#[cfg(test)]
fn lease(subnet_mask: Option<Ipv4Addr>) -> Lease {
    use chrono::TimeZone;
    Lease {
        interface: "eth0".to_string(),
        address: Ipv4Addr::new(10, 0, 0, 5),
        subnet_mask,
        router: Some(Ipv4Addr::new(10, 0, 0, 1)),
        dns_servers: vec![Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(8, 8, 8, 8)],
        server_identifier: Ipv4Addr::new(10, 0, 0, 1),
        lease_time: Some(86400),
        obtained_at: Local.with_ymd_and_hms(2023, 1, 1, 12, 0, 0).unwrap(),
    }
}

#[test]
fn expires_at_test() {
    let lease = lease(Some(Ipv4Addr::new(255, 255, 255, 0)));
    let expires_at = lease.expires_at().unwrap();
    assert_eq!(expires_at - lease.obtained_at, Duration::days(1));

    let forever = Lease {
        lease_time: None,
        ..lease
    };
    assert_eq!(forever.expires_at(), None);
}

#[test]
fn network_test() {
    let lease = lease(Some(Ipv4Addr::new(255, 255, 255, 0)));
    assert_eq!(lease.network().to_string(), "10.0.0.5/24");
    assert_eq!(lease.network().network(), Ipv4Addr::new(10, 0, 0, 0));

    // no option 1: class A default
    let lease = self::lease(None);
    assert_eq!(lease.netmask(), Ipv4Addr::new(255, 0, 0, 0));
    assert_eq!(lease.network().prefix_len(), 8);

    assert_eq!(classful_netmask(Ipv4Addr::new(172, 16, 0, 9)), Ipv4Addr::new(255, 255, 0, 0));
    assert_eq!(classful_netmask(Ipv4Addr::new(192, 168, 1, 9)), Ipv4Addr::new(255, 255, 255, 0));
    assert_eq!(
        with_netmask(Ipv4Addr::new(10, 1, 2, 3), Ipv4Addr::new(255, 0, 255, 0)).prefix_len(),
        8
    );
}

#[test]
fn ip_args_test() {
    assert_eq!(link_up_args("eth0").join(" "), "link set dev eth0 up");
    assert_eq!(
        address_args("eth0", Ipv4Addr::new(10, 0, 0, 5), Ipv4Addr::new(255, 255, 255, 0)).join(" "),
        "addr replace 10.0.0.5/24 dev eth0"
    );
    assert_eq!(
        route_args("eth0", Ipv4Addr::new(10, 0, 0, 1)).join(" "),
        "route replace default via 10.0.0.1 dev eth0"
    );
}

#[test]
fn summary_test() {
    let summary = lease(Some(Ipv4Addr::new(255, 255, 255, 0))).to_string();
    assert!(summary.contains("IP Address:  10.0.0.5"));
    assert!(summary.contains("Subnet Mask: 255.255.255.0"));
    assert!(summary.contains("Router:      10.0.0.1"));
    assert!(summary.contains("DNS Servers: 10.0.0.1, 8.8.8.8"));
    assert!(summary.contains("Lease Time:  86400 seconds (until 2023-01-02 12:00:00)"));
}
