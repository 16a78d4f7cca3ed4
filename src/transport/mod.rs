//! How DHCP packets leave and reach the host.
//!
//! A [`Transport`] is bound to one interface when it is opened. Datagram
//! transports exchange bare DHCP payloads over a UDP socket; link transports
//! exchange full Ethernet frames and leave encapsulation to the caller.

#[cfg(target_os = "linux")]
pub mod raw;
pub mod udp;

use async_trait::async_trait;
use mac_address::{MacAddress, MacAddressError};
use std::{io, time::Duration};
use thiserror::Error;
use tokio::time::Instant;

use crate::protocol::frame::ETHERNET_HEADER_LEN;

/// Largest datagram a transport reads at once.
pub const RECEIVE_BUFFER_SIZE: usize = 1500;

/// Largest frame a link transport reads at once: a full MTU plus the
/// Ethernet header.
pub const FRAME_BUFFER_SIZE: usize = ETHERNET_HEADER_LEN + RECEIVE_BUFFER_SIZE;

/// Roughly thirty years; stands in for a deadline that does not fit.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// `timeout` from now, clamped instead of overflowing the clock.
pub fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout).unwrap_or(now + FAR_FUTURE)
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Framing {
    /// Ethernet + IPv4 + UDP headers around the DHCP payload.
    Link,
    /// The DHCP payload alone.
    Datagram,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Received {
    Packet(Vec<u8>),
    Timeout,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("interface {0} not found")]
    NoSuchInterface(String),
    #[error("failed to read hardware address of {interface}: {source}")]
    HardwareAddress {
        interface: String,
        #[source]
        source: MacAddressError,
    },
    #[error("failed to open socket on {interface}: {source}")]
    Open {
        interface: String,
        #[source]
        source: io::Error,
    },
    #[error("send failed: {0}")]
    Send(#[source] io::Error),
    #[error("receive failed: {0}")]
    Receive(#[source] io::Error),
}

#[async_trait]
pub trait Transport: Send {
    fn interface(&self) -> &str;

    fn hardware_address(&self) -> MacAddress;

    fn framing(&self) -> Framing;

    /// Broadcasts `bytes` on the interface. The caller encapsulates first when
    /// [`framing`](Transport::framing) is [`Framing::Link`].
    async fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Waits at most `timeout` for the next inbound packet.
    async fn receive(&mut self, timeout: Duration) -> Result<Received, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Box<T> {
    fn interface(&self) -> &str {
        (**self).interface()
    }

    fn hardware_address(&self) -> MacAddress {
        (**self).hardware_address()
    }

    fn framing(&self) -> Framing {
        (**self).framing()
    }

    async fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        (**self).send(bytes).await
    }

    async fn receive(&mut self, timeout: Duration) -> Result<Received, TransportError> {
        (**self).receive(timeout).await
    }
}

pub(crate) fn hardware_address_of(interface: &str) -> Result<MacAddress, TransportError> {
    match mac_address::mac_address_by_name(interface) {
        Ok(Some(address)) => Ok(address),
        Ok(None) => Err(TransportError::NoSuchInterface(interface.to_string())),
        Err(source) => Err(TransportError::HardwareAddress {
            interface: interface.to_string(),
            source,
        }),
    }
}

#[test]
fn deadline_after_test() {
    let now = Instant::now();
    let deadline = deadline_after(Duration::from_secs(5));
    assert!(deadline >= now + Duration::from_secs(5));
    assert!(deadline_after(Duration::from_secs(u64::MAX)) > now + Duration::from_secs(86400));
    assert!(deadline_after(Duration::MAX) > now);
}
