use async_trait::async_trait;
use mac_address::MacAddress;
use socket2::{Domain, Protocol, Socket, Type};
use std::{
    net::{Ipv4Addr, SocketAddrV4},
    time::Duration,
};
use tokio::net::UdpSocket;
use tracing::{debug, warn};

use super::{
    hardware_address_of, Framing, Received, Transport, TransportError, RECEIVE_BUFFER_SIZE,
};
use crate::protocol::{CLIENT_PORT, SERVER_PORT};

/// Broadcast UDP socket on port 68. Needs privileges to bind the port and,
/// on Linux, to pin the socket to the interface.
#[derive(Debug)]
pub struct UdpTransport {
    interface: String,
    hardware_address: MacAddress,
    socket: UdpSocket,
}

impl UdpTransport {
    pub fn open(interface: &str) -> Result<UdpTransport, TransportError> {
        let hardware_address = hardware_address_of(interface)?;
        let open_error = |source| TransportError::Open {
            interface: interface.to_string(),
            source,
        };

        let socket =
            Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).map_err(open_error)?;
        socket.set_reuse_address(true).map_err(open_error)?;
        socket.set_broadcast(true).map_err(open_error)?;
        socket.set_nonblocking(true).map_err(open_error)?;

        #[cfg(target_os = "linux")]
        if let Err(error) = socket.bind_device(Some(interface.as_bytes())) {
            warn!(
                "SO_BINDTODEVICE {interface} failed, replies may arrive from any interface: {error}"
            );
        }

        let bind_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, CLIENT_PORT);
        socket.bind(&bind_addr.into()).map_err(open_error)?;

        let std_socket: std::net::UdpSocket = socket.into();
        let socket = UdpSocket::from_std(std_socket).map_err(open_error)?;
        debug!("udp transport bound to {bind_addr} on {interface}");

        Ok(UdpTransport {
            interface: interface.to_string(),
            hardware_address,
            socket,
        })
    }
}

#[async_trait]
impl Transport for UdpTransport {
    fn interface(&self) -> &str {
        &self.interface
    }

    fn hardware_address(&self) -> MacAddress {
        self.hardware_address
    }

    fn framing(&self) -> Framing {
        Framing::Datagram
    }

    async fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let destination = SocketAddrV4::new(Ipv4Addr::BROADCAST, SERVER_PORT);
        self.socket
            .send_to(bytes, destination)
            .await
            .map_err(TransportError::Send)?;
        Ok(())
    }

    async fn receive(&mut self, timeout: Duration) -> Result<Received, TransportError> {
        let mut buffer = vec![0u8; RECEIVE_BUFFER_SIZE];
        match tokio::time::timeout(timeout, self.socket.recv_from(&mut buffer)).await {
            Ok(Ok((size, addr))) => {
                debug!("received {size} bytes from {addr}");
                buffer.truncate(size);
                Ok(Received::Packet(buffer))
            }
            Ok(Err(error)) => Err(TransportError::Receive(error)),
            Err(_elapsed) => Ok(Received::Timeout),
        }
    }
}
