use async_trait::async_trait;
use mac_address::MacAddress;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::{ffi::CString, io, io::Read, mem, time::Duration};
use tokio::io::unix::AsyncFd;
use tracing::trace;

use super::{
    deadline_after, hardware_address_of, Framing, Received, Transport, TransportError,
    FRAME_BUFFER_SIZE,
};
use crate::protocol::{frame, CLIENT_PORT};

/// `AF_PACKET` socket exchanging whole Ethernet frames, usable before the
/// interface has any IPv4 address. Requires `CAP_NET_RAW`.
#[derive(Debug)]
pub struct RawTransport {
    interface: String,
    hardware_address: MacAddress,
    destination: SockAddr,
    socket: AsyncFd<Socket>,
}

fn interface_index(interface: &str) -> Result<i32, TransportError> {
    let name = CString::new(interface)
        .map_err(|_| TransportError::NoSuchInterface(interface.to_string()))?;
    // SAFETY: `name` is a valid NUL-terminated string that outlives the call.
    let index = unsafe { libc::if_nametoindex(name.as_ptr()) };
    if index == 0 {
        return Err(TransportError::NoSuchInterface(interface.to_string()));
    }
    Ok(index as i32)
}

/// `sockaddr_ll` for IPv4 frames on `index`, addressed to the broadcast MAC.
fn link_address(index: i32) -> SockAddr {
    // SAFETY: all-zero bytes are a valid `sockaddr_storage`.
    let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };
    // SAFETY: `sockaddr_storage` is large and aligned enough for any sockaddr,
    // and the borrow ends before `storage` is moved.
    let link = unsafe {
        &mut *(&mut storage as *mut libc::sockaddr_storage as *mut libc::sockaddr_ll)
    };
    link.sll_family = libc::AF_PACKET as libc::sa_family_t;
    link.sll_protocol = (libc::ETH_P_IP as u16).to_be();
    link.sll_ifindex = index;
    link.sll_halen = 6;
    link.sll_addr[..6].copy_from_slice(&frame::BROADCAST_MAC);
    let len = mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t;
    // SAFETY: `storage` holds an initialized `sockaddr_ll` of `len` bytes.
    unsafe { SockAddr::new(storage, len) }
}

impl RawTransport {
    pub fn open(interface: &str) -> Result<RawTransport, TransportError> {
        let hardware_address = hardware_address_of(interface)?;
        let index = interface_index(interface)?;
        let open_error = |source| TransportError::Open {
            interface: interface.to_string(),
            source,
        };

        let protocol = Protocol::from(i32::from((libc::ETH_P_IP as u16).to_be()));
        let socket = Socket::new(Domain::PACKET, Type::RAW, Some(protocol)).map_err(open_error)?;
        let destination = link_address(index);
        socket.bind(&destination).map_err(open_error)?;
        socket.set_nonblocking(true).map_err(open_error)?;
        let socket = AsyncFd::new(socket).map_err(open_error)?;

        Ok(RawTransport {
            interface: interface.to_string(),
            hardware_address,
            destination,
            socket,
        })
    }
}

/// Inbound UDP to the client port; everything else on the wire is noise.
fn addressed_to_client(bytes: &[u8]) -> bool {
    matches!(frame::decapsulate(bytes), Ok((_, udp, _)) if udp.destination_port == CLIENT_PORT)
}

#[async_trait]
impl Transport for RawTransport {
    fn interface(&self) -> &str {
        &self.interface
    }

    fn hardware_address(&self) -> MacAddress {
        self.hardware_address
    }

    fn framing(&self) -> Framing {
        Framing::Link
    }

    async fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        loop {
            let mut guard = self.socket.writable().await.map_err(TransportError::Send)?;
            match guard.try_io(|inner| inner.get_ref().send_to(bytes, &self.destination)) {
                Ok(result) => {
                    result.map_err(TransportError::Send)?;
                    return Ok(());
                }
                Err(_would_block) => continue,
            }
        }
    }

    async fn receive(&mut self, timeout: Duration) -> Result<Received, TransportError> {
        let deadline = deadline_after(timeout);
        let mut buffer = vec![0u8; FRAME_BUFFER_SIZE];
        loop {
            let Ok(guard) = tokio::time::timeout_at(deadline, self.socket.readable()).await else {
                return Ok(Received::Timeout);
            };
            let mut guard = guard.map_err(TransportError::Receive)?;
            let result = guard.try_io(|inner| {
                let mut socket: &Socket = inner.get_ref();
                socket.read(&mut buffer)
            });
            match result {
                Ok(Ok(size)) if addressed_to_client(&buffer[..size]) => {
                    return Ok(Received::Packet(buffer[..size].to_vec()));
                }
                Ok(Ok(size)) => trace!("dropped {size}-byte frame not addressed to port 68"),
                Ok(Err(error)) if error.kind() == io::ErrorKind::Interrupted => {}
                Ok(Err(error)) => return Err(TransportError::Receive(error)),
                Err(_would_block) => {}
            }
        }
    }
}

#[test]
fn link_address_test() {
    let address = link_address(3);
    assert_eq!(address.family(), libc::AF_PACKET as libc::sa_family_t);
    assert_eq!(address.len() as usize, mem::size_of::<libc::sockaddr_ll>());
}

#[test]
fn addressed_to_client_test() {
    use std::net::{Ipv4Addr, SocketAddrV4};

    let reply = |port| {
        frame::encapsulate(
            &[0u8; 16],
            MacAddress::new([0x02, 0, 0, 0, 0, 1]),
            MacAddress::new(frame::BROADCAST_MAC),
            SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), 67),
            SocketAddrV4::new(Ipv4Addr::BROADCAST, port),
        )
        .unwrap()
    };
    assert!(addressed_to_client(&reply(68)));
    assert!(!addressed_to_client(&reply(67)));
    assert!(!addressed_to_client(&[0u8; 20]));
}

#[test]
fn full_mtu_frame_fits_test() {
    use std::net::{Ipv4Addr, SocketAddrV4};

    // 1500-byte IPv4 packet: 20 IP + 8 UDP + 1472 payload
    let frame = frame::encapsulate(
        &[0u8; 1472],
        MacAddress::new([0x02, 0, 0, 0, 0, 1]),
        MacAddress::new(frame::BROADCAST_MAC),
        SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), 67),
        SocketAddrV4::new(Ipv4Addr::BROADCAST, CLIENT_PORT),
    )
    .unwrap();
    assert_eq!(frame.len(), 1514);
    assert!(frame.len() <= FRAME_BUFFER_SIZE);
}
