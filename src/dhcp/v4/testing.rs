//! In-memory transport and applier for engine tests. Replies are encoded with
//! dhcproto so the engine's decoder is exercised against an independent
//! encoder.

use async_trait::async_trait;
use dhcproto::{v4, Encodable, Encoder};
use mac_address::MacAddress;
use std::{
    collections::VecDeque,
    io,
    net::{Ipv4Addr, SocketAddrV4},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use tokio::time::Instant;

use super::lease::{ApplyError, LeaseApplier};
use crate::{
    protocol::{self, frame, DhcpPacket, CLIENT_PORT, SERVER_PORT},
    transport::{Framing, Received, Transport, TransportError},
};

pub(super) const CLIENT_MAC: [u8; 6] = [0x00, 0x00, 0x00, 0x11, 0x11, 0x11];
const SERVER_MAC: [u8; 6] = [0x02, 0x00, 0x00, 0x00, 0x00, 0x01];
pub(super) const SERVER_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);

type Responder = Box<dyn FnMut(&DhcpPacket) -> Vec<Vec<u8>> + Send>;

struct Inner {
    sent: Vec<(Instant, DhcpPacket)>,
    inbox: VecDeque<Vec<u8>>,
    responder: Responder,
}

/// Test-side view of what crossed the fake wire.
#[derive(Clone)]
pub(super) struct Wire(Arc<Mutex<Inner>>);

impl Wire {
    pub fn sent(&self) -> Vec<(Instant, DhcpPacket)> {
        self.0.lock().unwrap().sent.clone()
    }
}

/// Every sent packet is decoded and handed to the responder; its replies are
/// queued for later `receive` calls. An empty queue waits out the timeout on
/// the (paused) tokio clock.
pub(super) struct FakeTransport {
    framing: Framing,
    wire: Wire,
}

impl FakeTransport {
    pub fn new(
        framing: Framing,
        responder: impl FnMut(&DhcpPacket) -> Vec<Vec<u8>> + Send + 'static,
    ) -> FakeTransport {
        FakeTransport {
            framing,
            wire: Wire(Arc::new(Mutex::new(Inner {
                sent: Vec::new(),
                inbox: VecDeque::new(),
                responder: Box::new(responder),
            }))),
        }
    }

    pub fn net(&self) -> Wire {
        self.wire.clone()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    fn interface(&self) -> &str {
        "eth0"
    }

    fn hardware_address(&self) -> MacAddress {
        MacAddress::new(CLIENT_MAC)
    }

    fn framing(&self) -> Framing {
        self.framing
    }

    async fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let payload = match self.framing {
            Framing::Datagram => bytes,
            Framing::Link => {
                let (ip, udp, payload) = frame::decapsulate(bytes).unwrap();
                assert!(ip.checksum_valid());
                assert_eq!(ip.destination, Ipv4Addr::BROADCAST);
                assert_eq!(udp.source_port, CLIENT_PORT);
                assert_eq!(udp.destination_port, SERVER_PORT);
                payload
            }
        };
        let packet = protocol::decode(payload).unwrap();

        let mut inner = self.wire.0.lock().unwrap();
        let replies = (inner.responder)(&packet);
        inner.sent.push((Instant::now(), packet));
        for reply in replies {
            let reply = match self.framing {
                Framing::Datagram => reply,
                Framing::Link => frame::encapsulate(
                    &reply,
                    MacAddress::new(SERVER_MAC),
                    MacAddress::new(frame::BROADCAST_MAC),
                    SocketAddrV4::new(SERVER_IP, SERVER_PORT),
                    SocketAddrV4::new(Ipv4Addr::BROADCAST, CLIENT_PORT),
                )
                .unwrap(),
            };
            inner.inbox.push_back(reply);
        }
        Ok(())
    }

    async fn receive(&mut self, timeout: Duration) -> Result<Received, TransportError> {
        let next = self.wire.0.lock().unwrap().inbox.pop_front();
        match next {
            Some(bytes) => Ok(Received::Packet(bytes)),
            None => {
                tokio::time::sleep(timeout).await;
                Ok(Received::Timeout)
            }
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(super) enum Fault {
    Send,
    Receive,
}

/// A transport whose socket breaks on `fault`. Counts the sends it was
/// asked to make, failed ones included.
pub(super) struct FailingTransport {
    fault: Fault,
    sends: Arc<AtomicUsize>,
}

impl FailingTransport {
    pub fn new(fault: Fault) -> FailingTransport {
        FailingTransport {
            fault,
            sends: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn sends(&self) -> Arc<AtomicUsize> {
        self.sends.clone()
    }
}

#[async_trait]
impl Transport for FailingTransport {
    fn interface(&self) -> &str {
        "eth0"
    }

    fn hardware_address(&self) -> MacAddress {
        MacAddress::new(CLIENT_MAC)
    }

    fn framing(&self) -> Framing {
        Framing::Datagram
    }

    async fn send(&mut self, _bytes: &[u8]) -> Result<(), TransportError> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        match self.fault {
            Fault::Send => Err(TransportError::Send(io::Error::new(
                io::ErrorKind::NetworkDown,
                "network is down",
            ))),
            Fault::Receive => Ok(()),
        }
    }

    async fn receive(&mut self, _timeout: Duration) -> Result<Received, TransportError> {
        match self.fault {
            Fault::Receive => Err(TransportError::Receive(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "socket closed",
            ))),
            Fault::Send => Ok(Received::Timeout),
        }
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub(super) enum Applied {
    BringUp(String),
    Address(String, Ipv4Addr, Ipv4Addr),
    Route(String, Ipv4Addr),
}

#[derive(Default)]
pub(super) struct FakeApplier {
    calls: Arc<Mutex<Vec<Applied>>>,
}

impl FakeApplier {
    pub fn calls(&self) -> Arc<Mutex<Vec<Applied>>> {
        self.calls.clone()
    }
}

#[async_trait]
impl LeaseApplier for FakeApplier {
    async fn bring_up(&mut self, interface: &str) -> Result<(), ApplyError> {
        let call = Applied::BringUp(interface.to_string());
        self.calls.lock().unwrap().push(call);
        Ok(())
    }

    async fn apply_lease(
        &mut self,
        interface: &str,
        address: Ipv4Addr,
        netmask: Ipv4Addr,
    ) -> Result<(), ApplyError> {
        let call = Applied::Address(interface.to_string(), address, netmask);
        self.calls.lock().unwrap().push(call);
        Ok(())
    }

    async fn set_default_route(
        &mut self,
        interface: &str,
        gateway: Ipv4Addr,
    ) -> Result<(), ApplyError> {
        let call = Applied::Route(interface.to_string(), gateway);
        self.calls.lock().unwrap().push(call);
        Ok(())
    }
}

/// A BOOTREPLY to `request` from [`SERVER_IP`], built and encoded by dhcproto.
pub(super) fn dhcproto_reply(
    request: &DhcpPacket,
    yiaddr: Ipv4Addr,
    options: &[v4::DhcpOption],
) -> Vec<u8> {
    let mut message = v4::Message::default();
    message
        .set_opcode(v4::Opcode::BootReply)
        .set_xid(request.xid)
        .set_yiaddr(yiaddr)
        .set_siaddr(SERVER_IP)
        .set_chaddr(request.hardware_address());
    for option in options {
        message.opts_mut().insert(option.clone());
    }

    let mut buffer = Vec::with_capacity(1024);
    let mut encoder = Encoder::new(&mut buffer);
    message.encode(&mut encoder).unwrap();
    buffer
}
