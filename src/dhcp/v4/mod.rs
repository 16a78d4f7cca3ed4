//! DHCPv4 client engine: DISCOVER, OFFER, REQUEST, ACK/NAK.

mod discover;
mod error;
mod lease;
mod request;
#[cfg(test)]
mod testing;

pub use self::error::{ClientError, Phase, ProtocolError};
pub use self::lease::{ApplyError, DryRun, IpCommand, Lease, LeaseApplier};

use chrono::Local;
use mac_address::MacAddress;
use std::net::{Ipv4Addr, SocketAddrV4};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn, Level};

use self::{discover::Offer, request::Verdict};
use crate::{
    conf::ClientConfig,
    protocol::{
        self, frame, DhcpOption, DhcpPacket, ReplyOptions, BOOTREPLY, CLIENT_PORT, SERVER_PORT,
    },
    transport::{deadline_after, Framing, Received, Transport},
};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum State {
    Init,
    /// DISCOVER sent, waiting for OFFER.
    Selecting,
    /// REQUEST sent, waiting for ACK or NAK.
    Requesting,
    Bound,
    Failed,
}

impl State {
    pub fn is_terminal(self) -> bool {
        matches!(self, State::Bound | State::Failed)
    }
}

/// Everything learned during one negotiation.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ClientSession {
    pub interface: String,
    pub hardware_address: MacAddress,
    pub xid: u32,
    pub state: State,
    /// DISCOVERs sent so far.
    pub attempt: u32,
    pub offered_ip: Option<Ipv4Addr>,
    pub server_ip: Option<Ipv4Addr>,
    pub subnet_mask: Option<Ipv4Addr>,
    pub router: Option<Ipv4Addr>,
    pub dns_servers: Vec<Ipv4Addr>,
    pub lease_time: Option<u32>,
}

impl ClientSession {
    pub fn new(interface: &str, hardware_address: MacAddress) -> ClientSession {
        ClientSession {
            interface: interface.to_string(),
            hardware_address,
            xid: 0,
            state: State::Init,
            attempt: 0,
            offered_ip: None,
            server_ip: None,
            subnet_mask: None,
            router: None,
            dns_servers: Vec::new(),
            lease_time: None,
        }
    }
}

pub struct Client<T, A> {
    config: ClientConfig,
    transport: T,
    applier: A,
    session: ClientSession,
    lease: Option<Lease>,
}

impl<T: Transport, A: LeaseApplier> Client<T, A> {
    pub fn new(config: ClientConfig, transport: T, applier: A) -> Client<T, A> {
        let session = ClientSession::new(transport.interface(), transport.hardware_address());
        Client {
            config,
            transport,
            applier,
            session,
            lease: None,
        }
    }

    pub fn state(&self) -> State {
        self.session.state
    }

    pub fn session(&self) -> &ClientSession {
        &self.session
    }

    /// Brings the link up and negotiates until bound or failed. The transport
    /// is dropped on return.
    pub async fn run(mut self) -> Result<Lease, ClientError> {
        let interface = self.session.interface.clone();
        self.applier
            .bring_up(&interface)
            .await
            .map_err(|source| ClientError::Apply {
                phase: Phase::Discover,
                source,
            })?;
        while !self.session.state.is_terminal() {
            self.step().await?;
        }
        self.lease.take().ok_or(ClientError::NotBound)
    }

    /// Performs one transition. Errors leave the session in [`State::Failed`].
    pub async fn step(&mut self) -> Result<State, ClientError> {
        let result = match self.session.state {
            State::Init => self.discover().await,
            State::Selecting => self.select().await,
            State::Requesting => self.request().await,
            State::Bound | State::Failed => Ok(()),
        };
        if result.is_err() {
            self.session.state = State::Failed;
        }
        result.map(|()| self.session.state)
    }

    async fn discover(&mut self) -> Result<(), ClientError> {
        let session = &mut self.session;
        session.attempt += 1;
        session.xid = rand::random();
        session.offered_ip = None;
        session.server_ip = None;

        let (packet, options) =
            discover::build(session, &self.config).map_err(|source| ClientError::Option {
                phase: Phase::Discover,
                source,
            })?;
        info!(
            xid = session.xid,
            attempt = session.attempt,
            "sending DHCPDISCOVER on {}",
            session.interface
        );
        self.send(Phase::Discover, &packet, &options).await?;
        self.session.state = State::Selecting;
        Ok(())
    }

    async fn select(&mut self) -> Result<(), ClientError> {
        let Some(offer) = self.await_reply(Phase::Offer, discover::accept).await? else {
            return self.retry_or_fail(Phase::Offer).await;
        };
        info!(
            address = %offer.address,
            server = %offer.server,
            "received DHCPOFFER"
        );
        self.session.offered_ip = Some(offer.address);
        self.session.server_ip = Some(offer.server);

        let (packet, options) = request::build(&self.session, &self.config, &offer).map_err(
            |source| ClientError::Option {
                phase: Phase::Request,
                source,
            },
        )?;
        info!(address = %offer.address, "sending DHCPREQUEST");
        self.send(Phase::Request, &packet, &options).await?;
        self.session.state = State::Requesting;
        Ok(())
    }

    async fn request(&mut self) -> Result<(), ClientError> {
        let offer = match (self.session.offered_ip, self.session.server_ip) {
            (Some(address), Some(server)) => Offer { address, server },
            _ => return Err(ClientError::NotBound),
        };
        match self.await_reply(Phase::Ack, request::verdict).await? {
            Some(Verdict::Ack { address, options }) => self.bind(&offer, address, options).await,
            Some(Verdict::Nak { server }) => {
                let server = server.unwrap_or(offer.server);
                warn!(%server, address = %offer.address, "received DHCPNAK");
                self.session.state = State::Failed;
                Err(ClientError::Nak {
                    server,
                    address: offer.address,
                })
            }
            None => self.retry_or_fail(Phase::Ack).await,
        }
    }

    async fn bind(
        &mut self,
        offer: &Offer,
        acked: Ipv4Addr,
        options: ReplyOptions,
    ) -> Result<(), ClientError> {
        let address = if acked.is_unspecified() { offer.address } else { acked };
        let session = &mut self.session;
        session.offered_ip = Some(address);
        session.subnet_mask = options.subnet_mask;
        session.router = options.router;
        session.dns_servers = options.dns_servers;
        session.lease_time = options.lease_time;

        let lease = Lease {
            interface: session.interface.clone(),
            address,
            subnet_mask: session.subnet_mask,
            router: session.router,
            dns_servers: session.dns_servers.clone(),
            server_identifier: options.server_identifier.unwrap_or(offer.server),
            lease_time: session.lease_time,
            obtained_at: Local::now(),
        };
        info!(
            address = %lease.address,
            netmask = %lease.netmask(),
            lease_time = ?lease.lease_time,
            "received DHCPACK"
        );

        let apply_error = |source| ClientError::Apply {
            phase: Phase::Ack,
            source,
        };
        self.applier
            .apply_lease(&lease.interface, lease.address, lease.netmask())
            .await
            .map_err(apply_error)?;
        if let Some(gateway) = lease.router {
            self.applier
                .set_default_route(&lease.interface, gateway)
                .await
                .map_err(apply_error)?;
        }

        self.session.state = State::Bound;
        self.lease = Some(lease);
        Ok(())
    }

    /// Starts another attempt after the retry delay, or fails once the
    /// attempt budget is spent.
    async fn retry_or_fail(&mut self, phase: Phase) -> Result<(), ClientError> {
        let attempts = self.session.attempt;
        if attempts >= self.config.retries {
            warn!(attempts, "no {phase} received, giving up");
            self.session.state = State::Failed;
            return Err(ClientError::Exhausted { phase, attempts });
        }
        warn!(
            attempt = attempts,
            "no {phase} within {}s, retrying in {}s",
            self.config.timeout,
            self.config.retry_delay
        );
        tokio::time::sleep(self.config.retry_delay()).await;
        self.session.state = State::Init;
        Ok(())
    }

    async fn send(
        &mut self,
        phase: Phase,
        packet: &DhcpPacket,
        options: &[DhcpOption],
    ) -> Result<(), ClientError> {
        let payload = protocol::encode(packet, options)
            .map_err(|source| ClientError::Encode { phase, source })?;
        if tracing::enabled!(Level::DEBUG) {
            if let Ok(sent) = protocol::decode(&payload) {
                debug!("{phase} packet:\n{sent}");
            }
        }
        let bytes = match self.transport.framing() {
            Framing::Datagram => payload,
            Framing::Link => frame::encapsulate(
                &payload,
                self.session.hardware_address,
                MacAddress::new(frame::BROADCAST_MAC),
                SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, CLIENT_PORT),
                SocketAddrV4::new(Ipv4Addr::BROADCAST, SERVER_PORT),
            )
            .map_err(|source| ClientError::Frame { phase, source })?,
        };
        self.transport
            .send(&bytes)
            .await
            .map_err(|source| ClientError::Transport { phase, source })
    }

    fn open(&self, bytes: &[u8]) -> Result<DhcpPacket, ProtocolError> {
        match self.transport.framing() {
            Framing::Datagram => Ok(protocol::decode(bytes)?),
            Framing::Link => {
                let (_, udp, payload) = frame::decapsulate(bytes)?;
                if udp.destination_port != CLIENT_PORT {
                    return Err(ProtocolError::WrongPort(udp.destination_port));
                }
                Ok(protocol::decode(payload)?)
            }
        }
    }

    /// Waits one timeout window for a reply to the current xid that `accept`
    /// takes. Anything else is dropped and the wait goes on with the time
    /// left. `None` when the window closes.
    async fn await_reply<R>(
        &mut self,
        phase: Phase,
        accept: impl Fn(&DhcpPacket) -> Option<R>,
    ) -> Result<Option<R>, ClientError> {
        let deadline = deadline_after(self.config.timeout());
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            let received = self
                .transport
                .receive(remaining)
                .await
                .map_err(|source| ClientError::Transport { phase, source })?;
            let bytes = match received {
                Received::Packet(bytes) => bytes,
                Received::Timeout => return Ok(None),
            };
            let packet = match self.open(&bytes) {
                Ok(packet) => packet,
                Err(error) => {
                    trace!(%error, "discarding packet");
                    continue;
                }
            };
            if packet.op != BOOTREPLY || packet.xid != self.session.xid {
                debug!(
                    xid = packet.xid,
                    op = packet.op,
                    "discarding unrelated packet"
                );
                continue;
            }
            debug!("reply while waiting for {phase}:\n{packet}");
            match accept(&packet) {
                Some(reply) => return Ok(Some(reply)),
                None => debug!(
                    message_type = ?packet.message_type(),
                    "discarding reply while waiting for {phase}"
                ),
            }
        }
    }
}

#[cfg(test)]
use self::testing::{
    dhcproto_reply, Applied, FailingTransport, FakeApplier, FakeTransport, Fault, CLIENT_MAC,
    SERVER_IP,
};
#[cfg(test)]
use crate::transport::TransportError;
#[cfg(test)]
use std::sync::atomic::Ordering;
#[cfg(test)]
use dhcproto::v4;
#[cfg(test)]
use std::time::Duration;

#[cfg(test)]
fn config() -> ClientConfig {
    ClientConfig {
        interface: Some("eth0".to_string()),
        ..ClientConfig::default()
    }
}

#[cfg(test)]
fn offer_options() -> Vec<v4::DhcpOption> {
    vec![
        v4::DhcpOption::MessageType(v4::MessageType::Offer),
        v4::DhcpOption::ServerIdentifier(SERVER_IP),
    ]
}

#[cfg(test)]
fn ack_options() -> Vec<v4::DhcpOption> {
    vec![
        v4::DhcpOption::MessageType(v4::MessageType::Ack),
        v4::DhcpOption::ServerIdentifier(SERVER_IP),
        v4::DhcpOption::SubnetMask(Ipv4Addr::new(255, 255, 255, 0)),
        v4::DhcpOption::Router(vec![SERVER_IP]),
        v4::DhcpOption::DomainNameServer(vec![SERVER_IP, Ipv4Addr::new(8, 8, 8, 8)]),
        v4::DhcpOption::AddressLeaseTime(86400),
    ]
}

#[cfg(test)]
const OFFERED: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 5);

/// Answers DISCOVER with an OFFER of 10.0.0.5 and REQUEST with an ACK.
#[cfg(test)]
fn cooperative_server(request: &DhcpPacket) -> Vec<Vec<u8>> {
    match request.message_type() {
        Some(protocol::MessageType::Discover) => {
            vec![dhcproto_reply(request, OFFERED, &offer_options())]
        }
        Some(protocol::MessageType::Request) => {
            vec![dhcproto_reply(request, OFFERED, &ack_options())]
        }
        _ => vec![],
    }
}

#[tokio::test(start_paused = true)]
async fn silence_exhausts_retries_test() {
    let transport = FakeTransport::new(Framing::Datagram, |_| vec![]);
    let net = transport.net();
    let client = Client::new(config(), transport, FakeApplier::default());

    let started = Instant::now();
    let result = client.run().await;
    assert!(matches!(
        result,
        Err(ClientError::Exhausted {
            phase: Phase::Offer,
            attempts: 3
        })
    ));

    let sent = net.sent();
    assert_eq!(sent.len(), 3);
    for pair in sent.windows(2) {
        let gap = pair[1].0 - pair[0].0;
        assert!(gap >= Duration::from_secs(7) && gap < Duration::from_millis(7100));
        assert_ne!(pair[0].1.xid, pair[1].1.xid);
    }
    for (_, packet) in &sent {
        assert_eq!(packet.message_type(), Some(protocol::MessageType::Discover));
    }
    // three windows and two delays, none after the last attempt
    let elapsed = Instant::now() - started;
    assert!(elapsed >= Duration::from_secs(19) && elapsed < Duration::from_millis(19100));
}

#[tokio::test(start_paused = true)]
async fn offer_moves_to_requesting_test() {
    let transport = FakeTransport::new(Framing::Datagram, |request| match request.message_type() {
        Some(protocol::MessageType::Discover) => {
            vec![dhcproto_reply(request, OFFERED, &offer_options())]
        }
        _ => vec![],
    });
    let net = transport.net();
    let mut client = Client::new(config(), transport, FakeApplier::default());

    assert_eq!(client.step().await.unwrap(), State::Selecting);
    assert_eq!(client.step().await.unwrap(), State::Requesting);
    assert_eq!(client.session().offered_ip, Some(OFFERED));
    assert_eq!(client.session().server_ip, Some(SERVER_IP));
    assert_eq!(client.session().attempt, 1);

    let sent = net.sent();
    assert_eq!(sent.len(), 2);
    let (_, discover) = &sent[0];
    let (_, request) = &sent[1];
    assert_eq!(discover.xid, request.xid);
    assert_eq!(request.message_type(), Some(protocol::MessageType::Request));
    let options = request.reply_options();
    assert_eq!(options.requested_ip, Some(OFFERED));
    assert_eq!(options.server_identifier, Some(SERVER_IP));
}

#[tokio::test(start_paused = true)]
async fn ack_binds_and_applies_test() {
    for framing in [Framing::Datagram, Framing::Link] {
        let transport = FakeTransport::new(framing, cooperative_server);
        let net = transport.net();
        let applier = FakeApplier::default();
        let applied = applier.calls();
        let client = Client::new(config(), transport, applier);

        let lease = client.run().await.unwrap();
        assert_eq!(lease.interface, "eth0");
        assert_eq!(lease.address, OFFERED);
        assert_eq!(lease.netmask(), Ipv4Addr::new(255, 255, 255, 0));
        assert_eq!(lease.router, Some(SERVER_IP));
        assert_eq!(lease.dns_servers, vec![SERVER_IP, Ipv4Addr::new(8, 8, 8, 8)]);
        assert_eq!(lease.server_identifier, SERVER_IP);
        assert_eq!(lease.lease_time, Some(86400));
        assert_eq!(
            lease.expires_at().map(|at| at - lease.obtained_at),
            Some(chrono::Duration::seconds(86400))
        );

        assert_eq!(
            applied.lock().unwrap().as_slice(),
            &[
                Applied::BringUp("eth0".to_string()),
                Applied::Address(
                    "eth0".to_string(),
                    OFFERED,
                    Ipv4Addr::new(255, 255, 255, 0)
                ),
                Applied::Route("eth0".to_string(), SERVER_IP),
            ]
        );
        assert_eq!(net.sent().len(), 2);
        assert_eq!(net.sent()[0].1.hardware_address(), &CLIENT_MAC);
    }
}

#[tokio::test(start_paused = true)]
async fn nak_fails_without_retry_test() {
    let transport = FakeTransport::new(Framing::Datagram, |request| match request.message_type() {
        Some(protocol::MessageType::Discover) => {
            vec![dhcproto_reply(request, OFFERED, &offer_options())]
        }
        _ => vec![dhcproto_reply(
            request,
            Ipv4Addr::UNSPECIFIED,
            &[
                v4::DhcpOption::MessageType(v4::MessageType::Nak),
                v4::DhcpOption::ServerIdentifier(SERVER_IP),
            ],
        )],
    });
    let net = transport.net();
    let applier = FakeApplier::default();
    let applied = applier.calls();
    let mut client = Client::new(config(), transport, applier);

    client.step().await.unwrap();
    client.step().await.unwrap();
    let result = client.step().await;
    assert!(matches!(
        result,
        Err(ClientError::Nak { server, address }) if server == SERVER_IP && address == OFFERED
    ));
    assert_eq!(client.state(), State::Failed);
    assert_eq!(client.step().await.unwrap(), State::Failed);
    assert_eq!(net.sent().len(), 2);
    assert!(applied.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn unrelated_replies_are_ignored_test() {
    let transport = FakeTransport::new(Framing::Datagram, |request| {
        let mut stranger = request.clone();
        stranger.xid = request.xid.wrapping_add(1);
        vec![
            vec![0u8; 12],
            dhcproto_reply(&stranger, Ipv4Addr::new(10, 0, 0, 99), &offer_options()),
            // our own broadcast echoed back
            protocol::encode(request, &[DhcpOption::message_type(protocol::MessageType::Discover)])
                .unwrap(),
            dhcproto_reply(request, OFFERED, &offer_options()),
        ]
    });
    let mut client = Client::new(config(), transport, FakeApplier::default());

    let started = Instant::now();
    client.step().await.unwrap();
    assert_eq!(client.step().await.unwrap(), State::Requesting);
    assert_eq!(client.session().attempt, 1);
    assert_eq!(client.session().offered_ip, Some(OFFERED));
    assert!(Instant::now() - started < config().timeout());
}

#[tokio::test(start_paused = true)]
async fn wrong_xid_only_times_out_test() {
    let transport = FakeTransport::new(Framing::Datagram, |request| {
        let mut stranger = request.clone();
        stranger.xid = request.xid ^ 0xffff_ffff;
        vec![dhcproto_reply(&stranger, OFFERED, &offer_options())]
    });
    let mut client = Client::new(config(), transport, FakeApplier::default());

    assert_eq!(client.step().await.unwrap(), State::Selecting);
    let xid = client.session().xid;
    // the window runs out, then the retry delay passes
    assert_eq!(client.step().await.unwrap(), State::Init);
    assert_eq!(client.session().attempt, 1);
    assert_eq!(client.session().offered_ip, None);
    assert_eq!(client.step().await.unwrap(), State::Selecting);
    assert_eq!(client.session().attempt, 2);
    assert_ne!(client.session().xid, xid);
}

#[tokio::test(start_paused = true)]
async fn duplicate_offer_while_requesting_test() {
    let transport = FakeTransport::new(Framing::Datagram, |request| match request.message_type() {
        Some(protocol::MessageType::Discover) => {
            vec![dhcproto_reply(request, OFFERED, &offer_options())]
        }
        _ => vec![
            dhcproto_reply(request, OFFERED, &offer_options()),
            dhcproto_reply(request, OFFERED, &ack_options()),
        ],
    });
    let mut client = Client::new(config(), transport, FakeApplier::default());

    client.step().await.unwrap();
    client.step().await.unwrap();
    assert_eq!(client.step().await.unwrap(), State::Bound);
    assert_eq!(client.session().lease_time, Some(86400));
}

#[tokio::test(start_paused = true)]
async fn ack_timeout_shares_attempt_budget_test() {
    let transport = FakeTransport::new(Framing::Datagram, |request| match request.message_type() {
        Some(protocol::MessageType::Discover) => {
            vec![dhcproto_reply(request, OFFERED, &offer_options())]
        }
        _ => vec![],
    });
    let net = transport.net();
    let config = ClientConfig {
        retries: 2,
        ..config()
    };
    let client = Client::new(config, transport, FakeApplier::default());

    let result = client.run().await;
    assert!(matches!(
        result,
        Err(ClientError::Exhausted {
            phase: Phase::Ack,
            attempts: 2
        })
    ));
    let types: Vec<_> = net
        .sent()
        .iter()
        .map(|(_, packet)| packet.message_type())
        .collect();
    use protocol::MessageType::{Discover, Request};
    assert_eq!(
        types,
        vec![Some(Discover), Some(Request), Some(Discover), Some(Request)]
    );
    let sent = net.sent();
    assert_eq!(sent[0].1.xid, sent[1].1.xid);
    assert_ne!(sent[1].1.xid, sent[2].1.xid);
}

#[tokio::test(start_paused = true)]
async fn ack_without_yiaddr_keeps_offer_test() {
    let transport = FakeTransport::new(Framing::Datagram, |request| match request.message_type() {
        Some(protocol::MessageType::Discover) => {
            vec![dhcproto_reply(request, OFFERED, &offer_options())]
        }
        _ => vec![dhcproto_reply(
            request,
            Ipv4Addr::UNSPECIFIED,
            &[v4::DhcpOption::MessageType(v4::MessageType::Ack)],
        )],
    });
    let applier = FakeApplier::default();
    let applied = applier.calls();
    let lease = Client::new(config(), transport, applier).run().await.unwrap();

    assert_eq!(lease.address, OFFERED);
    assert_eq!(lease.server_identifier, SERVER_IP);
    assert_eq!(lease.router, None);
    // class A default without option 1, and no route without option 3
    assert_eq!(
        applied.lock().unwrap().last(),
        Some(&Applied::Address(
            "eth0".to_string(),
            OFFERED,
            Ipv4Addr::new(255, 0, 0, 0)
        ))
    );
}

#[tokio::test(start_paused = true)]
async fn receive_failure_is_fatal_test() {
    let transport = FailingTransport::new(Fault::Receive);
    let sends = transport.sends();
    let mut client = Client::new(config(), transport, FakeApplier::default());

    assert_eq!(client.step().await.unwrap(), State::Selecting);
    let started = Instant::now();
    let result = client.step().await;
    assert!(matches!(
        result,
        Err(ClientError::Transport {
            phase: Phase::Offer,
            source: TransportError::Receive(_)
        })
    ));
    assert_eq!(result.unwrap_err().phase(), Some(Phase::Offer));
    assert_eq!(client.state(), State::Failed);
    // no retry, no retry delay
    assert_eq!(client.step().await.unwrap(), State::Failed);
    assert_eq!(sends.load(Ordering::SeqCst), 1);
    assert_eq!(Instant::now(), started);

    let transport = FailingTransport::new(Fault::Receive);
    let sends = transport.sends();
    let result = Client::new(config(), transport, FakeApplier::default()).run().await;
    assert!(matches!(
        result,
        Err(ClientError::Transport {
            phase: Phase::Offer,
            ..
        })
    ));
    assert_eq!(sends.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn send_failure_is_fatal_test() {
    let transport = FailingTransport::new(Fault::Send);
    let sends = transport.sends();
    let mut client = Client::new(config(), transport, FakeApplier::default());

    let result = client.step().await;
    assert!(matches!(
        result,
        Err(ClientError::Transport {
            phase: Phase::Discover,
            source: TransportError::Send(_)
        })
    ));
    assert_eq!(client.state(), State::Failed);
    assert_eq!(client.session().attempt, 1);

    let transport = FailingTransport::new(Fault::Send);
    let run_sends = transport.sends();
    let result = Client::new(config(), transport, FakeApplier::default()).run().await;
    assert!(matches!(
        result,
        Err(ClientError::Transport {
            phase: Phase::Discover,
            ..
        })
    ));
    assert_eq!(sends.load(Ordering::SeqCst), 1);
    assert_eq!(run_sends.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn huge_timeout_still_binds_test() {
    let transport = FakeTransport::new(Framing::Datagram, cooperative_server);
    let config = ClientConfig {
        timeout: u64::MAX,
        ..config()
    };
    let lease = Client::new(config, transport, FakeApplier::default())
        .run()
        .await
        .unwrap();
    assert_eq!(lease.address, OFFERED);
}
