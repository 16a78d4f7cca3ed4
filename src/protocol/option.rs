use std::{fmt, net::Ipv4Addr};

use thiserror::Error;

pub mod tag {
    pub const PAD: u8 = 0;
    pub const SUBNET_MASK: u8 = 1;
    pub const ROUTER: u8 = 3;
    pub const DNS_SERVER: u8 = 6;
    pub const REQUESTED_IP: u8 = 50;
    pub const LEASE_TIME: u8 = 51;
    pub const MESSAGE_TYPE: u8 = 53;
    pub const SERVER_IDENTIFIER: u8 = 54;
    pub const PARAMETER_REQUEST_LIST: u8 = 55;
    pub const CLIENT_IDENTIFIER: u8 = 61;
    pub const END: u8 = 255;
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OptionError {
    #[error("option code {0} is reserved for padding or end of options")]
    Sentinel(u8),
    #[error("option {code} value is {len} bytes, at most 255 fit in one option")]
    TooLong { code: u8, len: usize },
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[repr(u8)]
pub enum MessageType {
    Discover = 1,
    Offer = 2,
    Request = 3,
    Decline = 4,
    Ack = 5,
    Nak = 6,
    Release = 7,
    Inform = 8,
}

impl TryFrom<u8> for MessageType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(MessageType::Discover),
            2 => Ok(MessageType::Offer),
            3 => Ok(MessageType::Request),
            4 => Ok(MessageType::Decline),
            5 => Ok(MessageType::Ack),
            6 => Ok(MessageType::Nak),
            7 => Ok(MessageType::Release),
            8 => Ok(MessageType::Inform),
            other => Err(other),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageType::Discover => "DHCPDISCOVER",
            MessageType::Offer => "DHCPOFFER",
            MessageType::Request => "DHCPREQUEST",
            MessageType::Decline => "DHCPDECLINE",
            MessageType::Ack => "DHCPACK",
            MessageType::Nak => "DHCPNAK",
            MessageType::Release => "DHCPRELEASE",
            MessageType::Inform => "DHCPINFORM",
        };
        f.write_str(name)
    }
}

/// An owned option ready to be written. Never a Pad or End sentinel, and the
/// value always fits the one-byte length.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct DhcpOption {
    code: u8,
    value: Vec<u8>,
}

impl DhcpOption {
    pub fn new(code: u8, value: impl Into<Vec<u8>>) -> Result<DhcpOption, OptionError> {
        let value = value.into();
        if code == tag::PAD || code == tag::END {
            return Err(OptionError::Sentinel(code));
        }
        if value.len() > u8::MAX as usize {
            return Err(OptionError::TooLong {
                code,
                len: value.len(),
            });
        }
        Ok(DhcpOption { code, value })
    }

    // the constructors below produce values that can never violate `new`'s checks
    fn known(code: u8, value: Vec<u8>) -> DhcpOption {
        DhcpOption { code, value }
    }

    pub fn message_type(ty: MessageType) -> DhcpOption {
        Self::known(tag::MESSAGE_TYPE, vec![ty as u8])
    }

    pub fn subnet_mask(mask: Ipv4Addr) -> DhcpOption {
        Self::known(tag::SUBNET_MASK, mask.octets().to_vec())
    }

    pub fn router(router: Ipv4Addr) -> DhcpOption {
        Self::known(tag::ROUTER, router.octets().to_vec())
    }

    pub fn requested_ip(address: Ipv4Addr) -> DhcpOption {
        Self::known(tag::REQUESTED_IP, address.octets().to_vec())
    }

    pub fn lease_time(seconds: u32) -> DhcpOption {
        Self::known(tag::LEASE_TIME, seconds.to_be_bytes().to_vec())
    }

    pub fn server_identifier(server: Ipv4Addr) -> DhcpOption {
        Self::known(tag::SERVER_IDENTIFIER, server.octets().to_vec())
    }

    pub fn parameter_request_list(codes: &[u8]) -> Result<DhcpOption, OptionError> {
        Self::new(tag::PARAMETER_REQUEST_LIST, codes)
    }

    /// Type byte followed by the identifier, e.g. `1` + MAC for Ethernet.
    pub fn client_identifier(kind: u8, id: &[u8]) -> Result<DhcpOption, OptionError> {
        let mut value = Vec::with_capacity(id.len() + 1);
        value.push(kind);
        value.extend_from_slice(id);
        Self::new(tag::CLIENT_IDENTIFIER, value)
    }

    pub fn code(&self) -> u8 {
        self.code
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    pub fn as_raw(&self) -> RawOption<'_> {
        RawOption {
            code: self.code,
            value: &self.value,
        }
    }
}

/// An option as found on the wire, borrowing from the packet buffer.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct RawOption<'a> {
    pub code: u8,
    pub value: &'a [u8],
}

impl From<RawOption<'_>> for DhcpOption {
    fn from(raw: RawOption<'_>) -> Self {
        // a parsed value is at most 255 bytes and its code is never a sentinel
        DhcpOption::known(raw.code, raw.value.to_vec())
    }
}

/// Lazy scan over an option region. Clone it before iterating, or call
/// [`parse`] again, to walk the region a second time.
#[derive(Clone, Debug)]
pub struct Options<'a> {
    bytes: &'a [u8],
    cursor: usize,
}

pub fn parse(bytes: &[u8]) -> Options<'_> {
    Options { bytes, cursor: 0 }
}

impl<'a> Iterator for Options<'a> {
    type Item = RawOption<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let code = *self.bytes.get(self.cursor)?;
            match code {
                tag::PAD => {
                    self.cursor += 1;
                }
                tag::END => {
                    self.cursor = self.bytes.len();
                    return None;
                }
                _ => {
                    let start = self.cursor + 2;
                    let end = self
                        .bytes
                        .get(self.cursor + 1)
                        .map(|&len| start + len as usize)
                        .filter(|&end| end <= self.bytes.len());
                    let Some(end) = end else {
                        // truncated length byte or value: treat as End
                        self.cursor = self.bytes.len();
                        return None;
                    };
                    self.cursor = end;
                    return Some(RawOption {
                        code,
                        value: &self.bytes[start..end],
                    });
                }
            }
        }
    }
}

/// Appends `(code, value)` pairs and writes the End marker exactly once.
#[derive(Default, Debug)]
pub struct OptionsBuilder {
    buffer: Vec<u8>,
}

impl OptionsBuilder {
    pub fn new() -> OptionsBuilder {
        OptionsBuilder::default()
    }

    pub fn push(&mut self, option: &DhcpOption) -> &mut Self {
        self.buffer.push(option.code);
        self.buffer.push(option.value.len() as u8);
        self.buffer.extend_from_slice(&option.value);
        self
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.buffer.push(tag::END);
        self.buffer
    }
}

/// Serializes `options` followed by End. Total size is not capped here.
pub fn format<'a, I>(options: I) -> Vec<u8>
where
    I: IntoIterator<Item = &'a DhcpOption>,
{
    let mut builder = OptionsBuilder::new();
    for option in options {
        builder.push(option);
    }
    builder.finish()
}

/// A recognized option decoded into its meaning.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum KnownOption {
    SubnetMask(Ipv4Addr),
    Router(Ipv4Addr),
    DnsServers(Vec<Ipv4Addr>),
    RequestedIp(Ipv4Addr),
    LeaseTime(u32),
    MessageType(MessageType),
    ServerIdentifier(Ipv4Addr),
    ParameterRequestList(Vec<u8>),
    ClientIdentifier(Vec<u8>),
}

fn ipv4(value: &[u8]) -> Option<Ipv4Addr> {
    let octets: [u8; 4] = value.try_into().ok()?;
    Some(Ipv4Addr::from(octets))
}

impl KnownOption {
    /// `None` for unrecognized codes and for recognized codes whose length is
    /// wrong; such options are ignored by callers.
    pub fn decode(raw: RawOption<'_>) -> Option<KnownOption> {
        let value = raw.value;
        let option = match raw.code {
            tag::SUBNET_MASK => KnownOption::SubnetMask(ipv4(value)?),
            tag::ROUTER => KnownOption::Router(ipv4(value.get(..4)?)?),
            tag::DNS_SERVER => {
                if value.len() < 4 {
                    return None;
                }
                KnownOption::DnsServers(value.chunks_exact(4).filter_map(ipv4).collect())
            }
            tag::REQUESTED_IP => KnownOption::RequestedIp(ipv4(value)?),
            tag::LEASE_TIME => KnownOption::LeaseTime(u32::from_be_bytes(value.try_into().ok()?)),
            tag::MESSAGE_TYPE => match value {
                [ty] => KnownOption::MessageType(MessageType::try_from(*ty).ok()?),
                _ => return None,
            },
            tag::SERVER_IDENTIFIER => KnownOption::ServerIdentifier(ipv4(value)?),
            tag::PARAMETER_REQUEST_LIST => KnownOption::ParameterRequestList(value.to_vec()),
            tag::CLIENT_IDENTIFIER => KnownOption::ClientIdentifier(value.to_vec()),
            _ => return None,
        };
        Some(option)
    }
}

impl fmt::Display for KnownOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KnownOption::SubnetMask(mask) => write!(f, "Subnet Mask: {mask}"),
            KnownOption::Router(router) => write!(f, "Router: {router}"),
            KnownOption::DnsServers(servers) => {
                f.write_str("DNS Server:")?;
                for server in servers {
                    write!(f, " {server}")?;
                }
                Ok(())
            }
            KnownOption::RequestedIp(address) => write!(f, "Requested IP: {address}"),
            KnownOption::LeaseTime(seconds) => write!(f, "Lease Time: {seconds} seconds"),
            KnownOption::MessageType(ty) => write!(f, "Message type: {ty}"),
            KnownOption::ServerIdentifier(server) => write!(f, "DHCP Server: {server}"),
            KnownOption::ParameterRequestList(codes) => {
                write!(f, "Parameter Request List: {codes:?}")
            }
            KnownOption::ClientIdentifier(id) => {
                f.write_str("Client Identifier:")?;
                for b in id {
                    write!(f, " {b:02X}")?;
                }
                Ok(())
            }
        }
    }
}

/// The values a client reads from an OFFER or ACK. A later occurrence of a
/// code overrides an earlier one; malformed occurrences leave the field alone.
#[derive(Clone, Default, PartialEq, Eq, Debug)]
pub struct ReplyOptions {
    pub message_type: Option<MessageType>,
    pub subnet_mask: Option<Ipv4Addr>,
    pub router: Option<Ipv4Addr>,
    pub dns_servers: Vec<Ipv4Addr>,
    pub requested_ip: Option<Ipv4Addr>,
    pub lease_time: Option<u32>,
    pub server_identifier: Option<Ipv4Addr>,
}

impl ReplyOptions {
    pub fn extract(bytes: &[u8]) -> ReplyOptions {
        let mut reply = ReplyOptions::default();
        for option in parse(bytes).filter_map(KnownOption::decode) {
            match option {
                KnownOption::SubnetMask(mask) => reply.subnet_mask = Some(mask),
                KnownOption::Router(router) => reply.router = Some(router),
                KnownOption::DnsServers(servers) => reply.dns_servers = servers,
                KnownOption::RequestedIp(address) => reply.requested_ip = Some(address),
                KnownOption::LeaseTime(seconds) => reply.lease_time = Some(seconds),
                KnownOption::MessageType(ty) => reply.message_type = Some(ty),
                KnownOption::ServerIdentifier(server) => reply.server_identifier = Some(server),
                KnownOption::ParameterRequestList(_) | KnownOption::ClientIdentifier(_) => {}
            }
        }
        reply
    }
}

#[test]
fn parse_test() {
    const BUFFER: [u8; 17] = [
        0, 0, // pad
        53, 1, 1, // option dhcp message type
        55, 5, 1, 28, 3, 15, 6, // parameter list
        0, // pad
        255, // end
        1, 4, 0, // ignored after end
    ];
    let options: Vec<_> = parse(&BUFFER).collect();
    assert_eq!(
        options,
        vec![
            RawOption {
                code: 53,
                value: &[1]
            },
            RawOption {
                code: 55,
                value: &[1, 28, 3, 15, 6]
            },
        ]
    );
}

#[test]
fn restartable_test() {
    let bytes = [53, 1, 2, 54, 4, 10, 0, 0, 1, 255];
    let options = parse(&bytes);
    assert_eq!(options.clone().count(), 2);
    assert_eq!(options.clone().count(), 2);
    assert_eq!(parse(&bytes).count(), 2);
}

#[test]
fn overrun_test() {
    // the router option declares 8 bytes but only 3 remain
    let bytes = [53, 1, 5, 1, 4, 255, 255, 255, 0, 3, 8, 10, 0, 0];
    let options: Vec<_> = parse(&bytes).collect();
    assert_eq!(options.len(), 2);
    assert_eq!(options[1].code, tag::SUBNET_MASK);

    // missing length byte
    let options: Vec<_> = parse(&[53, 1, 5, 51]).collect();
    assert_eq!(options.len(), 1);

    // no End at all is fine
    assert_eq!(parse(&[53, 1, 5]).count(), 1);
    assert_eq!(parse(&[]).count(), 0);
}

#[test]
fn format_test() {
    let options = vec![
        DhcpOption::message_type(MessageType::Request),
        DhcpOption::requested_ip(Ipv4Addr::new(10, 0, 0, 5)),
        DhcpOption::server_identifier(Ipv4Addr::new(10, 0, 0, 1)),
    ];
    assert_eq!(
        format(&options),
        vec![53, 1, 3, 50, 4, 10, 0, 0, 5, 54, 4, 10, 0, 0, 1, 255]
    );
    assert_eq!(format(&[]), vec![255]);
}

#[test]
fn format_parse_idempotence_test() {
    let bytes = [0, 53, 1, 2, 0, 0, 61, 7, 1, 0, 0, 0, 17, 17, 17, 99, 0, 255, 0, 0];
    let options: Vec<DhcpOption> = parse(&bytes).map(DhcpOption::from).collect();
    let formatted = format(&options);
    assert_eq!(formatted.last(), Some(&tag::END));
    let reparsed: Vec<DhcpOption> = parse(&formatted).map(DhcpOption::from).collect();
    assert_eq!(options, reparsed);
    assert_eq!(reparsed.len(), 3);
    assert_eq!(reparsed[2].value(), &[] as &[u8]);
}

#[test]
fn new_rejects_invalid_test() {
    assert_eq!(DhcpOption::new(0, vec![]), Err(OptionError::Sentinel(0)));
    assert_eq!(DhcpOption::new(255, vec![]), Err(OptionError::Sentinel(255)));
    assert_eq!(
        DhcpOption::new(12, vec![b'a'; 256]),
        Err(OptionError::TooLong { code: 12, len: 256 })
    );
    assert!(DhcpOption::new(12, vec![b'a'; 255]).is_ok());
}

#[test]
fn decode_known_test() {
    fn raw(code: u8, value: &[u8]) -> RawOption<'_> {
        RawOption { code, value }
    }
    assert_eq!(
        KnownOption::decode(raw(1, &[255, 255, 255, 0])),
        Some(KnownOption::SubnetMask(Ipv4Addr::new(255, 255, 255, 0)))
    );
    assert_eq!(KnownOption::decode(raw(1, &[255, 255, 255])), None);
    assert_eq!(
        KnownOption::decode(raw(3, &[10, 0, 0, 1, 10, 0, 0, 2])),
        Some(KnownOption::Router(Ipv4Addr::new(10, 0, 0, 1)))
    );
    assert_eq!(
        KnownOption::decode(raw(6, &[8, 8, 8, 8, 1, 1, 1, 1])),
        Some(KnownOption::DnsServers(vec![
            Ipv4Addr::new(8, 8, 8, 8),
            Ipv4Addr::new(1, 1, 1, 1)
        ]))
    );
    assert_eq!(KnownOption::decode(raw(6, &[8, 8])), None);
    assert_eq!(
        KnownOption::decode(raw(51, &[0, 1, 81, 128])),
        Some(KnownOption::LeaseTime(86400))
    );
    assert_eq!(KnownOption::decode(raw(51, &[0, 1, 81])), None);
    assert_eq!(
        KnownOption::decode(raw(53, &[6])),
        Some(KnownOption::MessageType(MessageType::Nak))
    );
    assert_eq!(KnownOption::decode(raw(53, &[9])), None);
    assert_eq!(KnownOption::decode(raw(53, &[2, 2])), None);
    assert_eq!(KnownOption::decode(raw(200, &[1, 2])), None);
}

#[test]
fn extract_keeps_prior_value_test() {
    let bytes = [
        53, 1, 5, // ack
        1, 4, 255, 255, 255, 0, // subnet mask
        1, 3, 255, 255, 255, // malformed subnet mask, ignored
        51, 4, 0, 0, 14, 16, // 3600 seconds
        51, 4, 0, 1, 81, 128, // later lease time wins
        54, 4, 10, 0, 0, 1, // server
        255,
    ];
    let reply = ReplyOptions::extract(&bytes);
    assert_eq!(reply.message_type, Some(MessageType::Ack));
    assert_eq!(reply.subnet_mask, Some(Ipv4Addr::new(255, 255, 255, 0)));
    assert_eq!(reply.lease_time, Some(86400));
    assert_eq!(reply.server_identifier, Some(Ipv4Addr::new(10, 0, 0, 1)));
    assert_eq!(reply.router, None);
    assert!(reply.dns_servers.is_empty());
}
