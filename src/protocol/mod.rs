pub mod checksum;
mod dump;
mod field;
pub mod frame;
pub mod option;

pub use self::field::{FileField, PaddedField, SnameField};
pub use self::option::{DhcpOption, KnownOption, MessageType, RawOption, ReplyOptions};

use bincode::Options as _;
use mac_address::MacAddress;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use thiserror::Error;

pub const SERVER_PORT: u16 = 67;
pub const CLIENT_PORT: u16 = 68;

pub const MAGIC_COOKIE: u32 = 0x6382_5363;
pub const BOOTREQUEST: u8 = 1;
pub const BOOTREPLY: u8 = 2;
pub const HTYPE_ETHERNET: u8 = 1;
pub const HLEN_ETHERNET: u8 = 6;
pub const BROADCAST_FLAG: u16 = 0x8000;

/// op through file.
pub const HEADER_LEN: usize = 236;
/// Fixed header plus the magic cookie; the smallest packet `decode` accepts.
pub const MIN_PACKET_LEN: usize = HEADER_LEN + 4;
/// Option bytes following the cookie in every encoded packet. With the cookie
/// this is the 312-byte `options` field of RFC 2131.
pub const OPTIONS_LEN: usize = 308;
pub const PACKET_LEN: usize = MIN_PACKET_LEN + OPTIONS_LEN;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("packet is {0} bytes, shorter than the 240-byte DHCP header")]
    TooShort(usize),
    #[error("bad magic cookie {0:#010x}")]
    BadMagicCookie(u32),
    #[error("malformed header: {0}")]
    Malformed(#[from] bincode::Error),
}

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("options need {needed} bytes but only 308 fit in the packet")]
    OptionsTooLarge { needed: usize },
    #[error("failed to serialize header: {0}")]
    Header(#[from] bincode::Error),
}

/// A BOOTP/DHCP message. Header fields are declared in wire order and
/// (de)serialized field by field, big-endian, with fixed widths.
#[derive(Deserialize, Serialize, Clone, PartialEq, Eq, Debug)]
pub struct DhcpPacket {
    pub op: u8,
    pub htype: u8,
    pub hlen: u8,
    pub hops: u8,
    pub xid: u32,
    pub secs: u16,
    pub flags: u16,
    pub ciaddr: Ipv4Addr,
    pub yiaddr: Ipv4Addr,
    pub siaddr: Ipv4Addr,
    pub giaddr: Ipv4Addr,
    pub chaddr: [u8; 16],
    pub sname: SnameField,
    pub file: FileField,
    pub magic_cookie: u32,
    /// Raw option region after the cookie; see [`option::parse`].
    #[serde(skip)]
    pub options: Vec<u8>,
}

pub(crate) fn wire_format() -> impl bincode::Options {
    bincode::options()
        .with_big_endian()
        .with_fixint_encoding()
        .allow_trailing_bytes()
}

impl DhcpPacket {
    /// A client BOOTREQUEST with the broadcast flag set and no options.
    pub fn request(xid: u32, hardware_address: MacAddress) -> DhcpPacket {
        let mut chaddr = [0u8; 16];
        chaddr[..6].copy_from_slice(&hardware_address.bytes());
        DhcpPacket {
            op: BOOTREQUEST,
            htype: HTYPE_ETHERNET,
            hlen: HLEN_ETHERNET,
            hops: 0,
            xid,
            secs: 0,
            flags: BROADCAST_FLAG,
            ciaddr: Ipv4Addr::UNSPECIFIED,
            yiaddr: Ipv4Addr::UNSPECIFIED,
            siaddr: Ipv4Addr::UNSPECIFIED,
            giaddr: Ipv4Addr::UNSPECIFIED,
            chaddr,
            sname: SnameField::default(),
            file: FileField::default(),
            magic_cookie: MAGIC_COOKIE,
            options: Vec::new(),
        }
    }

    pub fn hardware_address(&self) -> &[u8] {
        let len = usize::from(self.hlen).min(self.chaddr.len());
        &self.chaddr[..len]
    }

    pub fn is_broadcast(&self) -> bool {
        self.flags & BROADCAST_FLAG != 0
    }

    pub fn options(&self) -> option::Options<'_> {
        option::parse(&self.options)
    }

    pub fn reply_options(&self) -> ReplyOptions {
        ReplyOptions::extract(&self.options)
    }

    pub fn message_type(&self) -> Option<MessageType> {
        self.reply_options().message_type
    }
}

/// Serializes the header and `options` into a [`PACKET_LEN`]-byte buffer,
/// zero padded after the End marker. `packet.options` is not consulted.
pub fn encode(packet: &DhcpPacket, options: &[DhcpOption]) -> Result<Vec<u8>, EncodeError> {
    let formatted = option::format(options);
    if formatted.len() > OPTIONS_LEN {
        return Err(EncodeError::OptionsTooLarge {
            needed: formatted.len(),
        });
    }
    let mut buffer = Vec::with_capacity(PACKET_LEN);
    wire_format().serialize_into(&mut buffer, packet)?;
    buffer.extend_from_slice(&formatted);
    buffer.resize(PACKET_LEN, 0);
    Ok(buffer)
}

pub fn decode(buffer: &[u8]) -> Result<DhcpPacket, DecodeError> {
    if buffer.len() < MIN_PACKET_LEN {
        return Err(DecodeError::TooShort(buffer.len()));
    }
    let mut packet: DhcpPacket = wire_format().deserialize(&buffer[..MIN_PACKET_LEN])?;
    if packet.magic_cookie != MAGIC_COOKIE {
        return Err(DecodeError::BadMagicCookie(packet.magic_cookie));
    }
    packet.options = buffer[MIN_PACKET_LEN..].to_vec();
    Ok(packet)
}

#[cfg(test)]
const CLIENT_MAC: [u8; 6] = [0x00, 0x00, 0x00, 0x11, 0x11, 0x11];

#[test]
fn test_message() {
    const BUFFER: [u8; 251] = [
        1, // op
        1, // htype
        6, // hlen
        0, // hops
        2, 44, 180, 37, // xid
        0, 0, // secs
        0, 0, // flags
        0, 0, 0, 0, // ciaddr
        0, 0, 0, 0, // yiaddr
        0, 0, 0, 0, // siaddr
        0, 0, 0, 0, // giaddr
        0, 0, 0, 17, 17, 17, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, // chaddr
        0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
        0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
        0, 0, 0, 0, // sname
        0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
        0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
        0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
        0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
        0, 0, 0, 0, 0, 0, 0, 0, // file
        99, 130, 83, 99, // magic cookie
        53, 1, 1, // option dhcp message type
        55, 5, 1, 28, 3, 15, 6, // parameter list
        255, // options
    ];
    let packet = decode(&BUFFER).unwrap();
    assert_eq!(packet.op, BOOTREQUEST);
    assert_eq!(packet.xid, 0x022c_b425);
    assert_eq!(packet.hardware_address(), &CLIENT_MAC);
    assert!(!packet.is_broadcast());
    assert!(packet.sname.is_empty());
    assert_eq!(packet.message_type(), Some(MessageType::Discover));
    assert_eq!(packet.options().count(), 2);
}

#[test]
fn round_trip_test() {
    let mut packet = DhcpPacket::request(0xdead_beef, MacAddress::new(CLIENT_MAC));
    packet.op = BOOTREPLY;
    packet.secs = 3;
    packet.yiaddr = Ipv4Addr::new(10, 0, 0, 5);
    packet.siaddr = Ipv4Addr::new(10, 0, 0, 1);
    packet.giaddr = Ipv4Addr::new(10, 0, 1, 1);
    packet.sname = SnameField::new("dhcp.example.local");
    packet.file = FileField::new("pxelinux.0");
    let options = vec![
        DhcpOption::message_type(MessageType::Ack),
        DhcpOption::subnet_mask(Ipv4Addr::new(255, 255, 255, 0)),
        DhcpOption::router(Ipv4Addr::new(10, 0, 0, 1)),
        DhcpOption::lease_time(86400),
        DhcpOption::new(15, b"example.local".to_vec()).unwrap(),
    ];

    let buffer = encode(&packet, &options).unwrap();
    assert_eq!(buffer.len(), PACKET_LEN);
    assert_eq!(&buffer[236..240], &[99, 130, 83, 99]);
    assert_eq!(&buffer[4..8], &[0xde, 0xad, 0xbe, 0xef]);
    assert_eq!(&buffer[10..12], &[0x80, 0x00]);

    let decoded = decode(&buffer).unwrap();
    let decoded_options: Vec<DhcpOption> = decoded.options().map(DhcpOption::from).collect();
    assert_eq!(decoded_options, options);
    assert_eq!(decoded.sname.to_string(), "dhcp.example.local");
    assert_eq!(decoded.file.to_string(), "pxelinux.0");
    packet.options = decoded.options.clone();
    assert_eq!(decoded, packet);
}

#[test]
fn options_too_large_test() {
    let packet = DhcpPacket::request(1, MacAddress::new(CLIENT_MAC));
    // two 154-byte options plus End need 309 bytes
    let options = vec![
        DhcpOption::new(43, vec![0u8; 152]).unwrap(),
        DhcpOption::new(43, vec![0u8; 152]).unwrap(),
    ];
    assert!(matches!(
        encode(&packet, &options),
        Err(EncodeError::OptionsTooLarge { needed: 309 })
    ));
    // one byte less fits exactly
    let options = vec![
        DhcpOption::new(43, vec![0u8; 152]).unwrap(),
        DhcpOption::new(43, vec![0u8; 151]).unwrap(),
    ];
    let buffer = encode(&packet, &options).unwrap();
    assert_eq!(buffer.last(), Some(&option::tag::END));
}

#[test]
fn decode_errors_test() {
    assert!(matches!(decode(&[0u8; 239]), Err(DecodeError::TooShort(239))));
    assert!(matches!(decode(&[]), Err(DecodeError::TooShort(0))));

    let packet = DhcpPacket::request(7, MacAddress::new(CLIENT_MAC));
    let mut buffer = encode(&packet, &[]).unwrap();
    buffer[239] = 0x64;
    assert!(matches!(
        decode(&buffer),
        Err(DecodeError::BadMagicCookie(0x6382_5364))
    ));

    assert!(decode(&buffer[..MIN_PACKET_LEN - 1]).is_err());

    // a bare header with cookie and no option bytes is still a packet
    buffer[239] = 0x63;
    let decoded = decode(&buffer[..MIN_PACKET_LEN]).unwrap();
    assert_eq!(decoded.options().count(), 0);
}

#[test]
fn reference_encoder_agrees_test() {
    use dhcproto::{v4, Decodable, Decoder};

    let packet = DhcpPacket::request(0x1234_5678, MacAddress::new(CLIENT_MAC));
    let options = vec![
        DhcpOption::message_type(MessageType::Request),
        DhcpOption::requested_ip(Ipv4Addr::new(10, 0, 0, 5)),
        DhcpOption::server_identifier(Ipv4Addr::new(10, 0, 0, 1)),
    ];
    let buffer = encode(&packet, &options).unwrap();

    let message = v4::Message::decode(&mut Decoder::new(&buffer)).unwrap();
    assert_eq!(message.xid(), 0x1234_5678);
    assert_eq!(message.chaddr(), &CLIENT_MAC);
    assert_eq!(message.opts().msg_type(), Some(v4::MessageType::Request));
    assert_eq!(
        message.opts().get(v4::OptionCode::RequestedIpAddress),
        Some(&v4::DhcpOption::RequestedIpAddress(Ipv4Addr::new(10, 0, 0, 5)))
    );
    assert_eq!(
        message.opts().get(v4::OptionCode::ServerIdentifier),
        Some(&v4::DhcpOption::ServerIdentifier(Ipv4Addr::new(10, 0, 0, 1)))
    );
}
