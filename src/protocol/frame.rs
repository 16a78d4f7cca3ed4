//! Ethernet + IPv4 + UDP encapsulation for link-layer transports.
//!
//! ```text
//! +----------------+----------------+-------------+------------------+
//! | Ethernet (14)  | IPv4 (20, IHL) | UDP (8)     | payload (DHCP)   |
//! +----------------+----------------+-------------+------------------+
//! ```
//!
//! The UDP checksum is always written as zero, which IPv4 permits. The IPv4
//! header checksum is computed on encode but not verified on decode; use
//! [`Ipv4Header::checksum_valid`] or [`ip_checksum_valid`] where stricter
//! checking is wanted.

use bincode::Options as _;
use mac_address::MacAddress;
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddrV4};
use thiserror::Error;

use super::{checksum::checksum, wire_format};

pub const ETHERNET_HEADER_LEN: usize = 14;
pub const IPV4_HEADER_LEN: usize = 20;
pub const UDP_HEADER_LEN: usize = 8;
pub const MIN_FRAME_LEN: usize = ETHERNET_HEADER_LEN + IPV4_HEADER_LEN + UDP_HEADER_LEN;

pub const ETHERTYPE_IPV4: u16 = 0x0800;
pub const IPPROTO_UDP: u8 = 17;
pub const DEFAULT_TTL: u8 = 64;
pub const BROADCAST_MAC: [u8; 6] = [0xff; 6];

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame is {0} bytes, too short for Ethernet/IPv4/UDP headers")]
    TooShort(usize),
    #[error("EtherType {0:#06x} is not IPv4")]
    NotIPv4(u16),
    #[error("IP protocol {0} is not UDP")]
    NotUDP(u8),
    #[error("malformed IPv4 header (version/IHL byte {0:#04x})")]
    BadIpHeader(u8),
    #[error("payload of {0} bytes does not fit in a UDP datagram")]
    PayloadTooLarge(usize),
    #[error("header serialization failed: {0}")]
    Serialize(#[from] bincode::Error),
}

#[derive(Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Debug)]
pub struct EthernetHeader {
    pub destination: [u8; 6],
    pub source: [u8; 6],
    pub ether_type: u16,
}

/// IPv4 header without options.
#[derive(Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Debug)]
pub struct Ipv4Header {
    pub version_ihl: u8,
    pub tos: u8,
    pub total_length: u16,
    pub identification: u16,
    pub flags_fragment: u16,
    pub ttl: u8,
    pub protocol: u8,
    pub checksum: u16,
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
}

impl Ipv4Header {
    pub fn version(&self) -> u8 {
        self.version_ihl >> 4
    }

    /// Header length in bytes, options included.
    pub fn header_len(&self) -> usize {
        usize::from(self.version_ihl & 0x0f) * 4
    }

    /// Verifies the checksum of an option-less header. Headers carrying IP
    /// options need [`ip_checksum_valid`] on the whole frame.
    pub fn checksum_valid(&self) -> bool {
        self.header_len() == IPV4_HEADER_LEN
            && wire_format()
                .serialize(self)
                .map(|bytes| checksum(&bytes) == 0)
                .unwrap_or(false)
    }
}

#[derive(Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Debug)]
pub struct UdpHeader {
    pub source_port: u16,
    pub destination_port: u16,
    pub length: u16,
    pub checksum: u16,
}

pub fn encapsulate(
    payload: &[u8],
    src_mac: MacAddress,
    dst_mac: MacAddress,
    src: SocketAddrV4,
    dst: SocketAddrV4,
) -> Result<Vec<u8>, FrameError> {
    let udp_length = u16::try_from(UDP_HEADER_LEN + payload.len())
        .ok()
        .filter(|&len| usize::from(len) + IPV4_HEADER_LEN <= usize::from(u16::MAX))
        .ok_or(FrameError::PayloadTooLarge(payload.len()))?;

    let ethernet = EthernetHeader {
        destination: dst_mac.bytes(),
        source: src_mac.bytes(),
        ether_type: ETHERTYPE_IPV4,
    };
    let mut ip = Ipv4Header {
        version_ihl: 0x45,
        tos: 0,
        total_length: udp_length + IPV4_HEADER_LEN as u16,
        identification: rand::random(),
        flags_fragment: 0,
        ttl: DEFAULT_TTL,
        protocol: IPPROTO_UDP,
        checksum: 0,
        source: *src.ip(),
        destination: *dst.ip(),
    };
    ip.checksum = checksum(&wire_format().serialize(&ip)?);
    let udp = UdpHeader {
        source_port: src.port(),
        destination_port: dst.port(),
        length: udp_length,
        checksum: 0,
    };

    let mut frame = Vec::with_capacity(MIN_FRAME_LEN + payload.len());
    wire_format().serialize_into(&mut frame, &ethernet)?;
    wire_format().serialize_into(&mut frame, &ip)?;
    wire_format().serialize_into(&mut frame, &udp)?;
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Splits a frame into its IPv4 and UDP headers and the UDP payload. Link
/// padding beyond the UDP length is dropped.
pub fn decapsulate(frame: &[u8]) -> Result<(Ipv4Header, UdpHeader, &[u8]), FrameError> {
    if frame.len() < MIN_FRAME_LEN {
        return Err(FrameError::TooShort(frame.len()));
    }
    let ethernet: EthernetHeader = wire_format().deserialize(&frame[..ETHERNET_HEADER_LEN])?;
    if ethernet.ether_type != ETHERTYPE_IPV4 {
        return Err(FrameError::NotIPv4(ethernet.ether_type));
    }
    let ip: Ipv4Header = wire_format()
        .deserialize(&frame[ETHERNET_HEADER_LEN..ETHERNET_HEADER_LEN + IPV4_HEADER_LEN])?;
    if ip.version() != 4 || ip.header_len() < IPV4_HEADER_LEN {
        return Err(FrameError::BadIpHeader(ip.version_ihl));
    }
    if ip.protocol != IPPROTO_UDP {
        return Err(FrameError::NotUDP(ip.protocol));
    }

    let udp_start = ETHERNET_HEADER_LEN + ip.header_len();
    let payload_start = udp_start + UDP_HEADER_LEN;
    if frame.len() < payload_start {
        return Err(FrameError::TooShort(frame.len()));
    }
    let udp: UdpHeader = wire_format().deserialize(&frame[udp_start..payload_start])?;

    let payload = &frame[payload_start..];
    let declared = usize::from(udp.length).checked_sub(UDP_HEADER_LEN);
    let payload = match declared {
        Some(len) if len <= payload.len() => &payload[..len],
        _ => payload,
    };
    Ok((ip, udp, payload))
}

/// Whether the IPv4 header checksum of `frame` verifies. Frames too short to
/// hold the header never do.
pub fn ip_checksum_valid(frame: &[u8]) -> bool {
    let Some(&version_ihl) = frame.get(ETHERNET_HEADER_LEN) else {
        return false;
    };
    let end = ETHERNET_HEADER_LEN + usize::from(version_ihl & 0x0f) * 4;
    match frame.get(ETHERNET_HEADER_LEN..end) {
        Some(header) if header.len() >= IPV4_HEADER_LEN => checksum(header) == 0,
        _ => false,
    }
}

#[cfg(test)]
fn client_frame(payload: &[u8]) -> Vec<u8> {
    encapsulate(
        payload,
        MacAddress::new([0x02, 0, 0, 0x11, 0x11, 0x11]),
        MacAddress::new(BROADCAST_MAC),
        SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 68),
        SocketAddrV4::new(Ipv4Addr::BROADCAST, 67),
    )
    .unwrap()
}

#[test]
fn encapsulate_layout_test() {
    let payload = [0xaa; 300];
    let frame = client_frame(&payload);
    assert_eq!(frame.len(), MIN_FRAME_LEN + 300);
    assert_eq!(&frame[..6], &BROADCAST_MAC);
    assert_eq!(&frame[6..12], &[0x02, 0, 0, 0x11, 0x11, 0x11]);
    assert_eq!(&frame[12..14], &[0x08, 0x00]);
    // version 4, IHL 5, total length 328, TTL 64, UDP
    assert_eq!(frame[14], 0x45);
    assert_eq!(&frame[16..18], &328u16.to_be_bytes());
    assert_eq!(frame[22], 64);
    assert_eq!(frame[23], 17);
    assert_eq!(&frame[26..30], &[0, 0, 0, 0]);
    assert_eq!(&frame[30..34], &[255, 255, 255, 255]);
    // ports 68 -> 67, UDP length 308, no UDP checksum
    assert_eq!(&frame[34..36], &68u16.to_be_bytes());
    assert_eq!(&frame[36..38], &67u16.to_be_bytes());
    assert_eq!(&frame[38..40], &308u16.to_be_bytes());
    assert_eq!(&frame[40..42], &[0, 0]);
    assert_eq!(&frame[42..], &payload[..]);

    assert!(ip_checksum_valid(&frame));
    assert_eq!(checksum(&frame[14..34]), 0);
    let (ip, _, _) = decapsulate(&frame).unwrap();
    assert!(ip.checksum_valid());
}

#[test]
fn decapsulate_test() {
    let payload = b"dhcp payload";
    let mut frame = client_frame(payload);
    // Ethernet minimum-size padding after the datagram
    frame.extend_from_slice(&[0u8; 6]);

    let (ip, udp, decoded) = decapsulate(&frame).unwrap();
    assert_eq!(ip.version(), 4);
    assert_eq!(ip.header_len(), IPV4_HEADER_LEN);
    assert_eq!(ip.ttl, DEFAULT_TTL);
    assert_eq!(ip.destination, Ipv4Addr::BROADCAST);
    assert_eq!(udp.source_port, 68);
    assert_eq!(udp.destination_port, 67);
    assert_eq!(decoded, payload);
}

#[test]
fn decapsulate_ip_options_test() {
    let payload = b"after options";
    let frame = client_frame(payload);
    // splice 4 bytes of IP options (NOP x4) and bump IHL to 6
    let mut with_options = frame[..34].to_vec();
    with_options[14] = 0x46;
    with_options.extend_from_slice(&[1, 1, 1, 1]);
    with_options.extend_from_slice(&frame[34..]);

    let (ip, udp, decoded) = decapsulate(&with_options).unwrap();
    assert_eq!(ip.header_len(), 24);
    assert_eq!(udp.destination_port, 67);
    assert_eq!(decoded, payload);
}

#[test]
fn decapsulate_errors_test() {
    assert!(matches!(decapsulate(&[0u8; 41]), Err(FrameError::TooShort(41))));

    let mut frame = client_frame(&[0u8; 8]);
    frame[12..14].copy_from_slice(&0x86ddu16.to_be_bytes());
    assert!(matches!(decapsulate(&frame), Err(FrameError::NotIPv4(0x86dd))));

    let mut frame = client_frame(&[0u8; 8]);
    frame[23] = 6;
    assert!(matches!(decapsulate(&frame), Err(FrameError::NotUDP(6))));

    let mut frame = client_frame(&[0u8; 8]);
    frame[14] = 0x44;
    assert!(matches!(decapsulate(&frame), Err(FrameError::BadIpHeader(0x44))));

    // IHL of 15 words leaves no room for the UDP header
    let mut frame = client_frame(&[0u8; 8]);
    frame[14] = 0x4f;
    assert!(matches!(decapsulate(&frame), Err(FrameError::TooShort(_))));
}

#[test]
fn checksum_not_enforced_test() {
    let mut frame = client_frame(b"quirky server");
    frame[24] ^= 0xff;
    assert!(!ip_checksum_valid(&frame));
    let (ip, _, _) = decapsulate(&frame).unwrap();
    assert!(!ip.checksum_valid());
    assert!(!ip_checksum_valid(&frame[..20]));
}
