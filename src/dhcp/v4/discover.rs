use std::net::Ipv4Addr;

use super::ClientSession;
use crate::{
    conf::ClientConfig,
    protocol::{option::OptionError, DhcpOption, DhcpPacket, MessageType, HTYPE_ETHERNET},
};

/// Client identifier type for opaque, non-hardware identifiers.
const OPAQUE_IDENTIFIER: u8 = 0;

/// Client identifier and parameter request list, carried by both DISCOVER
/// and REQUEST.
pub(super) fn identity_options(
    session: &ClientSession,
    config: &ClientConfig,
) -> Result<Vec<DhcpOption>, OptionError> {
    let client_identifier = match &config.client_identifier {
        Some(id) => DhcpOption::client_identifier(OPAQUE_IDENTIFIER, id.as_bytes())?,
        None => DhcpOption::client_identifier(HTYPE_ETHERNET, &session.hardware_address.bytes())?,
    };
    Ok(vec![
        client_identifier,
        DhcpOption::parameter_request_list(&config.parameter_request_list)?,
    ])
}

pub(super) fn build(
    session: &ClientSession,
    config: &ClientConfig,
) -> Result<(DhcpPacket, Vec<DhcpOption>), OptionError> {
    let packet = DhcpPacket::request(session.xid, session.hardware_address);
    let mut options = vec![DhcpOption::message_type(MessageType::Discover)];
    options.extend(identity_options(session, config)?);
    Ok((packet, options))
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(super) struct Offer {
    pub address: Ipv4Addr,
    pub server: Ipv4Addr,
}

/// An OFFER naming a usable address. The server is taken from option 54,
/// falling back to `siaddr`.
pub(super) fn accept(packet: &DhcpPacket) -> Option<Offer> {
    let options = packet.reply_options();
    if options.message_type != Some(MessageType::Offer) || packet.yiaddr.is_unspecified() {
        return None;
    }
    Some(Offer {
        address: packet.yiaddr,
        server: options.server_identifier.unwrap_or(packet.siaddr),
    })
}

#[cfg(test)]
fn session() -> ClientSession {
    let mut session = ClientSession::new(
        "eth0",
        mac_address::MacAddress::new([0x00, 0x00, 0x00, 0x11, 0x11, 0x11]),
    );
    session.xid = 0x3903_f326;
    session
}

#[test]
fn build_test() {
    use crate::protocol::{KnownOption, BOOTREQUEST};

    let (packet, options) = build(&session(), &ClientConfig::default()).unwrap();
    assert_eq!(packet.op, BOOTREQUEST);
    assert_eq!(packet.xid, 0x3903_f326);
    assert!(packet.is_broadcast());
    assert_eq!(packet.hardware_address(), &[0x00, 0x00, 0x00, 0x11, 0x11, 0x11]);

    let known: Vec<KnownOption> = options
        .iter()
        .map(DhcpOption::as_raw)
        .filter_map(KnownOption::decode)
        .collect();
    assert_eq!(
        known,
        vec![
            KnownOption::MessageType(MessageType::Discover),
            KnownOption::ClientIdentifier(vec![1, 0x00, 0x00, 0x00, 0x11, 0x11, 0x11]),
            KnownOption::ParameterRequestList(vec![1, 3, 6]),
        ]
    );
}

#[test]
fn configured_identifier_test() {
    let config = ClientConfig {
        client_identifier: Some("kiosk".to_string()),
        ..ClientConfig::default()
    };
    let options = identity_options(&session(), &config).unwrap();
    assert_eq!(options[0].value(), b"\0kiosk");
}

#[test]
fn accept_test() {
    use crate::protocol::{option, BOOTREPLY};

    let mut packet = DhcpPacket::request(0x3903_f326, session().hardware_address);
    packet.op = BOOTREPLY;
    packet.yiaddr = Ipv4Addr::new(10, 0, 0, 5);
    packet.siaddr = Ipv4Addr::new(10, 0, 0, 2);
    packet.options = option::format(&[DhcpOption::message_type(MessageType::Offer)]);
    assert_eq!(
        accept(&packet),
        Some(Offer {
            address: Ipv4Addr::new(10, 0, 0, 5),
            server: Ipv4Addr::new(10, 0, 0, 2),
        })
    );

    packet.options = option::format(&[
        DhcpOption::message_type(MessageType::Offer),
        DhcpOption::server_identifier(Ipv4Addr::new(10, 0, 0, 1)),
    ]);
    assert_eq!(accept(&packet).unwrap().server, Ipv4Addr::new(10, 0, 0, 1));

    packet.options = option::format(&[DhcpOption::message_type(MessageType::Ack)]);
    assert_eq!(accept(&packet), None);

    packet.options = option::format(&[DhcpOption::message_type(MessageType::Offer)]);
    packet.yiaddr = Ipv4Addr::UNSPECIFIED;
    assert_eq!(accept(&packet), None);
}
