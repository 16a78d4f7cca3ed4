use std::net::Ipv4Addr;

use super::{
    discover::{identity_options, Offer},
    ClientSession,
};
use crate::{
    conf::ClientConfig,
    protocol::{option::OptionError, DhcpOption, DhcpPacket, MessageType, ReplyOptions},
};

/// REQUEST for `offer`, reusing the DISCOVER's xid.
pub(super) fn build(
    session: &ClientSession,
    config: &ClientConfig,
    offer: &Offer,
) -> Result<(DhcpPacket, Vec<DhcpOption>), OptionError> {
    let packet = DhcpPacket::request(session.xid, session.hardware_address);
    let mut options = vec![
        DhcpOption::message_type(MessageType::Request),
        DhcpOption::requested_ip(offer.address),
        DhcpOption::server_identifier(offer.server),
    ];
    options.extend(identity_options(session, config)?);
    Ok((packet, options))
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub(super) enum Verdict {
    Ack {
        address: Ipv4Addr,
        options: ReplyOptions,
    },
    Nak {
        server: Option<Ipv4Addr>,
    },
}

/// The server's answer to a REQUEST. Anything but ACK or NAK, including
/// late duplicate OFFERs, is `None`.
pub(super) fn verdict(packet: &DhcpPacket) -> Option<Verdict> {
    let options = packet.reply_options();
    match options.message_type? {
        MessageType::Ack => Some(Verdict::Ack {
            address: packet.yiaddr,
            options,
        }),
        MessageType::Nak => Some(Verdict::Nak {
            server: options.server_identifier,
        }),
        _ => None,
    }
}

#[test]
fn build_test() {
    use crate::protocol::KnownOption;
    use mac_address::MacAddress;

    let mut session = ClientSession::new("eth0", MacAddress::new([0x02, 0, 0, 0, 0, 0x07]));
    session.xid = 42;
    let offer = Offer {
        address: Ipv4Addr::new(10, 0, 0, 5),
        server: Ipv4Addr::new(10, 0, 0, 1),
    };
    let (packet, options) = build(&session, &ClientConfig::default(), &offer).unwrap();
    assert_eq!(packet.xid, 42);
    assert!(packet.ciaddr.is_unspecified());

    let codes: Vec<u8> = options.iter().map(DhcpOption::code).collect();
    assert_eq!(codes, vec![53, 50, 54, 61, 55]);
    assert_eq!(
        KnownOption::decode(options[1].as_raw()),
        Some(KnownOption::RequestedIp(Ipv4Addr::new(10, 0, 0, 5)))
    );
    assert_eq!(
        KnownOption::decode(options[2].as_raw()),
        Some(KnownOption::ServerIdentifier(Ipv4Addr::new(10, 0, 0, 1)))
    );
}

#[test]
fn verdict_test() {
    use crate::protocol::option;
    use mac_address::MacAddress;

    let mut packet = DhcpPacket::request(42, MacAddress::new([0x02, 0, 0, 0, 0, 0x07]));
    packet.yiaddr = Ipv4Addr::new(10, 0, 0, 5);
    packet.options = option::format(&[
        DhcpOption::message_type(MessageType::Ack),
        DhcpOption::lease_time(600),
    ]);
    match verdict(&packet) {
        Some(Verdict::Ack { address, options }) => {
            assert_eq!(address, Ipv4Addr::new(10, 0, 0, 5));
            assert_eq!(options.lease_time, Some(600));
        }
        other => panic!("unexpected verdict {other:?}"),
    }

    packet.options = option::format(&[
        DhcpOption::message_type(MessageType::Nak),
        DhcpOption::server_identifier(Ipv4Addr::new(10, 0, 0, 1)),
    ]);
    assert_eq!(
        verdict(&packet),
        Some(Verdict::Nak {
            server: Some(Ipv4Addr::new(10, 0, 0, 1))
        })
    );

    packet.options = option::format(&[DhcpOption::message_type(MessageType::Offer)]);
    assert_eq!(verdict(&packet), None);
    packet.options = option::format(&[]);
    assert_eq!(verdict(&packet), None);
}
