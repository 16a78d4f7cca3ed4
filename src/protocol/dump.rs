use std::fmt;

use super::{option::KnownOption, DhcpPacket, BOOTREPLY, BOOTREQUEST};

/// Multi-line field-by-field view of a packet, for verbose logging.
impl fmt::Display for DhcpPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self.op {
            BOOTREQUEST => "BOOTREQUEST",
            BOOTREPLY => "BOOTREPLY",
            _ => "UNKNOWN",
        };
        writeln!(f, "op: {} ({op})", self.op)?;
        writeln!(f, "htype: {}, hlen: {}, hops: {}", self.htype, self.hlen, self.hops)?;
        writeln!(f, "xid: {:#010x}", self.xid)?;
        writeln!(f, "secs: {}, flags: {:#06x}", self.secs, self.flags)?;
        writeln!(f, "ciaddr: {}", self.ciaddr)?;
        writeln!(f, "yiaddr: {}", self.yiaddr)?;
        writeln!(f, "siaddr: {}", self.siaddr)?;
        writeln!(f, "giaddr: {}", self.giaddr)?;

        f.write_str("chaddr:")?;
        for (i, b) in self.hardware_address().iter().enumerate() {
            let sep = if i == 0 { ' ' } else { ':' };
            write!(f, "{sep}{b:02x}")?;
        }
        writeln!(f)?;
        if !self.sname.is_empty() {
            writeln!(f, "sname: {}", self.sname)?;
        }
        if !self.file.is_empty() {
            writeln!(f, "file: {}", self.file)?;
        }
        writeln!(f, "magic cookie: {:#010x}", self.magic_cookie)?;

        for raw in self.options() {
            match KnownOption::decode(raw) {
                Some(known) => writeln!(f, "  {known}")?,
                None => {
                    write!(f, "  Option {:3} (len {:3}):", raw.code, raw.value.len())?;
                    for b in raw.value {
                        write!(f, " {b:02x}")?;
                    }
                    writeln!(f)?;
                }
            }
        }
        Ok(())
    }
}

#[test]
fn dump_test() {
    use super::{DhcpOption, MessageType, SnameField};
    use mac_address::MacAddress;
    use std::net::Ipv4Addr;

    let mut packet = DhcpPacket::request(0x0102_0304, MacAddress::new([0, 0x1b, 0, 0, 0, 0xaa]));
    packet.op = BOOTREPLY;
    packet.yiaddr = Ipv4Addr::new(192, 168, 1, 50);
    packet.sname = SnameField::new("gateway");
    packet.options = super::option::format(&[
        DhcpOption::message_type(MessageType::Offer),
        DhcpOption::server_identifier(Ipv4Addr::new(192, 168, 1, 1)),
        DhcpOption::new(15, b"lan".to_vec()).unwrap(),
    ]);

    let dump = packet.to_string();
    assert!(dump.contains("op: 2 (BOOTREPLY)"));
    assert!(dump.contains("xid: 0x01020304"));
    assert!(dump.contains("yiaddr: 192.168.1.50"));
    assert!(dump.contains("chaddr: 00:1b:00:00:00:aa"));
    assert!(dump.contains("sname: gateway"));
    assert!(!dump.contains("file:"));
    assert!(dump.contains("Message type: DHCPOFFER"));
    assert!(dump.contains("DHCP Server: 192.168.1.1"));
    assert!(dump.contains("Option  15 (len   3): 6c 61 6e"));
}
