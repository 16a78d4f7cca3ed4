/// One's-complement Internet checksum (RFC 1071) over `bytes`.
///
/// Words are read big-endian; an odd trailing byte is the high byte of a
/// zero-padded word.
pub fn checksum(bytes: &[u8]) -> u16 {
    let mut words = bytes.chunks_exact(2);
    let mut sum: u32 = words
        .by_ref()
        .map(|word| u32::from(u16::from_be_bytes([word[0], word[1]])))
        .sum();
    if let [last] = words.remainder() {
        sum += u32::from(*last) << 8;
    }
    sum = (sum & 0xffff) + (sum >> 16);
    sum = (sum & 0xffff) + (sum >> 16);
    !(sum as u16)
}

#[test]
fn zero_buffer_test() {
    assert_eq!(checksum(&[]), 0xffff);
    for len in [2, 20, 64, 1500] {
        assert_eq!(checksum(&vec![0u8; len]), 0xffff);
    }
}

#[test]
fn odd_length_test() {
    // trailing byte counts as 0xab00
    assert_eq!(checksum(&[0xab]), !0xab00);
    assert_eq!(checksum(&[0x00, 0x01, 0xf2]), !(0x0001 + 0xf200));
}

#[test]
fn carry_fold_test() {
    let bytes = [0xff; 8];
    assert_eq!(checksum(&bytes), 0x0000);
    assert_eq!(checksum(&[0xff, 0xff, 0x00, 0x01]), !0x0001);
}

#[test]
fn self_verifying_test() {
    // IPv4 header from RFC 1071 style examples, checksum field zeroed
    let mut header = [
        0x45, 0x00, 0x00, 0x73, 0x00, 0x00, 0x40, 0x00, 0x40, 0x11, 0x00, 0x00, 0xc0, 0xa8, 0x00,
        0x01, 0xc0, 0xa8, 0x00, 0xc7,
    ];
    let sum = checksum(&header);
    assert_eq!(sum, 0xb861);
    header[10..12].copy_from_slice(&sum.to_be_bytes());
    assert_eq!(checksum(&header), 0);
}
