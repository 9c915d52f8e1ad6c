/// Software CRC_A (ISO/IEC 14443-3, preset 0x6363).  Returns `[low, high]`,
/// the order the tag expects on the wire.
///
/// The driver itself uses the chip's coprocessor; this is what the
/// coprocessor computes.
pub fn crc_a(data: &[u8]) -> [u8; 2] {
    let mut crc: u16 = 0x6363;
    for &byte in data {
        let mut b = byte ^ (crc & 0xFF) as u8;
        b ^= b << 4;
        let b = b as u16;
        crc = (crc >> 8) ^ (b << 8) ^ (b << 3) ^ (b >> 4);
    }
    crc.to_le_bytes()
}
