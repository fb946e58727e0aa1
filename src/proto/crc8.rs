/// Default polynomial for binary frames.
pub const DEFAULT_POLY: u8 = 0xA6;

/// CRC-8, MSB first, init 0, no reflection, no final xor.
pub fn crc8(poly: u8, data: &[u8]) -> u8 {
    let mut crc = 0u8;
    for &b in data {
        crc ^= b;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ poly
            } else {
                crc << 1
            };
        }
    }
    crc
}
