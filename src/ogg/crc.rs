// Ogg page checksum
//
// CRC-32 with polynomial 0x04C11DB7, no bit reflection, initial value 0 and
// no final xor. The checksum field of the page is zeroed while computing it.

const CRC_POLYNOMIAL: u32 = 0x04C1_1DB7;

static CRC_TABLE: [u32; 256] = make_table();

const fn make_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut r = (i as u32) << 24;
        let mut j = 0;
        while j < 8 {
            r = if r & 0x8000_0000 != 0 {
                (r << 1) ^ CRC_POLYNOMIAL
            } else {
                r << 1
            };
            j += 1;
        }
        table[i] = r;
        i += 1;
    }
    table
}

/// Continue a running checksum over more bytes
pub fn crc32_update(mut crc: u32, data: &[u8]) -> u32 {
    for &byte in data {
        crc = (crc << 8) ^ CRC_TABLE[((crc >> 24) as u8 ^ byte) as usize];
    }
    crc
}

/// Checksum of a complete buffer
pub fn crc32(data: &[u8]) -> u32 {
    crc32_update(0, data)
}
