//! CRC32 as required by NTAG 424 DNA's `ChangeKey` command.
//!
//! This is the reflected CRC32 (the one everyone calls "CRC32" informally)
//! with init=0xFFFFFFFF, but WITHOUT the final one's-complement that
//! Ethernet/zlib CRC32 applies. Do not reach for a library's default CRC32
//! implementation here without checking its `xorout` — that is the
//! interoperability-critical detail this module exists to get right.

use crc::{Algorithm, Crc};

const NTAG_CRC32: Algorithm<u32> = Algorithm {
    width: 32,
    poly: 0x04c1_1db7,
    init: 0xffff_ffff,
    refin: true,
    refout: true,
    xorout: 0x0000_0000,
    check: 0x0000_0000, // unused: no standard CHECK string for this variant
    residue: 0x0000_0000,
};

/// `CRC32_IEEE` per the NTAG 424 DNA convention: reflected, init=0xFFFFFFFF,
/// no final XOR.
pub fn crc32_ieee(data: &[u8]) -> u32 {
    let crc = Crc::<u32>::new(&NTAG_CRC32);
    crc.checksum(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_zero_16_bytes() {
        assert_eq!(crc32_ieee(&[0u8; 16]), 0x1344_B4AA);
    }

    #[test]
    fn sequential_key() {
        let key: [u8; 16] = [
            0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xAA, 0xBB, 0xCC, 0xDD,
            0xEE, 0xFF,
        ];
        assert_eq!(crc32_ieee(&key), 0x7BF8_8A64);
    }
}
