//! CRC-16/CCITT-FALSE, the frame checksum.
//!
//! Polynomial `0x1021`, initial value `0xFFFF`, no reflection, no final XOR
//! (catalogued as CRC-16/IBM-3740). It detects every error burst of up to
//! 16 bits, which covers any single corrupted 4-bit symbol.

use crc::{CRC_16_IBM_3740, Crc};

const CCITT_FALSE: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

/// Computes the CRC-16/CCITT-FALSE checksum of `data`.
pub fn crc16(data: &[u8]) -> u16 {
    CCITT_FALSE.checksum(data)
}
