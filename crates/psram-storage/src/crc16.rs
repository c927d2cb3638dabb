use serde::{Deserialize, Serialize};

/// Feedback mask applied when bit 15 shifts out.
///
/// This is neither CCITT (`0x1021`) nor IBM (`0x8005`). Headers already stored in PSRAM were
/// written with this exact mask, so it must not be swapped for a standard CRC.
pub const CRC16_POLY_MASK: u16 = 0x8001;

/// CRC16 over `data`: init 0, MSB-first, no reflection, no final XOR.
pub fn crc16(data: &[u8]) -> u16 {
    crc16_update(0, data)
}

/// Continues a [`crc16`] computation with more bytes.
///
/// `crc16_update(crc16(a), b) == crc16(a ++ b)`.
pub fn crc16_update(mut crc: u16, data: &[u8]) -> u16 {
    for &b in data {
        crc ^= (b as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ CRC16_POLY_MASK
            } else {
                crc << 1
            };
        }
    }
    crc
}

/// Whether region validation compares body checksums.
///
/// `Skip` trades corruption detection for open/write speed on large regions: the checksum of
/// every body is reported as `0` and header validation only compares magic and length.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChecksumMode {
    #[default]
    Verify,
    Skip,
}

impl ChecksumMode {
    pub fn checksum(self, data: &[u8]) -> u16 {
        match self {
            ChecksumMode::Verify => crc16(data),
            ChecksumMode::Skip => 0,
        }
    }

    pub fn is_skip(self) -> bool {
        self == ChecksumMode::Skip
    }
}
