use crate::{ChecksumMode, HeaderFault};

/// Stamp identifying an initialised region.
pub const HEADER_MAGIC: [u8; 10] = *b"PSRAM_____";

/// On-aperture size of [`RegionHeader`]; the header sits immediately before the region body.
pub const HEADER_SIZE: usize = 16;

/// Length + checksum record gating whether existing region bytes are trusted.
///
/// Wire layout (little-endian): `magic[10] | length: u32 | checksum: u16`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionHeader {
    pub magic: [u8; 10],
    pub length: u32,
    pub checksum: u16,
}

impl RegionHeader {
    pub fn new(length: u32, checksum: u16) -> Self {
        Self {
            magic: HEADER_MAGIC,
            length,
            checksum,
        }
    }

    pub fn decode(raw: &[u8; HEADER_SIZE]) -> Self {
        let mut magic = [0u8; 10];
        magic.copy_from_slice(&raw[..10]);
        Self {
            magic,
            length: u32::from_le_bytes([raw[10], raw[11], raw[12], raw[13]]),
            checksum: u16::from_le_bytes([raw[14], raw[15]]),
        }
    }

    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut raw = [0u8; HEADER_SIZE];
        raw[..10].copy_from_slice(&self.magic);
        raw[10..14].copy_from_slice(&self.length.to_le_bytes());
        raw[14..16].copy_from_slice(&self.checksum.to_le_bytes());
        raw
    }

    /// Checks this header against a region body of `expected_length` bytes.
    ///
    /// The body is only checksummed once magic and length have matched, and never in
    /// [`ChecksumMode::Skip`].
    pub fn validate(
        &self,
        expected_length: u32,
        mode: ChecksumMode,
        body: &[u8],
    ) -> Result<(), HeaderFault> {
        if self.magic != HEADER_MAGIC {
            return Err(HeaderFault::BadMagic);
        }
        if self.length != expected_length {
            return Err(HeaderFault::LengthMismatch {
                stored: self.length,
                expected: expected_length,
            });
        }
        if mode.is_skip() {
            return Ok(());
        }
        let computed = mode.checksum(body);
        if self.checksum != computed {
            return Err(HeaderFault::ChecksumMismatch {
                stored: self.checksum,
                computed,
            });
        }
        Ok(())
    }
}

/// Snapshot of a region's stored header and whether it currently validates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderStatus {
    pub header: RegionHeader,
    pub fault: Option<HeaderFault>,
}

impl HeaderStatus {
    pub fn is_valid(&self) -> bool {
        self.fault.is_none()
    }
}
