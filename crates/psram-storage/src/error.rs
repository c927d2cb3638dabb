use thiserror::Error;

pub type Result<T> = std::result::Result<T, PsramError>;

/// Unified error type for PSRAM region operations.
///
/// Only [`PsramError::Config`] and [`PsramError::UntrustedRegion`] are raised while opening a
/// region; both are fatal and leave the aperture untouched. The remaining variants come from
/// bounds checks at the region boundary and from the aperture's sync hook.
#[derive(Debug, Error)]
pub enum PsramError {
    #[error("invalid region configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("untrusted region contents ({fault}); refusing to overwrite")]
    UntrustedRegion { fault: HeaderFault },

    #[error("out of bounds: offset={offset} len={len} capacity={capacity}")]
    OutOfBounds {
        offset: u64,
        len: usize,
        capacity: u64,
    },

    #[error("integer overflow while computing byte offsets")]
    OffsetOverflow,

    #[error("unsupported ioctl op {0}")]
    UnsupportedIoctl(u32),

    /// Failure reported by an [`crate::Aperture`] implementation (e.g. a file-backed image that
    /// could not be written back).
    #[error("io error: {0}")]
    Io(String),
}

impl PsramError {
    /// Returns `true` for the errors that can only occur while opening a region.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::UntrustedRegion { .. })
    }
}

/// Region placement/geometry problems, detected before any memory is touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("block size must be > 0")]
    ZeroBlockSize,

    #[error("length {length} is not a multiple of block size {block_size}")]
    UnalignedLength { length: u64, block_size: u32 },

    #[error("length {length} exceeds the maximum of {max} bytes")]
    TooLarge { length: u64, max: u64 },

    #[error("region [{offset:#x}, +{length:#x}) does not fit in aperture of {aperture_size:#x} bytes")]
    OutsideAperture {
        offset: u64,
        length: u64,
        aperture_size: u64,
    },

    #[error("region offset {offset:#x} leaves no room for the {header_size}-byte header")]
    NoRoomForHeader { offset: u64, header_size: usize },
}

/// Why a region header was judged invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HeaderFault {
    #[error("header magic mismatch")]
    BadMagic,

    #[error("stored length {stored} does not match region length {expected}")]
    LengthMismatch { stored: u32, expected: u32 },

    #[error("stored checksum {stored:#06x} does not match computed {computed:#06x}")]
    ChecksumMismatch { stored: u16, computed: u16 },
}

impl From<PsramError> for std::io::Error {
    fn from(err: PsramError) -> Self {
        use std::io::{Error, ErrorKind};

        match err {
            err @ (PsramError::Config(_)
            | PsramError::OffsetOverflow
            | PsramError::UnsupportedIoctl(_)) => Error::new(ErrorKind::InvalidInput, err),
            err @ PsramError::UntrustedRegion { .. } => Error::new(ErrorKind::InvalidData, err),
            err @ PsramError::OutOfBounds { .. } => Error::new(ErrorKind::UnexpectedEof, err),
            err @ PsramError::Io(_) => Error::other(err),
        }
    }
}
