//! Memory-mapped block storage on top of an external PSRAM aperture.
//!
//! Capacity-constrained boards expose their PSRAM through a fixed physical address window. This
//! crate carves a [`Region`] out of that window and lets a filesystem driver mount it as a block
//! device, while a small length + CRC16 header decides whether the bytes found there at boot are
//! trustworthy or must be wiped.
//!
//! - [`Aperture`]: the physical window ([`MemAperture`] for simulation, [`MappedAperture`] on
//!   hardware)
//! - [`Region`]: a validated, bounds-checked slice of the aperture
//! - [`RegionBlockDevice`]: block view implementing the [`BlockDevice`] mount contract
//! - [`RegionStream`]: byte-stream view with seek/read/readline/write
//!
//! Each region is owned by exactly one view at a time. Concurrent callers should go through
//! [`SharedBlockDevice`], which serializes every operation on the region.

mod aperture;
mod block;
pub mod bulk;
mod crc16;
mod error;
mod header;
mod region;
mod stream;
mod util;

pub use aperture::{Aperture, ApertureLayout, MappedAperture, MemAperture, PRESTO_PSRAM};
pub use block::{BlockDevice, IoctlOp, RegionBlockDevice, SharedBlockDevice};
pub use crc16::{crc16, crc16_update, ChecksumMode, CRC16_POLY_MASK};
pub use error::{ConfigError, HeaderFault, PsramError, Result};
pub use header::{HeaderStatus, RegionHeader, HEADER_MAGIC, HEADER_SIZE};
pub use region::{
    HeaderTracking, Region, RegionConfig, RegionInspection, DEFAULT_BLOCK_SIZE, DEFAULT_TMPFS_SIZE,
    TMPFS_SKIP_CHECKSUM_THRESHOLD,
};
pub use stream::RegionStream;

#[cfg(all(test, not(target_arch = "wasm32")))]
mod proptests;
