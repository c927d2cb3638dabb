use core::fmt;
use core::ops::Deref;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::util::checked_range;
use crate::{
    bulk, Aperture, ChecksumMode, ConfigError, HeaderFault, HeaderStatus, PsramError,
    RegionHeader, Result, HEADER_SIZE,
};

pub const DEFAULT_BLOCK_SIZE: u32 = 256;

/// Default size of a scratch (tmpfs-style) region.
pub const DEFAULT_TMPFS_SIZE: u64 = 64 * 1024;

/// Scratch regions larger than this skip body checksums; re-hashing the whole body after each
/// block write gets too slow beyond it.
pub const TMPFS_SKIP_CHECKSUM_THRESHOLD: u64 = 256 * 1024;

// The header length field is a u32 and 0xFFFF_FFFF is reserved.
const MAX_REGION_LENGTH: u64 = 0xFFFF_FFFE;

/// Whether a region keeps a validation header in front of its body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderTracking {
    #[default]
    Tracked,
    /// Plain block storage: no header is read or written and existing contents are always
    /// accepted.
    Untracked,
}

/// Placement and validation policy for a [`Region`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionConfig {
    /// Body size in bytes; must be a multiple of `block_size`.
    pub length: u64,
    /// Body offset from the aperture base. `None` places the region at the top of the aperture
    /// so regions of agreed sizes stay put across boots.
    #[serde(default)]
    pub offset: Option<u64>,
    #[serde(default = "default_block_size")]
    pub block_size: u32,
    /// Wipe and re-initialise the region when its header does not validate.
    #[serde(default)]
    pub allow_create: bool,
    #[serde(default)]
    pub checksum: ChecksumMode,
    #[serde(default)]
    pub tracking: HeaderTracking,
}

fn default_block_size() -> u32 {
    DEFAULT_BLOCK_SIZE
}

impl RegionConfig {
    pub fn new(length: u64) -> Self {
        Self {
            length,
            offset: None,
            block_size: DEFAULT_BLOCK_SIZE,
            allow_create: false,
            checksum: ChecksumMode::Verify,
            tracking: HeaderTracking::Tracked,
        }
    }

    /// Scratch filesystem region: always (re)creatable, checksums skipped above
    /// [`TMPFS_SKIP_CHECKSUM_THRESHOLD`].
    pub fn tmpfs(length: u64) -> Self {
        let checksum = if length > TMPFS_SKIP_CHECKSUM_THRESHOLD {
            ChecksumMode::Skip
        } else {
            ChecksumMode::Verify
        };
        Self {
            allow_create: true,
            checksum,
            ..Self::new(length)
        }
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_block_size(mut self, block_size: u32) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn with_allow_create(mut self, allow_create: bool) -> Self {
        self.allow_create = allow_create;
        self
    }

    pub fn with_checksum(mut self, checksum: ChecksumMode) -> Self {
        self.checksum = checksum;
        self
    }

    pub fn with_tracking(mut self, tracking: HeaderTracking) -> Self {
        self.tracking = tracking;
        self
    }
}

#[derive(Debug, Clone, Copy)]
struct Geometry {
    offset: usize,
    length: usize,
    block_count: u32,
}

impl Geometry {
    fn resolve(config: &RegionConfig, aperture_size: u64) -> std::result::Result<Self, ConfigError> {
        let length = config.length;
        if config.block_size == 0 {
            return Err(ConfigError::ZeroBlockSize);
        }
        if length > MAX_REGION_LENGTH {
            return Err(ConfigError::TooLarge {
                length,
                max: MAX_REGION_LENGTH,
            });
        }
        if length % config.block_size as u64 != 0 {
            return Err(ConfigError::UnalignedLength {
                length,
                block_size: config.block_size,
            });
        }

        let outside = |offset: u64| ConfigError::OutsideAperture {
            offset,
            length,
            aperture_size,
        };
        let offset = match config.offset {
            Some(offset) => offset,
            None => aperture_size.checked_sub(length).ok_or(outside(0))?,
        };
        match offset.checked_add(length) {
            Some(end) if end <= aperture_size => {}
            _ => return Err(outside(offset)),
        }
        if config.tracking == HeaderTracking::Tracked && offset < HEADER_SIZE as u64 {
            return Err(ConfigError::NoRoomForHeader {
                offset,
                header_size: HEADER_SIZE,
            });
        }

        // Both fit below `aperture_size`, which is the length of an in-memory slice.
        Ok(Self {
            offset: offset as usize,
            length: length as usize,
            block_count: (length / config.block_size as u64) as u32,
        })
    }
}

/// A validated slice of an [`Aperture`] managed as one storage volume.
///
/// Opening a region is the only point where its contents are judged: a tracked region whose
/// header does not validate is either wiped (when `allow_create` is set) or rejected with
/// [`PsramError::UntrustedRegion`]. Afterwards every mutation rewrites the header so the next
/// boot finds it valid.
pub struct Region<A> {
    aperture: A,
    config: RegionConfig,
    geometry: Geometry,
}

impl<A: Aperture> Region<A> {
    pub fn open(aperture: A, config: RegionConfig) -> Result<Self> {
        let mut region = Self::place(aperture, config)?;

        let base = region.base_address();
        let length = region.length();
        if region.config.tracking == HeaderTracking::Untracked {
            debug!(base, length, "opened untracked region");
            return Ok(region);
        }

        match region.header_fault() {
            None => info!(base, length, "preserving existing region contents"),
            Some(fault) if !region.config.allow_create => {
                warn!(base, %fault, "region header invalid and creation disallowed");
                return Err(PsramError::UntrustedRegion { fault });
            }
            Some(HeaderFault::BadMagic) => {
                info!(base, length, "initialising new region");
                region.clear();
            }
            Some(fault) => {
                warn!(base, %fault, "discarding invalid region contents");
                region.clear();
            }
        }
        Ok(region)
    }

    /// Places a region without judging or touching its contents.
    ///
    /// Meant for diagnostics, such as reporting the stored header of a region that
    /// [`Region::open`] would reject. The returned view is read-only.
    pub fn inspect(aperture: A, config: RegionConfig) -> Result<RegionInspection<A>> {
        Self::place(aperture, config).map(|region| RegionInspection { region })
    }

    /// Places a region and zero-fills it with a fresh header, whatever it held before.
    pub fn recreate(aperture: A, config: RegionConfig) -> Result<Self> {
        let mut region = Self::place(aperture, config)?;
        let base = region.base_address();
        let length = region.length();
        info!(base, length, "recreating region");
        region.clear();
        Ok(region)
    }

    fn place(aperture: A, config: RegionConfig) -> Result<Self> {
        let geometry = Geometry::resolve(&config, aperture.size())?;
        Ok(Self {
            aperture,
            config,
            geometry,
        })
    }

    pub fn config(&self) -> &RegionConfig {
        &self.config
    }

    pub fn length(&self) -> u64 {
        self.geometry.length as u64
    }

    pub fn block_size(&self) -> u32 {
        self.config.block_size
    }

    pub fn block_count(&self) -> u32 {
        self.geometry.block_count
    }

    /// Body offset from the aperture base.
    pub fn offset(&self) -> u64 {
        self.geometry.offset as u64
    }

    /// Physical address of the first body byte.
    pub fn base_address(&self) -> u64 {
        self.aperture.layout().base | self.offset()
    }

    pub fn tracking(&self) -> HeaderTracking {
        self.config.tracking
    }

    pub fn aperture(&self) -> &A {
        &self.aperture
    }

    pub fn into_aperture(self) -> A {
        self.aperture
    }

    pub fn body(&self) -> &[u8] {
        let Geometry { offset, length, .. } = self.geometry;
        &self.aperture.as_bytes()[offset..offset + length]
    }

    fn body_mut(&mut self) -> &mut [u8] {
        let Geometry { offset, length, .. } = self.geometry;
        &mut self.aperture.as_bytes_mut()[offset..offset + length]
    }

    fn header_slot(&self) -> core::ops::Range<usize> {
        self.geometry.offset - HEADER_SIZE..self.geometry.offset
    }

    /// Body checksum under the configured [`ChecksumMode`].
    pub fn checksum(&self) -> u16 {
        self.config.checksum.checksum(self.body())
    }

    /// Decodes the stored header; `None` for untracked regions.
    pub fn read_header(&self) -> Option<RegionHeader> {
        if self.config.tracking == HeaderTracking::Untracked {
            return None;
        }
        let mut raw = [0u8; HEADER_SIZE];
        bulk::copy(&mut raw, &self.aperture.as_bytes()[self.header_slot()]);
        Some(RegionHeader::decode(&raw))
    }

    /// Stamps a fresh header describing the current body. No-op for untracked regions.
    pub fn write_header(&mut self) {
        if self.config.tracking == HeaderTracking::Untracked {
            return;
        }
        let header = RegionHeader::new(self.geometry.length as u32, self.checksum());
        let slot = self.header_slot();
        bulk::copy(&mut self.aperture.as_bytes_mut()[slot], &header.encode());
    }

    pub fn header_status(&self) -> Option<HeaderStatus> {
        let header = self.read_header()?;
        let fault = header
            .validate(
                self.geometry.length as u32,
                self.config.checksum,
                self.body(),
            )
            .err();
        Some(HeaderStatus { header, fault })
    }

    fn header_fault(&self) -> Option<HeaderFault> {
        self.header_status().and_then(|status| status.fault)
    }

    /// Whether the stored header matches the body. Untracked regions have nothing to validate
    /// and always report `true`.
    pub fn is_valid(&self) -> bool {
        self.header_fault().is_none()
    }

    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let range = checked_range(offset, buf.len(), self.length())?;
        bulk::copy(buf, &self.body()[range]);
        Ok(())
    }

    pub fn read(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read_at(offset, &mut buf)?;
        Ok(buf)
    }

    pub fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<usize> {
        let range = checked_range(offset, data.len(), self.length())?;
        let n = bulk::copy(&mut self.body_mut()[range], data);
        self.write_header();
        Ok(n)
    }

    pub fn fill_at(&mut self, offset: u64, len: usize, value: u8) -> Result<()> {
        let range = checked_range(offset, len, self.length())?;
        bulk::fill(&mut self.body_mut()[range], value);
        self.write_header();
        Ok(())
    }

    /// Zero-fills the body and stamps a matching header.
    pub fn clear(&mut self) {
        bulk::fill(self.body_mut(), 0);
        self.write_header();
    }

    pub fn sync(&mut self) -> Result<()> {
        self.aperture.sync()
    }

    /// Reads `buf.len()` bytes at `offset` without bounds checks.
    ///
    /// # Safety
    ///
    /// `offset + buf.len()` must not exceed [`Region::length`].
    pub unsafe fn read_unchecked(&self, offset: usize, buf: &mut [u8]) -> usize {
        // SAFETY: upheld by the caller; the body is a live slice of the aperture.
        unsafe {
            let src = self.body().as_ptr().add(offset);
            bulk::raw::copy(buf.as_mut_ptr(), src, buf.len())
        }
    }

    /// Writes `data` at `offset` without bounds checks, then rewrites the header.
    ///
    /// # Safety
    ///
    /// `offset + data.len()` must not exceed [`Region::length`].
    pub unsafe fn write_unchecked(&mut self, offset: usize, data: &[u8]) -> usize {
        // SAFETY: upheld by the caller; the body is a live slice of the aperture.
        let n = unsafe {
            let dest = self.body_mut().as_mut_ptr().add(offset);
            bulk::raw::copy(dest, data.as_ptr(), data.len())
        };
        self.write_header();
        n
    }
}

impl<A: Aperture> fmt::Display for Region<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.header_status() {
            Some(status) => write!(
                f,
                "PSRAM: length: {}, crc: {:04x}, valid: {}",
                status.header.length,
                status.header.checksum,
                status.is_valid()
            ),
            None => write!(f, "PSRAM: length: {}, untracked", self.length()),
        }
    }
}

impl<A> fmt::Debug for Region<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Region")
            .field("config", &self.config)
            .field("offset", &self.geometry.offset)
            .field("block_count", &self.geometry.block_count)
            .finish_non_exhaustive()
    }
}

/// Read-only view of a placed region whose contents have not been validated.
///
/// Returned by [`Region::inspect`]. Only shared access to the [`Region`] is exposed, so nothing
/// can restamp the header over untrusted bytes.
pub struct RegionInspection<A> {
    region: Region<A>,
}

impl<A> RegionInspection<A> {
    pub fn into_aperture(self) -> A {
        self.region.aperture
    }
}

impl<A> Deref for RegionInspection<A> {
    type Target = Region<A>;

    fn deref(&self) -> &Region<A> {
        &self.region
    }
}

impl<A: Aperture> fmt::Display for RegionInspection<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.region, f)
    }
}

impl<A> fmt::Debug for RegionInspection<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RegionInspection").field(&self.region).finish()
    }
}
