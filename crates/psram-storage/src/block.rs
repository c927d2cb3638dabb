use std::sync::Mutex;

use tracing::debug;

use crate::util::block_offset;
use crate::{Aperture, PsramError, Region, RegionConfig, Result};

/// Control operations of the block-device mount contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoctlOp {
    Init,
    Deinit,
    Sync,
    BlockCount,
    BlockSize,
    /// Erase the given block.
    Erase(u32),
}

impl IoctlOp {
    pub const INIT: u32 = 1;
    pub const DEINIT: u32 = 2;
    pub const SYNC: u32 = 3;
    pub const BLOCK_COUNT: u32 = 4;
    pub const BLOCK_SIZE: u32 = 5;
    pub const ERASE: u32 = 6;

    /// Decodes a numeric `(op, arg)` pair as issued by a filesystem mount layer.
    pub fn from_raw(op: u32, arg: u32) -> Option<Self> {
        Some(match op {
            Self::INIT => Self::Init,
            Self::DEINIT => Self::Deinit,
            Self::SYNC => Self::Sync,
            Self::BLOCK_COUNT => Self::BlockCount,
            Self::BLOCK_SIZE => Self::BlockSize,
            Self::ERASE => Self::Erase(arg),
            _ => return None,
        })
    }

    pub fn code(self) -> u32 {
        match self {
            Self::Init => Self::INIT,
            Self::Deinit => Self::DEINIT,
            Self::Sync => Self::SYNC,
            Self::BlockCount => Self::BLOCK_COUNT,
            Self::BlockSize => Self::BLOCK_SIZE,
            Self::Erase(_) => Self::ERASE,
        }
    }
}

/// Block storage contract expected by log-structured flash filesystems.
///
/// `offset` is a byte offset within `block`; a transfer may extend over following blocks.
pub trait BlockDevice {
    fn read_blocks(&mut self, block: u32, buf: &mut [u8], offset: usize) -> Result<()>;

    fn write_blocks(&mut self, block: u32, buf: &[u8], offset: usize) -> Result<()>;

    fn ioctl(&mut self, op: IoctlOp) -> Result<u32>;

    fn ioctl_raw(&mut self, op: u32, arg: u32) -> Result<u32> {
        let op = IoctlOp::from_raw(op, arg).ok_or(PsramError::UnsupportedIoctl(op))?;
        self.ioctl(op)
    }

    fn block_count(&mut self) -> Result<u32> {
        self.ioctl(IoctlOp::BlockCount)
    }

    fn block_size(&mut self) -> Result<u32> {
        self.ioctl(IoctlOp::BlockSize)
    }
}

impl<D: BlockDevice + ?Sized> BlockDevice for Box<D> {
    fn read_blocks(&mut self, block: u32, buf: &mut [u8], offset: usize) -> Result<()> {
        (**self).read_blocks(block, buf, offset)
    }

    fn write_blocks(&mut self, block: u32, buf: &[u8], offset: usize) -> Result<()> {
        (**self).write_blocks(block, buf, offset)
    }

    fn ioctl(&mut self, op: IoctlOp) -> Result<u32> {
        (**self).ioctl(op)
    }
}

/// Block view over an owned [`Region`].
///
/// Every block write rewrites the region header, so a tracked region stays valid across soft
/// resets without an explicit sync. The adapter keeps no state besides the region.
#[derive(Debug)]
pub struct RegionBlockDevice<A> {
    region: Region<A>,
}

impl<A: Aperture> RegionBlockDevice<A> {
    pub fn new(region: Region<A>) -> Self {
        Self { region }
    }

    /// Opens a region and wraps it in one step.
    pub fn open(aperture: A, config: RegionConfig) -> Result<Self> {
        Region::open(aperture, config).map(Self::new)
    }

    pub fn region(&self) -> &Region<A> {
        &self.region
    }

    pub fn into_region(self) -> Region<A> {
        self.region
    }

    /// Zero-fills one block.
    ///
    /// RAM needs no erase cycle, so [`IoctlOp::Erase`] does not call this; it exists for callers
    /// that want erased blocks to read back as zeros.
    pub fn erase_block(&mut self, block: u32) -> Result<()> {
        let block_size = self.region.block_size();
        let start = block_offset(block, block_size, 0)?;
        debug!(block, "erase_block");
        self.region.fill_at(start, block_size as usize, 0)
    }
}

impl<A: Aperture> BlockDevice for RegionBlockDevice<A> {
    fn read_blocks(&mut self, block: u32, buf: &mut [u8], offset: usize) -> Result<()> {
        debug!(block, len = buf.len(), offset, "read_blocks");
        let start = block_offset(block, self.region.block_size(), offset)?;
        self.region.read_at(start, buf)
    }

    fn write_blocks(&mut self, block: u32, buf: &[u8], offset: usize) -> Result<()> {
        debug!(block, len = buf.len(), offset, "write_blocks");
        let start = block_offset(block, self.region.block_size(), offset)?;
        self.region.write_at(start, buf).map(|_| ())
    }

    fn ioctl(&mut self, op: IoctlOp) -> Result<u32> {
        debug!(?op, "ioctl");
        match op {
            IoctlOp::Init | IoctlOp::Deinit => Ok(0),
            IoctlOp::Sync => {
                self.region.sync()?;
                Ok(0)
            }
            IoctlOp::BlockCount => Ok(self.region.block_count()),
            IoctlOp::BlockSize => Ok(self.region.block_size()),
            IoctlOp::Erase(_) => Ok(0),
        }
    }
}

/// [`RegionBlockDevice`] behind a mutex, for regions reached from more than one thread.
///
/// Each call holds the lock for the whole transfer plus header rewrite, so concurrent writers can
/// never interleave partial data with a stale checksum.
#[derive(Debug)]
pub struct SharedBlockDevice<A> {
    inner: Mutex<RegionBlockDevice<A>>,
}

impl<A: Aperture> SharedBlockDevice<A> {
    pub fn new(device: RegionBlockDevice<A>) -> Self {
        Self {
            inner: Mutex::new(device),
        }
    }

    pub fn read_blocks(&self, block: u32, buf: &mut [u8], offset: usize) -> Result<()> {
        self.with_device(|dev| dev.read_blocks(block, buf, offset))
    }

    pub fn write_blocks(&self, block: u32, buf: &[u8], offset: usize) -> Result<()> {
        self.with_device(|dev| dev.write_blocks(block, buf, offset))
    }

    pub fn ioctl(&self, op: IoctlOp) -> Result<u32> {
        self.with_device(|dev| dev.ioctl(op))
    }

    pub fn ioctl_raw(&self, op: u32, arg: u32) -> Result<u32> {
        self.with_device(|dev| dev.ioctl_raw(op, arg))
    }

    /// Runs `f` with exclusive access to the underlying region.
    pub fn with_region<R>(&self, f: impl FnOnce(&Region<A>) -> R) -> R {
        self.with_device(|dev| f(dev.region()))
    }

    pub fn into_inner(self) -> RegionBlockDevice<A> {
        self.inner
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn with_device<R>(&self, f: impl FnOnce(&mut RegionBlockDevice<A>) -> R) -> R {
        let mut guard = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut *guard)
    }
}

impl<A: Aperture> From<RegionBlockDevice<A>> for SharedBlockDevice<A> {
    fn from(device: RegionBlockDevice<A>) -> Self {
        Self::new(device)
    }
}
