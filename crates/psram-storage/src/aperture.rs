use crate::{PsramError, Result};

/// Physical placement of an external memory window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApertureLayout {
    pub base: u64,
    pub size: u64,
}

/// PSRAM window of the Presto board (RP2350 QMI CS1, 8 MiB).
pub const PRESTO_PSRAM: ApertureLayout = ApertureLayout {
    base: 0x1100_0000,
    size: 8 * 1024 * 1024,
};

/// Byte-addressable view of a memory aperture.
///
/// Offsets passed to [`Aperture::as_bytes`] slices are relative to [`ApertureLayout::base`].
pub trait Aperture {
    fn layout(&self) -> ApertureLayout;

    fn as_bytes(&self) -> &[u8];

    fn as_bytes_mut(&mut self) -> &mut [u8];

    /// Pushes any platform write-back cache covering the aperture out to the device.
    fn sync(&mut self) -> Result<()> {
        Ok(())
    }

    fn size(&self) -> u64 {
        self.as_bytes().len() as u64
    }
}

/// Heap buffer standing in for the PSRAM window under simulation and tests.
#[derive(Debug, Clone)]
pub struct MemAperture {
    layout: ApertureLayout,
    data: Vec<u8>,
}

impl MemAperture {
    /// Allocates a zeroed window matching `layout`.
    pub fn new(layout: ApertureLayout) -> Result<Self> {
        let size = usize::try_from(layout.size).map_err(|_| PsramError::OffsetOverflow)?;
        let mut data = Vec::new();
        data.try_reserve_exact(size)
            .map_err(|_| PsramError::Io(format!("cannot allocate {size} byte aperture")))?;
        data.resize(size, 0);
        Ok(Self { layout, data })
    }

    /// Wraps an existing image (e.g. a dump of the window) located at physical address `base`.
    pub fn from_vec(base: u64, data: Vec<u8>) -> Self {
        Self {
            layout: ApertureLayout {
                base,
                size: data.len() as u64,
            },
            data,
        }
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }
}

impl Aperture for MemAperture {
    fn layout(&self) -> ApertureLayout {
        self.layout
    }

    fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

/// Hardware-mapped aperture.
///
/// This is the only place a raw physical address becomes a slice; everything above it goes
/// through bounds-checked region accessors.
pub struct MappedAperture {
    layout: ApertureLayout,
    mem: &'static mut [u8],
    flush: Option<fn(&[u8])>,
}

impl MappedAperture {
    /// # Safety
    ///
    /// `[layout.base, layout.base + layout.size)` must be mapped, readable and writable memory for
    /// the rest of the program, and nothing else may access it while this value exists.
    pub unsafe fn new(layout: ApertureLayout) -> Self {
        let ptr = layout.base as usize as *mut u8;
        // SAFETY: upheld by the caller.
        let mem = unsafe { core::slice::from_raw_parts_mut(ptr, layout.size as usize) };
        Self {
            layout,
            mem,
            flush: None,
        }
    }

    /// Installs the routine used by [`Aperture::sync`] to clean the platform cache.
    pub fn with_flush(mut self, flush: fn(&[u8])) -> Self {
        self.flush = Some(flush);
        self
    }
}

impl Aperture for MappedAperture {
    fn layout(&self) -> ApertureLayout {
        self.layout
    }

    fn as_bytes(&self) -> &[u8] {
        &*self.mem
    }

    fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut *self.mem
    }

    fn sync(&mut self) -> Result<()> {
        if let Some(flush) = self.flush {
            flush(&*self.mem);
        }
        Ok(())
    }
}

impl<A: Aperture + ?Sized> Aperture for Box<A> {
    fn layout(&self) -> ApertureLayout {
        (**self).layout()
    }

    fn as_bytes(&self) -> &[u8] {
        (**self).as_bytes()
    }

    fn as_bytes_mut(&mut self) -> &mut [u8] {
        (**self).as_bytes_mut()
    }

    fn sync(&mut self) -> Result<()> {
        (**self).sync()
    }
}

impl<A: Aperture + ?Sized> Aperture for &mut A {
    fn layout(&self) -> ApertureLayout {
        (**self).layout()
    }

    fn as_bytes(&self) -> &[u8] {
        (**self).as_bytes()
    }

    fn as_bytes_mut(&mut self) -> &mut [u8] {
        (**self).as_bytes_mut()
    }

    fn sync(&mut self) -> Result<()> {
        (**self).sync()
    }
}
