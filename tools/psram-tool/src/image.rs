use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use psram_storage::{Aperture, ApertureLayout, MemAperture, PsramError};

/// Aperture backed by an image file holding a dump of the whole PSRAM window.
///
/// The image is loaded into memory on open; [`Aperture::sync`] writes it back.
pub struct FileAperture {
    path: PathBuf,
    mem: MemAperture,
}

impl FileAperture {
    /// Loads `path`, or starts from a zeroed window when the file does not exist yet.
    pub fn open(path: &Path, layout: ApertureLayout) -> anyhow::Result<Self> {
        let mem = if path.exists() {
            let data = fs::read(path).with_context(|| format!("read {}", path.display()))?;
            if data.len() as u64 != layout.size {
                bail!(
                    "{} is {} bytes but the aperture is {} bytes (see --aperture-size)",
                    path.display(),
                    data.len(),
                    layout.size
                );
            }
            MemAperture::from_vec(layout.base, data)
        } else {
            MemAperture::new(layout).context("allocate aperture")?
        };
        Ok(Self {
            path: path.to_path_buf(),
            mem,
        })
    }
}

impl Aperture for FileAperture {
    fn layout(&self) -> ApertureLayout {
        self.mem.layout()
    }

    fn as_bytes(&self) -> &[u8] {
        self.mem.as_bytes()
    }

    fn as_bytes_mut(&mut self) -> &mut [u8] {
        self.mem.as_bytes_mut()
    }

    fn sync(&mut self) -> psram_storage::Result<()> {
        fs::write(&self.path, self.mem.as_bytes())
            .map_err(|e| PsramError::Io(format!("write {}: {e}", self.path.display())))
    }
}
