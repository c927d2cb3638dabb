use tracing::debug;

use crate::{bulk, Aperture, Region, Result};

/// Byte-stream view over an owned [`Region`].
///
/// Reads and writes are clamped to the region end instead of failing; the cursor may be seeked
/// past the end, where reads return nothing and writes are dropped.
#[derive(Debug)]
pub struct RegionStream<A> {
    region: Region<A>,
    pos: u64,
}

impl<A: Aperture> RegionStream<A> {
    pub fn new(region: Region<A>) -> Self {
        Self { region, pos: 0 }
    }

    pub fn region(&self) -> &Region<A> {
        &self.region
    }

    pub fn into_region(self) -> Region<A> {
        self.region
    }

    pub fn seek(&mut self, pos: u64) {
        self.pos = pos;
    }

    pub fn tell(&self) -> u64 {
        self.pos
    }

    /// Bytes between the cursor and the region end.
    pub fn remaining(&self) -> usize {
        self.region.length().saturating_sub(self.pos) as usize
    }

    fn tail(&self) -> &[u8] {
        let body = self.region.body();
        let start = (self.pos as usize).min(body.len());
        &body[start..]
    }

    /// Fills as much of `buf` as the region allows and returns the count.
    pub fn read_into(&mut self, buf: &mut [u8]) -> usize {
        let n = bulk::copy(buf, self.tail());
        self.pos += n as u64;
        n
    }

    /// Reads up to `n` bytes.
    pub fn read(&mut self, n: usize) -> Vec<u8> {
        let mut buf = vec![0u8; n.min(self.remaining())];
        self.read_into(&mut buf);
        buf
    }

    pub fn read_to_end(&mut self) -> Vec<u8> {
        self.read(self.remaining())
    }

    /// Reads through the next `\n` (inclusive), or to the region end if there is none.
    pub fn readline(&mut self) -> Vec<u8> {
        let n = bulk::find_byte(self.tail(), b'\n');
        self.read(n)
    }

    /// Writes as much of `data` as fits before the region end, advancing the cursor.
    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        let n = data.len().min(self.remaining());
        if n == 0 {
            return Ok(0);
        }
        debug!(pos = self.pos, len = n, "stream write");
        let written = self.region.write_at(self.pos, &data[..n])?;
        self.pos += written as u64;
        Ok(written)
    }

    /// Copy of the whole region body, independent of the cursor.
    pub fn get_value(&self) -> Vec<u8> {
        self.region.body().to_vec()
    }
}
