//! Memory-mapped flash image.
//!
//! Backs a [`FlashDevice`] with a file so that records survive process restarts, the
//! way the QSPI part keeps them across power cycles. The file is sized to the device
//! capacity on open; a freshly created image reads as programmed (`0x00`) until erased.
//! Every erase and program is flushed to the file before returning.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use memmap2::{MmapMut, MmapOptions};
use parking_lot::Mutex;
use tracing::debug;

use crate::config::ProgramMode;
use crate::hardware::capabilities::FlashDevice;
use crate::hardware::nor;

/// File-backed NOR flash
pub struct FileFlash {
    name: String,
    path: PathBuf,
    mode: ProgramMode,
    capacity: usize,
    mmap: Mutex<MmapMut>,
}

impl FileFlash {
    /// Open or create the image at `path` with `capacity` bytes.
    pub fn open(path: &Path, capacity: usize, mode: ProgramMode) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("Failed to open flash image: {:?}", path))?;

        file.set_len(capacity as u64)
            .context("Failed to size flash image")?;

        // SAFETY: the file is open read/write and sized to `capacity`; this process is
        // the only writer of the image.
        let mmap = unsafe {
            MmapOptions::new()
                .len(capacity)
                .map_mut(&file)
                .context("Failed to map flash image")?
        };

        debug!(path = ?path, capacity, "flash image mapped");
        Ok(Self {
            name: format!("file-nor:{}", path.display()),
            path: path.to_path_buf(),
            mode,
            capacity,
            mmap: Mutex::new(mmap),
        })
    }

    /// Backing file path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl FlashDevice for FileFlash {
    fn name(&self) -> &str {
        &self.name
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    async fn is_ready(&self) -> bool {
        self.path.exists()
    }

    async fn erase(&self, offset: usize, size: usize) -> Result<()> {
        let mut mmap = self.mmap.lock();
        nor::erase(&mut mmap[..], offset, size)?;
        mmap.flush_range(offset, size)
            .context("Failed to flush erased range")
    }

    async fn write(&self, offset: usize, data: &[u8]) -> Result<()> {
        let mut mmap = self.mmap.lock();
        nor::program(&mut mmap[..], offset, data, self.mode)?;
        mmap.flush_range(offset, data.len())
            .context("Failed to flush programmed range")
    }

    async fn read(&self, offset: usize, length: usize) -> Result<Bytes> {
        let mmap = self.mmap.lock();
        nor::check_range(self.capacity, offset, length)?;
        Ok(Bytes::copy_from_slice(&mmap[offset..offset + length]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_fresh_image_is_unerased() {
        let dir = TempDir::new().unwrap();
        let flash = FileFlash::open(&dir.path().join("flash.img"), 4096, ProgramMode::Strict)
            .unwrap();

        assert!(flash.is_ready().await);
        assert!(flash.write(0, &[0x01]).await.is_err());
        assert_eq!(&flash.read(0, 2).await.unwrap()[..], &[0x00, 0x00]);
    }

    #[tokio::test]
    async fn test_contents_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("flash.img");

        {
            let flash = FileFlash::open(&path, 4096, ProgramMode::Strict).unwrap();
            flash.erase(0, 4096).await.unwrap();
            flash.write(16, &[0x7F, 0xFF, 0x80, 0x00]).await.unwrap();
        }

        let flash = FileFlash::open(&path, 4096, ProgramMode::Strict).unwrap();
        assert_eq!(flash.path(), path.as_path());
        assert_eq!(
            &flash.read(16, 4).await.unwrap()[..],
            &[0x7F, 0xFF, 0x80, 0x00]
        );
        assert_eq!(&flash.read(0, 1).await.unwrap()[..], &[nor::ERASED_BYTE]);
    }

    #[tokio::test]
    async fn test_out_of_range_access() {
        let dir = TempDir::new().unwrap();
        let flash =
            FileFlash::open(&dir.path().join("flash.img"), 256, ProgramMode::Nor).unwrap();
        assert!(flash.erase(128, 256).await.is_err());
        assert!(flash.read(250, 8).await.is_err());
    }
}
