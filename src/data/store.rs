//! Persistent Store
//!
//! Owns one fixed region of a [`FlashDevice`] and exposes erase/write/read at that
//! region's offset. There is no logical addressing, log or versioning: the region is
//! erased once when the store initializes and holds one record's worth of live data.
//!
//! The store refuses to serve writes or reads until `init` has succeeded, so nothing
//! is ever programmed into a region this store did not erase itself.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, error, info};

use crate::config::StorageConfig;
use crate::error::{AppResult, FlashDaqError};
use crate::hardware::FlashDevice;

/// Fixed erase region on the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageRegion {
    /// Absolute start offset
    pub offset: usize,
    /// Erase sector size in bytes
    pub sector_size: usize,
    /// Number of sectors
    pub sector_count: usize,
}

impl StorageRegion {
    /// Region size in bytes
    pub fn size(&self) -> usize {
        self.sector_size.saturating_mul(self.sector_count)
    }

    /// One past the last byte of the region, if it does not overflow
    pub fn end(&self) -> Option<usize> {
        self.offset.checked_add(self.size())
    }
}

impl Default for StorageRegion {
    fn default() -> Self {
        Self {
            offset: 0,
            sector_size: 4096,
            sector_count: 1,
        }
    }
}

impl From<&StorageConfig> for StorageRegion {
    fn from(config: &StorageConfig) -> Self {
        Self {
            offset: config.offset,
            sector_size: config.sector_size,
            sector_count: config.sector_count,
        }
    }
}

/// Erase-once, single-offset record store
pub struct PersistentStore {
    device: Arc<dyn FlashDevice>,
    region: StorageRegion,
    ready: AtomicBool,
}

impl PersistentStore {
    /// Bind a region of `device`. Nothing touches the device until `init`.
    pub fn new(device: Arc<dyn FlashDevice>, region: StorageRegion) -> Self {
        Self {
            device,
            region,
            ready: AtomicBool::new(false),
        }
    }

    /// Region owned by this store
    pub fn region(&self) -> StorageRegion {
        self.region
    }

    /// Whether `init` has succeeded
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Check readiness and erase the region.
    pub async fn init(&self) -> AppResult<()> {
        self.ready.store(false, Ordering::SeqCst);
        let name = self.device.name();

        if !self.device.is_ready().await {
            error!(device = name, "storage device is not ready");
            return Err(FlashDaqError::not_ready(name));
        }

        match self.region.end() {
            Some(end) if end <= self.device.capacity() && self.region.size() > 0 => {}
            _ => {
                return Err(FlashDaqError::EraseFailed(format!(
                    "region 0x{:X}+{} does not fit {} ({} bytes)",
                    self.region.offset,
                    self.region.size(),
                    name,
                    self.device.capacity()
                )))
            }
        }

        self.device
            .erase(self.region.offset, self.region.size())
            .await
            .map_err(|e| {
                error!(device = name, error = %e, "flash erase failed");
                FlashDaqError::EraseFailed(e.to_string())
            })?;

        self.ready.store(true, Ordering::SeqCst);
        info!(
            device = name,
            offset = self.region.offset,
            size = self.region.size(),
            "flash region erased"
        );
        Ok(())
    }

    /// Program `bytes` at the region offset.
    pub async fn write(&self, bytes: &[u8]) -> AppResult<()> {
        self.ensure_ready()?;
        if bytes.len() > self.region.size() {
            return Err(FlashDaqError::WriteFailed(format!(
                "{} bytes exceed region size {}",
                bytes.len(),
                self.region.size()
            )));
        }

        self.device
            .write(self.region.offset, bytes)
            .await
            .map_err(|e| {
                error!(device = self.device.name(), error = %e, "error writing data");
                FlashDaqError::WriteFailed(e.to_string())
            })?;

        debug!(
            len = bytes.len(),
            offset = self.region.offset,
            "wrote bytes to flash"
        );
        Ok(())
    }

    /// Read `length` bytes from the region offset.
    pub async fn read(&self, length: usize) -> AppResult<Bytes> {
        self.ensure_ready()?;
        if length > self.region.size() {
            return Err(FlashDaqError::ReadFailed(format!(
                "{} bytes exceed region size {}",
                length,
                self.region.size()
            )));
        }

        let bytes = self
            .device
            .read(self.region.offset, length)
            .await
            .map_err(|e| {
                error!(device = self.device.name(), error = %e, "error reading data");
                FlashDaqError::ReadFailed(e.to_string())
            })?;

        if bytes.len() != length {
            return Err(FlashDaqError::ReadFailed(format!(
                "short read: wanted {} bytes, got {}",
                length,
                bytes.len()
            )));
        }

        debug!(len = length, offset = self.region.offset, "read bytes from flash");
        Ok(bytes)
    }

    fn ensure_ready(&self) -> AppResult<()> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(FlashDaqError::Initialization(format!(
                "store on {} used before a successful init",
                self.device.name()
            )))
        }
    }
}
