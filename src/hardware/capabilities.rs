//! Hardware Capabilities
//!
//! The two collaborators the acquisition loop talks to. Board bring-up (pin muxing,
//! reference selection, QSPI clocking) lives behind these traits; the core only sees
//! a converter that yields raw counts and a flash part that erases, programs and reads.
//!
//! # Design Philosophy
//!
//! Each capability trait:
//! - Is async (uses #[async_trait])
//! - Is thread-safe (requires Send + Sync)
//! - Uses anyhow::Result for errors
//! - Returns failure instead of hanging; timeouts belong to the driver
//!
//! # Example
//!
//! ```rust,ignore
//! async fn probe(adc: &dyn AdcDevice, flash: &dyn FlashDevice) -> Result<()> {
//!     adc.init().await?;
//!     if !flash.is_ready().await {
//!         anyhow::bail!("{} not ready", flash.name());
//!     }
//!     let raw = adc.read_channel().await?;
//!     flash.erase(0, 4096).await?;
//!     flash.write(0, &raw.to_be_bytes()).await?;
//!     Ok(())
//! }
//! ```

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;

/// Raw converter output before scaling.
pub type RawCount = i16;

/// Capability: Single-Channel Analog Conversion
///
/// # Contract
/// - `init` configures the channel; it is called once before any conversion
/// - `read_channel` performs one blocking single-shot conversion
/// - A busy or timed-out converter returns Err, never blocks indefinitely
#[async_trait]
pub trait AdcDevice: Send + Sync {
    /// Device label for diagnostics
    fn name(&self) -> &str;

    /// Configure the converter channel
    ///
    /// # Returns
    /// - Ok(()) if the converter is ready for conversions
    /// - Err if the device is missing or rejected the channel setup
    async fn init(&self) -> Result<()>;

    /// Convert once
    ///
    /// # Returns
    /// Signed raw count relative to the configured reference and gain
    async fn read_channel(&self) -> Result<RawCount>;
}

/// Capability: Erase-Before-Write Storage
///
/// Byte-addressed NOR-style medium. Erasing sets every bit of a range to 1; programming
/// can only clear bits.
///
/// # Contract
/// - `erase`, `write` and `read` operate on absolute device offsets
/// - Out-of-range accesses return Err
/// - Programming cells that are not erased is medium-defined; callers erase first
#[async_trait]
pub trait FlashDevice: Send + Sync {
    /// Device label for diagnostics
    fn name(&self) -> &str;

    /// Total addressable size in bytes
    fn capacity(&self) -> usize;

    /// Readiness probe
    async fn is_ready(&self) -> bool;

    /// Erase `size` bytes starting at `offset`
    async fn erase(&self, offset: usize, size: usize) -> Result<()>;

    /// Program `data` at `offset`
    async fn write(&self, offset: usize, data: &[u8]) -> Result<()>;

    /// Read `length` bytes from `offset`
    async fn read(&self, offset: usize, length: usize) -> Result<Bytes>;
}
