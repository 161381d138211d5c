//! Mock Hardware Implementations
//!
//! Simulated devices for running the acquisition loop on a host and for testing
//! without the board. All waits use `tokio::time::sleep`, never `std::thread::sleep`.
//!
//! # Available Mocks
//!
//! - `SimulatedAdc` - SAADC stand-in producing a sine or a scripted count sequence
//! - `SimulatedFlash` - in-memory NOR part with injectable faults
//!
//! Fault injection is seeded (`rand_chacha`) so failing runs can be replayed.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::time::sleep;
use tracing::{debug, trace};

use crate::config::{AdcConfig, ProgramMode};
use crate::hardware::capabilities::{AdcDevice, FlashDevice, RawCount};
use crate::hardware::nor;

// =============================================================================
// SimulatedAdc - Simulated single-channel converter
// =============================================================================

enum Signal {
    Sine {
        amplitude: f64,
        offset: f64,
        period_samples: u32,
    },
    Sequence(Vec<RawCount>),
}

impl Signal {
    fn value_at(&self, index: u64) -> RawCount {
        match self {
            Signal::Sine {
                amplitude,
                offset,
                period_samples,
            } => {
                let period = f64::from((*period_samples).max(1));
                let phase = (index as f64 / period) * std::f64::consts::TAU;
                let value = (offset + amplitude * phase.sin()).round();
                value.clamp(f64::from(RawCount::MIN), f64::from(RawCount::MAX)) as RawCount
            }
            Signal::Sequence(values) if values.is_empty() => 0,
            Signal::Sequence(values) => values[(index % values.len() as u64) as usize],
        }
    }
}

/// Seeded failure plan for conversions
struct ConversionFaults {
    probability: f64,
    fail_at: Vec<u64>,
    rng: ChaCha8Rng,
}

impl ConversionFaults {
    fn none() -> Self {
        Self {
            probability: 0.0,
            fail_at: Vec::new(),
            rng: ChaCha8Rng::seed_from_u64(0),
        }
    }

    fn should_fail(&mut self, index: u64) -> bool {
        if self.fail_at.contains(&index) {
            return true;
        }
        if self.probability <= 0.0 {
            return false;
        }
        if self.probability >= 1.0 {
            return true;
        }
        self.rng.gen::<f64>() < self.probability
    }
}

/// Mock SAADC channel
///
/// Produces raw counts from a sine or a fixed sequence. Conversion `n` (zero-based,
/// counted across the device lifetime) can be forced to fail, or failures can be drawn
/// at random with a seeded RNG.
///
/// # Example
///
/// ```rust,ignore
/// let adc = SimulatedAdc::sequence(vec![100, 200]).fail_conversions([1]);
/// adc.init().await?;
/// assert_eq!(adc.read_channel().await?, 100);
/// assert!(adc.read_channel().await.is_err());
/// ```
pub struct SimulatedAdc {
    name: String,
    ready: bool,
    initialized: AtomicBool,
    conversions: AtomicU64,
    conversion_time: Duration,
    signal: Signal,
    faults: Mutex<ConversionFaults>,
}

impl SimulatedAdc {
    fn with_signal(signal: Signal) -> Self {
        Self {
            name: "sim-saadc".to_string(),
            ready: true,
            initialized: AtomicBool::new(false),
            conversions: AtomicU64::new(0),
            conversion_time: Duration::ZERO,
            signal,
            faults: Mutex::new(ConversionFaults::none()),
        }
    }

    /// Sine wave in raw counts
    pub fn sine(amplitude_counts: i16, offset_counts: i16, period_samples: u32) -> Self {
        Self::with_signal(Signal::Sine {
            amplitude: f64::from(amplitude_counts),
            offset: f64::from(offset_counts),
            period_samples,
        })
    }

    /// Repeat a fixed sequence of raw counts
    pub fn sequence(values: Vec<RawCount>) -> Self {
        Self::with_signal(Signal::Sequence(values))
    }

    /// Build from the `[adc]` configuration section
    pub fn from_config(config: &AdcConfig) -> Self {
        let adc = Self::sine(
            config.sim_amplitude_counts,
            config.sim_offset_counts,
            config.sim_period_samples,
        );
        adc.with_fault_probability(config.sim_fault_probability, config.sim_seed)
    }

    /// Fail each conversion with probability `rate`
    pub fn with_fault_probability(self, rate: f64, seed: Option<u64>) -> Self {
        {
            let mut faults = self.faults.lock();
            faults.probability = rate;
            faults.rng = match seed {
                Some(s) => ChaCha8Rng::seed_from_u64(s),
                None => ChaCha8Rng::from_entropy(),
            };
        }
        self
    }

    /// Fail the given zero-based conversion indices
    pub fn fail_conversions(self, indices: impl IntoIterator<Item = u64>) -> Self {
        self.faults.lock().fail_at.extend(indices);
        self
    }

    /// Simulated conversion latency
    pub fn with_conversion_time(mut self, conversion_time: Duration) -> Self {
        self.conversion_time = conversion_time;
        self
    }

    /// Device that fails its init
    pub fn not_ready(mut self) -> Self {
        self.ready = false;
        self
    }

    /// Total conversions attempted
    pub fn conversion_count(&self) -> u64 {
        self.conversions.load(Ordering::SeqCst)
    }
}

impl Default for SimulatedAdc {
    fn default() -> Self {
        Self::from_config(&AdcConfig::default())
    }
}

#[async_trait]
impl AdcDevice for SimulatedAdc {
    fn name(&self) -> &str {
        &self.name
    }

    async fn init(&self) -> Result<()> {
        if !self.ready {
            bail!("{}: channel setup rejected", self.name);
        }
        self.initialized.store(true, Ordering::SeqCst);
        debug!(device = %self.name, "converter channel configured");
        Ok(())
    }

    async fn read_channel(&self) -> Result<RawCount> {
        if !self.initialized.load(Ordering::SeqCst) {
            bail!("{}: conversion requested before channel setup", self.name);
        }

        let index = self.conversions.fetch_add(1, Ordering::SeqCst);
        if !self.conversion_time.is_zero() {
            sleep(self.conversion_time).await;
        }

        if self.faults.lock().should_fail(index) {
            return Err(anyhow!("{}: conversion {} timed out", self.name, index));
        }

        let raw = self.signal.value_at(index);
        trace!(device = %self.name, index, raw, "conversion");
        Ok(raw)
    }
}

// =============================================================================
// SimulatedFlash - In-memory NOR part
// =============================================================================

/// One-shot fault armed on a [`SimulatedFlash`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashFault {
    /// Next erase fails
    Erase,
    /// Next write fails
    Write,
    /// Next read fails
    Read,
    /// Next read succeeds but `byte` (relative to the read start) is XORed with `mask`
    CorruptRead {
        /// Index within the returned buffer
        byte: usize,
        /// Bits to flip
        mask: u8,
    },
}

/// Operation counters
#[derive(Debug, Default)]
struct FlashCounters {
    erases: AtomicU64,
    writes: AtomicU64,
    reads: AtomicU64,
}

/// Mock QSPI NOR flash held in memory
///
/// Cells start out programmed (`0x00`): nothing may be written before an erase under
/// `ProgramMode::Strict`.
///
/// # Example
///
/// ```rust,ignore
/// let flash = SimulatedFlash::new(4096, ProgramMode::Strict);
/// assert!(flash.write(0, &[1, 2]).await.is_err());
/// flash.erase(0, 4096).await?;
/// flash.write(0, &[1, 2]).await?;
/// ```
pub struct SimulatedFlash {
    name: String,
    mode: ProgramMode,
    ready: AtomicBool,
    cells: Mutex<Vec<u8>>,
    faults: Mutex<VecDeque<FlashFault>>,
    counters: FlashCounters,
}

impl SimulatedFlash {
    /// Create a device of `capacity` bytes
    pub fn new(capacity: usize, mode: ProgramMode) -> Self {
        Self {
            name: "sim-nor".to_string(),
            mode,
            ready: AtomicBool::new(true),
            cells: Mutex::new(vec![0u8; capacity]),
            faults: Mutex::new(VecDeque::new()),
            counters: FlashCounters::default(),
        }
    }

    /// Toggle the readiness probe
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Arm a one-shot fault
    pub fn inject(&self, fault: FlashFault) {
        self.faults.lock().push_back(fault);
    }

    /// Copy of the raw cells, bypassing counters and faults
    pub fn snapshot(&self, offset: usize, length: usize) -> Vec<u8> {
        let cells = self.cells.lock();
        let end = offset.saturating_add(length).min(cells.len());
        cells.get(offset..end).map(<[u8]>::to_vec).unwrap_or_default()
    }

    /// Completed and attempted erases
    pub fn erase_count(&self) -> u64 {
        self.counters.erases.load(Ordering::SeqCst)
    }

    /// Attempted writes
    pub fn write_count(&self) -> u64 {
        self.counters.writes.load(Ordering::SeqCst)
    }

    /// Attempted reads
    pub fn read_count(&self) -> u64 {
        self.counters.reads.load(Ordering::SeqCst)
    }

    fn take_fault(&self, matches: impl Fn(&FlashFault) -> bool) -> Option<FlashFault> {
        let mut faults = self.faults.lock();
        let pos = faults.iter().position(matches)?;
        faults.remove(pos)
    }
}

#[async_trait]
impl FlashDevice for SimulatedFlash {
    fn name(&self) -> &str {
        &self.name
    }

    fn capacity(&self) -> usize {
        self.cells.lock().len()
    }

    async fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn erase(&self, offset: usize, size: usize) -> Result<()> {
        self.counters.erases.fetch_add(1, Ordering::SeqCst);
        if self.take_fault(|f| *f == FlashFault::Erase).is_some() {
            bail!("{}: erase timeout at 0x{:X}", self.name, offset);
        }
        nor::erase(&mut self.cells.lock(), offset, size)
    }

    async fn write(&self, offset: usize, data: &[u8]) -> Result<()> {
        self.counters.writes.fetch_add(1, Ordering::SeqCst);
        if self.take_fault(|f| *f == FlashFault::Write).is_some() {
            bail!("{}: program failed at 0x{:X}", self.name, offset);
        }
        nor::program(&mut self.cells.lock(), offset, data, self.mode)
    }

    async fn read(&self, offset: usize, length: usize) -> Result<Bytes> {
        self.counters.reads.fetch_add(1, Ordering::SeqCst);
        let fault =
            self.take_fault(|f| matches!(f, FlashFault::Read | FlashFault::CorruptRead { .. }));
        if fault == Some(FlashFault::Read) {
            bail!("{}: read failed at 0x{:X}", self.name, offset);
        }

        let mut buf = {
            let cells = self.cells.lock();
            nor::check_range(cells.len(), offset, length)?;
            cells[offset..offset + length].to_vec()
        };

        if let Some(FlashFault::CorruptRead { byte, mask }) = fault {
            if let Some(b) = buf.get_mut(byte) {
                *b ^= mask;
            }
        }
        Ok(Bytes::from(buf))
    }
}
