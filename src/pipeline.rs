//! Acquisition-Persistence Pipeline
//!
//! One cycle samples a full record, writes it to flash, waits for the medium to settle,
//! reads it back and verifies it slot by slot.
//!
//! # State Machine
//!
//! ```text
//! Idle ─> Sampling ─> Encoding ─> Writing ─> Settling ─> Reading ─> Decoding ─> Reporting ─> Idle
//!                                    │                      │           │            ▲
//!                                    └──────────────────────┴───────────┴── failure ─┘
//! ```
//!
//! Sampling never aborts a cycle: a failed conversion stores [`SAMPLE_FAILED_SENTINEL`]
//! in its slot and the slot is reported as degraded. Write, read and decode failures
//! skip straight to `Reporting` with the failing state recorded.
//!
//! The region is erased once, in [`Pipeline::init`]. `run_cycle` takes `&mut self`, so
//! two cycles of one pipeline cannot overlap.

use std::fmt;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::analog::AnalogSource;
use crate::data::record::{Record, Sample, MAX_RECORDS};
use crate::data::store::PersistentStore;
use crate::error::{AppResult, FlashDaqError};

/// Value written into a slot whose conversion failed.
pub const SAMPLE_FAILED_SENTINEL: Sample = Sample::MIN;

/// Pipeline execution state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Waiting for a trigger
    Idle,
    /// Reading the converter
    Sampling,
    /// Packing samples into bytes
    Encoding,
    /// Programming the region
    Writing,
    /// Waiting for the write to become visible
    Settling,
    /// Reading the region back
    Reading,
    /// Unpacking and verifying
    Decoding,
    /// Emitting the cycle outcome
    Reporting,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PipelineState::Idle => "idle",
            PipelineState::Sampling => "sampling",
            PipelineState::Encoding => "encoding",
            PipelineState::Writing => "writing",
            PipelineState::Settling => "settling",
            PipelineState::Reading => "reading",
            PipelineState::Decoding => "decoding",
            PipelineState::Reporting => "reporting",
        };
        write!(f, "{}", label)
    }
}

/// Per-slot verification result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotStatus {
    /// Read-back equals what was written
    Verified,
    /// Conversion failed; the sentinel was stored
    SampleFailed,
    /// Read-back differs from what was written
    Mismatch {
        /// Value that was written
        written: Sample,
    },
}

/// Decoded value of one slot and how it fared
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotReport {
    /// Index within the record
    pub index: usize,
    /// Value decoded from the read-back
    pub value: Sample,
    /// Verification status
    pub status: SlotStatus,
}

/// Summary classification of a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Every slot sampled and verified
    Verified,
    /// Stored and verified, but some conversions failed
    Degraded,
    /// Read-back decoded to different values
    VerificationFailed,
    /// A storage step failed; remaining states were skipped
    Aborted,
}

/// Everything observed during one cycle
#[derive(Debug)]
pub struct CycleReport {
    /// One-based cycle number
    pub cycle: u64,
    /// Per-slot results; empty if the cycle aborted before decoding
    pub slots: Vec<SlotReport>,
    /// State in which the cycle failed
    pub failed_stage: Option<PipelineState>,
    /// Failure, if any
    pub error: Option<FlashDaqError>,
    /// Wall time from trigger to report
    pub elapsed: Duration,
}

impl CycleReport {
    fn new(cycle: u64) -> Self {
        Self {
            cycle,
            slots: Vec::new(),
            failed_stage: None,
            error: None,
            elapsed: Duration::ZERO,
        }
    }

    /// Classify the cycle
    pub fn outcome(&self) -> CycleOutcome {
        match &self.error {
            Some(FlashDaqError::VerificationMismatch { .. }) => CycleOutcome::VerificationFailed,
            Some(_) => CycleOutcome::Aborted,
            None if self
                .slots
                .iter()
                .any(|s| s.status == SlotStatus::SampleFailed) =>
            {
                CycleOutcome::Degraded
            }
            None => CycleOutcome::Verified,
        }
    }

    /// Slots whose conversion failed
    pub fn failed_slots(&self) -> Vec<usize> {
        self.slots
            .iter()
            .filter(|s| s.status == SlotStatus::SampleFailed)
            .map(|s| s.index)
            .collect()
    }

    /// Decoded values in slot order
    pub fn values(&self) -> Vec<Sample> {
        self.slots.iter().map(|s| s.value).collect()
    }

    /// Emit the report to the diagnostic sink
    pub fn log(&self) {
        for slot in &self.slots {
            match slot.status {
                SlotStatus::Verified => {
                    info!(cycle = self.cycle, slot = slot.index, value = slot.value, "read ADC value")
                }
                SlotStatus::SampleFailed => warn!(
                    cycle = self.cycle,
                    slot = slot.index,
                    value = slot.value,
                    "read ADC value (conversion failed)"
                ),
                SlotStatus::Mismatch { written } => error!(
                    cycle = self.cycle,
                    slot = slot.index,
                    value = slot.value,
                    written,
                    "read-back mismatch"
                ),
            }
        }

        let elapsed_ms = self.elapsed.as_millis() as u64;
        match (self.outcome(), &self.error) {
            (CycleOutcome::Verified, _) => {
                info!(cycle = self.cycle, elapsed_ms, "cycle verified")
            }
            (CycleOutcome::Degraded, _) => warn!(
                cycle = self.cycle,
                elapsed_ms,
                failed_slots = ?self.failed_slots(),
                "cycle completed with degraded record"
            ),
            (_, Some(err)) => error!(
                cycle = self.cycle,
                elapsed_ms,
                stage = %self.failed_stage.unwrap_or(PipelineState::Idle),
                error = %err,
                "cycle failed"
            ),
            (_, None) => {}
        }
    }
}

/// Timing for the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    /// Delay between write and read-back
    pub settle: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            settle: Duration::from_millis(2000),
        }
    }
}

type StageFailure = (PipelineState, FlashDaqError);

/// Sample → encode → write → settle → read → decode → report
pub struct Pipeline<const N: usize = MAX_RECORDS> {
    source: AnalogSource,
    store: PersistentStore,
    settings: PipelineSettings,
    state: PipelineState,
    cycles: u64,
    initialized: bool,
}

impl<const N: usize> Pipeline<N> {
    /// Assemble a pipeline. Devices are untouched until `init`.
    pub fn new(source: AnalogSource, store: PersistentStore, settings: PipelineSettings) -> Self {
        Self {
            source,
            store,
            settings,
            state: PipelineState::Idle,
            cycles: 0,
            initialized: false,
        }
    }

    /// Current state
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Cycles started so far
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Whether `init` has succeeded
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Initialize the converter, then erase the storage region.
    ///
    /// This is the only place the region is erased. After a storage failure the call
    /// may be retried; the already configured converter is kept.
    pub async fn init(&mut self) -> AppResult<()> {
        if self.initialized {
            return Err(FlashDaqError::Initialization(
                "pipeline already initialized".to_string(),
            ));
        }

        if !self.source.is_initialized() {
            self.source.init().await?;
        }
        self.store.init().await?;
        self.initialized = true;
        info!(
            record_len = N,
            settle_ms = self.settings.settle.as_millis() as u64,
            "pipeline initialized"
        );
        Ok(())
    }

    /// Run one full cycle and report it. Never panics on device failures.
    pub async fn run_cycle(&mut self) -> CycleReport {
        let started = Instant::now();
        self.cycles += 1;
        let mut report = CycleReport::new(self.cycles);

        let span = info_span!("cycle", n = self.cycles);
        if let Err((stage, err)) = self.execute(&mut report).instrument(span).await {
            report.failed_stage = Some(stage);
            report.error = Some(err);
        }

        self.transition(PipelineState::Reporting);
        report.elapsed = started.elapsed();
        report.log();
        self.transition(PipelineState::Idle);
        report
    }

    async fn execute(&mut self, report: &mut CycleReport) -> Result<(), StageFailure> {
        if !self.initialized {
            return Err((
                PipelineState::Idle,
                FlashDaqError::Initialization("cycle triggered before init".to_string()),
            ));
        }

        self.transition(PipelineState::Sampling);
        let mut record = Record::<N>::default();
        let mut failed = [false; N];
        for (slot, failed_slot) in failed.iter_mut().enumerate() {
            let value = match self.source.sample(slot).await {
                Ok(value) => value,
                Err(err) => {
                    warn!(slot, error = %err, "conversion failed, storing sentinel");
                    *failed_slot = true;
                    SAMPLE_FAILED_SENTINEL
                }
            };
            record.set(slot, value);
        }

        self.transition(PipelineState::Encoding);
        let encoded = record.encode();

        self.transition(PipelineState::Writing);
        self.store
            .write(encoded.as_bytes())
            .await
            .map_err(|e| (PipelineState::Writing, e))?;

        self.transition(PipelineState::Settling);
        sleep(self.settings.settle).await;

        self.transition(PipelineState::Reading);
        let bytes = self
            .store
            .read(Record::<N>::ENCODED_LEN)
            .await
            .map_err(|e| (PipelineState::Reading, e))?;

        self.transition(PipelineState::Decoding);
        let decoded = Record::<N>::decode(&bytes).map_err(|e| (PipelineState::Decoding, e))?;

        let mut mismatched = Vec::new();
        for (index, (written, read)) in record
            .samples()
            .iter()
            .zip(decoded.samples().iter())
            .enumerate()
        {
            let status = if written != read {
                mismatched.push(index);
                SlotStatus::Mismatch { written: *written }
            } else if failed[index] {
                SlotStatus::SampleFailed
            } else {
                SlotStatus::Verified
            };
            report.slots.push(SlotReport {
                index,
                value: *read,
                status,
            });
        }

        if !mismatched.is_empty() {
            return Err((
                PipelineState::Decoding,
                FlashDaqError::VerificationMismatch { slots: mismatched },
            ));
        }
        Ok(())
    }

    fn transition(&mut self, next: PipelineState) {
        debug!(from = %self.state, to = %next, "pipeline transition");
        self.state = next;
    }
}
