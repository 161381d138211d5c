//! Configuration System using Figment
//!
//! Strongly-typed configuration for the acquisition loop. Configuration is layered:
//! 1. Built-in defaults matching the reference board (nRF52 SAADC + MX25R64 QSPI flash)
//! 2. `config/flash_daq.toml` (optional; a missing file keeps the defaults)
//!
//! Values are fixed for the lifetime of the process. There is no command-line or
//! environment override surface.
//!
//! # Example
//! ```no_run
//! use flash_daq::config::FlashDaqConfig;
//!
//! let config = FlashDaqConfig::load()?;
//! println!("Period: {:?}", config.acquisition.period());
//! # Ok::<(), flash_daq::error::FlashDaqError>(())
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    providers::{Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::data::record::MAX_RECORDS;
use crate::error::{AppResult, FlashDaqError};

/// Default location of the configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/flash_daq.toml";

/// Highest accepted converter reference in millivolts
pub const MAX_REFERENCE_MV: i32 = 5_000;

/// Highest accepted inverse gain
pub const MAX_GAIN: i32 = 64;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FlashDaqConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Trigger and pipeline timing
    pub acquisition: AcquisitionConfig,
    /// Converter scaling and simulation
    pub adc: AdcConfig,
    /// Flash device and region
    pub storage: StorageConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    pub log_format: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "flash_daq".to_string(),
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

/// Trigger period and settle delay
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Time between pipeline activations in milliseconds
    pub period_ms: u64,
    /// Pause between write and read-back in milliseconds
    pub settle_ms: u64,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            period_ms: 5000,
            settle_ms: 2000,
        }
    }
}

impl AcquisitionConfig {
    /// Trigger period as a `Duration`
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    /// Settle delay as a `Duration`
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

/// Converter scaling constants plus the simulated signal used on a host.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdcConfig {
    /// Internal reference voltage in millivolts
    pub reference_mv: i32,
    /// Inverse of the input gain (6 for a 1/6 gain stage)
    pub gain: i32,
    /// Full-scale converter counts (16384 for 14-bit)
    pub resolution: i32,
    /// Amplitude of the simulated sine in raw counts
    pub sim_amplitude_counts: i16,
    /// DC offset of the simulated sine in raw counts
    pub sim_offset_counts: i16,
    /// Samples per sine period
    pub sim_period_samples: u32,
    /// Probability (0.0 - 1.0) that a simulated conversion fails
    pub sim_fault_probability: f64,
    /// Seed for the fault injector; `None` draws from the OS
    pub sim_seed: Option<u64>,
}

impl Default for AdcConfig {
    fn default() -> Self {
        Self {
            reference_mv: 600,
            gain: 6,
            resolution: 16384,
            sim_amplitude_counts: 4000,
            sim_offset_counts: 8192,
            sim_period_samples: 64,
            sim_fault_probability: 0.0,
            sim_seed: None,
        }
    }
}

/// Which storage device backs the persistent store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// In-memory NOR array (lost on exit)
    Memory,
    /// Memory-mapped file (survives restarts)
    File,
}

/// How the simulated medium treats programming of non-erased cells
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgramMode {
    /// Reject any write that would need a 0 -> 1 bit transition
    Strict,
    /// Bitwise AND like real NOR flash; silently corrupts on overwrite
    Nor,
}

/// Flash device and storage region configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backing device
    pub backend: StorageBackend,
    /// Backing file for the `file` backend
    pub path: PathBuf,
    /// Device capacity in bytes
    pub capacity: usize,
    /// Region start offset
    pub offset: usize,
    /// Erase sector size in bytes
    pub sector_size: usize,
    /// Number of sectors in the region
    pub sector_count: usize,
    /// Program semantics for the simulated medium
    pub program_mode: ProgramMode,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            path: PathBuf::from("data/flash.img"),
            capacity: 64 * 1024,
            offset: 0,
            sector_size: 4096,
            sector_count: 1,
            program_mode: ProgramMode::Strict,
        }
    }
}

impl StorageConfig {
    /// Size of the erase region in bytes
    pub fn region_size(&self) -> usize {
        self.sector_size.saturating_mul(self.sector_count)
    }
}

impl FlashDaqConfig {
    /// Load configuration from the default path layered over built-in defaults
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string layered over built-in defaults
    pub fn from_toml_str(toml: &str) -> AppResult<Self> {
        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::string(toml))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(FlashDaqError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.application.log_format.to_lowercase().as_str()) {
            return Err(FlashDaqError::Configuration(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                valid_formats.join(", ")
            )));
        }

        if self.acquisition.period_ms == 0 {
            return Err(FlashDaqError::Configuration(
                "period_ms must be greater than zero".to_string(),
            ));
        }

        if self.acquisition.settle_ms >= self.acquisition.period_ms {
            return Err(FlashDaqError::Configuration(format!(
                "settle_ms ({}) must be shorter than period_ms ({})",
                self.acquisition.settle_ms, self.acquisition.period_ms
            )));
        }

        if self.adc.gain <= 0 || self.adc.resolution <= 0 || self.adc.reference_mv <= 0 {
            return Err(FlashDaqError::Configuration(
                "ADC reference, gain and resolution must be positive".to_string(),
            ));
        }

        if self.adc.reference_mv > MAX_REFERENCE_MV || self.adc.gain > MAX_GAIN {
            return Err(FlashDaqError::Configuration(format!(
                "ADC reference {} mV / gain {} out of range (max {} mV / {})",
                self.adc.reference_mv, self.adc.gain, MAX_REFERENCE_MV, MAX_GAIN
            )));
        }

        if !(0.0..=1.0).contains(&self.adc.sim_fault_probability) {
            return Err(FlashDaqError::Configuration(format!(
                "sim_fault_probability {} must be within 0.0 - 1.0",
                self.adc.sim_fault_probability
            )));
        }

        let record_bytes = 2 * MAX_RECORDS;
        let region = self.storage.region_size();
        if region < record_bytes {
            return Err(FlashDaqError::Configuration(format!(
                "Storage region of {} bytes cannot hold a {}-byte record",
                region, record_bytes
            )));
        }

        let end = self.storage.offset.checked_add(region);
        if end.map_or(true, |end| end > self.storage.capacity) {
            return Err(FlashDaqError::Configuration(format!(
                "Storage region 0x{:X}+{} exceeds device capacity {}",
                self.storage.offset, region, self.storage.capacity
            )));
        }

        Ok(())
    }
}
