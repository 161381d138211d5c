//! Custom error types for the application.
//!
//! This module defines the primary error type, `FlashDaqError`, for the whole crate.
//! Using the `thiserror` crate, it provides a centralized and consistent way to handle
//! the failures that can occur between the converter, the record codec and the
//! flash storage device.
//!
//! ## Error Hierarchy
//!
//! - **`DeviceNotReady`**: the ADC or the storage device failed its readiness check.
//!   Fatal at startup: the periodic trigger is never armed.
//! - **`Initialization`**: a component was used before (or initialized after) its
//!   one-time initialization.
//! - **`SampleFailed`**: one conversion failed mid-cycle. Only that slot of the record
//!   is degraded.
//! - **`EraseFailed` / `WriteFailed` / `ReadFailed`**: storage I/O failures. They abort
//!   the current cycle; the next cycle is still scheduled.
//! - **`VerificationMismatch`**: read-back succeeded but decoded to different values.
//!   Reported in the same class as `ReadFailed` while staying distinguishable from a
//!   raw I/O error.
//! - **`LengthMismatch`**: a codec caller supplied a buffer of the wrong length.
//! - **`Config` / `Configuration` / `Io`**: ambient failures while loading settings or
//!   opening backing files.
//!
//! Device traits report `anyhow::Error`; the store and the analog source map those into
//! the typed variants above so that the pipeline can tag each failure precisely.

use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type AppResult<T> = std::result::Result<T, FlashDaqError>;

/// Primary error type for the acquisition loop.
#[derive(Error, Debug)]
pub enum FlashDaqError {
    #[error("Device '{device}' is not ready")]
    DeviceNotReady { device: String },

    #[error("Initialization error: {0}")]
    Initialization(String),

    #[error("Sample {slot} failed: {reason}")]
    SampleFailed { slot: usize, reason: String },

    #[error("Flash erase failed: {0}")]
    EraseFailed(String),

    #[error("Flash write failed: {0}")]
    WriteFailed(String),

    #[error("Flash read failed: {0}")]
    ReadFailed(String),

    #[error("Read-back verification failed for slots {slots:?}")]
    VerificationMismatch { slots: Vec<usize> },

    #[error("Buffer length mismatch: expected {expected} bytes/samples, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FlashDaqError {
    /// Builds a `DeviceNotReady` for the named device.
    pub fn not_ready(device: impl Into<String>) -> Self {
        Self::DeviceNotReady {
            device: device.into(),
        }
    }

    /// Errors that abort startup and leave the trigger unarmed.
    pub fn is_startup_fatal(&self) -> bool {
        matches!(
            self,
            Self::DeviceNotReady { .. }
                | Self::EraseFailed(_)
                | Self::Initialization(_)
                | Self::Config(_)
                | Self::Configuration(_)
                | Self::Io(_)
        )
    }

    /// True for read-back failures, whether I/O or verification.
    pub fn is_read_class(&self) -> bool {
        matches!(self, Self::ReadFailed(_) | Self::VerificationMismatch { .. })
    }

    /// True for raw storage I/O failures (not verification).
    pub fn is_storage_io(&self) -> bool {
        matches!(
            self,
            Self::EraseFailed(_) | Self::WriteFailed(_) | Self::ReadFailed(_)
        )
    }
}
