//! # flash_daq
//!
//! Periodic analog acquisition with verified persistence to erase-before-write flash.
//! Every period a full record of samples is read from the converter, packed big-endian,
//! programmed into a fixed flash region, read back after a settle delay and verified.
//!
//! ## Crate Structure
//!
//! - **`analog`**: `AnalogSource`, raw count to millivolt scaling.
//! - **`data`**: the fixed-length `Record` codec and the erase-once `PersistentStore`.
//! - **`pipeline`**: the sample → write → settle → read → verify state machine.
//! - **`trigger`**: periodic timer feeding a single-slot queue and one worker task.
//! - **`app`**: boot sequence wiring devices, pipeline and trigger.
//! - **`hardware`**: `AdcDevice`/`FlashDevice` traits and host implementations.
//! - **`config`**, **`logging`**, **`error`**: configuration, tracing setup and the
//!   crate error type.

pub mod analog;
pub mod app;
pub mod config;
pub mod data;
pub mod error;
pub mod hardware;
pub mod logging;
pub mod pipeline;
pub mod trigger;

pub use error::{AppResult, FlashDaqError};
