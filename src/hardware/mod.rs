//! Hardware abstraction layer.
//!
//! - `capabilities`: the `AdcDevice` and `FlashDevice` traits the core depends on
//! - `nor`: erase/program rules for NOR cells
//! - `mock`: simulated converter and in-memory flash
//! - `file_flash`: memory-mapped flash image that persists across restarts

pub mod capabilities;
pub mod file_flash;
pub mod mock;
pub mod nor;

pub use capabilities::{AdcDevice, FlashDevice, RawCount};
pub use file_flash::FileFlash;
pub use mock::{FlashFault, SimulatedAdc, SimulatedFlash};
