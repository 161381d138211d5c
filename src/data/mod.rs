//! Record layout and persistence.

pub mod record;
pub mod store;

pub use record::{Record, Sample, MAX_RECORDS};
pub use store::{PersistentStore, StorageRegion};
