//! Application boot sequence.
//!
//! 1. Build the converter and flash devices from configuration; a flash image that
//!    cannot be opened counts as storage not ready
//! 2. Initialize the analog source; on failure, stop here
//! 3. Initialize the store (readiness + region erase); on failure, stop here
//! 4. Arm the periodic trigger
//!
//! A failed boot leaves nothing running. The caller decides whether to keep the
//! process alive.

use std::sync::Arc;

use tracing::{error, info};

use crate::analog::{AdcSettings, AnalogSource};
use crate::config::{FlashDaqConfig, StorageBackend};
use crate::data::record::MAX_RECORDS;
use crate::data::store::{PersistentStore, StorageRegion};
use crate::error::{AppResult, FlashDaqError};
use crate::hardware::{AdcDevice, FileFlash, FlashDevice, SimulatedAdc, SimulatedFlash};
use crate::pipeline::{Pipeline, PipelineSettings};
use crate::trigger::{PeriodicTrigger, TriggerHandle};

/// The two collaborators the pipeline drives
pub struct Devices {
    /// Converter
    pub adc: Arc<dyn AdcDevice>,
    /// Storage medium
    pub flash: Arc<dyn FlashDevice>,
}

impl Devices {
    /// Host devices selected by configuration
    pub fn from_config(config: &FlashDaqConfig) -> AppResult<Self> {
        let adc: Arc<dyn AdcDevice> = Arc::new(SimulatedAdc::from_config(&config.adc));

        let storage = &config.storage;
        let flash: Arc<dyn FlashDevice> = match storage.backend {
            StorageBackend::Memory => {
                Arc::new(SimulatedFlash::new(storage.capacity, storage.program_mode))
            }
            StorageBackend::File => {
                match FileFlash::open(&storage.path, storage.capacity, storage.program_mode) {
                    Ok(flash) => Arc::new(flash),
                    Err(e) => {
                        error!(path = ?storage.path, error = ?e, "flash image unavailable");
                        return Err(FlashDaqError::not_ready(format!(
                            "file-nor:{}",
                            storage.path.display()
                        )));
                    }
                }
            }
        };

        Ok(Self { adc, flash })
    }
}

/// Build the pipeline from configuration and devices without touching hardware.
pub fn build_pipeline(config: &FlashDaqConfig, devices: Devices) -> Pipeline<MAX_RECORDS> {
    let source = AnalogSource::new(devices.adc, AdcSettings::from(&config.adc));
    let store = PersistentStore::new(devices.flash, StorageRegion::from(&config.storage));
    Pipeline::new(
        source,
        store,
        PipelineSettings {
            settle: config.acquisition.settle(),
        },
    )
}

/// Build the configured devices, then [`boot`] them.
pub async fn start(config: &FlashDaqConfig) -> AppResult<TriggerHandle> {
    let devices = Devices::from_config(config)?;
    boot(config, devices).await
}

/// Run the startup contract and arm the trigger.
///
/// Returns the first startup error; in that case no trigger exists and no write has
/// been issued.
pub async fn boot(config: &FlashDaqConfig, devices: Devices) -> AppResult<TriggerHandle> {
    let adc_name = devices.adc.name().to_string();
    let flash_name = devices.flash.name().to_string();
    let mut pipeline = build_pipeline(config, devices);

    if let Err(err) = pipeline.init().await {
        error!(error = %err, adc = %adc_name, flash = %flash_name, "startup aborted, trigger not armed");
        return Err(err);
    }

    info!(
        app = %config.application.name,
        adc = %adc_name,
        flash = %flash_name,
        "ADC and flash ready"
    );
    Ok(PeriodicTrigger::new(config.acquisition.period()).start(pipeline))
}
