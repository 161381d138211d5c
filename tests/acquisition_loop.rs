//! Integration tests for the boot sequence and the periodic acquisition loop
//!
//! All timing tests run on a paused tokio clock, so periods of seconds complete
//! instantly and deterministically.

use std::sync::Arc;
use std::time::Duration;

use flash_daq::app::{self, Devices};
use flash_daq::config::{FlashDaqConfig, ProgramMode, StorageBackend};
use flash_daq::data::record::Record;
use flash_daq::hardware::{FileFlash, FlashDevice, FlashFault, SimulatedAdc, SimulatedFlash};
use flash_daq::pipeline::{CycleOutcome, PipelineState, SlotStatus, SAMPLE_FAILED_SENTINEL};
use flash_daq::FlashDaqError;
use tempfile::TempDir;

/// Default timing with raw counts passed through as millivolts
fn unity_config() -> FlashDaqConfig {
    let mut config = FlashDaqConfig::default();
    config.adc.reference_mv = 1;
    config.adc.gain = 1;
    config.adc.resolution = 1;
    config
}

fn memory_flash(config: &FlashDaqConfig) -> Arc<SimulatedFlash> {
    Arc::new(SimulatedFlash::new(
        config.storage.capacity,
        ProgramMode::Strict,
    ))
}

// =============================================================================
// Boot
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_storage_not_ready_leaves_system_inert() {
    let config = unity_config();
    let flash = memory_flash(&config);
    flash.set_ready(false);

    let devices = Devices {
        adc: Arc::new(SimulatedAdc::sequence(vec![1])),
        flash: flash.clone(),
    };
    let result = app::boot(&config, devices).await;

    assert!(matches!(result, Err(FlashDaqError::DeviceNotReady { .. })));

    // Nothing was armed, so time passing issues no storage traffic
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(flash.erase_count(), 0);
    assert_eq!(flash.write_count(), 0);
    assert_eq!(flash.read_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_erase_failure_aborts_boot() {
    let config = unity_config();
    let flash = memory_flash(&config);
    flash.inject(FlashFault::Erase);

    let devices = Devices {
        adc: Arc::new(SimulatedAdc::sequence(vec![1])),
        flash: flash.clone(),
    };
    let err = app::boot(&config, devices).await.err().unwrap();

    assert!(matches!(err, FlashDaqError::EraseFailed(_)));
    assert!(err.is_startup_fatal());
    assert_eq!(flash.write_count(), 0);
}

// =============================================================================
// Periodic loop
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_two_cycles_in_first_ten_seconds() {
    let config = unity_config();
    assert_eq!(config.acquisition.period(), Duration::from_secs(5));
    assert_eq!(config.acquisition.settle(), Duration::from_secs(2));

    let flash = memory_flash(&config);
    let devices = Devices {
        adc: Arc::new(SimulatedAdc::sequence(vec![250])),
        flash: flash.clone(),
    };
    let handle = app::boot(&config, devices).await.unwrap();

    // Ticks at 0 s and 5 s; each cycle ends 2 s later
    tokio::time::sleep(Duration::from_millis(9900)).await;
    let stats = handle.stats();
    assert_eq!(stats.completed, 2);
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.overruns, 0);
    assert_eq!(stats.max_in_flight, 1);
    assert_eq!(flash.erase_count(), 1);
    assert_eq!(flash.write_count(), 2);
    assert_eq!(flash.read_count(), 2);

    let report = handle.latest_report().unwrap();
    assert_eq!(report.cycle, 2);
    assert_eq!(report.outcome(), CycleOutcome::Verified);
    assert!(report.values().iter().all(|&v| v == 250));

    let final_stats = handle.shutdown().await;
    assert_eq!(final_stats.completed, 2);
}

#[tokio::test(start_paused = true)]
async fn test_corrupted_read_back_is_reported() {
    let config = unity_config();
    let flash = memory_flash(&config);
    // Slot 1 (-50 = 0xFFCE) has its low byte at offset 3
    flash.inject(FlashFault::CorruptRead {
        byte: 3,
        mask: 0x01,
    });

    let devices = Devices {
        adc: Arc::new(SimulatedAdc::sequence(vec![100, -50])),
        flash: flash.clone(),
    };
    let handle = app::boot(&config, devices).await.unwrap();

    tokio::time::sleep(Duration::from_millis(2100)).await;
    let report = handle.latest_report().unwrap();

    assert_eq!(report.outcome(), CycleOutcome::VerificationFailed);
    assert_eq!(report.failed_stage, Some(PipelineState::Decoding));
    match &report.error {
        Some(FlashDaqError::VerificationMismatch { slots }) => assert_eq!(slots, &vec![1]),
        other => panic!("expected verification mismatch, got {:?}", other),
    }
    assert_eq!(report.slots[1].value, -49);
    assert_eq!(report.slots[1].status, SlotStatus::Mismatch { written: -50 });

    // The cells themselves were never touched
    let stored = flash.snapshot(0, 4);
    assert_eq!(stored, vec![0x00, 0x64, 0xFF, 0xCE]);

    let stats = handle.shutdown().await;
    assert_eq!(stats.failed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_conversion_degrades_record() {
    let config = unity_config();
    let flash = memory_flash(&config);
    let devices = Devices {
        adc: Arc::new(SimulatedAdc::sequence(vec![7]).fail_conversions([5])),
        flash: flash.clone(),
    };
    let handle = app::boot(&config, devices).await.unwrap();

    tokio::time::sleep(Duration::from_millis(2100)).await;
    let report = handle.latest_report().unwrap();

    assert_eq!(report.outcome(), CycleOutcome::Degraded);
    assert_eq!(report.failed_slots(), vec![5]);
    assert_eq!(report.slots[5].value, SAMPLE_FAILED_SENTINEL);
    assert_eq!(report.slots[5].status, SlotStatus::SampleFailed);
    assert!(report.error.is_none());

    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_write_failure_skips_read_and_loop_continues() {
    let config = unity_config();
    let flash = memory_flash(&config);
    flash.inject(FlashFault::Write);

    let devices = Devices {
        adc: Arc::new(SimulatedAdc::sequence(vec![3])),
        flash: flash.clone(),
    };
    let handle = app::boot(&config, devices).await.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    let first = handle.latest_report().unwrap();
    assert_eq!(first.outcome(), CycleOutcome::Aborted);
    assert_eq!(first.failed_stage, Some(PipelineState::Writing));
    assert_eq!(flash.read_count(), 0);

    // Next period runs a normal cycle
    tokio::time::sleep(Duration::from_millis(7000)).await;
    let second = handle.latest_report().unwrap();
    assert_eq!(second.cycle, 2);
    assert_eq!(second.outcome(), CycleOutcome::Verified);

    handle.shutdown().await;
}

// =============================================================================
// File-backed flash
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_file_backend_persists_last_record() {
    let dir = TempDir::new().unwrap();
    let mut config = unity_config();
    config.storage.backend = StorageBackend::File;
    config.storage.path = dir.path().join("flash.img");
    config.storage.capacity = 8192;
    config.storage.offset = 4096;

    let mut devices = Devices::from_config(&config).unwrap();
    devices.adc = Arc::new(SimulatedAdc::sequence(vec![1234]));
    let handle = app::boot(&config, devices).await.unwrap();

    tokio::time::sleep(Duration::from_millis(2100)).await;
    assert_eq!(
        handle.latest_report().unwrap().outcome(),
        CycleOutcome::Verified
    );
    handle.shutdown().await;

    // Reopen the image as a new process would
    let reopened = FileFlash::open(&config.storage.path, 8192, ProgramMode::Strict).unwrap();
    let bytes = reopened
        .read(4096, Record::<16>::ENCODED_LEN)
        .await
        .unwrap();
    let record = Record::<16>::decode(&bytes).unwrap();
    assert!(record.samples().iter().all(|&v| v == 1234));
}

// =============================================================================
// Shipped configuration
// =============================================================================

#[test]
fn test_shipped_config_matches_defaults() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/flash_daq.toml");
    let config = FlashDaqConfig::load_from(path).unwrap();
    let defaults = FlashDaqConfig::default();

    assert_eq!(config.acquisition.period(), defaults.acquisition.period());
    assert_eq!(config.acquisition.settle(), defaults.acquisition.settle());
    assert_eq!(config.storage.backend, StorageBackend::Memory);
    assert_eq!(config.storage.program_mode, ProgramMode::Strict);
    assert_eq!(config.storage.region_size(), 4096);
}
