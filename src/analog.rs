//! Analog Source
//!
//! Wraps an [`AdcDevice`] and turns raw counts into millivolt [`Sample`]s:
//!
//! ```text
//! mV = raw * reference_mV * gain / resolution_counts
//! ```
//!
//! For the nRF52 SAADC with the 0.6 V internal reference, 1/6 gain and 14-bit
//! resolution this is `raw * 3600 / 16384`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, error, trace};

use crate::config::AdcConfig;
use crate::data::record::Sample;
use crate::error::{AppResult, FlashDaqError};
use crate::hardware::{AdcDevice, RawCount};

/// Converter scaling constants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdcSettings {
    /// Internal reference in millivolts
    pub reference_mv: i32,
    /// Inverse input gain
    pub gain: i32,
    /// Full-scale counts
    pub resolution: i32,
}

impl Default for AdcSettings {
    fn default() -> Self {
        Self {
            reference_mv: 600,
            gain: 6,
            resolution: 16384,
        }
    }
}

impl From<&AdcConfig> for AdcSettings {
    fn from(config: &AdcConfig) -> Self {
        Self {
            reference_mv: config.reference_mv,
            gain: config.gain,
            resolution: config.resolution,
        }
    }
}

impl AdcSettings {
    /// Effective full-scale input in millivolts
    pub fn full_scale_mv(&self) -> i64 {
        i64::from(self.reference_mv) * i64::from(self.gain)
    }

    /// Scale a raw count to millivolts, saturating at the i16 limits.
    pub fn raw_to_millivolts(&self, raw: RawCount) -> Sample {
        if self.resolution == 0 {
            return 0;
        }
        let mv = i64::from(raw) * self.full_scale_mv() / i64::from(self.resolution);
        mv.clamp(i64::from(Sample::MIN), i64::from(Sample::MAX)) as Sample
    }
}

/// Single-channel millivolt source
pub struct AnalogSource {
    device: Arc<dyn AdcDevice>,
    settings: AdcSettings,
    initialized: AtomicBool,
}

impl AnalogSource {
    /// Wrap a converter with the given scaling
    pub fn new(device: Arc<dyn AdcDevice>, settings: AdcSettings) -> Self {
        Self {
            device,
            settings,
            initialized: AtomicBool::new(false),
        }
    }

    /// Scaling constants in use
    pub fn settings(&self) -> AdcSettings {
        self.settings
    }

    /// Whether `init` has succeeded
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Configure the converter. Must be called exactly once.
    pub async fn init(&self) -> AppResult<()> {
        if self.is_initialized() {
            return Err(FlashDaqError::Initialization(format!(
                "{} already initialized",
                self.device.name()
            )));
        }

        self.device.init().await.map_err(|e| {
            error!(device = self.device.name(), error = %e, "converter init failed");
            FlashDaqError::not_ready(self.device.name())
        })?;

        self.initialized.store(true, Ordering::SeqCst);
        debug!(
            device = self.device.name(),
            full_scale_mv = self.settings.full_scale_mv(),
            "analog source ready"
        );
        Ok(())
    }

    /// One blocking conversion for record slot `slot`, in millivolts.
    pub async fn sample(&self, slot: usize) -> AppResult<Sample> {
        if !self.is_initialized() {
            return Err(FlashDaqError::Initialization(format!(
                "{} sampled before init",
                self.device.name()
            )));
        }

        let raw = self
            .device
            .read_channel()
            .await
            .map_err(|e| FlashDaqError::SampleFailed {
                slot,
                reason: e.to_string(),
            })?;

        let millivolts = self.settings.raw_to_millivolts(raw);
        trace!(slot, raw, millivolts, "read ADC value");
        Ok(millivolts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::SimulatedAdc;

    #[test]
    fn test_full_scale() {
        let settings = AdcSettings::default();
        assert_eq!(settings.full_scale_mv(), 3600);
        assert_eq!(settings.raw_to_millivolts(16384), 3600);
        assert_eq!(settings.raw_to_millivolts(8192), 1800);
        assert_eq!(settings.raw_to_millivolts(0), 0);
        assert_eq!(settings.raw_to_millivolts(-4096), -900);
    }

    #[test]
    fn test_conversion_saturates() {
        let settings = AdcSettings {
            reference_mv: 600,
            gain: 6,
            resolution: 1,
        };
        assert_eq!(settings.raw_to_millivolts(100), i16::MAX);
        assert_eq!(settings.raw_to_millivolts(-100), i16::MIN);
    }

    #[test]
    fn test_large_settings_do_not_overflow() {
        let settings = AdcSettings {
            reference_mv: 100_000,
            gain: 100_000,
            resolution: i32::MAX,
        };
        assert_eq!(settings.full_scale_mv(), 10_000_000_000);
        assert_eq!(settings.raw_to_millivolts(1), 4);
        assert_eq!(settings.raw_to_millivolts(i16::MAX), i16::MAX);
    }

    #[tokio::test]
    async fn test_sample_before_init_is_error() {
        let source = AnalogSource::new(
            Arc::new(SimulatedAdc::sequence(vec![100])),
            AdcSettings::default(),
        );
        assert!(matches!(
            source.sample(0).await,
            Err(FlashDaqError::Initialization(_))
        ));
    }

    #[tokio::test]
    async fn test_init_exactly_once() {
        let source = AnalogSource::new(
            Arc::new(SimulatedAdc::sequence(vec![100])),
            AdcSettings::default(),
        );
        source.init().await.unwrap();
        assert!(matches!(
            source.init().await,
            Err(FlashDaqError::Initialization(_))
        ));
    }

    #[tokio::test]
    async fn test_device_init_failure_is_not_ready() {
        let source = AnalogSource::new(
            Arc::new(SimulatedAdc::sequence(vec![100]).not_ready()),
            AdcSettings::default(),
        );
        assert!(matches!(
            source.init().await,
            Err(FlashDaqError::DeviceNotReady { .. })
        ));
        assert!(!source.is_initialized());
    }

    #[tokio::test]
    async fn test_conversion_failure_tags_slot() {
        let source = AnalogSource::new(
            Arc::new(SimulatedAdc::sequence(vec![8192]).fail_conversions([1])),
            AdcSettings::default(),
        );
        source.init().await.unwrap();
        assert_eq!(source.sample(0).await.unwrap(), 1800);
        match source.sample(1).await {
            Err(FlashDaqError::SampleFailed { slot, .. }) => assert_eq!(slot, 1),
            other => panic!("expected SampleFailed, got {:?}", other),
        }
    }
}
