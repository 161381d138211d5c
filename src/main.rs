//! Entry point for flash_daq
//!
//! Always-on background loop: loads `config/flash_daq.toml` (or the built-in
//! defaults), boots the converter and flash, and samples every period until Ctrl-C.
//!
//! Any startup failure (bad configuration, unavailable flash image, device init)
//! leaves the process up without a trigger, logging the reason, so the failure is
//! visible on the console rather than as a restart loop.

use anyhow::Result;
use flash_daq::app;
use flash_daq::config::FlashDaqConfig;
use flash_daq::logging::{self, TracingConfig};
use flash_daq::trigger::TriggerHandle;
use tracing::{error, info, warn};

async fn start() -> Option<TriggerHandle> {
    let config = match FlashDaqConfig::load() {
        Ok(config) => config,
        Err(err) => {
            if let Err(e) = logging::init(TracingConfig::default()) {
                eprintln!("{}", e);
            }
            error!(error = %err, "configuration rejected, system inert");
            return None;
        }
    };

    if let Err(e) = logging::init_from_config(&config) {
        eprintln!("{}", e);
    }

    info!(
        app = %config.application.name,
        period_ms = config.acquisition.period_ms,
        settle_ms = config.acquisition.settle_ms,
        backend = ?config.storage.backend,
        "ADC and flash acquisition loop starting"
    );

    match app::start(&config).await {
        Ok(handle) => Some(handle),
        Err(err) => {
            error!(error = %err, "system inert: periodic trigger not armed");
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let trigger = start().await;

    tokio::signal::ctrl_c().await?;
    warn!("shutdown requested");

    if let Some(handle) = trigger {
        let stats = handle.shutdown().await;
        info!(
            cycles = stats.completed,
            failed = stats.failed,
            overruns = stats.overruns,
            "acquisition loop stopped"
        );
    }
    Ok(())
}
