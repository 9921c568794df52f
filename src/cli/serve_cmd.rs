//! `axscan serve` — run the scan service.

use crate::browser::{chromium::ChromiumBackend, BrowserSettings, SessionManager};
use crate::config::Config;
use crate::engine::{AxeRunner, RuleConfig};
use crate::events::{EventBus, ScanEvent};
use crate::ratelimit::RateLimiter;
use crate::rest::{self, AppState};
use crate::scan::Scanner;
use crate::scanlog::{self, ScanLog};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Boot the service: resolve the engine bundle, wire the orchestrator, and
/// serve HTTP until the process exits.
pub async fn run(port_override: Option<u16>) -> Result<()> {
    let config = Config::from_env();
    let port = port_override.unwrap_or(config.port);

    let bus = EventBus::new(256);

    // Scan log is best-effort; a read-only home directory is not fatal.
    match ScanLog::default_log() {
        Ok(log) => {
            scanlog::spawn_writer(&bus, log);
        }
        Err(e) => warn!("scan log disabled: {e}"),
    }

    let engine = AxeRunner::load(config.axe_path.as_deref(), RuleConfig::default())
        .await
        .context("could not load the axe-core bundle (run `axscan install`)")?;

    let settings = BrowserSettings {
        executable: config.chromium_path.clone(),
        viewport: config.viewport,
    };
    let sessions = SessionManager::new(Arc::new(ChromiumBackend), settings);
    let limiter = RateLimiter::new(config.rate_max, config.rate_window);

    let scanner = Scanner::new(
        sessions,
        limiter,
        engine,
        config.nav_timeout,
        config.settle,
    )
    .with_telemetry(bus.clone());

    info!(
        port,
        nav_timeout_ms = config.nav_timeout.as_millis() as u64,
        rate_max = config.rate_max,
        rate_window_s = config.rate_window.as_secs(),
        "starting axscan v{}",
        env!("CARGO_PKG_VERSION")
    );
    bus.emit(ScanEvent::RuntimeStarted {
        version: env!("CARGO_PKG_VERSION").to_string(),
        port,
    });

    let state = Arc::new(AppState {
        scanner,
        bus,
        started_at: Instant::now(),
    });

    // Periodic limiter housekeeping so the caller map does not grow forever.
    {
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(std::time::Duration::from_secs(300));
            loop {
                tick.tick().await;
                state.scanner.evict_rate_windows();
            }
        });
    }

    rest::serve(port, state).await
}
