//! Environment-level configuration.
//!
//! The core consumes these values, it does not own them: everything has a
//! default and every override comes from an `AXSCAN_*` variable.

use crate::browser::SettlePolicy;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_PORT: u16 = 7900;
const DEFAULT_NAV_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_RATE_MAX: u32 = 6;
const DEFAULT_RATE_WINDOW_SECS: u64 = 60;
const DEFAULT_SETTLE_QUIET_MS: u64 = 500;
const DEFAULT_SETTLE_MAX_INFLIGHT: usize = 2;
const DEFAULT_VIEWPORT: (u32, u32) = (1280, 800);

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub nav_timeout: Duration,
    pub rate_max: u32,
    pub rate_window: Duration,
    pub settle: SettlePolicy,
    pub viewport: (u32, u32),
    pub chromium_path: Option<PathBuf>,
    pub axe_path: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            port: read_env("AXSCAN_PORT").unwrap_or(DEFAULT_PORT),
            nav_timeout: Duration::from_millis(
                read_env("AXSCAN_NAV_TIMEOUT_MS").unwrap_or(DEFAULT_NAV_TIMEOUT_MS),
            ),
            rate_max: read_env("AXSCAN_RATE_MAX").unwrap_or(DEFAULT_RATE_MAX),
            rate_window: Duration::from_secs(
                read_env("AXSCAN_RATE_WINDOW_SECS").unwrap_or(DEFAULT_RATE_WINDOW_SECS),
            ),
            settle: SettlePolicy {
                quiet: Duration::from_millis(
                    read_env("AXSCAN_SETTLE_QUIET_MS").unwrap_or(DEFAULT_SETTLE_QUIET_MS),
                ),
                max_inflight: read_env("AXSCAN_SETTLE_MAX_INFLIGHT")
                    .unwrap_or(DEFAULT_SETTLE_MAX_INFLIGHT),
            },
            viewport: std::env::var("AXSCAN_VIEWPORT")
                .ok()
                .and_then(|v| parse_viewport(&v))
                .unwrap_or(DEFAULT_VIEWPORT),
            chromium_path: std::env::var("AXSCAN_CHROMIUM_PATH").ok().map(PathBuf::from),
            axe_path: std::env::var("AXSCAN_AXE_PATH").ok().map(PathBuf::from),
        }
    }
}

fn read_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok()?.trim().parse().ok()
}

/// Parse `WIDTHxHEIGHT`, e.g. `1280x800`.
fn parse_viewport(raw: &str) -> Option<(u32, u32)> {
    let (w, h) = raw.trim().split_once(['x', 'X'])?;
    let width: u32 = w.trim().parse().ok()?;
    let height: u32 = h.trim().parse().ok()?;
    (width > 0 && height > 0).then_some((width, height))
}
