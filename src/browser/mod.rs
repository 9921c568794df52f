//! Browser session management.
//!
//! One isolated browser process per scan, never pooled or reused: each scan
//! gets a fresh process with no cookies, cache, or DOM carried over from
//! any other scan. The [`SessionBackend`]/[`ScanSession`] traits abstract
//! over the engine (Chromium via chromiumoxide in production, fakes in
//! tests); [`SessionGuard`] makes release an ownership obligation that
//! survives every exit path, including panics.

pub mod chromium;

use crate::error::ScanError;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// How long to wait for a graceful browser close before killing the process.
pub(crate) const CLOSE_GRACE: Duration = Duration::from_secs(3);

/// Launch-time configuration for one session.
#[derive(Debug, Clone)]
pub struct BrowserSettings {
    /// Explicit browser executable; discovered via [`find_chromium`] if unset.
    pub executable: Option<PathBuf>,
    /// Fixed viewport (width, height).
    pub viewport: (u32, u32),
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            executable: None,
            viewport: (1280, 800),
        }
    }
}

/// Heuristic load-completion policy: the page counts as settled once no
/// more than `max_inflight` network requests have been open for `quiet`.
///
/// This is an approximation, not a contract — real pages hold long-lived
/// sockets, so a strict "zero connections" wait would never fire.
#[derive(Debug, Clone, Copy)]
pub struct SettlePolicy {
    pub quiet: Duration,
    pub max_inflight: usize,
}

impl Default for SettlePolicy {
    fn default() -> Self {
        Self {
            quiet: Duration::from_millis(500),
            max_inflight: 2,
        }
    }
}

/// A browser engine that can launch isolated scan sessions.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// Launch a new browser process with a single blank page.
    async fn launch(&self, settings: &BrowserSettings) -> Result<Box<dyn ScanSession>, ScanError>;
}

/// One isolated browser process plus its single page.
#[async_trait]
pub trait ScanSession: Send + Sync {
    /// Navigate the page and wait for the network to settle, all under a
    /// hard timeout. On timeout the caller must still release the session.
    async fn navigate(
        &mut self,
        url: &str,
        timeout: Duration,
        settle: SettlePolicy,
    ) -> Result<(), ScanError>;

    /// Execute a script in the page context, resolving promises, and return
    /// the result as JSON.
    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, ScanError>;

    /// Tear the session down, terminating the underlying process. Must not
    /// fail: teardown problems are logged, not propagated.
    async fn close(self: Box<Self>);
}

/// Launches sessions and tracks how many are outstanding.
pub struct SessionManager {
    backend: Arc<dyn SessionBackend>,
    settings: BrowserSettings,
    active: Arc<AtomicUsize>,
}

impl SessionManager {
    pub fn new(backend: Arc<dyn SessionBackend>, settings: BrowserSettings) -> Self {
        Self {
            backend,
            settings,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Launch one session for one scan. The returned guard owns it
    /// exclusively; dropping the guard without [`SessionGuard::release`]
    /// still terminates the process.
    pub async fn acquire(&self) -> Result<SessionGuard, ScanError> {
        let session = self.backend.launch(&self.settings).await?;
        self.active.fetch_add(1, Ordering::SeqCst);
        Ok(SessionGuard {
            session: Some(session),
            active: Arc::clone(&self.active),
        })
    }

    /// Number of sessions currently alive.
    pub fn active_sessions(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

/// Exclusive ownership of one live session.
///
/// `release` is idempotent; the second and later calls are no-ops. If the
/// guard is dropped while still holding a session (early return or panic),
/// the close is scheduled on the runtime so the process is not leaked.
pub struct SessionGuard {
    session: Option<Box<dyn ScanSession>>,
    active: Arc<AtomicUsize>,
}

impl SessionGuard {
    /// The live session, or an error if already released.
    pub fn session(&self) -> Result<&dyn ScanSession, ScanError> {
        self.session
            .as_deref()
            .ok_or_else(|| ScanError::Internal("session already released".to_string()))
    }

    /// Mutable access to the live session, or an error if already released.
    pub fn session_mut(&mut self) -> Result<&mut dyn ScanSession, ScanError> {
        match self.session.as_deref_mut() {
            Some(session) => Ok(session),
            None => Err(ScanError::Internal("session already released".to_string())),
        }
    }

    /// Terminate the session exactly once. Safe to call repeatedly.
    pub async fn release(&mut self) {
        if let Some(session) = self.session.take() {
            session.close().await;
            self.active.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            self.active.fetch_sub(1, Ordering::SeqCst);
            warn!("browser session dropped without release; scheduling kill");
            // Drop cannot await; hand the close to the runtime if one exists.
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    session.close().await;
                });
            }
        }
    }
}

/// Find the Chromium binary path.
pub fn find_chromium() -> Option<PathBuf> {
    // 1. AXSCAN_CHROMIUM_PATH env
    if let Ok(p) = std::env::var("AXSCAN_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. ~/.axscan/chromium/
    if let Some(home) = dirs::home_dir() {
        let candidates = if cfg!(target_os = "macos") {
            vec![
                home.join(".axscan/chromium/chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".axscan/chromium/chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".axscan/chromium/chrome"),
            ]
        } else {
            vec![
                home.join(".axscan/chromium/chrome-linux64/chrome"),
                home.join(".axscan/chromium/chrome"),
            ]
        };
        for c in candidates {
            if c.exists() {
                return Some(c);
            }
        }
    }

    // 3. System PATH
    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 4. Common macOS location
    if cfg!(target_os = "macos") {
        let common = PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}
