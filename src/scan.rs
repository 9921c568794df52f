//! The scan orchestrator.
//!
//! One pipeline per request: validate → rate-limit → acquire session →
//! navigate → analyze → normalize → release → telemetry. Admission control
//! rejects before any browser process exists; once a session is acquired it
//! is released on every path out, with the guard's drop as the backstop for
//! panics. Telemetry is best-effort and optional — a missing bus changes
//! nothing about scan behavior.

use crate::browser::{SessionGuard, SessionManager, SettlePolicy};
use crate::engine::normalize::{normalize, AuditResult};
use crate::engine::AxeRunner;
use crate::error::ScanError;
use crate::events::{now_timestamp, EventBus, ScanEvent};
use crate::ratelimit::{Decision, RateLimiter};
use crate::validate::{validate, NormalizedTarget};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Everything a scan needs, injected once at startup.
pub struct Scanner {
    sessions: SessionManager,
    limiter: RateLimiter,
    engine: AxeRunner,
    nav_timeout: Duration,
    settle: SettlePolicy,
    telemetry: Option<EventBus>,
}

impl Scanner {
    pub fn new(
        sessions: SessionManager,
        limiter: RateLimiter,
        engine: AxeRunner,
        nav_timeout: Duration,
        settle: SettlePolicy,
    ) -> Self {
        Self {
            sessions,
            limiter,
            engine,
            nav_timeout,
            settle,
            telemetry: None,
        }
    }

    /// Attach a telemetry bus. Without one, scans run identically and emit
    /// nothing.
    pub fn with_telemetry(mut self, bus: EventBus) -> Self {
        self.telemetry = Some(bus);
        self
    }

    /// Number of browser sessions currently alive.
    pub fn active_sessions(&self) -> usize {
        self.sessions.active_sessions()
    }

    /// Drop rate windows whose reset time has passed. Housekeeping only;
    /// admission decisions never depend on it.
    pub fn evict_rate_windows(&self) {
        self.limiter.evict_expired();
    }

    /// Run one full scan of `raw_url` on behalf of `caller`.
    pub async fn scan(&self, raw_url: &str, caller: &str) -> Result<AuditResult, ScanError> {
        let target = match validate(raw_url) {
            Ok(target) => target,
            Err(e) => {
                self.emit(ScanEvent::ScanRejected {
                    caller: caller.to_string(),
                    reason: e.kind().to_string(),
                });
                return Err(e);
            }
        };

        if let Decision::Limited { retry_after } = self.limiter.try_acquire(caller) {
            info!(caller, url = %target, "scan rejected: rate limited");
            self.emit(ScanEvent::ScanRejected {
                caller: caller.to_string(),
                reason: "rate_limited".to_string(),
            });
            return Err(ScanError::RateLimited { retry_after });
        }

        let started = Instant::now();
        self.emit(ScanEvent::ScanStarted {
            url: target.as_str().to_string(),
            caller: caller.to_string(),
            timestamp: now_timestamp(),
        });

        let result = match self.sessions.acquire().await {
            Ok(mut guard) => {
                let outcome = self.audit_page(&mut guard, &target).await;
                // Resource safety over error reporting: release on every path.
                guard.release().await;
                outcome
            }
            Err(e) => Err(e),
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(audit) => {
                let counts = audit.counts();
                info!(
                    url = %target,
                    violations = counts.violations,
                    passes = counts.passes,
                    incomplete = counts.incomplete,
                    inapplicable = counts.inapplicable,
                    elapsed_ms,
                    "scan completed"
                );
                self.emit(ScanEvent::ScanCompleted {
                    url: target.as_str().to_string(),
                    violation_count: counts.violations,
                    pass_count: counts.passes,
                    incomplete_count: counts.incomplete,
                    inapplicable_count: counts.inapplicable,
                    elapsed_ms,
                });
            }
            Err(e) => {
                warn!(url = %target, kind = e.kind(), elapsed_ms, "scan failed: {e}");
                self.emit(ScanEvent::ScanFailed {
                    url: target.as_str().to_string(),
                    error_kind: e.kind().to_string(),
                    elapsed_ms,
                });
            }
        }
        result
    }

    /// The fallible stages inside an acquired session. Lives apart from
    /// [`scan`](Self::scan) so no `?` here can skip the release there.
    async fn audit_page(
        &self,
        guard: &mut SessionGuard,
        target: &NormalizedTarget,
    ) -> Result<AuditResult, ScanError> {
        guard
            .session_mut()?
            .navigate(target.as_str(), self.nav_timeout, self.settle)
            .await?;
        let raw = self.engine.analyze(guard.session()?).await?;
        Ok(normalize(target, raw))
    }

    fn emit(&self, event: ScanEvent) {
        if let Some(bus) = &self.telemetry {
            bus.emit(event);
        }
    }
}
