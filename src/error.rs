//! Scan error taxonomy and its HTTP mapping.
//!
//! Every failure a single scan can hit is request-scoped: it is reported to
//! the caller and never takes the host process down. Internal causes are
//! logged but not leaked in responses.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanError {
    /// The submitted string is not a safe absolute http(s) URL.
    #[error("invalid scan target: {0}")]
    Validation(String),

    /// The caller exhausted its attempt window.
    #[error("rate limit exceeded, retry in {}s", .retry_after.as_secs().max(1))]
    RateLimited { retry_after: Duration },

    /// The browser process could not be spawned or configured.
    #[error("failed to launch browser: {0}")]
    BrowserLaunch(String),

    /// The page did not settle within the navigation bound.
    #[error("navigation did not settle within {}ms", .timeout.as_millis())]
    NavigationTimeout { timeout: Duration },

    /// Connection-level navigation failure (DNS, TLS, refused). HTTP error
    /// status pages are not navigation failures — they are audited.
    #[error("navigation failed: {0}")]
    Navigation(String),

    /// In-page execution of the rule engine failed.
    #[error("audit engine failed: {0}")]
    AuditEngine(String),

    /// Invariant breakage inside the orchestrator itself.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ScanError {
    /// Stable machine-readable kind, used in telemetry events and the scan log.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::RateLimited { .. } => "rate_limited",
            Self::BrowserLaunch(_) => "browser_launch",
            Self::NavigationTimeout { .. } => "navigation_timeout",
            Self::Navigation(_) => "navigation",
            Self::AuditEngine(_) => "audit_engine",
            Self::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for ScanError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ScanError::Validation(reason) => (
                StatusCode::BAD_REQUEST,
                "INVALID_TARGET",
                reason.clone(),
            ),
            ScanError::RateLimited { retry_after } => (
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMITED",
                format!(
                    "too many scan attempts; retry in {}s",
                    retry_after.as_secs().max(1)
                ),
            ),
            ScanError::NavigationTimeout { .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "NAVIGATION_TIMEOUT",
                "the page did not finish loading within the scan time limit".to_string(),
            ),
            ScanError::BrowserLaunch(cause)
            | ScanError::Navigation(cause)
            | ScanError::AuditEngine(cause)
            | ScanError::Internal(cause) => {
                tracing::error!(kind = self.kind(), cause = %cause, "scan failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "SCAN_FAILED",
                    "the scan could not be completed".to_string(),
                )
            }
        };

        let body = Json(serde_json::json!({
            "error": { "code": code, "message": message }
        }));

        let mut response = (status, body).into_response();
        if let ScanError::RateLimited { retry_after } = &self {
            response.headers_mut().insert(
                header::RETRY_AFTER,
                HeaderValue::from(retry_after.as_secs().max(1)),
            );
        }
        response
    }
}
