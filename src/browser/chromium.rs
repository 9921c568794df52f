//! Chromium session backend using chromiumoxide.
//!
//! Each session is its own child process, launched headless with flags
//! suitable for constrained/containerized hosts, holding exactly one page.
//! Navigation waits for the network-settled heuristic under a hard timeout;
//! teardown tries a clean CDP close with a short grace period, then kills
//! the process outright.

use super::{BrowserSettings, ScanSession, SessionBackend, SettlePolicy, CLOSE_GRACE};
use crate::error::ScanError;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent, RequestId,
};
use chromiumoxide::cdp::browser_protocol::page::SetBypassCspParams;
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Launches one Chromium child process per session.
pub struct ChromiumBackend;

#[async_trait]
impl SessionBackend for ChromiumBackend {
    async fn launch(&self, settings: &BrowserSettings) -> Result<Box<dyn ScanSession>, ScanError> {
        let executable = settings
            .executable
            .clone()
            .or_else(super::find_chromium)
            .ok_or_else(|| {
                ScanError::BrowserLaunch(
                    "Chromium not found; set AXSCAN_CHROMIUM_PATH or install Chrome".to_string(),
                )
            })?;

        let (width, height) = settings.viewport;
        let config = BrowserConfig::builder()
            .chrome_executable(executable)
            .viewport(Viewport {
                width,
                height,
                device_scale_factor: None,
                emulating_mobile: false,
                is_landscape: false,
                has_touch: false,
            })
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-background-networking")
            .arg(format!("--window-size={width},{height}"))
            .build()
            .map_err(|e| ScanError::BrowserLaunch(format!("failed to build browser config: {e}")))?;

        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| ScanError::BrowserLaunch(format!("failed to launch Chromium: {e}")))?;

        // Drive CDP messages until the browser goes away.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                terminate(&mut browser).await;
                handler_task.abort();
                return Err(ScanError::BrowserLaunch(format!(
                    "failed to open page: {e}"
                )));
            }
        };

        // CSP on the audited page would block engine injection.
        if let Err(e) = page.execute(SetBypassCspParams::new(true)).await {
            warn!("could not bypass CSP: {e}");
        }

        Ok(Box::new(ChromiumSession {
            browser,
            page,
            handler_task,
        }))
    }
}

/// One live Chromium process and its single page.
pub struct ChromiumSession {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
}

impl ChromiumSession {
    async fn navigate_inner(&self, url: &str, settle: SettlePolicy) -> Result<(), ScanError> {
        self.page
            .execute(EnableParams::default())
            .await
            .map_err(|e| ScanError::Navigation(format!("could not enable network tracking: {e}")))?;

        let mut started = self
            .page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .map_err(|e| ScanError::Navigation(format!("could not attach network listener: {e}")))?;
        let mut finished = self
            .page
            .event_listener::<EventLoadingFinished>()
            .await
            .map_err(|e| ScanError::Navigation(format!("could not attach network listener: {e}")))?;
        let mut failed = self
            .page
            .event_listener::<EventLoadingFailed>()
            .await
            .map_err(|e| ScanError::Navigation(format!("could not attach network listener: {e}")))?;

        // Connection-level failures (DNS, TLS, refused) error here. An HTTP
        // error status still yields a document and is audited like any other.
        self.page
            .goto(url)
            .await
            .map_err(|e| ScanError::Navigation(format!("{e}")))?;

        let mut inflight: HashSet<RequestId> = HashSet::new();
        let mut last_activity = Instant::now();

        loop {
            if inflight.len() <= settle.max_inflight
                && last_activity.elapsed() >= settle.quiet
            {
                break;
            }

            let wait = settle
                .quiet
                .saturating_sub(last_activity.elapsed())
                .max(Duration::from_millis(25));

            tokio::select! {
                Some(event) = started.next() => {
                    inflight.insert(event.request_id.clone());
                    last_activity = Instant::now();
                }
                Some(event) = finished.next() => {
                    if inflight.remove(&event.request_id) {
                        last_activity = Instant::now();
                    }
                }
                Some(event) = failed.next() => {
                    if inflight.remove(&event.request_id) {
                        last_activity = Instant::now();
                    }
                }
                _ = tokio::time::sleep(wait) => {}
            }
        }

        debug!(
            url,
            remaining = inflight.len(),
            "navigation settled"
        );
        Ok(())
    }
}

#[async_trait]
impl ScanSession for ChromiumSession {
    async fn navigate(
        &mut self,
        url: &str,
        timeout: Duration,
        settle: SettlePolicy,
    ) -> Result<(), ScanError> {
        match tokio::time::timeout(timeout, self.navigate_inner(url, settle)).await {
            Ok(result) => result,
            Err(_) => Err(ScanError::NavigationTimeout { timeout }),
        }
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, ScanError> {
        let params = EvaluateParams::builder()
            .expression(script)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(|e| ScanError::AuditEngine(format!("bad evaluate params: {e}")))?;

        let evaluation = self
            .page
            .evaluate(params)
            .await
            .map_err(|e| ScanError::AuditEngine(format!("in-page execution failed: {e}")))?;

        evaluation
            .into_value()
            .map_err(|e| ScanError::AuditEngine(format!("result not serializable: {e}")))
    }

    async fn close(mut self: Box<Self>) {
        terminate(&mut self.browser).await;
        self.handler_task.abort();
    }
}

/// Terminate a browser process: clean CDP close with a grace period, then
/// kill. The child is gone when this returns.
async fn terminate(browser: &mut Browser) {
    match tokio::time::timeout(CLOSE_GRACE, browser.close()).await {
        Ok(Ok(_)) => {
            let _ = tokio::time::timeout(CLOSE_GRACE, browser.wait()).await;
        }
        _ => {
            warn!("browser did not close cleanly; killing process");
            if let Some(Err(e)) = browser.kill().await {
                warn!("failed to kill browser process: {e}");
            }
        }
    }
}
