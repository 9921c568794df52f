//! Orchestrator integration tests.
//!
//! Drives the full scan pipeline against a counting fake backend: no
//! Chromium involved, every session-lifecycle property observable.

use assert_json_diff::assert_json_include;
use async_trait::async_trait;
use axscan::browser::{
    BrowserSettings, ScanSession, SessionBackend, SessionManager, SettlePolicy,
};
use axscan::engine::{AxeRunner, RuleConfig};
use axscan::error::ScanError;
use axscan::events::{EventBus, ScanEvent};
use axscan::ratelimit::RateLimiter;
use axscan::scan::Scanner;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// What the fake session should do on navigate.
#[derive(Clone, Copy, PartialEq)]
enum NavBehavior {
    Succeed,
    Timeout,
    ConnectionError,
}

/// Counters shared between the fake backend and the assertions.
#[derive(Default)]
struct Counters {
    launched: AtomicUsize,
    outstanding: AtomicUsize,
    closes: AtomicUsize,
}

struct FakeBackend {
    counters: Arc<Counters>,
    fail_launch: bool,
    nav: NavBehavior,
    fail_eval: bool,
    findings: serde_json::Value,
}

impl FakeBackend {
    fn healthy(counters: Arc<Counters>, findings: serde_json::Value) -> Self {
        Self {
            counters,
            fail_launch: false,
            nav: NavBehavior::Succeed,
            fail_eval: false,
            findings,
        }
    }
}

struct FakeSession {
    counters: Arc<Counters>,
    nav: NavBehavior,
    fail_eval: bool,
    findings: serde_json::Value,
}

#[async_trait]
impl SessionBackend for FakeBackend {
    async fn launch(&self, _settings: &BrowserSettings) -> Result<Box<dyn ScanSession>, ScanError> {
        if self.fail_launch {
            return Err(ScanError::BrowserLaunch("spawn failed".to_string()));
        }
        self.counters.launched.fetch_add(1, Ordering::SeqCst);
        self.counters.outstanding.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            counters: Arc::clone(&self.counters),
            nav: self.nav,
            fail_eval: self.fail_eval,
            findings: self.findings.clone(),
        }))
    }
}

#[async_trait]
impl ScanSession for FakeSession {
    async fn navigate(
        &mut self,
        _url: &str,
        timeout: Duration,
        _settle: SettlePolicy,
    ) -> Result<(), ScanError> {
        match self.nav {
            NavBehavior::Succeed => Ok(()),
            NavBehavior::Timeout => Err(ScanError::NavigationTimeout { timeout }),
            NavBehavior::ConnectionError => {
                Err(ScanError::Navigation("net::ERR_NAME_NOT_RESOLVED".to_string()))
            }
        }
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, ScanError> {
        if self.fail_eval {
            return Err(ScanError::AuditEngine("axe is not defined".to_string()));
        }
        if script.starts_with("axe.run") {
            Ok(self.findings.clone())
        } else {
            // Bundle injection completes with the trailing marker value.
            Ok(json!(true))
        }
    }

    async fn close(self: Box<Self>) {
        self.counters.outstanding.fetch_sub(1, Ordering::SeqCst);
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
    }
}

fn rule(id: &str, impact: &str) -> serde_json::Value {
    json!({
        "id": id,
        "impact": impact,
        "description": format!("{id} description"),
        "help": format!("{id} help"),
        "helpUrl": format!("https://dequeuniversity.com/rules/axe/4.10/{id}"),
        "tags": ["wcag2a"],
        "nodes": [{ "target": ["#main"], "html": "<div id=\"main\">" }]
    })
}

fn rules(count: usize, prefix: &str, impact: &str) -> Vec<serde_json::Value> {
    (0..count)
        .map(|i| rule(&format!("{prefix}-{i}"), impact))
        .collect()
}

/// Engine output with 3 violations, 10 passes, 1 incomplete, 0 inapplicable.
fn sample_findings() -> serde_json::Value {
    json!({
        "violations": rules(3, "violation", "serious"),
        "passes": rules(10, "pass", "minor"),
        "incomplete": rules(1, "incomplete", "moderate"),
        "inapplicable": []
    })
}

fn scanner_with(backend: FakeBackend, rate_max: u32) -> Scanner {
    let sessions = SessionManager::new(Arc::new(backend), BrowserSettings::default());
    let limiter = RateLimiter::new(rate_max, Duration::from_secs(60));
    let engine = AxeRunner::from_source("/* axe stub */".to_string(), RuleConfig::default());
    Scanner::new(
        sessions,
        limiter,
        engine,
        Duration::from_secs(30),
        SettlePolicy::default(),
    )
}

fn drain(rx: &mut tokio::sync::broadcast::Receiver<ScanEvent>) -> Vec<ScanEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn validation_precedes_resource_allocation() {
    let counters = Arc::new(Counters::default());
    let scanner = scanner_with(
        FakeBackend::healthy(Arc::clone(&counters), sample_findings()),
        6,
    );

    for input in ["", "not-a-url", "ftp://example.com", "javascript:alert(1)"] {
        let err = scanner.scan(input, "10.0.0.1").await.unwrap_err();
        assert_eq!(err.kind(), "validation", "input: {input:?}");
    }

    assert_eq!(counters.launched.load(Ordering::SeqCst), 0);
    assert_eq!(counters.outstanding.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn successful_scan_normalizes_counts_and_releases() {
    let counters = Arc::new(Counters::default());
    let bus = EventBus::new(64);
    let mut rx = bus.subscribe();
    let scanner = scanner_with(
        FakeBackend::healthy(Arc::clone(&counters), sample_findings()),
        6,
    )
    .with_telemetry(bus);

    let result = scanner
        .scan("http://example.com/#section", "10.0.0.1")
        .await
        .unwrap();

    // Fragment stripped before anything downstream saw the target.
    assert_eq!(result.scanned_url, "http://example.com/");
    assert_eq!(result.violations.len(), 3);
    assert_eq!(result.passes.len(), 10);
    assert_eq!(result.incomplete.len(), 1);
    assert_eq!(result.inapplicable.len(), 0);

    // Stable response shape, including finding fields.
    assert_json_include!(
        actual: serde_json::to_value(&result).unwrap(),
        expected: json!({
            "scanned_url": "http://example.com/",
            "violations": [{
                "rule_id": "violation-0",
                "impact": "serious",
                "nodes": [{ "selector": "#main" }]
            }],
            "inapplicable": []
        })
    );

    // Session released exactly once.
    assert_eq!(counters.launched.load(Ordering::SeqCst), 1);
    assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
    assert_eq!(counters.outstanding.load(Ordering::SeqCst), 0);
    assert_eq!(scanner.active_sessions(), 0);

    // Telemetry carries the same counts.
    let events = drain(&mut rx);
    let completed = events
        .iter()
        .find_map(|e| match e {
            ScanEvent::ScanCompleted {
                violation_count,
                pass_count,
                incomplete_count,
                inapplicable_count,
                ..
            } => Some((
                *violation_count,
                *pass_count,
                *incomplete_count,
                *inapplicable_count,
            )),
            _ => None,
        })
        .expect("ScanCompleted event emitted");
    assert_eq!(completed, (3, 10, 1, 0));
}

#[tokio::test]
async fn rate_limit_rejects_before_launching() {
    let counters = Arc::new(Counters::default());
    let scanner = scanner_with(
        FakeBackend::healthy(Arc::clone(&counters), sample_findings()),
        2,
    );

    scanner.scan("http://example.com/", "10.0.0.1").await.unwrap();
    scanner.scan("http://example.com/", "10.0.0.1").await.unwrap();
    let err = scanner
        .scan("http://example.com/", "10.0.0.1")
        .await
        .unwrap_err();

    match err {
        ScanError::RateLimited { retry_after } => {
            assert!(retry_after <= Duration::from_secs(60));
        }
        other => panic!("expected RateLimited, got {other:?}"),
    }

    // Only the two admitted scans ever launched a browser.
    assert_eq!(counters.launched.load(Ordering::SeqCst), 2);
    assert_eq!(counters.outstanding.load(Ordering::SeqCst), 0);

    // A different caller is unaffected.
    scanner.scan("http://example.com/", "10.0.0.2").await.unwrap();
}

#[tokio::test]
async fn navigation_timeout_still_releases_session() {
    let counters = Arc::new(Counters::default());
    let backend = FakeBackend {
        counters: Arc::clone(&counters),
        fail_launch: false,
        nav: NavBehavior::Timeout,
        fail_eval: false,
        findings: sample_findings(),
    };
    let bus = EventBus::new(64);
    let mut rx = bus.subscribe();
    let scanner = scanner_with(backend, 6).with_telemetry(bus);

    let err = scanner
        .scan("http://slow.example/", "10.0.0.1")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "navigation_timeout");

    assert_eq!(counters.launched.load(Ordering::SeqCst), 1);
    assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
    assert_eq!(counters.outstanding.load(Ordering::SeqCst), 0);

    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(
        e,
        ScanEvent::ScanFailed { error_kind, .. } if error_kind == "navigation_timeout"
    )));
}

#[tokio::test]
async fn connection_error_still_releases_session() {
    let counters = Arc::new(Counters::default());
    let backend = FakeBackend {
        counters: Arc::clone(&counters),
        fail_launch: false,
        nav: NavBehavior::ConnectionError,
        fail_eval: false,
        findings: sample_findings(),
    };
    let scanner = scanner_with(backend, 6);

    let err = scanner
        .scan("http://nxdomain.example/", "10.0.0.1")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "navigation");
    assert_eq!(counters.outstanding.load(Ordering::SeqCst), 0);
    assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn engine_failure_still_releases_session() {
    let counters = Arc::new(Counters::default());
    let backend = FakeBackend {
        counters: Arc::clone(&counters),
        fail_launch: false,
        nav: NavBehavior::Succeed,
        fail_eval: true,
        findings: sample_findings(),
    };
    let scanner = scanner_with(backend, 6);

    let err = scanner
        .scan("http://example.com/", "10.0.0.1")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "audit_engine");
    assert_eq!(counters.outstanding.load(Ordering::SeqCst), 0);
    assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn launch_failure_is_request_scoped() {
    let counters = Arc::new(Counters::default());
    let backend = FakeBackend {
        counters: Arc::clone(&counters),
        fail_launch: true,
        nav: NavBehavior::Succeed,
        fail_eval: false,
        findings: sample_findings(),
    };
    let bus = EventBus::new(64);
    let mut rx = bus.subscribe();
    let scanner = scanner_with(backend, 6).with_telemetry(bus);

    let err = scanner
        .scan("http://example.com/", "10.0.0.1")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "browser_launch");
    assert_eq!(counters.outstanding.load(Ordering::SeqCst), 0);

    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(
        e,
        ScanEvent::ScanFailed { error_kind, .. } if error_kind == "browser_launch"
    )));
}

#[tokio::test]
async fn scans_run_without_telemetry() {
    let counters = Arc::new(Counters::default());
    let scanner = scanner_with(
        FakeBackend::healthy(Arc::clone(&counters), sample_findings()),
        6,
    );

    let result = scanner.scan("http://example.com/", "10.0.0.1").await.unwrap();
    assert_eq!(result.violations.len(), 3);
    assert_eq!(counters.outstanding.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn concurrent_scans_are_independent() {
    let counters = Arc::new(Counters::default());
    let scanner = Arc::new(scanner_with(
        FakeBackend::healthy(Arc::clone(&counters), sample_findings()),
        32,
    ));

    let mut handles = Vec::new();
    for i in 0..8 {
        let scanner = Arc::clone(&scanner);
        handles.push(tokio::spawn(async move {
            scanner
                .scan(&format!("http://example.com/page-{i}"), "10.0.0.1")
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(counters.launched.load(Ordering::SeqCst), 8);
    assert_eq!(counters.closes.load(Ordering::SeqCst), 8);
    assert_eq!(counters.outstanding.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn rejected_callers_do_not_consume_sessions() {
    let counters = Arc::new(Counters::default());
    let scanner = scanner_with(
        FakeBackend::healthy(Arc::clone(&counters), sample_findings()),
        6,
    );

    // Exhaust the window.
    for _ in 0..6 {
        scanner.scan("http://example.com/", "1.2.3.4").await.unwrap();
    }
    for _ in 0..5 {
        let err = scanner
            .scan("http://example.com/", "1.2.3.4")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "rate_limited");
    }

    assert_eq!(counters.launched.load(Ordering::SeqCst), 6);
    assert_eq!(counters.outstanding.load(Ordering::SeqCst), 0);
}
