//! Accessibility rule engine adapter.
//!
//! Resolves the axe-core bundle (env override → `~/.axscan/axe.min.js` →
//! one-time download, cached), injects it into the loaded page, executes
//! `axe.run` with the configured rule set, and parses the engine's four
//! finding partitions. Any in-page failure surfaces as an audit-engine
//! error and never corrupts the session — release still proceeds.

pub mod normalize;

use crate::browser::ScanSession;
use crate::error::ScanError;
use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Pinned engine version fetched on demand.
pub const AXE_VERSION: &str = "4.10.2";

/// Default download location for the engine bundle.
const AXE_CDN_URL: &str =
    "https://cdnjs.cloudflare.com/ajax/libs/axe-core/4.10.2/axe.min.js";

/// Cached bundle file name under `~/.axscan/`.
const AXE_BUNDLE_FILE: &str = "axe.min.js";

/// Rule set configuration passed to the engine.
#[derive(Debug, Clone)]
pub struct RuleConfig {
    /// Rules enabled on top of the engine defaults.
    pub enable: Vec<String>,
    /// Rules disabled from the defaults.
    pub disable: Vec<String>,
}

impl Default for RuleConfig {
    fn default() -> Self {
        // target-size is off by default in the engine but is a WCAG 2.2
        // success criterion worth reporting on.
        Self {
            enable: vec!["target-size".to_string()],
            disable: Vec::new(),
        }
    }
}

impl RuleConfig {
    /// Build the `axe.run` options object.
    fn to_run_options(&self) -> serde_json::Value {
        let mut rules = serde_json::Map::new();
        for id in &self.enable {
            rules.insert(id.clone(), serde_json::json!({ "enabled": true }));
        }
        for id in &self.disable {
            rules.insert(id.clone(), serde_json::json!({ "enabled": false }));
        }
        serde_json::json!({ "rules": rules })
    }
}

/// Raw engine output: the four partitions, exactly as the engine reports
/// them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawFindings {
    #[serde(default)]
    pub violations: Vec<RawRule>,
    #[serde(default)]
    pub passes: Vec<RawRule>,
    #[serde(default)]
    pub incomplete: Vec<RawRule>,
    #[serde(default)]
    pub inapplicable: Vec<RawRule>,
}

/// One rule's outcome as reported by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRule {
    pub id: String,
    #[serde(default)]
    pub impact: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub help: String,
    #[serde(default)]
    pub help_url: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub nodes: Vec<RawNode>,
}

/// One affected element as reported by the engine. Selectors are strings,
/// or arrays of strings when the element sits inside an iframe or shadow
/// root, so they stay untyped here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawNode {
    #[serde(default)]
    pub target: Vec<serde_json::Value>,
    #[serde(default)]
    pub html: String,
    #[serde(default)]
    pub failure_summary: Option<String>,
}

/// The engine adapter: holds the bundle source and rule configuration.
pub struct AxeRunner {
    source: String,
    rules: RuleConfig,
}

impl AxeRunner {
    /// Build a runner from an already-loaded bundle. Tests use this with a
    /// stub source.
    pub fn from_source(source: String, rules: RuleConfig) -> Self {
        Self { source, rules }
    }

    /// Resolve and load the bundle, downloading it on first use.
    pub async fn load(path_override: Option<&Path>, rules: RuleConfig) -> Result<Self> {
        let path = match path_override {
            Some(p) => p.to_path_buf(),
            None => match find_axe_bundle() {
                Some(p) => p,
                None => install_bundle(false).await?,
            },
        };
        let source = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read axe bundle: {}", path.display()))?;
        Ok(Self::from_source(source, rules))
    }

    /// Execute the engine against the currently loaded document.
    pub async fn analyze(&self, page: &dyn ScanSession) -> Result<RawFindings, ScanError> {
        // The bundle's own completion value is undefined; the trailing
        // expression gives the evaluation something to return.
        let inject = format!("{}\n;true", self.source);
        page.evaluate(&inject).await?;

        let run = format!("axe.run(document, {})", self.rules.to_run_options());
        let value = page.evaluate(&run).await?;

        serde_json::from_value(value)
            .map_err(|e| ScanError::AuditEngine(format!("unexpected engine output: {e}")))
    }
}

/// Resolve an already-present bundle: `AXSCAN_AXE_PATH` → `~/.axscan/`.
pub fn find_axe_bundle() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("AXSCAN_AXE_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }
    let cached = default_bundle_path()?;
    cached.exists().then_some(cached)
}

/// Where the downloaded bundle is cached.
pub fn default_bundle_path() -> Option<PathBuf> {
    Some(dirs::home_dir()?.join(".axscan").join(AXE_BUNDLE_FILE))
}

/// Download the engine bundle into `~/.axscan/`, unless already present.
pub async fn install_bundle(force: bool) -> Result<PathBuf> {
    let path = default_bundle_path().context("no home directory")?;
    if path.exists() && !force {
        return Ok(path);
    }
    let url = std::env::var("AXSCAN_AXE_URL").unwrap_or_else(|_| AXE_CDN_URL.to_string());
    install_bundle_to(&path, &url).await?;
    Ok(path)
}

/// Fetch `url` and cache it at `path`.
async fn install_bundle_to(path: &Path, url: &str) -> Result<()> {
    info!(url, "downloading axe-core bundle");
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(60))
        .user_agent(concat!("axscan/", env!("CARGO_PKG_VERSION")))
        .build()?;

    let response = client
        .get(url)
        .send()
        .await
        .context("failed to download axe-core bundle")?;
    ensure!(
        response.status().is_success(),
        "bundle download failed: HTTP {}",
        response.status()
    );

    let body = response.text().await?;
    ensure!(
        body.contains("axe"),
        "downloaded file does not look like the axe-core bundle"
    );

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, &body)
        .with_context(|| format!("failed to write bundle: {}", path.display()))?;
    info!(path = %path.display(), bytes = body.len(), "axe-core bundle cached");
    Ok(())
}
