//! `axscan scan <url>` — one-shot scan from the command line.

use crate::browser::{chromium::ChromiumBackend, BrowserSettings, SessionManager};
use crate::config::Config;
use crate::engine::normalize::AuditResult;
use crate::engine::{AxeRunner, RuleConfig};
use crate::ratelimit::RateLimiter;
use crate::scan::Scanner;
use anyhow::{Context, Result};
use std::sync::Arc;

/// Run one scan and print the result.
pub async fn run(url: &str, json: bool) -> Result<()> {
    let config = Config::from_env();

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
    );

    let result = scanner.scan(url, "cli").await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_summary(&result);
    }
    Ok(())
}

fn print_summary(result: &AuditResult) {
    let counts = result.counts();
    println!("Scanned {}", result.scanned_url);
    println!(
        "  {} violations, {} passes, {} need review, {} inapplicable",
        counts.violations, counts.passes, counts.incomplete, counts.inapplicable
    );

    if result.violations.is_empty() {
        println!("\n[OK] No violations found.");
        return;
    }

    println!();
    for finding in &result.violations {
        let impact = finding
            .impact
            .map(|i| format!("{i:?}").to_lowercase())
            .unwrap_or_else(|| "unknown".to_string());
        println!("[!!] {} ({impact})", finding.rule_id);
        println!("     {}", finding.help);
        println!("     {}", finding.help_url);
        for node in finding.nodes.iter().take(3) {
            println!("       - {}", node.selector);
        }
        if finding.nodes.len() > 3 {
            println!("       … and {} more elements", finding.nodes.len() - 3);
        }
    }
}
