//! Shaping raw engine output into the stable audit result.
//!
//! Pure transformation: attaches the scanned URL and a timestamp, and maps
//! finding records into four categories with a consistent shape. A category
//! with nothing in it is an empty list, never absent.

use super::{RawFindings, RawNode, RawRule};
use crate::validate::NormalizedTarget;
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Severity classification the engine assigns to a failed rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    Minor,
    Moderate,
    Serious,
    Critical,
}

impl Impact {
    fn parse(raw: Option<&str>) -> Option<Self> {
        match raw {
            Some("minor") => Some(Self::Minor),
            Some("moderate") => Some(Self::Moderate),
            Some("serious") => Some(Self::Serious),
            Some("critical") => Some(Self::Critical),
            _ => None,
        }
    }
}

/// One rule-evaluation outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub rule_id: String,
    pub impact: Option<Impact>,
    pub description: String,
    pub help: String,
    pub help_url: String,
    pub tags: Vec<String>,
    pub nodes: Vec<NodeRef>,
}

/// Descriptor of one affected element.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRef {
    pub selector: String,
    pub html: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_summary: Option<String>,
}

/// Normalized audit output for one scanned page. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditResult {
    pub scanned_url: String,
    pub timestamp: String,
    pub violations: Vec<Finding>,
    pub passes: Vec<Finding>,
    pub incomplete: Vec<Finding>,
    pub inapplicable: Vec<Finding>,
}

/// Per-category tallies, for telemetry and display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FindingCounts {
    pub violations: usize,
    pub passes: usize,
    pub incomplete: usize,
    pub inapplicable: usize,
}

impl AuditResult {
    pub fn counts(&self) -> FindingCounts {
        FindingCounts {
            violations: self.violations.len(),
            passes: self.passes.len(),
            incomplete: self.incomplete.len(),
            inapplicable: self.inapplicable.len(),
        }
    }
}

/// Map raw engine output into an [`AuditResult`] for `target`.
pub fn normalize(target: &NormalizedTarget, raw: RawFindings) -> AuditResult {
    AuditResult {
        scanned_url: target.as_str().to_string(),
        timestamp: Utc::now().to_rfc3339(),
        violations: raw.violations.into_iter().map(finding).collect(),
        passes: raw.passes.into_iter().map(finding).collect(),
        incomplete: raw.incomplete.into_iter().map(finding).collect(),
        inapplicable: raw.inapplicable.into_iter().map(finding).collect(),
    }
}

fn finding(raw: RawRule) -> Finding {
    Finding {
        rule_id: raw.id,
        impact: Impact::parse(raw.impact.as_deref()),
        description: raw.description,
        help: raw.help,
        help_url: raw.help_url,
        tags: raw.tags,
        nodes: raw.nodes.into_iter().map(node_ref).collect(),
    }
}

fn node_ref(raw: RawNode) -> NodeRef {
    // Selector parts are plain strings except inside iframes/shadow roots,
    // where the engine nests them; render those compactly.
    let selector = raw
        .target
        .iter()
        .map(|part| match part.as_str() {
            Some(s) => s.to_string(),
            None => part.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ");
    NodeRef {
        selector,
        html: raw.html,
        failure_summary: raw.failure_summary,
    }
}
