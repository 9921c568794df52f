//! Scan target validation.
//!
//! A target is accepted only if it parses as an absolute http(s) URL. The
//! fragment is stripped before anything downstream sees the target: it has
//! no effect on the rendered document and must not fork telemetry.

use crate::error::ScanError;
use url::Url;

/// A validated, canonical scan target. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedTarget(Url);

impl NormalizedTarget {
    /// The canonical URL string handed to the browser.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Host portion, for logging.
    pub fn host(&self) -> Option<&str> {
        self.0.host_str()
    }
}

impl std::fmt::Display for NormalizedTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0.as_str())
    }
}

/// Validate a caller-submitted string into a [`NormalizedTarget`].
///
/// Pure function; no resources are touched here.
pub fn validate(input: &str) -> Result<NormalizedTarget, ScanError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ScanError::Validation("no URL provided".to_string()));
    }

    let mut url = Url::parse(trimmed)
        .map_err(|e| ScanError::Validation(format!("not an absolute URL: {e}")))?;

    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(ScanError::Validation(format!(
                "scheme must be http or https, got '{other}'"
            )));
        }
    }

    url.set_fragment(None);
    Ok(NormalizedTarget(url))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_http_url() {
        let target = validate("http://example.com/page").unwrap();
        assert_eq!(target.as_str(), "http://example.com/page");
        assert_eq!(target.host(), Some("example.com"));
    }

    #[test]
    fn strips_fragment() {
        let target = validate("http://example.com/#section").unwrap();
        assert_eq!(target.as_str(), "http://example.com/");
    }

    #[test]
    fn keeps_query_string() {
        let target = validate("https://example.com/search?q=a11y#results").unwrap();
        assert_eq!(target.as_str(), "https://example.com/search?q=a11y");
    }

    #[test]
    fn rejects_empty_and_whitespace() {
        assert!(matches!(validate(""), Err(ScanError::Validation(_))));
        assert!(matches!(validate("   \t"), Err(ScanError::Validation(_))));
    }

    #[test]
    fn rejects_relative_input() {
        let err = validate("not-a-url").unwrap_err();
        match err {
            ScanError::Validation(reason) => assert!(reason.contains("absolute")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn rejects_non_http_schemes() {
        for input in ["ftp://example.com", "javascript:alert(1)", "file:///etc/passwd"] {
            let err = validate(input).unwrap_err();
            assert_eq!(err.kind(), "validation", "input: {input}");
        }
    }

    #[test]
    fn trims_surrounding_whitespace() {
        let target = validate("  https://example.com/  ").unwrap();
        assert_eq!(target.as_str(), "https://example.com/");
    }
}
