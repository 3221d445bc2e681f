//! URL policy applied before anything reaches the engine, and address-bar
//! text normalization.

use url::Url;
use webhost_config::NavigationConfig;

use crate::error::{EmbedError, Result};

/// Validation rules for URLs handed to the engine.
#[derive(Debug, Clone)]
pub struct UrlPolicy {
    max_length: usize,
    allowed_schemes: Vec<String>,
}

impl UrlPolicy {
    pub fn new(max_length: usize, allowed_schemes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            max_length,
            allowed_schemes: allowed_schemes
                .into_iter()
                .map(|s| s.into().to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn from_config(config: &NavigationConfig) -> Self {
        Self::new(config.max_url_length, config.allowed_schemes.iter().cloned())
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// Check a URL against the policy.
    ///
    /// The length check runs first so oversized input is never parsed.
    pub fn validate(&self, url: &str) -> Result<()> {
        let len = url.chars().count();
        if len > self.max_length {
            return Err(EmbedError::UrlTooLong {
                len,
                max: self.max_length,
            });
        }
        if url.trim().is_empty() {
            return Err(EmbedError::MalformedUrl("empty URL".into()));
        }

        let parsed = Url::parse(url).map_err(|e| EmbedError::MalformedUrl(format!("{}: {}", url, e)))?;
        if !self.allowed_schemes.iter().any(|s| s == parsed.scheme()) {
            return Err(EmbedError::DisallowedScheme(parsed.scheme().to_string()));
        }
        Ok(())
    }
}

impl Default for UrlPolicy {
    fn default() -> Self {
        Self::from_config(&NavigationConfig::default())
    }
}

/// Turn address-bar text into a URL.
///
/// - Keeps input that already carries a scheme
/// - Adds `https://` to things that look like a host
/// - Turns anything else into a search using `search_template` (`{}` is the query)
pub fn normalize_input(input: &str, search_template: &str) -> Option<String> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return None;
    }

    if trimmed.contains("://") || trimmed.starts_with("about:") {
        return Some(trimmed.to_string());
    }

    let looks_like_host = !trimmed.contains(char::is_whitespace)
        && (trimmed.contains('.')
            || trimmed.starts_with("localhost")
            || trimmed.starts_with('['));

    if looks_like_host {
        Some(format!("https://{}", trimmed))
    } else {
        Some(search_template.replace("{}", &urlencoding::encode(trimmed)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEARCH: &str = "https://www.google.com/search?q={}";

    #[test]
    fn accepts_allowed_schemes() {
        let policy = UrlPolicy::default();
        assert!(policy.validate("https://example.com/").is_ok());
        assert!(policy.validate("http://localhost:3000/a?b=c").is_ok());
        assert!(policy.validate("about:blank").is_ok());
    }

    #[test]
    fn rejects_oversized_before_parsing() {
        let policy = UrlPolicy::new(32, ["https"]);
        let url = format!("https://example.com/{}", "a".repeat(40));
        assert_eq!(
            policy.validate(&url),
            Err(EmbedError::UrlTooLong { len: url.len(), max: 32 })
        );
    }

    #[test]
    fn length_limit_is_inclusive() {
        let url = "https://example.com/";
        let policy = UrlPolicy::new(url.len(), ["https"]);
        assert!(policy.validate(url).is_ok());
    }

    #[test]
    fn rejects_malformed_and_disallowed() {
        let policy = UrlPolicy::default();
        assert!(matches!(policy.validate(""), Err(EmbedError::MalformedUrl(_))));
        assert!(matches!(policy.validate("not a url"), Err(EmbedError::MalformedUrl(_))));
        assert_eq!(
            policy.validate("javascript:alert('xss')"),
            Err(EmbedError::DisallowedScheme("javascript".into()))
        );
        assert_eq!(
            policy.validate("file:///etc/passwd"),
            Err(EmbedError::DisallowedScheme("file".into()))
        );
    }

    #[test]
    fn normalizes_address_bar_text() {
        assert_eq!(normalize_input("  ", SEARCH), None);
        assert_eq!(normalize_input("example.com", SEARCH).as_deref(), Some("https://example.com"));
        assert_eq!(
            normalize_input("http://example.com", SEARCH).as_deref(),
            Some("http://example.com")
        );
        assert_eq!(
            normalize_input("localhost:3000", SEARCH).as_deref(),
            Some("https://localhost:3000")
        );
        assert_eq!(
            normalize_input("rust borrow checker", SEARCH).as_deref(),
            Some("https://www.google.com/search?q=rust%20borrow%20checker")
        );
        assert_eq!(normalize_input("about:blank", SEARCH).as_deref(), Some("about:blank"));
    }
}
