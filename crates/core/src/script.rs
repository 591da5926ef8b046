use serde::{Deserialize, Serialize};
use tracing::warn;
use url::Url;

use crate::error::{Error, Result};

/// How a script's match patterns are interpreted against a page locator.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    /// `*` wildcards, e.g. `*://a.example/*`.
    #[default]
    Glob,
    /// Raw regular expressions matched against the full locator string.
    Regex,
}

/// An authored automation script plus its page-matching rules.
///
/// Descriptors are authored externally and immutable for the duration of a
/// page session; the matcher only reads them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptDescriptor {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub source_code: String,
    #[serde(default)]
    pub match_patterns: Vec<String>,
    #[serde(default)]
    pub match_type: MatchType,
    /// Handler names the author declares for UI surfaces. Informational;
    /// the authoritative set is whatever the sandbox reports on execute.
    #[serde(default)]
    pub declared_actions: Vec<String>,
}

impl ScriptDescriptor {
    /// Whether any of this script's patterns match the given locator.
    /// A pattern that fails to compile is logged and skipped, it never
    /// poisons the other patterns.
    pub fn matches(&self, locator: &PageLocator) -> bool {
        self.match_patterns.iter().any(|pattern| {
            match compile_pattern(pattern, self.match_type) {
                Ok(re) => re.is_match(locator.as_str()),
                Err(e) => {
                    warn!(script = %self.id, pattern = %pattern, error = %e, "Skipping unparseable match pattern");
                    false
                }
            }
        })
    }
}

/// Normalized URL of the current page. Equality decides whether a
/// navigation actually changed anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLocator(String);

impl PageLocator {
    pub fn parse(raw: &str) -> Result<Self> {
        let url = Url::parse(raw)
            .map_err(|e| Error::Config(format!("Invalid page locator '{}': {}", raw, e)))?;
        Ok(Self(url.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PageLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn compile_pattern(pattern: &str, match_type: MatchType) -> Result<regex::Regex> {
    let source = match match_type {
        MatchType::Glob => glob_to_regex(pattern),
        MatchType::Regex => pattern.to_string(),
    };
    regex::Regex::new(&source).map_err(|e| Error::Config(format!("Bad pattern '{}': {}", pattern, e)))
}

/// Translate a `*`-wildcard pattern into an anchored regex. Everything but
/// `*` is matched literally.
fn glob_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    out.push('^');
    for ch in pattern.chars() {
        match ch {
            '*' => out.push_str(".*"),
            c => out.push_str(&regex::escape(&c.to_string())),
        }
    }
    out.push('$');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(patterns: &[&str], match_type: MatchType) -> ScriptDescriptor {
        ScriptDescriptor {
            id: "s1".into(),
            name: "Test".into(),
            source_code: String::new(),
            match_patterns: patterns.iter().map(|s| s.to_string()).collect(),
            match_type,
            declared_actions: vec![],
        }
    }

    #[test]
    fn test_glob_matches_scheme_and_path_wildcards() {
        let d = descriptor(&["*://a.example/*"], MatchType::Glob);
        let loc = PageLocator::parse("https://a.example/page").unwrap();
        assert!(d.matches(&loc));

        let other = PageLocator::parse("https://b.example/page").unwrap();
        assert!(!d.matches(&other));
    }

    #[test]
    fn test_glob_is_anchored() {
        let d = descriptor(&["https://a.example/admin"], MatchType::Glob);
        let loc = PageLocator::parse("https://a.example/admin/settings").unwrap();
        assert!(!d.matches(&loc));
    }

    #[test]
    fn test_glob_escapes_regex_metacharacters() {
        // Dots in hostnames are literal, not "any char".
        let d = descriptor(&["*://a.example/*"], MatchType::Glob);
        let loc = PageLocator::parse("https://axexample/page").unwrap();
        assert!(!d.matches(&loc));
    }

    #[test]
    fn test_regex_match_type() {
        let d = descriptor(&[r"^https://(a|b)\.example/"], MatchType::Regex);
        assert!(d.matches(&PageLocator::parse("https://b.example/x").unwrap()));
        assert!(!d.matches(&PageLocator::parse("https://c.example/x").unwrap()));
    }

    #[test]
    fn test_bad_pattern_is_skipped_not_fatal() {
        let d = descriptor(&["([unclosed", "*://a.example/*"], MatchType::Regex);
        // First pattern fails to compile; second is raw regex and matches.
        assert!(d.matches(&PageLocator::parse("https://a.example/p").unwrap()));
    }

    #[test]
    fn test_locator_equality_is_normalized() {
        let a = PageLocator::parse("https://a.example/page").unwrap();
        let b = PageLocator::parse("https://a.example/page").unwrap();
        assert_eq!(a, b);
        let c = PageLocator::parse("https://a.example/other").unwrap();
        assert_ne!(a, c);
    }
}
