//! Overlay version resolution.
//!
//! Priority: explicit value > version parsed from a package filename >
//! default `1.0.0`. Validation is advisory: a malformed but non-empty value
//! is passed through unchanged with a warning, preserving caller intent.

use regex::Regex;
use std::sync::OnceLock;

/// Version used when nothing else is supplied.
pub const DEFAULT_VERSION: &str = "1.0.0";

fn semver_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d+\.\d+\.\d+(-.*)?$").unwrap())
}

fn filename_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"overlay-(\d+\.\d+\.\d+(?:-.*)?)\.tar\.gz").unwrap())
}

/// Check a version string against the semantic pattern `X.Y.Z[-suffix]`.
pub fn is_semantic_version(version: &str) -> bool {
    semver_pattern().is_match(version)
}

/// Extract a version from a package filename like
/// `ascent-gx10-overlay-1.2.3-rc1.tar.gz`.
pub fn extract_version_from_filename(filename: &str) -> Option<String> {
    filename_pattern()
        .captures(filename)
        .map(|caps| caps[1].to_string())
}

/// Resolve the overlay version.
///
/// Returns the value unchanged even when it fails the semantic pattern;
/// the mismatch is a warning, not an error.
pub fn resolve_version(explicit: Option<&str>, filename: Option<&str>) -> String {
    let version = match explicit.map(str::trim).filter(|v| !v.is_empty()) {
        Some(value) => value.to_string(),
        None => filename
            .and_then(extract_version_from_filename)
            .unwrap_or_else(|| DEFAULT_VERSION.to_string()),
    };

    if !is_semantic_version(&version) {
        eprintln!(
            "warning: version '{}' does not match the X.Y.Z pattern; using it anyway",
            version
        );
    }

    version
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_wins() {
        let v = resolve_version(Some("2.1.0"), Some("ascent-gx10-overlay-9.9.9.tar.gz"));
        assert_eq!(v, "2.1.0");
    }

    #[test]
    fn test_explicit_trimmed() {
        assert_eq!(resolve_version(Some("  1.2.3 "), None), "1.2.3");
    }

    #[test]
    fn test_empty_explicit_falls_through() {
        let v = resolve_version(Some("   "), Some("ascent-gx10-overlay-3.0.1.tar.gz"));
        assert_eq!(v, "3.0.1");
    }

    #[test]
    fn test_filename_extraction() {
        assert_eq!(
            extract_version_from_filename("ascent-gx10-overlay-1.0.0.tar.gz"),
            Some("1.0.0".to_string())
        );
        assert_eq!(
            extract_version_from_filename("ascent-gx10-overlay-2.0.0-rc1.tar.gz"),
            Some("2.0.0-rc1".to_string())
        );
        assert_eq!(extract_version_from_filename("random.tar.gz"), None);
    }

    #[test]
    fn test_default_when_nothing_supplied() {
        assert_eq!(resolve_version(None, None), DEFAULT_VERSION);
        assert_eq!(resolve_version(None, Some("noise.txt")), DEFAULT_VERSION);
    }

    #[test]
    fn test_malformed_passes_through() {
        // Pass-through is idempotent: the value comes back unchanged.
        assert_eq!(resolve_version(Some("not-a-version"), None), "not-a-version");
    }

    #[test]
    fn test_semantic_pattern() {
        assert!(is_semantic_version("1.0.0"));
        assert!(is_semantic_version("10.2.33-beta.1"));
        assert!(!is_semantic_version("1.0"));
        assert!(!is_semantic_version("v1.0.0"));
    }
}
