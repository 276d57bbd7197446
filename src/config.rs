//! Pipeline configuration.
//!
//! Settings come from an optional `overlay.toml` at the pipeline root, with
//! environment variables taking precedence (the orchestrating CI passes
//! everything through the environment). Every field has a default, so a bare
//! checkout builds without any configuration at all.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Config file name at the pipeline root.
pub const CONFIG_FILE: &str = "overlay.toml";

/// Resolved pipeline settings.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Target architecture (e.g. "arm64").
    pub arch: String,
    /// Platform profile name (e.g. "metal").
    pub platform: String,
    /// Image builder version, normalized to a leading 'v'.
    pub builder_version: String,
    /// Name for the locally built OCI overlay image.
    pub overlay_name: String,
    /// Registry reference for a pre-built overlay image, if any.
    pub overlay_image: Option<String>,
    /// Treat missing required overlay components as fatal.
    ///
    /// Default is warn-only: large binary components may arrive through a
    /// separate large-file channel and might not be present yet.
    pub strict_verification: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigToml {
    arch: Option<String>,
    platform: Option<String>,
    builder_version: Option<String>,
    overlay_name: Option<String>,
    overlay_image: Option<String>,
    strict_verification: Option<bool>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            arch: "arm64".to_string(),
            platform: "metal".to_string(),
            builder_version: "v1.8.0".to_string(),
            overlay_name: crate::paths::OVERLAY_ID.to_string(),
            overlay_image: None,
            strict_verification: false,
        }
    }
}

impl PipelineConfig {
    /// Load configuration for a pipeline root: file first, then environment
    /// overrides (`ARCH`, `PLATFORM`, `BUILDER_VERSION`, `OVERLAY_NAME`,
    /// `OVERLAY_IMAGE`, `STRICT_VERIFICATION`).
    pub fn load(root: &Path) -> Result<Self> {
        let mut config = Self::default();

        let config_path = root.join(CONFIG_FILE);
        if config_path.is_file() {
            let raw = fs::read_to_string(&config_path)
                .with_context(|| format!("reading config '{}'", config_path.display()))?;
            let parsed: ConfigToml = toml::from_str(&raw)
                .with_context(|| format!("parsing config '{}'", config_path.display()))?;
            config.apply(parsed);
        }

        config.apply_env();
        config.builder_version = normalize_builder_version(&config.builder_version);
        Ok(config)
    }

    fn apply(&mut self, parsed: ConfigToml) {
        if let Some(arch) = parsed.arch {
            self.arch = arch;
        }
        if let Some(platform) = parsed.platform {
            self.platform = platform;
        }
        if let Some(version) = parsed.builder_version {
            self.builder_version = version;
        }
        if let Some(name) = parsed.overlay_name {
            self.overlay_name = name;
        }
        if parsed.overlay_image.is_some() {
            self.overlay_image = parsed.overlay_image;
        }
        if let Some(strict) = parsed.strict_verification {
            self.strict_verification = strict;
        }
    }

    fn apply_env(&mut self) {
        if let Some(arch) = env_nonempty("ARCH") {
            self.arch = arch;
        }
        if let Some(platform) = env_nonempty("PLATFORM") {
            self.platform = platform;
        }
        if let Some(version) = env_nonempty("BUILDER_VERSION") {
            self.builder_version = version;
        }
        if let Some(name) = env_nonempty("OVERLAY_NAME") {
            self.overlay_name = name;
        }
        if let Some(image) = env_nonempty("OVERLAY_IMAGE") {
            self.overlay_image = Some(image);
        }
        if let Some(strict) = env_nonempty("STRICT_VERIFICATION") {
            self.strict_verification = strict == "1" || strict.eq_ignore_ascii_case("true");
        }
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn normalize_builder_version(version: &str) -> String {
    if version.starts_with('v') {
        version.to_string()
    } else {
        format!("v{}", version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_without_config_file() {
        let temp = TempDir::new().unwrap();
        let config = PipelineConfig::load(temp.path()).unwrap();
        assert_eq!(config.arch, "arm64");
        assert_eq!(config.platform, "metal");
        assert_eq!(config.builder_version, "v1.8.0");
        assert!(!config.strict_verification);
    }

    #[test]
    fn test_config_file_overrides_defaults() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join(CONFIG_FILE),
            "arch = \"amd64\"\nbuilder_version = \"1.9.2\"\nstrict_verification = true\n",
        )
        .unwrap();

        let config = PipelineConfig::load(temp.path()).unwrap();
        assert_eq!(config.arch, "amd64");
        // Missing leading 'v' gets normalized.
        assert_eq!(config.builder_version, "v1.9.2");
        assert!(config.strict_verification);
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(CONFIG_FILE), "no_such_key = 1\n").unwrap();
        assert!(PipelineConfig::load(temp.path()).is_err());
    }

    #[test]
    fn test_builder_version_normalization() {
        assert_eq!(normalize_builder_version("1.8.0"), "v1.8.0");
        assert_eq!(normalize_builder_version("v1.8.0"), "v1.8.0");
    }
}
