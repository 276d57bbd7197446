//! Overlay packaging.
//!
//! Archive creation itself is delegated to an external build procedure
//! (`build-overlay.sh`). This module locates that procedure, makes sure it
//! is executable, invokes it with the version, and validates the declared
//! output. The script's exit code is propagated verbatim when it fails.

use anyhow::{Context, Result};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use crate::error::PipelineError;
use crate::paths::{self, OverlayPaths};
use crate::process::Cmd;
use crate::verify;

/// Build procedure file name under the scripts directory.
pub const BUILD_SCRIPT: &str = "build-overlay.sh";

/// Find the packaging script.
///
/// Resolution order:
/// 1. `<root>/scripts/build-overlay.sh`
/// 2. `<root>/../scripts/build-overlay.sh` (invoked from inside the tree)
pub fn find_build_script(root: &Path) -> Result<PathBuf> {
    let primary = root.join("scripts").join(BUILD_SCRIPT);
    if primary.is_file() {
        return Ok(primary);
    }

    let sibling = root
        .parent()
        .map(|parent| parent.join("scripts").join(BUILD_SCRIPT));
    if let Some(path) = sibling {
        if path.is_file() {
            return Ok(path);
        }
    }

    Err(PipelineError::NotFound(format!(
        "packaging script '{}' not found; looked in {} and its parent",
        BUILD_SCRIPT,
        root.join("scripts").display()
    ))
    .into())
}

/// Build the versioned package artifact and validate it.
///
/// Post-condition checks, in order: output exists at the deterministic
/// path, size > 0, archive opens and enumerates under gzip+tar.
pub fn build_package(root: &Path, version: &str) -> Result<PathBuf> {
    let script = find_build_script(root)?;
    make_executable(&script)?;

    println!("Building overlay package (version {})...", version);
    println!("  Script: {}", script.display());

    Cmd::new(script.to_string_lossy().to_string())
        .arg(version)
        .current_dir(root)
        .error_msg("overlay packaging script failed")
        .stream()?;

    let paths = OverlayPaths::new(root);
    let package = paths.output_dir.join(paths::package_file_name(version));
    validate_package(&package)?;

    let size = fs::metadata(&package)?.len();
    println!(
        "  Package: {} ({:.2} MB)",
        package.display(),
        size as f64 / 1024.0 / 1024.0
    );

    Ok(package)
}

/// Validate a package artifact: exists, non-empty, decodes as gzip+tar.
pub fn validate_package(package: &Path) -> Result<()> {
    if !package.is_file() {
        return Err(PipelineError::NotFound(format!(
            "expected package not produced: {}",
            package.display()
        ))
        .into());
    }

    let size = fs::metadata(package)
        .with_context(|| format!("reading metadata for '{}'", package.display()))?
        .len();
    if size == 0 {
        return Err(PipelineError::EmptyOutput(package.display().to_string()).into());
    }

    let members = verify::enumerate_archive(package)?;
    if members == 0 {
        return Err(PipelineError::Format(format!(
            "package '{}' contains no members",
            package.display()
        ))
        .into());
    }

    Ok(())
}

fn make_executable(path: &Path) -> Result<()> {
    let mut perms = fs::metadata(path)
        .with_context(|| format!("reading metadata for '{}'", path.display()))?
        .permissions();
    perms.set_mode(perms.mode() | 0o111);
    fs::set_permissions(path, perms)
        .with_context(|| format!("marking '{}' executable", path.display()))?;
    Ok(())
}
