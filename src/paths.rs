//! Well-known paths and naming for the overlay pipeline.
//!
//! The data model is filesystem-resident: a fixed overlay identifier, a set
//! of required relative paths inside the overlay tree, and deterministic
//! artifact names. This module defines WHERE things live; the other modules
//! decide what to do about them.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Fixed overlay identifier. Names the overlay tree root, the package
/// artifact, and the OCI image.
pub const OVERLAY_ID: &str = "ascent-gx10-overlay";

/// Suffix appended to the canonical output image name.
pub const IMAGE_SUFFIX: &str = "ascent";

/// Required directories, relative to the overlay root.
pub const REQUIRED_DIRS: &[&str] = &["install/firmware", "install/kernel-modules"];

/// Required files, relative to the overlay root.
pub const REQUIRED_FILES: &[&str] = &["overlay.yaml", "install/firmware/README.md"];

/// Optional module configuration files, relative to the overlay root.
pub const OPTIONAL_CONFIG_DIRS: &[&str] = &["files/etc/modprobe.d", "files/etc/modules-load.d"];

/// Paths used by the pipeline, all derived from one explicit root.
pub struct OverlayPaths {
    /// Pipeline root (contains the overlay tree and scripts/).
    pub root: PathBuf,
    /// Source overlay tree.
    pub overlay_dir: PathBuf,
    /// Where packaging and image assembly deposit artifacts.
    pub output_dir: PathBuf,
    /// External build procedures.
    pub scripts_dir: PathBuf,
}

impl OverlayPaths {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            overlay_dir: root.join(OVERLAY_ID),
            output_dir: root.join("output"),
            scripts_dir: root.join("scripts"),
        }
    }
}

/// Map ambient invocation context to an explicit pipeline root, once.
///
/// Everything below this call threads explicit paths; nothing else consults
/// the current directory. Resolution order:
/// 1. explicit CLI argument
/// 2. current directory, if it looks like a pipeline root
/// 3. `<cwd>/overlay`, the conventional checkout layout
pub fn resolve_root(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(root) = explicit {
        return Ok(root.to_path_buf());
    }

    let cwd = std::env::current_dir().context("resolving current directory")?;
    if is_pipeline_root(&cwd) {
        return Ok(cwd);
    }

    let nested = cwd.join("overlay");
    if is_pipeline_root(&nested) {
        return Ok(nested);
    }

    // Fall back to cwd; downstream stages report precise missing paths.
    Ok(cwd)
}

fn is_pipeline_root(dir: &Path) -> bool {
    dir.join(OVERLAY_ID).is_dir() || dir.join("scripts").is_dir()
}

/// `<overlay-id>-<version>.tar.gz`
pub fn package_file_name(version: &str) -> String {
    format!("{}-{}.tar.gz", OVERLAY_ID, version)
}

/// Canonical output image name: `<platform>-<arch>-<suffix>.img`
pub fn image_file_name(platform: &str, arch: &str) -> String {
    format!("{}-{}-{}.img", platform, arch, IMAGE_SUFFIX)
}

/// Find the overlay tree under a search root.
///
/// Checks the direct child first, then descends (extraction may nest the
/// tree one level down).
pub fn find_overlay_dir(search_root: &Path) -> Option<PathBuf> {
    let direct = search_root.join(OVERLAY_ID);
    if direct.is_dir() {
        return Some(direct);
    }

    WalkDir::new(search_root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .find(|entry| entry.file_type().is_dir() && entry.file_name() == OVERLAY_ID)
        .map(|entry| entry.into_path())
}
