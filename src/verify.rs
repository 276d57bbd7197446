//! Overlay structural verification.
//!
//! Structural validity means the required directories and files exist;
//! content correctness is out of scope. Verification never fails on missing
//! components — it returns a report and the caller decides. Default pipeline
//! policy is warn-only because large binary components may be fetched
//! through a separate channel and might not be present yet.

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use serde::Serialize;
use std::fs::{self, File};
use std::path::Path;
use tempfile::TempDir;
use walkdir::WalkDir;

use crate::error::PipelineError;
use crate::paths::{self, OPTIONAL_CONFIG_DIRS, REQUIRED_DIRS, REQUIRED_FILES};

/// Outcome of verifying an overlay tree.
#[derive(Debug, Serialize)]
pub struct VerificationReport {
    pub required_dirs_ok: bool,
    pub required_files_ok: bool,
    pub firmware_file_count: usize,
    pub kernel_module_count: usize,
    /// Missing required entries, relative to the overlay root.
    pub missing: Vec<String>,
    /// Advisory findings: empty required directories, absent optional
    /// config files.
    pub warnings: Vec<String>,
}

impl VerificationReport {
    /// Both required directories and required files are present.
    pub fn is_structurally_valid(&self) -> bool {
        self.required_dirs_ok && self.required_files_ok
    }
}

/// Verify an extracted overlay tree. Never fails; missing entries are
/// recorded by path relative to the overlay root so reports are stable
/// across extraction locations.
pub fn verify_tree(overlay_root: &Path) -> VerificationReport {
    let mut missing = Vec::new();
    let mut warnings = Vec::new();

    let mut required_dirs_ok = true;
    for rel in REQUIRED_DIRS {
        let dir = overlay_root.join(rel);
        if !dir.is_dir() {
            required_dirs_ok = false;
            missing.push(rel.to_string());
        } else if count_files(&dir, None) == 0 {
            // Present-but-empty is a distinct state from missing entirely.
            warnings.push(format!("{} exists but is empty", rel));
        }
    }

    let mut required_files_ok = true;
    for rel in REQUIRED_FILES {
        if !overlay_root.join(rel).is_file() {
            required_files_ok = false;
            missing.push(rel.to_string());
        }
    }

    for rel in OPTIONAL_CONFIG_DIRS {
        let dir = overlay_root.join(rel);
        if !dir.is_dir() || count_files(&dir, Some(".conf")) == 0 {
            warnings.push(format!("no .conf files under {}", rel));
        }
    }

    let firmware_file_count = count_firmware_files(&overlay_root.join("install/firmware"));
    let kernel_module_count = count_kernel_modules(&overlay_root.join("install/kernel-modules"));

    VerificationReport {
        required_dirs_ok,
        required_files_ok,
        firmware_file_count,
        kernel_module_count,
        missing,
        warnings,
    }
}

/// Count regular files under a directory, optionally filtered by a name
/// suffix. Missing directories count zero.
pub fn count_files(dir: &Path, suffix: Option<&str>) -> usize {
    if !dir.is_dir() {
        return 0;
    }
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| match suffix {
            Some(suffix) => entry.file_name().to_string_lossy().ends_with(suffix),
            None => true,
        })
        .count()
}

/// Count firmware payload files. The README is documentation, not payload.
pub fn count_firmware_files(dir: &Path) -> usize {
    if !dir.is_dir() {
        return 0;
    }
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.file_name() != "README.md")
        .count()
}

/// Count `*.ko` and `*.ko.zst` kernel modules.
pub fn count_kernel_modules(dir: &Path) -> usize {
    count_files(dir, Some(".ko")) + count_files(dir, Some(".ko.zst"))
}

/// Extract a gzip-compressed tar archive, validating that it enumerates
/// cleanly first.
pub fn extract_archive(package: &Path, dest: &Path) -> Result<()> {
    enumerate_archive(package)?;

    let file = File::open(package)
        .with_context(|| format!("opening package '{}'", package.display()))?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));
    fs::create_dir_all(dest).with_context(|| format!("creating '{}'", dest.display()))?;
    archive.unpack(dest).map_err(|e| {
        anyhow::Error::new(PipelineError::Format(format!(
            "extracting '{}': {}",
            package.display(),
            e
        )))
    })?;
    Ok(())
}

/// Open the archive and walk its member list without extracting.
///
/// Returns the member count. A decode failure is a `Format` error.
pub fn enumerate_archive(package: &Path) -> Result<usize> {
    let file = File::open(package)
        .with_context(|| format!("opening package '{}'", package.display()))?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));
    let mut count = 0usize;
    let entries = archive.entries().map_err(|e| {
        PipelineError::Format(format!("reading '{}': {}", package.display(), e))
    })?;
    for entry in entries {
        entry.map_err(|e| {
            PipelineError::Format(format!("enumerating '{}': {}", package.display(), e))
        })?;
        count += 1;
    }
    Ok(count)
}

/// Extract a package into a scoped temporary directory and verify the
/// overlay tree inside it. The temp dir is removed on all exit paths.
pub fn verify_package(package: &Path) -> Result<VerificationReport> {
    let temp = TempDir::new().context("creating extraction directory")?;
    extract_archive(package, temp.path())?;

    let overlay_root = paths::find_overlay_dir(temp.path()).ok_or_else(|| {
        PipelineError::NotFound(format!(
            "overlay directory '{}' not present in package '{}'",
            paths::OVERLAY_ID,
            package.display()
        ))
    })?;

    Ok(verify_tree(&overlay_root))
}

/// Print a report in the operator format.
pub fn print_report(report: &VerificationReport) {
    println!("  Required directories: {}", status(report.required_dirs_ok));
    println!("  Required files:       {}", status(report.required_files_ok));
    println!("  Firmware files:       {}", report.firmware_file_count);
    println!("  Kernel modules:       {}", report.kernel_module_count);
    for path in &report.missing {
        eprintln!("  missing: {}", path);
    }
    for warning in &report.warnings {
        eprintln!("  warning: {}", warning);
    }
}

fn status(ok: bool) -> &'static str {
    if ok {
        "ok"
    } else {
        "MISSING"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::OVERLAY_ID;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// Build a minimal valid overlay tree, returning its root.
    pub(crate) fn write_overlay_tree(base: &Path) -> PathBuf {
        let root = base.join(OVERLAY_ID);
        fs::create_dir_all(root.join("install/firmware")).unwrap();
        fs::create_dir_all(root.join("install/kernel-modules")).unwrap();
        fs::write(root.join("overlay.yaml"), "name: ascent-gx10\n").unwrap();
        fs::write(root.join("install/firmware/README.md"), "# firmware\n").unwrap();
        fs::write(root.join("install/firmware/gpu.bin"), "blob").unwrap();
        fs::write(root.join("install/kernel-modules/a.ko"), "ko").unwrap();
        fs::write(root.join("install/kernel-modules/b.ko.zst"), "ko").unwrap();
        root
    }

    /// Pack a directory into a tar.gz the way the external packager would.
    pub(crate) fn write_package(tree_base: &Path, package: &Path) {
        let file = File::create(package).unwrap();
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = tar::Builder::new(encoder);
        builder
            .append_dir_all(OVERLAY_ID, tree_base.join(OVERLAY_ID))
            .unwrap();
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn test_valid_tree_verifies() {
        let temp = TempDir::new().unwrap();
        let root = write_overlay_tree(temp.path());

        let report = verify_tree(&root);
        assert!(report.required_dirs_ok);
        assert!(report.required_files_ok);
        assert!(report.is_structurally_valid());
        assert_eq!(report.firmware_file_count, 1); // gpu.bin; README is not payload
        assert_eq!(report.kernel_module_count, 2);
        assert!(report.missing.is_empty());
    }

    #[test]
    fn test_missing_modules_dir_reported_not_raised() {
        let temp = TempDir::new().unwrap();
        let root = write_overlay_tree(temp.path());
        fs::remove_dir_all(root.join("install/kernel-modules")).unwrap();

        let report = verify_tree(&root);
        assert!(!report.required_dirs_ok);
        assert!(report.missing.contains(&"install/kernel-modules".to_string()));
        // Relative paths only, stable across extraction locations.
        assert!(report.missing.iter().all(|m| !m.starts_with('/')));
    }

    #[test]
    fn test_empty_required_dir_is_warning_not_missing() {
        let temp = TempDir::new().unwrap();
        let root = write_overlay_tree(temp.path());
        fs::remove_file(root.join("install/kernel-modules/a.ko")).unwrap();
        fs::remove_file(root.join("install/kernel-modules/b.ko.zst")).unwrap();

        let report = verify_tree(&root);
        assert!(report.required_dirs_ok);
        assert_eq!(report.kernel_module_count, 0);
        assert!(report
            .warnings
            .iter()
            .any(|w| w.contains("install/kernel-modules") && w.contains("empty")));
    }

    #[test]
    fn test_package_round_trip() {
        let temp = TempDir::new().unwrap();
        write_overlay_tree(temp.path());
        let package = temp.path().join("pkg.tar.gz");
        write_package(temp.path(), &package);

        let report = verify_package(&package).unwrap();
        assert!(report.is_structurally_valid());
        assert_eq!(report.firmware_file_count, 1);
        assert_eq!(report.kernel_module_count, 2);
        assert!(report.missing.is_empty());
    }

    #[test]
    fn test_enumerate_counts_members() {
        let temp = TempDir::new().unwrap();
        write_overlay_tree(temp.path());
        let package = temp.path().join("pkg.tar.gz");
        write_package(temp.path(), &package);

        assert!(enumerate_archive(&package).unwrap() > 0);
    }

    #[test]
    fn test_corrupt_archive_is_format_error() {
        let temp = TempDir::new().unwrap();
        let package = temp.path().join("bad.tar.gz");
        fs::write(&package, "this is not a gzip stream").unwrap();

        let err = enumerate_archive(&package).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::Format(_))
        ));
    }

    #[test]
    fn test_package_without_overlay_dir_is_not_found() {
        let temp = TempDir::new().unwrap();
        let stray = temp.path().join("stray");
        fs::create_dir_all(&stray).unwrap();
        fs::write(stray.join("file.txt"), "x").unwrap();

        let package = temp.path().join("pkg.tar.gz");
        let file = File::create(&package).unwrap();
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = tar::Builder::new(encoder);
        builder.append_dir_all("stray", &stray).unwrap();
        builder.into_inner().unwrap().finish().unwrap();

        let err = verify_package(&package).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::NotFound(_))
        ));
    }
}
