//! Component health audit.
//!
//! A read-only check over an unpacked overlay working tree: reports presence
//! and counts of firmware and kernel-module files without ever failing the
//! pipeline. Absence is expected when large binary assets arrive through a
//! separate large-file channel, so the report carries a remediation hint
//! instead of an error.

use serde::Serialize;
use std::path::Path;

use crate::paths::OPTIONAL_CONFIG_DIRS;
use crate::verify::{count_files, count_firmware_files, count_kernel_modules};

/// Hint shown when components are absent.
pub const LARGE_FILE_HINT: &str =
    "components missing; pull large-file-tracked assets (e.g. `git lfs pull`) and re-run";

#[derive(Debug, Serialize)]
pub struct AuditReport {
    pub firmware_present: bool,
    pub firmware_file_count: usize,
    pub kernel_modules_present: bool,
    pub kernel_module_count: usize,
    /// Optional config directories with no .conf files, relative paths.
    pub missing_configs: Vec<String>,
    pub hint: Option<String>,
}

/// Audit an overlay working tree. Never mutates, never fails.
pub fn audit(overlay_root: &Path) -> AuditReport {
    let firmware_dir = overlay_root.join("install/firmware");
    let modules_dir = overlay_root.join("install/kernel-modules");

    let firmware_file_count = count_firmware_files(&firmware_dir);
    let kernel_module_count = count_kernel_modules(&modules_dir);
    let firmware_present = firmware_dir.is_dir() && firmware_file_count > 0;
    let kernel_modules_present = modules_dir.is_dir() && kernel_module_count > 0;

    let missing_configs: Vec<String> = OPTIONAL_CONFIG_DIRS
        .iter()
        .filter(|rel| count_files(&overlay_root.join(rel), Some(".conf")) == 0)
        .map(|rel| rel.to_string())
        .collect();

    let hint = if firmware_present && kernel_modules_present {
        None
    } else {
        Some(LARGE_FILE_HINT.to_string())
    };

    AuditReport {
        firmware_present,
        firmware_file_count,
        kernel_modules_present,
        kernel_module_count,
        missing_configs,
        hint,
    }
}

/// Print a report in the operator format.
pub fn print_report(report: &AuditReport) {
    println!("  Firmware files:  {}", report.firmware_file_count);
    println!("  Kernel modules:  {}", report.kernel_module_count);
    for rel in &report.missing_configs {
        eprintln!("  warning: no .conf files under {}", rel);
    }
    if let Some(hint) = &report.hint {
        eprintln!("  warning: {}", hint);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_audit_empty_tree_hints_not_fails() {
        let temp = TempDir::new().unwrap();

        let report = audit(temp.path());
        assert!(!report.firmware_present);
        assert!(!report.kernel_modules_present);
        assert_eq!(report.firmware_file_count, 0);
        assert_eq!(report.kernel_module_count, 0);
        assert_eq!(report.hint.as_deref(), Some(LARGE_FILE_HINT));
    }

    #[test]
    fn test_audit_populated_tree() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("install/firmware")).unwrap();
        fs::create_dir_all(root.join("install/kernel-modules")).unwrap();
        fs::create_dir_all(root.join("files/etc/modprobe.d")).unwrap();
        fs::create_dir_all(root.join("files/etc/modules-load.d")).unwrap();
        fs::write(root.join("install/firmware/gpu.bin"), "blob").unwrap();
        fs::write(root.join("install/kernel-modules/gpu.ko"), "ko").unwrap();
        fs::write(root.join("files/etc/modprobe.d/gpu.conf"), "options\n").unwrap();

        let report = audit(root);
        assert!(report.firmware_present);
        assert!(report.kernel_modules_present);
        assert!(report.hint.is_none());
        // modules-load.d has no .conf yet
        assert_eq!(report.missing_configs, vec!["files/etc/modules-load.d"]);
    }
}
