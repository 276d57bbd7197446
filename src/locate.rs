//! Package artifact discovery.
//!
//! Finds the overlay package among candidate output directories. Artifact
//! download systems sometimes nest outputs under an extra subdirectory, so
//! each directory is tried directly first and then searched recursively.

use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::PipelineError;

/// Locate a `*.tar.gz` package across candidate directories in priority
/// order.
///
/// Multiple matches at one level never fail: the lexicographically first is
/// taken and the discarded candidates are named in a warning, since CI
/// re-runs may leave stale artifacts behind. A total miss fails with a
/// diagnostic listing every candidate directory's contents.
pub fn locate_package(candidate_dirs: &[PathBuf]) -> Result<PathBuf> {
    for dir in candidate_dirs {
        if !dir.is_dir() {
            continue;
        }

        if let Some(package) = pick_first(direct_matches(dir)) {
            return Ok(package);
        }
        if let Some(package) = pick_first(recursive_matches(dir)) {
            return Ok(package);
        }
    }

    Err(PipelineError::NotFound(miss_diagnostic(candidate_dirs)).into())
}

fn direct_matches(dir: &Path) -> Vec<PathBuf> {
    let mut matches: Vec<PathBuf> = fs::read_dir(dir)
        .into_iter()
        .flatten()
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_package(path))
        .collect();
    matches.sort();
    matches
}

fn recursive_matches(dir: &Path) -> Vec<PathBuf> {
    let mut matches: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(2)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file() && is_package(entry.path()))
        .map(|entry| entry.into_path())
        .collect();
    matches.sort();
    matches
}

fn is_package(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.ends_with(".tar.gz"))
        .unwrap_or(false)
}

fn pick_first(matches: Vec<PathBuf>) -> Option<PathBuf> {
    let mut iter = matches.into_iter();
    let first = iter.next()?;
    let discarded: Vec<String> = iter
        .map(|path| {
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string())
        })
        .collect();
    if !discarded.is_empty() {
        eprintln!(
            "warning: multiple packages found, using {}; ignored: {}",
            first.display(),
            discarded.join(", ")
        );
    }
    Some(first)
}

/// Build the total-miss diagnostic. Lists each candidate directory's
/// entries; subdirectories show their first few children so operators can
/// see where an artifact download actually landed.
fn miss_diagnostic(candidate_dirs: &[PathBuf]) -> String {
    let mut lines = vec!["no .tar.gz package found".to_string()];

    for dir in candidate_dirs {
        if !dir.exists() {
            lines.push(format!("  {} (does not exist)", dir.display()));
            continue;
        }

        lines.push(format!("  {}:", dir.display()));
        let mut entries: Vec<PathBuf> = fs::read_dir(dir)
            .into_iter()
            .flatten()
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .collect();
        entries.sort();

        if entries.is_empty() {
            lines.push("    (empty)".to_string());
            continue;
        }

        for entry in entries {
            let name = entry
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if entry.is_dir() {
                let mut children: Vec<String> = fs::read_dir(&entry)
                    .into_iter()
                    .flatten()
                    .filter_map(|child| child.ok())
                    .map(|child| child.file_name().to_string_lossy().into_owned())
                    .collect();
                children.sort();
                let total = children.len();
                children.truncate(5);
                lines.push(format!("    {}/ ({} items)", name, total));
                for child in children {
                    lines.push(format!("      {}", child));
                }
                if total > 5 {
                    lines.push(format!("      ... and {} more", total - 5));
                }
            } else {
                lines.push(format!("    {}", name));
            }
        }
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_second_candidate_wins_when_first_empty() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a");
        let b = temp.path().join("b");
        fs::create_dir_all(&a).unwrap();
        fs::create_dir_all(&b).unwrap();
        fs::write(b.join("x.tar.gz"), "data").unwrap();

        let found = locate_package(&[a, b.clone()]).unwrap();
        assert_eq!(found, b.join("x.tar.gz"));
    }

    #[test]
    fn test_multiple_matches_deterministic() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("b.tar.gz"), "data").unwrap();
        fs::write(temp.path().join("a.tar.gz"), "data").unwrap();

        let found = locate_package(&[temp.path().to_path_buf()]).unwrap();
        assert_eq!(found, temp.path().join("a.tar.gz"));
    }

    #[test]
    fn test_nested_artifact_layout() {
        let temp = TempDir::new().unwrap();
        let nested = temp.path().join("artifact-v3");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("pkg.tar.gz"), "data").unwrap();

        let found = locate_package(&[temp.path().to_path_buf()]).unwrap();
        assert_eq!(found, nested.join("pkg.tar.gz"));
    }

    #[test]
    fn test_direct_match_preferred_over_nested() {
        let temp = TempDir::new().unwrap();
        let nested = temp.path().join("sub");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("deep.tar.gz"), "data").unwrap();
        fs::write(temp.path().join("top.tar.gz"), "data").unwrap();

        let found = locate_package(&[temp.path().to_path_buf()]).unwrap();
        assert_eq!(found, temp.path().join("top.tar.gz"));
    }

    #[test]
    fn test_total_miss_lists_contents() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("out");
        let sub = dir.join("downloads");
        fs::create_dir_all(&sub).unwrap();
        fs::write(dir.join("notes.txt"), "n").unwrap();
        fs::write(sub.join("stray.bin"), "s").unwrap();

        let err = locate_package(&[dir.clone(), temp.path().join("missing")]).unwrap_err();
        let msg = format!("{}", err.downcast_ref::<PipelineError>().unwrap());
        assert!(msg.contains("notes.txt"));
        assert!(msg.contains("downloads/ (1 items)"));
        assert!(msg.contains("stray.bin"));
        assert!(msg.contains("does not exist"));
    }
}
