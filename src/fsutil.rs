//! Filesystem helpers shared by packaging and image wrapping.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Recursively copy a directory, preserving symlinks instead of following
/// them. Firmware trees routinely contain symlink farms, so `fs::copy`
/// alone is not enough.
pub fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<()> {
    if !dst.exists() {
        fs::create_dir_all(dst).with_context(|| format!("creating '{}'", dst.display()))?;
    }

    for entry in
        fs::read_dir(src).with_context(|| format!("reading directory '{}'", src.display()))?
    {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());
        let file_type = entry.file_type()?;

        if file_type.is_symlink() {
            let target = fs::read_link(&src_path)?;
            if dst_path.exists() || dst_path.is_symlink() {
                fs::remove_file(&dst_path)?;
            }
            std::os::unix::fs::symlink(&target, &dst_path)
                .with_context(|| format!("linking '{}'", dst_path.display()))?;
        } else if file_type.is_dir() {
            copy_dir_recursive(&src_path, &dst_path)?;
        } else {
            fs::copy(&src_path, &dst_path)
                .with_context(|| format!("copying '{}'", src_path.display()))?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_copy_preserves_structure_and_symlinks() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        let dst = temp.path().join("dst");
        fs::create_dir_all(src.join("nested")).unwrap();
        fs::write(src.join("nested/file.bin"), "data").unwrap();
        std::os::unix::fs::symlink("nested/file.bin", src.join("link")).unwrap();

        copy_dir_recursive(&src, &dst).unwrap();

        assert_eq!(fs::read_to_string(dst.join("nested/file.bin")).unwrap(), "data");
        assert!(dst.join("link").is_symlink());
        assert_eq!(
            fs::read_link(dst.join("link")).unwrap(),
            Path::new("nested/file.bin")
        );
    }
}
