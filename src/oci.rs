//! OCI wrapping of the overlay tree.
//!
//! The image builder can consume the overlay as a container image whose
//! single filesystem layer is the overlay tree rooted at `/overlay`. Two
//! mutually exclusive resolution paths per call:
//!
//! - a registry reference was supplied: inspect locally, pull if absent;
//!   pull failure is fatal with no further fallback
//! - no reference: build a minimal copy-only image from the tree under a
//!   local tag, from a throwaway build context removed on all exit paths

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

use crate::error::PipelineError;
use crate::fsutil::copy_dir_recursive;
use crate::process::Cmd;

/// Container runtime binary.
pub const RUNTIME: &str = "docker";

/// Ensure an overlay image is available, returning the reference to use.
pub fn ensure_image(
    overlay_root: &Path,
    name: &str,
    registry_ref: Option<&str>,
) -> Result<String> {
    match registry_ref {
        Some(reference) => ensure_registry_image(reference),
        None => build_local_image(overlay_root, name),
    }
}

/// Inspect-then-pull path for an externally supplied reference.
fn ensure_registry_image(reference: &str) -> Result<String> {
    let inspect = Cmd::new(RUNTIME)
        .args(["image", "inspect", reference])
        .allow_fail()
        .run()?;
    if inspect.success() {
        println!("  Overlay image present locally: {}", reference);
        return Ok(reference.to_string());
    }

    println!("  Pulling overlay image: {}", reference);
    let pull = Cmd::new(RUNTIME)
        .args(["pull", reference])
        .allow_fail()
        .run()?;
    if !pull.success() {
        return Err(PipelineError::ImageUnavailable(format!(
            "pull of '{}' failed with exit code {}\n{}",
            reference,
            pull.code,
            pull.stderr.trim()
        ))
        .into());
    }

    Ok(reference.to_string())
}

/// Build a minimal single-layer image from the overlay tree.
///
/// The build context is a scoped temp directory containing only the
/// Dockerfile and a copy of the tree; it is removed whether the build
/// succeeds, fails, or is interrupted.
fn build_local_image(overlay_root: &Path, name: &str) -> Result<String> {
    if !overlay_root.is_dir() {
        return Err(PipelineError::NotFound(format!(
            "overlay directory not found: {}",
            overlay_root.display()
        ))
        .into());
    }

    let tag = format!("local/{}:latest", name);
    let context = TempDir::new().context("creating image build context")?;

    copy_dir_recursive(overlay_root, &context.path().join("overlay"))
        .context("staging overlay tree into build context")?;
    fs::write(
        context.path().join("Dockerfile"),
        "FROM scratch\nCOPY overlay /overlay\n",
    )
    .context("writing build context Dockerfile")?;

    println!("  Building overlay image: {}", tag);
    let build = Cmd::new(RUNTIME)
        .args(["build", "-t"])
        .arg(tag.as_str())
        .arg_path(context.path())
        .allow_fail()
        .run()?;
    if !build.success() {
        // Surface the builder's diagnostic stream verbatim.
        eprintln!("{}", build.stderr.trim_end());
        return Err(PipelineError::ToolInvocation {
            tool: format!("{} build", RUNTIME),
            code: build.code,
        })
        .context(format!("building overlay image '{}'", tag));
    }

    Ok(tag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_local_build_requires_overlay_dir() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("no-overlay");

        let err = ensure_image(&missing, "test-overlay", None).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::NotFound(_))
        ));
    }
}
