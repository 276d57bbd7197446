use std::path::PathBuf;

use anyhow::{bail, Result};
use overlay_builder::assemble::{self, OverlaySource};
use overlay_builder::error::exit_code_for;
use overlay_builder::handoff::Handoff;
use overlay_builder::{audit, locate, oci, package, paths, preflight, verify, version};
use overlay_builder::{OverlayPaths, PipelineConfig};

fn usage() -> &'static str {
    "Usage:\n  overlay-builder [--root <dir>] resolve-version [<version>]\n  overlay-builder [--root <dir>] build-package [<version>]\n  overlay-builder [--root <dir>] locate-package\n  overlay-builder [--root <dir>] verify-package [--json]\n  overlay-builder [--root <dir>] extract-package\n  overlay-builder [--root <dir>] audit [--json]\n  overlay-builder [--root <dir>] oci-image\n  overlay-builder [--root <dir>] build-image"
}

fn main() {
    match run() {
        Ok(()) => {}
        Err(err) => {
            eprintln!("error: {:#}", err);
            std::process::exit(exit_code_for(&err));
        }
    }
}

fn run() -> Result<()> {
    let mut args: Vec<String> = std::env::args().skip(1).collect();

    let mut explicit_root = None;
    if args.len() >= 2 && args[0] == "--root" {
        explicit_root = Some(PathBuf::from(args.remove(1)));
        args.remove(0);
    }
    let root = paths::resolve_root(explicit_root.as_deref())?;

    match args
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .as_slice()
    {
        ["resolve-version"] => resolve_version(&root, None),
        ["resolve-version", value] => resolve_version(&root, Some(*value)),
        ["build-package"] => build_package(&root, None),
        ["build-package", value] => build_package(&root, Some(*value)),
        ["locate-package"] => locate_package(&root),
        ["verify-package"] => verify_package(&root, false),
        ["verify-package", "--json"] => verify_package(&root, true),
        ["extract-package"] => extract_package(&root),
        ["audit"] => run_audit(&root, false),
        ["audit", "--json"] => run_audit(&root, true),
        ["oci-image"] => oci_image(&root),
        ["build-image"] => build_image(&root),
        _ => bail!(usage()),
    }
}

fn candidate_output_dirs(root: &std::path::Path) -> Vec<PathBuf> {
    let mut dirs = vec![OverlayPaths::new(root).output_dir];
    if let Some(parent) = root.parent() {
        dirs.push(parent.join("output"));
    }
    dirs
}

/// Resolve the version from an explicit value, the env, or a located
/// package filename, and publish it.
fn resolve_version(root: &std::path::Path, explicit: Option<&str>) -> Result<()> {
    let env_version = std::env::var("OVERLAY_VERSION").ok();
    let explicit = explicit.or(env_version.as_deref());

    let filename = locate::locate_package(&candidate_output_dirs(root))
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()));

    let resolved = version::resolve_version(explicit, filename.as_deref());
    Handoff::from_env().publish("version", &resolved)
}

fn build_package(root: &std::path::Path, explicit: Option<&str>) -> Result<()> {
    preflight::check_required_tools(preflight::REQUIRED_TOOLS)?;

    let env_version = std::env::var("OVERLAY_VERSION").ok();
    let resolved = version::resolve_version(explicit.or(env_version.as_deref()), None);

    let artifact = package::build_package(root, &resolved)?;

    let handoff = Handoff::from_env();
    handoff.publish("version", &resolved)?;
    handoff.publish("package", &artifact.display().to_string())
}

fn locate_package(root: &std::path::Path) -> Result<()> {
    let found = locate::locate_package(&candidate_output_dirs(root))?;
    Handoff::from_env().publish("package", &found.display().to_string())
}

fn verify_package(root: &std::path::Path, json: bool) -> Result<()> {
    let config = PipelineConfig::load(root)?;
    let found = locate::locate_package(&candidate_output_dirs(root))?;
    println!("Verifying package: {}", found.display());

    let report = verify::verify_package(&found)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        verify::print_report(&report);
    }

    if !report.is_structurally_valid() {
        if config.strict_verification {
            bail!(
                "package verification failed: {} required path(s) missing",
                report.missing.len()
            );
        }
        eprintln!("warning: overlay structure incomplete (non-fatal)");
    }
    Ok(())
}

fn extract_package(root: &std::path::Path) -> Result<()> {
    let found = locate::locate_package(&candidate_output_dirs(root))?;
    println!("Extracting package: {}", found.display());

    verify::extract_archive(&found, root)?;
    let overlay_dir = paths::find_overlay_dir(root).ok_or_else(|| {
        anyhow::anyhow!(
            "overlay directory '{}' not present after extraction into '{}'",
            paths::OVERLAY_ID,
            root.display()
        )
    })?;

    let report = verify::verify_tree(&overlay_dir);
    if !report.is_structurally_valid() {
        eprintln!("warning: overlay structure incomplete (non-fatal)");
    }

    let rel = overlay_dir
        .strip_prefix(root)
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|_| overlay_dir.clone());
    Handoff::from_env().publish("overlay_dir", &rel.display().to_string())
}

fn run_audit(root: &std::path::Path, json: bool) -> Result<()> {
    let overlay_dir = paths::find_overlay_dir(root)
        .unwrap_or_else(|| OverlayPaths::new(root).overlay_dir);
    println!("Auditing overlay components in: {}", overlay_dir.display());

    let report = audit::audit(&overlay_dir);
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        audit::print_report(&report);
    }
    // Audit never fails the pipeline; absence is reported, not raised.
    Ok(())
}

fn oci_image(root: &std::path::Path) -> Result<()> {
    let config = PipelineConfig::load(root)?;
    println!("Runtime: {}", preflight::check_container_runtime()?);

    let overlay_dir = paths::find_overlay_dir(root)
        .unwrap_or_else(|| OverlayPaths::new(root).overlay_dir);
    let reference = oci::ensure_image(
        &overlay_dir,
        &config.overlay_name,
        config.overlay_image.as_deref(),
    )?;
    Handoff::from_env().publish("overlay_image", &reference)
}

fn build_image(root: &std::path::Path) -> Result<()> {
    let config = PipelineConfig::load(root)?;
    println!("Runtime: {}", preflight::check_container_runtime()?);

    let overlay = match &config.overlay_image {
        Some(reference) => {
            let reference = oci::ensure_image(
                &OverlayPaths::new(root).overlay_dir,
                &config.overlay_name,
                Some(reference),
            )?;
            OverlaySource::Image {
                reference,
                name: config.overlay_name.clone(),
            }
        }
        None => {
            let overlay_dir = paths::find_overlay_dir(root).ok_or_else(|| {
                anyhow::anyhow!(
                    "overlay directory '{}' not found under '{}'",
                    paths::OVERLAY_ID,
                    root.display()
                )
            })?;
            OverlaySource::Directory(overlay_dir)
        }
    };

    let output_path = OverlayPaths::new(root)
        .output_dir
        .join(paths::image_file_name(&config.platform, &config.arch));
    let image = assemble::assemble(
        &overlay,
        &config.arch,
        &config.platform,
        &config.builder_version,
        &output_path,
    )?;

    Handoff::from_env().publish("image", &image.display().to_string())
}
