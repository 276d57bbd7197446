//! Disk image assembly.
//!
//! Invokes the external imager container with the overlay (bind-mounted
//! directory or OCI reference), then canonicalizes its output. The imager
//! writes the disk image under a name of its own choosing, so discovery
//! walks a prioritized candidate list with a glob fallback, and the found
//! file is renamed to the deterministic target path downstream consumers
//! rely on.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use crate::error::PipelineError;
use crate::oci::RUNTIME;
use crate::process::Cmd;

/// Imager container image (tagged with the builder version).
pub const IMAGER_IMAGE: &str = "ghcr.io/siderolabs/imager";

/// How the overlay is handed to the imager.
pub enum OverlaySource {
    /// Bind-mount a local overlay tree read-only at /overlay.
    Directory(PathBuf),
    /// Pass an OCI overlay image reference plus overlay name.
    Image { reference: String, name: String },
}

/// Build the disk image and canonicalize it to `output_path`.
pub fn assemble(
    overlay: &OverlaySource,
    arch: &str,
    platform: &str,
    builder_version: &str,
    output_path: &Path,
) -> Result<PathBuf> {
    let output_dir = output_path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("output path '{}' has no parent", output_path.display()))?;
    fs::create_dir_all(output_dir)
        .with_context(|| format!("creating output directory '{}'", output_dir.display()))?;

    let imager = format!("{}:{}", IMAGER_IMAGE, builder_version);

    println!("Building disk image...");
    println!("  Architecture: {}", arch);
    println!("  Platform:     {}", platform);
    println!("  Imager:       {}", imager);

    let mut cmd = Cmd::new(RUNTIME).args(["run", "--rm", "-t"]);

    match overlay {
        OverlaySource::Directory(dir) => {
            let dir = dir
                .canonicalize()
                .with_context(|| format!("resolving overlay directory '{}'", dir.display()))?;
            println!("  Overlay:      {}", dir.display());
            cmd = cmd
                .arg("-v")
                .arg(format!("{}:/overlay:ro", dir.display()));
        }
        OverlaySource::Image { reference, name } => {
            println!("  Overlay:      {} (as {})", reference, name);
        }
    }

    let output_dir_abs = output_dir
        .canonicalize()
        .with_context(|| format!("resolving output directory '{}'", output_dir.display()))?;
    cmd = cmd
        .arg("-v")
        .arg(format!("{}:/out", output_dir_abs.display()))
        .arg(imager.as_str())
        .args(["--arch", arch, "--platform", platform]);

    cmd = match overlay {
        OverlaySource::Directory(_) => cmd.args(["--overlay", "/overlay"]),
        OverlaySource::Image { reference, name } => cmd.args([
            "--overlay-image",
            reference.as_str(),
            "--overlay-name",
            name.as_str(),
        ]),
    };

    // Image assembly streams unbounded; artifact sizes are large and
    // variable.
    cmd.arg("installer")
        .error_msg("image builder failed")
        .stream()?;

    let target_name = output_path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| anyhow::anyhow!("output path '{}' has no filename", output_path.display()))?;
    finalize_output(&output_dir_abs, target_name, platform, arch)
}

/// Canonicalize the builder's output: discover it, rename it to the
/// deterministic target name, reject zero-size results, and write the
/// checksum sidecar.
pub fn finalize_output(
    output_dir: &Path,
    target_name: &str,
    platform: &str,
    arch: &str,
) -> Result<PathBuf> {
    let found = discover_output(output_dir, target_name, platform, arch)?;

    let canonical = output_dir.join(target_name);
    if found != canonical {
        println!(
            "  Found image {}, renaming to {}",
            found.display(),
            canonical.display()
        );
        fs::rename(&found, &canonical).with_context(|| {
            format!(
                "renaming '{}' to '{}'",
                found.display(),
                canonical.display()
            )
        })?;
    }

    let size = fs::metadata(&canonical)
        .with_context(|| format!("reading metadata for '{}'", canonical.display()))?
        .len();
    if size == 0 {
        // Some builder failure modes truncate output while still exiting 0.
        return Err(PipelineError::EmptyOutput(canonical.display().to_string()).into());
    }

    let checksum = write_checksum(&canonical)?;
    println!(
        "  Image: {} ({:.2} MB)",
        canonical.display(),
        size as f64 / 1024.0 / 1024.0
    );
    println!("  Checksum: {}", checksum.display());

    Ok(canonical)
}

/// Locate the builder's output file.
///
/// Candidate order: the caller-supplied target name, then the builder's
/// `<platform>-<arch>` and `<arch>-<platform>` conventions, then the
/// generic `disk.raw`, then any `*.img` in the directory. A total miss
/// enumerates every file actually present.
pub fn discover_output(
    output_dir: &Path,
    target_name: &str,
    platform: &str,
    arch: &str,
) -> Result<PathBuf> {
    let candidates = [
        target_name.to_string(),
        format!("{}-{}.img", platform, arch),
        format!("{}-{}.img", arch, platform),
        "disk.raw".to_string(),
    ];

    for name in &candidates {
        let candidate = output_dir.join(name);
        if candidate.is_file() {
            return Ok(candidate);
        }
    }

    let mut entries: Vec<PathBuf> = fs::read_dir(output_dir)
        .with_context(|| format!("reading output directory '{}'", output_dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .collect();
    entries.sort();

    if let Some(image) = entries
        .iter()
        .find(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "img"))
    {
        return Ok(image.clone());
    }

    let present: Vec<String> = entries
        .iter()
        .map(|path| {
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        })
        .collect();
    Err(PipelineError::NotFound(format!(
        "no output image in '{}' (searched for: {}); {} file(s) present: [{}]",
        output_dir.display(),
        candidates.join(", "),
        present.len(),
        present.join(", ")
    ))
    .into())
}

/// Write a `<image>.sha256` sidecar in `sha256sum -c` format.
pub fn write_checksum(image: &Path) -> Result<PathBuf> {
    let file =
        File::open(image).with_context(|| format!("opening '{}'", image.display()))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    let hash = format!("{:x}", hasher.finalize());

    let filename = image
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let checksum_path = PathBuf::from(format!("{}.sha256", image.display()));
    fs::write(&checksum_path, format!("{}  {}\n", hash, filename))
        .with_context(|| format!("writing '{}'", checksum_path.display()))?;
    Ok(checksum_path)
}
