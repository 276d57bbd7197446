//! Packaging and image-assembly pipeline for hardware-support overlays.
//!
//! An overlay bundles firmware blobs, kernel modules, and configuration
//! that get layered onto a base OS image to add hardware support. This
//! crate covers the pipeline around that bundle:
//!
//! - **Version resolution** - explicit input, filename pattern, or default
//! - **Packaging** - drive the external packager and validate its tarball
//! - **Location** - find the package across candidate output directories
//! - **Verification** - structural checks over the extracted overlay tree
//! - **OCI wrapping** - the overlay as a minimal single-layer image
//! - **Assembly** - drive the external imager and canonicalize its output
//! - **Audit** - non-fatal component health check over a working tree
//!
//! # Architecture
//!
//! ```text
//! version ──► package ──► locate ──► verify       (verification stage)
//!
//! oci ──► assemble ──► output image + checksum    (build stage)
//!
//! audit                                           (standalone, read-only)
//! ```
//!
//! All operations are synchronous; concurrency belongs to the external
//! tools (packager, container runtime, imager), which are opaque beyond
//! their exit codes and streamed output. Paths are threaded explicitly:
//! [`paths::resolve_root`] maps the ambient invocation context to a root
//! once, and nothing below it consults the current directory.

pub mod assemble;
pub mod audit;
pub mod config;
pub mod error;
pub mod fsutil;
pub mod handoff;
pub mod locate;
pub mod oci;
pub mod package;
pub mod paths;
pub mod preflight;
pub mod process;
pub mod verify;
pub mod version;

pub use config::PipelineConfig;
pub use error::PipelineError;
pub use paths::{OverlayPaths, OVERLAY_ID};
pub use verify::VerificationReport;
