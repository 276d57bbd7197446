//! Pipeline error taxonomy.
//!
//! Most functions in this crate return `anyhow::Result`, but failures that
//! affect the process exit code are raised as [`PipelineError`] so the CLI
//! can downcast and map them:
//!
//! - `Precondition`, `NotFound`, `Format`, `EmptyOutput`, `ImageUnavailable`
//!   → exit 1
//! - `ToolInvocation { code }` → the external tool's exit code, verbatim
//! - `Interrupted` → exit 130

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// A required external tool or binary is absent or not executable.
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// An expected artifact or directory is absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// An archive failed to open or enumerate.
    #[error("format error: {0}")]
    Format(String),

    /// An external process returned non-zero; its exit code is propagated.
    #[error("{tool} failed with exit code {code}")]
    ToolInvocation { tool: String, code: i32 },

    /// A file exists but is zero bytes. Treated as failure even when the
    /// producing tool reported success, since some builder failure modes
    /// truncate output silently.
    #[error("empty output: {0}")]
    EmptyOutput(String),

    /// A registry-referenced overlay image could not be pulled.
    #[error("overlay image unavailable: {0}")]
    ImageUnavailable(String),

    /// An external invocation was terminated by a signal.
    #[error("{0} interrupted")]
    Interrupted(String),
}

impl PipelineError {
    /// Process exit code for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::ToolInvocation { code, .. } => *code,
            PipelineError::Interrupted(_) => 130,
            _ => 1,
        }
    }
}

/// Map any error chain to a process exit code.
///
/// Unrecognized errors (plain anyhow context, I/O) map to the generic
/// failure code 1.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<PipelineError>() {
        Some(pipeline_err) => pipeline_err.exit_code(),
        None => 1,
    }
}
