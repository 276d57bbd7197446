//! Orchestrator handoff channel.
//!
//! Resolved versions and discovered paths are published as `key=value` lines
//! appended to a side file named by the `OVERLAY_OUTPUT` environment
//! variable. The orchestrating caller consumes it after each stage. When the
//! variable is unset the value still goes to stdout, and the missing channel
//! is a warning, never a failure.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Environment variable naming the handoff file.
pub const HANDOFF_ENV: &str = "OVERLAY_OUTPUT";

/// Append-only `key=value` handoff file.
pub struct Handoff {
    path: Option<PathBuf>,
}

impl Handoff {
    /// Resolve the channel from the environment.
    pub fn from_env() -> Self {
        match std::env::var(HANDOFF_ENV) {
            Ok(value) if !value.trim().is_empty() => Self {
                path: Some(PathBuf::from(value)),
            },
            _ => {
                eprintln!(
                    "warning: {} not set, handoff values go to stdout only",
                    HANDOFF_ENV
                );
                Self { path: None }
            }
        }
    }

    /// Channel writing to an explicit file (used by tests and callers that
    /// manage their own handoff location).
    pub fn to_file(path: &Path) -> Self {
        Self {
            path: Some(path.to_path_buf()),
        }
    }

    /// Publish one key. Always echoes to stdout; appends to the side file
    /// when one is configured. The append is exclusive-locked since the
    /// orchestrator may write the same file between stages.
    pub fn publish(&self, key: &str, value: &str) -> Result<()> {
        println!("{}={}", key, value);

        let Some(path) = &self.path else {
            return Ok(());
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("opening handoff file '{}'", path.display()))?;
        file.lock_exclusive()
            .with_context(|| format!("locking handoff file '{}'", path.display()))?;
        let write_result = writeln!(file, "{}={}", key, value)
            .with_context(|| format!("appending to handoff file '{}'", path.display()));
        let _ = file.unlock();
        write_result?;
        Ok(())
    }
}
