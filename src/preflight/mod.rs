//! Preflight checks.
//!
//! Validates that the host has the required external tools before the
//! pipeline does any work. This turns cryptic mid-build failures into a
//! clear up-front precondition error.

use anyhow::Result;
use std::time::Duration;

use crate::error::PipelineError;
use crate::oci::RUNTIME;
use crate::process::Cmd;

/// Bounded wait for lightweight version probes.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Check if a command exists on the host.
pub fn command_exists(cmd: &str) -> bool {
    which::which(cmd).is_ok()
}

/// Tools the packaging stage shells out to, as (command, package) pairs.
pub const REQUIRED_TOOLS: &[(&str, &str)] = &[("tar", "tar"), ("gzip", "gzip")];

/// Check that specific tools are available.
///
/// Fails with the full list of missing tools and their packages.
pub fn check_required_tools(tools: &[(&str, &str)]) -> Result<()> {
    let missing: Vec<String> = tools
        .iter()
        .filter(|(tool, _)| !command_exists(tool))
        .map(|(tool, package)| format!("  {} (install: {})", tool, package))
        .collect();

    if !missing.is_empty() {
        return Err(PipelineError::Precondition(format!(
            "missing required host tools:\n{}",
            missing.join("\n")
        ))
        .into());
    }

    Ok(())
}

/// Check that the container runtime responds.
///
/// Runs `docker --version` with a bounded wait; absence or an unresponsive
/// daemon is a fatal precondition for the OCI and assembly stages.
pub fn check_container_runtime() -> Result<String> {
    let result = Cmd::new(RUNTIME)
        .arg("--version")
        .timeout(PROBE_TIMEOUT)
        .error_msg(format!("{} is not available", RUNTIME))
        .run()?;
    Ok(result.stdout.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_exists() {
        assert!(command_exists("ls"));
        assert!(!command_exists("definitely_not_a_real_command_12345"));
    }

    #[test]
    fn test_check_required_tools_success() {
        let tools = &[("ls", "coreutils"), ("cat", "coreutils")];
        assert!(check_required_tools(tools).is_ok());
    }

    #[test]
    fn test_check_required_tools_failure_lists_all() {
        let tools = &[
            ("nonexistent_command_xyz", "fake-package"),
            ("another_missing_tool_abc", "other-package"),
        ];
        let err = check_required_tools(tools).unwrap_err();
        let msg = format!("{}", err);
        assert!(msg.contains("fake-package"));
        assert!(msg.contains("other-package"));
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::Precondition(_))
        ));
    }
}
