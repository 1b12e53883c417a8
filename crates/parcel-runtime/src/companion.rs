use crate::prereq::find_command;
use crate::RuntimeError;
use std::process::{Command, Output};
use tracing::debug;

pub const DEFAULT_COMPANION_PACKAGE: &str = "com.opersys.otlauncher";
pub const DEFAULT_COMPANION_SERVICE: &str = ".OTLauncherService";

/// Host-side UI companion that a launched application may talk to.
///
/// Callers treat every method as best-effort: a failure is reported and the
/// launch continues.
pub trait CompanionService: Send + Sync {
    fn name(&self) -> &str;

    fn is_companion_installed(&self) -> Result<bool, RuntimeError>;

    fn start_companion_service(&self) -> Result<(), RuntimeError>;

    fn stop_companion_service(&self) -> Result<(), RuntimeError>;
}

/// Companion driven through the Android console tools `pm` and `am`.
#[derive(Debug, Clone)]
pub struct AndroidCompanion {
    package: String,
    service: String,
}

impl Default for AndroidCompanion {
    fn default() -> Self {
        Self::new(DEFAULT_COMPANION_PACKAGE, DEFAULT_COMPANION_SERVICE)
    }
}

impl AndroidCompanion {
    pub fn new(package: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            service: service.into(),
        }
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    /// Component name in `am` syntax, e.g. `com.example/.Service`.
    pub fn component(&self) -> String {
        format!("{}/{}", self.package, self.service)
    }

    fn run_tool(tool: &str, args: &[&str]) -> Result<Output, RuntimeError> {
        let program = find_command(tool).ok_or_else(|| {
            RuntimeError::CompanionUnavailable(format!("'{tool}' not found on PATH"))
        })?;
        debug!("running {} {}", program.display(), args.join(" "));
        let output = Command::new(&program).args(args).output()?;
        if !output.status.success() {
            return Err(RuntimeError::ExecFailed(format!(
                "{tool} {} exited with {}: {}",
                args.join(" "),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(output)
    }
}

/// Package names from `pm list packages` output (`package:<name>` per line).
pub fn parse_package_list(output: &str) -> Vec<&str> {
    output
        .lines()
        .filter_map(|line| line.trim().strip_prefix("package:"))
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .collect()
}

impl CompanionService for AndroidCompanion {
    fn name(&self) -> &'static str {
        "android"
    }

    fn is_companion_installed(&self) -> Result<bool, RuntimeError> {
        let output = Self::run_tool("pm", &["list", "packages"])?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_package_list(&stdout).contains(&self.package.as_str()))
    }

    fn start_companion_service(&self) -> Result<(), RuntimeError> {
        Self::run_tool("am", &["startservice", "-n", &self.component()]).map(drop)
    }

    fn stop_companion_service(&self) -> Result<(), RuntimeError> {
        Self::run_tool("am", &["stopservice", "-n", &self.component()]).map(drop)
    }
}

/// Companion for hosts that have none.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCompanion;

impl CompanionService for NoopCompanion {
    fn name(&self) -> &'static str {
        "none"
    }

    fn is_companion_installed(&self) -> Result<bool, RuntimeError> {
        Ok(false)
    }

    fn start_companion_service(&self) -> Result<(), RuntimeError> {
        Ok(())
    }

    fn stop_companion_service(&self) -> Result<(), RuntimeError> {
        Ok(())
    }
}

pub fn select_companion(
    backend: &str,
    package: &str,
    service: &str,
) -> Result<Box<dyn CompanionService>, RuntimeError> {
    match backend {
        "android" => Ok(Box::new(AndroidCompanion::new(package, service))),
        "none" => Ok(Box::new(NoopCompanion)),
        "mock" => Ok(Box::new(crate::mock::MockCompanion::new())),
        other => Err(RuntimeError::CompanionUnavailable(format!(
            "unknown companion backend '{other}'"
        ))),
    }
}
