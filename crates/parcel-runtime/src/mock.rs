use crate::companion::CompanionService;
use crate::RuntimeError;
use std::sync::{Arc, Mutex};

/// Companion that records every call. Clones share the same call log.
#[derive(Debug, Clone)]
pub struct MockCompanion {
    installed: bool,
    fail_start: bool,
    calls: Arc<Mutex<Vec<String>>>,
}

impl Default for MockCompanion {
    fn default() -> Self {
        Self {
            installed: true,
            fail_start: false,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl MockCompanion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn not_installed() -> Self {
        Self {
            installed: false,
            ..Self::default()
        }
    }

    /// Installed, but starting the service fails.
    pub fn failing_start() -> Self {
        Self {
            fail_start: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    fn record(&self, call: &str) -> Result<(), RuntimeError> {
        let mut calls = self
            .calls
            .lock()
            .map_err(|e| RuntimeError::ExecFailed(format!("mock call log poisoned: {e}")))?;
        calls.push(call.to_owned());
        Ok(())
    }
}

impl CompanionService for MockCompanion {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn is_companion_installed(&self) -> Result<bool, RuntimeError> {
        self.record("is_installed")?;
        Ok(self.installed)
    }

    fn start_companion_service(&self) -> Result<(), RuntimeError> {
        self.record("start")?;
        if self.fail_start {
            return Err(RuntimeError::ExecFailed("mock start failure".to_owned()));
        }
        Ok(())
    }

    fn stop_companion_service(&self) -> Result<(), RuntimeError> {
        self.record("stop")?;
        Ok(())
    }
}
