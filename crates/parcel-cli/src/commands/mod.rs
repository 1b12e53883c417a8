pub mod completions;
pub mod inspect;
pub mod list;
pub mod man_pages;
pub mod run;
pub mod verify;

use parcel_core::LaunchConfig;
use parcel_store::BundleReader;
use std::path::PathBuf;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;

/// Everything a subcommand needs from the global flags.
pub struct Context {
    pub bundle: Option<PathBuf>,
    pub config: LaunchConfig,
    pub json: bool,
}

impl Context {
    pub fn open_bundle(&self) -> Result<BundleReader, String> {
        let path = self
            .bundle
            .as_deref()
            .ok_or("no bundle file specified (use -f <FILE>)")?;
        if !path.exists() {
            return Err(format!("file {} doesn't exist", path.display()));
        }
        BundleReader::open(path).map_err(|e| e.to_string())
    }
}

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn colorize_status(status: &str) -> String {
    use console::Style;
    match status {
        "valid" => Style::new().green().apply_to(status).to_string(),
        "stale" => Style::new().yellow().apply_to(status).to_string(),
        "marker_missing" | "root_missing" => Style::new().dim().apply_to(status).to_string(),
        other => other.to_owned(),
    }
}

/// Clamp a child exit code into the range a process can return.
pub fn exit_code_byte(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(EXIT_FAILURE)
}
