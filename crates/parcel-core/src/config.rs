use crate::CoreError;
use parcel_runtime::companion::{DEFAULT_COMPANION_PACKAGE, DEFAULT_COMPANION_SERVICE};
use parcel_runtime::supported_arch;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_EXTRACT_DIR: &str = "/data/local/tmp";
pub const DEFAULT_PORT: u16 = 3000;

/// Settings for one launcher invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LaunchConfig {
    /// Base directory; each package extracts to `<extract_dir>/<id>`.
    pub extract_dir: PathBuf,
    /// Exported to the child as `PORT`.
    pub port: u16,
    pub debug: bool,
    /// Overrides host architecture detection.
    pub architecture: Option<String>,
    pub timeout_secs: Option<u64>,
    pub companion: CompanionConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompanionConfig {
    /// `android` or `none`.
    pub backend: String,
    pub package: String,
    pub service: String,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            extract_dir: PathBuf::from(DEFAULT_EXTRACT_DIR),
            port: DEFAULT_PORT,
            debug: false,
            architecture: None,
            timeout_secs: None,
            companion: CompanionConfig::default(),
        }
    }
}

impl Default for CompanionConfig {
    fn default() -> Self {
        Self {
            backend: "android".to_owned(),
            package: DEFAULT_COMPANION_PACKAGE.to_owned(),
            service: DEFAULT_COMPANION_SERVICE.to_owned(),
        }
    }
}

/// Command-line values that take precedence over the config file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub extract_dir: Option<PathBuf>,
    pub port: Option<u16>,
    pub debug: bool,
    pub architecture: Option<String>,
    pub timeout_secs: Option<u64>,
    pub companion: Option<String>,
}

impl LaunchConfig {
    /// Load `~/.config/parcel/config.toml`, or defaults when it does not exist.
    pub fn load_default() -> Result<Self, CoreError> {
        match default_config_path() {
            Some(path) if path.is_file() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CoreError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml(&content)
            .map_err(|e| CoreError::Config(format!("{}: {e}", path.display())))
    }

    pub fn from_toml(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.message().to_owned())
    }

    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(dir) = overrides.extract_dir {
            self.extract_dir = dir;
        }
        if let Some(port) = overrides.port {
            self.port = port;
        }
        if let Some(arch) = overrides.architecture {
            self.architecture = Some(arch);
        }
        if let Some(secs) = overrides.timeout_secs {
            self.timeout_secs = Some(secs);
        }
        if let Some(backend) = overrides.companion {
            self.companion.backend = backend;
        }
        self.debug |= overrides.debug;
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.port == 0 {
            return Err(CoreError::Config("port must be non-zero".to_owned()));
        }
        if self.extract_dir.as_os_str().is_empty() {
            return Err(CoreError::Config("extract_dir must not be empty".to_owned()));
        }
        if self.timeout_secs == Some(0) {
            return Err(CoreError::Config(
                "timeout_secs must be positive when set".to_owned(),
            ));
        }
        if let Some(arch) = &self.architecture {
            if supported_arch(arch).is_none() {
                return Err(CoreError::UnsupportedArchitecture(arch.clone()));
            }
        }
        Ok(())
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    let home = std::env::var_os("HOME")?;
    Some(PathBuf::from(home).join(".config/parcel/config.toml"))
}
