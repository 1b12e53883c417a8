use crate::concurrency::ExtractionLock;
use crate::config::LaunchConfig;
use crate::CoreError;
use parcel_runtime::{
    run_to_completion, select_companion, supported_arch, CancelToken, ChmodTool,
    CompanionService, ExitOutcome, LaunchSpec, RuntimeError,
};
use parcel_schema::{Manifest, Package};
use parcel_store::{
    check_extraction, resolve_package_file, BundleReader, ExtractLayout, ExtractionOutcome,
    ExtractionStatus, Extractor, ModeApplier,
};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// One line of `parcel list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageSummary {
    pub id: String,
    pub description: String,
    pub is_default: bool,
    pub architectures: Vec<String>,
}

/// A package whose payload is extracted and ready to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedPackage {
    pub package_id: String,
    pub architecture: String,
    pub root: PathBuf,
    pub command: String,
    pub outcome: ExtractionOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    pub package_id: String,
    pub architecture: String,
    pub root: PathBuf,
    pub checksum: String,
    #[serde(flatten)]
    pub status: ExtractionStatus,
}

/// Resolves, extracts, and runs packages from a bundle.
///
/// All settings come from the [`LaunchConfig`] given at construction; the
/// launcher keeps no other state besides the cancellation token shared with
/// the running child.
pub struct Launcher {
    config: LaunchConfig,
    layout: ExtractLayout,
    extractor: Extractor,
    companion: Box<dyn CompanionService>,
    cancel: CancelToken,
}

impl Launcher {
    /// Launcher with the host `chmod` and the configured companion backend.
    pub fn new(config: LaunchConfig) -> Result<Self, CoreError> {
        config.validate()?;
        let companion = select_companion(
            &config.companion.backend,
            &config.companion.package,
            &config.companion.service,
        )?;
        Ok(Self::with_parts(config, Box::new(ChmodTool::new()), companion))
    }

    pub fn with_parts(
        config: LaunchConfig,
        modes: Box<dyn ModeApplier>,
        companion: Box<dyn CompanionService>,
    ) -> Self {
        let layout = ExtractLayout::new(&config.extract_dir);
        Self {
            config,
            layout,
            extractor: Extractor::new(modes),
            companion,
            cancel: CancelToken::new(),
        }
    }

    pub fn config(&self) -> &LaunchConfig {
        &self.config
    }

    pub fn layout(&self) -> &ExtractLayout {
        &self.layout
    }

    /// Token that cancels the child started by [`launch`](Self::launch).
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Packages sorted by id. Reads nothing but the manifest.
    pub fn list(manifest: &Manifest) -> Vec<PackageSummary> {
        manifest
            .packages
            .values()
            .map(|pkg| PackageSummary {
                id: pkg.id.to_string(),
                description: pkg.description.clone(),
                is_default: manifest.default_package_id.as_ref() == Some(&pkg.id),
                architectures: pkg.architectures().map(ToString::to_string).collect(),
            })
            .collect()
    }

    /// The requested package, or the manifest default when none is requested.
    pub fn resolve_package<'m>(
        manifest: &'m Manifest,
        requested: Option<&str>,
    ) -> Result<&'m Package, CoreError> {
        let id = requested
            .or(manifest.default_package_id.as_deref())
            .ok_or(CoreError::NoDefaultPackage)?;
        manifest
            .package(id)
            .ok_or_else(|| CoreError::PackageNotFound(id.to_owned()))
    }

    /// Configured architecture if any, otherwise the detected host tag.
    pub fn host_architecture(&self) -> Result<&'static str, CoreError> {
        match &self.config.architecture {
            Some(tag) => {
                supported_arch(tag).ok_or_else(|| CoreError::UnsupportedArchitecture(tag.clone()))
            }
            None => parcel_runtime::host_architecture().ok_or_else(|| {
                CoreError::UnsupportedArchitecture(std::env::consts::ARCH.to_owned())
            }),
        }
    }

    /// Report whether the extraction root for a package is current.
    pub fn verify(
        &self,
        manifest: &Manifest,
        requested: Option<&str>,
    ) -> Result<VerifyReport, CoreError> {
        let package = Self::resolve_package(manifest, requested)?;
        let arch = self.host_architecture()?;
        let file = resolve_package_file(manifest, &package.id, arch)?;
        let root = self.layout.package_root(&package.id)?;
        let status = check_extraction(&root, file);
        debug!("{} at {}: {status:?}", package.id, root.display());
        Ok(VerifyReport {
            package_id: package.id.to_string(),
            architecture: arch.to_owned(),
            root,
            checksum: file.checksum.to_string(),
            status,
        })
    }

    /// Resolve the package and make sure its payload is extracted.
    ///
    /// The validity check and any re-extraction run under the package's
    /// extraction lock.
    pub fn prepare(
        &self,
        reader: &mut BundleReader,
        requested: Option<&str>,
    ) -> Result<PreparedPackage, CoreError> {
        let origin = reader.origin().to_owned();
        let mut bundle = reader.bundle()?;
        let package = Self::resolve_package(bundle.manifest, requested)?;
        let arch = self.host_architecture()?;
        resolve_package_file(bundle.manifest, &package.id, arch)?;

        let package_id = package.id.to_string();
        let command = package.command.clone();
        let root = self.layout.package_root(&package_id)?;

        self.layout.initialize()?;
        let outcome = {
            let lock_path = self.layout.lock_file(&package_id)?;
            let _lock = match ExtractionLock::try_acquire(&lock_path)? {
                Some(lock) => lock,
                None => {
                    info!("waiting for another extraction of {package_id} to finish");
                    ExtractionLock::acquire(&lock_path)?
                }
            };
            self.extractor
                .ensure_extracted(&mut bundle, &package_id, arch, &root)?
        };
        if let ExtractionOutcome::Extracted { files, .. } = outcome {
            info!(
                "extracted application {package_id} from {origin} to {} ({files} files)",
                root.display()
            );
        }

        Ok(PreparedPackage {
            package_id,
            architecture: arch.to_owned(),
            root,
            command,
            outcome,
        })
    }

    /// Run a prepared package to completion with the companion service around it.
    pub fn launch(&self, prepared: &PreparedPackage) -> Result<ExitOutcome, CoreError> {
        let spec = LaunchSpec::from_command_line(&prepared.command, &prepared.root)?
            .env("PORT", self.config.port.to_string())
            .timeout(self.config.timeout());

        let companion_started = self.start_companion();
        if self.cancel.is_cancelled() {
            info!("cancelled before {} was started", prepared.package_id);
            self.stop_companion(companion_started);
            return Ok(ExitOutcome::Cancelled);
        }

        info!("running command: {}", spec.display_command());
        let result = run_to_completion(&spec, &self.cancel);
        self.stop_companion(companion_started);

        match result {
            Ok(outcome) => {
                info!("application {} {outcome}", prepared.package_id);
                Ok(outcome)
            }
            Err(RuntimeError::Interrupted(reason)) => {
                Err(CoreError::ChildProcessInterrupted(reason))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Prepare, release the bundle, then launch.
    ///
    /// `on_ready` runs after extraction and before the child starts. The
    /// bundle is closed on every path, including failures.
    pub fn run_package(
        &self,
        reader: &mut BundleReader,
        requested: Option<&str>,
        on_ready: impl FnOnce(&PreparedPackage),
    ) -> Result<ExitOutcome, CoreError> {
        let prepared = self.prepare(reader, requested);
        reader.close();
        let prepared = prepared?;
        on_ready(&prepared);
        self.launch(&prepared)
    }

    fn start_companion(&self) -> bool {
        match self.companion.is_companion_installed() {
            Ok(true) => {
                info!("starting companion service ({})", self.companion.name());
                if let Err(e) = self.companion.start_companion_service() {
                    warn!("failed to start companion service: {e}");
                }
                true
            }
            Ok(false) => {
                if self.companion.name() != "none" {
                    warn!(
                        "companion service not installed; some features of the application might be unavailable"
                    );
                }
                false
            }
            Err(e) => {
                warn!("could not query companion service: {e}");
                false
            }
        }
    }

    fn stop_companion(&self, started: bool) {
        if !started {
            return;
        }
        info!("stopping companion service");
        if let Err(e) = self.companion.stop_companion_service() {
            warn!("failed to stop companion service: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parcel_runtime::{MockCompanion, NoopCompanion};
    use parcel_schema::parse_manifest_str;

    const MANIFEST: &str = r#"{"version":"1.0","default":"hello","packages":[
        {"id":"zeta","desc":"Zeta tool","cmd":"./zeta","files":[
            {"file":"assets/zeta_arm.zip","md5sum":"z","arch":"arm","modes":{}}]},
        {"id":"hello","desc":"Hello v1","cmd":"./hello","files":[
            {"file":"assets/hello_arm.zip","md5sum":"a","arch":"arm","modes":{}},
            {"file":"assets/hello_ia32.zip","md5sum":"b","arch":"ia32","modes":{}}]}]}"#;

    fn launcher(arch: Option<&str>, base: &std::path::Path) -> Launcher {
        let config = LaunchConfig {
            extract_dir: base.to_path_buf(),
            architecture: arch.map(str::to_owned),
            ..LaunchConfig::default()
        };
        Launcher::with_parts(config, Box::new(ChmodTool::new()), Box::new(NoopCompanion))
    }

    #[test]
    fn list_is_sorted_and_marks_default() {
        let manifest = parse_manifest_str(MANIFEST).unwrap();
        let list = Launcher::list(&manifest);
        let ids: Vec<_> = list.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["hello", "zeta"]);
        assert!(list[0].is_default);
        assert!(!list[1].is_default);
        assert_eq!(list[0].architectures, vec!["arm", "ia32"]);
    }

    #[test]
    fn resolve_uses_default_when_unrequested() {
        let manifest = parse_manifest_str(MANIFEST).unwrap();
        assert_eq!(Launcher::resolve_package(&manifest, None).unwrap().id, "hello");
        assert_eq!(
            Launcher::resolve_package(&manifest, Some("zeta")).unwrap().id,
            "zeta"
        );
    }

    #[test]
    fn resolve_errors() {
        let manifest = parse_manifest_str(MANIFEST).unwrap();
        assert!(matches!(
            Launcher::resolve_package(&manifest, Some("nope")),
            Err(CoreError::PackageNotFound(ref id)) if id == "nope"
        ));

        let no_default = parse_manifest_str(
            r#"{"version":"1.0","packages":[{"id":"a","desc":"","cmd":"x","files":[]}]}"#,
        )
        .unwrap();
        assert!(matches!(
            Launcher::resolve_package(&no_default, None),
            Err(CoreError::NoDefaultPackage)
        ));
    }

    #[test]
    fn architecture_override_is_validated() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(launcher(Some("ia32"), dir.path()).host_architecture().unwrap(), "ia32");
        assert!(matches!(
            launcher(Some("sparc"), dir.path()).host_architecture(),
            Err(CoreError::UnsupportedArchitecture(ref t)) if t == "sparc"
        ));
    }

    #[test]
    fn verify_does_not_touch_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("base");
        let manifest = parse_manifest_str(MANIFEST).unwrap();
        let report = launcher(Some("arm"), &base).verify(&manifest, None).unwrap();
        assert_eq!(report.package_id, "hello");
        assert_eq!(report.checksum, "a");
        assert_eq!(report.status, ExtractionStatus::RootMissing);
        assert_eq!(report.root, base.join("hello"));
        assert!(!base.exists());
    }

    #[test]
    fn verify_reports_missing_architecture() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = parse_manifest_str(MANIFEST).unwrap();
        let err = launcher(Some("ia32"), dir.path())
            .verify(&manifest, Some("zeta"))
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Store(parcel_store::StoreError::ArchitectureUnsupported { .. })
        ));
    }

    #[test]
    fn new_rejects_unknown_companion_backend() {
        let config = LaunchConfig {
            companion: crate::config::CompanionConfig {
                backend: "bluetooth".to_owned(),
                ..Default::default()
            },
            ..LaunchConfig::default()
        };
        assert!(matches!(
            Launcher::new(config),
            Err(CoreError::Runtime(RuntimeError::CompanionUnavailable(_)))
        ));
    }

    #[test]
    fn companion_start_failure_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockCompanion::failing_start();
        let config = LaunchConfig {
            extract_dir: dir.path().to_path_buf(),
            ..LaunchConfig::default()
        };
        let launcher =
            Launcher::with_parts(config, Box::new(ChmodTool::new()), Box::new(mock.clone()));
        let prepared = PreparedPackage {
            package_id: "x".to_owned(),
            architecture: "arm".to_owned(),
            root: dir.path().to_path_buf(),
            command: "sh -c 'exit 0'".to_owned(),
            outcome: ExtractionOutcome::AlreadyValid,
        };
        assert_eq!(launcher.launch(&prepared).unwrap(), ExitOutcome::Exited(0));
        assert_eq!(mock.calls(), vec!["is_installed", "start", "stop"]);
    }

    #[test]
    fn cancelled_token_skips_spawn() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockCompanion::not_installed();
        let config = LaunchConfig {
            extract_dir: dir.path().to_path_buf(),
            ..LaunchConfig::default()
        };
        let launcher =
            Launcher::with_parts(config, Box::new(ChmodTool::new()), Box::new(mock.clone()));
        launcher.cancel_token().cancel();
        let prepared = PreparedPackage {
            package_id: "x".to_owned(),
            architecture: "arm".to_owned(),
            root: dir.path().to_path_buf(),
            command: "sh -c 'touch ran'".to_owned(),
            outcome: ExtractionOutcome::AlreadyValid,
        };
        assert_eq!(launcher.launch(&prepared).unwrap(), ExitOutcome::Cancelled);
        assert!(!dir.path().join("ran").exists());
        assert_eq!(mock.calls(), vec!["is_installed"]);
    }
}
