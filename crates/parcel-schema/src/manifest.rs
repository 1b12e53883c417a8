use crate::types::{ArchTag, Checksum, PackageId};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

/// The only descriptor version this parser accepts.
pub const MANIFEST_VERSION: &str = "1.0";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ManifestError {
    #[error("malformed manifest at '{field}': {reason}")]
    Malformed { field: String, reason: String },
    #[error("unsupported manifest version: {0}, expected \"1.0\"")]
    UnsupportedVersion(String),
}

impl ManifestError {
    fn malformed(field: &str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            field: field.to_owned(),
            reason: reason.into(),
        }
    }
}

/// Parsed bundle descriptor. Built once, read-only afterwards.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Manifest {
    pub version: String,
    pub default_package_id: Option<PackageId>,
    pub packages: BTreeMap<PackageId, Package>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Package {
    pub id: PackageId,
    pub description: String,
    pub command: String,
    pub files: BTreeMap<ArchTag, PackageFile>,
}

/// Payload archive for one (package, architecture) pair.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PackageFile {
    pub architecture: ArchTag,
    /// Path of the nested payload archive inside the outer container.
    pub container_entry_path: String,
    pub checksum: Checksum,
    pub file_modes: Vec<FileMode>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FileMode {
    /// Path relative to the extraction root.
    pub relative_path: String,
    /// Mode in the host's `chmod` syntax, e.g. `0755`.
    pub mode: String,
}

impl Manifest {
    pub fn package(&self, id: &str) -> Option<&Package> {
        self.packages.get(id)
    }

    pub fn package_ids(&self) -> impl Iterator<Item = &PackageId> {
        self.packages.keys()
    }
}

impl Package {
    pub fn file_for_arch(&self, arch: &str) -> Option<&PackageFile> {
        self.files.get(arch)
    }

    pub fn architectures(&self) -> impl Iterator<Item = &ArchTag> {
        self.files.keys()
    }
}

pub fn parse_manifest_str(input: &str) -> Result<Manifest, ManifestError> {
    let doc: Value = serde_json::from_str(input)
        .map_err(|e| ManifestError::malformed("<document>", e.to_string()))?;
    manifest_from_value(&doc)
}

/// Parse raw descriptor bytes as read from a container entry.
pub fn parse_manifest_slice(input: &[u8]) -> Result<Manifest, ManifestError> {
    let text = std::str::from_utf8(input)
        .map_err(|e| ManifestError::malformed("<document>", format!("invalid UTF-8: {e}")))?;
    parse_manifest_str(text)
}

fn manifest_from_value(doc: &Value) -> Result<Manifest, ManifestError> {
    let root = doc
        .as_object()
        .ok_or_else(|| ManifestError::malformed("<document>", "expected a JSON object"))?;

    // Version is checked before anything else is looked at.
    let version = match root.get("version") {
        None => return Err(ManifestError::malformed("version", "missing field")),
        Some(Value::String(v)) if v == MANIFEST_VERSION => v.clone(),
        Some(Value::String(v)) => return Err(ManifestError::UnsupportedVersion(v.clone())),
        Some(other) => return Err(ManifestError::UnsupportedVersion(other.to_string())),
    };

    let default_package_id = match root.get("default") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.is_empty() => None,
        Some(Value::String(s)) => Some(PackageId::new(s.as_str())),
        Some(_) => return Err(ManifestError::malformed("default", "expected a string")),
    };

    let mut packages = BTreeMap::new();
    for (i, pkg) in require_array(root, "packages", "packages")?.iter().enumerate() {
        let path = format!("packages[{i}]");
        let package = package_from_value(pkg, &path)?;
        packages.insert(package.id.clone(), package);
    }

    Ok(Manifest {
        version,
        default_package_id,
        packages,
    })
}

fn package_from_value(value: &Value, path: &str) -> Result<Package, ManifestError> {
    let obj = as_object(value, path)?;
    let id = require_str(obj, "id", path)?;
    let description = require_str(obj, "desc", path)?;
    let command = require_str(obj, "cmd", path)?;

    let mut files = BTreeMap::new();
    let files_path = format!("{path}.files");
    for (i, file) in require_array(obj, "files", &files_path)?.iter().enumerate() {
        let file = package_file_from_value(file, &format!("{files_path}[{i}]"))?;
        // One payload per architecture; a later entry replaces an earlier one.
        files.insert(file.architecture.clone(), file);
    }

    Ok(Package {
        id: PackageId::new(id),
        description: description.to_owned(),
        command: command.to_owned(),
        files,
    })
}

fn package_file_from_value(value: &Value, path: &str) -> Result<PackageFile, ManifestError> {
    let obj = as_object(value, path)?;
    let entry = require_str(obj, "file", path)?;
    let checksum = require_str(obj, "md5sum", path)?;
    let arch = require_str(obj, "arch", path)?;

    let modes_path = format!("{path}.modes");
    let modes = match obj.get("modes") {
        None => return Err(ManifestError::malformed(&modes_path, "missing field")),
        Some(v) => as_object(v, &modes_path)?,
    };

    let mut file_modes = Vec::with_capacity(modes.len());
    for (relative_path, mode) in modes {
        let mode = mode.as_str().ok_or_else(|| {
            ManifestError::malformed(&format!("{modes_path}.{relative_path}"), "expected a string")
        })?;
        file_modes.push(FileMode {
            relative_path: relative_path.clone(),
            mode: mode.to_owned(),
        });
    }

    Ok(PackageFile {
        architecture: ArchTag::new(arch),
        container_entry_path: entry.to_owned(),
        checksum: Checksum::new(checksum),
        file_modes,
    })
}

fn as_object<'a>(value: &'a Value, path: &str) -> Result<&'a Map<String, Value>, ManifestError> {
    value
        .as_object()
        .ok_or_else(|| ManifestError::malformed(path, "expected an object"))
}

fn require_str<'a>(
    obj: &'a Map<String, Value>,
    key: &str,
    path: &str,
) -> Result<&'a str, ManifestError> {
    let field = format!("{path}.{key}");
    match obj.get(key) {
        None => Err(ManifestError::malformed(&field, "missing field")),
        Some(Value::String(s)) => Ok(s.as_str()),
        Some(_) => Err(ManifestError::malformed(&field, "expected a string")),
    }
}

fn require_array<'a>(
    obj: &'a Map<String, Value>,
    key: &str,
    field: &str,
) -> Result<&'a Vec<Value>, ManifestError> {
    match obj.get(key) {
        None => Err(ManifestError::malformed(field, "missing field")),
        Some(Value::Array(items)) => Ok(items),
        Some(_) => Err(ManifestError::malformed(field, "expected an array")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REFERENCE: &str = r#"{"version":"1.0","packages":[{"id":"binder-explorer","desc":"Binder Explorer v0.1","cmd":"./node app.js",
"files":[
 {"file":"assets/binder-explorer_ia32.zip","md5sum":"UNIMPORTANT CONTENT","arch":"ia32","modes":{"node":"0755"}},
 {"file":"assets/binder-explorer_arm.zip","md5sum":"UNIMPORTANT CONTENT","arch":"arm","modes":{"node":"0755"}}
]}]}"#;

    fn expect_malformed(input: &str) -> String {
        match parse_manifest_str(input) {
            Err(ManifestError::Malformed { field, .. }) => field,
            other => panic!("expected Malformed, got {other:?}"),
        }
    }

    #[test]
    fn parses_reference_manifest() {
        let manifest = parse_manifest_str(REFERENCE).expect("should parse");
        assert_eq!(manifest.version, "1.0");
        assert_eq!(manifest.packages.len(), 1);
        assert!(manifest.default_package_id.is_none());

        let pkg = manifest.package("binder-explorer").unwrap();
        assert_eq!(pkg.id, "binder-explorer");
        assert_eq!(pkg.description, "Binder Explorer v0.1");
        assert_eq!(pkg.command, "./node app.js");

        let arm = pkg.file_for_arch("arm").unwrap();
        assert_eq!(arm.architecture, "arm");
        assert_eq!(arm.checksum, "UNIMPORTANT CONTENT");
        assert_eq!(arm.container_entry_path, "assets/binder-explorer_arm.zip");
        assert_eq!(
            arm.file_modes[0],
            FileMode {
                relative_path: "node".to_owned(),
                mode: "0755".to_owned(),
            }
        );

        let ia32 = pkg.file_for_arch("ia32").unwrap();
        assert_eq!(ia32.container_entry_path, "assets/binder-explorer_ia32.zip");
        assert!(pkg.file_for_arch("mips").is_none());
    }

    #[test]
    fn parses_default_package() {
        let input = r#"{"version":"1.0","default":"a","packages":[
            {"id":"a","desc":"A","cmd":"./a","files":[]},
            {"id":"b","desc":"B","cmd":"./b","files":[]}]}"#;
        let manifest = parse_manifest_str(input).unwrap();
        assert_eq!(manifest.default_package_id.as_ref().unwrap(), "a");
        assert_eq!(manifest.package("a").unwrap().command, "./a");
        let ids: Vec<_> = manifest.package_ids().map(PackageId::as_str).collect();
        assert_eq!(ids, ["a", "b"]);
    }

    #[test]
    fn rejects_other_versions() {
        let err = parse_manifest_str(r#"{"version":"2.0","packages":[]}"#).unwrap_err();
        assert_eq!(err, ManifestError::UnsupportedVersion("2.0".to_owned()));

        let err = parse_manifest_str(r#"{"version":1.0,"packages":[]}"#).unwrap_err();
        assert!(matches!(err, ManifestError::UnsupportedVersion(_)));
    }

    #[test]
    fn version_checked_before_packages() {
        let err = parse_manifest_str(r#"{"version":"0.9"}"#).unwrap_err();
        assert!(matches!(err, ManifestError::UnsupportedVersion(_)));
    }

    #[test]
    fn missing_version_is_malformed() {
        assert_eq!(expect_malformed(r#"{"packages":[]}"#), "version");
    }

    #[test]
    fn missing_packages_is_malformed() {
        assert_eq!(expect_malformed(r#"{"version":"1.0"}"#), "packages");
    }

    #[test]
    fn empty_default_means_no_default() {
        let manifest =
            parse_manifest_str(r#"{"version":"1.0","default":"","packages":[]}"#).unwrap();
        assert!(manifest.default_package_id.is_none());
    }

    #[test]
    fn reports_path_of_missing_package_field() {
        let input = r#"{"version":"1.0","packages":[{"id":"a","desc":"A","files":[]}]}"#;
        assert_eq!(expect_malformed(input), "packages[0].cmd");
    }

    #[test]
    fn reports_path_of_missing_file_field() {
        let input = r#"{"version":"1.0","packages":[{"id":"a","desc":"A","cmd":"x","files":[
            {"file":"p.zip","arch":"arm","modes":{}}]}]}"#;
        assert_eq!(expect_malformed(input), "packages[0].files[0].md5sum");
    }

    #[test]
    fn rejects_ill_typed_modes() {
        let input = r#"{"version":"1.0","packages":[{"id":"a","desc":"A","cmd":"x","files":[
            {"file":"p.zip","md5sum":"s","arch":"arm","modes":{"node":755}}]}]}"#;
        assert_eq!(expect_malformed(input), "packages[0].files[0].modes.node");

        let input = r#"{"version":"1.0","packages":[{"id":"a","desc":"A","cmd":"x","files":[
            {"file":"p.zip","md5sum":"s","arch":"arm","modes":[]}]}]}"#;
        assert_eq!(expect_malformed(input), "packages[0].files[0].modes");
    }

    #[test]
    fn rejects_non_array_files() {
        let input = r#"{"version":"1.0","packages":[{"id":"a","desc":"A","cmd":"x","files":{}}]}"#;
        assert_eq!(expect_malformed(input), "packages[0].files");
    }

    #[test]
    fn rejects_invalid_json() {
        assert_eq!(expect_malformed("{\"version\":"), "<document>");
        assert_eq!(expect_malformed("[]"), "<document>");
    }

    #[test]
    fn duplicate_architecture_last_wins() {
        let input = r#"{"version":"1.0","packages":[{"id":"a","desc":"A","cmd":"x","files":[
            {"file":"first.zip","md5sum":"1","arch":"arm","modes":{}},
            {"file":"second.zip","md5sum":"2","arch":"arm","modes":{}}]}]}"#;
        let manifest = parse_manifest_str(input).unwrap();
        let pkg = manifest.package("a").unwrap();
        assert_eq!(pkg.files.len(), 1);
        assert_eq!(pkg.file_for_arch("arm").unwrap().container_entry_path, "second.zip");
    }

    #[test]
    fn parses_from_bytes() {
        let manifest = parse_manifest_slice(REFERENCE.as_bytes()).unwrap();
        assert_eq!(manifest.packages.len(), 1);
        assert!(parse_manifest_slice(&[0xff, 0xfe]).is_err());
    }
}
