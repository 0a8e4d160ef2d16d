//! Loading and merging of elm-package manifests.
use crate::error::WorkflowError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Conventional name of the user's override manifest in the invocation
/// directory, and of the merged output in the staging directory.
pub const MANIFEST_FILE_NAME: &str = "elm-package.json";

/// An elm-package manifest restricted to the fields this tool understands.
/// Unrecognized top-level fields are dropped on load rather than passed
/// through to the merged output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(rename = "elm-version", skip_serializing_if = "Option::is_none")]
    pub elm_version: Option<String>,
    #[serde(rename = "exposed-modules", skip_serializing_if = "Option::is_none")]
    pub exposed_modules: Option<Vec<String>>,
    #[serde(rename = "native-modules", skip_serializing_if = "Option::is_none")]
    pub native_modules: Option<bool>,
    #[serde(rename = "source-directories", default)]
    pub source_directories: Vec<String>,
    /// Dependency versions keyed by package name. A BTreeMap keeps the
    /// serialized output deterministic.
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
}

pub fn load(path: &Path) -> Result<Manifest, WorkflowError> {
    let content =
        fs::read_to_string(path).map_err(|err| WorkflowError::manifest_load(path, err))?;
    serde_json::from_str(&content).map_err(|err| WorkflowError::manifest_load(path, err))
}

/// Merge the template with the user's optional overrides and write the
/// result to `dest`.
///
/// The template is a fixed asset, so failing to load it is fatal. The user
/// manifest at `<user_dir>/elm-package.json` is optional: any load failure
/// means "no overrides". User dependency entries win on key collision, and
/// `extra_source_dir` is appended to the template's source directories.
pub fn merge_and_write(
    template_path: &Path,
    user_dir: &Path,
    dest: &Path,
    extra_source_dir: &Path,
) -> Result<(), WorkflowError> {
    let mut merged = load(template_path)?;
    merged
        .source_directories
        .push(extra_source_dir.display().to_string());

    let user_path = user_dir.join(MANIFEST_FILE_NAME);
    match load(&user_path) {
        Ok(user) => {
            tracing::debug!(
                overrides = user.dependencies.len(),
                "applying user dependency overrides"
            );
            for (name, version) in user.dependencies {
                merged.dependencies.insert(name, version);
            }
        }
        Err(err) => {
            tracing::debug!(error = %err, "no usable user manifest, keeping template dependencies");
        }
    }

    write(dest, &merged)
}

/// Write through a temp file and rename so a partial write surfaces as an
/// error instead of a truncated manifest.
fn write(dest: &Path, manifest: &Manifest) -> Result<(), WorkflowError> {
    let bytes = serde_json::to_vec_pretty(manifest)
        .map_err(|err| WorkflowError::filesystem("write", dest, std::io::Error::other(err)))?;
    let file_name = dest
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(MANIFEST_FILE_NAME);
    let tmp = dest
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(format!(".{file_name}.tmp"));
    fs::write(&tmp, &bytes).map_err(|err| WorkflowError::filesystem("write", &tmp, err))?;
    fs::rename(&tmp, dest).map_err(|err| WorkflowError::filesystem("write", dest, err))?;
    Ok(())
}
