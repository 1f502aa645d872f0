//! Locating definition sources, examples and fixtures on disk.
//!
//! Layout under the specification root:
//!
//! - `publish/*.profile.xml` - structure definition sources
//! - `source/<Type>/<type>-*.xml` - examples, expected to satisfy every invariant
//! - `source/<Type>/invariant-tests/*.{xml,json}` - targeted fixtures

use crate::config::HarnessConfig;
use crate::errors::{HarnessError, HarnessResult};
use std::fs;
use std::path::{Path, PathBuf};

pub const PUBLISH_DIR: &str = "publish";
pub const SOURCE_DIR: &str = "source";
pub const FIXTURE_DIR: &str = "invariant-tests";
const DEFINITION_SUFFIX: &str = ".profile.xml";

/// Read a file as text.
///
/// Readers never lock the file, so editors can keep rewriting fixtures while
/// the monitor is running.
pub fn read_source(path: &Path) -> HarnessResult<String> {
    fs::read_to_string(path).map_err(|e| HarnessError::io(path, e))
}

/// Definition sources directly under `publish_dir`, sorted by name.
pub fn definition_files(publish_dir: &Path) -> HarnessResult<Vec<PathBuf>> {
    list_files(publish_dir, |name| name.ends_with(DEFINITION_SUFFIX))
}

/// The directory holding a resource type's examples: `source/<Type>`, or
/// `source/<type>` when only the lowercase form exists.
pub fn type_directory(root: &Path, resource_type: &str) -> PathBuf {
    let source = root.join(SOURCE_DIR);
    let exact = source.join(resource_type);
    if exact.is_dir() {
        return exact;
    }
    let lower = source.join(resource_type.to_lowercase());
    if lower.is_dir() {
        lower
    } else {
        exact
    }
}

pub fn fixture_directory(root: &Path, resource_type: &str) -> PathBuf {
    type_directory(root, resource_type).join(FIXTURE_DIR)
}

/// The example used to seed new fixture directories.
pub fn default_example(root: &Path, resource_type: &str) -> PathBuf {
    type_directory(root, resource_type).join(format!("{}-example.xml", resource_type.to_lowercase()))
}

/// Examples for a resource type: `<type>-*.xml` minus the configured skips.
pub fn example_files(root: &Path, resource_type: &str, config: &HarnessConfig) -> HarnessResult<Vec<PathBuf>> {
    let prefix = format!("{}-", resource_type.to_lowercase());
    let files = list_files(&type_directory(root, resource_type), |name| {
        name.starts_with(&prefix) && name.ends_with(".xml")
    })?;
    Ok(files
        .into_iter()
        .filter(|path| !config.skips_example(&relative_key(root, path)))
        .collect())
}

/// Fixtures for a resource type, XML first then JSON. A missing directory
/// yields no fixtures.
pub fn fixture_files(root: &Path, resource_type: &str) -> HarnessResult<Vec<PathBuf>> {
    let dir = fixture_directory(root, resource_type);
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = list_files(&dir, |name| name.ends_with(".xml"))?;
    files.extend(list_files(&dir, |name| name.ends_with(".json"))?);
    Ok(files)
}

/// `path` relative to `root` with `/` separators, the key used for ownership.
pub fn relative_key(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn list_files(dir: &Path, accept: impl Fn(&str) -> bool) -> HarnessResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| HarnessError::io(dir, e))? {
        let entry = entry.map_err(|e| HarnessError::io(dir, e))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if path.file_name().and_then(|n| n.to_str()).map_or(false, &accept) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
