//! Targeted fixture naming.
//!
//! A fixture named `<key>.<label>.pass.<ext>` or `<key>.<label>.fail.<ext>`
//! exists to exercise exactly one invariant.

use crate::errors::{HarnessError, HarnessResult};
use crate::loader;
use crate::skeleton::StructureDefinitionSkeleton;
use std::fs;
use std::path::Path;

const PASS_SUFFIX: &str = ".pass";
const FAIL_SUFFIX: &str = ".fail";

/// The file name without its final extension.
pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Fixtures expect success unless their stem ends in `.fail`.
pub fn expects_success(path: &Path) -> bool {
    !file_stem(path).ends_with(FAIL_SUFFIX)
}

/// Whether `stem` names a fixture for the invariant `key`.
pub fn targets(stem: &str, key: &str) -> bool {
    !key.is_empty()
        && stem.len() > key.len()
        && stem.starts_with(key)
        && stem.as_bytes()[key.len()] == b'.'
}

/// Whether `stem` is a targeted fixture for one of `keys`.
pub fn is_targeted<'a>(stem: &str, mut keys: impl Iterator<Item = &'a str>) -> bool {
    (stem.ends_with(PASS_SUFFIX) || stem.ends_with(FAIL_SUFFIX)) && keys.any(|k| targets(stem, k))
}

/// Create the fixture directory for a definition and seed it with one
/// `<key>.f1.fail.xml` copy of the default example per invariant.
///
/// Returns the number of fixtures written; a missing default example
/// leaves the directory empty.
pub fn seed_fixtures(root: &Path, sd: &StructureDefinitionSkeleton) -> HarnessResult<usize> {
    let resource_type = sd.type_name();
    let directory = loader::fixture_directory(root, resource_type);
    fs::create_dir_all(&directory).map_err(|e| HarnessError::io(&directory, e))?;

    let example = loader::default_example(root, resource_type);
    if !example.is_file() {
        return Ok(0);
    }

    for invariant in &sd.invariants {
        let target = directory.join(format!("{}.f1.fail.xml", invariant.key));
        fs::copy(&example, &target).map_err(|e| HarnessError::io(&target, e))?;
    }
    Ok(sd.invariants.len())
}
