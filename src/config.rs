//! Harness configuration loaded from an optional TOML file.

use crate::errors::{HarnessError, HarnessResult};
use crate::remap::{ContextRemap, RemapEntry};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Example file name fragments that are never treated as examples.
const DEFAULT_EXAMPLE_SKIPS: &[&str] = &[
    "Archive",
    "-examples-header",
    "-introduction",
    "-notes",
    "-search-params.xml",
    "patient-examples-cypress-template.xml",
    "testscript-ats.xml",
    "diagnosticreport-examples-lab-text.xml",
    "questionnaireresponse-example-ussg-fht-answers.xml",
];

/// Example file name suffixes that are never treated as examples.
const DEFAULT_EXAMPLE_SKIP_SUFFIXES: &[&str] = &["-exceptions.xml"];

/// Root element names of wrapper documents that are never tested.
const DEFAULT_SKIP_ROOT_NAMES: &[&str] = &["Workbook", "div"];

const DEFAULT_DEBOUNCE_MS: u64 = 100;

/// Loaded harness configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Context remap entries added to (or overriding) the built-in table.
    pub remap: Vec<RemapEntry>,
    /// Substrings that exclude a path from example enumeration.
    pub example_skips: Vec<String>,
    /// Suffixes that exclude a path from example enumeration.
    pub example_skip_suffixes: Vec<String>,
    pub skip_root_names: Vec<String>,
    /// Quiet period before the monitor re-tests a changed file.
    pub debounce_ms: u64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            remap: Vec::new(),
            example_skips: to_strings(DEFAULT_EXAMPLE_SKIPS),
            example_skip_suffixes: to_strings(DEFAULT_EXAMPLE_SKIP_SUFFIXES),
            skip_root_names: to_strings(DEFAULT_SKIP_ROOT_NAMES),
            debounce_ms: DEFAULT_DEBOUNCE_MS,
        }
    }
}

impl HarnessConfig {
    /// Load from a TOML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> HarnessResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| HarnessError::io(path, e))?;
        Self::from_toml(&content).map_err(|message| HarnessError::Config {
            path: path.to_path_buf(),
            message,
        })
    }

    pub fn from_toml(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    /// The built-in remap table with this configuration's entries applied.
    pub fn context_remap(&self) -> ContextRemap {
        ContextRemap::built_in().with_entries(self.remap.iter().cloned())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Whether an example path is excluded by the skip lists.
    pub fn skips_example(&self, path: &str) -> bool {
        self.example_skips.iter().any(|s| path.contains(s.as_str()))
            || self
                .example_skip_suffixes
                .iter()
                .any(|s| path.ends_with(s.as_str()))
    }

    pub fn skips_root(&self, name: &str) -> bool {
        self.skip_root_names.iter().any(|n| n == name)
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
