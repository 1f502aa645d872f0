//! A scan pass and the bulk test pass over its skeletons.

use crate::config::HarnessConfig;
use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::errors::HarnessResult;
use crate::fixture;
use crate::harness::Harness;
use crate::loader;
use crate::remap::ContextRemap;
use crate::resolver::CanonicalResolver;
use crate::scanner::Scanner;
use crate::skeleton::{SkeletonId, StructureDefinitionSkeleton};
use crate::summary::DefinitionSummaryProvider;
use crate::validation::InstanceValidator;
use fhir_expression::ExpressionEngine;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// A file tested for a skeleton.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedFile {
    pub path: PathBuf,
    pub expect_success: bool,
}

/// Which skeleton owns each tested file, keyed by normalized relative path.
/// The first skeleton to test a path owns it.
#[derive(Debug, Default)]
pub struct Ownership {
    owners: HashMap<String, SkeletonId>,
    files: HashMap<SkeletonId, Vec<OwnedFile>>,
}

impl Ownership {
    /// Returns `false` when the path already had an owner.
    pub fn record(&mut self, key: String, owner: SkeletonId, file: OwnedFile) -> bool {
        if self.owners.contains_key(&key) {
            return false;
        }
        self.owners.insert(key, owner);
        self.files.entry(owner).or_default().push(file);
        true
    }

    pub fn owner(&self, key: &str) -> Option<SkeletonId> {
        self.owners.get(key).copied()
    }

    /// Files owned by a skeleton, in the order they were first tested.
    pub fn files(&self, owner: SkeletonId) -> &[OwnedFile] {
        self.files.get(&owner).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    pub fn clear(&mut self) {
        self.owners.clear();
        self.files.clear();
    }
}

/// Skeletons of one scan pass plus everything needed to test them.
pub struct Session {
    root: PathBuf,
    filter: Option<String>,
    config: HarnessConfig,
    remap: ContextRemap,
    engine: Box<dyn ExpressionEngine>,
    validator: Option<Box<dyn InstanceValidator>>,
    sink: Arc<dyn DiagnosticSink>,
    skeletons: Vec<Arc<Mutex<StructureDefinitionSkeleton>>>,
    total_invariants: usize,
    resolver: CanonicalResolver,
    ownership: Mutex<Ownership>,
}

impl Session {
    /// Scan `<root>/publish` and prepare the skeletons for testing.
    pub fn scan(
        root: impl Into<PathBuf>,
        filter: Option<String>,
        config: HarnessConfig,
        engine: Box<dyn ExpressionEngine>,
        sink: Arc<dyn DiagnosticSink>,
    ) -> HarnessResult<Self> {
        let remap = config.context_remap();
        let mut session = Self {
            root: root.into(),
            filter,
            config,
            remap,
            engine,
            validator: None,
            sink,
            skeletons: Vec::new(),
            total_invariants: 0,
            resolver: CanonicalResolver::new(std::iter::empty()),
            ownership: Mutex::new(Ownership::default()),
        };
        session.rescan()?;
        Ok(session)
    }

    pub fn with_validator(mut self, validator: Box<dyn InstanceValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Replace every skeleton with a fresh scan. Counters, ownership and the
    /// resolver cache start over.
    pub fn rescan(&mut self) -> HarnessResult<()> {
        let publish = self.root.join(loader::PUBLISH_DIR);
        let scanner = Scanner::new(&self.remap, &self.config.skip_root_names, self.sink.as_ref());
        let result = scanner.scan(&publish)?;

        self.resolver.invalidate();
        self.resolver = CanonicalResolver::new(&result.skeletons);
        self.total_invariants = result.total_invariants;
        self.skeletons = result
            .skeletons
            .into_iter()
            .map(|sd| Arc::new(Mutex::new(sd)))
            .collect();
        self.ownership.lock().clear();
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn filter(&self) -> Option<&str> {
        self.filter.as_deref()
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn total_invariants(&self) -> usize {
        self.total_invariants
    }

    pub fn len(&self) -> usize {
        self.skeletons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skeletons.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = SkeletonId> {
        (0..self.skeletons.len()).map(SkeletonId)
    }

    pub fn skeleton(&self, id: SkeletonId) -> Option<&Arc<Mutex<StructureDefinitionSkeleton>>> {
        self.skeletons.get(id.0)
    }

    /// Whether the resource filter lets this skeleton through.
    pub fn selects(&self, sd: &StructureDefinitionSkeleton) -> bool {
        self.filter
            .as_deref()
            .map_or(true, |f| sd.resource_type.as_deref() == Some(f))
    }

    /// The skeleton owning a path relative to the root.
    pub fn owner_of(&self, relative: &str) -> Option<SkeletonId> {
        self.ownership.lock().owner(relative)
    }

    pub fn owned_files(&self, id: SkeletonId) -> Vec<OwnedFile> {
        self.ownership.lock().files(id).to_vec()
    }

    /// Bulk pass: test every selected skeleton's examples and fixtures.
    pub fn run_all(&self) {
        for id in self.ids() {
            self.run(id);
        }
        info!(owned_files = self.ownership.lock().len(), "bulk pass complete");
    }

    /// Test one skeleton's examples and fixtures, recording ownership.
    /// Profiles are never tested, so they never own files.
    /// Enumeration failures are reported and leave the other skeletons alone.
    pub fn run(&self, id: SkeletonId) {
        let Some(skeleton) = self.skeleton(id) else {
            return;
        };
        let mut sd = skeleton.lock();
        if !self.selects(&sd)
            || sd.is_data_type
            || sd.is_profile
            || sd.invariants.is_empty()
            || sd.resource_type.is_none()
        {
            return;
        }

        if let Err(err) = self.run_files(id, &mut sd) {
            self.sink.emit(Diagnostic::DefinitionFailed {
                resource_type: sd.type_name().to_string(),
                message: err.to_string(),
            });
        }
    }

    /// Reset a skeleton's counters and re-test exactly the files it owns.
    pub fn retest(&self, id: SkeletonId) {
        let Some(skeleton) = self.skeleton(id) else {
            return;
        };
        let files = self.owned_files(id);
        let mut sd = skeleton.lock();
        sd.reset_stats();

        let provider = DefinitionSummaryProvider::new(&self.resolver);
        let harness = self.harness(&provider);
        for file in &files {
            harness.test_example(&mut sd, &self.root, &file.path, file.expect_success);
        }
        debug!(resource_type = sd.type_name(), files = files.len(), "retested");
    }

    fn harness<'a>(&'a self, provider: &'a DefinitionSummaryProvider<'a>) -> Harness<'a> {
        let harness = Harness::new(self.engine.as_ref(), provider, &self.config, self.sink.as_ref());
        match &self.validator {
            Some(validator) => harness.with_validator(validator.as_ref()),
            None => harness,
        }
    }

    fn run_files(&self, id: SkeletonId, sd: &mut StructureDefinitionSkeleton) -> HarnessResult<()> {
        let provider = DefinitionSummaryProvider::new(&self.resolver);
        let harness = self.harness(&provider);
        let resource_type = sd.type_name().to_string();

        for file in loader::example_files(&self.root, &resource_type, &self.config)? {
            harness.test_example(sd, &self.root, &file, true);
            self.own(id, file, true);
        }

        let fixture_dir = loader::fixture_directory(&self.root, &resource_type);
        if !fixture_dir.exists() && self.filter.is_some() {
            let count = fixture::seed_fixtures(&self.root, sd)?;
            self.sink.emit(Diagnostic::FixturesSeeded {
                directory: PathBuf::from(loader::relative_key(&self.root, &fixture_dir)),
                count,
            });
        }

        for file in loader::fixture_files(&self.root, &resource_type)? {
            let expect_success = fixture::expects_success(&file);
            harness.test_example(sd, &self.root, &file, expect_success);
            self.own(id, file, expect_success);
        }
        Ok(())
    }

    fn own(&self, id: SkeletonId, path: PathBuf, expect_success: bool) {
        let key = loader::relative_key(&self.root, &path);
        self.ownership
            .lock()
            .record(key, id, OwnedFile { path, expect_success });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(path: &str) -> OwnedFile {
        OwnedFile {
            path: PathBuf::from(path),
            expect_success: true,
        }
    }

    #[test]
    fn test_first_owner_wins() {
        let mut ownership = Ownership::default();
        assert!(ownership.record("source/a/a-1.xml".into(), SkeletonId(0), file("/r/source/a/a-1.xml")));
        assert!(!ownership.record("source/a/a-1.xml".into(), SkeletonId(3), file("/r/source/a/a-1.xml")));
        assert!(ownership.record("source/a/a-2.xml".into(), SkeletonId(0), file("/r/source/a/a-2.xml")));

        assert_eq!(ownership.owner("source/a/a-1.xml"), Some(SkeletonId(0)));
        assert_eq!(ownership.files(SkeletonId(0)).len(), 2);
        assert!(ownership.files(SkeletonId(3)).is_empty());

        ownership.clear();
        assert!(ownership.is_empty());
        assert_eq!(ownership.owner("source/a/a-1.xml"), None);
    }
}
