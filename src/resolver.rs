//! Looking up structure definitions by canonical URL.

use crate::definition::StructureDefinition;
use crate::errors::{HarnessError, HarnessResult};
use crate::loader;
use crate::skeleton::StructureDefinitionSkeleton;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Reads definition sources.
pub trait SourceReader: Send + Sync {
    fn read(&self, path: &Path) -> HarnessResult<String>;
}

/// Reads from the filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileReader;

impl SourceReader for FileReader {
    fn read(&self, path: &Path) -> HarnessResult<String> {
        loader::read_source(path)
    }
}

/// Resolves canonical URLs to parsed definitions.
///
/// Sources are parsed on first request and cached until [`invalidate`]
/// is called, which a full rescan does.
///
/// [`invalidate`]: CanonicalResolver::invalidate
pub struct CanonicalResolver {
    /// (canonical url, source file); first skeleton wins on duplicates.
    index: HashMap<String, PathBuf>,
    reader: Box<dyn SourceReader>,
    cache: Mutex<HashMap<String, Arc<StructureDefinition>>>,
}

impl CanonicalResolver {
    pub fn new<'a>(skeletons: impl IntoIterator<Item = &'a StructureDefinitionSkeleton>) -> Self {
        Self::with_reader(skeletons, FileReader)
    }

    pub fn with_reader<'a>(
        skeletons: impl IntoIterator<Item = &'a StructureDefinitionSkeleton>,
        reader: impl SourceReader + 'static,
    ) -> Self {
        let mut index = HashMap::new();
        for sd in skeletons {
            if let Some(url) = &sd.canonical_url {
                index
                    .entry(url.clone())
                    .or_insert_with(|| sd.filename.clone());
            }
        }
        Self {
            index,
            reader: Box::new(reader),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// The definition with this canonical URL, or `None` when no skeleton
    /// declares it. Read and parse failures propagate.
    pub fn resolve_by_canonical_uri(&self, uri: &str) -> HarnessResult<Option<Arc<StructureDefinition>>> {
        let Some(path) = self.index.get(uri) else {
            return Ok(None);
        };

        let mut cache = self.cache.lock();
        if let Some(definition) = cache.get(uri) {
            return Ok(Some(definition.clone()));
        }

        debug!(uri, path = %path.display(), "parsing definition");
        let text = self.reader.read(path)?;
        let definition = Arc::new(StructureDefinition::parse(path, &text)?);
        cache.insert(uri.to_string(), definition.clone());
        Ok(Some(definition))
    }

    /// Resolution by location is never needed by the harness.
    pub fn resolve_by_uri(&self, uri: &str) -> HarnessResult<Option<Arc<StructureDefinition>>> {
        Err(HarnessError::UnsupportedResolution {
            uri: uri.to_string(),
        })
    }

    /// Drop every cached definition.
    pub fn invalidate(&self) {
        self.cache.lock().clear();
    }

    pub fn cached(&self) -> usize {
        self.cache.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const FOO: &str = r#"<StructureDefinition xmlns="http://hl7.org/fhir">
  <url value="http://example.org/StructureDefinition/Foo"/>
  <type value="Foo"/>
  <kind value="resource"/>
</StructureDefinition>"#;

    /// Serves `FOO` and counts reads.
    struct SpyReader {
        reads: Arc<AtomicUsize>,
        text: &'static str,
    }

    impl SourceReader for SpyReader {
        fn read(&self, _path: &Path) -> HarnessResult<String> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(self.text.to_string())
        }
    }

    fn skeleton(file: &str, url: &str) -> StructureDefinitionSkeleton {
        let mut sd = StructureDefinitionSkeleton::new(file, Some("Foo".to_string()));
        sd.canonical_url = Some(url.to_string());
        sd
    }

    #[test]
    fn test_second_lookup_is_a_cache_hit() {
        let reads = Arc::new(AtomicUsize::new(0));
        let skeletons = vec![skeleton("foo.profile.xml", "http://example.org/StructureDefinition/Foo")];
        let resolver = CanonicalResolver::with_reader(
            &skeletons,
            SpyReader {
                reads: reads.clone(),
                text: FOO,
            },
        );

        let first = resolver
            .resolve_by_canonical_uri("http://example.org/StructureDefinition/Foo")
            .unwrap()
            .unwrap();
        assert_eq!(first.type_name.as_deref(), Some("Foo"));
        let second = resolver
            .resolve_by_canonical_uri("http://example.org/StructureDefinition/Foo")
            .unwrap()
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(reads.load(Ordering::SeqCst), 1);

        resolver.invalidate();
        resolver
            .resolve_by_canonical_uri("http://example.org/StructureDefinition/Foo")
            .unwrap();
        assert_eq!(reads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unknown_uri_is_none_without_reading() {
        let reads = Arc::new(AtomicUsize::new(0));
        let skeletons = vec![skeleton("foo.profile.xml", "http://example.org/StructureDefinition/Foo")];
        let resolver = CanonicalResolver::with_reader(
            &skeletons,
            SpyReader {
                reads: reads.clone(),
                text: FOO,
            },
        );

        assert!(resolver
            .resolve_by_canonical_uri("http://example.org/StructureDefinition/Bar")
            .unwrap()
            .is_none());
        assert_eq!(reads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_parse_failure_propagates_and_is_not_cached() {
        let reads = Arc::new(AtomicUsize::new(0));
        let skeletons = vec![skeleton("foo.profile.xml", "urn:foo")];
        let resolver = CanonicalResolver::with_reader(
            &skeletons,
            SpyReader {
                reads: reads.clone(),
                text: "<StructureDefinition",
            },
        );

        let err = resolver.resolve_by_canonical_uri("urn:foo").unwrap_err();
        assert!(matches!(err, HarnessError::Parse { .. }));
        assert_eq!(resolver.cached(), 0);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let skeletons = vec![skeleton(
            dir.path().join("gone.profile.xml").to_str().unwrap(),
            "urn:gone",
        )];
        let resolver = CanonicalResolver::new(&skeletons);
        let err = resolver.resolve_by_canonical_uri("urn:gone").unwrap_err();
        assert!(matches!(err, HarnessError::Io { .. }));
    }

    #[test]
    fn test_first_skeleton_wins_duplicate_urls() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.profile.xml");
        std::fs::write(&first, FOO).unwrap();
        let skeletons = vec![
            skeleton(first.to_str().unwrap(), "urn:dup"),
            skeleton(dir.path().join("second.profile.xml").to_str().unwrap(), "urn:dup"),
        ];
        let resolver = CanonicalResolver::new(&skeletons);
        assert!(resolver.resolve_by_canonical_uri("urn:dup").unwrap().is_some());
    }

    #[test]
    fn test_resolution_by_location_is_unsupported() {
        let resolver = CanonicalResolver::new(std::iter::empty());
        let err = resolver.resolve_by_uri("foo.profile.xml").unwrap_err();
        assert!(matches!(err, HarnessError::UnsupportedResolution { .. }));
    }
}
