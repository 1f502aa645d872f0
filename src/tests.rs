use crate::diagnostics::{CollectingSink, Diagnostic};
use crate::monitor::{ChangeEvent, Monitor, MonitorState};
use crate::report::{self, ReportRow};
use crate::session::Session;
use crate::skeleton::{SkeletonId, StructureDefinitionSkeleton};
use crate::HarnessConfig;
use fhir_expression::NavigationEngine;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Copy the bundled specification tree into a scratch directory, so tests
/// that seed or edit files never touch the checked-in fixtures.
fn copy_spec_tree() -> TempDir {
    let source = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures").join("spec");
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    copy_tree(&source, dir.path());
    dir
}

fn copy_tree(from: &Path, to: &Path) {
    fs::create_dir_all(to).unwrap();
    for entry in fs::read_dir(from).unwrap() {
        let entry = entry.unwrap();
        let target = to.join(entry.file_name());
        if entry.path().is_dir() {
            copy_tree(&entry.path(), &target);
        } else {
            fs::copy(entry.path(), &target).unwrap();
        }
    }
}

fn write(root: &Path, relative: &str, content: &str) -> PathBuf {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, content).unwrap();
    path
}

fn open(root: &Path, filter: Option<&str>) -> (Session, Arc<CollectingSink>) {
    let sink = Arc::new(CollectingSink::new());
    let session = Session::scan(
        root,
        filter.map(str::to_string),
        HarnessConfig::default(),
        Box::new(NavigationEngine::new()),
        sink.clone(),
    )
    .expect("Failed to scan specification tree");
    (session, sink)
}

fn row<'a>(rows: &'a [ReportRow], key: &str) -> &'a ReportRow {
    rows.iter()
        .find(|r| r.key == key)
        .unwrap_or_else(|| panic!("no row for {}", key))
}

fn counts(row: &ReportRow) -> (u32, u32, u32) {
    (row.success, row.fail, row.error)
}

fn find(session: &Session, resource_type: &str) -> SkeletonId {
    session
        .ids()
        .find(|&id| {
            let sd = session.skeleton(id).unwrap().lock();
            sd.resource_type.as_deref() == Some(resource_type) && !sd.is_profile
        })
        .unwrap()
}

// ============================================================================
// Bulk pass over the bundled tree
// ============================================================================

#[test]
fn test_scan_counts_definitions_and_invariants() {
    let dir = copy_spec_tree();
    let (session, sink) = open(dir.path(), None);

    // the Workbook wrapper produces no skeleton
    assert_eq!(session.len(), 4);
    assert_eq!(session.total_invariants(), 10);
    // every contentReference target is covered by the remap table
    assert!(sink
        .events()
        .iter()
        .all(|d| !matches!(d, Diagnostic::DependentType { .. })));
}

#[test]
fn test_bulk_pass_tallies() {
    let dir = copy_spec_tree();
    let (session, sink) = open(dir.path(), None);
    session.run_all();

    let rows = report::session_rows(&session);
    // the HumanName data type is not reported
    assert_eq!(rows.len(), 9);
    assert!(rows.iter().all(|r| r.resource_type != "HumanName"));

    // bluebook's name has spaces
    assert_eq!(counts(row(&rows, "que-0")), (1, 1, 0));
    // bluebook's neonatal group has no children
    assert_eq!(counts(row(&rows, "que-1")), (8, 1, 1));
    assert_eq!(counts(row(&rows, "que-6")), (8, 0, 0));
    assert_eq!(counts(row(&rows, "que-9")), (8, 0, 0));
    assert_eq!(counts(row(&rows, "que-7")), (1, 1, 0));

    assert_eq!(counts(row(&rows, "obs-6")), (2, 1, 0));
    // intersect() is not supported by the navigation engine
    assert_eq!(counts(row(&rows, "obs-7")), (0, 0, 2));
    // the second blood pressure component's range is empty
    assert_eq!(counts(row(&rows, "obs-3")), (2, 0, 1));

    let vital = row(&rows, "vs-2");
    assert_eq!(counts(vital), (0, 0, 0));
    assert_eq!(
        vital.profile.as_deref(),
        Some("http://hl7.org/fhir/StructureDefinition/vitalsigns")
    );

    assert_eq!(report::exit_code(&rows), 1);

    // notes pages are never examples
    assert!(session
        .owner_of("source/questionnaire/questionnaire-notes.xml")
        .is_none());
    let questionnaire = find(&session, "Questionnaire");
    assert_eq!(
        session.owner_of("source/questionnaire/invariant-tests/que-1.f1.pass.json"),
        Some(questionnaire)
    );
    assert_eq!(session.owned_files(questionnaire).len(), 5);

    let unexpected = sink
        .problems()
        .into_iter()
        .filter(|d| matches!(d, Diagnostic::Unexpected { .. }))
        .count();
    assert_eq!(unexpected, 2);
}

#[test]
fn test_filter_limits_the_pass() {
    let dir = copy_spec_tree();
    let (session, _sink) = open(dir.path(), Some("Observation"));
    session.run_all();

    let rows = report::session_rows(&session);
    assert!(rows.iter().all(|r| r.resource_type == "Observation"));
    assert_eq!(rows.len(), 4);

    let questionnaire = find(&session, "Questionnaire");
    let sd = session.skeleton(questionnaire).unwrap().lock();
    assert!(sd.invariants.iter().all(|i| i.tally.total() == 0));
    assert!(session.owned_files(questionnaire).is_empty());
}

#[test]
fn test_json_report_shape() {
    let dir = copy_spec_tree();
    let (session, _sink) = open(dir.path(), Some("Questionnaire"));
    session.run_all();

    let rows = report::session_rows(&session);
    let json: serde_json::Value = serde_json::from_str(&report::render_json(&rows).unwrap()).unwrap();
    assert_eq!(json["ok"], false);
    assert_eq!(json["data"].as_array().unwrap().len(), 5);
    assert_eq!(json["data"][0]["key"], "que-0");
    assert_eq!(json["data"][0]["severity"], "warning");
    assert!(json["data"][0]["profile"].is_null());
}

// ============================================================================
// Minimal definitions
// ============================================================================

fn foo_definition(severity: &str, expression: &str) -> String {
    format!(
        r#"<StructureDefinition xmlns="http://hl7.org/fhir">
  <url value="http://example.org/fhir/StructureDefinition/Foo"/>
  <kind value="resource"/>
  <type value="Foo"/>
  <derivation value="specialization"/>
  <differential>
    <element id="Foo">
      <path value="Foo"/>
      <constraint>
        <key value="foo-1"/>
        <severity value="{}"/>
        <expression value="{}"/>
      </constraint>
    </element>
  </differential>
</StructureDefinition>"#,
        severity, expression
    )
}

fn foo_tally(severity: &str, expression: &str) -> (u32, u32, u32) {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "publish/foo.profile.xml", &foo_definition(severity, expression));
    write(
        dir.path(),
        "source/foo/foo-example.xml",
        r#"<Foo xmlns="http://hl7.org/fhir"><id value="f1"/></Foo>"#,
    );

    let (session, _sink) = open(dir.path(), None);
    session.run_all();
    // without a filter nothing is seeded
    assert!(!dir.path().join("source/foo/invariant-tests").exists());
    counts(row(&report::session_rows(&session), "foo-1"))
}

#[test]
fn test_single_example_outcomes() {
    assert_eq!(foo_tally("error", "true"), (1, 0, 0));
    assert_eq!(foo_tally("error", "false"), (0, 0, 1));
    assert_eq!(foo_tally("warning", "false"), (0, 1, 0));
}

#[test]
fn test_filtered_run_seeds_fixtures() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "publish/foo.profile.xml", &foo_definition("error", "true"));
    write(
        dir.path(),
        "source/foo/foo-example.xml",
        r#"<Foo xmlns="http://hl7.org/fhir"><id value="f1"/></Foo>"#,
    );

    let (session, sink) = open(dir.path(), Some("Foo"));
    session.run_all();

    assert!(dir.path().join("source/foo/invariant-tests/foo-1.f1.fail.xml").is_file());
    // the seeded copy satisfies the invariant, so the expected failure is an error
    assert_eq!(counts(row(&report::session_rows(&session), "foo-1")), (1, 0, 1));
    assert!(sink.events().iter().any(|d| matches!(
        d,
        Diagnostic::FixturesSeeded { count: 1, directory } if directory == Path::new("source/foo/invariant-tests")
    )));
}

#[test]
fn test_profiles_are_reported_but_never_tested() {
    let dir = copy_spec_tree();
    let (session, _sink) = open(dir.path(), Some("Observation"));
    session.run_all();

    let profile = session
        .ids()
        .find(|&id| session.skeleton(id).unwrap().lock().is_profile)
        .unwrap();
    assert!(session.owned_files(profile).is_empty());
    let sd: &StructureDefinitionSkeleton = &session.skeleton(profile).unwrap().lock();
    assert_eq!(sd.invariants[0].tally.total(), 0);
}

// ============================================================================
// Monitoring
// ============================================================================

const BLUEBOOK: &str = "source/questionnaire/questionnaire-example-bluebook.xml";

#[test]
fn test_change_to_owned_file_retests_owner() {
    let dir = copy_spec_tree();
    let (session, _sink) = open(dir.path(), None);
    session.run_all();
    let questionnaire = find(&session, "Questionnaire");

    let fixed = fs::read_to_string(dir.path().join(BLUEBOOK))
        .unwrap()
        .replace(
            r#"<type value="group"/>
  </item>"#,
            r#"<type value="group"/>
    <item>
      <linkId value="birthWeight"/>
      <type value="decimal"/>
    </item>
  </item>"#,
        );
    write(dir.path(), BLUEBOOK, &fixed);

    let mut reports = Vec::new();
    let mut monitor = Monitor::new(&session, |id, rows: &[ReportRow]| reports.push((id, rows.to_vec())));
    let t0 = Instant::now();

    // unowned paths never arm a re-test
    monitor.handle(ChangeEvent::Changed(dir.path().join("source/questionnaire/new-file.xml")), t0);
    assert_eq!(monitor.pending(), 0);

    // repeated notifications coalesce into one re-test
    monitor.handle(ChangeEvent::Changed(dir.path().join(BLUEBOOK)), t0);
    monitor.handle(ChangeEvent::Changed(dir.path().join(BLUEBOOK)), t0);
    assert_eq!(monitor.pending(), 1);

    assert!(monitor.process_ready(t0).is_empty());
    assert_eq!(monitor.process_ready(t0 + Duration::from_secs(1)), vec![questionnaire]);
    assert_eq!(monitor.state(), MonitorState::Idle);
    assert_eq!(monitor.pending(), 0);
    drop(monitor);

    assert_eq!(reports.len(), 1);
    let (id, rows) = &reports[0];
    assert_eq!(*id, questionnaire);
    assert_eq!(counts(row(rows, "que-1")), (10, 1, 0));
    // counters start over instead of accumulating
    assert_eq!(counts(row(rows, "que-0")), (1, 1, 0));

    // other skeletons keep their bulk results
    let rows = report::session_rows(&session);
    assert_eq!(counts(row(&rows, "obs-3")), (2, 0, 1));
}

#[test]
fn test_rename_of_owned_file_is_not_retested() {
    let dir = copy_spec_tree();
    let (session, _sink) = open(dir.path(), None);
    session.run_all();
    assert!(session.owner_of(BLUEBOOK).is_some());

    let mut reports = 0;
    let mut monitor = Monitor::new(&session, |_, _: &[ReportRow]| reports += 1);
    let t0 = Instant::now();

    monitor.handle(
        ChangeEvent::Renamed {
            from: dir.path().join(BLUEBOOK),
            to: Some(dir.path().join("source/questionnaire/questionnaire-example-renamed.xml")),
        },
        t0,
    );
    monitor.handle(
        ChangeEvent::Renamed {
            from: dir.path().join(BLUEBOOK),
            to: None,
        },
        t0,
    );
    assert_eq!(monitor.pending(), 0);
    assert!(monitor.process_ready(t0 + Duration::from_secs(1)).is_empty());
    assert_eq!(monitor.state(), MonitorState::Idle);
    drop(monitor);

    assert_eq!(reports, 0);
    // ownership is left as it was
    assert!(session.owner_of(BLUEBOOK).is_some());
}

#[test]
fn test_rescan_clears_ownership() {
    let dir = copy_spec_tree();
    let (mut session, _sink) = open(dir.path(), None);
    session.run_all();
    assert!(session.owner_of(BLUEBOOK).is_some());

    session.rescan().unwrap();
    assert!(session.owner_of(BLUEBOOK).is_none());
    assert_eq!(session.total_invariants(), 10);
    let rows = report::session_rows(&session);
    assert!(rows.iter().all(|r| counts(r) == (0, 0, 0)));
}
