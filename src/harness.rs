//! Evaluating invariants against one example or fixture file.
//!
//! Each file runs through a fixed procedure: read, parse, type, optionally
//! validate, resolve every invariant's context values, evaluate the
//! invariant per value, then classify the per-value verdicts into the
//! invariant's counters. Failures are scoped: a bad file skips only that
//! file, a bad invariant counts one error and the next invariant runs.

use crate::config::HarnessConfig;
use crate::diagnostics::{Diagnostic, DiagnosticSink, InvariantLabel};
use crate::errors::{HarnessError, HarnessResult};
use crate::fixture;
use crate::loader;
use crate::references::StandInResolver;
use crate::skeleton::{InvariantSkeleton, Outcome, Severity, StructureDefinitionSkeleton};
use crate::validation::{AcceptAllTerminology, InstanceValidator};
use fhir_element::{parse, DocumentFormat, SourceNode, SummaryProvider, TypedElement};
use fhir_expression::{EvaluationEnvironment, ExpressionEngine, Value};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, trace};

/// Result of an invariant on one context value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    True,
    /// A value other than a single boolean `true`.
    False,
    /// No value at all.
    Empty,
}

impl Verdict {
    pub fn from_results(results: &[Value]) -> Self {
        match results {
            [] => Verdict::Empty,
            [single] if single.as_boolean() == Some(true) => Verdict::True,
            _ => Verdict::False,
        }
    }

    pub fn is_true(self) -> bool {
        self == Verdict::True
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::True => f.write_str("true"),
            Verdict::False => f.write_str("false"),
            Verdict::Empty => f.write_str("(null)"),
        }
    }
}

/// How a file relates to the invariant being classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// The file exists to test this one invariant.
    Targeted,
    /// A corpus example tested against every invariant.
    Bulk,
}

/// One counter increment; `verdict` is set for per-value bulk outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classified {
    pub outcome: Outcome,
    pub verdict: Option<Verdict>,
}

impl Classified {
    fn whole(outcome: Outcome) -> Self {
        Self {
            outcome,
            verdict: None,
        }
    }

    fn per_value(outcome: Outcome, verdict: Verdict) -> Self {
        Self {
            outcome,
            verdict: Some(verdict),
        }
    }
}

/// Turn the verdicts of one invariant on one file into counter increments.
///
/// Targeted fixtures produce exactly one increment. Bulk examples classify
/// each value: a `true` next to failing values on a file expected to fail is
/// tolerated without an increment, and `warning` invariants count unexpected
/// failures as fails rather than errors.
pub fn classify(verdicts: &[Verdict], mode: Mode, expect_success: bool, severity: &Severity) -> Vec<Classified> {
    let all_true = verdicts.iter().all(|v| v.is_true());
    let any_fail = verdicts.iter().any(|v| !v.is_true());
    let evaluated = !verdicts.is_empty();

    match mode {
        Mode::Targeted if expect_success => {
            if all_true && evaluated {
                vec![Classified::whole(Outcome::Success)]
            } else {
                vec![Classified::whole(Outcome::Error)]
            }
        }
        Mode::Targeted => {
            if any_fail && evaluated {
                vec![Classified::whole(Outcome::Fail)]
            } else {
                vec![Classified::whole(Outcome::Error)]
            }
        }
        Mode::Bulk => verdicts
            .iter()
            .filter_map(|&verdict| {
                let outcome = if verdict.is_true() {
                    if expect_success {
                        Outcome::Success
                    } else if !any_fail {
                        Outcome::Error
                    } else {
                        return None;
                    }
                } else if !expect_success || severity.is_warning() {
                    Outcome::Fail
                } else {
                    Outcome::Error
                };
                Some(Classified::per_value(outcome, verdict))
            })
            .collect(),
    }
}

/// Tests files against a skeleton's invariants.
pub struct Harness<'a> {
    engine: &'a dyn ExpressionEngine,
    provider: &'a dyn SummaryProvider,
    config: &'a HarnessConfig,
    sink: &'a dyn DiagnosticSink,
    validator: Option<&'a dyn InstanceValidator>,
}

impl<'a> Harness<'a> {
    pub fn new(
        engine: &'a dyn ExpressionEngine,
        provider: &'a dyn SummaryProvider,
        config: &'a HarnessConfig,
        sink: &'a dyn DiagnosticSink,
    ) -> Self {
        Self {
            engine,
            provider,
            config,
            sink,
            validator: None,
        }
    }

    /// Run structural validation before invariant testing.
    pub fn with_validator(mut self, validator: &'a dyn InstanceValidator) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Test one file, updating the skeleton's counters.
    ///
    /// Data types, profiles and skeletons without invariants or a type are
    /// skipped silently. Read and parse failures are reported and skip the
    /// file.
    pub fn test_example(
        &self,
        sd: &mut StructureDefinitionSkeleton,
        root: &Path,
        file: &Path,
        expect_success: bool,
    ) {
        if sd.is_data_type || sd.is_profile || sd.invariants.is_empty() || sd.resource_type.is_none() {
            return;
        }

        let relative = PathBuf::from(loader::relative_key(root, file));
        let document = loader::read_source(file).and_then(|text| {
            if text.is_empty() {
                return Ok(None);
            }
            let format = DocumentFormat::from_extension(file.extension().and_then(|e| e.to_str()));
            parse(&text, format)
                .map(Some)
                .map_err(|e| HarnessError::parse(file, e))
        });

        let node = match document {
            Ok(Some(node)) => node,
            Ok(None) => return,
            Err(err) => {
                self.sink.emit(Diagnostic::FileSkipped {
                    file: relative,
                    message: err.to_string(),
                });
                return;
            }
        };

        if self.config.skips_root(&node.name) {
            trace!(file = %relative.display(), root = %node.name, "skipping wrapper document");
            return;
        }

        self.sink.emit(Diagnostic::Testing {
            resource: format!("{}/{}", node.name, node.id().unwrap_or_default()),
            file: relative.clone(),
        });
        self.test_document(sd, &node, &relative, file, expect_success);
    }

    fn test_document(
        &self,
        sd: &mut StructureDefinitionSkeleton,
        node: &SourceNode,
        relative: &Path,
        file: &Path,
        expect_success: bool,
    ) {
        let root = TypedElement::from_source(node, self.provider);
        let resolver = StandInResolver::new(node, self.provider);
        let env = EvaluationEnvironment::new(root.clone()).with_resolver(&resolver);

        if let Some(validator) = self.validator {
            let outcome = validator
                .validate(&root, &resolver, &AcceptAllTerminology)
                .filtered();
            if !outcome.success() {
                self.sink.emit(Diagnostic::Validation {
                    file: relative.to_path_buf(),
                    issues: outcome.issues,
                });
            }
        }

        let stem = fixture::file_stem(file);
        let targeted = fixture::is_targeted(&stem, sd.invariants.iter().map(|i| i.key.as_str()));
        let mode = if targeted { Mode::Targeted } else { Mode::Bulk };
        debug!(file = %relative.display(), ?mode, expect_success, "testing invariants");

        let resource_type = sd.type_name().to_string();
        for invariant in &mut sd.invariants {
            if targeted && !fixture::targets(&stem, &invariant.key) {
                continue;
            }

            match self.evaluate(&resource_type, invariant, &root, &env) {
                Ok(verdicts) => {
                    for classified in classify(&verdicts, mode, expect_success, &invariant.severity) {
                        invariant.tally.record(classified.outcome);
                        if classified.outcome == Outcome::Error {
                            self.sink.emit(Diagnostic::Unexpected {
                                invariant: label(invariant),
                                verdict: classified.verdict,
                            });
                        }
                    }
                }
                Err(err) => {
                    invariant.tally.record(Outcome::Error);
                    self.sink.emit(Diagnostic::InvariantFailed {
                        invariant: label(invariant),
                        message: err.to_string(),
                    });
                }
            }
        }
    }

    /// Verdict of the invariant on each of its context values.
    fn evaluate(
        &self,
        resource_type: &str,
        invariant: &InvariantSkeleton,
        root: &Arc<TypedElement>,
        env: &EvaluationEnvironment<'_>,
    ) -> HarnessResult<Vec<Verdict>> {
        let focus = Value::Element(root.clone());
        let contexts = if invariant.context.is_empty() || invariant.context == resource_type {
            vec![focus]
        } else {
            let context = invariant.context.replace("[x]", "");
            self.engine
                .compile(&context)
                .and_then(|compiled| compiled.evaluate(&focus, env))
                .map_err(|e| HarnessError::expression(&context, e))?
        };

        let expression = self
            .engine
            .compile(&invariant.expression)
            .map_err(|e| HarnessError::expression(&invariant.expression, e))?;

        contexts
            .iter()
            .map(|value| {
                expression
                    .evaluate(value, env)
                    .map(|results| Verdict::from_results(&results))
                    .map_err(|e| HarnessError::expression(&invariant.expression, e))
            })
            .collect()
    }
}

fn label(invariant: &InvariantSkeleton) -> InvariantLabel {
    InvariantLabel {
        key: invariant.key.clone(),
        severity: invariant.severity.to_string(),
        context: invariant.context.clone(),
        expression: invariant.expression.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::CollectingSink;
    use crate::skeleton::Tally;
    use crate::validation::{Issue, IssueSeverity, IssueType, TerminologyService, ValidationOutcome};
    use fhir_element::UntypedProvider;
    use fhir_expression::{ElementResolver, NavigationEngine};
    use std::fs;

    use super::Verdict::{Empty, False, True};

    fn outcomes(classified: Vec<Classified>) -> Vec<Outcome> {
        classified.into_iter().map(|c| c.outcome).collect()
    }

    #[test]
    fn test_targeted_pass_requires_all_true() {
        let error = Severity::Error;
        assert_eq!(outcomes(classify(&[True, True], Mode::Targeted, true, &error)), [Outcome::Success]);
        assert_eq!(outcomes(classify(&[True, False], Mode::Targeted, true, &error)), [Outcome::Error]);
        // nothing evaluated
        assert_eq!(outcomes(classify(&[], Mode::Targeted, true, &error)), [Outcome::Error]);
    }

    #[test]
    fn test_targeted_fail_requires_any_failure() {
        let warning = Severity::Warning;
        assert_eq!(outcomes(classify(&[True, Empty], Mode::Targeted, false, &warning)), [Outcome::Fail]);
        assert_eq!(outcomes(classify(&[True], Mode::Targeted, false, &warning)), [Outcome::Error]);
        assert_eq!(outcomes(classify(&[], Mode::Targeted, false, &warning)), [Outcome::Error]);
    }

    #[test]
    fn test_bulk_classifies_each_value() {
        let error = Severity::Error;
        assert_eq!(
            outcomes(classify(&[True, True], Mode::Bulk, true, &error)),
            [Outcome::Success, Outcome::Success]
        );
        assert_eq!(
            outcomes(classify(&[True, False, Empty], Mode::Bulk, true, &error)),
            [Outcome::Success, Outcome::Error, Outcome::Error]
        );
        // no context values, no attempts
        assert!(classify(&[], Mode::Bulk, true, &error).is_empty());
    }

    #[test]
    fn test_bulk_warning_leniency() {
        assert_eq!(
            outcomes(classify(&[False], Mode::Bulk, true, &Severity::Warning)),
            [Outcome::Fail]
        );
        assert_eq!(
            outcomes(classify(&[False], Mode::Bulk, true, &Severity::Error)),
            [Outcome::Error]
        );
        assert_eq!(
            outcomes(classify(&[Empty], Mode::Bulk, true, &Severity::Other("guideline".into()))),
            [Outcome::Error]
        );
    }

    #[test]
    fn test_bulk_true_on_failing_file() {
        let error = Severity::Error;
        // the isolated true among failures is tolerated
        assert_eq!(
            outcomes(classify(&[True, False], Mode::Bulk, false, &error)),
            [Outcome::Fail]
        );
        // all true on a file expected to fail
        let classified = classify(&[True], Mode::Bulk, false, &error);
        assert_eq!(classified, [Classified::per_value(Outcome::Error, True)]);
    }

    #[test]
    fn test_verdict_from_results() {
        assert_eq!(Verdict::from_results(&[]), Empty);
        assert_eq!(Verdict::from_results(&[Value::Boolean(true)]), True);
        assert_eq!(Verdict::from_results(&[Value::Boolean(false)]), False);
        assert_eq!(Verdict::from_results(&[Value::String("true".into())]), False);
        assert_eq!(
            Verdict::from_results(&[Value::Boolean(true), Value::Boolean(true)]),
            False
        );
    }

    struct Fixture {
        dir: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                dir: tempfile::tempdir().unwrap(),
            }
        }

        fn root(&self) -> &Path {
            self.dir.path()
        }

        fn write(&self, relative: &str, content: &str) -> PathBuf {
            let path = self.root().join(relative);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, content).unwrap();
            path
        }
    }

    fn questionnaire(invariants: Vec<InvariantSkeleton>) -> StructureDefinitionSkeleton {
        let mut sd = StructureDefinitionSkeleton::new("questionnaire.profile.xml", Some("Questionnaire".into()));
        sd.invariants = invariants;
        sd
    }

    const NESTED: &str = r#"<Questionnaire xmlns="http://hl7.org/fhir">
  <id value="q1"/>
  <item>
    <linkId value="1"/>
    <type value="group"/>
    <item><linkId value="1.1"/><type value="string"/></item>
  </item>
  <item><linkId value="2"/><type value="group"/></item>
</Questionnaire>"#;

    fn run(sd: &mut StructureDefinitionSkeleton, root: &Path, file: &Path, expect_success: bool) -> CollectingSink {
        let sink = CollectingSink::new();
        let config = HarnessConfig::default();
        let engine = NavigationEngine::new();
        Harness::new(&engine, &UntypedProvider, &config, &sink).test_example(sd, root, file, expect_success);
        sink
    }

    #[test]
    fn test_remapped_context_counts_each_value() {
        let fx = Fixture::new();
        let file = fx.write("source/Questionnaire/questionnaire-example.xml", NESTED);
        let mut sd = questionnaire(vec![InvariantSkeleton::new(
            "que-1",
            "error",
            "Questionnaire.repeat(item)",
            "type = 'group' implies item.exists()",
        )]);

        let sink = run(&mut sd, fx.root(), &file, true);

        // items 1, 1.1 and 2; item 2 is a group without children
        assert_eq!(
            sd.invariants[0].tally,
            Tally {
                success: 2,
                fail: 0,
                error: 1
            }
        );
        let problems = sink.problems();
        assert_eq!(problems.len(), 1);
        assert!(matches!(
            &problems[0],
            Diagnostic::Unexpected { verdict: Some(Verdict::False), .. }
        ));
    }

    #[test]
    fn test_targeted_fixture_runs_only_its_invariant() {
        let fx = Fixture::new();
        let file = fx.write(
            "source/Questionnaire/invariant-tests/que-2.f1.fail.xml",
            NESTED,
        );
        let mut sd = questionnaire(vec![
            InvariantSkeleton::new("que-1", "error", "", "true"),
            InvariantSkeleton::new("que-2", "error", "Questionnaire.item", "item.exists()"),
        ]);

        run(&mut sd, fx.root(), &file, fixture::expects_success(&file));

        assert_eq!(sd.invariants[0].tally.total(), 0);
        assert_eq!(sd.invariants[1].tally, Tally { success: 0, fail: 1, error: 0 });
    }

    #[test]
    fn test_bad_expression_counts_error_and_siblings_continue() {
        let fx = Fixture::new();
        let file = fx.write("source/Questionnaire/questionnaire-example.xml", NESTED);
        let mut sd = questionnaire(vec![
            InvariantSkeleton::new("que-1", "error", "", "item.("),
            InvariantSkeleton::new("que-2", "error", "", "item.exists()"),
        ]);

        let sink = run(&mut sd, fx.root(), &file, true);

        assert_eq!(sd.invariants[0].tally, Tally { success: 0, fail: 0, error: 1 });
        assert_eq!(sd.invariants[1].tally, Tally { success: 1, fail: 0, error: 0 });
        assert!(matches!(&sink.problems()[0], Diagnostic::InvariantFailed { .. }));
    }

    #[test]
    fn test_unreadable_and_malformed_files_are_skipped() {
        let fx = Fixture::new();
        let mut sd = questionnaire(vec![InvariantSkeleton::new("que-1", "error", "", "true")]);

        let broken = fx.write("source/Questionnaire/questionnaire-broken.xml", "<Questionnaire");
        let sink = run(&mut sd, fx.root(), &broken, true);
        assert!(matches!(&sink.problems()[0], Diagnostic::FileSkipped { .. }));

        let missing = fx.root().join("source/Questionnaire/questionnaire-gone.xml");
        let sink = run(&mut sd, fx.root(), &missing, true);
        assert!(matches!(&sink.problems()[0], Diagnostic::FileSkipped { .. }));

        assert_eq!(sd.invariants[0].tally.total(), 0);
    }

    #[test]
    fn test_skip_rules() {
        let fx = Fixture::new();
        let file = fx.write("source/Questionnaire/questionnaire-example.xml", NESTED);
        let wrapper = fx.write(
            "source/Questionnaire/questionnaire-table.xml",
            r#"<div xmlns="http://www.w3.org/1999/xhtml"><p>table</p></div>"#,
        );

        let mut profile = questionnaire(vec![InvariantSkeleton::new("que-1", "error", "", "true")]);
        profile.is_profile = true;
        let sink = run(&mut profile, fx.root(), &file, true);
        assert!(sink.events().is_empty());

        let mut data_type = questionnaire(vec![InvariantSkeleton::new("que-1", "error", "", "true")]);
        data_type.is_data_type = true;
        run(&mut data_type, fx.root(), &file, true);

        let mut sd = questionnaire(vec![InvariantSkeleton::new("que-1", "error", "", "true")]);
        let sink = run(&mut sd, fx.root(), &wrapper, true);
        assert!(sink.events().is_empty());

        for skipped in [&profile, &data_type, &sd] {
            assert_eq!(skipped.invariants[0].tally.total(), 0);
        }
    }

    #[test]
    fn test_resolve_uses_contained_resources() {
        let fx = Fixture::new();
        let file = fx.write(
            "source/Observation/observation-example.json",
            r##"{
  "resourceType": "Observation",
  "id": "o1",
  "contained": [{ "resourceType": "Patient", "id": "p1" }],
  "subject": { "reference": "#p1" },
  "performer": [{ "reference": "Practitioner/f001" }]
}"##,
        );
        let mut sd = StructureDefinitionSkeleton::new("observation.profile.xml", Some("Observation".into()));
        sd.invariants = vec![
            InvariantSkeleton::new("obs-a", "error", "", "subject.resolve().id = 'p1'"),
            InvariantSkeleton::new("obs-b", "error", "", "performer.resolve().id = 'f001'"),
        ];

        run(&mut sd, fx.root(), &file, true);

        assert_eq!(sd.invariants[0].tally.success, 1);
        assert_eq!(sd.invariants[1].tally.success, 1);
    }

    /// Reports one required-field error and one ignorable warning.
    struct NoisyValidator;

    impl InstanceValidator for NoisyValidator {
        fn validate(
            &self,
            root: &TypedElement,
            _resolver: &dyn ElementResolver,
            terminology: &dyn TerminologyService,
        ) -> ValidationOutcome {
            assert!(terminology.validate_code("urn:vs", None, "x"));
            ValidationOutcome {
                issues: vec![
                    Issue::new(IssueSeverity::Warning, IssueType::Value, "style"),
                    Issue::new(
                        IssueSeverity::Error,
                        IssueType::Required,
                        format!("{} lacks status", root.name),
                    ),
                ],
            }
        }
    }

    #[test]
    fn test_validation_issues_are_reported_not_counted() {
        let fx = Fixture::new();
        let file = fx.write("source/Questionnaire/questionnaire-example.xml", NESTED);
        let mut sd = questionnaire(vec![InvariantSkeleton::new("que-1", "error", "", "true")]);

        let sink = CollectingSink::new();
        let config = HarnessConfig::default();
        let engine = NavigationEngine::new();
        Harness::new(&engine, &UntypedProvider, &config, &sink)
            .with_validator(&NoisyValidator)
            .test_example(&mut sd, fx.root(), &file, true);

        assert_eq!(sd.invariants[0].tally, Tally { success: 1, fail: 0, error: 0 });
        match &sink.problems()[0] {
            Diagnostic::Validation { issues, .. } => {
                assert_eq!(issues.len(), 1);
                assert_eq!(issues[0].text.as_deref(), Some("Questionnaire lacks status"));
            }
            other => panic!("unexpected diagnostic {:?}", other),
        }
    }
}
