//! End-to-end run: discover → transform → inspect → fill → relocate →
//! archive → cleanup, one file at a time.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::{error, info, info_span, instrument, warn};

use formpipe_sheet::RowReader;
use formpipe_shared::{
    ErrorKind, FailurePolicy, FileStatus, FormPipeError, InputFile, PipelineConfig, Result, RunId,
    Stage, Template,
};
use formpipe_tool::FormTool;

use crate::archive::Archiver;
use crate::discover::discover_inputs;
use crate::relocate::Relocator;
use crate::template::load_templates;
use crate::transform;

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Why a file stopped short of `CleanedUp`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageFailure {
    pub stage: Stage,
    pub kind: ErrorKind,
    pub message: String,
    /// The error stops the run regardless of failure policy.
    pub fatal: bool,
}

/// What happened to one input file.
#[derive(Debug, Clone)]
pub struct FileOutcome {
    pub input: InputFile,
    /// Last status reached (`Failed` if a stage failed).
    pub status: FileStatus,
    pub failure: Option<StageFailure>,
    /// Intermediate CSV, once written.
    pub intermediate: Option<PathBuf>,
    /// Filled documents in the output directory.
    pub artifacts: Vec<PathBuf>,
}

impl FileOutcome {
    fn new(input: InputFile) -> Self {
        Self {
            input,
            status: FileStatus::Discovered,
            failure: None,
            intermediate: None,
            artifacts: Vec::new(),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == FileStatus::CleanedUp
    }
}

/// Result of a whole run.
#[derive(Debug)]
pub struct RunReport {
    pub run_id: RunId,
    pub outcomes: Vec<FileOutcome>,
    /// Set when the run stopped early.
    pub fatal: Option<String>,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.succeeded()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.failure.is_some()).count()
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal.is_some()
    }
}

// ---------------------------------------------------------------------------
// Observer
// ---------------------------------------------------------------------------

/// Progress callback for reporting pipeline status.
pub trait PipelineObserver {
    /// Called once discovery has finished.
    fn run_started(&self, run_id: &RunId, inputs: usize);
    /// Called before each stage of each file.
    fn stage_entered(&self, input: &InputFile, stage: Stage);
    /// Called when a file reaches a terminal status.
    fn file_finished(&self, outcome: &FileOutcome);
    /// Called when the run completes or stops.
    fn done(&self, report: &RunReport);
}

/// No-op observer for headless/test usage.
pub struct SilentObserver;

impl PipelineObserver for SilentObserver {
    fn run_started(&self, _run_id: &RunId, _inputs: usize) {}
    fn stage_entered(&self, _input: &InputFile, _stage: Stage) {}
    fn file_finished(&self, _outcome: &FileOutcome) {}
    fn done(&self, _report: &RunReport) {}
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// A stage error tagged with the stage it came from.
struct StageError {
    stage: Stage,
    error: FormPipeError,
}

fn at(stage: Stage) -> impl Fn(FormPipeError) -> StageError {
    move |error| StageError { stage, error }
}

/// The orchestrator. Templates are loaded once, up front.
pub struct Pipeline<'a> {
    config: &'a PipelineConfig,
    templates: HashMap<String, Template>,
    reader: &'a dyn RowReader,
    tool: &'a dyn FormTool,
    relocator: Relocator,
    archiver: Archiver,
}

impl<'a> Pipeline<'a> {
    /// Build a pipeline, loading and validating every template.
    pub fn new(
        config: &'a PipelineConfig,
        reader: &'a dyn RowReader,
        tool: &'a dyn FormTool,
    ) -> Result<Self> {
        let templates = load_templates(config)?;
        Ok(Self {
            config,
            templates,
            reader,
            tool,
            relocator: Relocator::new(&config.paths.tool_output_dir, &config.paths.output_dir),
            archiver: Archiver::new(&config.paths.archive_dir),
        })
    }

    /// Process every discovered file.
    ///
    /// Per-file failures are recorded and the run moves on, unless the error
    /// is fatal or the failure policy is `abort`.
    pub fn run(&self, observer: &dyn PipelineObserver) -> RunReport {
        let run_id = RunId::new();
        let span = info_span!("run", %run_id);
        let _guard = span.enter();
        let start = Instant::now();

        info!(input_dir = %self.config.paths.input_dir.display(), "starting run");

        let inputs = match discover_inputs(self.config) {
            Ok(inputs) => inputs,
            Err(e) => {
                error!(error = %e, "discovery failed, aborting run");
                let report = RunReport {
                    run_id,
                    outcomes: Vec::new(),
                    fatal: Some(format!("discovery failed: {e}")),
                    elapsed: start.elapsed(),
                };
                observer.done(&report);
                return report;
            }
        };
        observer.run_started(&run_id, inputs.len());

        let mut outcomes = Vec::with_capacity(inputs.len());
        let mut fatal = None;

        for input in &inputs {
            let outcome = self.process(input, observer);
            observer.file_finished(&outcome);

            if let Some(failure) = &outcome.failure {
                if failure.fatal {
                    fatal = Some(format!(
                        "{} failed at {} with a fatal error: {}",
                        input.path.display(),
                        failure.stage,
                        failure.message
                    ));
                } else if self.config.failure_policy == FailurePolicy::Abort {
                    fatal = Some(format!(
                        "{} failed at {} (failure policy is abort): {}",
                        input.path.display(),
                        failure.stage,
                        failure.message
                    ));
                }
            }
            outcomes.push(outcome);

            if let Some(reason) = &fatal {
                error!(%reason, remaining = inputs.len() - outcomes.len(), "stopping run");
                break;
            }
        }

        let report = RunReport {
            run_id,
            outcomes,
            fatal,
            elapsed: start.elapsed(),
        };

        info!(
            processed = report.outcomes.len(),
            succeeded = report.succeeded(),
            failed = report.failed(),
            elapsed_ms = report.elapsed.as_millis(),
            "run complete"
        );
        observer.done(&report);
        report
    }

    /// Drive one file through every stage, stopping at the first failure.
    #[instrument(skip_all, fields(path = %input.path.display(), document_type = %input.document_type))]
    pub fn process(&self, input: &InputFile, observer: &dyn PipelineObserver) -> FileOutcome {
        let mut outcome = FileOutcome::new(input.clone());

        match self.drive(input, &mut outcome, observer) {
            Ok(()) => info!(artifacts = outcome.artifacts.len(), "file processed"),
            Err(StageError { stage, error }) => {
                let kind = error.kind();
                match kind {
                    ErrorKind::Data => warn!(%stage, error = %error, "file rejected"),
                    _ => error!(%stage, %kind, error = %error, "file failed"),
                }
                if let Some(csv) = &outcome.intermediate {
                    if csv.exists() {
                        info!(csv = %csv.display(), "intermediate CSV kept for inspection");
                    }
                }
                outcome.status = FileStatus::Failed;
                outcome.failure = Some(StageFailure {
                    stage,
                    kind,
                    message: error.to_string(),
                    fatal: error.is_fatal(),
                });
            }
        }

        outcome
    }

    fn drive(
        &self,
        input: &InputFile,
        outcome: &mut FileOutcome,
        observer: &dyn PipelineObserver,
    ) -> std::result::Result<(), StageError> {
        let missing_type = || {
            FormPipeError::config(format!(
                "no document type or template named '{}'",
                input.document_type
            ))
        };
        let document_type = self
            .config
            .document_type(&input.document_type)
            .ok_or_else(missing_type)
            .map_err(at(Stage::Transform))?;
        let template = self
            .templates
            .get(&input.document_type)
            .ok_or_else(missing_type)
            .map_err(at(Stage::Transform))?;

        // Discovered → Transformed
        observer.stage_entered(input, Stage::Transform);
        let work_dir = self.config.work_dir_for(&document_type.name);
        let intermediate = self
            .reader
            .first_row(&input.path)
            .and_then(|row| transform::transform(document_type, template, &row, &work_dir))
            .map_err(at(Stage::Transform))?;
        outcome.intermediate = Some(intermediate.path.clone());
        outcome.status = Stage::Transform.reached();

        // Transformed → Inspected
        observer.stage_entered(input, Stage::Inspect);
        self.tool
            .inspect(&intermediate.record.document_key)
            .map_err(at(Stage::Inspect))?;
        outcome.status = Stage::Inspect.reached();

        // Inspected → Filled
        observer.stage_entered(input, Stage::Fill);
        self.relocator.ensure_clean().map_err(at(Stage::Fill))?;
        self.tool
            .fill(&intermediate.path)
            .map_err(at(Stage::Fill))?;
        outcome.status = Stage::Fill.reached();

        // Filled → Relocated
        observer.stage_entered(input, Stage::Relocate);
        outcome.artifacts = self
            .relocator
            .relocate_all(&intermediate.path)
            .map_err(at(Stage::Relocate))?;
        outcome.status = Stage::Relocate.reached();

        // Relocated → Archived: the archive copy becomes the retained record.
        observer.stage_entered(input, Stage::ArchiveIntermediate);
        self.archiver
            .archive_and_remove(&intermediate.path)
            .map_err(at(Stage::ArchiveIntermediate))?;
        outcome.status = Stage::ArchiveIntermediate.reached();

        // Archived → CleanedUp
        observer.stage_entered(input, Stage::ArchiveInput);
        self.archiver
            .archive_and_remove(&input.path)
            .map_err(at(Stage::ArchiveInput))?;
        outcome.status = Stage::ArchiveInput.reached();

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::path::Path;

    use formpipe_sheet::SheetRow;
    use formpipe_shared::AppConfig;

    const TEMPLATE: &str = "\
PDF_FIELD_INDEX,EXCEL_FILE_COLUMN_NAME,SPLIT_RULE
0,Name,last
1,Name,first
2,Name,middle
3,SSN,
";

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "formpipe-pipeline-test-{}",
            uuid::Uuid::now_v7()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    /// A project root with the default layout and an NOA_GA template.
    fn setup(policy: FailurePolicy) -> (PathBuf, PipelineConfig) {
        let root = temp_dir();
        let mut app = AppConfig::default();
        app.run.failure_policy = policy;
        app.document_types[0].template = "templates/noa.csv".into();
        let config = app.resolve(&root).unwrap();

        std::fs::create_dir_all(root.join("templates")).unwrap();
        std::fs::write(root.join("templates/noa.csv"), TEMPLATE).unwrap();
        (root, config)
    }

    fn add_input(config: &PipelineConfig, name: &str) -> PathBuf {
        let dir = config.paths.input_dir.join("NOA_GA");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, format!("sheet {name}")).unwrap();
        path
    }

    fn files_in(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .map(|entries| {
                entries
                    .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Serves canned rows keyed by file name.
    struct FakeReader {
        rows: HashMap<String, SheetRow>,
    }

    impl FakeReader {
        fn with(rows: &[(&str, &[(&str, &str)])]) -> Self {
            Self {
                rows: rows
                    .iter()
                    .map(|(file, cells)| (file.to_string(), cells.iter().copied().collect()))
                    .collect(),
            }
        }
    }

    impl RowReader for FakeReader {
        fn first_row(&self, path: &Path) -> Result<SheetRow> {
            let name = path.file_name().unwrap().to_string_lossy();
            self.rows
                .get(name.as_ref())
                .cloned()
                .ok_or_else(|| FormPipeError::data(format!("no rows in {name}")))
        }
    }

    /// Records calls; `fill` drops artifacts into the tool output directory,
    /// then fails if an error is queued for that call.
    struct FakeTool {
        tool_output_dir: PathBuf,
        artifacts: Vec<&'static str>,
        inspect_error: Option<fn() -> FormPipeError>,
        fill_errors: RefCell<VecDeque<fn() -> FormPipeError>>,
        calls: RefCell<Vec<String>>,
    }

    impl FakeTool {
        fn new(config: &PipelineConfig) -> Self {
            Self {
                tool_output_dir: config.paths.tool_output_dir.clone(),
                artifacts: vec!["NOA GA.pdf"],
                inspect_error: None,
                fill_errors: RefCell::new(VecDeque::new()),
                calls: RefCell::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.borrow().clone()
        }
    }

    impl FormTool for FakeTool {
        fn inspect(&self, document: &str) -> Result<()> {
            self.calls.borrow_mut().push(format!("inspect {document}"));
            match self.inspect_error {
                Some(make) => Err(make()),
                None => Ok(()),
            }
        }

        fn fill(&self, csv: &Path) -> Result<()> {
            self.calls.borrow_mut().push(format!("fill {}", csv.display()));
            std::fs::create_dir_all(&self.tool_output_dir).unwrap();
            for name in &self.artifacts {
                std::fs::write(self.tool_output_dir.join(name), csv.display().to_string()).unwrap();
            }
            if let Some(make) = self.fill_errors.borrow_mut().pop_front() {
                return Err(make());
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingObserver {
        stages: RefCell<Vec<Stage>>,
        finished: RefCell<usize>,
    }

    impl PipelineObserver for RecordingObserver {
        fn run_started(&self, _run_id: &RunId, _inputs: usize) {}
        fn stage_entered(&self, _input: &InputFile, stage: Stage) {
            self.stages.borrow_mut().push(stage);
        }
        fn file_finished(&self, _outcome: &FileOutcome) {
            *self.finished.borrow_mut() += 1;
        }
        fn done(&self, _report: &RunReport) {}
    }

    const JANE: &[(&str, &str)] = &[("Name", "Doe, Jane Q"), ("SSN", "000-00-0000")];
    const JOHN: &[(&str, &str)] = &[("Name", "Roe, John"), ("SSN", "111-11-1111")];

    #[test]
    fn successful_file_walks_every_stage() {
        let (root, config) = setup(FailurePolicy::Continue);
        let input = add_input(&config, "jane.xlsx");
        let reader = FakeReader::with(&[("jane.xlsx", JANE)]);
        let tool = FakeTool::new(&config);
        let observer = RecordingObserver::default();

        let pipeline = Pipeline::new(&config, &reader, &tool).unwrap();
        let report = pipeline.run(&observer);

        assert!(!report.is_fatal());
        assert_eq!(report.succeeded(), 1);
        let outcome = &report.outcomes[0];
        assert_eq!(outcome.status, FileStatus::CleanedUp);
        assert_eq!(*observer.finished.borrow(), 1);
        assert_eq!(
            *observer.stages.borrow(),
            vec![
                Stage::Transform,
                Stage::Inspect,
                Stage::Fill,
                Stage::Relocate,
                Stage::ArchiveIntermediate,
                Stage::ArchiveInput,
            ]
        );

        let csv = config.work_dir_for("NOA_GA").join("Doe.csv");
        let document_key = config.document_types[0].document_key();
        assert_eq!(
            tool.calls(),
            vec![format!("inspect {document_key}"), format!("fill {}", csv.display())]
        );

        // Input and CSV moved to the archive; filled form in output.
        assert!(!input.exists());
        assert!(!csv.exists());
        assert_eq!(files_in(&config.paths.archive_dir), vec!["Doe.csv", "jane.xlsx"]);
        let output = files_in(&config.paths.output_dir);
        assert_eq!(output.len(), 1);
        assert!(output[0].starts_with("NOA GA_Doe") && output[0].ends_with(".pdf"));
        assert_eq!(outcome.artifacts.len(), 1);

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn failed_inspect_never_fills_or_archives() {
        let (root, config) = setup(FailurePolicy::Continue);
        let input = add_input(&config, "jane.xlsx");
        let reader = FakeReader::with(&[("jane.xlsx", JANE)]);
        let mut tool = FakeTool::new(&config);
        tool.inspect_error = Some(|| FormPipeError::tool("inspect", "exit status 1"));

        let pipeline = Pipeline::new(&config, &reader, &tool).unwrap();
        let report = pipeline.run(&SilentObserver);

        let outcome = &report.outcomes[0];
        assert_eq!(outcome.status, FileStatus::Failed);
        let failure = outcome.failure.as_ref().unwrap();
        assert_eq!(failure.stage, Stage::Inspect);
        assert_eq!(failure.kind, ErrorKind::Tool);
        assert_eq!(tool.calls().len(), 1);
        assert!(input.exists());
        assert!(files_in(&config.paths.archive_dir).is_empty());
        assert!(!report.is_fatal());

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn missing_state_file_keeps_intermediate_csv() {
        let (root, config) = setup(FailurePolicy::Continue);
        let input = add_input(&config, "jane.xlsx");
        let reader = FakeReader::with(&[("jane.xlsx", JANE)]);
        let tool = FakeTool::new(&config);
        tool.fill_errors.borrow_mut().push_back(|| {
            FormPipeError::io(
                "fields.json",
                std::io::Error::new(std::io::ErrorKind::NotFound, "No such file"),
            )
        });

        let pipeline = Pipeline::new(&config, &reader, &tool).unwrap();
        let report = pipeline.run(&SilentObserver);

        let outcome = &report.outcomes[0];
        let failure = outcome.failure.as_ref().unwrap();
        assert_eq!(failure.stage, Stage::Fill);
        assert_eq!(failure.kind, ErrorKind::Filesystem);
        let csv = outcome.intermediate.as_ref().unwrap();
        assert!(csv.exists());
        assert!(input.exists());

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn bad_data_does_not_block_later_files() {
        let (root, config) = setup(FailurePolicy::Continue);
        let bad = add_input(&config, "a.xlsx");
        add_input(&config, "b.xlsx");
        let reader = FakeReader::with(&[("a.xlsx", &[("Name", "Nobody")]), ("b.xlsx", JOHN)]);
        let tool = FakeTool::new(&config);

        let pipeline = Pipeline::new(&config, &reader, &tool).unwrap();
        let report = pipeline.run(&SilentObserver);

        assert_eq!(report.outcomes.len(), 2);
        let first = &report.outcomes[0];
        assert_eq!(first.failure.as_ref().unwrap().stage, Stage::Transform);
        assert_eq!(first.failure.as_ref().unwrap().kind, ErrorKind::Data);
        assert!(bad.exists());
        assert!(report.outcomes[1].succeeded());
        // Only the good file reached the tool.
        assert_eq!(tool.calls().len(), 2);

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn abort_policy_stops_after_first_failure() {
        let (root, config) = setup(FailurePolicy::Abort);
        add_input(&config, "a.xlsx");
        let untouched = add_input(&config, "b.xlsx");
        let reader = FakeReader::with(&[("a.xlsx", &[("Name", "Nobody")]), ("b.xlsx", JOHN)]);
        let tool = FakeTool::new(&config);

        let pipeline = Pipeline::new(&config, &reader, &tool).unwrap();
        let report = pipeline.run(&SilentObserver);

        assert!(report.is_fatal());
        assert_eq!(report.outcomes.len(), 1);
        assert!(untouched.exists());
        assert!(tool.calls().is_empty());

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn tool_timeout_stops_run_under_continue_policy() {
        let (root, config) = setup(FailurePolicy::Continue);
        add_input(&config, "a.xlsx");
        add_input(&config, "b.xlsx");
        let reader = FakeReader::with(&[("a.xlsx", JANE), ("b.xlsx", JOHN)]);
        let mut tool = FakeTool::new(&config);
        tool.inspect_error = Some(|| FormPipeError::ToolTimeout {
            operation: "inspect".into(),
            timeout: Duration::from_secs(300),
        });

        let pipeline = Pipeline::new(&config, &reader, &tool).unwrap();
        let report = pipeline.run(&SilentObserver);

        assert!(report.is_fatal());
        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(report.outcomes[0].failure.as_ref().unwrap().kind, ErrorKind::Fatal);

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn fill_without_artifacts_fails_relocation() {
        let (root, config) = setup(FailurePolicy::Continue);
        let input = add_input(&config, "jane.xlsx");
        let reader = FakeReader::with(&[("jane.xlsx", JANE)]);
        let mut tool = FakeTool::new(&config);
        tool.artifacts.clear();

        let pipeline = Pipeline::new(&config, &reader, &tool).unwrap();
        let report = pipeline.run(&SilentObserver);

        let outcome = &report.outcomes[0];
        assert_eq!(outcome.failure.as_ref().unwrap().stage, Stage::Relocate);
        assert!(outcome.intermediate.as_ref().unwrap().exists());
        assert!(input.exists());

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn same_surname_twice_yields_distinct_outputs() {
        let (root, config) = setup(FailurePolicy::Continue);
        add_input(&config, "a.xlsx");
        add_input(&config, "b.xlsx");
        let reader = FakeReader::with(&[("a.xlsx", JANE), ("b.xlsx", JANE)]);
        let tool = FakeTool::new(&config);

        let pipeline = Pipeline::new(&config, &reader, &tool).unwrap();
        let report = pipeline.run(&SilentObserver);

        assert_eq!(report.succeeded(), 2);
        assert_eq!(files_in(&config.paths.output_dir).len(), 2);
        assert_eq!(
            files_in(&config.paths.archive_dir),
            vec!["Doe.csv", "a.xlsx", "b.xlsx"]
        );

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn missing_template_fails_construction() {
        let root = temp_dir();
        let config = AppConfig::default().resolve(&root).unwrap();
        let reader = FakeReader::with(&[]);
        let tool = FakeTool::new(&config);

        let err = Pipeline::new(&config, &reader, &tool).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Filesystem);

        let _ = std::fs::remove_dir_all(&root);
    }

    fn missing_state_file() -> FormPipeError {
        FormPipeError::io(
            "fields.json",
            std::io::Error::new(std::io::ErrorKind::NotFound, "No such file"),
        )
    }

    #[test]
    fn retained_csv_survives_a_later_file_with_the_same_surname() {
        let (root, config) = setup(FailurePolicy::Continue);
        add_input(&config, "a.xlsx");
        let second = add_input(&config, "b.xlsx");
        let reader = FakeReader::with(&[
            ("a.xlsx", &[("Name", "Doe, Jane"), ("SSN", "111-11-1111")]),
            ("b.xlsx", &[("Name", "Doe, John"), ("SSN", "222-22-2222")]),
        ]);
        let tool = FakeTool::new(&config);
        tool.fill_errors.borrow_mut().push_back(missing_state_file);

        let pipeline = Pipeline::new(&config, &reader, &tool).unwrap();
        let report = pipeline.run(&SilentObserver);

        let first = &report.outcomes[0];
        assert_eq!(first.failure.as_ref().unwrap().stage, Stage::Fill);
        let kept = first.intermediate.as_ref().unwrap();
        let content = std::fs::read_to_string(kept).unwrap();
        assert!(content.contains("111-11-1111"), "{content}");

        let later = &report.outcomes[1];
        let failure = later.failure.as_ref().unwrap();
        assert_eq!(failure.stage, Stage::Transform);
        assert_eq!(failure.kind, ErrorKind::Filesystem);
        assert!(later.intermediate.is_none());
        assert!(second.exists());
        assert!(files_in(&config.paths.archive_dir).is_empty());

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn leftovers_from_a_failed_fill_are_not_relocated() {
        let (root, config) = setup(FailurePolicy::Continue);
        add_input(&config, "a.xlsx");
        let second = add_input(&config, "b.xlsx");
        let reader = FakeReader::with(&[("a.xlsx", JANE), ("b.xlsx", JOHN)]);
        let mut tool = FakeTool::new(&config);
        tool.artifacts = vec!["W4.pdf"];
        tool.fill_errors.borrow_mut().push_back(missing_state_file);

        let pipeline = Pipeline::new(&config, &reader, &tool).unwrap();
        let report = pipeline.run(&SilentObserver);

        assert_eq!(report.outcomes[0].failure.as_ref().unwrap().stage, Stage::Fill);
        let later = &report.outcomes[1];
        let failure = later.failure.as_ref().unwrap();
        assert_eq!(failure.stage, Stage::Fill);
        assert_eq!(failure.kind, ErrorKind::Filesystem);
        assert!(failure.message.contains("W4.pdf"), "{}", failure.message);
        assert!(later.artifacts.is_empty());

        // The tool was never asked to fill the second file.
        let fills = tool.calls().iter().filter(|c| c.starts_with("fill")).count();
        assert_eq!(fills, 1);
        assert!(files_in(&config.paths.output_dir).is_empty());
        assert_eq!(files_in(&config.paths.tool_output_dir), vec!["W4.pdf"]);
        assert!(second.exists());

        let _ = std::fs::remove_dir_all(&root);
    }
}
