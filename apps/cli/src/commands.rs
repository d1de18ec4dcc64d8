//! CLI command definitions, routing, and tracing setup.

use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Report, Result, eyre};
use formpipe_core::discover::discover_inputs;
use formpipe_core::pipeline::{FileOutcome, Pipeline, PipelineObserver, RunReport};
use formpipe_core::template::load_template;
use formpipe_sheet::CalamineReader;
use formpipe_shared::{
    AppConfig, CONFIG_FILE_NAME, ErrorKind, FailurePolicy, FormPipeError, InputFile,
    PipelineConfig, RunId, Stage, init_config, load_config,
};
use formpipe_tool::PdfFormsTool;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// formpipe: fill PDF forms from spreadsheets.
#[derive(Parser)]
#[command(
    name = "formpipe",
    version,
    about = "Turn spreadsheet rows into filled PDF forms.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ./formpipe.toml, then ~/.formpipe/formpipe.toml).
    #[arg(long, env = "FORMPIPE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Project root relative paths resolve against (defaults to the config
    /// file's directory).
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Process every spreadsheet in the input directory.
    Run {
        /// Stop at the first failed file.
        #[arg(long)]
        strict: bool,
    },

    /// List the spreadsheets a run would pick up.
    Scan,

    /// Validate config, templates and form documents.
    Check,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
///
/// With a log directory, a per-run log file is written there as well. The
/// returned guard must live until the program exits.
pub(crate) fn init_tracing(cli: &Cli, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    use tracing_subscriber::{EnvFilter, Layer, fmt, prelude::*};

    let filter = match cli.verbose {
        0 => "formpipe=info",
        1 => "formpipe=debug",
        _ => "formpipe=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    let console = match cli.log_format {
        LogFormat::Text => fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Json => fmt::layer().json().with_writer(std::io::stderr).boxed(),
    };

    let mut guard = None;
    let file_layer = log_dir.and_then(|dir| match std::fs::create_dir_all(dir) {
        Ok(()) => {
            let name = format!(
                "log_{}.log",
                chrono::Local::now().format("%m_%d_%Y_%H_%M_%S")
            );
            let (writer, worker) = tracing_appender::non_blocking(
                tracing_appender::rolling::never(dir, name),
            );
            guard = Some(worker);
            Some(fmt::layer().with_writer(writer).with_ansi(false))
        }
        Err(e) => {
            eprintln!("warning: failed to create log directory {}: {e}", dir.display());
            None
        }
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console)
        .with(file_layer)
        .init();

    guard
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Loaded config plus the runtime view resolved against the project root.
struct Context {
    app: AppConfig,
    source: Option<PathBuf>,
    pipeline: PipelineConfig,
}

impl Context {
    fn load(cli: &Cli, strict: bool) -> Result<Self> {
        let (mut app, source) = load_config(cli.config.as_deref())?;
        if strict {
            app.run.failure_policy = FailurePolicy::Abort;
        }
        let root = project_root(cli.root.as_deref(), source.as_deref())?;
        let pipeline = app.resolve(&root)?;
        Ok(Self {
            app,
            source,
            pipeline,
        })
    }
}

/// `--root`, else the config file's directory, else the current directory.
fn project_root(explicit: Option<&Path>, config_file: Option<&Path>) -> Result<PathBuf> {
    let cwd = std::env::current_dir()
        .map_err(|e| eyre!("cannot determine working directory: {e}"))?;
    let root = explicit
        .map(Path::to_path_buf)
        .or_else(|| {
            config_file
                .and_then(Path::parent)
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
        })
        .unwrap_or_else(|| cwd.clone());
    Ok(cwd.join(root))
}

/// Run the CLI command.
pub(crate) fn run(cli: Cli) -> Result<ExitCode> {
    match &cli.command {
        Command::Config {
            action: ConfigAction::Init,
        } => {
            init_tracing(&cli, None);
            cmd_config_init(cli.config.as_deref())
        }
        Command::Config {
            action: ConfigAction::Show,
        } => {
            init_tracing(&cli, None);
            cmd_config_show(&Context::load(&cli, false)?)
        }
        Command::Run { strict } => {
            let context = Context::load(&cli, *strict)?;
            let _guard = init_tracing(&cli, Some(&context.pipeline.paths.log_dir));
            cmd_run(&context)
        }
        Command::Scan => {
            init_tracing(&cli, None);
            cmd_scan(&Context::load(&cli, false)?)
        }
        Command::Check => {
            init_tracing(&cli, None);
            cmd_check(&Context::load(&cli, false)?)
        }
    }
}

/// Exit status for an error that escaped a command: 2 for configuration
/// problems, 1 for everything else.
pub(crate) fn exit_status_for(report: &Report) -> u8 {
    match report.downcast_ref::<FormPipeError>() {
        Some(e) if e.kind() == ErrorKind::Config => 2,
        _ => 1,
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

fn cmd_run(context: &Context) -> Result<ExitCode> {
    let config = &context.pipeline;
    info!(
        root = %config.root.display(),
        config = ?context.source,
        policy = ?config.failure_policy,
        "running pipeline"
    );

    let reader = CalamineReader;
    let tool = PdfFormsTool::from_config(config);
    let pipeline = Pipeline::new(config, &reader, &tool)?;

    let progress = CliProgress::new();
    let report = pipeline.run(&progress);

    print_summary(&report);
    Ok(if report.is_fatal() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn print_summary(report: &RunReport) {
    println!();
    println!("  Run:        {}", report.run_id);
    println!("  Processed:  {}", report.outcomes.len());
    println!("  Succeeded:  {}", report.succeeded());
    println!("  Failed:     {}", report.failed());
    println!("  Time:       {:.1}s", report.elapsed.as_secs_f64());

    for outcome in &report.outcomes {
        if let Some(failure) = &outcome.failure {
            println!(
                "    - {} [{} at {}]: {}",
                outcome.input.path.display(),
                failure.kind,
                failure.stage,
                failure.message
            );
        }
    }
    if let Some(reason) = &report.fatal {
        println!();
        println!("  Run stopped early: {reason}");
    }
    println!();
}

fn cmd_scan(context: &Context) -> Result<ExitCode> {
    let inputs = discover_inputs(&context.pipeline)?;
    if inputs.is_empty() {
        println!(
            "No spreadsheets found under {}",
            context.pipeline.paths.input_dir.display()
        );
        return Ok(ExitCode::SUCCESS);
    }

    for input in &inputs {
        println!("{}\t{}", input.document_type, input.path.display());
    }
    println!();
    println!("  {} file(s) ready", inputs.len());
    Ok(ExitCode::SUCCESS)
}

fn cmd_check(context: &Context) -> Result<ExitCode> {
    let config = &context.pipeline;
    let mut problems = 0usize;

    if config.document_types.is_empty() {
        println!("  no document types configured");
        problems += 1;
    }

    for document_type in &config.document_types {
        match load_template(document_type) {
            Ok(template) => println!(
                "  ok    {}: template has {} field(s)",
                document_type.name,
                template.fields.len()
            ),
            Err(e) => {
                println!("  FAIL  {}: {e}", document_type.name);
                problems += 1;
            }
        }
        if !document_type.document.is_file() {
            println!(
                "  FAIL  {}: form document not found at {}",
                document_type.name,
                document_type.document.display()
            );
            problems += 1;
        }
    }

    println!();
    if problems == 0 {
        println!("  Configuration looks good.");
        Ok(ExitCode::SUCCESS)
    } else {
        println!("  {problems} problem(s) found.");
        Ok(ExitCode::from(2))
    }
}

fn cmd_config_init(path: Option<&Path>) -> Result<ExitCode> {
    let path = path.unwrap_or_else(|| Path::new(CONFIG_FILE_NAME));
    init_config(path)?;
    println!("Config initialized at: {}", path.display());
    Ok(ExitCode::SUCCESS)
}

fn cmd_config_show(context: &Context) -> Result<ExitCode> {
    match &context.source {
        Some(path) => println!("# source: {}", path.display()),
        None => println!("# source: built-in defaults"),
    }
    println!("# root: {}", context.pipeline.root.display());
    let toml_str = toml::to_string_pretty(&context.app)?;
    println!("{toml_str}");
    Ok(ExitCode::SUCCESS)
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
    total: Cell<usize>,
    current: Cell<usize>,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self {
            spinner,
            total: Cell::new(0),
            current: Cell::new(0),
        }
    }
}

impl PipelineObserver for CliProgress {
    fn run_started(&self, _run_id: &RunId, inputs: usize) {
        self.total.set(inputs);
        self.spinner.set_message(format!("Found {inputs} spreadsheet(s)"));
    }

    fn stage_entered(&self, input: &InputFile, stage: Stage) {
        let name = input
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.spinner.set_message(format!(
            "[{}/{}] {name}: {stage}",
            self.current.get() + 1,
            self.total.get()
        ));
    }

    fn file_finished(&self, outcome: &FileOutcome) {
        self.current.set(self.current.get() + 1);
        let name = outcome.input.path.display();
        match &outcome.failure {
            None => self.spinner.println(format!("  ✓ {name}")),
            Some(failure) => self
                .spinner
                .println(format!("  ✗ {name} ({} at {})", failure.kind, failure.stage)),
        }
    }

    fn done(&self, _report: &RunReport) {
        self.spinner.finish_and_clear();
    }
}
