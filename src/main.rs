use anyhow::{Context, Result};
use clap::Parser;
use fhir_expression::NavigationEngine;
use fhir_invariant_tester::diagnostics::{ConsoleSink, DiagnosticSink, TracingSink};
use fhir_invariant_tester::logging::{init_subscriber, Verbosity};
use fhir_invariant_tester::report::{self, ReportRow};
use fhir_invariant_tester::{HarnessConfig, Monitor, Session};
use std::path::PathBuf;
use std::sync::Arc;

const RULE: &str = "---------------------------------------------------------------";

#[derive(Parser, Debug)]
#[command(
    name = "fhir-invariant-tester",
    version,
    about = "Test the invariants of a FHIR specification source tree against its examples"
)]
struct Cli {
    /// Specification root holding `publish/` and `source/`
    root: PathBuf,
    /// Only test this resource type
    resource_type: Option<String>,
    #[arg(long, help = "Harness configuration (TOML)")]
    config: Option<PathBuf>,
    #[arg(long, help = "Print reports as JSON")]
    json: bool,
    #[arg(long, help = "Exit after the first report instead of watching for changes")]
    once: bool,
    #[arg(short, long)]
    verbose: bool,
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_subscriber(Verbosity::from_flags(cli.verbose, cli.quiet))
        .context("failed to initialise logging")?;

    let code = run(cli)?;
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    let config = match &cli.config {
        Some(path) => HarnessConfig::load(path)?,
        None => HarnessConfig::default(),
    };
    let sink: Arc<dyn DiagnosticSink> = if cli.json {
        Arc::new(TracingSink)
    } else {
        Arc::new(ConsoleSink)
    };

    if !cli.json {
        println!("FHIR Invariant tester");
        println!("{}", RULE);
        println!("Testing FHIR source folder:\t{}", cli.root.display());
        if let Some(filter) = &cli.resource_type {
            println!("Filtering to resource Type:\t{}", filter);
        }
    }

    let session = Session::scan(
        cli.root.clone(),
        cli.resource_type.clone(),
        config,
        Box::new(NavigationEngine::new()),
        sink,
    )
    .with_context(|| format!("failed to scan {}", cli.root.display()))?;

    if !cli.json {
        banner(&format!("{} in {} resource types", session.total_invariants(), session.len()));
    }

    session.run_all();

    let rows = report::session_rows(&session);
    if cli.json {
        println!("{}", report::render_json(&rows)?);
    } else {
        banner("Results");
        print!("{}", report::render_text(&rows));
    }

    if cli.once {
        return Ok(report::exit_code(&rows));
    }

    if !cli.json {
        banner("Tracking...");
    }
    let json = cli.json;
    Monitor::new(&session, |_, rows: &[ReportRow]| {
        if json {
            match report::render_json(rows) {
                Ok(out) => println!("{}", out),
                Err(err) => tracing::error!(error = %err, "failed to render report"),
            }
        } else {
            println!("{}", RULE);
            print!("{}", report::render_text(rows));
        }
    })
    .run()?;
    Ok(0)
}

fn banner(title: &str) {
    println!();
    println!("{}", RULE);
    println!("{}", title);
    println!("{}", RULE);
    println!();
}
