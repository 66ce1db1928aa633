use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use lintel_config::LintelConfig;
use lintel_engine::{
    AnalysisContext, CancellationToken, DiagnosticStore, DiagnosticsSnapshot, Project,
    StaticProjects,
};
use lintel_types::Diagnostic;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file path (default: ~/.lintel/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every analyzer once over the given project roots
    Check {
        /// Project root directories
        #[arg(default_value = ".")]
        dirs: Vec<PathBuf>,

        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::try_new("warn").expect("warn filter is valid"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_tracing();
    let cli = Cli::parse();

    let config = LintelConfig::load(cli.config.as_deref())?;
    match cli.command {
        Commands::Check { dirs, format } => check(&config, &dirs, format).await,
    }
}

async fn check(config: &LintelConfig, dirs: &[PathBuf], format: Format) -> Result<ExitCode> {
    let mut projects = Vec::with_capacity(dirs.len());
    for dir in dirs {
        let root = std::fs::canonicalize(dir)
            .with_context(|| format!("project directory {} not found", dir.display()))?;
        projects.push(Project::new(root));
    }

    let store = DiagnosticStore::shared();
    let analyzers = config
        .build_registry()
        .context("invalid analyzer configuration")?;
    let context = AnalysisContext::new(
        Arc::clone(&store),
        analyzers,
        StaticProjects::shared(projects),
    )
    .with_runner(config.runner_settings())
    .with_discovery(config.discovery_policy());

    let summary = context.analyze_all(&CancellationToken::new(), None).await;
    tracing::info!(
        runs = summary.runs,
        count = summary.published,
        failures = summary.failures,
        "Check finished"
    );

    let snapshot = store.snapshot();
    let mut stdout = std::io::stdout().lock();
    match format {
        Format::Text => {
            for diagnostic in ordered(&snapshot) {
                writeln!(stdout, "{}", diagnostic.display_line())?;
            }
            eprintln!("{}", snapshot.status_string());
        }
        Format::Json => {
            let all: Vec<&Diagnostic> = ordered(&snapshot).collect();
            serde_json::to_writer_pretty(&mut stdout, &all)?;
            writeln!(stdout)?;
        }
    }

    if summary.failures > 0 {
        eprintln!(
            "{} of {} analyzer runs failed",
            summary.failures, summary.runs
        );
    }
    Ok(if snapshot.error_count() > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn ordered(snapshot: &DiagnosticsSnapshot) -> impl Iterator<Item = &Diagnostic> {
    snapshot.files().iter().flat_map(|(_, diagnostics)| diagnostics)
}
