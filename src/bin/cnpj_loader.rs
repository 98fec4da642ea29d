use std::cell::Cell;
use std::io::{self, BufRead, Write};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use cnpj_loader::config::{ConfigLoader, Settings};
use cnpj_loader::db::Db;
use cnpj_loader::discovery::HttpDiscovery;
use cnpj_loader::domain::{CountMismatchPolicy, RemoteSize};
use cnpj_loader::error::LoaderError;
use cnpj_loader::extract::Confirmer;
use cnpj_loader::fetch::{Fetcher, HttpRemoteSource, TransferObserver};
use cnpj_loader::pipeline::{Pipeline, PipelineOptions, RunSummary};
use cnpj_loader::store::Store;

#[derive(Parser)]
#[command(name = "cnpj-loader")]
#[command(about = "Resumable loader for the Receita Federal CNPJ open-data releases")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Run the full pipeline (the default)")]
    Run(RunArgs),
    #[command(about = "Show completed pipeline stages")]
    Status,
}

#[derive(Args, Default, Clone)]
struct RunArgs {
    #[arg(long)]
    base_url: Option<String>,

    #[arg(long)]
    max_attempts: Option<u32>,

    #[arg(long)]
    expected_archives: Option<usize>,

    #[arg(long, value_enum)]
    on_count_mismatch: Option<CountMismatchPolicy>,

    /// Keep decoded files after their table is loaded.
    #[arg(long)]
    keep_decoded: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(loader) = report.downcast_ref::<LoaderError>() {
            return ExitCode::from(map_exit_code(loader));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &LoaderError) -> u8 {
    match error {
        LoaderError::ArchiveCount { .. } | LoaderError::Aborted => 2,
        LoaderError::ConfigRead(_) | LoaderError::ConfigParse(_) => 2,
        LoaderError::Database(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = ConfigLoader::resolve(cli.config.as_deref()).into_diagnostic()?;

    match cli.command {
        Some(Commands::Status) => run_status(settings),
        Some(Commands::Run(args)) => run_pipeline(args, settings, cli.non_interactive),
        None => run_pipeline(RunArgs::default(), settings, cli.non_interactive),
    }
}

fn run_status(settings: Settings) -> miette::Result<()> {
    let store = Store::new(settings.zip_dir, settings.data_dir);
    let db = Db::open(&store.db_path()).into_diagnostic()?;
    let entries = db.ledger_entries().into_diagnostic()?;
    if entries.is_empty() {
        println!("no completed stages");
        return Ok(());
    }
    for entry in entries {
        println!("{}\t{}\t{}", entry.stage_id, entry.status, entry.completed_at);
    }
    Ok(())
}

fn run_pipeline(args: RunArgs, settings: Settings, non_interactive: bool) -> miette::Result<()> {
    let base_url = args.base_url.unwrap_or(settings.base_url);
    let max_attempts = args.max_attempts.unwrap_or(settings.max_attempts);
    let expected_archives = args.expected_archives.unwrap_or(settings.expected_archives);
    let mut on_count_mismatch = args.on_count_mismatch.unwrap_or(settings.on_count_mismatch);
    if non_interactive && on_count_mismatch == CountMismatchPolicy::Confirm {
        on_count_mismatch = CountMismatchPolicy::Abort;
    }
    let delete_after_use = settings.delete_after_use && !args.keep_decoded;

    let store = Store::new(settings.zip_dir, settings.data_dir);
    store.ensure_dirs().into_diagnostic()?;
    let db = Db::open(&store.db_path()).into_diagnostic()?;

    let discovery = HttpDiscovery::new().into_diagnostic()?;
    let source = HttpRemoteSource::new().into_diagnostic()?;
    let fetcher = Fetcher::new(source, max_attempts);

    let pipeline = Pipeline::new(
        store,
        db,
        discovery,
        fetcher,
        PipelineOptions {
            base_url,
            expected_archives,
            on_count_mismatch,
            delete_after_use,
        },
    );

    let observer = LogObserver::default();
    let summary = pipeline.run(&observer, &StdinConfirmer)?;
    print_summary(&summary);
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!(
        "archives: {} listed, {} downloaded, {} already valid, {} failed",
        summary.discovered, summary.downloaded, summary.skipped, summary.failed
    );
    println!(
        "stages: {} run, {} skipped",
        summary.stages_run, summary.stages_skipped
    );
}

/// Logs transfer progress roughly every 256 MiB so multi-gigabyte downloads
/// show signs of life without flooding the log.
#[derive(Default)]
struct LogObserver {
    last_logged: Cell<u64>,
}

const LOG_EVERY_BYTES: u64 = 256 * 1024 * 1024;

impl TransferObserver for LogObserver {
    fn on_chunk(&self, transferred: u64, total: RemoteSize) {
        // A new transfer starts over from zero.
        if transferred < self.last_logged.get() {
            self.last_logged.set(0);
        }
        if transferred.saturating_sub(self.last_logged.get()) < LOG_EVERY_BYTES {
            return;
        }
        self.last_logged.set(transferred);
        match total {
            RemoteSize::Known(total) => {
                tracing::info!("transferred {transferred} of {total} bytes");
            }
            RemoteSize::Unknown => tracing::info!("transferred {transferred} bytes"),
        }
    }
}

struct StdinConfirmer;

impl Confirmer for StdinConfirmer {
    fn confirm(&self, prompt: &str) -> bool {
        print!("{prompt} (y/n) ");
        if io::stdout().flush().is_err() {
            return false;
        }
        let mut answer = String::new();
        if io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        answer.trim().eq_ignore_ascii_case("y")
    }
}
