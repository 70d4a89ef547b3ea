use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use camino::Utf8Path;
use clap::{Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use sortly_parser::app::{App, Report};
use sortly_parser::config::{CONFIG_FILE_NAME, ConfigLoader, ConfigOverrides, ParserConfig};
use sortly_parser::domain::NameResolution;
use sortly_parser::error::SortlyError;
use sortly_parser::fetch::HttpMediaFetcher;
use sortly_parser::job::{JobStatus, ParseJob, stage_upload};
use sortly_parser::naming::NamingScheme;
use sortly_parser::output::{JsonOutput, OutputMode, print_summary};
use sortly_parser::progress::{ConsoleProgress, ProgressSink};

const LOG_FILE_NAME: &str = "logs.log";

#[derive(Parser)]
#[command(name = "sortly-parser")]
#[command(
    about = "Mirrors the photos of a Sortly export and links them from a rewritten workbook"
)]
#[command(version, author)]
struct Cli {
    /// Port of the upload page
    #[arg(short, long, global = true)]
    port: Option<String>,

    /// Root directory for downloaded photos and output workbooks
    #[arg(short, long = "dir", global = true)]
    dir: Option<String>,

    /// Prefix used to build the public links
    #[arg(short, long, global = true)]
    links: Option<String>,

    /// Sortly export to process
    #[arg(short, long, global = true)]
    file: Option<String>,

    /// Save port, root directory and link prefix to config.cfg
    #[arg(long, global = true)]
    cfg: bool,

    #[arg(long, value_enum, global = true)]
    naming: Option<NamingScheme>,

    /// Reject folders whose name is already used elsewhere in the catalog
    #[arg(long, global = true)]
    unique_names: bool,

    /// Per-request download timeout in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    #[arg(long, global = true)]
    non_interactive: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Stage a workbook as an upload and parse it as a background job")]
    Upload { file: String },
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<SortlyError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &SortlyError) -> u8 {
    match error {
        SortlyError::InputOpen { .. }
        | SortlyError::InvalidConfig(_)
        | SortlyError::InvalidPort(_)
        | SortlyError::ConfigRead(_)
        | SortlyError::ConfigParse(_) => 2,
        SortlyError::PersistFailure { .. } => 3,
        _ => 1,
    }
}

// Logs go to stderr and, when it can be opened, to `logs.log` in the working directory.
// The returned guard flushes the file writer when dropped.
fn init_tracing() -> Option<WorkerGuard> {
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(LOG_FILE_NAME)
        .build(".");
    let (file_layer, guard, file_error) = match appender {
        Ok(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard), None)
        }
        Err(err) => (None, None, Some(err)),
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    if let Some(err) = file_error {
        warn!("not writing {LOG_FILE_NAME}: {err}");
    }
    guard
}

fn run() -> miette::Result<()> {
    let _log_guard = init_tracing();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let config_path = Utf8Path::new(CONFIG_FILE_NAME);
    let file_config = match ConfigLoader::read(config_path) {
        Ok(file) => file,
        Err(err) => {
            warn!("ignoring {CONFIG_FILE_NAME}: {err}");
            None
        }
    };
    let overrides = ConfigOverrides {
        port: cli.port,
        root_folder: cli.dir,
        root_links: cli.links,
        file_path: cli.file,
        save_config: cli.cfg,
        naming: cli.naming,
        resolution: cli.unique_names.then_some(NameResolution::UniqueNames),
        timeout_secs: cli.timeout,
    };
    let mut config = ConfigLoader::resolve(file_config, overrides)?;

    info!("link prefix is \"{}\"", config.root_links);
    info!("root folder is \"{}\"", config.root_folder);

    if config.save_config {
        ConfigLoader::write(config_path, &config)?;
        info!("configuration saved to {CONFIG_FILE_NAME}");
    }

    let fetcher = HttpMediaFetcher::new(config.request_timeout)?;
    let app = App::new(fetcher);

    let report = match cli.command {
        Some(Command::Upload { file }) => {
            let bytes = std::fs::read(&file).into_diagnostic()?;
            let file_name = Utf8Path::new(&file).file_name().unwrap_or(file.as_str());
            config.file_path = Some(stage_upload(&config, file_name, &bytes)?);
            run_job(app, config, output_mode)?
        }
        None => {
            if config.file_path.is_none() {
                return Err(miette::Report::msg(
                    "no input file (try `sortly-parser --file <export.xlsx>`)",
                ));
            }
            info!("file mode is on");
            match output_mode {
                OutputMode::Interactive => app.run(&config, &ConsoleProgress::new())?,
                OutputMode::NonInteractive => app.run(&config, &JsonOutput)?,
            }
        }
    };

    match output_mode {
        OutputMode::Interactive => print_summary(&report),
        OutputMode::NonInteractive => JsonOutput::print_report(&report).into_diagnostic()?,
    }
    Ok(())
}

fn run_job(
    app: App<HttpMediaFetcher>,
    config: ParserConfig,
    output_mode: OutputMode,
) -> miette::Result<Report> {
    let sink: Arc<dyn ProgressSink> = match output_mode {
        OutputMode::Interactive => Arc::new(ConsoleProgress::new()),
        OutputMode::NonInteractive => Arc::new(JsonOutput),
    };
    let job = ParseJob::spawn(app, config, sink)?;
    info!(input = %job.input(), "parse job started");
    while !job.is_finished() {
        thread::sleep(Duration::from_millis(200));
    }
    match job.status() {
        JobStatus::Finished(_) => info!("parse job finished"),
        JobStatus::Failed(reason) => warn!("parse job failed: {reason}"),
        JobStatus::Running => {}
    }
    Ok(job.wait()?)
}
