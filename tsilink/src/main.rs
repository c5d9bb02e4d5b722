//! tsilink CLI - push spreadsheet rows to TrueSight Intelligence
//!
//! ```bash
//! tsilink -f incidents.xlsx -m incident-map.json -e me@company.com -t <token>
//! tsilink -f export.csv -p csv -d ';' -m map.json --fake --verbose
//! ```
//!
//! Credentials may also come from `TSI_EMAIL` / `TSI_API_TOKEN` or a `.env`
//! file in the working directory.

use clap::error::ErrorKind;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use tsilink::sink::http::{DEFAULT_HOSTNAME, DEFAULT_PORT};
use tsilink::{run, BatchOptions, ProviderKind, RunOptions, SourceOptions};

#[derive(Parser, Debug)]
#[command(name = "tsilink")]
#[command(version, about = "Push Excel/CSV rows to TrueSight Intelligence as events", long_about = None)]
struct Cli {
    /// Input file (Excel workbook or CSV)
    #[arg(short, long)]
    file: PathBuf,

    /// Data provider: excel or csv
    #[arg(short, long, default_value = "excel")]
    provider: ProviderKind,

    /// Mapping file (JSON)
    #[arg(short, long)]
    map: PathBuf,

    /// First row to read (1-based, inclusive)
    #[arg(long, default_value_t = 2)]
    start: usize,

    /// Last row to read (inclusive)
    #[arg(long)]
    end: Option<usize>,

    /// Workbook sheet (default: first sheet)
    #[arg(long)]
    sheet: Option<String>,

    /// CSV delimiter (auto-detect if not specified)
    #[arg(short, long)]
    delimiter: Option<char>,

    /// Log events instead of sending them
    #[arg(long)]
    fake: bool,

    /// Log every event before it is sent
    #[arg(long)]
    verbose: bool,

    /// Account email
    #[arg(short, long, env = "TSI_EMAIL")]
    email: Option<String>,

    /// API token
    #[arg(short = 't', long = "token", env = "TSI_API_TOKEN", hide_env_values = true)]
    api_token: Option<String>,

    /// API host
    #[arg(long, default_value = DEFAULT_HOSTNAME)]
    host: String,

    /// API port
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Lower bound of the backlog window
    #[arg(long, default_value_t = 50)]
    min: u64,

    /// Upper bound of the backlog window
    #[arg(long, default_value_t = 150)]
    max: u64,

    /// Resubmissions per event after transport errors
    #[arg(long, default_value_t = 5)]
    max_retries: u32,

    /// Idle ticks after end of data before giving up on outstanding responses
    #[arg(long, default_value_t = 30)]
    idle_shutdown: u32,

    /// Log filter (e.g. info, debug, tsilink=trace)
    #[arg(long, default_value = "info", env = "TSI_LOG")]
    log_level: String,
}

impl Cli {
    fn into_run_options(self) -> RunOptions {
        let batch = BatchOptions {
            max_retries: self.max_retries,
            force_shutdown_after_idle_intervals: self.idle_shutdown,
            tick_interval: Duration::from_secs(1),
            verbose: self.verbose,
            ..BatchOptions::with_window(self.min, self.max)
        };

        RunOptions {
            source: SourceOptions {
                kind: self.provider,
                start: self.start,
                end: self.end,
                sheet: self.sheet,
                delimiter: self.delimiter,
            },
            batch,
            fake: self.fake,
            email: self.email,
            api_token: self.api_token,
            hostname: self.host,
            port: self.port,
            ..RunOptions::new(self.file, self.map)
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
        }
    };

    if let Err(e) = init_logging(&cli.log_level) {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    match run(cli.into_run_options()).await {
        Ok(stats) => {
            eprintln!("{}", stats);
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Aborting");
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(level: &str) -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| format!("invalid log level: {}", e))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(false))
        .with(filter)
        .init();

    Ok(())
}
