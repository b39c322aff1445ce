use anyhow::Context;
use clap::Parser;
use loadtest_common::{
    logging::init_console_logging, Config, CredentialQueue, EventLog, TraceLog,
};
use loadtest_runner::{HarnessContext, LoadRunner};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "Load test for the test-management API", long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Base URL of the API under test
    #[arg(long, env = "TARGET_HOST")]
    host: Option<String>,

    /// Number of concurrent users
    #[arg(short, long, env = "LOAD_USERS")]
    users: Option<usize>,

    /// Users started per second
    #[arg(long, env = "SPAWN_RATE")]
    spawn_rate: Option<f64>,

    /// Total run time (e.g. `30s`, `5m`)
    #[arg(long, env = "RUN_TIME")]
    run_time: Option<String>,

    /// CSV file with user credentials
    #[arg(long, env = "USERS_CSV")]
    credentials: Option<PathBuf>,

    /// Runtime event log file
    #[arg(long, env = "EVENT_LOG_FILE")]
    logfile: Option<PathBuf>,

    /// Directory for request/response trace files
    #[arg(long, env = "LOGS_DIR")]
    logs_dir: Option<PathBuf>,

    /// Console log level
    #[arg(long, env = "LOG_LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        Config::from_file(config_path)
            .with_context(|| format!("Failed to load config {}", config_path.display()))?
    } else {
        Config::from_env()
    };

    // Override with command line arguments
    if let Some(host) = args.host {
        config.target.host = host;
    }
    if let Some(users) = args.users {
        config.users.count = users;
    }
    if let Some(rate) = args.spawn_rate {
        config.users.spawn_rate = rate;
    }
    if let Some(run_time) = args.run_time {
        config.users.run_time = run_time;
    }
    if let Some(path) = args.credentials {
        config.users.credentials_path = path;
    }
    if let Some(path) = args.logfile {
        config.logging.event_log_path = Some(path);
    }
    if let Some(dir) = args.logs_dir {
        config.logging.logs_dir = dir;
    }
    if let Some(level) = args.log_level {
        config.logging.log_level = level;
    }

    init_console_logging(&config.logging.log_level)?;
    config.validate()?;

    info!("Starting load test v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded: {:?}", config);

    let events = EventLog::new(config.logging.event_source.clone());
    if let Some(path) = &config.logging.event_log_path {
        if let Err(e) = events.init(path) {
            warn!("Event log {} unavailable: {}", path.display(), e);
        }
    }

    let credentials = match CredentialQueue::from_file(&config.users.credentials_path) {
        Ok(queue) => queue,
        Err(e) => {
            let error_msg = format!("Failed to load users: {}", e);
            events.error(&error_msg);
            error!("{}", error_msg);
            return Err(e.into());
        }
    };
    let trace = TraceLog::new(&config.logging.logs_dir);
    info!("Tracing requests to {}", trace.path().display());

    let ctx = HarnessContext::new(Arc::new(credentials), trace, events.clone());
    let runner = LoadRunner::new(config, ctx);

    events.info("......... Initiating Load Test .......");

    let result = runner
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;

    events.info("........ Load Test Completed ........");

    let summary = result?;
    println!("\n=== LOAD TEST RESULTS ===");
    println!("Users started: {}", summary.users_started);
    println!("Sequences completed: {}", summary.sequences_completed);
    println!("Sequences interrupted: {}", summary.sequences_interrupted);

    Ok(())
}
