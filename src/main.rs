use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use brevo_contact_sync::brevo::BrevoClient;
use brevo_contact_sync::config::{self, Config, ConfigError};
use brevo_contact_sync::error::{exit_code, SyncError};
use brevo_contact_sync::sync::{self, DataDir};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Upsert contacts from the input table and record every API call"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Override the data folder (defaults to KBC_DATADIR or app.data_dir)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Override the number of contacts per upsert request
    #[arg(long)]
    batch_size: Option<usize>,

    /// Verbose logging
    #[arg(long)]
    debug: bool,
}

fn init_tracing(debug: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if debug { "debug" } else { "info" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    let cfg = match config::load(Some(&args.config)) {
        Ok(cfg) => cfg,
        Err(err) => {
            init_tracing(args.debug);
            let err = anyhow::Error::from(SyncError::from(err));
            error!("{:?}", err);
            return ExitCode::from(exit_code(&err) as u8);
        }
    };
    init_tracing(args.debug || cfg.app.debug);

    match run(&args, &cfg).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{:?}", err);
            ExitCode::from(exit_code(&err) as u8)
        }
    }
}

async fn run(args: &Args, cfg: &Config) -> Result<()> {
    let data_dir = args
        .data_dir
        .clone()
        .unwrap_or_else(|| cfg.app.resolved_data_dir());
    let batch_size = args.batch_size.unwrap_or(cfg.sync.batch_size);
    if batch_size == 0 {
        return Err(SyncError::from(ConfigError::Invalid("--batch-size must be > 0")).into());
    }

    let client = BrevoClient::from_config(cfg)?;
    info!(data_dir = %data_dir.display(), batch_size, "starting contact sync");
    sync::run(&DataDir::new(data_dir), batch_size, &client).await?;
    Ok(())
}
