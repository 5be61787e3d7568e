use std::sync::Arc;

use anyhow::Result;
use clap::arg;
use clap::command;
use clap::Parser;
use m2m_auth::app;
use m2m_auth::utils::config_loader;
use m2m_auth::utils::logging;
use m2m_auth::utils::logging::LogLevel;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, env = "CONFIG", default_value = "m2m-auth.yaml")]
    config: String,
    #[arg(long, env = "LOG_LEVEL", value_enum)]
    log_level: Option<LogLevel>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // -------------------------------
    // 1. Load YAML config
    // -------------------------------

    let args = Args::parse();
    let service_config = {
        let _bootstrap = logging::bootstrap(args.log_level);
        config_loader::run(&args.config)
            .await
            .inspect_err(|e| error!("failed to load config '{}': {:#}", args.config, e))?
    };
    logging::run(&service_config, args.log_level);

    // -------------------------------
    // 2. Wire shutdown to ctrl-c
    // -------------------------------

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(app::cancel_on_signal(tokio::signal::ctrl_c(), signal_token));

    // -------------------------------
    // 3. Run client and issuer sides until shutdown
    // -------------------------------

    info!("Service starting...");
    app::run_app(Arc::new(service_config), shutdown).await
}
