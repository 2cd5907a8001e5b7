//! scriptlauncher - send one command to a ScriptLauncher server

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use scriptlauncher_client::{config::Args, ScriptLauncher, SessionError};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    // Initialize tracing/logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("scriptlauncher_client={},info", args.log_level).into());
    let registry = tracing_subscriber::registry().with(filter);
    if args.log_json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("Server: {}:{}", args.host, args.port);
    info!("Command: {}", args.command);

    let launcher = ScriptLauncher::new(args.launcher_config());

    let mut status = launcher.subscribe_status();
    tokio::spawn(async move {
        while let Ok(update) = status.recv().await {
            let indicator = update.status.indicator();
            info!(status = indicator.text, "Status changed");
        }
    });

    let outcome = tokio::select! {
        outcome = launcher.execute(args.message()) => outcome,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, abandoning pending command");
            launcher.close();
            Err(SessionError::Abandoned)
        }
    };

    match outcome {
        Ok(msg) => {
            let failed = msg.is_error();
            let payload = msg.payload.unwrap_or_default();
            println!("{}", serde_json::to_string_pretty(&payload)?);
            launcher.close();
            if failed {
                std::process::exit(1);
            }
            Ok(())
        }
        Err(e) => {
            error!(kind = e.kind(), "{}", e);
            launcher.close();
            std::process::exit(1);
        }
    }
}
