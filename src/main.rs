use clap::{Parser, Subcommand};
use tracing::{error, info};

use swapsmith::app::{health_check, App};
use swapsmith::error::Result;
use swapsmith::infrastructure::config::Config;

#[derive(Parser, Debug)]
#[command(author, version, about = "Intent-driven trading execution core")]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, default_value = "swapsmith.toml")]
    config: String,

    /// Override the configured log level.
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON.
    #[arg(long, default_value_t = false)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the execution core until interrupted.
    Run,
    /// Validate configuration and print the health report.
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = if std::path::Path::new(&cli.config).exists() {
        Config::load(&cli.config)?
    } else {
        Config::default()
    };
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if cli.json_logs {
        config.logging.format = "json".to_string();
    }
    config.init_logging();

    match cli.command {
        Command::Check => {
            let report = health_check(&config);
            for check in report.checks() {
                info!(
                    name = check.name(),
                    critical = check.critical(),
                    healthy = check.is_healthy(),
                    status = ?check.status(),
                    "health check"
                );
            }
            if !report.is_healthy() {
                error!("configuration is unhealthy");
                std::process::exit(1);
            }
            Ok(())
        }
        Command::Run => {
            let report = health_check(&config);
            if !report.is_healthy() {
                error!("refusing to start with unhealthy configuration");
                std::process::exit(1);
            }

            let app = App::start(config).await?;
            info!("swapsmith running; ctrl-c to stop");
            tokio::signal::ctrl_c().await?;
            info!("shutdown signal received");
            app.shutdown().await;
            Ok(())
        }
    }
}
