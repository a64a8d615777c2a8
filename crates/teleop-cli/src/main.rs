//! teleop CLI: run the relay, a simulated robot, or a console operator.

mod relay;
mod robot;
mod ui;

use std::time::Duration;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "teleop",
    about = "Relay remote-control commands between an operator and a robot",
    version,
    propagate_version = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the relay server.
    Relay {
        /// Path to configuration file.
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Run a simulated robot that acknowledges everything it receives.
    Robot {
        /// Relay WebSocket URL.
        #[arg(short, long, default_value = "ws://127.0.0.1:8080")]
        url: String,

        /// Shared robot secret.
        #[arg(short, long, env = "TELEOP_ROBOT_SECRET")]
        secret: String,

        /// Seconds to wait before reconnecting.
        #[arg(long, default_value_t = 10)]
        reconnect_secs: u64,
    },

    /// Drive the robot from the terminal.
    Ui {
        /// Relay WebSocket URL, overriding the config file.
        #[arg(short, long)]
        url: Option<String>,

        /// Operator access token.
        #[arg(short, long, env = "TELEOP_TOKEN")]
        token: String,

        /// Path to client configuration file.
        #[arg(short, long)]
        config: Option<String>,
    },
}

fn init_tracing(default_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Relay { config } => {
            let config = teleop_relay::setup::load_config(config.as_deref())?;
            init_tracing(&config.relay.log_level);
            relay::run(&config).await?;
        }
        Commands::Robot {
            url,
            secret,
            reconnect_secs,
        } => {
            init_tracing("info");
            robot::run(&url, &secret, Duration::from_secs(reconnect_secs)).await?;
        }
        Commands::Ui { url, token, config } => {
            init_tracing("warn");
            let mut config = teleop_client::config::load_config(config.as_deref())?;
            if let Some(url) = url {
                config.url = url;
            }
            ui::run(config, token).await?;
        }
    }

    Ok(())
}
