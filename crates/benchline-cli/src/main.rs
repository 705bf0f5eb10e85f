//! Benchline CLI entrypoint.

use clap::Parser;
use std::process::ExitCode;

mod commands;
mod config;
mod handlers;
mod outcome;
mod sinks;


use commands::{Commands, LogFormat};

#[derive(Parser)]
#[command(name = "benchline")]
#[command(author, version, about = "Event-triggered benchmark dispatcher", long_about = None)]
struct Cli {
    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // A missing .env is fine; the token may come from the real environment.
    let _ = dotenvy::dotenv();
    init_logging(cli.log_format);

    let code = match cli.command {
        Commands::Init { path, force } => handlers::init(&path, force)?,
        Commands::Validate { config } => handlers::validate(&config)?,
        Commands::Schema => handlers::schema()?,
        Commands::Check { config, event } => handlers::check(&config, &event)?,
        Commands::Dispatch {
            config,
            event,
            events,
        } => handlers::dispatch(&config, &event, events).await?,
    };

    Ok(ExitCode::from(code))
}

/// Logs go to stderr so stdout stays free for event output.
fn init_logging(format: LogFormat) {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(env_filter);

    match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Pretty => registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init(),
    }
}
