mod commands;
mod logging;
mod report;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use commands::migrate::{self, ApplyArgs, MigrationArgs};
use logging::{LogFormat, LoggingConfig};

#[derive(Parser)]
#[command(name = "sqlmig")]
#[command(about = "Apply numbered SQL migrations exactly once, in order")]
#[command(version)]
struct Cli {
    /// Log level for sqlmig output (RUST_LOG overrides)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Log line format
    #[arg(long, global = true, value_enum, default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply all pending migrations, stopping at the first failure
    Apply(ApplyArgs),

    /// Create a new migration script with the next ordinal
    Create {
        /// Migration name
        name: String,

        #[command(flatten)]
        migrations: MigrationArgs,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = logging::init_logging(&LoggingConfig::new(&cli.log_level, cli.log_format)) {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }

    let result = match cli.command {
        Commands::Apply(args) => migrate::apply(args).await,
        Commands::Create { name, migrations } => {
            migrate::create(&name, &migrations).map(|()| true)
        }
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
