pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "comanda",
    about = "Comanda operator CLI",
    long_about = "Maintain the Comanda ordering database: apply migrations and purge expired \
                  webhook dedup markers.",
    after_help = "Examples:\n  comanda migrate\n  comanda sweep --retention-hours 48"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Delete processed-message markers older than the retention window")]
    Sweep {
        #[arg(long, help = "Override idempotency.retention_hours for this run")]
        retention_hours: Option<u32>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Sweep { retention_hours } => commands::sweep::run(retention_hours),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
