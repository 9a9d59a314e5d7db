pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "vitrine",
    about = "Vitrine operator CLI",
    long_about = "Inspect configuration, apply migrations, check readiness and replay scripted shopping conversations.",
    after_help = "Examples:\n  vitrine doctor --json\n  vitrine catalog --zipcode 91234567\n  vitrine replay demos/aviator_order.json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, catalog datasets, collaborators and DB connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "List the products and purchase history a zipcode resolves to")]
    Catalog {
        #[arg(long, help = "Eight digit zipcode of the shopper")]
        zipcode: String,
    },
    #[command(about = "Run a scripted conversation through the dispatcher on an in-memory store")]
    Replay {
        #[arg(help = "Path to a JSON replay script")]
        script: PathBuf,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Catalog { zipcode } => commands::catalog::run(&zipcode),
        Command::Replay { script } => commands::replay::run(&script),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
