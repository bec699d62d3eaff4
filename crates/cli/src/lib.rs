pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "moldquote",
    about = "Moldquote operator CLI",
    long_about = "Inspect configuration, manage the quotation ledger, and price parts offline.",
    after_help = "Examples:\n  moldquote doctor --json\n  moldquote estimate --material PP --dimensions 10x10x10 --quantity 100\n  moldquote recent --limit 5"
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
    #[command(about = "Price a part with the configured material table, without a chat session")]
    Estimate {
        #[arg(long, help = "Material code, e.g. PP or ABS")]
        material: String,
        #[arg(long, help = "Width x length x height in centimetres, e.g. 10x20x5")]
        dimensions: String,
        #[arg(long, help = "Number of parts")]
        quantity: u32,
    },
    #[command(about = "List the newest quotations stored in the local ledger")]
    Recent {
        #[arg(long, default_value_t = 10)]
        limit: u32,
    },
    #[command(about = "Validate config, webhook signing, pricing table and ledger readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => commands::config::run(),
        Command::Estimate { material, dimensions, quantity } => {
            commands::estimate::run(&material, &dimensions, quantity)
        }
        Command::Recent { limit } => commands::recent::run(limit),
        Command::Doctor { json } => commands::doctor::run(json),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
