use clap::Parser;
use colored::*;
use std::process;

mod cli;

use cli::token::TokenCommands;

#[derive(Parser)]
#[command(name = "tokenvault")]
#[command(about = "Tokenvault - OAuth token lifecycle manager for cloud storage")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: TokenCommands,
}

#[tokio::main]
async fn main() {
    // Load .env file
    dotenvy::dotenv().ok();
    tokenvault_cli::logging::init();

    let cli = Cli::parse();

    if let Err(e) = cli.command.execute().await {
        eprintln!("{} {:#}", "✗".red().bold(), e);
        process::exit(1);
    }
}
