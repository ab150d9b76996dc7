use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod chat;
mod cli;
mod commands;
mod utils;

use crate::cli::{Cli, Command};

fn main() -> anyhow::Result<ExitCode> {
    // Logs go to stderr so replies on stdout stay clean.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let (settings, found) = utils::load_settings_or_default();

    match cli.command {
        Command::Chat(args) => chat::run_chat(&settings, args)?,
        Command::Ask {
            text,
            model,
            provider,
        } => {
            if !chat::ask(&settings, &text, model, provider)? {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Models => commands::list_models(&settings)?,
        Command::Pull { model } => commands::pull(&settings, &model)?,
        Command::Show { model } => commands::show(&settings, &model)?,
        Command::Serve { port, gpu } => commands::serve(&settings, port, gpu)?,
        Command::History(command) => commands::history(&settings, command)?,
        Command::Capacity(args) => commands::capacity(&args)?,
        Command::Settings(command) => commands::settings(&settings, found, command)?,
    }
    Ok(ExitCode::SUCCESS)
}
