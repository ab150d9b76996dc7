//! Non-chat subcommands: model management, the local server, saved chats,
//! capacity estimates and settings.

use crate::cli::{CapacityArgs, HistoryCommand, SettingsCommand};
use crate::utils::{config_path, history_db_path, init_settings, parse_parameter_count};
use anyhow::{anyhow, Result};
use providers::BlockingProvider;
use services::capacity::{self, HardwareProfile};
use services::ollama_manager::is_reachable;
use services::{HistoryStore, OllamaCli, OllamaServer, ServerOptions};
use shared::events::{PullOutcome, PullProgress};
use shared::model_api::ModelRegistry;
use shared::settings::AppSettings;
use std::io::{self, BufRead};

pub fn list_models(settings: &AppSettings) -> Result<()> {
    if !settings.provider.is_local() {
        let provider = BlockingProvider::new(settings.clone())?;
        for model in provider.list_models()? {
            println!("{}", model);
        }
        return Ok(());
    }

    let cli = OllamaCli::new(settings.ollama.binary.clone());
    let models = cli.list_models()?;
    if models.is_empty() {
        println!("No local models. Try `local-chat pull {}`.", settings.ollama.model);
        return Ok(());
    }
    println!("{:<32} {:<14} {:<10} MODIFIED", "NAME", "ID", "SIZE");
    for model in models {
        println!(
            "{:<32} {:<14} {:<10} {}",
            model.name, model.id, model.size, model.modified
        );
    }
    Ok(())
}

pub fn pull(settings: &AppSettings, model: &str) -> Result<()> {
    if !settings.provider.is_local() {
        return Err(anyhow!(
            "{} models are hosted remotely and cannot be downloaded",
            settings.provider
        ));
    }
    let cli = OllamaCli::new(settings.ollama.binary.clone());
    let outcome = cli.fetch_model(model, &mut |progress: PullProgress| {
        println!("{}", progress.describe(model));
    });
    match outcome {
        PullOutcome::Completed { .. } => {
            println!("Model {} is ready", model);
            Ok(())
        }
        PullOutcome::Failed { reason } => {
            Err(anyhow!("Failed to download model {}: {}", model, reason))
        }
    }
}

pub fn show(settings: &AppSettings, model: &str) -> Result<()> {
    let cli = OllamaCli::new(settings.ollama.binary.clone());
    print!("{}", cli.show_model(model)?);
    Ok(())
}

pub fn serve(settings: &AppSettings, port: Option<u16>, gpu: bool) -> Result<()> {
    let options = ServerOptions {
        binary: settings.ollama.binary.clone(),
        port: port.unwrap_or(settings.ollama.port),
        use_gpu: gpu || settings.ollama.use_gpu,
    };
    if is_reachable(options.port) {
        println!("Something is already listening on port {}", options.port);
        return Ok(());
    }

    let handle = OllamaServer::start(&options)?;
    println!(
        "Ollama running on 127.0.0.1:{} (pid {}, {}). Press Enter to stop.",
        handle.port(),
        handle.pid(),
        if options.use_gpu { "gpu" } else { "cpu" }
    );
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    OllamaServer::stop(handle)?;
    println!("Ollama stopped");
    Ok(())
}

pub fn history(settings: &AppSettings, command: HistoryCommand) -> Result<()> {
    let path = history_db_path(settings).ok_or_else(|| anyhow!("no data directory on this system"))?;
    let store = HistoryStore::open(&path)?;

    match command {
        HistoryCommand::List => {
            let chats = store.list_chats()?;
            if chats.is_empty() {
                println!("No saved chats");
            }
            for chat in chats {
                println!(
                    "{:>5}  {}  {:>4} msgs  {}",
                    chat.id,
                    chat.created_at.format("%Y-%m-%d %H:%M"),
                    chat.message_count,
                    chat.title
                );
            }
        }
        HistoryCommand::Show { id } => {
            if !store.chat_exists(id)? {
                return Err(anyhow!("no saved chat with id {}", id));
            }
            for message in store.load_messages(id)? {
                println!("{}: {}", message.role, message.content);
            }
        }
        HistoryCommand::Delete { id } => {
            if !store.delete_chat(id)? {
                return Err(anyhow!("no saved chat with id {}", id));
            }
            println!("Deleted chat {}", id);
        }
        HistoryCommand::Clear => {
            store.clear_all()?;
            println!("Cleared chat history");
        }
    }
    Ok(())
}

pub fn capacity(args: &CapacityArgs) -> Result<()> {
    let profile = HardwareProfile {
        total_ram_gb: args.ram,
        total_vram_gb: args.vram,
        cpu_cores: args.cores,
        cpu_max_mhz: args.max_mhz,
    };
    let report = capacity::estimate(&profile, parse_parameter_count(&args.params)?);

    println!("Model size: {:.1}B parameters", report.parameter_count / 1e9);
    println!(
        "VRAM: need {:.2} GB, have {:.2} GB: {}",
        report.estimated_vram_gb, report.available_vram_gb, report.vram_status
    );
    println!(
        "RAM: need {:.2} GB, have {:.2} GB: {}",
        report.estimated_ram_gb, report.available_ram_gb, report.ram_status
    );
    println!(
        "CPU: {} cores at {:.2} GHz: {}",
        report.cpu_cores, report.cpu_ghz, report.cpu_status
    );
    println!();
    for line in capacity::recommendations(&profile) {
        println!("{}", line);
    }
    Ok(())
}

pub fn settings(settings: &AppSettings, found: bool, command: SettingsCommand) -> Result<()> {
    match command {
        SettingsCommand::Path => {
            let path = config_path().ok_or_else(|| anyhow!("no config directory on this system"))?;
            println!("{}", path.display());
            if !found {
                println!("(not created yet, defaults in use)");
            }
        }
        SettingsCommand::Show => {
            println!("{}", serde_json::to_string_pretty(&redacted(settings))?);
        }
        SettingsCommand::Init => {
            if init_settings(settings)? {
                println!("Wrote default settings");
            } else {
                println!("Settings already exist; edit the file directly");
            }
        }
    }
    Ok(())
}

/// Copy of `settings` safe to print.
fn redacted(settings: &AppSettings) -> AppSettings {
    let mut settings = settings.clone();
    for auth in [&mut settings.openai_auth, &mut settings.togetherai_auth] {
        if auth.api_key.is_some() {
            auth.api_key = Some("********".to_string());
        }
    }
    settings
}
