use clap::{Args, Parser, Subcommand};
use shared::settings::ProviderKind;

#[derive(Parser, Debug)]
#[command(name = "local-chat", author, version, about = "Chat with local or hosted language models", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Interactive chat; type /quit to leave
    Chat(ChatArgs),

    /// Send a single message and print the reply
    Ask {
        /// Message to send
        text: String,

        /// Model to use (provider-specific)
        #[arg(short, long)]
        model: Option<String>,

        /// Provider to use [possible values: ollama, openai, togetherai]
        #[arg(short, long)]
        provider: Option<ProviderKind>,
    },

    /// List models the configured provider can serve
    Models,

    /// Download a model into the local runtime
    Pull { model: String },

    /// Print details of a local model
    Show { model: String },

    /// Run the local model server until Enter is pressed
    Serve {
        #[arg(long)]
        port: Option<u16>,

        /// Ask the runtime to use the GPU
        #[arg(long)]
        gpu: bool,
    },

    /// Browse or remove saved chats
    #[command(subcommand)]
    History(HistoryCommand),

    /// Estimate whether this machine can run a model of the given size
    Capacity(CapacityArgs),

    #[command(subcommand)]
    Settings(SettingsCommand),
}

#[derive(Args, Debug)]
pub struct ChatArgs {
    /// Model to use (provider-specific)
    #[arg(short, long)]
    pub model: Option<String>,

    /// Provider to use [possible values: ollama, openai, togetherai]
    #[arg(short, long)]
    pub provider: Option<ProviderKind>,

    /// Continue a saved chat
    #[arg(long, value_name = "ID")]
    pub resume: Option<i64>,

    #[arg(long)]
    pub system_prompt: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum HistoryCommand {
    List,
    Show { id: i64 },
    Delete { id: i64 },
    /// Delete every saved chat
    Clear,
}

#[derive(Args, Debug)]
pub struct CapacityArgs {
    /// Parameter count, e.g. 7B, 1.5b, 350M or 7000000000
    #[arg(long)]
    pub params: String,

    /// Total system memory in GB
    #[arg(long)]
    pub ram: f64,

    /// GPU memory in GB, 0 without a GPU
    #[arg(long, default_value_t = 0.0)]
    pub vram: f64,

    #[arg(long)]
    pub cores: u32,

    /// Maximum CPU clock in MHz
    #[arg(long)]
    pub max_mhz: f64,
}

#[derive(Subcommand, Debug)]
pub enum SettingsCommand {
    /// Print where settings are stored
    Path,
    /// Print the effective settings
    Show,
    /// Write a settings file with the defaults
    Init,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chat_flags() {
        let cli = Cli::try_parse_from([
            "local-chat",
            "chat",
            "--model",
            "gemma2:2b",
            "--provider",
            "together",
            "--resume",
            "4",
        ])
        .unwrap();
        match cli.command {
            Command::Chat(args) => {
                assert_eq!(args.model.as_deref(), Some("gemma2:2b"));
                assert_eq!(args.provider, Some(ProviderKind::TogetherAI));
                assert_eq!(args.resume, Some(4));
                assert!(args.system_prompt.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_history_and_capacity() {
        let cli = Cli::try_parse_from(["local-chat", "history", "delete", "7"]).unwrap();
        assert!(matches!(cli.command, Command::History(HistoryCommand::Delete { id: 7 })));

        let cli = Cli::try_parse_from([
            "local-chat", "capacity", "--params", "7B", "--ram", "16", "--cores", "8",
            "--max-mhz", "3600",
        ])
        .unwrap();
        match cli.command {
            Command::Capacity(args) => {
                assert_eq!(args.params, "7B");
                assert_eq!(args.vram, 0.0);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_provider_rejected() {
        assert!(Cli::try_parse_from(["local-chat", "chat", "--provider", "nope"]).is_err());
    }
}
