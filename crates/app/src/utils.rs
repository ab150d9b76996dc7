use anyhow::{anyhow, Context, Result};
use shared::settings::AppSettings;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const APP_DIR: &str = "local_chat";

/// Expand a path string that may start with ~ to the full home directory path
pub fn expand_user_path(path_str: &str) -> PathBuf {
    if let Some(stripped) = path_str.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path_str)
}

/// Get the config file path
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|mut p| {
        p.push(APP_DIR);
        p.push("settings.json");
        p
    })
}

/// Where chat history lives unless settings say otherwise.
pub fn history_db_path(settings: &AppSettings) -> Option<PathBuf> {
    if let Some(path) = &settings.history_path {
        return Some(expand_user_path(path));
    }
    dirs::data_dir().map(|mut p| {
        p.push(APP_DIR);
        p.push("chat_history.db");
        p
    })
}

/// Load settings from disk or return defaults. The flag tells whether a
/// settings file was found.
pub fn load_settings_or_default() -> (AppSettings, bool) {
    match config_path() {
        Some(path) => load_settings_from(&path),
        None => (AppSettings::default(), false),
    }
}

fn load_settings_from(path: &Path) -> (AppSettings, bool) {
    let Ok(contents) = std::fs::read_to_string(path) else {
        debug!(path = %path.display(), "no settings file, using defaults");
        return (AppSettings::default(), false);
    };
    match serde_json::from_str::<AppSettings>(&contents) {
        Ok(settings) => (settings, true),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring unreadable settings file");
            (AppSettings::default(), false)
        }
    }
}

/// Write `settings` to the config file unless one already exists. Returns
/// whether a file was written.
pub fn init_settings(settings: &AppSettings) -> Result<bool> {
    let path = config_path().ok_or_else(|| anyhow!("no config directory on this system"))?;
    init_settings_at(&path, settings)
}

fn init_settings_at(path: &Path, settings: &AppSettings) -> Result<bool> {
    if path.exists() {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        // An unreadable file is left for the user to fix, never replaced.
        serde_json::from_str::<AppSettings>(&contents).map_err(|e| {
            anyhow!("settings file {} is unreadable ({}); fix or remove it first", path.display(), e)
        })?;
        return Ok(false);
    }
    save_settings_to(path, settings)?;
    Ok(true)
}

fn save_settings_to(path: &Path, settings: &AppSettings) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings)?;
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

/// Parse a parameter count such as `7B`, `1.5b`, `350M` or `7000000000`.
pub fn parse_parameter_count(text: &str) -> Result<f64> {
    let text = text.trim();
    let (number, scale) = match text.chars().last() {
        Some('b' | 'B') => (&text[..text.len() - 1], 1e9),
        Some('m' | 'M') => (&text[..text.len() - 1], 1e6),
        _ => (text, 1.0),
    };
    let value: f64 = number
        .trim()
        .parse()
        .map_err(|_| anyhow!("invalid parameter count: {}", text))?;
    if !value.is_finite() || value <= 0.0 {
        return Err(anyhow!("parameter count must be positive: {}", text));
    }
    Ok(value * scale)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::settings::ProviderKind;
    use tempfile::TempDir;

    #[test]
    fn test_settings_round_trip_on_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("local_chat").join("settings.json");

        let (settings, found) = load_settings_from(&path);
        assert!(!found);
        assert_eq!(settings.provider, ProviderKind::Ollama);

        let mut changed = settings;
        changed.provider = ProviderKind::TogetherAI;
        changed.system_prompt = "Be brief.".to_string();
        save_settings_to(&path, &changed).unwrap();

        let (loaded, found) = load_settings_from(&path);
        assert!(found);
        assert_eq!(loaded.provider, ProviderKind::TogetherAI);
        assert_eq!(loaded.system_prompt, "Be brief.");
    }

    #[test]
    fn test_broken_settings_fall_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();
        let (settings, found) = load_settings_from(&path);
        assert!(!found);
        assert_eq!(settings.ollama.port, 11434);
    }

    #[test]
    fn test_init_keeps_unreadable_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        let broken = r#"{"provider":"openai","openai_auth":{"api_key":"sk-user"},}"#;
        std::fs::write(&path, broken).unwrap();

        let err = init_settings_at(&path, &AppSettings::default()).unwrap_err();
        assert!(err.to_string().contains("unreadable"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), broken);
    }

    #[test]
    fn test_init_writes_only_when_missing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("local_chat").join("settings.json");

        assert!(init_settings_at(&path, &AppSettings::default()).unwrap());
        let written = std::fs::read_to_string(&path).unwrap();

        let other = AppSettings {
            provider: ProviderKind::OpenAI,
            ..AppSettings::default()
        };
        assert!(!init_settings_at(&path, &other).unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), written);
    }

    #[test]
    fn test_history_path_from_settings() {
        let settings = AppSettings {
            history_path: Some("/tmp/chats.db".to_string()),
            ..AppSettings::default()
        };
        assert_eq!(history_db_path(&settings), Some(PathBuf::from("/tmp/chats.db")));
    }

    #[test]
    fn test_parameter_counts() {
        assert_eq!(parse_parameter_count("7B").unwrap(), 7e9);
        assert_eq!(parse_parameter_count("1.5b").unwrap(), 1.5e9);
        assert_eq!(parse_parameter_count("350M").unwrap(), 350e6);
        assert_eq!(parse_parameter_count("7000000000").unwrap(), 7e9);
        assert!(parse_parameter_count("lots").is_err());
        assert!(parse_parameter_count("0B").is_err());
        assert!(parse_parameter_count("NaN").is_err());
        assert!(parse_parameter_count("inf").is_err());
        assert!(parse_parameter_count("-infB").is_err());
    }
}
