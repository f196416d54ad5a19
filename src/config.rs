//! Application-level configuration loading.

use std::{
    env, fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "JEOPARDY_BACK_CONFIG_PATH";
const DEFAULT_QUESTIONS_PATH: &str = "config/questions.json";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Seed file of the in-memory question store.
    pub questions_path: PathBuf,
    pub board_intro_secs: u64,
    pub bot_think_secs: u64,
    pub ping_interval_secs: u64,
    /// Upper bound on the table size, whatever a game asks for.
    pub max_players: usize,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        Self::load_from(&resolve_config_path())
    }

    fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<Self>(&contents) {
                Ok(config) => {
                    info!(path = %path.display(), "loaded application config");
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    pub fn board_intro(&self) -> Duration {
        Duration::from_secs(self.board_intro_secs)
    }

    pub fn bot_think(&self) -> Duration {
        Duration::from_secs(self.bot_think_secs)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            questions_path: PathBuf::from(DEFAULT_QUESTIONS_PATH),
            board_intro_secs: 5,
            bot_think_secs: 5,
            ping_interval_secs: 50,
            max_players: 6,
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(name: &str, contents: &str) -> PathBuf {
        let path = env::temp_dir().join(format!("jeopardy-back-{}-{name}", std::process::id()));
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn partial_files_keep_the_other_defaults() {
        let path = write_config("partial.json", r#"{"botThinkSecs": 1, "maxPlayers": 4}"#);
        let config = AppConfig::load_from(&path);
        fs::remove_file(&path).unwrap();

        assert_eq!(config.bot_think(), Duration::from_secs(1));
        assert_eq!(config.max_players, 4);
        assert_eq!(config.ping_interval_secs, 50);
        assert_eq!(config.board_intro_secs, 5);
    }

    #[test]
    fn unreadable_configs_fall_back_to_defaults() {
        let path = write_config("broken.json", "{not json");
        assert_eq!(AppConfig::load_from(&path), AppConfig::default());
        fs::remove_file(&path).unwrap();

        let missing = env::temp_dir().join("jeopardy-back-missing-config.json");
        assert_eq!(AppConfig::load_from(&missing), AppConfig::default());
    }
}
