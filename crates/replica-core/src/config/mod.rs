mod defaults;
mod persona;
mod providers;


pub use persona::*;
pub use providers::*;

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::error::ReplicaError;
use crate::message::Sender;
use defaults::*;

/// Environment variables consulted after the config file is parsed.
const ENV_PROJECT: &[&str] = &["GOOGLE_CLOUD_PROJECT", "GCLOUD_PROJECT"];
const ENV_LOCATION: &[&str] = &["REPLICA_LOCATION", "GOOGLE_CLOUD_LOCATION"];
const ENV_ACCESS_TOKEN: &[&str] = &["GOOGLE_ACCESS_TOKEN"];
const ENV_API_KEY: &[&str] = &["GEMINI_API_KEY"];
const ENV_DB_PATH: &[&str] = &["REPLICA_DB_PATH"];

/// Top-level Replica configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub replica: ReplicaConfig,
    #[serde(default)]
    pub persona: PersonaConfig,
    #[serde(default)]
    pub responder: ResponderConfig,
    #[serde(default)]
    pub humanize: HumanizeConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

/// General process settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicaConfig {
    /// Fallback filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Also write logs to this file when set.
    #[serde(default)]
    pub log_file: Option<String>,
}

impl Default for ReplicaConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_file: None,
        }
    }
}

/// Message handler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponderConfig {
    /// Size of the history window sent to the model.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// Put the status back to `online` when an invocation fails after
    /// announcing `typing`. Off by default: a failed invocation leaves `typing`.
    #[serde(default)]
    pub reset_status_on_failure: bool,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
            reset_status_on_failure: false,
        }
    }
}

/// Cosmetic mutation applied to replies before they are written.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypoMode {
    /// Never mutate.
    Off,
    /// With `typo_probability`, swap one pair of adjacent characters.
    #[default]
    AdjacentSwap,
}

/// Reply timing and imperfection.
///
/// Delay = `chars * ms_per_char` + uniform draw in `[thinking_min_ms, thinking_max_ms]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HumanizeConfig {
    #[serde(default = "default_ms_per_char")]
    pub ms_per_char: u64,
    #[serde(default = "default_thinking_min_ms")]
    pub thinking_min_ms: u64,
    #[serde(default = "default_thinking_max_ms")]
    pub thinking_max_ms: u64,
    #[serde(default)]
    pub typo: TypoMode,
    /// Per-reply chance that the typo hook fires.
    #[serde(default = "default_typo_probability")]
    pub typo_probability: f64,
}

impl Default for HumanizeConfig {
    fn default() -> Self {
        Self {
            ms_per_char: default_ms_per_char(),
            thinking_min_ms: default_thinking_min_ms(),
            thinking_max_ms: default_thinking_max_ms(),
            typo: TypoMode::default(),
            typo_probability: default_typo_probability(),
        }
    }
}

/// Document store config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
    /// How often the watcher polls for new chat documents.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// Expand `~` to home directory.
pub fn shellexpand(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return format!("{}/{rest}", home.to_string_lossy());
        }
    }
    path.to_string()
}

impl Config {
    /// Overlay environment-supplied values. `lookup` returns the value of a variable.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let first = |names: &[&str]| {
            names
                .iter()
                .filter_map(|n| lookup(n))
                .find(|v| !v.trim().is_empty())
        };

        let gemini = &mut self.provider.gemini;
        if let Some(v) = first(ENV_PROJECT) {
            gemini.project = v;
        }
        if let Some(v) = first(ENV_LOCATION) {
            gemini.location = v;
        }
        if let Some(v) = first(ENV_ACCESS_TOKEN) {
            gemini.access_token = v;
        }
        if let Some(v) = first(ENV_API_KEY) {
            gemini.api_key = v;
        }
        if let Some(v) = first(ENV_DB_PATH) {
            self.store.db_path = v;
        }
    }

    /// Reject settings the responder cannot run with.
    pub fn validate(&self) -> Result<(), ReplicaError> {
        let identity = self.persona.identity.trim();
        if identity.is_empty() {
            return Err(ReplicaError::Config("persona.identity is empty".into()));
        }
        if identity == Sender::USER {
            return Err(ReplicaError::Config(format!(
                "persona.identity cannot be '{}', it is reserved for the human sender",
                Sender::USER
            )));
        }
        if self.persona.instruction.trim().is_empty() {
            return Err(ReplicaError::Config("persona.instruction is empty".into()));
        }
        if self.responder.history_limit == 0 {
            return Err(ReplicaError::Config(
                "responder.history_limit must be at least 1".into(),
            ));
        }
        let h = &self.humanize;
        if h.thinking_min_ms > h.thinking_max_ms {
            return Err(ReplicaError::Config(format!(
                "humanize.thinking_min_ms ({}) is greater than thinking_max_ms ({})",
                h.thinking_min_ms, h.thinking_max_ms
            )));
        }
        if !(0.0..=1.0).contains(&h.typo_probability) {
            return Err(ReplicaError::Config(format!(
                "humanize.typo_probability must be within [0, 1], got {}",
                h.typo_probability
            )));
        }
        if self.store.poll_interval_ms == 0 {
            return Err(ReplicaError::Config(
                "store.poll_interval_ms must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Parse a config from TOML text without touching the environment.
pub fn from_toml(content: &str) -> Result<Config, ReplicaError> {
    toml::from_str(content).map_err(|e| ReplicaError::Config(format!("failed to parse config: {e}")))
}

/// Load configuration from a TOML file.
///
/// Falls back to defaults if the file does not exist. Environment overrides,
/// the persona instruction file and validation are applied in that order.
pub fn load(path: &str) -> Result<Config, ReplicaError> {
    let path = Path::new(path);
    let mut config = if path.exists() {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ReplicaError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        from_toml(&content)?
    } else {
        info!(
            "Config file not found at {}, using defaults",
            path.display()
        );
        Config::default()
    };

    config.apply_env(|name| std::env::var(name).ok());
    config.persona.load_instruction_file()?;
    config.validate()?;

    Ok(config)
}
