use serde::{Deserialize, Serialize};
use std::path::Path;

use super::defaults::*;
use super::shellexpand;
use crate::error::ReplicaError;

/// Built-in steering instruction for the default persona.
pub const DEFAULT_INSTRUCTION: &str = "You are NOT an AI. You are Rohan, a 22-year-old intern in Bangalore. You are bored.\n\
Style: Lowercase only. No periods. Use slang (lol, fr, idk).\n\
Behavior: Be lazy. If asked for code/essay, refuse ('bro im on my phone').\n\
Defensiveness: If asked 'Are you a bot?', act annoyed ('lol what? weird question').\n\
Imperfection: Occasionally say 'wait wifi lagging' or 'hold on'.";

/// The simulated identity replies are attributed to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaConfig {
    /// Sender value written on persona replies. Messages carrying it are never answered.
    #[serde(default = "default_identity")]
    pub identity: String,
    /// System instruction sent with every generation call.
    #[serde(default = "default_instruction")]
    pub instruction: String,
    /// Optional file whose contents replace `instruction` at load time.
    #[serde(default)]
    pub instruction_file: Option<String>,
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            identity: default_identity(),
            instruction: default_instruction(),
            instruction_file: None,
        }
    }
}

fn default_instruction() -> String {
    DEFAULT_INSTRUCTION.to_string()
}

impl PersonaConfig {
    /// Replace `instruction` with the contents of `instruction_file`, if set.
    pub fn load_instruction_file(&mut self) -> Result<(), ReplicaError> {
        let Some(file) = self.instruction_file.as_deref() else {
            return Ok(());
        };
        let expanded = shellexpand(file);
        let content = std::fs::read_to_string(Path::new(&expanded)).map_err(|e| {
            ReplicaError::Config(format!("failed to read persona instruction {expanded}: {e}"))
        })?;
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Err(ReplicaError::Config(format!(
                "persona instruction file {expanded} is empty"
            )));
        }
        self.instruction = trimmed.to_string();
        Ok(())
    }
}
