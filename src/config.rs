use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::command::ConfirmationPolicy;
use crate::wake::{Sensitivity, WakePhraseError, WakePhraseSet};

pub const DEFAULT_CONFIG_FILE: &str = "catcall.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error(transparent)]
    WakePhrases(#[from] WakePhraseError),
}

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub wake: WakeConfig,
    #[serde(default)]
    pub interpreter: InterpreterConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub text: TextConfig,
}

// ============================================================================
// Wake Config
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct WakeConfig {
    #[serde(default)]
    pub sensitivity: Sensitivity,
    /// How long a bare wake phrase keeps the session armed
    #[serde(default = "default_wake_timeout")]
    pub timeout_secs: u64,
    /// Recognizer locale tag, passed through to the ASR source
    #[serde(default = "default_locale")]
    pub locale: String,
    /// Replaces the built-in English phrase list when set
    #[serde(default)]
    pub phrases: Option<Vec<String>>,
}

impl Default for WakeConfig {
    fn default() -> Self {
        Self {
            sensitivity: Sensitivity::default(),
            timeout_secs: default_wake_timeout(),
            locale: default_locale(),
            phrases: None,
        }
    }
}

impl WakeConfig {
    pub fn phrase_set(&self) -> Result<WakePhraseSet, WakePhraseError> {
        match &self.phrases {
            Some(phrases) => WakePhraseSet::new(phrases),
            None => Ok(WakePhraseSet::english()),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_wake_timeout() -> u64 {
    5
}

fn default_locale() -> String {
    "en-US".into()
}

// ============================================================================
// Interpreter Config
// ============================================================================

/// OpenAI-compatible chat endpoint used for interpretation and text commands
#[derive(Debug, Deserialize)]
pub struct InterpreterConfig {
    /// Base URL - can use preset or explicit URL
    #[serde(default)]
    pub base_url: String,
    /// Preset shortcuts: "lm_studio", "openai", "ollama"
    #[serde(default)]
    pub preset: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    /// API key (supports ${ENV_VAR} syntax)
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default = "default_interpreter_timeout")]
    pub timeout_secs: u64,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            preset: None,
            model: default_model(),
            api_key: None,
            temperature: default_temperature(),
            max_tokens: None,
            timeout_secs: default_interpreter_timeout(),
        }
    }
}

fn default_model() -> String {
    "llama3.2".into()
}

fn default_temperature() -> Option<f32> {
    Some(0.0)
}

fn default_interpreter_timeout() -> u64 {
    20
}

const LM_STUDIO_URL: &str = "http://localhost:1234/v1";

impl InterpreterConfig {
    /// Resolve preset to base_url if needed, and expand env vars in api_key
    pub fn resolve_presets(&mut self) {
        if self.base_url.is_empty() {
            self.base_url = match self.preset.as_deref() {
                Some("lm_studio") | None => LM_STUDIO_URL.to_string(),
                Some("openai") => "https://api.openai.com/v1".to_string(),
                Some("ollama") => "http://localhost:11434/v1".to_string(),
                Some(other) => {
                    warn!(preset = other, "unknown preset, using LM Studio default");
                    LM_STUDIO_URL.to_string()
                }
            };
        }

        if let Some(key) = &self.api_key {
            self.api_key = Some(expand_env_vars(key));
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Expand ${VAR} to environment variable values
fn expand_env_vars(s: &str) -> String {
    let mut result = s.to_string();

    while let Some(start) = result.find("${") {
        let Some(end) = result[start..].find('}') else {
            break;
        };
        let var_name = &result[start + 2..start + end];
        let value = std::env::var(var_name).unwrap_or_else(|_| {
            warn!(var = var_name, "environment variable not set");
            String::new()
        });
        result.replace_range(start..start + end + 1, &value);
    }

    result
}

// ============================================================================
// Executor / Dispatch / Text Config
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ExecutorConfig {
    /// Page executor program; dry run when unset
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_executor_timeout")]
    pub timeout_secs: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            command: None,
            args: Vec::new(),
            timeout_secs: default_executor_timeout(),
        }
    }
}

impl ExecutorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_executor_timeout() -> u64 {
    10
}

#[derive(Debug, Default, Deserialize)]
pub struct DispatchConfig {
    #[serde(default)]
    pub confirmation: ConfirmationPolicy,
}

#[derive(Debug, Deserialize)]
pub struct TextConfig {
    #[serde(default = "default_ctx_size")]
    pub ctx_size: usize,
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            ctx_size: default_ctx_size(),
        }
    }
}

fn default_ctx_size() -> usize {
    4096
}

impl Config {
    /// Load from `path`. A missing file means defaults; a malformed one is an error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            toml::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            debug!(path = %path.display(), "no config file, using defaults");
            Config::default()
        };

        // fail early on an unusable phrase list
        config.wake.phrase_set()?;
        config.interpreter.resolve_presets();

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config.wake.sensitivity, Sensitivity::Default);
        assert_eq!(config.wake.timeout(), Duration::from_secs(5));
        assert_eq!(config.wake.locale, "en-US");
        assert_eq!(config.interpreter.base_url, LM_STUDIO_URL);
        assert!(config.executor.command.is_none());
        assert_eq!(config.dispatch.confirmation, ConfirmationPolicy::Allow);
        assert_eq!(config.text.ctx_size, 4096);
    }

    #[test]
    fn test_full_file() {
        let file = write_config(
            r#"
[wake]
sensitivity = "loose"
timeout_secs = 8
phrases = ["Hey Computer", "hey computers"]

[interpreter]
preset = "ollama"
model = "qwen2.5"

[executor]
command = "node"
args = ["bridge.js"]

[dispatch]
confirmation = "deny"
"#,
        );
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.wake.sensitivity, Sensitivity::Loose);
        assert_eq!(config.wake.timeout_secs, 8);
        assert_eq!(config.wake.phrase_set().unwrap().canonical(), "hey computer");
        assert_eq!(config.interpreter.base_url, "http://localhost:11434/v1");
        assert_eq!(config.interpreter.model, "qwen2.5");
        assert_eq!(config.executor.command.as_deref(), Some("node"));
        assert_eq!(config.executor.args, vec!["bridge.js"]);
        assert_eq!(config.dispatch.confirmation, ConfirmationPolicy::Deny);
    }

    #[test]
    fn test_explicit_base_url_wins() {
        let file = write_config(
            "[interpreter]\npreset = \"openai\"\nbase_url = \"http://gpu-box:8080/v1\"\n",
        );
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.interpreter.base_url, "http://gpu-box:8080/v1");
    }

    #[test]
    fn test_malformed_file_is_error() {
        let file = write_config("[wake]\nsensitivity = \"extreme\"\n");
        let err = Config::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }), "{err}");

        let file = write_config("not = [toml");
        assert!(Config::load(file.path()).is_err());
    }

    #[test]
    fn test_empty_phrase_list_rejected() {
        let file = write_config("[wake]\nphrases = [\"  \"]\n");
        let err = Config::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::WakePhrases(_)));
    }

    #[test]
    fn test_expand_env_vars() {
        // PATH is always set in test environments
        let path = std::env::var("PATH").unwrap();
        assert_eq!(expand_env_vars("${PATH}"), path);
        assert_eq!(expand_env_vars("key-${CATCALL_SURELY_UNSET_VAR}"), "key-");
        assert_eq!(expand_env_vars("plain"), "plain");
        assert_eq!(expand_env_vars("${unterminated"), "${unterminated");
    }
}
