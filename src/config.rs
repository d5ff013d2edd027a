//! TOML deployment settings.
//!
//! Only `[documents]` is required; every other section falls back to the
//! defaults below. The provider credential is never stored here and is read
//! from `OPENAI_API_KEY` instead.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::poll::PollPolicy;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub documents: DocumentsConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub files: FilesConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DocumentsConfig {
    /// Folder scanned (non-recursively) on first provisioning.
    pub folder: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StateConfig {
    #[serde(default = "default_state_path")]
    pub path: PathBuf,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: default_state_path(),
        }
    }
}

fn default_state_path() -> PathBuf {
    PathBuf::from("config.json")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_assistant_name")]
    pub assistant_name: String,
    #[serde(default = "default_instructions")]
    pub instructions: String,
    #[serde(default = "default_vector_store_name")]
    pub vector_store_name: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: default_kind(),
            base_url: default_base_url(),
            model: default_model(),
            assistant_name: default_assistant_name(),
            instructions: default_instructions(),
            vector_store_name: default_vector_store_name(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_kind() -> String {
    "openai".to_string()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_model() -> String {
    "gpt-4o".to_string()
}
fn default_assistant_name() -> String {
    "Company Docs Assistant".to_string()
}
fn default_instructions() -> String {
    "Answer questions using the company documents only.".to_string()
}
fn default_vector_store_name() -> String {
    "CompanyDocsVectorStore".to_string()
}
fn default_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_run_timeout_secs")]
    pub run_timeout_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            run_timeout_secs: default_run_timeout_secs(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    1000
}
fn default_run_timeout_secs() -> u64 {
    300
}

impl ChatConfig {
    /// Polling policy used for both runs and file batches.
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(self.poll_interval_ms),
            timeout: Some(Duration::from_secs(self.run_timeout_secs)),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct FilesConfig {
    /// Also delete removed files from provider storage, not only from the vector store.
    #[serde(default)]
    pub purge_on_delete: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    /// Browser sessions unused this long are forgotten. `0` keeps them forever.
    #[serde(default = "default_session_idle_secs")]
    pub session_idle_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_upload_bytes: default_max_upload_bytes(),
            session_idle_secs: default_session_idle_secs(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8501".to_string()
}
fn default_max_upload_bytes() -> usize {
    50 * 1024 * 1024
}
fn default_session_idle_secs() -> u64 {
    3600
}

impl ServerConfig {
    pub fn session_idle_timeout(&self) -> Option<Duration> {
        (self.session_idle_secs > 0).then(|| Duration::from_secs(self.session_idle_secs))
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.chat.poll_interval_ms == 0 {
        anyhow::bail!("chat.poll_interval_ms must be > 0");
    }
    if config.chat.run_timeout_secs == 0 {
        anyhow::bail!("chat.run_timeout_secs must be > 0");
    }
    if config.provider.model.trim().is_empty() {
        anyhow::bail!("provider.model must not be empty");
    }
    if config.server.max_upload_bytes == 0 {
        anyhow::bail!("server.max_upload_bytes must be > 0");
    }

    match config.provider.kind.as_str() {
        "openai" | "memory" => {}
        other => anyhow::bail!(
            "Unknown provider kind: '{}'. Must be openai or memory.",
            other
        ),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_str: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_str)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let config = parse("[documents]\nfolder = \"./docs\"\n").unwrap();
        assert_eq!(config.documents.folder, PathBuf::from("./docs"));
        assert_eq!(config.state.path, PathBuf::from("config.json"));
        assert_eq!(config.provider.kind, "openai");
        assert_eq!(config.provider.model, "gpt-4o");
        assert_eq!(config.chat.poll_interval_ms, 1000);
        assert!(!config.files.purge_on_delete);
        assert_eq!(config.server.bind, "127.0.0.1:8501");
        assert_eq!(
            config.server.session_idle_timeout(),
            Some(Duration::from_secs(3600))
        );

        let policy = config.chat.poll_policy();
        assert_eq!(policy.interval, Duration::from_secs(1));
        assert_eq!(policy.timeout, Some(Duration::from_secs(300)));
    }

    #[test]
    fn rejects_unknown_provider_kind() {
        let err = parse("[documents]\nfolder = \"d\"\n[provider]\nkind = \"bogus\"\n").unwrap_err();
        assert!(err.to_string().contains("Unknown provider kind"));
    }

    #[test]
    fn rejects_zero_poll_interval() {
        let err =
            parse("[documents]\nfolder = \"d\"\n[chat]\npoll_interval_ms = 0\n").unwrap_err();
        assert!(err.to_string().contains("poll_interval_ms"));
    }

    #[test]
    fn documents_section_is_required() {
        assert!(parse("[server]\nbind = \"0.0.0.0:80\"\n").is_err());
    }
}
