use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MailboxAuth {
    #[default]
    Password,
    Oauth,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MailboxConfig {
    pub imap_server: String,
    #[serde(default = "default_imap_port")]
    pub port: u16,
    /// Mailbox identity; also recorded on every persisted row.
    pub user: String,
    #[serde(default = "default_folders")]
    pub folders: Vec<String>,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_mailbox_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub auth: MailboxAuth,
    pub oauth_client_id: Option<String>,
    pub oauth_token_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct InferenceConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_inference_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TriageConfig {
    #[serde(default = "default_window_hours")]
    pub window_hours: i64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
    /// Who the mail is triaged for, e.g. "Jane Doe (Managing Partner)".
    #[serde(default = "default_owner")]
    pub owner: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct StoreConfig {
    pub db_path: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    pub mailbox: MailboxConfig,
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub triage: TriageConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

fn default_imap_port() -> u16 {
    993
}
fn default_folders() -> Vec<String> {
    vec!["INBOX".to_string()]
}
fn default_page_size() -> u32 {
    100
}
fn default_mailbox_timeout() -> u64 {
    30
}
fn default_endpoint() -> String {
    "https://api.anthropic.com/v1/messages".to_string()
}
fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}
fn default_api_version() -> String {
    "2023-06-01".to_string()
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_temperature() -> f32 {
    0.3
}
fn default_inference_timeout() -> u64 {
    60
}
fn default_window_hours() -> i64 {
    24
}
fn default_batch_size() -> usize {
    30
}
fn default_preview_chars() -> usize {
    200
}
fn default_owner() -> String {
    "the mailbox owner".to_string()
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            api_version: default_api_version(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_inference_timeout(),
        }
    }
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            window_hours: default_window_hours(),
            batch_size: default_batch_size(),
            preview_chars: default_preview_chars(),
            owner: default_owner(),
        }
    }
}

impl MailboxConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl InferenceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl TriageConfig {
    pub fn window(&self) -> chrono::Duration {
        chrono::Duration::hours(self.window_hours)
    }
}

impl Config {
    /// Rejects values that would make the pipeline meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.mailbox.folders.is_empty() {
            anyhow::bail!("mailbox.folders must name at least one folder");
        }
        if self.mailbox.page_size == 0 {
            anyhow::bail!("mailbox.page_size must be positive");
        }
        if self.triage.batch_size == 0 {
            anyhow::bail!("triage.batch_size must be positive");
        }
        if self.triage.window_hours <= 0 {
            anyhow::bail!("triage.window_hours must be positive");
        }
        if self.mailbox.auth == MailboxAuth::Oauth && self.mailbox.oauth_client_id.is_none() {
            anyhow::bail!("mailbox.oauth_client_id is required when auth = \"oauth\"");
        }
        Ok(())
    }
}

fn config_dir() -> Result<PathBuf> {
    Ok(dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("no config dir available"))?
        .join("mail_triage"))
}

pub fn config_path() -> Result<PathBuf> {
    let mut p = config_dir()?;
    fs::create_dir_all(&p)?;
    p.push("config.toml");
    Ok(p)
}

pub fn default_db_path() -> Result<PathBuf> {
    let mut p = config_dir()?;
    fs::create_dir_all(&p)?;
    p.push("triage.db");
    Ok(p)
}

fn sample_config() -> Config {
    Config {
        mailbox: MailboxConfig {
            imap_server: "imap.example.com".to_string(),
            port: default_imap_port(),
            user: "you@example.com".to_string(),
            folders: vec!["INBOX".to_string(), "Important".to_string()],
            page_size: default_page_size(),
            timeout_secs: default_mailbox_timeout(),
            auth: MailboxAuth::Password,
            oauth_client_id: None,
            oauth_token_url: None,
        },
        inference: InferenceConfig::default(),
        triage: TriageConfig::default(),
        store: StoreConfig::default(),
    }
}

/// Loads the config at `path`, or the default location when `None`.
/// A missing file gets a template written in its place.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => config_path()?,
    };
    if !path.exists() {
        let tom = toml::to_string_pretty(&sample_config())?;
        fs::write(&path, tom)
            .with_context(|| format!("writing template config {}", path.display()))?;
        return Err(anyhow::anyhow!(
            "Created template config at {}, edit it and run again",
            path.display()
        ));
    }
    let s = fs::read_to_string(&path)
        .with_context(|| format!("reading config {}", path.display()))?;
    parse_config(&s)
}

pub fn parse_config(s: &str) -> Result<Config> {
    let cfg: Config = toml::from_str(s)?;
    cfg.validate()?;
    Ok(cfg)
}

pub fn resolve_db_path(cfg: &Config) -> Result<PathBuf> {
    if let Some(p) = &cfg.store.db_path {
        Ok(PathBuf::from(p))
    } else {
        default_db_path()
    }
}
