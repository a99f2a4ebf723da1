use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::generation::GenerationConfig;

/// Prefix for environment overrides, e.g. `INDICTRANS__SERVER__PORT=9000`.
const ENV_PREFIX: &str = "INDICTRANS";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Allowed browser origins. Empty means any origin.
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost".to_string(),
        "http://localhost:5173".to_string(),
        "http://localhost:5000".to_string(),
    ]
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: default_cors_origins(),
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevicePreference {
    #[default]
    Auto,
    Cpu,
    Cuda,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DTypePreference {
    /// f16 on accelerators, f32 on CPU.
    #[default]
    Auto,
    F32,
    F16,
    Bf16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_repo_id")]
    pub repo_id: String,
    #[serde(default = "default_revision")]
    pub revision: String,
    /// Local directory holding the model files. Skips the hub when present.
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub device: DevicePreference,
    #[serde(default)]
    pub dtype: DTypePreference,
    /// Tokenizer truncation length.
    #[serde(default = "default_max_source_length")]
    pub max_source_length: usize,
}

fn default_repo_id() -> String {
    "ai4bharat/indictrans2-en-indic-1B".to_string()
}

fn default_revision() -> String {
    "main".to_string()
}

fn default_max_source_length() -> usize {
    256
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            repo_id: default_repo_id(),
            revision: default_revision(),
            path: None,
            device: DevicePreference::default(),
            dtype: DTypePreference::default(),
            max_source_length: default_max_source_length(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

fn default_log_filter() -> String {
    "indictrans_server=debug,tower_http=debug".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

impl Config {
    /// Loads a JSON or YAML file, then applies `INDICTRANS__*` overrides.
    pub fn load(path: &str) -> Result<Self> {
        if !Path::new(path).exists() {
            anyhow::bail!("Configuration file not found: {}", path);
        }

        let content = load_text_file(path)?;
        let content = substitute_env_vars(&content);

        let format = if path.to_lowercase().ends_with(".json") {
            config::FileFormat::Json
        } else {
            config::FileFormat::Yaml
        };

        let config: Config = config::Config::builder()
            .add_source(config::File::from_str(&content, format))
            .add_source(environment())
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path))?
            .try_deserialize()
            .with_context(|| format!("Invalid configuration in {}", path))?;

        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides, used when no file is found.
    pub fn from_env() -> Result<Self> {
        let config: Config = config::Config::builder()
            .add_source(environment())
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Tries each candidate in turn, falling back to [`Config::from_env`].
    pub fn discover() -> Result<(Self, Option<String>)> {
        for path in candidate_paths() {
            if !Path::new(&path).exists() {
                debug!("No config at {}", path);
                continue;
            }
            let cfg = Self::load(&path)?;
            return Ok((cfg, Some(path)));
        }
        Ok((Self::from_env()?, None))
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("server.port must be non-zero");
        }
        self.generation.validate()?;
        if self.model.max_source_length < 3 {
            anyhow::bail!("model.max_source_length must leave room for language tags");
        }
        Ok(())
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .list_separator(",")
        .with_list_parse_key("server.cors_origins")
        .try_parsing(true)
}

fn candidate_paths() -> Vec<String> {
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|p| p.to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("."));

    [
        std::env::var("CONFIG_PATH").ok(),
        Some("conf.yaml".to_string()),
        Some("conf.json".to_string()),
        exe_dir.join("conf.yaml").to_str().map(str::to_string),
        exe_dir.join("conf.json").to_str().map(str::to_string),
    ]
    .into_iter()
    .flatten()
    .collect()
}

/// Replaces `${VAR}` with the value of `VAR`, leaving unknown variables untouched.
pub fn substitute_env_vars(content: &str) -> String {
    let Ok(pattern) = Regex::new(r"\$\{(\w+)\}") else {
        return content.to_string();
    };
    pattern
        .replace_all(content, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned()
}

/// Reads a text file, dropping a UTF-8 BOM and replacing invalid sequences.
fn load_text_file(file_path: &str) -> Result<String> {
    let bytes = fs::read(file_path)?;
    let (content, _, had_errors) = encoding_rs::UTF_8.decode(&bytes);
    if had_errors {
        debug!("{} is not valid UTF-8; invalid bytes were replaced", file_path);
    }
    Ok(content.into_owned())
}
