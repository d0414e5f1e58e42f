//! Configuration system (layered: code > env > config file).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::error::{LlmuxError, Result};
use crate::parse::DEFAULT_TOOL_CALL_TAG;

/// Global default config (lazy-initialized from file + env).
static DEFAULT_CONFIG: OnceLock<LlmuxConfig> = OnceLock::new();

const CONFIG_FILE_NAME: &str = "config.toml";

/// How the normalizer treats tool calls embedded in content text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Builder)]
#[serde(default)]
pub struct StreamOptions {
    /// Control tag name; `tool_call` means `<tool_call>…</tool_call>`.
    #[builder(into, default = DEFAULT_TOOL_CALL_TAG.to_string())]
    pub tool_call_tag: String,
    /// Detect tool calls written into the content text at all.
    #[builder(default = true)]
    pub text_tool_calls: bool,
    /// Also treat bare `{"name":…,"arguments":…}` objects in content as calls.
    #[builder(default = true)]
    pub bare_json_tool_calls: bool,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Layered configuration for llmux.
///
/// Resolution order for API keys and base URLs:
/// 1. Explicit values (`set_api_key`, `set_base_url`)
/// 2. Environment variables (after loading `.env`)
/// 3. The TOML config file
#[derive(Debug, Clone)]
pub struct LlmuxConfig {
    api_keys: Arc<RwLock<HashMap<String, String>>>,
    base_urls: Arc<RwLock<HashMap<String, String>>>,
    stream: Arc<RwLock<StreamOptions>>,
}

impl Default for LlmuxConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// On-disk config file shape.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    providers: HashMap<String, ProviderSection>,
    #[serde(default)]
    stream: Option<StreamOptions>,
}

#[derive(Debug, Default, Deserialize)]
struct ProviderSection {
    api_key: Option<String>,
    base_url: Option<String>,
}

const ENV_API_KEYS: &[(&str, &str)] = &[
    ("OPENAI_API_KEY", "openai"),
    ("OPENAI_COMPAT_API_KEY", "openai-compatible"),
    ("OPENROUTER_API_KEY", "openrouter"),
    ("DEEPSEEK_API_KEY", "deepseek"),
    ("GOOGLE_API_KEY", "gemini"),
    ("GEMINI_API_KEY", "gemini"),
    ("ANTHROPIC_API_KEY", "anthropic"),
];

const ENV_BASE_URLS: &[(&str, &str)] = &[
    ("OPENAI_BASE_URL", "openai"),
    ("OPENAI_COMPAT_BASE_URL", "openai-compatible"),
    ("OPENROUTER_BASE_URL", "openrouter"),
    ("DEEPSEEK_BASE_URL", "deepseek"),
    ("GEMINI_BASE_URL", "gemini"),
    ("ANTHROPIC_BASE_URL", "anthropic"),
];

impl LlmuxConfig {
    /// Create an empty config with default stream options.
    pub fn new() -> Self {
        Self {
            api_keys: Arc::new(RwLock::new(HashMap::new())),
            base_urls: Arc::new(RwLock::new(HashMap::new())),
            stream: Arc::new(RwLock::new(StreamOptions::default())),
        }
    }

    /// Load from environment variables (OPENAI_API_KEY, GEMINI_API_KEY, etc.).
    pub fn from_env() -> Self {
        let config = Self::new();
        config.apply_env();
        config
    }

    /// Parse a TOML config document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(text)?;
        let config = Self::new();

        for (provider, section) in file.providers {
            if let Some(key) = section.api_key {
                config.set_api_key(&provider, key);
            }
            if let Some(url) = section.base_url {
                config.set_base_url(&provider, url);
            }
        }
        if let Some(stream) = file.stream {
            config.set_stream_options(stream)?;
        }

        Ok(config)
    }

    /// Read a TOML config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Config file (if present) overlaid with the environment.
    pub fn load() -> Result<Self> {
        let config = match default_config_path() {
            Some(path) if path.exists() => Self::from_file(path)?,
            _ => Self::new(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Get (or create) the global default config.
    ///
    /// A broken config file is skipped here; call [`LlmuxConfig::load`] to
    /// see the error.
    pub fn global() -> &'static LlmuxConfig {
        DEFAULT_CONFIG.get_or_init(|| {
            Self::load().unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Ignoring unreadable config file");
                Self::from_env()
            })
        })
    }

    fn apply_env(&self) {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error

        for (env_var, provider) in ENV_API_KEYS {
            if let Ok(key) = std::env::var(env_var) {
                self.set_api_key(provider, key);
            }
        }
        for (env_var, provider) in ENV_BASE_URLS {
            if let Ok(url) = std::env::var(env_var) {
                self.set_base_url(provider, url);
            }
        }
    }

    pub fn set_api_key(&self, provider: &str, key: String) {
        self.api_keys
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(provider.to_string(), key);
    }

    pub fn get_api_key(&self, provider: &str) -> Option<String> {
        self.api_keys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(provider)
            .cloned()
    }

    pub fn set_base_url(&self, provider: &str, url: String) {
        self.base_urls
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(provider.to_string(), url);
    }

    pub fn get_base_url(&self, provider: &str) -> Option<String> {
        self.base_urls
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(provider)
            .cloned()
    }

    /// Replace the stream options, rejecting an unusable tag name.
    pub fn set_stream_options(&self, options: StreamOptions) -> Result<()> {
        crate::parse::TagBlockExtractor::new(&options.tool_call_tag)?;
        *self.stream.write().unwrap_or_else(PoisonError::into_inner) = options;
        Ok(())
    }

    pub fn stream_options(&self) -> StreamOptions {
        self.stream
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Check if a provider has an API key configured.
    pub fn has_credentials(&self, provider: &str) -> bool {
        self.get_api_key(provider).is_some()
    }
}

/// `config.toml` inside the platform config directory, e.g.
/// `~/.config/llmux/config.toml` on Linux.
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "llmux")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

impl TryFrom<&str> for LlmuxConfig {
    type Error = LlmuxError;

    fn try_from(text: &str) -> Result<Self> {
        Self::from_toml_str(text)
    }
}
