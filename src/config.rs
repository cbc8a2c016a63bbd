//! Runtime configuration and secret lookup.
//!
//! Non-secret settings come from the environment (a `.env` file is honoured
//! through `dotenv`). API keys are never read here: providers resolve them
//! by name through a [`SecretStore`] right before each request.

use dotenv::dotenv;
use reqwest::Client;
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::api_connection::endpoints::{
    ANTHROPIC_DEFAULT_BASE_URL, ANTHROPIC_DEFAULT_MODEL, OPENAI_DEFAULT_BASE_URL,
    OPENAI_DEFAULT_MODEL,
};
use crate::api_connection::{FallbackRouter, HttpProvider, LlmProvider, Provider};
use crate::error::{PipelineError, Result};

pub const DEFAULT_STORE_PATH: &str = "menu_store.json";
const DEFAULT_TIMEOUT_SECS: u64 = 120;
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Looks secrets up by name at call time.
pub trait SecretStore: Send + Sync {
    fn get_secret(&self, name: &str) -> Option<String>;
}

/// Reads secrets from the process environment (after loading `.env`).
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvSecretStore;

impl SecretStore for EnvSecretStore {
    fn get_secret(&self, name: &str) -> Option<String> {
        dotenv().ok();
        env::var(name).ok().filter(|value| !value.trim().is_empty())
    }
}

/// Fixed set of secrets, mostly useful for tests and embedding.
#[derive(Debug, Default, Clone)]
pub struct MapSecretStore {
    secrets: HashMap<String, String>,
}

impl MapSecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: &str) -> Self {
        self.secrets.insert(name.to_string(), value.to_string());
        self
    }
}

impl SecretStore for MapSecretStore {
    fn get_secret(&self, name: &str) -> Option<String> {
        self.secrets.get(name).filter(|value| !value.trim().is_empty()).cloned()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub openai_base_url: String,
    pub openai_model: String,
    pub anthropic_base_url: String,
    pub anthropic_model: String,
    /// Per-request timeout for provider calls.
    pub timeout: Duration,
    pub max_tokens: u32,
    /// When false the Anthropic fallback is not wired into the router.
    pub enable_fallback: bool,
    pub store_path: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            openai_base_url: OPENAI_DEFAULT_BASE_URL.to_string(),
            openai_model: OPENAI_DEFAULT_MODEL.to_string(),
            anthropic_base_url: ANTHROPIC_DEFAULT_BASE_URL.to_string(),
            anthropic_model: ANTHROPIC_DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_tokens: DEFAULT_MAX_TOKENS,
            enable_fallback: true,
            store_path: PathBuf::from(DEFAULT_STORE_PATH),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the config from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let timeout = match get("LLM_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(parse_number::<u64>("LLM_TIMEOUT_SECS", &raw)?),
            None => defaults.timeout,
        };
        let max_tokens = match get("LLM_MAX_TOKENS") {
            Some(raw) => parse_number::<u32>("LLM_MAX_TOKENS", &raw)?,
            None => defaults.max_tokens,
        };
        let enable_fallback = match get("LLM_ENABLE_FALLBACK") {
            Some(raw) => !matches!(raw.trim().to_lowercase().as_str(), "0" | "false" | "no"),
            None => defaults.enable_fallback,
        };

        Ok(Self {
            openai_base_url: get("OPENAI_BASE_URL").unwrap_or(defaults.openai_base_url),
            openai_model: get("OPENAI_MODEL").unwrap_or(defaults.openai_model),
            anthropic_base_url: get("ANTHROPIC_BASE_URL").unwrap_or(defaults.anthropic_base_url),
            anthropic_model: get("ANTHROPIC_MODEL").unwrap_or(defaults.anthropic_model),
            timeout,
            max_tokens,
            enable_fallback,
            store_path: get("MENU_STORE_PATH").map(PathBuf::from).unwrap_or(defaults.store_path),
        })
    }

    /// Primary OpenAI-compatible provider, Anthropic as the larger-context fallback.
    pub fn build_router(&self, secrets: Arc<dyn SecretStore>) -> Result<FallbackRouter> {
        let client = Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| PipelineError::Configuration(format!("failed to build HTTP client: {e}")))?;

        let primary: Arc<dyn LlmProvider> = Arc::new(
            HttpProvider::new(
                Provider::openai(&self.openai_base_url, &self.openai_model),
                client.clone(),
                Arc::clone(&secrets),
            )
            .with_max_tokens(self.max_tokens)
            .with_temperature(0.7),
        );
        let secondary: Option<Arc<dyn LlmProvider>> = if self.enable_fallback {
            Some(Arc::new(
                HttpProvider::new(
                    Provider::anthropic(&self.anthropic_base_url, &self.anthropic_model),
                    client,
                    secrets,
                )
                .with_max_tokens(self.max_tokens),
            ))
        } else {
            None
        };

        Ok(FallbackRouter::new(primary, secondary).with_call_timeout(self.timeout))
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| PipelineError::Configuration(format!("{name} must be a positive number, got '{raw}'")))
}
