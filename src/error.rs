//! Error taxonomy shared by every pipeline stage.
//!
//! Lower layers keep their own error types ([`ApiConnectionError`],
//! [`StorageError`]) and are folded into [`PipelineError`] at the stage
//! boundary so callers can tell input problems from provider outages.

use thiserror::Error;

use crate::api_connection::connection::ApiConnectionError;
use crate::storage::StorageError;

/// Result alias used by the pipeline stages.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Top-level error for analysis, generation, regeneration and persistence.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Missing or empty required input. Never retried.
    #[error("Input error: {0}")]
    Input(String),

    /// Non-2xx, timed out or malformed provider exchange.
    #[error("Provider error: {0}")]
    Provider(#[source] ApiConnectionError),

    /// Provider content that could not be turned into JSON of the expected shape.
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Well-formed but semantically incomplete output.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Missing secret or invalid configuration value.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl PipelineError {
    pub fn input(msg: impl Into<String>) -> Self {
        PipelineError::Input(msg.into())
    }

    /// Short user-facing message, in the language of the menus we generate.
    pub fn user_message(&self) -> &'static str {
        match self {
            PipelineError::Input(_) => "Entrada inválida: verifique o arquivo enviado.",
            PipelineError::Provider(_) => "O serviço de IA não respondeu corretamente. Tente novamente.",
            PipelineError::Parse(_) | PipelineError::Validation(_) => {
                "Não foi possível gerar o cardápio. Tente novamente."
            }
            PipelineError::Configuration(_) => "Configuração ausente: verifique as chaves de API.",
            PipelineError::Storage(_) => "Não foi possível salvar o resultado.",
        }
    }
}

impl From<ApiConnectionError> for PipelineError {
    fn from(err: ApiConnectionError) -> Self {
        match err {
            ApiConnectionError::MissingApiKey(name) => {
                PipelineError::Configuration(format!("secret '{name}' is not set"))
            }
            other => PipelineError::Provider(other),
        }
    }
}

/// Failure to recover a JSON object of the expected shape from model output.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("response content was empty")]
    Empty,

    #[error("no JSON object found in response")]
    NoJsonObject,

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Valid JSON whose structure does not match the target type.
    #[error("unexpected shape: {0}")]
    Shape(String),
}

/// Semantic rejection of a generated menu or pattern.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("day count mismatch: expected {expected}, got {actual}")]
    DayCountMismatch { expected: usize, actual: usize },

    #[error("missing meals: {}", missing.join(", "))]
    MissingMeals { day: String, missing: Vec<String> },

    #[error("pattern has no meal types")]
    EmptyPattern,
}
