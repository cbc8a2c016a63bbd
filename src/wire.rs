//! Request/response bodies for the analyze and generate operations, as
//! exchanged with a web front end.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api_connection::FallbackRouter;
use crate::error::{ParseError, PipelineError, Result};
use crate::meal_regenerator::{regenerate_meal, PatternSource};
use crate::menu::Period;
use crate::pattern::AnalyzedPattern;
use crate::{menu_generator, pattern_analyzer};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    pub pdf_content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    /// The analyzed pattern as a JSON string.
    pub analysis: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    /// Either the pattern object or its JSON string form.
    pub analyzed_pattern: Value,
    #[serde(default)]
    pub period: Option<String>,
    #[serde(default)]
    pub single_meal: bool,
    #[serde(default)]
    pub meal_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    /// The menu, or the single regenerated meal, as a JSON string.
    pub menu: String,
}

pub async fn handle_analyze(router: &FallbackRouter, request: AnalyzeRequest) -> Result<AnalyzeResponse> {
    let pattern = pattern_analyzer::analyze(router, &request.pdf_content).await?;
    Ok(AnalyzeResponse { analysis: to_json(&pattern)? })
}

/// Full menu generation, or one new meal when `singleMeal` is set.
pub async fn handle_generate(router: &FallbackRouter, request: GenerateRequest) -> Result<GenerateResponse> {
    let pattern = pattern_from_wire(request.analyzed_pattern)?;

    if request.single_meal {
        let meal_type = request
            .meal_type
            .ok_or_else(|| PipelineError::input("mealType is required when singleMeal is set"))?;
        let item = regenerate_meal(router, &PatternSource::Pattern(pattern), &meal_type, &[]).await?;
        return Ok(GenerateResponse { menu: to_json(&item)? });
    }

    let period: Period = request
        .period
        .as_deref()
        .ok_or_else(|| PipelineError::input("period is required"))?
        .parse()?;
    let menu = menu_generator::generate(router, &pattern, period).await?;
    Ok(GenerateResponse { menu: to_json(&menu)? })
}

fn pattern_from_wire(value: Value) -> Result<AnalyzedPattern> {
    let value = match value {
        Value::Null => return Err(PipelineError::input("analyzedPattern is required")),
        Value::String(raw) => serde_json::from_str(&raw).map_err(ParseError::Json)?,
        other => other,
    };
    Ok(AnalyzedPattern::try_from(value)?)
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value).map_err(ParseError::Json)?)
}
