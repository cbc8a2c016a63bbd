use tracing::{debug, info, warn};

use crate::api_connection::FallbackRouter;
use crate::error::{PipelineError, Result, ValidationError};
use crate::pattern::AnalyzedPattern;
use crate::response_parser::parse_json_object;

pub const ANALYSIS_SYSTEM_PROMPT: &str = "Você é um nutricionista que extrai padrões de planos alimentares.
Regras obrigatórias:
1. Extraia SOMENTE refeições, alimentos, quantidades, horários e restrições que estejam escritos explicitamente no plano.
2. NUNCA presuma uma categoria alimentar (vegana, vegetariana, sem lactose, sem glúten) que o plano não declare.
3. Não invente alimentos, porções ou horários. Campos sem informação ficam como listas vazias.
4. Responda com um único objeto JSON, sem texto antes ou depois e sem blocos de código.";

/// Dietary categories the analyzer may not introduce on its own. Each group
/// lists the spellings that count as the source mentioning it.
const GUARDED_CATEGORIES: &[&[&str]] = &[
    &["vegan", "vegano", "vegana"],
    &["vegetarian", "vegetariano", "vegetariana"],
    &["lactose"],
    &["gluten", "glúten"],
];

pub fn build_analysis_prompt(plan_text: &str) -> String {
    format!(
        "Analise o plano nutricional abaixo e devolva um objeto JSON com exatamente estas chaves:
- \"meal_types\": objeto cujas chaves são os nomes das refeições como aparecem no plano; cada valor tem
  \"allowed_foods\" (lista de alimentos permitidos), \"portions\" (lista de porções com unidade) e
  \"restrictions\" (lista de restrições específicas daquela refeição).
- \"dietary_restrictions\": lista de restrições gerais declaradas no plano.
- \"allowed_proteins\", \"allowed_carbs\", \"allowed_vegetables\", \"allowed_fruits\", \"allowed_dairy\":
  listas de alimentos permitidos por grupo.
- \"timing\": objeto de nome da refeição para horário.

Plano nutricional:
{}",
        plan_text.trim()
    )
}

/// Extracts an [`AnalyzedPattern`] from plan text with one LLM call.
pub async fn analyze(router: &FallbackRouter, plan_text: &str) -> Result<AnalyzedPattern> {
    if plan_text.trim().is_empty() {
        return Err(PipelineError::input("plan text is empty"));
    }

    info!(chars = plan_text.len(), "analyzing nutrition plan");
    let content = router
        .call_llm(&build_analysis_prompt(plan_text), ANALYSIS_SYSTEM_PROMPT)
        .await?;
    debug!(raw = %content, "raw analysis response");

    parse_analysis_response(&content, plan_text)
}

/// Parse, guard and validate a raw analysis response.
pub fn parse_analysis_response(content: &str, plan_text: &str) -> Result<AnalyzedPattern> {
    let value = parse_json_object(content)?;
    let mut pattern = AnalyzedPattern::try_from(value)?;
    drop_inferred_restrictions(&mut pattern, plan_text);

    if pattern.meal_types.is_empty() {
        return Err(ValidationError::EmptyPattern.into());
    }
    info!(meals = ?pattern.meal_names(), "pattern extracted");
    Ok(pattern)
}

/// Removes guarded dietary categories that the source text never mentions.
/// Returns the dropped entries.
pub fn drop_inferred_restrictions(pattern: &mut AnalyzedPattern, source_text: &str) -> Vec<String> {
    let source = source_text.to_lowercase();
    let mut dropped = Vec::new();

    let mut keep = |restriction: &String| {
        let lowered = restriction.to_lowercase();
        let unsupported = GUARDED_CATEGORIES.iter().any(|spellings| {
            spellings.iter().any(|s| lowered.contains(s))
                && !spellings.iter().any(|s| source.contains(s))
        });
        if unsupported {
            warn!(restriction = %restriction, "dropping dietary restriction absent from the plan");
            dropped.push(restriction.clone());
        }
        !unsupported
    };

    pattern.dietary_restrictions.retain(&mut keep);
    for meal in &mut pattern.meal_types {
        meal.restrictions.retain(&mut keep);
    }
    dropped
}
