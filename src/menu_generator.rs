//! Multi-day menu synthesis.
//!
//! The model's answer crosses an explicit parse-then-validate boundary
//! ([`GenerationOutcome`]). Day labels are rewritten and the total cost is
//! recomputed on every parsed menu, before validation runs, so neither
//! depends on what the model wrote.

use tracing::{debug, info, warn};

use crate::api_connection::FallbackRouter;
use crate::error::{ParseError, PipelineError, Result, ValidationError};
use crate::menu::{Menu, Period};
use crate::pattern::AnalyzedPattern;
use crate::response_parser::parse_json_object;

pub const GENERATION_SYSTEM_PROMPT: &str = "Você é um nutricionista brasileiro que monta cardápios a partir de padrões alimentares.
Regras obrigatórias:
1. Não presuma restrições alimentares que o padrão não declare; não exclua alimentos que não foram proibidos.
2. Use os alimentos EXATAMENTE como estão no padrão. Não troque por variantes: se o padrão diz \"arroz branco\", não use arroz integral; se diz \"pão\", não use pão integral ou diet.
3. Use apenas alimentos e quantidades presentes no padrão.
4. Todas as refeições do padrão devem aparecer em todos os dias, com o mesmo nome.
5. Estime custos com base em preços médios do Brasil, em reais.
6. Responda com um único objeto JSON, sem texto antes ou depois e sem blocos de código.";

const MENU_SCHEMA_EXAMPLE: &str = r#"{
  "days": [
    {
      "day": "Segunda-feira",
      "meals": [
        {
          "meal": "Nome da refeição exatamente como no padrão",
          "description": "Descrição da preparação",
          "ingredients": [
            { "name": "Nome do ingrediente", "quantity": "Quantidade com unidade", "estimatedCost": 0.00 }
          ]
        }
      ]
    }
  ],
  "totalCost": 0.00
}"#;

/// Result of turning one raw model response into a menu.
#[derive(Debug)]
pub enum GenerationOutcome {
    Ok(Menu),
    ParseFailed(ParseError),
    ValidationFailed(ValidationError),
}

impl GenerationOutcome {
    pub fn into_result(self) -> Result<Menu> {
        match self {
            GenerationOutcome::Ok(menu) => Ok(menu),
            GenerationOutcome::ParseFailed(err) => Err(PipelineError::Parse(err)),
            GenerationOutcome::ValidationFailed(err) => Err(PipelineError::Validation(err)),
        }
    }
}

pub fn build_generation_prompt(pattern: &AnalyzedPattern, period: Period) -> String {
    let days = period.days();
    let meal_list = pattern
        .meal_names()
        .iter()
        .map(|name| format!("\"{name}\""))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "Padrão alimentar analisado:
{pattern_json}

Crie um cardápio de EXATAMENTE {days} dias.
Cada dia deve conter TODAS estas refeições, com estes nomes: {meal_list}.
Varie as preparações entre os dias sempre que o padrão oferecer mais de uma opção.
Para cada refeição informe uma descrição da preparação e a lista completa de ingredientes com quantidade e custo estimado.

Formato da resposta:
{MENU_SCHEMA_EXAMPLE}",
        pattern_json = pattern.to_prompt_json(),
    )
}

/// Checks day count and meal coverage. Expects day names already normalized.
pub fn validate_menu(
    menu: &Menu,
    pattern: &AnalyzedPattern,
    period: Period,
) -> std::result::Result<(), ValidationError> {
    if menu.days.len() != period.days() {
        return Err(ValidationError::DayCountMismatch {
            expected: period.days(),
            actual: menu.days.len(),
        });
    }

    for day in &menu.days {
        let missing: Vec<String> = pattern
            .meal_names()
            .into_iter()
            .filter(|required| {
                let required = required.trim();
                !day.meals.iter().any(|meal| meal.meal.trim() == required)
            })
            .map(str::to_string)
            .collect();
        if !missing.is_empty() {
            return Err(ValidationError::MissingMeals { day: day.day.clone(), missing });
        }
    }
    Ok(())
}

/// Pure half of [`generate`]: raw model text in, tagged outcome out.
pub fn process_generation_response(
    content: &str,
    pattern: &AnalyzedPattern,
    period: Period,
) -> GenerationOutcome {
    let value = match parse_json_object(content) {
        Ok(value) => value,
        Err(err) => return GenerationOutcome::ParseFailed(err),
    };
    let mut menu: Menu = match serde_json::from_value(value) {
        Ok(menu) => menu,
        Err(err) => return GenerationOutcome::ParseFailed(ParseError::Json(err)),
    };

    menu.normalize_day_names();
    let reported = menu.total_cost;
    let computed = menu.recompute_total_cost();
    if (reported - computed).abs() > 0.01 {
        debug!(reported, computed, "model-reported total replaced by ingredient sum");
    }

    match validate_menu(&menu, pattern, period) {
        Ok(()) => GenerationOutcome::Ok(menu),
        Err(err) => GenerationOutcome::ValidationFailed(err),
    }
}

pub async fn generate(router: &FallbackRouter, pattern: &AnalyzedPattern, period: Period) -> Result<Menu> {
    if pattern.meal_types.is_empty() {
        return Err(ValidationError::EmptyPattern.into());
    }

    info!(%period, days = period.days(), "generating menu");
    let content = router
        .call_llm(&build_generation_prompt(pattern, period), GENERATION_SYSTEM_PROMPT)
        .await?;
    debug!(raw = %content, "raw generation response");

    match process_generation_response(&content, pattern, period) {
        GenerationOutcome::Ok(menu) => {
            info!(days = menu.days.len(), total_cost = menu.total_cost, "menu generated");
            Ok(menu)
        }
        rejected => rejected
            .into_result()
            .inspect_err(|err| warn!(error = %err, "generated menu rejected")),
    }
}
