use serde_json::Value;
use tracing::{debug, info};

use crate::api_connection::FallbackRouter;
use crate::error::{ParseError, PipelineError, Result};
use crate::menu::MenuItem;
use crate::menu_generator::GENERATION_SYSTEM_PROMPT;
use crate::pattern::AnalyzedPattern;
use crate::response_parser::parse_json_object;

/// What the replacement meal must stay consistent with.
#[derive(Debug, Clone)]
pub enum PatternSource {
    Pattern(AnalyzedPattern),
    /// Raw plan text, when no analysis is at hand.
    PlanText(String),
}

pub fn build_regeneration_prompt(source: &PatternSource, meal_name: &str, previous: &[MenuItem]) -> String {
    let context = match source {
        PatternSource::Pattern(pattern) => {
            let rules = pattern
                .meal(meal_name)
                .map(|meal| serde_json::to_string_pretty(meal).unwrap_or_default())
                .unwrap_or_default();
            format!(
                "Padrão alimentar analisado:\n{}\n\nRegras da refeição \"{}\":\n{}",
                pattern.to_prompt_json(),
                meal_name,
                rules
            )
        }
        PatternSource::PlanText(text) => format!("Plano nutricional:\n{}", text.trim()),
    };

    let avoid = if previous.is_empty() {
        String::new()
    } else {
        let options = previous
            .iter()
            .map(|item| format!("- {}", item.description.trim()))
            .collect::<Vec<_>>()
            .join("\n");
        format!("\nOpções já geradas para esta refeição (gere uma DIFERENTE de todas):\n{options}\n")
    };

    format!(
        "{context}
{avoid}
Gere UMA nova opção para a refeição \"{meal_name}\", usando apenas alimentos e quantidades permitidos para ela, sem substituir por variantes.

Formato da resposta:
{{
  \"meal\": \"{meal_name}\",
  \"description\": \"Descrição da preparação\",
  \"ingredients\": [
    {{ \"name\": \"Nome do ingrediente\", \"quantity\": \"Quantidade com unidade\", \"estimatedCost\": 0.00 }}
  ]
}}"
    )
}

/// Parses one meal; accepts the item bare or wrapped in a single-key object.
pub fn parse_regeneration_response(content: &str, meal_name: &str) -> Result<MenuItem> {
    let value = parse_json_object(content)?;
    let item_value = if value.get("ingredients").is_some() {
        value
    } else {
        let mut wrapped = match value {
            Value::Object(obj) => obj.into_iter().map(|(_, v)| v).filter(|v| v.get("ingredients").is_some()),
            _ => return Err(ParseError::Shape("meal must be a JSON object".to_string()).into()),
        };
        match (wrapped.next(), wrapped.next()) {
            (Some(inner), None) => inner,
            _ => return Err(ParseError::Shape("response does not contain a single meal".to_string()).into()),
        }
    };

    let mut item: MenuItem = serde_json::from_value(item_value).map_err(ParseError::Json)?;
    item.meal = meal_name.to_string();
    Ok(item)
}

pub async fn regenerate_meal(
    router: &FallbackRouter,
    source: &PatternSource,
    meal_name: &str,
    previous: &[MenuItem],
) -> Result<MenuItem> {
    let meal_name = meal_name.trim();
    if meal_name.is_empty() {
        return Err(PipelineError::input("meal name is empty"));
    }
    match source {
        PatternSource::Pattern(pattern) if !pattern.meal_types.is_empty() && !pattern.has_meal(meal_name) => {
            return Err(PipelineError::input(format!("meal '{meal_name}' is not part of the pattern")));
        }
        PatternSource::PlanText(text) if text.trim().is_empty() => {
            return Err(PipelineError::input("plan text is empty"));
        }
        _ => {}
    }

    info!(meal = meal_name, previous = previous.len(), "regenerating meal");
    let content = router
        .call_llm(
            &build_regeneration_prompt(source, meal_name, previous),
            GENERATION_SYSTEM_PROMPT,
        )
        .await?;
    debug!(raw = %content, "raw regeneration response");

    parse_regeneration_response(&content, meal_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::MealType;

    fn previous() -> Vec<MenuItem> {
        vec![MenuItem {
            meal: "Jantar".into(),
            description: "Omelete com salada".into(),
            ingredients: vec![],
        }]
    }

    #[test]
    fn prompt_lists_previous_options() {
        let source = PatternSource::Pattern(AnalyzedPattern {
            meal_types: vec![MealType {
                allowed_foods: vec!["ovo".into(), "alface".into()],
                ..MealType::named("Jantar")
            }],
            ..AnalyzedPattern::default()
        });
        let prompt = build_regeneration_prompt(&source, "Jantar", &previous());
        assert!(prompt.contains("- Omelete com salada"));
        assert!(prompt.contains("\"meal\": \"Jantar\""));
        assert!(prompt.contains("\"alface\""));
    }

    #[test]
    fn prompt_from_plan_text() {
        let prompt = build_regeneration_prompt(&PatternSource::PlanText("Jantar: sopa".into()), "Jantar", &[]);
        assert!(prompt.starts_with("Plano nutricional:\nJantar: sopa"));
        assert!(!prompt.contains("DIFERENTE"));
    }

    #[test]
    fn bare_and_wrapped_items_parse() {
        let bare = r#"{"meal": "Outro nome", "description": "Sopa", "ingredients": [{"name": "Batata", "quantity": "200 g", "estimatedCost": 1.1}]}"#;
        let item = parse_regeneration_response(bare, "Jantar").unwrap();
        assert_eq!(item.meal, "Jantar");
        assert_eq!(item.ingredients[0].name, "Batata");

        let wrapped = r#"{"refeicao": {"description": "Sopa", "ingredients": []}}"#;
        assert_eq!(parse_regeneration_response(wrapped, "Jantar").unwrap().description, "Sopa");
    }

    #[test]
    fn items_without_meal_key_take_the_slot_name() {
        let bare = r#"{"description": "Caldo verde", "ingredients": [{"name": "Couve", "quantity": "50 g"}]}"#;
        let item = parse_regeneration_response(bare, "Jantar").unwrap();
        assert_eq!(item.meal, "Jantar");
        assert_eq!(item.ingredients[0].estimated_cost, 0.0);

        let wrapped = r#"{"refeicao": {"description": "Sopa", "ingredients": []}}"#;
        assert_eq!(parse_regeneration_response(wrapped, "Jantar").unwrap().meal, "Jantar");
    }

    #[test]
    fn ambiguous_response_is_rejected() {
        let raw = r#"{"a": {"ingredients": []}, "b": {"ingredients": []}}"#;
        assert!(matches!(
            parse_regeneration_response(raw, "Jantar"),
            Err(PipelineError::Parse(ParseError::Shape(_)))
        ));
    }
}
