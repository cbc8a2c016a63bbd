//! The structured description of a nutrition plan.
//!
//! Model output is untyped, so [`AnalyzedPattern`] is built through
//! `TryFrom<serde_json::Value>`: lists may arrive as a single string, meal
//! types as an object or as a bare list of names. Anything that cannot be
//! coerced without guessing is rejected with [`ParseError::Shape`].

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::ParseError;
use crate::response_parser::json_kind;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MealType {
    /// Key under `meal_types`; serialized as the map key, not as a field.
    #[serde(skip)]
    pub name: String,
    pub allowed_foods: Vec<String>,
    pub portions: Vec<String>,
    pub restrictions: Vec<String>,
}

impl MealType {
    pub fn named(name: &str) -> Self {
        Self { name: name.to_string(), ..Self::default() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(try_from = "Value")]
pub struct AnalyzedPattern {
    /// In the order the model listed them.
    pub meal_types: Vec<MealType>,
    pub dietary_restrictions: Vec<String>,
    pub allowed_proteins: Vec<String>,
    pub allowed_carbs: Vec<String>,
    pub allowed_vegetables: Vec<String>,
    pub allowed_fruits: Vec<String>,
    pub allowed_dairy: Vec<String>,
    /// Meal name to time-of-day.
    pub timing: Vec<(String, String)>,
    /// Keys we do not model, kept so they still reach the generation prompt.
    pub extra: Map<String, Value>,
}

impl AnalyzedPattern {
    pub fn meal_names(&self) -> Vec<&str> {
        self.meal_types.iter().map(|m| m.name.as_str()).collect()
    }

    pub fn meal(&self, name: &str) -> Option<&MealType> {
        let name = name.trim();
        self.meal_types.iter().find(|m| m.name.trim() == name)
    }

    pub fn has_meal(&self, name: &str) -> bool {
        self.meal(name).is_some()
    }

    /// Pretty JSON used when embedding the pattern into prompts.
    pub fn to_prompt_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}

struct MealTypes<'a>(&'a [MealType]);

impl Serialize for MealTypes<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for meal in self.0 {
            map.serialize_entry(&meal.name, meal)?;
        }
        map.end()
    }
}

struct Pairs<'a>(&'a [(String, String)]);

impl Serialize for Pairs<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl Serialize for AnalyzedPattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("meal_types", &MealTypes(&self.meal_types))?;
        map.serialize_entry("dietary_restrictions", &self.dietary_restrictions)?;
        map.serialize_entry("allowed_proteins", &self.allowed_proteins)?;
        map.serialize_entry("allowed_carbs", &self.allowed_carbs)?;
        map.serialize_entry("allowed_vegetables", &self.allowed_vegetables)?;
        map.serialize_entry("allowed_fruits", &self.allowed_fruits)?;
        map.serialize_entry("allowed_dairy", &self.allowed_dairy)?;
        map.serialize_entry("timing", &Pairs(&self.timing))?;
        for (key, value) in &self.extra {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl TryFrom<Value> for AnalyzedPattern {
    type Error = ParseError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let mut obj = match value {
            Value::Object(obj) => obj,
            other => {
                return Err(ParseError::Shape(format!(
                    "pattern must be a JSON object, got {}",
                    json_kind(&other)
                )))
            }
        };

        let meal_types = match obj.remove("meal_types") {
            Some(v) => meal_types_from_value(v)?,
            None => Vec::new(),
        };
        let mut list = |key: &str| -> Result<Vec<String>, ParseError> {
            match obj.remove(key) {
                Some(v) => string_list(key, v),
                None => Ok(Vec::new()),
            }
        };
        let dietary_restrictions = list("dietary_restrictions")?;
        let allowed_proteins = list("allowed_proteins")?;
        let allowed_carbs = list("allowed_carbs")?;
        let allowed_vegetables = list("allowed_vegetables")?;
        let allowed_fruits = list("allowed_fruits")?;
        let allowed_dairy = list("allowed_dairy")?;

        let timing = match obj.remove("timing") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Object(entries)) => entries
                .into_iter()
                .map(|(meal, time)| scalar_to_string("timing", time).map(|t| (meal, t)))
                .collect::<Result<Vec<_>, _>>()?,
            Some(other) => {
                return Err(ParseError::Shape(format!(
                    "timing must be an object, got {}",
                    json_kind(&other)
                )))
            }
        };

        Ok(Self {
            meal_types,
            dietary_restrictions,
            allowed_proteins,
            allowed_carbs,
            allowed_vegetables,
            allowed_fruits,
            allowed_dairy,
            timing,
            extra: obj,
        })
    }
}

fn meal_types_from_value(value: Value) -> Result<Vec<MealType>, ParseError> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Object(entries) => entries
            .into_iter()
            .map(|(name, body)| meal_type_from_body(name, body))
            .collect(),
        // A bare list: either names, or objects carrying their own name.
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::String(name) => Ok(MealType::named(&name)),
                Value::Object(mut fields) => {
                    let name = fields
                        .remove("name")
                        .or_else(|| fields.remove("meal"))
                        .map(|n| scalar_to_string("meal_types.name", n))
                        .transpose()?
                        .ok_or_else(|| ParseError::Shape("meal type entry without a name".to_string()))?;
                    meal_type_from_body(name, Value::Object(fields))
                }
                other => Err(ParseError::Shape(format!(
                    "meal_types entries must be strings or objects, got {}",
                    json_kind(&other)
                ))),
            })
            .collect(),
        other => Err(ParseError::Shape(format!(
            "meal_types must be an object, got {}",
            json_kind(&other)
        ))),
    }
}

fn meal_type_from_body(name: String, body: Value) -> Result<MealType, ParseError> {
    let name = name.trim().to_string();
    if name.is_empty() {
        return Err(ParseError::Shape("meal type with an empty name".to_string()));
    }
    match body {
        Value::Object(mut fields) => {
            let mut list = |key: &str| -> Result<Vec<String>, ParseError> {
                match fields.remove(key) {
                    Some(v) => string_list(key, v),
                    None => Ok(Vec::new()),
                }
            };
            Ok(MealType {
                allowed_foods: list("allowed_foods")?,
                portions: list("portions")?,
                restrictions: list("restrictions")?,
                name,
            })
        }
        Value::Null => Ok(MealType { name, ..MealType::default() }),
        other => Ok(MealType {
            allowed_foods: string_list("allowed_foods", other)?,
            name,
            ..MealType::default()
        }),
    }
}

fn string_list(field: &str, value: Value) -> Result<Vec<String>, ParseError> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items
            .into_iter()
            .filter(|item| !item.is_null())
            .map(|item| scalar_to_string(field, item))
            .filter(|item| item.as_ref().map_or(true, |s| !s.is_empty()))
            .collect(),
        Value::Object(_) => Err(ParseError::Shape(format!("{field} must be a list, got object"))),
        scalar => {
            let s = scalar_to_string(field, scalar)?;
            Ok(if s.is_empty() { Vec::new() } else { vec![s] })
        }
    }
}

fn scalar_to_string(field: &str, value: Value) -> Result<String, ParseError> {
    match value {
        Value::String(s) => Ok(s.trim().to_string()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(ParseError::Shape(format!(
            "{field} entries must be text, got {}",
            json_kind(&other)
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "meal_types": {
                "Café da manhã": {
                    "allowed_foods": ["pão francês", "ovo"],
                    "portions": ["1 unidade", "2 unidades"],
                    "restrictions": []
                },
                "Almoço": {
                    "allowed_foods": ["arroz branco", "feijão", "frango"],
                    "portions": ["100 g", "80 g", "120 g"]
                }
            },
            "dietary_restrictions": [],
            "allowed_proteins": ["frango", "ovo"],
            "timing": {"Café da manhã": "07:00", "Almoço": "12:30"},
            "observacoes": "beber 2 L de água"
        })
    }

    #[test]
    fn parses_full_pattern_and_keeps_meal_order() {
        let pattern = AnalyzedPattern::try_from(sample()).unwrap();
        assert_eq!(pattern.meal_names(), vec!["Café da manhã", "Almoço"]);
        assert_eq!(pattern.meal("Almoço").unwrap().allowed_foods.len(), 3);
        assert!(pattern.meal("Almoço").unwrap().restrictions.is_empty());
        assert_eq!(pattern.timing[1], ("Almoço".to_string(), "12:30".to_string()));
        assert_eq!(pattern.extra.get("observacoes"), Some(&json!("beber 2 L de água")));
        assert!(pattern.allowed_dairy.is_empty());
    }

    #[test]
    fn serialization_round_trips_through_value() {
        let pattern = AnalyzedPattern::try_from(sample()).unwrap();
        let value = serde_json::to_value(&pattern).unwrap();
        assert_eq!(value["meal_types"]["Almoço"]["portions"], json!(["100 g", "80 g", "120 g"]));
        let again: AnalyzedPattern = serde_json::from_value(value).unwrap();
        assert_eq!(again, pattern);
    }

    #[test]
    fn lenient_shapes_are_coerced() {
        let pattern = AnalyzedPattern::try_from(json!({
            "meal_types": ["Lanche", {"name": "Jantar", "allowed_foods": "sopa"}],
            "dietary_restrictions": "sem glúten",
            "timing": {"Lanche": 16}
        }))
        .unwrap();
        assert_eq!(pattern.meal_names(), vec!["Lanche", "Jantar"]);
        assert_eq!(pattern.meal("Jantar").unwrap().allowed_foods, vec!["sopa"]);
        assert_eq!(pattern.dietary_restrictions, vec!["sem glúten"]);
        assert_eq!(pattern.timing, vec![("Lanche".to_string(), "16".to_string())]);
    }

    #[test]
    fn rejects_shapes_that_need_guessing() {
        assert!(AnalyzedPattern::try_from(json!(["a"])).is_err());
        assert!(AnalyzedPattern::try_from(json!({"meal_types": 3})).is_err());
        assert!(AnalyzedPattern::try_from(json!({"allowed_fruits": {"a": 1}})).is_err());
        assert!(AnalyzedPattern::try_from(json!({"meal_types": {" ": {}}})).is_err());
    }
}
