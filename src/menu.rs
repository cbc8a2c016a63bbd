use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::PipelineError;

/// Canonical day labels, Monday first.
pub const WEEKDAYS: [&str; 7] = [
    "Segunda-feira",
    "Terça-feira",
    "Quarta-feira",
    "Quinta-feira",
    "Sexta-feira",
    "Sábado",
    "Domingo",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Weekly,
    Biweekly,
}

impl Period {
    pub fn days(self) -> usize {
        match self {
            Period::Weekly => 7,
            Period::Biweekly => 14,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Period::Weekly => "weekly",
            Period::Biweekly => "biweekly",
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "weekly" => Ok(Period::Weekly),
            "biweekly" => Ok(Period::Biweekly),
            other => Err(PipelineError::input(format!(
                "unknown period '{other}', expected 'weekly' or 'biweekly'"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ingredient {
    pub name: String,
    #[serde(default, deserialize_with = "deserialize_quantity")]
    pub quantity: String,
    #[serde(default, deserialize_with = "deserialize_cost")]
    pub estimated_cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuItem {
    #[serde(default)]
    pub meal: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub ingredients: Vec<Ingredient>,
}

impl MenuItem {
    pub fn cost(&self) -> f64 {
        round_cents(self.ingredients.iter().map(|i| i.estimated_cost).sum())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuDay {
    #[serde(default)]
    pub day: String,
    pub meals: Vec<MenuItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Menu {
    pub days: Vec<MenuDay>,
    /// Always the sum of every ingredient cost once the menu has been
    /// through [`Menu::recompute_total_cost`]; the model's own figure is discarded.
    #[serde(default, deserialize_with = "deserialize_cost")]
    pub total_cost: f64,
}

impl Menu {
    pub fn ingredients(&self) -> impl Iterator<Item = &Ingredient> {
        self.days
            .iter()
            .flat_map(|day| day.meals.iter())
            .flat_map(|meal| meal.ingredients.iter())
    }

    pub fn ingredient_cost_sum(&self) -> f64 {
        round_cents(self.ingredients().map(|i| i.estimated_cost).sum())
    }

    pub fn recompute_total_cost(&mut self) -> f64 {
        self.total_cost = self.ingredient_cost_sum();
        self.total_cost
    }

    /// Relabels `days[i]` as `WEEKDAYS[i % 7]` whatever the model wrote.
    pub fn normalize_day_names(&mut self) {
        for (index, day) in self.days.iter_mut().enumerate() {
            day.day = WEEKDAYS[index % WEEKDAYS.len()].to_string();
        }
    }

    /// Every option generated so far for a meal slot, across all days.
    pub fn meal_options(&self, meal_name: &str) -> Vec<MenuItem> {
        let meal_name = meal_name.trim();
        self.days
            .iter()
            .flat_map(|day| day.meals.iter())
            .filter(|meal| meal.meal.trim() == meal_name)
            .cloned()
            .collect()
    }

    /// Swaps one meal and recomputes the total. Returns the replaced item.
    pub fn replace_meal(
        &mut self,
        day_index: usize,
        meal_index: usize,
        item: MenuItem,
    ) -> Result<MenuItem, PipelineError> {
        let day_count = self.days.len();
        let day = self.days.get_mut(day_index).ok_or_else(|| {
            PipelineError::input(format!("day index {day_index} out of range (menu has {day_count} days)"))
        })?;
        let meal_count = day.meals.len();
        let day_label = day.day.clone();
        let slot = day.meals.get_mut(meal_index).ok_or_else(|| {
            PipelineError::input(format!(
                "meal index {meal_index} out of range ({day_label} has {meal_count} meals)"
            ))
        })?;
        let previous = std::mem::replace(slot, item);
        self.recompute_total_cost();
        Ok(previous)
    }
}

pub(crate) fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Accepts `4.5`, `"4,50"`, `"R$ 4.50"` and `"1.234,56"`.
pub(crate) fn parse_cost(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .trim_start_matches("R$")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    let normalized = if cleaned.contains(',') {
        cleaned.replace('.', "").replace(',', ".")
    } else {
        cleaned
    };
    normalized.parse::<f64>().ok().filter(|v| v.is_finite() && *v >= 0.0)
}

fn deserialize_cost<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    let value = Value::deserialize(deserializer)?;
    let cost = match &value {
        Value::Null => Some(0.0),
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite() && *v >= 0.0),
        Value::String(s) => parse_cost(s),
        _ => None,
    };
    cost.ok_or_else(|| de::Error::custom(format!("invalid cost value: {value}")))
}

fn deserialize_quantity<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(String::new()),
        Value::String(s) => Ok(s.trim().to_string()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(de::Error::custom(format!("invalid quantity value: {other}"))),
    }
}
