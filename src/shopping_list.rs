//! Shopping list derived from a menu.
//!
//! Ingredients are merged by normalized name (trimmed, whitespace collapsed,
//! lowercased). Quantities are summed only when both parse as
//! `<number> <unit>` with the same unit; otherwise the first-seen quantity
//! stands. Costs are always summed.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::menu::{round_cents, Ingredient, Menu, MenuDay, MenuItem};

static QUANTITY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(\d+(?:[.,]\d+)?)(?:\s*([^\d\s/.,].*?))?\s*$").expect("quantity regex is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "Hortifruti")]
    Produce,
    #[serde(rename = "Carnes e Ovos")]
    MeatAndEggs,
    #[serde(rename = "Laticínios")]
    Dairy,
    #[serde(rename = "Mercearia")]
    Grocery,
    #[serde(rename = "Outros")]
    Other,
}

impl Category {
    /// Display and matching order; `Other` catches everything else.
    pub const ALL: [Category; 5] = [
        Category::Produce,
        Category::MeatAndEggs,
        Category::Dairy,
        Category::Grocery,
        Category::Other,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Category::Produce => "Hortifruti",
            Category::MeatAndEggs => "Carnes e Ovos",
            Category::Dairy => "Laticínios",
            Category::Grocery => "Mercearia",
            Category::Other => "Outros",
        }
    }

    fn keywords(self) -> &'static [&'static str] {
        match self {
            Category::Produce => &[
                "tomate", "cebola", "alho", "batata", "cenoura", "banana", "maçã", "laranja",
                "limão", "abacaxi", "melão", "melancia",
            ],
            Category::MeatAndEggs => &["frango", "carne", "peixe", "ovo", "filé"],
            Category::Dairy => &["leite", "queijo", "iogurte", "requeijão"],
            Category::Grocery => &[
                "arroz", "feijão", "macarrão", "pão", "farinha", "açúcar", "café", "azeite", "óleo",
            ],
            Category::Other => &[],
        }
    }

    pub fn for_ingredient(name: &str) -> Category {
        let lowered = name.to_lowercase();
        Category::ALL
            .into_iter()
            .find(|category| category.keywords().iter().any(|k| lowered.contains(k)))
            .unwrap_or(Category::Other)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShoppingItem {
    pub name: String,
    pub quantity: String,
    pub estimated_cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShoppingCategory {
    pub category: Category,
    pub items: Vec<ShoppingItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShoppingList {
    /// Always all five categories, in [`Category::ALL`] order.
    pub categories: Vec<ShoppingCategory>,
    pub total_cost: f64,
}

impl ShoppingList {
    pub fn items(&self) -> impl Iterator<Item = &ShoppingItem> {
        self.categories.iter().flat_map(|c| c.items.iter())
    }

    pub fn item_count(&self) -> usize {
        self.items().count()
    }

    pub fn get(&self, name: &str) -> Option<&ShoppingItem> {
        let key = name_key(name);
        self.items().find(|item| name_key(&item.name) == key)
    }

    pub fn category(&self, category: Category) -> &[ShoppingItem] {
        self.categories
            .iter()
            .find(|c| c.category == category)
            .map(|c| c.items.as_slice())
            .unwrap_or(&[])
    }

    /// The list as a one-day, one-meal menu, so it can be aggregated again.
    pub fn to_menu(&self) -> Menu {
        let ingredients = self
            .items()
            .map(|item| Ingredient {
                name: item.name.clone(),
                quantity: item.quantity.clone(),
                estimated_cost: item.estimated_cost,
            })
            .collect();
        Menu {
            days: vec![MenuDay {
                day: String::new(),
                meals: vec![MenuItem {
                    meal: "Lista de compras".to_string(),
                    description: String::new(),
                    ingredients,
                }],
            }],
            total_cost: self.total_cost,
        }
    }
}

pub fn aggregate(menu: &Menu) -> ShoppingList {
    let mut merged: Vec<ShoppingItem> = Vec::new();
    let mut index_by_key: HashMap<String, usize> = HashMap::new();

    for ingredient in menu.ingredients() {
        let key = name_key(&ingredient.name);
        if key.is_empty() {
            continue;
        }
        match index_by_key.get(&key) {
            Some(&index) => {
                let existing = &mut merged[index];
                if let Some(sum) = merge_quantities(&existing.quantity, &ingredient.quantity) {
                    existing.quantity = sum;
                }
                existing.estimated_cost += ingredient.estimated_cost;
            }
            None => {
                index_by_key.insert(key, merged.len());
                merged.push(ShoppingItem {
                    name: ingredient.name.trim().to_string(),
                    quantity: ingredient.quantity.trim().to_string(),
                    estimated_cost: ingredient.estimated_cost,
                });
            }
        }
    }

    let mut categories: Vec<ShoppingCategory> = Category::ALL
        .into_iter()
        .map(|category| ShoppingCategory { category, items: Vec::new() })
        .collect();
    let mut total = 0.0;
    for mut item in merged {
        item.estimated_cost = round_cents(item.estimated_cost);
        total += item.estimated_cost;
        let category = Category::for_ingredient(&item.name);
        if let Some(slot) = categories.iter_mut().find(|c| c.category == category) {
            slot.items.push(item);
        }
    }

    ShoppingList { categories, total_cost: round_cents(total) }
}

fn name_key(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// `(amount, unit)` for quantities like `"100 g"`, `"1,5kg"` or `"2"`.
pub fn parse_quantity(quantity: &str) -> Option<(f64, String)> {
    let caps = QUANTITY_RE.captures(quantity)?;
    let amount = caps.get(1)?.as_str().replace(',', ".").parse::<f64>().ok()?;
    let unit = caps.get(2).map(|m| m.as_str().trim().to_string()).unwrap_or_default();
    Some((amount, unit))
}

/// Summed quantity when both sides share a unit, `None` otherwise.
fn merge_quantities(first: &str, second: &str) -> Option<String> {
    let (a, unit_a) = parse_quantity(first)?;
    let (b, unit_b) = parse_quantity(second)?;
    if unit_a.to_lowercase() != unit_b.to_lowercase() {
        return None;
    }
    Some(format_quantity(a + b, &unit_a))
}

fn format_quantity(amount: f64, unit: &str) -> String {
    let number = if (amount - amount.round()).abs() < 1e-9 {
        format!("{}", amount.round() as i64)
    } else {
        let fixed = format!("{:.2}", amount);
        fixed.trim_end_matches('0').trim_end_matches('.').to_string()
    };
    if unit.is_empty() {
        number
    } else {
        format!("{number} {unit}")
    }
}
