//! Persistence of patterns, menus, shopping lists and the ingredient price table.

pub mod json_store;
pub mod price_table;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::menu::{Menu, Period};
use crate::pattern::AnalyzedPattern;
use crate::shopping_list::ShoppingList;

pub use json_store::JsonFileStore;
pub use price_table::{load_price_rows, PriceRow};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization failure: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("unknown meal pattern {0}")]
    UnknownPattern(Uuid),

    #[error("unknown menu {0}")]
    UnknownMenu(Uuid),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealPatternRecord {
    pub id: Uuid,
    /// Plan text the pattern was extracted from.
    pub content: String,
    pub analyzed_content: AnalyzedPattern,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuRecord {
    pub id: Uuid,
    pub pattern_id: Uuid,
    pub content: Menu,
    pub period: Period,
    pub total_cost: f64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShoppingListRecord {
    pub id: Uuid,
    pub menu_id: Uuid,
    pub content: ShoppingList,
    pub total_cost: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngredientPriceRecord {
    pub id: Uuid,
    /// Lowercased and trimmed; unique across the table.
    pub name: String,
    pub price_per_kg: Option<f64>,
    pub price_per_unit: Option<f64>,
    pub measurement_unit: String,
    pub last_update: DateTime<Utc>,
}

/// Everything one successful pipeline run writes.
#[derive(Debug, Clone)]
pub struct GenerationRecords {
    pub pattern: MealPatternRecord,
    pub menu: MenuRecord,
    pub shopping_list: ShoppingListRecord,
}

#[async_trait]
pub trait MenuStore: Send + Sync {
    async fn save_pattern(
        &self,
        content: &str,
        pattern: &AnalyzedPattern,
    ) -> Result<MealPatternRecord, StorageError>;

    /// Fails with [`StorageError::UnknownPattern`] when `pattern_id` is not stored.
    async fn save_menu(&self, pattern_id: Uuid, menu: &Menu, period: Period) -> Result<MenuRecord, StorageError>;

    /// Fails with [`StorageError::UnknownMenu`] when `menu_id` is not stored.
    async fn save_shopping_list(
        &self,
        menu_id: Uuid,
        list: &ShoppingList,
    ) -> Result<ShoppingListRecord, StorageError>;

    /// Writes pattern, menu and shopping list together, or nothing at all.
    async fn save_generation(
        &self,
        content: &str,
        pattern: &AnalyzedPattern,
        menu: &Menu,
        period: Period,
        list: &ShoppingList,
    ) -> Result<GenerationRecords, StorageError>;

    async fn get_pattern(&self, id: Uuid) -> Result<Option<MealPatternRecord>, StorageError>;

    async fn get_menu(&self, id: Uuid) -> Result<Option<MenuRecord>, StorageError>;

    /// Most recent shopping list saved for a menu.
    async fn latest_shopping_list(&self, menu_id: Uuid) -> Result<Option<ShoppingListRecord>, StorageError>;

    async fn update_menu(&self, id: Uuid, menu: &Menu) -> Result<MenuRecord, StorageError>;

    /// Replaces a menu's content and stores its new shopping list together,
    /// or writes nothing.
    async fn save_regeneration(
        &self,
        menu_id: Uuid,
        menu: &Menu,
        list: &ShoppingList,
    ) -> Result<(MenuRecord, ShoppingListRecord), StorageError>;

    /// Returns the number of rows written.
    async fn upsert_ingredients(&self, rows: &[PriceRow]) -> Result<usize, StorageError>;

    async fn list_ingredients(&self) -> Result<Vec<IngredientPriceRecord>, StorageError>;
}
