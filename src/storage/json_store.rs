use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use super::{
    GenerationRecords, IngredientPriceRecord, MealPatternRecord, MenuRecord, MenuStore, PriceRow,
    ShoppingListRecord, StorageError,
};
use crate::menu::{Menu, Period};
use crate::pattern::AnalyzedPattern;
use crate::shopping_list::ShoppingList;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreData {
    #[serde(default)]
    meal_patterns: Vec<MealPatternRecord>,
    #[serde(default)]
    menus: Vec<MenuRecord>,
    #[serde(default)]
    shopping_lists: Vec<ShoppingListRecord>,
    #[serde(default)]
    ingredients: Vec<IngredientPriceRecord>,
}

impl StoreData {
    fn insert_pattern(&mut self, content: &str, pattern: &AnalyzedPattern) -> MealPatternRecord {
        let record = MealPatternRecord {
            id: Uuid::new_v4(),
            content: content.to_string(),
            analyzed_content: pattern.clone(),
            created_at: Utc::now(),
        };
        self.meal_patterns.push(record.clone());
        record
    }

    fn insert_menu(&mut self, pattern_id: Uuid, menu: &Menu, period: Period) -> Result<MenuRecord, StorageError> {
        if !self.meal_patterns.iter().any(|p| p.id == pattern_id) {
            return Err(StorageError::UnknownPattern(pattern_id));
        }
        let record = MenuRecord {
            id: Uuid::new_v4(),
            pattern_id,
            content: menu.clone(),
            period,
            total_cost: menu.total_cost,
            created_at: Utc::now(),
            updated_at: None,
        };
        self.menus.push(record.clone());
        Ok(record)
    }

    fn insert_shopping_list(&mut self, menu_id: Uuid, list: &ShoppingList) -> Result<ShoppingListRecord, StorageError> {
        if !self.menus.iter().any(|m| m.id == menu_id) {
            return Err(StorageError::UnknownMenu(menu_id));
        }
        let record = ShoppingListRecord {
            id: Uuid::new_v4(),
            menu_id,
            content: list.clone(),
            total_cost: list.total_cost,
            created_at: Utc::now(),
        };
        self.shopping_lists.push(record.clone());
        Ok(record)
    }

    fn update_menu(&mut self, id: Uuid, menu: &Menu) -> Result<MenuRecord, StorageError> {
        let record = self
            .menus
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or(StorageError::UnknownMenu(id))?;
        record.content = menu.clone();
        record.total_cost = menu.total_cost;
        record.updated_at = Some(Utc::now());
        Ok(record.clone())
    }
}

/// A [`MenuStore`] kept in memory and mirrored to a single JSON document.
///
/// Every write works on a copy of the data, persists it (temp file, then
/// rename) and only then replaces the in-memory state, so a failed write
/// leaves both untouched.
pub struct JsonFileStore {
    path: Option<PathBuf>,
    data: Mutex<StoreData>,
}

impl JsonFileStore {
    /// Opens the store at `path`, starting empty if the file does not exist yet.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let data = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => StoreData::default(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoreData::default(),
            Err(e) => return Err(e.into()),
        };
        info!(
            path = %path.display(),
            patterns = data.meal_patterns.len(),
            menus = data.menus.len(),
            "store opened"
        );
        Ok(Self { path: Some(path), data: Mutex::new(data) })
    }

    /// A store that never touches the disk.
    pub fn in_memory() -> Self {
        Self { path: None, data: Mutex::new(StoreData::default()) }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    async fn mutate<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        T: Send,
        F: FnOnce(&mut StoreData) -> Result<T, StorageError> + Send,
    {
        let mut guard = self.data.lock().await;
        let mut next = guard.clone();
        let out = f(&mut next)?;
        self.persist(&next).await?;
        *guard = next;
        Ok(out)
    }

    async fn persist(&self, data: &StoreData) -> Result<(), StorageError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec_pretty(data)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        debug!(path = %path.display(), bytes = bytes.len(), "store written");
        Ok(())
    }
}

#[async_trait]
impl MenuStore for JsonFileStore {
    async fn save_pattern(&self, content: &str, pattern: &AnalyzedPattern) -> Result<MealPatternRecord, StorageError> {
        self.mutate(|data| Ok(data.insert_pattern(content, pattern))).await
    }

    async fn save_menu(&self, pattern_id: Uuid, menu: &Menu, period: Period) -> Result<MenuRecord, StorageError> {
        self.mutate(|data| data.insert_menu(pattern_id, menu, period)).await
    }

    async fn save_shopping_list(&self, menu_id: Uuid, list: &ShoppingList) -> Result<ShoppingListRecord, StorageError> {
        self.mutate(|data| data.insert_shopping_list(menu_id, list)).await
    }

    async fn save_generation(
        &self,
        content: &str,
        pattern: &AnalyzedPattern,
        menu: &Menu,
        period: Period,
        list: &ShoppingList,
    ) -> Result<GenerationRecords, StorageError> {
        self.mutate(|data| {
            let pattern = data.insert_pattern(content, pattern);
            let menu = data.insert_menu(pattern.id, menu, period)?;
            let shopping_list = data.insert_shopping_list(menu.id, list)?;
            Ok(GenerationRecords { pattern, menu, shopping_list })
        })
        .await
    }

    async fn get_pattern(&self, id: Uuid) -> Result<Option<MealPatternRecord>, StorageError> {
        let data = self.data.lock().await;
        Ok(data.meal_patterns.iter().find(|p| p.id == id).cloned())
    }

    async fn get_menu(&self, id: Uuid) -> Result<Option<MenuRecord>, StorageError> {
        let data = self.data.lock().await;
        Ok(data.menus.iter().find(|m| m.id == id).cloned())
    }

    async fn latest_shopping_list(&self, menu_id: Uuid) -> Result<Option<ShoppingListRecord>, StorageError> {
        let data = self.data.lock().await;
        Ok(data.shopping_lists.iter().rev().find(|l| l.menu_id == menu_id).cloned())
    }

    async fn update_menu(&self, id: Uuid, menu: &Menu) -> Result<MenuRecord, StorageError> {
        self.mutate(|data| data.update_menu(id, menu)).await
    }

    async fn save_regeneration(
        &self,
        menu_id: Uuid,
        menu: &Menu,
        list: &ShoppingList,
    ) -> Result<(MenuRecord, ShoppingListRecord), StorageError> {
        self.mutate(|data| {
            let menu = data.update_menu(menu_id, menu)?;
            let shopping_list = data.insert_shopping_list(menu_id, list)?;
            Ok((menu, shopping_list))
        })
        .await
    }

    async fn upsert_ingredients(&self, rows: &[PriceRow]) -> Result<usize, StorageError> {
        self.mutate(|data| {
            let now = Utc::now();
            for row in rows {
                let key = row.key();
                match data.ingredients.iter_mut().find(|r| r.name == key) {
                    Some(existing) => {
                        let updated = row.apply(Some(&*existing), now);
                        *existing = updated;
                    }
                    None => data.ingredients.push(row.apply(None, now)),
                }
            }
            Ok(rows.len())
        })
        .await
    }

    async fn list_ingredients(&self) -> Result<Vec<IngredientPriceRecord>, StorageError> {
        let data = self.data.lock().await;
        let mut records = data.ingredients.clone();
        records.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::menu::{Ingredient, MenuDay, MenuItem};
    use crate::pattern::MealType;
    use crate::shopping_list::aggregate;
    use pretty_assertions::assert_eq;

    fn pattern() -> AnalyzedPattern {
        AnalyzedPattern { meal_types: vec![MealType::named("Almoço")], ..AnalyzedPattern::default() }
    }

    fn menu() -> Menu {
        Menu {
            days: vec![MenuDay {
                day: "Segunda-feira".into(),
                meals: vec![MenuItem {
                    meal: "Almoço".into(),
                    description: "Arroz e feijão".into(),
                    ingredients: vec![Ingredient { name: "Arroz".into(), quantity: "100 g".into(), estimated_cost: 0.5 }],
                }],
            }],
            total_cost: 0.5,
        }
    }

    #[tokio::test]
    async fn menu_requires_known_pattern() {
        let store = JsonFileStore::in_memory();
        let missing = Uuid::new_v4();
        let err = store.save_menu(missing, &menu(), Period::Weekly).await.unwrap_err();
        assert!(matches!(err, StorageError::UnknownPattern(id) if id == missing));

        let err = store.save_shopping_list(missing, &aggregate(&menu())).await.unwrap_err();
        assert!(matches!(err, StorageError::UnknownMenu(_)));
    }

    #[tokio::test]
    async fn records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.json");

        let saved = {
            let store = JsonFileStore::open(&path).await.unwrap();
            store
                .save_generation("Almoço: arroz", &pattern(), &menu(), Period::Weekly, &aggregate(&menu()))
                .await
                .unwrap()
        };
        assert!(!path.with_extension("json.tmp").exists());

        let reopened = JsonFileStore::open(&path).await.unwrap();
        let menu_record = reopened.get_menu(saved.menu.id).await.unwrap().unwrap();
        assert_eq!(menu_record, saved.menu);
        let pattern_record = reopened.get_pattern(saved.pattern.id).await.unwrap().unwrap();
        assert_eq!(pattern_record.analyzed_content.meal_names(), vec!["Almoço"]);
        let list = reopened.latest_shopping_list(saved.menu.id).await.unwrap().unwrap();
        assert_eq!(list.total_cost, 0.5);
    }

    #[tokio::test]
    async fn update_menu_replaces_content() {
        let store = JsonFileStore::in_memory();
        let saved = store
            .save_generation("plano", &pattern(), &menu(), Period::Weekly, &aggregate(&menu()))
            .await
            .unwrap();
        let mut changed = menu();
        changed.days[0].meals[0].ingredients[0].estimated_cost = 2.0;
        changed.recompute_total_cost();

        let updated = store.update_menu(saved.menu.id, &changed).await.unwrap();
        assert_eq!(updated.total_cost, 2.0);
        assert!(updated.updated_at.is_some());
        assert!(store.update_menu(Uuid::new_v4(), &changed).await.is_err());
    }

    #[tokio::test]
    async fn regeneration_writes_menu_and_list_together() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let store = JsonFileStore::open(&path).await.unwrap();
        let saved = store
            .save_generation("plano", &pattern(), &menu(), Period::Weekly, &aggregate(&menu()))
            .await
            .unwrap();
        let mut changed = menu();
        changed.days[0].meals[0].ingredients[0].estimated_cost = 3.0;
        changed.recompute_total_cost();

        let (menu_record, list_record) = store
            .save_regeneration(saved.menu.id, &changed, &aggregate(&changed))
            .await
            .unwrap();
        assert_eq!(menu_record.total_cost, 3.0);
        assert_eq!(list_record.menu_id, saved.menu.id);

        let before = std::fs::read(&path).unwrap();
        let missing = Uuid::new_v4();
        let err = store.save_regeneration(missing, &changed, &aggregate(&changed)).await.unwrap_err();
        assert!(matches!(err, StorageError::UnknownMenu(id) if id == missing));
        assert_eq!(std::fs::read(&path).unwrap(), before);

        let reopened = JsonFileStore::open(&path).await.unwrap();
        assert_eq!(reopened.get_menu(saved.menu.id).await.unwrap().unwrap().total_cost, 3.0);
        let latest = reopened.latest_shopping_list(saved.menu.id).await.unwrap().unwrap();
        assert_eq!(latest.id, list_record.id);
        assert_eq!(latest.total_cost, 3.0);
    }

    #[tokio::test]
    async fn ingredients_upsert_by_lowercase_name() {
        let store = JsonFileStore::in_memory();
        let rows = vec![
            PriceRow { name: "Arroz".into(), price: 5.5, unit: "kg".into() },
            PriceRow { name: "Ovo".into(), price: 0.8, unit: "unidade".into() },
        ];
        assert_eq!(store.upsert_ingredients(&rows).await.unwrap(), 2);
        store
            .upsert_ingredients(&[PriceRow { name: " ARROZ ".into(), price: 6.0, unit: "Kg".into() }])
            .await
            .unwrap();

        let records = store.list_ingredients().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "arroz");
        assert_eq!(records[0].price_per_kg, Some(6.0));
        assert_eq!(records[1].price_per_unit, Some(0.8));
    }
}
