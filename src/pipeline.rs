//! End-to-end orchestration: plan text in, stored menu and shopping list out.
//!
//! Stages run strictly one after another. Nothing is written to the store
//! until every stage has succeeded.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::api_connection::FallbackRouter;
use crate::error::{PipelineError, Result};
use crate::meal_regenerator::{regenerate_meal, PatternSource};
use crate::menu::{Menu, MenuItem, Period};
use crate::pattern::AnalyzedPattern;
use crate::shopping_list::{aggregate, ShoppingList};
use crate::storage::{
    load_price_rows, GenerationRecords, MenuRecord, MenuStore, ShoppingListRecord, StorageError,
};
use crate::{menu_generator, pattern_analyzer, text_extractor};

pub type ProgressFn = Arc<dyn Fn(String) + Send + Sync>;

#[derive(Debug, Clone)]
pub enum PlanSource {
    Pdf(PathBuf),
    Text(String),
}

#[derive(Debug, Clone)]
pub struct MenuRequest {
    pub source: PlanSource,
    pub period: Period,
    /// When false the run stops after aggregation and writes nothing.
    pub persist: bool,
}

#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub pattern: AnalyzedPattern,
    pub menu: Menu,
    pub shopping_list: ShoppingList,
    pub records: Option<GenerationRecords>,
}

#[derive(Debug, Clone)]
pub struct RegenerationResult {
    pub menu: MenuRecord,
    pub replaced: MenuItem,
    pub shopping_list: ShoppingListRecord,
}

pub struct MenuPipeline {
    router: Arc<FallbackRouter>,
    store: Arc<dyn MenuStore>,
    progress: Option<ProgressFn>,
}

impl MenuPipeline {
    pub fn new(router: Arc<FallbackRouter>, store: Arc<dyn MenuStore>) -> Self {
        Self { router, store, progress: None }
    }

    pub fn with_progress(mut self, progress: impl Fn(String) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(progress));
        self
    }

    pub fn router(&self) -> &FallbackRouter {
        &self.router
    }

    pub fn store(&self) -> &Arc<dyn MenuStore> {
        &self.store
    }

    fn report(&self, message: impl Into<String>) {
        let message = message.into();
        info!(stage = %message, "pipeline progress");
        if let Some(progress) = &self.progress {
            progress(message);
        }
    }

    pub async fn extract(&self, source: &PlanSource) -> Result<String> {
        let text = match source {
            PlanSource::Pdf(path) => {
                self.report(format!("Lendo {}", path.display()));
                let path = path.clone();
                tokio::task::spawn_blocking(move || text_extractor::extract_text(&path))
                    .await
                    .map_err(|e| PipelineError::input(format!("PDF extraction task failed: {e}")))??
            }
            PlanSource::Text(text) => text.clone(),
        };
        if text.trim().is_empty() {
            return Err(PipelineError::input("plan text is empty"));
        }
        Ok(text)
    }

    pub async fn analyze(&self, source: &PlanSource) -> Result<(String, AnalyzedPattern)> {
        let text = self.extract(source).await?;
        self.report("Analisando o plano nutricional");
        let pattern = pattern_analyzer::analyze(&self.router, &text).await?;
        Ok((text, pattern))
    }

    pub async fn run(&self, request: MenuRequest) -> Result<PipelineResult> {
        let (text, pattern) = self.analyze(&request.source).await?;

        self.report(format!("Gerando cardápio de {} dias", request.period.days()));
        let menu = menu_generator::generate(&self.router, &pattern, request.period).await?;

        self.report("Montando a lista de compras");
        let shopping_list = aggregate(&menu);

        let records = if request.persist {
            self.report("Salvando");
            let records = self
                .store
                .save_generation(&text, &pattern, &menu, request.period, &shopping_list)
                .await?;
            info!(menu_id = %records.menu.id, pattern_id = %records.pattern.id, "generation stored");
            Some(records)
        } else {
            None
        };

        self.report("Concluído");
        Ok(PipelineResult { pattern, menu, shopping_list, records })
    }

    /// Replaces one meal of a stored menu and stores the updated menu together
    /// with a fresh shopping list.
    pub async fn regenerate(&self, menu_id: Uuid, day_index: usize, meal_index: usize) -> Result<RegenerationResult> {
        let record = self.load_menu(menu_id).await?;
        let pattern = self
            .store
            .get_pattern(record.pattern_id)
            .await?
            .ok_or(StorageError::UnknownPattern(record.pattern_id))?;

        let meal_name = record
            .content
            .days
            .get(day_index)
            .and_then(|day| day.meals.get(meal_index))
            .map(|meal| meal.meal.clone())
            .ok_or_else(|| {
                PipelineError::input(format!("no meal at day {day_index}, position {meal_index}"))
            })?;

        self.report(format!("Gerando nova opção para {meal_name}"));
        let mut menu = record.content;
        let previous = menu.meal_options(&meal_name);
        let source = PatternSource::Pattern(pattern.analyzed_content);
        let item = regenerate_meal(&self.router, &source, &meal_name, &previous).await?;
        let replaced = menu.replace_meal(day_index, meal_index, item)?;

        let list = aggregate(&menu);
        let (menu_record, shopping_list) = self.store.save_regeneration(menu_id, &menu, &list).await?;
        info!(%menu_id, meal = %meal_name, total_cost = menu.total_cost, "meal regenerated");
        Ok(RegenerationResult { menu: menu_record, replaced, shopping_list })
    }

    /// Shopping list for a stored menu, derived from its current content.
    pub async fn shopping_list(&self, menu_id: Uuid) -> Result<ShoppingList> {
        let record = self.load_menu(menu_id).await?;
        Ok(aggregate(&record.content))
    }

    pub async fn import_prices(&self, csv_path: &Path) -> Result<usize> {
        let path = csv_path.to_path_buf();
        let rows = tokio::task::spawn_blocking(move || load_price_rows(&path))
            .await
            .map_err(|e| PipelineError::input(format!("price import task failed: {e}")))?
            .map_err(|e| PipelineError::input(format!("{e:#}")))?;
        let written = self.store.upsert_ingredients(&rows).await?;
        info!(rows = written, path = %csv_path.display(), "prices imported");
        Ok(written)
    }

    async fn load_menu(&self, menu_id: Uuid) -> Result<MenuRecord> {
        self.store
            .get_menu(menu_id)
            .await?
            .ok_or_else(|| PipelineError::input(format!("menu {menu_id} not found")))
    }
}
