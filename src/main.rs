use anyhow::{Context, Result};
use menu_planner::cli::{parse_args, Command};
use menu_planner::config::{AppConfig, EnvSecretStore};
use menu_planner::pipeline::{MenuPipeline, MenuRequest};
use menu_planner::storage::JsonFileStore;
use menu_planner::PipelineError;
use serde_json::json;
use std::sync::Arc;
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Logs the short user-facing message and keeps the full error for the exit report.
fn report(err: PipelineError) -> anyhow::Error {
    eprintln!("{}", err.user_message());
    anyhow::Error::new(err)
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).context("Failed to render output")?);
    Ok(())
}

async fn run(command: Command, pipeline: &MenuPipeline) -> Result<()> {
    match command {
        Command::Analyze(plan) => {
            let source = plan.into_source().await?;
            let (_, pattern) = pipeline.analyze(&source).await.map_err(report)?;
            print_json(&pattern)
        }
        Command::Generate { plan, period, no_save } => {
            let source = plan.into_source().await?;
            let result = pipeline
                .run(MenuRequest { source, period, persist: !no_save })
                .await
                .map_err(report)?;
            print_json(&json!({
                "menuId": result.records.as_ref().map(|r| r.menu.id),
                "menu": result.menu,
                "shoppingList": result.shopping_list,
            }))
        }
        Command::Regenerate { menu_id, day, meal } => {
            let result = pipeline.regenerate(menu_id, day, meal).await.map_err(report)?;
            print_json(&json!({
                "menu": result.menu.content,
                "replaced": result.replaced,
                "shoppingList": result.shopping_list.content,
            }))
        }
        Command::ShoppingList { menu_id } => {
            let list = pipeline.shopping_list(menu_id).await.map_err(report)?;
            print_json(&list)
        }
        Command::ImportPrices { csv } => {
            let written = pipeline.import_prices(&csv).await.map_err(report)?;
            println!("{written} prices imported");
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("menu_planner=info")))
        .init();

    let cli = parse_args();
    let mut config = AppConfig::from_env().context("Invalid configuration")?;
    if let Some(store) = cli.store {
        config.store_path = store;
    }

    let router = config.build_router(Arc::new(EnvSecretStore)).map_err(report)?;
    let store = JsonFileStore::open(&config.store_path)
        .await
        .with_context(|| format!("Failed to open store at {}", config.store_path.display()))?;
    let pipeline = MenuPipeline::new(Arc::new(router), Arc::new(store)).with_progress(|message| eprintln!("{message}"));

    tokio::select! {
        result = run(cli.command, &pipeline) => result,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, nothing from this run was saved");
            Err(anyhow::anyhow!("interrupted"))
        }
    }
}
