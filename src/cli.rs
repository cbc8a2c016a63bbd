use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use uuid::Uuid;

use crate::menu::Period;
use crate::pipeline::PlanSource;

#[derive(Parser, Debug)]
#[command(author, version, about = "Turns nutrition plans into menus and shopping lists", long_about = None)]
pub struct Cli {
    /// JSON store file (defaults to MENU_STORE_PATH, then menu_store.json)
    #[arg(long, global = true)]
    pub store: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Extract the meal pattern of a nutrition plan
    Analyze(PlanArgs),

    /// Generate a menu and its shopping list from a nutrition plan
    Generate {
        #[command(flatten)]
        plan: PlanArgs,

        /// weekly or biweekly
        #[arg(short, long, default_value = "weekly", value_parser = parse_period)]
        period: Period,

        /// Print the result without writing it to the store
        #[arg(long)]
        no_save: bool,
    },

    /// Replace one meal of a stored menu
    Regenerate {
        #[arg(long)]
        menu_id: Uuid,

        /// Day position, starting at 0
        #[arg(long)]
        day: usize,

        /// Meal position within the day, starting at 0
        #[arg(long)]
        meal: usize,
    },

    /// Print the shopping list of a stored menu
    ShoppingList {
        #[arg(long)]
        menu_id: Uuid,
    },

    /// Load ingredient prices from a name,price,unit CSV file
    ImportPrices {
        #[arg(long)]
        csv: PathBuf,
    },
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
pub struct PlanArgs {
    /// Nutrition plan as a PDF file
    #[arg(long)]
    pub pdf: Option<PathBuf>,

    /// Nutrition plan as a plain text file
    #[arg(long)]
    pub text: Option<PathBuf>,
}

impl PlanArgs {
    pub async fn into_source(self) -> anyhow::Result<PlanSource> {
        use anyhow::Context;
        match (self.pdf, self.text) {
            (Some(pdf), _) => Ok(PlanSource::Pdf(pdf)),
            (None, Some(text)) => {
                let content = tokio::fs::read_to_string(&text)
                    .await
                    .with_context(|| format!("Failed to read plan file '{}'", text.display()))?;
                Ok(PlanSource::Text(content))
            }
            (None, None) => Err(anyhow::anyhow!("either --pdf or --text is required")),
        }
    }
}

fn parse_period(raw: &str) -> Result<Period, String> {
    raw.parse::<Period>().map_err(|e| e.to_string())
}

pub fn parse_args() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_flags() {
        let cli = Cli::try_parse_from([
            "menu-planner", "--store", "/tmp/s.json", "generate", "--text", "plano.txt", "-p", "biweekly", "--no-save",
        ])
        .unwrap();
        assert_eq!(cli.store, Some(PathBuf::from("/tmp/s.json")));
        match cli.command {
            Command::Generate { plan, period, no_save } => {
                assert_eq!(plan.text, Some(PathBuf::from("plano.txt")));
                assert_eq!(period, Period::Biweekly);
                assert!(no_save);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn plan_source_is_required_and_exclusive() {
        assert!(Cli::try_parse_from(["menu-planner", "analyze"]).is_err());
        assert!(Cli::try_parse_from(["menu-planner", "analyze", "--pdf", "a.pdf", "--text", "a.txt"]).is_err());
        assert!(Cli::try_parse_from(["menu-planner", "generate", "--text", "a.txt", "--period", "monthly"]).is_err());
    }

    #[test]
    fn regenerate_takes_menu_id_and_positions() {
        let id = Uuid::new_v4();
        let cli = Cli::try_parse_from([
            "menu-planner", "regenerate", "--menu-id", &id.to_string(), "--day", "2", "--meal", "1",
        ])
        .unwrap();
        assert!(matches!(cli.command, Command::Regenerate { menu_id, day: 2, meal: 1 } if menu_id == id));
    }
}
