use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use csv::ReaderBuilder;
use std::path::Path;
use tracing::warn;
use uuid::Uuid;

use super::IngredientPriceRecord;
use crate::menu::parse_cost;

const NAME_COL: &str = "name";
const PRICE_COL: &str = "price";
const UNIT_COL: &str = "unit";

/// One scraped or hand-entered price.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceRow {
    pub name: String,
    pub price: f64,
    pub unit: String,
}

impl PriceRow {
    pub fn key(&self) -> String {
        self.name.trim().to_lowercase()
    }

    fn is_per_kg(&self) -> bool {
        self.unit.to_lowercase().contains("kg")
    }

    /// Applies this row on top of the stored record for the same name, if any.
    /// Only the price column matching the unit is overwritten.
    pub fn apply(&self, existing: Option<&IngredientPriceRecord>, now: DateTime<Utc>) -> IngredientPriceRecord {
        let mut record = existing.cloned().unwrap_or_else(|| IngredientPriceRecord {
            id: Uuid::new_v4(),
            name: self.key(),
            price_per_kg: None,
            price_per_unit: None,
            measurement_unit: String::new(),
            last_update: now,
        });
        if self.is_per_kg() {
            record.price_per_kg = Some(self.price);
        } else {
            record.price_per_unit = Some(self.price);
        }
        record.measurement_unit = self.unit.trim().to_string();
        record.last_update = now;
        record
    }
}

/// Reads `name,price,unit` rows. Rows with an empty name or a price that
/// does not parse are skipped; a file without a single valid row is an error.
pub fn load_price_rows(csv_path: &Path) -> Result<Vec<PriceRow>> {
    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("Failed to open price CSV at {:?}", csv_path))?;
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let headers = rdr.headers()?.clone();
    let column = |wanted: &str| {
        headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case(wanted))
            .ok_or_else(|| anyhow::anyhow!("Column '{}' not found", wanted))
    };
    let name_idx = column(NAME_COL)?;
    let price_idx = column(PRICE_COL)?;
    let unit_idx = column(UNIT_COL)?;

    let mut rows = Vec::new();
    for (row_index, result) in rdr.records().enumerate() {
        let record = result.with_context(|| format!("Failed to read record at row index {}", row_index))?;

        let name = record.get(name_idx).unwrap_or_default().to_string();
        if name.is_empty() {
            warn!(row = row_index + 1, "skipping price row without a name");
            continue;
        }
        let raw_price = record.get(price_idx).unwrap_or_default();
        let Some(price) = parse_cost(raw_price) else {
            warn!(row = row_index + 1, name = %name, price = raw_price, "skipping price row with invalid price");
            continue;
        };
        let unit = record.get(unit_idx).unwrap_or_default().to_string();
        rows.push(PriceRow { name, price, unit });
    }

    if rows.is_empty() {
        return Err(anyhow::anyhow!("No valid price rows loaded from {:?}", csv_path));
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn csv_file(lines: &[&str]) -> Result<NamedTempFile> {
        let mut file = NamedTempFile::new()?;
        for line in lines {
            writeln!(file, "{line}")?;
        }
        file.flush()?;
        Ok(file)
    }

    #[test]
    fn loads_valid_rows_and_skips_bad_ones() -> Result<()> {
        let file = csv_file(&[
            "name,price,unit",
            "Arroz Branco,\"5,49\",kg",
            "Ovo,0.80,unidade",
            ",3.00,kg",
            "Feijão,caro,kg",
            "Leite, R$ 4.50 ,L",
        ])?;
        let rows = load_price_rows(file.path())?;
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], PriceRow { name: "Arroz Branco".into(), price: 5.49, unit: "kg".into() });
        assert_eq!(rows[2].price, 4.5);
        Ok(())
    }

    #[test]
    fn missing_column_is_an_error() -> Result<()> {
        let file = csv_file(&["name,value", "Arroz,5"])?;
        let err = load_price_rows(file.path()).unwrap_err();
        assert!(err.to_string().contains("'price'"));
        Ok(())
    }

    #[test]
    fn file_without_valid_rows_is_an_error() -> Result<()> {
        let file = csv_file(&["name,price,unit", ",1,kg", "Sal,?,kg"])?;
        assert!(load_price_rows(file.path()).is_err());
        Ok(())
    }

    #[test]
    fn kg_prices_and_unit_prices_land_in_separate_columns() {
        let now = Utc::now();
        let kg = PriceRow { name: "  Frango ".into(), price: 18.9, unit: "KG".into() };
        let record = kg.apply(None, now);
        assert_eq!(record.name, "frango");
        assert_eq!(record.price_per_kg, Some(18.9));
        assert_eq!(record.price_per_unit, None);

        let unit = PriceRow { name: "frango".into(), price: 25.0, unit: "bandeja".into() };
        let updated = unit.apply(Some(&record), now);
        assert_eq!(updated.id, record.id);
        assert_eq!(updated.price_per_kg, Some(18.9));
        assert_eq!(updated.price_per_unit, Some(25.0));
        assert_eq!(updated.measurement_unit, "bandeja");
    }
}
