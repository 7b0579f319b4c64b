use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const CLASS_TABLE_FILENAME: &str = "classes.json";

/// Global class names of the product-label corpus, indexed by global class id.
pub const DEFAULT_CLASS_NAMES: [&str; 28] = [
    "Details",
    "barcode",
    "bestBeforeDate",
    "brand",
    "detailedProductName",
    "energyPerNutrientBasis",
    "ingredientStatement",
    "instructions",
    "logoLabel",
    "nutriScore",
    "nutritionTable",
    "productName",
    "qrCode",
    "variantDescription",
    "weightOrVolume",
    "date",
    "MRP_expiry",
    "cheese_balls_crax",
    "crax",
    "curlz",
    "expiry",
    "frills",
    "la",
    "label_box",
    "mfg_date",
    "natkhat",
    "price",
    "tedhe_medhe",
];

/// Positional list of class names shared by the dataset merge (which writes
/// it next to the merged corpus) and the detector (which reads it back).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassTable {
    pub names: Vec<String>,
}

impl Default for ClassTable {
    fn default() -> Self {
        Self {
            names: DEFAULT_CLASS_NAMES.iter().map(|n| n.to_string()).collect(),
        }
    }
}

impl ClassTable {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read class table {}", path.display()))?;
        let table: ClassTable = serde_json::from_str(&content)
            .with_context(|| format!("Invalid class table {}", path.display()))?;
        if table.is_empty() {
            warn!(
                "Class table {} is empty, every detection will be named Unknown_Class_N",
                path.display()
            );
        } else {
            info!("Loaded {} class names from {}", table.len(), path.display());
        }
        Ok(table)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)
            .with_context(|| format!("Could not write class table {}", path.display()))?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Indices past the end of the table get a synthetic name instead of
    /// failing, so that detections of untracked classes are still written.
    #[cfg(any(feature = "torch", test))]
    pub fn name_for(&self, class_id: usize) -> String {
        match self.names.get(class_id) {
            Some(name) => name.clone(),
            None => format!("Unknown_Class_{}", class_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_table_has_product_label_classes() {
        let table = ClassTable::default();
        assert_eq!(table.len(), 28);
        assert_eq!(table.name_for(0), "Details");
        assert_eq!(table.name_for(15), "date");
        assert_eq!(table.name_for(27), "tedhe_medhe");
    }

    #[test]
    fn out_of_range_index_gets_synthetic_name() {
        let table = ClassTable::default();
        assert_eq!(table.name_for(28), "Unknown_Class_28");
        assert_eq!(ClassTable::new(vec![]).name_for(3), "Unknown_Class_3");
    }

    #[test]
    fn saved_table_loads_back() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join(CLASS_TABLE_FILENAME);
        let table = ClassTable::new(vec!["price".into(), "expiry".into()]);
        table.save(&path)?;
        assert_eq!(ClassTable::load(&path)?, table);
        Ok(())
    }

    #[test]
    fn malformed_table_is_an_error() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join(CLASS_TABLE_FILENAME);
        fs::write(&path, "[\"price\"]")?;
        assert!(ClassTable::load(&path).is_err());
        assert!(ClassTable::load(&dir.path().join("missing.json")).is_err());
        Ok(())
    }
}
