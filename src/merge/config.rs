use crate::classes::{ClassTable, DEFAULT_CLASS_NAMES};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

/// Dataset-local class id -> global class id.
pub type ClassMap = BTreeMap<u32, u32>;

pub const DEFAULT_SPLITS: [&str; 3] = ["train", "valid", "test"];

lazy_static! {
    static ref DEFAULT_CONFIG: MergeConfig = MergeConfig {
        class_names: DEFAULT_CLASS_NAMES.iter().map(|n| n.to_string()).collect(),
        datasets: vec![
            DatasetDescriptor::with_offset("Batch-Details.v1i.yolov8", 1, 0),
            DatasetDescriptor::with_offset("ComputerVision.v11i.yolov8", 14, 1),
            DatasetDescriptor::with_offset("Experi Date.v1i.yolov8", 1, 15),
            DatasetDescriptor::with_offset("mrp label.v1i.yolov8", 13, 16),
        ],
        splits: default_splits(),
    };
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetDescriptor {
    pub name: String,
    pub class_map: ClassMap,
}

impl DatasetDescriptor {
    pub fn new(name: &str, class_map: ClassMap) -> Self {
        Self {
            name: name.to_string(),
            class_map,
        }
    }

    /// Maps local ids `0..num_classes` onto consecutive global ids starting at
    /// `first_global_id`.
    pub fn with_offset(name: &str, num_classes: u32, first_global_id: u32) -> Self {
        let class_map = (0..num_classes)
            .map(|local| (local, first_global_id + local))
            .collect();
        Self::new(name, class_map)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeConfig {
    #[serde(default)]
    pub class_names: Vec<String>,
    pub datasets: Vec<DatasetDescriptor>,
    #[serde(default = "default_splits")]
    pub splits: Vec<String>,
}

fn default_splits() -> Vec<String> {
    DEFAULT_SPLITS.iter().map(|s| s.to_string()).collect()
}

impl Default for MergeConfig {
    fn default() -> Self {
        DEFAULT_CONFIG.clone()
    }
}

impl MergeConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read merge config {}", path.display()))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("Invalid merge config {}", path.display()))?;
        Ok(config)
    }

    pub fn class_table(&self) -> ClassTable {
        ClassTable::new(self.class_names.clone())
    }

    /// Global ids some dataset maps onto that have no entry in `class_names`.
    /// A detector trained on the merged corpus would report these as unknown.
    pub fn unnamed_global_ids(&self) -> Vec<u32> {
        self.datasets
            .iter()
            .flat_map(|d| d.class_map.values().copied())
            .filter(|&id| id as usize >= self.class_names.len())
            .collect::<BTreeSet<u32>>()
            .into_iter()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_covers_product_label_datasets() {
        let config = MergeConfig::default();
        assert_eq!(config.datasets.len(), 4);
        assert_eq!(config.splits, vec!["train", "valid", "test"]);
        let computer_vision = &config.datasets[1];
        assert_eq!(computer_vision.class_map.len(), 14);
        assert_eq!(computer_vision.class_map[&0], 1);
        assert_eq!(computer_vision.class_map[&13], 14);
        let mrp = &config.datasets[3];
        assert_eq!(mrp.name, "mrp label.v1i.yolov8");
        assert_eq!(mrp.class_map[&12], 28);
    }

    #[test]
    fn default_config_reports_unnamed_class() {
        // 29 global ids but only 28 names
        assert_eq!(MergeConfig::default().unnamed_global_ids(), vec![28]);
    }

    #[test]
    fn loads_json_config_with_default_splits() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("merge.json");
        fs::write(
            &path,
            r#"{
                "class_names": ["a", "b"],
                "datasets": [{"name": "first set", "class_map": {"0": 1, "3": 0}}]
            }"#,
        )?;
        let config = MergeConfig::load(&path)?;
        assert_eq!(config.splits, vec!["train", "valid", "test"]);
        assert_eq!(config.datasets[0].class_map[&3], 0);
        assert!(config.unnamed_global_ids().is_empty());
        Ok(())
    }

    #[test]
    fn invalid_config_is_an_error() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("merge.json");
        fs::write(&path, r#"{"datasets": [{"name": "x", "class_map": {"a": 1}}]}"#)?;
        assert!(MergeConfig::load(&path).is_err());
        Ok(())
    }
}
