use crate::utils::parse_list;
use anyhow::{anyhow, Result};
use std::path::PathBuf;

pub const DEFAULT_OUTPUT_DIR: &str = "merged_dataset";

#[derive(Debug, Clone)]
pub struct MergeOptions {
    pub input_root: PathBuf,
    pub output_root: PathBuf,
    pub config_path: Option<PathBuf>,
    pub splits: Option<Vec<String>>,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            input_root: PathBuf::from("."),
            output_root: PathBuf::from(DEFAULT_OUTPUT_DIR),
            config_path: None,
            splits: None,
        }
    }
}

impl MergeOptions {
    pub fn new(args: &clap::ArgMatches) -> Result<Self> {
        let mut opts = Self::default();
        if let Some(path) = args.get_one::<String>("input-root") {
            opts.input_root = PathBuf::from(path);
        }
        if let Some(path) = args.get_one::<String>("output") {
            opts.output_root = PathBuf::from(path);
        }
        if let Some(path) = args.get_one::<String>("config") {
            opts.config_path = Some(PathBuf::from(path));
        }
        if let Some(splits) = args.get_one::<String>("splits") {
            let splits = parse_list(splits);
            if splits.is_empty() {
                return Err(anyhow!("At least one split must be given"));
            }
            opts.splits = Some(splits);
        }

        Ok(opts)
    }
}
