pub mod config;
pub mod label;
pub mod options;

use crate::classes::CLASS_TABLE_FILENAME;
use crate::utils::{has_extension, prefixed_file_name};
use anyhow::{Context, Result};
use config::{DatasetDescriptor, MergeConfig};
use label::remap_labels;
use log::{debug, info, warn};
use options::MergeOptions;
use std::fs;
use std::ops::AddAssign;
use std::path::{Path, PathBuf};

const IMAGES_DIR: &str = "images";
const LABELS_DIR: &str = "labels";
const LABEL_SUFFIX: &str = ".txt";
/// Lookup order for the image that belongs to a label file.
const IMAGE_EXTENSIONS: [&str; 2] = ["jpg", "png"];

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SplitReport {
    pub label_files: usize,
    pub labels_written: usize,
    pub lines_kept: usize,
    pub lines_dropped: usize,
    pub images_copied: usize,
    pub images_missing: usize,
}

impl AddAssign for SplitReport {
    fn add_assign(&mut self, other: Self) {
        self.label_files += other.label_files;
        self.labels_written += other.labels_written;
        self.lines_kept += other.lines_kept;
        self.lines_dropped += other.lines_dropped;
        self.images_copied += other.images_copied;
        self.images_missing += other.images_missing;
    }
}

#[derive(Debug)]
pub struct MergeEntry {
    pub dataset: String,
    pub split: String,
    pub report: SplitReport,
}

#[derive(Debug, Default)]
pub struct MergeReport {
    pub entries: Vec<MergeEntry>,
    pub unnamed_classes: Vec<u32>,
}

impl MergeReport {
    pub fn total(&self) -> SplitReport {
        let mut total = SplitReport::default();
        for entry in &self.entries {
            total += entry.report;
        }
        total
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct SplitSummary {
    pub split: String,
    pub images: usize,
    pub labels: usize,
}

pub fn prepare_output(output_root: &Path, splits: &[String]) -> Result<()> {
    for split in splits {
        for dir in &[IMAGES_DIR, LABELS_DIR] {
            let path = output_root.join(split).join(dir);
            fs::create_dir_all(&path)
                .with_context(|| format!("Could not create {}", path.display()))?;
        }
    }
    Ok(())
}

/// Remaps the labels of one dataset split into the merged tree and copies the
/// matching images. Problems with single files or lines are logged and
/// skipped, they never abort the split.
pub fn remap_and_copy(dataset: &DatasetDescriptor, split: &str, opts: &MergeOptions) -> SplitReport {
    let mut report = SplitReport::default();
    let split_root = opts.input_root.join(&dataset.name).join(split);
    let image_dir = split_root.join(IMAGES_DIR);
    let label_dir = split_root.join(LABELS_DIR);

    if !split_root.is_dir() {
        warn!("Split directory does not exist, skipping: {}", split_root.display());
        return report;
    }
    if !label_dir.is_dir() {
        warn!("Label directory does not exist, skipping: {}", label_dir.display());
        return report;
    }
    if !image_dir.is_dir() {
        warn!("Image directory does not exist, skipping: {}", image_dir.display());
        return report;
    }

    let merged_images = opts.output_root.join(split).join(IMAGES_DIR);
    let merged_labels = opts.output_root.join(split).join(LABELS_DIR);

    let label_files = match list_label_files(&label_dir) {
        Ok(files) => files,
        Err(e) => {
            warn!("Could not list {}, skipping: {:#}", label_dir.display(), e);
            return report;
        }
    };

    for (file_name, label_path) in label_files {
        report.label_files += 1;
        let content = match fs::read_to_string(&label_path) {
            Ok(content) => content,
            Err(e) => {
                warn!("Could not read label file {}: {}", label_path.display(), e);
                continue;
            }
        };

        let remapped = remap_labels(&content, &dataset.class_map);
        for (line_no, err) in &remapped.dropped {
            warn!(
                "Dropping line {} of {} ({}): {}",
                line_no,
                label_path.display(),
                dataset.name,
                err
            );
        }
        report.lines_kept += remapped.lines.len();
        report.lines_dropped += remapped.dropped.len();

        if remapped.lines.is_empty() {
            warn!(
                "No valid lines in label file after remapping: {}",
                label_path.display()
            );
        } else {
            let target = merged_labels.join(prefixed_file_name(&dataset.name, &file_name));
            match fs::write(&target, remapped.content()) {
                Ok(()) => {
                    report.labels_written += 1;
                    debug!(
                        "Wrote label: {} ({} lines)",
                        target.display(),
                        remapped.lines.len()
                    );
                }
                Err(e) => warn!("Could not write label {}: {}", target.display(), e),
            }
        }

        let stem = &file_name[..file_name.len() - LABEL_SUFFIX.len()];
        match find_image(&image_dir, stem) {
            Some((image_name, source)) => {
                let target = merged_images.join(prefixed_file_name(&dataset.name, &image_name));
                match fs::copy(&source, &target) {
                    Ok(_) => {
                        report.images_copied += 1;
                        debug!("Copied image: {} -> {}", source.display(), target.display());
                    }
                    Err(e) => {
                        report.images_missing += 1;
                        warn!("Could not copy image {}: {}", source.display(), e);
                    }
                }
            }
            None => {
                report.images_missing += 1;
                warn!(
                    "Image file not found for label: {} in {}",
                    file_name,
                    image_dir.display()
                );
            }
        }
    }

    report
}

pub fn merge_datasets(config: &MergeConfig, opts: &MergeOptions) -> Result<MergeReport> {
    let splits = opts.splits.clone().unwrap_or_else(|| config.splits.clone());
    prepare_output(&opts.output_root, &splits)?;
    info!("Processing splits: {:?}", splits);

    let mut merge_report = MergeReport::default();
    for dataset in &config.datasets {
        info!("Processing dataset: {}", dataset.name);
        for split in &splits {
            let report = remap_and_copy(dataset, split, opts);
            merge_report.entries.push(MergeEntry {
                dataset: dataset.name.clone(),
                split: split.clone(),
                report,
            });
        }
    }

    merge_report.unnamed_classes = config.unnamed_global_ids();
    if !merge_report.unnamed_classes.is_empty() {
        warn!(
            "Global class ids {:?} have no class name, detections of them will be reported as Unknown_Class_N",
            merge_report.unnamed_classes
        );
    }
    if config.class_names.is_empty() {
        warn!("No class names configured, {} not written", CLASS_TABLE_FILENAME);
    } else {
        let table_path = opts.output_root.join(CLASS_TABLE_FILENAME);
        config.class_table().save(&table_path)?;
        info!("Wrote class table {}", table_path.display());
    }

    Ok(merge_report)
}

/// Counts the images and labels present in each split of the merged tree.
pub fn summarize(output_root: &Path, splits: &[String]) -> Result<Vec<SplitSummary>> {
    let mut summaries = Vec::with_capacity(splits.len());
    for split in splits {
        let split_root = output_root.join(split);
        if !split_root.is_dir() {
            continue;
        }
        let images = read_file_names(&split_root.join(IMAGES_DIR))?
            .iter()
            .filter(|name| has_extension(Path::new(name), &IMAGE_EXTENSIONS))
            .count();
        let labels = read_file_names(&split_root.join(LABELS_DIR))?
            .iter()
            .filter(|name| name.ends_with(LABEL_SUFFIX))
            .count();
        summaries.push(SplitSummary {
            split: split.clone(),
            images,
            labels,
        });
    }
    Ok(summaries)
}

fn read_file_names(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("Could not open dir {}", dir.display()))? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            match entry.file_name().into_string() {
                Ok(name) => names.push(name),
                Err(name) => warn!("Skipping non UTF-8 file name {:?} in {}", name, dir.display()),
            }
        }
    }
    names.sort();
    Ok(names)
}

fn list_label_files(label_dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    Ok(read_file_names(label_dir)?
        .into_iter()
        .filter(|name| name.ends_with(LABEL_SUFFIX))
        .map(|name| {
            let path = label_dir.join(&name);
            (name, path)
        })
        .collect())
}

fn find_image(image_dir: &Path, stem: &str) -> Option<(String, PathBuf)> {
    IMAGE_EXTENSIONS.iter().find_map(|ext| {
        let name = format!("{}.{}", stem, ext);
        let path = image_dir.join(&name);
        if path.is_file() {
            Some((name, path))
        } else {
            None
        }
    })
}
