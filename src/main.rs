#[macro_use]
extern crate lazy_static;
#[macro_use]
mod macros;

mod classes;
mod denoise;
mod detection;
mod image_ops;
mod merge;
mod ocr;
mod polygon;
mod utils;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Arg, ArgMatches, Command};
use classes::ClassTable;
use detection::options::DetectionOptions;
use log::{error, info, warn, LevelFilter};
use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
use merge::config::MergeConfig;
use merge::options::MergeOptions;
use ocr::options::{EngineChoice, OcrOptions};
use ocr::tesseract::TesseractEngine;
use ocr::OcrEngine;
use std::fs;
use std::path::{Path, PathBuf};

const LOG_CONFIG_FILE: &str = "log4rs.yml";

fn main() -> Result<()> {
    init_logging()?;

    let matches = cli().get_matches();
    match matches.subcommand() {
        Some(("merge", args)) => run_merge(args),
        Some(("detect", args)) => run_detect(args),
        Some(("ocr", args)) => run_ocr(args),
        Some(("preprocess", args)) => run_preprocess(args),
        _ => Err(anyhow!("No subcommand given, see --help")),
    }
}

fn init_logging() -> Result<()> {
    if Path::new(LOG_CONFIG_FILE).exists() {
        return log4rs::init_file(LOG_CONFIG_FILE, Default::default());
    }
    let stderr = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new(
            "{d(%H:%M:%S%.3f)} {h({l:<5})} {t} - {m}{n}",
        )))
        .build();
    let config = Config::builder()
        .appender(Appender::builder().build("stderr", Box::new(stderr)))
        .build(Root::builder().appender("stderr").build(LevelFilter::Info))?;
    log4rs::init_config(config)?;
    Ok(())
}

fn cli() -> Command {
    Command::new("labelscan")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Product label dataset merging, detection cropping and OCR")
        .subcommand_required(true)
        .subcommand(
            Command::new("merge")
                .about("Merges YOLO datasets into one corpus with global class ids")
                .arg(
                    Arg::new("input-root")
                        .long("input-root")
                        .value_name("DIR")
                        .help("Directory holding the source datasets (default: .)"),
                )
                .arg(
                    Arg::new("output")
                        .long("output")
                        .short('o')
                        .value_name("DIR")
                        .help("Merged dataset directory (default: merged_dataset)"),
                )
                .arg(
                    Arg::new("config")
                        .long("config")
                        .short('c')
                        .value_name("FILE")
                        .help("JSON merge configuration, the built-in table is used otherwise"),
                )
                .arg(
                    Arg::new("splits")
                        .long("splits")
                        .value_name("LIST")
                        .help("Comma separated splits to process (default: train,valid,test)"),
                ),
        )
        .subcommand(
            Command::new("detect")
                .about("Detects label regions, saves crops and an annotated image")
                .arg(
                    Arg::new("model")
                        .long("model")
                        .short('m')
                        .value_name("FILE")
                        .required(true)
                        .help("YOLO model exported to TorchScript"),
                )
                .arg(
                    Arg::new("image")
                        .long("image")
                        .short('i')
                        .value_name("FILE")
                        .required(true),
                )
                .arg(
                    Arg::new("classes")
                        .long("classes")
                        .value_name("FILE")
                        .help("classes.json written by merge"),
                )
                .arg(
                    Arg::new("output-image")
                        .long("output-image")
                        .value_name("FILE")
                        .help("Annotated image path (default: result.jpg)"),
                )
                .arg(
                    Arg::new("crops-dir")
                        .long("crops-dir")
                        .value_name("DIR")
                        .help("Crop folder (default: cropped_detections)"),
                )
                .arg(Arg::new("conf-threshold").long("conf-threshold").value_name("F"))
                .arg(Arg::new("iou-threshold").long("iou-threshold").value_name("F"))
                .arg(Arg::new("max-detections").long("max-detections").value_name("N"))
                .arg(
                    Arg::new("font")
                        .long("font")
                        .value_name("FILE")
                        .help("TrueType font for labels, a system font is tried otherwise"),
                ),
        )
        .subcommand(
            Command::new("ocr")
                .about("Preprocesses images and runs the OCR engines on them")
                .arg(
                    Arg::new("image")
                        .value_name("IMAGE")
                        .num_args(1..)
                        .required(true),
                )
                .arg(
                    Arg::new("engine")
                        .long("engine")
                        .short('e')
                        .value_name("ENGINE")
                        .help("tesseract, paddle or all (default: all)"),
                )
                .arg(Arg::new("lang").long("lang").value_name("LANG"))
                .arg(Arg::new("psm").long("psm").value_name("N"))
                .arg(Arg::new("oem").long("oem").value_name("N"))
                .arg(Arg::new("dpi").long("dpi").value_name("N"))
                .arg(Arg::new("paddle-det").long("paddle-det").value_name("FILE"))
                .arg(Arg::new("paddle-rec").long("paddle-rec").value_name("FILE"))
                .arg(Arg::new("paddle-keys").long("paddle-keys").value_name("FILE"))
                .arg(
                    Arg::new("output")
                        .long("output")
                        .short('o')
                        .value_name("FILE")
                        .help("Write the JSON results here instead of stdout"),
                ),
        )
        .subcommand(
            Command::new("preprocess")
                .about("Writes the OCR preprocessing result of an image")
                .arg(
                    Arg::new("image")
                        .long("image")
                        .short('i')
                        .value_name("FILE")
                        .required(true),
                )
                .arg(
                    Arg::new("output")
                        .long("output")
                        .short('o')
                        .value_name("FILE")
                        .required(true),
                ),
        )
}

fn run_merge(args: &ArgMatches) -> Result<()> {
    let opts = MergeOptions::new(args)?;
    let config = match &opts.config_path {
        Some(path) => MergeConfig::load(path)?,
        None => MergeConfig::default(),
    };

    let report = measure_time!(
        "merge",
        || merge::merge_datasets(&config, &opts),
        log::Level::Info
    )?;
    for entry in &report.entries {
        info!(
            "  {}/{}: {} labels written, {} images copied, {} lines dropped",
            entry.dataset,
            entry.split,
            entry.report.labels_written,
            entry.report.images_copied,
            entry.report.lines_dropped
        );
    }
    let total = report.total();
    info!(
        "All datasets merged: {} label files written, {} images copied, {} images missing, {} lines dropped",
        total.labels_written, total.images_copied, total.images_missing, total.lines_dropped
    );

    let splits = opts.splits.clone().unwrap_or_else(|| config.splits.clone());
    info!("Merged dataset structure in {}:", opts.output_root.display());
    for summary in merge::summarize(&opts.output_root, &splits)? {
        info!("  {}: {} images, {} labels", summary.split, summary.images, summary.labels);
    }
    Ok(())
}

fn load_classes(path: Option<&Path>) -> Result<ClassTable> {
    match path {
        Some(path) => ClassTable::load(path),
        None => Ok(ClassTable::default()),
    }
}

#[cfg(feature = "torch")]
fn run_detect(args: &ArgMatches) -> Result<()> {
    use detection::annotate::Annotator;

    let opts = DetectionOptions::new(args)?;
    let classes = load_classes(opts.classes_path.as_deref())?;
    let annotator = Annotator::new(opts.font_path.as_deref())?;
    let mut detector = detection::model::TorchScriptDetector::load(&opts)?;
    let report = detection::run_detection(&mut detector, &classes, &annotator, &opts)?;
    for crop in &report.crops {
        log::debug!(
            "{} ({:.2}) -> {}",
            crop.class_name,
            crop.confidence,
            crop.path.display()
        );
    }
    info!(
        "Detection complete: {} boxes, {} crops, annotated image {}",
        report.detections,
        report.crops.len(),
        report.annotated_image.display()
    );
    Ok(())
}

#[cfg(not(feature = "torch"))]
fn run_detect(args: &ArgMatches) -> Result<()> {
    let opts = DetectionOptions::new(args)?;
    load_classes(opts.classes_path.as_deref())?;
    bail!(
        "Cannot load {}: labelscan was built without the `torch` feature",
        opts.model_path.display()
    )
}

fn build_engines(opts: &OcrOptions) -> Result<Vec<Box<dyn OcrEngine>>> {
    let mut engines: Vec<Box<dyn OcrEngine>> = Vec::new();
    if opts.engine.wants_tesseract() {
        match TesseractEngine::new(opts) {
            Ok(engine) => engines.push(Box::new(engine)),
            Err(e) if opts.engine == EngineChoice::All => warn!("Tesseract disabled: {:#}", e),
            Err(e) => return Err(e),
        }
    }
    if opts.engine.wants_paddle() {
        match paddle_engine(opts) {
            Ok(engine) => engines.push(engine),
            Err(e) if opts.engine == EngineChoice::All => warn!("PaddleOCR disabled: {:#}", e),
            Err(e) => return Err(e),
        }
    }
    if engines.is_empty() {
        bail!("No OCR engine could be initialized");
    }
    Ok(engines)
}

#[cfg(feature = "paddle")]
fn paddle_engine(opts: &OcrOptions) -> Result<Box<dyn OcrEngine>> {
    Ok(Box::new(ocr::paddle::PaddleEngine::new(opts)?))
}

#[cfg(not(feature = "paddle"))]
fn paddle_engine(_opts: &OcrOptions) -> Result<Box<dyn OcrEngine>> {
    bail!("labelscan was built without the `paddle` feature")
}

fn run_ocr(args: &ArgMatches) -> Result<()> {
    let opts = OcrOptions::new(args)?;
    let mut engines = build_engines(&opts)?;

    let mut reports = Vec::new();
    let mut failed = 0;
    for image_path in &opts.images {
        match ocr::run_ocr(&mut engines, image_path) {
            Ok(mut image_reports) => reports.append(&mut image_reports),
            Err(e) => {
                failed += 1;
                error!("Skipping {}: {:#}", image_path.display(), e);
            }
        }
    }

    let json = serde_json::to_string_pretty(&reports)?;
    match &opts.output {
        Some(path) => {
            fs::write(path, json)
                .with_context(|| format!("Could not write {}", path.display()))?;
            info!("Wrote OCR results to {}", path.display());
        }
        None => println!("{}", json),
    }
    if failed == opts.images.len() {
        bail!("None of the {} images could be processed", failed);
    }
    Ok(())
}

fn run_preprocess(args: &ArgMatches) -> Result<()> {
    let input = args
        .get_one::<String>("image")
        .map(PathBuf::from)
        .ok_or_else(|| anyhow!("Missing --image"))?;
    let output = args
        .get_one::<String>("output")
        .map(PathBuf::from)
        .ok_or_else(|| anyhow!("Missing --output"))?;

    let processed = measure_time!(
        "preprocess",
        || image_ops::preprocess_image(&input),
        log::Level::Info
    )?;
    processed
        .save(&output)
        .with_context(|| format!("Could not save {}", output.display()))?;
    info!("Saved preprocessed image {}", output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_is_consistent() {
        cli().debug_assert();
    }

    #[test]
    fn ocr_accepts_several_images() -> Result<()> {
        let matches = cli().try_get_matches_from(vec![
            "labelscan", "ocr", "a.png", "b.jpg", "--engine", "tesseract", "--psm", "6",
        ])?;
        let (_, args) = matches.subcommand().ok_or_else(|| anyhow!("no subcommand"))?;
        let opts = OcrOptions::new(args)?;
        assert_eq!(opts.images, vec![PathBuf::from("a.png"), PathBuf::from("b.jpg")]);
        assert_eq!(opts.engine, EngineChoice::Tesseract);
        assert_eq!(opts.psm, Some(6));
        assert_eq!(opts.lang, "eng");
        Ok(())
    }

    #[test]
    fn detect_options_are_parsed_and_checked() -> Result<()> {
        let matches = cli().try_get_matches_from(vec![
            "labelscan",
            "detect",
            "--model",
            "last_8.torchscript",
            "--image",
            "shelf.jpg",
            "--conf-threshold",
            "0.4",
        ])?;
        let (_, args) = matches.subcommand().ok_or_else(|| anyhow!("no subcommand"))?;
        let opts = DetectionOptions::new(args)?;
        assert_eq!(opts.conf_threshold, 0.4);
        assert_eq!(opts.iou_threshold, 0.7);
        assert_eq!(opts.crops_dir, PathBuf::from("cropped_detections"));

        let matches = cli().try_get_matches_from(vec![
            "labelscan",
            "detect",
            "--model",
            "m",
            "--image",
            "i",
            "--iou-threshold",
            "1.5",
        ])?;
        let (_, args) = matches.subcommand().ok_or_else(|| anyhow!("no subcommand"))?;
        assert!(DetectionOptions::new(args).is_err());
        Ok(())
    }

    #[test]
    fn merge_splits_are_parsed() -> Result<()> {
        let matches =
            cli().try_get_matches_from(vec!["labelscan", "merge", "--splits", "train, valid"])?;
        let (_, args) = matches.subcommand().ok_or_else(|| anyhow!("no subcommand"))?;
        let opts = MergeOptions::new(args)?;
        assert_eq!(opts.splits, Some(vec!["train".to_string(), "valid".to_string()]));
        assert_eq!(opts.output_root, PathBuf::from("merged_dataset"));
        Ok(())
    }
}
