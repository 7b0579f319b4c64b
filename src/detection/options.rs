use super::{DEFAULT_CROPS_DIR, DEFAULT_RESULT_IMAGE};
use crate::utils::parse_number;
use anyhow::{bail, Result};
use std::path::PathBuf;

/// Only the model and class paths are read when built without `torch`.
#[derive(Debug, Clone)]
#[cfg_attr(not(feature = "torch"), allow(dead_code))]
pub struct DetectionOptions {
    pub model_path: PathBuf,
    pub image_path: PathBuf,
    pub classes_path: Option<PathBuf>,
    pub output_image: PathBuf,
    pub crops_dir: PathBuf,
    pub conf_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
    pub font_path: Option<PathBuf>,
}

impl Default for DetectionOptions {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("last_8.torchscript"),
            image_path: PathBuf::new(),
            classes_path: None,
            output_image: PathBuf::from(DEFAULT_RESULT_IMAGE),
            crops_dir: PathBuf::from(DEFAULT_CROPS_DIR),
            conf_threshold: 0.25,
            iou_threshold: 0.7,
            max_detections: 300,
            font_path: None,
        }
    }
}

impl DetectionOptions {
    pub fn new(args: &clap::ArgMatches) -> Result<Self> {
        let mut opts = Self::default();
        if let Some(path) = args.get_one::<String>("model") {
            opts.model_path = PathBuf::from(path);
        }
        if let Some(path) = args.get_one::<String>("image") {
            opts.image_path = PathBuf::from(path);
        }
        if let Some(path) = args.get_one::<String>("classes") {
            opts.classes_path = Some(PathBuf::from(path));
        }
        if let Some(path) = args.get_one::<String>("output-image") {
            opts.output_image = PathBuf::from(path);
        }
        if let Some(path) = args.get_one::<String>("crops-dir") {
            opts.crops_dir = PathBuf::from(path);
        }
        if let Some(conf) = args.get_one::<String>("conf-threshold") {
            opts.conf_threshold = parse_number(conf, "confidence threshold")?;
        }
        if let Some(iou) = args.get_one::<String>("iou-threshold") {
            opts.iou_threshold = parse_number(iou, "IoU threshold")?;
        }
        if let Some(max) = args.get_one::<String>("max-detections") {
            opts.max_detections = parse_number(max, "max detections")?;
        }
        if let Some(path) = args.get_one::<String>("font") {
            opts.font_path = Some(PathBuf::from(path));
        }

        for (name, value) in [
            ("confidence threshold", opts.conf_threshold),
            ("IoU threshold", opts.iou_threshold),
        ]
        .iter()
        {
            if !(0. ..=1.).contains(value) {
                bail!("The {} must be within [0, 1], got {}", name, value);
            }
        }

        Ok(opts)
    }
}
