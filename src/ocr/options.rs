use crate::utils::parse_number;
use anyhow::{anyhow, Result};
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_PADDLE_DET_MODEL: &str = "./models/PP-OCRv5_mobile_det.mnn";
pub const DEFAULT_PADDLE_REC_MODEL: &str = "./models/PP-OCRv5_mobile_rec.mnn";
pub const DEFAULT_PADDLE_KEYS: &str = "./models/ppocr_keys_v5.txt";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineChoice {
    Tesseract,
    Paddle,
    All,
}

impl EngineChoice {
    pub fn wants_tesseract(self) -> bool {
        self != EngineChoice::Paddle
    }

    pub fn wants_paddle(self) -> bool {
        self != EngineChoice::Tesseract
    }
}

impl FromStr for EngineChoice {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "tesseract" => Ok(EngineChoice::Tesseract),
            "paddle" => Ok(EngineChoice::Paddle),
            "all" => Ok(EngineChoice::All),
            other => Err(anyhow!(
                "Unknown OCR engine \"{}\" (expected tesseract, paddle or all)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OcrOptions {
    pub images: Vec<PathBuf>,
    pub engine: EngineChoice,
    pub lang: String,
    pub psm: Option<i32>,
    pub oem: Option<i32>,
    pub dpi: Option<i32>,
    #[cfg_attr(not(feature = "paddle"), allow(dead_code))]
    pub paddle_det_model: PathBuf,
    #[cfg_attr(not(feature = "paddle"), allow(dead_code))]
    pub paddle_rec_model: PathBuf,
    #[cfg_attr(not(feature = "paddle"), allow(dead_code))]
    pub paddle_keys: PathBuf,
    pub output: Option<PathBuf>,
}

impl Default for OcrOptions {
    fn default() -> Self {
        Self {
            images: Vec::new(),
            engine: EngineChoice::All,
            lang: "eng".to_string(),
            psm: Some(3),
            oem: Some(1),
            dpi: Some(300),
            paddle_det_model: PathBuf::from(DEFAULT_PADDLE_DET_MODEL),
            paddle_rec_model: PathBuf::from(DEFAULT_PADDLE_REC_MODEL),
            paddle_keys: PathBuf::from(DEFAULT_PADDLE_KEYS),
            output: None,
        }
    }
}

impl OcrOptions {
    pub fn new(args: &clap::ArgMatches) -> Result<Self> {
        let mut opts = Self::default();
        if let Some(images) = args.get_many::<String>("image") {
            opts.images = images.map(PathBuf::from).collect();
        }
        if let Some(engine) = args.get_one::<String>("engine") {
            opts.engine = engine.parse()?;
        }
        if let Some(lang) = args.get_one::<String>("lang") {
            opts.lang = lang.clone();
        }
        if let Some(psm) = args.get_one::<String>("psm") {
            opts.psm = Some(parse_number(psm, "page segmentation mode")?);
        }
        if let Some(oem) = args.get_one::<String>("oem") {
            opts.oem = Some(parse_number(oem, "engine mode")?);
        }
        if let Some(dpi) = args.get_one::<String>("dpi") {
            opts.dpi = Some(parse_number(dpi, "dpi")?);
        }
        if let Some(path) = args.get_one::<String>("paddle-det") {
            opts.paddle_det_model = PathBuf::from(path);
        }
        if let Some(path) = args.get_one::<String>("paddle-rec") {
            opts.paddle_rec_model = PathBuf::from(path);
        }
        if let Some(path) = args.get_one::<String>("paddle-keys") {
            opts.paddle_keys = PathBuf::from(path);
        }
        if let Some(path) = args.get_one::<String>("output") {
            opts.output = Some(PathBuf::from(path));
        }

        Ok(opts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_engine_choice() {
        assert_eq!("Tesseract".parse::<EngineChoice>().unwrap(), EngineChoice::Tesseract);
        assert_eq!("all".parse::<EngineChoice>().unwrap(), EngineChoice::All);
        assert!("easyocr".parse::<EngineChoice>().is_err());
        assert!(EngineChoice::All.wants_paddle() && EngineChoice::All.wants_tesseract());
        assert!(!EngineChoice::Paddle.wants_tesseract());
        assert!(!EngineChoice::Tesseract.wants_paddle());
    }
}
