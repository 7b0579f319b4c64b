use super::options::OcrOptions;
use super::{box_points, normalize_items, OcrEngine, OcrItemError, OcrResult, RawTextItem};
use anyhow::{Context, Result};
use image::{GrayImage, ImageFormat};
use log::info;
use rusty_tesseract::{Args, Data, Image};

/// Row level of a single word in tesseract's TSV output.
const WORD_LEVEL: i32 = 5;

/// Runs the `tesseract` executable on the preprocessed image and reports
/// word boxes.
pub struct TesseractEngine {
    args: Args,
}

impl TesseractEngine {
    pub fn new(opts: &OcrOptions) -> Result<Self> {
        let version = rusty_tesseract::get_tesseract_version()
            .context("tesseract executable is not available")?;
        info!("Using tesseract {}", version.lines().next().unwrap_or_default());
        Ok(Self {
            args: Args {
                lang: opts.lang.clone(),
                psm: opts.psm,
                oem: opts.oem,
                dpi: opts.dpi,
                ..Args::default()
            },
        })
    }
}

impl OcrEngine for TesseractEngine {
    fn name(&self) -> &'static str {
        "tesseract"
    }

    fn recognize(&mut self, image: &GrayImage) -> Result<Vec<OcrResult>> {
        let file = tempfile::Builder::new()
            .prefix("labelscan-")
            .suffix(".png")
            .tempfile()?;
        image.save_with_format(file.path(), ImageFormat::Png)?;
        let tess_image = Image::from_path(file.path().to_path_buf())?;
        let output = rusty_tesseract::image_to_data(&tess_image, &self.args)?;
        let words = output
            .data
            .iter()
            .filter(|record| record.level == WORD_LEVEL)
            .map(|record| word_to_item(record).map_err(anyhow::Error::from));
        Ok(normalize_items(self.name(), words))
    }
}

fn word_to_item(record: &Data) -> Result<RawTextItem, OcrItemError> {
    if record.text.trim().is_empty() {
        return Err(OcrItemError::EmptyText);
    }
    if record.width <= 0 || record.height <= 0 {
        return Err(OcrItemError::DegenerateBox(record.width, record.height));
    }
    Ok(RawTextItem {
        points: box_points(
            f64::from(record.left),
            f64::from(record.top),
            f64::from(record.width),
            f64::from(record.height),
        ),
        text: record.text.clone(),
        // tesseract reports 0..100, -1 for rows without text
        confidence: f64::from(record.conf) / 100.,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::TryFrom;

    fn word(left: i32, top: i32, width: i32, height: i32, conf: f32, text: &str) -> Data {
        Data {
            level: WORD_LEVEL,
            page_num: 1,
            block_num: 1,
            par_num: 1,
            line_num: 1,
            word_num: 1,
            left,
            top,
            width,
            height,
            conf,
            text: text.to_string(),
        }
    }

    #[test]
    fn word_becomes_box_polygon() {
        let item = word_to_item(&word(12, 30, 40, 10, 91.5, "Rs.20")).unwrap();
        let result = OcrResult::try_from(item).unwrap();
        assert_eq!(result.polygon, vec![(12, 30), (52, 30), (52, 40), (12, 40)]);
        assert_eq!(result.text, "Rs.20");
        assert!((result.confidence - 0.915).abs() < 1e-6);
    }

    #[test]
    fn unusable_words_are_rejected() {
        assert_eq!(word_to_item(&word(0, 0, 5, 5, 80., "  ")), Err(OcrItemError::EmptyText));
        assert_eq!(
            word_to_item(&word(0, 0, 0, 5, 80., "x")),
            Err(OcrItemError::DegenerateBox(0, 5))
        );
        let negative = word_to_item(&word(0, 0, 5, 5, -1., "x")).unwrap();
        assert!(OcrResult::try_from(negative).is_err());
    }

    #[test]
    fn only_valid_words_survive_normalization() {
        let records = vec![
            word(0, 0, 10, 10, 95., "expiry"),
            word(0, 0, 10, 10, -1., "ghost"),
            word(20, 0, 10, 10, 60., "12/26"),
        ];
        let results = normalize_items(
            "tesseract",
            records
                .iter()
                .map(|r| word_to_item(r).map_err(anyhow::Error::from)),
        );
        let texts = results.iter().map(|r| r.text.as_str()).collect::<Vec<&str>>();
        assert_eq!(texts, vec!["expiry", "12/26"]);
    }
}
