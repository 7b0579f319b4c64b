use super::options::OcrOptions;
use super::{box_points, normalize_items, OcrEngine, OcrResult, RawTextItem};
use anyhow::{anyhow, Context, Result};
use image::{DynamicImage, GrayImage};
use log::info;
use rust_paddle_ocr::{Det, Rec};

/// PP-OCR text detection followed by per-region recognition.
pub struct PaddleEngine {
    det: Det,
    rec: Rec,
}

impl PaddleEngine {
    pub fn new(opts: &OcrOptions) -> Result<Self> {
        let det_path = path_str(&opts.paddle_det_model)?;
        let rec_path = path_str(&opts.paddle_rec_model)?;
        let keys_path = path_str(&opts.paddle_keys)?;
        let det = Det::from_file(det_path)
            .with_context(|| format!("Could not load detection model {}", det_path))?
            .with_rect_border_size(12)
            .with_merge_boxes(false)
            .with_merge_threshold(1);
        let rec = Rec::from_file(rec_path, keys_path)
            .with_context(|| format!("Could not load recognition model {}", rec_path))?
            .with_min_score(0.6)
            .with_punct_min_score(0.1);
        info!("Loaded PaddleOCR models {} and {}", det_path, rec_path);
        Ok(Self { det, rec })
    }
}

fn path_str(path: &std::path::Path) -> Result<&str> {
    path.to_str()
        .ok_or_else(|| anyhow!("Model path {} is not valid UTF-8", path.display()))
}

impl OcrEngine for PaddleEngine {
    fn name(&self) -> &'static str {
        "paddle"
    }

    fn recognize(&mut self, image: &GrayImage) -> Result<Vec<OcrResult>> {
        let rgb = DynamicImage::ImageRgb8(DynamicImage::ImageLuma8(image.clone()).to_rgb8());
        let rects = self.det.find_text_rect(&rgb)?;

        let mut items = Vec::with_capacity(rects.len());
        for rect in &rects {
            let left = rect.left().max(0) as u32;
            let top = rect.top().max(0) as u32;
            let region = rgb.crop_imm(left, top, rect.width(), rect.height());
            let item = self
                .rec
                .predict_with_confidence(&region)
                .map(|(text, confidence)| RawTextItem {
                    points: box_points(
                        f64::from(left),
                        f64::from(top),
                        f64::from(rect.width()),
                        f64::from(rect.height()),
                    ),
                    text,
                    confidence: f64::from(confidence),
                })
                .map_err(|e| anyhow!("recognition failed: {}", e));
            items.push(item);
        }
        Ok(normalize_items(self.name(), items))
    }
}
