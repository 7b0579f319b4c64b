pub mod options;
#[cfg(feature = "paddle")]
pub mod paddle;
pub mod tesseract;

use crate::image_ops;
use anyhow::{anyhow, Result};
use image::GrayImage;
use log::{debug, error, info};
use serde::Serialize;
use std::convert::TryFrom;
use std::path::Path;
use thiserror::Error;

/// One recognized piece of text, normalized across engines.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OcrResult {
    pub polygon: Vec<(i32, i32)>,
    pub text: String,
    pub confidence: f64,
}

/// Engine output before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTextItem {
    pub points: Vec<(f64, f64)>,
    pub text: String,
    pub confidence: f64,
}

#[derive(Debug, Error, PartialEq)]
pub enum OcrItemError {
    #[error("polygon has no points")]
    EmptyPolygon,
    #[error("polygon coordinate {0} is not finite")]
    NonFiniteCoordinate(f64),
    #[error("confidence {0} is outside [0, 1]")]
    InvalidConfidence(f64),
    #[error("box {0}x{1} is degenerate")]
    DegenerateBox(i32, i32),
    #[error("no text")]
    EmptyText,
}

impl TryFrom<RawTextItem> for OcrResult {
    type Error = OcrItemError;

    fn try_from(raw: RawTextItem) -> Result<Self, Self::Error> {
        if raw.points.is_empty() {
            return Err(OcrItemError::EmptyPolygon);
        }
        if !raw.confidence.is_finite() || !(0. ..=1.).contains(&raw.confidence) {
            return Err(OcrItemError::InvalidConfidence(raw.confidence));
        }
        let polygon = raw
            .points
            .iter()
            .map(|&(x, y)| {
                if !x.is_finite() {
                    Err(OcrItemError::NonFiniteCoordinate(x))
                } else if !y.is_finite() {
                    Err(OcrItemError::NonFiniteCoordinate(y))
                } else {
                    Ok((x as i32, y as i32))
                }
            })
            .collect::<Result<Vec<(i32, i32)>, OcrItemError>>()?;
        Ok(OcrResult {
            polygon,
            text: raw.text,
            confidence: raw.confidence,
        })
    }
}

/// Axis aligned box as a clockwise 4-point polygon starting top-left.
pub fn box_points(left: f64, top: f64, width: f64, height: f64) -> Vec<(f64, f64)> {
    vec![
        (left, top),
        (left + width, top),
        (left + width, top + height),
        (left, top + height),
    ]
}

/// Normalizes raw engine items in order. Items that failed inside the engine
/// or do not normalize are logged and skipped.
pub fn normalize_items<I>(engine: &str, items: I) -> Vec<OcrResult>
where
    I: IntoIterator<Item = Result<RawTextItem>>,
{
    let mut results = Vec::new();
    for (idx, item) in items.into_iter().enumerate() {
        match item.and_then(|raw| OcrResult::try_from(raw).map_err(|e| anyhow!(e))) {
            Ok(result) => results.push(result),
            Err(e) => debug!("{}: skipping item {}: {:#}", engine, idx, e),
        }
    }
    results
}

pub trait OcrEngine {
    fn name(&self) -> &'static str;

    /// Recognizes text in an already preprocessed image.
    fn recognize(&mut self, image: &GrayImage) -> Result<Vec<OcrResult>>;
}

#[derive(Debug, Serialize)]
pub struct OcrReport {
    pub image: String,
    pub engine: String,
    pub results: Vec<OcrResult>,
}

/// Preprocesses the image once and hands it to every engine. Fails only when
/// the image cannot be read; an engine error is logged and that engine's
/// report is left out.
pub fn run_ocr(engines: &mut [Box<dyn OcrEngine>], image_path: &Path) -> Result<Vec<OcrReport>> {
    let preprocessed = image_ops::preprocess_image(image_path)?;
    let mut reports = Vec::with_capacity(engines.len());
    for engine in engines.iter_mut() {
        match measure_time!(engine.name(), || engine.recognize(&preprocessed)) {
            Ok(results) => {
                info!(
                    "{}: {} text items in {}",
                    engine.name(),
                    results.len(),
                    image_path.display()
                );
                reports.push(OcrReport {
                    image: image_path.display().to_string(),
                    engine: engine.name().to_string(),
                    results,
                });
            }
            Err(e) => error!(
                "{} failed on {}: {:#}",
                engine.name(),
                image_path.display(),
                e
            ),
        }
    }
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use tempfile::TempDir;

    struct FixedEngine {
        items: Vec<RawTextItem>,
    }

    impl OcrEngine for FixedEngine {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn recognize(&mut self, _image: &GrayImage) -> Result<Vec<OcrResult>> {
            Ok(normalize_items(self.name(), self.items.iter().cloned().map(Ok)))
        }
    }

    /// Reports the size of the image it was given as its only text item.
    struct SizeEngine;

    impl OcrEngine for SizeEngine {
        fn name(&self) -> &'static str {
            "size"
        }

        fn recognize(&mut self, image: &GrayImage) -> Result<Vec<OcrResult>> {
            let (w, h) = image.dimensions();
            Ok(vec![OcrResult {
                polygon: vec![(0, 0), (w as i32, h as i32)],
                text: format!("{}x{}", w, h),
                confidence: 1.,
            }])
        }
    }

    struct FailingEngine;

    impl OcrEngine for FailingEngine {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn recognize(&mut self, _image: &GrayImage) -> Result<Vec<OcrResult>> {
            Err(anyhow!("engine crashed"))
        }
    }

    fn raw(points: Vec<(f64, f64)>, text: &str, confidence: f64) -> RawTextItem {
        RawTextItem {
            points,
            text: text.to_string(),
            confidence,
        }
    }

    #[test]
    fn coordinates_are_truncated() {
        let result =
            OcrResult::try_from(raw(vec![(10.9, 5.2), (30.99, 5.0)], "MRP 45", 0.93)).unwrap();
        assert_eq!(result.polygon, vec![(10, 5), (30, 5)]);
        assert_eq!(result.text, "MRP 45");
        assert_eq!(result.confidence, 0.93);
    }

    #[test]
    fn invalid_items_are_rejected() {
        assert_eq!(
            OcrResult::try_from(raw(vec![], "x", 0.5)),
            Err(OcrItemError::EmptyPolygon)
        );
        assert!(matches!(
            OcrResult::try_from(raw(vec![(f64::NAN, 1.)], "x", 0.5)),
            Err(OcrItemError::NonFiniteCoordinate(x)) if x.is_nan()
        ));
        assert_eq!(
            OcrResult::try_from(raw(vec![(1., 1.)], "x", 1.5)),
            Err(OcrItemError::InvalidConfidence(1.5))
        );
        assert!(OcrResult::try_from(raw(vec![(1., f64::INFINITY)], "x", 0.5)).is_err());
        assert!(OcrResult::try_from(raw(vec![(1., 1.)], "x", f64::NAN)).is_err());
    }

    #[test]
    fn failed_items_are_skipped_and_order_kept() {
        let items = vec![
            Ok(raw(box_points(0., 0., 10., 5.), "best", 0.9)),
            Err(anyhow!("recognizer failed")),
            Ok(raw(vec![(1., 1.)], "bad", -0.2)),
            Ok(raw(box_points(0., 10., 10., 5.), "before", 0.7)),
        ];
        let results = normalize_items("test", items);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].text, "best");
        assert_eq!(results[1].text, "before");
        assert_eq!(results[1].polygon, vec![(0, 10), (10, 10), (10, 15), (0, 15)]);
    }

    #[test]
    fn every_engine_gets_the_upscaled_image() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("label.png");
        GrayImage::from_fn(20, 16, |x, _| Luma([if x % 4 == 0 { 30 } else { 220 }])).save(&path)?;

        let mut engines: Vec<Box<dyn OcrEngine>> = vec![
            Box::new(SizeEngine),
            Box::new(FixedEngine {
                items: vec![raw(box_points(1., 1., 4., 4.), "crax", 0.8)],
            }),
        ];
        let reports = run_ocr(&mut engines, &path)?;
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].results[0].text, "40x32");
        assert_eq!(reports[1].results[0].text, "crax");
        Ok(())
    }

    #[test]
    fn failing_engine_does_not_hide_other_reports() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("label.png");
        GrayImage::from_pixel(12, 12, Luma([128])).save(&path)?;

        let mut engines: Vec<Box<dyn OcrEngine>> = vec![
            Box::new(FailingEngine),
            Box::new(FixedEngine {
                items: vec![raw(box_points(2., 2., 3., 3.), "price", 0.6)],
            }),
        ];
        let reports = run_ocr(&mut engines, &path)?;
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].engine, "fixed");
        assert_eq!(reports[0].results[0].text, "price");
        Ok(())
    }

    #[test]
    fn unreadable_image_fails_the_call() {
        let mut engines: Vec<Box<dyn OcrEngine>> = vec![Box::new(FailingEngine)];
        assert!(run_ocr(&mut engines, Path::new("does/not/exist.png")).is_err());
    }
}
