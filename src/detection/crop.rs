use super::annotate::Annotator;
use super::options::DetectionOptions;
use crate::classes::ClassTable;
use anyhow::{Context, Result};
use image::{GenericImageView, RgbImage};
use log::{debug, info, warn};
use std::fs;
use std::path::PathBuf;

/// Axis aligned box in source image pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
    pub class_id: usize,
}

impl Detection {
    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.) * (self.y2 - self.y1).max(0.)
    }
}

pub trait Detector {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>>;
}

/// Integer pixel region of a detection inside a `width` x `height` image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRegion {
    /// Truncates the box to integers and clips it to the image. Returns
    /// `None` when nothing is left.
    pub fn from_detection(det: &Detection, width: u32, height: u32) -> Option<Self> {
        let clip = |v: f32, max: u32| (v as i64).max(0).min(i64::from(max)) as u32;
        let (x1, x2) = (clip(det.x1, width), clip(det.x2, width));
        let (y1, y2) = (clip(det.y1, height), clip(det.y2, height));
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some(Self {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
        })
    }
}

/// Rounds up to two decimals.
pub fn round_confidence(confidence: f32) -> f32 {
    (confidence * 100.).ceil() / 100.
}

pub fn crop_file_name(class_name: &str, counter: usize, confidence: f32) -> String {
    format!("{}_{}_conf{:.2}.jpg", class_name, counter, confidence)
}

#[derive(Debug, Clone, PartialEq)]
pub struct SavedCrop {
    pub path: PathBuf,
    pub class_name: String,
    pub confidence: f32,
}

#[derive(Debug)]
pub struct DetectionReport {
    pub detections: usize,
    pub crops: Vec<SavedCrop>,
    pub annotated_image: PathBuf,
}

/// Runs the detector on one image, saves a crop per non-empty box and the
/// annotated image.
pub fn run_detection(
    detector: &mut dyn Detector,
    classes: &ClassTable,
    annotator: &Annotator,
    opts: &DetectionOptions,
) -> Result<DetectionReport> {
    let image = image::open(&opts.image_path)
        .with_context(|| format!("Could not read image {}", opts.image_path.display()))?
        .to_rgb8();
    let (width, height) = image.dimensions();
    let detections = measure_time!("Detection", || detector.detect(&image), log::Level::Info)?;
    info!("{} detections in {}", detections.len(), opts.image_path.display());

    fs::create_dir_all(&opts.crops_dir)
        .with_context(|| format!("Could not create {}", opts.crops_dir.display()))?;

    let mut annotated = image.clone();
    let mut crops = Vec::new();
    for det in &detections {
        let class_name = classes.name_for(det.class_id);
        let confidence = round_confidence(det.confidence);
        let (x1, y1) = (det.x1 as i32, det.y1 as i32);
        let (w, h) = ((det.x2 as i32 - x1).max(0), (det.y2 as i32 - y1).max(0));
        annotator.corner_rect(&mut annotated, x1, y1, w as u32, h as u32);
        annotator.put_text_rect(
            &mut annotated,
            &format!("{} {:.2}", class_name, confidence),
            x1,
            y1,
        );

        let region = match CropRegion::from_detection(det, width, height) {
            Some(region) => region,
            None => {
                debug!("Skipping empty crop for {} at {:?}", class_name, det);
                continue;
            }
        };
        let crop = image
            .view(region.x, region.y, region.width, region.height)
            .to_image();
        let path = opts
            .crops_dir
            .join(crop_file_name(&class_name, crops.len() + 1, confidence));
        crop.save(&path)
            .with_context(|| format!("Could not save crop {}", path.display()))?;
        info!("Saved cropped image: {}", path.display());
        crops.push(SavedCrop {
            path,
            class_name,
            confidence,
        });
    }

    if let Some(parent) = opts.output_image.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    annotated
        .save(&opts.output_image)
        .with_context(|| format!("Could not save {}", opts.output_image.display()))?;
    if crops.len() < detections.len() {
        warn!(
            "{} of {} detections had no area and were not cropped",
            detections.len() - crops.len(),
            detections.len()
        );
    }
    info!(
        "Cropped {} detected sections to {}, annotated image saved as {}",
        crops.len(),
        opts.crops_dir.display(),
        opts.output_image.display()
    );

    Ok(DetectionReport {
        detections: detections.len(),
        crops,
        annotated_image: opts.output_image.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use tempfile::TempDir;

    struct FixedDetector(Vec<Detection>);

    impl Detector for FixedDetector {
        fn detect(&mut self, _image: &RgbImage) -> Result<Vec<Detection>> {
            Ok(self.0.clone())
        }
    }

    fn det(x1: f32, y1: f32, x2: f32, y2: f32, confidence: f32, class_id: usize) -> Detection {
        Detection {
            x1,
            y1,
            x2,
            y2,
            confidence,
            class_id,
        }
    }

    fn options(dir: &TempDir) -> Result<DetectionOptions> {
        let image_path = dir.path().join("label.png");
        RgbImage::from_fn(120, 80, |x, y| Rgb([x as u8, y as u8, 90])).save(&image_path)?;
        Ok(DetectionOptions {
            image_path,
            output_image: dir.path().join("out").join("result.jpg"),
            crops_dir: dir.path().join("crops"),
            ..DetectionOptions::default()
        })
    }

    #[test]
    fn confidence_rounds_up() {
        assert_eq!(round_confidence(0.912), 0.92);
        assert_eq!(round_confidence(0.5), 0.5);
        assert_eq!(crop_file_name("barcode", 3, round_confidence(0.876)), "barcode_3_conf0.88.jpg");
    }

    #[test]
    fn crop_region_is_truncated_and_clipped() {
        assert_eq!(
            CropRegion::from_detection(&det(10.7, 5.2, 40.9, 30.1, 0.5, 0), 100, 100),
            Some(CropRegion {
                x: 10,
                y: 5,
                width: 30,
                height: 25
            })
        );
        assert_eq!(
            CropRegion::from_detection(&det(-4., -2., 150., 90., 0.5, 0), 100, 50),
            Some(CropRegion {
                x: 0,
                y: 0,
                width: 100,
                height: 50
            })
        );
        assert_eq!(CropRegion::from_detection(&det(10., 5., 10.9, 30., 0.5, 0), 100, 100), None);
        assert_eq!(CropRegion::from_detection(&det(120., 5., 130., 30., 0.5, 0), 100, 100), None);
    }

    #[test]
    fn empty_boxes_do_not_advance_the_counter() -> Result<()> {
        let dir = TempDir::new()?;
        let opts = options(&dir)?;
        let mut detector = FixedDetector(vec![
            det(10., 10., 50., 40., 0.913, 1),
            det(30., 30., 30., 60., 0.8, 2),
            det(60., 20., 100., 70., 0.456, 40),
        ]);
        let report = run_detection(
            &mut detector,
            &ClassTable::default(),
            &Annotator::without_font(),
            &opts,
        )?;

        assert_eq!(report.detections, 3);
        let names = report
            .crops
            .iter()
            .map(|c| c.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect::<Vec<String>>();
        assert_eq!(
            names,
            vec!["barcode_1_conf0.92.jpg", "Unknown_Class_40_2_conf0.46.jpg"]
        );
        for crop in &report.crops {
            assert!(crop.path.exists());
        }
        assert!(opts.output_image.exists());
        assert_eq!(fs::read_dir(&opts.crops_dir)?.count(), 2);

        let first = image::open(&report.crops[0].path)?;
        assert_eq!((first.width(), first.height()), (40, 30));
        Ok(())
    }

    #[test]
    fn crops_come_from_the_unannotated_image() -> Result<()> {
        let dir = TempDir::new()?;
        let mut opts = options(&dir)?;
        opts.crops_dir = dir.path().join("png_crops");
        let source = image::open(&opts.image_path)?.to_rgb8();
        let mut detector = FixedDetector(vec![det(0., 0., 60., 60., 0.99, 0)]);
        let report = run_detection(
            &mut detector,
            &ClassTable::default(),
            &Annotator::without_font(),
            &opts,
        )?;
        let crop = image::open(&report.crops[0].path)?.to_rgb8();
        // corner accent color would be pure green
        let px = crop.get_pixel(2, 2);
        let expected = source.get_pixel(2, 2);
        assert!((i32::from(px[1]) - i32::from(expected[1])).abs() < 40);
        Ok(())
    }

    #[test]
    fn unreadable_image_is_an_error() {
        let opts = DetectionOptions {
            image_path: PathBuf::from("missing/image.jpg"),
            ..DetectionOptions::default()
        };
        let mut detector = FixedDetector(vec![]);
        assert!(run_detection(
            &mut detector,
            &ClassTable::default(),
            &Annotator::without_font(),
            &opts
        )
        .is_err());
    }
}
