use super::Detection;
use image::{imageops, imageops::FilterType, Rgb, RgbImage};
use itertools::Itertools;
use num_traits::clamp;
use std::cmp::Ordering;

pub const INPUT_SIZE: u32 = 640;
pub const PAD_VALUE: u8 = 114;

/// Square model input with the transform needed to map boxes back onto the
/// source image.
#[derive(Debug)]
pub struct Letterbox {
    /// Planar RGB in [0, 1], `3 * size * size` values.
    pub data: Vec<f32>,
    pub size: u32,
    pub scale: f32,
    pub pad: (f32, f32),
}

/// Resizes keeping the aspect ratio and centers the result on a padded square.
pub fn letterbox(image: &RgbImage, size: u32) -> Letterbox {
    let (width, height) = image.dimensions();
    let scale = (size as f32 / width as f32).min(size as f32 / height as f32);
    let new_w = ((width as f32 * scale).round() as u32).clamp(1, size);
    let new_h = ((height as f32 * scale).round() as u32).clamp(1, size);
    let left = (size - new_w) / 2;
    let top = (size - new_h) / 2;

    let mut canvas = RgbImage::from_pixel(size, size, Rgb([PAD_VALUE; 3]));
    let resized = imageops::resize(image, new_w, new_h, FilterType::Triangle);
    imageops::replace(&mut canvas, &resized, i64::from(left), i64::from(top));

    let plane = (size * size) as usize;
    let mut data = vec![0f32; 3 * plane];
    for (x, y, pixel) in canvas.enumerate_pixels() {
        let idx = (y * size + x) as usize;
        for c in 0..3 {
            data[c * plane + idx] = f32::from(pixel[c]) / 255.;
        }
    }

    Letterbox {
        data,
        size,
        scale,
        pad: (left as f32, top as f32),
    }
}

/// Decodes a `[4 + nc, anchors]` prediction matrix (center box followed by
/// per-class scores) into boxes in letterbox coordinates. Only the best class
/// of each anchor is considered.
pub fn decode_predictions(
    output: &[f32],
    num_anchors: usize,
    conf_threshold: f32,
) -> Vec<Detection> {
    if num_anchors == 0 || output.len() % num_anchors != 0 || output.len() / num_anchors <= 4 {
        return Vec::new();
    }
    let num_classes = output.len() / num_anchors - 4;
    let at = |row: usize, anchor: usize| output[row * num_anchors + anchor];

    (0..num_anchors)
        .filter_map(|anchor| {
            let (class_id, confidence) = (0..num_classes)
                .map(|c| (c, at(4 + c, anchor)))
                .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal))?;
            if !(confidence >= conf_threshold) {
                return None;
            }
            let (cx, cy, w, h) = (at(0, anchor), at(1, anchor), at(2, anchor), at(3, anchor));
            Some(Detection {
                x1: cx - w / 2.,
                y1: cy - h / 2.,
                x2: cx + w / 2.,
                y2: cy + h / 2.,
                confidence,
                class_id,
            })
        })
        .collect()
}

pub fn iou(a: &Detection, b: &Detection) -> f32 {
    let inter_w = (a.x2.min(b.x2) - a.x1.max(b.x1)).max(0.);
    let inter_h = (a.y2.min(b.y2) - a.y1.max(b.y1)).max(0.);
    let inter = inter_w * inter_h;
    let union = a.area() + b.area() - inter;
    if union <= 0. {
        0.
    } else {
        inter / union
    }
}

/// Greedy per-class non-maximum suppression. The result is ordered by
/// descending confidence and holds at most `max_detections` boxes.
pub fn non_max_suppression(
    detections: Vec<Detection>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<Detection> {
    let mut kept: Vec<Detection> = Vec::new();
    for candidate in detections.into_iter().sorted_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
    }) {
        if kept.len() >= max_detections {
            break;
        }
        let suppressed = kept
            .iter()
            .any(|k| k.class_id == candidate.class_id && iou(k, &candidate) > iou_threshold);
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}

/// Maps letterbox boxes back onto a `width` x `height` source image.
pub fn rescale(detections: &mut [Detection], letterbox: &Letterbox, width: u32, height: u32) {
    let (pad_x, pad_y) = letterbox.pad;
    let (max_x, max_y) = (width as f32, height as f32);
    for det in detections.iter_mut() {
        det.x1 = clamp((det.x1 - pad_x) / letterbox.scale, 0., max_x);
        det.x2 = clamp((det.x2 - pad_x) / letterbox.scale, 0., max_x);
        det.y1 = clamp((det.y1 - pad_y) / letterbox.scale, 0., max_y);
        det.y2 = clamp((det.y2 - pad_y) / letterbox.scale, 0., max_y);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    #[test]
    fn letterbox_pads_the_short_side() {
        let image = RgbImage::from_pixel(200, 100, Rgb([255, 0, 0]));
        let lb = letterbox(&image, 64);
        assert_eq!(lb.scale, 0.32);
        assert_eq!(lb.pad, (0., 16.));
        assert_eq!(lb.data.len(), 3 * 64 * 64);
        let plane = 64 * 64;
        // top padding row
        assert!((lb.data[0] - 114. / 255.).abs() < 1e-6);
        // image center is red
        let center = 32 * 64 + 32;
        assert!(lb.data[center] > 0.99);
        assert!(lb.data[plane + center] < 0.01);
    }

    #[test]
    fn decodes_best_class_above_threshold() {
        // 3 anchors, 2 classes, row major [6, 3]
        let output = vec![
            10., 50., 0., // cx
            10., 50., 0., // cy
            4., 20., 2., // w
            6., 10., 2., // h
            0.9, 0.1, 0.2, // class 0
            0.3, 0.6, 0.1, // class 1
        ];
        let dets = decode_predictions(&output, 3, 0.25);
        assert_eq!(dets.len(), 2);
        assert_eq!(dets[0], det(8., 7., 12., 13., 0.9, 0));
        assert_eq!(dets[1], det(40., 45., 60., 55., 0.6, 1));
    }

    #[test]
    fn malformed_output_decodes_to_nothing() {
        assert!(decode_predictions(&[1., 2., 3.], 2, 0.1).is_empty());
        assert!(decode_predictions(&[1., 2., 3., 4.], 1, 0.1).is_empty());
        assert!(decode_predictions(&[], 0, 0.1).is_empty());
    }

    #[test]
    fn nms_is_per_class() {
        let dets = vec![
            det(0., 0., 10., 10., 0.8, 0),
            det(1., 1., 10., 10., 0.9, 0),
            det(0., 0., 10., 10., 0.7, 1),
            det(20., 20., 30., 30., 0.5, 0),
        ];
        let kept = non_max_suppression(dets, 0.7, 300);
        assert_eq!(kept.len(), 3);
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[1].class_id, 1);
        assert_eq!(kept[2].confidence, 0.5);
    }

    #[test]
    fn nms_caps_detection_count() {
        let dets = (0..10)
            .map(|i| det(i as f32 * 20., 0., i as f32 * 20. + 10., 10., 0.5, 0))
            .collect();
        assert_eq!(non_max_suppression(dets, 0.7, 4).len(), 4);
    }

    #[test]
    fn rescale_undoes_letterbox_and_clips() {
        let image = RgbImage::new(200, 100);
        let lb = letterbox(&image, 64);
        let mut dets = vec![det(0., 16., 32., 32., 0.5, 0), det(-5., 0., 70., 64., 0.5, 0)];
        rescale(&mut dets, &lb, 200, 100);
        let close = |a: f32, b: f32| (a - b).abs() < 1e-3;
        assert!(close(dets[0].x1, 0.) && close(dets[0].y1, 0.));
        assert!(close(dets[0].x2, 100.) && close(dets[0].y2, 50.));
        assert_eq!(dets[1], det(0., 0., 200., 100., 0.5, 0));
    }
}
