use crate::denoise::{self, reflect_101, NlMeansParams};
use crate::polygon::{self, Point};
use anyhow::{Context, Result};
use image::{imageops::FilterType, GrayImage, Luma};
use imageproc::contrast;
use imageproc::filter::separable_filter_equal;
use imageproc::morphology::{grayscale_dilate, grayscale_erode, Mask};
use itertools::Itertools;
use log::debug;
use num_traits::clamp;
use rayon::prelude::*;
use std::path::Path;

pub const SHARPEN_KERNEL: [i32; 9] = [0, -1, 0, -1, 5, -1, 0, -1, 0];
pub const THRESHOLD_BLOCK_SIZE: usize = 31;
pub const THRESHOLD_OFFSET: i32 = 15;
pub const UPSCALE_FACTOR: u32 = 2;
const BICUBIC_A: f64 = -0.75;
const WHITE: u8 = 255;
const BLACK: u8 = 0;

pub fn load_grayscale(file_path: &Path) -> Result<GrayImage> {
    let image = image::open(file_path).with_context(|| {
        format!("Image not found or cannot be read: {}", file_path.display())
    })?;
    Ok(image.to_luma8())
}

/// Conditions an image for OCR. See [`preprocess`] for the stages.
pub fn preprocess_image(file_path: &Path) -> Result<GrayImage> {
    let gray = measure_time!("decode", || load_grayscale(file_path))?;
    Ok(preprocess(&gray))
}

/// Runs the fixed preprocessing chain on an already decoded grayscale image:
/// contrast stretch, sharpening, non-local means denoising, deskew, adaptive
/// gaussian threshold, morphological closing and 2x cubic upscaling.
pub fn preprocess(gray: &GrayImage) -> GrayImage {
    let stretched = measure_time!("contrast stretch", || stretch_contrast(gray));
    let sharp = measure_time!("sharpen", || sharpen(&stretched));
    let denoised = measure_time!("denoise", || {
        denoise::denoise(&sharp, &NlMeansParams::default())
    });
    let (deskewed, angle) = measure_time!("deskew", || deskew(&denoised));
    debug!("deskew rotation {:.3} degrees", angle);
    let binary = measure_time!("adaptive threshold", || {
        adaptive_threshold(&deskewed, THRESHOLD_BLOCK_SIZE, THRESHOLD_OFFSET)
    });
    let closed = measure_time!("closing", || close(&binary));
    measure_time!("upscale", || upscale(&closed, UPSCALE_FACTOR))
}

/// Linear min-max stretch to `0..=255`. A constant image maps to black.
pub fn stretch_contrast(image: &GrayImage) -> GrayImage {
    let (min, max) = match image.pixels().map(|p| p[0]).minmax().into_option() {
        Some(bounds) => bounds,
        None => return image.clone(),
    };
    if min == max {
        return GrayImage::new(image.width(), image.height());
    }
    contrast::stretch_contrast(image, min, max, BLACK, WHITE)
}

/// 3x3 convolution with [`SHARPEN_KERNEL`], mirrored borders and saturation.
pub fn sharpen(image: &GrayImage) -> GrayImage {
    let (w, h) = (i64::from(image.width()), i64::from(image.height()));
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let mut sum = 0;
        for ky in 0..3i64 {
            for kx in 0..3i64 {
                let weight = SHARPEN_KERNEL[(ky * 3 + kx) as usize];
                if weight == 0 {
                    continue;
                }
                let sx = reflect_101(i64::from(x) + kx - 1, w) as u32;
                let sy = reflect_101(i64::from(y) + ky - 1, h) as u32;
                sum += weight * i32::from(image.get_pixel(sx, sy)[0]);
            }
        }
        Luma([clamp(sum, 0, 255) as u8])
    })
}

/// Turns the angle of the minimum-area rectangle (in `[-90, 0)`) into the
/// rotation that straightens the content.
pub fn deskew_angle(rect_angle: f64) -> f64 {
    if rect_angle < -45. {
        -(90. + rect_angle)
    } else {
        -rect_angle
    }
}

/// Angle of the minimum-area rectangle around all non-zero pixels, or `None`
/// when the image has no foreground at all. Points are taken as
/// `(row, column)`, which is the order the angle fold in [`deskew_angle`]
/// expects.
pub fn estimate_skew(image: &GrayImage) -> Option<f64> {
    // the outermost foreground pixels of each row span the same hull as all of them
    let mut points = Vec::new();
    for (y, row) in image.rows().enumerate() {
        let foreground = row.enumerate().filter(|(_, p)| p[0] > 0).map(|(x, _)| x);
        if let Some((first, last)) = foreground.minmax().into_option() {
            points.push(Point::new(y as f64, first as f64));
            if last != first {
                points.push(Point::new(y as f64, last as f64));
            }
        }
    }
    let rect = polygon::min_area_rect(&points)?;
    debug!(
        "foreground rect {:.1}x{:.1} centered at row {:.1}, column {:.1}, angle {:.2}",
        rect.width, rect.height, rect.center.x, rect.center.y, rect.angle
    );
    Some(rect.angle)
}

/// Rotates the image so that its foreground is axis aligned. Returns the
/// rotated image and the applied rotation in degrees.
pub fn deskew(image: &GrayImage) -> (GrayImage, f64) {
    match estimate_skew(image).map(deskew_angle) {
        Some(angle) if angle != 0. => (rotate_about_center(image, angle), angle),
        _ => (image.clone(), 0.),
    }
}

fn cubic_coefficients(t: f64) -> [f64; 4] {
    let a = BICUBIC_A;
    let c0 = ((a * (t + 1.) - 5. * a) * (t + 1.) + 8. * a) * (t + 1.) - 4. * a;
    let c1 = ((a + 2.) * t - (a + 3.)) * t * t + 1.;
    let c2 = ((a + 2.) * (1. - t) - (a + 3.)) * (1. - t) * (1. - t) + 1.;
    [c0, c1, c2, 1. - c0 - c1 - c2]
}

fn sample_bicubic(image: &GrayImage, sx: f64, sy: f64) -> u8 {
    let (w, h) = (i64::from(image.width()), i64::from(image.height()));
    let (x0, y0) = (sx.floor(), sy.floor());
    let cx = cubic_coefficients(sx - x0);
    let cy = cubic_coefficients(sy - y0);
    let (x0, y0) = (x0 as i64, y0 as i64);
    let mut value = 0.;
    for (j, wy) in cy.iter().enumerate() {
        let py = clamp(y0 + j as i64 - 1, 0, h - 1) as u32;
        for (i, wx) in cx.iter().enumerate() {
            let px = clamp(x0 + i as i64 - 1, 0, w - 1) as u32;
            value += wx * wy * f64::from(image.get_pixel(px, py)[0]);
        }
    }
    clamp(value.round(), 0., 255.) as u8
}

/// Rotates counter-clockwise by `angle` degrees around `(w / 2, h / 2)` with
/// bicubic interpolation. Pixels mapped from outside the source repeat the
/// nearest edge pixel.
pub fn rotate_about_center(image: &GrayImage, angle: f64) -> GrayImage {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return image.clone();
    }
    let cx = f64::from(width / 2);
    let cy = f64::from(height / 2);
    let (sin, cos) = angle.to_radians().sin_cos();
    // inverse mapping: destination pixel -> source position
    let m = [
        [cos, -sin, (1. - cos) * cx + sin * cy],
        [sin, cos, -sin * cx + (1. - cos) * cy],
    ];

    let mut raw = vec![0u8; (width * height) as usize];
    raw.par_chunks_mut(width as usize)
        .enumerate()
        .for_each(|(y, row)| {
            let y = y as f64;
            for (x, pixel) in row.iter_mut().enumerate() {
                let x = x as f64;
                let sx = m[0][0] * x + m[0][1] * y + m[0][2];
                let sy = m[1][0] * x + m[1][1] * y + m[1][2];
                *pixel = sample_bicubic(image, sx, sy);
            }
        });
    GrayImage::from_raw(width, height, raw).unwrap_or_else(|| image.clone())
}

fn gaussian_kernel(size: usize) -> Vec<f32> {
    let sigma = 0.3 * ((size as f32 - 1.) * 0.5 - 1.) + 0.8;
    let radius = (size / 2) as f32;
    let kernel = (0..size)
        .map(|i| (-(i as f32 - radius).powi(2) / (2. * sigma * sigma)).exp())
        .collect::<Vec<f32>>();
    let total: f32 = kernel.iter().sum();
    kernel.into_iter().map(|k| k / total).collect()
}

/// Binarizes against a gaussian weighted neighbourhood mean (`block_size`
/// taps, replicated borders): a pixel turns white when it is brighter than
/// `mean - offset`.
pub fn adaptive_threshold(image: &GrayImage, block_size: usize, offset: i32) -> GrayImage {
    if image.width() == 0 || image.height() == 0 {
        return image.clone();
    }
    let mean = separable_filter_equal(image, &gaussian_kernel(block_size));
    let mut out = image.clone();
    for (pixel, m) in out.pixels_mut().zip(mean.pixels()) {
        pixel[0] = if i32::from(pixel[0]) - i32::from(m[0]) > -offset {
            WHITE
        } else {
            BLACK
        };
    }
    out
}

/// Morphological closing with a 2x2 square.
///
/// `grayscale_close` applies the same offsets in both passes, which moves
/// content of an even-sized element one pixel down and right. The erosion
/// uses the mirrored anchor so the result stays in place.
pub fn close(image: &GrayImage) -> GrayImage {
    let square = GrayImage::from_pixel(2, 2, Luma([WHITE]));
    let dilated = grayscale_dilate(image, &Mask::from_image(&square, 1, 1));
    grayscale_erode(&dilated, &Mask::from_image(&square, 0, 0))
}

pub fn upscale(image: &GrayImage, factor: u32) -> GrayImage {
    image::imageops::resize(
        image,
        image.width() * factor,
        image.height() * factor,
        FilterType::CatmullRom,
    )
}
