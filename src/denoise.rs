use image::{GrayImage, Luma};
use rayon::prelude::*;

#[derive(Debug, Clone, Copy)]
pub struct NlMeansParams {
    /// Filter strength. Larger values remove more noise and more detail.
    pub h: f64,
    pub template_window: usize,
    pub search_window: usize,
}

impl Default for NlMeansParams {
    fn default() -> Self {
        Self {
            h: 20.,
            template_window: 7,
            search_window: 21,
        }
    }
}

/// Maps an out-of-range index back into `0..n` by mirroring around the edge
/// pixel (`dcb|abcd|cba`).
pub fn reflect_101(i: i64, n: i64) -> usize {
    if n == 1 {
        return 0;
    }
    let mut i = i;
    loop {
        if i < 0 {
            i = -i;
        } else if i >= n {
            i = 2 * n - 2 - i;
        } else {
            return i as usize;
        }
    }
}

/// Non-local means denoising of a grayscale image.
///
/// Every pixel becomes the weighted mean of the pixels in its search window,
/// weighted by `exp(-d / h^2)` where `d` is the mean squared difference of the
/// two template patches. Patch distances are evaluated one search offset at a
/// time through an integral image of squared differences.
pub fn denoise(image: &GrayImage, params: &NlMeansParams) -> GrayImage {
    let (width, height) = (image.width() as usize, image.height() as usize);
    if width == 0 || height == 0 {
        return image.clone();
    }
    let t = (params.template_window / 2) as i64;
    let s = (params.search_window / 2) as i64;
    let border = t + s;
    let padded_w = width + 2 * border as usize;
    let padded_h = height + 2 * border as usize;

    let padded: Vec<f64> = (0..padded_h as i64)
        .flat_map(|py| {
            let y = reflect_101(py - border, height as i64) as u32;
            (0..padded_w as i64).map(move |px| {
                let x = reflect_101(px - border, width as i64) as u32;
                f64::from(image.get_pixel(x, y)[0])
            })
        })
        .collect();

    // every template patch of the image lies inside this region of `padded`
    let region_w = width + 2 * t as usize;
    let region_h = height + 2 * t as usize;
    let stride = region_w + 1;
    let patch = (2 * t + 1) as usize;
    let patch_area = (patch * patch) as f64;
    let h2 = params.h * params.h;

    let mut integral = vec![0f64; stride * (region_h + 1)];
    let mut acc = vec![(0f64, 0f64); width * height];

    for dy in -s..=s {
        for dx in -s..=s {
            for ry in 0..region_h {
                let src_row = (ry as i64 + s) as usize * padded_w;
                let dst_row = (ry as i64 + s + dy) as usize * padded_w;
                let mut row_sum = 0.;
                for rx in 0..region_w {
                    let p = padded[src_row + (rx as i64 + s) as usize];
                    let q = padded[dst_row + (rx as i64 + s + dx) as usize];
                    row_sum += (p - q) * (p - q);
                    integral[(ry + 1) * stride + rx + 1] = integral[ry * stride + rx + 1] + row_sum;
                }
            }

            let integral = &integral;
            let padded = &padded;
            acc.par_chunks_mut(width).enumerate().for_each(|(y, row)| {
                let top = y * stride;
                let bottom = (y + patch) * stride;
                let neighbour_row = (y as i64 + border + dy) as usize * padded_w;
                for (x, (value_sum, weight_sum)) in row.iter_mut().enumerate() {
                    let ssd = integral[bottom + x + patch] - integral[top + x + patch]
                        - integral[bottom + x]
                        + integral[top + x];
                    let weight = (-(ssd.max(0.) / patch_area) / h2).exp();
                    let neighbour = padded[neighbour_row + (x as i64 + border + dx) as usize];
                    *value_sum += weight * neighbour;
                    *weight_sum += weight;
                }
            });
        }
    }

    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let (value_sum, weight_sum) = acc[y as usize * width + x as usize];
        Luma([(value_sum / weight_sum).round().clamp(0., 255.) as u8])
    })
}
