// Raster cleanup ahead of recognition
use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::contours::{find_contours, BorderType, Contour};
use imageproc::contrast::{otsu_level, threshold, ThresholdType};
use imageproc::distance_transform::Norm;
use imageproc::morphology;
use rayon::prelude::*;
use tracing::debug;

/// Hue/saturation/value band on the OpenCV scale (hue 0-180, s/v 0-255).
#[derive(Debug, Copy, Clone)]
struct HsvBand {
    low: [u8; 3],
    high: [u8; 3],
}

impl HsvBand {
    fn contains(&self, hsv: [u8; 3]) -> bool {
        (0..3).all(|i| hsv[i] >= self.low[i] && hsv[i] <= self.high[i])
    }
}

const PINK: HsvBand = HsvBand { low: [140, 50, 50], high: [170, 255, 255] };
const BLUE: HsvBand = HsvBand { low: [90, 50, 50], high: [130, 255, 255] };

// 15x15 rectangular closing kernel
const CLOSE_RADIUS: u8 = 7;

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

fn rgb_to_hsv(Rgb([r, g, b]): Rgb<u8>) -> [u8; 3] {
    let (r, g, b) = (r as f32, g as f32, b as f32);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let s = if max > 0.0 { delta / max * 255.0 } else { 0.0 };
    let h = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * (g - b) / delta
    } else if max == g {
        120.0 + 60.0 * (b - r) / delta
    } else {
        240.0 + 60.0 * (r - g) / delta
    };
    let h = if h < 0.0 { h + 360.0 } else { h };

    [(h / 2.0).round() as u8 % 180, s.round() as u8, max as u8]
}

fn color_mask(image: &RgbImage) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let hsv = rgb_to_hsv(*image.get_pixel(x, y));
        if PINK.contains(hsv) || BLUE.contains(hsv) {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

fn contour_area(contour: &Contour<u32>) -> f64 {
    let pts = &contour.points;
    if pts.len() < 3 {
        return 0.0;
    }
    let twice: f64 = pts
        .iter()
        .zip(pts.iter().cycle().skip(1))
        .map(|(a, b)| a.x as f64 * b.y as f64 - b.x as f64 * a.y as f64)
        .sum();
    twice.abs() / 2.0
}

/// Left edge of the largest pink/blue outer contour, if any.
pub fn decorative_region_left_edge(image: &RgbImage) -> Option<u32> {
    let mask = morphology::close(&color_mask(image), Norm::LInf, CLOSE_RADIUS);
    let contours = find_contours::<u32>(&mask);

    let largest = contours
        .iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .filter(|c| !c.points.is_empty())
        .max_by(|a, b| contour_area(a).total_cmp(&contour_area(b)))?;

    largest.points.iter().map(|p| p.x).min()
}

/// White out everything at or right of the decorative band's left edge.
///
/// Leaves the image untouched when no pink or blue region is found.
pub fn remove_decorative_region(image: &mut RgbImage) -> bool {
    let Some(left) = decorative_region_left_edge(image) else {
        debug!("no decorative region found, page left as is");
        return false;
    };
    debug!(left, width = image.width(), "whitening decorative region");
    for y in 0..image.height() {
        for x in left..image.width() {
            image.put_pixel(x, y, WHITE);
        }
    }
    true
}

// Rows per denoising band; each band owns its own integral buffer.
const BAND_ROWS: usize = 64;

// Weights below this are treated as zero.
const MIN_WEIGHT: f32 = 1e-4;

/// Grayscale image with replicated borders, so shifted reads never clamp.
struct PaddedImage {
    data: Vec<u8>,
    stride: usize,
    pad: usize,
}

impl PaddedImage {
    fn new(image: &GrayImage, pad: usize) -> Self {
        let (w, h) = (image.width() as usize, image.height() as usize);
        let stride = w + 2 * pad;
        let mut data = Vec::with_capacity(stride * (h + 2 * pad));
        for py in 0..h + 2 * pad {
            let y = py.saturating_sub(pad).min(h - 1) as u32;
            for px in 0..stride {
                let x = px.saturating_sub(pad).min(w - 1) as u32;
                data.push(image.get_pixel(x, y)[0]);
            }
        }
        Self { data, stride, pad }
    }

    /// Pixel at image coordinates offset by `(dx, dy)`; `|dx|, |dy| <= pad`.
    #[inline]
    fn at(&self, x: usize, y: usize, dx: isize, dy: isize) -> u8 {
        let px = (x + self.pad).wrapping_add_signed(dx);
        let py = (y + self.pad).wrapping_add_signed(dy);
        self.data[py * self.stride + px]
    }
}

/// `exp(-d / h^2)` for every integer mean patch distance `d` with a usable weight.
fn weight_table(h: f32) -> Vec<f32> {
    let h2 = h * h;
    let len = (h2 * -MIN_WEIGHT.ln()).ceil() as usize + 1;
    (0..len).map(|d| (-(d as f32) / h2).exp()).collect()
}

/// Non-local means denoising with a square template and search window.
///
/// Rows are processed in independent bands across the rayon pool. Within a
/// band, patch distances for each search offset come from an integral image
/// of squared differences, so the cost per offset is constant per pixel.
pub fn denoise_nl_means(image: &GrayImage, h: f32, template_window: u32, search_window: u32) -> GrayImage {
    let (w, hgt) = (image.width() as usize, image.height() as usize);
    if w == 0 || hgt == 0 || h <= 0.0 {
        return image.clone();
    }
    let tr = (template_window / 2) as usize;
    let sr = (search_window / 2) as usize;
    let padded = PaddedImage::new(image, tr + sr);
    let weights = weight_table(h);

    let mut out = vec![0u8; w * hgt];
    out.par_chunks_mut(BAND_ROWS * w)
        .enumerate()
        .for_each(|(band, rows)| denoise_band(&padded, &weights, w, tr, sr, band * BAND_ROWS, rows));

    GrayImage::from_raw(image.width(), image.height(), out).unwrap_or_else(|| image.clone())
}

fn denoise_band(
    padded: &PaddedImage,
    weights: &[f32],
    w: usize,
    tr: usize,
    sr: usize,
    y_start: usize,
    out: &mut [u8],
) {
    let rows = out.len() / w;
    let side = 2 * tr + 1;
    let patch_len = (side * side) as u64;
    let (tr_i, sr_i) = (tr as isize, sr as isize);

    // integral cell (gx, gy) covers band pixels up to (gx - 1 - tr, gy - 1 - tr)
    let iw = w + side;
    let ih = rows + side;
    let mut integral = vec![0u64; iw * ih];
    let mut weight_sum = vec![0f32; rows * w];
    let mut value_sum = vec![0f32; rows * w];

    for dy in -sr_i..=sr_i {
        for dx in -sr_i..=sr_i {
            for gy in 1..ih {
                let y = y_start + gy - 1;
                let mut row = 0u64;
                for gx in 1..iw {
                    // band-relative patch origin sits tr above and left of the pixel
                    let a = padded.at(gx - 1, y, -tr_i, -tr_i) as i32;
                    let b = padded.at(gx - 1, y, dx - tr_i, dy - tr_i) as i32;
                    let d = a - b;
                    row += (d * d) as u64;
                    integral[gy * iw + gx] = integral[(gy - 1) * iw + gx] + row;
                }
            }
            for y in 0..rows {
                for x in 0..w {
                    let sum = integral[(y + side) * iw + x + side] + integral[y * iw + x]
                        - integral[y * iw + x + side]
                        - integral[(y + side) * iw + x];
                    let Some(&weight) = weights.get((sum / patch_len) as usize) else {
                        continue;
                    };
                    let idx = y * w + x;
                    weight_sum[idx] += weight;
                    value_sum[idx] += weight * padded.at(x, y_start + y, dx, dy) as f32;
                }
            }
        }
    }

    for (idx, px) in out.iter_mut().enumerate() {
        // the zero offset always contributes weight 1
        *px = (value_sum[idx] / weight_sum[idx]).round().clamp(0.0, 255.0) as u8;
    }
}

/// Global Otsu binarization to pure black/white.
pub fn binarize_otsu(image: &GrayImage) -> GrayImage {
    let level = otsu_level(image);
    debug!(level, "otsu threshold");
    threshold(image, level, ThresholdType::Binary)
}

/// Grayscale, denoise, binarize: the input the recognizer sees.
pub fn prepare_for_recognition(image: &RgbImage, denoise_strength: f32) -> GrayImage {
    let gray = image::imageops::grayscale(image);
    let denoised = denoise_nl_means(&gray, denoise_strength, 7, 21);
    binarize_otsu(&denoised)
}
