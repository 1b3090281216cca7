use std::path::Path;

use image::{
    imageops::{self, FilterType},
    GrayImage,
};

use crate::params::WindowSize;

/// Zero-padded integral image: entry `(x, y)` holds the sum of every pixel
/// strictly above and to the left, so the table is `(w + 1) x (h + 1)`.
#[derive(Debug, Clone)]
pub struct IntegralImage {
    sum: Vec<i64>,
    sq_sum: Vec<f64>,
    tilted: Option<Vec<i64>>,
    width: usize,
    height: usize,
}

impl IntegralImage {
    /// Creates an integral image from an image
    pub fn new(img: &GrayImage) -> Self {
        let w = img.width() as usize;
        let h = img.height() as usize;
        let stride = w + 1;
        let mut sum = vec![0i64; stride * (h + 1)];
        let mut sq_sum = vec![0f64; stride * (h + 1)];

        for y in 0..h {
            let mut row = 0i64;
            let mut row_sq = 0f64;
            for x in 0..w {
                let pixel = i64::from(img.get_pixel(x as u32, y as u32)[0]);
                row += pixel;
                row_sq += (pixel * pixel) as f64;
                sum[(y + 1) * stride + x + 1] = sum[y * stride + x + 1] + row;
                sq_sum[(y + 1) * stride + x + 1] = sq_sum[y * stride + x + 1] + row_sq;
            }
        }

        Self {
            sum,
            sq_sum,
            tilted: None,
            width: w,
            height: h,
        }
    }

    /// Same as [`IntegralImage::new`] plus the 45-degree rotated table.
    ///
    /// `tilted(X, Y)` is the sum of pixels `(x, y)` with `y < Y` and
    /// `|x - X + 1| <= Y - y - 1`.
    pub fn with_tilted(img: &GrayImage) -> Self {
        let mut ii = Self::new(img);
        let (w, h) = (ii.width, ii.height);
        let stride = w + 1;

        // Row prefix sums make every triangle row an O(1) lookup.
        let mut rows = vec![0i64; stride * h];
        for y in 0..h {
            for x in 0..w {
                rows[y * stride + x + 1] =
                    rows[y * stride + x] + i64::from(img.get_pixel(x as u32, y as u32)[0]);
            }
        }

        let mut tilted = vec![0i64; stride * (h + 1)];
        for big_y in 1..=h {
            for big_x in 0..=w {
                let centre = big_x as i64 - 1;
                let mut acc = 0i64;
                for y in 0..big_y {
                    let reach = (big_y - y - 1) as i64;
                    let lo = (centre - reach).max(0);
                    let hi = (centre + reach).min(w as i64 - 1);
                    if lo <= hi {
                        acc += rows[y * stride + hi as usize + 1] - rows[y * stride + lo as usize];
                    }
                }
                tilted[big_y * stride + big_x] = acc;
            }
        }
        ii.tilted = Some(tilted);
        ii
    }

    pub fn width(&self) -> usize { self.width }

    pub fn height(&self) -> usize { self.height }

    #[inline]
    fn at(&self, x: usize, y: usize) -> usize { y * (self.width + 1) + x }

    /// Sum of the pixels of an upright rectangle.
    pub fn rect_sum(&self, x: usize, y: usize, w: usize, h: usize) -> i64 {
        self.sum[self.at(x, y)] - self.sum[self.at(x + w, y)] - self.sum[self.at(x, y + h)]
            + self.sum[self.at(x + w, y + h)]
    }

    /// Sum of the squared pixels of an upright rectangle.
    pub fn rect_sq_sum(&self, x: usize, y: usize, w: usize, h: usize) -> f64 {
        self.sq_sum[self.at(x, y)] - self.sq_sum[self.at(x + w, y)]
            - self.sq_sum[self.at(x, y + h)]
            + self.sq_sum[self.at(x + w, y + h)]
    }

    /// Sum over a rectangle rotated by 45 degrees whose top corner is
    /// `(x, y)`; `x >= h` is required. Zero when the tilted table was not built.
    pub fn tilted_sum(&self, x: usize, y: usize, w: usize, h: usize) -> i64 {
        let Some(t) = &self.tilted else { return 0 };
        t[self.at(x, y)] - t[self.at(x - h, y + h)] - t[self.at(x + w, y + w)]
            + t[self.at(x + w - h, y + w + h)]
    }
}

/// Padded integral of a float plane laid out row-major with width `w`.
pub fn integrate_f32(values: &[f32], w: usize, h: usize) -> Vec<f32> {
    let stride = w + 1;
    let mut out = vec![0f32; stride * (h + 1)];
    for y in 0..h {
        let mut row = 0f32;
        for x in 0..w {
            row += values[y * w + x];
            out[(y + 1) * stride + x + 1] = out[y * stride + x + 1] + row;
        }
    }
    out
}

/// Opens an image file and converts it to 8-bit grayscale.
pub fn load_gray(path: &Path) -> image::ImageResult<GrayImage> {
    Ok(image::open(path)?.into_luma8())
}

/// Resizes (and crops) an image so that it exactly covers the window.
pub fn fit_to_window(img: &GrayImage, window: WindowSize) -> GrayImage {
    if img.dimensions() == (window.width, window.height) {
        return img.clone();
    }
    image::DynamicImage::ImageLuma8(img.clone())
        .resize_to_fill(window.width, window.height, FilterType::Triangle)
        .into_luma8()
}

/// Scales an image by `factor` (rounded to the nearest pixel).
pub fn scale(img: &GrayImage, factor: f32) -> GrayImage {
    let w = ((img.width() as f32 * factor) + 0.5) as u32;
    let h = ((img.height() as f32 * factor) + 0.5) as u32;
    imageops::resize(img, w.max(1), h.max(1), FilterType::Triangle)
}
