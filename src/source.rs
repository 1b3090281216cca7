//! Positive and negative sample streams feeding a validation pass.

use std::fs;
use std::path::{Path, PathBuf};

use image::{imageops, GrayImage};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::SourceError;
use crate::images::{fit_to_window, load_gray, scale};
use crate::params::WindowSize;

/// Label attached to a sample bound into a feature slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SampleClass {
    Positive,
    Negative,
}

/// A source of window-sized grayscale samples.
///
/// `Ok(None)` means the stream is exhausted; `Err` is a fault while drawing.
/// Callers treat both as "stop drawing this class".
pub trait SampleSource {
    fn restart(&mut self);

    fn next_positive(&mut self) -> Result<Option<GrayImage>, SourceError>;

    fn next_negative(&mut self) -> Result<Option<GrayImage>, SourceError>;

    fn next_sample(&mut self, class: SampleClass) -> Result<Option<GrayImage>, SourceError> {
        match class {
            SampleClass::Positive => self.next_positive(),
            SampleClass::Negative => self.next_negative(),
        }
    }
}

const IMAGE_EXTENSIONS: [&str; 8] = ["png", "jpg", "jpeg", "bmp", "pgm", "ppm", "pnm", "pbm"];

const VEC_HEADER_LEN: usize = 12;

/// Sliding step, relative to the window size.
const STEP_FACTOR: f32 = 0.5;

const SCALE_FACTOR: f32 = std::f32::consts::SQRT_2;

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> SourceError + '_ {
    move |source| SourceError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

/// Image files of a directory (sorted by name) or the entries of a list
/// file, resolved against the list's directory.
fn collect_image_paths(path: &Path) -> Result<Vec<PathBuf>, SourceError> {
    let paths: Vec<PathBuf> = if path.is_dir() {
        let mut paths: Vec<PathBuf> = fs::read_dir(path)
            .map_err(io_error(path))?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|p| p.is_file() && is_image(p))
            .collect();
        paths.sort();
        paths
    } else {
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        fs::read_to_string(path)
            .map_err(io_error(path))?
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| base.join(line))
            .collect()
    };
    if paths.is_empty() {
        return Err(SourceError::Empty(path.to_path_buf()));
    }
    Ok(paths)
}

/// Samples packed in a `.vec` file: a header of sample count, pixels per
/// sample and two reserved shorts, then per sample one padding byte and the
/// pixels as little-endian `i16`.
#[derive(Debug)]
struct VecReader {
    path: PathBuf,
    data: Vec<u8>,
    count: usize,
    window: WindowSize,
    cursor: usize,
    taken: usize,
}

impl VecReader {
    fn open(path: &Path, window: WindowSize) -> Result<Self, SourceError> {
        let data = fs::read(path).map_err(io_error(path))?;
        if data.len() < VEC_HEADER_LEN {
            return Err(SourceError::VecFormat(path.to_path_buf()));
        }
        let word = |i: usize| i32::from_le_bytes([data[i], data[i + 1], data[i + 2], data[i + 3]]);
        let count =
            usize::try_from(word(0)).map_err(|_| SourceError::VecFormat(path.to_path_buf()))?;
        let vec_size = usize::try_from(word(4)).unwrap_or(0);
        if vec_size != window.area() {
            return Err(SourceError::VecSize {
                vec_size,
                window: window.area(),
            });
        }
        Ok(Self {
            path: path.to_path_buf(),
            data,
            count,
            window,
            cursor: VEC_HEADER_LEN,
            taken: 0,
        })
    }

    fn restart(&mut self) {
        self.cursor = VEC_HEADER_LEN;
        self.taken = 0;
    }

    fn next(&mut self) -> Result<Option<GrayImage>, SourceError> {
        if self.taken >= self.count {
            return Ok(None);
        }
        let len = 1 + 2 * self.window.area();
        let record = self
            .data
            .get(self.cursor..self.cursor + len)
            .ok_or_else(|| SourceError::VecFormat(self.path.clone()))?;
        let pixels: Vec<u8> = record[1..]
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]).clamp(0, 255) as u8)
            .collect();
        self.cursor += len;
        self.taken += 1;
        GrayImage::from_raw(self.window.width, self.window.height, pixels)
            .map(Some)
            .ok_or_else(|| SourceError::VecFormat(self.path.clone()))
    }
}

/// Whole images resized to the window, read in list order.
#[derive(Debug)]
struct ImageListReader {
    paths: Vec<PathBuf>,
    window: WindowSize,
    next: usize,
}

impl ImageListReader {
    fn next(&mut self) -> Option<GrayImage> {
        while let Some(path) = self.paths.get(self.next) {
            self.next += 1;
            match load_gray(path) {
                Ok(img) => return Some(fit_to_window(&img, self.window)),
                Err(err) => warn!("skipping positive {}: {err}", path.display()),
            }
        }
        None
    }
}

#[derive(Debug)]
enum PositiveReader {
    Vec(VecReader),
    Images(ImageListReader),
}

/// Windows cut from background images.
///
/// Each image is first scaled so the window (shifted by the current round
/// offset) just fits, then scanned with a half-window step; every finished
/// scan enlarges the image by `SCALE_FACTOR` until it exceeds its original
/// size, after which the next image is taken. Wrapping around the list
/// shifts the start offset, so the stream only ends when no image is usable.
#[derive(Debug)]
struct NegativeReader {
    paths: Vec<PathBuf>,
    window: WindowSize,
    last: usize,
    round: usize,
    src: Option<GrayImage>,
    img: Option<GrayImage>,
    offset: (u32, u32),
    point: (u32, u32),
    scale: f32,
}

impl NegativeReader {
    fn new(paths: Vec<PathBuf>, window: WindowSize) -> Self {
        Self {
            paths,
            window,
            last: 0,
            round: 0,
            src: None,
            img: None,
            offset: (0, 0),
            point: (0, 0),
            scale: 1.0,
        }
    }

    fn next_image(&mut self) -> bool {
        let count = self.paths.len();
        let (ww, wh) = (self.window.width as i64, self.window.height as i64);
        for _ in 0..count {
            let path = &self.paths[self.last];
            self.last += 1;
            let src = match load_gray(path) {
                Ok(img) => img,
                Err(err) => {
                    debug!("skipping background {}: {err}", path.display());
                    self.last %= count;
                    continue;
                }
            };
            self.round += self.last / count;
            self.round %= self.window.area().max(1);
            self.last %= count;

            let ox = (self.round as i64 % ww).min(i64::from(src.width()) - ww);
            let oy = (self.round as i64 / ww).min(i64::from(src.height()) - wh);
            if ox < 0 || oy < 0 {
                continue;
            }
            self.offset = (ox as u32, oy as u32);
            self.point = self.offset;
            self.scale = f32::max(
                (ww + ox) as f32 / src.width() as f32,
                (wh + oy) as f32 / src.height() as f32,
            );
            self.img = Some(scale(&src, self.scale));
            self.src = Some(src);
            return true;
        }
        self.src = None;
        self.img = None;
        false
    }

    fn next(&mut self) -> Option<GrayImage> {
        if self.img.is_none() && !self.next_image() {
            return None;
        }
        let img = self.img.as_ref()?;
        let (w, h) = (self.window.width, self.window.height);
        let (cols, rows) = img.dimensions();
        let (px, py) = self.point;
        let sample = imageops::crop_imm(img, px, py, w, h).to_image();

        let step_x = ((STEP_FACTOR * w as f32) as u32).max(1);
        let step_y = ((STEP_FACTOR * h as f32) as u32).max(1);
        if ((px as f32 + (1.0 + STEP_FACTOR) * w as f32) as u32) < cols {
            self.point.0 += step_x;
        } else {
            self.point.0 = self.offset.0;
            if ((py as f32 + (1.0 + STEP_FACTOR) * h as f32) as u32) < rows {
                self.point.1 += step_y;
            } else {
                self.point.1 = self.offset.1;
                self.scale *= SCALE_FACTOR;
                match &self.src {
                    Some(src) if self.scale <= 1.0 => self.img = Some(scale(src, self.scale)),
                    _ => self.img = None,
                }
            }
        }

        if sample.dimensions() == (w, h) {
            Some(sample)
        } else {
            Some(fit_to_window(&sample, self.window))
        }
    }
}

/// Sample source over a positive descriptor (`.vec` file, image directory or
/// image list) and a background descriptor (image directory or list).
#[derive(Debug)]
pub struct ImageSampleSource {
    positives: PositiveReader,
    negatives: NegativeReader,
}

impl ImageSampleSource {
    pub fn create(pos: &Path, neg: &Path, window: WindowSize) -> Result<Self, SourceError> {
        let is_vec = pos
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("vec"));
        let positives = if is_vec {
            PositiveReader::Vec(VecReader::open(pos, window)?)
        } else {
            PositiveReader::Images(ImageListReader {
                paths: collect_image_paths(pos)?,
                window,
                next: 0,
            })
        };
        let negatives = NegativeReader::new(collect_image_paths(neg)?, window);
        Ok(Self {
            positives,
            negatives,
        })
    }
}

impl SampleSource for ImageSampleSource {
    /// Rewinds the positives. The background stream is unbounded and keeps
    /// its position, so repeated passes see fresh negatives.
    fn restart(&mut self) {
        match &mut self.positives {
            PositiveReader::Vec(reader) => reader.restart(),
            PositiveReader::Images(reader) => reader.next = 0,
        }
    }

    fn next_positive(&mut self) -> Result<Option<GrayImage>, SourceError> {
        match &mut self.positives {
            PositiveReader::Vec(reader) => reader.next(),
            PositiveReader::Images(reader) => Ok(reader.next()),
        }
    }

    fn next_negative(&mut self) -> Result<Option<GrayImage>, SourceError> {
        Ok(self.negatives.next())
    }
}
