use std::f32::consts::PI;

use image::GrayImage;
use serde_json::{json, Value};

use super::{FeatureEvaluator, Slots};
use crate::constants::{FEAT_COMPONENT, RECT};
use crate::error::FeatureError;
use crate::images::integrate_f32;
use crate::params::{FeatureFamily, WindowSize};
use crate::source::SampleClass;

pub const N_BINS: usize = 9;
pub const N_CELLS: usize = 4;
const FEATURE_SIZE: usize = N_BINS * N_CELLS;

/// A 2x2-cell block; each cell contributes one histogram of `N_BINS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct HogFeature {
    x: u16,
    y: u16,
    cell_w: u16,
    cell_h: u16,
}

impl HogFeature {
    fn cell(&self, i: usize) -> [usize; 4] {
        let (cw, ch) = (self.cell_w as usize, self.cell_h as usize);
        let x = self.x as usize + (i % 2) * cw;
        let y = self.y as usize + (i / 2) * ch;
        [x, y, cw, ch]
    }

    fn descriptor(&self, component: usize) -> Value {
        let cells: Vec<[usize; 4]> = (0..N_CELLS).map(|i| self.cell(i)).collect();
        json!({ RECT: cells, FEAT_COMPONENT: component })
    }
}

fn generate_features(window: WindowSize) -> Vec<HogFeature> {
    let (ww, wh) = (window.width, window.height);
    let mut features = Vec::new();
    let mut add = |cw: u32, ch: u32| {
        let mut t_x = 0;
        while t_x + 2 * cw <= ww {
            let mut t_y = 0;
            while t_y + 2 * ch <= wh {
                features.push(HogFeature {
                    x: t_x as u16,
                    y: t_y as u16,
                    cell_w: cw as u16,
                    cell_h: ch as u16,
                });
                t_y += 4;
            }
            t_x += 4;
        }
    };
    for t in (8..=ww / 2).step_by(8) {
        add(t, t);
    }
    for t in (8..=ww / 2).step_by(8) {
        add(t, 2 * t);
    }
    for t in (8..=ww / 2).step_by(8) {
        add(2 * t, t);
    }
    features
}

/// Per-sample tables: one integral per orientation bin plus the integral of
/// the gradient magnitude used for block normalisation.
#[derive(Debug)]
struct HogSlot {
    bins: Vec<Vec<f32>>,
    norm: Vec<f32>,
    stride: usize,
}

impl HogSlot {
    fn new(img: &GrayImage) -> Self {
        let (w, h) = (img.width() as usize, img.height() as usize);
        let px = |x: isize, y: isize| -> f32 {
            let x = x.clamp(0, w as isize - 1) as u32;
            let y = y.clamp(0, h as isize - 1) as u32;
            f32::from(img.get_pixel(x, y)[0])
        };

        let mut planes = vec![vec![0f32; w * h]; N_BINS];
        let mut magnitude = vec![0f32; w * h];
        for y in 0..h as isize {
            for x in 0..w as isize {
                let dx = px(x + 1, y) - px(x - 1, y);
                let dy = px(x, y + 1) - px(x, y - 1);
                let mag = (dx * dx + dy * dy).sqrt();
                let mut angle = dy.atan2(dx);
                if angle < 0.0 {
                    angle += 2.0 * PI;
                }
                let mut bin = (angle * N_BINS as f32 / PI) as usize;
                if bin >= N_BINS {
                    bin -= N_BINS;
                }
                let i = y as usize * w + x as usize;
                planes[bin.min(N_BINS - 1)][i] += mag;
                magnitude[i] = mag;
            }
        }

        Self {
            bins: planes.iter().map(|p| integrate_f32(p, w, h)).collect(),
            norm: integrate_f32(&magnitude, w, h),
            stride: w + 1,
        }
    }

    fn sum(&self, table: &[f32], [x, y, w, h]: [usize; 4]) -> f32 {
        let at = |x: usize, y: usize| table[y * self.stride + x];
        at(x, y) - at(x + w, y) - at(x, y + h) + at(x + w, y + h)
    }
}

/// Histogram-of-oriented-gradients features, 36 variables per block.
#[derive(Debug)]
pub struct HogEvaluator {
    features: Vec<HogFeature>,
    slots: Slots<HogSlot>,
}

impl HogEvaluator {
    pub fn new(num_slots: usize, window: WindowSize) -> Self {
        Self {
            features: generate_features(window),
            slots: Slots::new(window, num_slots),
        }
    }
}

impl FeatureEvaluator for HogEvaluator {
    fn family(&self) -> FeatureFamily { FeatureFamily::Hog }

    fn window(&self) -> WindowSize { self.slots.window() }

    fn num_features(&self) -> usize { self.features.len() }

    fn feature_size(&self) -> usize { FEATURE_SIZE }

    fn num_slots(&self) -> usize { self.slots.len() }

    fn set_image(
        &mut self,
        img: &GrayImage,
        class: SampleClass,
        slot: usize,
    ) -> Result<(), FeatureError> {
        self.slots.bind(img, class, slot, HogSlot::new)
    }

    fn class(&self, slot: usize) -> Option<SampleClass> { self.slots.class(slot) }

    fn value(&self, var: usize, slot: usize) -> f32 {
        let component = var % FEATURE_SIZE;
        let (Some(f), Some(s)) = (self.features.get(var / FEATURE_SIZE), self.slots.get(slot)) else {
            return 0.0;
        };
        let res = s.sum(&s.bins[component % N_BINS], f.cell(component / N_BINS));
        if res <= 0.001 {
            return 0.0;
        }
        let block = [
            f.x as usize,
            f.y as usize,
            2 * f.cell_w as usize,
            2 * f.cell_h as usize,
        ];
        res / (s.sum(&s.norm, block) + 0.001)
    }

    fn descriptor(&self, var: usize) -> Value {
        self.features
            .get(var / FEATURE_SIZE)
            .map_or(Value::Null, |f| f.descriptor(var % FEATURE_SIZE))
    }
}
