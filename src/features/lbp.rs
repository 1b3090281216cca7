use image::GrayImage;
use serde_json::{json, Value};

use super::{FeatureEvaluator, Slots};
use crate::constants::RECT;
use crate::error::FeatureError;
use crate::images::IntegralImage;
use crate::params::{FeatureFamily, WindowSize};
use crate::source::SampleClass;

/// Multi-block LBP: a 3x3 grid of `w x h` blocks anchored at `(x, y)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LbpFeature {
    x: u16,
    y: u16,
    w: u16,
    h: u16,
}

/// Neighbour blocks clockwise from the top-left corner, with their bit.
const NEIGHBOURS: [(usize, usize, u8); 8] = [
    (0, 0, 128),
    (0, 1, 64),
    (0, 2, 32),
    (1, 2, 16),
    (2, 2, 8),
    (2, 1, 4),
    (2, 0, 2),
    (1, 0, 1),
];

impl LbpFeature {
    fn block(&self, ii: &IntegralImage, row: usize, col: usize) -> i64 {
        let (w, h) = (self.w as usize, self.h as usize);
        ii.rect_sum(self.x as usize + col * w, self.y as usize + row * h, w, h)
    }

    fn calc(&self, ii: &IntegralImage) -> u8 {
        let centre = self.block(ii, 1, 1);
        NEIGHBOURS
            .iter()
            .filter(|&&(r, c, _)| self.block(ii, r, c) >= centre)
            .fold(0u8, |code, &(_, _, bit)| code | bit)
    }
}

fn generate_features(window: WindowSize) -> Vec<LbpFeature> {
    let (ww, wh) = (window.width, window.height);
    let mut features = Vec::new();
    for x in 0..ww {
        for y in 0..wh {
            for w in 1..=ww / 3 {
                for h in 1..=wh / 3 {
                    if x + 3 * w <= ww && y + 3 * h <= wh {
                        features.push(LbpFeature {
                            x: x as u16,
                            y: y as u16,
                            w: w as u16,
                            h: h as u16,
                        });
                    }
                }
            }
        }
    }
    features
}

/// Categorical LBP codes in `0..256`.
#[derive(Debug)]
pub struct LbpEvaluator {
    features: Vec<LbpFeature>,
    slots: Slots<IntegralImage>,
}

impl LbpEvaluator {
    pub fn new(num_slots: usize, window: WindowSize) -> Self {
        Self {
            features: generate_features(window),
            slots: Slots::new(window, num_slots),
        }
    }
}

impl FeatureEvaluator for LbpEvaluator {
    fn family(&self) -> FeatureFamily { FeatureFamily::Lbp }

    fn window(&self) -> WindowSize { self.slots.window() }

    fn num_features(&self) -> usize { self.features.len() }

    fn max_cat_count(&self) -> usize { 256 }

    fn num_slots(&self) -> usize { self.slots.len() }

    fn set_image(
        &mut self,
        img: &GrayImage,
        class: SampleClass,
        slot: usize,
    ) -> Result<(), FeatureError> {
        self.slots.bind(img, class, slot, IntegralImage::new)
    }

    fn class(&self, slot: usize) -> Option<SampleClass> { self.slots.class(slot) }

    fn value(&self, var: usize, slot: usize) -> f32 {
        match (self.features.get(var), self.slots.get(slot)) {
            (Some(f), Some(ii)) => f32::from(f.calc(ii)),
            _ => 0.0,
        }
    }

    fn descriptor(&self, var: usize) -> Value {
        self.features
            .get(var)
            .map_or(Value::Null, |f| json!({ RECT: [f.x, f.y, f.w, f.h] }))
    }
}
