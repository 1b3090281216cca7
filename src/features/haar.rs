use image::GrayImage;
use serde_json::{json, Value};

use super::{FeatureEvaluator, Slots};
use crate::constants::{RECTS, TILTED};
use crate::error::FeatureError;
use crate::images::IntegralImage;
use crate::params::{FeatureFamily, HaarMode, WindowSize};
use crate::source::SampleClass;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct WeightedRect {
    x: u16,
    y: u16,
    w: u16,
    h: u16,
    weight: f32,
}

/// Up to three weighted rectangles evaluated on the upright or the tilted
/// integral image.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct HaarFeature {
    tilted: bool,
    rects: [WeightedRect; 3],
    len: u8,
}

impl HaarFeature {
    fn new(tilted: bool, rects: &[(u32, u32, u32, u32, f32)]) -> Self {
        let mut out = [WeightedRect::default(); 3];
        for (slot, &(x, y, w, h, weight)) in out.iter_mut().zip(rects) {
            *slot = WeightedRect {
                x: x as u16,
                y: y as u16,
                w: w as u16,
                h: h as u16,
                weight,
            };
        }
        Self {
            tilted,
            rects: out,
            len: rects.len() as u8,
        }
    }

    fn rects(&self) -> &[WeightedRect] { &self.rects[..self.len as usize] }

    fn calc(&self, ii: &IntegralImage) -> f32 {
        self.rects()
            .iter()
            .map(|r| {
                let (x, y, w, h) = (r.x as usize, r.y as usize, r.w as usize, r.h as usize);
                let s = if self.tilted {
                    ii.tilted_sum(x, y, w, h)
                } else {
                    ii.rect_sum(x, y, w, h)
                };
                r.weight * s as f32
            })
            .sum()
    }

    fn descriptor(&self) -> Value {
        let rects: Vec<Value> = self
            .rects()
            .iter()
            .map(|r| json!([r.x, r.y, r.w, r.h, r.weight]))
            .collect();
        json!({ RECTS: rects, TILTED: i32::from(self.tilted) })
    }
}

/// Enumerates the feature pool in a fixed order; stage documents address
/// features by their position in this order.
fn generate_features(mode: HaarMode, window: WindowSize) -> Vec<HaarFeature> {
    let (ww, wh) = (window.width, window.height);
    let mut features = Vec::new();
    let mut push = |tilted, rects: &[(u32, u32, u32, u32, f32)]| {
        features.push(HaarFeature::new(tilted, rects))
    };

    for x in 0..ww {
        for y in 0..wh {
            for dx in 1..=ww {
                for dy in 1..=wh {
                    // haar_x2
                    if x + dx * 2 <= ww && y + dy <= wh {
                        push(false, &[(x, y, dx * 2, dy, -1.0), (x + dx, y, dx, dy, 2.0)]);
                    }
                    // haar_y2
                    if x + dx <= ww && y + dy * 2 <= wh {
                        push(false, &[(x, y, dx, dy * 2, -1.0), (x, y + dy, dx, dy, 2.0)]);
                    }
                    // haar_x3
                    if x + dx * 3 <= ww && y + dy <= wh {
                        push(false, &[(x, y, dx * 3, dy, -1.0), (x + dx, y, dx, dy, 3.0)]);
                    }
                    // haar_y3
                    if x + dx <= ww && y + dy * 3 <= wh {
                        push(false, &[(x, y, dx, dy * 3, -1.0), (x, y + dy, dx, dy, 3.0)]);
                    }
                    if mode != HaarMode::Basic {
                        // haar_x4
                        if x + dx * 4 <= ww && y + dy <= wh {
                            push(false, &[(x, y, dx * 4, dy, -1.0), (x + dx, y, dx * 2, dy, 2.0)]);
                        }
                        // haar_y4
                        if x + dx <= ww && y + dy * 4 <= wh {
                            push(false, &[(x, y, dx, dy * 4, -1.0), (x, y + dy, dx, dy * 2, 2.0)]);
                        }
                    }
                    // x2_y2
                    if x + dx * 2 <= ww && y + dy * 2 <= wh {
                        push(
                            false,
                            &[
                                (x, y, dx * 2, dy * 2, -1.0),
                                (x, y, dx, dy, 2.0),
                                (x + dx, y + dy, dx, dy, 2.0),
                            ],
                        );
                    }
                    if mode != HaarMode::Basic && x + dx * 3 <= ww && y + dy * 3 <= wh {
                        push(false, &[(x, y, dx * 3, dy * 3, -1.0), (x + dx, y + dy, dx, dy, 9.0)]);
                    }
                    if mode == HaarMode::All {
                        // tilted haar_x2
                        if x + 2 * dx <= ww && y + 2 * dx + dy <= wh && x >= dy {
                            push(true, &[(x, y, dx * 2, dy, -1.0), (x, y, dx, dy, 2.0)]);
                        }
                        // tilted haar_y2
                        if x + dx <= ww && y + dx + 2 * dy <= wh && x >= 2 * dy {
                            push(true, &[(x, y, dx, 2 * dy, -1.0), (x, y, dx, dy, 2.0)]);
                        }
                        // tilted haar_x3
                        if x + 3 * dx <= ww && y + 3 * dx + dy <= wh && x >= dy {
                            push(true, &[(x, y, dx * 3, dy, -1.0), (x + dx, y + dx, dx, dy, 3.0)]);
                        }
                        // tilted haar_y3
                        if x + dx <= ww && y + dx + 3 * dy <= wh && x >= 3 * dy {
                            push(true, &[(x, y, dx, 3 * dy, -1.0), (x - dy, y + dy, dx, dy, 3.0)]);
                        }
                        // tilted haar_x4
                        if x + 4 * dx <= ww && y + 4 * dx + dy <= wh && x >= dy {
                            push(true, &[(x, y, dx * 4, dy, -1.0), (x + dx, y + dx, dx * 2, dy, 2.0)]);
                        }
                        // tilted haar_y4
                        if x + dx <= ww && y + dx + 4 * dy <= wh && x >= 4 * dy {
                            push(true, &[(x, y, dx, 4 * dy, -1.0), (x - dy, y + dy, dx, 2 * dy, 2.0)]);
                        }
                    }
                }
            }
        }
    }
    features
}

#[derive(Debug)]
struct HaarSlot {
    ii: IntegralImage,
    norm_factor: f32,
}

/// Haar-like rectangle features, normalised by the window's standard
/// deviation measured one pixel inside the border.
#[derive(Debug)]
pub struct HaarEvaluator {
    mode: HaarMode,
    features: Vec<HaarFeature>,
    slots: Slots<HaarSlot>,
}

impl HaarEvaluator {
    pub fn new(mode: HaarMode, num_slots: usize, window: WindowSize) -> Self {
        Self {
            mode,
            features: generate_features(mode, window),
            slots: Slots::new(window, num_slots),
        }
    }

    pub fn mode(&self) -> HaarMode { self.mode }

    fn norm_factor(ii: &IntegralImage) -> f32 {
        let (w, h) = (ii.width(), ii.height());
        if w < 3 || h < 3 {
            return 0.0;
        }
        let (nw, nh) = (w - 2, h - 2);
        let area = (nw * nh) as f64;
        let sum = ii.rect_sum(1, 1, nw, nh) as f64;
        let sq_sum = ii.rect_sq_sum(1, 1, nw, nh);
        (area * sq_sum - sum * sum).max(0.0).sqrt() as f32
    }
}

impl FeatureEvaluator for HaarEvaluator {
    fn family(&self) -> FeatureFamily { FeatureFamily::Haar }

    fn window(&self) -> WindowSize { self.slots.window() }

    fn num_features(&self) -> usize { self.features.len() }

    fn num_slots(&self) -> usize { self.slots.len() }

    fn set_image(
        &mut self,
        img: &GrayImage,
        class: SampleClass,
        slot: usize,
    ) -> Result<(), FeatureError> {
        let tilted = self.mode == HaarMode::All;
        self.slots.bind(img, class, slot, |img| {
            let ii = if tilted {
                IntegralImage::with_tilted(img)
            } else {
                IntegralImage::new(img)
            };
            let norm_factor = Self::norm_factor(&ii);
            HaarSlot { ii, norm_factor }
        })
    }

    fn class(&self, slot: usize) -> Option<SampleClass> { self.slots.class(slot) }

    fn value(&self, var: usize, slot: usize) -> f32 {
        let (Some(feature), Some(s)) = (self.features.get(var), self.slots.get(slot)) else {
            return 0.0;
        };
        if s.norm_factor == 0.0 {
            0.0
        } else {
            feature.calc(&s.ii) / s.norm_factor
        }
    }

    fn descriptor(&self, var: usize) -> Value {
        self.features
            .get(var)
            .map_or(Value::Null, HaarFeature::descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn count(mode: HaarMode, w: u32, h: u32) -> usize {
        generate_features(mode, WindowSize::new(w, h)).len()
    }

    #[test]
    fn pool_grows_with_mode() {
        let basic = count(HaarMode::Basic, 8, 8);
        let core = count(HaarMode::Core, 8, 8);
        let all = count(HaarMode::All, 8, 8);
        assert!(basic < core && core < all);
    }

    #[test]
    fn first_feature_is_the_smallest_horizontal_pair() {
        let features = generate_features(HaarMode::Basic, WindowSize::new(4, 4));
        assert_eq!(
            features[0].descriptor(),
            json!({ "rects": [[0, 0, 2, 1, -1.0], [1, 0, 1, 1, 2.0]], "tilted": 0 })
        );
    }

    #[test]
    fn half_black_window_responds_to_horizontal_pair() {
        let window = WindowSize::new(6, 6);
        let mut eval = HaarEvaluator::new(HaarMode::Basic, 1, window);
        // Left half dark, right half bright.
        let img = GrayImage::from_fn(6, 6, |x, _| Luma([if x < 3 { 0 } else { 200 }]));
        eval.set_image(&img, SampleClass::Positive, 0).unwrap();

        let var = eval
            .features
            .iter()
            .position(|f| {
                f.rects()[0] == WeightedRect { x: 0, y: 0, w: 6, h: 6, weight: -1.0 }
                    && !f.tilted
                    && f.len == 2
                    && f.rects()[1].x == 3
            })
            .unwrap();
        // -sum(all) + 2*sum(right half) = sum(right) - sum(left) > 0
        assert!(eval.value(var, 0) > 0.0);
    }

    #[test]
    fn flat_window_has_zero_norm_and_zero_values() {
        let mut eval = HaarEvaluator::new(HaarMode::Core, 1, WindowSize::new(5, 5));
        eval.set_image(&GrayImage::from_pixel(5, 5, Luma([120])), SampleClass::Negative, 0)
            .unwrap();
        assert_eq!(eval.value(0, 0), 0.0);
        // unbound slot
        assert_eq!(eval.value(0, 3), 0.0);
    }
}
