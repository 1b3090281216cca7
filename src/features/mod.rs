//! Feature evaluators: per-sample feature sources addressed by slot.
//!
//! A sample is bound once into a slot with [`FeatureEvaluator::set_image`];
//! stages then query any variable of that slot without recomputing the
//! per-image tables. Variables are numbered `feature * feature_size +
//! component`.

mod haar;
mod hog;
mod lbp;
mod usage;

use std::fmt;

use image::GrayImage;
use serde_json::Value;

pub use haar::HaarEvaluator;
pub use hog::HogEvaluator;
pub use lbp::LbpEvaluator;
pub use usage::FeatureUsageMap;

use crate::error::FeatureError;
use crate::params::{FeatureFamily, FeatureParams, WindowSize};
use crate::source::SampleClass;

pub trait FeatureEvaluator: fmt::Debug {
    fn family(&self) -> FeatureFamily;

    fn window(&self) -> WindowSize;

    fn num_features(&self) -> usize;

    /// Variables contributed by each feature.
    fn feature_size(&self) -> usize { 1 }

    /// Categories of a categorical feature, 0 for ordered features.
    fn max_cat_count(&self) -> usize { 0 }

    fn num_slots(&self) -> usize;

    fn var_count(&self) -> usize { self.num_features() * self.feature_size() }

    /// Binds `img` into `slot`, replacing whatever was bound there.
    fn set_image(
        &mut self,
        img: &GrayImage,
        class: SampleClass,
        slot: usize,
    ) -> Result<(), FeatureError>;

    fn class(&self, slot: usize) -> Option<SampleClass>;

    /// Value of variable `var` for the sample bound in `slot`; 0 for a slot
    /// that was never bound.
    fn value(&self, var: usize, slot: usize) -> f32;

    /// Persistable description of the feature behind variable `var`.
    fn descriptor(&self, var: usize) -> Value;

    /// Descriptors of the used variables, in ascending variable order.
    fn write_features(&self, usage: &FeatureUsageMap) -> Value {
        Value::Array(usage.used_indices().map(|var| self.descriptor(var)).collect())
    }
}

/// Builds the evaluator for `params.family` with room for `num_slots` samples.
pub fn create_evaluator(
    params: &FeatureParams,
    num_slots: usize,
    window: WindowSize,
) -> Box<dyn FeatureEvaluator> {
    match params.family {
        FeatureFamily::Haar => Box::new(HaarEvaluator::new(params.mode, num_slots, window)),
        FeatureFamily::Lbp => Box::new(LbpEvaluator::new(num_slots, window)),
        FeatureFamily::Hog => Box::new(HogEvaluator::new(num_slots, window)),
    }
}

/// Per-slot storage shared by the evaluators.
#[derive(Debug)]
pub(crate) struct Slots<T> {
    window: WindowSize,
    data: Vec<Option<(SampleClass, T)>>,
}

impl<T> Slots<T> {
    pub(crate) fn new(window: WindowSize, num_slots: usize) -> Self {
        let mut data = Vec::with_capacity(num_slots);
        data.resize_with(num_slots, || None);
        Self { window, data }
    }

    pub(crate) fn window(&self) -> WindowSize { self.window }

    pub(crate) fn len(&self) -> usize { self.data.len() }

    pub(crate) fn bind(
        &mut self,
        img: &GrayImage,
        class: SampleClass,
        slot: usize,
        build: impl FnOnce(&GrayImage) -> T,
    ) -> Result<(), FeatureError> {
        let (w, h) = img.dimensions();
        if (w, h) != (self.window.width, self.window.height) {
            return Err(FeatureError::SizeMismatch {
                got_w: w,
                got_h: h,
                want_w: self.window.width,
                want_h: self.window.height,
            });
        }
        let slots = self.data.len();
        let entry = self
            .data
            .get_mut(slot)
            .ok_or(FeatureError::SlotOutOfRange { slot, slots })?;
        *entry = Some((class, build(img)));
        Ok(())
    }

    pub(crate) fn get(&self, slot: usize) -> Option<&T> {
        self.data.get(slot).and_then(|e| e.as_ref()).map(|(_, t)| t)
    }

    pub(crate) fn class(&self, slot: usize) -> Option<SampleClass> {
        self.data.get(slot).and_then(|e| e.as_ref()).map(|(c, _)| *c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::HaarMode;
    use image::Luma;

    #[test]
    fn factory_selects_family() {
        let window = WindowSize::new(16, 16);
        for family in FeatureFamily::ALL {
            let eval = create_evaluator(&FeatureParams::new(family), 4, window);
            assert_eq!(eval.family(), family);
            assert_eq!(eval.num_slots(), 4);
            assert!(eval.num_features() > 0, "{family} has no features");
        }
        let hog = create_evaluator(&FeatureParams::new(FeatureFamily::Hog), 1, window);
        assert_eq!(hog.feature_size(), 36);
        let lbp = create_evaluator(&FeatureParams::new(FeatureFamily::Lbp), 1, window);
        assert_eq!(lbp.max_cat_count(), 256);
    }

    #[test]
    fn binding_checks_size_and_slot() {
        let mut eval = HaarEvaluator::new(HaarMode::Basic, 2, WindowSize::new(8, 8));
        let img = GrayImage::from_pixel(8, 8, Luma([9]));
        assert!(eval.set_image(&img, SampleClass::Positive, 1).is_ok());
        assert_eq!(eval.class(1), Some(SampleClass::Positive));
        assert_eq!(eval.class(0), None);
        assert_eq!(
            eval.set_image(&img, SampleClass::Negative, 2),
            Err(FeatureError::SlotOutOfRange { slot: 2, slots: 2 })
        );
        let small = GrayImage::new(4, 8);
        assert!(matches!(
            eval.set_image(&small, SampleClass::Negative, 0),
            Err(FeatureError::SizeMismatch { .. })
        ));
    }

    #[test]
    fn write_features_emits_only_used_in_order() {
        let eval = LbpEvaluator::new(1, WindowSize::new(9, 9));
        let mut usage = FeatureUsageMap::new(eval.var_count());
        usage.mark(5);
        usage.mark(1);
        usage.compact();
        let written = eval.write_features(&usage);
        let list = written.as_array().unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0], eval.descriptor(1));
        assert_eq!(list[1], eval.descriptor(5));
    }
}
