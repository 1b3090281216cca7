use crate::features::FeatureEvaluator;

/// Binary decision over the sample bound into a feature slot.
pub trait Classifier {
    fn predict(&self, features: &dyn FeatureEvaluator, slot: usize) -> bool;
}

/// Rejection cascade: every stage must accept, in order. Evaluation stops at
/// the first stage that rejects.
pub fn run_cascade<C: Classifier>(
    stages: &[C],
    features: &dyn FeatureEvaluator,
    slot: usize,
) -> bool {
    stages.iter().all(|stage| stage.predict(features, slot))
}
