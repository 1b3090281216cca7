use serde_json::{json, Map, Value};

use crate::classifier::Classifier;
use crate::constants::{STAGE_THRESHOLD, THRESHOLD_EPS, WEAK_CLASSIFIERS, WEAK_COUNT};
use crate::error::StageError;
use crate::features::{FeatureEvaluator, FeatureUsageMap};
use crate::params::BoostParams;
use crate::storage::{get_f64, get_i64};
use crate::tree::DecisionTree;

/// One boosted stage: the leaf outputs of its trees are summed and compared
/// against the stage threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct BoostStage {
    params: BoostParams,
    threshold: f32,
    trees: Vec<DecisionTree>,
}

impl BoostStage {
    pub fn new(params: BoostParams, threshold: f32, trees: Vec<DecisionTree>) -> Self {
        Self {
            params,
            threshold,
            trees,
        }
    }

    /// Reads a stage node. Split variables must address `features`.
    pub fn read(
        node: &Value,
        features: &dyn FeatureEvaluator,
        params: &BoostParams,
    ) -> Result<Self, StageError> {
        if node.as_object().map_or(true, |m| m.is_empty()) {
            return Err(StageError::EmptyNode);
        }
        let weak_count = get_i64(node, WEAK_COUNT).ok_or(StageError::MissingField(WEAK_COUNT))?;
        let threshold =
            get_f64(node, STAGE_THRESHOLD).ok_or(StageError::MissingField(STAGE_THRESHOLD))? as f32;
        let weak = node
            .get(WEAK_CLASSIFIERS)
            .and_then(Value::as_array)
            .ok_or(StageError::MissingField(WEAK_CLASSIFIERS))?;
        if usize::try_from(weak_count).ok() != Some(weak.len()) {
            return Err(StageError::WeakCountMismatch {
                declared: weak_count,
                found: weak.len(),
            });
        }

        let limit = features.var_count();
        let trees = weak
            .iter()
            .enumerate()
            .map(|(i, tree)| {
                let tree = DecisionTree::read(tree, features.max_cat_count())
                    .map_err(|reason| StageError::MalformedTree { tree: i, reason })?;
                match tree.max_var() {
                    Some(index) if index >= limit => {
                        Err(StageError::FeatureOutOfRange { index, limit })
                    }
                    _ => Ok(tree),
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::new(*params, threshold, trees))
    }

    /// Stage node with split variables remapped through `usage`.
    pub fn write(&self, usage: &FeatureUsageMap) -> Map<String, Value> {
        let trees: Vec<Value> = self.trees.iter().map(|t| t.write(usage)).collect();
        let mut node = Map::new();
        node.insert(WEAK_COUNT.into(), self.trees.len().into());
        node.insert(STAGE_THRESHOLD.into(), json!(self.threshold));
        node.insert(WEAK_CLASSIFIERS.into(), Value::Array(trees));
        node
    }

    pub fn mark_used_features(&self, usage: &mut FeatureUsageMap) {
        for tree in &self.trees {
            tree.mark_used(usage);
        }
    }

    pub fn threshold(&self) -> f32 { self.threshold }

    pub fn trees(&self) -> &[DecisionTree] { &self.trees }

    pub fn params(&self) -> &BoostParams { &self.params }

    pub fn sum(&self, features: &dyn FeatureEvaluator, slot: usize) -> f32 {
        self.trees.iter().map(|t| t.predict(features, slot)).sum()
    }
}

impl Classifier for BoostStage {
    fn predict(&self, features: &dyn FeatureEvaluator, slot: usize) -> bool {
        self.sum(features, slot) >= self.threshold - THRESHOLD_EPS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::HaarEvaluator;
    use crate::params::{HaarMode, WindowSize};
    use crate::source::SampleClass;
    use image::{GrayImage, Luma};

    fn stump(var: usize, threshold: f32, left: f32, right: f32) -> Value {
        json!({ "internalNodes": [0, -1, var, threshold], "leafValues": [left, right] })
    }

    fn stage_node(threshold: f32, trees: Vec<Value>) -> Value {
        json!({ "maxWeakCount": trees.len(), "stageThreshold": threshold, "weakClassifiers": trees })
    }

    fn evaluator() -> HaarEvaluator {
        let mut eval = HaarEvaluator::new(HaarMode::Basic, 1, WindowSize::new(6, 6));
        eval.set_image(&GrayImage::from_pixel(6, 6, Luma([80])), SampleClass::Positive, 0)
            .unwrap();
        eval
    }

    #[test]
    fn threshold_is_inclusive_within_tolerance() {
        let features = evaluator();
        // Flat image: every value is 0, so both stumps go left.
        let node = stage_node(1.0, vec![stump(0, 0.5, 0.6, -1.0), stump(3, 0.5, 0.4, -1.0)]);
        let stage = BoostStage::read(&node, &features, &BoostParams::default()).unwrap();
        assert!((stage.sum(&features, 0) - 1.0).abs() < 1e-6);
        assert!(stage.predict(&features, 0));

        let node = stage_node(1.01, vec![stump(0, 0.5, 0.6, -1.0), stump(3, 0.5, 0.4, -1.0)]);
        let stage = BoostStage::read(&node, &features, &BoostParams::default()).unwrap();
        assert!(!stage.predict(&features, 0));
    }

    #[test]
    fn rejects_missing_fields_and_bad_features() {
        let features = evaluator();
        let params = BoostParams::default();
        assert_eq!(
            BoostStage::read(&json!({}), &features, &params).unwrap_err(),
            StageError::EmptyNode
        );
        assert_eq!(
            BoostStage::read(&json!({ "maxWeakCount": 0 }), &features, &params).unwrap_err(),
            StageError::MissingField(STAGE_THRESHOLD)
        );
        let limit = features.var_count();
        let node = stage_node(0.0, vec![stump(limit, 0.5, 1.0, -1.0)]);
        assert_eq!(
            BoostStage::read(&node, &features, &params).unwrap_err(),
            StageError::FeatureOutOfRange { index: limit, limit }
        );
        let mut node = stage_node(0.0, vec![stump(0, 0.5, 1.0, -1.0)]);
        node["maxWeakCount"] = json!(2);
        assert_eq!(
            BoostStage::read(&node, &features, &params).unwrap_err(),
            StageError::WeakCountMismatch { declared: 2, found: 1 }
        );
    }

    #[test]
    fn write_then_read_keeps_the_stage() {
        let features = evaluator();
        let node = stage_node(-0.25, vec![stump(5, 0.125, 0.5, -0.5), stump(1, -2.0, 1.0, 0.25)]);
        let stage = BoostStage::read(&node, &features, &BoostParams::default()).unwrap();

        let written = Value::Object(stage.write(&FeatureUsageMap::new(0)));
        assert_eq!(written, node);
        let again = BoostStage::read(&written, &features, &BoostParams::default()).unwrap();
        assert_eq!(again, stage);

        let mut usage = FeatureUsageMap::new(features.var_count());
        stage.mark_used_features(&mut usage);
        assert_eq!(usage.used_indices().collect::<Vec<_>>(), vec![1, 5]);
    }
}
