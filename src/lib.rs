//! Validation of boosted rejection cascades.
//!
//! A cascade directory holds `params.json` and one `stage<N>.json` per
//! stage. [`Cascade::validate`] loads it, streams positive and background
//! samples through the stages and reports how many survive; [`Cascade::save`]
//! exports the loaded cascade as a single document in the current or the
//! legacy HAAR layout.

pub mod cascade;
pub mod classifier;
pub mod constants;
pub mod error;
pub mod features;
pub mod images;
pub mod params;
pub mod source;
pub mod storage;
pub mod strong_classifier;
pub mod tree;

pub use cascade::{
    normalize_dir, Cascade, Elapsed, RefreshStats, SampleCounts, SaveFormat, ValidateArgs,
    ValidationReport,
};
pub use classifier::{run_cascade, Classifier};
pub use error::{CascadeError, FeatureError, ParamsError, SourceError, StageError, StorageError};
pub use features::{create_evaluator, FeatureEvaluator, FeatureUsageMap};
pub use params::{
    BoostParams, BoostType, CascadeParams, FeatureFamily, FeatureParams, HaarMode, StageFamily,
    WindowSize,
};
pub use source::{ImageSampleSource, SampleClass, SampleSource};
pub use strong_classifier::BoostStage;
pub use tree::{ChildRef, DecisionTree, LegacyNode, Split, TreeNode};
