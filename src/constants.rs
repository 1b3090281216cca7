// CONSTANTS HOLDING FILE NAMES
/// Shared parameters document inside a cascade directory
pub const PARAMS_FILENAME: &str = "params.json";

/// Prefix of the per-stage documents (`stage0.json`, `stage1.json`, ...)
pub const STAGE_FILE_PREFIX: &str = "stage";

/// Extension used for every persisted document
pub const DOC_EXTENSION: &str = "json";

/// Key used to attach a human-readable comment to a map
pub const COMMENT_KEY: &str = "//";

// KEYS OF THE CURRENT FORMAT
pub const STAGE_TYPE: &str = "stageType";
pub const FEATURE_TYPE: &str = "featureType";
pub const HEIGHT: &str = "height";
pub const WIDTH: &str = "width";
pub const STAGE_PARAMS: &str = "stageParams";
pub const FEATURE_PARAMS: &str = "featureParams";
pub const STAGE_NUM: &str = "stageNum";
pub const STAGES: &str = "stages";
pub const FEATURES: &str = "features";

pub const BOOST_TYPE: &str = "boostType";
pub const MIN_HIT_RATE: &str = "minHitRate";
pub const MAX_FALSE_ALARM: &str = "maxFalseAlarm";
pub const TRIM_RATE: &str = "weightTrimRate";
pub const MAX_DEPTH: &str = "maxDepth";
pub const WEAK_COUNT: &str = "maxWeakCount";
pub const STAGE_THRESHOLD: &str = "stageThreshold";
pub const WEAK_CLASSIFIERS: &str = "weakClassifiers";
pub const INTERNAL_NODES: &str = "internalNodes";
pub const LEAF_VALUES: &str = "leafValues";

pub const MAX_CAT_COUNT: &str = "maxCatCount";
pub const FEATURE_SIZE: &str = "featSize";
pub const MODE: &str = "mode";
pub const RECTS: &str = "rects";
pub const RECT: &str = "rect";
pub const TILTED: &str = "tilted";
pub const FEAT_COMPONENT: &str = "featComponent";

// KEYS OF THE LEGACY SINGLE-FILE FORMAT
/// Type tag of the old Haar classifier layout
pub const LEGACY_TYPE_ID: &str = "opencv-haar-classifier";
pub const LEGACY_TYPE_KEY: &str = "type_id";
pub const LEGACY_SIZE: &str = "size";
pub const LEGACY_STAGES: &str = "stages";
pub const LEGACY_TREES: &str = "trees";
pub const LEGACY_FEATURE: &str = "feature";
pub const LEGACY_THRESHOLD: &str = "threshold";
pub const LEGACY_LEFT_NODE: &str = "left_node";
pub const LEGACY_LEFT_VAL: &str = "left_val";
pub const LEGACY_RIGHT_NODE: &str = "right_node";
pub const LEGACY_RIGHT_VAL: &str = "right_val";
pub const LEGACY_STAGE_THRESHOLD: &str = "stage_threshold";
pub const LEGACY_PARENT: &str = "parent";
pub const LEGACY_NEXT: &str = "next";

// CONSTANTS USED WHEN EVALUATING STAGES
/// Tolerance applied to the stage threshold before rejecting a sample
pub const THRESHOLD_EPS: f32 = 0.00001;

/// Default sample window edge length
pub const DEFAULT_WINDOW: u32 = 24;
