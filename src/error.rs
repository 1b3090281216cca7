use std::path::PathBuf;

use thiserror::Error;

use crate::params::FeatureFamily;

/// Failures while decoding a parameter group from a document node.
#[derive(Debug, Error, PartialEq)]
pub enum ParamsError {
    #[error("parameter node is empty or not a map")]
    EmptyNode,
    #[error("field `{0}` is missing or not a string")]
    NotAString(&'static str),
    #[error("unknown {field} `{value}`")]
    UnknownLiteral { field: &'static str, value: String },
    #[error("window size {width}x{height} must be positive")]
    InvalidWindow { width: i64, height: i64 },
    #[error("field `{field}` has out-of-range value {value}")]
    OutOfRange { field: &'static str, value: f64 },
    #[error("{family} evaluators need {field} {expected}, found {value}")]
    FamilyMismatch {
        field: &'static str,
        family: FeatureFamily,
        value: i64,
        expected: i32,
    },
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("cannot open {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("{0} has no top-level node")]
    NoTopLevelNode(PathBuf),
}

#[derive(Debug, Error, PartialEq)]
pub enum FeatureError {
    #[error("sample is {got_w}x{got_h}, window is {want_w}x{want_h}")]
    SizeMismatch {
        got_w: u32,
        got_h: u32,
        want_w: u32,
        want_h: u32,
    },
    #[error("slot {slot} out of range ({slots} slots)")]
    SlotOutOfRange { slot: usize, slots: usize },
}

/// Failures while decoding a stage document.
#[derive(Debug, Error, PartialEq)]
pub enum StageError {
    #[error("stage node is empty or not a map")]
    EmptyNode,
    #[error("stage field `{0}` is missing or malformed")]
    MissingField(&'static str),
    #[error("stage declares {declared} weak classifiers, holds {found}")]
    WeakCountMismatch { declared: i64, found: usize },
    #[error("tree {tree}: {reason}")]
    MalformedTree { tree: usize, reason: String },
    #[error("feature index {index} exceeds {limit} variables")]
    FeatureOutOfRange { index: usize, limit: usize },
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("wrong vec file format for {0}")]
    VecFormat(PathBuf),
    #[error("vec samples hold {vec_size} pixels, window needs {window}")]
    VecSize { vec_size: usize, window: usize },
    #[error("no usable images listed in {0}")]
    Empty(PathBuf),
}

#[derive(Debug, Error)]
pub enum CascadeError {
    #[error("required path `{0}` is empty")]
    MissingPath(&'static str),
    #[error("cascade could not be loaded from {dir}: {reason}")]
    Load { dir: PathBuf, reason: String },
    #[error("legacy format is used for HAAR features only, cascade uses {0}")]
    LegacyFamily(FeatureFamily),
    #[error("no positive sample passed the cascade")]
    NoPositiveSamples,
    #[error("sample source could not be created: {0}")]
    Source(#[from] SourceError),
    #[error(transparent)]
    Params(#[from] ParamsError),
    #[error(transparent)]
    Stage(#[from] StageError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl CascadeError {
    /// Configuration violations the caller cannot recover from.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::MissingPath(_) | Self::Load { .. } | Self::LegacyFamily(_)
        )
    }
}
