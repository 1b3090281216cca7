//! Parameter groups shared by the command line and the persisted documents.
//!
//! Each group knows how to write itself into a document node, read itself
//! back with validation, and scan a single `-name value` command-line pair.

use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::constants::*;
use crate::error::ParamsError;
use crate::storage::{get_f64, get_i64, get_str};

/// Sample window; every sample bound to a feature evaluator has this size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WindowSize {
    pub width: u32,
    pub height: u32,
}

impl WindowSize {
    pub const fn new(width: u32, height: u32) -> Self { Self { width, height } }

    pub fn area(&self) -> usize { self.width as usize * self.height as usize }
}

impl fmt::Display for WindowSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StageFamily {
    #[serde(rename = "BOOST")]
    Boost,
}

impl StageFamily {
    pub const ALL: [Self; 1] = [Self::Boost];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Boost => "BOOST",
        }
    }

    pub fn from_literal(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.as_str() == s)
    }
}

/// Feature representation a cascade is bound to.
///
/// `Haar` is the only family the legacy single-file layout can express;
/// that is checked by matching on the variant, never by position in `ALL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FeatureFamily {
    #[serde(rename = "HAAR")]
    Haar,
    #[serde(rename = "LBP")]
    Lbp,
    #[serde(rename = "HOG")]
    Hog,
}

impl FeatureFamily {
    pub const ALL: [Self; 3] = [Self::Haar, Self::Lbp, Self::Hog];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Haar => "HAAR",
            Self::Lbp => "LBP",
            Self::Hog => "HOG",
        }
    }

    pub fn from_literal(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.as_str() == s)
    }

    pub const fn has_legacy_layout(self) -> bool { matches!(self, Self::Haar) }
}

impl fmt::Display for FeatureFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Cascade-level configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CascadeParams {
    pub stage_type: StageFamily,
    pub feature_type: FeatureFamily,
    pub window: WindowSize,
}

impl Default for CascadeParams {
    fn default() -> Self {
        Self {
            stage_type: StageFamily::Boost,
            feature_type: FeatureFamily::Haar,
            window: WindowSize::new(DEFAULT_WINDOW, DEFAULT_WINDOW),
        }
    }
}

impl CascadeParams {
    pub fn write(&self, node: &mut Map<String, Value>) {
        node.insert(STAGE_TYPE.into(), self.stage_type.as_str().into());
        node.insert(FEATURE_TYPE.into(), self.feature_type.as_str().into());
        node.insert(HEIGHT.into(), self.window.height.into());
        node.insert(WIDTH.into(), self.window.width.into());
    }

    pub fn read(node: &Value) -> Result<Self, ParamsError> {
        if node.as_object().map_or(true, |m| m.is_empty()) {
            return Err(ParamsError::EmptyNode);
        }

        let literal = get_str(node, STAGE_TYPE).ok_or(ParamsError::NotAString(STAGE_TYPE))?;
        let stage_type =
            StageFamily::from_literal(literal).ok_or_else(|| ParamsError::UnknownLiteral {
                field: STAGE_TYPE,
                value: literal.to_string(),
            })?;

        let literal =
            get_str(node, FEATURE_TYPE).ok_or(ParamsError::NotAString(FEATURE_TYPE))?;
        let feature_type =
            FeatureFamily::from_literal(literal).ok_or_else(|| ParamsError::UnknownLiteral {
                field: FEATURE_TYPE,
                value: literal.to_string(),
            })?;

        let height = get_i64(node, HEIGHT).unwrap_or(0);
        let width = get_i64(node, WIDTH).unwrap_or(0);
        let window = match (u32::try_from(width), u32::try_from(height)) {
            (Ok(w), Ok(h)) if w > 0 && h > 0 => WindowSize::new(w, h),
            _ => return Err(ParamsError::InvalidWindow { width, height }),
        };

        Ok(Self {
            stage_type,
            feature_type,
            window,
        })
    }

    /// Returns false when `name` belongs to another parameter group.
    pub fn scan_attr(&mut self, name: &str, value: &str) -> bool {
        match name {
            "-stageType" => {
                if let Some(family) = StageFamily::from_literal(value) {
                    self.stage_type = family;
                }
            }
            "-featureType" => {
                if let Some(family) = FeatureFamily::from_literal(value) {
                    self.feature_type = family;
                }
            }
            "-w" => self.window.width = value.trim().parse().unwrap_or(0),
            "-h" => self.window.height = value.trim().parse().unwrap_or(0),
            _ => return false,
        }
        true
    }

    pub fn describe(&self) -> Vec<String> {
        vec![
            format!("stageType: {}", self.stage_type.as_str()),
            format!("featureType: {}", self.feature_type.as_str()),
            format!("sampleWidth: {}", self.window.width),
            format!("sampleHeight: {}", self.window.height),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BoostType {
    #[serde(rename = "DAB")]
    Discrete,
    #[serde(rename = "RAB")]
    Real,
    #[serde(rename = "LB")]
    Logit,
    #[serde(rename = "GAB")]
    Gentle,
}

impl BoostType {
    pub const ALL: [Self; 4] = [Self::Discrete, Self::Real, Self::Logit, Self::Gentle];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Discrete => "DAB",
            Self::Real => "RAB",
            Self::Logit => "LB",
            Self::Gentle => "GAB",
        }
    }

    pub fn from_literal(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }
}

/// Parameters of one boosted stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoostParams {
    pub boost_type: BoostType,
    pub min_hit_rate: f32,
    pub max_false_alarm: f32,
    pub weight_trim_rate: f64,
    pub max_depth: u32,
    pub max_weak_count: u32,
}

impl Default for BoostParams {
    fn default() -> Self {
        Self {
            boost_type: BoostType::Gentle,
            min_hit_rate: 0.995,
            max_false_alarm: 0.5,
            weight_trim_rate: 0.95,
            max_depth: 1,
            max_weak_count: 100,
        }
    }
}

impl BoostParams {
    pub fn write(&self, node: &mut Map<String, Value>) {
        node.insert(BOOST_TYPE.into(), self.boost_type.as_str().into());
        node.insert(MIN_HIT_RATE.into(), self.min_hit_rate.into());
        node.insert(MAX_FALSE_ALARM.into(), self.max_false_alarm.into());
        node.insert(TRIM_RATE.into(), self.weight_trim_rate.into());
        node.insert(MAX_DEPTH.into(), self.max_depth.into());
        node.insert(WEAK_COUNT.into(), self.max_weak_count.into());
    }

    pub fn read(node: &Value) -> Result<Self, ParamsError> {
        if node.as_object().map_or(true, |m| m.is_empty()) {
            return Err(ParamsError::EmptyNode);
        }
        let literal = get_str(node, BOOST_TYPE).ok_or(ParamsError::NotAString(BOOST_TYPE))?;
        let boost_type =
            BoostType::from_literal(literal).ok_or_else(|| ParamsError::UnknownLiteral {
                field: BOOST_TYPE,
                value: literal.to_string(),
            })?;

        let rate = |field: &'static str| -> Result<f64, ParamsError> {
            let value = get_f64(node, field).unwrap_or(0.0);
            if value > 0.0 && value <= 1.0 {
                Ok(value)
            } else {
                Err(ParamsError::OutOfRange { field, value })
            }
        };
        let count = |field: &'static str| -> Result<u32, ParamsError> {
            let value = get_i64(node, field).unwrap_or(0);
            u32::try_from(value)
                .ok()
                .filter(|&v| v > 0)
                .ok_or(ParamsError::OutOfRange {
                    field,
                    value: value as f64,
                })
        };

        Ok(Self {
            boost_type,
            min_hit_rate: rate(MIN_HIT_RATE)? as f32,
            max_false_alarm: rate(MAX_FALSE_ALARM)? as f32,
            weight_trim_rate: rate(TRIM_RATE)?,
            max_depth: count(MAX_DEPTH)?,
            max_weak_count: count(WEAK_COUNT)?,
        })
    }

    pub fn scan_attr(&mut self, name: &str, value: &str) -> bool {
        let value = value.trim();
        match name {
            "-bt" => match BoostType::from_literal(value) {
                Some(t) => self.boost_type = t,
                None => return false,
            },
            "-minHitRate" => self.min_hit_rate = value.parse().unwrap_or(0.0),
            "-maxFalseAlarmRate" => self.max_false_alarm = value.parse().unwrap_or(0.0),
            "-weightTrimRate" => self.weight_trim_rate = value.parse().unwrap_or(0.0),
            "-maxDepth" => self.max_depth = value.parse().unwrap_or(0),
            "-maxWeakCount" => self.max_weak_count = value.parse().unwrap_or(0),
            _ => return false,
        }
        true
    }

    pub fn describe(&self) -> Vec<String> {
        vec![
            format!("boostType: {}", self.boost_type.as_str()),
            format!("minHitRate: {}", self.min_hit_rate),
            format!("maxFalseAlarmRate: {}", self.max_false_alarm),
            format!("weightTrimRate: {}", self.weight_trim_rate),
            format!("maxDepth: {}", self.max_depth),
            format!("maxWeakCount: {}", self.max_weak_count),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HaarMode {
    #[serde(rename = "BASIC")]
    Basic,
    #[serde(rename = "CORE")]
    Core,
    #[serde(rename = "ALL")]
    All,
}

impl HaarMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Basic => "BASIC",
            Self::Core => "CORE",
            Self::All => "ALL",
        }
    }

    pub fn from_literal(s: &str) -> Option<Self> {
        [Self::Basic, Self::Core, Self::All]
            .into_iter()
            .find(|m| m.as_str() == s)
    }
}

/// Feature-family parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureParams {
    pub family: FeatureFamily,
    /// Number of categories of a categorical feature, 0 for ordered ones.
    pub max_cat_count: i32,
    /// Number of variables each feature contributes.
    pub feat_size: i32,
    /// Only meaningful for HAAR.
    pub mode: HaarMode,
}

impl FeatureParams {
    pub fn new(family: FeatureFamily) -> Self {
        let (max_cat_count, feat_size) = match family {
            FeatureFamily::Haar => (0, 1),
            FeatureFamily::Lbp => (256, 1),
            FeatureFamily::Hog => (0, 36),
        };
        Self {
            family,
            max_cat_count,
            feat_size,
            mode: HaarMode::Basic,
        }
    }

    pub fn write(&self, node: &mut Map<String, Value>) {
        node.insert(MAX_CAT_COUNT.into(), self.max_cat_count.into());
        node.insert(FEATURE_SIZE.into(), self.feat_size.into());
        if self.family == FeatureFamily::Haar {
            node.insert(MODE.into(), self.mode.as_str().into());
        }
    }

    pub fn read(family: FeatureFamily, node: &Value) -> Result<Self, ParamsError> {
        if node.as_object().map_or(true, |m| m.is_empty()) {
            return Err(ParamsError::EmptyNode);
        }
        let mut params = Self::new(family);

        // The evaluator of each family has a fixed layout; stored values
        // must describe it.
        for (field, expected) in [
            (MAX_CAT_COUNT, params.max_cat_count),
            (FEATURE_SIZE, params.feat_size),
        ] {
            let value = get_i64(node, field).unwrap_or(0);
            if value != i64::from(expected) {
                return Err(ParamsError::FamilyMismatch {
                    field,
                    family,
                    value,
                    expected,
                });
            }
        }

        if family == FeatureFamily::Haar {
            let literal = get_str(node, MODE).ok_or(ParamsError::NotAString(MODE))?;
            params.mode =
                HaarMode::from_literal(literal).ok_or_else(|| ParamsError::UnknownLiteral {
                    field: MODE,
                    value: literal.to_string(),
                })?;
        }
        Ok(params)
    }

    pub fn scan_attr(&mut self, name: &str, value: &str) -> bool {
        if self.family != FeatureFamily::Haar || name != "-mode" {
            return false;
        }
        match HaarMode::from_literal(value.trim()) {
            Some(mode) => {
                self.mode = mode;
                true
            }
            None => false,
        }
    }

    pub fn describe(&self) -> Vec<String> {
        match self.family {
            FeatureFamily::Haar => vec![format!("mode: {}", self.mode.as_str())],
            FeatureFamily::Lbp | FeatureFamily::Hog => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cascade_node(feature: &str) -> Value {
        json!({
            "stageType": "BOOST",
            "featureType": feature,
            "height": 20,
            "width": 20,
        })
    }

    #[test]
    fn reads_lbp_cascade_params() {
        let params = CascadeParams::read(&cascade_node("LBP")).unwrap();
        assert_eq!(params.stage_type, StageFamily::Boost);
        assert_eq!(params.feature_type, FeatureFamily::Lbp);
        assert_eq!(params.window, WindowSize::new(20, 20));
    }

    #[test]
    fn unknown_feature_family_is_rejected() {
        let err = CascadeParams::read(&cascade_node("XYZ")).unwrap_err();
        assert_eq!(
            err,
            ParamsError::UnknownLiteral {
                field: FEATURE_TYPE,
                value: "XYZ".into()
            }
        );
    }

    #[test]
    fn rejects_empty_and_malformed_nodes() {
        assert_eq!(
            CascadeParams::read(&json!({})).unwrap_err(),
            ParamsError::EmptyNode
        );
        assert_eq!(
            CascadeParams::read(&json!({ "stageType": 1, "featureType": "HAAR" })).unwrap_err(),
            ParamsError::NotAString(STAGE_TYPE)
        );
        assert!(matches!(
            CascadeParams::read(&json!({ "stageType": "TREE", "featureType": "HAAR" })),
            Err(ParamsError::UnknownLiteral { .. })
        ));
        let mut node = cascade_node("HOG");
        node["width"] = json!(0);
        assert!(matches!(
            CascadeParams::read(&node),
            Err(ParamsError::InvalidWindow { width: 0, height: 20 })
        ));
        node.as_object_mut().unwrap().remove("width");
        assert!(CascadeParams::read(&node).is_err());
    }

    #[test]
    fn cascade_params_write_then_read() {
        let params = CascadeParams {
            feature_type: FeatureFamily::Hog,
            window: WindowSize::new(32, 16),
            ..Default::default()
        };
        let mut node = Map::new();
        params.write(&mut node);
        let keys: Vec<_> = node.keys().map(String::as_str).collect();
        assert_eq!(keys, [STAGE_TYPE, FEATURE_TYPE, HEIGHT, WIDTH]);
        assert_eq!(CascadeParams::read(&Value::Object(node)).unwrap(), params);
    }

    #[test]
    fn scan_attr_claims_only_its_own_options() {
        let mut params = CascadeParams::default();
        assert!(params.scan_attr("-featureType", "LBP"));
        assert!(params.scan_attr("-w", "20"));
        assert!(params.scan_attr("-h", "18"));
        assert!(params.scan_attr("-stageType", "BOOST"));
        assert!(!params.scan_attr("-bt", "GAB"));
        assert_eq!(params.feature_type, FeatureFamily::Lbp);
        assert_eq!(params.window, WindowSize::new(20, 18));

        // Known option with unknown value keeps the old value.
        assert!(params.scan_attr("-featureType", "SIFT"));
        assert_eq!(params.feature_type, FeatureFamily::Lbp);
    }

    #[test]
    fn boost_params_validate_ranges() {
        let mut node = Map::new();
        BoostParams::default().write(&mut node);
        let mut node = Value::Object(node);
        assert_eq!(BoostParams::read(&node).unwrap(), BoostParams::default());

        node["minHitRate"] = json!(1.5);
        assert!(matches!(
            BoostParams::read(&node),
            Err(ParamsError::OutOfRange { field: MIN_HIT_RATE, .. })
        ));
        node["minHitRate"] = json!(0.99);
        node["maxDepth"] = json!(0);
        assert!(BoostParams::read(&node).is_err());
        node["maxDepth"] = json!(2);
        node["boostType"] = json!("XB");
        assert!(BoostParams::read(&node).is_err());
    }

    #[test]
    fn boost_scan_attr() {
        let mut params = BoostParams::default();
        assert!(params.scan_attr("-bt", "DAB"));
        assert!(params.scan_attr("-maxWeakCount", "7"));
        assert!(!params.scan_attr("-bt", "nope"));
        assert!(!params.scan_attr("-w", "24"));
        assert_eq!(params.boost_type, BoostType::Discrete);
        assert_eq!(params.max_weak_count, 7);
    }

    #[test]
    fn haar_feature_params_need_a_mode() {
        let mut node = Map::new();
        let mut haar = FeatureParams::new(FeatureFamily::Haar);
        assert!(haar.scan_attr("-mode", "CORE"));
        haar.write(&mut node);
        let node = Value::Object(node);
        assert_eq!(FeatureParams::read(FeatureFamily::Haar, &node).unwrap(), haar);

        let no_mode = json!({ "maxCatCount": 0, "featSize": 1 });
        assert_eq!(
            FeatureParams::read(FeatureFamily::Haar, &no_mode).unwrap_err(),
            ParamsError::NotAString(MODE)
        );
        let lbp = FeatureParams::read(FeatureFamily::Lbp, &json!({ "maxCatCount": 256, "featSize": 1 }))
            .unwrap();
        assert_eq!(lbp.max_cat_count, 256);
        assert_eq!(
            FeatureParams::read(FeatureFamily::Hog, &json!({ "maxCatCount": 0, "featSize": 0 }))
                .unwrap_err(),
            ParamsError::FamilyMismatch {
                field: FEATURE_SIZE,
                family: FeatureFamily::Hog,
                value: 0,
                expected: 36,
            }
        );
        let categorical_off = json!({ "maxCatCount": 0, "featSize": 1 });
        assert!(matches!(
            FeatureParams::read(FeatureFamily::Lbp, &categorical_off),
            Err(ParamsError::FamilyMismatch { field: MAX_CAT_COUNT, expected: 256, .. })
        ));
    }

    #[test]
    fn legacy_layout_is_haar_only() {
        assert!(FeatureFamily::Haar.has_legacy_layout());
        assert!(!FeatureFamily::Lbp.has_legacy_layout());
        assert!(!FeatureFamily::Hog.has_legacy_layout());
    }
}
