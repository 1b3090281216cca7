//! The rejection cascade: loading, evaluation, sample refresh and export.

use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use image::GrayImage;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::classifier::run_cascade;
use crate::constants::*;
use crate::error::{CascadeError, FeatureError, SourceError, StorageError};
use crate::features::{create_evaluator, FeatureEvaluator, FeatureUsageMap};
use crate::params::{BoostParams, CascadeParams, FeatureParams, WindowSize};
use crate::source::{ImageSampleSource, SampleClass, SampleSource};
use crate::storage::{
    default_object_name, read_first_node, stage_path, with_comment, write_document,
};
use crate::strong_classifier::BoostStage;
use crate::tree::{ChildRef, LegacyNode};

/// Sample quotas and the number of stages to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleCounts {
    pub num_pos: usize,
    pub num_neg: usize,
    pub num_stages: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveFormat {
    /// Parameters, stages and the used features in one document.
    Current,
    /// The single-document HAAR layout with breadth-first node lists.
    Legacy,
}

/// Counters of one refresh pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshStats {
    pub pos_count: usize,
    pub pos_consumed: u64,
    pub pos_acceptance_ratio: f64,
    pub neg_count: usize,
    pub neg_consumed: u64,
    /// Accepted negatives over consumed negatives, 0 when none were consumed.
    pub acceptance_ratio: f64,
    pub current_samples: usize,
}

/// Wall-clock time split into whole days, hours, minutes and seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Elapsed {
    pub days: u64,
    pub hours: u64,
    pub minutes: u64,
    pub seconds: u64,
}

impl From<Duration> for Elapsed {
    fn from(d: Duration) -> Self {
        let total = d.as_secs();
        Self {
            days: total / 60 / 60 / 24,
            hours: (total / 60 / 60) % 24,
            minutes: (total / 60) % 60,
            seconds: total % 60,
        }
    }
}

impl fmt::Display for Elapsed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} days {} hours {} minutes {} seconds",
            self.days, self.hours, self.minutes, self.seconds
        )
    }
}

/// Inputs of a validation pass.
///
/// The optional parameter groups are the ones given on the command line;
/// the groups stored with the cascade always win, a mismatch is logged.
#[derive(Debug, Clone)]
pub struct ValidateArgs {
    pub cascade_dir: String,
    pub pos: PathBuf,
    pub neg: PathBuf,
    pub counts: SampleCounts,
    pub precalc_val_buf_size: usize,
    pub precalc_idx_buf_size: usize,
    pub cascade_params: Option<CascadeParams>,
    pub stage_params: Option<BoostParams>,
    pub feature_params: Option<FeatureParams>,
    pub base_format_save: bool,
    pub acceptance_ratio_break_value: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub cascade_dir: String,
    pub loaded_stages: usize,
    /// `None` when the dataset could not be filled.
    pub refresh: Option<RefreshStats>,
    /// Set when the negative acceptance ratio reached the break value.
    pub saturated: bool,
    pub elapsed: Elapsed,
}

/// Appends a separator unless the path already ends with one.
pub fn normalize_dir(dir: &str) -> String {
    if dir.ends_with('/') || dir.ends_with('\\') {
        dir.to_string()
    } else {
        format!("{dir}/")
    }
}

#[derive(Debug)]
pub struct Cascade {
    params: CascadeParams,
    stage_params: BoostParams,
    feature_params: FeatureParams,
    features: Box<dyn FeatureEvaluator>,
    stages: Vec<BoostStage>,
    num_pos: usize,
    num_neg: usize,
    num_stages: usize,
    cur_num_samples: usize,
}

impl Cascade {
    /// An empty cascade with an evaluator sized for `num_pos + num_neg` slots.
    pub fn new(
        params: CascadeParams,
        stage_params: BoostParams,
        feature_params: FeatureParams,
        counts: SampleCounts,
    ) -> Self {
        let features = create_evaluator(
            &feature_params,
            counts.num_pos + counts.num_neg,
            params.window,
        );
        Self {
            params,
            stage_params,
            feature_params,
            features,
            stages: Vec::new(),
            num_pos: counts.num_pos,
            num_neg: counts.num_neg,
            num_stages: 0,
            cur_num_samples: 0,
        }
    }

    /// Loads `params.json` and then `stage0.json`, `stage1.json`, ... up to
    /// `counts.num_stages`. The first stage that is missing or unreadable
    /// ends the cascade there; only the parameters document is required.
    pub fn load(dir: &Path, counts: SampleCounts) -> Result<Self, CascadeError> {
        let node = read_first_node(&dir.join(PARAMS_FILENAME))?;
        let (params, stage_params, feature_params) = Self::read_params(&node)?;
        let mut cascade = Self::new(params, stage_params, feature_params, counts);

        for i in 0..counts.num_stages {
            let path = stage_path(dir, i);
            let stage = read_first_node(&path).map_err(CascadeError::from).and_then(|node| {
                BoostStage::read(&node, cascade.features.as_ref(), &cascade.stage_params)
                    .map_err(CascadeError::from)
            });
            match stage {
                Ok(stage) => cascade.stages.push(stage),
                Err(err) => {
                    debug!("stopping at stage {i}: {err}");
                    break;
                }
            }
        }
        cascade.num_stages = cascade.stages.len();
        info!(
            "loaded {} of {} stages from {}",
            cascade.num_stages,
            counts.num_stages,
            dir.display()
        );
        Ok(cascade)
    }

    fn read_params(
        node: &Value,
    ) -> Result<(CascadeParams, BoostParams, FeatureParams), CascadeError> {
        let params = CascadeParams::read(node)?;
        let stage_params = BoostParams::read(node.get(STAGE_PARAMS).unwrap_or(&Value::Null))?;
        let feature_params = FeatureParams::read(
            params.feature_type,
            node.get(FEATURE_PARAMS).unwrap_or(&Value::Null),
        )?;
        Ok((params, stage_params, feature_params))
    }

    /// Cascade parameters followed by the stage and feature groups.
    fn write_params(&self, node: &mut Map<String, Value>) {
        self.params.write(node);
        let mut stage = Map::new();
        self.stage_params.write(&mut stage);
        node.insert(STAGE_PARAMS.into(), Value::Object(stage));
        let mut feature = Map::new();
        self.feature_params.write(&mut feature);
        node.insert(FEATURE_PARAMS.into(), Value::Object(feature));
    }

    pub fn params(&self) -> &CascadeParams { &self.params }

    pub fn stage_params(&self) -> &BoostParams { &self.stage_params }

    pub fn feature_params(&self) -> &FeatureParams { &self.feature_params }

    pub fn window(&self) -> WindowSize { self.params.window }

    pub fn stages(&self) -> &[BoostStage] { &self.stages }

    pub fn num_stages(&self) -> usize { self.num_stages }

    pub fn cur_num_samples(&self) -> usize { self.cur_num_samples }

    pub fn features(&self) -> &dyn FeatureEvaluator { self.features.as_ref() }

    pub fn push_stage(&mut self, stage: BoostStage) {
        self.stages.push(stage);
        self.num_stages = self.stages.len();
    }

    pub fn set_image(
        &mut self,
        img: &GrayImage,
        class: SampleClass,
        slot: usize,
    ) -> Result<(), FeatureError> {
        self.features.set_image(img, class, slot)
    }

    /// Runs the sample in `slot` through every stage, stopping at the first
    /// rejection.
    pub fn classify(&self, slot: usize) -> bool {
        run_cascade(&self.stages, self.features.as_ref(), slot)
    }

    /// Fills slots `first..first + count` with samples of `class` that pass
    /// the cascade and returns how many were accepted.
    ///
    /// Drawing stops early when the source runs dry or faults, or once the
    /// running acceptance ratio falls to `min_acceptance_ratio`.
    pub fn fill_passed_samples(
        &mut self,
        first: usize,
        count: usize,
        class: SampleClass,
        min_acceptance_ratio: f64,
        consumed: &mut u64,
        source: &mut dyn SampleSource,
    ) -> usize {
        let label = match class {
            SampleClass::Positive => "POS",
            SampleClass::Negative => "NEG",
        };
        let mut accepted = 0;
        for slot in first..first + count {
            loop {
                if *consumed != 0
                    && (accepted + 1) as f64 / *consumed as f64 <= min_acceptance_ratio
                {
                    return accepted;
                }
                let img = match source.next_sample(class) {
                    Ok(Some(img)) => img,
                    Ok(None) => return accepted,
                    Err(err) => {
                        warn!("{label} source failed, keeping {accepted} samples: {err}");
                        return accepted;
                    }
                };
                *consumed += 1;

                if let Err(err) = self.features.set_image(&img, class, slot) {
                    warn!("{label} sample rejected by the evaluator: {err}");
                    return accepted;
                }
                if self.classify(slot) {
                    accepted += 1;
                    print!("{label} current samples: {accepted}\r");
                    if let Err(err) = io::stdout().flush() {
                        debug!("progress line not flushed: {err}");
                    }
                    break;
                }
            }
        }
        accepted
    }

    /// Re-streams the source through the cascade: positives into the first
    /// `num_pos` slots, then negatives after the accepted positives.
    pub fn refresh_training_set(
        &mut self,
        source: &mut dyn SampleSource,
        min_acceptance_ratio: f64,
    ) -> Result<RefreshStats, CascadeError> {
        source.restart();

        let mut pos_consumed = 0;
        let pos_count = self.fill_passed_samples(
            0,
            self.num_pos,
            SampleClass::Positive,
            0.0,
            &mut pos_consumed,
            source,
        );
        if pos_count == 0 {
            return Err(CascadeError::NoPositiveSamples);
        }
        let pos_acceptance_ratio = pos_count as f64 / pos_consumed as f64;
        println!(
            "POS count : consumed : acceptanceRatio   {pos_count} : {pos_consumed} : {pos_acceptance_ratio}"
        );

        let mut neg_consumed = 0;
        let neg_count = self.fill_passed_samples(
            pos_count,
            self.num_neg,
            SampleClass::Negative,
            min_acceptance_ratio,
            &mut neg_consumed,
            source,
        );

        self.cur_num_samples = pos_count + neg_count;
        let acceptance_ratio = if neg_consumed == 0 {
            0.0
        } else {
            neg_count as f64 / neg_consumed as f64
        };
        println!("NEG count : acceptanceRatio    {neg_count} : {acceptance_ratio}");

        Ok(RefreshStats {
            pos_count,
            pos_consumed,
            pos_acceptance_ratio,
            neg_count,
            neg_consumed,
            acceptance_ratio,
            current_samples: self.cur_num_samples,
        })
    }

    /// Compacted index of every variable referenced by at least one stage.
    pub fn used_features_map(&self) -> FeatureUsageMap {
        let mut usage = FeatureUsageMap::new(self.features.var_count());
        for stage in &self.stages {
            stage.mark_used_features(&mut usage);
        }
        usage.compact();
        usage
    }

    pub fn save(&self, path: &Path, format: SaveFormat) -> Result<(), CascadeError> {
        let body = match format {
            SaveFormat::Current => self.current_document(),
            SaveFormat::Legacy => self.legacy_document()?,
        };
        write_document(path, &default_object_name(path), body)?;
        info!("saved {} stages to {}", self.stages.len(), path.display());
        Ok(())
    }

    fn current_document(&self) -> Value {
        let usage = self.used_features_map();
        let mut body = Map::new();
        self.write_params(&mut body);
        body.insert(STAGE_NUM.into(), self.stages.len().into());
        let stages = self
            .stages
            .iter()
            .enumerate()
            .map(|(i, stage)| with_comment(&format!("stage {i}"), stage.write(&usage)))
            .collect();
        body.insert(STAGES.into(), Value::Array(stages));
        body.insert(FEATURES.into(), self.features.write_features(&usage));
        Value::Object(body)
    }

    fn legacy_document(&self) -> Result<Value, CascadeError> {
        if !self.params.feature_type.has_legacy_layout() {
            return Err(CascadeError::LegacyFamily(self.params.feature_type));
        }
        let stages: Vec<Value> = self
            .stages
            .iter()
            .enumerate()
            .map(|(si, stage)| {
                let trees: Vec<Value> = stage
                    .trees()
                    .iter()
                    .map(|tree| {
                        let nodes = tree
                            .legacy_nodes()
                            .into_iter()
                            .map(|node| self.legacy_node(&node))
                            .collect();
                        Value::Array(nodes)
                    })
                    .collect();
                json!({
                    LEGACY_TREES: trees,
                    LEGACY_STAGE_THRESHOLD: stage.threshold(),
                    LEGACY_PARENT: si as i64 - 1,
                    LEGACY_NEXT: -1,
                })
            })
            .collect();

        Ok(json!({
            LEGACY_TYPE_KEY: LEGACY_TYPE_ID,
            LEGACY_SIZE: [self.params.window.width, self.params.window.height],
            LEGACY_STAGES: stages,
        }))
    }

    fn legacy_node(&self, node: &LegacyNode) -> Value {
        let mut out = Map::new();
        out.insert(LEGACY_FEATURE.into(), self.features.descriptor(node.var));
        out.insert(LEGACY_THRESHOLD.into(), json!(node.threshold));
        for (child, node_key, val_key) in [
            (node.left, LEGACY_LEFT_NODE, LEGACY_LEFT_VAL),
            (node.right, LEGACY_RIGHT_NODE, LEGACY_RIGHT_VAL),
        ] {
            match child {
                ChildRef::Node(i) => out.insert(node_key.into(), i.into()),
                ChildRef::Leaf(v) => out.insert(val_key.into(), json!(v)),
            };
        }
        Value::Object(out)
    }

    /// Writes the cascade as a directory: `params.json` plus one document
    /// per stage, with split variables in the evaluator's full numbering.
    pub fn save_to_dir(&self, dir: &Path) -> Result<(), CascadeError> {
        fs::create_dir_all(dir).map_err(|source| StorageError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let params_path = dir.join(PARAMS_FILENAME);
        let mut params = Map::new();
        self.write_params(&mut params);
        write_document(&params_path, &default_object_name(&params_path), Value::Object(params))?;

        let identity = FeatureUsageMap::new(0);
        for (i, stage) in self.stages.iter().enumerate() {
            let path = stage_path(dir, i);
            write_document(&path, &default_object_name(&path), Value::Object(stage.write(&identity)))?;
        }
        Ok(())
    }

    /// Loads the cascade in `args.cascade_dir` and runs one refresh pass over
    /// the images named by `args.pos` and `args.neg`.
    pub fn validate(args: &ValidateArgs) -> Result<ValidationReport, CascadeError> {
        Self::validate_with(args, ImageSampleSource::create)
    }

    /// [`Cascade::validate`] with a caller-supplied sample source.
    pub fn validate_with<S, F>(
        args: &ValidateArgs,
        create_source: F,
    ) -> Result<ValidationReport, CascadeError>
    where
        S: SampleSource,
        F: FnOnce(&Path, &Path, WindowSize) -> Result<S, SourceError>,
    {
        let started = Instant::now();

        if args.cascade_dir.is_empty() {
            return Err(CascadeError::MissingPath("cascade directory"));
        }
        if args.pos.as_os_str().is_empty() {
            return Err(CascadeError::MissingPath("positive samples"));
        }
        if args.neg.as_os_str().is_empty() {
            return Err(CascadeError::MissingPath("background list"));
        }

        let dir = normalize_dir(&args.cascade_dir);
        let mut cascade =
            Self::load(Path::new(&dir), args.counts).map_err(|err| CascadeError::Load {
                dir: PathBuf::from(&dir),
                reason: err.to_string(),
            })?;
        println!("{:-^81}", "");
        println!("Loading Successful, performing validation");
        println!("{:-^81}", "");
        cascade.warn_on_overrides(args);

        let mut source = create_source(&args.pos, &args.neg, cascade.window()).map_err(|err| {
            println!(
                "Image reader can not be created from -vec {} and -bg {}.",
                args.pos.display(),
                args.neg.display()
            );
            CascadeError::from(err)
        })?;

        println!("PARAMETERS:");
        println!("cascadeDirName: {}", args.cascade_dir);
        println!("vecFileName: {}", args.pos.display());
        println!("bgFileName: {}", args.neg.display());
        println!("numNeg: {}", args.counts.num_neg);
        println!("numStages: {}", cascade.num_stages);
        for line in cascade
            .params
            .describe()
            .into_iter()
            .chain(cascade.stage_params.describe())
            .chain(cascade.feature_params.describe())
        {
            println!("{line}");
        }
        debug!(
            "precalcValBufSize {}Mb, precalcIdxBufSize {}Mb, baseFormatSave {}",
            args.precalc_val_buf_size, args.precalc_idx_buf_size, args.base_format_save
        );

        println!();
        println!("===== Validating =====");
        let refresh = match cascade.refresh_training_set(&mut source, 0.0) {
            Ok(stats) => Some(stats),
            Err(err) => {
                debug!("refresh failed: {err}");
                println!("Dataset could not be filled.");
                None
            }
        };

        let saturated = refresh.is_some_and(|stats| {
            args.acceptance_ratio_break_value >= 0.0
                && stats.acceptance_ratio <= args.acceptance_ratio_break_value
        });
        if saturated {
            info!(
                "negative acceptance ratio reached the break value {}",
                args.acceptance_ratio_break_value
            );
        }

        let elapsed = Elapsed::from(started.elapsed());
        println!("Validating has taken {elapsed}.");

        Ok(ValidationReport {
            cascade_dir: dir,
            loaded_stages: cascade.num_stages,
            refresh,
            saturated,
            elapsed,
        })
    }

    fn warn_on_overrides(&self, args: &ValidateArgs) {
        if args.cascade_params.is_some_and(|p| p != self.params) {
            warn!("command-line cascade parameters differ from the loaded cascade, using the loaded ones");
        }
        if args.stage_params.is_some_and(|p| p != self.stage_params) {
            warn!("command-line stage parameters differ from the loaded cascade, using the loaded ones");
        }
        if args.feature_params.is_some_and(|p| p != self.feature_params) {
            warn!("command-line feature parameters differ from the loaded cascade, using the loaded ones");
        }
    }
}
