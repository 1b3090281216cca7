mod common;

use std::fs;
use std::path::PathBuf;

use approx::assert_relative_eq;
use cascade_validate::{Cascade, CascadeError, ValidateArgs};
use image::{GrayImage, Luma};
use tempfile::tempdir;

use common::{bright_centre, counts, flat, lbp_cascade, write_background_list, write_vec};

fn args(data: &std::path::Path, pos: PathBuf, neg: PathBuf) -> ValidateArgs {
    ValidateArgs {
        cascade_dir: data.to_string_lossy().into_owned(),
        pos,
        neg,
        counts: counts(10, 5, 5),
        precalc_val_buf_size: 1024,
        precalc_idx_buf_size: 1024,
        cascade_params: None,
        stage_params: None,
        feature_params: None,
        base_format_save: false,
        acceptance_ratio_break_value: -1.0,
    }
}

#[test]
fn validates_a_partial_cascade_against_vec_and_background() {
    let dir = tempdir().unwrap();
    let data = dir.path().join("data");
    lbp_cascade(2).save_to_dir(&data).unwrap();

    let pos = dir.path().join("pos.vec");
    write_vec(&pos, &[flat(10), bright_centre(), flat(40), bright_centre()]);
    let neg = write_background_list(dir.path(), &[GrayImage::from_pixel(12, 12, Luma([50]))]);

    let mut args = args(&data, pos, neg);
    args.acceptance_ratio_break_value = 1.0;
    let report = Cascade::validate(&args).unwrap();

    assert_eq!(report.loaded_stages, 2);
    assert!(report.cascade_dir.ends_with('/'));
    let stats = report.refresh.unwrap();
    assert_eq!((stats.pos_count, stats.pos_consumed), (2, 4));
    assert_relative_eq!(stats.pos_acceptance_ratio, 0.5);
    assert_eq!((stats.neg_count, stats.neg_consumed), (5, 5));
    assert_relative_eq!(stats.acceptance_ratio, 1.0);
    assert_eq!(stats.current_samples, 7);
    assert!(report.saturated);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["loadedStages"], 2);
    assert_eq!(json["refresh"]["negCount"], 5);
}

#[test]
fn no_accepted_positive_reports_an_unfilled_dataset() {
    let dir = tempdir().unwrap();
    let data = dir.path().join("data");
    lbp_cascade(1).save_to_dir(&data).unwrap();

    let pos = dir.path().join("pos.vec");
    write_vec(&pos, &[bright_centre(), bright_centre()]);
    let neg = write_background_list(dir.path(), &[GrayImage::from_pixel(12, 12, Luma([50]))]);

    let report = Cascade::validate(&args(&data, pos, neg)).unwrap();
    assert_eq!(report.loaded_stages, 1);
    assert!(report.refresh.is_none());
    assert!(!report.saturated);
}

#[test]
fn missing_parameters_are_fatal() {
    let dir = tempdir().unwrap();
    let data = dir.path().join("empty");
    fs::create_dir_all(&data).unwrap();

    let err = Cascade::validate(&args(&data, "pos.vec".into(), "bg.txt".into())).unwrap_err();
    assert!(matches!(err, CascadeError::Load { .. }));
    assert!(err.is_fatal());
}

#[test]
fn unreadable_sample_source_is_recoverable() {
    let dir = tempdir().unwrap();
    let data = dir.path().join("data");
    lbp_cascade(1).save_to_dir(&data).unwrap();

    let err = Cascade::validate(&args(
        &data,
        dir.path().join("missing.vec"),
        dir.path().join("missing.txt"),
    ))
    .unwrap_err();
    assert!(matches!(err, CascadeError::Source(_)));
    assert!(!err.is_fatal());
}

#[test]
fn every_path_is_required() {
    let dir = tempdir().unwrap();
    let mut a = args(dir.path(), "pos.vec".into(), PathBuf::new());
    assert!(matches!(
        Cascade::validate(&a),
        Err(CascadeError::MissingPath(_))
    ));
    a.cascade_dir.clear();
    a.neg = "bg.txt".into();
    assert!(Cascade::validate(&a).unwrap_err().is_fatal());
}
