#![allow(dead_code)]

use std::fs;
use std::path::Path;

use cascade_validate::{
    BoostParams, BoostStage, Cascade, CascadeParams, DecisionTree, FeatureFamily, FeatureParams,
    HaarMode, SampleCounts, Split, TreeNode, WindowSize,
};
use image::{GrayImage, Luma};

pub const WINDOW: WindowSize = WindowSize::new(6, 6);

pub fn counts(num_pos: usize, num_neg: usize, num_stages: usize) -> SampleCounts {
    SampleCounts {
        num_pos,
        num_neg,
        num_stages,
    }
}

pub fn flat(v: u8) -> GrayImage { GrayImage::from_pixel(WINDOW.width, WINDOW.height, Luma([v])) }

/// First LBP block centre brighter than its ring, so its code is 0.
pub fn bright_centre() -> GrayImage {
    GrayImage::from_fn(WINDOW.width, WINDOW.height, |x, y| {
        Luma([if (x, y) == (1, 1) { 200 } else { 10 }])
    })
}

pub fn stump(var: usize, split: Split, left: f32, right: f32) -> DecisionTree {
    DecisionTree::from_nodes(vec![
        TreeNode::Split {
            var,
            split,
            left: 1,
            right: 2,
        },
        TreeNode::Leaf(left),
        TreeNode::Leaf(right),
    ])
    .unwrap()
}

/// Subset words holding every LBP code below `min_code`.
pub fn codes_below(min_code: i32) -> Split {
    let words = (0..8)
        .map(|w| {
            (0..32)
                .filter(|b| w * 32 + b < min_code)
                .fold(0i32, |acc, b| acc | (1 << b))
        })
        .collect();
    Split::Categorical(words)
}

/// `stages` identical LBP stages, each accepting windows whose first code is
/// at least 128.
pub fn lbp_cascade(stages: usize) -> Cascade {
    let params = CascadeParams {
        feature_type: FeatureFamily::Lbp,
        window: WINDOW,
        ..Default::default()
    };
    let mut cascade = Cascade::new(
        params,
        BoostParams::default(),
        FeatureParams::new(FeatureFamily::Lbp),
        counts(0, 0, 0),
    );
    for _ in 0..stages {
        let tree = stump(0, codes_below(128), -1.0, 1.0);
        cascade.push_stage(BoostStage::new(BoostParams::default(), 0.0, vec![tree]));
    }
    cascade
}

/// HAAR cascade with a depth-two first tree and a stump in the second stage.
pub fn haar_cascade() -> Cascade {
    let params = CascadeParams {
        feature_type: FeatureFamily::Haar,
        window: WINDOW,
        ..Default::default()
    };
    let feature_params = FeatureParams {
        mode: HaarMode::Basic,
        ..FeatureParams::new(FeatureFamily::Haar)
    };
    let mut cascade = Cascade::new(params, BoostParams::default(), feature_params, counts(0, 0, 0));

    let deep = DecisionTree::from_nodes(vec![
        TreeNode::Split {
            var: 7,
            split: Split::Ordered(0.5),
            left: 1,
            right: 2,
        },
        TreeNode::Split {
            var: 3,
            split: Split::Ordered(-0.25),
            left: 3,
            right: 4,
        },
        TreeNode::Leaf(0.75),
        TreeNode::Leaf(-1.0),
        TreeNode::Leaf(0.5),
    ])
    .unwrap();
    cascade.push_stage(BoostStage::new(BoostParams::default(), -0.5, vec![deep]));
    cascade.push_stage(BoostStage::new(
        BoostParams::default(),
        0.25,
        vec![stump(3, Split::Ordered(0.125), 1.0, -1.0)],
    ));
    cascade
}

/// Packs window-sized samples into a `.vec` file.
pub fn write_vec(path: &Path, samples: &[GrayImage]) {
    let mut bytes = Vec::new();
    bytes.extend((samples.len() as i32).to_le_bytes());
    bytes.extend((WINDOW.width as i32 * WINDOW.height as i32).to_le_bytes());
    bytes.extend([0u8; 4]);
    for sample in samples {
        bytes.push(0);
        for px in sample.pixels() {
            bytes.extend(i16::from(px[0]).to_le_bytes());
        }
    }
    fs::write(path, bytes).unwrap();
}

/// Saves `images` under `dir` and writes a list file naming them relative to
/// the list's own directory.
pub fn write_background_list(dir: &Path, images: &[GrayImage]) -> std::path::PathBuf {
    fs::create_dir_all(dir.join("bg")).unwrap();
    let mut list = String::new();
    for (i, img) in images.iter().enumerate() {
        let name = format!("bg/{i}.png");
        img.save(dir.join(&name)).unwrap();
        list.push_str(&name);
        list.push('\n');
    }
    let path = dir.join("bg.txt");
    fs::write(&path, list).unwrap();
    path
}
