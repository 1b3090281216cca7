use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing::{error, warn};

use cascade_validate::error::StorageError;
use cascade_validate::storage::write_document;
use cascade_validate::{
    BoostParams, Cascade, CascadeError, CascadeParams, FeatureParams, SampleCounts, SaveFormat,
    ValidateArgs,
};

#[derive(Parser)]
#[command(name = "cascade-validate")]
#[command(about = "Validate boosted rejection cascades against positive and background samples")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a cascade directory and run one refresh pass over the samples.
    Validate(ValidateCmd),

    /// Load a cascade directory and save it as a single document.
    Export(ExportCmd),
}

#[derive(Debug, Args)]
struct ValidateCmd {
    /// Cascade directory holding params.json and stage<N>.json.
    #[arg(long)]
    data: String,

    /// Positive samples: a .vec file, an image directory or an image list.
    #[arg(long)]
    vec: PathBuf,

    /// Background images: a list file or a directory.
    #[arg(long)]
    bg: PathBuf,

    #[arg(long, default_value_t = 2000)]
    num_pos: usize,

    #[arg(long, default_value_t = 1000)]
    num_neg: usize,

    /// Number of stages to load; fewer are used when the directory has fewer.
    #[arg(long, default_value_t = 20)]
    num_stages: usize,

    /// Feature value buffer size in Mb.
    #[arg(long, default_value_t = 1024)]
    precalc_val_buf_size: usize,

    /// Feature index buffer size in Mb.
    #[arg(long, default_value_t = 1024)]
    precalc_idx_buf_size: usize,

    #[arg(long)]
    base_format_save: bool,

    /// Report saturation once the negative acceptance ratio drops to this
    /// value; negative disables the check.
    #[arg(long, default_value_t = -1.0, allow_negative_numbers = true)]
    acceptance_ratio_break_value: f64,

    /// Write the validation report as JSON.
    #[arg(long)]
    report: Option<PathBuf>,

    /// Parameter pairs after `--`, e.g. `-- -featureType LBP -w 20 -h 20 -bt GAB`.
    #[arg(last = true)]
    params: Vec<String>,
}

#[derive(Debug, Args)]
struct ExportCmd {
    /// Cascade directory holding params.json and stage<N>.json.
    #[arg(long)]
    data: PathBuf,

    /// Output document.
    #[arg(long)]
    out: PathBuf,

    #[arg(long, default_value_t = 20)]
    num_stages: usize,

    /// Write the legacy single-document HAAR layout.
    #[arg(long)]
    legacy: bool,
}

/// Parameter groups named on the command line, `None` when untouched.
#[derive(Debug, Default)]
struct ParamOverrides {
    cascade: Option<CascadeParams>,
    stage: Option<BoostParams>,
    feature: Option<FeatureParams>,
}

/// Offers every `-name value` pair to the cascade group, then to the stage
/// and feature groups; the first group that claims it wins.
fn scan_params(pairs: &[String]) -> ParamOverrides {
    if pairs.len() % 2 != 0 {
        warn!("ignoring dangling parameter `{}`", pairs[pairs.len() - 1]);
    }
    let mut cascade = CascadeParams::default();
    let mut cascade_touched = false;
    let mut rest = Vec::new();
    for pair in pairs.chunks_exact(2) {
        if cascade.scan_attr(&pair[0], &pair[1]) {
            cascade_touched = true;
        } else {
            rest.push(pair);
        }
    }

    let mut out = ParamOverrides {
        cascade: cascade_touched.then_some(cascade),
        ..Default::default()
    };
    let mut stage = BoostParams::default();
    let mut feature = FeatureParams::new(cascade.feature_type);
    for pair in rest {
        if stage.scan_attr(&pair[0], &pair[1]) {
            out.stage = Some(stage);
        } else if feature.scan_attr(&pair[0], &pair[1]) {
            out.feature = Some(feature);
        } else {
            warn!("unknown parameter `{} {}`", pair[0], pair[1]);
        }
    }
    out
}

fn run_validate(cmd: &ValidateCmd) -> Result<(), CascadeError> {
    let overrides = scan_params(&cmd.params);
    let args = ValidateArgs {
        cascade_dir: cmd.data.clone(),
        pos: cmd.vec.clone(),
        neg: cmd.bg.clone(),
        counts: SampleCounts {
            num_pos: cmd.num_pos,
            num_neg: cmd.num_neg,
            num_stages: cmd.num_stages,
        },
        precalc_val_buf_size: cmd.precalc_val_buf_size,
        precalc_idx_buf_size: cmd.precalc_idx_buf_size,
        cascade_params: overrides.cascade,
        stage_params: overrides.stage,
        feature_params: overrides.feature,
        base_format_save: cmd.base_format_save,
        acceptance_ratio_break_value: cmd.acceptance_ratio_break_value,
    };
    let report = Cascade::validate(&args)?;

    if let Some(path) = &cmd.report {
        let body = serde_json::to_value(&report).map_err(|source| StorageError::Write {
            path: path.clone(),
            source,
        })?;
        write_document(path, "report", body)?;
        tracing::info!("report written to {}", path.display());
    }
    Ok(())
}

fn run_export(cmd: &ExportCmd) -> Result<(), CascadeError> {
    let counts = SampleCounts {
        num_pos: 0,
        num_neg: 0,
        num_stages: cmd.num_stages,
    };
    let cascade = Cascade::load(&cmd.data, counts).map_err(|err| CascadeError::Load {
        dir: cmd.data.clone(),
        reason: err.to_string(),
    })?;
    let format = if cmd.legacy {
        SaveFormat::Legacy
    } else {
        SaveFormat::Current
    };
    cascade.save(&cmd.out, format)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let result = match &cli.command {
        Commands::Validate(cmd) => run_validate(cmd),
        Commands::Export(cmd) => run_export(cmd),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) if err.is_fatal() => {
            error!("{err}");
            ExitCode::from(2)
        }
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_validate::{BoostType, FeatureFamily, HaarMode, WindowSize};

    fn strings(args: &[&str]) -> Vec<String> { args.iter().map(|s| s.to_string()).collect() }

    #[test]
    fn pairs_go_to_the_first_group_that_claims_them() {
        let o = scan_params(&strings(&[
            "-bt", "RAB", "-featureType", "HAAR", "-mode", "ALL", "-w", "20", "-h", "20",
        ]));
        let cascade = o.cascade.unwrap();
        assert_eq!(cascade.feature_type, FeatureFamily::Haar);
        assert_eq!(cascade.window, WindowSize::new(20, 20));
        assert_eq!(o.stage.unwrap().boost_type, BoostType::Real);
        assert_eq!(o.feature.unwrap().mode, HaarMode::All);
    }

    #[test]
    fn untouched_groups_stay_none() {
        let o = scan_params(&strings(&["-maxDepth", "2", "-unknown", "1", "-w"]));
        assert!(o.cascade.is_none());
        assert!(o.feature.is_none());
        assert_eq!(o.stage.unwrap().max_depth, 2);
    }

    #[test]
    fn cli_parses_validate() {
        let cli = Cli::try_parse_from([
            "cascade-validate",
            "validate",
            "--data",
            "out",
            "--vec",
            "pos.vec",
            "--bg",
            "bg.txt",
            "--num-pos",
            "10",
            "--acceptance-ratio-break-value",
            "-1",
            "--",
            "-featureType",
            "LBP",
        ])
        .unwrap();
        let Commands::Validate(cmd) = cli.command else {
            panic!("expected validate");
        };
        assert_eq!(cmd.num_pos, 10);
        assert_eq!(cmd.num_neg, 1000);
        assert_eq!(cmd.params, strings(&["-featureType", "LBP"]));
    }
}
