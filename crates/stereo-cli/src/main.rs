use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use log::info;
use stereo_pipeline::{
    load_config, run_calibration, run_reconstruction, CornerOverlayWriter, DetectionObserver,
    ImageSource, OutputMode, PipelineConfig, ReconstructionRequest,
};

/// Stereo camera calibration and dense reconstruction.
#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Calibrate a stereo rig from chessboard image pairs.
    Calibrate(CalibrateArgs),
    /// Rectify and match one image pair with a stored calibration.
    Match(MatchArgs),
}

#[derive(Debug, clap::Args)]
struct CalibrateArgs {
    /// Directory with leftPicN / rightPicN images.
    #[arg(long)]
    images: Option<PathBuf>,
    /// Inner corners per row.
    #[arg(long)]
    cols: Option<usize>,
    /// Inner corners per column.
    #[arg(long)]
    rows: Option<usize>,
    /// Square edge length; sets the unit of T and of reconstructed points.
    #[arg(long)]
    square_size: Option<f64>,
    /// Output parameter file.
    #[arg(long)]
    params: Option<PathBuf>,
    /// Write corner overlays for every pair into this directory.
    #[arg(long)]
    overlays: Option<PathBuf>,
    /// JSON run configuration.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputArg {
    Disparity,
    Cloud,
    None,
}

impl From<OutputArg> for OutputMode {
    fn from(arg: OutputArg) -> Self {
        match arg {
            OutputArg::Disparity => OutputMode::Disparity,
            OutputArg::Cloud => OutputMode::PointCloud,
            OutputArg::None => OutputMode::None,
        }
    }
}

#[derive(Debug, clap::Args)]
struct MatchArgs {
    /// Left image; defaults to left.png in the configured test image directory.
    #[arg(long)]
    left: Option<PathBuf>,
    #[arg(long)]
    right: Option<PathBuf>,
    #[arg(long)]
    params: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = OutputArg::Cloud)]
    output: OutputArg,
    #[arg(long)]
    out_dir: Option<PathBuf>,
    /// Also write the rectified pair and a disparity preview.
    #[arg(long)]
    verbose: bool,
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(err) = try_main() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn try_main() -> anyhow::Result<()> {
    match Args::parse().command {
        Command::Calibrate(args) => calibrate(args),
        Command::Match(args) => match_pair(args),
    }
}

fn config_for(path: Option<&Path>) -> anyhow::Result<PipelineConfig> {
    load_config(path).with_context(|| match path {
        Some(p) => format!("loading configuration {}", p.display()),
        None => "default configuration".into(),
    })
}

impl CalibrateArgs {
    fn apply(&self, config: &mut PipelineConfig) {
        let target = &mut config.calibration.target;
        if let Some(cols) = self.cols {
            target.cols = cols;
        }
        if let Some(rows) = self.rows {
            target.rows = rows;
        }
        if let Some(size) = self.square_size {
            target.square_size = size;
        }
        if let Some(dir) = &self.images {
            config.paths.calibration_images = dir.clone();
        }
        if let Some(params) = &self.params {
            config.paths.params_file = params.clone();
        }
    }
}

fn calibrate(args: CalibrateArgs) -> anyhow::Result<()> {
    let mut config = config_for(args.config.as_deref())?;
    args.apply(&mut config);

    let overlays = args
        .overlays
        .as_ref()
        .map(CornerOverlayWriter::new)
        .transpose()
        .context("creating overlay directory")?;
    let observer = overlays.as_ref().map(|w| w as &dyn DetectionObserver);

    let source = ImageSource::directory(&config.paths.calibration_images);
    let outcome = run_calibration(&source, &config, &config.paths.params_file, observer)?;
    let p = &outcome.params;
    info!(
        "{} pairs used, rms {:.4} px, baseline {:.3}",
        outcome.observations.len(),
        p.rms,
        p.extrinsics.baseline()
    );
    println!("{}", serde_json::to_string_pretty(&p.extrinsics)?);
    Ok(())
}

impl MatchArgs {
    fn request(&self, config: &PipelineConfig) -> ReconstructionRequest {
        let test_dir = &config.paths.test_images;
        ReconstructionRequest {
            left: self.left.clone().unwrap_or_else(|| test_dir.join("left.png")),
            right: self.right.clone().unwrap_or_else(|| test_dir.join("right.png")),
            params_path: self
                .params
                .clone()
                .unwrap_or_else(|| config.paths.params_file.clone()),
            output: self.output.into(),
            out_dir: self
                .out_dir
                .clone()
                .unwrap_or_else(|| config.paths.output_dir.clone()),
            verbose: self.verbose,
        }
    }
}

fn match_pair(args: MatchArgs) -> anyhow::Result<()> {
    let config = config_for(args.config.as_deref())?;
    let request = args.request(&config);
    let outcome = run_reconstruction(&request, &config)?;
    for path in &outcome.written {
        println!("{}", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn calibrate_flags_override_config() {
        let args = Args::try_parse_from([
            "stereo", "calibrate", "--images", "pairs", "--cols", "7", "--rows", "5",
            "--square-size", "30", "--params", "out/p.json",
        ])
        .unwrap();
        let Command::Calibrate(cal) = args.command else {
            panic!("expected calibrate");
        };
        let mut config = PipelineConfig::default();
        cal.apply(&mut config);
        let t = config.calibration.target;
        assert_eq!((t.cols, t.rows, t.square_size), (7, 5, 30.0));
        assert_eq!(config.paths.calibration_images, PathBuf::from("pairs"));
        assert_eq!(config.paths.params_file, PathBuf::from("out/p.json"));
    }

    #[test]
    fn match_defaults_come_from_config_paths() {
        let args = Args::try_parse_from(["stereo", "match", "--output", "disparity"]).unwrap();
        let Command::Match(m) = args.command else {
            panic!("expected match");
        };
        let config = PipelineConfig::default();
        let req = m.request(&config);
        assert_eq!(req.output, OutputMode::Disparity);
        assert_eq!(req.left, config.paths.test_images.join("left.png"));
        assert_eq!(req.params_path, config.paths.params_file);
        assert!(!req.verbose);
    }

    #[test]
    fn unknown_output_mode_is_rejected() {
        assert!(Args::try_parse_from(["stereo", "match", "--output", "mesh"]).is_err());
    }

    #[test]
    fn config_file_feeds_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"reconstruction": {"decimation": 3}}"#).unwrap();
        let config = config_for(Some(&path)).unwrap();
        assert_eq!(config.reconstruction.decimation, 3);
        assert!(config_for(Some(&dir.path().join("absent.json"))).is_err());
    }
}
