use image::{Rgb, RgbImage};
use rand::{rngs::StdRng, Rng, SeedableRng};
use stereo_core::{
    skew_symmetric, BrownConrady5, FxFyCxCySkew, ImageSize, Mat3, PinholeCamera, Real,
    StereoExtrinsics, StereoParameters, Vec3,
};
use stereo_dense::read_ply;
use stereo_pipeline::{
    run_reconstruction, save_stereo_params, OutputMode, PipelineConfig, PipelineError,
    ReconstructionRequest,
};

const W: u32 = 240;
const H: u32 = 100;
const SHIFT: u32 = 40;
const FOCAL: Real = 500.0;
const BASELINE: Real = 60.0;

/// Two identical undistorted cameras side by side; already rectified.
fn params() -> StereoParameters {
    let camera = PinholeCamera::new(
        FxFyCxCySkew {
            fx: FOCAL,
            fy: FOCAL,
            cx: (W - 1) as Real / 2.0,
            cy: (H - 1) as Real / 2.0,
            skew: 0.0,
        },
        BrownConrady5::default(),
    );
    let rotation = Mat3::identity();
    let translation = Vec3::new(-BASELINE, 0.0, 0.0);
    let essential = skew_symmetric(&translation) * rotation;
    let k_inv = camera.k_matrix().try_inverse().unwrap();
    StereoParameters {
        image_size: ImageSize::new(W, H),
        left: camera,
        right: camera,
        extrinsics: StereoExtrinsics {
            rotation,
            translation,
        },
        essential,
        fundamental: k_inv.transpose() * essential * k_inv,
        rms: 0.1,
        rms_left: None,
        rms_right: None,
    }
}

/// Random texture seen by the left camera and shifted by `SHIFT` in the right.
fn plane_pair() -> (RgbImage, RgbImage) {
    let mut rng = StdRng::seed_from_u64(5);
    let wide: Vec<u8> = (0..(W + SHIFT) * H).map(|_| rng.random()).collect();
    let at = |x: u32, y: u32| {
        let v = wide[(y * (W + SHIFT) + x) as usize];
        Rgb([v, v, v])
    };
    let left = RgbImage::from_fn(W, H, |x, y| at(x, y));
    let right = RgbImage::from_fn(W, H, |x, y| at(x + SHIFT, y));
    (left, right)
}

fn config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.rectify.alpha = None;
    config
}

struct Fixture {
    dir: tempfile::TempDir,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        save_stereo_params(&dir.path().join("stereo_params.json"), &params()).unwrap();
        let (left, right) = plane_pair();
        left.save(dir.path().join("left.png")).unwrap();
        right.save(dir.path().join("right.png")).unwrap();
        Self { dir }
    }

    fn request(&self, output: OutputMode, verbose: bool) -> ReconstructionRequest {
        let p = self.dir.path();
        ReconstructionRequest {
            left: p.join("left.png"),
            right: p.join("right.png"),
            params_path: p.join("stereo_params.json"),
            output,
            out_dir: p.join("out"),
            verbose,
        }
    }
}

#[test]
fn fronto_parallel_plane_is_reconstructed_at_its_depth() {
    let fx = Fixture::new();
    let outcome = run_reconstruction(&fx.request(OutputMode::PointCloud, false), &config()).unwrap();

    let expected = (FOCAL * BASELINE / SHIFT as Real) as f32;
    let n = outcome.cloud.len();
    assert!(n > (W * H / 2) as usize, "only {n} points");
    let mut depths: Vec<f32> = outcome.cloud.points.iter().map(|p| p.z).collect();
    depths.sort_by(f32::total_cmp);
    let median = depths[depths.len() / 2];
    assert!((median - expected).abs() < 0.02 * expected, "median depth {median}");

    assert_eq!(outcome.written, vec![fx.dir.path().join("out").join("point_cloud.ply")]);
    let cloud = read_ply(&outcome.written[0]).unwrap();
    assert_eq!(cloud.len(), n);
}

#[test]
fn sentinel_pixels_never_reach_the_cloud() {
    let fx = Fixture::new();
    let outcome = run_reconstruction(&fx.request(OutputMode::None, false), &config()).unwrap();
    let disp = &outcome.disparity;
    let grid = &outcome.reconstruction.grid;
    let mut expected = 0;
    for y in 0..disp.height {
        for x in 0..disp.width {
            if disp.value(x, y).is_some() {
                let z = grid.at(x, y).map(|p| p.z);
                if z.is_some_and(|z| z.is_finite() && z < config().reconstruction.max_depth) {
                    expected += 1;
                }
            }
        }
    }
    assert_eq!(outcome.reconstruction.cloud.len(), expected);
    assert!(outcome.written.is_empty());
}

#[test]
fn decimation_and_verbose_outputs() {
    let fx = Fixture::new();
    let mut cfg = config();
    cfg.reconstruction.decimation = 4;
    let outcome = run_reconstruction(&fx.request(OutputMode::Disparity, true), &cfg).unwrap();
    let full = outcome.reconstruction.cloud.len();
    assert_eq!(outcome.cloud.len(), full.div_ceil(4));
    assert_eq!(outcome.cloud.points[1], outcome.reconstruction.cloud.points[4]);

    let out = fx.dir.path().join("out");
    for name in ["disparity.png", "rectified_pair.png", "disparity_preview.png"] {
        assert!(out.join(name).is_file(), "{name} missing");
    }
    let pair = image::open(out.join("rectified_pair.png")).unwrap();
    assert_eq!((pair.width(), pair.height()), (2 * W, H));
}

#[test]
fn mismatched_pair_sizes_are_rejected() {
    let fx = Fixture::new();
    RgbImage::new(W / 2, H)
        .save(fx.dir.path().join("right.png"))
        .unwrap();
    let err = run_reconstruction(&fx.request(OutputMode::PointCloud, false), &config()).unwrap_err();
    assert!(matches!(err, PipelineError::InputStructure(_)), "{err}");
}
