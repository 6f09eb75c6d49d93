use std::path::Path;

use image::GrayImage;
use nalgebra::{Translation3, UnitQuaternion};
use stereo_core::synthetic::{render_chessboard, tilted_board_poses, ChessboardStyle};
use stereo_core::{
    BrownConrady5, CalibrationTarget, FxFyCxCySkew, ImageSize, Iso3, PinholeCamera, Vec3,
};
use stereo_pipeline::{
    load_stereo_params, run_calibration, CornerOverlayWriter, ImageSource, PipelineConfig,
    PipelineError,
};

const SIZE: ImageSize = ImageSize {
    width: 640,
    height: 480,
};

fn cameras() -> (PinholeCamera, PinholeCamera) {
    let left = PinholeCamera::new(
        FxFyCxCySkew {
            fx: 800.0,
            fy: 796.0,
            cx: 318.0,
            cy: 242.0,
            skew: 0.0,
        },
        BrownConrady5 {
            k1: -0.1,
            ..BrownConrady5::default()
        },
    );
    let right = PinholeCamera::new(
        FxFyCxCySkew {
            fx: 790.0,
            fy: 788.0,
            cx: 324.0,
            cy: 236.0,
            skew: 0.0,
        },
        BrownConrady5 {
            k1: -0.08,
            ..BrownConrady5::default()
        },
    );
    (left, right)
}

fn rig() -> Iso3 {
    Iso3::from_parts(
        Translation3::new(-60.0, 0.5, 0.0),
        UnitQuaternion::from_scaled_axis(Vec3::new(0.0, 0.02, 0.005)),
    )
}

/// Rendered `leftPicN.png` / `rightPicN.png` pairs of one rig.
fn write_pairs(dir: &Path, target: &CalibrationTarget, n: usize) {
    let (left, right) = cameras();
    for (i, pose) in tilted_board_poses(target, n, 650.0, 0.3).iter().enumerate() {
        let style = ChessboardStyle::default();
        render_chessboard(&left, pose, target, SIZE, style)
            .save(dir.join(format!("leftPic{}.png", i + 1)))
            .unwrap();
        render_chessboard(&right, &(rig() * pose), target, SIZE, style)
            .save(dir.join(format!("rightPic{}.png", i + 1)))
            .unwrap();
    }
}

#[test]
fn rendered_pairs_calibrate_the_rig() {
    let dir = tempfile::tempdir().unwrap();
    let config = PipelineConfig::default();
    write_pairs(dir.path(), &config.calibration.target, 8);
    let params_path = dir.path().join("out").join("stereo_params.json");
    let overlays = CornerOverlayWriter::new(dir.path().join("overlays")).unwrap();

    let outcome = run_calibration(
        &ImageSource::directory(dir.path()),
        &config,
        &params_path,
        Some(&overlays),
    )
    .unwrap();

    assert_eq!(outcome.observations.len(), 8);
    assert_eq!(outcome.params.image_size, SIZE);
    assert!(outcome.params.rms < 0.5, "rms {}", outcome.params.rms);
    assert!(outcome.params.rms_left.unwrap() < 0.5);

    let t = outcome.params.extrinsics.translation;
    let expected = rig().translation.vector;
    assert!((t - expected).norm() < 2.0, "T {t:?}");
    let (left, _) = cameras();
    assert!((outcome.params.left.k.fx - left.k.fx).abs() < 8.0);

    assert_eq!(load_stereo_params(&params_path).unwrap(), outcome.params);
    assert!(overlays.path_for(0).is_file());
    assert!(overlays.path_for(7).is_file());
}

#[test]
fn empty_directory_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let params_path = dir.path().join("stereo_params.json");
    let err = run_calibration(
        &ImageSource::directory(dir.path()),
        &PipelineConfig::default(),
        &params_path,
        None,
    )
    .unwrap_err();
    assert!(matches!(err, PipelineError::EmptyObservationSet));
    assert!(!params_path.exists());
}

#[test]
fn blank_images_leave_no_observations() {
    let dir = tempfile::tempdir().unwrap();
    for i in 1..=2 {
        for side in ["leftPic", "rightPic"] {
            GrayImage::from_pixel(160, 120, image::Luma([128]))
                .save(dir.path().join(format!("{side}{i}.png")))
                .unwrap();
        }
    }
    let params_path = dir.path().join("stereo_params.json");
    let err = run_calibration(
        &ImageSource::directory(dir.path()),
        &PipelineConfig::default(),
        &params_path,
        None,
    )
    .unwrap_err();
    assert!(matches!(err, PipelineError::EmptyObservationSet));
    assert!(!params_path.exists());
}

#[test]
fn mixed_resolutions_fail_before_detection() {
    let dir = tempfile::tempdir().unwrap();
    let save = |name: &str, w: u32, h: u32| {
        let path = dir.path().join(name);
        GrayImage::new(w, h).save(&path).unwrap();
        path
    };
    let pairs = vec![
        (save("a_l.png", 64, 48), save("a_r.png", 64, 48)),
        (save("b_l.png", 64, 48), save("b_r.png", 48, 64)),
    ];
    let params_path = dir.path().join("stereo_params.json");
    let err = run_calibration(
        &ImageSource::Pairs(pairs),
        &PipelineConfig::default(),
        &params_path,
        None,
    )
    .unwrap_err();
    assert!(matches!(err, PipelineError::InputStructure(_)), "{err}");
    assert!(!params_path.exists());
}

#[test]
fn unequal_series_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["leftPic1.png", "leftPic2.png", "rightPic1.png"] {
        GrayImage::new(8, 8).save(dir.path().join(name)).unwrap();
    }
    let err = run_calibration(
        &ImageSource::directory(dir.path()),
        &PipelineConfig::default(),
        &dir.path().join("p.json"),
        None,
    )
    .unwrap_err();
    assert!(matches!(err, PipelineError::InputStructure(_)));
}

#[test]
fn strict_quality_ceiling_aborts_without_writing() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = PipelineConfig::default();
    write_pairs(dir.path(), &config.calibration.target, 5);
    config.calibration.mono_max_rms = 1e-9;
    let params_path = dir.path().join("stereo_params.json");
    let err = run_calibration(&ImageSource::directory(dir.path()), &config, &params_path, None)
        .unwrap_err();
    assert!(
        matches!(err, PipelineError::CalibrationQuality { .. }),
        "{err}"
    );
    assert!(!params_path.exists());
}
