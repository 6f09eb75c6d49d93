//! JSON persistence of [`StereoParameters`].
//!
//! Matrices are stored as row-major nested arrays under the conventional
//! keys `K1 D1 K2 D2 R T E F`; distortion vectors as one row in
//! `[k1, k2, p1, p2, k3]` order and `T` as a 3×1 column.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use log::info;
use nalgebra::{Dim, Matrix, RawStorage};
use serde::{Deserialize, Serialize};
use stereo_core::{ImageSize, Mat3, PinholeCamera, Real, StereoExtrinsics, StereoParameters, Vec3};
use tempfile::NamedTempFile;

use crate::{PipelineError, Result};

type Rows = Vec<Vec<Real>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StereoParamsDocument {
    pub image_size: ImageSize,
    #[serde(rename = "K1")]
    pub k1: Rows,
    #[serde(rename = "D1")]
    pub d1: Rows,
    #[serde(rename = "K2")]
    pub k2: Rows,
    #[serde(rename = "D2")]
    pub d2: Rows,
    #[serde(rename = "R")]
    pub r: Rows,
    #[serde(rename = "T")]
    pub t: Rows,
    #[serde(rename = "E")]
    pub e: Rows,
    #[serde(rename = "F")]
    pub f: Rows,
    pub reprojection_error: Real,
    #[serde(rename = "reprojection_error_L", default, skip_serializing_if = "Option::is_none")]
    pub reprojection_error_left: Option<Real>,
    #[serde(rename = "reprojection_error_R", default, skip_serializing_if = "Option::is_none")]
    pub reprojection_error_right: Option<Real>,
}

fn rows<R: Dim, C: Dim, S: RawStorage<Real, R, C>>(m: &Matrix<Real, R, C, S>) -> Rows {
    (0..m.nrows())
        .map(|i| (0..m.ncols()).map(|j| m[(i, j)]).collect())
        .collect()
}

fn shape(rows: &Rows) -> String {
    match rows.first() {
        Some(first) if rows.iter().all(|r| r.len() == first.len()) => {
            format!("{}x{}", rows.len(), first.len())
        }
        Some(_) => "ragged".into(),
        None => "0x0".into(),
    }
}

fn shape_error(name: &str, expected: &str, rows: &Rows) -> PipelineError {
    PipelineError::GeometryShape {
        name: name.into(),
        expected: expected.into(),
        found: shape(rows),
    }
}

fn mat3(name: &str, rows: &Rows) -> Result<Mat3> {
    if rows.len() != 3 || rows.iter().any(|r| r.len() != 3) {
        return Err(shape_error(name, "3x3", rows));
    }
    let flat: Vec<Real> = rows.iter().flatten().copied().collect();
    Ok(Mat3::from_row_slice(&flat))
}

/// Single row or single column with an accepted length.
fn vector(name: &str, rows: &Rows, lengths: &[usize], expected: &str) -> Result<Vec<Real>> {
    let flat: Vec<Real> = match rows.as_slice() {
        [row] => row.clone(),
        _ if rows.iter().all(|r| r.len() == 1) => rows.iter().map(|r| r[0]).collect(),
        _ => return Err(shape_error(name, expected, rows)),
    };
    if !lengths.contains(&flat.len()) {
        return Err(shape_error(name, expected, rows));
    }
    Ok(flat)
}

fn camera(k_name: &str, k: &Rows, d_name: &str, d: &Rows) -> Result<PinholeCamera> {
    let k = mat3(k_name, k)?;
    let coeffs = vector(d_name, d, &[4, 5], "1x5")?;
    Ok(PinholeCamera::from_parts(&k, &coeffs))
}

impl StereoParamsDocument {
    pub fn from_params(p: &StereoParameters) -> Self {
        Self {
            image_size: p.image_size,
            k1: rows(&p.left.k_matrix()),
            d1: vec![p.left.dist.coeffs().to_vec()],
            k2: rows(&p.right.k_matrix()),
            d2: vec![p.right.dist.coeffs().to_vec()],
            r: rows(&p.extrinsics.rotation),
            t: rows(&p.extrinsics.translation),
            e: rows(&p.essential),
            f: rows(&p.fundamental),
            reprojection_error: p.rms,
            reprojection_error_left: p.rms_left,
            reprojection_error_right: p.rms_right,
        }
    }

    pub fn into_params(self) -> Result<StereoParameters> {
        let t = vector("T", &self.t, &[3], "3x1")?;
        Ok(StereoParameters {
            image_size: self.image_size,
            left: camera("K1", &self.k1, "D1", &self.d1)?,
            right: camera("K2", &self.k2, "D2", &self.d2)?,
            extrinsics: StereoExtrinsics {
                rotation: mat3("R", &self.r)?,
                translation: Vec3::new(t[0], t[1], t[2]),
            },
            essential: mat3("E", &self.e)?,
            fundamental: mat3("F", &self.f)?,
            rms: self.reprojection_error,
            rms_left: self.reprojection_error_left,
            rms_right: self.reprojection_error_right,
        })
    }
}

/// Write `params` to `path` atomically: a temporary file in the same
/// directory is renamed into place once fully written.
pub fn save_stereo_params(path: &Path, params: &StereoParameters) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;
    let tmp = NamedTempFile::new_in(dir)?;
    {
        let mut out = BufWriter::new(tmp.as_file());
        serde_json::to_writer_pretty(&mut out, &StereoParamsDocument::from_params(params))?;
        out.write_all(b"\n")?;
        out.flush()?;
    }
    tmp.persist(path).map_err(|e| PipelineError::Io(e.error))?;
    info!("stereo parameters saved to {}", path.display());
    Ok(())
}

pub fn load_stereo_params(path: &Path) -> Result<StereoParameters> {
    if !path.is_file() {
        return Err(PipelineError::MissingCalibration {
            path: path.to_path_buf(),
        });
    }
    let text = fs::read_to_string(path)?;
    let doc: StereoParamsDocument = serde_json::from_str(&text)?;
    let params = doc.into_params()?;
    info!("stereo parameters loaded from {}", path.display());
    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Translation3, UnitQuaternion};
    use stereo_core::{BrownConrady5, FxFyCxCySkew, Iso3};

    pub(crate) fn sample_params() -> StereoParameters {
        let rig = Iso3::from_parts(
            Translation3::new(-59.873_214_5, 0.412_3, 1.000_000_1),
            UnitQuaternion::from_euler_angles(0.003_1, -0.021_7, 0.000_9),
        );
        let cam = |fx: Real, k1: Real| {
            PinholeCamera::new(
                FxFyCxCySkew {
                    fx,
                    fy: fx * 0.998_7,
                    cx: 319.123_456_789,
                    cy: 241.987_654_321,
                    skew: 0.0,
                },
                BrownConrady5 {
                    k1,
                    k2: 0.031_415_926,
                    p1: -1.2e-4,
                    p2: 3.3e-5,
                    ..BrownConrady5::default()
                },
            )
        };
        StereoParameters {
            image_size: ImageSize::new(640, 480),
            left: cam(801.234_567_891_234, -0.171_717),
            right: cam(799.1, -0.15),
            extrinsics: StereoExtrinsics::from_iso(&rig),
            essential: Mat3::new(0.1, -1.0 / 3.0, 2.0, 1e-12, 0.0, -7.5, 3.25, 1.0, 0.0),
            fundamental: Mat3::new(1e-7, 2e-6, -3e-3, -4e-6, 5e-8, 6e-3, 1e-3, -2e-3, 1.0),
            rms: 0.213_456_789,
            rms_left: Some(0.18),
            rms_right: None,
        }
    }

    #[test]
    fn round_trip_is_exact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("stereo_params.json");
        let params = sample_params();
        save_stereo_params(&path, &params).unwrap();
        assert_eq!(load_stereo_params(&path).unwrap(), params);
    }

    #[test]
    fn document_uses_conventional_keys() {
        let value = serde_json::to_value(StereoParamsDocument::from_params(&sample_params())).unwrap();
        for key in ["K1", "D1", "K2", "D2", "R", "T", "E", "F", "reprojection_error", "reprojection_error_L"] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
        assert!(value.get("reprojection_error_R").is_none());
        assert_eq!(value["T"].as_array().unwrap().len(), 3);
        assert_eq!(value["D1"][0].as_array().unwrap().len(), 5);
    }

    #[test]
    fn missing_file_asks_for_calibration() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_stereo_params(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, PipelineError::MissingCalibration { .. }));
    }

    #[test]
    fn wrong_matrix_shape_is_reported() {
        let mut doc = StereoParamsDocument::from_params(&sample_params());
        doc.r.pop();
        let err = doc.into_params().unwrap_err();
        match err {
            PipelineError::GeometryShape { name, found, .. } => {
                assert_eq!(name, "R");
                assert_eq!(found, "2x3");
            }
            other => panic!("unexpected error {other}"),
        }

        let mut doc = StereoParamsDocument::from_params(&sample_params());
        doc.t = vec![vec![1.0, 2.0]];
        assert!(matches!(doc.into_params(), Err(PipelineError::GeometryShape { .. })));
    }
}
