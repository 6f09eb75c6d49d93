//! Calibration image discovery.

use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

use image::DynamicImage;
use log::{debug, info};
use stereo_core::ImageSize;

use crate::{PipelineError, Result};

const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

/// Where calibration image pairs come from.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageSource {
    /// Left and right series in one directory, matched by natural order of
    /// the file names starting with each prefix.
    Directory {
        dir: PathBuf,
        left_prefix: String,
        right_prefix: String,
    },
    /// Explicit `(left, right)` pairs.
    Pairs(Vec<(PathBuf, PathBuf)>),
}

impl ImageSource {
    /// Directory source with the `leftPic` / `rightPic` naming convention.
    pub fn directory(dir: impl Into<PathBuf>) -> Self {
        Self::Directory {
            dir: dir.into(),
            left_prefix: "leftPic".into(),
            right_prefix: "rightPic".into(),
        }
    }
}

enum Chunk<'a> {
    Number(&'a str),
    Text(&'a str),
}

fn chunks(s: &str) -> Vec<Chunk<'_>> {
    let mut out = Vec::new();
    let mut start = 0;
    let bytes = s.as_bytes();
    while start < bytes.len() {
        let digit = bytes[start].is_ascii_digit();
        let end = bytes[start..]
            .iter()
            .position(|b| b.is_ascii_digit() != digit)
            .map_or(bytes.len(), |p| start + p);
        let part = &s[start..end];
        out.push(if digit { Chunk::Number(part) } else { Chunk::Text(part) });
        start = end;
    }
    out
}

fn cmp_numbers(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Human ordering: digit runs compare by value, text case-insensitively,
/// so `img2` sorts before `img10`.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let (ca, cb) = (chunks(a), chunks(b));
    for (x, y) in ca.iter().zip(&cb) {
        let ord = match (x, y) {
            (Chunk::Number(x), Chunk::Number(y)) => cmp_numbers(x, y),
            (Chunk::Text(x), Chunk::Text(y)) => x.to_lowercase().cmp(&y.to_lowercase()),
            (Chunk::Number(_), Chunk::Text(_)) => Ordering::Less,
            (Chunk::Text(_), Chunk::Number(_)) => Ordering::Greater,
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    ca.len().cmp(&cb.len()).then_with(|| a.cmp(b))
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

fn series(dir: &Path, prefix: &str) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let matches_prefix = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(prefix));
        if matches_prefix && path.is_file() && is_image(&path) {
            files.push(path);
        }
    }
    files.sort_by(|a, b| {
        let name = |p: &PathBuf| p.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        natural_cmp(&name(a), &name(b))
    });
    Ok(files)
}

/// Ordered `(left, right)` pairs of a source.
pub fn resolve_pairs(source: &ImageSource) -> Result<Vec<(PathBuf, PathBuf)>> {
    let pairs = match source {
        ImageSource::Directory {
            dir,
            left_prefix,
            right_prefix,
        } => {
            if !dir.is_dir() {
                return Err(PipelineError::InputStructure(format!(
                    "image directory {} does not exist",
                    dir.display()
                )));
            }
            let left = series(dir, left_prefix)?;
            let right = series(dir, right_prefix)?;
            if left.len() != right.len() {
                return Err(PipelineError::InputStructure(format!(
                    "{} left images but {} right images in {}",
                    left.len(),
                    right.len(),
                    dir.display()
                )));
            }
            left.into_iter().zip(right).collect()
        }
        ImageSource::Pairs(pairs) => pairs.clone(),
    };
    if pairs.is_empty() {
        return Err(PipelineError::EmptyObservationSet);
    }
    info!("found {} image pairs", pairs.len());
    Ok(pairs)
}

fn unreadable(path: &Path, err: image::ImageError) -> PipelineError {
    PipelineError::InputStructure(format!("cannot read image {}: {err}", path.display()))
}

/// Decode an image file. Missing, unreadable and corrupt files are input
/// errors naming the offending path.
pub fn open_image(path: &Path) -> Result<DynamicImage> {
    image::open(path).map_err(|e| unreadable(path, e))
}

/// Common resolution of every image, read from the file headers.
pub fn check_resolutions(pairs: &[(PathBuf, PathBuf)]) -> Result<ImageSize> {
    let mut expected: Option<ImageSize> = None;
    for path in pairs.iter().flat_map(|(l, r)| [l, r]) {
        let (w, h) = image::image_dimensions(path).map_err(|e| unreadable(path, e))?;
        let size = ImageSize::new(w, h);
        match expected {
            None => expected = Some(size),
            Some(e) if e != size => {
                return Err(PipelineError::InputStructure(format!(
                    "{} is {size}, expected {e}",
                    path.display()
                )));
            }
            Some(_) => {}
        }
    }
    let size = expected.ok_or(PipelineError::EmptyObservationSet)?;
    debug!("all images are {size}");
    Ok(size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corrupt_or_missing_images_name_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("leftPic1.png");
        image::GrayImage::new(8, 6).save(&good).unwrap();
        let corrupt = dir.path().join("rightPic1.png");
        fs::write(&corrupt, b"\x89PNG\r\n\x1a\n not really a png").unwrap();

        let err = check_resolutions(&[(good.clone(), corrupt.clone())]).unwrap_err();
        match err {
            PipelineError::InputStructure(msg) => assert!(msg.contains("rightPic1.png"), "{msg}"),
            other => panic!("unexpected error {other:?}"),
        }

        let err = open_image(&corrupt).unwrap_err();
        assert!(matches!(err, PipelineError::InputStructure(ref m) if m.contains("rightPic1.png")));
        let missing = dir.path().join("leftPic9.png");
        assert!(matches!(open_image(&missing), Err(PipelineError::InputStructure(_))));
        assert_eq!(open_image(&good).unwrap().width(), 8);
    }

    #[test]
    fn listing_errors_propagate() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("leftPic1.png");
        fs::write(&file, b"").unwrap();
        assert!(matches!(series(&file, "left"), Err(PipelineError::Io(_))));
        assert_eq!(series(dir.path(), "left").unwrap(), vec![file]);
    }

    #[test]
    fn natural_order_compares_numbers_by_value() {
        let mut names = vec!["leftPic10.jpg", "leftPic2.jpg", "leftPic1.jpg", "LeftPic3.jpg"];
        names.sort_by(|a, b| natural_cmp(a, b));
        assert_eq!(
            names,
            vec!["leftPic1.jpg", "leftPic2.jpg", "LeftPic3.jpg", "leftPic10.jpg"]
        );
        assert_eq!(natural_cmp("a007", "a7"), Ordering::Less);
    }

    #[test]
    fn directory_pairs_follow_prefixes_and_extensions() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "leftPic1.jpg",
            "leftPic10.jpg",
            "leftPic2.png",
            "rightPic2.jpg",
            "rightPic1.jpg",
            "rightPic10.JPG",
            "leftPic3.txt",
            "notes.md",
        ] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        let pairs = resolve_pairs(&ImageSource::directory(dir.path())).unwrap();
        let names: Vec<(String, String)> = pairs
            .iter()
            .map(|(l, r)| {
                (
                    l.file_name().unwrap().to_string_lossy().into_owned(),
                    r.file_name().unwrap().to_string_lossy().into_owned(),
                )
            })
            .collect();
        assert_eq!(
            names,
            vec![
                ("leftPic1.jpg".to_string(), "rightPic1.jpg".to_string()),
                ("leftPic2.png".to_string(), "rightPic2.jpg".to_string()),
                ("leftPic10.jpg".to_string(), "rightPic10.JPG".to_string()),
            ]
        );
    }

    #[test]
    fn uneven_series_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("leftPic1.jpg"), b"").unwrap();
        let err = resolve_pairs(&ImageSource::directory(dir.path())).unwrap_err();
        assert!(matches!(err, PipelineError::InputStructure(_)));
    }

    #[test]
    fn empty_sources_are_empty_observation_sets() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_pairs(&ImageSource::directory(dir.path())).unwrap_err();
        assert!(matches!(err, PipelineError::EmptyObservationSet));
        let err = resolve_pairs(&ImageSource::Pairs(Vec::new())).unwrap_err();
        assert!(matches!(err, PipelineError::EmptyObservationSet));
    }
}
