//! ASCII PLY export and import of coloured point clouds.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use nalgebra::Point3;

use crate::reconstruct::PointCloud;
use crate::DenseError;

const PROPERTIES: [&str; 6] = ["x", "y", "z", "red", "green", "blue"];

pub fn write_ply_to<W: Write>(mut out: W, cloud: &PointCloud) -> Result<(), DenseError> {
    writeln!(out, "ply")?;
    writeln!(out, "format ascii 1.0")?;
    writeln!(out, "element vertex {}", cloud.len())?;
    writeln!(out, "property float x")?;
    writeln!(out, "property float y")?;
    writeln!(out, "property float z")?;
    writeln!(out, "property uchar red")?;
    writeln!(out, "property uchar green")?;
    writeln!(out, "property uchar blue")?;
    writeln!(out, "end_header")?;
    for (p, c) in cloud.points.iter().zip(&cloud.colors) {
        writeln!(out, "{} {} {} {} {} {}", p.x, p.y, p.z, c[0], c[1], c[2])?;
    }
    out.flush()?;
    Ok(())
}

pub fn write_ply(path: impl AsRef<Path>, cloud: &PointCloud) -> Result<(), DenseError> {
    write_ply_to(BufWriter::new(File::create(path)?), cloud)
}

pub fn read_ply_from<R: BufRead>(input: R) -> Result<PointCloud, DenseError> {
    let bad = |msg: String| DenseError::Ply(msg);
    let mut lines = input.lines();
    let mut next_line = || -> Result<Option<String>, DenseError> {
        Ok(lines.next().transpose()?)
    };

    if next_line()?.as_deref().map(str::trim) != Some("ply") {
        return Err(bad("missing 'ply' magic".into()));
    }
    let mut count = None;
    let mut properties = Vec::new();
    loop {
        let line = next_line()?.ok_or_else(|| bad("header without end_header".into()))?;
        let tokens: Vec<&str> = line.split_whitespace().collect();
        match tokens.as_slice() {
            ["end_header"] => break,
            ["format", "ascii", _] => {}
            ["format", other, ..] => return Err(bad(format!("unsupported format '{other}'"))),
            ["element", "vertex", n] => {
                count = Some(n.parse::<usize>().map_err(|e| bad(format!("vertex count: {e}")))?);
            }
            ["property", _, name] => properties.push(name.to_string()),
            ["comment", ..] | [] => {}
            _ => return Err(bad(format!("unexpected header line '{line}'"))),
        }
    }
    let count = count.ok_or_else(|| bad("no vertex element".into()))?;
    if properties != PROPERTIES {
        return Err(bad(format!("unsupported vertex properties {properties:?}")));
    }

    let mut cloud = PointCloud {
        points: Vec::with_capacity(count),
        colors: Vec::with_capacity(count),
    };
    for i in 0..count {
        let line = next_line()?.ok_or_else(|| bad(format!("expected {count} vertices, got {i}")))?;
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != PROPERTIES.len() {
            return Err(bad(format!("vertex {i}: expected 6 values, got {}", fields.len())));
        }
        let coord = |k: usize| {
            fields[k]
                .parse::<f32>()
                .map_err(|e| bad(format!("vertex {i}: {e}")))
        };
        let colour = |k: usize| {
            fields[k]
                .parse::<u8>()
                .map_err(|e| bad(format!("vertex {i}: {e}")))
        };
        cloud.points.push(Point3::new(coord(0)?, coord(1)?, coord(2)?));
        cloud.colors.push([colour(3)?, colour(4)?, colour(5)?]);
    }
    Ok(cloud)
}

pub fn read_ply(path: impl AsRef<Path>) -> Result<PointCloud, DenseError> {
    read_ply_from(BufReader::new(File::open(path)?))
}
