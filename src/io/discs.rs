use crate::error::{Error, Result};
use crate::geom::{Disc, Geometry};
use std::fs;
use std::path::Path;
use vek::*;

/// Read an oriented-disc point cloud from a whitespace-separated text file.
///
/// One disc per row as `x y z nx ny nz radius`; empty lines and `#`
/// comments are skipped.
pub fn read_discs(path: &Path, sticking_default: f32) -> Result<Geometry> {
    let content = fs::read_to_string(path)
        .map_err(|e| Error::InputFormat(format!("{}: {e}", path.display())))?;
    let mut discs = Vec::new();
    for (lineno, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<f32> = line
            .split_whitespace()
            .map(|f| {
                f.parse::<f32>().map_err(|_| {
                    Error::InputFormat(format!(
                        "{}:{}: not a number: {f:?}",
                        path.display(),
                        lineno + 1
                    ))
                })
            })
            .collect::<Result<_>>()?;
        if fields.len() != 7 {
            return Err(Error::InputFormat(format!(
                "{}:{}: expected 7 fields, found {}",
                path.display(),
                lineno + 1,
                fields.len()
            )));
        }
        discs.push(Disc {
            center: Vec3::new(fields[0], fields[1], fields[2]),
            normal: Vec3::new(fields[3], fields[4], fields[5]),
            radius: fields[6],
        });
    }
    if discs.is_empty() {
        return Err(Error::InputFormat(format!(
            "{}: no discs found",
            path.display()
        )));
    }
    Geometry::from_discs(discs, sticking_default)
}
