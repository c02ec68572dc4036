use crate::accumulator::HitAccumulator;
use crate::error::Result;
use crate::geom::{Boundary, Geometry, Primitives};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use vek::*;

/// Write the traced surface with its per-primitive counters as VTK XML
/// poly-data (ascii). Metadata pairs land in the file's `FieldData`;
/// integer-valued entries are written as `Int64` arrays, everything else as
/// VTK string arrays.
pub fn write_geometry_vtp(
    path: &Path,
    geometry: &Geometry,
    accumulator: &HitAccumulator,
    metadata: &[(String, String)],
) -> Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    header(&mut w)?;
    field_data(&mut w, metadata)?;
    match geometry.primitives() {
        Primitives::Triangles(triangles) => {
            let vertices = geometry.vertices();
            writeln!(
                w,
                "    <Piece NumberOfPoints=\"{}\" NumberOfVerts=\"0\" NumberOfLines=\"0\" \
                 NumberOfStrips=\"0\" NumberOfPolys=\"{}\">",
                vertices.len(),
                triangles.len()
            )?;
            points(&mut w, vertices.iter().copied())?;
            cell_data(&mut w, accumulator)?;
            writeln!(w, "      <Polys>")?;
            write!(
                w,
                "        <DataArray type=\"Int64\" Name=\"connectivity\" format=\"ascii\">\n         "
            )?;
            for tri in triangles {
                write!(w, " {} {} {}", tri[0], tri[1], tri[2])?;
            }
            writeln!(w, "\n        </DataArray>")?;
            write!(
                w,
                "        <DataArray type=\"Int64\" Name=\"offsets\" format=\"ascii\">\n         "
            )?;
            for i in 1..=triangles.len() {
                write!(w, " {}", i * 3)?;
            }
            writeln!(w, "\n        </DataArray>")?;
            writeln!(w, "      </Polys>")?;
        }
        Primitives::Discs(discs) => {
            writeln!(
                w,
                "    <Piece NumberOfPoints=\"{}\" NumberOfVerts=\"{}\" NumberOfLines=\"0\" \
                 NumberOfStrips=\"0\" NumberOfPolys=\"0\">",
                discs.len(),
                discs.len()
            )?;
            points(&mut w, discs.iter().map(|d| d.center))?;
            writeln!(w, "      <PointData Normals=\"normal\">")?;
            write!(
                w,
                "        <DataArray type=\"Float32\" Name=\"normal\" NumberOfComponents=\"3\" \
                 format=\"ascii\">\n         "
            )?;
            for d in discs {
                write!(w, " {} {} {}", d.normal.x, d.normal.y, d.normal.z)?;
            }
            writeln!(w, "\n        </DataArray>")?;
            write!(
                w,
                "        <DataArray type=\"Float32\" Name=\"radius\" format=\"ascii\">\n         "
            )?;
            for d in discs {
                write!(w, " {}", d.radius)?;
            }
            writeln!(w, "\n        </DataArray>")?;
            writeln!(w, "      </PointData>")?;
            cell_data(&mut w, accumulator)?;
            writeln!(w, "      <Verts>")?;
            write!(
                w,
                "        <DataArray type=\"Int64\" Name=\"connectivity\" format=\"ascii\">\n         "
            )?;
            for i in 0..discs.len() {
                write!(w, " {i}")?;
            }
            writeln!(w, "\n        </DataArray>")?;
            write!(
                w,
                "        <DataArray type=\"Int64\" Name=\"offsets\" format=\"ascii\">\n         "
            )?;
            for i in 1..=discs.len() {
                write!(w, " {i}")?;
            }
            writeln!(w, "\n        </DataArray>")?;
            writeln!(w, "      </Verts>")?;
        }
    }
    footer(&mut w)?;
    Ok(())
}

/// Write the reflective boundary as its eight lateral triangles.
pub fn write_boundary_vtp(path: &Path, boundary: &Boundary) -> Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    header(&mut w)?;
    let triangles = boundary.triangles();
    writeln!(
        w,
        "    <Piece NumberOfPoints=\"8\" NumberOfVerts=\"0\" NumberOfLines=\"0\" \
         NumberOfStrips=\"0\" NumberOfPolys=\"{}\">",
        triangles.len()
    )?;
    points(&mut w, boundary.vertices().iter().copied())?;
    writeln!(w, "      <Polys>")?;
    write!(
        w,
        "        <DataArray type=\"Int64\" Name=\"connectivity\" format=\"ascii\">\n         "
    )?;
    for tri in triangles {
        write!(w, " {} {} {}", tri[0], tri[1], tri[2])?;
    }
    writeln!(w, "\n        </DataArray>")?;
    write!(
        w,
        "        <DataArray type=\"Int64\" Name=\"offsets\" format=\"ascii\">\n         "
    )?;
    for i in 1..=triangles.len() {
        write!(w, " {}", i * 3)?;
    }
    writeln!(w, "\n        </DataArray>")?;
    writeln!(w, "      </Polys>")?;
    footer(&mut w)?;
    Ok(())
}

/// Diagnostic dump of pilot bounce segments as VTK lines.
pub fn write_ray_log_vtp(path: &Path, segments: &[[Vec3<f32>; 2]]) -> Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    header(&mut w)?;
    writeln!(
        w,
        "    <Piece NumberOfPoints=\"{}\" NumberOfVerts=\"0\" NumberOfLines=\"{}\" \
         NumberOfStrips=\"0\" NumberOfPolys=\"0\">",
        segments.len() * 2,
        segments.len()
    )?;
    points(&mut w, segments.iter().flatten().copied())?;
    writeln!(w, "      <Lines>")?;
    write!(
        w,
        "        <DataArray type=\"Int64\" Name=\"connectivity\" format=\"ascii\">\n         "
    )?;
    for i in 0..segments.len() {
        write!(w, " {} {}", i * 2, i * 2 + 1)?;
    }
    writeln!(w, "\n        </DataArray>")?;
    write!(
        w,
        "        <DataArray type=\"Int64\" Name=\"offsets\" format=\"ascii\">\n         "
    )?;
    for i in 1..=segments.len() {
        write!(w, " {}", i * 2)?;
    }
    writeln!(w, "\n        </DataArray>")?;
    writeln!(w, "      </Lines>")?;
    footer(&mut w)?;
    Ok(())
}

/// Diagnostic dump of pilot source points as VTK vertices.
pub fn write_ray_src_log_vtp(path: &Path, src_points: &[Vec3<f32>]) -> Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    header(&mut w)?;
    writeln!(
        w,
        "    <Piece NumberOfPoints=\"{}\" NumberOfVerts=\"{}\" NumberOfLines=\"0\" \
         NumberOfStrips=\"0\" NumberOfPolys=\"0\">",
        src_points.len(),
        src_points.len()
    )?;
    points(&mut w, src_points.iter().copied())?;
    writeln!(w, "      <Verts>")?;
    write!(
        w,
        "        <DataArray type=\"Int64\" Name=\"connectivity\" format=\"ascii\">\n         "
    )?;
    for i in 0..src_points.len() {
        write!(w, " {i}")?;
    }
    writeln!(w, "\n        </DataArray>")?;
    write!(
        w,
        "        <DataArray type=\"Int64\" Name=\"offsets\" format=\"ascii\">\n         "
    )?;
    for i in 1..=src_points.len() {
        write!(w, " {i}")?;
    }
    writeln!(w, "\n        </DataArray>")?;
    writeln!(w, "      </Verts>")?;
    footer(&mut w)?;
    Ok(())
}

fn header(w: &mut impl Write) -> Result<()> {
    writeln!(w, "<?xml version=\"1.0\"?>")?;
    writeln!(
        w,
        "<VTKFile type=\"PolyData\" version=\"0.1\" byte_order=\"LittleEndian\">"
    )?;
    writeln!(w, "  <PolyData>")?;
    Ok(())
}

fn footer(w: &mut impl Write) -> Result<()> {
    writeln!(w, "    </Piece>")?;
    writeln!(w, "  </PolyData>")?;
    writeln!(w, "</VTKFile>")?;
    Ok(())
}

fn field_data(w: &mut impl Write, metadata: &[(String, String)]) -> Result<()> {
    if metadata.is_empty() {
        return Ok(());
    }
    writeln!(w, "    <FieldData>")?;
    for (name, value) in metadata {
        if let Ok(number) = value.parse::<i64>() {
            writeln!(
                w,
                "      <DataArray type=\"Int64\" Name=\"{name}\" NumberOfTuples=\"1\" \
                 format=\"ascii\"> {number} </DataArray>"
            )?;
        } else {
            // VTK string arrays in ascii: one decimal per byte, 0-terminated.
            write!(
                w,
                "      <DataArray type=\"String\" Name=\"{name}\" NumberOfTuples=\"1\" \
                 format=\"ascii\">"
            )?;
            for byte in value.bytes() {
                write!(w, " {byte}")?;
            }
            writeln!(w, " 0 </DataArray>")?;
        }
    }
    writeln!(w, "    </FieldData>")?;
    Ok(())
}

fn points(w: &mut impl Write, points: impl Iterator<Item = Vec3<f32>>) -> Result<()> {
    writeln!(w, "      <Points>")?;
    write!(
        w,
        "        <DataArray type=\"Float32\" NumberOfComponents=\"3\" format=\"ascii\">\n         "
    )?;
    for p in points {
        write!(w, " {} {} {}", p.x, p.y, p.z)?;
    }
    writeln!(w, "\n        </DataArray>")?;
    writeln!(w, "      </Points>")?;
    Ok(())
}

fn cell_data(w: &mut impl Write, accumulator: &HitAccumulator) -> Result<()> {
    writeln!(w, "      <CellData Scalars=\"deposited\">")?;
    write!(
        w,
        "        <DataArray type=\"Float64\" Name=\"deposited\" format=\"ascii\">\n         "
    )?;
    for v in accumulator.deposited() {
        write!(w, " {v}")?;
    }
    writeln!(w, "\n        </DataArray>")?;
    write!(
        w,
        "        <DataArray type=\"Float64\" Name=\"exposed_area\" format=\"ascii\">\n         "
    )?;
    for v in accumulator.exposed_areas() {
        write!(w, " {v}")?;
    }
    writeln!(w, "\n        </DataArray>")?;
    write!(
        w,
        "        <DataArray type=\"Int64\" Name=\"hit_count\" format=\"ascii\">\n         "
    )?;
    for v in accumulator.hit_counts() {
        write!(w, " {v}")?;
    }
    writeln!(w, "\n        </DataArray>")?;
    writeln!(w, "      </CellData>")?;
    Ok(())
}
