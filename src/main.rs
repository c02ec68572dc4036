use anyhow::Context;
use clap::Parser;
use fluxtrace::io::{self, PrimitiveMode};
use fluxtrace::{Boundary, ExposedAreaMode, Source, SourcePlane, TraceConfig, Tracer};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;
use vek::*;

/// Default sticking coefficient applied to every primitive.
const STICKING_DEFAULT: f32 = 0.8;

#[derive(Parser, Debug)]
#[command(name = "fluxtrace", version, about = "Monte Carlo particle-flux simulator")]
struct Args {
    /// Path of the input surface (OBJ mesh or disc point cloud)
    #[arg(short = 'i', long = "infile")]
    infile: PathBuf,

    /// Path of the output file; `.vtp` is appended when missing
    #[arg(short = 'o', long = "outfile")]
    outfile: Option<PathBuf>,

    /// Number of production rays
    #[arg(short = 'r', long = "number-of-rays", default_value_t = 1024 * 1024)]
    number_of_rays: usize,

    /// Maximum number of worker threads
    #[arg(short = 'm', long = "max-threads")]
    max_threads: Option<usize>,

    /// Use triangles as surface primitives (the default)
    #[arg(long, conflicts_with = "discs")]
    triangles: bool,

    /// Use discs as surface primitives
    #[arg(long)]
    discs: bool,

    /// Write `.ray-log.vtp` / `.ray-src-log.vtp` diagnostics
    #[arg(long)]
    log_rays: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();

    let mode = if args.discs {
        PrimitiveMode::Discs
    } else {
        PrimitiveMode::Triangles
    };
    let geometry = io::read_geometry(&args.infile, mode, STICKING_DEFAULT)
        .with_context(|| format!("reading {}", args.infile.display()))?;
    info!(
        primitives = geometry.primitive_count(),
        kind = geometry.kind(),
        "surface loaded"
    );

    let bbox = geometry.bounding_box();
    let boundary = Boundary::new(bbox);
    // The source is the open top face of the boundary, spanning the
    // geometry's x/y extent.
    let source = Source::new(SourcePlane {
        z: boundary.zmax(),
        c1: Vec2::new(bbox.min.x, bbox.min.y),
        c2: Vec2::new(bbox.max.x, bbox.max.y),
    });

    let config = TraceConfig {
        num_rays: args.number_of_rays,
        max_threads: args.max_threads,
        exposed_area: match mode {
            PrimitiveMode::Triangles => ExposedAreaMode::WholeArea,
            PrimitiveMode::Discs => ExposedAreaMode::Sampling,
        },
        log_rays: args.log_rays,
        input_label: args.infile.display().to_string(),
        ..Default::default()
    };

    let tracer = Tracer::new(&geometry, &boundary, &source, config);
    let result = tracer.run().context("tracing failed")?;
    println!("{result}");

    if let Some(outfile) = args.outfile {
        let outfile = match outfile.extension() {
            Some(ext) if ext == "vtp" => outfile,
            _ => {
                info!("appending .vtp to the given file name");
                let mut name = outfile.into_os_string();
                name.push(".vtp");
                PathBuf::from(name)
            }
        };
        let stem = outfile.with_extension("");

        info!("writing output to {}", outfile.display());
        let metadata = vec![
            ("input-file".to_string(), result.input_file.clone()),
            ("number-of-rays".to_string(), result.num_rays.to_string()),
            (
                "time-nanoseconds".to_string(),
                result.time_nanoseconds.to_string(),
            ),
        ];
        io::write_geometry_vtp(&outfile, &geometry, &result.accumulator, &metadata)
            .with_context(|| format!("writing {}", outfile.display()))?;

        let bbfile = stem.with_extension("bounding-box.vtp");
        info!("writing bounding box to {}", bbfile.display());
        io::write_boundary_vtp(&bbfile, &boundary)?;

        if !result.ray_log.is_empty() {
            let raylog = stem.with_extension("ray-log.vtp");
            info!("writing ray log to {}", raylog.display());
            io::write_ray_log_vtp(&raylog, &result.ray_log)?;
        }
        if !result.ray_src_log.is_empty() {
            let srclog = stem.with_extension("ray-src-log.vtp");
            info!("writing ray source log to {}", srclog.display());
            io::write_ray_src_log_vtp(&srclog, &result.ray_src_log)?;
        }
    }

    Ok(())
}
