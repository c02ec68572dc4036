//! Monte Carlo particle-flux estimation for micro-structure surfaces.
//!
//! A surface — a triangle mesh or a point cloud of oriented discs — sits
//! below a rectangular source plane that emits particles with
//! cosine-weighted directions. Each particle carries a weight that is
//! partially absorbed on every surface hit (the sticking coefficient),
//! specularly reflected at the lateral domain boundary, and stochastically
//! renewed or killed by roulette once it runs low. The tracer first runs a
//! pilot pass to learn where deposition happens, fits a Gaussian mixture to
//! those source positions, and then drives the production rays from the
//! mixture with importance-sampling weight correction.
//!
//! The result is a set of per-primitive counters: `deposited` flux,
//! `exposed_area`, and `hit_count`, written out as VTK poly-data.

pub mod accumulator;
pub mod error;
pub mod geom;
pub mod io;
pub mod math;
pub mod reflection;
pub mod rng;
pub mod scene;
pub mod source;
pub mod stats;
pub mod trace;

// Reexports
pub use self::accumulator::HitAccumulator;
pub use self::error::{Error, Result};
pub use self::geom::{Aabb, Boundary, Disc, Geometry, PrimId, Primitives};
pub use self::reflection::ReflectionModel;
pub use self::rng::{Pcg64Source, Pcg64State, RandomSource};
pub use self::scene::{CommittedScene, Ray, RayHit, Scene, SceneGeometry};
pub use self::source::{Source, SourcePlane};
pub use self::stats::GaussianMixture;
pub use self::trace::{ExposedAreaMode, TraceConfig, TraceResult, Tracer};
