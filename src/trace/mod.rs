pub mod context;
pub mod result;
pub mod tracer;

// Reexports
pub use self::context::{
    TrajectoryContext, INITIAL_RAY_WEIGHT, RAY_RENEW_WEIGHT, RAY_WEIGHT_LOWER_THRESHOLD, STEP_EPS,
};
pub use self::result::TraceResult;
pub use self::tracer::{ExposedAreaMode, SourceSample, TraceConfig, Tracer};
