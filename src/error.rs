use std::io;

/// Failure kinds surfaced by the crate.
///
/// Anything that fires before tracing begins (`InputFormat`, `SceneBuild`,
/// `OutOfMemory`) is reported and the run never starts. `InvariantViolation`
/// aborts a running trace without writing partial output. `StatsUnavailable`
/// is recoverable: the tracer falls back to a single-Gaussian source fit and
/// flags the result record.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("input format error: {0}")]
    InputFormat(String),

    #[error("scene build error: {0}")]
    SceneBuild(String),

    #[error("out of memory: {0}")]
    OutOfMemory(String),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("statistics fit unavailable: {0}")]
    StatsUnavailable(String),

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
