use crate::accumulator::HitAccumulator;
use std::fmt;
use vek::*;

/// Everything a finished run produces: timings, counts, the reduced
/// accumulator, and the optional ray diagnostics.
#[derive(Clone, Debug)]
pub struct TraceResult {
    pub time_nanoseconds: u128,
    pub num_rays: usize,
    /// Intersect calls resolved on the surface geometry.
    pub geo_hits: u64,
    /// Intersect calls resolved on the boundary or terminating in the open.
    pub non_geo_hits: u64,
    /// Mixture draws discarded by the rectangle rejection step.
    pub rejected_samples: u64,
    /// Longest production trajectory, in intersect calls. The roulette
    /// keeps this bounded.
    pub max_trajectory_bounces: u64,
    /// Relevant pilot samples collected in phase 1.
    pub pilot_samples: usize,
    /// True when the mixture fit failed and the single-Gaussian fallback
    /// drove the production phase.
    pub fallback_used: bool,
    pub input_file: String,
    pub geometry_kind: &'static str,
    pub accumulator: HitAccumulator,
    /// Bounce segments recorded during the pilot, when enabled.
    pub ray_log: Vec<[Vec3<f32>; 2]>,
    /// Source points recorded during the pilot, when enabled.
    pub ray_src_log: Vec<Vec3<f32>>,
}

impl fmt::Display for TraceResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(:class trace-result {} {} {}hits {}non-hits {}rejected {}max-bounces \
             {}pilot-samples :fallback {} {}rays {}ns)",
            self.input_file,
            self.geometry_kind,
            self.geo_hits,
            self.non_geo_hits,
            self.rejected_samples,
            self.max_trajectory_bounces,
            self.pilot_samples,
            self.fallback_used,
            self.num_rays,
            self.time_nanoseconds,
        )
    }
}
