use rand::{RngCore, SeedableRng};
use rand_pcg::Pcg64Mcg;

/// Pluggable pseudo-random generator.
///
/// The generator itself is stateless and may be shared between threads; all
/// mutable state lives in `State` values which are strictly thread-local.
/// Every worker owns two independent states, one for source sampling and one
/// for reflection sampling — mixing the two through a single state raises the
/// variance of the flux estimate considerably.
pub trait RandomSource: Send + Sync {
    type State: Clone + Send;

    /// Next raw value, uniform in `[min(), max()]`. Deterministic given the
    /// state's seed.
    fn get(&self, state: &mut Self::State) -> u64;

    fn min(&self) -> u64;

    fn max(&self) -> u64;

    /// Uniform variate in `[0, 1)`. The default maps the top 24 bits of a
    /// full-range `get`; sources with a narrower range must override.
    #[inline]
    fn uniform_f32(&self, state: &mut Self::State) -> f32 {
        (self.get(state) >> 40) as f32 * (1.0 / (1u64 << 24) as f32)
    }

    /// Uniform variate in `[0, 1)` with 53 bits of resolution.
    #[inline]
    fn uniform_f64(&self, state: &mut Self::State) -> f64 {
        (self.get(state) >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }
}

/// Per-worker seed pair: `(thread_index + 1) * 29` for source sampling and
/// the same offset by 2 for reflection sampling.
#[inline]
pub fn thread_seeds(thread_index: usize) -> (u64, u64) {
    let seed = (thread_index as u64 + 1) * 29;
    (seed, seed + 2)
}

/// State of [`Pcg64Source`]: a PCG-64 (MCG multiplier) generator.
///
/// Also implements [`rand::RngCore`] so `rand_distr` distributions can draw
/// from the same stream that the capability trait advances.
#[derive(Clone, Debug)]
pub struct Pcg64State(Pcg64Mcg);

impl Pcg64State {
    pub fn seed_from(seed: u64) -> Self {
        Self(Pcg64Mcg::seed_from_u64(seed))
    }
}

impl RngCore for Pcg64State {
    #[inline]
    fn next_u32(&mut self) -> u32 {
        self.0.next_u32()
    }

    #[inline]
    fn next_u64(&mut self) -> u64 {
        self.0.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.0.fill_bytes(dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.0.try_fill_bytes(dest)
    }
}

/// The default full-range random source.
#[derive(Clone, Copy, Debug, Default)]
pub struct Pcg64Source;

impl RandomSource for Pcg64Source {
    type State = Pcg64State;

    #[inline]
    fn get(&self, state: &mut Self::State) -> u64 {
        state.0.next_u64()
    }

    #[inline]
    fn min(&self) -> u64 {
        0
    }

    #[inline]
    fn max(&self) -> u64 {
        u64::MAX
    }
}
