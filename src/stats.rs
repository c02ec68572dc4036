use crate::error::{Error, Result};
use rand::Rng;
use rand_distr::StandardNormal;
use std::f64::consts::TAU;

/// Floor applied to fitted variances so components cannot collapse onto a
/// single sample.
const VAR_FLOOR: f64 = 1e-12;

const EM_MAX_ITERS: usize = 200;
const EM_TOLERANCE: f64 = 1e-8;

/// One diagonal-covariance component of a 2-D mixture.
#[derive(Clone, Copy, Debug)]
pub struct GaussianComponent {
    pub mean: [f64; 2],
    pub var: [f64; 2],
    pub weight: f64,
}

impl GaussianComponent {
    fn pdf(&self, x: [f64; 2]) -> f64 {
        let g = |x: f64, mean: f64, var: f64| {
            (-0.5 * (x - mean) * (x - mean) / var).exp() / (TAU * var).sqrt()
        };
        g(x[0], self.mean[0], self.var[0]) * g(x[1], self.mean[1], self.var[1])
    }
}

/// A 2-D diagonal-covariance Gaussian mixture over the source plane.
///
/// Built once from the pilot samples and immutable afterwards. Component
/// weights sum to 1.
#[derive(Clone, Debug)]
pub struct GaussianMixture {
    components: Vec<GaussianComponent>,
}

impl GaussianMixture {
    /// Fit by expectation-maximization, selecting the component count in
    /// `1..=max_components` by the Bayesian information criterion.
    ///
    /// Fails with [`Error::StatsUnavailable`] when the samples cannot
    /// support a fit (fewer than two distinct points, or every EM candidate
    /// diverged); callers fall back to [`GaussianMixture::single_gaussian`].
    pub fn fit(
        samples: &[[f64; 2]],
        max_components: usize,
        rng: &mut impl Rng,
    ) -> Result<Self> {
        let n = samples.len();
        if n < 2 || max_components == 0 {
            return Err(Error::StatsUnavailable(format!(
                "{n} pilot samples are not enough for a mixture fit"
            )));
        }
        if !samples.iter().any(|s| s != &samples[0]) {
            return Err(Error::StatsUnavailable(
                "all pilot samples are identical".into(),
            ));
        }

        let mut best: Option<(f64, Vec<GaussianComponent>)> = None;
        for k in 1..=max_components.min(n) {
            let Some((log_likelihood, components)) = em_fit(samples, k, rng) else {
                continue;
            };
            // 5k - 1 free parameters: 2k means, 2k variances, k - 1 weights
            let parameters = (5 * k - 1) as f64;
            let bic = parameters * (n as f64).ln() - 2.0 * log_likelihood;
            if best.as_ref().map_or(true, |(b, _)| bic < *b) {
                best = Some((bic, components));
            }
        }
        match best {
            Some((_, components)) => Ok(Self { components }),
            None => Err(Error::StatsUnavailable(
                "expectation-maximization diverged for every component count".into(),
            )),
        }
    }

    /// Moment-matched single-Gaussian fit. The fallback path when [`fit`]
    /// reports [`Error::StatsUnavailable`].
    ///
    /// [`fit`]: GaussianMixture::fit
    pub fn single_gaussian(samples: &[[f64; 2]]) -> Result<Self> {
        if samples.is_empty() {
            return Err(Error::StatsUnavailable(
                "cannot fit a Gaussian to zero samples".into(),
            ));
        }
        let n = samples.len() as f64;
        let mut mean = [0.0; 2];
        for s in samples {
            mean[0] += s[0];
            mean[1] += s[1];
        }
        mean[0] /= n;
        mean[1] /= n;
        let mut var = [0.0; 2];
        for s in samples {
            var[0] += (s[0] - mean[0]) * (s[0] - mean[0]);
            var[1] += (s[1] - mean[1]) * (s[1] - mean[1]);
        }
        var[0] = (var[0] / n).max(VAR_FLOOR);
        var[1] = (var[1] / n).max(VAR_FLOOR);
        Ok(Self {
            components: vec![GaussianComponent { mean, var, weight: 1.0 }],
        })
    }

    /// Mixture density at `x` (untruncated).
    pub fn pdf(&self, x: [f64; 2]) -> f64 {
        self.components.iter().map(|c| c.weight * c.pdf(x)).sum()
    }

    /// Draw a point: component by mixture weight, then two normal draws.
    pub fn sample(&self, rng: &mut impl Rng) -> [f64; 2] {
        let mut u: f64 = rng.gen();
        let mut chosen = &self.components[self.components.len() - 1];
        for c in &self.components {
            if u < c.weight {
                chosen = c;
                break;
            }
            u -= c.weight;
        }
        let z0: f64 = rng.sample(StandardNormal);
        let z1: f64 = rng.sample(StandardNormal);
        [
            chosen.mean[0] + chosen.var[0].sqrt() * z0,
            chosen.mean[1] + chosen.var[1].sqrt() * z1,
        ]
    }

    pub fn components(&self) -> &[GaussianComponent] {
        &self.components
    }
}

fn em_fit(
    samples: &[[f64; 2]],
    k: usize,
    rng: &mut impl Rng,
) -> Option<(f64, Vec<GaussianComponent>)> {
    let n = samples.len();
    let seed = GaussianMixture::single_gaussian(samples).ok()?;
    let global = seed.components[0];

    // Means seeded from k distinct samples, shared global variance.
    let mut picked = Vec::with_capacity(k);
    while picked.len() < k {
        let idx = rng.gen_range(0..n);
        if !picked.contains(&idx) {
            picked.push(idx);
        }
    }
    let mut components: Vec<GaussianComponent> = picked
        .iter()
        .map(|&idx| GaussianComponent {
            mean: samples[idx],
            var: global.var,
            weight: 1.0 / k as f64,
        })
        .collect();

    let mut resp = vec![0.0f64; n * k];
    let mut previous = f64::NEG_INFINITY;
    for _ in 0..EM_MAX_ITERS {
        // E-step
        let mut log_likelihood = 0.0;
        for (i, s) in samples.iter().enumerate() {
            let mut total = 0.0;
            for (j, c) in components.iter().enumerate() {
                let r = c.weight * c.pdf(*s);
                resp[i * k + j] = r;
                total += r;
            }
            if !(total > 0.0) || !total.is_finite() {
                return None;
            }
            for j in 0..k {
                resp[i * k + j] /= total;
            }
            log_likelihood += total.ln();
        }

        // M-step
        for (j, c) in components.iter_mut().enumerate() {
            let mass: f64 = (0..n).map(|i| resp[i * k + j]).sum();
            if !(mass > 0.0) {
                return None;
            }
            let mut mean = [0.0; 2];
            for (i, s) in samples.iter().enumerate() {
                mean[0] += resp[i * k + j] * s[0];
                mean[1] += resp[i * k + j] * s[1];
            }
            mean[0] /= mass;
            mean[1] /= mass;
            let mut var = [0.0; 2];
            for (i, s) in samples.iter().enumerate() {
                var[0] += resp[i * k + j] * (s[0] - mean[0]) * (s[0] - mean[0]);
                var[1] += resp[i * k + j] * (s[1] - mean[1]) * (s[1] - mean[1]);
            }
            c.mean = mean;
            c.var = [(var[0] / mass).max(VAR_FLOOR), (var[1] / mass).max(VAR_FLOOR)];
            c.weight = mass / n as f64;
        }

        if (log_likelihood - previous).abs() < EM_TOLERANCE {
            previous = log_likelihood;
            break;
        }
        previous = log_likelihood;
    }
    previous.is_finite().then(|| (previous, components))
}
