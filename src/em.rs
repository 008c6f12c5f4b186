//! Memory-guided expectation maximization for Gaussian mixtures.
//!
//! The fit loop is classical EM with one twist in the E-step: before the
//! loop, every data point is written into an associative memory (as both key
//! and value). Each E-step retrieves a point's nearest neighbors from that
//! memory and adds, per component, `neighbor_weight * mean cosine(neighbor,
//! component mean)` to the point's log-responsibility. With
//! `neighbor_weight = 0` the loop reduces to plain EM.
//!
//! An iteration is only kept if it does not lower the mixture log-likelihood.
//! A smoothed step that does is redone without smoothing, so the recorded
//! log-likelihood sequence never decreases.
//!
//! All density work stays in log space until the per-point normalization.

use crate::config::EmConfig;
use crate::error::{check_dim, AmemError, Result};
use crate::index::{AssociativeMemory, MemoryStore};
use crate::linalg::{log_sum_exp, Cholesky, GaussianDensity};
use crate::similarity::{cosine_similarity, euclidean_distance};
use crate::types::{Covariance, Embedding, FitState, FitTrace, ModelParameters, Responsibilities};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Components whose summed responsibility falls below this are treated as empty
const MIN_EFFECTIVE_COUNT: f64 = 1e-10;

/// Times the covariance ridge is multiplied by 10 before giving up
const MAX_RIDGE_ESCALATIONS: u32 = 5;

/// Capability contract for a mixture-model fitter
pub trait ExpectationMaximization {
    /// Fit `n_components` Gaussians to `data` using a private memory store
    fn fit(&self, data: &[Embedding], n_components: usize) -> Result<ModelParameters>;

    /// Fit using (and overwriting) a caller-owned memory store
    fn fit_with_memory<M>(
        &self,
        data: &[Embedding],
        n_components: usize,
        memory: &mut M,
    ) -> Result<ModelParameters>
    where
        M: AssociativeMemory + ?Sized;
}

/// EM fitter configured once and reused across fits
///
/// Holds no state between calls, so one instance can serve concurrent fits
/// as long as each fit has its own memory store.
#[derive(Debug, Clone)]
pub struct ExpectationMaximizer {
    config: EmConfig,
}

impl ExpectationMaximizer {
    pub fn new(config: EmConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &EmConfig {
        &self.config
    }

    /// Run the fit loop and keep the log-likelihood after every M-step
    pub fn fit_traced<M>(
        &self,
        data: &[Embedding],
        n_components: usize,
        memory: &mut M,
    ) -> Result<FitTrace>
    where
        M: AssociativeMemory + ?Sized,
    {
        let dim = validate_dataset(data, n_components)?;
        check_dim(memory.embedding_dim(), dim)?;

        trace_state(FitState::Initializing, 0);
        populate_memory(data, memory)?;
        let mut params = self.initialize(data, n_components)?;
        let mut log_likelihoods = Vec::with_capacity(self.config.max_iterations);

        for iteration in 1..=self.config.max_iterations {
            let mut next = self.step(data, &params, memory, self.config.neighbor_weight, iteration)?;

            // The smoothing term is not part of the likelihood, so a smoothed
            // step may lower it; retry that iteration as a plain EM step.
            if next.log_likelihood < params.log_likelihood && self.config.neighbor_weight > 0.0 {
                tracing::debug!(
                    iteration,
                    smoothed = next.log_likelihood,
                    previous = params.log_likelihood,
                    "smoothed step lowered log-likelihood, falling back to plain step"
                );
                next = self.step(data, &params, memory, 0.0, iteration)?;
            }

            // Only the ridge can make a plain step lose likelihood
            if next.log_likelihood < params.log_likelihood {
                tracing::info!(
                    iterations = params.n_iterations,
                    log_likelihood = params.log_likelihood,
                    "em stalled, log-likelihood no longer improves"
                );
                return Ok(FitTrace {
                    parameters: params.with_converged(true),
                    log_likelihoods,
                    state: FitState::Converged,
                });
            }

            let delta = parameter_delta(&params, &next);
            log_likelihoods.push(next.log_likelihood);
            tracing::debug!(
                iteration,
                delta,
                log_likelihood = next.log_likelihood,
                "em iteration complete"
            );
            params = next;

            if delta < self.config.tolerance {
                tracing::info!(
                    iterations = iteration,
                    log_likelihood = params.log_likelihood,
                    "em converged"
                );
                return Ok(FitTrace {
                    parameters: params.with_converged(true),
                    log_likelihoods,
                    state: FitState::Converged,
                });
            }
        }

        tracing::warn!(
            max_iterations = self.config.max_iterations,
            "em stopped at iteration budget without converging"
        );
        Ok(FitTrace {
            parameters: params.with_converged(false),
            log_likelihoods,
            state: FitState::MaxIterationsReached,
        })
    }

    /// Initial guess: spread-out data points as means, pooled variance, uniform weights
    ///
    /// The first mean is a seeded random pick; each further mean is the point
    /// farthest from the means chosen so far (earliest index on ties).
    pub fn initialize(&self, data: &[Embedding], n_components: usize) -> Result<ModelParameters> {
        let dim = validate_dataset(data, n_components)?;
        let mut rng = StdRng::seed_from_u64(self.config.seed);

        let mut means: Vec<Embedding> = Vec::with_capacity(n_components);
        means.push(data[rng.gen_range(0..data.len())].clone());

        while means.len() < n_components {
            let mut best_idx = 0;
            let mut best_dist = f64::NEG_INFINITY;

            for (idx, point) in data.iter().enumerate() {
                let min_dist = means
                    .iter()
                    .map(|m| euclidean_distance(point, m))
                    .fold(f64::INFINITY, f64::min);

                if min_dist > best_dist {
                    best_dist = min_dist;
                    best_idx = idx;
                }
            }
            means.push(data[best_idx].clone());
        }

        let scale = pooled_variance(data).max(self.config.regularization);
        let covariances = vec![Covariance::scaled_identity(dim, scale); n_components];
        let weights = vec![1.0 / n_components as f64; n_components];

        let params = ModelParameters {
            means,
            covariances,
            weights,
            converged: false,
            n_iterations: 0,
            log_likelihood: f64::NEG_INFINITY,
        };
        let log_likelihood = self.log_likelihood(data, &params)?;

        Ok(params.with_log_likelihood(log_likelihood))
    }

    /// Per-point responsibilities under `params`, smoothed by memory neighbors
    pub fn expectation_step<M>(
        &self,
        data: &[Embedding],
        params: &ModelParameters,
        memory: &M,
    ) -> Result<Responsibilities>
    where
        M: AssociativeMemory + ?Sized,
    {
        self.responsibilities(data, params, memory, self.config.neighbor_weight)
    }

    /// One E-step plus M-step from `params`
    fn step<M>(
        &self,
        data: &[Embedding],
        params: &ModelParameters,
        memory: &M,
        smoothing: f64,
        iteration: usize,
    ) -> Result<ModelParameters>
    where
        M: AssociativeMemory + ?Sized,
    {
        trace_state(FitState::EStep, iteration);
        let responsibilities = self.responsibilities(data, params, memory, smoothing)?;

        trace_state(FitState::MStep, iteration);
        Ok(self
            .maximization_step(data, &responsibilities, params)?
            .with_iterations(iteration))
    }

    fn responsibilities<M>(
        &self,
        data: &[Embedding],
        params: &ModelParameters,
        memory: &M,
        smoothing: f64,
    ) -> Result<Responsibilities>
    where
        M: AssociativeMemory + ?Sized,
    {
        let densities = component_densities(params)?;
        let n_components = params.n_components();
        let log_weights: Vec<f64> = params.weights.iter().map(|w| w.ln()).collect();

        let mut responsibilities = Vec::with_capacity(data.len());
        let mut log_terms = vec![0.0; n_components];

        for point in data {
            check_dim(params.dim(), point.len())?;

            for (k, term) in log_terms.iter_mut().enumerate() {
                *term = log_weights[k] + densities[k].log_pdf(point, &params.means[k]);
            }

            if smoothing > 0.0 {
                let neighbors = memory.retrieve(point, self.config.neighbors)?;
                if !neighbors.is_empty() {
                    for (k, term) in log_terms.iter_mut().enumerate() {
                        let mut total = 0.0;
                        for neighbor in &neighbors {
                            total += cosine_similarity(&neighbor.value, &params.means[k])?;
                        }
                        *term += smoothing * total / neighbors.len() as f64;
                    }
                }
            }

            let norm = log_sum_exp(&log_terms);
            let row = if norm.is_finite() {
                log_terms.iter().map(|t| (t - norm).exp()).collect()
            } else {
                vec![1.0 / n_components as f64; n_components]
            };
            responsibilities.push(row);
        }

        Ok(responsibilities)
    }

    /// New weights, means and covariances from responsibilities
    ///
    /// `previous` supplies the mean for components that received no mass.
    pub fn maximization_step(
        &self,
        data: &[Embedding],
        responsibilities: &Responsibilities,
        previous: &ModelParameters,
    ) -> Result<ModelParameters> {
        let n_components = previous.n_components();
        let dim = previous.dim();
        if responsibilities.len() != data.len() {
            return Err(AmemError::invalid(format!(
                "{} responsibility rows for {} points",
                responsibilities.len(),
                data.len()
            )));
        }
        if let Some(row) = responsibilities.iter().find(|r| r.len() != n_components) {
            return Err(AmemError::invalid(format!(
                "responsibility row has {} entries, expected {}",
                row.len(),
                n_components
            )));
        }

        let n_samples = data.len() as f64;
        let mut means = Vec::with_capacity(n_components);
        let mut covariances = Vec::with_capacity(n_components);
        let mut counts = Vec::with_capacity(n_components);
        let empty_scale = pooled_variance(data).max(self.config.regularization);

        for k in 0..n_components {
            let count: f64 = responsibilities.iter().map(|r| r[k]).sum();

            if !(count >= MIN_EFFECTIVE_COUNT) {
                tracing::debug!(component = k, count, "component is empty, keeping previous mean");
                means.push(previous.means[k].clone());
                covariances.push(Covariance::scaled_identity(dim, empty_scale));
                counts.push(0.0);
                continue;
            }

            let mut mean = vec![0.0; dim];
            for (point, r) in data.iter().zip(responsibilities) {
                check_dim(dim, point.len())?;
                for (m, x) in mean.iter_mut().zip(point) {
                    *m += r[k] * x;
                }
            }
            for m in &mut mean {
                *m /= count;
            }
            if mean.iter().any(|m| !m.is_finite()) {
                return Err(AmemError::NumericInstability {
                    component: k,
                    reason: "mean is not finite".to_string(),
                });
            }

            let mut cov = Covariance::zeros(dim);
            let mut diff = vec![0.0; dim];
            for (point, r) in data.iter().zip(responsibilities) {
                let weight = r[k];
                if weight == 0.0 {
                    continue;
                }
                for (d, (x, m)) in diff.iter_mut().zip(point.iter().zip(&mean)) {
                    *d = x - m;
                }
                for i in 0..dim {
                    for j in 0..=i {
                        let v = cov.get(i, j) + weight * diff[i] * diff[j];
                        cov.set(i, j, v);
                    }
                }
            }
            for i in 0..dim {
                for j in 0..=i {
                    let v = cov.get(i, j) / count;
                    cov.set(i, j, v);
                    cov.set(j, i, v);
                }
            }

            covariances.push(self.regularize(k, &cov)?);
            means.push(mean);
            counts.push(count);
        }

        let total: f64 = counts.iter().sum();
        let weights: Vec<f64> = if total > 0.0 {
            counts.iter().map(|c| c / total).collect()
        } else {
            vec![1.0 / n_components as f64; n_components]
        };
        tracing::trace!(effective_points = total, n_samples, "m-step weights updated");

        let params = ModelParameters {
            means,
            covariances,
            weights,
            converged: false,
            n_iterations: previous.n_iterations,
            log_likelihood: f64::NEG_INFINITY,
        };
        let log_likelihood = self.log_likelihood(data, &params)?;

        Ok(params.with_log_likelihood(log_likelihood))
    }

    /// Mixture log-likelihood: Σ_i ln Σ_k w_k N(x_i | μ_k, Σ_k)
    pub fn log_likelihood(&self, data: &[Embedding], params: &ModelParameters) -> Result<f64> {
        let densities = component_densities(params)?;
        let log_weights: Vec<f64> = params.weights.iter().map(|w| w.ln()).collect();
        let mut terms = vec![0.0; params.n_components()];
        let mut total = 0.0;

        for point in data {
            check_dim(params.dim(), point.len())?;
            for (k, term) in terms.iter_mut().enumerate() {
                *term = log_weights[k] + densities[k].log_pdf(point, &params.means[k]);
            }
            total += log_sum_exp(&terms);
        }

        Ok(total)
    }

    /// Add the configured ridge, escalating it until the matrix factorizes
    fn regularize(&self, component: usize, cov: &Covariance) -> Result<Covariance> {
        let mut ridge = self.config.regularization;

        for attempt in 0..=MAX_RIDGE_ESCALATIONS {
            let candidate = cov.with_ridge(ridge);
            if Cholesky::decompose(&candidate).is_some() {
                if attempt > 0 {
                    tracing::warn!(component, ridge, "escalated covariance regularization");
                }
                return Ok(candidate);
            }
            ridge *= 10.0;
        }

        Err(AmemError::NumericInstability {
            component,
            reason: format!(
                "covariance is not positive definite even with ridge {:e}",
                ridge / 10.0
            ),
        })
    }
}

impl ExpectationMaximization for ExpectationMaximizer {
    fn fit(&self, data: &[Embedding], n_components: usize) -> Result<ModelParameters> {
        let dim = validate_dataset(data, n_components)?;
        let mut memory = MemoryStore::new(data.len(), dim)?;
        self.fit_with_memory(data, n_components, &mut memory)
    }

    fn fit_with_memory<M>(
        &self,
        data: &[Embedding],
        n_components: usize,
        memory: &mut M,
    ) -> Result<ModelParameters>
    where
        M: AssociativeMemory + ?Sized,
    {
        Ok(self.fit_traced(data, n_components, memory)?.parameters)
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Checks shared by every entry point; returns the data dimension
fn validate_dataset(data: &[Embedding], n_components: usize) -> Result<usize> {
    let first = data
        .first()
        .ok_or_else(|| AmemError::invalid("cannot fit on an empty dataset"))?;
    let dim = first.len();
    if dim == 0 {
        return Err(AmemError::invalid("data points must have at least one dimension"));
    }
    if n_components == 0 {
        return Err(AmemError::invalid("n_components must be positive"));
    }
    if n_components > data.len() {
        return Err(AmemError::invalid(format!(
            "n_components ({}) exceeds dataset size ({})",
            n_components,
            data.len()
        )));
    }

    for (i, point) in data.iter().enumerate() {
        check_dim(dim, point.len())?;
        if point.iter().any(|v| !v.is_finite()) {
            return Err(AmemError::invalid(format!(
                "data point {} contains NaN or infinite values",
                i
            )));
        }
    }

    Ok(dim)
}

fn populate_memory<M>(data: &[Embedding], memory: &mut M) -> Result<()>
where
    M: AssociativeMemory + ?Sized,
{
    memory.clear();
    if memory.capacity() < data.len() {
        tracing::warn!(
            capacity = memory.capacity(),
            points = data.len(),
            "memory smaller than dataset, neighbors come from the newest points only"
        );
    }
    for point in data {
        memory.insert(point.clone(), point.clone())?;
    }
    Ok(())
}

fn component_densities(params: &ModelParameters) -> Result<Vec<GaussianDensity>> {
    let k = params.n_components();
    if k == 0 || params.covariances.len() != k || params.weights.len() != k {
        return Err(AmemError::invalid(format!(
            "inconsistent parameters: {} means, {} covariances, {} weights",
            k,
            params.covariances.len(),
            params.weights.len()
        )));
    }

    params
        .covariances
        .iter()
        .zip(&params.means)
        .enumerate()
        .map(|(component, (cov, mean))| {
            check_dim(mean.len(), cov.dim)?;
            GaussianDensity::new(cov).ok_or_else(|| AmemError::NumericInstability {
                component,
                reason: "covariance is not positive definite".to_string(),
            })
        })
        .collect()
}

/// Mean over dimensions of the per-dimension population variance
fn pooled_variance(data: &[Embedding]) -> f64 {
    let n = data.len() as f64;
    let dim = data.first().map(Vec::len).unwrap_or(0);
    if dim == 0 {
        return 0.0;
    }

    let mut total = 0.0;
    for d in 0..dim {
        let mean = data.iter().map(|p| p[d]).sum::<f64>() / n;
        total += data.iter().map(|p| (p[d] - mean).powi(2)).sum::<f64>() / n;
    }
    total / dim as f64
}

/// Σ_k ‖μ_k - μ'_k‖ + |w_k - w'_k|
fn parameter_delta(old: &ModelParameters, new: &ModelParameters) -> f64 {
    let means: f64 = old
        .means
        .iter()
        .zip(&new.means)
        .map(|(a, b)| euclidean_distance(a, b))
        .sum();
    let weights: f64 = old
        .weights
        .iter()
        .zip(&new.weights)
        .map(|(a, b)| (a - b).abs())
        .sum();
    means + weights
}

fn trace_state(state: FitState, iteration: usize) {
    tracing::trace!(?state, iteration, "em state");
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_distr::{Distribution, Normal};

    const CENTERS: [[f64; 2]; 3] = [[8.0, 0.0], [0.0, 8.0], [-8.0, -8.0]];

    fn clusters(centers: &[[f64; 2]], per_cluster: usize, std_dev: f64, seed: u64) -> Vec<Embedding> {
        let mut rng = StdRng::seed_from_u64(seed);
        let noise = Normal::new(0.0, std_dev).unwrap();
        let mut data = Vec::new();
        for _ in 0..per_cluster {
            for c in centers {
                data.push(vec![c[0] + noise.sample(&mut rng), c[1] + noise.sample(&mut rng)]);
            }
        }
        data
    }

    fn config(neighbor_weight: f64) -> EmConfig {
        EmConfig {
            n_components: 3,
            max_iterations: 200,
            tolerance: 1e-4,
            neighbor_weight,
            ..EmConfig::default()
        }
    }

    fn assert_recovers_centers(params: &ModelParameters, centers: &[[f64; 2]], within: f64) {
        for c in centers {
            let closest = params
                .means
                .iter()
                .map(|m| euclidean_distance(m, c))
                .fold(f64::INFINITY, f64::min);
            assert!(closest < within, "no mean near {:?}: {:?}", c, params.means);
        }
    }

    #[test]
    fn test_fit_recovers_separated_clusters() {
        let data = clusters(&CENTERS, 60, 0.5, 7);
        let em = ExpectationMaximizer::new(config(1.0)).unwrap();

        let params = em.fit(&data, 3).unwrap();

        assert!(params.converged);
        assert!(params.n_iterations <= 200);
        assert_recovers_centers(&params, &CENTERS, 0.3);
        for w in &params.weights {
            assert!((w - 1.0 / 3.0).abs() < 0.05, "weights {:?}", params.weights);
        }
    }

    #[test]
    fn test_classical_em_also_recovers_clusters() {
        let data = clusters(&CENTERS, 60, 0.5, 11);
        let em = ExpectationMaximizer::new(config(0.0)).unwrap();

        let params = em.fit(&data, 3).unwrap();

        assert!(params.converged);
        assert_recovers_centers(&params, &CENTERS, 0.3);
    }

    #[test]
    fn test_log_likelihood_is_non_decreasing() {
        let data = clusters(&CENTERS, 40, 1.0, 3);
        let em = ExpectationMaximizer::new(config(0.0)).unwrap();
        let mut memory = MemoryStore::new(data.len(), 2).unwrap();

        let trace = em.fit_traced(&data, 3, &mut memory).unwrap();

        assert!(!trace.log_likelihoods.is_empty());
        assert_eq!(trace.log_likelihoods.len(), trace.parameters.n_iterations);
        for pair in trace.log_likelihoods.windows(2) {
            let slack = 1e-6 * pair[0].abs().max(1.0);
            assert!(
                pair[1] >= pair[0] - slack,
                "log-likelihood dropped: {} -> {}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_log_likelihood_is_non_decreasing_with_neighbor_smoothing() {
        let overlapping = [[3.0, 0.0], [0.0, 3.0], [-2.0, -2.0]];
        let em = ExpectationMaximizer::new(EmConfig {
            n_components: 3,
            ..EmConfig::default()
        })
        .unwrap();
        assert_eq!(em.config().neighbor_weight, 1.0);

        for seed in 0..10 {
            let data = clusters(&overlapping, 40, 1.5, seed);
            let mut memory = MemoryStore::new(data.len(), 2).unwrap();

            let trace = em.fit_traced(&data, 3, &mut memory).unwrap();

            assert_eq!(trace.log_likelihoods.len(), trace.parameters.n_iterations);
            let initial = em.initialize(&data, 3).unwrap().log_likelihood;
            if let Some(first) = trace.log_likelihoods.first() {
                assert!(*first >= initial, "seed {}: {} -> {}", seed, initial, first);
            }
            for pair in trace.log_likelihoods.windows(2) {
                let slack = 1e-6 * pair[0].abs().max(1.0);
                assert!(
                    pair[1] >= pair[0] - slack,
                    "seed {}: log-likelihood dropped: {} -> {}",
                    seed,
                    pair[0],
                    pair[1]
                );
            }
        }
    }

    #[test]
    fn test_empty_component_keeps_previous_mean() {
        let data = clusters(&CENTERS, 10, 1.0, 4);
        let em = ExpectationMaximizer::new(config(1.0)).unwrap();
        let previous = em.initialize(&data, 3).unwrap();
        let resp: Responsibilities = data.iter().map(|_| vec![0.5, 0.0, 0.5]).collect();

        let params = em.maximization_step(&data, &resp, &previous).unwrap();

        assert_eq!(params.weights[1], 0.0);
        assert!((params.weights[0] - 0.5).abs() < 1e-12);
        assert_eq!(params.means[1], previous.means[1]);
        let scale = pooled_variance(&data);
        assert_eq!(params.covariances[1], Covariance::scaled_identity(2, scale));
        assert!(params.log_likelihood.is_finite());
    }

    #[test]
    fn test_parameters_stay_consistent() {
        let data = clusters(&CENTERS, 20, 1.0, 5);
        let em = ExpectationMaximizer::new(config(1.0)).unwrap();

        let params = em.fit(&data, 3).unwrap();

        assert_eq!(params.means.len(), 3);
        assert_eq!(params.covariances.len(), 3);
        assert_eq!(params.weights.len(), 3);
        assert!((params.weights.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(params.weights.iter().all(|w| *w >= 0.0));
        for cov in &params.covariances {
            assert_eq!(cov.dim, 2);
            assert!(Cholesky::decompose(cov).is_some());
        }
        assert!(params.log_likelihood.is_finite());
    }

    #[test]
    fn test_fit_is_reproducible_under_seed() {
        let data = clusters(&CENTERS, 20, 1.5, 9);
        let em = ExpectationMaximizer::new(config(1.0)).unwrap();

        assert_eq!(em.fit(&data, 3).unwrap(), em.fit(&data, 3).unwrap());
    }

    #[test]
    fn test_budget_exhaustion_is_not_an_error() {
        let data = clusters(&CENTERS, 20, 1.0, 1);
        let em = ExpectationMaximizer::new(EmConfig {
            max_iterations: 1,
            tolerance: 1e-12,
            ..config(1.0)
        })
        .unwrap();
        let mut memory = MemoryStore::new(data.len(), 2).unwrap();

        let trace = em.fit_traced(&data, 3, &mut memory).unwrap();

        assert_eq!(trace.state, FitState::MaxIterationsReached);
        assert!(!trace.parameters.converged);
        assert_eq!(trace.parameters.n_iterations, 1);
    }

    #[test]
    fn test_responsibilities_are_normalized() {
        let data = clusters(&CENTERS, 10, 1.0, 2);
        let em = ExpectationMaximizer::new(config(1.0)).unwrap();
        let mut memory = MemoryStore::new(data.len(), 2).unwrap();
        for p in &data {
            memory.insert(p.clone(), p.clone()).unwrap();
        }

        let params = em.initialize(&data, 3).unwrap();
        let resp = em.expectation_step(&data, &params, &memory).unwrap();

        assert_eq!(resp.len(), data.len());
        for row in &resp {
            assert_eq!(row.len(), 3);
            assert!((row.iter().sum::<f64>() - 1.0).abs() < 1e-9);
            assert!(row.iter().all(|r| (0.0..=1.0).contains(r)));
        }
    }

    #[test]
    fn test_high_dimensional_points_do_not_underflow() {
        let dim = 64;
        let mut rng = StdRng::seed_from_u64(21);
        let noise = Normal::new(0.0, 0.1).unwrap();
        let data: Vec<Embedding> = (0..40)
            .map(|i| {
                let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
                (0..dim).map(|_| sign + noise.sample(&mut rng)).collect()
            })
            .collect();

        let em = ExpectationMaximizer::new(EmConfig {
            n_components: 2,
            ..config(1.0)
        })
        .unwrap();
        let params = em.fit(&data, 2).unwrap();

        assert!(params.converged);
        assert!(params.log_likelihood.is_finite());
        assert!((params.weights[0] - 0.5).abs() < 1e-6);
        let mut firsts: Vec<f64> = params.means.iter().map(|m| m[0]).collect();
        firsts.sort_by(f64::total_cmp);
        assert!((firsts[0] + 1.0).abs() < 0.1 && (firsts[1] - 1.0).abs() < 0.1);
    }

    #[test]
    fn test_one_point_per_component() {
        let data = vec![vec![0.0, 0.0], vec![5.0, 5.0], vec![-5.0, 5.0]];
        let em = ExpectationMaximizer::new(config(1.0)).unwrap();

        let params = em.fit(&data, 3).unwrap();
        assert_recovers_centers(&params, &[[0.0, 0.0], [5.0, 5.0], [-5.0, 5.0]], 1e-3);
    }

    #[test]
    fn test_invalid_inputs() {
        let em = ExpectationMaximizer::new(config(1.0)).unwrap();

        let empty: Vec<Embedding> = Vec::new();
        assert!(matches!(em.fit(&empty, 1), Err(AmemError::InvalidArgument(_))));

        let small = vec![vec![1.0, 2.0], vec![2.0, 1.0]];
        assert!(matches!(em.fit(&small, 3), Err(AmemError::InvalidArgument(_))));
        assert!(matches!(em.fit(&small, 0), Err(AmemError::InvalidArgument(_))));

        let ragged = vec![vec![1.0, 2.0], vec![2.0]];
        assert!(matches!(
            em.fit(&ragged, 1),
            Err(AmemError::DimensionMismatch { expected: 2, actual: 1 })
        ));

        let nan = vec![vec![1.0, f64::NAN], vec![2.0, 1.0]];
        assert!(matches!(em.fit(&nan, 1), Err(AmemError::InvalidArgument(_))));
    }

    #[test]
    fn test_invalid_config_rejected() {
        for bad in [
            EmConfig { max_iterations: 0, ..EmConfig::default() },
            EmConfig { tolerance: 0.0, ..EmConfig::default() },
            EmConfig { tolerance: f64::NAN, ..EmConfig::default() },
            EmConfig { neighbor_weight: -1.0, ..EmConfig::default() },
            EmConfig { neighbors: 0, ..EmConfig::default() },
        ] {
            assert!(matches!(
                ExpectationMaximizer::new(bad),
                Err(AmemError::InvalidArgument(_))
            ));
        }
    }

    #[test]
    fn test_memory_width_must_match_data() {
        let data = clusters(&CENTERS, 5, 1.0, 4);
        let em = ExpectationMaximizer::new(config(1.0)).unwrap();
        let mut memory = MemoryStore::new(100, 3).unwrap();

        assert!(matches!(
            em.fit_with_memory(&data, 3, &mut memory),
            Err(AmemError::DimensionMismatch { expected: 3, actual: 2 })
        ));
    }

    #[test]
    fn test_fit_with_memory_populates_store() {
        let data = clusters(&CENTERS, 5, 1.0, 4);
        let em = ExpectationMaximizer::new(config(1.0)).unwrap();
        let mut memory = MemoryStore::new(100, 2).unwrap();
        memory.insert(vec![100.0, 100.0], vec![1.0, 1.0]).unwrap();

        em.fit_with_memory(&data, 3, &mut memory).unwrap();

        assert_eq!(memory.size(), data.len());
        let hit = memory.retrieve(&data[0], 1).unwrap();
        assert!((hit[0].similarity - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_degenerate_covariance_reports_component() {
        let data = vec![vec![0.0, 0.0], vec![1.0, 1.0]];
        let em = ExpectationMaximizer::new(config(0.0)).unwrap();
        let memory = MemoryStore::new(2, 2).unwrap();

        let params = ModelParameters {
            means: vec![vec![0.0, 0.0], vec![1.0, 1.0]],
            covariances: vec![
                Covariance::scaled_identity(2, 1.0),
                Covariance::scaled_identity(2, -1.0),
            ],
            weights: vec![0.5, 0.5],
            converged: false,
            n_iterations: 0,
            log_likelihood: 0.0,
        };

        assert!(matches!(
            em.expectation_step(&data, &params, &memory),
            Err(AmemError::NumericInstability { component: 1, .. })
        ));
    }

    #[test]
    fn test_regularization_escalates_before_failing() {
        let em = ExpectationMaximizer::new(config(0.0)).unwrap();

        // Rank-deficient but PSD: the base ridge is enough
        let singular = Covariance {
            dim: 2,
            data: vec![1.0, 1.0, 1.0, 1.0],
        };
        assert!(em.regularize(0, &singular).is_ok());

        // Strongly indefinite: no bounded ridge fixes it
        let indefinite = Covariance {
            dim: 2,
            data: vec![1.0, 0.0, 0.0, -1.0],
        };
        assert!(matches!(
            em.regularize(4, &indefinite),
            Err(AmemError::NumericInstability { component: 4, .. })
        ));
    }
}
