use crate::config::AmemConfig;
use crate::em::{ExpectationMaximization, ExpectationMaximizer};
use crate::error::{check_dim, AmemError, Result};
use crate::index::{AssociativeMemory, MemoryStore};
use crate::similarity::euclidean_distance;
use crate::types::{Embedding, MemoryState, ModelParameters};

/// Prototypes consulted per prediction
const PREDICT_NEIGHBORS: usize = 3;

/// The main AMEM interface: a memory store and a fitter wired together
pub struct AmemService<M = MemoryStore, E = ExpectationMaximizer> {
    memory: M,
    maximizer: E,
    parameters: Option<ModelParameters>,
}

impl AmemService<MemoryStore, ExpectationMaximizer> {
    /// Build the default components from a validated config
    pub fn from_config(config: &AmemConfig) -> Result<Self> {
        config.validate()?;
        let memory = MemoryStore::new(config.memory.capacity, config.memory.embedding_dim)?;
        let maximizer = ExpectationMaximizer::new(config.em.clone())?;
        Ok(Self::new(memory, maximizer))
    }
}

impl<M, E> AmemService<M, E>
where
    M: AssociativeMemory,
    E: ExpectationMaximization,
{
    pub fn new(memory: M, maximizer: E) -> Self {
        Self {
            memory,
            maximizer,
            parameters: None,
        }
    }

    // =========================================================================
    // Core operations
    // =========================================================================

    /// Fit the mixture, then keep one prototype per component in memory
    ///
    /// Each prototype is keyed by the component mean and carries the mean
    /// scaled by the component weight.
    pub fn train(&mut self, data: &[Embedding], n_components: usize) -> Result<&ModelParameters> {
        let params = self
            .maximizer
            .fit_with_memory(data, n_components, &mut self.memory)?;

        self.memory.clear();
        for (mean, weight) in params.means.iter().zip(&params.weights) {
            let value = mean.iter().map(|x| x * weight).collect();
            self.memory.insert(mean.clone(), value)?;
        }

        tracing::info!(
            components = n_components,
            converged = params.converged,
            iterations = params.n_iterations,
            "trained model"
        );

        Ok(self.parameters.insert(params))
    }

    /// Similarity-weighted blend of the nearest stored prototypes
    ///
    /// Falls back to the closest component mean when memory has nothing
    /// positively similar to offer.
    pub fn predict(&self, query: &[f64]) -> Result<Embedding> {
        let params = self.parameters.as_ref().ok_or(AmemError::NotTrained)?;
        check_dim(params.dim(), query.len())?;

        let hits = self.memory.retrieve(query, PREDICT_NEIGHBORS)?;

        let mut prediction = vec![0.0; query.len()];
        let mut total_weight = 0.0;
        for hit in &hits {
            for (p, v) in prediction.iter_mut().zip(&hit.value) {
                *p += hit.similarity * v;
            }
            total_weight += hit.similarity;
        }

        if total_weight > 0.0 {
            for p in &mut prediction {
                *p /= total_weight;
            }
            return Ok(prediction);
        }

        params
            .means
            .iter()
            .min_by(|a, b| euclidean_distance(query, a).total_cmp(&euclidean_distance(query, b)))
            .cloned()
            .ok_or(AmemError::NotTrained)
    }

    /// Add raw points to memory without refitting
    pub fn update_memory(&mut self, points: &[Embedding]) -> Result<()> {
        if self.parameters.is_none() {
            return Err(AmemError::NotTrained);
        }

        for point in points {
            self.memory.insert(point.clone(), point.clone())?;
        }
        Ok(())
    }

    // =========================================================================
    // Observers
    // =========================================================================

    pub fn memory_state(&self) -> MemoryState {
        MemoryState {
            size: self.memory.size(),
            capacity: self.memory.capacity(),
            embedding_dim: self.memory.embedding_dim(),
            is_trained: self.parameters.is_some(),
        }
    }

    pub fn parameters(&self) -> Option<&ModelParameters> {
        self.parameters.as_ref()
    }

    /// Direct access for raw associative lookups
    pub fn memory(&self) -> &M {
        &self.memory
    }

    pub fn maximizer(&self) -> &E {
        &self.maximizer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EmConfig, MemoryConfig};

    fn config() -> AmemConfig {
        AmemConfig {
            memory: MemoryConfig {
                capacity: 100,
                embedding_dim: 2,
            },
            em: EmConfig {
                n_components: 2,
                tolerance: 1e-4,
                ..EmConfig::default()
            },
        }
    }

    fn two_blobs() -> Vec<Embedding> {
        let mut data = Vec::new();
        for i in 0..10 {
            let jitter = (i as f64 - 4.5) * 0.05;
            data.push(vec![10.0 + jitter, 1.0 - jitter]);
            data.push(vec![1.0 + jitter, 10.0 - jitter]);
        }
        data
    }

    #[test]
    fn test_train_stores_prototypes() {
        let mut service = AmemService::from_config(&config()).unwrap();
        assert!(!service.memory_state().is_trained);

        let params = service.train(&two_blobs(), 2).unwrap().clone();

        let state = service.memory_state();
        assert_eq!(
            state,
            MemoryState {
                size: 2,
                capacity: 100,
                embedding_dim: 2,
                is_trained: true,
            }
        );

        let entries = service.memory().entries();
        for (entry, (mean, weight)) in entries.iter().zip(params.means.iter().zip(&params.weights)) {
            assert_eq!(&entry.key, mean);
            assert!((entry.value[0] - mean[0] * weight).abs() < 1e-12);
        }
    }

    #[test]
    fn test_predict_blends_prototypes() {
        let mut service = AmemService::from_config(&config()).unwrap();
        service.train(&two_blobs(), 2).unwrap();

        let prediction = service.predict(&[10.0, 1.0]).unwrap();
        assert_eq!(prediction.len(), 2);
        assert!(prediction.iter().all(|p| p.is_finite()));

        // Dominated by the prototype for the (10, 1) blob, scaled by weight 0.5
        assert!(prediction[0] > prediction[1]);
    }

    #[test]
    fn test_predict_falls_back_to_nearest_mean() {
        let mut service = AmemService::from_config(&config()).unwrap();
        service.train(&two_blobs(), 2).unwrap();

        // Opposite direction to every prototype: no positive similarity
        let prediction = service.predict(&[-10.0, -10.0]).unwrap();
        let params = service.parameters().unwrap();
        assert!(params.means.contains(&prediction));
    }

    #[test]
    fn test_requires_training() {
        let mut service = AmemService::from_config(&config()).unwrap();

        assert!(matches!(service.predict(&[1.0, 0.0]), Err(AmemError::NotTrained)));
        assert!(matches!(
            service.update_memory(&[vec![1.0, 0.0]]),
            Err(AmemError::NotTrained)
        ));
    }

    #[test]
    fn test_update_memory_adds_points() {
        let mut service = AmemService::from_config(&config()).unwrap();
        service.train(&two_blobs(), 2).unwrap();

        service.update_memory(&[vec![3.0, 3.0], vec![4.0, 4.0]]).unwrap();
        assert_eq!(service.memory_state().size, 4);

        let hits = service.memory().retrieve(&[1.0, 1.0], 1).unwrap();
        assert!((hits[0].similarity - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_wrong_width_surfaces_dimension_mismatch() {
        let mut service = AmemService::from_config(&config()).unwrap();
        let wide = vec![vec![1.0, 2.0, 3.0], vec![3.0, 2.0, 1.0]];

        assert!(matches!(
            service.train(&wide, 1),
            Err(AmemError::DimensionMismatch { expected: 2, actual: 3 })
        ));

        service.train(&two_blobs(), 2).unwrap();
        assert!(matches!(
            service.predict(&[1.0]),
            Err(AmemError::DimensionMismatch { expected: 2, actual: 1 })
        ));
    }

    #[test]
    fn test_injected_components() {
        let memory = MemoryStore::new(5, 2).unwrap();
        let maximizer = ExpectationMaximizer::new(EmConfig::default()).unwrap();
        let mut service = AmemService::new(memory, maximizer);

        service.train(&two_blobs(), 2).unwrap();
        assert_eq!(service.memory_state().capacity, 5);
        assert_eq!(service.maximizer().config().seed, 42);
    }
}
