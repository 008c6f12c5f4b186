use serde::{Deserialize, Serialize};

/// Fixed-width numeric feature vector
pub type Embedding = Vec<f64>;

/// A stored association, or a ranked retrieval hit
///
/// `similarity` only means something on retrieval results; entries at rest
/// carry a 0.0 placeholder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub key: Embedding,
    pub value: Embedding,
    pub similarity: f64,
}

impl MemoryEntry {
    pub fn new(key: Embedding, value: Embedding) -> Self {
        Self {
            key,
            value,
            similarity: 0.0,
        }
    }

    /// Copy of this entry scored against a query
    pub fn with_similarity(&self, similarity: f64) -> Self {
        Self {
            similarity,
            ..self.clone()
        }
    }
}

/// Dense symmetric covariance matrix, row-major
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Covariance {
    pub dim: usize,
    pub data: Vec<f64>,
}

impl Covariance {
    /// `scale * I`
    pub fn scaled_identity(dim: usize, scale: f64) -> Self {
        let mut data = vec![0.0; dim * dim];
        for i in 0..dim {
            data[i * dim + i] = scale;
        }
        Self { dim, data }
    }

    pub fn zeros(dim: usize) -> Self {
        Self {
            dim,
            data: vec![0.0; dim * dim],
        }
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.dim + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.data[row * self.dim + col] = value;
    }

    /// Copy with `amount` added to every diagonal element
    pub fn with_ridge(&self, amount: f64) -> Self {
        let mut out = self.clone();
        for i in 0..self.dim {
            out.data[i * self.dim + i] += amount;
        }
        out
    }

    pub fn diagonal(&self) -> Vec<f64> {
        (0..self.dim).map(|i| self.get(i, i)).collect()
    }
}

/// Mixture model state. Never mutated in place; each iteration yields a new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelParameters {
    pub means: Vec<Embedding>,
    pub covariances: Vec<Covariance>,
    pub weights: Vec<f64>,
    pub converged: bool,
    /// Completed E/M cycles
    pub n_iterations: usize,
    /// Mixture log-likelihood of the data under these parameters
    pub log_likelihood: f64,
}

impl ModelParameters {
    pub fn n_components(&self) -> usize {
        self.means.len()
    }

    pub fn dim(&self) -> usize {
        self.means.first().map(Vec::len).unwrap_or(0)
    }

    pub fn with_converged(self, converged: bool) -> Self {
        Self { converged, ..self }
    }

    pub fn with_iterations(self, n_iterations: usize) -> Self {
        Self {
            n_iterations,
            ..self
        }
    }

    pub fn with_log_likelihood(self, log_likelihood: f64) -> Self {
        Self {
            log_likelihood,
            ..self
        }
    }
}

/// Per-point responsibilities, `rows[i][k]` = P(component k | point i)
pub type Responsibilities = Vec<Vec<f64>>;

/// Stages of the fit loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FitState {
    Initializing,
    EStep,
    MStep,
    Converged,
    MaxIterationsReached,
}

/// Final parameters plus the per-iteration log-likelihood history
#[derive(Debug, Clone)]
pub struct FitTrace {
    pub parameters: ModelParameters,
    pub log_likelihoods: Vec<f64>,
    pub state: FitState,
}

/// Snapshot of the service's associative memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MemoryState {
    pub size: usize,
    pub capacity: usize,
    pub embedding_dim: usize,
    pub is_trained: bool,
}
