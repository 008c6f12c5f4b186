//! Associative-memory guided expectation maximization.
//!
//! A capacity-bounded memory store ([`MemoryStore`]) ranks stored embeddings
//! by cosine similarity. The [`ExpectationMaximizer`] fits a Gaussian mixture
//! and lets each point's memory neighbors nudge its E-step responsibilities.
//! [`AmemService`] wires the two together from an [`AmemConfig`].

pub mod config;
pub mod em;
pub mod error;
pub mod index;
pub mod linalg;
pub mod memory;
pub mod similarity;
pub mod types;

pub use config::{AmemConfig, EmConfig, MemoryConfig};
pub use em::{ExpectationMaximization, ExpectationMaximizer};
pub use error::{AmemError, Result};
pub use index::{AssociativeMemory, MemoryStore, SharedMemoryStore};
pub use memory::AmemService;
pub use types::{
    Covariance, Embedding, FitState, FitTrace, MemoryEntry, MemoryState, ModelParameters,
    Responsibilities,
};
