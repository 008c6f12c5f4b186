use crate::error::{AmemError, Result};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "AMEM_CONFIG";

const PROJECT_DIR: &str = ".amem";
const CONFIG_FILE: &str = "config.yaml";

// -----------------------------------------------------------------------------
// Sections
// -----------------------------------------------------------------------------

/// `memory.*` keys
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub capacity: usize,
    pub embedding_dim: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            embedding_dim: 128,
        }
    }
}

/// `em.*` keys
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmConfig {
    pub n_components: usize,
    pub max_iterations: usize,
    /// Convergence threshold on the summed change of means and weights
    pub tolerance: f64,
    /// Memory neighbors consulted per point in the E-step
    pub neighbors: usize,
    /// Scale of the neighbor smoothing term; 0 gives classical EM
    pub neighbor_weight: f64,
    /// Diagonal ridge added to every covariance
    pub regularization: f64,
    pub seed: u64,
}

impl Default for EmConfig {
    fn default() -> Self {
        Self {
            n_components: 2,
            max_iterations: 100,
            tolerance: 1e-6,
            neighbors: 5,
            neighbor_weight: 1.0,
            regularization: 1e-6,
            seed: 42,
        }
    }
}

impl EmConfig {
    pub fn validate(&self) -> Result<()> {
        if self.n_components == 0 {
            return Err(AmemError::invalid("em.n_components must be positive"));
        }
        if self.max_iterations == 0 {
            return Err(AmemError::invalid("em.max_iterations must be positive"));
        }
        if !(self.tolerance > 0.0 && self.tolerance.is_finite()) {
            return Err(AmemError::invalid(format!(
                "em.tolerance must be positive and finite, got {}",
                self.tolerance
            )));
        }
        if self.neighbors == 0 {
            return Err(AmemError::invalid("em.neighbors must be positive"));
        }
        if !(self.neighbor_weight >= 0.0 && self.neighbor_weight.is_finite()) {
            return Err(AmemError::invalid(format!(
                "em.neighbor_weight must be non-negative, got {}",
                self.neighbor_weight
            )));
        }
        if !(self.regularization > 0.0 && self.regularization.is_finite()) {
            return Err(AmemError::invalid(format!(
                "em.regularization must be positive, got {}",
                self.regularization
            )));
        }
        Ok(())
    }
}

/// Top-level configuration, assembled once and passed down to constructors
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AmemConfig {
    pub memory: MemoryConfig,
    pub em: EmConfig,
}

impl AmemConfig {
    /// Read a YAML config file; missing keys take their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve the config the way the CLI does
    ///
    /// Explicit path, then `AMEM_CONFIG`, then `.amem/config.yaml` searched
    /// upward from the current directory, then the global file, then defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match find_config_path(explicit)? {
            Some(path) => {
                tracing::debug!(path = %path.display(), "loading configuration");
                Self::from_file(&path)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(path, serde_yaml::to_string(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.memory.capacity == 0 {
            return Err(AmemError::invalid("memory.capacity must be positive"));
        }
        if self.memory.embedding_dim == 0 {
            return Err(AmemError::invalid("memory.embedding_dim must be positive"));
        }
        self.em.validate()
    }

    /// Look up a dotted key such as `em.tolerance`
    pub fn get(&self, key: &str) -> Option<String> {
        let value = match key {
            "memory.capacity" => self.memory.capacity.to_string(),
            "memory.embedding_dim" => self.memory.embedding_dim.to_string(),
            "em.n_components" => self.em.n_components.to_string(),
            "em.max_iterations" => self.em.max_iterations.to_string(),
            "em.tolerance" => self.em.tolerance.to_string(),
            "em.neighbors" => self.em.neighbors.to_string(),
            "em.neighbor_weight" => self.em.neighbor_weight.to_string(),
            "em.regularization" => self.em.regularization.to_string(),
            "em.seed" => self.em.seed.to_string(),
            _ => return None,
        };
        Some(value)
    }

    /// Set a dotted key from its string form; the result must still validate
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut next = self.clone();
        match key {
            "memory.capacity" => next.memory.capacity = parse(key, value)?,
            "memory.embedding_dim" => next.memory.embedding_dim = parse(key, value)?,
            "em.n_components" => next.em.n_components = parse(key, value)?,
            "em.max_iterations" => next.em.max_iterations = parse(key, value)?,
            "em.tolerance" => next.em.tolerance = parse(key, value)?,
            "em.neighbors" => next.em.neighbors = parse(key, value)?,
            "em.neighbor_weight" => next.em.neighbor_weight = parse(key, value)?,
            "em.regularization" => next.em.regularization = parse(key, value)?,
            "em.seed" => next.em.seed = parse(key, value)?,
            _ => return Err(AmemError::Config(format!("unknown key: {}", key))),
        }
        next.validate()?;
        *self = next;
        Ok(())
    }

    pub fn keys() -> &'static [&'static str] {
        &[
            "memory.capacity",
            "memory.embedding_dim",
            "em.n_components",
            "em.max_iterations",
            "em.tolerance",
            "em.neighbors",
            "em.neighbor_weight",
            "em.regularization",
            "em.seed",
        ]
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| AmemError::Config(format!("invalid value for {}: {}", key, value)))
}

// -----------------------------------------------------------------------------
// Discovery
// -----------------------------------------------------------------------------

pub fn global_config_file() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("amem")
        .join(CONFIG_FILE)
}

/// `.amem/config.yaml` under `dir`
pub fn project_config_file(dir: &Path) -> PathBuf {
    dir.join(PROJECT_DIR).join(CONFIG_FILE)
}

/// Find the config file to use, if any
///
/// An `AMEM_CONFIG` that names no file is an error rather than a silent
/// fallback to the project or global file.
pub fn find_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        return Ok(Some(path.to_path_buf()));
    }

    if let Some(path) = env_config_path(std::env::var_os(CONFIG_ENV))? {
        return Ok(Some(path));
    }

    if let Ok(mut current) = std::env::current_dir() {
        loop {
            let candidate = project_config_file(&current);
            if candidate.is_file() {
                return Ok(Some(candidate));
            }
            if !current.pop() {
                break;
            }
        }
    }

    let global = global_config_file();
    if global.is_file() {
        return Ok(Some(global));
    }

    Ok(None)
}

fn env_config_path(value: Option<OsString>) -> Result<Option<PathBuf>> {
    let path = match value {
        Some(v) if !v.is_empty() => PathBuf::from(v),
        _ => return Ok(None),
    };
    if !path.is_file() {
        return Err(AmemError::Config(format!(
            "{} points to {}, which is not a file",
            CONFIG_ENV,
            path.display()
        )));
    }
    Ok(Some(path))
}
