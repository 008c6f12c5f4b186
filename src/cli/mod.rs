pub mod config;
pub mod fit;
pub mod memory;

use amem::{AmemConfig, AmemError, Embedding, Result};
use std::fs;
use std::path::Path;

/// Read a dataset: a JSON array of equal-length number arrays
pub fn load_dataset(path: &Path) -> Result<Vec<Embedding>> {
    let content = fs::read_to_string(path)?;
    let data: Vec<Embedding> = serde_json::from_str(&content)?;
    if data.is_empty() {
        return Err(AmemError::InvalidArgument(format!(
            "no data points in {}",
            path.display()
        )));
    }
    Ok(data)
}

/// Parse a comma-separated vector such as `1.0,0,-2.5`
pub fn parse_vector(input: &str) -> Result<Embedding> {
    input
        .split(',')
        .map(|s| {
            s.trim().parse::<f64>().map_err(|_| {
                AmemError::InvalidArgument(format!("not a number: '{}'", s.trim()))
            })
        })
        .collect()
}

/// Config with `memory.embedding_dim` taken from the data
pub fn config_for(config: &AmemConfig, data: &[Embedding]) -> AmemConfig {
    let mut config = config.clone();
    if let Some(first) = data.first() {
        config.memory.embedding_dim = first.len();
    }
    config
}

pub fn format_vector(v: &[f64]) -> String {
    let parts: Vec<String> = v.iter().map(|x| format!("{:.4}", x)).collect();
    format!("[{}]", parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_vector() {
        assert_eq!(parse_vector("1, 0,-2.5").unwrap(), vec![1.0, 0.0, -2.5]);
        assert!(matches!(parse_vector("1,x"), Err(AmemError::InvalidArgument(_))));
    }

    #[test]
    fn test_load_dataset() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[[1.0, 2.0], [3.0, 4.0]]").unwrap();
        let data = load_dataset(file.path()).unwrap();
        assert_eq!(data, vec![vec![1.0, 2.0], vec![3.0, 4.0]]);

        let mut empty = tempfile::NamedTempFile::new().unwrap();
        write!(empty, "[]").unwrap();
        assert!(load_dataset(empty.path()).is_err());
    }
}
