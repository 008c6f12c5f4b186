use super::{config_for, format_vector, load_dataset, parse_vector};
use amem::{AmemConfig, AssociativeMemory, Embedding, MemoryStore, Result};
use std::path::Path;

/// Run the retrieve command: load points into a store and rank them
pub fn run_retrieve(config: &AmemConfig, data_path: &Path, query: &str, limit: usize) -> Result<()> {
    let data = load_dataset(data_path)?;
    let config = config_for(config, &data);
    let query = parse_vector(query)?;

    let store = load_store(&config, data)?;

    let results = store.retrieve(&query, limit)?;
    if results.is_empty() {
        println!("No matching entries.");
        return Ok(());
    }

    println!(
        "{} of {} stored entries (capacity {}):\n",
        results.len(),
        store.size(),
        store.capacity()
    );
    for entry in results {
        println!("({:.0}%) {}", entry.similarity * 100.0, format_vector(&entry.value));
    }

    Ok(())
}

/// Each point is stored as its own key and value
fn load_store(config: &AmemConfig, data: Vec<Embedding>) -> Result<MemoryStore> {
    let mut store = MemoryStore::new(config.memory.capacity, config.memory.embedding_dim)?;
    for point in data {
        let key = point.clone();
        store.insert(key, point)?;
    }
    Ok(store)
}
