use super::{config_for, format_vector, load_dataset, parse_vector};
use amem::{AmemConfig, AmemService, Result};
use std::path::Path;

/// Run the fit command
pub fn run_fit(
    config: &AmemConfig,
    data_path: &Path,
    components: Option<usize>,
    seed: Option<u64>,
    json: bool,
) -> Result<()> {
    let data = load_dataset(data_path)?;
    let mut config = config_for(config, &data);
    if let Some(seed) = seed {
        config.em.seed = seed;
    }
    let n_components = components.unwrap_or(config.em.n_components);

    let mut service = AmemService::from_config(&config)?;
    let params = service.train(&data, n_components)?;

    if json {
        println!("{}", serde_json::to_string_pretty(params)?);
        return Ok(());
    }

    println!(
        "Fitted {} components on {} points ({} iterations, {})",
        params.n_components(),
        data.len(),
        params.n_iterations,
        if params.converged { "converged" } else { "not converged" }
    );
    println!("  log-likelihood: {:.4}\n", params.log_likelihood);

    for (i, (mean, weight)) in params.means.iter().zip(&params.weights).enumerate() {
        println!("[{}] weight {:.4}", i, weight);
        println!("    mean     {}", format_vector(mean));
        println!("    variance {}", format_vector(&params.covariances[i].diagonal()));
    }

    Ok(())
}

/// Run the predict command
pub fn run_predict(
    config: &AmemConfig,
    data_path: &Path,
    query: &str,
    components: Option<usize>,
) -> Result<()> {
    let data = load_dataset(data_path)?;
    let config = config_for(config, &data);
    let query = parse_vector(query)?;
    let n_components = components.unwrap_or(config.em.n_components);

    let mut service = AmemService::from_config(&config)?;
    service.train(&data, n_components)?;
    let prediction = service.predict(&query)?;

    println!("{}", format_vector(&prediction));
    Ok(())
}
