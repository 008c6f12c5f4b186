use amem::AmemConfig;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

mod cli;

#[derive(Parser)]
#[command(name = "amem")]
#[command(version)]
#[command(about = "Associative memory guided EM for Gaussian mixtures")]
struct Cli {
    /// Config file (default: $AMEM_CONFIG, ./.amem/config.yaml, ~/.config/amem/config.yaml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level when RUST_LOG is unset
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit a mixture model to a JSON dataset
    Fit {
        /// JSON array of points
        data: PathBuf,

        /// Number of mixture components (default: em.n_components)
        #[arg(short = 'k', long)]
        components: Option<usize>,

        /// Seed for mean initialization
        #[arg(long)]
        seed: Option<u64>,

        /// Print parameters as JSON
        #[arg(long)]
        json: bool,
    },

    /// Rank stored points by similarity to a query
    Retrieve {
        /// JSON array of points
        data: PathBuf,

        /// Comma-separated query vector
        query: String,

        /// Maximum results
        #[arg(short = 'n', long, default_value = "5")]
        limit: usize,
    },

    /// Train on a dataset, then predict for a query
    Predict {
        /// JSON array of points
        data: PathBuf,

        /// Comma-separated query vector
        query: String,

        /// Number of mixture components (default: em.n_components)
        #[arg(short = 'k', long)]
        components: Option<usize>,
    },

    /// View or set configuration
    Config {
        /// Config key, e.g. em.tolerance
        key: Option<String>,

        /// Config value
        value: Option<String>,

        /// Use the global config file
        #[arg(long)]
        global: bool,
    },
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let config_path = cli.config.as_deref();

    let result = match cli.command {
        Commands::Fit {
            data,
            components,
            seed,
            json,
        } => AmemConfig::load(config_path)
            .and_then(|config| cli::fit::run_fit(&config, &data, components, seed, json)),
        Commands::Retrieve { data, query, limit } => AmemConfig::load(config_path)
            .and_then(|config| cli::memory::run_retrieve(&config, &data, &query, limit)),
        Commands::Predict {
            data,
            query,
            components,
        } => AmemConfig::load(config_path)
            .and_then(|config| cli::fit::run_predict(&config, &data, &query, components)),
        Commands::Config { key, value, global } => {
            cli::config::run_config(config_path, key.as_deref(), value.as_deref(), global)
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
