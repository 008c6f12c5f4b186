use amem::config::{find_config_path, global_config_file, project_config_file};
use amem::{AmemConfig, AmemError, Result};
use std::path::{Path, PathBuf};

/// Run the config command
pub fn run_config(
    explicit: Option<&Path>,
    key: Option<&str>,
    value: Option<&str>,
    global: bool,
) -> Result<()> {
    let source = if global {
        Some(global_config_file())
    } else {
        find_config_path(explicit)?
    };
    let mut config = match &source {
        Some(path) if path.is_file() => AmemConfig::from_file(path)?,
        _ => AmemConfig::default(),
    };

    match (key, value) {
        (None, None) => {
            match &source {
                Some(path) if path.is_file() => println!("Configuration ({}):\n", path.display()),
                _ => println!("Configuration (defaults):\n"),
            }
            for k in AmemConfig::keys() {
                println!("  {}: {}", k, config.get(k).unwrap_or_default());
            }
        }
        (Some(k), None) => match config.get(k) {
            Some(v) => println!("{}: {}", k, v),
            None => println!("{}: (unknown key)", k),
        },
        (Some(k), Some(v)) => {
            config.set(k, v)?;
            let target = target_path(explicit, global, source)?;
            config.save(&target)?;
            println!("Set {} = {} ({})", k, v, target.display());
        }
        (None, Some(_)) => {
            return Err(AmemError::Config(
                "Key required when setting a value".to_string(),
            ));
        }
    }

    Ok(())
}

/// Where a `set` is written: explicit path, global file, the discovered file, or `./.amem/config.yaml`
fn target_path(explicit: Option<&Path>, global: bool, found: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    if global {
        return Ok(global_config_file());
    }
    if let Some(path) = found {
        return Ok(path);
    }
    Ok(project_config_file(&std::env::current_dir()?))
}
