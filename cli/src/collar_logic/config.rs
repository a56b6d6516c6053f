use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use lib_collar::CollarConfig;

use super::args::GlobalArgs;

/// Read when `--config` is not given and the file exists.
pub const DEFAULT_CONFIG_FILE: &str = "collar-fetch.json";

/// Builds the effective configuration.
///
/// Layers, lowest first: built-in defaults, the JSON config file, then
/// environment variables and command-line flags (clap merges those two).
pub fn load_config(args: &GlobalArgs) -> Result<CollarConfig> {
    let base = match &args.config {
        Some(path) => read_file(path)?,
        None => {
            let path = PathBuf::from(DEFAULT_CONFIG_FILE);
            if path.exists() {
                read_file(&path)?
            } else {
                tracing::debug!("No config file at {}, using defaults", path.display());
                CollarConfig::default()
            }
        }
    };
    apply_overrides(base, args)
}

fn read_file(path: &Path) -> Result<CollarConfig> {
    if !path.exists() {
        bail!("config file {} does not exist", path.display());
    }
    let config = CollarConfig::from_file(path).with_context(|| format!("loading {}", path.display()))?;
    tracing::info!("Loaded config from {}", path.display());
    Ok(config)
}

/// Applies the `Some` values of `args` over `config`.
pub fn apply_overrides(mut config: CollarConfig, args: &GlobalArgs) -> Result<CollarConfig> {
    if let Some(url) = &args.vectronics_url {
        config.vectronics.base_url = url.clone();
    }
    if let Some(url) = &args.ats_url {
        config.ats.base_url = url.clone();
    }
    if let Some(secs) = args.timeout_secs {
        if secs == 0 {
            bail!("timeout must be at least one second");
        }
        config.vectronics.timeout_secs = secs;
        config.ats.timeout_secs = secs;
    }
    config.csv.delimiter = args.delimiter.or(config.csv.delimiter);
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_file_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("collar.json");
        std::fs::write(
            &path,
            r#"{"vectronics": {"baseUrl": "http://file.example", "timeoutSecs": 5}, "csv": {"delimiter": ";"}}"#,
        )
        .unwrap();

        let args = GlobalArgs {
            config: Some(path),
            timeout_secs: Some(30),
            ..GlobalArgs::default()
        };
        let config = load_config(&args).unwrap();
        assert_eq!(config.vectronics.base_url, "http://file.example");
        assert_eq!(config.vectronics.timeout_secs, 30);
        assert_eq!(config.ats.timeout_secs, 30);
        assert_eq!(config.csv.delimiter, Some(';'));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let args = GlobalArgs {
            config: Some(PathBuf::from("/nonexistent/collar.json")),
            ..GlobalArgs::default()
        };
        assert!(load_config(&args).is_err());
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let args = GlobalArgs {
            timeout_secs: Some(0),
            ..GlobalArgs::default()
        };
        assert!(apply_overrides(CollarConfig::default(), &args).is_err());
    }
}
