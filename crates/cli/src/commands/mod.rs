//! Command implementations.

mod dry_run;
mod info;
mod run;
mod validate;

pub use dry_run::run_dry_run;
pub use info::run_info;
pub use run::run_pipeline;
pub use validate::run_validate;

use contracts::IngestConfig;
use tracing::{debug, info};

use crate::cli::ConfigArgs;
use crate::error::{CliError, Result};

/// Load the configuration file (if any), apply overrides, validate
pub(crate) fn load_config(args: &ConfigArgs) -> Result<IngestConfig> {
    let mut config = match &args.config {
        Some(path) => {
            if !path.exists() {
                return Err(CliError::config_not_found(path));
            }
            info!(config = %path.display(), "Loading configuration");
            config_loader::ConfigLoader::load_from_path(path)?
        }
        None => {
            debug!("No configuration file given, using defaults");
            IngestConfig::default()
        }
    };

    args.apply(&mut config);
    config_loader::ConfigLoader::validate(&config)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_overrides_win_over_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[pipeline]\nworker_count = 2\n\n[broker]\ntopic = \"from-file\"").unwrap();

        let args = ConfigArgs {
            config: Some(file.path().to_path_buf()),
            topic: Some("from-flag".to_string()),
            ..Default::default()
        };
        let config = load_config(&args).unwrap();
        assert_eq!(config.pipeline.worker_count, 2);
        assert_eq!(config.broker.topic, "from-flag");
    }

    #[test]
    fn test_missing_file_reported() {
        let args = ConfigArgs {
            config: Some("does/not/exist.toml".into()),
            ..Default::default()
        };
        assert!(matches!(
            load_config(&args),
            Err(CliError::ConfigNotFound { .. })
        ));
    }

    #[test]
    fn test_invalid_override_rejected() {
        let args = ConfigArgs {
            workers: Some(0),
            ..Default::default()
        };
        assert!(matches!(load_config(&args), Err(CliError::Config(_))));
    }
}
