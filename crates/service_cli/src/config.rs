//! Layered CLI configuration.
//!
//! Sources, lowest priority first:
//!
//! 1. Built-in defaults
//! 2. The TOML file given by `--config` (optional)
//! 3. Environment variables prefixed `ADJOINT_`, with `__` between nested
//!    keys, e.g. `ADJOINT_MODEL__STEPS=40` or
//!    `ADJOINT_MANAGER__SCHEDULE__TYPE=binomial`
//!
//! Command-line flags are applied on top by each command.
//!
//! ```toml
//! [model]
//! size = 16
//! steps = 20
//!
//! [manager.schedule]
//! type = "periodic"
//! period = 5
//! ```

use std::path::Path;

use adjoint_engine::ManagerConfig;
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

use crate::error::CliError;

/// Parameters of the demonstration diffusion model.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Grid points
    pub size: usize,
    /// Timesteps
    pub steps: usize,
    /// Timestep length
    pub dt: f64,
    /// Diffusion number `κ dt / dx²`
    pub diffusion_number: f64,
    /// Weight of the `|m|²` penalty in the functional
    pub regularisation: f64,
    /// Seed of the verification direction
    pub seed: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            size: 16,
            steps: 20,
            dt: 0.05,
            diffusion_number: 0.5,
            regularisation: 1.0e-2,
            seed: 7,
        }
    }
}

impl ModelConfig {
    /// Checks the model parameters.
    pub fn validate(&self) -> Result<(), CliError> {
        if self.size < 3 {
            return Err(CliError::InvalidArgument(format!(
                "model size must be at least 3, got {}",
                self.size
            )));
        }
        if self.steps == 0 {
            return Err(CliError::InvalidArgument(
                "model needs at least one timestep".to_string(),
            ));
        }
        if self.dt <= 0.0 || self.diffusion_number <= 0.0 {
            return Err(CliError::InvalidArgument(
                "dt and diffusion_number must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Complete CLI configuration.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Engine configuration
    pub manager: ManagerConfig,
    /// Model parameters
    pub model: ModelConfig,
}

/// Loads the configuration from `path` (if present) and the environment.
///
/// # Errors
///
/// [`CliError::Config`] for unreadable or malformed sources and
/// [`CliError::InvalidArgument`] for out-of-range model parameters.
pub fn load(path: &Path) -> Result<CliConfig, CliError> {
    let settings = Config::builder()
        .add_source(File::from(path).format(FileFormat::Toml).required(false))
        .add_source(
            Environment::with_prefix("ADJOINT")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;
    let config: CliConfig = settings.try_deserialize()?;
    config.model.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use adjoint_checkpoint::ScheduleConfig;
    use std::io::Write;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.model, ModelConfig::default());
        assert_eq!(config.manager.schedule, ScheduleConfig::Memory);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("adjoint.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[model]
steps = 8

[manager.schedule]
type = "periodic"
period = 3
"#
        )
        .unwrap();

        let config = load(&path).unwrap();
        assert_eq!(config.model.steps, 8);
        assert_eq!(config.model.size, 16);
        assert!(matches!(
            config.manager.schedule,
            ScheduleConfig::Periodic { period: 3, .. }
        ));
    }

    #[test]
    fn test_invalid_model_rejected() {
        let config = ModelConfig {
            size: 2,
            ..ModelConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
