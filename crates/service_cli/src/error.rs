//! CLI error types.

use thiserror::Error;

/// Errors raised by the CLI itself, before the engine is involved.
#[derive(Debug, Error)]
pub enum CliError {
    /// A command-line argument is out of range or inconsistent.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The layered configuration could not be read.
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// A derivative check fell below its expected convergence order.
    #[error("Verification failed: {check} converged at order {order:.3}, expected at least {expected}")]
    VerificationFailed {
        /// Name of the check
        check: &'static str,
        /// Observed order
        order: f64,
        /// Required order
        expected: f64,
    },
}

/// Result type for CLI commands.
pub type Result<T> = anyhow::Result<T>;
