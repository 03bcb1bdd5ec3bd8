//! CLI error handling

use std::fmt;

use hmc_errors::UserFacingError;

/// CLI-specific error type
#[derive(Debug)]
pub enum CliError {
    /// Orchestrator, store or configuration error
    Hmc(hmc_errors::Error),
    /// Invalid command arguments
    InvalidArguments(String),
    /// Response could not be rendered
    Output(serde_json::Error),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Hmc(e) => {
                let message = e.user_message();
                write!(f, "{message}")?;
                if let Some(code) = e.user_code() {
                    write!(f, "\n  Code: {code}")?;
                }
                if let Some(hint) = e.user_hint() {
                    write!(f, "\n  Hint: {hint}")?;
                }
                if e.is_retryable() {
                    write!(f, "\n  Retry: safe to retry this operation.")?;
                }
                Ok(())
            }
            CliError::InvalidArguments(msg) => write!(f, "Invalid arguments: {msg}"),
            CliError::Output(e) => write!(f, "Failed to render output: {e}"),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Hmc(e) => Some(e),
            CliError::Output(e) => Some(e),
            CliError::InvalidArguments(_) => None,
        }
    }
}

impl From<hmc_errors::Error> for CliError {
    fn from(e: hmc_errors::Error) -> Self {
        CliError::Hmc(e)
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::Output(e)
    }
}
