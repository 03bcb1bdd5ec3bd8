//! Host action dispatch error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DispatchError {
    #[error("agent invocation failed on {host}: {message}")]
    AgentFailed { host: String, message: String },

    #[error("agent command could not be spawned: {command}: {message}")]
    SpawnFailed { command: String, message: String },

    #[error("invalid agent command template: {message}")]
    InvalidTemplate { message: String },
}

impl UserFacingError for DispatchError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::AgentFailed { .. } => "dispatch.agent_failed",
            Self::SpawnFailed { .. } => "dispatch.spawn_failed",
            Self::InvalidTemplate { .. } => "dispatch.invalid_template",
        };
        Some(code)
    }
}
