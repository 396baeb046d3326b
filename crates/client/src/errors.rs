use budgetflow_core::errors::ApplicationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid client configuration: {0}")]
    Configuration(String),
    #[error("http transport failed: {0}")]
    Transport(String),
    #[error("{method} {path} returned {status}: {message}")]
    Status { method: String, path: String, status: u16, message: String },
    #[error("could not decode response from {path}: {message}")]
    Decode { path: String, message: String },
    #[error("backend declined {path}: {message}")]
    Declined { path: String, message: String },
}

impl From<reqwest::Error> for ClientError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_builder() {
            return Self::Configuration(error.to_string());
        }
        Self::Transport(error.to_string())
    }
}

impl From<ClientError> for ApplicationError {
    fn from(error: ClientError) -> Self {
        match error {
            ClientError::Configuration(message) => Self::Configuration(message),
            other => Self::Integration(other.to_string()),
        }
    }
}
