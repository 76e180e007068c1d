use thiserror::Error;

pub type Result<T> = std::result::Result<T, ToolkitError>;

#[derive(Error, Debug)]
pub enum ToolkitError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Gateway connection error: {0}")]
    Connection(String),

    #[error("Gateway response error: {0}")]
    Response(String),

    #[error("Data error: {0}")]
    Data(String),

    #[error("Invalid input: {0}")]
    Input(String),

    #[error("Solver did not converge: {0}")]
    Convergence(String),
}

impl ToolkitError {
    /// Classifies a transport-level failure from the HTTP client.
    pub fn from_transport(endpoint: &str, err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() || err.is_request() {
            ToolkitError::Connection(format!("{}: {}", endpoint, err))
        } else if let Some(status) = err.status() {
            ToolkitError::Response(format!("{}: HTTP {}", endpoint, status))
        } else {
            ToolkitError::Response(format!("{}: {}", endpoint, err))
        }
    }
}
