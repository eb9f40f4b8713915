use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConciergeError>;

#[derive(Error, Debug)]
pub enum ConciergeError {
    /// Missing credentials or identifiers. Fatal at startup.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Catalog fetch or completion call failed.
    #[error("Upstream unavailable: {0}")]
    Upstream(String),

    #[error("Upstream call timed out after {0} ms")]
    Timeout(u128),

    /// Completion succeeded but the payload did not match the expected shape.
    #[error("Malformed model output: {0}")]
    MalformedModelOutput(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
