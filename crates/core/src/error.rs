use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Script load error: {0}")]
    ScriptLoad(String),

    #[error("Invocation error: {0}")]
    Invocation(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Transport timeout: {0}")]
    TransportTimeout(String),

    #[error("Capability error: {0}")]
    Capability(String),

    #[error("Sandbox error: {0}")]
    Sandbox(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this error is a transport deadline expiry, as opposed to an
    /// explicit failure reported by the counterpart.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::TransportTimeout(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
