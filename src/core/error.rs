use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClipError {
    /// Natural language could not be turned into a valid intent
    /// (model output, transport, or JSON-shape failures).
    #[error("parse error: {0}")]
    Parse(String),

    /// Intent fields are structurally invalid.
    #[error("invalid intent: {0}")]
    Schema(String),

    /// Command construction refused the plan (sandbox escape, unsafe
    /// token, overwrite conflict, size limit).
    #[error("build error: {0}")]
    Build(String),

    /// An executed command failed or could not be launched.
    #[error("execution error: {0}")]
    Exec(String),

    /// Startup configuration is missing or malformed. Fatal, never recovered.
    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ClipError>;
