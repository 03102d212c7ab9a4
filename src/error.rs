use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Missing required variable(s): {}", names.join(", "))]
    MissingRequiredVariable { names: Vec<String> },

    #[error("Missing variable: neither {name} nor its fallback {fallback} is set")]
    MissingDefaultableVariable { name: String, fallback: String },

    #[error("{step} failed: `{command}` exited with {}: {stderr}", code.map(|c| c.to_string()).unwrap_or_else(|| "signal".to_string()))]
    CommandFailed {
        step: String,
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Process {pid} is not alive")]
    ProcessNotAlive { pid: u32 },

    #[error("Chart not found: {}", .0.display())]
    ChartNotFound(PathBuf),

    #[error("Binary not found on PATH: {0}")]
    BinaryNotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, Error>;
