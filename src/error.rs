use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// The remote side answered, but not with a success status.
    #[error("HTTP-{status}: {text}")]
    Transport { status: u16, text: String },

    /// The call never produced a reply (connect, TLS, body read, client timeout).
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Deadline expired after {0:?}")]
    DeadlineExpired(Duration),

    #[error("Pacer capacity exceeded (max: {max} scheduled actions)")]
    CapacityExceeded { max: usize },

    #[error("No home directory")]
    NoHomeDir,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Task join error: {0}")]
    TaskJoin(String),
}

impl Error {
    /// Errors that are captured into a `Failure` outcome instead of aborting a run.
    pub fn is_call_failure(&self) -> bool {
        matches!(
            self,
            Error::Transport { .. } | Error::Connection(_) | Error::Decode(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
