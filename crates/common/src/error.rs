use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Stage '{stage}' failed: {reason}")]
    Stage { stage: &'static str, reason: String },

    #[error("Config conflict: {0}")]
    Conflict(String),

    #[error("Data unavailable: {0}")]
    DataUnavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for a fatal stage failure carrying the stage name.
    pub fn stage(stage: &'static str, reason: impl Into<String>) -> Self {
        Error::Stage {
            stage,
            reason: reason.into(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
