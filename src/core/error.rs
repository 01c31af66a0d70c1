use thiserror::Error;

#[derive(Error, Debug)]
pub enum DroverError {
    #[error("Participant not found: {0}")]
    ParticipantNotFound(crate::core::types::ParticipantId),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    TomlError(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, DroverError>;
