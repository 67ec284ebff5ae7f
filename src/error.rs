//! Error types for SonicField

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SonicFieldError {
    #[error("Audio device error: {0}")]
    AudioDevice(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Audio format error: {0}")]
    AudioFormat(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Spatialization error: {0}")]
    Spatialization(String),

    #[error("Engine error: {0}")]
    Engine(String),
}

impl SonicFieldError {
    /// True for errors that a later retry (user gesture, device replug) may clear.
    pub fn is_device_error(&self) -> bool {
        matches!(self, Self::AudioDevice(_))
    }

    pub fn is_validation_error(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

pub type Result<T> = std::result::Result<T, SonicFieldError>;
