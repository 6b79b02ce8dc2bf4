use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("Unknown risk tier: {0}")]
    UnknownTier(String),

    #[error("Invalid policy configuration: {0}")]
    InvalidConfig(String),
}
