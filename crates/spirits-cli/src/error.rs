use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] spirits_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Check-in ID cannot be empty")]
    EmptyCheckInId,
    #[error("Invalid check-in ID: {0}")]
    InvalidCheckInId(String),
    #[error("Check-in not found: {0}")]
    CheckInNotFound(String),
    #[error("Invalid time: {0}")]
    InvalidTime(String),
    #[error("ABV must be between 0 and 100 percent, got {0}")]
    InvalidAbv(f64),
    #[error("Price must be a non-negative number, got {0}")]
    InvalidPrice(f64),
    #[error("Invalid token: {0}")]
    InvalidToken(String),
    #[error("No fields to change; pass at least one of --style, --name, --abv, --volume, --price, --at")]
    NothingToEdit,
    #[error("Configuration error: {0}")]
    Config(String),
}
