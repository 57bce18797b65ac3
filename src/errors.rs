use thiserror::Error;

use crate::{bus::BusError, config::ConfigError};

// Errors that stop the daemon at start-up
#[derive(Debug, Error)]
pub enum FanError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Bus(#[from] BusError),
}
