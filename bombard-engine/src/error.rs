//! Controller error types

use bombard_interfaces::{ApiError, RegistryError};

/// Errors surfaced on the admin control surface
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("testing already running for service: {service}")]
    AlreadyRunning { service: String },

    #[error("no testing flow for service: {service}")]
    NotFound { service: String },

    #[error("bad request: {message}")]
    BadRequest { message: String },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Api(#[from] ApiError),
}
