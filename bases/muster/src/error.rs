//! Base-level error types.

use std::path::PathBuf;

use thiserror::Error;

use fleet_primitives::ValidationError;

#[derive(Debug, Error)]
pub enum CompositionError {
    #[error("failed to read composition {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse composition {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("actor {actor} references unknown network {network}")]
    UnknownNetwork { actor: String, network: String },

    #[error("actor {actor} references unknown template {template}")]
    UnknownTemplate { actor: String, template: String },

    #[error("actor {actor} lists no networks")]
    NoNetworks { actor: String },

    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
}

pub type Result<T> = std::result::Result<T, CompositionError>;
