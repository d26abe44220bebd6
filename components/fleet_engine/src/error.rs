use thiserror::Error;

/// Failure reported by a collaborator (hypervisor, registry, bootstrapper,
/// tester). These never escape a state handler: they are logged to the
/// host's message log and folded into the failure branch of that state.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("{operation} failed: {message}")]
    Failed { operation: String, message: String },

    #[error("io error during {operation}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },
}

impl CollaboratorError {
    pub fn failed(operation: impl Into<String>, message: impl Into<String>) -> Self {
        CollaboratorError::Failed {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn io(operation: impl Into<String>, source: std::io::Error) -> Self {
        CollaboratorError::Io {
            operation: operation.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, CollaboratorError>;
