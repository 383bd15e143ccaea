use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    #[error("Invalid session configuration: {0}")]
    InvalidSessionConfig(String),
}

/// Failures reported by a network provisioner.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("Provisioner command failed: {0}")]
    Command(String),

    #[error("Provisioner returned an invalid topology: {0}")]
    InvalidTopology(String),

    #[error("Unsupported topology: {0}")]
    Unsupported(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
