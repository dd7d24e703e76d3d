use muxprims_transport::TransportError;

/// Errors that can occur in script operations.
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    /// Lifecycle error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// No configuration value is stored under the key.
    #[error("no config value for {0:?}")]
    MissingKey(String),

    /// The engine environment is gone; the script has been released.
    #[error("script environment has been destroyed")]
    EnvironmentDestroyed,

    /// The engine rejected an operation.
    #[error("engine error: {0}")]
    Engine(String),
}

pub type Result<T> = std::result::Result<T, ScriptError>;
