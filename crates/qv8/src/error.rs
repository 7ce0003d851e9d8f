//! Embedder-level errors
//!
//! Guest-script exceptions are not reported here. They travel through the
//! scope's exception channel and are observed with [`crate::TryCatch`].

/// Errors raised while creating or configuring an isolate
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Host engine error: {0}")]
    Host(#[from] rquickjs::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),
}
