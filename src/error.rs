use crate::persistence::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Settings error: {0}")]
    Store(#[from] StoreError),

    #[error("Not configured: {0}")]
    NotConfigured(String),

    #[error("Bridge is not running")]
    Stopped,
}
