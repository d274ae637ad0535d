#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("{kind} table full: capacity {capacity}")]
    CapacityExceeded { kind: &'static str, capacity: usize },

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
