use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to open cache store at '{path}': {source}")]
    Open {
        path: String,
        #[source]
        source: sled::Error,
    },

    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("cache record codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("corrupt cache record: {0}")]
    Corrupt(&'static str),

    #[error("cache store is closed")]
    Closed,

    #[error("cache task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
