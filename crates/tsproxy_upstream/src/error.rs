use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("invalid upstream url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("failed to build upstream request: {0}")]
    Request(#[from] http::Error),

    #[error("upstream request failed: {0}")]
    Send(#[from] hyper_util::client::legacy::Error),

    #[error("failed to read upstream response: {0}")]
    Body(#[from] hyper::Error),

    #[error("upstream did not answer within {0:?}")]
    Timeout(Duration),
}
