//! Upstream forwarding: relays a raw request body to the data API and hands
//! back the raw status and body. No parsing, no retries.

mod error;
mod forwarder;

pub use error::UpstreamError;
pub use forwarder::{Forward, HttpForwarder, UpstreamResponse};
