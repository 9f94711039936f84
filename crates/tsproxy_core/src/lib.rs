pub mod handler;
pub mod master;
pub mod responses;
pub mod worker;

/// The only route the proxy serves.
pub const DATA_API_PATH: &str = "/dataapi";
