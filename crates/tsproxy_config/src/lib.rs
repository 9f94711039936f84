//! Configuration model for tsproxy.
//!
//! The proxy reads one TOML file (`proxy.toml` by default) and lets
//! `TSPROXY__SECTION__KEY` environment variables override any field.
//! Values are read once at startup; there is no hot reload.

mod cache;
mod log;
mod proxy;
mod server;
mod upstream;
pub mod validation;

pub use cache::CacheConfig;
pub use log::{LogConfig, LogFormat, LogOutput};
pub use proxy::{DEFAULT_CONFIG_NAME, ENV_PREFIX, ProxyConfig};
pub use server::ServerConfig;
pub use upstream::UpstreamConfig;
pub use validation::{ConfigIssue, ConfigReport, Severity, validate};
