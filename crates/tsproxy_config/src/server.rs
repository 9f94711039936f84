use serde::Deserialize;

// =======================================================
// SERVER CONFIG + DEFAULTS
// =======================================================
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Seconds allowed to read request headers and body.
    pub read_timeout: u64,
    /// Seconds allowed to produce a full response once a request is read.
    pub write_timeout: u64,
    pub max_connections: usize,
    /// Grace period for in-flight requests on shutdown.
    pub shutdown_grace_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 1155,
            read_timeout: 30,
            write_timeout: 60,
            max_connections: 1024,
            shutdown_grace_secs: 30,
        }
    }
}

impl ServerConfig {
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port` pair handed to the listener.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn read_timeout(&self) -> u64 {
        self.read_timeout
    }

    pub fn write_timeout(&self) -> u64 {
        self.write_timeout
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    pub fn shutdown_grace_secs(&self) -> u64 {
        self.shutdown_grace_secs
    }

    pub(crate) fn apply_defaults_from(&mut self, defaults: &ServerConfig) {
        if self.host.is_empty() {
            self.host = defaults.host.clone();
        }
        if self.read_timeout == 0 {
            self.read_timeout = defaults.read_timeout;
        }
        if self.write_timeout == 0 {
            self.write_timeout = defaults.write_timeout;
        }
        if self.max_connections == 0 {
            self.max_connections = defaults.max_connections;
        }
        if self.shutdown_grace_secs == 0 {
            self.shutdown_grace_secs = defaults.shutdown_grace_secs;
        }
    }
}
