use serde::Deserialize;

use crate::validation::{ConfigReport, validate};
use crate::{CacheConfig, LogConfig, ServerConfig, UpstreamConfig};

/// File stem searched in `.` and `./config` when no path is given.
pub const DEFAULT_CONFIG_NAME: &str = "proxy";
/// Environment prefix, e.g. `TSPROXY__CACHE__ENABLED=false`.
pub const ENV_PREFIX: &str = "TSPROXY";

// =======================================================
// PROXY CONFIG (main config)
// =======================================================
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ProxyConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub upstream: UpstreamConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub log: LogConfig,
}

impl ProxyConfig {
    pub fn server(&self) -> &ServerConfig {
        &self.server
    }

    pub fn upstream(&self) -> &UpstreamConfig {
        &self.upstream
    }

    pub fn cache(&self) -> &CacheConfig {
        &self.cache
    }

    pub fn log(&self) -> &LogConfig {
        &self.log
    }

    /// Validate the configuration and return a report of warnings and errors.
    pub fn validate(&self) -> ConfigReport {
        validate(self)
    }

    /// Load configuration.
    ///
    /// With an explicit path the file must exist. Without one, `proxy.toml`
    /// is looked up in `./config` and `.` (the latter wins) and is optional.
    /// `TSPROXY__*` environment variables are layered on top in both cases.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = match path {
            Some(file_name) => builder.add_source(
                config::File::new(file_name, config::FileFormat::Toml).required(true),
            ),
            None => builder
                .add_source(
                    config::File::new(
                        &format!("config/{DEFAULT_CONFIG_NAME}"),
                        config::FileFormat::Toml,
                    )
                    .required(false),
                )
                .add_source(
                    config::File::new(DEFAULT_CONFIG_NAME, config::FileFormat::Toml)
                        .required(false),
                ),
        };

        let built = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut cfg: ProxyConfig = built.try_deserialize()?;
        cfg.apply_defaults();
        Ok(cfg)
    }

    /// Parse configuration from an in-memory TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, config::ConfigError> {
        let built = config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()?;

        let mut cfg: ProxyConfig = built.try_deserialize()?;
        cfg.apply_defaults();
        Ok(cfg)
    }

    fn apply_defaults(&mut self) {
        self.server.apply_defaults_from(&ServerConfig::default());
        self.upstream.apply_defaults_from(&UpstreamConfig::default());
        self.cache.apply_defaults_from(&CacheConfig::default());
        self.log.apply_defaults_from(&LogConfig::default());
    }

    pub fn print(&self) {
        println!("================ TSPROXY CONFIG ================");

        println!("\n[server]");
        println!("  host                 = {}", self.server.host);
        println!("  port                 = {}", self.server.port);
        println!("  read_timeout         = {}", self.server.read_timeout);
        println!("  write_timeout        = {}", self.server.write_timeout);
        println!("  max_connections      = {}", self.server.max_connections);
        println!(
            "  shutdown_grace_secs  = {}",
            self.server.shutdown_grace_secs
        );

        println!("\n[upstream]");
        println!("  url                  = {}", self.upstream.url);
        println!("  timeout_secs         = {}", self.upstream.timeout_secs);
        println!("  user_agent           = {}", self.upstream.user_agent);

        println!("\n[cache]");
        println!("  enabled              = {}", self.cache.enabled);
        println!("  db_path              = {}", self.cache.db_path);
        println!("  ttl_days             = {}", self.cache.ttl_days);
        println!(
            "  reclaim_interval_secs = {}",
            self.cache.reclaim_interval_secs
        );

        println!("\n[log]");
        println!("  level                = {}", self.log.level);
        println!("  format               = {:?}", self.log.format);
        println!("  output               = {:?}", self.log.output);
        println!("  file_path            = {}", self.log.file_path);

        println!("================================================");
    }
}
