use anyhow::Context;
use tracing::info;
use tsproxy_config::ProxyConfig;
use tsproxy_core::master::Master;
use utils::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Optional first argument: explicit path to proxy.toml.
    let path = std::env::args().nth(1);

    let cfg = match ProxyConfig::load(path.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    let report = cfg.validate();
    if !report.is_clean() {
        eprintln!("Configuration issues:\n{report}");
    }
    if report.has_errors() {
        anyhow::bail!("invalid configuration");
    }
    cfg.print();

    init_tracing(cfg.log()).context("initializing logging")?;
    info!(
        target: "tsproxy",
        listen = %cfg.server().listen_addr(),
        upstream = %cfg.upstream().url(),
        cache_enabled = cfg.cache().enabled(),
        "Starting tsproxy"
    );

    Master::new(cfg)?.run().await
}
