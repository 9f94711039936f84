use serde::Deserialize;

// =======================================================
// UPSTREAM CONFIG + DEFAULTS
// =======================================================
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Full URL of the data API endpoint.
    pub url: String,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: "http://api.waditu.com/dataapi".into(),
            timeout_secs: 30,
            user_agent: "tsproxy/1.0".into(),
        }
    }
}

impl UpstreamConfig {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub(crate) fn apply_defaults_from(&mut self, defaults: &UpstreamConfig) {
        if self.url.is_empty() {
            self.url = defaults.url.clone();
        }
        if self.timeout_secs == 0 {
            self.timeout_secs = defaults.timeout_secs;
        }
        if self.user_agent.is_empty() {
            self.user_agent = defaults.user_agent.clone();
        }
    }
}
