use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Console,
    Json,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Console,
    File,
    Both,
}

impl LogOutput {
    pub fn to_console(self) -> bool {
        matches!(self, LogOutput::Console | LogOutput::Both)
    }

    pub fn to_file(self) -> bool {
        matches!(self, LogOutput::File | LogOutput::Both)
    }
}

// =======================================================
// LOG CONFIG + DEFAULTS
// =======================================================
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LogConfig {
    /// Default filter directive, e.g. "info" or "info,tsproxy=debug".
    /// `RUST_LOG` wins when set.
    pub level: String,
    pub format: LogFormat,
    pub output: LogOutput,
    pub file_path: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: LogFormat::Console,
            output: LogOutput::Console,
            file_path: "./logs/tsproxy.log".into(),
        }
    }
}

impl LogConfig {
    pub fn level(&self) -> &str {
        &self.level
    }

    pub fn format(&self) -> LogFormat {
        self.format
    }

    pub fn output(&self) -> LogOutput {
        self.output
    }

    pub fn file_path(&self) -> &str {
        &self.file_path
    }

    pub(crate) fn apply_defaults_from(&mut self, defaults: &LogConfig) {
        if self.level.is_empty() {
            self.level = defaults.level.clone();
        }
        if self.file_path.is_empty() {
            self.file_path = defaults.file_path.clone();
        }
    }
}
