//! Sandbox configuration

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// What a sandboxed script sees of its emulated process, and how long its
/// event loop is driven.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// `process.argv`
    pub argv: Vec<String>,
    /// `process.env`
    pub env: BTreeMap<String, String>,
    /// `process.cwd()`, also the base for `path.resolve`
    pub cwd: String,
    /// `process.version`
    pub version: String,
    /// `process.platform`
    pub platform: String,
    /// How long pending timers are driven after the script body returns
    #[serde(with = "duration_ms")]
    pub event_loop_timeout: Duration,
    /// Upper bound on timer callbacks fired per execution
    pub max_timer_callbacks: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            argv: vec!["node".to_string(), "index.js".to_string()],
            env: BTreeMap::from([
                ("NODE_ENV".to_string(), "development".to_string()),
                ("PATH".to_string(), "/usr/bin:/bin".to_string()),
            ]),
            cwd: "/workspace".to_string(),
            version: "v18.17.0".to_string(),
            platform: "browser".to_string(),
            event_loop_timeout: Duration::from_secs(30),
            max_timer_callbacks: 10_000,
        }
    }
}

impl SandboxConfig {
    /// Replace `argv`.
    pub fn with_argv<I, S>(mut self, argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.argv = argv.into_iter().map(Into::into).collect();
        self
    }

    /// Set one environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Replace the working directory.
    pub fn with_cwd(mut self, cwd: impl Into<String>) -> Self {
        self.cwd = cwd.into();
        self
    }

    /// Replace the event loop timeout.
    pub fn with_event_loop_timeout(mut self, timeout: Duration) -> Self {
        self.event_loop_timeout = timeout;
        self
    }
}

/// Helper for serializing Duration as milliseconds
mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SandboxConfig::default();
        assert_eq!(config.argv, vec!["node", "index.js"]);
        assert_eq!(config.env["NODE_ENV"], "development");
        assert_eq!(config.env["PATH"], "/usr/bin:/bin");
        assert_eq!(config.cwd, "/workspace");
        assert_eq!(config.version, "v18.17.0");
        assert_eq!(config.platform, "browser");
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: SandboxConfig =
            serde_json::from_str(r#"{"cwd": "/srv", "event_loop_timeout": 250}"#).unwrap();
        assert_eq!(config.cwd, "/srv");
        assert_eq!(config.event_loop_timeout, Duration::from_millis(250));
        assert_eq!(config.max_timer_callbacks, 10_000);

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["event_loop_timeout"], 250);
    }
}
