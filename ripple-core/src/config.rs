//! Configuration
//!
//! Options consumed by the engine. Loading them (from a file, the
//! environment or flags) is left to the host; everything here is
//! `Deserialize` with sensible defaults for missing fields.

use std::time::Duration;

use serde::Deserialize;

/// Default session time-to-live used when none is configured.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(30);

/// Lower bound for the reaper's tick interval.
pub const MIN_REAPER_INTERVAL: Duration = Duration::from_secs(5);

/// Default refill rate (tokens per second) for action limiters.
pub const DEFAULT_ACTION_RATE: f64 = 10.0;

/// Default bucket size for action limiters.
pub const DEFAULT_ACTION_BURST: u32 = 20;

/// Log verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// The directive understood by `tracing_subscriber::EnvFilter`.
    pub fn as_directive(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

/// Token-bucket settings for action invocation.
///
/// A zero `rate` or `burst` falls back to the defaults. A negative rate
/// disables limiting entirely.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Tokens added per second.
    pub rate: f64,
    /// Maximum number of tokens held.
    pub burst: u32,
}

impl RateLimitConfig {
    /// Sentinel that turns limiting off.
    pub const DISABLED: Self = Self { rate: -1.0, burst: 0 };

    pub fn new(rate: f64, burst: u32) -> Self {
        Self { rate, burst }
    }

    /// Whether this configuration turns limiting off.
    pub fn is_disabled(&self) -> bool {
        self.rate < 0.0
    }

    /// Resolve zero fields to the defaults.
    ///
    /// Returns `None` when limiting is disabled.
    pub fn resolve(&self) -> Option<(f64, u32)> {
        if self.is_disabled() {
            return None;
        }
        let rate = if self.rate == 0.0 { DEFAULT_ACTION_RATE } else { self.rate };
        let burst = if self.burst == 0 { DEFAULT_ACTION_BURST } else { self.burst };
        Some((rate, burst))
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { rate: 0.0, burst: 0 }
    }
}

/// Logging options.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingOptions {
    pub level: LogLevel,
    /// Compact console output with an uptime clock.
    pub compact: bool,
}

/// Application options.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Address the HTTP server binds to.
    pub server_address: String,

    /// Title of the HTML document.
    pub document_title: String,

    /// Development mode: compact console logs.
    pub dev_mode: bool,

    pub log_level: LogLevel,

    /// Seconds an unconnected session may live before the reaper evicts it.
    ///
    /// `None` uses [`DEFAULT_SESSION_TTL`]; zero or a negative value
    /// disables the reaper.
    pub session_ttl_secs: Option<i64>,

    /// Default limiter applied to every session's actions.
    pub action_rate_limit: RateLimitConfig,

    /// URL of the client runtime script referenced from the document head.
    pub script_path: String,

    /// Raw HTML appended to the document head.
    pub head_includes: Vec<String>,

    /// Raw HTML appended to the end of the document body.
    pub foot_includes: Vec<String>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            server_address: "0.0.0.0:3000".to_string(),
            document_title: "Ripple".to_string(),
            dev_mode: false,
            log_level: LogLevel::Info,
            session_ttl_secs: None,
            action_rate_limit: RateLimitConfig::default(),
            script_path: "/_datastar.js".to_string(),
            head_includes: Vec::new(),
            foot_includes: Vec::new(),
        }
    }
}

impl Options {
    /// Effective session TTL, or `None` when the reaper is disabled.
    pub fn session_ttl(&self) -> Option<Duration> {
        match self.session_ttl_secs {
            None => Some(DEFAULT_SESSION_TTL),
            Some(secs) if secs <= 0 => None,
            Some(secs) => Some(Duration::from_secs(secs as u64)),
        }
    }

    /// How often the reaper scans: a third of the TTL, never below
    /// [`MIN_REAPER_INTERVAL`].
    pub fn reaper_interval(&self) -> Option<Duration> {
        self.session_ttl()
            .map(|ttl| (ttl / 3).max(MIN_REAPER_INTERVAL))
    }

    /// Logging options derived from these options.
    pub fn logging(&self) -> LoggingOptions {
        LoggingOptions {
            level: self.log_level,
            compact: self.dev_mode,
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_rules() {
        let mut options = Options::default();
        assert_eq!(options.session_ttl(), Some(DEFAULT_SESSION_TTL));

        options.session_ttl_secs = Some(90);
        assert_eq!(options.session_ttl(), Some(Duration::from_secs(90)));
        assert_eq!(options.reaper_interval(), Some(Duration::from_secs(30)));

        options.session_ttl_secs = Some(6);
        assert_eq!(options.reaper_interval(), Some(MIN_REAPER_INTERVAL));

        options.session_ttl_secs = Some(0);
        assert_eq!(options.session_ttl(), None);
        options.session_ttl_secs = Some(-1);
        assert_eq!(options.reaper_interval(), None);
    }

    #[test]
    fn rate_limit_resolution() {
        assert_eq!(
            RateLimitConfig::default().resolve(),
            Some((DEFAULT_ACTION_RATE, DEFAULT_ACTION_BURST))
        );
        assert_eq!(RateLimitConfig::new(5.0, 10).resolve(), Some((5.0, 10)));
        assert_eq!(RateLimitConfig::DISABLED.resolve(), None);
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let options: Options = serde_json::from_str(
            r#"{"document_title":"Demo","session_ttl_secs":-1,"action_rate_limit":{"rate":2.5}}"#,
        )
        .unwrap();

        assert_eq!(options.document_title, "Demo");
        assert_eq!(options.server_address, "0.0.0.0:3000");
        assert_eq!(options.session_ttl(), None);
        assert_eq!(options.action_rate_limit.resolve(), Some((2.5, DEFAULT_ACTION_BURST)));
    }
}
