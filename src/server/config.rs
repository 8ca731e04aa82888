//! Middleware configuration.

use crate::protocol::constants::{self, DEFAULT_DURATION_SECS, MAX_DURATION_SECS, RFC822};

/// Configuration for the PREP middleware.
///
/// Built from the environment by default; every value can be overridden in
/// code before constructing the layer.
#[derive(Debug, Clone)]
pub struct PrepConfig {
    /// Content types offered by `configure` when the handler passes none.
    pub content_types: Vec<String>,
    /// Streaming duration in seconds when the client requests none.
    pub default_duration: u64,
    /// Cap on client-requested streaming duration in seconds.
    pub max_duration: u64,
}

impl Default for PrepConfig {
    fn default() -> Self {
        PrepConfig {
            content_types: vec![RFC822.to_string()],
            default_duration: DEFAULT_DURATION_SECS,
            max_duration: MAX_DURATION_SECS,
        }
    }
}

impl PrepConfig {
    /// Read configuration from `NOTIFICATIONS_*` environment variables,
    /// falling back to the defaults for anything unset or unparsable.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = PrepConfig::default();
        if let Ok(types) = std::env::var(constants::env::CONTENT_TYPES) {
            let parsed: Vec<String> = types
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect();
            if !parsed.is_empty() {
                config.content_types = parsed;
            }
        }
        if let Ok(value) = std::env::var(constants::env::DURATION) {
            if let Ok(secs) = value.trim().parse() {
                config.default_duration = secs;
            }
        }
        if let Ok(value) = std::env::var(constants::env::DURATION_MAX) {
            if let Ok(secs) = value.trim().parse() {
                config.max_duration = secs;
            }
        }
        config
    }

    /// Default `Accept-Events` offer fragment, e.g. `accept=("message/rfc822")`.
    #[must_use]
    pub fn default_offer(&self) -> String {
        let types: Vec<String> = self
            .content_types
            .iter()
            .map(|t| format!("\"{t}\""))
            .collect();
        format!("accept=({})", types.join(" "))
    }

    /// Effective streaming duration for a client request.
    ///
    /// A requested duration is honored when positive and within the cap;
    /// anything else falls back to the default.
    #[must_use]
    pub fn clamp_duration(&self, requested: Option<i64>) -> u64 {
        match requested {
            Some(secs) if secs > 0 && secs as u64 <= self.max_duration => secs as u64,
            _ => self.default_duration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PrepConfig::default();
        assert_eq!(config.content_types, vec!["message/rfc822".to_string()]);
        assert_eq!(config.default_duration, 3600);
        assert_eq!(config.max_duration, 7200);
    }

    #[test]
    fn test_default_offer_single_type() {
        let config = PrepConfig::default();
        assert_eq!(config.default_offer(), "accept=(\"message/rfc822\")");
    }

    #[test]
    fn test_default_offer_multiple_types() {
        let config = PrepConfig {
            content_types: vec!["message/rfc822".into(), "application/json".into()],
            ..Default::default()
        };
        assert_eq!(
            config.default_offer(),
            "accept=(\"message/rfc822\" \"application/json\")"
        );
    }

    #[test]
    fn test_clamp_duration() {
        let config = PrepConfig::default();
        assert_eq!(config.clamp_duration(None), 3600);
        assert_eq!(config.clamp_duration(Some(1800)), 1800);
        assert_eq!(config.clamp_duration(Some(0)), 3600);
        assert_eq!(config.clamp_duration(Some(-5)), 3600);
        assert_eq!(config.clamp_duration(Some(100_000)), 3600);
    }
}
