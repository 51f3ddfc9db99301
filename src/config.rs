use std::net::SocketAddr;
use std::time::Duration;

use crate::error::ConfigError;

/// Settings for the WebSocket gateway and the session reaper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Address the gateway listens on. Default: 127.0.0.1:8000.
    pub bind_addr: SocketAddr,
    /// Time without moves or connection changes after which a session is
    /// aborted and removed. Default: 10 minutes.
    pub idle_timeout: Duration,
    /// How often the reaper scans for idle sessions. Default: 30s.
    pub reap_interval: Duration,
    /// Frames longer than this are answered with a parse error without
    /// being decoded. Default: 64 bytes.
    pub max_frame_len: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8000)),
            idle_timeout: Duration::from_secs(600),
            reap_interval: Duration::from_secs(30),
            max_frame_len: 64,
        }
    }
}

impl GatewayConfig {
    pub const ENV_BIND_ADDR: &'static str = "CHESS_GATEWAY_BIND_ADDR";
    pub const ENV_IDLE_TIMEOUT_SECS: &'static str = "CHESS_GATEWAY_IDLE_TIMEOUT_SECS";
    pub const ENV_REAP_INTERVAL_SECS: &'static str = "CHESS_GATEWAY_REAP_INTERVAL_SECS";
    pub const ENV_MAX_FRAME_LEN: &'static str = "CHESS_GATEWAY_MAX_FRAME_LEN";

    /// Defaults overridden by any `CHESS_GATEWAY_*` variables that are set.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`GatewayConfig::from_env`] but reading from `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(value) = lookup(Self::ENV_BIND_ADDR) {
            config.bind_addr = parse_var(Self::ENV_BIND_ADDR, value)?;
        }
        if let Some(value) = lookup(Self::ENV_IDLE_TIMEOUT_SECS) {
            config.idle_timeout =
                Duration::from_secs(parse_var(Self::ENV_IDLE_TIMEOUT_SECS, value)?);
        }
        if let Some(value) = lookup(Self::ENV_REAP_INTERVAL_SECS) {
            config.reap_interval =
                Duration::from_secs(parse_var(Self::ENV_REAP_INTERVAL_SECS, value)?);
        }
        if let Some(value) = lookup(Self::ENV_MAX_FRAME_LEN) {
            config.max_frame_len = parse_var(Self::ENV_MAX_FRAME_LEN, value)?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.idle_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                reason: "idle_timeout must be > 0".to_string(),
            });
        }
        if self.reap_interval.is_zero() {
            return Err(ConfigError::Invalid {
                reason: "reap_interval must be > 0".to_string(),
            });
        }
        // Shortest frame that can carry a move.
        if self.max_frame_len < 4 {
            return Err(ConfigError::Invalid {
                reason: format!("max_frame_len must be >= 4, got {}", self.max_frame_len),
            });
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Env { name, value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&'static str, &str)]) -> impl Fn(&'static str) -> Option<String> {
        let vars: HashMap<&'static str, String> =
            vars.iter().map(|(k, v)| (*k, v.to_string())).collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let config = GatewayConfig::default();
        config.validate().unwrap();
        assert_eq!(GatewayConfig::from_lookup(lookup(&[])).unwrap(), config);
    }

    #[test]
    fn env_overrides() {
        let config = GatewayConfig::from_lookup(lookup(&[
            (GatewayConfig::ENV_BIND_ADDR, "0.0.0.0:9000"),
            (GatewayConfig::ENV_IDLE_TIMEOUT_SECS, "45"),
            (GatewayConfig::ENV_MAX_FRAME_LEN, " 16 "),
        ]))
        .unwrap();
        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.idle_timeout, Duration::from_secs(45));
        assert_eq!(config.reap_interval, Duration::from_secs(30));
        assert_eq!(config.max_frame_len, 16);
    }

    #[test]
    fn rejects_bad_values() {
        let err = GatewayConfig::from_lookup(lookup(&[(
            GatewayConfig::ENV_IDLE_TIMEOUT_SECS,
            "soon",
        )]))
        .unwrap_err();
        assert_eq!(
            err,
            ConfigError::Env {
                name: GatewayConfig::ENV_IDLE_TIMEOUT_SECS,
                value: "soon".to_string()
            }
        );

        let err =
            GatewayConfig::from_lookup(lookup(&[(GatewayConfig::ENV_REAP_INTERVAL_SECS, "0")]))
                .unwrap_err();
        assert_eq!(err.to_string(), "invalid configuration: reap_interval must be > 0");

        let config = GatewayConfig {
            max_frame_len: 3,
            ..GatewayConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
