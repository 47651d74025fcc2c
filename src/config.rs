//! Configuration - defaults with environment overrides

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::settlement::SettlementConfig;

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Driver frequency (Hz). Each tick still advances the engines by one
    /// fixed simulation step.
    pub tick_rate: u32,
    /// How long ended matches stay queryable before removal.
    pub match_grace: Duration,
    /// Ledger retry and shutdown tuning.
    pub settlement: SettlementConfig,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tick_rate: crate::TICK_RATE,
            match_grace: Duration::from_secs(300),
            settlement: SettlementConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by any of the supported environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as `from_env` with an explicit variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(rate) = parse_var::<u32, _>(&lookup, "TICK_RATE")? {
            if rate == 0 {
                return Err(ConfigError::Invalid { name: "TICK_RATE", value: rate.to_string() });
            }
            config.tick_rate = rate;
        }
        if let Some(secs) = parse_var(&lookup, "MATCH_GRACE_SECS")? {
            config.match_grace = Duration::from_secs(secs);
        }

        let settlement = &mut config.settlement;
        if let Some(retries) = parse_var(&lookup, "SETTLEMENT_MAX_RETRIES")? {
            settlement.max_retries = retries;
        }
        if let Some(ms) = parse_var(&lookup, "SETTLEMENT_BACKOFF_MS")? {
            settlement.backoff_base = Duration::from_millis(ms);
        }
        if let Some(gas) = parse_var(&lookup, "SETTLEMENT_BASE_GAS")? {
            settlement.base_gas = gas;
        }
        if let Some(step) = parse_var(&lookup, "SETTLEMENT_GAS_STEP")? {
            settlement.gas_step = step;
        }
        if let Some(secs) = parse_var(&lookup, "SETTLEMENT_SHUTDOWN_GRACE_SECS")? {
            settlement.shutdown_grace = Duration::from_secs(secs);
        }

        if let Some(level) = lookup("LOG_LEVEL") {
            config.log_level = level;
        }

        Ok(config)
    }

    /// Period of one driver tick.
    pub fn tick_period(&self) -> Duration {
        Duration::from_secs(1) / self.tick_rate.max(1)
    }
}

fn parse_var<T, F>(lookup: &F, name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.tick_rate, 60);
        assert_eq!(config.settlement.max_retries, 3);
        assert_eq!(config.settlement.backoff_base, Duration::from_secs(1));
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_overrides() {
        let config = ServerConfig::from_lookup(lookup_from(&[
            ("TICK_RATE", "30"),
            ("MATCH_GRACE_SECS", "5"),
            ("SETTLEMENT_MAX_RETRIES", "5"),
            ("SETTLEMENT_BACKOFF_MS", "250"),
            ("SETTLEMENT_BASE_GAS", "100000"),
            ("SETTLEMENT_GAS_STEP", " 1000 "),
            ("SETTLEMENT_SHUTDOWN_GRACE_SECS", "1"),
            ("LOG_LEVEL", "debug"),
        ]))
        .unwrap();

        assert_eq!(config.tick_rate, 30);
        assert_eq!(config.tick_period(), Duration::from_secs(1) / 30);
        assert_eq!(config.match_grace, Duration::from_secs(5));
        assert_eq!(config.settlement.max_retries, 5);
        assert_eq!(config.settlement.backoff_base, Duration::from_millis(250));
        assert_eq!(config.settlement.base_gas, 100_000);
        assert_eq!(config.settlement.gas_step, 1_000);
        assert_eq!(config.settlement.shutdown_grace, Duration::from_secs(1));
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_invalid_values() {
        let err = ServerConfig::from_lookup(lookup_from(&[("SETTLEMENT_MAX_RETRIES", "many")]));
        assert!(matches!(
            err,
            Err(ConfigError::Invalid { name: "SETTLEMENT_MAX_RETRIES", .. })
        ));

        let err = ServerConfig::from_lookup(lookup_from(&[("TICK_RATE", "0")]));
        assert!(matches!(err, Err(ConfigError::Invalid { name: "TICK_RATE", .. })));
    }
}
