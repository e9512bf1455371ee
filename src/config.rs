use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::blockchain::pow::MiningLimits;

/// Errors raised while reading configuration from the environment
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Ledger engine settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Leading zero characters required on every mined block, 0 disables mining
    pub difficulty: usize,

    /// Sign every block with the ledger key and require signatures on validation
    pub signing_enabled: bool,

    /// Payload of block 0
    pub genesis_payload: String,

    /// Upper bound on nonce attempts per block
    pub max_mining_iterations: Option<u64>,

    /// Upper bound on wall-clock time per block
    pub max_mining_duration: Option<Duration>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            difficulty: 2,
            signing_enabled: true,
            genesis_payload: "Genesis block".to_string(),
            max_mining_iterations: None,
            max_mining_duration: None,
        }
    }
}

impl LedgerConfig {
    /// Reads `LEDGER_DIFFICULTY`, `LEDGER_SIGNING`, `LEDGER_GENESIS_PAYLOAD`,
    /// `LEDGER_MAX_MINING_ITERATIONS` and `LEDGER_MAX_MINING_MS`, falling back
    /// to the defaults for unset variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = LedgerConfig::default();

        Ok(LedgerConfig {
            difficulty: parse_var("LEDGER_DIFFICULTY")?.unwrap_or(defaults.difficulty),
            signing_enabled: parse_var("LEDGER_SIGNING")?.unwrap_or(defaults.signing_enabled),
            genesis_payload: env::var("LEDGER_GENESIS_PAYLOAD").unwrap_or(defaults.genesis_payload),
            max_mining_iterations: parse_var("LEDGER_MAX_MINING_ITERATIONS")?,
            max_mining_duration: parse_var("LEDGER_MAX_MINING_MS")?.map(Duration::from_millis),
        })
    }

    /// Builder style override of the difficulty
    pub fn with_difficulty(mut self, difficulty: usize) -> Self {
        self.difficulty = difficulty;
        self
    }

    /// Builder style override of block signing
    pub fn with_signing(mut self, signing_enabled: bool) -> Self {
        self.signing_enabled = signing_enabled;
        self
    }

    pub fn with_max_mining_iterations(mut self, max_iterations: u64) -> Self {
        self.max_mining_iterations = Some(max_iterations);
        self
    }

    pub fn with_max_mining_duration(mut self, max_duration: Duration) -> Self {
        self.max_mining_duration = Some(max_duration);
        self
    }

    /// Mining bounds derived from this configuration
    pub fn mining_limits(&self) -> MiningLimits {
        MiningLimits {
            max_iterations: self.max_mining_iterations,
            max_duration: self.max_mining_duration,
            ..MiningLimits::default()
        }
    }
}

/// HTTP listener settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl ServerConfig {
    /// Reads `LEDGER_HOST` and `LEDGER_PORT`
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = ServerConfig::default();

        Ok(ServerConfig {
            host: env::var("LEDGER_HOST").unwrap_or(defaults.host),
            port: parse_var("LEDGER_PORT")?.unwrap_or(defaults.port),
        })
    }
}

fn parse_var<T>(key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(value) => parse_value(key, &value).map(Some),
        Err(_) => Ok(None),
    }
}

fn parse_value<T>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LedgerConfig::default();

        assert_eq!(config.difficulty, 2);
        assert!(config.signing_enabled);
        assert!(config.max_mining_iterations.is_none());
    }

    #[test]
    fn test_builder_overrides() {
        let config = LedgerConfig::default()
            .with_difficulty(0)
            .with_signing(false)
            .with_max_mining_iterations(50)
            .with_max_mining_duration(Duration::from_millis(250));

        assert_eq!(config.difficulty, 0);
        assert!(!config.signing_enabled);

        let limits = config.mining_limits();
        assert_eq!(limits.max_iterations, Some(50));
        assert_eq!(limits.max_duration, Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_parse_value() {
        let difficulty: usize = parse_value("LEDGER_DIFFICULTY", " 3 ").unwrap();
        assert_eq!(difficulty, 3);

        let signing: bool = parse_value("LEDGER_SIGNING", "false").unwrap();
        assert!(!signing);

        let err = parse_value::<usize>("LEDGER_DIFFICULTY", "-1").unwrap_err();
        assert!(err.to_string().contains("LEDGER_DIFFICULTY"));
    }
}
