//! Coordinator Configuration
//!
//! Defaults plus environment overrides:
//!
//! | Variable                 | Field              | Default    |
//! |--------------------------|--------------------|------------|
//! | `PACTS_COOLDOWN_SECS`    | `cooldown_secs`    | 60         |
//! | `PACTS_INSTANCE_ID`      | `instance_id`      | random v4  |
//! | `PACTS_SIGNER_THRESHOLD` | `signer_threshold` | 1          |

use std::str::FromStr;
use thiserror::Error;

use crate::core::ids::InstanceId;

/// Default cooldown between actions of one kind, in seconds.
pub const DEFAULT_COOLDOWN_SECS: u64 = 60;

/// Default number of oracle signers required per reveal.
pub const DEFAULT_SIGNER_THRESHOLD: usize = 1;

/// Configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A variable could not be parsed.
    #[error("invalid value for {var}: {value:?}")]
    InvalidValue {
        /// Variable name.
        var: &'static str,
        /// Raw value.
        value: String,
    },
    /// Cooldown must be positive.
    #[error("cooldown must be greater than zero")]
    ZeroCooldown,
}

/// Coordinator configuration.
#[derive(Clone, Debug)]
pub struct CoordinatorConfig {
    /// Global cooldown, seconds. Must be > 0.
    pub cooldown_secs: u64,
    /// Instance identity bound into commitments.
    pub instance_id: InstanceId,
    /// Oracle signatures required per reveal.
    pub signer_threshold: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: DEFAULT_COOLDOWN_SECS,
            instance_id: InstanceId::random(),
            signer_threshold: DEFAULT_SIGNER_THRESHOLD,
        }
    }
}

impl CoordinatorConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Create config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(cooldown) = parse_var::<u64, _>(&lookup, "PACTS_COOLDOWN_SECS")? {
            config.cooldown_secs = cooldown;
        }
        if let Some(raw) = lookup("PACTS_INSTANCE_ID") {
            config.instance_id = InstanceId::from_uuid_str(&raw).ok_or(ConfigError::InvalidValue {
                var: "PACTS_INSTANCE_ID",
                value: raw,
            })?;
        }
        if let Some(threshold) = parse_var::<usize, _>(&lookup, "PACTS_SIGNER_THRESHOLD")? {
            config.signer_threshold = threshold;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject unusable values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cooldown_secs == 0 {
            return Err(ConfigError::ZeroCooldown);
        }
        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { var, value: raw }),
    }
}
