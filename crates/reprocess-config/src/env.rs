// ============================================================================
// Environment Reader
// ============================================================================
//
// Every variable is read through a lookup function so that configuration
// can be built from the process environment in production and from a plain
// map in tests. Names are given without the service prefix.
// ============================================================================

use crate::constants::ENV_PREFIX;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Configuration loading failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("environment variable not set: [{name}]")]
    Missing { name: String },

    #[error("environment variable [{name}] has invalid value '{value}': {reason}")]
    Invalid {
        name: String,
        value: String,
        reason: String,
    },
}

pub(crate) struct EnvReader<'a> {
    lookup: &'a dyn Fn(&str) -> Option<String>,
}

impl<'a> EnvReader<'a> {
    pub(crate) fn new(lookup: &'a dyn Fn(&str) -> Option<String>) -> Self {
        Self { lookup }
    }

    pub(crate) fn full_name(name: &str) -> String {
        format!("{}{}", ENV_PREFIX, name)
    }

    pub(crate) fn optional(&self, name: &str) -> Option<String> {
        (self.lookup)(&Self::full_name(name)).filter(|v| !v.is_empty())
    }

    /// A variable that must be set and non-empty
    pub(crate) fn required(&self, name: &str) -> Result<String, ConfigError> {
        self.optional(name).ok_or_else(|| ConfigError::Missing {
            name: Self::full_name(name),
        })
    }

    pub(crate) fn required_parse<T>(&self, name: &str) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        let value = self.required(name)?;
        Self::parse(name, value)
    }

    pub(crate) fn optional_parse<T>(&self, name: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.optional(name) {
            Some(value) => Self::parse(name, value),
            None => Ok(default),
        }
    }

    /// Parse a count that must be at least one
    pub(crate) fn required_count(&self, name: &str) -> Result<usize, ConfigError> {
        let value: usize = self.required_parse(name)?;
        Self::at_least_one(name, value)
    }

    /// Whole seconds, at least one
    pub(crate) fn required_secs(&self, name: &str) -> Result<Duration, ConfigError> {
        let secs: u64 = self.required_parse(name)?;
        Self::at_least_one(name, secs).map(Duration::from_secs)
    }

    pub(crate) fn optional_secs(&self, name: &str, default: u64) -> Result<Duration, ConfigError> {
        let secs: u64 = self.optional_parse(name, default)?;
        Self::at_least_one(name, secs).map(Duration::from_secs)
    }

    fn at_least_one<T>(name: &str, value: T) -> Result<T, ConfigError>
    where
        T: PartialEq + Default + Display,
    {
        if value == T::default() {
            return Err(ConfigError::Invalid {
                name: Self::full_name(name),
                value: value.to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(value)
    }

    fn parse<T>(name: &str, value: String) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name: Self::full_name(name),
            value,
            reason: e.to_string(),
        })
    }
}
