//! Environment configuration helpers
//!
//! Values read from the environment are validated, never clamped: a zero or
//! negative count is reported as an error so that misconfiguration surfaces
//! at startup.

use thiserror::Error;

/// Error raised while reading a configuration value from the environment
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvError {
    /// The value could not be parsed as an integer
    #[error("{name} must be an integer, got '{value}'")]
    NotANumber { name: String, value: String },

    /// The value parsed but is zero or negative
    #[error("{name} must be >= 1, got {value}")]
    NotPositive { name: String, value: i64 },

    /// The value does not fit the target type
    #[error("{name} is out of range: {value}")]
    OutOfRange { name: String, value: i64 },

    /// The value is not a recognised boolean
    #[error("{name} must be a boolean (true/false/1/0), got '{value}'")]
    NotABool { name: String, value: String },
}

/// Parse a strictly positive integer
///
/// `name` is only used for error messages.
pub fn parse_positive<T>(name: &str, raw: &str) -> Result<T, EnvError>
where
    T: TryFrom<i64>,
{
    let trimmed = raw.trim();
    let value: i64 = trimmed.parse().map_err(|_| EnvError::NotANumber {
        name: name.to_string(),
        value: trimmed.to_string(),
    })?;

    if value <= 0 {
        return Err(EnvError::NotPositive {
            name: name.to_string(),
            value,
        });
    }

    T::try_from(value).map_err(|_| EnvError::OutOfRange {
        name: name.to_string(),
        value,
    })
}

/// Read a strictly positive integer from the environment
///
/// Returns `Ok(None)` when the variable is unset.
pub fn env_positive<T>(name: &str) -> Result<Option<T>, EnvError>
where
    T: TryFrom<i64>,
{
    match std::env::var(name) {
        Ok(raw) => parse_positive(name, &raw).map(Some),
        Err(_) => Ok(None),
    }
}

/// Read a boolean flag from the environment
pub fn env_flag(name: &str) -> Result<Option<bool>, EnvError> {
    let Ok(raw) = std::env::var(name) else {
        return Ok(None);
    };

    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(Some(true)),
        "0" | "false" | "no" | "off" => Ok(Some(false)),
        _ => Err(EnvError::NotABool {
            name: name.to_string(),
            value: raw,
        }),
    }
}
