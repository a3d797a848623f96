//! Human-readable duration parsing and formatting for configuration values

use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Invalid duration format: {0}")]
    InvalidFormat(String),

    #[error("Invalid number: {0}")]
    InvalidNumber(#[from] std::num::ParseFloatError),

    #[error("Invalid unit: {0}")]
    InvalidUnit(String),

    #[error("Duration must not be negative: {0}")]
    Negative(String),
}

/// Duration wrapper that accepts `10`, `2.5`, `"500ms"`, `"10s"`, `"2m"` or `"1h"`.
/// Bare numbers are seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct HumanDuration(pub Duration);

impl HumanDuration {
    pub fn from_secs(secs: u64) -> Self {
        HumanDuration(Duration::from_secs(secs))
    }

    pub fn from_millis(millis: u64) -> Self {
        HumanDuration(Duration::from_millis(millis))
    }

    pub fn as_duration(&self) -> Duration {
        self.0
    }

    pub fn to_human_readable(&self) -> String {
        let millis = self.0.as_millis();

        if millis == 0 {
            return "0s".to_string();
        }
        if millis % 1000 != 0 {
            return format!("{}ms", millis);
        }

        let secs = millis / 1000;
        if secs % 3600 == 0 {
            format!("{}h", secs / 3600)
        } else if secs % 60 == 0 {
            format!("{}m", secs / 60)
        } else {
            format!("{}s", secs)
        }
    }
}

impl From<Duration> for HumanDuration {
    fn from(value: Duration) -> Self {
        HumanDuration(value)
    }
}

impl From<HumanDuration> for Duration {
    fn from(value: HumanDuration) -> Self {
        value.0
    }
}

impl Serialize for HumanDuration {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_human_readable())
    }
}

impl<'de> Deserialize<'de> for HumanDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct HumanDurationVisitor;

        impl<'de> serde::de::Visitor<'de> for HumanDurationVisitor {
            type Value = HumanDuration;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a duration as string (e.g., \"10s\", \"2m\") or seconds")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(HumanDuration::from_secs(v))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                u64::try_from(v)
                    .map(HumanDuration::from_secs)
                    .map_err(|_| E::custom(ParseError::Negative(v.to_string())))
            }

            fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                seconds(v).map_err(E::custom)
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                v.parse::<HumanDuration>().map_err(serde::de::Error::custom)
            }
        }

        deserializer.deserialize_any(HumanDurationVisitor)
    }
}

fn seconds(value: f64) -> Result<HumanDuration, ParseError> {
    if !value.is_finite() {
        return Err(ParseError::InvalidFormat(value.to_string()));
    }
    if value < 0.0 {
        return Err(ParseError::Negative(value.to_string()));
    }
    Ok(HumanDuration(Duration::from_secs_f64(value)))
}

impl FromStr for HumanDuration {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();

        if s.is_empty() {
            return Err(ParseError::InvalidFormat(s));
        }

        // Plain number: seconds
        if let Ok(num) = s.parse::<f64>() {
            return seconds(num);
        }

        let pos = s
            .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-'))
            .ok_or_else(|| ParseError::InvalidFormat(s.clone()))?;
        let (num_str, unit) = (&s[..pos], s[pos..].trim());

        let num: f64 = num_str.parse()?;

        let multiplier = match unit {
            "ms" => 0.001,
            "s" | "sec" | "secs" => 1.0,
            "m" | "min" | "mins" => 60.0,
            "h" | "hr" | "hrs" => 3600.0,
            _ => return Err(ParseError::InvalidUnit(unit.to_string())),
        };

        seconds(num * multiplier)
    }
}

impl fmt::Display for HumanDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_human_readable())
    }
}
