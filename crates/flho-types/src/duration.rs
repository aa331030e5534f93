//! `"N seconds"` text encoding for durations on the JSON wire.
//!
//! Workflow definitions carry `retryAfter` and `openTimeout` as strings like
//! `"30 seconds"`. Use with `#[serde(with = "crate::duration::seconds_text")]`.

use std::time::Duration;

/// Render a duration as `"N seconds"` (whole seconds).
pub fn format_seconds(duration: &Duration) -> String {
    format!("{} seconds", duration.as_secs())
}

/// Parse `"N seconds"`. Anything else is rejected.
pub fn parse_seconds(text: &str) -> Option<Duration> {
    let mut parts = text.split(' ');
    let value = parts.next()?;
    let unit = parts.next()?;
    if parts.next().is_some() || unit != "seconds" {
        return None;
    }
    let secs: u32 = value.parse().ok()?;
    Some(Duration::from_secs(u64::from(secs)))
}

pub mod seconds_text {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_seconds(duration))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        super::parse_seconds(&text).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "invalid duration '{text}', expected \"<whole number> seconds\""
            ))
        })
    }
}

pub mod option_seconds_text {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        duration: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match duration {
            Some(d) => serializer.serialize_some(&super::format_seconds(d)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        let text = Option::<String>::deserialize(deserializer)?;
        text.map(|t| {
            super::parse_seconds(&t).ok_or_else(|| {
                serde::de::Error::custom(format!(
                    "invalid duration '{t}', expected \"<whole number> seconds\""
                ))
            })
        })
        .transpose()
    }
}
