//! Serde helpers for human-readable durations in `config.toml`.

use serde::de::{self, Visitor};
use serde::{Deserializer, Serializer};
use std::{fmt, time::Duration};

/// `Duration` as either whole seconds or a humantime string (`"2500ms"`, `"2m"`).
pub mod duration {
    use super::*;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct DurationVisitor;

        impl<'de> Visitor<'de> for DurationVisitor {
            type Value = Duration;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a duration as seconds (number) or human-readable string (e.g. '2500ms', '2m')")
            }

            fn visit_u64<E>(self, seconds: u64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(Duration::from_secs(seconds))
            }

            fn visit_i64<E>(self, seconds: i64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                u64::try_from(seconds)
                    .map(Duration::from_secs)
                    .map_err(|_| de::Error::custom(format!("Duration cannot be negative: {seconds}")))
            }

            fn visit_f64<E>(self, seconds: f64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Duration::try_from_secs_f64(seconds)
                    .map_err(|e| de::Error::custom(format!("Invalid duration {seconds}: {e}")))
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                humantime::parse_duration(value)
                    .map_err(|e| de::Error::custom(format!("Invalid duration '{value}': {e}")))
            }
        }

        deserializer.deserialize_any(DurationVisitor)
    }
}

/// Parse one of the `DEFAULT_*` humantime constants. A malformed literal yields zero.
pub fn parse_default(value: &str) -> Duration {
    humantime::parse_duration(value).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::defaults::*;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Probe {
        #[serde(with = "duration")]
        value: Duration,
    }

    #[test]
    fn accepts_seconds_and_humantime_strings() {
        let probe: Probe = toml::from_str("value = 30").unwrap();
        assert_eq!(probe.value, Duration::from_secs(30));

        let probe: Probe = toml::from_str("value = \"2500ms\"").unwrap();
        assert_eq!(probe.value, Duration::from_millis(2500));

        let probe: Probe = toml::from_str("value = 1.5").unwrap();
        assert_eq!(probe.value, Duration::from_millis(1500));
    }

    #[test]
    fn rejects_garbage() {
        assert!(toml::from_str::<Probe>("value = \"soon\"").is_err());
        assert!(toml::from_str::<Probe>("value = -3").is_err());
    }

    #[test]
    fn default_constants_parse() {
        for value in [
            DEFAULT_STARTUP_GRACE,
            DEFAULT_TERMINATION_GRACE,
            DEFAULT_METRICS_PUSH_INTERVAL,
            DEFAULT_IDLE_TIMEOUT,
            DEFAULT_REAPER_INTERVAL,
            DEFAULT_PAIR_CODE_TTL,
            DEFAULT_TOKEN_TTL,
            DEFAULT_BRIDGE_CONNECT_TIMEOUT,
            DEFAULT_BRIDGE_REQUEST_TIMEOUT,
            DEFAULT_BRIDGE_RETRY_BACKOFF,
        ] {
            assert!(humantime::parse_duration(value).is_ok(), "{value}");
        }
        assert_eq!(parse_default(DEFAULT_TERMINATION_GRACE), Duration::from_secs(5));
    }
}
