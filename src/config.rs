use std::path::PathBuf;
use std::str::FromStr;

use tracing::warn;

use crate::notify::DEFAULT_CHANNEL_CAPACITY;

/// Runtime settings, read from `COURTSIDE_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Prometheus exporter port. Metrics are off when unset.
    pub metrics_port: Option<u16>,
    pub seed_path: PathBuf,
    pub event_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            metrics_port: None,
            seed_path: PathBuf::from("./seed.json"),
            event_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            metrics_port: parse_or(&lookup, "COURTSIDE_METRICS_PORT", None, |s| s.parse().map(Some)),
            seed_path: lookup("COURTSIDE_SEED")
                .map(PathBuf::from)
                .unwrap_or(defaults.seed_path),
            event_capacity: parse_or(&lookup, "COURTSIDE_EVENT_CAPACITY", defaults.event_capacity, usize::from_str),
        }
    }
}

fn parse_or<T, E: std::fmt::Display>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
    parse: impl Fn(&str) -> Result<T, E>,
) -> T {
    match lookup(key) {
        None => default,
        Some(raw) => parse(raw.trim()).unwrap_or_else(|e| {
            warn!("ignoring {key}={raw:?}: {e}");
            default
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        assert_eq!(config(&[]), Config::default());
    }

    #[test]
    fn reads_every_variable() {
        let c = config(&[
            ("COURTSIDE_METRICS_PORT", "9100"),
            ("COURTSIDE_SEED", "/tmp/clubs.json"),
            ("COURTSIDE_EVENT_CAPACITY", "32"),
        ]);
        assert_eq!(c.metrics_port, Some(9100));
        assert_eq!(c.seed_path, PathBuf::from("/tmp/clubs.json"));
        assert_eq!(c.event_capacity, 32);
    }

    #[test]
    fn garbage_falls_back_to_default() {
        let c = config(&[
            ("COURTSIDE_METRICS_PORT", "not-a-port"),
            ("COURTSIDE_EVENT_CAPACITY", "-4"),
        ]);
        assert_eq!(c.metrics_port, None);
        assert_eq!(c.event_capacity, DEFAULT_CHANNEL_CAPACITY);
    }
}
