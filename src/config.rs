//! # Client Configuration
//!
//! Mirrors §6.4's toggles as a plain, serializable struct. The core itself
//! never reads configuration from a file or the environment — an
//! application wires this up and passes the result to whichever parts of
//! the core need it (the dispatch drivers, the facility-data builder).

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Which revision of the Protocol's feature set to target (§1, §6.4).
///
/// `legacy`/`current` are also compile-time Cargo features selecting which
/// half of the crate is built; this runtime enum exists so code that
/// branches on generation (the facility-data builder's 2024-only scopes)
/// can be exercised in tests without recompiling under both feature sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Generation {
    Legacy,
    Current,
}

impl Default for Generation {
    fn default() -> Self {
        if cfg!(feature = "current") {
            Generation::Current
        } else {
            Generation::Legacy
        }
    }
}

fn default_dispatch_interval() -> Duration {
    Duration::from_millis(10)
}

/// §6.4's three configuration toggles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub generation: Generation,
    #[serde(default)]
    pub auto_closing: bool,
    #[serde(default = "default_dispatch_interval")]
    pub dispatch_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            generation: Generation::default(),
            auto_closing: false,
            dispatch_interval: default_dispatch_interval(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_dispatch_interval_is_ten_milliseconds() {
        assert_eq!(ClientConfig::default().dispatch_interval, Duration::from_millis(10));
    }

    #[test]
    fn round_trips_through_json() {
        let config = ClientConfig {
            generation: Generation::Current,
            auto_closing: true,
            dispatch_interval: Duration::from_millis(25),
        };
        let json = serde_json::to_string(&config).unwrap();
        let parsed: ClientConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.generation, Generation::Current);
        assert!(parsed.auto_closing);
        assert_eq!(parsed.dispatch_interval, Duration::from_millis(25));
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let parsed: ClientConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed.generation, Generation::Legacy);
        assert!(!parsed.auto_closing);
    }
}
