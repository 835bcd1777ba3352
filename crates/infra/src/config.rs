use std::time::Duration;

use tracing::warn;

pub const LOCK_TIMEOUT_ENV: &str = "STOREFRONT_LOCK_TIMEOUT_MS";
pub const MAX_HISTORY_LIMIT_ENV: &str = "STOREFRONT_MAX_HISTORY_LIMIT";

/// Runtime knobs of the inventory engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryConfig {
    /// Longest an adjustment waits for the per-product lock before failing
    /// with a transient error.
    pub lock_timeout: Duration,
    /// Upper bound for `limit` on history and alert listings.
    pub max_history_limit: usize,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_millis(5_000),
            max_history_limit: 500,
        }
    }
}

impl InventoryConfig {
    /// Read overrides from the process environment; unset or unparsable
    /// values keep their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let lock_timeout = Duration::from_millis(parse_or(
            &lookup,
            LOCK_TIMEOUT_ENV,
            defaults.lock_timeout.as_millis() as u64,
        ));

        let mut max_history_limit = parse_or(&lookup, MAX_HISTORY_LIMIT_ENV, defaults.max_history_limit);
        if max_history_limit == 0 {
            warn!(key = MAX_HISTORY_LIMIT_ENV, "history limit must be positive, using default");
            max_history_limit = defaults.max_history_limit;
        }

        Self {
            lock_timeout,
            max_history_limit,
        }
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn with_max_history_limit(mut self, limit: usize) -> Self {
        self.max_history_limit = limit.max(1);
        self
    }

    /// Clamp a caller-supplied listing limit into `[1, max_history_limit]`.
    pub fn clamp_limit(&self, limit: usize) -> usize {
        limit.clamp(1, self.max_history_limit.max(1))
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: std::str::FromStr + core::fmt::Display,
{
    let Some(raw) = lookup(key) else {
        return default;
    };
    raw.trim().parse::<T>().unwrap_or_else(|_| {
        warn!(key, value = %raw, default = %default, "unparsable setting, using default");
        default
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = InventoryConfig::from_lookup(lookup(&[]));
        assert_eq!(config, InventoryConfig::default());
        assert_eq!(config.lock_timeout, Duration::from_secs(5));
        assert_eq!(config.max_history_limit, 500);
    }

    #[test]
    fn overrides_are_parsed() {
        let config = InventoryConfig::from_lookup(lookup(&[
            (LOCK_TIMEOUT_ENV, "250"),
            (MAX_HISTORY_LIMIT_ENV, " 50 "),
        ]));
        assert_eq!(config.lock_timeout, Duration::from_millis(250));
        assert_eq!(config.max_history_limit, 50);
    }

    #[test]
    fn garbage_falls_back_to_defaults() {
        let config = InventoryConfig::from_lookup(lookup(&[
            (LOCK_TIMEOUT_ENV, "soon"),
            (MAX_HISTORY_LIMIT_ENV, "0"),
        ]));
        assert_eq!(config, InventoryConfig::default());
    }

    #[test]
    fn limits_are_clamped() {
        let config = InventoryConfig::default().with_max_history_limit(100);
        assert_eq!(config.clamp_limit(0), 1);
        assert_eq!(config.clamp_limit(20), 20);
        assert_eq!(config.clamp_limit(10_000), 100);
    }
}
