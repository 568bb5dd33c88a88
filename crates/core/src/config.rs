//! Ledger configuration (derivation constants, fallback thresholds, history size).

use core::str::FromStr;

use serde::Deserialize;

/// Ratio converting total forecast volume into required agent headcount.
pub const DEFAULT_STAFFING_FACTOR: f64 = 0.18;

/// `|adjustment| / predicted` at or above which an idle interval needs review.
pub const DEFAULT_REVIEW_RATIO: f64 = 0.20;

/// `|adjustment| / predicted` at or above which an idle interval should be checked.
pub const DEFAULT_CHECK_RATIO: f64 = 0.10;

/// Configuration for the synchronous editing layer.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub staffing_factor: f64,
    pub review_ratio: f64,
    pub check_ratio: f64,
    /// Maximum number of Change Sets kept on the History Stack (`None` = unbounded).
    pub history_limit: Option<usize>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            staffing_factor: DEFAULT_STAFFING_FACTOR,
            review_ratio: DEFAULT_REVIEW_RATIO,
            check_ratio: DEFAULT_CHECK_RATIO,
            history_limit: None,
        }
    }
}

impl LedgerConfig {
    /// Load from `FLEDGER_*` environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup (environment, test fixtures, ...).
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            staffing_factor: parse_or(&lookup, "FLEDGER_STAFFING_FACTOR", defaults.staffing_factor, |f| {
                f.is_finite() && *f > 0.0
            }),
            review_ratio: parse_or(&lookup, "FLEDGER_REVIEW_RATIO", defaults.review_ratio, non_negative),
            check_ratio: parse_or(&lookup, "FLEDGER_CHECK_RATIO", defaults.check_ratio, non_negative),
            history_limit: lookup("FLEDGER_HISTORY_LIMIT")
                .and_then(|raw| parse_value("FLEDGER_HISTORY_LIMIT", &raw))
                .filter(|limit: &usize| *limit > 0),
        }
    }
}

fn non_negative(ratio: &f64) -> bool {
    ratio.is_finite() && *ratio >= 0.0
}

/// Parse `key` through `lookup`, or return `default` when absent, malformed or
/// rejected by `accept`.
///
/// Malformed and rejected values are logged and ignored.
pub fn parse_or<T, F, A>(lookup: &F, key: &str, default: T, accept: A) -> T
where
    T: FromStr + core::fmt::Debug,
    F: Fn(&str) -> Option<String>,
    A: Fn(&T) -> bool,
{
    let Some(raw) = lookup(key) else {
        return default;
    };
    match parse_value(key, &raw) {
        Some(value) if accept(&value) => value,
        Some(value) => {
            tracing::warn!(key, value = ?value, "ignoring out-of-range configuration value");
            default
        }
        None => default,
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Option<T> {
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = raw, "ignoring unparseable configuration value");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = LedgerConfig::from_lookup(|_| None);
        assert_eq!(config, LedgerConfig::default());
        assert_eq!(config.staffing_factor, 0.18);
    }

    #[test]
    fn reads_overrides_and_ignores_garbage() {
        let config = LedgerConfig::from_lookup(lookup_from(&[
            ("FLEDGER_STAFFING_FACTOR", "0.25"),
            ("FLEDGER_REVIEW_RATIO", "not-a-number"),
            ("FLEDGER_HISTORY_LIMIT", "50"),
        ]));

        assert_eq!(config.staffing_factor, 0.25);
        assert_eq!(config.review_ratio, DEFAULT_REVIEW_RATIO);
        assert_eq!(config.history_limit, Some(50));
    }

    #[test]
    fn zero_history_limit_means_unbounded() {
        let config = LedgerConfig::from_lookup(lookup_from(&[("FLEDGER_HISTORY_LIMIT", "0")]));
        assert_eq!(config.history_limit, None);
    }

    #[test]
    fn non_finite_or_negative_factors_fall_back() {
        let config = LedgerConfig::from_lookup(lookup_from(&[
            ("FLEDGER_STAFFING_FACTOR", "NaN"),
            ("FLEDGER_REVIEW_RATIO", "-0.5"),
            ("FLEDGER_CHECK_RATIO", "inf"),
        ]));
        assert_eq!(config, LedgerConfig::default());

        let zero = LedgerConfig::from_lookup(lookup_from(&[("FLEDGER_STAFFING_FACTOR", "0")]));
        assert_eq!(zero.staffing_factor, DEFAULT_STAFFING_FACTOR);
    }

    #[test]
    fn deserializes_partial_documents() {
        let config: LedgerConfig = serde_json::from_str(r#"{"staffing_factor":0.2}"#).unwrap();
        assert_eq!(config.staffing_factor, 0.2);
        assert_eq!(config.check_ratio, DEFAULT_CHECK_RATIO);
    }
}
