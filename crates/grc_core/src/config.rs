//! Runtime limits for the core.
//!
//! Defaults are the platform maxima. Environment overrides may tighten a
//! limit but never loosen it: larger values are clamped.

use serde::Serialize;

pub const MAX_FILE_SIZE_BYTES: i64 = 100 * 1024 * 1024;
pub const MAX_POLICY_CONTENT_BYTES: usize = 1024 * 1024;
pub const MAX_UPLOAD_URL_TTL_SECS: u64 = 900;
pub const MAX_DOWNLOAD_URL_TTL_SECS: u64 = 300;
pub const DEFAULT_EXPIRING_SOON_DAYS: i64 = 30;
pub const MIN_REMINDER_INTERVAL_HOURS: i64 = 24;

pub const MAX_BULK_REQUESTS: usize = 100;
pub const MAX_BULK_LINKS: usize = 50;
pub const MAX_SIGNERS: usize = 10;
pub const MIN_FRESHNESS_DAYS: i32 = 1;
pub const MAX_FRESHNESS_DAYS: i32 = 3650;

#[derive(Debug, Clone, Serialize)]
pub struct CoreConfig {
    pub max_file_size_bytes: i64,
    pub max_policy_content_bytes: usize,
    pub upload_url_ttl_secs: u64,
    pub download_url_ttl_secs: u64,
    /// Window for `expiring_soon` evidence and `due_soon` policy reviews.
    pub expiring_soon_days: i64,
    /// Minimum gap between two reminders for the same sign-off.
    pub reminder_interval_hours: i64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            max_file_size_bytes: MAX_FILE_SIZE_BYTES,
            max_policy_content_bytes: MAX_POLICY_CONTENT_BYTES,
            upload_url_ttl_secs: MAX_UPLOAD_URL_TTL_SECS,
            download_url_ttl_secs: MAX_DOWNLOAD_URL_TTL_SECS,
            expiring_soon_days: DEFAULT_EXPIRING_SOON_DAYS,
            reminder_interval_hours: MIN_REMINDER_INTERVAL_HOURS,
        }
    }
}

impl CoreConfig {
    /// Reads `GRC_*` overrides from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let num = |key: &str| lookup(key).and_then(|v| v.trim().parse::<i64>().ok());
        let tighten = |key: &str, default: i64, min: i64| -> i64 {
            num(key).map(|v| v.clamp(min, default)).unwrap_or(default)
        };

        let config = Self {
            max_file_size_bytes: tighten("GRC_MAX_FILE_SIZE_BYTES", MAX_FILE_SIZE_BYTES, 1),
            max_policy_content_bytes: tighten(
                "GRC_MAX_POLICY_CONTENT_BYTES",
                MAX_POLICY_CONTENT_BYTES as i64,
                1,
            ) as usize,
            upload_url_ttl_secs: tighten("GRC_UPLOAD_URL_TTL_SECS", MAX_UPLOAD_URL_TTL_SECS as i64, 1)
                as u64,
            download_url_ttl_secs: tighten(
                "GRC_DOWNLOAD_URL_TTL_SECS",
                MAX_DOWNLOAD_URL_TTL_SECS as i64,
                1,
            ) as u64,
            expiring_soon_days: tighten("GRC_EXPIRING_SOON_DAYS", DEFAULT_EXPIRING_SOON_DAYS, 1),
            reminder_interval_hours: num("GRC_REMINDER_INTERVAL_HOURS")
                .map(|v| v.max(MIN_REMINDER_INTERVAL_HOURS))
                .unwrap_or(MIN_REMINDER_INTERVAL_HOURS),
        };
        tracing::debug!(?config, "core config resolved");
        config
    }
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
    fn defaults_are_platform_limits() {
        let config = CoreConfig::from_lookup(|_| None);
        assert_eq!(config.max_file_size_bytes, 104_857_600);
        assert_eq!(config.max_policy_content_bytes, 1_048_576);
        assert_eq!(config.upload_url_ttl_secs, 900);
        assert_eq!(config.download_url_ttl_secs, 300);
        assert_eq!(config.expiring_soon_days, 30);
        assert_eq!(config.reminder_interval_hours, 24);
    }

    #[test]
    fn overrides_only_tighten() {
        let config = CoreConfig::from_lookup(lookup(&[
            ("GRC_MAX_FILE_SIZE_BYTES", "1024"),
            ("GRC_MAX_POLICY_CONTENT_BYTES", "999999999"),
            ("GRC_UPLOAD_URL_TTL_SECS", "60"),
            ("GRC_REMINDER_INTERVAL_HOURS", "1"),
            ("GRC_EXPIRING_SOON_DAYS", "45"),
            ("GRC_DOWNLOAD_URL_TTL_SECS", "not-a-number"),
        ]));
        assert_eq!(config.max_file_size_bytes, 1024);
        assert_eq!(config.max_policy_content_bytes, MAX_POLICY_CONTENT_BYTES);
        assert_eq!(config.upload_url_ttl_secs, 60);
        assert_eq!(config.download_url_ttl_secs, 300);
        assert_eq!(config.reminder_interval_hours, 24);
        assert_eq!(config.expiring_soon_days, 30);
    }

    #[test]
    fn expiring_soon_window_never_exceeds_thirty_days() {
        let shorter = CoreConfig::from_lookup(lookup(&[("GRC_EXPIRING_SOON_DAYS", "7")]));
        assert_eq!(shorter.expiring_soon_days, 7);
        let zero = CoreConfig::from_lookup(lookup(&[("GRC_EXPIRING_SOON_DAYS", "0")]));
        assert_eq!(zero.expiring_soon_days, 1);
        let huge = CoreConfig::from_lookup(lookup(&[("GRC_EXPIRING_SOON_DAYS", "365")]));
        assert_eq!(huge.expiring_soon_days, 30);
    }
}
