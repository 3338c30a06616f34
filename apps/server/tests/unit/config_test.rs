//! Unit tests for configuration parsing
//!
//! Tests environment variable parsing and default values.
//!
//! Note: These tests modify global environment variables and must run serially.

use std::time::Duration;

use chrono::FixedOffset;
use oneiri::config::{
    CacheConfig, ConfigError, QuotaConfig, QuotaWindowPolicy, WeaverConfig, DEFAULT_DAILY_LIMIT,
};
use serial_test::serial;

const QUOTA_VARS: [&str; 4] = [
    "DAILY_WEAVE_LIMIT",
    "QUOTA_WINDOW",
    "QUOTA_RESET_UTC_OFFSET_MINUTES",
    "QUOTA_STRICT",
];

const WEAVER_VARS: [&str; 4] = [
    "WEAVER_URL",
    "WEAVER_API_KEY",
    "WEAVER_SIGNING_SECRET",
    "WEAVER_TIMEOUT_SECS",
];

fn clear(vars: &[&str]) {
    for var in vars {
        std::env::remove_var(var);
    }
}

// =============================================================================
// Quota Config Tests
// =============================================================================

#[test]
#[serial]
fn test_quota_config_defaults() {
    clear(&QUOTA_VARS);

    let config = QuotaConfig::from_env().unwrap();

    assert_eq!(config.daily_limit, DEFAULT_DAILY_LIMIT);
    assert_eq!(config.daily_limit, 2);
    assert_eq!(config.window, QuotaWindowPolicy::default());
    assert!(!config.strict);
}

#[test]
#[serial]
fn test_quota_config_custom_values() {
    clear(&QUOTA_VARS);
    std::env::set_var("DAILY_WEAVE_LIMIT", "5");
    std::env::set_var("QUOTA_WINDOW", "calendar");
    std::env::set_var("QUOTA_RESET_UTC_OFFSET_MINUTES", "-300");
    std::env::set_var("QUOTA_STRICT", "true");

    let config = QuotaConfig::from_env().unwrap();

    assert_eq!(config.daily_limit, 5);
    assert_eq!(
        config.window,
        QuotaWindowPolicy::CalendarDay {
            reset_offset: FixedOffset::west_opt(5 * 3600).unwrap()
        }
    );
    assert!(config.strict);

    clear(&QUOTA_VARS);
}

#[test]
#[serial]
fn test_quota_config_rolling_window() {
    clear(&QUOTA_VARS);
    std::env::set_var("QUOTA_WINDOW", "Rolling");

    let config = QuotaConfig::from_env().unwrap();
    assert_eq!(config.window, QuotaWindowPolicy::Rolling);

    clear(&QUOTA_VARS);
}

#[test]
#[serial]
fn test_quota_config_rejects_invalid_limit() {
    for value in ["not-a-number", "-3", "", "2.5"] {
        clear(&QUOTA_VARS);
        std::env::set_var("DAILY_WEAVE_LIMIT", value);

        let err = QuotaConfig::from_env().unwrap_err();
        assert_eq!(err, ConfigError::InvalidDailyLimit);
    }
    clear(&QUOTA_VARS);
}

#[test]
#[serial]
fn test_quota_config_zero_limit() {
    clear(&QUOTA_VARS);
    std::env::set_var("DAILY_WEAVE_LIMIT", "0");

    // Zero is valid and disables weaving entirely
    let config = QuotaConfig::from_env().unwrap();
    assert_eq!(config.daily_limit, 0);

    clear(&QUOTA_VARS);
}

#[test]
#[serial]
fn test_quota_config_rejects_unknown_window() {
    clear(&QUOTA_VARS);
    std::env::set_var("QUOTA_WINDOW", "weekly");

    assert_eq!(
        QuotaConfig::from_env().unwrap_err(),
        ConfigError::InvalidQuotaWindow
    );

    clear(&QUOTA_VARS);
}

#[test]
#[serial]
fn test_quota_config_rejects_bad_offset() {
    for value in ["900", "-841", "two hours"] {
        clear(&QUOTA_VARS);
        std::env::set_var("QUOTA_RESET_UTC_OFFSET_MINUTES", value);

        assert_eq!(
            QuotaConfig::from_env().unwrap_err(),
            ConfigError::InvalidResetOffset,
            "offset {} should be rejected",
            value
        );
    }
    clear(&QUOTA_VARS);
}

// =============================================================================
// Weaver Config Tests
// =============================================================================

#[test]
#[serial]
fn test_weaver_config_requires_url() {
    clear(&WEAVER_VARS);

    assert_eq!(
        WeaverConfig::from_env().unwrap_err(),
        ConfigError::MissingWeaverUrl
    );
}

#[test]
#[serial]
fn test_weaver_config_rejects_non_http_url() {
    clear(&WEAVER_VARS);
    std::env::set_var("WEAVER_URL", "ftp://weaver.internal/weave");

    assert_eq!(
        WeaverConfig::from_env().unwrap_err(),
        ConfigError::InvalidWeaverUrl
    );

    clear(&WEAVER_VARS);
}

#[test]
#[serial]
fn test_weaver_config_values() {
    clear(&WEAVER_VARS);
    std::env::set_var("WEAVER_URL", "https://weaver.internal/v1/weave");
    std::env::set_var("WEAVER_API_KEY", "");
    std::env::set_var("WEAVER_SIGNING_SECRET", "s3cret");
    std::env::set_var("WEAVER_TIMEOUT_SECS", "15");

    let config = WeaverConfig::from_env().unwrap();

    assert_eq!(config.url, "https://weaver.internal/v1/weave");
    // Empty values count as unset
    assert_eq!(config.api_key, None);
    assert_eq!(config.signing_secret.as_deref(), Some("s3cret"));
    assert_eq!(config.timeout, Duration::from_secs(15));

    clear(&WEAVER_VARS);
}

#[test]
#[serial]
fn test_weaver_config_default_timeout() {
    clear(&WEAVER_VARS);
    std::env::set_var("WEAVER_URL", "http://localhost:9000");
    std::env::set_var("WEAVER_TIMEOUT_SECS", "soon");

    let config = WeaverConfig::from_env().unwrap();
    assert_eq!(config.timeout, Duration::from_secs(60));

    clear(&WEAVER_VARS);
}

// =============================================================================
// Cache Config Tests
// =============================================================================

#[test]
#[serial]
fn test_cache_config_ttl() {
    std::env::remove_var("PROFILE_CACHE_TTL_SECS");
    assert_eq!(CacheConfig::from_env().profile_ttl, Duration::from_secs(300));

    std::env::set_var("PROFILE_CACHE_TTL_SECS", "30");
    assert_eq!(CacheConfig::from_env().profile_ttl, Duration::from_secs(30));

    std::env::remove_var("PROFILE_CACHE_TTL_SECS");
}
