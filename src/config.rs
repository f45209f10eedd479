use std::env;
use std::str::FromStr;

use rust_decimal::Decimal;

use crate::billing::{LateFeePolicy, LateFeeType};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub app_name: String,
    pub environment: String,
    pub api_prefix: String,
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub trusted_hosts: Vec<String>,
    pub dev_auth_overrides_enabled: bool,
    pub rate_limit_per_second: u64,
    pub rate_limit_burst_size: u32,
    pub database_url: Option<String>,
    pub db_pool_max_connections: u32,
    pub db_pool_min_connections: u32,
    pub db_pool_acquire_timeout_seconds: u64,
    pub db_pool_idle_timeout_seconds: u64,
    pub jwt_secret: Option<String>,
    pub late_fee_policy: LateFeePolicy,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            app_name: env_or("APP_NAME", "Rentroll API"),
            environment: env_or("ENVIRONMENT", "development"),
            api_prefix: normalize_prefix(&env_or("API_PREFIX", "/api")),
            host: env_or("HOST", "0.0.0.0"),
            port: env_parse_or("PORT", 5000),
            cors_origins: parse_csv(&env_or("CORS_ORIGINS", "http://localhost:3000")),
            trusted_hosts: parse_csv(&env_or("TRUSTED_HOSTS", "localhost,127.0.0.1")),
            dev_auth_overrides_enabled: env_parse_bool_or("DEV_AUTH_OVERRIDES_ENABLED", false),
            rate_limit_per_second: env_parse_or("RATE_LIMIT_PER_SECOND", 10),
            rate_limit_burst_size: env_parse_or("RATE_LIMIT_BURST_SIZE", 100),
            database_url: env_opt("DATABASE_URL"),
            db_pool_max_connections: env_parse_or("DB_POOL_MAX_CONNECTIONS", 5),
            db_pool_min_connections: env_parse_or("DB_POOL_MIN_CONNECTIONS", 1),
            db_pool_acquire_timeout_seconds: env_parse_or("DB_POOL_ACQUIRE_TIMEOUT_SECONDS", 5),
            db_pool_idle_timeout_seconds: env_parse_or("DB_POOL_IDLE_TIMEOUT_SECONDS", 600),
            jwt_secret: env_opt("JWT_SECRET"),
            late_fee_policy: late_fee_policy_from_env(),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment.trim().eq_ignore_ascii_case("production")
    }

    pub fn auth_dev_overrides_enabled(&self) -> bool {
        if self.is_production() {
            return false;
        }
        self.dev_auth_overrides_enabled
    }
}

fn late_fee_policy_from_env() -> LateFeePolicy {
    let defaults = LateFeePolicy::default();
    LateFeePolicy {
        fee_type: env_opt("LATE_FEE_TYPE")
            .and_then(|raw| LateFeeType::from_str(&raw).ok())
            .unwrap_or(defaults.fee_type),
        value: env_parse_or("LATE_FEE_VALUE", defaults.value),
        grace_period_days: env_parse_or("LATE_FEE_GRACE_PERIOD_DAYS", defaults.grace_period_days),
        max_amount: env_opt("LATE_FEE_MAX_AMOUNT").and_then(|raw| raw.parse::<Decimal>().ok()),
    }
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_or(key: &str, default: &str) -> String {
    env_opt(key).unwrap_or_else(|| default.to_string())
}

fn env_parse_or<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy,
{
    env_opt(key)
        .and_then(|raw| raw.parse::<T>().ok())
        .unwrap_or(default)
}

fn env_parse_bool_or(key: &str, default: bool) -> bool {
    match env_opt(key).as_deref().map(str::to_ascii_lowercase) {
        Some(value) if value == "1" || value == "true" || value == "yes" || value == "on" => true,
        Some(value) if value == "0" || value == "false" || value == "no" || value == "off" => false,
        Some(_) => default,
        None => default,
    }
}

fn parse_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

fn normalize_prefix(raw: &str) -> String {
    let mut prefix = raw.trim().to_string();
    if prefix.is_empty() {
        return "/api".to_string();
    }
    if !prefix.starts_with('/') {
        prefix.insert(0, '/');
    }
    while prefix.ends_with('/') && prefix.len() > 1 {
        prefix.pop();
    }
    prefix
}

#[cfg(test)]
mod tests {
    use super::{normalize_prefix, parse_csv};

    #[test]
    fn normalizes_prefix() {
        assert_eq!(normalize_prefix("api"), "/api");
        assert_eq!(normalize_prefix("/api/"), "/api");
        assert_eq!(normalize_prefix(""), "/api");
    }

    #[test]
    fn parses_csv_lists() {
        assert_eq!(
            parse_csv(" localhost, ,127.0.0.1 "),
            vec!["localhost".to_string(), "127.0.0.1".to_string()]
        );
        assert!(parse_csv("").is_empty());
    }
}
