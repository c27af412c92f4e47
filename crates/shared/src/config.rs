//! Environment configuration
//!
//! Everything tunable lives in env vars (a `.env` file is honored at the
//! binary edges). Required values fail fast at startup; the rest carry
//! defaults suitable for local development.

use rust_decimal::Decimal;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_address: String,
    /// Signing key for session tokens.
    pub session_secret: String,
    pub session_ttl_hours: i64,
    /// Seed defaults for new tenants; each tenant may override.
    pub tax_rate_default: Decimal,
    pub currency_default: String,
    pub trial_period_days: i64,
    pub grace_period_days: i64,
    /// Monthly base price per location, minor currency units.
    pub subscription_base_price_minor: i64,
    pub gateway_base_url: String,
    pub gateway_secret: String,
    pub gateway_public: String,
    pub gateway_webhook_secret: String,
    /// "HH:MM" UTC; the worker fires its daily pass at this time.
    pub scheduler_daily_time: String,
    pub cors_origins: Vec<String>,
    pub seed_demo: bool,
    pub request_timeout_secs: u64,
    /// Must stay below `request_timeout_secs` so a slow gateway cannot
    /// consume the whole request budget.
    pub gateway_timeout_secs: u64,
}

fn var(key: &str) -> anyhow::Result<String> {
    std::env::var(key).map_err(|_| anyhow::anyhow!("{key} must be set"))
}

fn var_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let scheduler_daily_time = var_or("SCHEDULER_DAILY_TIME", "09:00");
        parse_daily_time(&scheduler_daily_time)?;

        let tax_rate_default = Decimal::from_str(&var_or("TAX_RATE_DEFAULT", "0.16"))
            .map_err(|e| anyhow::anyhow!("TAX_RATE_DEFAULT: {e}"))?;

        let config = Self {
            database_url: var("DATABASE_URL")?,
            bind_address: var_or("BIND_ADDRESS", "0.0.0.0:8080"),
            session_secret: var("SESSION_SECRET")?,
            session_ttl_hours: parse_or("SESSION_TTL_HOURS", 24),
            tax_rate_default,
            currency_default: var_or("CURRENCY_DEFAULT", "KES"),
            trial_period_days: parse_or("TRIAL_PERIOD_DAYS", 14),
            grace_period_days: parse_or("GRACE_PERIOD_DAYS", 3),
            subscription_base_price_minor: parse_or("SUBSCRIPTION_BASE_PRICE_MINOR", 2000),
            gateway_base_url: var_or("GATEWAY_BASE_URL", "https://api.gateway.example"),
            gateway_secret: var_or("GATEWAY_SECRET", ""),
            gateway_public: var_or("GATEWAY_PUBLIC", ""),
            gateway_webhook_secret: var_or("GATEWAY_WEBHOOK_SECRET", ""),
            scheduler_daily_time,
            cors_origins: var_or("CORS_ORIGINS", "http://localhost:3000")
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            seed_demo: parse_or("SEED_DEMO", false),
            request_timeout_secs: parse_or("REQUEST_TIMEOUT_SECS", 30),
            gateway_timeout_secs: parse_or("GATEWAY_TIMEOUT_SECS", 10),
        };

        if config.gateway_timeout_secs >= config.request_timeout_secs {
            anyhow::bail!("GATEWAY_TIMEOUT_SECS must be below REQUEST_TIMEOUT_SECS");
        }

        Ok(config)
    }

    /// Six-field cron expression for the daily scheduler fire.
    pub fn scheduler_cron(&self) -> anyhow::Result<String> {
        let (hour, minute) = parse_daily_time(&self.scheduler_daily_time)?;
        Ok(format!("0 {minute} {hour} * * *"))
    }
}

/// Parse "HH:MM" into (hour, minute), both range-checked.
pub fn parse_daily_time(s: &str) -> anyhow::Result<(u32, u32)> {
    let (h, m) = s
        .split_once(':')
        .ok_or_else(|| anyhow::anyhow!("SCHEDULER_DAILY_TIME must be HH:MM, got `{s}`"))?;
    let hour: u32 = h.parse()?;
    let minute: u32 = m.parse()?;
    if hour > 23 || minute > 59 {
        anyhow::bail!("SCHEDULER_DAILY_TIME out of range: `{s}`");
    }
    Ok((hour, minute))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daily_time_parses() {
        assert_eq!(parse_daily_time("09:00").unwrap(), (9, 0));
        assert_eq!(parse_daily_time("23:59").unwrap(), (23, 59));
        assert!(parse_daily_time("24:00").is_err());
        assert!(parse_daily_time("09:60").is_err());
        assert!(parse_daily_time("0900").is_err());
    }

    #[test]
    fn scheduler_cron_shape() {
        let mut config = test_config();
        config.scheduler_daily_time = "09:30".to_string();
        assert_eq!(config.scheduler_cron().unwrap(), "0 30 9 * * *");
    }

    #[test]
    fn cors_origins_trim_whitespace() {
        let origins: Vec<String> = " http://a.example , http://b.example "
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        assert_eq!(origins, vec!["http://a.example", "http://b.example"]);
    }

    fn test_config() -> Config {
        Config {
            database_url: "postgres://localhost/test".into(),
            bind_address: "127.0.0.1:0".into(),
            session_secret: "test".into(),
            session_ttl_hours: 24,
            tax_rate_default: Decimal::new(16, 2),
            currency_default: "KES".into(),
            trial_period_days: 14,
            grace_period_days: 3,
            subscription_base_price_minor: 2000,
            gateway_base_url: "http://localhost:0".into(),
            gateway_secret: String::new(),
            gateway_public: String::new(),
            gateway_webhook_secret: String::new(),
            scheduler_daily_time: "09:00".into(),
            cors_origins: vec![],
            seed_demo: false,
            request_timeout_secs: 30,
            gateway_timeout_secs: 10,
        }
    }
}
