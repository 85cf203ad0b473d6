use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context};
use edquest_gamification::config::{
    DEFAULT_EVALUATION_PASS_TIMEOUT, DEFAULT_EVALUATION_TIMEOUT, DEFAULT_MAX_CHAIN_AWARDS,
    DEFAULT_MAX_UPDATE_RETRIES,
};
use edquest_gamification::EngineConfig;

/// Default seconds between reconciliation sweeps.
pub const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 60;

/// Default number of queued users re-evaluated per sweep.
pub const DEFAULT_RECONCILE_BATCH_SIZE: i64 = 100;

/// Worker configuration loaded from environment variables.
///
/// Every field except the database URL has a default suitable for local
/// development.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    pub database_max_connections: u32,
    pub engine: EngineConfig,
    pub reconcile_interval: Duration,
    pub reconcile_batch_size: i64,
    /// Upper bound on waiting for background tasks at shutdown.
    pub shutdown_timeout: Duration,
}

impl WorkerConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                                   | Default                 |
    /// |-------------------------------------------|-------------------------|
    /// | `DATABASE_URL`                            | required                |
    /// | `DATABASE_MAX_CONNECTIONS`                | `20`                    |
    /// | `GAMIFICATION_DAILY_XP_CAP`               | `500`                   |
    /// | `GAMIFICATION_UTC_OFFSET_SECS`            | `0`                     |
    /// | `GAMIFICATION_STREAK_ACTIVITIES`          | learning activity types |
    /// | `GAMIFICATION_MAX_CHAIN_AWARDS`           | `50`                    |
    /// | `GAMIFICATION_MAX_RETRIES`                | `3`                     |
    /// | `GAMIFICATION_EVALUATION_TIMEOUT_MS`      | `5000`                  |
    /// | `GAMIFICATION_EVALUATION_PASS_TIMEOUT_MS` | `30000`                 |
    /// | `GAMIFICATION_GATE_CHAINS`                | `false`                 |
    /// | `RECONCILE_INTERVAL_SECS`                 | `60`                    |
    /// | `RECONCILE_BATCH_SIZE`                    | `100`                   |
    /// | `SHUTDOWN_TIMEOUT_SECS`                   | `30`                    |
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let database_url = lookup("DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| anyhow!("DATABASE_URL must be set"))?;

        let defaults = EngineConfig::default();

        let streak_activity_types = match lookup("GAMIFICATION_STREAK_ACTIVITIES") {
            Some(raw) => raw
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            None => defaults.streak_activity_types.clone(),
        };

        let timeout_ms: u64 = parse_or(
            &lookup,
            "GAMIFICATION_EVALUATION_TIMEOUT_MS",
            DEFAULT_EVALUATION_TIMEOUT.as_millis() as u64,
        )?;

        let pass_timeout_ms: u64 = parse_or(
            &lookup,
            "GAMIFICATION_EVALUATION_PASS_TIMEOUT_MS",
            DEFAULT_EVALUATION_PASS_TIMEOUT.as_millis() as u64,
        )?;

        let engine = EngineConfig {
            default_daily_xp_cap: parse_or(
                &lookup,
                "GAMIFICATION_DAILY_XP_CAP",
                defaults.default_daily_xp_cap,
            )?,
            reference_utc_offset_secs: parse_or(&lookup, "GAMIFICATION_UTC_OFFSET_SECS", 0)?,
            streak_activity_types,
            max_chain_awards: parse_or(
                &lookup,
                "GAMIFICATION_MAX_CHAIN_AWARDS",
                DEFAULT_MAX_CHAIN_AWARDS,
            )?,
            max_update_retries: parse_or(
                &lookup,
                "GAMIFICATION_MAX_RETRIES",
                DEFAULT_MAX_UPDATE_RETRIES,
            )?,
            evaluation_timeout: Duration::from_millis(timeout_ms),
            evaluation_pass_timeout: Duration::from_millis(pass_timeout_ms),
            gate_chained_achievements: parse_or(&lookup, "GAMIFICATION_GATE_CHAINS", false)?,
            max_page_size: defaults.max_page_size,
        };

        if engine.default_daily_xp_cap < 0 {
            return Err(anyhow!("GAMIFICATION_DAILY_XP_CAP must not be negative"));
        }

        let reconcile_batch_size: i64 =
            parse_or(&lookup, "RECONCILE_BATCH_SIZE", DEFAULT_RECONCILE_BATCH_SIZE)?;
        if reconcile_batch_size < 1 {
            return Err(anyhow!("RECONCILE_BATCH_SIZE must be at least 1"));
        }

        let reconcile_interval_secs: u64 =
            parse_or(&lookup, "RECONCILE_INTERVAL_SECS", DEFAULT_RECONCILE_INTERVAL_SECS)?;
        if reconcile_interval_secs == 0 {
            return Err(anyhow!("RECONCILE_INTERVAL_SECS must be at least 1"));
        }

        Ok(Self {
            database_url,
            database_max_connections: parse_or(
                &lookup,
                "DATABASE_MAX_CONNECTIONS",
                edquest_db::DEFAULT_MAX_CONNECTIONS,
            )?,
            engine,
            reconcile_interval: Duration::from_secs(reconcile_interval_secs),
            reconcile_batch_size,
            shutdown_timeout: Duration::from_secs(parse_or(&lookup, "SHUTDOWN_TIMEOUT_SECS", 30)?),
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has an invalid value: {raw:?}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> anyhow::Result<WorkerConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        WorkerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_only_database_url_is_set() {
        let config = load(&[("DATABASE_URL", "postgres://localhost/edquest")]).unwrap();
        assert_eq!(config.database_max_connections, 20);
        assert_eq!(config.engine.default_daily_xp_cap, 500);
        assert_eq!(config.engine.max_update_retries, 3);
        assert_eq!(config.engine.evaluation_timeout, Duration::from_secs(5));
        assert_eq!(config.engine.evaluation_pass_timeout, Duration::from_secs(30));
        assert!(!config.engine.gate_chained_achievements);
        assert_eq!(config.reconcile_interval, Duration::from_secs(60));
        assert_eq!(config.reconcile_batch_size, 100);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(30));
        assert_eq!(
            config.engine.streak_activity_types,
            EngineConfig::default().streak_activity_types
        );
    }

    #[test]
    fn missing_database_url_is_an_error() {
        let err = load(&[]).unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));
    }

    #[test]
    fn overrides_are_parsed() {
        let config = load(&[
            ("DATABASE_URL", "postgres://db/edquest"),
            ("GAMIFICATION_DAILY_XP_CAP", "1200"),
            ("GAMIFICATION_UTC_OFFSET_SECS", "-18000"),
            ("GAMIFICATION_STREAK_ACTIVITIES", " daily_login, quiz_passed ,,"),
            ("GAMIFICATION_EVALUATION_TIMEOUT_MS", "250"),
            ("GAMIFICATION_EVALUATION_PASS_TIMEOUT_MS", "4000"),
            ("GAMIFICATION_GATE_CHAINS", "true"),
            ("RECONCILE_BATCH_SIZE", "5"),
        ])
        .unwrap();
        assert_eq!(config.engine.default_daily_xp_cap, 1200);
        assert_eq!(config.engine.reference_utc_offset_secs, -18000);
        assert_eq!(
            config.engine.streak_activity_types,
            vec!["daily_login".to_string(), "quiz_passed".to_string()]
        );
        assert_eq!(config.engine.evaluation_timeout, Duration::from_millis(250));
        assert_eq!(config.engine.evaluation_pass_timeout, Duration::from_secs(4));
        assert!(config.engine.gate_chained_achievements);
        assert_eq!(config.reconcile_batch_size, 5);
    }

    #[test]
    fn malformed_number_names_the_variable() {
        let err = load(&[
            ("DATABASE_URL", "postgres://db/edquest"),
            ("GAMIFICATION_MAX_RETRIES", "three"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("GAMIFICATION_MAX_RETRIES"));
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let err = load(&[
            ("DATABASE_URL", "postgres://db/edquest"),
            ("RECONCILE_BATCH_SIZE", "0"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("RECONCILE_BATCH_SIZE"));
    }
}
