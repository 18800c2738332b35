//! Service configuration from the environment.
//!
//! Reads (after loading `.env` when present):
//!   TERMLINK_DATABASE_URL         : Postgres connection string (required)
//!   TERMLINK_DB_POOL_SIZE         : pool size (default: 10)
//!   TERMLINK_SWEEP_INTERVAL_SECS  : orphan sweep period (default: 3600)
//!   TERMLINK_SELECTOR_CONTEXT     : quote context characters (default: 32)
//!   TERMLINK_MIN_ASSIGNMENT_SCORE : assignment threshold (default: 1.0)
//!   TERMLINK_SCORING              : `count` | `confidence` (default: count)

use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use termlink_core::{EngineConfig, ScoringMethod};

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub database_url: String,
    pub pool_size: u32,
    pub sweep_interval: Duration,
    pub engine: EngineConfig,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self> {
        // A missing .env file is fine.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let database_url = lookup("TERMLINK_DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| anyhow!("TERMLINK_DATABASE_URL must be set"))?;

        let defaults = EngineConfig::default();
        let scoring = match lookup("TERMLINK_SCORING") {
            Some(raw) => ScoringMethod::from_str(raw.trim())
                .ok_or_else(|| anyhow!("TERMLINK_SCORING: unknown scoring method '{raw}'"))?,
            None => defaults.scoring,
        };
        let min_assignment_score: f64 =
            parse(&lookup, "TERMLINK_MIN_ASSIGNMENT_SCORE", defaults.min_assignment_score)?;
        if !min_assignment_score.is_finite() || min_assignment_score < 0.0 {
            bail!("TERMLINK_MIN_ASSIGNMENT_SCORE must be a non-negative number");
        }

        let sweep_secs: u64 = parse(&lookup, "TERMLINK_SWEEP_INTERVAL_SECS", 3600)?;
        if sweep_secs == 0 {
            bail!("TERMLINK_SWEEP_INTERVAL_SECS must be greater than zero");
        }

        Ok(Self {
            database_url,
            pool_size: parse(&lookup, "TERMLINK_DB_POOL_SIZE", 10)?,
            sweep_interval: Duration::from_secs(sweep_secs),
            engine: EngineConfig {
                selector_context_length: parse(
                    &lookup,
                    "TERMLINK_SELECTOR_CONTEXT",
                    defaults.selector_context_length,
                )?,
                min_assignment_score,
                scoring,
                ..defaults
            },
        })
    }

    /// Database URL with any password replaced, for logging.
    pub fn masked_database_url(&self) -> String {
        mask_database_url(&self.database_url)
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key}: invalid value '{raw}'")),
        None => Ok(default),
    }
}

pub fn mask_database_url(url: &str) -> String {
    if let Ok(parsed) = url::Url::parse(url) {
        let mut masked = parsed.clone();
        if parsed.password().is_some() {
            let _ = masked.set_password(Some("***"));
        }
        masked.to_string()
    } else if url.len() > 20 && url.is_char_boundary(10) && url.is_char_boundary(url.len() - 10) {
        format!("{}***{}", &url[..10], &url[url.len() - 10..])
    } else {
        "***".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply() {
        let cfg = ServiceConfig::from_lookup(lookup(&[(
            "TERMLINK_DATABASE_URL",
            "postgresql://localhost/termlink",
        )]))
        .unwrap();
        assert_eq!(cfg.pool_size, 10);
        assert_eq!(cfg.sweep_interval, Duration::from_secs(3600));
        assert_eq!(cfg.engine, EngineConfig::default());
    }

    #[test]
    fn overrides_apply() {
        let cfg = ServiceConfig::from_lookup(lookup(&[
            ("TERMLINK_DATABASE_URL", "postgresql://localhost/termlink"),
            ("TERMLINK_DB_POOL_SIZE", "4"),
            ("TERMLINK_SWEEP_INTERVAL_SECS", "60"),
            ("TERMLINK_SELECTOR_CONTEXT", "16"),
            ("TERMLINK_MIN_ASSIGNMENT_SCORE", "2.5"),
            ("TERMLINK_SCORING", "confidence"),
        ]))
        .unwrap();
        assert_eq!(cfg.pool_size, 4);
        assert_eq!(cfg.sweep_interval, Duration::from_secs(60));
        assert_eq!(cfg.engine.selector_context_length, 16);
        assert_eq!(cfg.engine.min_assignment_score, 2.5);
        assert_eq!(cfg.engine.scoring, ScoringMethod::Confidence);
    }

    #[test]
    fn missing_url_is_an_error() {
        let err = ServiceConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(err.to_string().contains("TERMLINK_DATABASE_URL"));
    }

    #[test]
    fn invalid_values_are_errors() {
        let base = ("TERMLINK_DATABASE_URL", "postgresql://localhost/termlink");
        for bad in [
            ("TERMLINK_DB_POOL_SIZE", "many"),
            ("TERMLINK_SWEEP_INTERVAL_SECS", "0"),
            ("TERMLINK_MIN_ASSIGNMENT_SCORE", "-1"),
            ("TERMLINK_SCORING", "tfidf"),
        ] {
            assert!(
                ServiceConfig::from_lookup(lookup(&[base, bad])).is_err(),
                "{} accepted",
                bad.0
            );
        }
    }

    #[test]
    fn password_is_masked() {
        assert_eq!(
            mask_database_url("postgresql://app:secret@db:5432/termlink"),
            "postgresql://app:***@db:5432/termlink"
        );
        assert_eq!(
            mask_database_url("postgresql://db/termlink"),
            "postgresql://db/termlink"
        );
        assert_eq!(mask_database_url("short"), "***");
    }
}
