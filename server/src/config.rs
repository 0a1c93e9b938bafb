use std::{str::FromStr, time::Duration};

use anyhow::{Context, Result, anyhow};
use products_pipeline::EngineConfig;

/// Which [`DealStore`](products_pipeline::DealStore) backs the engine.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum StoreKind {
    #[default]
    Postgres,
    Memory,
}

impl StoreKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StoreKind::Postgres => "postgres",
            StoreKind::Memory => "memory",
        }
    }
}

impl FromStr for StoreKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StoreKind::Postgres),
            "memory" | "in-memory" => Ok(StoreKind::Memory),
            other => Err(anyhow!("unknown STORE {other:?}; expected postgres or memory")),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub store: StoreKind,
    pub store_timeout: Duration,
    pub retry_on_conflict: bool,
    pub cors_allowed_origins: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let engine = EngineConfig::default();
        Self {
            store: StoreKind::default(),
            store_timeout: engine.store_timeout,
            retry_on_conflict: engine.retry_on_conflict,
            cors_allowed_origins: vec!["http://localhost:5173".into()],
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(raw) = lookup("STORE") {
            config.store = raw.parse()?;
        }
        if let Some(raw) = lookup("STORE_TIMEOUT_MS") {
            let millis: u64 = raw
                .trim()
                .parse()
                .with_context(|| format!("invalid STORE_TIMEOUT_MS {raw:?}"))?;
            if millis == 0 {
                return Err(anyhow!("STORE_TIMEOUT_MS must be positive"));
            }
            config.store_timeout = Duration::from_millis(millis);
        }
        if let Some(raw) = lookup("RETRY_ON_CONFLICT") {
            config.retry_on_conflict = parse_flag("RETRY_ON_CONFLICT", &raw)?;
        }
        if let Some(raw) = lookup("CORS_ALLOWED_ORIGINS") {
            config.cors_allowed_origins = raw
                .split(',')
                .filter_map(|s| {
                    let trimmed = s.trim();
                    if trimmed.is_empty() {
                        None
                    } else {
                        Some(trimmed.to_string())
                    }
                })
                .collect();
        }

        Ok(config)
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            store_timeout: self.store_timeout,
            retry_on_conflict: self.retry_on_conflict,
        }
    }
}

fn parse_flag(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(anyhow!("invalid {key} {other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<AppConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_match_engine_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.store, StoreKind::Postgres);
        assert_eq!(config.store_timeout, Duration::from_millis(5_000));
        assert!(config.retry_on_conflict);
    }

    #[test]
    fn reads_overrides() {
        let config = load(&[
            ("STORE", "Memory"),
            ("STORE_TIMEOUT_MS", "250"),
            ("RETRY_ON_CONFLICT", "no"),
            ("CORS_ALLOWED_ORIGINS", "https://a.example, ,https://b.example"),
        ])
        .unwrap();
        assert_eq!(config.store, StoreKind::Memory);
        assert_eq!(config.engine_config().store_timeout, Duration::from_millis(250));
        assert!(!config.engine_config().retry_on_conflict);
        assert_eq!(
            config.cors_allowed_origins,
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
    }

    #[test]
    fn rejects_bad_values() {
        assert!(load(&[("STORE", "sqlite")]).is_err());
        assert!(load(&[("STORE_TIMEOUT_MS", "0")]).is_err());
        assert!(load(&[("STORE_TIMEOUT_MS", "soon")]).is_err());
        assert!(load(&[("RETRY_ON_CONFLICT", "maybe")]).is_err());
    }
}
