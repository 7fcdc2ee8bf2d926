use crate::error::ConfigError;

const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    database_url: Option<String>,
    max_connections: u32,
    log_level: String,
    log_json: bool,
}

impl Settings {
    /// Reads settings from the process environment, after loading `.env` if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());

        let max_connections = match lookup("MARKS_DB_MAX_CONNECTIONS") {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|value| *value > 0)
                .ok_or(ConfigError::Invalid {
                    key: "MARKS_DB_MAX_CONNECTIONS",
                    value: raw.clone(),
                })?,
            None => DEFAULT_MAX_CONNECTIONS,
        };

        let log_level = lookup("MARKS_LOG_LEVEL")
            .map(|level| level.trim().to_string())
            .filter(|level| !level.is_empty())
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());

        let log_json = match lookup("MARKS_LOG_JSON") {
            Some(raw) => parse_bool(&raw).ok_or(ConfigError::Invalid {
                key: "MARKS_LOG_JSON",
                value: raw.clone(),
            })?,
            None => false,
        };

        Ok(Self {
            database_url,
            max_connections,
            log_level,
            log_json,
        })
    }

    pub fn database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or(ConfigError::Missing("DATABASE_URL"))
    }

    pub fn max_connections(&self) -> u32 {
        self.max_connections
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn log_json(&self) -> bool {
        self.log_json
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn settings(pairs: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let settings = settings(&[]).expect("settings");
        assert_eq!(settings.max_connections(), 5);
        assert_eq!(settings.log_level(), "info");
        assert!(!settings.log_json());
        assert_eq!(
            settings.database_url().unwrap_err(),
            ConfigError::Missing("DATABASE_URL")
        );
    }

    #[test]
    fn reads_overrides() {
        let settings = settings(&[
            ("DATABASE_URL", "postgres://localhost/marks"),
            ("MARKS_DB_MAX_CONNECTIONS", "12"),
            ("MARKS_LOG_LEVEL", "debug"),
            ("MARKS_LOG_JSON", "true"),
        ])
        .expect("settings");
        assert_eq!(settings.database_url(), Ok("postgres://localhost/marks"));
        assert_eq!(settings.max_connections(), 12);
        assert_eq!(settings.log_level(), "debug");
        assert!(settings.log_json());
    }

    #[test]
    fn rejects_bad_numbers_and_flags() {
        assert!(matches!(
            settings(&[("MARKS_DB_MAX_CONNECTIONS", "0")]),
            Err(ConfigError::Invalid { key: "MARKS_DB_MAX_CONNECTIONS", .. })
        ));
        assert!(matches!(
            settings(&[("MARKS_LOG_JSON", "maybe")]),
            Err(ConfigError::Invalid { key: "MARKS_LOG_JSON", .. })
        ));
    }
}
