use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        source: toml::de::Error,
        path: PathBuf,
    },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct WayplanConfig {
    pub storage: StorageSection,
    pub providers: ProvidersSection,
    #[serde(default)]
    pub retry: RetrySection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageSection {
    pub db_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProvidersSection {
    pub routing_endpoint: String,
    pub geocoding_endpoint: String,
    pub weather_endpoint: String,
    pub places_endpoint: String,
    pub api_key: Option<String>,
    pub request_timeout_ms: u64,
}

impl ProvidersSection {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrySection {
    pub max_attempts: usize,
    pub schedule_ms: Vec<u64>,
    pub jitter_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            schedule_ms: vec![250, 1_000, 4_000],
            jitter_ms: 100,
        }
    }
}

pub fn load_wayplan_config<P: AsRef<Path>>(path: P) -> ConfigResult<WayplanConfig> {
    load_toml(path)
}

fn load_toml<T, P>(path: P) -> ConfigResult<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_fixture_config() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../configs/wayplan.toml");
        let config = load_wayplan_config(path).expect("config should parse");
        assert!(config.providers.routing_endpoint.starts_with("https://"));
        assert_eq!(config.providers.request_timeout(), Duration::from_millis(4000));
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn retry_section_defaults_when_absent() {
        let config: WayplanConfig = toml::from_str(
            r#"
            [storage]
            db_path = "itineraries.sqlite"

            [providers]
            routing_endpoint = "https://r.example/route"
            geocoding_endpoint = "https://g.example/geocode"
            weather_endpoint = "https://w.example/forecast"
            places_endpoint = "https://p.example/autocomplete"
            request_timeout_ms = 2000
            "#,
        )
        .unwrap();
        assert_eq!(config.retry.schedule_ms, vec![250, 1_000, 4_000]);
        assert!(config.providers.api_key.is_none());
    }
}
