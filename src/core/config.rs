use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use std::{fs, path::PathBuf};
use tracing::debug;

/// A fund position to estimate in batch mode.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Position {
    pub fund_code: String,
    pub amount: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EastmoneyProviderConfig {
    #[serde(default = "default_eastmoney_base_url")]
    pub base_url: String,
    #[serde(default = "default_fundgz_base_url")]
    pub fundgz_base_url: String,
    /// Fund listing scripts, used for NAV history and funds without stock holdings.
    #[serde(default = "default_pingzhongdata_base_url")]
    pub pingzhongdata_base_url: String,
}

fn default_eastmoney_base_url() -> String {
    "http://fundf10.eastmoney.com".to_string()
}

fn default_fundgz_base_url() -> String {
    "http://fundgz.1234567.com.cn".to_string()
}

fn default_pingzhongdata_base_url() -> String {
    "http://fund.eastmoney.com".to_string()
}

impl Default for EastmoneyProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_eastmoney_base_url(),
            fundgz_base_url: default_fundgz_base_url(),
            pingzhongdata_base_url: default_pingzhongdata_base_url(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SinaProviderConfig {
    #[serde(default = "default_sina_base_url")]
    pub base_url: String,
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
}

fn default_sina_base_url() -> String {
    "http://hq.sinajs.cn".to_string()
}

fn default_max_batch_size() -> usize {
    100
}

impl Default for SinaProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_sina_base_url(),
            max_batch_size: default_max_batch_size(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub eastmoney: EastmoneyProviderConfig,
    #[serde(default)]
    pub sina: SinaProviderConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CacheConfig {
    /// Freshness window for quotes while the market is open.
    #[serde(default = "default_quote_ttl_secs")]
    pub quote_ttl_secs: u64,
    /// How long a cached fund profile is trusted before checking for a newer disclosure.
    #[serde(default = "default_metadata_recheck_secs")]
    pub metadata_recheck_secs: u64,
    /// How long a fetched NAV history is reused.
    #[serde(default = "default_nav_history_ttl_secs")]
    pub nav_history_ttl_secs: u64,
}

fn default_quote_ttl_secs() -> u64 {
    30
}

fn default_metadata_recheck_secs() -> u64 {
    6 * 60 * 60
}

fn default_nav_history_ttl_secs() -> u64 {
    60 * 60
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            quote_ttl_secs: default_quote_ttl_secs(),
            metadata_recheck_secs: default_metadata_recheck_secs(),
            nav_history_ttl_secs: default_nav_history_ttl_secs(),
        }
    }
}

fn default_request_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub positions: Vec<Position>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            providers: ProvidersConfig::default(),
            cache: CacheConfig::default(),
            request_timeout_secs: default_request_timeout_secs(),
            positions: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Loads the config from the default location, or built-in defaults if there is none.
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        if !config_path.exists() {
            debug!(
                "No config file at {}, using defaults",
                config_path.display()
            );
            return Ok(Self::default());
        }
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("io", "fundnav", "fundnav")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn quote_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.quote_ttl_secs)
    }

    pub fn metadata_recheck(&self) -> Duration {
        Duration::from_secs(self.cache.metadata_recheck_secs)
    }

    pub fn nav_history_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.nav_history_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_deserialization() {
        let yaml_str = r#"
providers:
  eastmoney:
    base_url: "http://example.com/f10"
    fundgz_base_url: "http://example.com/gz"
    pingzhongdata_base_url: "http://example.com/pz"
  sina:
    base_url: "http://example.com/hq"
    max_batch_size: 20
cache:
  quote_ttl_secs: 15
  metadata_recheck_secs: 3600
  nav_history_ttl_secs: 600
request_timeout_secs: 5
positions:
  - fund_code: "005827"
    amount: 10000
  - fund_code: "161725"
    amount: 2500.5
"#;

        let config: AppConfig = serde_yaml::from_str(yaml_str).expect("Failed to deserialize");
        assert_eq!(config.providers.eastmoney.base_url, "http://example.com/f10");
        assert_eq!(
            config.providers.eastmoney.fundgz_base_url,
            "http://example.com/gz"
        );
        assert_eq!(
            config.providers.eastmoney.pingzhongdata_base_url,
            "http://example.com/pz"
        );
        assert_eq!(config.providers.sina.base_url, "http://example.com/hq");
        assert_eq!(config.providers.sina.max_batch_size, 20);
        assert_eq!(config.quote_ttl(), Duration::from_secs(15));
        assert_eq!(config.metadata_recheck(), Duration::from_secs(3600));
        assert_eq!(config.nav_history_ttl(), Duration::from_secs(600));
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
        assert_eq!(config.positions.len(), 2);
        assert_eq!(
            config.positions[1],
            Position {
                fund_code: "161725".into(),
                amount: 2500.5
            }
        );
    }

    #[test]
    fn test_config_defaults_for_missing_sections() {
        let yaml_str = r#"
providers:
  sina:
    max_batch_size: 10
"#;
        let config: AppConfig = serde_yaml::from_str(yaml_str).unwrap();
        assert_eq!(config.providers.sina.base_url, "http://hq.sinajs.cn");
        assert_eq!(config.providers.sina.max_batch_size, 10);
        assert_eq!(
            config.providers.eastmoney.base_url,
            "http://fundf10.eastmoney.com"
        );
        assert_eq!(config.cache.quote_ttl_secs, 30);
        assert_eq!(config.nav_history_ttl(), Duration::from_secs(3600));
        assert_eq!(config.request_timeout_secs, 10);
        assert!(config.positions.is_empty());
    }

    #[test]
    fn test_load_from_missing_path_fails() {
        let result = AppConfig::load_from_path("/definitely/not/here/config.yaml");
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to read config file")
        );
    }
}
