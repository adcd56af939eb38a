use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::dex::PROTOCOL_NAMES;
use crate::utils::RetryPolicy;

/// Scanner settings, read from a JSON file. Missing keys take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub kupo_url: String,
    pub request_timeout_secs: u64,
    pub retries: u32,
    pub retry_base_delay_ms: u64,
    pub registry_ttl_secs: u64,
    /// Records requested per backend page.
    pub page_limit: usize,
    pub protocols: Vec<String>,
    pub output: PathBuf,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            kupo_url: "http://localhost:1442".to_string(),
            request_timeout_secs: 300,
            retries: 3,
            retry_base_delay_ms: 500,
            registry_ttl_secs: 3600,
            page_limit: 1000,
            protocols: PROTOCOL_NAMES.iter().map(|p| p.to_string()).collect(),
            output: PathBuf::from("pools.json"),
        }
    }
}

impl ScanConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("could not read config {}: {}", path.display(), e))?;
        let config: ScanConfig = serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config {}: {}", path.display(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Unknown protocol names and a zero page size are rejected up front.
    pub fn validate(&self) -> Result<()> {
        if self.page_limit == 0 {
            return Err(anyhow!("page_limit must be positive"));
        }
        let known = |p: &&String| PROTOCOL_NAMES.contains(&p.as_str());
        if let Some(unknown) = self.protocols.iter().find(|p| !known(p)) {
            return Err(anyhow!(
                "unknown protocol '{}', expected one of: {}",
                unknown,
                PROTOCOL_NAMES.join(", ")
            ));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            retries: self.retries,
            base_delay_ms: self.retry_base_delay_ms,
        }
    }

    pub fn registry_ttl(&self) -> Duration {
        Duration::from_secs(self.registry_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let json = r#"{"kupo_url": "http://kupo:1442", "protocols": ["Minswap"]}"#;
        let config: ScanConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.kupo_url, "http://kupo:1442");
        assert_eq!(config.protocols, vec!["Minswap".to_string()]);
        assert_eq!(config.registry_ttl(), Duration::from_secs(3600));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_protocol_rejected() {
        let config = ScanConfig {
            protocols: vec!["Uniswap".into()],
            ..ScanConfig::default()
        };
        assert!(config.validate().unwrap_err().to_string().contains("Uniswap"));
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("scan-config-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"page_limit": 50}"#).unwrap();
        let config = ScanConfig::load(&path).unwrap();
        assert_eq!(config.page_limit, 50);
        assert_eq!(config.protocols.len(), PROTOCOL_NAMES.len());
        std::fs::remove_file(&path).unwrap();
    }
}
