/// Commit configuration.
///
/// Loaded from a TOML file where every field is optional, then overlaid
/// with credentials from the environment so secrets stay out of the file.
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CommitError, Result};
use crate::storage::codex::CodexConfig;
use crate::storage::ipfs::IpfsConfig;
use crate::storage::pinata::PinataConfig;
use crate::storage::{StorageType, DEFAULT_HEALTH_TIMEOUT};
use crate::trace::TraceContext;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommitConfig {
    /// Backends in the order the pipeline tries them.
    pub order: Vec<StorageType>,
    pub health_timeout_ms: u64,
    pub primary: IpfsConfig,
    pub pinning: PinataConfig,
    pub codex: CodexConfig,
    pub trace: TraceContext,
}

impl Default for CommitConfig {
    fn default() -> Self {
        Self {
            order: vec![
                StorageType::PrimaryNetwork,
                StorageType::PinningService,
                StorageType::DistributedFs,
            ],
            health_timeout_ms: DEFAULT_HEALTH_TIMEOUT.as_millis() as u64,
            primary: IpfsConfig::default(),
            pinning: PinataConfig::default(),
            codex: CodexConfig::default(),
            trace: TraceContext::default(),
        }
    }
}

impl CommitConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| CommitError::Config(e.to_string()))
    }

    /// Read a TOML file. Environment overrides are not applied.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| CommitError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    /// Overlay credentials and endpoints from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Overlay values from `lookup`. Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("PINATA_JWT") {
            self.pinning.jwt = Some(v);
        }
        if let Some(v) = get("PINATA_API_KEY") {
            self.pinning.api_key = Some(v);
        }
        if let Some(v) = get("PINATA_API_SECRET") {
            self.pinning.api_secret = Some(v);
        }
        if let Some(v) = get("CODEX_BASE_URL") {
            self.codex.base_url = v;
        }
        if let Some(v) = get("CODEX_USERNAME") {
            self.codex.username = Some(v);
        }
        if let Some(v) = get("CODEX_PASSWORD") {
            self.codex.password = Some(v);
        }
        if let Some(v) = get("IPFS_API_URL") {
            self.primary.api_url = v;
        }
        if let Some(v) = get("CANARY_CONTRACT_ADDRESS") {
            self.trace.contract_address = v;
        }
    }

    /// Reject orders that repeat a backend or leave nothing to try.
    pub fn validate(&self) -> Result<()> {
        if self.order.is_empty() {
            return Err(CommitError::Config("backend order is empty".into()));
        }
        for (i, storage_type) in self.order.iter().enumerate() {
            if self.order[..i].contains(storage_type) {
                return Err(CommitError::Config(format!(
                    "backend {storage_type} listed more than once"
                )));
            }
        }
        Ok(())
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_millis(self.health_timeout_ms)
    }
}
