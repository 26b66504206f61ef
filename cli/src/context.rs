use anyhow::{Context, Result};
use authz::PolicyStoreDelegate;
use reconciler::RbacConfig;
use std::path::Path;
use std::sync::Arc;

/// Configuration plus an opened policy store.
pub struct CliContext {
    pub config: RbacConfig,
    pub delegate: Arc<PolicyStoreDelegate>,
}

impl CliContext {
    pub async fn open(config_path: &Path) -> Result<Self> {
        let config = RbacConfig::load(config_path)
            .with_context(|| format!("Failed to load configuration {}", config_path.display()))?;
        let delegate = reconciler::open_delegate(&config)
            .await
            .context("Failed to open the policy store")?;
        Ok(Self { config, delegate })
    }
}
