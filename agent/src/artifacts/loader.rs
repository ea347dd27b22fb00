//! Package loaders: local repository directory and HTTP repository

use std::path::PathBuf;

use async_trait::async_trait;
use mission_models::{DeploymentUnit, Plan};
use reqwest::{Client, StatusCode};
use tracing::{debug, error, info};
use url::Url;

use crate::errors::AgentError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;
use crate::mission::traits::ApplianceLoader;
use crate::utils::{digest_matches, sha256_hash};

/// `<name>/<build>/<name>.zip`
fn package_path(unit: &DeploymentUnit) -> PathBuf {
    PathBuf::from(&unit.name)
        .join(&unit.build)
        .join(format!("{}.zip", unit.name))
}

/// Reject a package whose digest differs from the unit's checksum
fn verify_checksum(unit: &DeploymentUnit, content: &[u8]) -> Result<(), AgentError> {
    if unit.checksum.trim().is_empty() {
        return Ok(());
    }
    let actual = sha256_hash(content);
    if !digest_matches(&unit.checksum, &actual) {
        error!("Checksum mismatch for {}", unit.artifact_key());
        return Err(AgentError::ChecksumMismatch {
            unit: unit.artifact_key(),
            expected: unit.checksum.trim().to_string(),
            actual,
        });
    }
    Ok(())
}

/// Verify, cache and attach a fetched package to its unit
async fn accept_package(
    cache: &Dir,
    unit: &mut DeploymentUnit,
    content: Vec<u8>,
) -> Result<(), AgentError> {
    verify_checksum(unit, &content)?;

    let cached = File::new(cache.path().join(package_path(unit)));
    cached.write_bytes(&content).await?;

    debug!(
        "Loaded {} ({} bytes) into {}",
        unit.artifact_key(),
        content.len(),
        cached.path().display()
    );
    unit.repository_location = cached.path().to_string_lossy().to_string();
    unit.repository_content = content;
    unit.has_loaded = true;
    Ok(())
}

/// Loads packages from a repository directory on disk
#[derive(Debug, Clone)]
pub struct DirectoryApplianceLoader {
    repository_root: PathBuf,
    cache: Dir,
}

impl DirectoryApplianceLoader {
    pub fn new(repository_root: impl Into<PathBuf>, cache: Dir) -> Self {
        Self {
            repository_root: repository_root.into(),
            cache,
        }
    }
}

#[async_trait]
impl ApplianceLoader for DirectoryApplianceLoader {
    async fn clean(&self, plan: &Plan) -> Result<(), AgentError> {
        info!("Cleaning repository cache for plan {}", plan.name);
        self.cache.delete().await
    }

    async fn load(&self, _plan: &Plan, unit: &mut DeploymentUnit) -> Result<(), AgentError> {
        if !unit.deploy {
            return Ok(());
        }
        unit.clear_observed();

        let package = File::new(self.repository_root.join(package_path(unit)));
        if !package.exists().await {
            return Err(AgentError::NotFound(format!(
                "package {} at {}",
                unit.artifact_key(),
                package.path().display()
            )));
        }

        let content = package.read_bytes().await?;
        accept_package(&self.cache, unit, content).await
    }
}

/// Loads packages from an HTTP repository
#[derive(Debug, Clone)]
pub struct HttpApplianceLoader {
    client: Client,
    base_url: Url,
    cache: Dir,
}

impl HttpApplianceLoader {
    pub fn new(base_url: &str, cache: Dir) -> Result<Self, AgentError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()?;

        // A trailing slash keeps the last path segment when joining
        let normalized = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalized)
            .map_err(|e| AgentError::ConfigError(format!("invalid repository url {}: {}", base_url, e)))?;

        Ok(Self {
            client,
            base_url,
            cache,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn package_url(&self, unit: &DeploymentUnit) -> Result<Url, AgentError> {
        let relative = format!("{}/{}/{}.zip", unit.name, unit.build, unit.name);
        self.base_url
            .join(&relative)
            .map_err(|e| AgentError::LoadError(format!("invalid package url {}: {}", relative, e)))
    }
}

#[async_trait]
impl ApplianceLoader for HttpApplianceLoader {
    async fn clean(&self, plan: &Plan) -> Result<(), AgentError> {
        info!("Cleaning repository cache for plan {}", plan.name);
        self.cache.delete().await
    }

    async fn load(&self, _plan: &Plan, unit: &mut DeploymentUnit) -> Result<(), AgentError> {
        if !unit.deploy {
            return Ok(());
        }
        unit.clear_observed();

        let url = self.package_url(unit)?;
        debug!("GET {}", url);

        let response = self.client.get(url.clone()).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => {
                return Err(AgentError::NotFound(format!(
                    "package {} at {}",
                    unit.artifact_key(),
                    url
                )))
            }
            status if !status.is_success() => {
                return Err(AgentError::LoadError(format!(
                    "{} responded {} for {}",
                    url,
                    status,
                    unit.artifact_key()
                )))
            }
            _ => {}
        }

        let content = response.bytes().await?.to_vec();
        accept_package(&self.cache, unit, content).await
    }
}
