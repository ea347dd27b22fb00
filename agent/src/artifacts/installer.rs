//! Zip package installation

use std::fs;
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use mission_models::{DeploymentUnit, Plan};
use tracing::{debug, info};

use crate::errors::AgentError;
use crate::filesys::dir::Dir;
use crate::mission::traits::ApplianceInstaller;

/// Unpacks loaded packages into `<install_root>/<name>/<alias>`
#[derive(Debug, Clone)]
pub struct ZipApplianceInstaller {
    install_root: Dir,
}

impl ZipApplianceInstaller {
    pub fn new(install_root: Dir) -> Self {
        Self { install_root }
    }

    pub fn install_dir(&self, unit: &DeploymentUnit) -> PathBuf {
        self.install_root
            .path()
            .join(&unit.name)
            .join(unit.display_name())
    }
}

#[async_trait]
impl ApplianceInstaller for ZipApplianceInstaller {
    async fn clean(&self, plan: &Plan) -> Result<(), AgentError> {
        info!("Cleaning installation for plan {}", plan.name);
        self.install_root.delete().await
    }

    async fn install(&self, _plan: &Plan, unit: &mut DeploymentUnit) -> Result<(), AgentError> {
        if !unit.deploy || !unit.has_loaded {
            return Ok(());
        }
        unit.has_installed = false;

        let target = self.install_dir(unit);
        let content = std::mem::take(&mut unit.repository_content);
        let dest = target.clone();
        let entries = tokio::task::spawn_blocking(move || extract_package(&content, &dest))
            .await??;

        debug!(
            "Installed {} ({} entries) into {}",
            unit.artifact_key(),
            entries,
            target.display()
        );
        unit.installation_location = target.to_string_lossy().to_string();
        unit.has_installed = true;
        Ok(())
    }
}

/// Replace `dest` with the package contents. Returns the number of entries.
fn extract_package(content: &[u8], dest: &Path) -> Result<usize, AgentError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(content))
        .map_err(|e| AgentError::InstallError(format!("invalid package: {}", e)))?;

    if dest.exists() {
        fs::remove_dir_all(dest)?;
    }
    fs::create_dir_all(dest)?;

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let Some(relative) = entry.enclosed_name() else {
            return Err(AgentError::InstallError(format!(
                "package contains unsafe path: {:?}",
                entry.name()
            )));
        };
        let out_path = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = fs::File::create(&out_path)?;
        io::copy(&mut entry, &mut out)?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&out_path, fs::Permissions::from_mode(mode & 0o7777))?;
        }
    }

    Ok(archive.len())
}
