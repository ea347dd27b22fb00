//! Plan documents read from a JSON file

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::errors::AgentError;
use crate::filesys::file::File;
use crate::mission::traits::PlanSource;
use crate::utils::sha256_hash;

/// Watches a plan file. A plan counts as updated when the file's digest
/// differs from the last consumed one.
pub struct FilePlanSource {
    file: File,
    polling_interval: Duration,
    consumed: Mutex<Option<String>>,
    forced: AtomicBool,
}

impl FilePlanSource {
    pub fn new(file: File, polling_interval: Duration) -> Self {
        Self {
            file,
            polling_interval,
            consumed: Mutex::new(None),
            forced: AtomicBool::new(false),
        }
    }

    pub fn file(&self) -> &File {
        &self.file
    }

    /// Digest of the last consumed plan
    pub fn consumed_digest(&self) -> Option<String> {
        self.consumed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl PlanSource for FilePlanSource {
    async fn has_updated_plan(&self) -> Result<bool, AgentError> {
        if self.forced.load(Ordering::SeqCst) {
            return Ok(true);
        }
        if !self.file.exists().await {
            return Ok(false);
        }

        let digest = sha256_hash(&self.file.read_bytes().await?);
        let updated = self.consumed_digest().as_deref() != Some(digest.as_str());
        if updated {
            debug!("Plan file {} changed", self.file.path().display());
        }
        Ok(updated)
    }

    async fn get_source(&self) -> Result<Vec<u8>, AgentError> {
        if !self.file.exists().await {
            return Err(AgentError::NotFound(format!(
                "plan file {}",
                self.file.path().display()
            )));
        }
        self.file.read_bytes().await
    }

    async fn mark_consumed(&self, source: &[u8]) -> Result<(), AgentError> {
        *self.consumed.lock().unwrap_or_else(|e| e.into_inner()) = Some(sha256_hash(source));
        self.forced.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn reload(&self) -> Result<(), AgentError> {
        debug!("Reload requested for {}", self.file.path().display());
        self.forced.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn polling_interval(&self) -> Duration {
        self.polling_interval
    }
}
