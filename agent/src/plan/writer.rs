//! Plan persistence

use async_trait::async_trait;

use crate::errors::AgentError;
use crate::filesys::file::File;
use crate::mission::traits::PlanWriter;

/// Writes plan snapshots to a file, replacing it atomically
#[derive(Debug, Clone)]
pub struct FilePlanWriter {
    file: File,
}

impl FilePlanWriter {
    pub fn new(file: File) -> Self {
        Self { file }
    }

    pub fn file(&self) -> &File {
        &self.file
    }
}

#[async_trait]
impl PlanWriter for FilePlanWriter {
    async fn write(&self, contents: &[u8]) -> Result<(), AgentError> {
        self.file.write_atomic(contents).await
    }
}
