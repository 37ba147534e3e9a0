//! Data-lake upload seam
//!
//! The engine only calls [`DatalakeUploader::upload`] after bundling; the
//! real transport lives outside this service. [`LoggingUploader`] is the
//! stand-in wired up by default.

use async_trait::async_trait;
use std::path::Path;
use tracing::info;

/// Downstream upload hook invoked once per finished bundle.
#[async_trait]
pub trait DatalakeUploader: Send + Sync {
    async fn upload(
        &self,
        environment: &str,
        data_source: &str,
        file_path: &Path,
    ) -> anyhow::Result<()>;
}

/// Upload stub that only records the handoff.
#[derive(Debug, Default)]
pub struct LoggingUploader;

#[async_trait]
impl DatalakeUploader for LoggingUploader {
    async fn upload(
        &self,
        environment: &str,
        data_source: &str,
        file_path: &Path,
    ) -> anyhow::Result<()> {
        info!(
            data_source = %data_source,
            environment = %environment,
            file = %file_path.display(),
            "Datalake upload requested"
        );
        Ok(())
    }
}
