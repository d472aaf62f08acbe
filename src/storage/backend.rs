use crate::config::{ExecutionMode, Settings};
use crate::error::{IngestError, Result};
use crate::storage::gateway::{StorageGateway, WriteMode};
use object_store::aws::{AmazonS3Builder, S3ConditionalPut};
use object_store::local::LocalFileSystem;
use object_store::ObjectStore;
use std::sync::Arc;
use tracing::info;

/// Build the object store selected by `EXECUTION_MODE`, with the write mode it supports
pub fn build_object_store(settings: &Settings) -> Result<(Arc<dyn ObjectStore>, WriteMode)> {
    match settings.execution_mode {
        ExecutionMode::Aws => {
            let bucket = settings.s3_bucket.as_deref().ok_or_else(|| {
                IngestError::Config("S3_BUCKET is required when EXECUTION_MODE=aws".to_string())
            })?;

            let mut builder = AmazonS3Builder::from_env()
                .with_bucket_name(bucket)
                .with_conditional_put(S3ConditionalPut::ETagMatch);
            if let Some(proxy) = &settings.proxy_url {
                builder = builder.with_proxy_url(proxy);
            }

            info!(bucket = bucket, prefix = settings.prefix(), "Using S3 storage");
            Ok((Arc::new(builder.build()?), WriteMode::Conditional))
        }
        ExecutionMode::Local => {
            std::fs::create_dir_all(&settings.local_output_dir)?;
            let store = LocalFileSystem::new_with_prefix(&settings.local_output_dir)?;

            info!(
                dir = %settings.local_output_dir.display(),
                prefix = settings.prefix(),
                "Using local storage"
            );
            Ok((Arc::new(store), WriteMode::Overwrite))
        }
    }
}

/// Gateway for the configured backend and data mode
pub fn gateway_from_settings(settings: &Settings) -> Result<StorageGateway> {
    let (store, write_mode) = build_object_store(settings)?;
    Ok(
        StorageGateway::new(store, settings.prefix(), settings.data_mode)
            .with_write_mode(write_mode),
    )
}
