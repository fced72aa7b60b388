//! Object store configuration for S3, a local S3 emulator, and local filesystem access.

use crate::config::StorageConfig;
use anyhow::{Context, Result};
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::{ClientOptions, ObjectStore, RetryConfig};
use std::sync::Arc;
use std::time::Duration;

/// Access key accepted by the local S3 emulator.
const OFFLINE_CREDENTIAL: &str = "S3RVER";

/// Create client options for stem-sized transfers.
///
/// Stems are tens of megabytes each, so the request timeout is generous
/// compared to the connect timeout.
fn create_client_options() -> ClientOptions {
    ClientOptions::new()
        .with_connect_timeout(Duration::from_secs(5))
        .with_timeout(Duration::from_secs(300))
        .with_pool_idle_timeout(Duration::from_secs(90))
}

/// Create retry configuration for transient HTTP failures.
///
/// This is transport-level only; the pipeline itself never retries a stage.
fn create_retry_config() -> RetryConfig {
    RetryConfig {
        max_retries: 3,
        backoff: object_store::BackoffConfig {
            init_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            base: 2.0,
        },
        retry_timeout: Duration::from_secs(120),
    }
}

/// Create an authenticated S3 client.
///
/// Credentials and region are loaded from (in order):
/// - Environment variables (AWS_ACCESS_KEY_ID, AWS_SECRET_ACCESS_KEY, AWS_REGION)
/// - The task role of the container (ECS/Fargate credential endpoint)
/// - EC2 instance profile (IMDS)
fn create_authenticated_store(bucket: &str, config: &StorageConfig) -> Result<Arc<dyn ObjectStore>> {
    tracing::info!("Creating authenticated S3 client for bucket: {}", bucket);

    let mut builder = AmazonS3Builder::from_env()
        .with_bucket_name(bucket)
        .with_client_options(create_client_options())
        .with_retry(create_retry_config());

    if std::env::var_os("AWS_REGION").is_none() && std::env::var_os("AWS_DEFAULT_REGION").is_none() {
        builder = builder.with_region(&config.region);
    }

    Ok(Arc::new(builder.build()?))
}

/// Create a client for a local S3 emulator.
///
/// Uses path-style requests, plain HTTP and the emulator's fixed credentials.
fn create_offline_store(bucket: &str, config: &StorageConfig) -> Result<Arc<dyn ObjectStore>> {
    tracing::info!(
        "Creating offline S3 client for bucket {} at {}",
        bucket,
        config.offline_endpoint
    );

    let builder = AmazonS3Builder::new()
        .with_bucket_name(bucket)
        .with_region(&config.region)
        .with_endpoint(&config.offline_endpoint)
        .with_allow_http(true)
        .with_access_key_id(OFFLINE_CREDENTIAL)
        .with_secret_access_key(OFFLINE_CREDENTIAL)
        .with_virtual_hosted_style_request(false)
        .with_client_options(create_client_options().with_allow_http(true))
        .with_retry(create_retry_config());

    Ok(Arc::new(builder.build()?))
}

/// Create the durable store described by `config`.
///
/// Uses LocalFileSystem if local_path is set, otherwise S3 (offline or authenticated).
pub fn create_store(config: &StorageConfig) -> Result<Arc<dyn ObjectStore>> {
    match (&config.local_path, &config.bucket) {
        (Some(local_path), _) => {
            let path = std::path::Path::new(local_path);
            if !path.exists() {
                std::fs::create_dir_all(path)
                    .with_context(|| format!("Failed to create store directory {}", path.display()))?;
            }
            tracing::info!("Creating LocalFileSystem store at: {}", path.display());
            Ok(Arc::new(LocalFileSystem::new_with_prefix(path)?))
        }
        (_, Some(bucket)) if config.offline => create_offline_store(bucket, config),
        (_, Some(bucket)) => create_authenticated_store(bucket, config),
        _ => anyhow::bail!("Invalid config: no storage destination"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_create_authenticated_store() {
        let config = StorageConfig {
            bucket: Some("test-bucket".to_string()),
            ..Default::default()
        };
        assert!(create_store(&config).is_ok());
    }

    #[test]
    fn test_create_offline_store() {
        let config = StorageConfig {
            bucket: Some("dev-emptystream-mainBucket".to_string()),
            offline: true,
            ..Default::default()
        };
        assert!(create_store(&config).is_ok());
    }

    #[test]
    fn test_create_local_store_creates_directory() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("store");
        let config = StorageConfig {
            local_path: Some(root.to_string_lossy().into_owned()),
            ..Default::default()
        };

        assert!(create_store(&config).is_ok());
        assert!(root.is_dir());
    }

    #[test]
    fn test_create_store_without_destination() {
        assert!(create_store(&StorageConfig::default()).is_err());
    }
}
