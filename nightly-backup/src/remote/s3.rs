//! S3 store: containers are buckets.
//!
//! Supports AWS S3 and S3-compatible storage (MinIO, Wasabi, Ceph RGW).
//! "No such bucket" answers are mapped to "absent"; every other failure is
//! returned as [`BackupError::Remote`].

use super::RemoteStore;
use crate::config::RemoteConfig;
use crate::utils::{BackupError, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use aws_sdk_s3::Client;
use std::path::Path;
use tracing::{debug, info};

pub struct S3Store {
    client: Client,
    region: String,
}

impl S3Store {
    pub async fn new(config: &RemoteConfig) -> Result<Self> {
        let credentials = match (&config.access_key_id, &config.secret_access_key) {
            (Some(id), Some(secret)) => Some(Credentials::new(
                id.clone(),
                secret.clone(),
                None,
                None,
                "nightly-backup-config",
            )),
            (None, None) => None,
            _ => {
                return Err(BackupError::Config(
                    "remote.access_key_id and remote.secret_access_key must be set together"
                        .to_string(),
                ))
            }
        };

        let region = Region::new(config.region.clone());
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(region)
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        match credentials {
            Some(credentials) => builder = builder.credentials_provider(credentials),
            None => debug!("Using the default AWS credential chain"),
        }

        if let Some(endpoint) = &config.endpoint {
            debug!("Using custom S3 endpoint: {}", endpoint);
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
            region: config.region.clone(),
        })
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_not_found() {
                    Ok(false)
                } else {
                    Err(remote_error(format!("checking bucket {}", bucket), service_error))
                }
            }
        }
    }
}

fn remote_error(action: String, err: impl std::error::Error) -> BackupError {
    BackupError::Remote(format!("{}: {}", action, DisplayErrorContext(&err)))
}

#[async_trait]
impl RemoteStore for S3Store {
    async fn ensure_container(&self, container: &str) -> Result<()> {
        if self.bucket_exists(container).await? {
            return Ok(());
        }

        info!(container, "Creating bucket");
        let mut request = self.client.create_bucket().bucket(container);
        if self.region != "us-east-1" {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }

        match request.send().await {
            Ok(_) => Ok(()),
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_bucket_already_owned_by_you() {
                    Ok(())
                } else {
                    Err(remote_error(format!("creating bucket {}", container), service_error))
                }
            }
        }
    }

    async fn list_containers(&self) -> Result<Vec<String>> {
        let resp = self
            .client
            .list_buckets()
            .send()
            .await
            .map_err(|e| remote_error("listing buckets".to_string(), e))?;

        Ok(resp
            .buckets()
            .iter()
            .filter_map(|b| b.name().map(str::to_string))
            .collect())
    }

    async fn list_objects(&self, container: &str) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let resp = match self
                .client
                .list_objects_v2()
                .bucket(container)
                .set_continuation_token(continuation.take())
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    let service_error = e.into_service_error();
                    if service_error.is_no_such_bucket() {
                        return Ok(Vec::new());
                    }
                    return Err(remote_error(format!("listing {}", container), service_error));
                }
            };

            names.extend(
                resp.contents()
                    .iter()
                    .filter_map(|o| o.key().map(str::to_string)),
            );

            match resp.next_continuation_token() {
                Some(token) if resp.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        Ok(names)
    }

    async fn object_exists(&self, container: &str, name: &str) -> Result<bool> {
        match self
            .client
            .head_object()
            .bucket(container)
            .key(name)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_not_found() {
                    Ok(false)
                } else {
                    Err(remote_error(format!("checking {}/{}", container, name), service_error))
                }
            }
        }
    }

    async fn upload(&self, container: &str, name: &str, path: &Path) -> Result<u64> {
        let size = tokio::fs::metadata(path).await?.len();
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| remote_error(format!("reading {}", path.display()), e))?;

        self.client
            .put_object()
            .bucket(container)
            .key(name)
            .content_length(size as i64)
            .body(body)
            .send()
            .await
            .map_err(|e| remote_error(format!("uploading {}/{}", container, name), e))?;

        Ok(size)
    }

    async fn delete_object(&self, container: &str, name: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(container)
            .key(name)
            .send()
            .await
            .map_err(|e| remote_error(format!("deleting {}/{}", container, name), e))?;
        Ok(())
    }

    async fn delete_container(&self, container: &str) -> Result<()> {
        self.client
            .delete_bucket()
            .bucket(container)
            .send()
            .await
            .map_err(|e| remote_error(format!("deleting bucket {}", container), e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_half_configured_credentials_are_rejected() {
        let config = RemoteConfig {
            enabled: true,
            access_key_id: Some("AKIDEXAMPLE".to_string()),
            ..RemoteConfig::default()
        };
        assert!(matches!(S3Store::new(&config).await, Err(BackupError::Config(_))));
    }
}
