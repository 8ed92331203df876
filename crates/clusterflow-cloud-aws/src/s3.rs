//! S3 object store

use crate::error::AwsError;
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use clusterflow_cloud::ObjectStore;

/// S3 answers a failed `If-None-Match` with one of these.
const PRECONDITION_FAILED: u16 = 412;
const CONDITIONAL_CONFLICT: u16 = 409;

pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Client from the default credential chain, with optional profile and
    /// region overrides.
    pub async fn from_env(profile: Option<&str>, region: Option<&str>) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(profile) = profile {
            loader = loader.profile_name(profile);
        }
        if let Some(region) = region {
            loader = loader.region(Region::new(region.to_string()));
        }
        let config = loader.load().await;
        Self::new(Client::new(&config))
    }
}

fn s3_error<E, R>(operation: &'static str, err: SdkError<E, R>) -> clusterflow_cloud::CloudError
where
    E: std::error::Error + 'static,
    R: std::fmt::Debug,
{
    AwsError::S3 {
        operation,
        message: DisplayErrorContext(&err).to_string(),
    }
    .into()
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn bucket_exists(&self, bucket: &str) -> clusterflow_cloud::Result<bool> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(err) => {
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_not_found())
                {
                    Ok(false)
                } else {
                    Err(s3_error("HeadBucket", err))
                }
            }
        }
    }

    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> clusterflow_cloud::Result<Option<Vec<u8>>> {
        let output = match self.client.get_object().bucket(bucket).key(key).send().await {
            Ok(output) => output,
            Err(err) => {
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_no_such_key())
                {
                    return Ok(None);
                }
                return Err(s3_error("GetObject", err));
            }
        };

        let body = output.body.collect().await.map_err(|e| AwsError::S3 {
            operation: "GetObject",
            message: e.to_string(),
        })?;
        Ok(Some(body.into_bytes().to_vec()))
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
    ) -> clusterflow_cloud::Result<()> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| s3_error("PutObject", e))?;
        Ok(())
    }

    async fn put_object_if_absent(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
    ) -> clusterflow_cloud::Result<bool> {
        let result = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .if_none_match("*")
            .body(ByteStream::from(body))
            .send()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(err) => {
                let status = err.raw_response().map(|r| r.status().as_u16());
                if matches!(status, Some(PRECONDITION_FAILED | CONDITIONAL_CONFLICT)) {
                    Ok(false)
                } else {
                    Err(s3_error("PutObject", err))
                }
            }
        }
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> clusterflow_cloud::Result<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| s3_error("DeleteObject", e))?;
        Ok(())
    }
}
