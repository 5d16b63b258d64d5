use async_trait::async_trait;
use aws_sdk_s3::Client;
use bytes::Bytes;
use url::Url;

use super::MaskSource;
use crate::error::IoError;

/// S3-backed mask source.
///
/// Accepts `s3://bucket/key` locators. A bucket-less `s3:///key` or a plain
/// key falls back to the default bucket, if one is configured.
#[derive(Clone)]
pub struct S3MaskSource {
    client: Client,
    default_bucket: Option<String>,
}

impl S3MaskSource {
    /// Create a new source.
    ///
    /// # Arguments
    /// * `client` - AWS S3 client to use for requests
    /// * `default_bucket` - Bucket used when a locator names none
    pub fn new(client: Client, default_bucket: Option<String>) -> Self {
        Self {
            client,
            default_bucket,
        }
    }

    /// Get the default bucket name.
    pub fn default_bucket(&self) -> Option<&str> {
        self.default_bucket.as_deref()
    }

    /// Split a locator into `(bucket, key)`.
    pub fn split_locator(&self, locator: &str) -> Result<(String, String), IoError> {
        let invalid = |reason: &str| IoError::InvalidLocator {
            locator: locator.to_string(),
            reason: reason.to_string(),
        };

        let (bucket, key) = if locator.starts_with("s3://") {
            let url = Url::parse(locator).map_err(|e| invalid(&e.to_string()))?;
            let bucket = url.host_str().map(str::to_string);
            // Url keeps the path percent-encoded; S3 keys are raw
            let key = urlencoding::decode(url.path().trim_start_matches('/'))
                .map_err(|e| invalid(&e.to_string()))?;
            (bucket, key.into_owned())
        } else {
            (None, locator.trim_start_matches('/').to_string())
        };

        let bucket = bucket
            .filter(|b| !b.is_empty())
            .or_else(|| self.default_bucket.clone())
            .ok_or_else(|| invalid("no bucket in locator and no default bucket configured"))?;

        if key.is_empty() {
            return Err(invalid("empty object key"));
        }

        Ok((bucket, key))
    }
}

#[async_trait]
impl MaskSource for S3MaskSource {
    async fn fetch(&self, locator: &str) -> Result<Bytes, IoError> {
        let (bucket, key) = self.split_locator(locator)?;

        let resp = self
            .client
            .get_object()
            .bucket(&bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| {
                let is_not_found = e
                    .as_service_error()
                    .map(|se| se.is_no_such_key())
                    .unwrap_or(false);

                let status_is_404 = e
                    .raw_response()
                    .map(|r| r.status().as_u16() == 404)
                    .unwrap_or(false);

                if is_not_found || status_is_404 {
                    return IoError::NotFound(format!("s3://{}/{}", bucket, key));
                }

                IoError::S3(e.to_string())
            })?;

        let data = resp
            .body
            .collect()
            .await
            .map_err(|e| IoError::Connection(e.to_string()))?
            .into_bytes();

        Ok(data)
    }

    fn name(&self) -> &'static str {
        "s3"
    }
}

/// Create an S3 client with optional custom endpoint and region.
///
/// Use a custom endpoint for S3-compatible services like MinIO:
/// ```ignore
/// let client = create_s3_client(Some("http://localhost:9000"), "us-east-1").await;
/// ```
pub async fn create_s3_client(endpoint_url: Option<&str>, region: &str) -> Client {
    let region = aws_config::Region::new(region.to_string());
    let mut config_loader =
        aws_config::defaults(aws_config::BehaviorVersion::latest()).region(region);

    if let Some(endpoint) = endpoint_url {
        config_loader = config_loader.endpoint_url(endpoint);
    }

    let sdk_config = config_loader.load().await;

    // S3-compatible services generally need path-style addressing
    let s3_config = if endpoint_url.is_some() {
        aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .build()
    } else {
        aws_sdk_s3::config::Builder::from(&sdk_config).build()
    };

    Client::from_conf(s3_config)
}
