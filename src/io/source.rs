use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use url::Url;

use super::{HttpMaskSource, LocalMaskSource, S3MaskSource};
use crate::error::IoError;

/// Trait for fetching encoded mask images by locator.
///
/// A locator is whatever the study-record provider hands out: a local path,
/// an `http(s)://` URL or an `s3://bucket/key` URI. Locators are used
/// verbatim, so cache-busting query tokens supplied by the caller reach the
/// backing store untouched.
#[async_trait]
pub trait MaskSource: Send + Sync {
    /// Fetch the full encoded image.
    async fn fetch(&self, locator: &str) -> Result<Bytes, IoError>;

    /// Short backend name for logging.
    fn name(&self) -> &'static str;
}

#[async_trait]
impl<T: MaskSource + ?Sized> MaskSource for Arc<T> {
    async fn fetch(&self, locator: &str) -> Result<Bytes, IoError> {
        (**self).fetch(locator).await
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

// =============================================================================
// Locator Routing
// =============================================================================

/// Backend a locator resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocatorKind {
    Local,
    Http,
    S3,
}

impl LocatorKind {
    /// Classify a locator by scheme.
    ///
    /// Anything that is not an absolute URL, `file://` URLs, and single-letter
    /// schemes (Windows drive letters) are local paths.
    pub fn of(locator: &str) -> Result<Self, IoError> {
        match Url::parse(locator) {
            Ok(url) => match url.scheme() {
                "http" | "https" => Ok(LocatorKind::Http),
                "s3" => Ok(LocatorKind::S3),
                "file" => Ok(LocatorKind::Local),
                scheme if scheme.len() == 1 => Ok(LocatorKind::Local),
                scheme => Err(IoError::InvalidLocator {
                    locator: locator.to_string(),
                    reason: format!("unsupported scheme '{}'", scheme),
                }),
            },
            Err(url::ParseError::RelativeUrlWithoutBase) => Ok(LocatorKind::Local),
            Err(e) => Err(IoError::InvalidLocator {
                locator: locator.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

/// Source that dispatches each locator to the backend matching its scheme.
#[derive(Clone, Default)]
pub struct RoutingMaskSource {
    local: Option<LocalMaskSource>,
    http: Option<HttpMaskSource>,
    s3: Option<S3MaskSource>,
}

impl RoutingMaskSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_local(mut self, source: LocalMaskSource) -> Self {
        self.local = Some(source);
        self
    }

    pub fn with_http(mut self, source: HttpMaskSource) -> Self {
        self.http = Some(source);
        self
    }

    pub fn with_s3(mut self, source: S3MaskSource) -> Self {
        self.s3 = Some(source);
        self
    }

    fn unconfigured(locator: &str, kind: LocatorKind) -> IoError {
        IoError::InvalidLocator {
            locator: locator.to_string(),
            reason: format!("no {:?} source is configured", kind),
        }
    }
}

#[async_trait]
impl MaskSource for RoutingMaskSource {
    async fn fetch(&self, locator: &str) -> Result<Bytes, IoError> {
        let kind = LocatorKind::of(locator)?;
        match kind {
            LocatorKind::Local => match &self.local {
                Some(src) => src.fetch(locator).await,
                None => Err(Self::unconfigured(locator, kind)),
            },
            LocatorKind::Http => match &self.http {
                Some(src) => src.fetch(locator).await,
                None => Err(Self::unconfigured(locator, kind)),
            },
            LocatorKind::S3 => match &self.s3 {
                Some(src) => src.fetch(locator).await,
                None => Err(Self::unconfigured(locator, kind)),
            },
        }
    }

    fn name(&self) -> &'static str {
        "routing"
    }
}
