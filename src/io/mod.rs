//! Mask image sources.
//!
//! The engine needs exactly one thing from storage: "fetch an image by
//! locator". [`MaskSource`] abstracts that; [`RoutingMaskSource`] picks the
//! backend from the locator scheme.

mod http;
mod local;
mod s3;
mod source;

pub use http::{HttpMaskSource, DEFAULT_HTTP_TIMEOUT};
pub use local::LocalMaskSource;
pub use s3::{create_s3_client, S3MaskSource};
pub use source::{LocatorKind, MaskSource, RoutingMaskSource};
