// Copyright 2024 Sebastian Dobe <sebastiandobe@mailbox.org>

#![doc = include_str!("../README.md")]
#![forbid(unsafe_code)]

use base64::engine::general_purpose;
use base64::Engine;
use std::env;

/// URI dispatch and the `open()` entry point
pub use crate::dispatch::{open, Direction, Mode, OpenInput, OpenOptions, Stream};
/// The `AsyncRead + AsyncSeek` bound `Stream::into_seekable_read` hands back
pub use crate::backends::SeekableAsyncRead;
/// The URI tagged union every backend is selected from
pub use crate::uri::Location;
/// The S3 client, your entrypoint if you only ever talk to S3 directly
pub use crate::backends::s3::{S3Client, S3ClientOptions};
/// Credentials shared across backends
pub use crate::credentials::{AccessKeyId, AccessKeySecret, Credentials};
/// The parallel bucket iterator entry point
pub use crate::bucket_iter::{iter_bucket, BucketIter, BucketIterOptions};
/// The crate-wide error type, wrapping errors from every layer and backend
pub use crate::error::S3Error;
/// Response types surfaced by the S3 backend
pub use crate::backends::s3::types::{HeadObjectResult, Object, PutStreamResponse};
pub use reqwest::Response as S3Response;
pub use reqwest::StatusCode as S3StatusCode;

mod backends;
mod byte_buffer;
mod compression;
mod credentials;
mod dispatch;
mod error;
mod text;
mod uri;

pub mod bucket_iter;
pub mod prelude;
pub mod transport_params;

/// S3 Region Wrapper
#[derive(Debug, Clone)]
pub struct Region(pub String);

impl Region {
    pub fn new<S>(region: S) -> Self
    where
        S: Into<String>,
    {
       Self(region.into())
    }

    pub fn try_from_env() -> Result<Self, S3Error> {
        Ok(Self(env::var("S3_REGION")?))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

fn md5_url_encode(s: &[u8]) -> String {
    general_purpose::STANDARD.encode(md5::compute(s).as_ref())
}
