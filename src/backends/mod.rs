//! Backend capability traits and the per-scheme implementations that plug
//! into the dispatcher (`crate::dispatch`).
//!
//! Every backend owns its own connection/client objects (the S3 module's
//! `OnceLock<reqwest::Client>` is the pattern; HTTP, WebHDFS and GCS each
//! keep their own static client the same way). There is no cross-backend
//! connection pool.

use crate::error::S3Error;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncSeek, AsyncWrite};

pub mod gcs;
pub mod hdfs;
pub mod http;
pub mod local;
pub mod s3;
pub mod ssh;
pub mod webhdfs;

/// A write stream whose close is an explicit, awaitable step rather than
/// just a `Drop`. Backends that must perform a final network round-trip to
/// finish a write (S3's `CompleteMultipartUpload`, GCS's finalizing chunk,
/// a compression encoder's trailer) implement `close` to do that; `Drop`
/// impls fall back to best-effort cleanup (S3's abort-on-drop, see
/// `backends::s3::writer`).
#[async_trait::async_trait]
pub trait ClosableWrite: AsyncWrite + Send + Unpin {
    /// Flushes and finalizes the stream. Idempotent: a second call is a
    /// no-op and returns `Ok(())`.
    async fn close(&mut self) -> Result<(), S3Error>;
}

/// Marker trait for backend read streams that support both `AsyncRead` and
/// `AsyncSeek`. Streams wrapped in a compression codec generally lose this
/// (decoders can't seek), which is why `InputStream` below keeps the two
/// cases distinct rather than forcing every reader through a seek API.
pub trait SeekableAsyncRead: AsyncRead + AsyncSeek + Send + Unpin {}

impl<T: AsyncRead + AsyncSeek + Send + Unpin> SeekableAsyncRead for T {}

/// The stream a backend hands to the dispatcher on a read-open.
///
/// Local files and the S3/GCS range readers are `Seekable`; HTTP, SSH and
/// WebHDFS reads, and anything wrapped in a compression codec, are
/// `Forward`-only.
pub enum InputStream {
    Seekable(Box<dyn SeekableAsyncRead>),
    Forward(Box<dyn AsyncRead + Send + Unpin>),
}

impl InputStream {
    /// Drops seekability, useful once a codec has wrapped the stream.
    pub fn into_forward(self) -> Box<dyn AsyncRead + Send + Unpin> {
        match self {
            InputStream::Seekable(s) => Box::new(ForwardOnly(s)),
            InputStream::Forward(s) => s,
        }
    }
}

impl AsyncRead for InputStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            InputStream::Seekable(s) => Pin::new(s).poll_read(cx, buf),
            InputStream::Forward(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

struct ForwardOnly(Box<dyn SeekableAsyncRead>);

impl AsyncRead for ForwardOnly {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().0).poll_read(cx, buf)
    }
}

/// The stream a backend hands to the dispatcher on a write-open.
pub type OutputStream = Box<dyn ClosableWrite>;

#[async_trait::async_trait]
impl ClosableWrite for Box<dyn ClosableWrite> {
    async fn close(&mut self) -> Result<(), S3Error> {
        (**self).close().await
    }
}
