//! Process-wide compressor registry. Maps a filename extension to a codec
//! that can wrap a raw byte stream on the way in (decompress) or out
//! (compress). Mutable at runtime: `register_compressor` is visible to
//! every `open()` call issued afterward.

use crate::backends::ClosableWrite;
use crate::error::S3Error;
use async_compression::tokio::bufread::{BzDecoder, GzDecoder};
use async_compression::tokio::write::{BzEncoder, GzEncoder};
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex, OnceLock};
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

/// A reversible byte-stream transformation bound to a filename extension.
///
/// Implementations must be safe to share across `open()` calls (the
/// registry stores one `Arc<dyn Codec>` per extension and clones it out on
/// every lookup), so they carry no per-stream state themselves.
pub trait Codec: Send + Sync {
    /// Wraps a raw read stream in a decoder.
    fn wrap_read(&self, inner: Box<dyn AsyncRead + Send + Unpin>) -> Box<dyn AsyncRead + Send + Unpin>;

    /// Wraps a raw write stream in an encoder.
    fn wrap_write(&self, inner: Box<dyn ClosableWrite>) -> Box<dyn ClosableWrite>;
}

struct Gzip;

impl Codec for Gzip {
    fn wrap_read(
        &self,
        inner: Box<dyn AsyncRead + Send + Unpin>,
    ) -> Box<dyn AsyncRead + Send + Unpin> {
        Box::new(GzDecoder::new(BufReader::new(inner)))
    }

    fn wrap_write(&self, inner: Box<dyn ClosableWrite>) -> Box<dyn ClosableWrite> {
        Box::new(EncoderWrite::new(GzEncoder::new(inner)))
    }
}

struct Bzip2;

impl Codec for Bzip2 {
    fn wrap_read(
        &self,
        inner: Box<dyn AsyncRead + Send + Unpin>,
    ) -> Box<dyn AsyncRead + Send + Unpin> {
        Box::new(BzDecoder::new(BufReader::new(inner)))
    }

    fn wrap_write(&self, inner: Box<dyn ClosableWrite>) -> Box<dyn ClosableWrite> {
        // bzip2 level 9, matching the library default used on the write path.
        Box::new(EncoderWrite::new(BzEncoder::with_quality(
            inner,
            async_compression::Level::Precise(9),
        )))
    }
}

/// Adapts an `async_compression` encoder (which only knows `AsyncWrite`)
/// into a [`ClosableWrite`] whose `close` finishes the codec trailer by
/// shutting down the encoder, which in turn shuts down the inner stream.
struct EncoderWrite<E> {
    inner: E,
}

impl<E> EncoderWrite<E> {
    fn new(inner: E) -> Self {
        Self { inner }
    }
}

impl<E: AsyncWrite + Unpin> AsyncWrite for EncoderWrite<E> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

#[async_trait::async_trait]
impl<E: AsyncWrite + Send + Unpin> ClosableWrite for EncoderWrite<E> {
    async fn close(&mut self) -> Result<(), S3Error> {
        self.inner.shutdown().await?;
        Ok(())
    }
}

type Registry = HashMap<String, Arc<dyn Codec>>;

fn registry() -> &'static Mutex<Registry> {
    static REGISTRY: OnceLock<Mutex<Registry>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut map: Registry = HashMap::new();
        map.insert(".gz".to_string(), Arc::new(Gzip) as Arc<dyn Codec>);
        map.insert(".bz2".to_string(), Arc::new(Bzip2) as Arc<dyn Codec>);
        Mutex::new(map)
    })
}

/// Registers (or overwrites) the codec used for `ext`, which must start
/// with `.`.
pub fn register_compressor(ext: &str, codec: Arc<dyn Codec>) {
    registry()
        .lock()
        .expect("compressor registry mutex poisoned")
        .insert(ext.to_string(), codec);
}

/// Looks up the codec registered for `ext`, if any.
pub fn lookup(ext: &str) -> Option<Arc<dyn Codec>> {
    registry()
        .lock()
        .expect("compressor registry mutex poisoned")
        .get(ext)
        .cloned()
}

/// If `path` ends with a registered extension, returns the path with that
/// suffix stripped and the matching codec. Otherwise returns `(path,
/// None)` unchanged.
pub fn strip_compression_suffix(path: &str) -> (String, Option<Arc<dyn Codec>>) {
    let map = registry().lock().expect("compressor registry mutex poisoned");
    for (ext, codec) in map.iter() {
        if let Some(stripped) = path.strip_suffix(ext.as_str()) {
            return (stripped.to_string(), Some(codec.clone()));
        }
    }
    (path.to_string(), None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_registered() {
        assert!(lookup(".gz").is_some());
        assert!(lookup(".bz2").is_some());
        assert!(lookup(".xz").is_none());
    }

    #[test]
    fn strip_suffix_only_matches_registered_extensions() {
        let (path, codec) = strip_compression_suffix("archive.tar.gz");
        assert_eq!(path, "archive.tar");
        assert!(codec.is_some());

        let (path, codec) = strip_compression_suffix("plain.txt");
        assert_eq!(path, "plain.txt");
        assert!(codec.is_none());
    }

    struct Noop;
    impl Codec for Noop {
        fn wrap_read(
            &self,
            inner: Box<dyn AsyncRead + Send + Unpin>,
        ) -> Box<dyn AsyncRead + Send + Unpin> {
            inner
        }

        fn wrap_write(&self, inner: Box<dyn ClosableWrite>) -> Box<dyn ClosableWrite> {
            inner
        }
    }

    #[test]
    fn register_compressor_overwrites_and_is_visible_to_subsequent_lookups() {
        register_compressor(".xz", Arc::new(Noop));
        assert!(lookup(".xz").is_some());
    }
}
