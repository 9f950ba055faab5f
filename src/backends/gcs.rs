//! Google Cloud Storage backend: ranged-GET read, resumable
//! upload write.
//!
//! Follows GCS's resumable-session handshake: start a session, then PUT
//! chunks aligned to a 256 KiB boundary (GCS's requirement on every
//! non-final chunk of a resumable upload), finalizing with a
//! `Content-Range: bytes */total` PUT.
//!
//! The actual session/PUT bookkeeping runs on a dedicated spawned task,
//! the same "own the async state in a task, talk to it over a channel"
//! shape `S3Writer` (`backends::s3::writer`) and `SshWriter`
//! (`backends::ssh`) use, since `poll_write` can't hold `&mut self`
//! across an `.await`. `poll_write` sends the caller's bytes to that
//! task and the task flushes every `CHUNK_ALIGNMENT`-aligned chunk as
//! soon as the buffer crosses the boundary, rather than waiting for
//! `close`.

use crate::byte_buffer::ByteBuffer;
use crate::credentials::BearerToken;
use crate::error::S3Error;
use bytes::Bytes;
use futures_util::StreamExt;
use reqwest::StatusCode;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::OnceLock;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::oneshot;
use tokio_util::io::StreamReader;

const CHUNK_ALIGNMENT: usize = 256 * 1024;

fn client() -> &'static reqwest::Client {
    static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();
    CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .use_rustls_tls()
            .build()
            .expect("building reqwest client for the gcs backend")
    })
}

/// Forward-only ranged read over the media-download endpoint.
pub struct GcsReader {
    inner: StreamReader<Pin<Box<dyn futures_util::Stream<Item = io::Result<Bytes>> + Send>>, Bytes>,
}

impl GcsReader {
    pub async fn open(bucket: String, blob: String, token: &BearerToken) -> Result<Self, S3Error> {
        let object = percent_encoding::utf8_percent_encode(
            &blob,
            percent_encoding::NON_ALPHANUMERIC,
        )
        .to_string();
        let url = format!(
            "https://storage.googleapis.com/storage/v1/b/{bucket}/o/{object}?alt=media"
        );
        let resp = client()
            .get(&url)
            .bearer_auth(&token.0)
            .send()
            .await
            .map_err(|e| S3Error::from(e).into_transport("gcs"))?;
        if !resp.status().is_success() {
            return Err(S3Error::HttpFailWithBody(
                resp.status().as_u16(),
                resp.text().await.unwrap_or_default(),
            )
            .into_transport("gcs"));
        }
        let stream = resp
            .bytes_stream()
            .map(|r| r.map_err(|e| io::Error::new(io::ErrorKind::Other, e)));
        Ok(Self {
            inner: StreamReader::new(Box::pin(stream)),
        })
    }
}

impl AsyncRead for GcsReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_read(cx, buf)
    }
}

enum Cmd {
    Write(Vec<u8>, oneshot::Sender<Result<(), S3Error>>),
    Finish(oneshot::Sender<Result<(), S3Error>>),
}

/// Owns the resumable session and buffer; lives entirely inside the
/// spawned worker task.
struct Inner {
    bucket: String,
    blob: String,
    token: BearerToken,
    session_uri: Option<String>,
    buffer: ByteBuffer,
    bytes_sent: u64,
}

impl Inner {
    async fn ensure_session(&mut self) -> Result<(), S3Error> {
        if self.session_uri.is_some() {
            return Ok(());
        }
        let url = format!(
            "https://storage.googleapis.com/upload/storage/v1/b/{}/o?uploadType=resumable",
            self.bucket
        );
        let resp = client()
            .post(&url)
            .bearer_auth(&self.token.0)
            .json(&serde_json::json!({ "name": self.blob }))
            .send()
            .await
            .map_err(|e| S3Error::from(e).into_transport("gcs"))?;
        if !resp.status().is_success() {
            return Err(S3Error::HttpFailWithBody(
                resp.status().as_u16(),
                resp.text().await.unwrap_or_default(),
            )
            .into_transport("gcs"));
        }
        let session_uri = resp
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                S3Error::UnexpectedResponse("gcs resumable session missing Location header")
                    .into_transport("gcs")
            })?;
        self.session_uri = Some(session_uri);
        Ok(())
    }

    /// Sends one chunk. `finalize` marks it as the terminal chunk of the
    /// upload, known total size and all; otherwise the range's upper
    /// bound is left open (`bytes a-b/*`) per GCS's resumable protocol.
    async fn send_chunk(&mut self, chunk: Vec<u8>, finalize: bool) -> Result<(), S3Error> {
        self.ensure_session().await?;

        let start = self.bytes_sent;
        let end = start + chunk.len() as u64;
        let content_range = if finalize && chunk.is_empty() && start == 0 {
            "bytes */0".to_string()
        } else if finalize {
            format!("bytes {}-{}/{}", start, end.saturating_sub(1), end)
        } else {
            format!("bytes {}-{}/*", start, end.saturating_sub(1))
        };

        let session_uri = self.session_uri.clone().expect("session ensured above");
        let resp = client()
            .put(&session_uri)
            .header(reqwest::header::CONTENT_RANGE, content_range)
            .body(chunk)
            .send()
            .await
            .map_err(|e| S3Error::from(e).into_transport("gcs"))?;

        let status = resp.status();
        let accepted = status == StatusCode::PERMANENT_REDIRECT
            || status == StatusCode::from_u16(308).unwrap()
            || status.is_success();
        if !accepted {
            return Err(S3Error::HttpFailWithBody(
                status.as_u16(),
                resp.text().await.unwrap_or_default(),
            )
            .into_transport("gcs"));
        }

        self.bytes_sent = end;
        Ok(())
    }

    /// Appends to the buffer and sends every `CHUNK_ALIGNMENT`-aligned
    /// chunk the buffer now holds, leaving any sub-boundary remainder
    /// buffered for the next write (or for `finish`).
    async fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), S3Error> {
        self.buffer.write(bytes);
        while self.buffer.len() >= CHUNK_ALIGNMENT {
            let send_len = (self.buffer.len() / CHUNK_ALIGNMENT) * CHUNK_ALIGNMENT;
            let chunk = self.buffer.read(send_len);
            self.send_chunk(chunk, false).await?;
        }
        Ok(())
    }

    /// Sends whatever remains (possibly empty, which still finalizes a
    /// zero-byte object) as the terminal chunk.
    async fn finish(&mut self) -> Result<(), S3Error> {
        let remainder = self.buffer.read_all();
        self.send_chunk(remainder, true).await
    }
}

/// Public handle: an `AsyncWrite + ClosableWrite` stream over a GCS
/// resumable upload session.
pub struct GcsWriter {
    cmd_tx: flume::Sender<Cmd>,
    pending_write: Option<(oneshot::Receiver<Result<(), S3Error>>, usize)>,
    closed: bool,
}

impl GcsWriter {
    pub fn new(bucket: String, blob: String, token: BearerToken) -> Self {
        let (tx, rx) = flume::unbounded::<Cmd>();
        let mut inner = Inner {
            bucket,
            blob,
            token,
            session_uri: None,
            buffer: ByteBuffer::new(),
            bytes_sent: 0,
        };

        tokio::spawn(async move {
            while let Ok(cmd) = rx.recv_async().await {
                match cmd {
                    Cmd::Write(bytes, resp) => {
                        let result = inner.write_bytes(&bytes).await;
                        let _ = resp.send(result);
                    }
                    Cmd::Finish(resp) => {
                        let result = inner.finish().await;
                        let _ = resp.send(result);
                        break;
                    }
                }
            }
        });

        Self {
            cmd_tx: tx,
            pending_write: None,
            closed: false,
        }
    }
}

impl AsyncWrite for GcsWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        loop {
            if let Some((rx, len)) = &mut this.pending_write {
                return match Pin::new(rx).poll(cx) {
                    Poll::Pending => Poll::Pending,
                    Poll::Ready(Ok(Ok(()))) => {
                        let len = *len;
                        this.pending_write = None;
                        Poll::Ready(Ok(len))
                    }
                    Poll::Ready(Ok(Err(e))) => {
                        this.pending_write = None;
                        Poll::Ready(Err(io::Error::new(io::ErrorKind::Other, e)))
                    }
                    Poll::Ready(Err(_)) => {
                        this.pending_write = None;
                        Poll::Ready(Err(io::Error::new(
                            io::ErrorKind::BrokenPipe,
                            "gcs writer worker task gone",
                        )))
                    }
                };
            }

            let (resp_tx, resp_rx) = oneshot::channel();
            if this.cmd_tx.send(Cmd::Write(buf.to_vec(), resp_tx)).is_err() {
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "gcs writer worker task gone",
                )));
            }
            this.pending_write = Some((resp_rx, buf.len()));
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[async_trait::async_trait]
impl crate::backends::ClosableWrite for GcsWriter {
    async fn close(&mut self) -> Result<(), S3Error> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let (resp_tx, resp_rx) = oneshot::channel();
        if self.cmd_tx.send(Cmd::Finish(resp_tx)).is_err() {
            return Ok(());
        }
        match resp_rx.await {
            Ok(result) => result,
            Err(_) => Ok(()),
        }
    }
}
