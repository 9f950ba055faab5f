//! WebHDFS backend. Read follows the two-step redirect to
//! the serving datanode; write buffers into chunks of `min_part_size`
//! (default 50 MiB) and issues `CREATE` for the first chunk, `APPEND` for
//! every chunk after, each itself a two-step redirect to a datanode. The
//! namenode request is issued first and only the datanode it redirects to
//! is trusted with the actual data.
//!
//! As with `S3Writer` (`backends::s3::writer`) and `GcsWriter`
//! (`backends::gcs`), the CREATE/APPEND bookkeeping runs on a spawned
//! task reached over a channel, and `poll_write` flushes a chunk as soon
//! as the buffer crosses `min_part_size` rather than only at `close`.

use crate::backends::ClosableWrite;
use crate::byte_buffer::ByteBuffer;
use crate::error::S3Error;
use bytes::Bytes;
use futures_util::StreamExt;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::OnceLock;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::oneshot;
use tokio_util::io::StreamReader;

pub const DEFAULT_MIN_PART_SIZE: usize = 50 * 1024 * 1024;

fn redirect_client() -> &'static reqwest::Client {
    static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();
    CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .use_rustls_tls()
            .build()
            .expect("building reqwest client for the webhdfs backend")
    })
}

fn following_client() -> &'static reqwest::Client {
    static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();
    CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .use_rustls_tls()
            .build()
            .expect("building reqwest client for the webhdfs backend")
    })
}

fn namenode_url(host: &str, port: Option<u16>, path: &str, op: &str, user: Option<&str>) -> String {
    let port = port.unwrap_or(50070);
    let mut url = format!(
        "http://{host}:{port}/webhdfs/v1{path}?op={op}"
    );
    if let Some(user) = user {
        url.push_str("&user.name=");
        url.push_str(user);
    }
    url
}

async fn redirect_location(resp: reqwest::Response) -> Result<String, S3Error> {
    if resp.status() != reqwest::StatusCode::TEMPORARY_REDIRECT {
        return Err(S3Error::UnexpectedResponse(
            "webhdfs namenode did not redirect to a datanode",
        )
        .into_transport("webhdfs"));
    }
    resp.headers()
        .get(reqwest::header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .ok_or_else(|| {
            S3Error::UnexpectedResponse("webhdfs redirect missing Location header")
                .into_transport("webhdfs")
        })
}

/// Read-only stream over `GET ?op=OPEN`. Not seekable, since this backend
/// doesn't issue WebHDFS range reads.
pub struct WebHdfsReader {
    inner: StreamReader<Pin<Box<dyn futures_util::Stream<Item = io::Result<Bytes>> + Send>>, Bytes>,
}

impl WebHdfsReader {
    pub async fn open(
        host: String,
        port: Option<u16>,
        path: String,
        user: Option<String>,
    ) -> Result<Self, S3Error> {
        let url = namenode_url(&host, port, &path, "OPEN", user.as_deref());
        let resp = following_client()
            .get(&url)
            .send()
            .await
            .map_err(|e| S3Error::from(e).into_transport("webhdfs"))?;
        if !resp.status().is_success() {
            return Err(S3Error::HttpFailWithBody(
                resp.status().as_u16(),
                resp.text().await.unwrap_or_default(),
            )
            .into_transport("webhdfs"));
        }
        let stream = resp
            .bytes_stream()
            .map(|r| r.map_err(|e| io::Error::new(io::ErrorKind::Other, e)));
        Ok(Self {
            inner: StreamReader::new(Box::pin(stream)),
        })
    }
}

impl AsyncRead for WebHdfsReader {
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

/// Owns the CREATE/APPEND bookkeeping; lives entirely inside the spawned
/// worker task.
struct Inner {
    host: String,
    port: Option<u16>,
    path: String,
    user: Option<String>,
    min_part_size: usize,
    buffer: ByteBuffer,
    created: bool,
}

impl Inner {
    /// Issues one CREATE (first chunk) or APPEND (every chunk after) via
    /// the namenode redirect, then PUTs `chunk` to the datanode it names.
    async fn send_chunk(&mut self, chunk: Vec<u8>) -> Result<(), S3Error> {
        let op = if self.created { "APPEND" } else { "CREATE" };
        let namenode_url =
            namenode_url(&self.host, self.port, &self.path, op, self.user.as_deref());

        let namenode_resp = redirect_client()
            .put(&namenode_url)
            .send()
            .await
            .map_err(|e| S3Error::from(e).into_transport("webhdfs"))?;
        let datanode_url = redirect_location(namenode_resp).await?;

        let datanode_resp = following_client()
            .put(&datanode_url)
            .body(chunk)
            .send()
            .await
            .map_err(|e| S3Error::from(e).into_transport("webhdfs"))?;
        if !datanode_resp.status().is_success() {
            return Err(S3Error::HttpFailWithBody(
                datanode_resp.status().as_u16(),
                datanode_resp.text().await.unwrap_or_default(),
            )
            .into_transport("webhdfs"));
        }

        self.created = true;
        Ok(())
    }

    /// Appends to the buffer and flushes every `min_part_size`-aligned
    /// chunk the buffer now holds, leaving any remainder buffered for
    /// the next write (or for `finish`).
    async fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), S3Error> {
        self.buffer.write(bytes);
        while self.buffer.len() >= self.min_part_size {
            let chunk = self.buffer.read(self.min_part_size);
            self.send_chunk(chunk).await?;
        }
        Ok(())
    }

    /// Flushes whatever remains. An empty remainder still issues one
    /// CREATE if nothing has been sent yet, so a zero-byte write still
    /// creates the file.
    async fn finish(&mut self) -> Result<(), S3Error> {
        let remainder = self.buffer.read_all();
        if remainder.is_empty() && self.created {
            return Ok(());
        }
        self.send_chunk(remainder).await
    }
}

/// Public handle: an `AsyncWrite + ClosableWrite` stream over a WebHDFS
/// CREATE/APPEND sequence.
pub struct WebHdfsWriter {
    cmd_tx: flume::Sender<Cmd>,
    pending_write: Option<(oneshot::Receiver<Result<(), S3Error>>, usize)>,
    closed: bool,
}

impl WebHdfsWriter {
    pub fn new(
        host: String,
        port: Option<u16>,
        path: String,
        user: Option<String>,
        min_part_size: Option<usize>,
    ) -> Self {
        let (tx, rx) = flume::unbounded::<Cmd>();
        let mut inner = Inner {
            host,
            port,
            path,
            user,
            min_part_size: min_part_size.unwrap_or(DEFAULT_MIN_PART_SIZE),
            buffer: ByteBuffer::new(),
            created: false,
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

impl AsyncWrite for WebHdfsWriter {
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
                            "webhdfs writer worker task gone",
                        )))
                    }
                };
            }

            let (resp_tx, resp_rx) = oneshot::channel();
            if this.cmd_tx.send(Cmd::Write(buf.to_vec(), resp_tx)).is_err() {
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "webhdfs writer worker task gone",
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
impl ClosableWrite for WebHdfsWriter {
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
