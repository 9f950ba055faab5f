//! S3 multipart upload state machine (component I).
//!
//! States: `Open -> PartsPending -> Completed | Aborted` (spec §4.I). The
//! actual upload/abort/complete calls run on a dedicated spawned task,
//! the same "own the async state in a task, talk to it over a channel"
//! shape `ssh::SshWriter` uses and `S3Client::put_stream_with` uses for
//! its reader/writer pipeline — `poll_write`/`poll_shutdown` can't hold
//! `&mut self` across an `.await` the way the worker loop can.
//!
//! Single-part path (`multipart_upload = false`) buffers everything and
//! issues one PUT on close. Multipart path initiates on the first part
//! boundary crossed, uploads parts in strictly increasing part-number
//! order, and on `close` uploads the remainder as the final part (which
//! may be smaller than `min_part_size`) before completing. Any surfaced
//! upload failure, an explicit abort, or a drop before `close` all abort
//! the in-flight upload best-effort (spec §3 lifecycle, §4.I.4).

use super::command::Part;
use super::S3Client;
use crate::backends::ClosableWrite;
use crate::byte_buffer::ByteBuffer;
use crate::error::S3Error;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::AsyncWrite;
use tokio::sync::oneshot;
use tracing::{debug, error, warn};

/// Service minimum part size; the final part of a multipart upload is
/// exempt.
pub const MIN_PART_SIZE: u64 = 5 * 1024 * 1024;
pub const DEFAULT_MIN_PART_SIZE: u64 = 50 * 1024 * 1024;
pub const MAX_PART_COUNT: u32 = 10_000;
pub const MAX_SINGLE_PART_SIZE: u64 = 5 * 1024 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Open,
    PartsPending,
    Completed,
    Aborted,
}

enum Cmd {
    Write(Vec<u8>, oneshot::Sender<Result<(), S3Error>>),
    Finish(oneshot::Sender<Result<(), S3Error>>),
    Abort(oneshot::Sender<()>),
}

/// Owns the actual multipart bookkeeping; lives entirely inside the
/// spawned worker task.
struct Inner {
    client: S3Client,
    key: String,
    min_part_size: u64,
    multipart_upload: bool,
    buffer: ByteBuffer,
    state: State,
    upload_id: Option<String>,
    parts: Vec<Part>,
}

impl Inner {
    async fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), S3Error> {
        if self.state == State::Aborted || self.state == State::Completed {
            return Err(S3Error::Backend(
                "write after the S3 writer was closed or aborted".to_string(),
            ));
        }

        if !self.multipart_upload {
            let would_be = self.buffer.len() as u64 + bytes.len() as u64;
            if would_be > MAX_SINGLE_PART_SIZE {
                return Err(S3Error::LimitExceeded(format!(
                    "single-part upload would be {would_be} bytes, exceeding the {MAX_SINGLE_PART_SIZE} byte service maximum"
                )));
            }
            self.buffer.write(bytes);
            return Ok(());
        }

        self.buffer.write(bytes);
        while self.buffer.len() as u64 >= self.min_part_size {
            let chunk = self.buffer.read(self.min_part_size as usize);
            if let Err(e) = self.upload_part(chunk).await {
                self.abort_best_effort().await;
                return Err(e);
            }
        }
        Ok(())
    }

    async fn ensure_initiated(&mut self) -> Result<(), S3Error> {
        if self.upload_id.is_some() {
            return Ok(());
        }
        let resp = self
            .client
            .initiate_multipart_upload(&self.key, http::HeaderMap::new())
            .await?;
        debug!(upload_id = %resp.upload_id, key = %self.key, "initiated multipart upload");
        self.upload_id = Some(resp.upload_id);
        self.state = State::PartsPending;
        Ok(())
    }

    async fn upload_part(&mut self, chunk: Vec<u8>) -> Result<(), S3Error> {
        self.ensure_initiated().await?;
        let upload_id = self.upload_id.clone().expect("initiated above");
        let part_number = self.parts.len() as u32 + 1;
        if part_number > MAX_PART_COUNT {
            return Err(S3Error::LimitExceeded(format!(
                "multipart upload of '{}' would exceed the {MAX_PART_COUNT} part service maximum",
                self.key
            )));
        }
        let len = chunk.len();
        let resp = self
            .client
            .upload_part(&self.key, chunk, part_number, &upload_id)
            .await?;
        let etag = resp
            .headers()
            .get("etag")
            .ok_or(S3Error::UnexpectedResponse(
                "missing ETag in multipart upload-part response headers",
            ))?
            .to_str()
            .map_err(S3Error::HeaderToStr)?
            .to_string();
        debug!(part_number, len, key = %self.key, "uploaded part");
        self.parts.push(Part { part_number, etag });
        Ok(())
    }

    async fn abort_best_effort(&mut self) {
        if self.state == State::Aborted || self.state == State::Completed {
            return;
        }
        if let Some(upload_id) = self.upload_id.clone() {
            if let Err(e) = self.client.abort_upload(&self.key, &upload_id).await {
                error!(key = %self.key, upload_id, "best-effort abort of multipart upload failed: {e}");
            }
        }
        self.state = State::Aborted;
    }

    /// Finalizes the upload per spec §4.I.3: the single-part path (or a
    /// multipart session that never crossed a part boundary) issues one
    /// PUT; a multipart session with at least one part uploads the
    /// remainder (if any, or if zero parts exist yet) as the final part
    /// and completes.
    async fn finish(&mut self) -> Result<(), S3Error> {
        if self.state == State::Aborted {
            return Ok(());
        }
        if self.state == State::Completed {
            return Ok(());
        }

        if !self.multipart_upload || self.upload_id.is_none() {
            let content = self.buffer.read_all();
            self.client.put(&self.key, &content).await?;
            self.state = State::Completed;
            return Ok(());
        }

        if !self.buffer.empty() || self.parts.is_empty() {
            let remainder = self.buffer.read_all();
            if let Err(e) = self.upload_part(remainder).await {
                self.abort_best_effort().await;
                return Err(e);
            }
        }

        let upload_id = self.upload_id.clone().expect("checked above");
        let parts = std::mem::take(&mut self.parts);
        match self
            .client
            .complete_multipart_upload(&self.key, &upload_id, parts)
            .await
        {
            Ok(_) => {
                debug!(key = %self.key, upload_id, "completed multipart upload");
                self.state = State::Completed;
                Ok(())
            }
            Err(e) => {
                self.abort_best_effort().await;
                Err(e)
            }
        }
    }
}

type PendingWrite = oneshot::Receiver<Result<(), S3Error>>;

/// Public handle: an `AsyncWrite + ClosableWrite` stream over a multipart
/// (or single-part) upload session.
pub struct S3Writer {
    cmd_tx: flume::Sender<Cmd>,
    pending_write: Option<(PendingWrite, usize)>,
    closed: bool,
}

impl S3Writer {
    pub fn open(
        client: S3Client,
        key: String,
        min_part_size: Option<u64>,
        multipart_upload: bool,
    ) -> Result<Self, S3Error> {
        let min_part_size = min_part_size.unwrap_or(DEFAULT_MIN_PART_SIZE);
        if multipart_upload && min_part_size < MIN_PART_SIZE {
            return Err(S3Error::LimitExceeded(format!(
                "min_part_size must be at least {MIN_PART_SIZE} bytes (S3 service minimum for non-final parts), got {min_part_size}"
            )));
        }

        let (tx, rx) = flume::unbounded::<Cmd>();
        let mut inner = Inner {
            client,
            key,
            min_part_size,
            multipart_upload,
            buffer: ByteBuffer::new(),
            state: State::Open,
            upload_id: None,
            parts: Vec::new(),
        };

        tokio::spawn(async move {
            let mut finished = false;
            while let Ok(cmd) = rx.recv_async().await {
                match cmd {
                    Cmd::Write(bytes, resp) => {
                        let result = inner.write_bytes(&bytes).await;
                        let _ = resp.send(result);
                    }
                    Cmd::Finish(resp) => {
                        let result = inner.finish().await;
                        finished = true;
                        let _ = resp.send(result);
                        break;
                    }
                    Cmd::Abort(resp) => {
                        inner.abort_best_effort().await;
                        finished = true;
                        let _ = resp.send(());
                        break;
                    }
                }
            }
            if !finished {
                warn!(key = %inner.key, "S3Writer dropped without close; aborting in-flight multipart upload");
                inner.abort_best_effort().await;
            }
        });

        Ok(Self {
            cmd_tx: tx,
            pending_write: None,
            closed: false,
        })
    }

    /// Explicit abort (spec §4.I.4): best-effort, never raises.
    pub async fn abort(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let (resp_tx, resp_rx) = oneshot::channel();
        if self.cmd_tx.send(Cmd::Abort(resp_tx)).is_ok() {
            let _ = resp_rx.await;
        }
    }
}

impl AsyncWrite for S3Writer {
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
                            "S3 writer worker task gone",
                        )))
                    }
                };
            }

            let (resp_tx, resp_rx) = oneshot::channel();
            if this.cmd_tx.send(Cmd::Write(buf.to_vec(), resp_tx)).is_err() {
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "S3 writer worker task gone",
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
impl ClosableWrite for S3Writer {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn part_size_constants_match_service_limits() {
        assert_eq!(MIN_PART_SIZE, 5 * 1024 * 1024);
        assert_eq!(MAX_PART_COUNT, 10_000);
        assert_eq!(MAX_SINGLE_PART_SIZE, 5 * 1024 * 1024 * 1024);
    }
}
