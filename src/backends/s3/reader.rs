//! Seekable S3 read stream (component H).
//!
//! Builds on [`super::S3Client::head`] (to learn `content_length` up
//! front) and [`super::S3Client::get_range`] (to (re)start a ranged GET
//! after a seek), adding the position/buffer/current-body state machine
//! spec'd for `S3ReaderState`. A fresh ranged GET is only issued lazily,
//! on the next `read` after a seek — matching the teacher's habit of not
//! doing network work until a caller actually asks for bytes.

use super::S3Client;
use crate::error::S3Error;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, ReadBuf};
use tokio_util::io::StreamReader;

type BoxStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;
type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

enum State {
    /// No live body; `position == content_length` when truly at EOF,
    /// otherwise the next `read` lazily starts a ranged GET.
    Idle,
    Requesting(BoxFuture<Result<reqwest::Response, S3Error>>),
    Streaming(StreamReader<BoxStream, Bytes>),
}

pub struct S3Reader {
    client: S3Client,
    key: String,
    position: u64,
    content_length: u64,
    state: State,
}

impl S3Reader {
    pub async fn open(client: S3Client, key: String) -> Result<Self, S3Error> {
        let head = client.head(&key).await?;
        let content_length = head.content_length.unwrap_or(0);
        Ok(Self {
            client,
            key,
            position: 0,
            content_length,
            state: State::Idle,
        })
    }

    pub fn content_length(&self) -> u64 {
        self.content_length
    }

    pub fn tell(&self) -> u64 {
        self.position
    }

    fn build_request(&self) -> BoxFuture<Result<reqwest::Response, S3Error>> {
        let client = self.client.clone();
        let key = self.key.clone();
        let start = self.position;
        Box::pin(async move { client.get_range(&key, start, None).await })
    }

    /// Repeatedly reads until a `\n` is found (inclusive) or EOF, matching
    /// the "whatever is left at EOF" contract.
    pub async fn readline(&mut self) -> Result<Vec<u8>, S3Error> {
        let mut line = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            let n = self.read(&mut byte).await?;
            if n == 0 {
                return Ok(line);
            }
            line.push(byte[0]);
            if byte[0] == b'\n' {
                return Ok(line);
            }
        }
    }
}

impl AsyncRead for S3Reader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        loop {
            if this.position >= this.content_length {
                return Poll::Ready(Ok(()));
            }

            match &mut this.state {
                State::Idle => {
                    this.state = State::Requesting(this.build_request());
                }
                State::Requesting(fut) => match fut.as_mut().poll(cx) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(Err(e)) => {
                        return Poll::Ready(Err(io::Error::new(io::ErrorKind::Other, e)))
                    }
                    Poll::Ready(Ok(resp)) => {
                        let stream = resp
                            .bytes_stream()
                            .map(|r| r.map_err(|e| io::Error::new(io::ErrorKind::Other, e)));
                        this.state = State::Streaming(StreamReader::new(Box::pin(stream) as BoxStream));
                    }
                },
                State::Streaming(reader) => {
                    let before = buf.filled().len();
                    return match Pin::new(reader).poll_read(cx, buf) {
                        Poll::Ready(Ok(())) => {
                            let read = buf.filled().len() - before;
                            this.position += read as u64;
                            if read == 0 {
                                // body exhausted before content_length, treat as EOF
                                this.state = State::Idle;
                            }
                            Poll::Ready(Ok(()))
                        }
                        other => other,
                    };
                }
            }
        }
    }
}

impl AsyncSeek for S3Reader {
    fn start_seek(self: Pin<&mut Self>, position: io::SeekFrom) -> io::Result<()> {
        let this = self.get_mut();
        let target = match position {
            io::SeekFrom::Start(p) => p as i64,
            io::SeekFrom::Current(delta) => this.position as i64 + delta,
            io::SeekFrom::End(delta) => this.content_length as i64 + delta,
        };
        let clamped = target.max(0) as u64;
        let new_position = clamped.min(this.content_length);
        if new_position != this.position {
            this.state = State::Idle;
        }
        this.position = new_position;
        Ok(())
    }

    fn poll_complete(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        Poll::Ready(Ok(self.position))
    }
}
