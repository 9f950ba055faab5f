//! HTTP(S) backend, read-only.
//!
//! Issues a GET with `Accept-Encoding: identity` so the server doesn't
//! apply its own compression underneath our codec layer's length
//! accounting. Seeking is emulated: a seek re-issues the GET with a
//! `Range` header; if the server answers `200` instead of `206` (no range
//! support), the reader discards bytes up to the requested offset before
//! handing data back to the caller.

use crate::credentials::BasicAuth;
use crate::error::S3Error;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use reqwest::StatusCode;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::OnceLock;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncSeek, ReadBuf};
use tokio_util::io::StreamReader;

static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();

fn get_client() -> &'static reqwest::Client {
    CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .use_rustls_tls()
            .build()
            .expect("building reqwest client for the http backend")
    })
}

type BoxStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;
type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

enum State {
    Idle,
    Requesting(BoxFuture<Result<reqwest::Response, S3Error>>),
    Streaming {
        reader: StreamReader<BoxStream, Bytes>,
        discard: u64,
    },
}

pub struct HttpReader {
    url: String,
    auth: Option<BasicAuth>,
    extra_headers: reqwest::header::HeaderMap,
    position: u64,
    content_length: Option<u64>,
    state: State,
}

impl HttpReader {
    /// Opens `url`, issuing a HEAD first to learn `content_length` (best
    /// effort: servers that reject HEAD just leave it `None`, which only
    /// disables `SeekFrom::End`).
    pub async fn open(
        url: String,
        auth: Option<BasicAuth>,
        extra_headers: reqwest::header::HeaderMap,
    ) -> Result<Self, S3Error> {
        let content_length = probe_content_length(&url, auth.as_ref(), &extra_headers).await;
        Ok(Self {
            url,
            auth,
            extra_headers,
            position: 0,
            content_length,
            state: State::Idle,
        })
    }

    fn build_request(&self) -> BoxFuture<Result<reqwest::Response, S3Error>> {
        let mut builder = get_client()
            .get(&self.url)
            .header(reqwest::header::ACCEPT_ENCODING, "identity")
            .headers(self.extra_headers.clone());
        if self.position > 0 {
            builder = builder.header(reqwest::header::RANGE, format!("bytes={}-", self.position));
        }
        if let Some(auth) = &self.auth {
            builder = builder.basic_auth(&auth.user, Some(&auth.password));
        }
        Box::pin(async move {
            let resp = builder.send().await?;
            if !resp.status().is_success() && resp.status() != StatusCode::PARTIAL_CONTENT {
                return Err(S3Error::HttpFailWithBody(
                    resp.status().as_u16(),
                    resp.text().await.unwrap_or_default(),
                )
                .into_transport("http"));
            }
            Ok(resp)
        })
    }
}

async fn probe_content_length(
    url: &str,
    auth: Option<&BasicAuth>,
    extra_headers: &reqwest::header::HeaderMap,
) -> Option<u64> {
    let mut builder = get_client().head(url).headers(extra_headers.clone());
    if let Some(auth) = auth {
        builder = builder.basic_auth(&auth.user, Some(&auth.password));
    }
    let resp = builder.send().await.ok()?;
    if !resp.status().is_success() {
        return None;
    }
    resp.content_length()
}

impl AsyncRead for HttpReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        loop {
            match &mut this.state {
                State::Idle => {
                    if let Some(len) = this.content_length {
                        if this.position >= len {
                            return Poll::Ready(Ok(()));
                        }
                    }
                    this.state = State::Requesting(this.build_request());
                }
                State::Requesting(fut) => match fut.as_mut().poll(cx) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(Err(e)) => {
                        return Poll::Ready(Err(io::Error::new(io::ErrorKind::Other, e)))
                    }
                    Poll::Ready(Ok(resp)) => {
                        let served_range = resp.status() == StatusCode::PARTIAL_CONTENT;
                        let stream = resp
                            .bytes_stream()
                            .map(|r| r.map_err(|e| io::Error::new(io::ErrorKind::Other, e)));
                        let reader = StreamReader::new(Box::pin(stream) as BoxStream);
                        let discard = if served_range { 0 } else { this.position };
                        this.state = State::Streaming { reader, discard };
                    }
                },
                State::Streaming { reader, discard } => {
                    if *discard > 0 {
                        let mut scratch = vec![0u8; (*discard).min(64 * 1024) as usize];
                        let mut discard_buf = ReadBuf::new(&mut scratch);
                        match Pin::new(&mut *reader).poll_read(cx, &mut discard_buf) {
                            Poll::Pending => return Poll::Pending,
                            Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                            Poll::Ready(Ok(())) => {
                                let n = discard_buf.filled().len();
                                if n == 0 {
                                    // server's body ended before our offset
                                    return Poll::Ready(Ok(()));
                                }
                                *discard -= n as u64;
                            }
                        }
                    } else {
                        let before = buf.filled().len();
                        return match Pin::new(&mut *reader).poll_read(cx, buf) {
                            Poll::Ready(Ok(())) => {
                                this.position += (buf.filled().len() - before) as u64;
                                Poll::Ready(Ok(()))
                            }
                            other => other,
                        };
                    }
                }
            }
        }
    }
}

impl AsyncSeek for HttpReader {
    fn start_seek(self: Pin<&mut Self>, position: io::SeekFrom) -> io::Result<()> {
        let this = self.get_mut();
        let target = match position {
            io::SeekFrom::Start(p) => p as i64,
            io::SeekFrom::Current(delta) => this.position as i64 + delta,
            io::SeekFrom::End(delta) => {
                let len = this.content_length.ok_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::Unsupported,
                        "seek from end requires a known content length",
                    )
                })?;
                len as i64 + delta
            }
        };
        let clamped = target.max(0) as u64;
        this.position = match this.content_length {
            Some(len) => clamped.min(len),
            None => clamped,
        };
        this.state = State::Idle;
        Ok(())
    }

    fn poll_complete(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        Poll::Ready(Ok(self.position))
    }
}
