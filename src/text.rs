//! Text layering: delegates character-level decoding to `encoding_rs` and
//! does newline translation, wrapping a binary stream as a thin
//! pass-through rather than a full codec stack, since Rust has no single
//! "text-mode file object" the way some other languages do.
//!
//! Decoded/encoded output is always valid UTF-8 (Rust's native text
//! representation); `encoding` only controls which *source* encoding raw
//! bytes are interpreted as on read, or which *target* encoding UTF-8 is
//! re-encoded to on write.

use crate::backends::ClosableWrite;
use crate::byte_buffer::ByteBuffer;
use crate::error::S3Error;
use encoding_rs::{Decoder, Encoder, Encoding, UTF_8};
use futures_util::future::poll_fn;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorHandling {
    Strict,
    Replace,
    Ignore,
}

impl ErrorHandling {
    pub fn parse(s: Option<&str>) -> Result<Self, S3Error> {
        match s {
            None | Some("replace") => Ok(Self::Replace),
            Some("strict") => Ok(Self::Strict),
            Some("ignore") => Ok(Self::Ignore),
            Some(other) => Err(S3Error::InvalidMode(format!(
                "unrecognized text error-handling mode '{other}'"
            ))),
        }
    }
}

fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding, S3Error> {
    match label {
        None => Ok(UTF_8),
        Some(label) => Encoding::for_label(label.as_bytes())
            .ok_or_else(|| S3Error::InvalidMode(format!("unknown text encoding '{label}'"))),
    }
}

/// Wraps a raw byte reader, decoding it as `encoding` (default UTF-8) and
/// normalizing newlines to `\n` when `newline` is `None` (the "universal
/// newlines" default); when `newline` is `Some(_)`, bytes pass through
/// undecoded-newline-wise (the caller asked for a specific line ending
/// and is expected to handle it themselves on read).
pub struct TextReader<R> {
    inner: R,
    decoder: Decoder,
    errors: ErrorHandling,
    universal_newlines: bool,
    raw: Vec<u8>,
    pending: ByteBuffer,
    last_was_cr: bool,
    eof: bool,
}

impl<R: AsyncRead + Unpin> TextReader<R> {
    pub fn new(
        inner: R,
        encoding: Option<&str>,
        errors: Option<&str>,
        newline: Option<&str>,
    ) -> Result<Self, S3Error> {
        let encoding = resolve_encoding(encoding)?;
        Ok(Self {
            inner,
            decoder: encoding.new_decoder(),
            errors: ErrorHandling::parse(errors)?,
            universal_newlines: newline.is_none(),
            raw: vec![0u8; 64 * 1024],
            pending: ByteBuffer::new(),
            last_was_cr: false,
            eof: false,
        })
    }

    fn decode_chunk(&mut self, chunk: &[u8], last: bool) -> io::Result<()> {
        let mut out = String::with_capacity(chunk.len() + 4);
        match self.errors {
            ErrorHandling::Strict => {
                let (result, _read) = self
                    .decoder
                    .decode_to_string_without_replacement(chunk, &mut out, last);
                if result == encoding_rs::DecoderResult::Malformed(0, 0) {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "malformed byte sequence under strict text decoding",
                    ));
                }
            }
            ErrorHandling::Replace => {
                self.decoder.decode_to_string(chunk, &mut out, last);
            }
            ErrorHandling::Ignore => {
                self.decoder.decode_to_string(chunk, &mut out, last);
                out = out.chars().filter(|&c| c != '\u{FFFD}').collect();
            }
        }

        let bytes = if self.universal_newlines {
            self.translate_to_lf(out.as_bytes())
        } else {
            out.into_bytes()
        };
        self.pending.write(&bytes);
        Ok(())
    }

    fn translate_to_lf(&mut self, bytes: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(bytes.len());
        for &b in bytes {
            if self.last_was_cr {
                self.last_was_cr = false;
                if b == b'\n' {
                    continue;
                }
            }
            if b == b'\r' {
                self.last_was_cr = true;
                out.push(b'\n');
            } else {
                out.push(b);
            }
        }
        out
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for TextReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        loop {
            if !this.pending.empty() {
                let n = buf.remaining().min(this.pending.len());
                let bytes = this.pending.read(n);
                buf.put_slice(&bytes);
                return Poll::Ready(Ok(()));
            }
            if this.eof {
                return Poll::Ready(Ok(()));
            }

            let mut raw_buf = ReadBuf::new(&mut this.raw);
            match Pin::new(&mut this.inner).poll_read(cx, &mut raw_buf) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                Poll::Ready(Ok(())) => {
                    let n = raw_buf.filled().len();
                    if n == 0 {
                        this.eof = true;
                        this.decode_chunk(&[], true)?;
                    } else {
                        let chunk = raw_buf.filled().to_vec();
                        this.decode_chunk(&chunk, false)?;
                    }
                }
            }
        }
    }
}

/// Wraps a raw `ClosableWrite`, encoding UTF-8 input as `encoding`
/// (default UTF-8) and translating `\n` to `newline` when set.
pub struct TextWriter<W> {
    inner: W,
    encoder: Encoder,
    newline: Option<Vec<u8>>,
    pending: ByteBuffer,
    closed: bool,
}

impl<W: AsyncWrite + Unpin> TextWriter<W> {
    pub fn new(inner: W, encoding: Option<&str>, newline: Option<&str>) -> Result<Self, S3Error> {
        let encoding = resolve_encoding(encoding)?;
        Ok(Self {
            inner,
            encoder: encoding.new_encoder(),
            newline: newline.map(|nl| nl.as_bytes().to_vec()),
            pending: ByteBuffer::new(),
            closed: false,
        })
    }

    fn translate_newlines(&self, text: &str) -> String {
        match &self.newline {
            None => text.to_string(),
            Some(nl) => text.replace('\n', &String::from_utf8_lossy(nl)),
        }
    }

    fn encode(&mut self, text: &str, last: bool) -> Vec<u8> {
        let mut out = Vec::with_capacity(text.len() + 4);
        let (_, _, _) = self.encoder.encode_from_utf8_to_vec(text, &mut out, last);
        out
    }

    fn try_flush_pending(
        inner: &mut W,
        pending: &mut ByteBuffer,
        cx: &mut Context<'_>,
    ) -> Poll<io::Result<()>> {
        while !pending.empty() {
            let chunk = pending.peek(pending.len());
            match Pin::new(&mut *inner).poll_write(cx, &chunk) {
                Poll::Ready(Ok(0)) => {
                    return Poll::Ready(Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "inner stream accepted 0 bytes while draining text layer buffer",
                    )))
                }
                Poll::Ready(Ok(n)) => {
                    pending.read(n);
                }
                Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                Poll::Pending => return Poll::Pending,
            }
        }
        Poll::Ready(Ok(()))
    }
}

impl<W: AsyncWrite + Unpin> AsyncWrite for TextWriter<W> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();

        if !this.pending.empty() {
            match Self::try_flush_pending(&mut this.inner, &mut this.pending, cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                Poll::Ready(Ok(())) => {}
            }
        }

        let text = std::str::from_utf8(buf)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let translated = this.translate_newlines(text);
        let encoded = this.encode(&translated, false);
        this.pending.write(&encoded);
        let _ = Self::try_flush_pending(&mut this.inner, &mut this.pending, cx);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        match Self::try_flush_pending(&mut this.inner, &mut this.pending, cx) {
            Poll::Ready(Ok(())) => Pin::new(&mut this.inner).poll_flush(cx),
            other => other,
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        match Self::try_flush_pending(&mut this.inner, &mut this.pending, cx) {
            Poll::Ready(Ok(())) => Pin::new(&mut this.inner).poll_shutdown(cx),
            other => other,
        }
    }
}

#[async_trait::async_trait]
impl<W: ClosableWrite> ClosableWrite for TextWriter<W> {
    async fn close(&mut self) -> Result<(), S3Error> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let tail = self.encode("", true);
        self.pending.write(&tail);
        poll_fn(|cx| Self::try_flush_pending(&mut self.inner, &mut self.pending, cx))
            .await
            .map_err(S3Error::from)?;
        self.inner.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn decodes_utf8_and_normalizes_crlf_to_lf() {
        let raw = b"hello\r\nworld\r\n".to_vec();
        let mut reader = TextReader::new(raw.as_slice(), None, None, None).unwrap();
        let mut out = String::new();
        reader.read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "hello\nworld\n");
    }

    #[tokio::test]
    async fn passthrough_when_newline_explicit() {
        let raw = b"a\r\nb".to_vec();
        let mut reader = TextReader::new(raw.as_slice(), None, None, Some("\r\n")).unwrap();
        let mut out = String::new();
        reader.read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "a\r\nb");
    }
}
