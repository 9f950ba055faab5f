//! Local filesystem backend: a thin passthrough to
//! `tokio::fs::File`. Modes map directly; seeking and buffering guarantees
//! are whatever the OS gives us.

use crate::backends::ClosableWrite;
use crate::error::S3Error;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWrite, AsyncWriteExt};

pub async fn open_read(path: &str) -> Result<File, S3Error> {
    File::open(path)
        .await
        .map_err(|e| S3Error::from(e).into_transport("local"))
}

pub async fn open_write(path: &str, append: bool) -> Result<LocalWriter, S3Error> {
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .append(append)
        .truncate(!append)
        .open(path)
        .await
        .map_err(|e| S3Error::from(e).into_transport("local"))?;
    Ok(LocalWriter { file })
}

pub struct LocalWriter {
    file: File,
}

impl AsyncWrite for LocalWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.get_mut().file).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().file).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().file).poll_shutdown(cx)
    }
}

#[async_trait::async_trait]
impl ClosableWrite for LocalWriter {
    async fn close(&mut self) -> Result<(), S3Error> {
        self.file.flush().await?;
        self.file.sync_all().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn write_then_read_roundtrips_through_the_filesystem() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("local_backend_test_{}", std::process::id()));
        let path_str = path.to_string_lossy().into_owned();

        let mut writer = open_write(&path_str, false).await.unwrap();
        writer.write_all(b"hello local backend").await.unwrap();
        writer.close().await.unwrap();

        let mut reader = open_read(&path_str).await.unwrap();
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"hello local backend");

        let _ = tokio::fs::remove_file(path).await;
    }
}
