//! HDFS backend, shelling out to the `hadoop fs` CLI rather than speaking
//! the native RPC protocol. Reads drive `hadoop fs -cat`, writes drive
//! `hadoop fs -put -` (or `-appendToFile -` for append mode), piping
//! through the subprocess's stdout/stdin the way a local pipeline tool
//! would.

use crate::backends::ClosableWrite;
use crate::error::S3Error;
use std::io;
use std::pin::Pin;
use std::process::Stdio;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

pub struct HdfsReader {
    stdout: ChildStdout,
    _child: Child,
}

impl HdfsReader {
    pub async fn open(path: String) -> Result<Self, S3Error> {
        let mut child = Command::new("hadoop")
            .args(["fs", "-cat", &path])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| S3Error::from(e).into_transport("hdfs"))?;
        let stdout = child
            .stdout
            .take()
            .expect("stdout piped in the command above");
        Ok(Self {
            stdout,
            _child: child,
        })
    }
}

impl AsyncRead for HdfsReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().stdout).poll_read(cx, buf)
    }
}

pub struct HdfsWriter {
    stdin: Option<ChildStdin>,
    child: Child,
    closed: bool,
}

impl HdfsWriter {
    pub async fn open(path: String, append: bool) -> Result<Self, S3Error> {
        let op = if append { "-appendToFile" } else { "-put" };
        let mut child = Command::new("hadoop")
            .args(["fs", op, "-", &path])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| S3Error::from(e).into_transport("hdfs"))?;
        let stdin = child
            .stdin
            .take()
            .expect("stdin piped in the command above");
        Ok(Self {
            stdin: Some(stdin),
            child,
            closed: false,
        })
    }
}

impl AsyncWrite for HdfsWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        match &mut this.stdin {
            Some(stdin) => Pin::new(stdin).poll_write(cx, buf),
            None => Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "write after hdfs writer was closed",
            ))),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        match &mut this.stdin {
            Some(stdin) => Pin::new(stdin).poll_flush(cx),
            None => Poll::Ready(Ok(())),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[async_trait::async_trait]
impl ClosableWrite for HdfsWriter {
    async fn close(&mut self) -> Result<(), S3Error> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if let Some(mut stdin) = self.stdin.take() {
            stdin.shutdown().await.map_err(S3Error::from)?;
        }
        let status = self.child.wait().await.map_err(S3Error::from)?;
        if !status.success() {
            return Err(S3Error::Backend(format!(
                "hadoop fs exited with status {status}"
            ))
            .into_transport("hdfs"));
        }
        Ok(())
    }
}
