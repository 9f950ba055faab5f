//! SSH/SFTP backend.
//!
//! `ssh2` only exposes a blocking API, so each open stream gets its own
//! dedicated blocking task (the same "hand the blocking work to its own
//! task, talk to it over a channel" shape the S3 writer uses for its
//! reader/writer pipeline) that owns the `ssh2::Session` and `ssh2::File`
//! and answers read/write/seek/close requests sent over an unbounded
//! `flume` channel.

use crate::backends::ClosableWrite;
use crate::credentials::SshCredentials;
use crate::error::S3Error;
use std::future::Future;
use std::io::{Read, Seek, SeekFrom, Write};
use std::net::TcpStream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::oneshot;

enum ReadCmd {
    Read(usize, oneshot::Sender<std::io::Result<Vec<u8>>>),
    Seek(SeekFrom, oneshot::Sender<std::io::Result<u64>>),
}

enum WriteCmd {
    Write(Vec<u8>, oneshot::Sender<std::io::Result<usize>>),
    Close(oneshot::Sender<std::io::Result<()>>),
}

fn connect(host: &str, port: Option<u16>, creds: &SshCredentials) -> Result<ssh2::Session, S3Error> {
    let addr = format!("{}:{}", host, port.unwrap_or(22));
    let tcp = TcpStream::connect(&addr).map_err(|e| S3Error::from(e).into_transport("ssh"))?;
    let mut session = ssh2::Session::new().map_err(|e| S3Error::Ssh(e.to_string()))?;
    session.set_tcp_stream(tcp);
    session
        .handshake()
        .map_err(|e| S3Error::Ssh(e.to_string()).into_transport("ssh"))?;

    if let Some(key) = &creds.private_key {
        let tmp = std::env::temp_dir().join(format!("ssh_key_{}", std::process::id()));
        std::fs::write(&tmp, key).map_err(S3Error::from)?;
        session
            .userauth_pubkey_file(
                &creds.user,
                None,
                &tmp,
                creds.private_key_passphrase.as_deref(),
            )
            .map_err(|e| S3Error::Ssh(e.to_string()))?;
        let _ = std::fs::remove_file(&tmp);
    } else if let Some(password) = &creds.password {
        session
            .userauth_password(&creds.user, password)
            .map_err(|e| S3Error::Ssh(e.to_string()))?;
    } else {
        return Err(S3Error::Ssh(
            "no password or private key supplied for ssh auth".to_string(),
        ));
    }

    if !session.authenticated() {
        return Err(S3Error::Ssh("ssh authentication failed".to_string()));
    }
    Ok(session)
}

pub struct SshReader {
    cmd_tx: flume::Sender<ReadCmd>,
    pending: Option<oneshot::Receiver<std::io::Result<Vec<u8>>>>,
    seek_pending: Option<oneshot::Receiver<std::io::Result<u64>>>,
}

impl SshReader {
    pub async fn open(
        host: String,
        port: Option<u16>,
        creds: SshCredentials,
        path: String,
    ) -> Result<Self, S3Error> {
        let (tx, rx) = flume::unbounded::<ReadCmd>();
        let (ready_tx, ready_rx) = oneshot::channel::<Result<(), String>>();

        tokio::task::spawn_blocking(move || {
            let session = match connect(&host, port, &creds) {
                Ok(s) => s,
                Err(e) => {
                    let _ = ready_tx.send(Err(e.to_string()));
                    return;
                }
            };
            let sftp = match session.sftp() {
                Ok(s) => s,
                Err(e) => {
                    let _ = ready_tx.send(Err(e.to_string()));
                    return;
                }
            };
            let mut file = match sftp.open(std::path::Path::new(&path)) {
                Ok(f) => f,
                Err(e) => {
                    let _ = ready_tx.send(Err(e.to_string()));
                    return;
                }
            };
            if ready_tx.send(Ok(())).is_err() {
                return;
            }

            while let Ok(cmd) = rx.recv() {
                match cmd {
                    ReadCmd::Read(len, resp) => {
                        let mut buf = vec![0u8; len];
                        let result = match file.read(&mut buf) {
                            Ok(n) => {
                                buf.truncate(n);
                                Ok(buf)
                            }
                            Err(e) => Err(e),
                        };
                        let _ = resp.send(result);
                    }
                    ReadCmd::Seek(pos, resp) => {
                        let _ = resp.send(file.seek(pos));
                    }
                }
            }
        });

        ready_rx
            .await
            .map_err(|_| S3Error::Ssh("sftp worker died before opening file".to_string()))?
            .map_err(S3Error::Ssh)?;

        Ok(Self {
            cmd_tx: tx,
            pending: None,
            seek_pending: None,
        })
    }
}

impl AsyncRead for SshReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        loop {
            if let Some(rx) = &mut this.pending {
                return match Pin::new(rx).poll(cx) {
                    Poll::Pending => Poll::Pending,
                    Poll::Ready(Ok(Ok(bytes))) => {
                        this.pending = None;
                        buf.put_slice(&bytes);
                        Poll::Ready(Ok(()))
                    }
                    Poll::Ready(Ok(Err(e))) => {
                        this.pending = None;
                        Poll::Ready(Err(e))
                    }
                    Poll::Ready(Err(_)) => {
                        this.pending = None;
                        Poll::Ready(Err(std::io::Error::new(
                            std::io::ErrorKind::BrokenPipe,
                            "sftp worker thread gone",
                        )))
                    }
                };
            }

            let (resp_tx, resp_rx) = oneshot::channel();
            if this
                .cmd_tx
                .send(ReadCmd::Read(buf.remaining(), resp_tx))
                .is_err()
            {
                return Poll::Ready(Err(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "sftp worker thread gone",
                )));
            }
            this.pending = Some(resp_rx);
        }
    }
}

impl tokio::io::AsyncSeek for SshReader {
    fn start_seek(self: Pin<&mut Self>, position: SeekFrom) -> std::io::Result<()> {
        let this = self.get_mut();
        let (resp_tx, resp_rx) = oneshot::channel();
        this.cmd_tx
            .send(ReadCmd::Seek(position, resp_tx))
            .map_err(|_| {
                std::io::Error::new(std::io::ErrorKind::BrokenPipe, "sftp worker thread gone")
            })?;
        this.seek_pending = Some(resp_rx);
        Ok(())
    }

    fn poll_complete(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<u64>> {
        let this = self.get_mut();
        let Some(rx) = &mut this.seek_pending else {
            return Poll::Ready(Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                "poll_complete called without a pending start_seek",
            )));
        };
        match Pin::new(rx).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(result)) => {
                this.seek_pending = None;
                Poll::Ready(result)
            }
            Poll::Ready(Err(_)) => {
                this.seek_pending = None;
                Poll::Ready(Err(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "sftp worker thread gone",
                )))
            }
        }
    }
}

pub struct SshWriter {
    cmd_tx: flume::Sender<WriteCmd>,
    pending: Option<oneshot::Receiver<std::io::Result<usize>>>,
    closed: bool,
}

impl SshWriter {
    pub async fn open(
        host: String,
        port: Option<u16>,
        creds: SshCredentials,
        path: String,
    ) -> Result<Self, S3Error> {
        let (tx, rx) = flume::unbounded::<WriteCmd>();
        let (ready_tx, ready_rx) = oneshot::channel::<Result<(), String>>();

        tokio::task::spawn_blocking(move || {
            let session = match connect(&host, port, &creds) {
                Ok(s) => s,
                Err(e) => {
                    let _ = ready_tx.send(Err(e.to_string()));
                    return;
                }
            };
            let sftp = match session.sftp() {
                Ok(s) => s,
                Err(e) => {
                    let _ = ready_tx.send(Err(e.to_string()));
                    return;
                }
            };
            let mut file = match sftp.create(std::path::Path::new(&path)) {
                Ok(f) => f,
                Err(e) => {
                    let _ = ready_tx.send(Err(e.to_string()));
                    return;
                }
            };
            if ready_tx.send(Ok(())).is_err() {
                return;
            }

            while let Ok(cmd) = rx.recv() {
                match cmd {
                    WriteCmd::Write(data, resp) => {
                        let _ = resp.send(file.write(&data));
                    }
                    WriteCmd::Close(resp) => {
                        let _ = resp.send(file.flush());
                        break;
                    }
                }
            }
        });

        ready_rx
            .await
            .map_err(|_| S3Error::Ssh("sftp worker died before opening file".to_string()))?
            .map_err(S3Error::Ssh)?;

        Ok(Self {
            cmd_tx: tx,
            pending: None,
            closed: false,
        })
    }
}

impl AsyncWrite for SshWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        let this = self.get_mut();
        if let Some(rx) = &mut this.pending {
            return match Pin::new(rx).poll(cx) {
                Poll::Pending => Poll::Pending,
                Poll::Ready(Ok(result)) => {
                    this.pending = None;
                    Poll::Ready(result)
                }
                Poll::Ready(Err(_)) => {
                    this.pending = None;
                    Poll::Ready(Err(std::io::Error::new(
                        std::io::ErrorKind::BrokenPipe,
                        "sftp worker thread gone",
                    )))
                }
            };
        }

        let (resp_tx, mut resp_rx) = oneshot::channel();
        if this
            .cmd_tx
            .send(WriteCmd::Write(buf.to_vec(), resp_tx))
            .is_err()
        {
            return Poll::Ready(Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "sftp worker thread gone",
            )));
        }
        match Pin::new(&mut resp_rx).poll(cx) {
            Poll::Pending => {
                this.pending = Some(resp_rx);
                Poll::Pending
            }
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "sftp worker thread gone",
            ))),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[async_trait::async_trait]
impl ClosableWrite for SshWriter {
    async fn close(&mut self) -> Result<(), S3Error> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let (resp_tx, resp_rx) = oneshot::channel();
        if self.cmd_tx.send(WriteCmd::Close(resp_tx)).is_err() {
            return Ok(());
        }
        match resp_rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(S3Error::from(e).into_transport("ssh")),
            Err(_) => Ok(()),
        }
    }
}
