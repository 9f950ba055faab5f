//! The `open()` entry point: parses a location, selects a backend, and
//! layers compression/text wrapping on top, the way `Bucket::get`/
//! `Bucket::put_stream` compose request building with response handling,
//! generalized across every backend instead of just S3.

use crate::backends::gcs::{GcsReader, GcsWriter};
use crate::backends::hdfs::{HdfsReader, HdfsWriter};
use crate::backends::http::HttpReader;
use crate::backends::local;
use crate::backends::s3::reader::S3Reader;
use crate::backends::s3::writer::S3Writer;
use crate::backends::s3::{S3Client, S3ClientOptions};
use crate::backends::ssh::{SshReader, SshWriter};
use crate::backends::webhdfs::{WebHdfsReader, WebHdfsWriter};
use crate::backends::{ClosableWrite, InputStream, SeekableAsyncRead};
use crate::compression;
use crate::credentials::{BasicAuth, Credentials, SshCredentials};
use crate::error::S3Error;
use crate::text::{TextReader, TextWriter};
use crate::transport_params::TransportParams;
use crate::uri::{self, Location};
use crate::Region;
use std::env;
use tokio::io::AsyncRead;
use tracing::warn;

/// The direction half of a [`Mode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
    Append,
}

/// `(direction, text)`, parsed from the familiar `"rb"`, `"wt"`,
/// `"a"`-style mode strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mode {
    pub direction: Direction,
    pub text: bool,
}

impl Mode {
    /// Accepts `r`/`w`/`a` optionally followed by `b` (binary, the
    /// default) or `t` (text). Anything else is `InvalidMode`.
    pub fn parse(spec: &str) -> Result<Self, S3Error> {
        let mut chars = spec.chars();
        let direction = match chars.next() {
            Some('r') => Direction::Read,
            Some('w') => Direction::Write,
            Some('a') => Direction::Append,
            _ => return Err(S3Error::InvalidMode(format!("unrecognized mode '{spec}'"))),
        };
        let rest: String = chars.collect();
        let text = match rest.as_str() {
            "" | "b" => false,
            "t" => true,
            _ => {
                return Err(S3Error::InvalidMode(format!(
                    "unrecognized mode suffix in '{spec}'"
                )))
            }
        };
        Ok(Self { direction, text })
    }
}

/// Options beyond `(uri, mode)`: `ignore_ext`, `encoding`/`errors`/
/// `newline`, and `transport_params`.
#[derive(Debug, Default)]
pub struct OpenOptions {
    pub ignore_ext: bool,
    pub encoding: Option<String>,
    pub errors: Option<String>,
    pub newline: Option<String>,
    pub transport_params: TransportParams,
}

/// What gets passed to `open()`: a location string, or an already-open
/// stream that bypasses transport selection entirely.
pub enum OpenInput {
    Uri(String),
    Read(Box<dyn AsyncRead + Send + Unpin>),
    Write(Box<dyn ClosableWrite>),
}

impl From<&str> for OpenInput {
    fn from(s: &str) -> Self {
        OpenInput::Uri(s.to_string())
    }
}

impl From<String> for OpenInput {
    fn from(s: String) -> Self {
        OpenInput::Uri(s)
    }
}

/// The stream `open()` hands back. Closing it closes every layer
/// underneath, bottom-up.
///
/// `ReadSeek` is kept distinct from `Read` rather than folding seek
/// support into one trait object: an uncompressed, binary-mode open of a
/// backend that natively supports it (local files, `S3Reader`,
/// `HttpReader`, `SshReader`) stays seekable all the way out to the
/// caller, matching `InputStream::Seekable` one layer down
/// (`backends::InputStream`). Wrapping in a codec or the text layer loses
/// seekability, same as `InputStream::into_forward` does internally.
pub enum Stream {
    Read(Box<dyn AsyncRead + Send + Unpin>),
    ReadSeek(Box<dyn SeekableAsyncRead>),
    Write(Box<dyn ClosableWrite>),
}

impl Stream {
    /// Unwraps a read-mode stream, or `InvalidMode` if `open()` was
    /// called for writing. Drops seekability if the stream had it; use
    /// [`Stream::into_seekable_read`] to keep it.
    pub fn into_read(self) -> Result<Box<dyn AsyncRead + Send + Unpin>, S3Error> {
        match self {
            Stream::Read(r) => Ok(r),
            Stream::ReadSeek(r) => Ok(InputStream::Seekable(r).into_forward()),
            Stream::Write(_) => Err(S3Error::InvalidMode(
                "stream was opened for writing, not reading".to_string(),
            )),
        }
    }

    /// Unwraps a read-mode stream that is seekable, or `InvalidMode` if
    /// `open()` returned a non-seekable read stream (compressed, text,
    /// or a backend without native seek support) or a write stream.
    pub fn into_seekable_read(self) -> Result<Box<dyn SeekableAsyncRead>, S3Error> {
        match self {
            Stream::ReadSeek(r) => Ok(r),
            Stream::Read(_) => Err(S3Error::InvalidMode(
                "stream is not seekable: compressed, text-wrapped, or the backend has no native seek support".to_string(),
            )),
            Stream::Write(_) => Err(S3Error::InvalidMode(
                "stream was opened for writing, not reading".to_string(),
            )),
        }
    }

    /// Unwraps a write-mode stream, or `InvalidMode` if `open()` was
    /// called for reading.
    pub fn into_write(self) -> Result<Box<dyn ClosableWrite>, S3Error> {
        match self {
            Stream::Write(w) => Ok(w),
            Stream::Read(_) | Stream::ReadSeek(_) => Err(S3Error::InvalidMode(
                "stream was opened for reading, not writing".to_string(),
            )),
        }
    }
}

enum RawStream {
    Read(InputStream, Option<String>),
    Write(Box<dyn ClosableWrite>, Option<String>),
}

#[tracing::instrument(level = "debug", skip(options), fields(mode = %mode))]
pub async fn open(
    uri: impl Into<OpenInput>,
    mode: &str,
    options: OpenOptions,
) -> Result<Stream, S3Error> {
    let mode = Mode::parse(mode)?;
    let input = uri.into();

    let raw = match input {
        OpenInput::Read(r) => {
            if mode.direction != Direction::Read {
                return Err(S3Error::InvalidMode(
                    "an already-open read stream was passed for a non-read mode".to_string(),
                ));
            }
            RawStream::Read(InputStream::Forward(r), None)
        }
        OpenInput::Write(w) => {
            if mode.direction == Direction::Read {
                return Err(S3Error::InvalidMode(
                    "an already-open write stream was passed for read mode".to_string(),
                ));
            }
            RawStream::Write(w, None)
        }
        OpenInput::Uri(s) => {
            let location = uri::parse(&s)?;
            warn_on_irrelevant_params(&location, &options.transport_params);
            let path = location_path(&location).map(str::to_string);
            let raw = open_backend(location, mode.direction, &options.transport_params).await?;
            match raw {
                RawStream::Read(s, _) => RawStream::Read(s, path),
                RawStream::Write(s, _) => RawStream::Write(s, path),
            }
        }
    };

    let codec = match &raw {
        _ if options.ignore_ext => None,
        RawStream::Read(_, Some(path)) | RawStream::Write(_, Some(path)) => {
            compression::strip_compression_suffix(path).1
        }
        _ => None,
    };

    let stream = match raw {
        RawStream::Read(input_stream, _) => {
            // Neither a codec nor the text layer can seek (decoders and
            // re-encoders consume the stream sequentially), so only in
            // their absence does seekability survive out to the caller.
            if codec.is_none() && !mode.text {
                match input_stream {
                    InputStream::Seekable(s) => Stream::ReadSeek(s),
                    InputStream::Forward(s) => Stream::Read(s),
                }
            } else {
                let mut reader: Box<dyn AsyncRead + Send + Unpin> = input_stream.into_forward();
                if let Some(codec) = codec {
                    reader = codec.wrap_read(reader);
                }
                if mode.text {
                    let r = TextReader::new(
                        reader,
                        options.encoding.as_deref(),
                        options.errors.as_deref(),
                        options.newline.as_deref(),
                    )?;
                    Stream::Read(Box::new(r))
                } else {
                    Stream::Read(reader)
                }
            }
        }
        RawStream::Write(writer, _) => {
            let mut writer: Box<dyn ClosableWrite> = writer;
            if let Some(codec) = codec {
                writer = codec.wrap_write(writer);
            }
            if mode.text {
                let w = TextWriter::new(writer, options.encoding.as_deref(), options.newline.as_deref())?;
                Stream::Write(Box::new(w))
            } else {
                Stream::Write(writer)
            }
        }
    };

    Ok(stream)
}

fn location_path(location: &Location) -> Option<&str> {
    match location {
        Location::Local { path } => Some(path),
        Location::Http { url } => Some(url),
        Location::Ssh { path, .. } => Some(path),
        Location::S3 { key, .. } => Some(key),
        Location::Gcs { blob, .. } => Some(blob),
        Location::Hdfs { path } => Some(path),
        Location::WebHdfs { path, .. } => Some(path),
    }
}

/// Warns when a `transport_params` substruct is set for a backend other
/// than the one the location selected.
fn warn_on_irrelevant_params(location: &Location, params: &TransportParams) {
    let selected = match location {
        Location::Local { .. } => "local",
        Location::Http { .. } => "http",
        Location::Ssh { .. } => "ssh",
        Location::S3 { .. } => "s3",
        Location::Gcs { .. } => "gcs",
        Location::Hdfs { .. } => "hdfs",
        Location::WebHdfs { .. } => "webhdfs",
    };
    if selected != "s3" && params.s3.is_some() {
        warn!(selected, "transport_params.s3 set but s3 backend was not selected; discarding");
    }
    if selected != "http" && params.http.is_some() {
        warn!(selected, "transport_params.http set but http backend was not selected; discarding");
    }
    if selected != "ssh" && params.ssh.is_some() {
        warn!(selected, "transport_params.ssh set but ssh backend was not selected; discarding");
    }
    if selected != "webhdfs" && params.webhdfs.is_some() {
        warn!(selected, "transport_params.webhdfs set but webhdfs backend was not selected; discarding");
    }
    if selected != "gcs" && params.gcs.is_some() {
        warn!(selected, "transport_params.gcs set but gcs backend was not selected; discarding");
    }
}

async fn open_backend(
    location: Location,
    direction: Direction,
    params: &TransportParams,
) -> Result<RawStream, S3Error> {
    match location {
        Location::Local { path } => match direction {
            Direction::Read => {
                let file = local::open_read(&path).await?;
                Ok(RawStream::Read(InputStream::Seekable(Box::new(file)), None))
            }
            Direction::Write => {
                let w = local::open_write(&path, false).await?;
                Ok(RawStream::Write(Box::new(w), None))
            }
            Direction::Append => {
                let w = local::open_write(&path, true).await?;
                Ok(RawStream::Write(Box::new(w), None))
            }
        },

        Location::Http { url } => {
            if direction != Direction::Read {
                return Err(S3Error::InvalidMode(
                    "the http backend is read-only".to_string(),
                ));
            }
            let http_params = params.http.clone().unwrap_or_default();
            if http_params.kerberos {
                warn!("kerberos negotiation requested but not implemented; proceeding without it");
            }
            let auth = match (&http_params.user, &http_params.password) {
                (Some(user), Some(password)) => Some(BasicAuth {
                    user: user.clone(),
                    password: password.clone(),
                }),
                _ => None,
            };
            let reader = HttpReader::open(url, auth, http_params.headers).await?;
            Ok(RawStream::Read(InputStream::Seekable(Box::new(reader)), None))
        }

        Location::Ssh {
            user,
            password,
            host,
            port,
            path,
        } => {
            let ssh_params = params.ssh.clone().unwrap_or_default();
            let user = user
                .or(ssh_params.user.clone())
                .ok_or_else(|| S3Error::Credentials("ssh uri/transport_params missing user".to_string()))?;
            let creds = SshCredentials {
                user,
                password: password.or(ssh_params.password.clone()),
                private_key: ssh_params.private_key.clone(),
                private_key_passphrase: ssh_params.private_key_passphrase.clone(),
            };
            let port = port.or(ssh_params.port);

            match direction {
                Direction::Read => {
                    let reader = SshReader::open(host, port, creds, path).await?;
                    Ok(RawStream::Read(InputStream::Seekable(Box::new(reader)), None))
                }
                Direction::Write | Direction::Append => {
                    if direction == Direction::Append {
                        warn!("ssh backend has no native append mode; opening for write");
                    }
                    let writer = SshWriter::open(host, port, creds, path).await?;
                    Ok(RawStream::Write(Box::new(writer), None))
                }
            }
        }

        Location::S3 {
            bucket,
            key,
            access_key,
            secret_key,
            endpoint_host,
            endpoint_port,
            version_id: _,
        } => {
            let s3_params = params.s3.clone().unwrap_or_default();
            let credentials = match (access_key, secret_key) {
                (Some(a), Some(s)) => Credentials::new(a, s),
                _ => match s3_params.credentials.clone() {
                    Some(c) => c,
                    None => Credentials::try_from_env()?,
                },
            };
            let region = match &s3_params.region {
                Some(r) => Region::new(r.clone()),
                None => Region::try_from_env()?,
            };
            let host = match endpoint_host {
                Some(host) => {
                    let url = match endpoint_port {
                        Some(port) => format!("https://{host}:{port}"),
                        None => format!("https://{host}"),
                    };
                    url.parse::<url::Url>()?
                }
                None => env::var("S3_URL")?.parse::<url::Url>()?,
            };
            let options = S3ClientOptions {
                path_style: s3_params.path_style.unwrap_or_else(|| {
                    env::var("S3_PATH_STYLE")
                        .map(|v| v == "true")
                        .unwrap_or(false)
                }),
                list_objects_v2: true,
            };
            let client = S3Client::new(host, bucket, region, credentials, Some(options))?;

            match direction {
                Direction::Read => {
                    if key.is_empty() {
                        return Err(S3Error::MalformedUri(
                            "s3 read requires a non-empty key".to_string(),
                        ));
                    }
                    let reader = S3Reader::open(client, key).await?;
                    Ok(RawStream::Read(InputStream::Seekable(Box::new(reader)), None))
                }
                Direction::Write | Direction::Append => {
                    if direction == Direction::Append {
                        return Err(S3Error::InvalidMode(
                            "s3 objects cannot be opened in append mode".to_string(),
                        ));
                    }
                    let writer = S3Writer::open(
                        client,
                        key,
                        s3_params.min_part_size,
                        s3_params.multipart_upload.unwrap_or(true),
                    )?;
                    Ok(RawStream::Write(Box::new(writer), None))
                }
            }
        }

        Location::Gcs { bucket, blob } => {
            let gcs_params = params.gcs.clone().unwrap_or_default();
            let token = gcs_params.token.clone().ok_or_else(|| {
                S3Error::Credentials("gcs requires a bearer token via transport_params".to_string())
            })?;
            match direction {
                Direction::Read => {
                    let reader = GcsReader::open(bucket, blob, &token).await?;
                    Ok(RawStream::Read(InputStream::Forward(Box::new(reader)), None))
                }
                Direction::Write | Direction::Append => {
                    if direction == Direction::Append {
                        return Err(S3Error::InvalidMode(
                            "gcs objects cannot be opened in append mode".to_string(),
                        ));
                    }
                    let writer = GcsWriter::new(bucket, blob, token);
                    Ok(RawStream::Write(Box::new(writer), None))
                }
            }
        }

        Location::Hdfs { path } => match direction {
            Direction::Read => {
                let reader = HdfsReader::open(path).await?;
                Ok(RawStream::Read(InputStream::Forward(Box::new(reader)), None))
            }
            Direction::Write => {
                let writer = HdfsWriter::open(path, false).await?;
                Ok(RawStream::Write(Box::new(writer), None))
            }
            Direction::Append => {
                let writer = HdfsWriter::open(path, true).await?;
                Ok(RawStream::Write(Box::new(writer), None))
            }
        },

        Location::WebHdfs { host, port, path } => {
            let webhdfs_params = params.webhdfs.clone().unwrap_or_default();
            match direction {
                Direction::Read => {
                    let reader =
                        WebHdfsReader::open(host, port, path, webhdfs_params.user).await?;
                    Ok(RawStream::Read(InputStream::Forward(Box::new(reader)), None))
                }
                Direction::Write | Direction::Append => {
                    if direction == Direction::Append {
                        warn!("webhdfs append mode always starts a fresh create/append sequence");
                    }
                    let writer = WebHdfsWriter::new(
                        host,
                        port,
                        path,
                        webhdfs_params.user,
                        webhdfs_params.min_part_size,
                    );
                    Ok(RawStream::Write(Box::new(writer), None))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_parsing_covers_direction_and_text() {
        assert_eq!(
            Mode::parse("rb").unwrap(),
            Mode {
                direction: Direction::Read,
                text: false
            }
        );
        assert_eq!(
            Mode::parse("wt").unwrap(),
            Mode {
                direction: Direction::Write,
                text: true
            }
        );
        assert_eq!(
            Mode::parse("a").unwrap(),
            Mode {
                direction: Direction::Append,
                text: false
            }
        );
        assert!(Mode::parse("x").is_err());
        assert!(Mode::parse("rx").is_err());
    }

    #[tokio::test]
    async fn uncompressed_binary_open_stays_seekable() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("dispatch_seek_test_{}", std::process::id()));
        tokio::fs::write(&path, b"hello seekable world").await.unwrap();

        let stream = open(path.to_string_lossy().to_string(), "rb", OpenOptions::default())
            .await
            .unwrap();
        assert!(matches!(stream, Stream::ReadSeek(_)));
        stream.into_seekable_read().unwrap();

        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn gz_open_loses_seekability() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("dispatch_seek_test_{}.gz", std::process::id()));
        // gzip magic header is enough; the stream is never actually read here.
        tokio::fs::write(&path, [0x1f, 0x8b, 0x08, 0x00]).await.unwrap();

        let stream = open(path.to_string_lossy().to_string(), "rb", OpenOptions::default())
            .await
            .unwrap();
        assert!(matches!(stream, Stream::Read(_)));
        assert!(stream.into_seekable_read().is_err());

        let _ = tokio::fs::remove_file(&path).await;
    }
}
