use thiserror::Error;

/// Errors surfaced by every layer of the crate: URI parsing, transport
/// selection, backend I/O, and the compression pipeline.
#[derive(Error, Debug)]
pub enum S3Error {
    #[error("malformed uri '{0}'")]
    MalformedUri(String),

    #[error("unsupported scheme '{0}'")]
    UnsupportedScheme(String),

    #[error("{backend}: {cause}")]
    TransportError {
        backend: &'static str,
        cause: Box<S3Error>,
    },

    #[error("invalid mode: {0}")]
    InvalidMode(String),

    #[error("limit exceeded: {0}")]
    LimitExceeded(String),

    #[error("credentials: {0}")]
    Credentials(String),
    #[error("env var missing: {0}")]
    EnvVarMissing(#[from] std::env::VarError),
    #[error("fmt error: {0}")]
    FmtError(#[from] std::fmt::Error),
    #[error("from utf8: {0}")]
    FromUtf8(#[from] std::string::FromUtf8Error),
    #[error("header to string: {0}")]
    HeaderToStr(#[from] http::header::ToStrError),
    #[error("sha2 invalid length: {0}")]
    HmacInvalidLength(#[from] sha2::digest::InvalidLength),
    #[error("S3_HOST must have a domain and not IP: '{0}'")]
    HostDomain(&'static str),
    #[error("Http request returned a non 2** code")]
    HttpFail,
    #[error("Got HTTP {0} with content '{1}'")]
    HttpFailWithBody(u16, String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("http: {0}")]
    Http(#[from] http::Error),
    #[error("invalid header name: {0}")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),
    #[error("invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),
    #[error("tokio task join: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("request: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("serde xml: {0}")]
    SerdeXml(#[from] quick_xml::de::DeError),
    #[error("Time format error: {0}")]
    TimeFormatError(#[from] time::error::Format),
    #[error("url parse: {0}")]
    UrlParse(#[from] url::ParseError),
    #[error("Utf8 decoding error: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("range: {0}")]
    Range(&'static str),
    #[error("unexpected response: {0}")]
    UnexpectedResponse(&'static str),
    #[error("ssh: {0}")]
    Ssh(String),
    #[error("{0}")]
    Backend(String),
}

impl S3Error {
    /// Wraps `self` as a `TransportError` carrying the backend identifier,
    /// the shape every backend converts its low-level failures into before
    /// handing them to the caller.
    pub fn into_transport(self, backend: &'static str) -> S3Error {
        match self {
            already @ S3Error::TransportError { .. } => already,
            other => S3Error::TransportError {
                backend,
                cause: Box::new(other),
            },
        }
    }
}
