//! Location parsing: turns a URI-ish string into a tagged [`Location`] the
//! dispatcher (`crate::dispatch`) uses to select a backend.

use crate::error::S3Error;
use std::fmt;

/// A parsed location, tagged by the backend that will serve it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Local {
        path: String,
    },
    Http {
        url: String,
    },
    Ssh {
        user: Option<String>,
        password: Option<String>,
        host: String,
        port: Option<u16>,
        path: String,
    },
    S3 {
        bucket: String,
        key: String,
        access_key: Option<String>,
        secret_key: Option<String>,
        endpoint_host: Option<String>,
        endpoint_port: Option<u16>,
        version_id: Option<String>,
    },
    Gcs {
        bucket: String,
        blob: String,
    },
    Hdfs {
        path: String,
    },
    WebHdfs {
        host: String,
        port: Option<u16>,
        path: String,
    },
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Local { path } => write!(f, "{path}"),
            Location::Http { url } => write!(f, "{url}"),
            Location::Ssh { host, path, .. } => write!(f, "ssh://{host}{path}"),
            Location::S3 { bucket, key, .. } => write!(f, "s3://{bucket}/{key}"),
            Location::Gcs { bucket, blob } => write!(f, "gs://{bucket}/{blob}"),
            Location::Hdfs { path } => write!(f, "hdfs://{path}"),
            Location::WebHdfs { host, path, .. } => write!(f, "webhdfs://{host}{path}"),
        }
    }
}

/// Parses `input` into a [`Location`].
///
/// Bypassing transport selection entirely (the caller handing in an
/// already-open stream) is handled one layer up, in `dispatch::open`,
/// since this function only ever sees strings.
pub fn parse(input: &str) -> Result<Location, S3Error> {
    let trimmed = input.trim_start();

    if let Some(rest) = trimmed.strip_prefix('~') {
        return Ok(Location::Local {
            path: expand_home(rest),
        });
    }

    match scheme_split(trimmed) {
        None => Ok(Location::Local {
            path: trimmed.to_string(),
        }),
        Some((scheme, body)) => match scheme.to_ascii_lowercase().as_str() {
            "file" => Ok(Location::Local {
                path: body.to_string(),
            }),
            "http" | "https" => Ok(Location::Http {
                url: trimmed.to_string(),
            }),
            "s3" | "s3a" | "s3n" | "s3u" => parse_s3(body),
            "gs" => parse_gcs(body),
            "hdfs" => Ok(Location::Hdfs {
                path: body.to_string(),
            }),
            "webhdfs" => parse_webhdfs(body),
            "ssh" | "scp" | "sftp" => parse_ssh(body),
            other => Err(S3Error::UnsupportedScheme(other.to_string())),
        },
    }
}

fn expand_home(rest: &str) -> String {
    let home = dirs::home_dir().map(|p| p.to_string_lossy().into_owned());
    match home {
        Some(home) => format!("{home}{rest}"),
        None => format!("~{rest}"),
    }
}

/// Splits `scheme://body` per the grammar
/// `[a-zA-Z][a-zA-Z0-9+.-]*://`. Returns `None` if no such scheme prefix
/// is present, in which case the caller treats the whole input as
/// `Local`.
fn scheme_split(input: &str) -> Option<(&str, &str)> {
    let sep = input.find("://")?;
    let scheme = &input[..sep];
    if scheme.is_empty() {
        return None;
    }
    let mut chars = scheme.chars();
    let first = chars.next()?;
    if !first.is_ascii_alphabetic() {
        return None;
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '.' || c == '-') {
        return None;
    }
    Some((scheme, &input[sep + 3..]))
}

/// `[access:secret@][host[:port]@]bucket/key`, `@` may appear up to
/// twice: once for credentials, once for the endpoint.
fn parse_s3(body: &str) -> Result<Location, S3Error> {
    let segments: Vec<&str> = body.split('@').collect();
    let (creds, endpoint, bucket_key) = match segments.as_slice() {
        [bucket_key] => (None, None, *bucket_key),
        [first, bucket_key] => {
            if let Some((left, right)) = first.split_once(':') {
                if right.parse::<u16>().is_ok() {
                    (None, Some(*first), *bucket_key)
                } else {
                    let _ = left;
                    (Some(*first), None, *bucket_key)
                }
            } else {
                (None, Some(*first), *bucket_key)
            }
        }
        [creds, endpoint, bucket_key] => (Some(*creds), Some(*endpoint), *bucket_key),
        _ => {
            return Err(S3Error::MalformedUri(
                "s3 uri has too many '@' separators".to_string(),
            ))
        }
    };

    let (access_key, secret_key) = match creds {
        Some(c) => {
            let (a, s) = c.split_once(':').ok_or_else(|| {
                S3Error::MalformedUri("s3 credentials must be 'access:secret'".to_string())
            })?;
            (Some(a.to_string()), Some(s.to_string()))
        }
        None => (None, None),
    };

    let (endpoint_host, endpoint_port) = match endpoint {
        Some(e) => match e.split_once(':') {
            Some((h, p)) => (
                Some(h.to_string()),
                Some(
                    p.parse::<u16>()
                        .map_err(|_| S3Error::MalformedUri(format!("invalid port '{p}'")))?,
                ),
            ),
            None => (Some(e.to_string()), None),
        },
        None => (None, None),
    };

    if bucket_key.is_empty() {
        return Err(S3Error::MalformedUri("s3 uri missing bucket".to_string()));
    }
    let (bucket, key) = match bucket_key.split_once('/') {
        Some((bucket, key)) => (bucket, key),
        None => (bucket_key, ""),
    };
    if bucket.is_empty() {
        return Err(S3Error::MalformedUri("s3 uri missing bucket".to_string()));
    }

    Ok(Location::S3 {
        bucket: bucket.to_string(),
        key: key.to_string(),
        access_key,
        secret_key,
        endpoint_host,
        endpoint_port,
        version_id: None,
    })
}

fn parse_gcs(body: &str) -> Result<Location, S3Error> {
    let (bucket, blob) = match body.split_once('/') {
        Some((bucket, blob)) => (bucket, blob),
        None => (body, ""),
    };
    if bucket.is_empty() {
        return Err(S3Error::MalformedUri("gs uri missing bucket".to_string()));
    }
    Ok(Location::Gcs {
        bucket: bucket.to_string(),
        blob: blob.to_string(),
    })
}

/// `host[:port]/path`, with no user/credentials segment.
fn parse_webhdfs(body: &str) -> Result<Location, S3Error> {
    let (authority, path) = match body.find('/') {
        Some(idx) => (&body[..idx], &body[idx..]),
        None => (body, "/"),
    };
    if authority.is_empty() {
        return Err(S3Error::MalformedUri(
            "webhdfs uri missing host".to_string(),
        ));
    }
    let (host, port) = match authority.split_once(':') {
        Some((h, p)) => (
            h.to_string(),
            Some(
                p.parse::<u16>()
                    .map_err(|_| S3Error::MalformedUri(format!("invalid port '{p}'")))?,
            ),
        ),
        None => (authority.to_string(), None),
    };
    Ok(Location::WebHdfs {
        host,
        port,
        path: path.to_string(),
    })
}

/// `[user[:pw]@]host[:port]/["/"]path`. A single leading `/` denotes a
/// path relative to the user's home; `//` denotes absolute.
fn parse_ssh(body: &str) -> Result<Location, S3Error> {
    let (userinfo, rest) = match body.find('@') {
        Some(idx) => (Some(&body[..idx]), &body[idx + 1..]),
        None => (None, body),
    };
    let (user, password) = match userinfo {
        Some(u) => match u.split_once(':') {
            Some((user, pw)) => (Some(user.to_string()), Some(pw.to_string())),
            None => (Some(u.to_string()), None),
        },
        None => (None, None),
    };

    let slash = rest
        .find('/')
        .ok_or_else(|| S3Error::MalformedUri("ssh uri missing path".to_string()))?;
    let authority = &rest[..slash];
    let path = &rest[slash..];
    if authority.is_empty() {
        return Err(S3Error::MalformedUri("ssh uri missing host".to_string()));
    }

    let (host, port) = match authority.split_once(':') {
        Some((h, p)) => (
            h.to_string(),
            Some(
                p.parse::<u16>()
                    .map_err(|_| S3Error::MalformedUri(format!("invalid port '{p}'")))?,
            ),
        ),
        None => (authority.to_string(), None),
    };

    Ok(Location::Ssh {
        user,
        password,
        host,
        port,
        path: path.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_path_with_no_scheme() {
        assert_eq!(
            parse("/var/log/messages").unwrap(),
            Location::Local {
                path: "/var/log/messages".to_string()
            }
        );
    }

    #[test]
    fn file_scheme_strips_to_local() {
        assert_eq!(
            parse("file:///tmp/foo.txt").unwrap(),
            Location::Local {
                path: "/tmp/foo.txt".to_string()
            }
        );
    }

    #[test]
    fn http_preserves_full_url() {
        assert_eq!(
            parse("https://example.com/a/b?x=1").unwrap(),
            Location::Http {
                url: "https://example.com/a/b?x=1".to_string()
            }
        );
    }

    #[test]
    fn s3_bucket_and_key_only() {
        let loc = parse("s3://mybucket/path/to/obj").unwrap();
        assert_eq!(
            loc,
            Location::S3 {
                bucket: "mybucket".to_string(),
                key: "path/to/obj".to_string(),
                access_key: None,
                secret_key: None,
                endpoint_host: None,
                endpoint_port: None,
                version_id: None,
            }
        );
    }

    #[test]
    fn s3_credentials_and_endpoint() {
        let loc = parse("s3://AK:SK@host.example:9000@mybucket/path/to/obj").unwrap();
        assert_eq!(
            loc,
            Location::S3 {
                bucket: "mybucket".to_string(),
                key: "path/to/obj".to_string(),
                access_key: Some("AK".to_string()),
                secret_key: Some("SK".to_string()),
                endpoint_host: Some("host.example".to_string()),
                endpoint_port: Some(9000),
                version_id: None,
            }
        );
    }

    #[test]
    fn s3_aliases_behave_identically() {
        for scheme in ["s3", "s3a", "s3n", "s3u"] {
            let loc = parse(&format!("{scheme}://bucket/key")).unwrap();
            assert!(matches!(loc, Location::S3 { bucket, key, .. }
                if bucket == "bucket" && key == "key"));
        }
    }

    #[test]
    fn ssh_absolute_vs_home_relative_path() {
        let absolute = parse("ssh://user@host.example//srv/data/file").unwrap();
        assert_eq!(
            absolute,
            Location::Ssh {
                user: Some("user".to_string()),
                password: None,
                host: "host.example".to_string(),
                port: None,
                path: "/srv/data/file".to_string(),
            }
        );

        let relative = parse("ssh://user@host.example/relative/file").unwrap();
        assert_eq!(
            relative,
            Location::Ssh {
                user: Some("user".to_string()),
                password: None,
                host: "host.example".to_string(),
                port: None,
                path: "/relative/file".to_string(),
            }
        );
    }

    #[test]
    fn webhdfs_host_port_path() {
        let loc = parse("webhdfs://namenode:50070/user/alice/file").unwrap();
        assert_eq!(
            loc,
            Location::WebHdfs {
                host: "namenode".to_string(),
                port: Some(50070),
                path: "/user/alice/file".to_string(),
            }
        );
    }

    #[test]
    fn gcs_bucket_and_blob() {
        let loc = parse("gs://my-bucket/some/blob.json").unwrap();
        assert_eq!(
            loc,
            Location::Gcs {
                bucket: "my-bucket".to_string(),
                blob: "some/blob.json".to_string(),
            }
        );
    }

    #[test]
    fn unsupported_scheme_is_an_error() {
        let err = parse("ftp://host/path").unwrap_err();
        assert!(matches!(err, S3Error::UnsupportedScheme(s) if s == "ftp"));
    }

    #[test]
    fn s3_missing_bucket_is_malformed() {
        let err = parse("s3://").unwrap_err();
        assert!(matches!(err, S3Error::MalformedUri(_)));
    }
}
