//! Parallel bucket iterator.
//!
//! Three-stage pipeline connected by bounded `flume` channels, the same
//! backpressure pattern `backends::s3::S3Client::put_stream_with` uses for
//! its reader-to-writer handoff, generalized here to lister → downloaders →
//! collector. The lister pages through `ListObjects`, the downloaders pull
//! keys off a shared queue and fetch bodies with retry/backoff, and the
//! caller drives the collector by polling the returned stream.

use crate::backends::s3::S3Client;
use crate::error::S3Error;
use futures_util::future::BoxFuture;
use futures_util::Stream;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const DEFAULT_WORKERS: usize = 16;
const DEFAULT_RETRIES: u32 = 3;
const BACKOFF_BASE_SECS: u64 = 1;
const BACKOFF_CAP_SECS: u64 = 32;

/// A predicate deciding whether a listed key should enter the download
/// queue. Rejected keys are never downloaded and never appear in the
/// output.
pub type AcceptKey = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Knobs for [`iter_bucket`]; mirrors the `workers=16, retries=3` defaults.
pub struct BucketIterOptions {
    pub prefix: String,
    pub accept_key: Option<AcceptKey>,
    pub key_limit: Option<usize>,
    pub workers: usize,
    pub retries: u32,
}

impl Default for BucketIterOptions {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            accept_key: None,
            key_limit: None,
            workers: DEFAULT_WORKERS,
            retries: DEFAULT_RETRIES,
        }
    }
}

/// One result slot: the key, paired with its body or the error every retry
/// ultimately failed with.
pub type BucketItem = (String, Result<Vec<u8>, S3Error>);

/// Lazy, unordered sequence of `(key, body)` produced by [`iter_bucket`].
///
/// Dropping this before it's exhausted drops the result receiver; the
/// lister and downloader tasks observe their senders failing on the next
/// send and exit within one in-flight request, same as letting it run to
/// completion.
pub struct BucketIter {
    rx: flume::Receiver<BucketItem>,
    pending: Option<BoxFuture<'static, Result<BucketItem, flume::RecvError>>>,
    _lister: JoinHandle<()>,
    _downloaders: Vec<JoinHandle<()>>,
}

impl Stream for BucketIter {
    type Item = BucketItem;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let fut = this.pending.get_or_insert_with(|| {
            let rx = this.rx.clone();
            Box::pin(async move { rx.recv_async().await })
        });
        match fut.as_mut().poll(cx) {
            Poll::Ready(result) => {
                this.pending = None;
                Poll::Ready(result.ok())
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Starts the lister, `options.workers` downloaders, and returns the
/// collector-facing stream. Queue capacity is `2 * workers`; there is no
/// cross-key ordering guarantee, but every accepted key is yielded or
/// reported exactly once.
pub fn iter_bucket(client: S3Client, options: BucketIterOptions) -> BucketIter {
    let workers = options.workers.max(1);
    let capacity = 2 * workers;

    let (key_tx, key_rx) = flume::bounded::<String>(capacity);
    let (result_tx, result_rx) = flume::bounded::<BucketItem>(capacity);

    let lister = tokio::spawn(run_lister(
        client.clone(),
        options.prefix,
        options.accept_key,
        options.key_limit,
        key_tx,
    ));

    let downloaders = (0..workers)
        .map(|id| {
            tokio::spawn(run_downloader(
                id,
                client.clone(),
                key_rx.clone(),
                result_tx.clone(),
                options.retries,
            ))
        })
        .collect();

    BucketIter {
        rx: result_rx,
        pending: None,
        _lister: lister,
        _downloaders: downloaders,
    }
}

async fn run_lister(
    client: S3Client,
    prefix: String,
    accept_key: Option<AcceptKey>,
    key_limit: Option<usize>,
    key_tx: flume::Sender<String>,
) {
    let mut continuation_token = None;
    let mut pushed = 0usize;

    loop {
        if key_limit.is_some_and(|limit| pushed >= limit) {
            break;
        }

        let page = match client
            .list_page(&prefix, None, continuation_token.clone(), None, None)
            .await
        {
            Ok(page) => page,
            Err(err) => {
                warn!("bucket listing failed: {err}");
                break;
            }
        };

        for object in page.contents {
            if key_limit.is_some_and(|limit| pushed >= limit) {
                break;
            }
            if accept_key.as_ref().is_some_and(|accept| !accept(&object.key)) {
                continue;
            }
            if key_tx.send_async(object.key).await.is_err() {
                // Collector dropped the iterator; no one is listening anymore.
                return;
            }
            pushed += 1;
        }

        continuation_token = page.next_continuation_token;
        if continuation_token.is_none() {
            break;
        }
    }

    debug!("bucket lister finished after pushing {pushed} key(s)");
}

async fn run_downloader(
    id: usize,
    client: S3Client,
    key_rx: flume::Receiver<String>,
    result_tx: flume::Sender<BucketItem>,
    retries: u32,
) {
    while let Ok(key) = key_rx.recv_async().await {
        let outcome = download_with_retry(&client, &key, retries).await;
        if result_tx.send_async((key, outcome)).await.is_err() {
            debug!("downloader {id} exiting, collector gone");
            return;
        }
    }
}

async fn download_with_retry(
    client: &S3Client,
    key: &str,
    retries: u32,
) -> Result<Vec<u8>, S3Error> {
    let mut attempt = 0;
    loop {
        match fetch(client, key).await {
            Ok(bytes) => return Ok(bytes),
            Err(err) if attempt < retries => {
                let backoff = backoff_for(attempt);
                warn!(
                    "download of '{key}' failed (attempt {}/{}), retrying in {:?}: {err}",
                    attempt + 1,
                    retries,
                    backoff
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

async fn fetch(client: &S3Client, key: &str) -> Result<Vec<u8>, S3Error> {
    let res = client.get(key).await?;
    let bytes = res.bytes().await?;
    Ok(bytes.to_vec())
}

fn backoff_for(attempt: u32) -> Duration {
    let secs = BACKOFF_BASE_SECS.saturating_mul(1u64 << attempt.min(5));
    Duration::from_secs(secs.min(BACKOFF_CAP_SECS))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        assert_eq!(backoff_for(0), Duration::from_secs(1));
        assert_eq!(backoff_for(1), Duration::from_secs(2));
        assert_eq!(backoff_for(2), Duration::from_secs(4));
        assert_eq!(backoff_for(5), Duration::from_secs(32));
        assert_eq!(backoff_for(10), Duration::from_secs(32));
    }

    #[test]
    fn options_default_matches_documented_defaults() {
        let opts = BucketIterOptions::default();
        assert_eq!(opts.workers, 16);
        assert_eq!(opts.retries, 3);
        assert!(opts.key_limit.is_none());
    }
}
