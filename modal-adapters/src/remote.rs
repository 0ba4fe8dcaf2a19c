//! Remote downloads and presigned uploads.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use hyper::header::{CONTENT_LENGTH, CONTENT_TYPE};
use hyper::{Body, Request, StatusCode, Uri};
use thiserror::Error;
use tokio::time::timeout;
use tracing::debug;

use crate::http_client::{HyperClient, LimitedBody, build_https_client, read_limited};

/// Failures while moving bytes to or from a remote URL.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransferError {
    /// The URL could not be parsed.
    #[error("invalid URL `{url}`")]
    InvalidUrl {
        /// Offending URL.
        url: String,
    },

    /// The body exceeded the byte ceiling.
    #[error("remote payload exceeds the {limit} byte limit")]
    TooLarge {
        /// Ceiling that was exceeded.
        limit: u64,
    },

    /// The server answered with a non-success status.
    #[error("remote server returned {status}")]
    Status {
        /// HTTP status code.
        status: u16,
    },

    /// Network or protocol failure.
    #[error("remote transfer failed: {reason}")]
    Transport {
        /// Additional context.
        reason: String,
    },

    /// The transfer did not finish in time.
    #[error("remote transfer timed out after {after:?}")]
    Timeout {
        /// Timeout that elapsed.
        after: Duration,
    },
}

/// Moves bytes between the host and remote URLs.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Downloads `url`, failing once more than `limit` bytes arrive.
    async fn fetch(&self, url: &str, limit: u64) -> Result<Bytes, TransferError>;

    /// Uploads `data` to a presigned `url` with a single `PUT`.
    async fn upload(&self, url: &str, data: Bytes, content_type: &str)
    -> Result<(), TransferError>;
}

/// [`RemoteStore`] backed by the shared hyper client.
#[derive(Clone)]
pub struct HttpRemoteStore {
    client: HyperClient,
    timeout: Duration,
}

impl fmt::Debug for HttpRemoteStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpRemoteStore")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl HttpRemoteStore {
    /// Creates a store applying `timeout` to each transfer.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: build_https_client(),
            timeout,
        }
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn fetch(&self, url: &str, limit: u64) -> Result<Bytes, TransferError> {
        download(&self.client, self.timeout, url, limit).await
    }

    async fn upload(
        &self,
        url: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<(), TransferError> {
        let uri = parse_uri(url)?;
        let length = data.len();
        let request = Request::put(uri)
            .header(CONTENT_TYPE, content_type)
            .header(CONTENT_LENGTH, length)
            .body(Body::from(data))
            .map_err(|err| TransferError::Transport {
                reason: err.to_string(),
            })?;

        let response = timeout(self.timeout, self.client.request(request))
            .await
            .map_err(|_| TransferError::Timeout { after: self.timeout })?
            .map_err(|err| TransferError::Transport {
                reason: err.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransferError::Status {
                status: status.as_u16(),
            });
        }
        debug!(bytes = length, "presigned upload completed");
        Ok(())
    }
}

/// Downloads `url` with the given client, enforcing `limit` while streaming.
pub(crate) async fn download(
    client: &HyperClient,
    after: Duration,
    url: &str,
    limit: u64,
) -> Result<Bytes, TransferError> {
    let uri = parse_uri(url)?;
    let transfer = async {
        let response = client
            .get(uri)
            .await
            .map_err(|err| TransferError::Transport {
                reason: err.to_string(),
            })?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(TransferError::Status {
                status: status.as_u16(),
            });
        }

        match read_limited(response.into_body(), limit).await {
            Ok(LimitedBody::Complete(bytes)) => Ok(Bytes::from(bytes)),
            Ok(LimitedBody::TooLarge) => Err(TransferError::TooLarge { limit }),
            Err(err) => Err(TransferError::Transport {
                reason: err.to_string(),
            }),
        }
    };

    let bytes = timeout(after, transfer)
        .await
        .map_err(|_| TransferError::Timeout { after })??;
    debug!(bytes = bytes.len(), "remote download completed");
    Ok(bytes)
}

fn parse_uri(url: &str) -> Result<Uri, TransferError> {
    url.parse::<Uri>().map_err(|_| TransferError::InvalidUrl {
        url: url.to_owned(),
    })
}
