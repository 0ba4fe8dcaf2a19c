//! Reads and atomic writes behind authorized resource handles.

use std::fmt;
use std::io::{ErrorKind, Write};
use std::sync::Arc;

use bytes::Bytes;
use modal_adapters::remote::{RemoteStore, TransferError};
use modal_policy::{AccessMode, ResourceLocation, ResourceRef};
use modal_primitives::{HostError, MediaFormat, Result};
use tempfile::NamedTempFile;
use tracing::debug;

/// Moves bytes through [`ResourceRef`]s minted by the gatekeeper.
#[derive(Clone)]
pub struct ResourceIo {
    remote: Arc<dyn RemoteStore>,
}

impl fmt::Debug for ResourceIo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceIo").finish_non_exhaustive()
    }
}

impl ResourceIo {
    /// Creates the I/O layer using `remote` for URL references.
    #[must_use]
    pub fn new(remote: Arc<dyn RemoteStore>) -> Self {
        Self { remote }
    }

    /// Reads the full content of an authorized read handle.
    ///
    /// # Errors
    ///
    /// Returns `PAYLOAD_TOO_LARGE` once the content exceeds the handle's
    /// byte limit, `INVALID_ARGUMENT` for write handles, and the translated
    /// I/O or transfer failure otherwise.
    pub async fn read(&self, resource: &ResourceRef) -> Result<Bytes> {
        if resource.mode() != AccessMode::Read {
            return Err(HostError::invalid_argument(format!(
                "`{}` was not authorized for reading",
                resource.reference()
            )));
        }
        let limit = resource.byte_limit();
        let bytes = match resource.location() {
            ResourceLocation::Local(path) => Bytes::from(tokio::fs::read(path).await?),
            ResourceLocation::Remote(url) => self
                .remote
                .fetch(url, limit)
                .await
                .map_err(|err| map_transfer_error(&err, url))?,
        };
        if bytes.len() as u64 > limit {
            return Err(too_large(resource.reference(), limit));
        }
        debug!(reference = resource.reference(), bytes = bytes.len(), "input loaded");
        Ok(bytes)
    }

    /// Writes `data` to an authorized write handle.
    ///
    /// Local targets are written to a temporary file in the target directory
    /// and renamed over the target, so readers never observe a partial file.
    /// Without `overwrite` the rename refuses to replace a file that appeared
    /// after authorization.
    ///
    /// # Errors
    ///
    /// Returns `PAYLOAD_TOO_LARGE` when `data` exceeds the handle's limit,
    /// `INVALID_ARGUMENT` for read handles, `ALREADY_EXISTS` when the target
    /// exists and `overwrite` is false, and the translated I/O or transfer
    /// failure otherwise.
    pub async fn write(
        &self,
        resource: &ResourceRef,
        data: Bytes,
        format: MediaFormat,
        overwrite: bool,
    ) -> Result<()> {
        if resource.mode() != AccessMode::Write {
            return Err(HostError::invalid_argument(format!(
                "`{}` was not authorized for writing",
                resource.reference()
            )));
        }
        let limit = resource.byte_limit();
        if data.len() as u64 > limit {
            return Err(too_large(resource.reference(), limit));
        }

        match resource.location() {
            ResourceLocation::Local(path) => {
                let dir = path
                    .parent()
                    .ok_or_else(|| {
                        HostError::invalid_argument(format!(
                            "`{}` has no parent directory",
                            resource.reference()
                        ))
                    })?
                    .to_path_buf();
                let target = path.clone();
                tokio::task::spawn_blocking(move || -> std::io::Result<()> {
                    let mut file = NamedTempFile::new_in(&dir)?;
                    file.write_all(&data)?;
                    file.as_file().sync_all()?;
                    if overwrite {
                        file.persist(&target).map_err(|err| err.error)?;
                    } else {
                        file.persist_noclobber(&target).map_err(|err| err.error)?;
                    }
                    Ok(())
                })
                .await
                .map_err(|err| HostError::upstream(format!("write task failed: {err}")))?
                .map_err(|err| match err.kind() {
                    ErrorKind::AlreadyExists => HostError::already_exists(format!(
                        "`{}` already exists; pass overwrite=true to replace it",
                        resource.reference()
                    )),
                    _ => HostError::from(err),
                })?;
            }
            ResourceLocation::Remote(url) => self
                .remote
                .upload(url, data, format.mime_type())
                .await
                .map_err(|err| map_transfer_error(&err, url))?,
        }
        debug!(reference = resource.reference(), %format, "artifact written");
        Ok(())
    }
}

fn too_large(reference: &str, limit: u64) -> HostError {
    HostError::payload_too_large(format!("`{reference}` exceeds the {limit} byte limit"))
}

/// Translates a transfer failure into the host taxonomy.
pub(crate) fn map_transfer_error(err: &TransferError, url: &str) -> HostError {
    match err {
        TransferError::TooLarge { limit } => too_large(url, *limit),
        TransferError::InvalidUrl { .. } => HostError::invalid_argument(err.to_string()),
        TransferError::Status { status: 404 } => {
            HostError::not_found(format!("`{url}` does not exist"))
        }
        TransferError::Status { status: 401 | 403 } => {
            HostError::permission_denied(format!("access to `{url}` was refused"))
        }
        TransferError::Timeout { .. } => HostError::upstream("timed out"),
        TransferError::Status { .. } | TransferError::Transport { .. } => {
            HostError::upstream(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use modal_config::{ByteLimits, HostConfig};
    use modal_policy::Gatekeeper;
    use modal_primitives::ErrorCode;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryStore {
        uploads: Mutex<Vec<(String, usize, String)>>,
    }

    #[async_trait]
    impl RemoteStore for MemoryStore {
        async fn fetch(&self, _url: &str, limit: u64) -> std::result::Result<Bytes, TransferError> {
            Err(TransferError::TooLarge { limit })
        }

        async fn upload(
            &self,
            url: &str,
            data: Bytes,
            content_type: &str,
        ) -> std::result::Result<(), TransferError> {
            self.uploads
                .lock()
                .unwrap()
                .push((url.to_owned(), data.len(), content_type.to_owned()));
            Ok(())
        }
    }

    fn gatekeeper(dir: &std::path::Path, limits: ByteLimits) -> Gatekeeper {
        let config = HostConfig::default()
            .with_allowed_roots([dir.to_path_buf()])
            .with_limits(limits);
        Gatekeeper::new(&config)
    }

    #[tokio::test]
    async fn writes_replace_targets_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let gatekeeper = gatekeeper(dir.path(), ByteLimits::default());
        let io = ResourceIo::new(Arc::new(MemoryStore::default()));

        let target = dir.path().join("out.txt");
        std::fs::write(&target, b"old").unwrap();
        let resource = gatekeeper.authorize_write(target.to_str().unwrap()).await.unwrap();
        io.write(&resource, Bytes::from_static(b"new"), MediaFormat::Text, true)
            .await
            .unwrap();

        assert_eq!(std::fs::read(&target).unwrap(), b"new");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn targets_created_after_authorization_are_kept() {
        let dir = tempfile::tempdir().unwrap();
        let gatekeeper = gatekeeper(dir.path(), ByteLimits::default());
        let io = ResourceIo::new(Arc::new(MemoryStore::default()));

        let target = dir.path().join("race.txt");
        let resource = gatekeeper.authorize_write(target.to_str().unwrap()).await.unwrap();
        assert!(!resource.exists());
        std::fs::write(&target, b"first").unwrap();

        let err = io
            .write(&resource, Bytes::from_static(b"second"), MediaFormat::Text, false)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::AlreadyExists);
        assert_eq!(std::fs::read(&target).unwrap(), b"first");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn oversized_writes_leave_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let limits = ByteLimits {
            max_input_bytes: 1024,
            max_output_bytes: 4,
        };
        let gatekeeper = gatekeeper(dir.path(), limits);
        let io = ResourceIo::new(Arc::new(MemoryStore::default()));

        let target = dir.path().join("out.bin");
        let resource = gatekeeper.authorize_write(target.to_str().unwrap()).await.unwrap();
        let err = io
            .write(&resource, Bytes::from_static(b"too long"), MediaFormat::Pcm, false)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::PayloadTooLarge);
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn local_reads_return_content() {
        let dir = tempfile::tempdir().unwrap();
        let gatekeeper = gatekeeper(dir.path(), ByteLimits::default());
        let io = ResourceIo::new(Arc::new(MemoryStore::default()));

        let source = dir.path().join("in.txt");
        std::fs::write(&source, b"hello").unwrap();
        let resource = gatekeeper.authorize_read(source.to_str().unwrap()).await.unwrap();
        assert_eq!(io.read(&resource).await.unwrap(), Bytes::from_static(b"hello"));

        let err = io
            .write(&resource, Bytes::new(), MediaFormat::Text, false)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
    }

    #[test]
    fn transfer_failures_are_translated() {
        let url = "https://example.com/a.png";
        let cases = [
            (TransferError::TooLarge { limit: 1 }, ErrorCode::PayloadTooLarge),
            (TransferError::Status { status: 404 }, ErrorCode::NotFound),
            (TransferError::Status { status: 403 }, ErrorCode::PermissionDenied),
            (TransferError::Status { status: 500 }, ErrorCode::UpstreamError),
            (
                TransferError::Timeout {
                    after: std::time::Duration::from_secs(1),
                },
                ErrorCode::UpstreamError,
            ),
        ];
        for (err, code) in cases {
            assert_eq!(map_transfer_error(&err, url).code(), code);
        }
    }
}
