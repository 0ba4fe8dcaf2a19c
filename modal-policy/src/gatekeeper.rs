//! Path and size gatekeeper.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use http::Uri;
use modal_config::{AccessFlags, ByteLimits, HostConfig};
use modal_primitives::{HostError, Result};
use tokio::fs;
use tracing::{debug, warn};

use crate::resource::{AccessMode, ResourceRef};
use crate::scope::{RootSet, normalize};

/// Authorizes file and URL references against the host access policy.
///
/// Holds only immutable policy state, so one instance is shared by every
/// concurrent invocation.
#[derive(Debug, Clone)]
pub struct Gatekeeper {
    access: AccessFlags,
    limits: ByteLimits,
    roots: RootSet,
}

impl Gatekeeper {
    /// Builds a gatekeeper from the host configuration.
    #[must_use]
    pub fn new(config: &HostConfig) -> Self {
        Self {
            access: config.access(),
            limits: config.limits(),
            roots: RootSet::new(config.allowed_roots()),
        }
    }

    /// Returns the byte ceilings enforced by this gatekeeper.
    #[must_use]
    pub const fn limits(&self) -> ByteLimits {
        self.limits
    }

    /// Authorizes a read using the configured input ceiling.
    ///
    /// # Errors
    ///
    /// See [`Gatekeeper::authorize`].
    pub async fn authorize_read(&self, reference: &str) -> Result<ResourceRef> {
        self.authorize(reference, AccessMode::Read, self.limits.max_input_bytes)
            .await
    }

    /// Authorizes a write using the configured output ceiling.
    ///
    /// # Errors
    ///
    /// See [`Gatekeeper::authorize`].
    pub async fn authorize_write(&self, reference: &str) -> Result<ResourceRef> {
        self.authorize(reference, AccessMode::Write, self.limits.max_output_bytes)
            .await
    }

    /// Resolves and authorizes a reference.
    ///
    /// Performs metadata probes only; the sole side effect is creating a
    /// missing parent directory when `allow_mkdir` is enabled.
    ///
    /// # Errors
    ///
    /// * `INVALID_ARGUMENT` for empty references, disabled or unknown
    ///   schemes, and paths escaping every allowed root;
    /// * `NOT_FOUND` when a read target does not exist;
    /// * `PERMISSION_DENIED` when a write target's parent is missing and
    ///   directory creation is disabled;
    /// * `PAYLOAD_TOO_LARGE` when a read target exceeds `limit`.
    pub async fn authorize(
        &self,
        reference: &str,
        mode: AccessMode,
        limit: u64,
    ) -> Result<ResourceRef> {
        let trimmed = reference.trim();
        if trimmed.is_empty() {
            return Err(HostError::invalid_argument("resource reference cannot be empty"));
        }

        let outcome = if trimmed.contains("://") {
            self.authorize_remote(trimmed, mode, limit)
        } else {
            match mode {
                AccessMode::Read => self.authorize_local_read(trimmed, limit).await,
                AccessMode::Write => self.authorize_local_write(trimmed, limit).await,
            }
        };

        match &outcome {
            Ok(resource) => debug!(
                reference = trimmed,
                %mode,
                resolved = %resource.display_ref(),
                "resource authorized"
            ),
            Err(err) => warn!(reference = trimmed, %mode, code = %err.code(), "resource rejected"),
        }
        outcome
    }

    fn authorize_remote(&self, reference: &str, mode: AccessMode, limit: u64) -> Result<ResourceRef> {
        let uri = reference
            .parse::<Uri>()
            .map_err(|err| HostError::invalid_argument(format!("invalid URL `{reference}`: {err}")))?;

        match uri.scheme_str() {
            Some("https") => {}
            Some("http") => {
                if !self.access.allow_insecure_http {
                    return Err(HostError::invalid_argument(
                        "plain http URLs are disabled; use https",
                    ));
                }
            }
            Some(other) => {
                return Err(HostError::invalid_argument(format!(
                    "URL scheme `{other}` is not supported"
                )));
            }
            None => {
                return Err(HostError::invalid_argument(format!(
                    "URL `{reference}` has no scheme"
                )));
            }
        }

        if uri.host().is_none_or(str::is_empty) {
            return Err(HostError::invalid_argument(format!(
                "URL `{reference}` has no host"
            )));
        }

        match mode {
            AccessMode::Read if !self.access.allow_remote_urls => Err(HostError::invalid_argument(
                "remote URLs are disabled by policy",
            )),
            AccessMode::Write if !self.access.allow_presigned_uploads => Err(
                HostError::invalid_argument("presigned upload targets are disabled by policy"),
            ),
            _ => Ok(ResourceRef::remote(reference, mode, limit)),
        }
    }

    fn resolve_local(&self, reference: &str) -> Result<PathBuf> {
        let raw = Path::new(reference);
        let joined = if raw.is_absolute() {
            raw.to_path_buf()
        } else {
            let root = self.roots.primary().ok_or_else(|| {
                HostError::invalid_argument("no allowed roots are configured for local paths")
            })?;
            root.lexical().join(raw)
        };

        let normalized = normalize(&joined);
        if !self.roots.contains_lexical(&normalized) {
            return Err(HostError::invalid_argument(format!(
                "`{reference}` escapes the allowed roots"
            )));
        }
        Ok(normalized)
    }

    fn ensure_resolved_in_roots(&self, reference: &str, resolved: &Path) -> Result<()> {
        if self.roots.contains_resolved(resolved) {
            Ok(())
        } else {
            Err(HostError::invalid_argument(format!(
                "`{reference}` resolves outside the allowed roots"
            )))
        }
    }

    async fn authorize_local_read(&self, reference: &str, limit: u64) -> Result<ResourceRef> {
        let path = self.resolve_local(reference)?;

        let metadata = fs::metadata(&path)
            .await
            .map_err(|err| probe_error(reference, &err))?;
        if !metadata.is_file() {
            return Err(HostError::invalid_argument(format!(
                "`{reference}` is not a regular file"
            )));
        }

        let canonical = fs::canonicalize(&path)
            .await
            .map_err(|err| probe_error(reference, &err))?;
        self.ensure_resolved_in_roots(reference, &canonical)?;

        let size = metadata.len();
        if size > limit {
            return Err(HostError::payload_too_large(format!(
                "`{reference}` is {size} bytes, exceeding the {limit} byte input limit"
            )));
        }

        Ok(ResourceRef::local(
            reference,
            path,
            AccessMode::Read,
            limit,
            Some(size),
            true,
        ))
    }

    async fn authorize_local_write(&self, reference: &str, limit: u64) -> Result<ResourceRef> {
        let path = self.resolve_local(reference)?;
        let Some(parent) = path.parent().filter(|_| path.file_name().is_some()) else {
            return Err(HostError::invalid_argument(format!(
                "`{reference}` does not name a file"
            )));
        };

        match fs::metadata(parent).await {
            Ok(metadata) if metadata.is_dir() => {}
            Ok(_) => {
                return Err(HostError::invalid_argument(format!(
                    "parent of `{reference}` is not a directory"
                )));
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                if !self.access.allow_mkdir {
                    return Err(HostError::permission_denied(format!(
                        "parent directory of `{reference}` does not exist and directory creation is disabled"
                    )));
                }
                let ancestor = nearest_existing_ancestor(parent).await;
                let canonical = fs::canonicalize(&ancestor)
                    .await
                    .map_err(|err| probe_error(reference, &err))?;
                self.ensure_resolved_in_roots(reference, &canonical)?;
                fs::create_dir_all(parent).await?;
                debug!(directory = %parent.display(), "created parent directory");
            }
            Err(err) => return Err(probe_error(reference, &err)),
        }

        let canonical_parent = fs::canonicalize(parent)
            .await
            .map_err(|err| probe_error(reference, &err))?;
        self.ensure_resolved_in_roots(reference, &canonical_parent)?;

        let (exists, size) = match fs::symlink_metadata(&path).await {
            Ok(metadata) if metadata.is_dir() => {
                return Err(HostError::invalid_argument(format!(
                    "`{reference}` is a directory"
                )));
            }
            Ok(metadata) => (true, Some(metadata.len())),
            Err(err) if err.kind() == ErrorKind::NotFound => (false, None),
            Err(err) => return Err(probe_error(reference, &err)),
        };

        Ok(ResourceRef::local(
            reference,
            path,
            AccessMode::Write,
            limit,
            size,
            exists,
        ))
    }
}

async fn nearest_existing_ancestor(path: &Path) -> PathBuf {
    let mut current = path.to_path_buf();
    while !current.as_os_str().is_empty() {
        if fs::metadata(&current).await.is_ok() {
            return current;
        }
        if !current.pop() {
            break;
        }
    }
    current
}

fn probe_error(reference: &str, err: &std::io::Error) -> HostError {
    match err.kind() {
        ErrorKind::NotFound => HostError::not_found(format!("`{reference}` does not exist")),
        ErrorKind::PermissionDenied => {
            HostError::permission_denied(format!("access to `{reference}` was denied"))
        }
        _ => HostError::upstream(format!("failed to inspect `{reference}`: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use modal_primitives::ErrorCode;
    use tempfile::TempDir;

    fn gatekeeper(root: &TempDir, access: AccessFlags, limits: ByteLimits) -> Gatekeeper {
        let config = HostConfig::default()
            .with_allowed_roots([root.path()])
            .with_access(access)
            .with_limits(limits);
        Gatekeeper::new(&config)
    }

    fn default_gatekeeper(root: &TempDir) -> Gatekeeper {
        gatekeeper(root, AccessFlags::default(), ByteLimits::default())
    }

    #[tokio::test]
    async fn rejects_empty_reference() {
        let root = tempfile::tempdir().unwrap();
        let err = default_gatekeeper(&root)
            .authorize_read("   ")
            .await
            .expect_err("empty reference");
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
    }

    #[tokio::test]
    async fn reads_relative_paths_under_primary_root() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("cat.png"), b"12345").unwrap();

        let resource = default_gatekeeper(&root)
            .authorize_read("cat.png")
            .await
            .unwrap();
        assert_eq!(resource.size(), Some(5));
        assert_eq!(resource.mode(), AccessMode::Read);
        assert_eq!(resource.local_path(), Some(root.path().join("cat.png").as_path()));
    }

    #[tokio::test]
    async fn rejects_escaping_paths() {
        let root = tempfile::tempdir().unwrap();
        let err = default_gatekeeper(&root)
            .authorize_read("../../etc/passwd")
            .await
            .expect_err("escape");
        assert_eq!(err.code(), ErrorCode::InvalidArgument);

        let err = default_gatekeeper(&root)
            .authorize_write("/etc/out.png")
            .await
            .expect_err("absolute escape");
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
    }

    #[tokio::test]
    async fn missing_read_target_is_not_found() {
        let root = tempfile::tempdir().unwrap();
        let err = default_gatekeeper(&root)
            .authorize_read("missing.wav")
            .await
            .expect_err("missing");
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn oversized_reads_are_rejected() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("big.wav"), vec![0_u8; 64]).unwrap();
        let limits = ByteLimits {
            max_input_bytes: 32,
            max_output_bytes: 32,
        };

        let err = gatekeeper(&root, AccessFlags::default(), limits)
            .authorize_read("big.wav")
            .await
            .expect_err("too large");
        assert_eq!(err.code(), ErrorCode::PayloadTooLarge);
    }

    #[tokio::test]
    async fn missing_parent_requires_mkdir_opt_in() {
        let root = tempfile::tempdir().unwrap();
        let err = default_gatekeeper(&root)
            .authorize_write("nested/dir/out.png")
            .await
            .expect_err("no mkdir");
        assert_eq!(err.code(), ErrorCode::PermissionDenied);
        assert!(!root.path().join("nested").exists());

        let access = AccessFlags {
            allow_mkdir: true,
            ..AccessFlags::default()
        };
        let resource = gatekeeper(&root, access, ByteLimits::default())
            .authorize_write("nested/dir/out.png")
            .await
            .unwrap();
        assert!(root.path().join("nested/dir").is_dir());
        assert!(!resource.exists());
    }

    #[tokio::test]
    async fn write_records_existing_target() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("out.png"), b"old").unwrap();

        let resource = default_gatekeeper(&root)
            .authorize_write("out.png")
            .await
            .unwrap();
        assert!(resource.exists());
        assert_eq!(resource.size(), Some(3));
    }

    #[tokio::test]
    async fn remote_references_follow_opt_in_flags() {
        let root = tempfile::tempdir().unwrap();
        let closed = default_gatekeeper(&root);
        for (reference, mode) in [
            ("https://cdn.example.com/a.png", AccessMode::Read),
            ("https://bucket.example.com/a.png?sig=1", AccessMode::Write),
        ] {
            let err = closed
                .authorize(reference, mode, 10)
                .await
                .expect_err("disabled");
            assert_eq!(err.code(), ErrorCode::InvalidArgument);
        }

        let open = gatekeeper(
            &root,
            AccessFlags {
                allow_remote_urls: true,
                allow_presigned_uploads: true,
                ..AccessFlags::default()
            },
            ByteLimits::default(),
        );
        let resource = open
            .authorize_read("https://cdn.example.com/a.png")
            .await
            .unwrap();
        assert!(resource.is_remote());
        assert_eq!(resource.size(), None);

        let err = open
            .authorize_read("http://cdn.example.com/a.png")
            .await
            .expect_err("plain http");
        assert_eq!(err.code(), ErrorCode::InvalidArgument);

        let err = open
            .authorize_read("ftp://cdn.example.com/a.png")
            .await
            .expect_err("ftp");
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlinks_cannot_escape_roots() {
        let root = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret.txt"), b"x").unwrap();
        std::os::unix::fs::symlink(
            outside.path().join("secret.txt"),
            root.path().join("link.txt"),
        )
        .unwrap();

        let err = default_gatekeeper(&root)
            .authorize_read("link.txt")
            .await
            .expect_err("symlink escape");
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
    }
}
