//! SourceResolver: turn a queued reference into a private, locally readable file
//!
//! Strategies per [`SourceRef`] variant:
//! - `Local`: containment check, then copy into a private work directory
//! - `Remote`: streaming HTTP download into a private work directory
//! - `Platform`: external audio downloader into a private work directory
//! - `Token`: looked up through a [`TokenResolver`], then classified again
//!
//! Every strategy allocates its work directory first and only wraps it in a
//! [`SourceHandle`] once the file is complete, so a failure at any point drops
//! the directory (and any partial file) before the error is returned.

use super::classify::{canonicalize_reference, Classifier, SourceRef};
use super::handle::{SourceHandle, WorkArea};
use crate::deadline::Deadline;
use crate::error::{MergeError, MergeResult};
use crate::models::{ItemKind, QueueItem};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{StatusCode, Url};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Maximum stderr bytes kept from the platform downloader for diagnostics
const STDERR_TAIL_BYTES: usize = 2048;

/// A platform token looked up into a plain reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedToken {
    pub kind: ItemKind,
    pub content: String,
}

/// Looks up opaque platform file tokens
#[async_trait]
pub trait TokenResolver: Send + Sync {
    async fn resolve_token(&self, token: &str) -> MergeResult<ResolvedToken>;
}

/// Default token lookup: the messaging collaborator stores attachments in the
/// storage root under their token, so a token is a storage-relative file name
#[derive(Debug, Clone, Default)]
pub struct StorageTokenResolver;

#[async_trait]
impl TokenResolver for StorageTokenResolver {
    async fn resolve_token(&self, token: &str) -> MergeResult<ResolvedToken> {
        if token.is_empty() || token.contains(['/', '\\']) {
            return Err(MergeError::InvalidReference(format!("malformed token: {}", token)));
        }
        Ok(ResolvedToken {
            kind: ItemKind::LocalReference,
            content: token.to_string(),
        })
    }
}

/// Runs an external downloader that extracts the audio track of a platform URL
#[derive(Debug, Clone)]
pub struct PlatformDownloader {
    program: PathBuf,
}

impl PlatformDownloader {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Download into `dir`, returning the produced file
    ///
    /// The child is killed if the deadline passes.
    pub async fn download(&self, url: &Url, dir: &Path, deadline: &Deadline) -> MergeResult<PathBuf> {
        let template = dir.join("audio.%(ext)s");
        let child = tokio::process::Command::new(&self.program)
            .arg("--extract-audio")
            .arg("--no-playlist")
            .arg("--no-progress")
            .arg("--output")
            .arg(&template)
            .arg(url.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                MergeError::Network(format!(
                    "cannot start downloader {}: {}",
                    self.program.display(),
                    e
                ))
            })?;

        let output = deadline
            .run(child.wait_with_output())
            .await
            .map_err(|_| MergeError::NetworkTimeout(url.to_string()))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail = tail_chars(&stderr, STDERR_TAIL_BYTES);
            return Err(MergeError::Network(format!(
                "downloader exited with {} for {}: {}",
                output.status, url, tail
            )));
        }

        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                return Ok(entry.path());
            }
        }
        Err(MergeError::NotFound(format!("downloader produced no file for {}", url)))
    }
}

/// Acquires queued references as [`SourceHandle`]s
pub struct SourceResolver {
    storage_root: PathBuf,
    classifier: Classifier,
    work: WorkArea,
    client: reqwest::Client,
    fetch_timeout: Duration,
    platform: PlatformDownloader,
    tokens: Arc<dyn TokenResolver>,
}

impl SourceResolver {
    pub fn new(
        storage_root: impl Into<PathBuf>,
        classifier: Classifier,
        work: WorkArea,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            storage_root: storage_root.into(),
            classifier,
            work,
            client: reqwest::Client::new(),
            fetch_timeout,
            platform: PlatformDownloader::new("yt-dlp"),
            tokens: Arc::new(StorageTokenResolver),
        }
    }

    pub fn with_platform_downloader(mut self, platform: PlatformDownloader) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_token_resolver(mut self, tokens: Arc<dyn TokenResolver>) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }

    /// Acquire one queued item
    ///
    /// Errors: `NotFound`, `AccessDenied`, `NetworkTimeout`, `Network`,
    /// `InvalidReference`, `Io`.
    pub async fn acquire(&self, item: &QueueItem) -> MergeResult<SourceHandle> {
        let mut source = self.classifier.classify(item.kind, &item.content);

        if let SourceRef::Token(token) = &source {
            let resolved = self.tokens.resolve_token(token).await?;
            if resolved.kind == ItemKind::OpaqueToken {
                return Err(MergeError::InvalidReference(format!(
                    "token {} resolved to another token",
                    token
                )));
            }
            debug!(token = %token, reference = %resolved.content, "Resolved token");
            source = self.classifier.classify(resolved.kind, &resolved.content);
        }

        match source {
            SourceRef::Local(reference) => self.acquire_local(&reference).await,
            SourceRef::Remote(url) => self.fetch_remote(&url).await,
            SourceRef::Platform(url) => self.fetch_platform(&url).await,
            SourceRef::Token(token) => Err(MergeError::InvalidReference(format!(
                "unresolved token {}",
                token
            ))),
        }
    }

    async fn acquire_local(&self, reference: &str) -> MergeResult<SourceHandle> {
        let canonical = canonicalize_reference(&self.storage_root, reference).await?;
        if !canonical.inside_root {
            warn!(
                reference = %reference,
                resolved = %canonical.path.display(),
                "Reference escapes storage root"
            );
            return Err(MergeError::AccessDenied(reference.to_string()));
        }

        let metadata = tokio::fs::metadata(&canonical.path).await?;
        if !metadata.is_file() {
            return Err(MergeError::InvalidReference(format!(
                "not a regular file: {}",
                reference
            )));
        }

        let file_name = canonical
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .ok_or_else(|| MergeError::InvalidReference(reference.to_string()))?;

        let dir = self.work.create_dir("local-")?;
        let private = dir.path().join(file_name);
        tokio::fs::copy(&canonical.path, &private).await?;

        debug!(
            source = %canonical.path.display(),
            copy = %private.display(),
            bytes = metadata.len(),
            "Copied local source"
        );
        Ok(self.work.handle(dir, private))
    }

    async fn fetch_remote(&self, url: &Url) -> MergeResult<SourceHandle> {
        let deadline = Deadline::after(self.fetch_timeout);
        let dir = self.work.create_dir("remote-")?;
        let path = dir.path().join(remote_file_name(url));

        let response = deadline
            .run(self.client.get(url.clone()).send())
            .await
            .map_err(|_| MergeError::NetworkTimeout(url.to_string()))?
            .map_err(|e| map_transport_error(url, e))?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::NOT_FOUND | StatusCode::GONE => {
                return Err(MergeError::NotFound(url.to_string()));
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(MergeError::AccessDenied(url.to_string()));
            }
            status => {
                return Err(MergeError::Network(format!("{} returned {}", url, status)));
            }
        }

        let mut file = tokio::fs::File::create(&path).await?;
        let mut stream = response.bytes_stream();
        let mut bytes: u64 = 0;

        loop {
            let next = deadline
                .run(stream.next())
                .await
                .map_err(|_| MergeError::NetworkTimeout(url.to_string()))?;
            match next {
                Some(Ok(chunk)) => {
                    bytes += chunk.len() as u64;
                    deadline
                        .run(file.write_all(&chunk))
                        .await
                        .map_err(|_| MergeError::NetworkTimeout(url.to_string()))??;
                }
                Some(Err(e)) => return Err(map_transport_error(url, e)),
                None => break,
            }
        }

        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        info!(url = %url, bytes, "Fetched remote source");
        Ok(self.work.handle(dir, path))
    }

    async fn fetch_platform(&self, url: &Url) -> MergeResult<SourceHandle> {
        let deadline = Deadline::after(self.fetch_timeout);
        let dir = self.work.create_dir("platform-")?;
        let path = self.platform.download(url, dir.path(), &deadline).await?;
        info!(url = %url, file = %path.display(), "Downloaded platform audio");
        Ok(self.work.handle(dir, path))
    }
}

fn map_transport_error(url: &Url, e: reqwest::Error) -> MergeError {
    if e.is_timeout() {
        MergeError::NetworkTimeout(url.to_string())
    } else {
        MergeError::Network(format!("{}: {}", url, e))
    }
}

/// Safe local file name for a downloaded URL (last path segment, sanitized)
fn remote_file_name(url: &Url) -> String {
    let last = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .map(|s| urlencoding::decode(s).map(|d| d.into_owned()).unwrap_or_default())
        .unwrap_or_default();

    let sanitized: String = last
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .collect();
    let sanitized = sanitized.trim_start_matches('.');

    if sanitized.is_empty() {
        "download".to_string()
    } else {
        sanitized.to_string()
    }
}

fn tail_chars(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text.trim();
    }
    let mut start = text.len() - max;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    text[start..].trim()
}
