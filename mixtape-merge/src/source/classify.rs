//! Reference classification and storage-root containment
//!
//! Classification decides which acquisition strategy a queued reference gets:
//! - absolute filesystem path → local
//! - http(s) URL whose host is the local-storage endpoint's host → local
//! - anything that is not a well-formed http(s) URL → local
//! - any other http(s) URL → remote (platform downloader when the host is listed)
//!
//! Local references are then resolved by [`canonicalize_reference`], the single
//! place that turns a reference into an absolute path and decides whether it lies
//! inside the storage root.

use crate::error::{MergeError, MergeResult};
use crate::models::ItemKind;
use reqwest::Url;
use std::path::{Component, Path, PathBuf};

/// A classified reference, one acquisition strategy per variant
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRef {
    /// Path relative to the storage root (or absolute), possibly percent-encoded
    Local(String),
    /// Plain streaming HTTP download
    Remote(Url),
    /// Audio extraction from a video platform
    Platform(Url),
    /// Platform file token, looked up before classification
    Token(String),
}

/// Applies the classification rule
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    local_endpoint: Option<Url>,
    platform_hosts: Vec<String>,
}

impl Classifier {
    pub fn new(local_endpoint: Option<Url>, platform_hosts: Vec<String>) -> Self {
        Self {
            local_endpoint,
            platform_hosts: platform_hosts
                .into_iter()
                .map(|h| h.trim().to_ascii_lowercase())
                .filter(|h| !h.is_empty())
                .collect(),
        }
    }

    pub fn classify(&self, kind: ItemKind, content: &str) -> SourceRef {
        let content = content.trim();

        if kind == ItemKind::OpaqueToken {
            return SourceRef::Token(content.to_string());
        }

        if Path::new(content).is_absolute() {
            return SourceRef::Local(content.to_string());
        }

        let url = match Url::parse(content) {
            Ok(url) if is_http(&url) && url.host_str().is_some() => url,
            _ => return SourceRef::Local(content.to_string()),
        };

        if let Some(relative) = self.local_path_of(&url) {
            return SourceRef::Local(relative);
        }

        let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
        if self.platform_hosts.iter().any(|h| *h == host) {
            SourceRef::Platform(url)
        } else {
            SourceRef::Remote(url)
        }
    }

    /// Storage-relative path for a URL on the local endpoint's host
    ///
    /// Only the host decides; scheme and port are ignored. The endpoint's own
    /// path prefix (if any) is stripped; segments stay percent-encoded and are
    /// decoded during canonicalization.
    fn local_path_of(&self, url: &Url) -> Option<String> {
        let endpoint = self.local_endpoint.as_ref()?;
        let (host, endpoint_host) = (url.host_str()?, endpoint.host_str()?);
        if !host.eq_ignore_ascii_case(endpoint_host) {
            return None;
        }

        let prefix: Vec<&str> = segments(endpoint);
        let path: Vec<&str> = segments(url);
        let rest = if path.starts_with(&prefix) {
            &path[prefix.len()..]
        } else {
            &path[..]
        };
        Some(rest.join("/"))
    }
}

fn is_http(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https")
}

fn segments(url: &Url) -> Vec<&str> {
    url.path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default()
}

// ============================================================================
// Containment
// ============================================================================

/// Result of canonicalizing a local reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Canonical {
    /// Absolute path (symlinks resolved when the path is inside the root)
    pub path: PathBuf,
    pub inside_root: bool,
}

/// Resolve `reference` against `root` and decide containment
///
/// The reference is percent-decoded once, joined to the root unless absolute,
/// normalized lexically (`.` and `..` folded) and checked against the root. A
/// lexically contained path is then canonicalized on disk and checked again
/// against the canonical root, which catches symlinks pointing outside.
///
/// Errors: `InvalidReference` for empty/undecodable/NUL-containing input,
/// `NotFound` when a contained path does not exist. An escaping path is not an
/// error here; it returns `inside_root: false` and the caller denies it.
pub async fn canonicalize_reference(root: &Path, reference: &str) -> MergeResult<Canonical> {
    let decoded = urlencoding::decode(reference)
        .map_err(|_| MergeError::InvalidReference(format!("undecodable reference: {}", reference)))?;

    if decoded.trim().is_empty() {
        return Err(MergeError::InvalidReference("empty reference".to_string()));
    }
    if decoded.contains('\0') {
        return Err(MergeError::InvalidReference(format!(
            "NUL byte in reference: {}",
            reference
        )));
    }

    let canonical_root = tokio::fs::canonicalize(root).await?;
    let lexical_root = normalize_lexically(root);

    let candidate = normalize_lexically(&root.join(decoded.as_ref()));
    if !candidate.starts_with(&lexical_root) && !candidate.starts_with(&canonical_root) {
        return Ok(Canonical {
            path: candidate,
            inside_root: false,
        });
    }

    let resolved = match tokio::fs::canonicalize(&candidate).await {
        Ok(path) => path,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(MergeError::NotFound(reference.to_string()));
        }
        Err(e) => return Err(e.into()),
    };

    let inside_root = resolved.starts_with(&canonical_root);
    Ok(Canonical {
        path: resolved,
        inside_root,
    })
}

/// Fold `.` and `..` without touching the filesystem
///
/// `..` at the filesystem root stays at the root.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(p) => out.push(p.as_os_str()),
            Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(name) => out.push(name),
        }
    }
    out
}
