//! Atomic file writes (temp file + rename)
//!
//! A reader either sees the previous complete file or the new complete file,
//! never a truncated one, even if the process dies mid-write.

use crate::{Error, Result};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Path of the sibling temp file used while writing `target`
pub fn temp_path_for(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    target.with_file_name(name)
}

/// Write `contents` to `target` atomically
///
/// The temp file lives in the same directory so the final `rename` never crosses
/// a filesystem boundary. On Unix the file is created with mode 0600.
pub async fn write_atomic(target: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = target.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let temp = temp_path_for(target);

    let result = async {
        let mut file = tokio::fs::File::create(&temp).await?;
        file.write_all(contents).await?;
        file.sync_all().await?;
        drop(file);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&temp, std::fs::Permissions::from_mode(0o600)).await?;
        }

        tokio::fs::rename(&temp, target).await
    }
    .await;

    if let Err(source) = result {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(Error::AtomicWrite {
            path: target.to_path_buf(),
            source,
        });
    }

    Ok(())
}
