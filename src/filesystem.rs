// src/filesystem.rs

//! Crash-safe file and directory replacement
//!
//! Every document the repository publishes is written to a temporary file
//! in the destination directory, synced, and renamed into place, so a crash
//! mid-write never leaves a half-written file live. Whole target sets are
//! swapped by exchanging directories.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Write `content` to `path` atomically (write to temp, then rename)
pub fn write_atomic(path: &Path, content: &[u8]) -> std::io::Result<()> {
    write_atomic_with_mode(path, content, None)
}

/// Write `content` atomically, setting unix permissions on the temp file
/// before it becomes visible
pub fn write_atomic_with_mode(
    path: &Path,
    content: &[u8],
    mode: Option<u32>,
) -> std::io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }

    let temp_path = temp_sibling(path, "tmp");
    let result = (|| {
        let mut file = fs::File::create(&temp_path)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = mode {
                file.set_permissions(fs::Permissions::from_mode(mode))?;
            }
        }
        #[cfg(not(unix))]
        let _ = mode;
        file.write_all(content)?;
        file.sync_all()?;
        fs::rename(&temp_path, path)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result?;

    debug!("Wrote {} ({} bytes)", path.display(), content.len());
    Ok(())
}

/// Swap `staged` into place at `live`
///
/// Returns true if `live` already existed. In that case the previous
/// contents now sit at `staged`, so [`restore_dir`] can put them back if
/// follow-up work fails. The live path is never missing while an exchange
/// is supported by the filesystem.
pub fn swap_dir(staged: &Path, live: &Path) -> std::io::Result<bool> {
    if live.exists() {
        exchange_dirs(staged, live)?;
        Ok(true)
    } else {
        fs::rename(staged, live)?;
        Ok(false)
    }
}

/// Undo a [`swap_dir`]: the previous contents go back to `live` and the
/// swapped-in set back to `staged`
pub fn restore_dir(live: &Path, staged: &Path, had_previous: bool) -> std::io::Result<()> {
    if had_previous {
        exchange_dirs(staged, live)
    } else {
        fs::rename(live, staged)?;
        fs::create_dir_all(live)
    }
}

/// Exchange the directories at `a` and `b`
///
/// Uses `renameat2(RENAME_EXCHANGE)` where available. Filesystems without
/// exchange support fall back to three renames through an `old` sibling of
/// `b`, which leaves `b` missing for a moment.
pub fn exchange_dirs(a: &Path, b: &Path) -> std::io::Result<()> {
    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    {
        use nix::errno::Errno;
        use nix::fcntl::{RenameFlags, renameat2};

        match renameat2(None, a, None, b, RenameFlags::RENAME_EXCHANGE) {
            Ok(()) => {
                debug!("Exchanged {} and {}", a.display(), b.display());
                return Ok(());
            }
            Err(Errno::EINVAL | Errno::ENOSYS | Errno::EOPNOTSUPP) => {
                debug!("RENAME_EXCHANGE unsupported for {}, using renames", b.display());
            }
            Err(e) => return Err(e.into()),
        }
    }

    let aside = temp_sibling(b, "old");
    fs::rename(b, &aside)?;
    if let Err(e) = fs::rename(a, b) {
        let _ = fs::rename(&aside, b);
        return Err(e);
    }
    fs::rename(&aside, a)
}

/// A hidden, uniquely named sibling of `path`
pub fn temp_sibling(path: &Path, tag: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.{}-{}", name, tag, uuid::Uuid::new_v4().simple()))
}
