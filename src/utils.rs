//! Utility functions for local paths and disk space

use crate::config::DiskSpaceConfig;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Map a remote filename to its path inside the download directory
///
/// Only the final path component of `filename` is used, so names such as
/// `"../../etc/passwd"` or `"sub/dir/a.zip"` cannot escape the flat download
/// directory. Names without a final component (`""`, `".."`, `"/"`) are
/// rejected.
///
/// # Examples
///
/// ```
/// use channel_dl::utils::local_path_for;
/// use std::path::Path;
///
/// let path = local_path_for(Path::new("/downloads"), "report.pdf").unwrap();
/// assert_eq!(path, Path::new("/downloads/report.pdf"));
/// ```
pub fn local_path_for(download_dir: &Path, filename: &str) -> Result<PathBuf> {
    let normalized = filename.replace('\\', "/");
    let name = Path::new(&normalized)
        .file_name()
        .ok_or_else(|| Error::InvalidAttachment(format!("unusable filename {:?}", filename)))?;
    Ok(download_dir.join(name))
}

/// Fail with [`Error::InsufficientSpace`] unless `size_bytes` fits in `dir`
///
/// Requires `size_bytes + min_free_space` to be available. Skipped entirely
/// when the check is disabled.
pub fn ensure_disk_space(dir: &Path, size_bytes: u64, config: &DiskSpaceConfig) -> Result<()> {
    if !config.enabled {
        return Ok(());
    }

    let required = size_bytes.saturating_add(config.min_free_space);
    let available = get_available_space(dir).map_err(|e| {
        Error::DiskSpaceCheckFailed(format!(
            "Failed to check disk space for '{}': {}",
            dir.display(),
            e
        ))
    })?;

    if available < required {
        return Err(Error::InsufficientSpace {
            required,
            available,
        });
    }
    Ok(())
}

/// Bytes an unprivileged process may still write to the filesystem holding `path`
pub fn get_available_space(path: &Path) -> std::io::Result<u64> {
    free_space::available_bytes(path)
}

#[cfg(unix)]
mod free_space {
    use std::ffi::CString;
    use std::io;
    use std::os::unix::ffi::OsStrExt;
    use std::path::Path;

    pub(super) fn available_bytes(path: &Path) -> io::Result<u64> {
        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let mut stat = std::mem::MaybeUninit::<libc::statvfs>::uninit();

        // SAFETY: c_path is NUL-terminated and `stat` is only read after
        // statvfs reports that it filled it in.
        let stat = unsafe {
            if libc::statvfs(c_path.as_ptr(), stat.as_mut_ptr()) != 0 {
                return Err(io::Error::last_os_error());
            }
            stat.assume_init()
        };

        #[allow(clippy::unnecessary_cast)]
        Ok((stat.f_bavail as u64).saturating_mul(stat.f_frsize as u64))
    }
}

#[cfg(windows)]
mod free_space {
    use std::io;
    use std::os::windows::ffi::OsStrExt;
    use std::path::Path;

    use winapi::shared::ntdef::ULARGE_INTEGER;
    use winapi::um::fileapi::GetDiskFreeSpaceExW;

    pub(super) fn available_bytes(path: &Path) -> io::Result<u64> {
        let wide: Vec<u16> = path.as_os_str().encode_wide().chain(Some(0)).collect();
        // SAFETY: ULARGE_INTEGER is plain data; zeroed is a valid value.
        let mut caller_free: ULARGE_INTEGER = unsafe { std::mem::zeroed() };

        // SAFETY: `wide` is NUL-terminated; the totals are optional and passed
        // as null, the caller-available count points at a live value.
        let ok = unsafe {
            GetDiskFreeSpaceExW(
                wide.as_ptr(),
                &mut caller_free,
                std::ptr::null_mut(),
                std::ptr::null_mut(),
            )
        };
        if ok == 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: the union's QuadPart view covers the whole 64-bit value.
        Ok(unsafe { *caller_free.QuadPart() })
    }
}

#[cfg(not(any(unix, windows)))]
mod free_space {
    use std::io;
    use std::path::Path;

    pub(super) fn available_bytes(_path: &Path) -> io::Result<u64> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "free space query unavailable on this platform",
        ))
    }
}
