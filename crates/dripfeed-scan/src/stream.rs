//! Seekable directory streams.
//!
//! A [`DirStream`] reads one directory entry at a time and can report and
//! restore its position, so a paused traversal can continue exactly where
//! it stopped. The handle is released when the stream is dropped.

use std::ffi::OsString;

/// Entry type as reported by the directory stream itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirentKind {
    /// Directory.
    Directory,
    /// Regular file.
    File,
    /// Symbolic link (target type unknown).
    Symlink,
    /// Sockets, devices, pipes.
    Other,
    /// The stream did not say; a status query is needed.
    Unknown,
}

impl DirentKind {
    /// Whether a status query is needed to tell directories from files.
    pub fn needs_stat(self) -> bool {
        matches!(self, Self::Symlink | Self::Unknown)
    }
}

/// One raw entry read from a directory stream.
#[derive(Debug, Clone)]
pub struct RawEntry {
    /// Entry name, relative to the directory.
    pub name: OsString,
    /// Type reported by the stream.
    pub kind: DirentKind,
}

impl RawEntry {
    /// Whether this is the `.` or `..` pseudo-entry.
    pub fn is_pseudo(&self) -> bool {
        self.name == "." || self.name == ".."
    }
}

#[cfg(target_os = "linux")]
pub use posix::DirStream;

#[cfg(not(target_os = "linux"))]
pub use portable::DirStream;

#[cfg(target_os = "linux")]
mod posix {
    use std::ffi::{CStr, CString, OsString};
    use std::io;
    use std::os::unix::ffi::{OsStrExt, OsStringExt};
    use std::path::Path;
    use std::ptr::NonNull;

    use dripfeed_core::StreamPosition;

    use super::{DirentKind, RawEntry};

    /// Directory stream backed by the C library's `DIR` handle.
    ///
    /// Positions come from `telldir`. On Linux they are the filesystem's own
    /// entry offsets, so they stay valid across handles for the same
    /// unchanged directory.
    pub struct DirStream {
        dir: NonNull<libc::DIR>,
    }

    impl DirStream {
        /// Open a directory for reading.
        pub fn open(path: &Path) -> io::Result<Self> {
            let c_path = CString::new(path.as_os_str().as_bytes())
                .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains a nul byte"))?;

            // Safety: c_path is a valid nul-terminated string for the duration of the call
            let dir = unsafe { libc::opendir(c_path.as_ptr()) };
            NonNull::new(dir)
                .map(|dir| Self { dir })
                .ok_or_else(io::Error::last_os_error)
        }

        /// Read the next entry, `None` at end of stream.
        pub fn next_entry(&mut self) -> io::Result<Option<RawEntry>> {
            // readdir only reports errors through errno.
            // Safety: errno is thread-local, and dir is open until Drop
            unsafe { *errno_location() = 0 };
            let dirent = unsafe { libc::readdir(self.dir.as_ptr()) };

            if dirent.is_null() {
                let err = io::Error::last_os_error();
                return match err.raw_os_error() {
                    Some(0) | None => Ok(None),
                    Some(_) => Err(err),
                };
            }

            // Safety: dirent is valid until the next readdir or closedir on this handle
            let (name, d_type) = unsafe {
                let d = &*dirent;
                (CStr::from_ptr(d.d_name.as_ptr()).to_bytes().to_vec(), d.d_type)
            };

            Ok(Some(RawEntry {
                name: OsString::from_vec(name),
                kind: kind_from_d_type(d_type),
            }))
        }

        /// Current position, to be passed to [`DirStream::seek`] later.
        pub fn tell(&self) -> StreamPosition {
            // Safety: dir came from a successful opendir and is closed only in Drop
            let raw = unsafe { libc::telldir(self.dir.as_ptr()) };
            StreamPosition::new(raw as i64)
        }

        /// Continue reading from a position returned by [`DirStream::tell`].
        pub fn seek(&mut self, position: StreamPosition) {
            // Safety: dir is open; positions from another directory only misplace
            // the next readdir, they cannot make it read out of bounds
            unsafe { libc::seekdir(self.dir.as_ptr(), position.get() as libc::c_long) }
        }

        /// Go back to the first entry.
        pub fn rewind(&mut self) {
            // Safety: dir is open until Drop
            unsafe { libc::rewinddir(self.dir.as_ptr()) }
        }
    }

    impl Drop for DirStream {
        fn drop(&mut self) {
            // Safety: dir is open and never used again after this
            unsafe {
                libc::closedir(self.dir.as_ptr());
            }
        }
    }

    fn kind_from_d_type(d_type: u8) -> DirentKind {
        match d_type {
            libc::DT_DIR => DirentKind::Directory,
            libc::DT_REG => DirentKind::File,
            libc::DT_LNK => DirentKind::Symlink,
            libc::DT_UNKNOWN => DirentKind::Unknown,
            _ => DirentKind::Other,
        }
    }

    unsafe fn errno_location() -> *mut libc::c_int {
        unsafe { libc::__errno_location() }
    }
}

#[cfg(not(target_os = "linux"))]
mod portable {
    use std::fs;
    use std::io;
    use std::path::{Path, PathBuf};

    use dripfeed_core::StreamPosition;

    use super::{DirentKind, RawEntry};

    /// Directory stream over [`std::fs::read_dir`].
    ///
    /// The position is the number of entries consumed; seeking re-opens the
    /// directory and skips that many entries.
    pub struct DirStream {
        path: PathBuf,
        entries: fs::ReadDir,
        position: i64,
    }

    impl DirStream {
        /// Open a directory for reading.
        pub fn open(path: &Path) -> io::Result<Self> {
            Ok(Self {
                path: path.to_path_buf(),
                entries: fs::read_dir(path)?,
                position: 0,
            })
        }

        /// Read the next entry, `None` at end of stream.
        pub fn next_entry(&mut self) -> io::Result<Option<RawEntry>> {
            let Some(entry) = self.entries.next() else {
                return Ok(None);
            };
            let entry = entry?;
            self.position += 1;

            let kind = match entry.file_type() {
                Ok(ft) if ft.is_dir() => DirentKind::Directory,
                Ok(ft) if ft.is_file() => DirentKind::File,
                Ok(ft) if ft.is_symlink() => DirentKind::Symlink,
                Ok(_) => DirentKind::Other,
                Err(_) => DirentKind::Unknown,
            };

            Ok(Some(RawEntry {
                name: entry.file_name(),
                kind,
            }))
        }

        /// Current position, to be passed to [`DirStream::seek`] later.
        pub fn tell(&self) -> StreamPosition {
            StreamPosition::new(self.position)
        }

        /// Continue reading from a position returned by [`DirStream::tell`].
        pub fn seek(&mut self, position: StreamPosition) {
            let Ok(entries) = fs::read_dir(&self.path) else {
                return;
            };
            self.entries = entries;
            self.position = 0;
            while self.position < position.get() {
                if self.entries.next().is_none() {
                    break;
                }
                self.position += 1;
            }
        }

        /// Go back to the first entry.
        pub fn rewind(&mut self) {
            self.seek(StreamPosition::START);
        }
    }
}
