//! The Reparse Engager: installs and removes the mount-point reparse point
//! that redirects the host's `TfsStore\Tfs_DAV` directory onto the RAM
//! disk's device namespace.
//!
//! Only meaningful on Windows, where reparse points and the registry this
//! routine reads exist. On every other target the engager is a stub that
//! fails with `PlatformNotSupported`, matching how the teacher splits
//! platform-specific device handling out of `core`.

#[cfg(windows)]
mod windows_engager;
#[cfg(windows)]
pub use windows_engager::{disengage, engage, ReparseHandle};

#[cfg(not(windows))]
mod stub_engager;
#[cfg(not(windows))]
pub use stub_engager::{disengage, engage, ReparseHandle};

/// Target directory redirected onto the disk device (`spec.md` §4.7 step 2).
pub const REPARSE_TARGET: &str = r"\Device\SafeRamDisk\";

/// Suffix applied to a pre-existing directory backed up out of the way.
pub const BACKUP_SUFFIX: &str = "-SafeBackup";
