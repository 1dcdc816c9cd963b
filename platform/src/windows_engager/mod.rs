//! Windows implementation of the Reparse Engager (`spec.md` §4.7).
//!
//! Every file-system touch here is the kind of paged, blocking work the
//! worker thread is the only place allowed to do; callers on the dispatch
//! path must not call into this module directly.

mod registry;
mod reparse_data;

use crate::{BACKUP_SUFFIX, REPARSE_TARGET};
use log::{debug, info};
use saferamdisk_core::error::{DriverError, Result};
use std::ffi::OsStr;
use std::os::windows::ffi::OsStrExt;
use windows::core::PCWSTR;
use windows::Win32::Foundation::{BOOLEAN, CloseHandle, HANDLE, DELETE, GENERIC_ALL, SYNCHRONIZE};
use windows::Win32::Storage::FileSystem::{
    CreateFileW, MoveFileExW, SetFileInformationByHandle, FileDispositionInfo,
    FILE_ATTRIBUTE_DIRECTORY, FILE_DISPOSITION_INFO, FILE_FLAG_BACKUP_SEMANTICS,
    FILE_FLAG_DELETE_ON_CLOSE, FILE_FLAG_OPEN_REPARSE_POINT, FILE_SHARE_DELETE, FILE_SHARE_READ,
    FILE_SHARE_WRITE, MOVE_FILE_FLAGS, OPEN_EXISTING,
};
use windows::Win32::System::Ioctl::{FSCTL_GET_REPARSE_POINT, FSCTL_SET_REPARSE_POINT};
use windows::Win32::System::IO::DeviceIoControl;

pub struct ReparseHandle(HANDLE);

// HANDLE is just a pointer-sized value here; the handle itself is only ever
// touched from the worker thread, same discipline as `engage_count`.
unsafe impl Send for ReparseHandle {}

fn wide(s: &str) -> Vec<u16> {
    OsStr::new(s).encode_wide().chain(std::iter::once(0)).collect()
}

fn target_path(system_root: &str) -> String {
    format!(
        r"\??\{}\ServiceProfiles\LocalService\AppData\Local\Temp\TfsStore\Tfs_DAV",
        system_root
    )
}

fn parent_path(target: &str) -> &str {
    target.rsplit_once('\\').map(|(parent, _)| parent).unwrap_or(target)
}

fn open_existing_reparse_dir(path: &[u16]) -> Option<HANDLE> {
    unsafe {
        let handle = CreateFileW(
            PCWSTR::from_raw(path.as_ptr()),
            GENERIC_ALL.0,
            FILE_SHARE_READ | FILE_SHARE_WRITE | FILE_SHARE_DELETE,
            None,
            OPEN_EXISTING,
            FILE_FLAG_BACKUP_SEMANTICS | FILE_FLAG_OPEN_REPARSE_POINT,
            None,
        )
        .ok()?;
        if handle.is_invalid() {
            None
        } else {
            Some(handle)
        }
    }
}

fn read_reparse_substitute_name(handle: HANDLE) -> Option<String> {
    let mut buf = vec![0u8; 16 * 1024];
    let mut returned = 0u32;
    let ok = unsafe {
        DeviceIoControl(
            handle,
            FSCTL_GET_REPARSE_POINT,
            None,
            0,
            Some(buf.as_mut_ptr() as *mut _),
            buf.len() as u32,
            Some(&mut returned),
            None,
        )
    };
    if ok.is_err() {
        return None;
    }
    buf.truncate(returned as usize);
    reparse_data::parse_mount_point_substitute_name(&buf)
}

fn ensure_parent_exists(parent: &[u16]) -> Result<()> {
    unsafe {
        let handle = CreateFileW(
            PCWSTR::from_raw(parent.as_ptr()),
            0,
            FILE_SHARE_READ | FILE_SHARE_WRITE | FILE_SHARE_DELETE,
            None,
            OPEN_EXISTING,
            FILE_FLAG_BACKUP_SEMANTICS,
            None,
        );
        match handle {
            Ok(h) if !h.is_invalid() => {
                let _ = CloseHandle(h);
                Ok(())
            }
            _ => {
                let created = CreateFileW(
                    PCWSTR::from_raw(parent.as_ptr()),
                    GENERIC_ALL.0,
                    FILE_SHARE_READ | FILE_SHARE_WRITE | FILE_SHARE_DELETE,
                    None,
                    windows::Win32::Storage::FileSystem::CREATE_NEW,
                    FILE_FLAG_BACKUP_SEMANTICS | FILE_ATTRIBUTE_DIRECTORY.0,
                    None,
                )
                .map_err(|e| {
                    DriverError::DriverInternalError(format!("create TfsStore directory failed: {e}"))
                })?;
                let _ = CloseHandle(created);
                Ok(())
            }
        }
    }
}

/// Renames `from` to `to`, tolerating both "`from` doesn't exist" and "`to`
/// already exists" — `spec.md` §4.7 step 4 leaves any older backup alone
/// rather than clobbering it, so this never passes `MOVEFILE_REPLACE_EXISTING`.
fn rename_ignoring_missing(from: &str, to: &str) -> Result<()> {
    let from_w = wide(from);
    let to_w = wide(to);
    let ok = unsafe {
        MoveFileExW(
            PCWSTR::from_raw(from_w.as_ptr()),
            PCWSTR::from_raw(to_w.as_ptr()),
            MOVE_FILE_FLAGS(0),
        )
    };
    if ok.is_err() {
        let err = windows::core::Error::from_win32();
        const ERROR_FILE_NOT_FOUND: i32 = 2;
        const ERROR_PATH_NOT_FOUND: i32 = 3;
        const ERROR_ALREADY_EXISTS: i32 = 183;
        let code = err.code().0 & 0xFFFF;
        if code == ERROR_FILE_NOT_FOUND || code == ERROR_PATH_NOT_FOUND || code == ERROR_ALREADY_EXISTS {
            return Ok(());
        }
        return Err(DriverError::DriverInternalError(format!(
            "rename {} -> {} failed: {}",
            from, to, err
        )));
    }
    Ok(())
}

/// Marks an already-open handle delete-on-close via `FileDispositionInfo`,
/// used on the idempotent re-engage path where the directory was opened
/// without `FILE_FLAG_DELETE_ON_CLOSE` (`spec.md` §4.7 step 3).
fn mark_delete_on_close(handle: HANDLE) -> Result<()> {
    let info = FILE_DISPOSITION_INFO { DeleteFile: BOOLEAN(1) };
    unsafe {
        SetFileInformationByHandle(
            handle,
            FileDispositionInfo,
            &info as *const _ as *const _,
            std::mem::size_of::<FILE_DISPOSITION_INFO>() as u32,
        )
    }
    .map_err(|e| DriverError::DriverInternalError(format!("marking reparse directory delete-on-close failed: {e}")))
}

/// `spec.md` §4.7 `engage`.
pub fn engage() -> Result<ReparseHandle> {
    let system_root = registry::read_system_root()?;
    let path = target_path(&system_root);
    let path_w = wide(&path);

    if let Some(existing) = open_existing_reparse_dir(&path_w) {
        let substitute = read_reparse_substitute_name(existing);
        if substitute.as_deref().map(|s| s.eq_ignore_ascii_case(REPARSE_TARGET)).unwrap_or(false) {
            debug!("reparse point at {path} already targets us, reusing the handle");
            if let Err(e) = mark_delete_on_close(existing) {
                unsafe { let _ = CloseHandle(existing); }
                return Err(e);
            }
            return Ok(ReparseHandle(existing));
        }
        unsafe { let _ = CloseHandle(existing); }
    }

    let backup = format!("{}{}", path, BACKUP_SUFFIX);
    rename_ignoring_missing(&path, &backup)?;

    let parent = wide(parent_path(&path));
    ensure_parent_exists(&parent)?;

    let handle = unsafe {
        CreateFileW(
            PCWSTR::from_raw(path_w.as_ptr()),
            (DELETE.0 | GENERIC_ALL.0 | SYNCHRONIZE.0) as u32,
            FILE_SHARE_READ | FILE_SHARE_WRITE | FILE_SHARE_DELETE,
            None,
            windows::Win32::Storage::FileSystem::CREATE_NEW,
            FILE_ATTRIBUTE_DIRECTORY.0
                | FILE_FLAG_OPEN_REPARSE_POINT.0
                | FILE_FLAG_DELETE_ON_CLOSE.0
                | FILE_FLAG_BACKUP_SEMANTICS.0,
            None,
        )
        .map_err(|e| DriverError::DriverInternalError(format!("create reparse directory failed: {e}")))?
    };

    let reparse_buf = reparse_data::build_mount_point_buffer(REPARSE_TARGET);
    let mut returned = 0u32;
    let ok = unsafe {
        DeviceIoControl(
            handle,
            FSCTL_SET_REPARSE_POINT,
            Some(reparse_buf.as_ptr() as *const _),
            reparse_buf.len() as u32,
            None,
            0,
            Some(&mut returned),
            None,
        )
    };
    if ok.is_err() {
        unsafe { let _ = CloseHandle(handle); }
        return Err(DriverError::DriverInternalError(
            "FSCTL_SET_REPARSE_POINT failed".to_string(),
        ));
    }

    info!("installed reparse point at {path}");
    Ok(ReparseHandle(handle))
}

/// `spec.md` §4.7 `disengage`.
pub fn disengage(handle: ReparseHandle) -> Result<()> {
    unsafe {
        CloseHandle(handle.0).map_err(|e| {
            DriverError::DriverInternalError(format!("closing reparse handle failed: {e}"))
        })?;
    }

    let system_root = registry::read_system_root()?;
    let path = target_path(&system_root);
    let backup = format!("{}{}", path, BACKUP_SUFFIX);
    rename_ignoring_missing(&backup, &path)?;
    info!("removed reparse point at {path}, restored backup if present");
    Ok(())
}
