//! Reads the `SystemRoot` string value, grounded on the same `windows`-crate
//! unsafe-FFI style as `elevation.rs`'s token queries: open, query into a
//! stack buffer, always close.

use saferamdisk_core::error::{DriverError, Result};
use std::ffi::OsStr;
use std::os::windows::ffi::OsStrExt;
use windows::core::PCWSTR;
use windows::Win32::Foundation::ERROR_SUCCESS;
use windows::Win32::System::Registry::{
    RegCloseKey, RegOpenKeyExW, RegQueryValueExW, HKEY, HKEY_LOCAL_MACHINE, KEY_READ, REG_SZ,
};

fn wide(s: &str) -> Vec<u16> {
    OsStr::new(s).encode_wide().chain(std::iter::once(0)).collect()
}

/// Reads `HKLM\SOFTWARE\Microsoft\Windows NT\CurrentVersion\SystemRoot`.
pub fn read_system_root() -> Result<String> {
    let subkey = wide(r"SOFTWARE\Microsoft\Windows NT\CurrentVersion");
    let value_name = wide("SystemRoot");

    unsafe {
        let mut key = HKEY::default();
        let status = RegOpenKeyExW(
            HKEY_LOCAL_MACHINE,
            PCWSTR::from_raw(subkey.as_ptr()),
            0,
            KEY_READ,
            &mut key,
        );
        if status != ERROR_SUCCESS {
            return Err(DriverError::DriverInternalError(format!(
                "RegOpenKeyExW failed: {:?}",
                status
            )));
        }

        let mut buf = [0u16; 260];
        let mut buf_len = (buf.len() * std::mem::size_of::<u16>()) as u32;
        let mut value_type = REG_SZ.0;
        let status = RegQueryValueExW(
            key,
            PCWSTR::from_raw(value_name.as_ptr()),
            None,
            Some(&mut value_type as *mut _),
            Some(buf.as_mut_ptr() as *mut u8),
            Some(&mut buf_len),
        );
        let _ = RegCloseKey(key);

        if status != ERROR_SUCCESS {
            return Err(DriverError::DriverInternalError(format!(
                "RegQueryValueExW(SystemRoot) failed: {:?}",
                status
            )));
        }

        let chars = buf_len as usize / std::mem::size_of::<u16>();
        let end = buf[..chars].iter().position(|&c| c == 0).unwrap_or(chars);
        String::from_utf16(&buf[..end])
            .map_err(|e| DriverError::DriverInternalError(format!("SystemRoot not valid UTF-16: {}", e)))
    }
}
