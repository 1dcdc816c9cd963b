use log::warn;
use saferamdisk_core::error::{DriverError, Result};

/// Opaque handle to the reparse-point directory. No fields on non-Windows
/// targets; the type exists so callers can be platform-agnostic.
#[derive(Debug)]
pub struct ReparseHandle;

pub fn engage() -> Result<ReparseHandle> {
    warn!("reparse-point engage requested on a non-Windows target, refusing");
    Err(DriverError::PlatformNotSupported(
        "reparse-point engage is only implemented on Windows".to_string(),
    ))
}

pub fn disengage(_handle: ReparseHandle) -> Result<()> {
    warn!("reparse-point disengage requested on a non-Windows target, refusing");
    Err(DriverError::PlatformNotSupported(
        "reparse-point disengage is only implemented on Windows".to_string(),
    ))
}
