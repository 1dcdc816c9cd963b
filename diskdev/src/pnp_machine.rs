//! The lower device in the stack (`spec.md` §4.5 "call down", §9 external
//! collaborators: "a host kernel object model providing device objects...
//! and a PnP/Power stack" — explicitly out of scope, so it's represented
//! here as a trait the disk device calls through, with a synchronous
//! null implementation standing in for a PDO that always succeeds).

use saferamdisk_core::Result;

pub trait LowerDevice: Send + Sync {
    /// `IRP_MN_START_DEVICE` pass-down. The real driver blocks on a local
    /// completion event until this returns; here the call is synchronous.
    fn start_device(&self) -> Result<()> {
        Ok(())
    }

    /// `IRP_MN_REMOVE_DEVICE` pass-down, issued asynchronously after the
    /// remove-lock has been handed to release-and-wait.
    fn remove_device(&self) -> Result<()> {
        Ok(())
    }
}

/// A PDO that always succeeds instantly. Used when no physical bus backs
/// this device (the common case for a pure RAM disk).
pub struct NullLowerDevice;

impl LowerDevice for NullLowerDevice {}

/// `spec.md` §4.4 "PnP" / §4.5 minor-function table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PnpMinorFunction {
    StartDevice,
    QueryStopDevice,
    CancelStopDevice,
    StopDevice,
    QueryRemoveDevice,
    CancelRemoveDevice,
    SurpriseRemoval,
    RemoveDevice,
    Other,
}
