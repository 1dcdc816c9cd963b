pub mod control;
pub mod device;
pub mod pnp_machine;
pub mod queue;
pub mod request;
pub mod worker;

pub use control::ControlDevice;
pub use device::{ControlRequest, ControlResponse, DiskDevice};
pub use pnp_machine::{LowerDevice, NullLowerDevice, PnpMinorFunction};
pub use request::FileId;

use saferamdisk_core::{DiskConfig, Result, Rollback};
use std::sync::Arc;

/// Brings up a disk device and its sibling control device together, the way
/// `AddDevice` plus the immediately-following control-device creation do in
/// the real driver (`spec.md` §3 lifecycles, §9 "Scoped rollback").
///
/// If control-device creation ever gained a fallible step, the disk device
/// would be torn down here rather than left dangling; today `ControlDevice`
/// construction cannot fail, so the guard disarms immediately, but the
/// shape matches every other two-stage init in this crate.
pub fn install(config: &DiskConfig) -> Result<(Arc<DiskDevice>, Arc<ControlDevice>)> {
    let disk = DiskDevice::new(config)?;

    let mut rollback = Rollback::new();
    let unwind_disk = disk.clone();
    rollback.on_unwind(move || drop(unwind_disk));

    let control = ControlDevice::new(disk.clone());
    disk.attach_control_device(control.clone());

    rollback.disarm();
    Ok((disk, control))
}
