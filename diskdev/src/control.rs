//! The control device (`spec.md` §3 "ControlDevice", §4.6).
//!
//! Has no queue of its own: Create/Close/Cleanup/DeviceControl all delegate
//! to the disk device so the same PnP gating and worker serialisation apply.

use crate::device::{ControlRequest, ControlResponse, DiskDevice};
use crate::request::FileId;
use saferamdisk_core::config::{CONTROL_DEVICE_NAME, CONTROL_DOS_ALIAS};
use saferamdisk_core::Result;
use std::sync::Arc;

pub struct ControlDevice {
    disk: Arc<DiskDevice>,
    device_name: String,
    dos_alias: String,
}

impl ControlDevice {
    /// `spec.md` §4.6 "Construction": created just after the disk device's
    /// `AddDevice` succeeds.
    pub fn new(disk: Arc<DiskDevice>) -> Arc<Self> {
        Arc::new(ControlDevice {
            disk,
            device_name: CONTROL_DEVICE_NAME.to_string(),
            dos_alias: CONTROL_DOS_ALIAS.to_string(),
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn dos_alias(&self) -> &str {
        &self.dos_alias
    }

    pub fn disk(&self) -> &Arc<DiskDevice> {
        &self.disk
    }

    pub fn create(&self, filename: &str) -> Result<()> {
        self.disk.create(filename)
    }

    pub fn close(&self) -> Result<()> {
        self.disk.close()
    }

    /// Delegates to the disk device's Cleanup, which synthesises a
    /// DISENGAGE on the worker thread if this handle was engaged.
    pub fn cleanup(&self, file_id: FileId) -> Result<()> {
        self.disk.cleanup(file_id)
    }

    pub fn device_control(&self, request: ControlRequest) -> Result<ControlResponse> {
        self.disk.device_control(request)
    }
}
