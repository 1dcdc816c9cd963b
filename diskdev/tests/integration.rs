//! End-to-end coverage of the dispatch core against a real worker thread
//! (`spec.md` §8 "Concrete scenarios").

use saferamdisk_core::error::DriverError;
use saferamdisk_core::DiskConfig;
use saferamdisk_diskdev::device::ControlRequest;
use saferamdisk_diskdev::pnp_machine::PnpMinorFunction;
use saferamdisk_diskdev::{install, DiskDevice};
use std::sync::Arc;

fn started_device() -> Arc<DiskDevice> {
    let config = DiskConfig::new(1024 * 1024).unwrap();
    let (disk, _control) = install(&config).unwrap();
    disk.dispatch_pnp(PnpMinorFunction::StartDevice).unwrap();
    disk
}

#[test]
fn read_write_round_trip_goes_through_the_worker() {
    let disk = started_device();
    let payload = vec![1u8, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16];

    let written = disk.write(4096, payload.clone()).unwrap();
    assert_eq!(written, payload.len());

    let (data, information) = disk.read(4096, payload.len()).unwrap();
    assert_eq!(information, payload.len());
    assert_eq!(data, payload);
}

#[test]
fn short_transfer_at_end_of_disk() {
    let disk = started_device();
    let image_size = disk.image_size();

    let (data, information) = disk.read(image_size - 512, 1024).unwrap();
    assert_eq!(information, 512);
    assert_eq!(data.len(), 512);
}

#[test]
fn state_gating_rejects_io_before_start() {
    let config = DiskConfig::new(1024 * 1024).unwrap();
    let (disk, _control) = install(&config).unwrap();

    let result = disk.device_control(ControlRequest::GetDriveGeometry { output_buffer_len: 24 });
    assert!(matches!(result, Err(DriverError::InvalidDeviceState(_))));

    assert!(matches!(
        disk.read(0, 16),
        Err(DriverError::InvalidDeviceState(_))
    ));
    assert!(matches!(
        disk.write(0, vec![0u8; 16]),
        Err(DriverError::InvalidDeviceState(_))
    ));
    assert!(matches!(
        disk.create("not-empty"),
        Err(_)
    ));
}

#[test]
fn create_rejects_non_empty_filename_once_started() {
    let disk = started_device();
    assert!(disk.create("").is_ok());
    assert!(matches!(disk.create("subpath"), Err(DriverError::InvalidParameter(_))));
}

#[test]
fn geometry_ioctl_reports_buffer_too_small() {
    let disk = started_device();
    let result = disk.device_control(ControlRequest::GetDriveGeometry { output_buffer_len: 4 });
    assert!(matches!(result, Err(DriverError::BufferTooSmall { .. })));
}

#[test]
fn surprise_removal_then_new_read_is_rejected() {
    let disk = started_device();

    // An in-flight read started just before surprise removal must still
    // complete normally.
    let handle = {
        let disk = disk.clone();
        std::thread::spawn(move || disk.read(0, 16))
    };
    assert!(handle.join().unwrap().is_ok());

    disk.dispatch_pnp(PnpMinorFunction::SurpriseRemoval).unwrap();
    assert!(matches!(
        disk.read(0, 16),
        Err(DriverError::InvalidDeviceState(_))
    ));
}

#[test]
fn pnp_stop_and_cancel_stop_round_trip() {
    let disk = started_device();
    disk.dispatch_pnp(PnpMinorFunction::QueryStopDevice).unwrap();
    disk.dispatch_pnp(PnpMinorFunction::CancelStopDevice).unwrap();
    assert!(disk.read(0, 16).is_ok());
}

#[test]
fn remove_device_drains_in_flight_requests_before_returning() {
    let disk = started_device();

    // Queue up a write before removal so there is something in flight.
    assert!(disk.write(0, vec![7u8; 16]).is_ok());

    disk.dispatch_pnp(PnpMinorFunction::RemoveDevice).unwrap();
    assert_eq!(disk.pnp_state(), saferamdisk_core::PnpState::Deleted);

    // The device is gone; no further IRPs are accepted.
    assert!(matches!(
        disk.read(0, 16),
        Err(DriverError::InvalidDeviceState(_))
    ));
}

#[cfg(not(windows))]
#[test]
fn engage_surfaces_platform_not_supported_off_windows() {
    let disk = started_device();
    let result = disk.device_control(ControlRequest::Engage { file_id: 1 });
    assert!(matches!(result, Err(DriverError::PlatformNotSupported(_))));
}
