//! The disk FDO: owns the image, the request queue, the PnP state and the
//! worker thread (`spec.md` §3 "DiskDevice", §4.4 "Disk Device IRP
//! Dispatch").

use crate::control::ControlDevice;
use crate::pnp_machine::{LowerDevice, NullLowerDevice, PnpMinorFunction};
use crate::queue::RequestQueue;
use crate::request::{FileId, QueuedRequest, Request, Response};
use crate::worker;
use log::{debug, info, trace};
use saferamdisk_core::error::DriverError;
use saferamdisk_core::{DiskConfig, DiskGeometry, PartitionType, PnpState, RemoveLock, Result};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

/// Sanity tag; any device extension claiming to be a `DiskDevice` must carry
/// this (`spec.md` §3 "magic").
pub const DISK_DEVICE_MAGIC: u32 = 0x5341_4645; // "SAFE"

/// `DISK_GET_DRIVE_GEOMETRY` and friends (`spec.md` §4.4, §6).
#[derive(Debug, Clone, Copy)]
pub enum ControlRequest {
    CheckVerify,
    GetDriveGeometry { output_buffer_len: usize },
    IsWritable,
    Engage { file_id: FileId },
    Disengage { file_id: FileId },
}

#[derive(Debug, Clone)]
pub enum ControlResponse {
    Success,
    Geometry([u8; 24]),
    EngageCount(i64),
}

pub struct DiskDevice {
    magic: u32,
    image: Arc<Mutex<Vec<u8>>>,
    image_size: u64,
    geometry: DiskGeometry,
    partition_type: PartitionType,
    pnp_state: Mutex<PnpState>,
    remove_lock: RemoveLock,
    queue: Arc<RequestQueue>,
    worker: Mutex<Option<JoinHandle<()>>>,
    lower_device: Arc<dyn LowerDevice>,
    control_device: Mutex<Option<Arc<ControlDevice>>>,
}

impl DiskDevice {
    /// Allocates and formats the image, then starts the worker thread.
    /// `spec.md` §3 lifecycle: "created on AddDevice, initialised by
    /// allocating the image and starting the worker".
    pub fn new(config: &DiskConfig) -> Result<Arc<Self>> {
        Self::with_lower_device(config, Arc::new(NullLowerDevice))
    }

    pub fn with_lower_device(config: &DiskConfig, lower_device: Arc<dyn LowerDevice>) -> Result<Arc<Self>> {
        let mut buf = vec![0u8; config.image_size as usize];
        let geometry = saferamdisk_formatters::format_image(&mut buf)?;
        info!(
            "formatted {}-byte image: {} cylinders, {} sectors/FAT",
            buf.len(),
            geometry.cylinders,
            geometry.sectors_per_fat
        );

        let image = Arc::new(Mutex::new(buf));
        let queue = Arc::new(RequestQueue::new());

        let worker_image = image.clone();
        let worker_queue = queue.clone();
        let handle = std::thread::Builder::new()
            .name("saferamdisk-worker".to_string())
            .spawn(move || worker::run(worker_image, worker_queue))
            .map_err(|e| DriverError::InsufficientResources(format!("failed to start worker thread: {e}")))?;

        Ok(Arc::new(DiskDevice {
            magic: DISK_DEVICE_MAGIC,
            image,
            image_size: config.image_size,
            geometry,
            partition_type: PartitionType::Fat32,
            pnp_state: Mutex::new(PnpState::NotStarted),
            remove_lock: RemoveLock::new(),
            queue,
            worker: Mutex::new(Some(handle)),
            lower_device,
            control_device: Mutex::new(None),
        }))
    }

    pub fn magic(&self) -> u32 {
        self.magic
    }

    pub fn geometry(&self) -> DiskGeometry {
        self.geometry
    }

    pub fn image_size(&self) -> u64 {
        self.image_size
    }

    pub fn partition_type(&self) -> PartitionType {
        self.partition_type
    }

    pub fn pnp_state(&self) -> PnpState {
        *self.pnp_state.lock().unwrap()
    }

    pub fn attach_control_device(&self, control: Arc<ControlDevice>) {
        *self.control_device.lock().unwrap() = Some(control);
    }

    fn accepts_io(&self) -> bool {
        self.pnp_state.lock().unwrap().accepts_io()
    }

    // ---- §4.4 dispatch ----

    /// **Create**: reject while not Started; reject a non-empty filename.
    pub fn create(&self, filename: &str) -> Result<()> {
        trace!("dispatch create({filename:?})");
        if !self.accepts_io() {
            return Err(DriverError::InvalidDeviceState(
                "device is not in the Started state".to_string(),
            ));
        }
        if !filename.is_empty() {
            return Err(DriverError::InvalidParameter(
                "a RAM disk has no namespace inside itself at create time".to_string(),
            ));
        }
        Ok(())
    }

    /// **Close**: always succeeds synchronously.
    pub fn close(&self) -> Result<()> {
        Ok(())
    }

    /// **Cleanup**: enqueued, but does not acquire the remove-lock — cleanup
    /// must always run even during teardown.
    pub fn cleanup(&self, file_id: FileId) -> Result<()> {
        trace!("dispatch cleanup(file_id={file_id})");
        let (tx, rx) = mpsc::channel();
        self.queue.enqueue(QueuedRequest {
            request: Request::Cleanup { file_id },
            reply: tx,
            remove_lock_guard: None,
        });
        match rx.recv() {
            Ok(Ok(Response::Cleanup)) => Ok(()),
            Ok(Ok(other)) => Err(DriverError::DriverInternalError(format!(
                "worker answered Cleanup with {other:?}"
            ))),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(DriverError::DriverInternalError(
                "worker dropped the reply channel".to_string(),
            )),
        }
    }

    /// **Read**: reject while not Started, then hand off to the worker with
    /// the remove-lock's release responsibility transferred along.
    pub fn read(&self, offset: u64, length: usize) -> Result<(Vec<u8>, usize)> {
        trace!("dispatch read(offset={offset}, length={length})");
        if !self.accepts_io() {
            return Err(DriverError::InvalidDeviceState(
                "device is not in the Started state".to_string(),
            ));
        }
        let guard = self.remove_lock.acquire().ok_or_else(|| {
            DriverError::InvalidDeviceState("device is being removed".to_string())
        })?;

        let (tx, rx) = mpsc::channel();
        self.queue.enqueue(QueuedRequest {
            request: Request::Read { offset, length },
            reply: tx,
            remove_lock_guard: Some(guard),
        });
        match rx.recv() {
            Ok(Ok(Response::Read { data, information })) => Ok((data, information)),
            Ok(Ok(other)) => Err(DriverError::DriverInternalError(format!(
                "worker answered Read with {other:?}"
            ))),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(DriverError::DriverInternalError(
                "worker dropped the reply channel".to_string(),
            )),
        }
    }

    /// **Write**: same gating and hand-off as Read.
    pub fn write(&self, offset: u64, data: Vec<u8>) -> Result<usize> {
        trace!("dispatch write(offset={offset}, length={})", data.len());
        if !self.accepts_io() {
            return Err(DriverError::InvalidDeviceState(
                "device is not in the Started state".to_string(),
            ));
        }
        let guard = self.remove_lock.acquire().ok_or_else(|| {
            DriverError::InvalidDeviceState("device is being removed".to_string())
        })?;

        let (tx, rx) = mpsc::channel();
        self.queue.enqueue(QueuedRequest {
            request: Request::Write { offset, data },
            reply: tx,
            remove_lock_guard: Some(guard),
        });
        match rx.recv() {
            Ok(Ok(Response::Write { information })) => Ok(information),
            Ok(Ok(other)) => Err(DriverError::DriverInternalError(format!(
                "worker answered Write with {other:?}"
            ))),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(DriverError::DriverInternalError(
                "worker dropped the reply channel".to_string(),
            )),
        }
    }

    /// **DeviceControl**: `CheckVerify`/`GetDriveGeometry`/`IsWritable`
    /// handled inline; `Engage`/`Disengage` enqueued to the worker.
    pub fn device_control(&self, request: ControlRequest) -> Result<ControlResponse> {
        trace!("dispatch device_control({request:?})");
        if !self.accepts_io() {
            return Err(DriverError::InvalidDeviceState(
                "device is not in the Started state".to_string(),
            ));
        }
        let guard = self.remove_lock.acquire().ok_or_else(|| {
            DriverError::InvalidDeviceState("device is being removed".to_string())
        })?;

        match request {
            ControlRequest::CheckVerify => Ok(ControlResponse::Success),
            ControlRequest::IsWritable => Ok(ControlResponse::Success),
            ControlRequest::GetDriveGeometry { output_buffer_len } => {
                let encoded = self.geometry.to_bytes();
                if output_buffer_len < encoded.len() {
                    return Err(DriverError::BufferTooSmall {
                        needed: encoded.len(),
                        got: output_buffer_len,
                    });
                }
                Ok(ControlResponse::Geometry(encoded))
            }
            ControlRequest::Engage { file_id } => {
                let (tx, rx) = mpsc::channel();
                self.queue.enqueue(QueuedRequest {
                    request: Request::Engage { file_id },
                    reply: tx,
                    remove_lock_guard: Some(guard),
                });
                match rx.recv() {
                    Ok(Ok(Response::Engage { engage_count })) => {
                        Ok(ControlResponse::EngageCount(engage_count))
                    }
                    Ok(Ok(other)) => Err(DriverError::DriverInternalError(format!(
                        "worker answered Engage with {other:?}"
                    ))),
                    Ok(Err(e)) => Err(e),
                    Err(_) => Err(DriverError::DriverInternalError(
                        "worker dropped the reply channel".to_string(),
                    )),
                }
            }
            ControlRequest::Disengage { file_id } => {
                let (tx, rx) = mpsc::channel();
                self.queue.enqueue(QueuedRequest {
                    request: Request::Disengage { file_id },
                    reply: tx,
                    remove_lock_guard: Some(guard),
                });
                match rx.recv() {
                    Ok(Ok(Response::Disengage { engage_count })) => {
                        Ok(ControlResponse::EngageCount(engage_count))
                    }
                    Ok(Ok(other)) => Err(DriverError::DriverInternalError(format!(
                        "worker answered Disengage with {other:?}"
                    ))),
                    Ok(Err(e)) => Err(e),
                    Err(_) => Err(DriverError::DriverInternalError(
                        "worker dropped the reply channel".to_string(),
                    )),
                }
            }
        }
    }

    /// **PnP**: `spec.md` §4.5. Acquires the remove-lock for the duration of
    /// the state transition; `RemoveDevice` instead transfers it into
    /// release-and-wait.
    pub fn dispatch_pnp(&self, minor: PnpMinorFunction) -> Result<()> {
        debug!("dispatch_pnp({minor:?}), current state {:?}", self.pnp_state());
        let guard = self.remove_lock.acquire().ok_or_else(|| {
            DriverError::InvalidDeviceState("device is being removed".to_string())
        })?;

        let mut state = self.pnp_state.lock().unwrap();
        match minor {
            PnpMinorFunction::StartDevice => {
                if *state != PnpState::NotStarted {
                    return Err(DriverError::InvalidDeviceState(
                        "START_DEVICE outside NotStarted".to_string(),
                    ));
                }
                drop(state);
                self.lower_device.start_device()?;
                *self.pnp_state.lock().unwrap() = PnpState::Started;
                Ok(())
            }
            PnpMinorFunction::QueryStopDevice => {
                require_state(&state, PnpState::Started)?;
                *state = PnpState::StopPending;
                Ok(())
            }
            PnpMinorFunction::CancelStopDevice => {
                require_state(&state, PnpState::StopPending)?;
                *state = PnpState::Started;
                Ok(())
            }
            PnpMinorFunction::StopDevice => {
                require_state(&state, PnpState::StopPending)?;
                *state = PnpState::Stopped;
                Ok(())
            }
            PnpMinorFunction::QueryRemoveDevice => {
                require_state(&state, PnpState::Started)?;
                *state = PnpState::RemovePending;
                Ok(())
            }
            PnpMinorFunction::CancelRemoveDevice => {
                require_state(&state, PnpState::RemovePending)?;
                *state = PnpState::Started;
                Ok(())
            }
            PnpMinorFunction::SurpriseRemoval => {
                *state = PnpState::SurpriseRemovePending;
                Ok(())
            }
            PnpMinorFunction::RemoveDevice => {
                *state = PnpState::Deleted;
                drop(state);
                drop(guard);
                let lower_result = self.lower_device.remove_device();
                self.remove_lock.release_and_wait();
                if let Err(e) = &lower_result {
                    log::error!("lower device failed to complete REMOVE_DEVICE: {e}");
                }
                lower_result
            }
            PnpMinorFunction::Other => Ok(()),
        }
    }

    /// **Power**: start-next-power-IRP / skip-location / pass-down is a
    /// no-op here; there is no lower power policy to coordinate with.
    pub fn dispatch_power(&self) -> Result<()> {
        Ok(())
    }

    /// **SystemControl (WMI)**: skip-location / pass-down, also a no-op.
    pub fn dispatch_system_control(&self) -> Result<()> {
        Ok(())
    }
}

fn require_state(state: &PnpState, expected: PnpState) -> Result<()> {
    if *state != expected {
        return Err(DriverError::InvalidDeviceState(format!(
            "expected PnP state {expected:?}, found {state:?}"
        )));
    }
    Ok(())
}

impl Drop for DiskDevice {
    /// `spec.md` §5 "Cancellation": "set terminate_event, wait on worker
    /// thread handle, then free the image buffer."
    fn drop(&mut self) {
        self.queue.signal_terminate();
        if let Some(handle) = self.worker.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}
