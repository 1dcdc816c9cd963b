//! The dedicated worker thread (`spec.md` §4.3).
//!
//! Owns the image buffer lock, the reparse-engage state, and the per-handle
//! engaged-flag map — the only place any of those are touched, which is
//! what lets the rest of the dispatch path stay lock-free.

use crate::queue::RequestQueue;
use crate::request::{FileId, QueuedRequest, Request, Response};
use log::{debug, error, info, warn};
use saferamdisk_core::error::DriverError;
use saferamdisk_core::Result;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// `spec.md` §3 "ReparseState": owned by the worker thread, never a device
/// field. `engage_count == 0` iff `reparse_handle` is absent.
struct ReparseState {
    engage_count: i64,
    reparse_handle: Option<saferamdisk_platform::ReparseHandle>,
}

impl ReparseState {
    fn new() -> Self {
        ReparseState { engage_count: 0, reparse_handle: None }
    }
}

/// Runs until `queue.dequeue()` returns `None`. Asserts the reparse state is
/// fully unwound on exit (`spec.md` §4.3 "On exit, both `engage_count == 0`
/// and `reparse_handle` must be absent").
pub fn run(image: Arc<Mutex<Vec<u8>>>, queue: Arc<RequestQueue>) {
    info!("worker thread started, image size {} bytes", image.lock().unwrap().len());
    let mut reparse = ReparseState::new();
    let mut engaged: HashSet<FileId> = HashSet::new();

    while let Some(item) = queue.dequeue() {
        let QueuedRequest { request, reply, remove_lock_guard } = item;
        let result = dispatch(request, &image, &mut reparse, &mut engaged);
        if let Err(ref e) = result {
            error!("request failed: {e}");
        }
        let _ = reply.send(result);
        drop(remove_lock_guard);
    }

    assert_eq!(reparse.engage_count, 0, "worker exited with handles still engaged");
    assert!(reparse.reparse_handle.is_none(), "worker exited with a live reparse handle");
    info!("worker thread exiting");
}

fn dispatch(
    request: Request,
    image: &Mutex<Vec<u8>>,
    reparse: &mut ReparseState,
    engaged: &mut HashSet<FileId>,
) -> Result<Response> {
    match request {
        Request::Read { offset, length } => {
            let buf = image.lock().unwrap();
            let to_transfer = transferable(offset, length, buf.len() as u64);
            debug!("read offset={offset} length={length} -> {to_transfer} bytes");
            if to_transfer < length {
                warn!("short read at offset={offset}: requested {length}, transferred {to_transfer}");
            }
            let start = offset as usize;
            let data = buf[start..start + to_transfer].to_vec();
            Ok(Response::Read { data, information: to_transfer })
        }
        Request::Write { offset, data } => {
            let mut buf = image.lock().unwrap();
            let to_transfer = transferable(offset, data.len(), buf.len() as u64);
            debug!("write offset={offset} length={} -> {to_transfer} bytes", data.len());
            if to_transfer < data.len() {
                warn!("short write at offset={offset}: requested {}, transferred {to_transfer}", data.len());
            }
            let start = offset as usize;
            buf[start..start + to_transfer].copy_from_slice(&data[..to_transfer]);
            Ok(Response::Write { information: to_transfer })
        }
        Request::Engage { file_id } => engage(file_id, reparse, engaged),
        Request::Disengage { file_id } => disengage(file_id, reparse, engaged),
        Request::Cleanup { file_id } => {
            if engaged.contains(&file_id) {
                disengage(file_id, reparse, engaged)?;
            }
            Ok(Response::Cleanup)
        }
    }
}

fn transferable(offset: u64, length: usize, image_size: u64) -> usize {
    if offset >= image_size {
        return 0;
    }
    let remaining = image_size - offset;
    length.min(remaining as usize)
}

fn engage(
    file_id: FileId,
    reparse: &mut ReparseState,
    engaged: &mut HashSet<FileId>,
) -> Result<Response> {
    if engaged.contains(&file_id) {
        warn!("file_id={file_id} attempted to engage a handle that is already engaged");
        return Err(DriverError::InvalidDeviceState(
            "handle is already engaged".to_string(),
        ));
    }
    if reparse.engage_count == 0 {
        let handle = saferamdisk_platform::engage()?;
        reparse.reparse_handle = Some(handle);
    } else {
        debug!("engage: reparse already installed, sharing existing handle");
    }
    reparse.engage_count += 1;
    engaged.insert(file_id);
    info!("engaged file_id={file_id}, engage_count={}", reparse.engage_count);
    Ok(Response::Engage { engage_count: reparse.engage_count })
}

fn disengage(
    file_id: FileId,
    reparse: &mut ReparseState,
    engaged: &mut HashSet<FileId>,
) -> Result<Response> {
    if !engaged.contains(&file_id) {
        warn!("file_id={file_id} attempted to disengage a handle that is not engaged");
        return Err(DriverError::InvalidDeviceState(
            "handle is not engaged".to_string(),
        ));
    }
    if reparse.engage_count == 1 {
        let handle = reparse.reparse_handle.take().expect("engage_count > 0 implies a live handle");
        saferamdisk_platform::disengage(handle)?;
    }
    reparse.engage_count -= 1;
    engaged.remove(&file_id);
    info!("disengaged file_id={file_id}, engage_count={}", reparse.engage_count);
    Ok(Response::Disengage { engage_count: reparse.engage_count })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transferable_is_clamped_at_end_of_disk() {
        assert_eq!(transferable(0, 16, 1024), 16);
        assert_eq!(transferable(1024 - 512, 1024, 1024), 512);
        assert_eq!(transferable(2048, 16, 1024), 0);
    }

    #[test]
    fn read_write_round_trip_through_dispatch() {
        let image = Mutex::new(vec![0u8; 8192]);
        let mut reparse = ReparseState::new();
        let mut engaged = HashSet::new();

        let payload = vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16];
        let write = dispatch(
            Request::Write { offset: 4096, data: payload.clone() },
            &image,
            &mut reparse,
            &mut engaged,
        )
        .unwrap();
        assert!(matches!(write, Response::Write { information: 16 }));

        let read = dispatch(
            Request::Read { offset: 4096, length: 16 },
            &image,
            &mut reparse,
            &mut engaged,
        )
        .unwrap();
        match read {
            Response::Read { data, information } => {
                assert_eq!(information, 16);
                assert_eq!(data, payload);
            }
            _ => panic!("expected Response::Read"),
        }
    }

    #[test]
    fn disengage_without_engage_is_invalid_device_state() {
        let image = Mutex::new(vec![0u8; 4096]);
        let mut reparse = ReparseState::new();
        let mut engaged = HashSet::new();

        let result = dispatch(Request::Disengage { file_id: 1 }, &image, &mut reparse, &mut engaged);
        assert!(matches!(result, Err(DriverError::InvalidDeviceState(_))));
    }

    #[test]
    #[cfg(windows)]
    fn two_handles_share_one_reparse_handle_across_the_engage_count() {
        // Spec §8 scenario 6: a second handle engaging while one is already
        // engaged shares the existing reparse handle and bumps the count;
        // the handle is only torn down once the count drains back to zero.
        // Seeding `engage_count: 1` up front means neither call below hits
        // the `engage_count == 0` / `== 1` branches that would reach into
        // the real platform engager until the very last disengage, which
        // is why this only runs on Windows.
        let handle = saferamdisk_platform::engage().expect("engage for test setup");
        let mut reparse = ReparseState { engage_count: 1, reparse_handle: Some(handle) };
        let mut engaged = HashSet::new();
        engaged.insert(1u64);

        let result = engage(2, &mut reparse, &mut engaged).unwrap();
        assert!(matches!(result, Response::Engage { engage_count: 2 }));
        assert_eq!(reparse.engage_count, 2);
        assert!(reparse.reparse_handle.is_some());

        let result = disengage(1, &mut reparse, &mut engaged).unwrap();
        assert!(matches!(result, Response::Disengage { engage_count: 1 }));
        assert_eq!(reparse.engage_count, 1);
        assert!(reparse.reparse_handle.is_some(), "handle stays installed while count > 0");

        let result = disengage(2, &mut reparse, &mut engaged).unwrap();
        assert!(matches!(result, Response::Disengage { engage_count: 0 }));
        assert_eq!(reparse.engage_count, 0);
    }

    #[test]
    #[cfg(not(windows))]
    fn two_handles_share_one_reparse_handle_across_the_engage_count() {
        // Off Windows the platform engager always refuses, so this exercises
        // only the counting logic that doesn't require a live handle: two
        // engages bump the count without re-touching an already-installed
        // handle, and disengaging down to (but not through) the last
        // reference never calls back into the platform engager.
        let mut reparse = ReparseState { engage_count: 1, reparse_handle: None };
        let mut engaged = HashSet::new();
        engaged.insert(1u64);

        let result = engage(2, &mut reparse, &mut engaged).unwrap();
        assert!(matches!(result, Response::Engage { engage_count: 2 }));
        assert_eq!(reparse.engage_count, 2);

        let result = disengage(1, &mut reparse, &mut engaged).unwrap();
        assert!(matches!(result, Response::Disengage { engage_count: 1 }));
        assert_eq!(reparse.engage_count, 1);
    }

    #[test]
    fn re_engaging_the_same_handle_is_rejected() {
        // Engage itself calls into the platform reparse engager, which on a
        // non-Windows build fails with PlatformNotSupported before the
        // already-engaged check would even matter on a second call — so
        // this only exercises the already-engaged guard directly.
        let mut engaged = HashSet::new();
        engaged.insert(7u64);
        let mut reparse = ReparseState::new();
        reparse.engage_count = 1;
        let result = engage(7, &mut reparse, &mut engaged);
        assert!(matches!(result, Err(DriverError::InvalidDeviceState(_))));
    }
}
