//! The in-process stand-in for an IRP (`spec.md` §3 "QueuedRequest", §4.2,
//! §4.3). Only the major functions the worker actually handles get a
//! variant here — everything completed inline by the dispatch routine
//! (Create, Close, PnP, Power, SystemControl, the synchronous IOCTLs) never
//! becomes a `Request`.

use saferamdisk_core::RemoveLockGuard;
use std::sync::mpsc::Sender;

/// Identifies the open handle an ENGAGE/DISENGAGE/Cleanup request came from.
/// Stands in for the file object's context slot (`spec.md` §9).
pub type FileId = u64;

#[derive(Debug)]
pub enum Request {
    Read { offset: u64, length: usize },
    Write { offset: u64, data: Vec<u8> },
    Engage { file_id: FileId },
    Disengage { file_id: FileId },
    Cleanup { file_id: FileId },
}

#[derive(Debug)]
pub enum Response {
    Read { data: Vec<u8>, information: usize },
    Write { information: usize },
    Engage { engage_count: i64 },
    Disengage { engage_count: i64 },
    Cleanup,
}

/// An IRP plus its queue linkage: the request itself, where to send the
/// completion, and (for every major function except Cleanup) the
/// remove-lock reference acquired by the dispatch routine. Dropping the
/// guard after completion is the worker's side of "transfer the
/// remove-lock's release responsibility to the worker" (`spec.md` §4.4).
pub struct QueuedRequest {
    pub request: Request,
    pub reply: Sender<saferamdisk_core::Result<Response>>,
    pub remove_lock_guard: Option<RemoveLockGuard>,
}
