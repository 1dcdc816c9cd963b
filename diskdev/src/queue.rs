//! MPSC FIFO with a wake event and a terminate event (`spec.md` §4.2, §9
//! "Queue implementation" — any primitive satisfying that contract is
//! acceptable; here it's a `Mutex<VecDeque>` plus `Condvar` standing in for
//! the spin lock plus auto-reset `request_event` / manual-reset
//! `terminate_event` pair).

use crate::request::QueuedRequest;
use log::trace;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};

pub struct RequestQueue {
    queue: Mutex<VecDeque<QueuedRequest>>,
    wake: Condvar,
    terminate: AtomicBool,
}

impl RequestQueue {
    pub fn new() -> Self {
        RequestQueue {
            queue: Mutex::new(VecDeque::new()),
            wake: Condvar::new(),
            terminate: AtomicBool::new(false),
        }
    }

    /// Appends to the tail under the lock and wakes the worker.
    pub fn enqueue(&self, item: QueuedRequest) {
        let mut queue = self.queue.lock().unwrap();
        trace!("enqueue {:?} (queue depth now {})", item.request, queue.len() + 1);
        queue.push_back(item);
        self.wake.notify_one();
    }

    /// Removes the head; if empty, waits on the request-or-terminate
    /// condition. Returns `None` once `terminate` is set and the queue has
    /// drained.
    pub fn dequeue(&self) -> Option<QueuedRequest> {
        let mut queue = self.queue.lock().unwrap();
        loop {
            if let Some(item) = queue.pop_front() {
                trace!("dequeue {:?}", item.request);
                return Some(item);
            }
            if self.terminate.load(Ordering::SeqCst) {
                trace!("dequeue: terminate signalled and queue drained");
                return None;
            }
            queue = self.wake.wait(queue).unwrap();
        }
    }

    /// Manual-reset terminate signal. Idempotent; wakes the worker even if
    /// it is currently blocked waiting for work.
    pub fn signal_terminate(&self) {
        let queue = self.queue.lock().unwrap();
        trace!("signal_terminate");
        self.terminate.store(true, Ordering::SeqCst);
        drop(queue);
        self.wake.notify_all();
    }
}

impl Default for RequestQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{Request, Response};
    use std::sync::mpsc;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn dummy_request() -> (QueuedRequest, mpsc::Receiver<saferamdisk_core::Result<Response>>) {
        let (tx, rx) = mpsc::channel();
        (
            QueuedRequest {
                request: Request::Read { offset: 0, length: 1 },
                reply: tx,
                remove_lock_guard: None,
            },
            rx,
        )
    }

    #[test]
    fn dequeue_returns_in_fifo_order() {
        let queue = RequestQueue::new();
        let (a, _ra) = dummy_request();
        let (b, _rb) = dummy_request();
        queue.enqueue(a);
        queue.enqueue(b);

        let first = queue.dequeue().unwrap();
        matches!(first.request, Request::Read { .. });
        assert!(queue.dequeue().is_some());
    }

    #[test]
    fn dequeue_blocks_until_terminate() {
        let queue = Arc::new(RequestQueue::new());
        let q = queue.clone();
        let handle = thread::spawn(move || q.dequeue());

        thread::sleep(Duration::from_millis(20));
        queue.signal_terminate();
        assert!(handle.join().unwrap().is_none());
    }

    #[test]
    fn dequeue_drains_queue_before_honoring_terminate() {
        let queue = RequestQueue::new();
        let (a, _ra) = dummy_request();
        queue.enqueue(a);
        queue.signal_terminate();

        assert!(queue.dequeue().is_some());
        assert!(queue.dequeue().is_none());
    }
}
