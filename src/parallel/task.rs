use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use crossbeam::utils::Backoff;

use super::pool::{Job, current_worker};

struct Slot<R> {
    done: AtomicBool,
    result: Mutex<Option<thread::Result<R>>>,
}

impl<R> Slot<R> {
    fn complete(&self, result: thread::Result<R>) {
        *self.result.lock().unwrap_or_else(PoisonError::into_inner) = Some(result);
        self.done.store(true, Ordering::Release);
    }

    fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }
}

/// Result of a forked task, claimed with [`ForkHandle::join`]
pub(crate) struct ForkHandle<R> {
    slot: Arc<Slot<R>>,
}

/// Schedule `task` on the current worker's deque.
///
/// Off a pool thread the task runs immediately on the caller.
pub(crate) fn fork<R, F>(task: F) -> ForkHandle<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let slot = Arc::new(Slot {
        done: AtomicBool::new(false),
        result: Mutex::new(None),
    });
    let completion = Arc::clone(&slot);
    let job: Job = Box::new(move || {
        completion.complete(panic::catch_unwind(AssertUnwindSafe(task)));
    });

    match current_worker() {
        Some(worker) => worker.push(job),
        None => job(),
    }
    ForkHandle { slot }
}

impl<R> ForkHandle<R> {
    /// Wait for the task, running other queued jobs meanwhile.
    ///
    /// A panic inside the task is returned as `Err` with its payload.
    pub(crate) fn join(self) -> thread::Result<R> {
        let worker = current_worker();
        let backoff = Backoff::new();

        while !self.slot.is_done() {
            match worker.as_ref().and_then(|worker| worker.find_job()) {
                Some(job) => {
                    if let Some(worker) = worker.as_ref() {
                        worker.execute(job);
                    }
                    backoff.reset();
                }
                None if backoff.is_completed() => thread::yield_now(),
                None => backoff.snooze(),
            }
        }

        self.slot
            .result
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .unwrap_or_else(|| {
                let payload: Box<dyn Any + Send> = Box::new("forked task result already claimed");
                Err(payload)
            })
    }
}
