//! Work-stealing worker pool
//!
//! Each worker owns a LIFO deque; forked jobs are pushed onto the deque of the
//! worker that forks them. Idle workers pop locally first, then take a batch
//! from the global injector, then steal from the other workers.

use std::cell::RefCell;
use std::io;
use std::iter;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::deque::{Injector, Steal, Stealer, Worker};

use crate::config::SchedulerConfig;

/// Unit of work executed by the pool; panics are caught by the producer
pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

/// Snapshot of pool counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Core worker threads
    pub workers: usize,
    /// Jobs run to completion by any worker
    pub tasks_executed: u64,
    /// Jobs taken from another worker's deque
    pub steals: u64,
    /// Compensating workers started for managed blocking
    pub compensations: u64,
}

/// State shared by the pool owner and all of its workers
pub(crate) struct Registry {
    injector: Injector<Job>,
    stealers: RwLock<Vec<(usize, Stealer<Job>)>>,
    sleep: Mutex<()>,
    wakeup: Condvar,
    shutdown: AtomicBool,
    idle_wait: Duration,
    max_compensation: usize,
    compensating: AtomicUsize,
    next_worker: AtomicUsize,
    tasks_executed: AtomicU64,
    steals: AtomicU64,
    compensations: AtomicU64,
}

impl Registry {
    fn new(config: &SchedulerConfig) -> Self {
        Self {
            injector: Injector::new(),
            stealers: RwLock::new(Vec::new()),
            sleep: Mutex::new(()),
            wakeup: Condvar::new(),
            shutdown: AtomicBool::new(false),
            idle_wait: Duration::from_millis(config.idle_wait_ms.max(1)),
            max_compensation: config.max_compensation,
            compensating: AtomicUsize::new(0),
            next_worker: AtomicUsize::new(0),
            tasks_executed: AtomicU64::new(0),
            steals: AtomicU64::new(0),
            compensations: AtomicU64::new(0),
        }
    }

    fn spawn_worker(
        registry: &Arc<Self>,
        retire: Option<Arc<AtomicBool>>,
    ) -> io::Result<JoinHandle<()>> {
        let id = registry.next_worker.fetch_add(1, Ordering::Relaxed);
        let local = Worker::new_lifo();
        registry
            .stealers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, local.stealer()));

        let shared = Arc::clone(registry);
        let spawned = thread::Builder::new()
            .name(format!("streamfork-worker-{id}"))
            .spawn(move || {
                let context = Rc::new(WorkerContext {
                    registry: shared,
                    local,
                    id,
                });
                run_worker(context, retire);
            });
        if spawned.is_err() {
            registry.unregister(id);
        }
        spawned
    }

    fn unregister(&self, id: usize) {
        self.stealers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(worker, _)| *worker != id);
    }

    fn steal_from_others(&self, thief: usize) -> Steal<Job> {
        let stealers = self.stealers.read().unwrap_or_else(PoisonError::into_inner);
        let stolen: Steal<Job> = stealers
            .iter()
            .filter(|(id, _)| *id != thief)
            .map(|(_, stealer)| stealer.steal())
            .collect();
        if stolen.is_success() {
            self.steals.fetch_add(1, Ordering::Relaxed);
        }
        stolen
    }

    pub(crate) fn inject(&self, job: Job) {
        self.injector.push(job);
        self.wakeup.notify_one();
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    fn terminate(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.wakeup.notify_all();
    }

    /// Park an idle worker until new work is announced or the idle wait elapses
    fn idle(&self) {
        let guard = self.sleep.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = self
            .wakeup
            .wait_timeout(guard, self.idle_wait)
            .unwrap_or_else(PoisonError::into_inner);
    }

    /// Run `blocking` while a compensating worker keeps the pool's parallelism
    pub(crate) fn managed_block<R>(self: &Arc<Self>, blocking: impl FnOnce() -> R) -> R {
        let active = self.compensating.fetch_add(1, Ordering::AcqRel);
        if active >= self.max_compensation {
            self.compensating.fetch_sub(1, Ordering::AcqRel);
            tracing::trace!("Compensation limit reached; blocking without a spare worker");
            return blocking();
        }

        let retire = Arc::new(AtomicBool::new(false));
        match Registry::spawn_worker(self, Some(Arc::clone(&retire))) {
            Ok(_) => {
                self.compensations.fetch_add(1, Ordering::Relaxed);
                tracing::trace!("Started compensating worker ({} active)", active + 1);
            }
            Err(e) => tracing::warn!("Failed to start compensating worker: {}", e),
        }

        let _guard = CompensationGuard {
            registry: self,
            retire,
        };
        blocking()
    }

    fn stats(&self, workers: usize) -> PoolStats {
        PoolStats {
            workers,
            tasks_executed: self.tasks_executed.load(Ordering::Relaxed),
            steals: self.steals.load(Ordering::Relaxed),
            compensations: self.compensations.load(Ordering::Relaxed),
        }
    }
}

/// Retires the compensating worker once the blocking region ends, even on unwind
struct CompensationGuard<'a> {
    registry: &'a Arc<Registry>,
    retire: Arc<AtomicBool>,
}

impl Drop for CompensationGuard<'_> {
    fn drop(&mut self) {
        self.retire.store(true, Ordering::Release);
        self.registry.compensating.fetch_sub(1, Ordering::AcqRel);
        self.registry.wakeup.notify_all();
    }
}

/// Per-thread view of the pool a worker belongs to
pub(crate) struct WorkerContext {
    registry: Arc<Registry>,
    local: Worker<Job>,
    id: usize,
}

thread_local! {
    static CURRENT: RefCell<Option<Rc<WorkerContext>>> = const { RefCell::new(None) };
}

/// Context of the pool worker running on this thread, if any
pub(crate) fn current_worker() -> Option<Rc<WorkerContext>> {
    CURRENT.with(|current| current.borrow().clone())
}

impl WorkerContext {
    pub(crate) fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub(crate) fn belongs_to(&self, registry: &Arc<Registry>) -> bool {
        Arc::ptr_eq(&self.registry, registry)
    }

    /// Push a job onto this worker's deque and wake a thief
    pub(crate) fn push(&self, job: Job) {
        self.local.push(job);
        self.registry.wakeup.notify_one();
    }

    pub(crate) fn find_job(&self) -> Option<Job> {
        self.local.pop().or_else(|| {
            iter::repeat_with(|| {
                self.registry
                    .injector
                    .steal_batch_and_pop(&self.local)
                    .or_else(|| self.registry.steal_from_others(self.id))
            })
            .find(|stolen| !stolen.is_retry())
            .and_then(Steal::success)
        })
    }

    pub(crate) fn execute(&self, job: Job) {
        job();
        self.registry.tasks_executed.fetch_add(1, Ordering::Relaxed);
    }
}

fn run_worker(context: Rc<WorkerContext>, retire: Option<Arc<AtomicBool>>) {
    CURRENT.with(|current| *current.borrow_mut() = Some(Rc::clone(&context)));
    tracing::trace!("Worker {} started", context.id);

    loop {
        if let Some(job) = context.find_job() {
            context.execute(job);
            continue;
        }
        let retiring = retire
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Acquire));
        if retiring || context.registry.is_shutdown() {
            break;
        }
        context.registry.idle();
    }

    CURRENT.with(|current| current.borrow_mut().take());
    context.registry.unregister(context.id);
    tracing::trace!("Worker {} stopped", context.id);
}

/// Fixed-size work-stealing pool; dropping it stops the workers
pub(crate) struct ForkJoinPool {
    registry: Arc<Registry>,
    threads: Vec<JoinHandle<()>>,
}

impl ForkJoinPool {
    pub(crate) fn new(parallelism: usize, config: &SchedulerConfig) -> Self {
        let registry = Arc::new(Registry::new(config));
        let mut threads = Vec::with_capacity(parallelism.max(1));
        for _ in 0..parallelism.max(1) {
            match Registry::spawn_worker(&registry, None) {
                Ok(handle) => threads.push(handle),
                Err(e) => tracing::warn!("Failed to spawn pool worker: {}", e),
            }
        }
        tracing::debug!("Started fork-join pool with {} workers", threads.len());
        Self { registry, threads }
    }

    pub(crate) fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub(crate) fn workers(&self) -> usize {
        self.threads.len()
    }

    /// True when called from one of this pool's workers
    pub(crate) fn is_current(&self) -> bool {
        current_worker().is_some_and(|worker| worker.belongs_to(&self.registry))
    }

    pub(crate) fn stats(&self) -> PoolStats {
        self.registry.stats(self.threads.len())
    }
}

impl Drop for ForkJoinPool {
    fn drop(&mut self) {
        self.registry.terminate();
        // A worker cannot join itself; its siblings exit on their own
        if self.is_current() {
            return;
        }
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
        tracing::debug!("Fork-join pool shut down");
    }
}
