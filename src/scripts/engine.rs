//! Asynchronous script dispatch.
//!
//! Jobs go onto a bounded queue with `try_send`; a full queue is reported to
//! the caller instead of growing without limit. A dispatcher task on the
//! engine's own runtime pulls jobs and evaluates each one on a blocking
//! thread, holding a semaphore permit so at most `workers` scripts run at
//! once. Source reads share one lock; evaluation does not.
//!
//! There is no per-script timeout. A script that never returns keeps its
//! permit until shutdown.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::runtime::Runtime;
use tokio::sync::{Semaphore, mpsc};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::errors::ScriptError;
use crate::instance::Instance;
use crate::world_vars::WorldVariables;

/// Handles bound into one script evaluation.
#[derive(Default, Clone)]
pub struct Bindings {
    pub participant: Option<Uuid>,
    pub instance: Option<Arc<Instance>>,
    pub world: Option<Arc<WorldVariables>>,
    pub extra: Vec<(String, serde_json::Value)>,
}

/// One queued script evaluation.
pub struct ScriptJob {
    pub path: PathBuf,
    /// Entry point to call after the chunk ran. Missing entry points are ignored.
    pub function: Option<String>,
    pub bindings: Bindings,
}

/// Evaluates a job given its source text.
pub type JobRunner = Arc<dyn Fn(ScriptJob, String) + Send + Sync>;

pub struct ScriptEngine {
    tx: mpsc::Sender<ScriptJob>,
    runtime: Mutex<Option<Runtime>>,
    in_flight: Arc<AtomicUsize>,
    capacity: usize,
    stopped: AtomicBool,
}

impl ScriptEngine {
    /// Builds the runtime the engine runs on.
    pub fn build_runtime(workers: usize) -> Result<Runtime, ScriptError> {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(workers.max(1))
            .thread_name("script-worker")
            .enable_all()
            .build()
            .map_err(ScriptError::Runtime)
    }

    pub fn new(runtime: Runtime, capacity: usize, workers: usize, runner: JobRunner) -> Self {
        let capacity = capacity.max(1);
        let (tx, mut rx) = mpsc::channel::<ScriptJob>(capacity);
        let semaphore = Arc::new(Semaphore::new(workers.max(1)));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let source_lock = Arc::new(Mutex::new(()));

        let dispatch_in_flight = in_flight.clone();
        runtime.spawn(async move {
            while let Some(job) = rx.recv().await {
                let Ok(permit) = semaphore.clone().acquire_owned().await else {
                    break;
                };
                let runner = runner.clone();
                let source_lock = source_lock.clone();
                let in_flight = dispatch_in_flight.clone();
                tokio::task::spawn_blocking(move || {
                    let _permit = permit; // Hold until complete
                    run_job(&runner, &source_lock, job);
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                });
            }
            debug!("Script dispatcher stopped");
        });

        Self {
            tx,
            runtime: Mutex::new(Some(runtime)),
            in_flight,
            capacity,
            stopped: AtomicBool::new(false),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Queues a job without blocking.
    pub fn submit(&self, job: ScriptJob) -> Result<(), ScriptError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(ScriptError::EngineStopped);
        }
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        match self.tx.try_send(job) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(job)) => {
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                warn!(
                    script = %job.path.display(),
                    capacity = self.capacity,
                    "Script queue full, dropping invocation"
                );
                Err(ScriptError::QueueFull { path: job.path })
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                Err(ScriptError::EngineStopped)
            }
        }
    }

    /// Jobs queued or running.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Blocks until nothing is queued or running. Returns false on timeout.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.in_flight() > 0 {
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        true
    }

    /// Force-cancels queued and in-flight work. Idempotent.
    pub fn shutdown(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        let runtime = match self.runtime.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(runtime) = runtime {
            debug!(in_flight = self.in_flight(), "Shutting down script engine");
            runtime.shutdown_background();
        }
    }
}

impl Drop for ScriptEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_job(runner: &JobRunner, source_lock: &Mutex<()>, job: ScriptJob) {
    let source = {
        let _guard = source_lock.lock().unwrap_or_else(|p| p.into_inner());
        std::fs::read_to_string(&job.path)
    };
    let source = match source {
        Ok(source) => source,
        Err(e) => {
            let err = ScriptError::Read {
                path: job.path.clone(),
                source: e,
            };
            warn!(error = %err, "Script not loaded");
            return;
        }
    };
    let path = job.path.clone();
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| runner(job, source)));
    if outcome.is_err() {
        error!(script = %path.display(), "Script runner panicked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn job(path: PathBuf) -> ScriptJob {
        ScriptJob {
            path,
            function: None,
            bindings: Bindings::default(),
        }
    }

    #[test]
    fn test_jobs_receive_source() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.lua");
        std::fs::write(&path, "print('hi')").unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let runner: JobRunner = Arc::new(move |_job, source| sink.lock().unwrap().push(source));
        let engine = ScriptEngine::new(ScriptEngine::build_runtime(2).unwrap(), 8, 2, runner);

        engine.submit(job(path.clone())).unwrap();
        engine.submit(job(path)).unwrap();
        assert!(engine.wait_idle(Duration::from_secs(5)));
        assert_eq!(*seen.lock().unwrap(), vec!["print('hi')", "print('hi')"]);
    }

    #[test]
    fn test_missing_file_is_contained() {
        let dir = tempdir().unwrap();
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        let runner: JobRunner = Arc::new(move |_, _| flag.store(true, Ordering::SeqCst));
        let engine = ScriptEngine::new(ScriptEngine::build_runtime(1).unwrap(), 4, 1, runner);

        engine.submit(job(dir.path().join("gone.lua"))).unwrap();
        assert!(engine.wait_idle(Duration::from_secs(5)));
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_panicking_runner_does_not_poison_engine() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("boom.lua");
        std::fs::write(&path, "").unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let runner: JobRunner = Arc::new(move |job, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            if job.function.as_deref() == Some("explode") {
                panic!("boom");
            }
        });
        let engine = ScriptEngine::new(ScriptEngine::build_runtime(1).unwrap(), 4, 1, runner);

        let mut first = job(path.clone());
        first.function = Some("explode".into());
        engine.submit(first).unwrap();
        engine.submit(job(path)).unwrap();
        assert!(engine.wait_idle(Duration::from_secs(5)));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_full_queue_reports_backpressure() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("slow.lua");
        std::fs::write(&path, "").unwrap();

        let gate = Arc::new((Mutex::new(false), std::sync::Condvar::new()));
        let wait_gate = gate.clone();
        let runner: JobRunner = Arc::new(move |_, _| {
            let (lock, cvar) = &*wait_gate;
            let mut open = lock.lock().unwrap();
            while !*open {
                open = cvar.wait(open).unwrap();
            }
        });
        let engine = ScriptEngine::new(ScriptEngine::build_runtime(1).unwrap(), 1, 1, runner);

        let mut rejected = 0;
        for _ in 0..10 {
            if let Err(ScriptError::QueueFull { .. }) = engine.submit(job(path.clone())) {
                rejected += 1;
            }
        }
        assert!(rejected > 0);

        let (lock, cvar) = &*gate;
        *lock.lock().unwrap() = true;
        cvar.notify_all();
        assert!(engine.wait_idle(Duration::from_secs(5)));
    }

    #[test]
    fn test_submit_after_shutdown_fails() {
        let runner: JobRunner = Arc::new(|_, _| {});
        let engine = ScriptEngine::new(ScriptEngine::build_runtime(1).unwrap(), 4, 1, runner);
        engine.shutdown();
        engine.shutdown();
        let err = engine.submit(job(PathBuf::from("x.lua"))).unwrap_err();
        assert!(matches!(err, ScriptError::EngineStopped));
        assert_eq!(engine.in_flight(), 0);
    }
}
