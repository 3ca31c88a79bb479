use log::{debug, error, info, warn};
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Mutex;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use crate::common::lock_or_recover;
use crate::errors::AppError;

type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Queue drained and thread joined.
    Drained,
    /// Worker did not finish in time; it was detached.
    TimedOut,
    NotRunning,
    /// Called from the worker's own thread, which keeps running.
    Refused,
}

struct Worker {
    sender: Sender<Job>,
    thread: JoinHandle<()>,
    finished: Receiver<()>,
    thread_id: ThreadId,
}

pub struct BackgroundExecutionContext {
    name: String,
    worker: Mutex<Option<Worker>>,
}

impl BackgroundExecutionContext {
    pub fn new(name: impl Into<String>) -> Self {
        BackgroundExecutionContext {
            name: name.into(),
            worker: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn start(&self) -> Result<(), AppError> {
        let mut slot = lock_or_recover(&self.worker);
        if slot.is_some() {
            debug!("Worker '{}' already running", self.name);
            return Ok(());
        }

        let (sender, jobs) = mpsc::channel::<Job>();
        let (finished_tx, finished) = mpsc::channel::<()>();
        let worker_name = self.name.clone();
        let thread = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || {
                run_jobs(&worker_name, jobs);
                let _ = finished_tx.send(());
            })
            .map_err(|e| AppError::Io(format!("failed to spawn worker '{}': {}", self.name, e)))?;

        let thread_id = thread.thread().id();
        *slot = Some(Worker {
            sender,
            thread,
            finished,
            thread_id,
        });
        info!("🧵 Background worker '{}' started", self.name);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        lock_or_recover(&self.worker).is_some()
    }

    pub fn is_worker_thread(&self) -> bool {
        lock_or_recover(&self.worker)
            .as_ref()
            .map_or(false, |w| w.thread_id == thread::current().id())
    }

    /// Queues `job` behind everything already posted.
    pub fn post<F>(&self, job: F) -> Result<(), AppError>
    where
        F: FnOnce() + Send + 'static,
    {
        let sender = lock_or_recover(&self.worker)
            .as_ref()
            .map(|w| w.sender.clone())
            .ok_or_else(|| AppError::WorkerStopped(self.name.clone()))?;
        sender
            .send(Box::new(job))
            .map_err(|_| AppError::WorkerStopped(self.name.clone()))
    }

    /// Closes the queue, waits up to `timeout` for queued jobs to finish, then
    /// joins. A worker that overruns the timeout is detached with a warning.
    pub fn stop(&self, timeout: Duration) -> StopOutcome {
        let worker = {
            let mut slot = lock_or_recover(&self.worker);
            match slot.as_ref() {
                None => return StopOutcome::NotRunning,
                Some(w) if w.thread_id == thread::current().id() => {
                    error!("Worker '{}' cannot stop itself; ignoring stop request", self.name);
                    return StopOutcome::Refused;
                }
                Some(_) => {}
            }
            match slot.take() {
                Some(worker) => worker,
                None => return StopOutcome::NotRunning,
            }
        };

        let start_time = Instant::now();
        let Worker { sender, thread, finished, .. } = worker;
        drop(sender);

        match finished.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if thread.join().is_err() {
                    error!("💀 Worker '{}' terminated abnormally", self.name);
                }
                info!("🛑 Background worker '{}' drained and stopped in {:?}", self.name, start_time.elapsed());
                StopOutcome::Drained
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "⚠️ Worker '{}' did not drain within {:?}; detaching it",
                    self.name, timeout
                );
                StopOutcome::TimedOut
            }
        }
    }
}

impl Drop for BackgroundExecutionContext {
    fn drop(&mut self) {
        if self.is_running() {
            self.stop(Duration::from_secs(1));
        }
    }
}

fn run_jobs(name: &str, jobs: Receiver<Job>) {
    debug!("Worker '{}' entering job loop", name);
    let mut executed = 0u64;
    for job in jobs {
        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
            error!("💥 A job on worker '{}' panicked; continuing", name);
        }
        executed += 1;
    }
    debug!("Worker '{}' leaving job loop after {} job(s)", name, executed);
}
