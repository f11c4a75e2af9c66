//! # scheduler: bounded-concurrency task queue with a single drain point
//!
//! [`TaskScheduler`] admits independent async tasks, runs at most `K` of them at once,
//! and lets one caller wait until everything submitted so far (including work submitted
//! by tasks that were still running) has finished.
//!
//! ## How it works
//! - `submit` pushes the task onto an unbounded queue and bumps an in-flight counter
//!   before returning, so the counter can never be observed at zero while the task is
//!   still pending.
//! - A single dispatcher pops tasks in queue order and waits for a semaphore permit
//!   before spawning each one. Tasks therefore start in submission order; they finish
//!   in whatever order their I/O allows.
//! - Every task runs in its own tokio task. Its result (or panic) is turned into a
//!   [`TaskReport`] and sent back over a channel, then the counter is decremented.
//!   Whoever brings the counter to zero wakes the drainers.
//! - [`TaskScheduler::drain_and_wait`] registers for the wake-up *before* reading the
//!   counter, so a completion racing with the check can't be lost, and returns exactly
//!   once per call.
//!
//! Failures never cancel siblings. The scheduler only logs them and hands them back.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use tokio::sync::{mpsc, Notify, Semaphore};
use tracing::{debug, error, warn};

use crate::error::{PipelineError, TaskError};

/// What became of one submitted task.
#[derive(Debug)]
pub struct TaskReport<T> {
    pub label: String,
    pub result: Result<T, TaskError>,
}

struct Job<T> {
    label: String,
    task: BoxFuture<'static, Result<T, TaskError>>,
}

/// Counted wait-group shared by every spawned task.
struct Completion<T> {
    in_flight: AtomicUsize,
    drained: Notify,
    reports: mpsc::UnboundedSender<TaskReport<T>>,
}

impl<T> Completion<T> {
    fn finish(&self, report: TaskReport<T>) {
        // Receiver lives as long as any scheduler handle; a send error means nobody
        // can drain anymore, so the report has nowhere to go.
        let _ = self.reports.send(report);
        if self.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.drained.notify_waiters();
        }
    }
}

struct Inner<T> {
    queue: mpsc::UnboundedSender<Job<T>>,
    completion: Arc<Completion<T>>,
    reports: Mutex<mpsc::UnboundedReceiver<TaskReport<T>>>,
}

/// Cheaply cloneable handle; every clone feeds the same queue.
pub struct TaskScheduler<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for TaskScheduler<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + 'static> TaskScheduler<T> {
    /// Create a scheduler that runs at most `concurrency` tasks at once.
    ///
    /// Must be called from within a tokio runtime: the dispatcher is spawned here.
    pub fn new(concurrency: usize) -> Result<Self, PipelineError> {
        if concurrency == 0 {
            return Err(PipelineError::Config(
                "scheduler concurrency must be at least 1".to_string(),
            ));
        }

        let (queue, jobs) = mpsc::unbounded_channel();
        let (report_tx, report_rx) = mpsc::unbounded_channel();
        let completion = Arc::new(Completion {
            in_flight: AtomicUsize::new(0),
            drained: Notify::new(),
            reports: report_tx,
        });

        tokio::spawn(dispatch(
            jobs,
            Arc::new(Semaphore::new(concurrency)),
            Arc::clone(&completion),
        ));

        Ok(Self {
            inner: Arc::new(Inner {
                queue,
                completion,
                reports: Mutex::new(report_rx),
            }),
        })
    }

    /// Number of submitted tasks that have not reached a terminal state.
    pub fn in_flight(&self) -> usize {
        self.inner.completion.in_flight.load(Ordering::Acquire)
    }

    /// Enqueue `task`. Returns immediately; the task starts once a slot frees up.
    pub fn submit<F>(&self, label: impl Into<String>, task: F)
    where
        F: Future<Output = Result<T, TaskError>> + Send + 'static,
    {
        let label = label.into();
        self.inner
            .completion
            .in_flight
            .fetch_add(1, Ordering::AcqRel);
        debug!(task = %label, "[SCHED] Task submitted");

        let job = Job {
            label,
            task: Box::pin(task),
        };
        if let Err(mpsc::error::SendError(job)) = self.inner.queue.send(job) {
            // The dispatcher only stops once every sender is gone, and we hold one.
            error!(task = %job.label, "[SCHED][ERROR] Dispatcher unavailable, task dropped");
            self.inner.completion.finish(TaskReport {
                label: job.label.clone(),
                result: Err(TaskError::Panicked {
                    label: job.label,
                    message: "scheduler dispatcher is gone".to_string(),
                }),
            });
        }
    }

    /// Wait until no task is queued or running, then return the reports of every task
    /// that finished since the previous drain.
    pub async fn drain_and_wait(&self) -> Vec<TaskReport<T>> {
        let completion = &self.inner.completion;
        loop {
            let notified = completion.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if completion.in_flight.load(Ordering::Acquire) == 0 {
                break;
            }
            notified.await;
        }

        let mut reports = Vec::new();
        match self.inner.reports.lock() {
            Ok(mut rx) => {
                while let Ok(report) = rx.try_recv() {
                    reports.push(report);
                }
            }
            Err(poisoned) => {
                warn!("[SCHED] Report receiver lock poisoned, recovering");
                let mut rx = poisoned.into_inner();
                while let Ok(report) = rx.try_recv() {
                    reports.push(report);
                }
            }
        }
        debug!(reports = reports.len(), "[SCHED] Drained");
        reports
    }
}

async fn dispatch<T: Send + 'static>(
    mut jobs: mpsc::UnboundedReceiver<Job<T>>,
    semaphore: Arc<Semaphore>,
    completion: Arc<Completion<T>>,
) {
    while let Some(Job { label, task }) = jobs.recv().await {
        let permit = match Arc::clone(&semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                completion.finish(TaskReport {
                    label: label.clone(),
                    result: Err(TaskError::Panicked {
                        label,
                        message: "Semaphore closed unexpectedly".to_string(),
                    }),
                });
                continue;
            }
        };

        let completion = Arc::clone(&completion);
        tokio::spawn(async move {
            debug!(task = %label, "[SCHED] Task started");
            let outcome = tokio::spawn(task).await;
            drop(permit);

            let result = match outcome {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => {
                    error!(task = %label, error = %e, "[SCHED][ERROR] Task failed");
                    Err(e)
                }
                Err(join_error) => {
                    error!(task = %label, error = %join_error, "[SCHED][ERROR] Task panicked");
                    Err(TaskError::Panicked {
                        label: label.clone(),
                        message: join_error.to_string(),
                    })
                }
            };
            completion.finish(TaskReport { label, result });
        });
    }
    debug!("[SCHED] All scheduler handles dropped, dispatcher exiting");
}
