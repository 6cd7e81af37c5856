//! Off-thread chunk generation with a fixed worker pool.

use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender};
use rayon::prelude::*;
use sylvan_core::{ChunkKey, Error, Result};
use tracing::{debug, trace};

use crate::chunk::ChunkData;
use crate::generation::ChunkSource;
use crate::store::{CancelToken, PendingTicket};

/// Handle returned by [`WorkerDispatcher::schedule`].
#[derive(Debug, Clone)]
pub struct JobHandle {
    key: ChunkKey,
    generation: u64,
    cancel: CancelToken,
}

impl JobHandle {
    /// Chunk being generated.
    pub fn key(&self) -> ChunkKey {
        self.key
    }

    /// Store generation of the request.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Discard the result of this job. Already-running work is not interrupted.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Check whether the result will be discarded.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Result delivered back to the main loop.
#[derive(Debug)]
pub enum JobOutcome {
    /// Generation finished; the data still has to be committed.
    Completed {
        ticket: PendingTicket,
        data: ChunkData,
    },
    /// Generation returned an error or panicked.
    Failed {
        ticket: PendingTicket,
        /// Zero for the first try.
        attempt: u32,
        /// Always [`Error::GenerationFailed`].
        error: Error,
    },
}

impl JobOutcome {
    /// Ticket the job was scheduled with.
    pub fn ticket(&self) -> &PendingTicket {
        match self {
            Self::Completed { ticket, .. } | Self::Failed { ticket, .. } => ticket,
        }
    }
}

#[derive(Debug)]
struct Job {
    ticket: PendingTicket,
    attempt: u32,
}

/// Work request sent to the worker threads.
enum WorkerMessage {
    Run(Job),
    /// Signal one worker thread to shut down.
    Shutdown,
}

enum Backend {
    Threaded {
        request_tx: Sender<WorkerMessage>,
        threads: Vec<JoinHandle<()>>,
    },
    Inline {
        queue: VecDeque<Job>,
    },
}

/// Runs chunk generation away from the caller's loop.
///
/// A threaded dispatcher owns a fixed pool of workers pulling from one FIFO
/// queue, so a burst of requests never spawns more concurrent tasks than
/// there are workers. An inline dispatcher queues jobs and runs them on
/// [`poll`](Self::poll), which makes streaming fully deterministic for tests
/// and tools.
pub struct WorkerDispatcher {
    source: Arc<dyn ChunkSource>,
    backend: Backend,
    result_tx: Sender<JobOutcome>,
    result_rx: Receiver<JobOutcome>,
    in_flight: Arc<AtomicUsize>,
}

impl WorkerDispatcher {
    /// Spawn `workers` background threads generating from `source`.
    pub fn spawn(source: Arc<dyn ChunkSource>, workers: usize) -> Result<Self> {
        if workers == 0 {
            return Err(Error::InvalidConfig("worker pool needs at least one thread".into()));
        }

        let (request_tx, request_rx) = channel::unbounded::<WorkerMessage>();
        let (result_tx, result_rx) = channel::unbounded::<JobOutcome>();
        let in_flight = Arc::new(AtomicUsize::new(0));

        let mut threads = Vec::with_capacity(workers);
        for index in 0..workers {
            let source = Arc::clone(&source);
            let request_rx = request_rx.clone();
            let result_tx = result_tx.clone();
            let in_flight = Arc::clone(&in_flight);

            let spawned = thread::Builder::new()
                .name(format!("chunk-worker-{index}"))
                .spawn(move || Self::worker_loop(&*source, &request_rx, &result_tx, &in_flight));

            match spawned {
                Ok(handle) => threads.push(handle),
                Err(err) => {
                    // Stop the workers that did start before bailing out.
                    for _ in &threads {
                        let _ = request_tx.send(WorkerMessage::Shutdown);
                    }
                    for handle in threads {
                        let _ = handle.join();
                    }
                    return Err(err.into());
                }
            }
        }
        debug!(workers, "chunk worker pool started");

        Ok(Self {
            source,
            backend: Backend::Threaded {
                request_tx,
                threads,
            },
            result_tx,
            result_rx,
            in_flight,
        })
    }

    /// Create a dispatcher that runs queued jobs on [`poll`](Self::poll).
    pub fn inline(source: Arc<dyn ChunkSource>) -> Self {
        let (result_tx, result_rx) = channel::unbounded();
        Self {
            source,
            backend: Backend::Inline {
                queue: VecDeque::new(),
            },
            result_tx,
            result_rx,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Check if this dispatcher runs jobs on background threads.
    pub fn is_threaded(&self) -> bool {
        matches!(self.backend, Backend::Threaded { .. })
    }

    /// Number of worker threads (zero for inline dispatchers).
    pub fn worker_count(&self) -> usize {
        match &self.backend {
            Backend::Threaded { threads, .. } => threads.len(),
            Backend::Inline { .. } => 0,
        }
    }

    /// Jobs queued or running whose outcome has not been produced yet.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Enqueue generation for a pending chunk. Never blocks.
    pub fn schedule(&mut self, ticket: PendingTicket) -> JobHandle {
        self.submit(Job { ticket, attempt: 0 })
    }

    /// Enqueue another attempt for a chunk whose generation failed.
    pub fn reschedule(&mut self, ticket: PendingTicket, attempt: u32) -> JobHandle {
        self.submit(Job { ticket, attempt })
    }

    fn submit(&mut self, job: Job) -> JobHandle {
        let handle = JobHandle {
            key: job.ticket.key(),
            generation: job.ticket.generation(),
            cancel: job.ticket.cancel_token().clone(),
        };
        self.in_flight.fetch_add(1, Ordering::AcqRel);

        match &mut self.backend {
            Backend::Threaded { request_tx, .. } => {
                if let Err(channel::SendError(message)) = request_tx.send(WorkerMessage::Run(job)) {
                    // Every worker is gone; surface the job as failed instead of losing it.
                    if let WorkerMessage::Run(job) = message {
                        let key = job.ticket.key();
                        let _ = self.result_tx.send(JobOutcome::Failed {
                            ticket: job.ticket,
                            attempt: job.attempt,
                            error: Error::GenerationFailed {
                                key,
                                reason: "worker pool is shut down".into(),
                            },
                        });
                    }
                    self.in_flight.fetch_sub(1, Ordering::AcqRel);
                }
            }
            Backend::Inline { queue } => queue.push_back(job),
        }

        handle
    }

    /// Collect finished outcomes without blocking.
    ///
    /// Inline dispatchers run every queued job (in parallel) before returning.
    /// Results for cancelled jobs are never delivered.
    pub fn poll(&mut self) -> Vec<JobOutcome> {
        let mut outcomes: Vec<JobOutcome> = self.result_rx.try_iter().collect();

        if let Backend::Inline { queue } = &mut self.backend {
            let jobs: Vec<Job> = queue.drain(..).collect();
            let source = &*self.source;
            let ran: Vec<Option<JobOutcome>> =
                jobs.into_par_iter().map(|job| run_job(source, job)).collect();
            self.in_flight.fetch_sub(ran.len(), Ordering::AcqRel);
            outcomes.extend(ran.into_iter().flatten());
        }

        outcomes
    }

    /// Block for up to `timeout` waiting for one outcome.
    ///
    /// Inline dispatchers never block; they behave like [`poll`](Self::poll)
    /// and return the first outcome, keeping the rest queued.
    pub fn recv_timeout(&mut self, timeout: Duration) -> Option<JobOutcome> {
        if !self.is_threaded() {
            let mut outcomes = self.poll().into_iter();
            let first = outcomes.next();
            for rest in outcomes {
                let _ = self.result_tx.send(rest);
            }
            return first;
        }
        self.result_rx.recv_timeout(timeout).ok()
    }

    /// Stop the worker threads and wait for them to finish.
    ///
    /// Queued jobs ahead of the shutdown messages are still drained; cancel
    /// them first to make shutdown quick.
    pub fn shutdown(&mut self) {
        match &mut self.backend {
            Backend::Threaded {
                request_tx,
                threads,
            } => {
                if threads.is_empty() {
                    return;
                }
                for _ in threads.iter() {
                    let _ = request_tx.send(WorkerMessage::Shutdown);
                }
                for handle in threads.drain(..) {
                    let _ = handle.join();
                }
                debug!("chunk worker pool stopped");
            }
            Backend::Inline { queue } => {
                let dropped = queue.len();
                queue.clear();
                self.in_flight.fetch_sub(dropped, Ordering::AcqRel);
            }
        }
    }

    /// Main worker loop - blocks waiting for requests and processes them.
    fn worker_loop(
        source: &dyn ChunkSource,
        request_rx: &Receiver<WorkerMessage>,
        result_tx: &Sender<JobOutcome>,
        in_flight: &AtomicUsize,
    ) {
        loop {
            match request_rx.recv() {
                Ok(WorkerMessage::Run(job)) => {
                    let outcome = run_job(source, job);
                    // Publish before decrementing so `in_flight() == 0` implies
                    // every outcome is already receivable.
                    let disconnected = outcome.is_some_and(|o| result_tx.send(o).is_err());
                    in_flight.fetch_sub(1, Ordering::AcqRel);
                    if disconnected {
                        return;
                    }
                }
                Ok(WorkerMessage::Shutdown) | Err(_) => return,
            }
        }
    }
}

impl Drop for WorkerDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Execute one job, returning `None` when its result is no longer wanted.
fn run_job(source: &dyn ChunkSource, job: Job) -> Option<JobOutcome> {
    let key = job.ticket.key();
    if job.ticket.cancel_token().is_cancelled() {
        trace!(%key, "skipping cancelled chunk job");
        return None;
    }

    let result = panic::catch_unwind(AssertUnwindSafe(|| source.generate(key)));

    if job.ticket.cancel_token().is_cancelled() {
        trace!(%key, "dropping result of cancelled chunk job");
        return None;
    }

    let error = match result {
        Ok(Ok(data)) => {
            return Some(JobOutcome::Completed {
                ticket: job.ticket,
                data,
            })
        }
        Ok(Err(err @ Error::GenerationFailed { .. })) => err,
        Ok(Err(err)) => Error::GenerationFailed {
            key,
            reason: err.to_string(),
        },
        Err(payload) => Error::GenerationFailed {
            key,
            reason: panic_message(payload.as_ref()),
        },
    };

    Some(JobOutcome::Failed {
        ticket: job.ticket,
        attempt: job.attempt,
        error,
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("worker panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("worker panicked: {message}")
    } else {
        "worker panicked".to_string()
    }
}
