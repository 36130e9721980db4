//! Bounded task pool
//!
//! [`TaskPool::run`] takes a flat list of independent futures, runs them on a
//! freshly built multi-thread runtime with at most `workers` in flight, and
//! hands back their results in input order. The calling thread stays the
//! coordinator: it collects results, prints progress and watches the
//! cancellation token.
//!
//! Interrupts are not caught here. The binary installs one Ctrl-C handler for
//! the whole process and cancels the token the pool was given; a pool without
//! a token never sees an interrupt.
//!
//! Every task is aborted and dropped before `run` returns, and the runtime is
//! torn down at the end of every call, so a failed or interrupted batch never
//! leaves worker threads behind.

use crate::error::{Error, Result};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{interval_at, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Progress is never printed more often than this.
pub const MIN_PROGRESS_INTERVAL: Duration = Duration::from_millis(250);

pub const DEFAULT_WORKERS: usize = 5;
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoolOptions {
    /// Maximum number of tasks running at once (clamped to at least 1)
    pub workers: usize,
    /// Time between progress reports
    pub progress_interval: Duration,
}

impl PoolOptions {
    pub fn new(workers: usize, progress_interval: Duration) -> Self {
        Self {
            workers,
            progress_interval,
        }
    }
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self::new(DEFAULT_WORKERS, DEFAULT_PROGRESS_INTERVAL)
    }
}

/// Something worth telling the user about while a batch runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolEvent {
    Progress {
        done: usize,
        total: usize,
        since_last_print: Duration,
    },
    Completed {
        total: usize,
    },
}

impl fmt::Display for PoolEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolEvent::Progress {
                done,
                total,
                since_last_print,
            } => write!(
                f,
                "{}/{} tasks done. {:.1} seconds passed since the last print.",
                done,
                total,
                since_last_print.as_secs_f64()
            ),
            PoolEvent::Completed { total } => write!(f, "Completed all {} tasks.", total),
        }
    }
}

type Reporter = Arc<dyn Fn(PoolEvent) + Send + Sync>;
type WorkerInit = Arc<dyn Fn() + Send + Sync>;

fn print_event(event: PoolEvent) {
    println!("{}", event);
}

/// Block `SIGINT` on the calling thread.
///
/// Installed on every worker thread so an interrupt is only ever delivered to
/// a thread outside the pool.
#[cfg(unix)]
pub fn mask_interrupt() {
    // SAFETY: sigset_t is plain data; the calls only touch this thread's mask.
    unsafe {
        let mut set: libc::sigset_t = std::mem::zeroed();
        libc::sigemptyset(&mut set);
        libc::sigaddset(&mut set, libc::SIGINT);
        libc::pthread_sigmask(libc::SIG_BLOCK, &set, std::ptr::null_mut());
    }
}

#[cfg(not(unix))]
pub fn mask_interrupt() {}

pub struct TaskPool {
    options: PoolOptions,
    worker_init: WorkerInit,
    reporter: Reporter,
    cancel: CancellationToken,
}

impl TaskPool {
    pub fn new(options: PoolOptions) -> Self {
        Self {
            options,
            worker_init: Arc::new(mask_interrupt),
            reporter: Arc::new(print_event),
            cancel: CancellationToken::new(),
        }
    }

    /// Stop batches with [`Error::Interrupted`] once `cancel` is cancelled.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Replace the hook run once on every worker thread as it starts.
    pub fn with_worker_init(mut self, init: impl Fn() + Send + Sync + 'static) -> Self {
        self.worker_init = Arc::new(init);
        self
    }

    /// Replace the default stdout progress printer.
    pub fn with_reporter(mut self, reporter: impl Fn(PoolEvent) + Send + Sync + 'static) -> Self {
        self.reporter = Arc::new(reporter);
        self
    }

    pub fn options(&self) -> &PoolOptions {
        &self.options
    }

    pub fn workers(&self) -> usize {
        self.options.workers.max(1)
    }

    /// `Err(Interrupted)` once the run has been cancelled.
    ///
    /// For work done outside a batch, between steps.
    pub fn check_interrupt(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Interrupted);
        }
        Ok(())
    }

    /// Run every task to completion and return the results in input order.
    ///
    /// The first task error is returned as is and the remaining tasks are
    /// aborted. Must not be called from inside a tokio runtime.
    pub fn run<T, F>(&self, tasks: Vec<F>) -> Result<Vec<T>>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        if tasks.is_empty() {
            return Ok(Vec::new());
        }
        self.check_interrupt()?;

        let workers = self.workers();
        let init = self.worker_init.clone();
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(workers)
            .thread_name("qtsdk-worker")
            .on_thread_start(move || init())
            .enable_all()
            .build()
            .map_err(Error::Runtime)?;

        debug!("Running {} tasks on {} workers", tasks.len(), workers);
        let result = runtime.block_on(self.drive(tasks, workers));
        runtime.shutdown_background();
        result
    }

    async fn drive<T, F>(&self, tasks: Vec<F>, workers: usize) -> Result<Vec<T>>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let total = tasks.len();
        let semaphore = Arc::new(Semaphore::new(workers));
        let mut set = JoinSet::new();

        for (index, task) in tasks.into_iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            set.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| Error::WorkerPanic(e.to_string()))?;
                task.await.map(|value| (index, value))
            });
        }

        let result = self.gather(&mut set, total).await;

        // Drops whatever is still running, and its partial files with it
        set.shutdown().await;
        result
    }

    async fn gather<T>(&self, set: &mut JoinSet<Result<(usize, T)>>, total: usize) -> Result<Vec<T>>
    where
        T: Send + 'static,
    {
        let mut results: Vec<Option<T>> = (0..total).map(|_| None).collect();
        let mut done = 0;

        let period = self.options.progress_interval.max(MIN_PROGRESS_INTERVAL);
        let mut ticker = interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_print = Instant::now();

        while done < total {
            tokio::select! {
                joined = set.join_next() => match joined {
                    Some(Ok(Ok((index, value)))) => {
                        results[index] = Some(value);
                        done += 1;
                    }
                    Some(Ok(Err(e))) => return Err(e),
                    Some(Err(e)) => return Err(Error::WorkerPanic(e.to_string())),
                    None => break,
                },
                _ = ticker.tick() => {
                    let now = Instant::now();
                    (self.reporter)(PoolEvent::Progress {
                        done,
                        total,
                        since_last_print: now - last_print,
                    });
                    last_print = now;
                }
                _ = self.cancel.cancelled() => return Err(Error::Interrupted),
            }
        }

        (self.reporter)(PoolEvent::Completed { total });

        results
            .into_iter()
            .collect::<Option<Vec<T>>>()
            .ok_or_else(|| Error::WorkerPanic("a task finished without a result".to_string()))
    }
}

/// Drive a single future to completion on a throwaway current-thread runtime.
///
/// For one-off fetches from synchronous code where a pool and progress
/// output would be noise.
pub fn run_one<T>(future: impl Future<Output = Result<T>>) -> Result<T> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(Error::Runtime)?;
    runtime.block_on(future)
}
