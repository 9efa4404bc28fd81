use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Sender;
use log::{debug, trace};

use crate::executor::{Execute, Outcome};
use crate::shutdown::StopSignal;
use crate::stats::Counters;
use crate::work::WorkQueue;

/// Why a worker stopped.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Exit {
    /// The queue ran out
    Drained,
    /// The stop signal was raised
    Stopped,
}

/// One completed request, as reported to whoever is printing progress.
#[derive(Debug, Clone)]
pub struct Progress {
    /// Completion order across all workers
    pub sent: u64,
    pub worker: Arc<str>,
    pub outcome: Outcome,
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} -> {}", self.sent, self.worker, self.outcome)
    }
}

/// Pulls work off the shared queue until it's empty or the run is stopped.
///
/// The executor (and whatever connection it holds) belongs to this worker alone; the queue,
/// counters and stop signal are shared with every other worker.
pub struct Worker<E> {
    name: Arc<str>,
    executor: E,
    queue: Arc<WorkQueue>,
    counters: Arc<Counters>,
    stop: StopSignal,
    delay: Duration,
    progress: Sender<Progress>,
}

impl<E: Execute> Worker<E> {
    pub fn new(
        name: &str,
        executor: E,
        queue: Arc<WorkQueue>,
        counters: Arc<Counters>,
        stop: StopSignal,
        delay: Duration,
        progress: Sender<Progress>,
    ) -> Self {
        Self {
            name: name.into(),
            executor,
            queue,
            counters,
            stop,
            delay,
            progress,
        }
    }

    /// Work until the queue is drained or the stop signal is raised. Consumes the worker, so the
    /// progress sender is dropped when this returns.
    pub fn run(mut self) -> Exit {
        let exit = self.work();
        debug!("{} exiting: {:?}", self.name, exit);
        exit
    }

    fn work(&mut self) -> Exit {
        loop {
            if self.stop.is_set() {
                return Exit::Stopped;
            }

            if !self.queue.try_take() {
                return Exit::Drained;
            }

            let outcome = self.executor.execute();
            let sent = self.counters.record(&outcome);
            trace!("{} finished request {}", self.name, sent);

            // nobody listening just means nobody is printing anymore; the count is already in
            self.progress
                .send(Progress {
                    sent,
                    worker: Arc::clone(&self.name),
                    outcome,
                })
                .ok();

            if self.delay > Duration::default() && self.stop.wait_timeout(self.delay) {
                return Exit::Stopped;
            }
        }
    }
}
