//! Running a whole load test: seeding the queue, starting workers, printing progress and shutting
//! down on time.
//!
//! ```text
//!                         +-----------+
//!            try_take     | WorkQueue |     try_take
//!         +-------------->+-----------+<--------------+
//!         |                                           |
//!   +-----+----+   record   +----------+   record  +---+------+
//!   | worker-1 +----------->+ Counters +<----------+ worker-N |
//!   +-----+----+            +----------+           +---+------+
//!         |                                            |
//!         |          Progress (channel)                |
//!         +--------------> coordinator <---------------+
//!                           | prints one line per request,
//!                           | notices when every sender is gone
//! ```
//!
//! The only thing that stops a run early is the [`StopSignal`]. Once it's raised, workers finish
//! whatever request they're in the middle of and exit; the coordinator waits for them up to the
//! configured join timeout and then leaves the stragglers behind.

use std::io::Write;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError};
use log::{debug, error, info, warn};

use crate::config::Config;
use crate::executor::{Execute, HttpExecutor};
use crate::shutdown::StopSignal;
use crate::stats::{Counters, RunResult};
use crate::work::WorkQueue;
use crate::worker::{Exit, Progress, Worker};
use crate::Result;

/// How often the coordinator checks the stop signal while waiting on workers.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct Coordinator {
    config: Config,
    stop: StopSignal,
}

impl Coordinator {
    pub fn new(config: Config) -> Coordinator {
        Coordinator {
            config,
            stop: StopSignal::new(),
        }
    }

    /// A handle for stopping this run from outside, e.g. from an interrupt handler.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Load test over HTTP, writing a progress line to `out` for every completed request.
    ///
    /// A coordinator runs once: its stop signal can't be lowered again, so running consumes it.
    pub fn run<W: Write>(self, out: &mut W) -> Result<RunResult> {
        let spec = self.config.spec.clone();
        self.run_with(move |_| HttpExecutor::new(&spec), out)
    }

    /// Same as [`run`](Coordinator::run), but with each worker's executor built by
    /// `make_executor` (called with the worker's index, starting at 0).
    pub fn run_with<E, F, W>(self, mut make_executor: F, out: &mut W) -> Result<RunResult>
    where
        E: Execute + Send + 'static,
        F: FnMut(usize) -> Result<E>,
        W: Write,
    {
        self.config.check_guardrail()?;
        info!("Starting: {:#?}", self.config);

        let num_workers = self.config.num_workers();
        if self.config.many_workers() {
            // every blocking client drives its own runtime thread
            warn!(
                "{} workers will use about {} OS threads",
                num_workers,
                num_workers * 2
            );
        }

        // build everything that can fail before the first request goes out
        let executors = (0..num_workers)
            .map(&mut make_executor)
            .collect::<Result<Vec<E>>>()?;

        let queue = Arc::new(WorkQueue::new(self.config.requests));
        let counters = Arc::new(Counters::new());
        let (progress_tx, progress_rx) = unbounded();

        let start = Instant::now();
        let mut handles = Vec::with_capacity(num_workers);
        let mut spawn_error = None;

        for (i, executor) in executors.into_iter().enumerate() {
            let name = format!("worker-{}", i + 1);
            let worker = Worker::new(
                &name,
                executor,
                Arc::clone(&queue),
                Arc::clone(&counters),
                self.stop.clone(),
                self.config.spec.delay,
                progress_tx.clone(),
            );

            let spawned = thread::Builder::new()
                .name(name.clone())
                .spawn(move || worker.run());

            match spawned {
                Ok(handle) => handles.push((name, handle)),
                Err(e) => {
                    error!("failed to start {}: {}", name, e);
                    self.stop.raise();
                    spawn_error = Some(e);
                    break;
                }
            }
        }

        // only workers hold senders now; the channel disconnects when the last one exits
        drop(progress_tx);

        let printed = self
            .report(&progress_rx, out)
            .and_then(|()| self.shut_down(&progress_rx, out));

        let elapsed = start.elapsed();
        let abandoned = queue.drain();
        if abandoned > 0 {
            warn!("{} requests were never sent", abandoned);
        }

        // an output error still has to stop the workers before it's returned
        if let Err(e) = printed {
            self.stop.raise();
            return Err(e.into());
        }

        join_finished(handles);

        if let Some(e) = spawn_error {
            return Err(e.into());
        }

        let result = RunResult {
            stats: counters.snapshot(),
            elapsed,
            interrupted: self.stop.is_set(),
            abandoned,
        };

        info!(
            "Finished: {:?} in {}",
            result.stats,
            humantime::format_duration(result.elapsed)
        );

        Ok(result)
    }

    /// Print progress until every worker is done or the stop signal is raised.
    fn report<W: Write>(
        &self,
        progress: &Receiver<Progress>,
        out: &mut W,
    ) -> std::io::Result<()> {
        loop {
            if self.stop.is_set() {
                return Ok(());
            }

            match progress.recv_timeout(POLL_INTERVAL) {
                Ok(p) => writeln!(out, "{}", p)?,
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return Ok(()),
            }
        }
    }

    /// After a stop, keep printing whatever lands before the join deadline.
    fn shut_down<W: Write>(
        &self,
        progress: &Receiver<Progress>,
        out: &mut W,
    ) -> std::io::Result<()> {
        let deadline = Instant::now() + self.config.join_timeout;

        loop {
            match progress.recv_deadline(deadline) {
                Ok(p) => writeln!(out, "{}", p)?,
                Err(RecvTimeoutError::Disconnected) => return Ok(()),
                Err(RecvTimeoutError::Timeout) => {
                    warn!(
                        "workers still busy after {}; leaving them behind",
                        humantime::format_duration(self.config.join_timeout)
                    );
                    return Ok(());
                }
            }
        }
    }
}

/// Join the workers that have exited. Anything still running is detached.
fn join_finished(handles: Vec<(String, JoinHandle<Exit>)>) {
    for (name, handle) in handles {
        if !handle.is_finished() {
            warn!("{} did not shut down in time", name);
            continue;
        }

        match handle.join() {
            Ok(exit) => debug!("{} joined: {:?}", name, exit),
            Err(_) => error!("{} panicked", name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigBuilder;
    use crate::executor::{Failure, Outcome};
    use crate::Error;
    use reqwest::StatusCode;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn config(threads: usize, requests: usize) -> ConfigBuilder {
        ConfigBuilder::parse("http://127.0.0.1:1/")
            .unwrap()
            .threads(threads)
            .requests(requests)
    }

    /// Sleeps, then answers with a fixed outcome. Shares a call counter with the test.
    #[derive(Clone)]
    struct Fake {
        outcome: Outcome,
        latency: Duration,
        calls: Arc<AtomicUsize>,
    }

    impl Fake {
        fn new(outcome: Outcome, latency: Duration) -> Fake {
            Fake {
                outcome,
                latency,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl Execute for Fake {
        fn execute(&mut self) -> Outcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            thread::sleep(self.latency);
            self.outcome.clone()
        }
    }

    fn ok() -> Outcome {
        Outcome::Success(StatusCode::OK)
    }

    #[test]
    fn every_request_is_sent_exactly_once() {
        for &(threads, requests) in &[(1, 1), (1, 37), (4, 20), (8, 3), (16, 500)] {
            let coordinator = Coordinator::new(config(threads, requests).build());
            let fake = Fake::new(ok(), Duration::default());
            let mut out = Vec::new();

            let result = coordinator
                .run_with(|_| Ok(fake.clone()), &mut out)
                .unwrap();

            assert_eq!(result.stats.sent, requests as u64);
            assert_eq!(result.stats.success, requests as u64);
            assert_eq!(result.stats.fail, 0);
            assert_eq!(fake.calls.load(Ordering::SeqCst), requests);
            assert!(!result.interrupted);
            assert_eq!(result.abandoned, 0);

            let out = String::from_utf8(out).unwrap();
            assert_eq!(out.lines().count(), requests);
        }
    }

    #[test]
    fn progress_numbers_are_a_permutation() {
        let coordinator = Coordinator::new(config(4, 50).build());
        let fake = Fake::new(ok(), Duration::from_millis(1));
        let mut out = Vec::new();

        coordinator
            .run_with(|_| Ok(fake.clone()), &mut out)
            .unwrap();

        let mut seen = String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|line| {
                let end = line.find(']').unwrap();
                line[1..end].parse::<u64>().unwrap()
            })
            .collect::<Vec<_>>();
        seen.sort_unstable();

        assert_eq!(seen, (1..=50).collect::<Vec<_>>());
    }

    #[test]
    fn failures_are_counted() {
        let coordinator = Coordinator::new(config(2, 10).build());
        let fake = Fake::new(
            Outcome::Failure(Failure::Status(StatusCode::BAD_GATEWAY)),
            Duration::default(),
        );
        let mut out = Vec::new();

        let result = coordinator
            .run_with(|_| Ok(fake.clone()), &mut out)
            .unwrap();

        assert_eq!(result.stats.sent, 10);
        assert_eq!(result.stats.fail, 10);
        assert!(String::from_utf8(out)
            .unwrap()
            .lines()
            .all(|line| line.ends_with("-> 502")));
    }

    #[test]
    fn zero_requests_is_an_empty_run() {
        let coordinator = Coordinator::new(config(4, 0).build());
        let mut out = Vec::new();

        let result = coordinator
            .run_with(|_| Ok(Fake::new(ok(), Duration::default())), &mut out)
            .unwrap();

        assert_eq!(result.stats.sent, 0);
        assert!(out.is_empty());
    }

    #[test]
    fn guardrail_stops_run_before_any_executor_is_built() {
        let coordinator = Coordinator::new(config(200_000, 200_000).build());
        let mut built = 0;
        let mut out = Vec::new();

        let result = coordinator.run_with(
            |_| {
                built += 1;
                Ok(Fake::new(ok(), Duration::default()))
            },
            &mut out,
        );

        assert!(matches!(result, Err(Error::Guardrail { .. })));
        assert_eq!(built, 0);
        assert!(out.is_empty());
    }

    #[test]
    fn executor_errors_abort_before_sending() {
        let coordinator = Coordinator::new(config(3, 10).build());
        let fake = Fake::new(ok(), Duration::default());
        let mut out = Vec::new();

        let result = coordinator.run_with(
            |i| {
                if i == 2 {
                    Err(Error::Config("no client for you".into()))
                } else {
                    Ok(fake.clone())
                }
            },
            &mut out,
        );

        assert!(matches!(result, Err(Error::Config(_))));
        assert_eq!(fake.calls.load(Ordering::SeqCst), 0);
    }

    /// Raises the stop signal on its nth call, like ctrl-c arriving mid-run.
    struct Interrupting {
        stop: StopSignal,
        after: usize,
        calls: Arc<AtomicUsize>,
    }

    impl Execute for Interrupting {
        fn execute(&mut self) -> Outcome {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            thread::sleep(Duration::from_millis(5));
            if n == self.after {
                self.stop.raise();
            }
            ok()
        }
    }

    #[test]
    fn interrupt_stops_run_early() {
        let threads = 4;
        let coordinator = Coordinator::new(config(threads, 100).build());
        let stop = coordinator.stop_signal();
        let calls = Arc::new(AtomicUsize::new(0));
        let mut out = Vec::new();

        let started = Instant::now();
        let result = coordinator
            .run_with(
                |_| {
                    Ok(Interrupting {
                        stop: stop.clone(),
                        after: 3,
                        calls: Arc::clone(&calls),
                    })
                },
                &mut out,
            )
            .unwrap();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(result.interrupted);
        assert!(result.stats.sent >= 3);
        assert!(result.stats.sent <= (3 + threads) as u64);
        assert_eq!(result.stats.sent, result.stats.success + result.stats.fail);
        assert_eq!(
            result.abandoned as u64 + result.stats.sent,
            100,
            "every unit is either sent or abandoned"
        );
    }

    #[test]
    fn a_raised_stop_stays_with_its_coordinator() {
        let first = Coordinator::new(config(2, 10).build());
        let stop = first.stop_signal();
        stop.raise();

        let result = first
            .run_with(|_| Ok(Fake::new(ok(), Duration::default())), &mut Vec::new())
            .unwrap();
        assert!(result.interrupted);
        assert_eq!(result.abandoned, 10);

        // the handle outlives the consumed coordinator, but a new one starts clean
        assert!(stop.is_set());
        let second = Coordinator::new(config(2, 10).build());
        let result = second
            .run_with(|_| Ok(Fake::new(ok(), Duration::default())), &mut Vec::new())
            .unwrap();
        assert!(!result.interrupted);
        assert_eq!(result.stats.sent, 10);
    }

    #[test]
    fn hung_worker_cannot_block_shutdown() {
        let coordinator = Coordinator::new(
            config(2, 4)
                .join_timeout(Duration::from_millis(200))
                .build(),
        );
        let stop = coordinator.stop_signal();
        let mut out = Vec::new();

        let raiser = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            stop.raise();
        });

        let started = Instant::now();
        let result = coordinator
            .run_with(
                |_| Ok(Fake::new(ok(), Duration::from_secs(30))),
                &mut out,
            )
            .unwrap();
        raiser.join().unwrap();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(result.interrupted);
        assert_eq!(result.stats.sent, 0);
    }

    #[test]
    fn stop_interrupts_delay() {
        let coordinator = Coordinator::new(config(1, 5).delay(Duration::from_secs(30)).build());
        let stop = coordinator.stop_signal();
        let mut out = Vec::new();

        let raiser = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            stop.raise();
        });

        let started = Instant::now();
        let result = coordinator
            .run_with(|_| Ok(Fake::new(ok(), Duration::default())), &mut out)
            .unwrap();
        raiser.join().unwrap();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(result.stats.sent, 1);
        assert_eq!(result.abandoned, 4);
    }
}
