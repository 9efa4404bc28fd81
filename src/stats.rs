use std::fmt;
use std::time::Duration;

use parking_lot::Mutex;

use crate::executor::Outcome;

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct Stats {
    pub sent: u64,
    pub success: u64,
    pub fail: u64,
}

/// Request tallies shared by every worker.
///
/// All three fields live behind one lock so `sent == success + fail` holds for anyone who looks.
#[derive(Debug, Default)]
pub struct Counters {
    stats: Mutex<Stats>,
}

impl Counters {
    pub fn new() -> Counters {
        Counters::default()
    }

    /// Count one finished request, returning its position in completion order (starting at 1).
    pub fn record(&self, outcome: &Outcome) -> u64 {
        let mut stats = self.stats.lock();

        stats.sent += 1;
        if outcome.is_success() {
            stats.success += 1;
        } else {
            stats.fail += 1;
        }

        stats.sent
    }

    pub fn snapshot(&self) -> Stats {
        *self.stats.lock()
    }
}

/// What a finished run looks like.
#[derive(Debug, Copy, Clone)]
pub struct RunResult {
    pub stats: Stats,
    pub elapsed: Duration,
    /// Whether the run was cut short by the stop signal
    pub interrupted: bool,
    /// Requests that were never started because of the stop signal
    pub abandoned: usize,
}

impl RunResult {
    /// None for a run too short to measure.
    pub fn requests_per_sec(&self) -> Option<f64> {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            Some(self.stats.sent as f64 / secs)
        } else {
            None
        }
    }
}

impl fmt::Display for RunResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f)?;
        writeln!(f, "=== Summary ===")?;
        writeln!(f, "Total sent:    {}", self.stats.sent)?;
        writeln!(f, "Successful:    {}", self.stats.success)?;
        writeln!(f, "Failed/error:  {}", self.stats.fail)?;
        writeln!(f, "Elapsed (s):   {:.2}", self.elapsed.as_secs_f64())?;
        if let Some(rate) = self.requests_per_sec() {
            writeln!(f, "Requests/sec:  {:.2}", rate)?;
        }

        Ok(())
    }
}
