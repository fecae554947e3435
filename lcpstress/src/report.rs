//! Run aggregation and console output.
//!
//! The console is the harness's real output: one line per failed call and a summary at
//! the end. Diagnostics go through `tracing` on stderr.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use hdrhistogram::Histogram;
use parking_lot::Mutex;

use crate::dispatcher::Accepted;
use crate::error::{Result, StressError};

/// Outcome counters shared by every dispatch of a run.
///
/// `accepted` is the run counter: it moves by exactly one per 2xx or 302 response.
#[derive(Debug)]
pub struct Tally {
    attempts: AtomicU64,
    accepted: AtomicU64,
    rejected: AtomicU64,
    errored: AtomicU64,
    latencies: Mutex<Histogram<u64>>,
}

impl Tally {
    pub fn new() -> Result<Self> {
        let latencies =
            Histogram::<u64>::new(3).map_err(|e| StressError::Internal(format!("latency histogram: {e}")))?;
        Ok(Self {
            attempts: AtomicU64::new(0),
            accepted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            errored: AtomicU64::new(0),
            latencies: Mutex::new(latencies),
        })
    }

    pub fn record_attempt(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record(&self, outcome: &Result<Accepted>) {
        match outcome {
            Ok(accepted) => {
                self.accepted.fetch_add(1, Ordering::Relaxed);
                self.latencies
                    .lock()
                    .saturating_record(accepted.latency.as_millis() as u64);
            }
            Err(StressError::Server { .. }) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.errored.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    pub fn errored(&self) -> u64 {
        self.errored.load(Ordering::Relaxed)
    }
}

/// Latency percentiles of accepted calls, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencySummary {
    pub p50_ms: u64,
    pub p90_ms: u64,
    pub p99_ms: u64,
    pub max_ms: u64,
}

/// Final result of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub elapsed: Duration,
    pub attempts: u64,
    /// Accepted notifications
    pub counter: u64,
    pub rejected: u64,
    pub errored: u64,
    /// Calls still in flight when the counter was read; they are not counted anywhere else
    pub stragglers: u64,
    pub latency: Option<LatencySummary>,
}

impl RunReport {
    pub fn from_tally(elapsed: Duration, tally: &Tally, stragglers: u64) -> Self {
        let latency = {
            let latencies = tally.latencies.lock();
            (!latencies.is_empty()).then(|| LatencySummary {
                p50_ms: latencies.value_at_quantile(0.5),
                p90_ms: latencies.value_at_quantile(0.9),
                p99_ms: latencies.value_at_quantile(0.99),
                max_ms: latencies.max(),
            })
        };

        Self {
            elapsed,
            attempts: tally.attempts(),
            counter: tally.accepted(),
            rejected: tally.rejected(),
            errored: tally.errored(),
            stragglers,
            latency,
        }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Process took {} counter hit {}",
            humantime::format_duration(self.elapsed),
            self.counter
        )?;
        write!(
            f,
            "attempts {} accepted {} rejected {} errored {} in flight {}",
            self.attempts, self.counter, self.rejected, self.errored, self.stragglers
        )?;
        if let Some(latency) = self.latency {
            write!(
                f,
                "\nlatency p50 {}ms p90 {}ms p99 {}ms max {}ms",
                latency.p50_ms, latency.p90_ms, latency.p99_ms, latency.max_ms
            )?;
        }
        Ok(())
    }
}

/// Console line(s) for a failed call.
pub fn failure_lines(err: &StressError) -> Vec<String> {
    match err {
        StressError::Server { status, detail } => vec![
            format!("lcp server error {status}"),
            format!("detail: {detail}"),
        ],
        other => vec![other.to_string()],
    }
}

pub fn call_failed(err: &StressError) {
    for line in failure_lines(err) {
        println!("{line}");
    }
}

pub fn response_unparseable(err: &StressError) {
    println!("{err}");
}
