//! Timed dispatch loop.
//!
//! ```text
//! Idle ──run()──▶ Running ──test time elapsed──▶ Stopping ──loop exited──▶ Terminated
//! ```
//!
//! A background firing loop owns the ticker. In [`DispatchMode::Serial`] every tick runs
//! the whole exchange before the next tick is taken, so a slow call delays later ticks and
//! the stop signal is only seen between calls. In [`DispatchMode::Concurrent`] each tick is
//! spawned into a `JoinSet`; after stop the scheduler waits up to the grace period and
//! reports whatever is still running as stragglers.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::DispatchMode;
use crate::dispatcher::Dispatch;
use crate::error::{Result, StressError};
use crate::report::{self, RunReport, Tally};

/// Configuration for the scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Interval between dispatch attempts; the first attempt is one tick after start
    pub tick: Duration,
    /// How long ticks keep firing
    pub test_time: Duration,
    pub mode: DispatchMode,
    /// How long to wait for in-flight calls after stop (concurrent mode)
    pub grace_period: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(100),
            test_time: Duration::from_millis(4100),
            mode: DispatchMode::Serial,
            grace_period: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Stopping,
    Terminated,
}

/// Fires a [`Dispatch`] at a fixed cadence for a fixed duration.
pub struct Scheduler<D>
where
    D: Dispatch,
{
    dispatcher: Arc<D>,
    config: SchedulerConfig,
    tally: Arc<Tally>,
    state: watch::Sender<SchedulerState>,
}

impl<D> Scheduler<D>
where
    D: Dispatch,
{
    pub fn new(dispatcher: Arc<D>, config: SchedulerConfig) -> Result<Self> {
        if config.tick.is_zero() {
            return Err(StressError::Configuration("tick must be greater than 0 ms".to_string()));
        }
        let (state, _) = watch::channel(SchedulerState::Idle);
        Ok(Self {
            dispatcher,
            config,
            tally: Arc::new(Tally::new()?),
            state,
        })
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    /// Observe state transitions, e.g. to wait for `Terminated` from another task.
    pub fn subscribe(&self) -> watch::Receiver<SchedulerState> {
        self.state.subscribe()
    }

    fn transition(&self, next: SchedulerState) {
        tracing::debug!(from = ?self.state(), to = ?next, "Scheduler state change");
        self.state.send_replace(next);
    }

    /// Run the test to completion and report.
    #[tracing::instrument(skip_all)]
    pub async fn run(self) -> RunReport {
        let start = Instant::now();
        let shutdown = CancellationToken::new();

        self.transition(SchedulerState::Running);
        let firing = tokio::spawn(firing_loop(
            self.dispatcher.clone(),
            self.tally.clone(),
            self.config.clone(),
            start,
            shutdown.clone(),
        ));

        time::sleep(self.config.test_time).await;

        self.transition(SchedulerState::Stopping);
        shutdown.cancel();

        let stragglers = match firing.await {
            Ok(stragglers) => stragglers,
            Err(join_error) => {
                tracing::error!(error = %join_error, "Firing loop panicked");
                0
            }
        };

        self.transition(SchedulerState::Terminated);

        let report = RunReport::from_tally(start.elapsed(), &self.tally, stragglers);
        tracing::info!(
            elapsed_ms = report.elapsed.as_millis() as u64,
            attempts = report.attempts,
            counter = report.counter,
            stragglers = report.stragglers,
            "Run finished"
        );
        report
    }
}

/// Returns the number of calls left running when the counter is read.
async fn firing_loop<D: Dispatch>(
    dispatcher: Arc<D>,
    tally: Arc<Tally>,
    config: SchedulerConfig,
    start: Instant,
    shutdown: CancellationToken,
) -> u64 {
    let mut ticker = time::interval_at(start + config.tick, config.tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut in_flight: JoinSet<()> = JoinSet::new();

    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => break,

            _ = ticker.tick() => {
                let fired_at = Utc::now();
                tally.record_attempt();

                match config.mode {
                    DispatchMode::Serial => fire(dispatcher.as_ref(), &tally, fired_at).await,
                    DispatchMode::Concurrent => {
                        let dispatcher = dispatcher.clone();
                        let tally = tally.clone();
                        in_flight.spawn(async move {
                            fire(dispatcher.as_ref(), &tally, fired_at).await;
                        });
                    }
                }
            }

            Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                log_join(joined);
            }
        }
    }

    if in_flight.is_empty() {
        return 0;
    }

    let grace_period = config.grace_period;
    let drained = time::timeout(grace_period, async {
        while let Some(joined) = in_flight.join_next().await {
            log_join(joined);
        }
    })
    .await;

    if drained.is_ok() {
        return 0;
    }

    let stragglers = in_flight.len() as u64;
    tracing::warn!(
        stragglers,
        grace_period_ms = grace_period.as_millis() as u64,
        "Calls still in flight at stop, excluded from the counter"
    );
    // the stop signal does not cancel calls already on the wire
    in_flight.detach_all();
    stragglers
}

async fn fire<D: Dispatch + ?Sized>(dispatcher: &D, tally: &Tally, fired_at: chrono::DateTime<Utc>) {
    let outcome = dispatcher.dispatch(fired_at).await;
    if let Err(e) = &outcome {
        report::call_failed(e);
    }
    tally.record(&outcome);
}

fn log_join(joined: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(join_error) = joined {
        tracing::error!(error = %join_error, "Dispatch task panicked");
    }
}
