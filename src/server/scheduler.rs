//! Periodic job harness: fixed-interval ticks, bounded retry, soft/hard time limits and a
//! per-job run token that keeps passes of the same job from overlapping.

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::runtime::Handle;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, sleep, timeout};
use tracing::{error, info, warn};

pub type JobError = Box<dyn Error + Send + Sync>;

#[async_trait]
pub trait PeriodicJob: Send + Sync {
    fn name(&self) -> &'static str;
    async fn run(&self) -> Result<(), JobError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per invocation, including the first.
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskBudget {
    /// Per attempt. An attempt over budget is dropped and counts as a failure.
    pub soft: Duration,
    /// Per invocation, retries and delays included.
    pub hard: Duration,
}

impl Default for TaskBudget {
    fn default() -> Self {
        Self {
            soft: Duration::from_secs(240),
            hard: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskSchedule {
    pub interval: Duration,
    pub retry: RetryPolicy,
    pub budget: TaskBudget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Succeeded { attempts: u32 },
    Exhausted { attempts: u32 },
    /// A previous invocation still held the run token.
    Skipped,
    TimedOut,
}

#[derive(Clone)]
pub struct ScheduledTask {
    job: Arc<dyn PeriodicJob>,
    schedule: TaskSchedule,
    run_token: Arc<Mutex<()>>,
}

impl ScheduledTask {
    pub fn new(job: Arc<dyn PeriodicJob>, schedule: TaskSchedule) -> Self {
        Self {
            job,
            schedule,
            run_token: Arc::new(Mutex::new(())),
        }
    }

    pub fn name(&self) -> &'static str {
        self.job.name()
    }

    /// One invocation: skip if already running, otherwise retry within the hard budget.
    pub async fn run_once(&self) -> RunOutcome {
        let job = self.job.name();
        let Ok(_token) = self.run_token.try_lock() else {
            info!(job, "Previous run still in progress; skipping.");
            return RunOutcome::Skipped;
        };

        match timeout(self.schedule.budget.hard, self.run_with_retry()).await {
            Ok(outcome) => outcome,
            Err(_) => {
                error!(
                    job,
                    hard_limit_secs = self.schedule.budget.hard.as_secs(),
                    "Job exceeded its hard time limit and was aborted."
                );
                RunOutcome::TimedOut
            }
        }
    }

    async fn run_with_retry(&self) -> RunOutcome {
        let job = self.job.name();
        let RetryPolicy {
            max_attempts,
            delay,
        } = self.schedule.retry;
        let soft = self.schedule.budget.soft;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let result = match timeout(soft, self.job.run()).await {
                Ok(result) => result,
                Err(_) => Err(format!("soft time limit of {}s exceeded", soft.as_secs()).into()),
            };
            match result {
                Ok(()) => return RunOutcome::Succeeded { attempts: attempt },
                Err(e) if attempt < max_attempts.max(1) => {
                    warn!(
                        job,
                        attempt,
                        retry_in_secs = delay.as_secs(),
                        error = %e,
                        "Job failed; retrying."
                    );
                    sleep(delay).await;
                }
                Err(e) => {
                    error!(job, attempts = attempt, error = %e, "Job failed after final attempt.");
                    return RunOutcome::Exhausted { attempts: attempt };
                }
            }
        }
    }

    /// Ticks on `handle` forever. Each tick runs in its own task; a tick that lands while the
    /// previous run holds the token is skipped.
    pub fn spawn_periodic(&self, handle: &Handle) -> JoinHandle<()> {
        let task = self.clone();
        handle.spawn(async move {
            info!(
                job = task.name(),
                interval_secs = task.schedule.interval.as_secs(),
                "Scheduling periodic job."
            );
            let mut ticker = tokio::time::interval(task.schedule.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let runner = task.clone();
                tokio::spawn(async move {
                    runner.run_once().await;
                });
            }
        })
    }

    /// Queues an immediate out-of-schedule invocation on `handle`.
    pub fn trigger(&self, handle: &Handle) -> JoinHandle<RunOutcome> {
        let task = self.clone();
        handle.spawn(async move { task.run_once().await })
    }
}
