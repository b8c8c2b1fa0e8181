//! Per-call resource ceilings.
//!
//! Every evaluation call runs on its own worker thread and receives a
//! [`Budget`]. The interpreter ticks the budget as it goes, which is how long
//! running code gets stopped without touching process-wide limits.

use std::{
    any::Any,
    sync::atomic::{AtomicU64, AtomicUsize, Ordering},
    time::{Duration, Instant},
};

use thiserror::Error;
use tracing::{debug, error};

use crate::config::SandboxConfig;

const WORKER_NAME: &str = "scratchpad-eval";
const WORKER_STACK_SIZE: usize = 64 * 1024 * 1024;
/// The clock is read once per this many ticks.
const CLOCK_CHECK_INTERVAL: u64 = 256;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResourceExceeded {
    #[error("execution time limit of {}ms exceeded", .limit.as_millis())]
    TimedOut { limit: Duration },
    #[error("memory limit of {limit} bytes exceeded ({requested} bytes requested)")]
    MemoryExceeded { requested: usize, limit: usize },
    #[error("values nested deeper than {limit} levels")]
    DepthExceeded { limit: usize },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GovernorError {
    #[error(transparent)]
    Exceeded(#[from] ResourceExceeded),
    #[error("evaluation worker failed: {0}")]
    Worker(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceLimits {
    pub max_execution_time: Duration,
    pub max_memory_usage: usize,
    pub max_recursion_depth: usize,
}

impl ResourceLimits {
    pub fn from_config(config: &SandboxConfig) -> Self {
        Self {
            max_execution_time: config.security.max_execution_time,
            max_memory_usage: config.security.max_memory_usage,
            max_recursion_depth: config.limits.max_recursion_depth,
        }
    }
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self::from_config(&SandboxConfig::default())
    }
}

/// Enforcement handle for a single call.
#[derive(Debug)]
pub struct Budget {
    limits: ResourceLimits,
    started: Instant,
    deadline: Option<Instant>,
    ticks: AtomicU64,
    accounted: AtomicUsize,
    pending: AtomicUsize,
}

impl Budget {
    pub fn new(limits: ResourceLimits) -> Self {
        let started = Instant::now();
        Self {
            limits,
            started,
            deadline: started.checked_add(limits.max_execution_time),
            ticks: AtomicU64::new(0),
            accounted: AtomicUsize::new(0),
            pending: AtomicUsize::new(0),
        }
    }

    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Counts one evaluation step and periodically checks the deadline.
    pub fn tick(&self) -> Result<(), ResourceExceeded> {
        let ticks = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;
        if ticks % CLOCK_CHECK_INTERVAL == 0 {
            self.check_clock()
        } else {
            Ok(())
        }
    }

    pub fn check_clock(&self) -> Result<(), ResourceExceeded> {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(ResourceExceeded::TimedOut {
                limit: self.limits.max_execution_time,
            }),
            _ => Ok(()),
        }
    }

    /// Claims room for an allocation about to happen. Reservations add up
    /// until the next [`Budget::account`] replaces them with a measurement.
    pub fn reserve(&self, bytes: usize) -> Result<(), ResourceExceeded> {
        let limit = self.limits.max_memory_usage;
        let exceeded = ResourceExceeded::MemoryExceeded {
            requested: bytes,
            limit,
        };
        if bytes > limit {
            return Err(exceeded);
        }
        let pending = self
            .pending
            .fetch_add(bytes, Ordering::Relaxed)
            .saturating_add(bytes);
        if self.accounted.load(Ordering::Relaxed).saturating_add(pending) > limit {
            self.pending.fetch_sub(bytes, Ordering::Relaxed);
            return Err(exceeded);
        }
        Ok(())
    }

    /// Records a fresh measurement of the working set.
    pub fn account(&self, bytes: usize) -> Result<(), ResourceExceeded> {
        self.accounted.store(bytes, Ordering::Relaxed);
        self.pending.store(0, Ordering::Relaxed);
        if bytes > self.limits.max_memory_usage {
            return Err(ResourceExceeded::MemoryExceeded {
                requested: bytes,
                limit: self.limits.max_memory_usage,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ResourceGovernor {
    limits: ResourceLimits,
}

impl ResourceGovernor {
    pub fn new(limits: ResourceLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }

    /// Runs `f` on a dedicated worker thread under this governor's limits.
    ///
    /// A wall-clock overrun is reported even when `f` finished, since some
    /// work (a single huge allocation, say) cannot tick while it runs.
    pub fn run_with_limits<T, F>(&self, f: F) -> Result<T, GovernorError>
    where
        F: FnOnce(&Budget) -> T + Send,
        T: Send,
    {
        let budget = Budget::new(self.limits);
        let joined = std::thread::scope(|scope| {
            let worker = std::thread::Builder::new()
                .name(WORKER_NAME.to_string())
                .stack_size(WORKER_STACK_SIZE)
                .spawn_scoped(scope, || f(&budget))
                .map_err(|e| GovernorError::Worker(e.to_string()))?;
            worker
                .join()
                .map_err(|panic| GovernorError::Worker(panic_message(panic.as_ref())))
        });

        let output = match joined {
            Ok(output) => output,
            Err(e) => {
                error!("Evaluation worker failed: {}", e);
                return Err(e);
            }
        };

        let elapsed = budget.elapsed();
        debug!(
            "Worker finished in {:?} after {} ticks",
            elapsed,
            budget.ticks()
        );
        if elapsed > self.limits.max_execution_time {
            return Err(ResourceExceeded::TimedOut {
                limit: self.limits.max_execution_time,
            }
            .into());
        }
        Ok(output)
    }
}

impl Default for ResourceGovernor {
    fn default() -> Self {
        Self::new(ResourceLimits::default())
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "worker panicked".to_string()
    }
}
