/*!
 * Scheduler Types
 * Policies, statistics, and the shared process registry
 */

use crate::core::types::{Cycles, Pid};
use crate::process::ProcessInfo;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Scheduling policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Policy {
    /// Fixed time quantum per visit; preempted processes requeue
    RoundRobin,
    /// Head of the queue runs to completion
    Fcfs,
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Policy::RoundRobin => f.write_str("round_robin"),
            Policy::Fcfs => f.write_str("fcfs"),
        }
    }
}

impl FromStr for Policy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "round_robin" | "rr" => Ok(Policy::RoundRobin),
            "fcfs" | "first_come_first_served" => Ok(Policy::Fcfs),
            other => Err(format!("unknown policy {:?}", other)),
        }
    }
}

/// Shared registry of process rows, keyed by PID
///
/// Written only by the scheduler thread; the display side holds a clone
/// and reads.
pub type Registry = Arc<DashMap<Pid, ProcessInfo, ahash::RandomState>>;

/// Scheduler statistics snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SchedulerStats {
    pub policy: Policy,
    pub quantum: Cycles,
    pub passes: u64,
    pub context_switches: u64,
    pub preemptions: u64,
    pub completed: u64,
    pub faulted: u64,
    pub ready: usize,
    pub waiting: usize,
}

/// Lock-free counters for the scheduling hot loop
pub struct AtomicSchedulerStats {
    policy: Policy,
    quantum: Cycles,
    passes: AtomicU64,
    context_switches: AtomicU64,
    preemptions: AtomicU64,
    completed: AtomicU64,
    faulted: AtomicU64,
    ready: AtomicUsize,
    waiting: AtomicUsize,
}

impl AtomicSchedulerStats {
    pub fn new(policy: Policy, quantum: Cycles) -> Self {
        Self {
            policy,
            quantum,
            passes: AtomicU64::new(0),
            context_switches: AtomicU64::new(0),
            preemptions: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            faulted: AtomicU64::new(0),
            ready: AtomicUsize::new(0),
            waiting: AtomicUsize::new(0),
        }
    }

    pub fn inc_pass(&self) {
        self.passes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_context_switches(&self) {
        self.context_switches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_preemptions(&self) {
        self.preemptions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_faulted(&self) {
        self.faulted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_queues(&self, ready: usize, waiting: usize) {
        self.ready.store(ready, Ordering::Relaxed);
        self.waiting.store(waiting, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SchedulerStats {
        SchedulerStats {
            policy: self.policy,
            quantum: self.quantum,
            passes: self.passes.load(Ordering::Relaxed),
            context_switches: self.context_switches.load(Ordering::Relaxed),
            preemptions: self.preemptions.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            faulted: self.faulted.load(Ordering::Relaxed),
            ready: self.ready.load(Ordering::Relaxed),
            waiting: self.waiting.load(Ordering::Relaxed),
        }
    }
}
