/*!
 * Scheduler
 *
 * Owns the ready queue and drives the execution engine under a policy.
 * Runs on one dedicated thread as the sole mutator of process control
 * blocks and the memory manager; new work arrives only through the
 * bounded intake channel, and closing that channel is the shutdown
 * signal.
 */

mod types;

pub use types::{AtomicSchedulerStats, Policy, Registry, SchedulerStats};

use crate::core::config::{
    DEFAULT_MAILBOX_CAPACITY, DEFAULT_MAILBOX_COUNT, DEFAULT_QUANTUM,
};
use crate::core::types::{Cycles, Pid};
use crate::core::SimConfig;
use crate::cpu::Clock;
use crate::ipc::Mailboxes;
use crate::memory::MemoryManager;
use crate::process::{
    Engine, EngineError, ExitReason, Process, ProcessFactory, ProcessState, StepOutcome,
};
use dashmap::DashMap;
use log::{debug, info, warn};
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// How long an idle scheduler blocks on the intake before rechecking
const IDLE_WAIT: Duration = Duration::from_millis(5);

/// How one CPU slice ended
enum SliceEnd {
    /// Quantum expired; the process stays ready
    Quantum,
    /// Runtime budget reached zero
    Budget,
    /// Instruction stream exhausted
    Exhausted,
    /// Admission failed under memory pressure; park the process
    Pressure,
    /// Engine fault, fatal to the process
    Fault(EngineError),
}

/// CPU scheduler
pub struct Scheduler {
    policy: Policy,
    quantum: Cycles,
    clock: Arc<Clock>,
    engine: Engine,
    memory: MemoryManager,
    intake: flume::Receiver<Process>,
    ready: VecDeque<Process>,
    /// Parked processes, tagged with the release generation they saw
    waiting: Vec<(u64, Process)>,
    registry: Registry,
    /// Ready-queue order as of the last pass, for the display side
    ready_snapshot: Arc<RwLock<Vec<Pid>>>,
    stats: Arc<AtomicSchedulerStats>,
    intake_open: bool,
}

/// Builder for the scheduler
///
/// Unset collaborators fall back to defaults, which keeps test setup
/// short; production wiring passes every piece explicitly.
pub struct SchedulerBuilder {
    policy: Policy,
    quantum: Cycles,
    clock: Option<Arc<Clock>>,
    factory: Option<Arc<ProcessFactory>>,
    mailboxes: Option<Arc<Mailboxes>>,
    memory: Option<MemoryManager>,
    intake_tx: flume::Sender<Process>,
    intake_rx: flume::Receiver<Process>,
}

impl SchedulerBuilder {
    pub fn policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    pub fn quantum(mut self, quantum: Cycles) -> Self {
        self.quantum = quantum;
        self
    }

    pub fn clock(mut self, clock: Arc<Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn factory(mut self, factory: Arc<ProcessFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn mailboxes(mut self, mailboxes: Arc<Mailboxes>) -> Self {
        self.mailboxes = Some(mailboxes);
        self
    }

    pub fn memory(mut self, memory: MemoryManager) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn build(self) -> Scheduler {
        let clock = self.clock.unwrap_or_else(|| Arc::new(Clock::new()));
        let factory = self
            .factory
            .unwrap_or_else(|| Arc::new(ProcessFactory::new(DEFAULT_MAILBOX_COUNT)));
        let mailboxes = self.mailboxes.unwrap_or_else(|| {
            Arc::new(Mailboxes::new(DEFAULT_MAILBOX_COUNT, DEFAULT_MAILBOX_CAPACITY))
        });
        let memory = self
            .memory
            .unwrap_or_else(|| MemoryManager::with_config(&SimConfig::default()));

        let engine = Engine::new(Arc::clone(&clock), factory, mailboxes, self.intake_tx);

        info!(
            "scheduler initialized: policy {}, quantum {} cycles",
            self.policy, self.quantum
        );

        Scheduler {
            policy: self.policy,
            quantum: self.quantum,
            stats: Arc::new(AtomicSchedulerStats::new(self.policy, self.quantum)),
            clock,
            engine,
            memory,
            intake: self.intake_rx,
            ready: VecDeque::new(),
            waiting: Vec::new(),
            registry: Arc::new(DashMap::with_hasher(ahash::RandomState::new())),
            ready_snapshot: Arc::new(RwLock::new(Vec::new())),
            intake_open: true,
        }
    }
}

impl Scheduler {
    /// Start building a scheduler around an intake channel pair. The
    /// sender is what the engine re-enters forked children through.
    pub fn builder(
        intake_tx: flume::Sender<Process>,
        intake_rx: flume::Receiver<Process>,
    ) -> SchedulerBuilder {
        SchedulerBuilder {
            policy: Policy::RoundRobin,
            quantum: DEFAULT_QUANTUM,
            clock: None,
            factory: None,
            mailboxes: None,
            memory: None,
            intake_tx,
            intake_rx,
        }
    }

    /// Shared process registry for the display side
    pub fn registry(&self) -> Registry {
        Arc::clone(&self.registry)
    }

    /// Counter handle for the display side
    pub fn stats_handle(&self) -> Arc<AtomicSchedulerStats> {
        Arc::clone(&self.stats)
    }

    /// Ready-queue order as of the last pass, for the display side
    pub fn ready_snapshot(&self) -> Arc<RwLock<Vec<Pid>>> {
        Arc::clone(&self.ready_snapshot)
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats.snapshot()
    }

    /// Read-only view of the memory manager
    pub fn memory(&self) -> &MemoryManager {
        &self.memory
    }

    /// Run until the intake closes and all queued work drains
    pub fn run(mut self) {
        info!("scheduler running");
        while self.pass() {
            if self.ready.is_empty() {
                // Idle: block briefly for the next arrival instead of
                // spinning on an empty queue
                match self.intake.recv_timeout(IDLE_WAIT) {
                    Ok(process) => self.admit(process),
                    Err(flume::RecvTimeoutError::Timeout) => {}
                    Err(flume::RecvTimeoutError::Disconnected) => self.intake_open = false,
                }
            }
        }
        info!("scheduler stopped: intake closed and queues drained");
    }

    /// One scheduling cycle: drain the intake, retry parked processes,
    /// then run a single policy pass. Returns false once shutdown is
    /// complete. Public so tests and embedders can single-step.
    pub fn pass(&mut self) -> bool {
        self.drain_intake();
        self.retry_waiting();

        match self.policy {
            Policy::RoundRobin => self.round_robin_pass(),
            Policy::Fcfs => self.fcfs_pass(),
        }

        if !self.intake_open && self.ready.is_empty() && self.intake.is_empty() {
            self.fail_stranded_waiters();
        }

        self.stats.inc_pass();
        self.stats.set_queues(self.ready.len(), self.waiting.len());
        *self.ready_snapshot.write() = self.ready.iter().map(|p| p.pid).collect();

        // Children forked during this pass are still in the channel;
        // count them as pending work
        self.intake_open
            || !self.ready.is_empty()
            || !self.waiting.is_empty()
            || !self.intake.is_empty()
    }

    /// Non-blocking intake check; closure of the external producer side
    /// flags shutdown
    fn drain_intake(&mut self) {
        loop {
            match self.intake.try_recv() {
                Ok(process) => self.admit(process),
                Err(flume::TryRecvError::Empty) => break,
                Err(flume::TryRecvError::Disconnected) => {
                    self.intake_open = false;
                    break;
                }
            }
        }

        // The engine keeps one sender for FORK re-entry, so the channel
        // never fully disconnects on its own; the intake counts as closed
        // once that handle is the only one left
        if self.intake_open && self.intake.sender_count() <= 1 {
            info!("intake closed: scheduler draining remaining work");
            self.intake_open = false;
        }
    }

    fn admit(&mut self, mut process: Process) {
        process.pages = self.memory.reserve(process.memory, process.pid);
        process.state = ProcessState::Ready;
        info!(
            "admitted process {} {:?} ({} pages)",
            process.pid,
            process.name,
            process.pages.len()
        );
        self.registry.insert(process.pid, process.info());
        self.ready.push_back(process);
    }

    /// Re-ready parked processes once frames have been freed since they
    /// were parked
    fn retry_waiting(&mut self) {
        if self.waiting.is_empty() {
            return;
        }

        let generation = self.memory.release_generation();
        let mut parked = Vec::new();
        for (parked_at, mut process) in self.waiting.drain(..) {
            if generation > parked_at {
                debug!("retrying process {} after memory release", process.pid);
                process.state = ProcessState::Ready;
                self.registry.insert(process.pid, process.info());
                self.ready.push_back(process);
            } else {
                parked.push((parked_at, process));
            }
        }
        self.waiting = parked;
    }

    /// Visit every ready process once, granting each at most one quantum
    fn round_robin_pass(&mut self) {
        let mut i = 0;
        while i < self.ready.len() {
            self.ready[i].state = ProcessState::Running;
            self.stats.inc_context_switches();

            let end = Self::run_slice(
                &self.engine,
                &mut self.memory,
                &self.clock,
                Some(self.quantum),
                &mut self.ready[i],
            );

            match end {
                SliceEnd::Quantum => {
                    self.stats.inc_preemptions();
                    let process = &mut self.ready[i];
                    process.state = ProcessState::Ready;
                    self.registry.insert(process.pid, process.info());
                    i += 1;
                }
                SliceEnd::Budget | SliceEnd::Exhausted => {
                    self.retire_at(i, ExitReason::Completed);
                }
                SliceEnd::Fault(err) => {
                    warn!("process {} faulted: {}", self.ready[i].pid, err);
                    self.retire_at(i, ExitReason::Faulted);
                }
                SliceEnd::Pressure => self.park_at(i),
            }
        }
    }

    /// Run the head of the queue to completion; arrivals interleave only
    /// at completion boundaries
    fn fcfs_pass(&mut self) {
        let Some(mut process) = self.ready.pop_front() else {
            return;
        };

        process.state = ProcessState::Running;
        self.stats.inc_context_switches();
        self.registry.insert(process.pid, process.info());

        let end = Self::run_slice(&self.engine, &mut self.memory, &self.clock, None, &mut process);

        match end {
            SliceEnd::Budget | SliceEnd::Exhausted => self.retire(process, ExitReason::Completed),
            SliceEnd::Fault(err) => {
                warn!("process {} faulted: {}", process.pid, err);
                self.retire(process, ExitReason::Faulted);
            }
            SliceEnd::Pressure => self.park(process),
            SliceEnd::Quantum => {
                // Unbounded slice never expires; keep the process ready
                process.state = ProcessState::Ready;
                self.registry.insert(process.pid, process.info());
                self.ready.push_back(process);
            }
        }
    }

    /// Repeatedly invoke the engine until the quantum window over the
    /// CPU clock closes, the budget empties, or the stream ends
    fn run_slice(
        engine: &Engine,
        memory: &mut MemoryManager,
        clock: &Clock,
        quantum: Option<Cycles>,
        process: &mut Process,
    ) -> SliceEnd {
        let start = clock.total();
        loop {
            match engine.step(process, memory) {
                Ok(StepOutcome::Exhausted) => return SliceEnd::Exhausted,
                Ok(StepOutcome::Continue) => {
                    if process.runtime == 0 {
                        return SliceEnd::Budget;
                    }
                    if let Some(quantum) = quantum {
                        if clock.total() - start >= quantum {
                            return SliceEnd::Quantum;
                        }
                    }
                }
                Err(EngineError::MemoryPressure(_)) => return SliceEnd::Pressure,
                Err(err) => return SliceEnd::Fault(err),
            }
        }
    }

    /// Swap-with-last removal: ready-queue order is deliberately not
    /// preserved
    fn retire_at(&mut self, i: usize, reason: ExitReason) {
        if let Some(process) = self.ready.swap_remove_back(i) {
            self.retire(process, reason);
        }
    }

    fn retire(&mut self, mut process: Process, reason: ExitReason) {
        let freed = self.memory.release(process.pid);
        process.state = ProcessState::Terminated;
        process.exit = Some(reason);
        process.pages.clear();

        match reason {
            ExitReason::Completed => self.stats.inc_completed(),
            ExitReason::Faulted => self.stats.inc_faulted(),
        }

        info!(
            "process {} terminated ({:?}), {} pages released",
            process.pid, reason, freed
        );
        self.registry.insert(process.pid, process.info());
    }

    fn park_at(&mut self, i: usize) {
        if let Some(process) = self.ready.swap_remove_back(i) {
            self.park(process);
        }
    }

    fn park(&mut self, mut process: Process) {
        process.state = ProcessState::Waiting;
        debug!("process {} parked on memory pressure", process.pid);
        self.registry.insert(process.pid, process.info());
        self.waiting.push((self.memory.release_generation(), process));
    }

    /// With the intake closed and nothing runnable, parked processes can
    /// never be unblocked; fail them rather than hang the drain
    fn fail_stranded_waiters(&mut self) {
        if self.waiting.is_empty() {
            return;
        }

        warn!(
            "intake closed with {} processes stranded on memory pressure",
            self.waiting.len()
        );
        let stranded: Vec<Process> = self.waiting.drain(..).map(|(_, process)| process).collect();
        for process in stranded {
            self.retire(process, ExitReason::Faulted);
        }
    }
}
