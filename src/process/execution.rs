/*!
 * Execution Engine
 * Advances a process by exactly one instruction per invocation
 */

use super::pcb::{Process, ProcessFactory};
use crate::bytecode::Opcode;
use crate::cpu::Clock;
use crate::ipc::{IpcError, Mailboxes};
use crate::memory::{MemoryError, MemoryManager};
use log::{debug, warn};
use std::sync::Arc;
use thiserror::Error;

/// Engine operation result
pub type EngineResult<T> = Result<T, EngineError>;

/// Engine-level failures
///
/// Memory pressure is recoverable (the scheduler parks the process);
/// everything else is fatal to the process.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("addressing fault: {0}")]
    Addressing(MemoryError),

    #[error("memory pressure: no eviction candidate for process {0}")]
    MemoryPressure(crate::core::types::Pid),

    #[error("mailbox failure: {0}")]
    Mailbox(#[from] IpcError),
}

/// Result of executing one instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The process can keep running
    Continue,
    /// No more instructions; the process should terminate
    Exhausted,
}

/// Bytecode interpreter driving scheduler and memory side effects
pub struct Engine {
    clock: Arc<Clock>,
    factory: Arc<ProcessFactory>,
    mailboxes: Arc<Mailboxes>,
    intake: flume::Sender<Process>,
}

impl Engine {
    pub fn new(
        clock: Arc<Clock>,
        factory: Arc<ProcessFactory>,
        mailboxes: Arc<Mailboxes>,
        intake: flume::Sender<Process>,
    ) -> Self {
        Self {
            clock,
            factory,
            mailboxes,
            intake,
        }
    }

    /// Execute the process's next instruction.
    ///
    /// Touches the process's working set first, so demand paging and
    /// eviction happen before any instruction effect.
    pub fn step(&self, proc: &mut Process, memory: &mut MemoryManager) -> EngineResult<StepOutcome> {
        if proc.ip >= proc.program.len() {
            return Ok(StepOutcome::Exhausted);
        }

        self.touch_working_set(proc, memory)?;

        let byte = proc.program.as_bytes()[proc.ip];
        let Some(op) = Opcode::from_byte(byte) else {
            // Unrecognized opcodes do not halt the process
            debug!("process {}: unknown opcode {} at {}, skipping", proc.pid, byte, proc.ip);
            proc.ip += 1;
            return Ok(StepOutcome::Continue);
        };

        match op {
            Opcode::Calc => self.calc(proc),
            Opcode::Io => {
                // Device interaction is not modeled; skip past the operand
                proc.ip += 2;
            }
            Opcode::Exe => return Ok(StepOutcome::Exhausted),
            Opcode::Fork => {
                proc.ip += 1;
                self.fork(proc);
            }
            Opcode::Enter => {
                proc.ip += 1;
                proc.critical = true;
            }
            Opcode::Exit => {
                proc.ip += 1;
                proc.critical = false;
            }
            Opcode::Send => {
                let payload = proc.program.as_bytes().get(proc.ip + 1).copied().unwrap_or(0);
                proc.ip += 2;
                // Best-effort: a full mailbox drops the byte
                self.mailboxes.send(proc.mailbox, payload)?;
            }
            Opcode::Recv => {
                // Operand byte is reserved
                proc.ip += 2;
                self.mailboxes.recv(proc.mailbox)?;
            }
            Opcode::Nop => proc.ip += 1,
        }

        Ok(StepOutcome::Continue)
    }

    /// Inline countdown: the instruction is revisited across quanta until
    /// its operand reaches zero
    fn calc(&self, proc: &mut Process) {
        self.clock.tick(1);
        proc.runtime = proc.runtime.saturating_sub(1);

        match proc.program.as_bytes_mut().get_mut(proc.ip + 1) {
            Some(countdown) => {
                *countdown = countdown.saturating_sub(1);
                if *countdown == 0 {
                    proc.ip += 2;
                }
            }
            // Operand byte missing: the stream ends inside the instruction
            None => proc.ip = proc.program.len(),
        }
    }

    /// Construct a child resuming at the instruction after the fork point
    /// and hand it to the scheduler's intake
    fn fork(&self, proc: &mut Process) {
        let child = self.factory.create(
            format!("fork:{}", proc.name),
            proc.runtime,
            proc.memory,
            proc.program.clone(),
            proc.ip,
            Some(proc.pid),
        );
        proc.children.push(child.pid);

        match self.intake.try_send(child) {
            Ok(()) => {}
            Err(flume::TrySendError::Full(child)) => {
                warn!("intake full: dropping forked child {} of process {}", child.pid, proc.pid);
            }
            Err(flume::TrySendError::Disconnected(child)) => {
                warn!("intake closed: dropping forked child {} of process {}", child.pid, proc.pid);
            }
        }
    }

    /// Resolve the page backing this instruction's slice of the working
    /// set, cycling over the process's pages by instruction pointer
    fn touch_working_set(&self, proc: &Process, memory: &mut MemoryManager) -> EngineResult<()> {
        if proc.pages.is_empty() {
            return Ok(());
        }

        let page_id = proc.pages[proc.ip % proc.pages.len()];
        match memory.resolve(page_id) {
            Ok(_) => Ok(()),
            Err(MemoryError::NoEvictionCandidate(pid)) => Err(EngineError::MemoryPressure(pid)),
            Err(err) => Err(EngineError::Addressing(err)),
        }
    }
}
