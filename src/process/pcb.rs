/*!
 * Process Control Block
 * Process identity, owned resources, and the creation factory
 */

use super::types::{ExitReason, ProcessInfo, ProcessState};
use crate::bytecode::Instructions;
use crate::core::types::{Cycles, PageId, Pid, Priority, Size};
use log::debug;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

const DEFAULT_PRIORITY: Priority = 1;

/// Process control block
#[derive(Debug, Clone)]
pub struct Process {
    pub pid: Pid,
    pub name: String,
    pub state: ProcessState,
    /// Remaining runtime budget in CPU cycles
    pub runtime: Cycles,
    /// Memory requirement in size units
    pub memory: Size,
    pub priority: Priority,
    /// Child PIDs in spawn order
    pub children: Vec<Pid>,
    /// Lookup-only back-reference; a child outlives its parent
    pub parent: Option<Pid>,
    /// Byte offset of the next instruction, always in [0, program.len()]
    pub ip: usize,
    pub program: Instructions,
    /// Virtual-memory page IDs owned by this process
    pub pages: Vec<PageId>,
    pub critical: bool,
    /// Assigned mailbox slot
    pub mailbox: usize,
    pub exit: Option<ExitReason>,
}

impl Process {
    /// Registry row for the display side
    pub fn info(&self) -> ProcessInfo {
        ProcessInfo {
            pid: self.pid,
            name: self.name.clone(),
            state: self.state,
            priority: self.priority,
            runtime: self.runtime,
            memory: self.memory,
            mailbox: self.mailbox,
            pages: self.pages.len(),
            children: self.children.clone(),
            parent: self.parent,
            critical: self.critical,
            exit: self.exit,
        }
    }
}

/// Process factory
///
/// Owns the PID counter and the round-robin mailbox assignment. PIDs are
/// unique, monotonic, and never reused, regardless of whether a process
/// comes from the shell, a template, or a fork.
pub struct ProcessFactory {
    next_pid: AtomicU32,
    next_mailbox: AtomicUsize,
    mailbox_count: usize,
}

impl ProcessFactory {
    pub fn new(mailbox_count: usize) -> Self {
        Self {
            next_pid: AtomicU32::new(1),
            next_mailbox: AtomicUsize::new(0),
            mailbox_count,
        }
    }

    pub fn create(
        &self,
        name: impl Into<String>,
        runtime: Cycles,
        memory: Size,
        program: Instructions,
        ip: usize,
        parent: Option<Pid>,
    ) -> Process {
        debug_assert!(ip <= program.len());

        let pid = self.next_pid.fetch_add(1, Ordering::Relaxed);
        let mailbox = self.next_mailbox.fetch_add(1, Ordering::Relaxed) % self.mailbox_count;
        let name = name.into();
        debug!("created process {} ({:?}), mailbox {}", pid, name, mailbox);

        Process {
            pid,
            name,
            state: ProcessState::New,
            runtime,
            memory,
            priority: DEFAULT_PRIORITY,
            children: Vec::new(),
            parent,
            ip,
            program,
            pages: Vec::new(),
            critical: false,
            mailbox,
            exit: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pids_are_monotonic() {
        let factory = ProcessFactory::new(4);
        let a = factory.create("a", 0, 0, Instructions::new(), 0, None);
        let b = factory.create("b", 0, 0, Instructions::new(), 0, None);
        assert!(b.pid > a.pid);
    }

    #[test]
    fn mailboxes_assigned_round_robin() {
        let factory = ProcessFactory::new(2);
        let slots: Vec<usize> = (0..4)
            .map(|_| factory.create("p", 0, 0, Instructions::new(), 0, None).mailbox)
            .collect();
        assert_eq!(slots, vec![0, 1, 0, 1]);
    }
}
