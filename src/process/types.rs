/*!
 * Process Types
 * Common types for process management
 */

use crate::core::types::{Cycles, Pid, Priority, Size};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Process lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    /// Created, not yet admitted by the scheduler
    New,
    /// In the ready queue
    Ready,
    /// Currently holding the CPU
    Running,
    /// Parked after an admission failure, awaiting freed frames
    Waiting,
    /// Finished; see the exit reason
    Terminated,
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProcessState::New => "new",
            ProcessState::Ready => "ready",
            ProcessState::Running => "running",
            ProcessState::Waiting => "waiting",
            ProcessState::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

/// Why a process terminated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    /// Instruction stream exhausted, EXE reached, or runtime budget spent
    Completed,
    /// Addressing or mailbox failure
    Faulted,
}

/// Registry row describing one process, for the display side
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ProcessInfo {
    pub pid: Pid,
    pub name: String,
    pub state: ProcessState,
    pub priority: Priority,
    pub runtime: Cycles,
    pub memory: Size,
    pub mailbox: usize,
    pub pages: usize,
    pub children: Vec<Pid>,
    pub parent: Option<Pid>,
    pub critical: bool,
    pub exit: Option<ExitReason>,
}
