/*!
 * Memory Types
 * Common types for the memory manager
 */

use crate::core::types::{PageId, Pid, Size};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Memory operation result
pub type MemoryResult<T> = Result<T, MemoryError>;

/// Memory errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    /// Fatal to the requesting process, not to the system
    #[error("page {0} not found in any store")]
    PageNotFound(PageId),

    /// Admission failed: every resident page belongs to another process
    #[error("no eviction candidate for process {0}")]
    NoEvictionCandidate(Pid),
}

/// A fixed-size unit of a process's memory
///
/// Resident in a physical frame or spilled to virtual storage, never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub id: PageId,
    pub owner: Pid,
    #[serde(skip)]
    pub data: Vec<u8>,
}

impl Page {
    pub fn new(id: PageId, owner: Pid, size: Size) -> Self {
        Self {
            id,
            owner,
            data: vec![0; size],
        }
    }
}

/// Memory manager statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MemoryStats {
    pub frame_capacity: usize,
    pub resident_pages: usize,
    pub virtual_pages: usize,
    pub cache_entries: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub evictions: u64,
    pub release_generation: u64,
}

impl MemoryStats {
    pub fn free_frames(&self) -> usize {
        self.frame_capacity - self.resident_pages
    }
}
