/*!
 * Core Types
 * Common types used across the simulator
 */

/// Process ID type
pub type Pid = u32;

/// Virtual memory page ID type
pub type PageId = u64;

/// CPU cycle count type
pub type Cycles = u64;

/// Size type for memory requirements
pub type Size = usize;

/// Priority level (higher is more important)
pub type Priority = u8;
