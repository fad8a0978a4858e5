/*!
 * Process Management
 * Control blocks, the creation factory, the execution engine, and
 * template-driven process generation
 */

pub mod execution;
pub mod pcb;
pub mod template;
pub mod types;

pub use execution::{Engine, EngineError, EngineResult, StepOutcome};
pub use pcb::{Process, ProcessFactory};
pub use template::{spawn_variants, Template, TemplateError, TemplateResult};
pub use types::{ExitReason, ProcessInfo, ProcessState};
