//! Post-execution validation: ordered command stages, a remediation catalog,
//! and the bounded loop that drives them.

pub mod level;
pub mod loop_runner;
pub mod remediation;

pub use level::{StageRun, ValidationLevel};
pub use loop_runner::{Blocker, LoopResult, ValidationLoop, DEFAULT_MAX_ATTEMPTS};
pub use remediation::{RemediationCatalog, RemediationEntry};
