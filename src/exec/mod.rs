//! Process-level execution: worker specs, per-task supervision, and the
//! per-level fork/join executor.

pub mod executor;
pub mod supervisor;
pub mod worker;

pub use executor::{level_failed, ParallelExecutor};
pub use supervisor::{Outcome, ProcessSupervisor};
pub use worker::WorkerSpec;
