pub mod audit;
pub mod config;
pub mod error;
pub mod gate;
pub mod log;
pub mod plan;
pub mod tracker;

pub mod core;
pub mod exec;
pub mod validate;

pub mod run;

pub use audit::{AuditEvent, AuditLog, AuditRecord, RunId};
pub use config::{Config, RunContext};
pub use crate::core::{
    DependencyGraph, ExecutionLevel, ExitClassification, Task, TaskId, TaskStatus,
};
pub use error::{Error, Result};
pub use exec::{Outcome, ParallelExecutor, ProcessSupervisor, WorkerSpec};
pub use gate::{Decision, QualityGate};
pub use plan::Plan;
pub use run::{EscalationPolicy, RunReport, RunStatus, WorkflowRun};
pub use validate::{RemediationCatalog, ValidationLevel, ValidationLoop};
