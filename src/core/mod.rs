//! Core planning data structures: tasks and the dependency graph.

pub mod graph;
pub mod task;

pub use graph::{DependencyGraph, ExecutionLevel};
pub use task::{ExitClassification, Task, TaskId, TaskStatus};
