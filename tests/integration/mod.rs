//! Integration test suite for foreman.
//!
//! These tests exercise full plans from parsing to completion, including
//! parallel level execution, process supervision, the validation loop, and
//! the quality gate.
//!
//! # Test Categories
//!
//! - `leveling`: dependency graph leveling and conflict detection
//! - `parallel`: per-level fork/join execution correctness
//! - `supervision`: timeout, grace, and kill behavior
//! - `validation`: bounded validation loop and remediation
//! - `workflow_e2e`: full runs through the driver
//!
//! # CI Compatibility
//!
//! Workers are plain `sh` commands; no external agent binaries are invoked,
//! making the suite safe to run in CI environments.


mod leveling;
mod parallel;
mod supervision;
mod validation;
mod workflow_e2e;
