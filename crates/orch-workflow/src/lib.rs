//! Workflow Engine (C6): DAG execution over document-producing steps with
//! quality-gate integration.

mod engine;

pub use engine::{EngineState, WorkflowEngine};
