//! Control Plane (C9): a budget-tracking resource allocator and a
//! class-based policy gate, both built on the interfaces in
//! `orch_core::control`.

pub mod allocator;
pub mod policy;

pub use allocator::BudgetAllocator;
pub use policy::{ActionClass, RulePolicyGate};
