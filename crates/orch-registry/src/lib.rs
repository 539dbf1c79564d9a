//! Document Registry (C1) and Handoff Protocol (C2).

pub mod handoff;
pub mod registry;

pub use handoff::{HandoffProtocol, HandoffState, HandoffValidator, NotificationHandler, ValidationOutcome};
pub use registry::{DocumentFilter, DocumentRegistry, ExportFormat, RegistryState, RegistryStatistics};
