//! Team Orchestrator (C4) and Team Protocol (C5).

pub mod orchestrator;
pub mod protocol;

pub use orchestrator::{OrchestratorConfig, TeamOrchestrator};
pub use protocol::{
    BarrierState, EventState, LockState, SemaphoreState, StatusReport, TeamProtocol, Vote,
    VoteOption, VoteTally,
};
