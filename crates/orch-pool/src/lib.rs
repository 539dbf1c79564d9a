//! Agent Pool (C3): dynamic agent allocator with skill matching,
//! auto-scaling and health tracking.

mod pool;

pub use pool::{
    AgentPool, AllocationHistoryRecord, AllocationOutcome, PoolConfig, PoolState, PoolStatus,
};
