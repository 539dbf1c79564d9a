//! Team Protocol (C5): broadcast, voting and team-scoped synchronization
//! primitives.
//!
//! Scheduling model: each agent processes protocol operations
//! cooperatively and in order (no two operations from the same agent
//! overlap), but different agents' operations proceed in parallel. All
//! primitives here are therefore keyed by `(TeamId, name)` and guarded by
//! a single async lock per team; waiters are woken via `tokio::sync`
//! primitives rather than polling.

use chrono::{DateTime, Utc};
use orch_core::{AgentId, OrchError, OrchResult, TeamId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify, RwLock};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    pub agent_id: AgentId,
    pub team_id: TeamId,
    pub summary: String,
    pub reported_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteOption {
    Approve,
    Reject,
    Veto,
    Abstain,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    pub agent_id: AgentId,
    pub option: VoteOption,
    pub cast_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteTally {
    /// `veto_allowed` was set and at least one VETO ballot was cast.
    Vetoed,
    /// `count(Approve) / total_members >= threshold`.
    Passed,
    /// At least one ballot was cast, but the threshold was not reached.
    Failed,
    /// No ballots were cast before the tally.
    NoQuorum,
}

struct VoteState {
    total_members: usize,
    threshold: f64,
    allow_veto: bool,
    deadline: DateTime<Utc>,
    ballots: HashMap<AgentId, Vote>,
    closed: bool,
}

#[derive(Default)]
struct TeamChannel {
    reports: Vec<StatusReport>,
    votes: HashMap<String, VoteState>,
    barriers: HashMap<String, Arc<BarrierInner>>,
    locks: HashMap<String, Arc<Mutex<Option<AgentId>>>>,
    semaphores: HashMap<String, Arc<SemaphoreInner>>,
    events: HashMap<String, Arc<EventInner>>,
}

struct BarrierInner {
    parties: usize,
    arrived: Mutex<usize>,
    notify: Notify,
}

struct SemaphoreInner {
    permits: Mutex<usize>,
    notify: Notify,
}

struct EventInner {
    set: Mutex<bool>,
    notify: Notify,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarrierState {
    pub parties: usize,
    pub arrived: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SemaphoreState {
    pub permits: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockState {
    pub held: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventState {
    pub set: bool,
}

/// Team-scoped broadcast, voting and synchronization primitives.
///
/// All state is in-memory and scoped to the process lifetime: the
/// protocol coordinates agents that are already online, not a durable
/// message log.
#[derive(Default)]
pub struct TeamProtocol {
    channels: RwLock<HashMap<TeamId, Arc<RwLock<TeamChannel>>>>,
}

impl TeamProtocol {
    pub fn new() -> Self {
        Self::default()
    }

    async fn channel(&self, team_id: &TeamId) -> Arc<RwLock<TeamChannel>> {
        if let Some(c) = self.channels.read().await.get(team_id) {
            return Arc::clone(c);
        }
        let mut channels = self.channels.write().await;
        Arc::clone(
            channels
                .entry(team_id.clone())
                .or_insert_with(|| Arc::new(RwLock::new(TeamChannel::default()))),
        )
    }

    /// Record a status broadcast. Fan-out to live listeners is left to the
    /// caller (e.g. the orchestrator's event bus); this keeps an
    /// append-only log of the last report per agent.
    pub async fn broadcast_status(&self, report: StatusReport) -> OrchResult<()> {
        let channel = self.channel(&report.team_id).await;
        let mut channel = channel.write().await;
        channel.reports.retain(|r| r.agent_id != report.agent_id);
        channel.reports.push(report);
        Ok(())
    }

    pub async fn status_reports(&self, team_id: &TeamId) -> Vec<StatusReport> {
        let channel = self.channel(team_id).await;
        let reports = channel.read().await.reports.clone();
        reports
    }

    /// Open a vote with the proposal's passage `threshold` (a fraction of
    /// `total_members`), whether a VETO ballot alone can close it, and the
    /// absolute instant after which `cast_vote` stops accepting ballots.
    pub async fn open_vote(
        &self,
        team_id: &TeamId,
        topic: &str,
        total_members: usize,
        threshold: f64,
        allow_veto: bool,
        deadline: DateTime<Utc>,
    ) -> OrchResult<()> {
        let channel = self.channel(team_id).await;
        let mut channel = channel.write().await;
        channel.votes.insert(
            topic.to_string(),
            VoteState {
                total_members,
                threshold,
                allow_veto,
                deadline,
                ballots: HashMap::new(),
                closed: false,
            },
        );
        Ok(())
    }

    /// Exactly one ballot per agent is kept; re-voting overwrites the prior
    /// ballot (last write wins). Rejected once the vote is closed or its
    /// deadline has passed.
    pub async fn cast_vote(&self, team_id: &TeamId, topic: &str, vote: Vote) -> OrchResult<()> {
        let channel = self.channel(team_id).await;
        let mut channel = channel.write().await;
        let state = channel
            .votes
            .get_mut(topic)
            .ok_or_else(|| OrchError::not_found(format!("no open vote '{topic}'")))?;
        if state.closed {
            return Err(OrchError::precondition_failed("vote already closed"));
        }
        if Utc::now() >= state.deadline {
            return Err(OrchError::precondition_failed(format!("vote '{topic}' deadline has passed")));
        }
        state.ballots.insert(vote.agent_id.clone(), vote);
        Ok(())
    }

    /// Tally against `total_members` as the fixed denominator (non-voters
    /// count against passage):
    /// - `allow_veto ∧ count(Veto) > 0` → VETOED.
    /// - `count(Approve) / total_members >= threshold` → PASSED.
    /// - any ballots were cast → FAILED.
    /// - else → NO_QUORUM.
    pub async fn tally(&self, team_id: &TeamId, topic: &str) -> OrchResult<VoteTally> {
        let channel = self.channel(team_id).await;
        let mut channel = channel.write().await;
        let state = channel
            .votes
            .get_mut(topic)
            .ok_or_else(|| OrchError::not_found(format!("no open vote '{topic}'")))?;

        let approvals = state.ballots.values().filter(|v| v.option == VoteOption::Approve).count();
        let ratio = if state.total_members == 0 {
            0.0
        } else {
            approvals as f64 / state.total_members as f64
        };

        let tally = if state.allow_veto && state.ballots.values().any(|v| v.option == VoteOption::Veto) {
            VoteTally::Vetoed
        } else if ratio >= state.threshold {
            VoteTally::Passed
        } else if !state.ballots.is_empty() {
            VoteTally::Failed
        } else {
            VoteTally::NoQuorum
        };

        state.closed = true;
        Ok(tally)
    }

    pub async fn barrier(&self, team_id: &TeamId, name: &str, parties: usize) -> OrchResult<()> {
        let channel = self.channel(team_id).await;
        let inner = {
            let mut channel = channel.write().await;
            Arc::clone(channel.barriers.entry(name.to_string()).or_insert_with(|| {
                Arc::new(BarrierInner {
                    parties,
                    arrived: Mutex::new(0),
                    notify: Notify::new(),
                })
            }))
        };

        let generation_full = {
            let mut arrived = inner.arrived.lock().await;
            *arrived += 1;
            *arrived >= inner.parties
        };

        if generation_full {
            inner.notify.notify_waiters();
            Ok(())
        } else {
            inner.notify.notified().await;
            Ok(())
        }
    }

    pub async fn barrier_state(&self, team_id: &TeamId, name: &str) -> Option<BarrierState> {
        let channel = self.channel(team_id).await;
        let channel = channel.read().await;
        let inner = channel.barriers.get(name)?;
        let arrived = *inner.arrived.lock().await;
        Some(BarrierState {
            parties: inner.parties,
            arrived,
        })
    }

    pub async fn lock(&self, team_id: &TeamId, name: &str, agent_id: AgentId, timeout: Duration) -> OrchResult<()> {
        let channel = self.channel(team_id).await;
        let lock = {
            let mut channel = channel.write().await;
            Arc::clone(
                channel
                    .locks
                    .entry(name.to_string())
                    .or_insert_with(|| Arc::new(Mutex::new(None))),
            )
        };

        let fut = async {
            loop {
                let mut holder = lock.lock().await;
                if holder.is_none() {
                    *holder = Some(agent_id.clone());
                    return;
                }
                drop(holder);
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };

        tokio::time::timeout(timeout, fut)
            .await
            .map_err(|_| OrchError::timeout(format!("lock '{name}' not acquired within {timeout:?}")))
    }

    pub async fn unlock(&self, team_id: &TeamId, name: &str, agent_id: &AgentId) -> OrchResult<()> {
        let channel = self.channel(team_id).await;
        let lock = {
            let channel = channel.read().await;
            channel
                .locks
                .get(name)
                .cloned()
                .ok_or_else(|| OrchError::not_found(format!("lock '{name}' not found")))?
        };
        let mut holder = lock.lock().await;
        if holder.as_ref() != Some(agent_id) {
            return Err(OrchError::permission_denied("agent does not hold this lock"));
        }
        *holder = None;
        Ok(())
    }

    pub async fn lock_state(&self, team_id: &TeamId, name: &str) -> Option<LockState> {
        let channel = self.channel(team_id).await;
        let channel = channel.read().await;
        let lock = channel.locks.get(name)?;
        let held = lock.lock().await.is_some();
        Some(LockState { held })
    }

    pub async fn acquire_semaphore(&self, team_id: &TeamId, name: &str, permits: usize, timeout: Duration) -> OrchResult<()> {
        let channel = self.channel(team_id).await;
        let inner = {
            let mut channel = channel.write().await;
            Arc::clone(channel.semaphores.entry(name.to_string()).or_insert_with(|| {
                Arc::new(SemaphoreInner {
                    permits: Mutex::new(permits),
                    notify: Notify::new(),
                })
            }))
        };

        let fut = async {
            loop {
                {
                    let mut remaining = inner.permits.lock().await;
                    if *remaining > 0 {
                        *remaining -= 1;
                        return;
                    }
                }
                inner.notify.notified().await;
            }
        };

        tokio::time::timeout(timeout, fut)
            .await
            .map_err(|_| OrchError::timeout(format!("semaphore '{name}' not acquired within {timeout:?}")))
    }

    pub async fn release_semaphore(&self, team_id: &TeamId, name: &str) -> OrchResult<()> {
        let channel = self.channel(team_id).await;
        let inner = {
            let channel = channel.read().await;
            channel
                .semaphores
                .get(name)
                .cloned()
                .ok_or_else(|| OrchError::not_found(format!("semaphore '{name}' not found")))?
        };
        *inner.permits.lock().await += 1;
        inner.notify.notify_one();
        Ok(())
    }

    pub async fn semaphore_state(&self, team_id: &TeamId, name: &str) -> Option<SemaphoreState> {
        let channel = self.channel(team_id).await;
        let inner = {
            let channel = channel.read().await;
            channel.semaphores.get(name)?.clone()
        };
        let permits = *inner.permits.lock().await;
        Some(SemaphoreState { permits })
    }

    pub async fn set_event(&self, team_id: &TeamId, name: &str) -> OrchResult<()> {
        let channel = self.channel(team_id).await;
        let inner = {
            let mut channel = channel.write().await;
            Arc::clone(channel.events.entry(name.to_string()).or_insert_with(|| {
                Arc::new(EventInner {
                    set: Mutex::new(false),
                    notify: Notify::new(),
                })
            }))
        };
        *inner.set.lock().await = true;
        inner.notify.notify_waiters();
        Ok(())
    }

    pub async fn wait_event(&self, team_id: &TeamId, name: &str, timeout: Duration) -> OrchResult<()> {
        let channel = self.channel(team_id).await;
        let inner = {
            let mut channel = channel.write().await;
            Arc::clone(channel.events.entry(name.to_string()).or_insert_with(|| {
                Arc::new(EventInner {
                    set: Mutex::new(false),
                    notify: Notify::new(),
                })
            }))
        };

        if *inner.set.lock().await {
            return Ok(());
        }

        tokio::time::timeout(timeout, inner.notify.notified())
            .await
            .map_err(|_| OrchError::timeout(format!("event '{name}' not set within {timeout:?}")))
    }

    pub async fn event_state(&self, team_id: &TeamId, name: &str) -> Option<EventState> {
        let channel = self.channel(team_id).await;
        let inner = {
            let channel = channel.read().await;
            channel.events.get(name)?.clone()
        };
        let set = *inner.set.lock().await;
        Some(EventState { set })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vote(agent: AgentId, option: VoteOption) -> Vote {
        Vote {
            agent_id: agent,
            option,
            cast_at: Utc::now(),
        }
    }

    fn far_deadline() -> DateTime<Utc> {
        Utc::now() + chrono::Duration::hours(1)
    }

    #[tokio::test]
    async fn single_veto_overrides_majority_approval_when_allowed() {
        let protocol = TeamProtocol::new();
        let team_id = TeamId::new();
        protocol
            .open_vote(&team_id, "ship-v2", 5, 0.5, true, far_deadline())
            .await
            .unwrap();

        for _ in 0..4 {
            protocol
                .cast_vote(&team_id, "ship-v2", vote(AgentId::new(), VoteOption::Approve))
                .await
                .unwrap();
        }
        protocol
            .cast_vote(&team_id, "ship-v2", vote(AgentId::new(), VoteOption::Veto))
            .await
            .unwrap();

        assert_eq!(protocol.tally(&team_id, "ship-v2").await.unwrap(), VoteTally::Vetoed);
    }

    #[tokio::test]
    async fn veto_without_allow_veto_falls_through_to_threshold() {
        let protocol = TeamProtocol::new();
        let team_id = TeamId::new();
        protocol
            .open_vote(&team_id, "ship-v3", 5, 0.5, false, far_deadline())
            .await
            .unwrap();

        for _ in 0..4 {
            protocol
                .cast_vote(&team_id, "ship-v3", vote(AgentId::new(), VoteOption::Approve))
                .await
                .unwrap();
        }
        protocol
            .cast_vote(&team_id, "ship-v3", vote(AgentId::new(), VoteOption::Veto))
            .await
            .unwrap();

        assert_eq!(protocol.tally(&team_id, "ship-v3").await.unwrap(), VoteTally::Passed);
    }

    #[tokio::test]
    async fn below_threshold_with_some_votes_reports_failed() {
        let protocol = TeamProtocol::new();
        let team_id = TeamId::new();
        protocol
            .open_vote(&team_id, "topic", 10, 0.5, true, far_deadline())
            .await
            .unwrap();
        protocol
            .cast_vote(&team_id, "topic", vote(AgentId::new(), VoteOption::Approve))
            .await
            .unwrap();

        assert_eq!(protocol.tally(&team_id, "topic").await.unwrap(), VoteTally::Failed);
    }

    #[tokio::test]
    async fn zero_votes_reports_no_quorum() {
        let protocol = TeamProtocol::new();
        let team_id = TeamId::new();
        protocol
            .open_vote(&team_id, "topic", 10, 0.5, true, far_deadline())
            .await
            .unwrap();

        assert_eq!(protocol.tally(&team_id, "topic").await.unwrap(), VoteTally::NoQuorum);
    }

    #[tokio::test]
    async fn vote_past_deadline_is_rejected() {
        let protocol = TeamProtocol::new();
        let team_id = TeamId::new();
        let deadline = Utc::now() - chrono::Duration::seconds(1);
        protocol
            .open_vote(&team_id, "topic", 5, 0.5, true, deadline)
            .await
            .unwrap();

        let err = protocol
            .cast_vote(&team_id, "topic", vote(AgentId::new(), VoteOption::Approve))
            .await
            .unwrap_err();
        assert_eq!(err.kind, orch_core::ErrorKind::PreconditionFailed);
    }

    #[tokio::test]
    async fn barrier_releases_once_all_parties_arrive() {
        let protocol = Arc::new(TeamProtocol::new());
        let team_id = TeamId::new();

        let p = Arc::clone(&protocol);
        let t = team_id.clone();
        let waiter = tokio::spawn(async move { p.barrier(&t, "sync", 2).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        protocol.barrier(&team_id, "sync", 2).await.unwrap();
        waiter.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn lock_is_exclusive_and_releasable() {
        let protocol = TeamProtocol::new();
        let team_id = TeamId::new();
        let a1 = AgentId::new();
        let a2 = AgentId::new();

        protocol
            .lock(&team_id, "ledger", a1.clone(), Duration::from_millis(50))
            .await
            .unwrap();
        assert!(protocol
            .lock(&team_id, "ledger", a2.clone(), Duration::from_millis(20))
            .await
            .is_err());

        protocol.unlock(&team_id, "ledger", &a1).await.unwrap();
        protocol
            .lock(&team_id, "ledger", a2, Duration::from_millis(50))
            .await
            .unwrap();
    }
}
