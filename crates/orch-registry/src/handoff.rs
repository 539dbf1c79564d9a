//! Handoff Protocol (C2): queued document transfers with validation and
//! fire-and-forget notifications.

use crate::registry::DocumentRegistry;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use orch_core::{
    AccessLevel, DocumentId, ExpectedAction, Handoff, HandoffId, HandoffNotification,
    HandoffStatus, OrchError, OrchResult, Priority,
};
use orch_storage::SnapshotStore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct HandoffState {
    pub active: HashMap<HandoffId, Handoff>,
    pub completed: HashMap<HandoffId, Handoff>,
    pub agent_queues: HashMap<String, Vec<HandoffId>>,
}

/// Outcome of a validator invoked by `complete`.
pub struct ValidationOutcome {
    pub passed: bool,
    pub message: String,
}

#[async_trait]
pub trait HandoffValidator: Send + Sync {
    async fn validate(&self, handoff: &Handoff) -> OrchResult<ValidationOutcome>;
}

#[async_trait]
pub trait NotificationHandler: Send + Sync {
    async fn notify(&self, handoff: &Handoff, notification: HandoffNotification);
}

pub struct HandoffProtocol {
    store: SnapshotStore<HandoffState>,
    registry: Arc<DocumentRegistry>,
    validators: parking_lot::RwLock<HashMap<String, Arc<dyn HandoffValidator>>>,
    handlers: parking_lot::RwLock<HashMap<String, Arc<dyn NotificationHandler>>>,
}

impl HandoffProtocol {
    pub async fn open(
        path: impl Into<std::path::PathBuf>,
        registry: Arc<DocumentRegistry>,
    ) -> OrchResult<Self> {
        Ok(Self {
            store: SnapshotStore::open(path).await?,
            registry,
            validators: parking_lot::RwLock::new(HashMap::new()),
            handlers: parking_lot::RwLock::new(HashMap::new()),
        })
    }

    pub fn register_validator(&self, id: impl Into<String>, validator: Arc<dyn HandoffValidator>) {
        self.validators.write().insert(id.into(), validator);
    }

    pub fn register_handler(&self, agent: impl Into<String>, handler: Arc<dyn NotificationHandler>) {
        self.handlers.write().insert(agent.into(), handler);
    }

    /// Fire-and-forget: handler errors are logged and ignored, never
    /// propagated, never allowed to block the state transition.
    async fn dispatch(&self, handoff: &Handoff, notification: HandoffNotification) {
        let handler = self.handlers.read().get(&handoff.to_agent).cloned();
        if let Some(handler) = handler {
            handler.notify(handoff, notification).await;
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        &self,
        document_id: DocumentId,
        from_agent: impl Into<String>,
        to_agent: impl Into<String>,
        reason: impl Into<String>,
        instructions: impl Into<String>,
        expected_action: ExpectedAction,
        priority: Priority,
        deadline: Option<DateTime<Utc>>,
        validator_id: Option<String>,
    ) -> OrchResult<Handoff> {
        let to_agent = to_agent.into();
        let handoff = Handoff {
            id: HandoffId::new(),
            document_id: document_id.clone(),
            from_agent: from_agent.into(),
            to_agent: to_agent.clone(),
            reason: reason.into(),
            instructions: instructions.into(),
            expected_action,
            priority,
            status: HandoffStatus::Pending,
            created_at: Utc::now(),
            delivered_at: None,
            completed_at: None,
            deadline,
            validator_id,
            result_document_id: None,
            rejection_reason: None,
        };

        // Side effect: grant READ on create.
        self.registry
            .grant(&document_id, &handoff.from_agent, &to_agent, AccessLevel::Read)
            .await?;

        {
            let mut state = self.store.write_state().await;
            state.agent_queues.entry(to_agent).or_default().push(handoff.id.clone());
            state.active.insert(handoff.id.clone(), handoff.clone());
        }

        self.dispatch(&handoff, HandoffNotification::New).await;
        tracing::info!(handoff_id = %handoff.id, to = %handoff.to_agent, "handoff created");
        Ok(handoff)
    }

    pub async fn deliver(&self, id: &HandoffId) -> OrchResult<Handoff> {
        let handoff = self
            .transition(id, HandoffStatus::Pending, HandoffStatus::Delivered, |h| {
                h.delivered_at = Some(Utc::now());
            })
            .await?;
        self.dispatch(&handoff, HandoffNotification::Delivered).await;
        Ok(handoff)
    }

    pub async fn accept(&self, id: &HandoffId) -> OrchResult<Handoff> {
        let handoff = self
            .transition(id, HandoffStatus::Delivered, HandoffStatus::Accepted, |_| {})
            .await?;

        if handoff.expected_action.is_edit_style() {
            self.registry
                .grant(
                    &handoff.document_id,
                    &handoff.from_agent,
                    &handoff.to_agent,
                    AccessLevel::Write,
                )
                .await?;
        }

        self.dispatch(&handoff, HandoffNotification::Accepted).await;
        Ok(handoff)
    }

    pub async fn reject(&self, id: &HandoffId, reason: impl Into<String>) -> OrchResult<Handoff> {
        let reason = reason.into();
        let handoff = self
            .finish(id, HandoffStatus::Rejected, |h| {
                h.rejection_reason = Some(reason.clone());
            })
            .await?;
        self.dispatch(&handoff, HandoffNotification::Rejected).await;
        Ok(handoff)
    }

    pub async fn cancel(&self, id: &HandoffId, actor: &str, reason: impl Into<String>) -> OrchResult<Handoff> {
        let reason = reason.into();
        let current = self.peek(id).await?;
        if actor != current.from_agent && actor != "system" {
            return Err(OrchError::permission_denied(
                "only the sender or the system may cancel a handoff",
            ));
        }
        let handoff = self
            .finish(id, HandoffStatus::Cancelled, |h| {
                h.rejection_reason = Some(reason.clone());
            })
            .await?;
        self.dispatch(&handoff, HandoffNotification::Cancelled).await;
        Ok(handoff)
    }

    /// `complete` invokes the declared validator, if any. A failing
    /// validator does not raise to the caller: the handoff transitions to
    /// FAILED and the failure is preserved for audit (spec §7).
    pub async fn complete(&self, id: &HandoffId, result_document_id: Option<DocumentId>) -> OrchResult<Handoff> {
        let current = self.peek(id).await?;
        if current.status != HandoffStatus::Accepted {
            return Err(OrchError::precondition_failed(format!(
                "handoff {id} is not ACCEPTED"
            )));
        }

        if let Some(validator_id) = current.validator_id.clone() {
            let validator = self.validators.read().get(&validator_id).cloned();
            if let Some(validator) = validator {
                let outcome = validator.validate(&current).await?;
                if !outcome.passed {
                    let handoff = self
                        .finish(id, HandoffStatus::Failed, |h| {
                            h.rejection_reason = Some(outcome.message.clone());
                        })
                        .await?;
                    self.dispatch(&handoff, HandoffNotification::Failed).await;
                    return Ok(handoff);
                }
            }
        }

        let handoff = self
            .finish(id, HandoffStatus::Accepted, |h| {
                h.result_document_id = result_document_id.clone();
                h.completed_at = Some(Utc::now());
            })
            .await?;
        self.dispatch(&handoff, HandoffNotification::Completed).await;
        Ok(handoff)
    }

    pub async fn transfer(&self, id: &HandoffId, new_agent: impl Into<String>) -> OrchResult<Handoff> {
        let new_agent = new_agent.into();
        let mut state = self.store.write_state().await;
        let handoff = state
            .active
            .get_mut(id)
            .ok_or_else(|| OrchError::not_found(format!("handoff {id} not found")))?;
        let old_agent = handoff.to_agent.clone();
        handoff.to_agent = new_agent.clone();
        let snapshot = handoff.clone();

        if let Some(queue) = state.agent_queues.get_mut(&old_agent) {
            queue.retain(|h| h != id);
        }
        state.agent_queues.entry(new_agent).or_default().push(id.clone());
        drop(state);

        self.registry.revoke(&snapshot.document_id, &snapshot.from_agent, &old_agent).await?;
        self.registry
            .grant(&snapshot.document_id, &snapshot.from_agent, &snapshot.to_agent, AccessLevel::Read)
            .await?;

        self.dispatch(&snapshot, HandoffNotification::Transferred).await;
        Ok(snapshot)
    }

    /// Per-agent queue sorted by (priority desc, creation-time asc).
    pub async fn queue(&self, agent: &str) -> OrchResult<Vec<Handoff>> {
        let state = self.store.read_state().await;
        let ids = state.agent_queues.get(agent).cloned().unwrap_or_default();
        let mut handoffs: Vec<Handoff> = ids
            .iter()
            .filter_map(|id| state.active.get(id).cloned())
            .collect();
        handoffs.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(handoffs)
    }

    pub async fn check_deadlines(&self) -> OrchResult<Vec<Handoff>> {
        let state = self.store.read_state().await;
        let now = Utc::now();
        Ok(state
            .active
            .values()
            .filter(|h| h.is_overdue(now))
            .cloned()
            .collect())
    }

    pub async fn persist(&self) -> OrchResult<()> {
        self.store.persist().await
    }

    async fn peek(&self, id: &HandoffId) -> OrchResult<Handoff> {
        let state = self.store.read_state().await;
        state
            .active
            .get(id)
            .cloned()
            .ok_or_else(|| OrchError::not_found(format!("handoff {id} not found")))
    }

    async fn transition(
        &self,
        id: &HandoffId,
        expected: HandoffStatus,
        next: HandoffStatus,
        mutate: impl FnOnce(&mut Handoff),
    ) -> OrchResult<Handoff> {
        let mut state = self.store.write_state().await;
        let handoff = state
            .active
            .get_mut(id)
            .ok_or_else(|| OrchError::not_found(format!("handoff {id} not found")))?;
        if handoff.status != expected {
            return Err(OrchError::precondition_failed(format!(
                "handoff {id} expected {expected:?}, was {:?}",
                handoff.status
            )));
        }
        handoff.status = next;
        mutate(handoff);
        Ok(handoff.clone())
    }

    async fn finish(
        &self,
        id: &HandoffId,
        terminal: HandoffStatus,
        mutate: impl FnOnce(&mut Handoff),
    ) -> OrchResult<Handoff> {
        let mut state = self.store.write_state().await;
        let mut handoff = state
            .active
            .remove(id)
            .ok_or_else(|| OrchError::not_found(format!("handoff {id} not found")))?;
        handoff.status = terminal;
        handoff.completed_at = handoff.completed_at.or(Some(Utc::now()));
        mutate(&mut handoff);
        if let Some(queue) = state.agent_queues.get_mut(&handoff.to_agent) {
            queue.retain(|h| h != id);
        }
        state.completed.insert(id.clone(), handoff.clone());
        Ok(handoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orch_core::DocumentType;

    struct AlwaysPass;
    #[async_trait]
    impl HandoffValidator for AlwaysPass {
        async fn validate(&self, _h: &Handoff) -> OrchResult<ValidationOutcome> {
            Ok(ValidationOutcome {
                passed: true,
                message: "ok".into(),
            })
        }
    }

    async fn protocol() -> (HandoffProtocol, Arc<DocumentRegistry>) {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(
            crate::registry::DocumentRegistry::open(dir.path().join("registry.blob"))
                .await
                .unwrap(),
        );
        let protocol = HandoffProtocol::open(dir.path().join("handoffs.blob"), registry.clone())
            .await
            .unwrap();
        (protocol, registry)
    }

    #[tokio::test]
    async fn accept_then_complete_grants_write_on_edit() {
        let (protocol, registry) = protocol().await;
        let doc = registry
            .create("Story", DocumentType::Story, "alice", b"x".to_vec())
            .await
            .unwrap();

        let handoff = protocol
            .create(
                doc.id.clone(),
                "alice",
                "bob",
                "please edit",
                "fix the typo",
                ExpectedAction::Edit,
                Priority::Medium,
                None,
                None,
            )
            .await
            .unwrap();

        let fetched = registry.fetch(&doc.id).await.unwrap();
        assert!(fetched.readers.contains("bob"));

        protocol.deliver(&handoff.id).await.unwrap();
        protocol.accept(&handoff.id).await.unwrap();

        let after_accept = registry.fetch(&doc.id).await.unwrap();
        assert!(after_accept.writers.contains("bob"));

        let completed = protocol.complete(&handoff.id, None).await.unwrap();
        assert_eq!(completed.status, HandoffStatus::Accepted);
        assert!(completed.completed_at.unwrap() >= completed.created_at);
    }

    #[tokio::test]
    async fn only_sender_or_system_may_cancel() {
        let (protocol, registry) = protocol().await;
        let doc = registry
            .create("Doc", DocumentType::Story, "alice", b"x".to_vec())
            .await
            .unwrap();
        let handoff = protocol
            .create(
                doc.id.clone(),
                "alice",
                "bob",
                "r",
                "i",
                ExpectedAction::Review,
                Priority::Low,
                None,
                None,
            )
            .await
            .unwrap();

        let err = protocol.cancel(&handoff.id, "mallory", "nope").await.unwrap_err();
        assert_eq!(err.kind, orch_core::ErrorKind::PermissionDenied);

        let cancelled = protocol.cancel(&handoff.id, "alice", "changed mind").await.unwrap();
        assert_eq!(cancelled.status, HandoffStatus::Cancelled);
    }
}
