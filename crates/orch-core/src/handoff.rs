//! Handoff identity and state machine (C2).

use crate::ids::{DocumentId, HandoffId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low = 1,
    Medium = 2,
    High = 3,
    Critical = 4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectedAction {
    Review,
    Edit,
    Update,
    Approve,
    Complete,
    Modify,
}

impl ExpectedAction {
    /// Actions whose acceptance grants WRITE access on the document.
    pub fn is_edit_style(&self) -> bool {
        matches!(
            self,
            ExpectedAction::Edit | ExpectedAction::Update | ExpectedAction::Modify | ExpectedAction::Complete
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandoffStatus {
    Pending,
    Delivered,
    Accepted,
    Rejected,
    Cancelled,
    Failed,
}

impl HandoffStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            HandoffStatus::Rejected
                | HandoffStatus::Cancelled
                | HandoffStatus::Failed
                | HandoffStatus::Accepted
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandoffNotification {
    New,
    Delivered,
    Accepted,
    Rejected,
    Completed,
    Failed,
    Cancelled,
    Transferred,
}

/// A typed transfer of responsibility over a document from one agent to another.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Handoff {
    pub id: HandoffId,
    pub document_id: DocumentId,
    pub from_agent: String,
    pub to_agent: String,
    pub reason: String,
    pub instructions: String,
    pub expected_action: ExpectedAction,
    pub priority: Priority,
    pub status: HandoffStatus,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub deadline: Option<DateTime<Utc>>,
    pub validator_id: Option<String>,
    pub result_document_id: Option<DocumentId>,
    pub rejection_reason: Option<String>,
}

impl Handoff {
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        !self.status.is_terminal()
            && self
                .deadline
                .map(|d| now > d)
                .unwrap_or(false)
    }
}
