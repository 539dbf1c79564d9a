//! Document identity, versioning and access-control model (C1).

use crate::ids::{DocumentId, TeamId, WorkflowId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Prd,
    Architecture,
    Story,
    Epic,
    TestPlan,
    Design,
    Report,
    Checklist,
    Template,
    Workflow,
    MeetingNotes,
    Retrospective,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Draft,
    InReview,
    Approved,
    InProgress,
    Completed,
    Archived,
    Deprecated,
}

/// Access levels form a total order: Read < Write < Admin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    Read,
    Write,
    Admin,
}

/// An immutable-by-version content record with metadata and ACLs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub title: String,
    pub doc_type: DocumentType,
    pub status: DocumentStatus,
    pub version: u32,
    pub parent_version: Option<DocumentId>,
    pub root_id: DocumentId,
    pub creator: String,
    pub last_modified_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub content: Vec<u8>,
    pub content_hash: String,
    pub owner: String,
    pub readers: HashSet<String>,
    pub writers: HashSet<String>,
    pub workflow_id: Option<WorkflowId>,
    pub team_id: Option<TeamId>,
    pub tags: HashSet<String>,
    pub dependencies: Vec<DocumentId>,
}

pub fn content_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

impl Document {
    pub fn new(
        title: impl Into<String>,
        doc_type: DocumentType,
        owner: impl Into<String>,
        content: Vec<u8>,
    ) -> Self {
        let owner = owner.into();
        let id = DocumentId::new();
        let hash = content_hash(&content);
        let now = Utc::now();
        Self {
            id: id.clone(),
            title: title.into(),
            doc_type,
            status: DocumentStatus::Draft,
            version: 1,
            parent_version: None,
            root_id: id,
            creator: owner.clone(),
            last_modified_by: owner.clone(),
            created_at: now,
            updated_at: now,
            content_hash: hash,
            content,
            readers: HashSet::from([owner.clone()]),
            writers: HashSet::from([owner.clone()]),
            owner,
            workflow_id: None,
            team_id: None,
            tags: HashSet::new(),
            dependencies: Vec::new(),
        }
    }

    /// Invariant: `owner ∈ writers ⊆ readers`.
    pub fn acl_invariant_holds(&self) -> bool {
        self.writers.contains(&self.owner) && self.writers.is_subset(&self.readers)
    }

    pub fn access_level(&self, actor: &str) -> Option<AccessLevel> {
        if self.owner == actor {
            return Some(AccessLevel::Admin);
        }
        if self.writers.contains(actor) {
            return Some(AccessLevel::Write);
        }
        if self.readers.contains(actor) {
            return Some(AccessLevel::Read);
        }
        None
    }

    pub fn grant(&mut self, actor: &str, level: AccessLevel) {
        self.readers.insert(actor.to_string());
        if level >= AccessLevel::Write {
            self.writers.insert(actor.to_string());
        }
        if level >= AccessLevel::Admin {
            self.owner = actor.to_string();
        }
    }

    pub fn revoke(&mut self, actor: &str) {
        self.readers.remove(actor);
        self.writers.remove(actor);
    }
}
