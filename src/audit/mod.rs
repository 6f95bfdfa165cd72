//! Dispatch audit log
//!
//! Every directive handed to the delivery collaborator is recorded with
//! the evaluation that produced it, so interventions are auditable after
//! the transient directive itself is discarded.

use crate::models::{CycleOutcome, Evaluation, InterventionDirective};
use crate::Result;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct DispatchRecord {
    pub record_id: Uuid,
    pub user_id: Uuid,
    pub directive: Arc<InterventionDirective>,
    pub evaluation: Evaluation,
    pub outcome: CycleOutcome,
    pub created_at: DateTime<Utc>,
    pub integrity_hash: String,
}

/// Dispatch history storage
pub struct DispatchLog {
    records: Arc<RwLock<HashMap<Uuid, DispatchRecord>>>,
}

impl DispatchLog {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Store the outcome of one act-phase
    pub async fn record(
        &self,
        directive: Arc<InterventionDirective>,
        evaluation: Evaluation,
        outcome: CycleOutcome,
    ) -> Result<Uuid> {
        let record = DispatchRecord {
            record_id: Uuid::new_v4(),
            user_id: directive.user_id,
            integrity_hash: compute_directive_hash(&directive),
            directive,
            evaluation,
            outcome,
            created_at: Utc::now(),
        };

        let record_id = record.record_id;
        let mut records = self.records.write().await;
        records.insert(record_id, record);
        Ok(record_id)
    }

    pub async fn get(&self, record_id: Uuid) -> Result<Option<DispatchRecord>> {
        let records = self.records.read().await;
        Ok(records.get(&record_id).cloned())
    }

    /// List all record ids for a user (sorted by created_at)
    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Uuid>> {
        let records = self.records.read().await;

        let mut items: Vec<_> = records
            .iter()
            .filter(|(_, record)| record.user_id == user_id)
            .map(|(id, record)| (*id, record.created_at))
            .collect();

        items.sort_by_key(|(_, created_at)| *created_at);

        Ok(items.into_iter().map(|(id, _)| id).collect())
    }

    /// Verify a record's integrity via hash
    pub async fn verify_integrity(&self, record_id: Uuid) -> Result<bool> {
        let records = self.records.read().await;

        if let Some(record) = records.get(&record_id) {
            let current_hash = compute_directive_hash(&record.directive);
            Ok(current_hash == record.integrity_hash)
        } else {
            Ok(false)
        }
    }
}

impl Default for DispatchLog {
    fn default() -> Self {
        Self::new()
    }
}

/// SHA256 of the directive, streamed straight into the hasher
pub fn compute_directive_hash(directive: &InterventionDirective) -> String {
    let mut hasher = Sha256::new();

    if serde_json::to_writer(&mut HashWriter(&mut hasher), directive).is_err() {
        return String::new();
    }

    hex::encode(hasher.finalize())
}

/// Adapter to allow writing into Sha256 via std::io::Write
struct HashWriter<'a, H: Digest>(&'a mut H);

impl<'a, H: Digest> Write for HashWriter<'a, H> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
