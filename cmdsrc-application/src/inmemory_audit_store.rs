use crate::audit_store::{AuditFilter, CommandAuditStore};
use crate::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cmdsrc_domain::audit::{AuditFailure, AuditOutcome, AuditRecord, CommandId};
use cmdsrc_domain::command::CommandEnvelope;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// 基于内存的审计存储
/// - `CommandId` 由原子计数器单调分配（从 1 开始）
/// - 记录按标识分片存放，落定时仅短暂持有单条记录的写锁
pub struct InMemoryAuditStore {
    records: DashMap<CommandId, AuditRecord>,
    next_id: AtomicU64,
}

impl Default for InMemoryAuditStore {
    fn default() -> Self {
        Self {
            records: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl CommandAuditStore for InMemoryAuditStore {
    async fn open(
        &self,
        principal: &str,
        correlation_id: Option<&str>,
        envelope: &CommandEnvelope,
        submitted_at: DateTime<Utc>,
    ) -> Result<CommandId, AppError> {
        let command_id = CommandId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        let record = AuditRecord::pending(
            command_id,
            principal,
            correlation_id.map(str::to_string),
            envelope.clone(),
            submitted_at,
        );
        self.records.insert(command_id, record);
        Ok(command_id)
    }

    async fn finalize(
        &self,
        command_id: CommandId,
        outcome: AuditOutcome,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let Some(mut record) = self.records.get_mut(&command_id) else {
            return Err(AppError::audit_persistence(format!(
                "audit record {command_id} does not exist"
            )));
        };

        record
            .finalize(outcome, at)
            .map_err(|e| AppError::audit_persistence(e.to_string()))
    }

    fn abandon(&self, command_id: CommandId, at: DateTime<Utc>) {
        let Some(mut record) = self.records.get_mut(&command_id) else {
            return;
        };
        if let Err(err) = record.finalize(AuditOutcome::Failed(AuditFailure::cancelled()), at) {
            debug!(error = %err, %command_id, "abandoned record was already finalized");
        }
    }

    async fn get(&self, command_id: CommandId) -> Result<Option<AuditRecord>, AppError> {
        Ok(self.records.get(&command_id).map(|r| r.clone()))
    }

    async fn list(&self, filter: &AuditFilter) -> Result<Vec<AuditRecord>, AppError> {
        let mut out: Vec<AuditRecord> = self
            .records
            .iter()
            .filter(|r| filter.matches(r.value()))
            .map(|r| r.value().clone())
            .collect();
        out.sort_by_key(AuditRecord::command_id);
        if let Some(limit) = filter.limit {
            out.truncate(limit);
        }
        Ok(out)
    }
}
