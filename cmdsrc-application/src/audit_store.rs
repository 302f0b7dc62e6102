//! 命令审计存储（Command Audit Store）
//!
//! 独占审计记录的生命周期：分发开始时写入待定记录并分配 `CommandId`，
//! 分发结束时落定结果。记录只追加、不删除，落定后不可修改。
//!
use crate::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cmdsrc_domain::audit::{AuditOutcome, AuditRecord, AuditStatus, CommandId};
use cmdsrc_domain::command::{CommandAction, CommandEnvelope, EntityType};
use std::sync::Arc;

#[async_trait]
pub trait CommandAuditStore: Send + Sync {
    /// 写入待定记录，返回新分配的单调递增标识
    async fn open(
        &self,
        principal: &str,
        correlation_id: Option<&str>,
        envelope: &CommandEnvelope,
        submitted_at: DateTime<Utc>,
    ) -> Result<CommandId, AppError>;

    /// 落定记录；重复落定或记录不存在返回 `AppError::AuditPersistence`
    async fn finalize(
        &self,
        command_id: CommandId,
        outcome: AuditOutcome,
        at: DateTime<Utc>,
    ) -> Result<(), AppError>;

    /// 将仍处于待定状态的记录同步落定为已取消；已落定的记录保持不变
    ///
    /// 在 `Drop` 中调用，因此不能 `.await`。
    fn abandon(&self, command_id: CommandId, at: DateTime<Utc>);

    async fn get(&self, command_id: CommandId) -> Result<Option<AuditRecord>, AppError>;

    /// 按条件查询，结果按 `CommandId` 升序
    async fn list(&self, filter: &AuditFilter) -> Result<Vec<AuditRecord>, AppError>;
}

#[async_trait]
impl<T> CommandAuditStore for Arc<T>
where
    T: CommandAuditStore + ?Sized,
{
    async fn open(
        &self,
        principal: &str,
        correlation_id: Option<&str>,
        envelope: &CommandEnvelope,
        submitted_at: DateTime<Utc>,
    ) -> Result<CommandId, AppError> {
        (**self)
            .open(principal, correlation_id, envelope, submitted_at)
            .await
    }

    async fn finalize(
        &self,
        command_id: CommandId,
        outcome: AuditOutcome,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        (**self).finalize(command_id, outcome, at).await
    }

    fn abandon(&self, command_id: CommandId, at: DateTime<Utc>) {
        (**self).abandon(command_id, at)
    }

    async fn get(&self, command_id: CommandId) -> Result<Option<AuditRecord>, AppError> {
        (**self).get(command_id).await
    }

    async fn list(&self, filter: &AuditFilter) -> Result<Vec<AuditRecord>, AppError> {
        (**self).list(filter).await
    }
}

/// 审计查询条件（未设置的条件不参与过滤）
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub entity_type: Option<EntityType>,
    pub action: Option<CommandAction>,
    pub principal: Option<String>,
    pub status: Option<AuditStatus>,
    pub limit: Option<usize>,
}

impl AuditFilter {
    pub fn matches(&self, record: &AuditRecord) -> bool {
        let envelope = record.envelope();
        self.entity_type
            .as_ref()
            .is_none_or(|t| t == envelope.entity_type())
            && self.action.is_none_or(|a| a == envelope.action())
            && self
                .principal
                .as_deref()
                .is_none_or(|p| p == record.principal())
            && self.status.is_none_or(|s| s == record.status())
    }
}
