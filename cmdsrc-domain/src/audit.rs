//! 审计记录（Audit Record）
//!
//! 每条提交进入分发阶段的命令都会留下一条只追加的审计记录：
//! 分发开始时以 `Pending` 状态写入，分发结束时落定为 `Succeeded` 或 `Failed`，
//! 落定后不可再修改。
//!
use crate::command::CommandEnvelope;
use crate::error::{DomainError, DomainResult};
use crate::identifier::EntityIdentifier;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 审计记录标识（由审计存储单调分配）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandId(u64);

impl CommandId {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditStatus {
    Pending,
    Succeeded,
    Failed,
}

/// 失败详情：错误类别、机器可读错误码与描述
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditFailure {
    pub kind: String,
    pub code: String,
    pub reason: String,
}

impl AuditFailure {
    /// 分发在执行中途被调用方放弃
    pub fn cancelled() -> Self {
        Self {
            kind: "cancelled".into(),
            code: "error.msg.command.cancelled".into(),
            reason: "dispatch was dropped before its outcome was recorded".into(),
        }
    }
}

/// 分发结果
#[derive(Debug, Clone, PartialEq)]
pub enum AuditOutcome {
    Succeeded(EntityIdentifier),
    Failed(AuditFailure),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    command_id: CommandId,
    principal: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    correlation_id: Option<String>,
    envelope: CommandEnvelope,
    submitted_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    finalized_at: Option<DateTime<Utc>>,
    status: AuditStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<EntityIdentifier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    failure: Option<AuditFailure>,
}

impl AuditRecord {
    /// 分发开始时的待定记录
    pub fn pending(
        command_id: CommandId,
        principal: impl Into<String>,
        correlation_id: Option<String>,
        envelope: CommandEnvelope,
        submitted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            command_id,
            principal: principal.into(),
            correlation_id,
            envelope,
            submitted_at,
            finalized_at: None,
            status: AuditStatus::Pending,
            result: None,
            failure: None,
        }
    }

    /// 落定记录；已落定的记录再次落定视为非法状态
    pub fn finalize(&mut self, outcome: AuditOutcome, at: DateTime<Utc>) -> DomainResult<()> {
        if self.status != AuditStatus::Pending {
            return Err(DomainError::InvalidState {
                reason: format!(
                    "audit record {} already finalized as {:?}",
                    self.command_id, self.status
                ),
            });
        }

        match outcome {
            AuditOutcome::Succeeded(identifier) => {
                self.status = AuditStatus::Succeeded;
                self.result = Some(identifier);
            }
            AuditOutcome::Failed(failure) => {
                self.status = AuditStatus::Failed;
                self.failure = Some(failure);
            }
        }
        self.finalized_at = Some(at);
        Ok(())
    }

    pub fn command_id(&self) -> CommandId {
        self.command_id
    }

    pub fn principal(&self) -> &str {
        &self.principal
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    pub fn envelope(&self) -> &CommandEnvelope {
        &self.envelope
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    pub fn finalized_at(&self) -> Option<DateTime<Utc>> {
        self.finalized_at
    }

    pub fn status(&self) -> AuditStatus {
        self.status
    }

    pub fn is_finalized(&self) -> bool {
        self.status != AuditStatus::Pending
    }

    pub fn result(&self) -> Option<&EntityIdentifier> {
        self.result.as_ref()
    }

    pub fn failure(&self) -> Option<&AuditFailure> {
        self.failure.as_ref()
    }
}
