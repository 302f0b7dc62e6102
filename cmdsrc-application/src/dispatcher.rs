//! 命令分发器（Command Dispatcher）
//!
//! 每次分发的状态流转：
//!
//! ```text
//! RECEIVED → AUTHORIZED → EXECUTING → AUDITED → COMPLETED
//!     └──────────┴────────────┴──────────┴──→ FAILED
//! ```
//!
//! - 授权失败与处理器缺失发生在审计记录写入之前，不产生任何副作用；
//! - 处理器只暂存变更，`prepare` 通过后先落定审计记录，再提交变更；
//! - 审计落定失败时回滚已准备的变更，返回 `AuditPersistence`，
//!   因此不存在“变更已生效但没有审计记录”的情况；
//! - 调用方在记录打开后丢弃 `submit` 的 future 时，变更的占用随 `UnitOfWork`
//!   释放，待定记录由 `PendingAudit` 同步落定为已取消。
//!
use crate::audit_store::CommandAuditStore;
use crate::command_bus::CommandBus;
use crate::command_handler::{CommandHandler, StagedCommand};
use crate::context::AppContext;
use crate::error::AppError;
use crate::handler_registry::HandlerRegistry;
use crate::permission::PermissionGate;
use async_trait::async_trait;
use chrono::Utc;
use cmdsrc_domain::audit::{AuditFailure, AuditOutcome, CommandId};
use cmdsrc_domain::command::CommandEnvelope;
use cmdsrc_domain::identifier::EntityIdentifier;
use std::sync::Arc;
use tracing::{Instrument, Span, debug, error, field, info, info_span, warn};

/// 分发阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Received,
    Authorized,
    Executing,
    Audited,
    Completed,
    Failed,
}

pub struct CommandDispatcher {
    gate: PermissionGate,
    registry: Arc<HandlerRegistry>,
    audit: Arc<dyn CommandAuditStore>,
}

impl CommandDispatcher {
    pub fn new(
        gate: PermissionGate,
        registry: Arc<HandlerRegistry>,
        audit: Arc<dyn CommandAuditStore>,
    ) -> Self {
        Self {
            gate,
            registry,
            audit,
        }
    }

    pub fn audit_store(&self) -> &Arc<dyn CommandAuditStore> {
        &self.audit
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    async fn dispatch(
        &self,
        ctx: &AppContext,
        envelope: CommandEnvelope,
    ) -> Result<EntityIdentifier, AppError> {
        transition(DispatchState::Received);

        self.gate.authorize(&ctx.principal, &envelope)?;
        transition(DispatchState::Authorized);

        let handler = self
            .registry
            .lookup(envelope.entity_type(), envelope.action())
            .inspect_err(|err| error!(error = %err, "no handler registered for command"))?;

        if ctx.deadline_passed() {
            warn!("deadline passed before execution; command abandoned");
            return Err(AppError::DeadlineExceeded);
        }

        let command_id = self
            .audit
            .open(
                ctx.principal.username(),
                ctx.biz.correlation_id(),
                &envelope,
                Utc::now(),
            )
            .await
            .inspect_err(|err| error!(error = %err, "failed to open audit record"))?;
        Span::current().record("command_id", command_id.value());
        let pending = PendingAudit::new(self.audit.as_ref(), command_id);

        transition(DispatchState::Executing);
        let StagedCommand { identifier, work } =
            match self.execute(ctx, handler.as_ref(), &envelope).await {
                Ok(staged) => staged,
                Err(err) => {
                    self.record_failure(command_id, &err).await;
                    pending.settle();
                    return Err(err);
                }
            };

        let identifier = identifier.with_command_id(command_id);
        let finalized = self
            .audit
            .finalize(
                command_id,
                AuditOutcome::Succeeded(identifier.clone()),
                Utc::now(),
            )
            .await;
        pending.settle();
        if let Err(err) = finalized {
            work.rollback();
            error!(
                error = %err,
                "audit trail write failed after a prepared mutation; mutation rolled back"
            );
            transition(DispatchState::Failed);
            return Err(err);
        }
        transition(DispatchState::Audited);

        work.commit();
        transition(DispatchState::Completed);
        info!(entity_id = identifier.entity_id(), "command completed");

        Ok(identifier)
    }

    /// 执行处理器并完成变更的准备阶段；失败时已释放所有占用
    async fn execute(
        &self,
        ctx: &AppContext,
        handler: &dyn CommandHandler,
        envelope: &CommandEnvelope,
    ) -> Result<StagedCommand, AppError> {
        debug!(handler = handler.handler_name(), "executing handler");
        let mut staged = handler.execute(ctx, envelope).await?;

        if let Err(err) = staged.work.prepare().await {
            staged.work.rollback();
            return Err(err);
        }

        Ok(staged)
    }

    /// 以失败结果落定审计记录
    ///
    /// 此时没有任何变更生效，返回给调用方的仍是原始错误；
    /// 落定失败只会留下一条待定记录，按审计缺口处理并告警。
    async fn record_failure(&self, command_id: CommandId, err: &AppError) {
        transition(DispatchState::Failed);
        if err.is_retryable() {
            warn!(error = %err, "command failed on concurrent modification");
        } else {
            info!(error = %err, kind = err.kind(), "command rejected");
        }

        let failure = AuditFailure {
            kind: err.kind().to_string(),
            code: err.code().to_string(),
            reason: err.to_string(),
        };
        if let Err(audit_err) = self
            .audit
            .finalize(command_id, AuditOutcome::Failed(failure), Utc::now())
            .await
        {
            error!(
                error = %audit_err,
                original = %err,
                "failed to finalize audit record for a failed command"
            );
        }
    }
}

#[async_trait]
impl CommandBus for CommandDispatcher {
    async fn submit(
        &self,
        ctx: &AppContext,
        envelope: CommandEnvelope,
    ) -> Result<EntityIdentifier, AppError> {
        let span = info_span!(
            "dispatch",
            entity_type = %envelope.entity_type(),
            action = %envelope.action(),
            resource = %envelope.resource_path(),
            principal = ctx.principal.username(),
            correlation_id = ctx.biz.correlation_id(),
            command_id = field::Empty,
        );
        self.dispatch(ctx, envelope).instrument(span).await
    }
}

fn transition(state: DispatchState) {
    debug!(state = ?state, "dispatch state");
}

/// 已打开、尚未落定的审计记录
///
/// 未经 `settle` 即被丢弃时，把记录落定为已取消。
struct PendingAudit<'a> {
    audit: &'a dyn CommandAuditStore,
    command_id: CommandId,
    armed: bool,
}

impl<'a> PendingAudit<'a> {
    fn new(audit: &'a dyn CommandAuditStore, command_id: CommandId) -> Self {
        Self {
            audit,
            command_id,
            armed: true,
        }
    }

    fn settle(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingAudit<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!(command_id = %self.command_id, "dispatch dropped during execution; audit record cancelled");
            self.audit.abandon(self.command_id, Utc::now());
        }
    }
}
