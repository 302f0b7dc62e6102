use crate::{context::AppContext, error::AppError};
use async_trait::async_trait;
use cmdsrc_domain::command::CommandEnvelope;
use cmdsrc_domain::identifier::EntityIdentifier;

/// 领域处理器：负责某一 `(entityType, action)` 的业务规则
///
/// 处理器只暂存变更（`UnitOfWork`），由分发器在审计记录落定后统一提交。
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// 处理器名称（用于日志）
    fn handler_name(&self) -> &str;

    async fn execute(
        &self,
        ctx: &AppContext,
        envelope: &CommandEnvelope,
    ) -> Result<StagedCommand, AppError>;
}

/// 暂存的领域变更（两阶段）
///
/// - `prepare`：在持久化存储上做并发校验并占用目标行，失败则整体放弃；
/// - `commit`：应用变更，`prepare` 成功后不可失败；
/// - `rollback`：释放占用，不产生任何可见变更。
#[async_trait]
pub trait UnitOfWork: Send {
    async fn prepare(&mut self) -> Result<(), AppError>;

    fn commit(self: Box<Self>);

    fn rollback(self: Box<Self>);
}

/// 处理器的执行结果：结果标识 + 待提交的变更
pub struct StagedCommand {
    pub identifier: EntityIdentifier,
    pub work: Box<dyn UnitOfWork>,
}

impl StagedCommand {
    pub fn new(identifier: EntityIdentifier, work: Box<dyn UnitOfWork>) -> Self {
        Self { identifier, work }
    }

    /// 无状态变更的命令（仅需审计）
    pub fn without_changes(identifier: EntityIdentifier) -> Self {
        Self::new(identifier, Box::new(NoChanges))
    }
}

struct NoChanges;

#[async_trait]
impl UnitOfWork for NoChanges {
    async fn prepare(&mut self) -> Result<(), AppError> {
        Ok(())
    }

    fn commit(self: Box<Self>) {}

    fn rollback(self: Box<Self>) {}
}
