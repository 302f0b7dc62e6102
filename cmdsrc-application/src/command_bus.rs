use crate::{context::AppContext, error::AppError};
use async_trait::async_trait;
use cmdsrc_domain::command::CommandEnvelope;
use cmdsrc_domain::identifier::EntityIdentifier;

/// 命令总线（Command Bus）
///
/// - 写操作的唯一网关：接收命令信封并返回实体标识；
/// - 框架可提供不同实现（如进程内分发器、远程网关等）；
/// - 不做重试，失败即为本次调用的终态，由调用方以新信封重新提交。
#[async_trait]
pub trait CommandBus: Send + Sync {
    /// 提交命令
    ///
    /// - `ctx`：应用上下文（主体、链路追踪、幂等键、截止时间）
    /// - `envelope`：已通过结构校验的命令信封
    async fn submit(
        &self,
        ctx: &AppContext,
        envelope: CommandEnvelope,
    ) -> Result<EntityIdentifier, AppError>;
}
