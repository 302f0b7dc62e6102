use crate::{context::AppContext, error::AppError, query::Query};
use async_trait::async_trait;

/// 查询处理器
///
/// 读路径不经过命令分发器：不写审计记录，也不暂存任何变更。
/// 读授权由调用方（接口适配层）在分发前完成。
#[async_trait]
pub trait QueryHandler<Q: Query>: Send + Sync {
    async fn handle(&self, ctx: &AppContext, q: Q) -> Result<Q::Dto, AppError>;
}
