use crate::dto::Dto;

/// 应用层查询（Query）
///
/// 表达只读意图，不改变领域状态，也不经过命令网关与审计。
/// - 结果返回 [`Dto`](crate::dto::Dto)；
/// - 相同条件、期间无写入时，重复查询应返回相同结果。
pub trait Query: Send + Sync + 'static {
    /// 查询的稳定名称（建议常量字符串，不随重构变化）
    const NAME: &'static str;

    /// 查询返回的数据传输对象
    type Dto: Dto;
}
