//! 命令溯源领域层基础库（cmdsrc-domain）
//!
//! 提供写路径上所有层共享的值类型，用于在应用中实现：
//! - 命令信封（`command`）：一次变更请求的不可变描述
//! - 实体标识（`identifier`）：成功分发后返回给调用方的结果
//! - 审计记录（`audit`）：命令及其结果的持久化轨迹
//! - 主体（`principal`）与业务语境（`business_context`）
//! - 值对象（`value_object`）：版本号等通用模式
//!
//! 本 crate 不依赖任何运行时与存储实现，仅定义类型与最小必要的错误类型，
//! 以便应用层（分发器、审计存储）与具体领域（如贷款费用）共享同一套词汇。
//!
//! 典型用法：
//! 1. 通过 `CommandEnvelope::builder()` 构造命令信封（构造即校验）；
//! 2. 交由应用层 `CommandBus::submit` 分发；
//! 3. 得到 `EntityIdentifier`，并可在审计存储中按 `CommandId` 回查 `AuditRecord`。
//!
pub mod audit;
pub mod business_context;
pub mod command;
pub mod error;
pub mod identifier;
pub mod principal;
pub mod value_object;
