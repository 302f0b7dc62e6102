//! 命令溯源应用层（cmdsrc-application）
//!
//! 写路径的唯一入口：`CommandDispatcher` 按
//! 授权 → 解析处理器 → 执行 → 审计 的顺序处理每一个 `CommandEnvelope`，
//! 成功时返回 `EntityIdentifier`。读路径通过 `QueryBus` 独立分发。
//!
pub mod audit_store;
pub mod command_bus;
pub mod command_handler;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod dto;
pub mod error;
pub mod handler_registry;
pub mod inmemory_audit_store;
pub mod inmemory_query_bus;
pub mod permission;
pub mod query;
pub mod query_bus;
pub mod query_handler;
pub mod security;
pub mod serialization;

pub use dispatcher::CommandDispatcher;
pub use handler_registry::HandlerRegistry;
pub use inmemory_audit_store::InMemoryAuditStore;
pub use inmemory_query_bus::InMemoryQueryBus;
