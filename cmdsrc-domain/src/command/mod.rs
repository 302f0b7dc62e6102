//! 命令信封（Command Envelope）
//!
//! 所有写操作（创建/修改/豁免/删除）都不直接作用于领域状态，
//! 而是先封装成统一的 `CommandEnvelope`，再交给唯一的写入网关分发。
//!
//! - `CommandAction`：封闭的动作集合，替代字符串常量；
//! - `EntityType`：聚合种类（如 `LOANCHARGE`），与动作一起作为处理器路由键；
//! - `ResourceRef`：所属父资源（如 `loans/10`）；
//! - `CommandRequest`：未经校验的构造输入，`into_envelope` 完成结构校验。

mod action;
mod entity_type;
mod envelope;
mod resource_ref;

pub use action::CommandAction;
pub use entity_type::EntityType;
pub use envelope::{CommandEnvelope, CommandRequest, CommandRequestBuilder, parse_payload};
pub use resource_ref::ResourceRef;
