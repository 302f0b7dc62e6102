//! 实体标识（Entity Identifier）
//!
//! 一次成功分发的唯一产物：受影响（或新建）实体的标识，
//! 附带调用方可能需要的交叉引用（如 `loanId`）与处理器报告的字段变更。
//!
use crate::audit::CommandId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityIdentifier {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    command_id: Option<CommandId>,
    #[serde(rename = "resourceId")]
    entity_id: i64,
    #[serde(flatten)]
    references: BTreeMap<String, i64>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    changes: Map<String, Value>,
}

impl EntityIdentifier {
    pub fn new(entity_id: i64) -> Self {
        Self {
            command_id: None,
            entity_id,
            references: BTreeMap::new(),
            changes: Map::new(),
        }
    }

    /// 追加交叉引用，如 `("loanId", 10)`
    pub fn with_reference(mut self, role: impl Into<String>, id: i64) -> Self {
        self.references.insert(role.into(), id);
        self
    }

    pub fn with_changes(mut self, changes: Map<String, Value>) -> Self {
        self.changes = changes;
        self
    }

    /// 由分发器在审计记录落定前绑定
    pub fn with_command_id(mut self, command_id: CommandId) -> Self {
        self.command_id = Some(command_id);
        self
    }

    pub fn command_id(&self) -> Option<CommandId> {
        self.command_id
    }

    pub fn entity_id(&self) -> i64 {
        self.entity_id
    }

    pub fn reference(&self, role: &str) -> Option<i64> {
        self.references.get(role).copied()
    }

    pub fn references(&self) -> &BTreeMap<String, i64> {
        &self.references
    }

    pub fn changes(&self) -> &Map<String, Value> {
        &self.changes
    }
}
