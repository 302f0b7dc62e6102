//! 权限闸门（Permission Gate）
//!
//! 授权策略以显式映射表表达：`(entityType, action) -> 权限码`，
//! 与处理器解耦，可独立审计与测试。
//!
//! - 写操作默认权限码为 `{ACTION}_{ENTITY}`（如 `WAIVE_LOANCHARGE`），可逐项覆盖；
//! - 读操作权限码为 `READ_{RESOURCE}`，资源名默认取实体类型，可映射到共享资源
//!   （如 `LOANCHARGE` 的读取沿用 `LOAN`）。
//!
//! 被拒绝的请求不会进入分发阶段，也不会留下审计记录。
//!
use crate::config::Settings;
use crate::error::AppError;
use cmdsrc_domain::command::{CommandAction, CommandEnvelope, EntityType};
use cmdsrc_domain::principal::Principal;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone, Default)]
pub struct PermissionTable {
    overrides: HashMap<(EntityType, CommandAction), String>,
    read_resources: HashMap<EntityType, String>,
}

impl PermissionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 覆盖某一 `(entityType, action)` 的权限码
    pub fn with_override(
        mut self,
        entity_type: EntityType,
        action: CommandAction,
        permission: impl Into<String>,
    ) -> Self {
        self.overrides
            .insert((entity_type, action), permission.into().to_ascii_uppercase());
        self
    }

    /// 设置读操作共享的资源名
    pub fn with_read_resource(mut self, entity_type: EntityType, resource: impl Into<String>) -> Self {
        self.read_resources
            .insert(entity_type, resource.into().to_ascii_uppercase());
        self
    }

    /// 合并配置文件中的覆盖项（`"LOANCHARGE.WAIVE" = "..."`）
    pub fn merge_settings(mut self, settings: &Settings) -> Result<Self, AppError> {
        for (key, permission) in &settings.permissions {
            let (entity, action) = key.split_once('.').ok_or_else(|| {
                AppError::Config(format!(
                    "permission key '{key}' must look like ENTITY.ACTION"
                ))
            })?;
            let entity_type = EntityType::new(entity).map_err(|e| AppError::Config(e.to_string()))?;
            let action = action
                .parse::<CommandAction>()
                .map_err(|e| AppError::Config(e.to_string()))?;
            self = self.with_override(entity_type, action, permission.as_str());
        }

        for (entity, resource) in &settings.read_resources {
            let entity_type = EntityType::new(entity).map_err(|e| AppError::Config(e.to_string()))?;
            self = self.with_read_resource(entity_type, resource.as_str());
        }

        Ok(self)
    }

    /// 写操作所需权限码
    pub fn required_for(&self, entity_type: &EntityType, action: CommandAction) -> String {
        self.overrides
            .get(&(entity_type.clone(), action))
            .cloned()
            .unwrap_or_else(|| format!("{}_{}", action.as_str(), entity_type.as_str()))
    }

    /// 读操作所需权限码
    pub fn read_permission_for(&self, entity_type: &EntityType) -> String {
        let resource = self
            .read_resources
            .get(entity_type)
            .map(String::as_str)
            .unwrap_or(entity_type.as_str());
        format!("READ_{resource}")
    }
}

/// 权限闸门：在任何处理器执行前完成授权
#[derive(Debug, Clone, Default)]
pub struct PermissionGate {
    table: Arc<PermissionTable>,
}

impl PermissionGate {
    pub fn new(table: PermissionTable) -> Self {
        Self {
            table: Arc::new(table),
        }
    }

    pub fn table(&self) -> &PermissionTable {
        &self.table
    }

    /// 校验主体是否可提交该命令
    pub fn authorize(&self, principal: &Principal, envelope: &CommandEnvelope) -> Result<(), AppError> {
        let permission = self
            .table
            .required_for(envelope.entity_type(), envelope.action());
        self.check(principal, permission)
    }

    /// 校验主体是否可读取该实体类型（模板、详情等查询）
    pub fn authorize_read(&self, principal: &Principal, entity_type: &EntityType) -> Result<(), AppError> {
        let permission = self.table.read_permission_for(entity_type);
        self.check(principal, permission)
    }

    fn check(&self, principal: &Principal, permission: String) -> Result<(), AppError> {
        if principal.has_permission(&permission) {
            return Ok(());
        }

        warn!(
            principal = principal.username(),
            %permission,
            "permission denied"
        );
        Err(AppError::PermissionDenied {
            principal: principal.username().to_string(),
            permission,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cmdsrc_domain::command::CommandRequest;

    fn charge() -> EntityType {
        EntityType::new("LOANCHARGE").unwrap()
    }

    fn waive() -> CommandEnvelope {
        CommandRequest::builder()
            .action(CommandAction::Waive)
            .entity_type("LOANCHARGE")
            .parent_resource("loans")
            .parent_id(10)
            .sub_resource("charges")
            .target_id(55)
            .build()
            .into_envelope()
            .unwrap()
    }

    #[test]
    fn default_convention_is_action_underscore_entity() {
        let table = PermissionTable::new();
        assert_eq!(table.required_for(&charge(), CommandAction::Waive), "WAIVE_LOANCHARGE");
        assert_eq!(table.read_permission_for(&charge()), "READ_LOANCHARGE");
    }

    #[test]
    fn overrides_and_read_resources_apply() {
        let table = PermissionTable::new()
            .with_override(charge(), CommandAction::Waive, "waive_fees")
            .with_read_resource(charge(), "loan");
        assert_eq!(table.required_for(&charge(), CommandAction::Waive), "WAIVE_FEES");
        assert_eq!(table.required_for(&charge(), CommandAction::Delete), "DELETE_LOANCHARGE");
        assert_eq!(table.read_permission_for(&charge()), "READ_LOAN");
    }

    #[test]
    fn gate_allows_and_denies() {
        let gate = PermissionGate::new(PermissionTable::new());
        let teller = Principal::new("teller", ["WAIVE_LOANCHARGE"]);
        let clerk = Principal::new("clerk", ["READ_LOANCHARGE"]);

        assert!(gate.authorize(&teller, &waive()).is_ok());
        match gate.authorize(&clerk, &waive()) {
            Err(AppError::PermissionDenied { principal, permission }) => {
                assert_eq!(principal, "clerk");
                assert_eq!(permission, "WAIVE_LOANCHARGE");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(gate.authorize_read(&clerk, &charge()).is_ok());
        assert!(gate.authorize_read(&teller, &charge()).is_err());
    }

    #[test]
    fn settings_are_merged() {
        let settings = Settings::from_toml_str(
            r#"
            [permissions]
            "LOANCHARGE.WAIVE" = "WAIVE_CHARGES"

            [read_resources]
            LOANCHARGE = "LOAN"
            "#,
        )
        .unwrap();
        let table = PermissionTable::new().merge_settings(&settings).unwrap();
        assert_eq!(table.required_for(&charge(), CommandAction::Waive), "WAIVE_CHARGES");
        assert_eq!(table.read_permission_for(&charge()), "READ_LOAN");
    }

    #[test]
    fn malformed_permission_key_is_a_config_error() {
        let settings = Settings::from_toml_str(
            r#"
            [permissions]
            "LOANCHARGE" = "X"
            "#,
        )
        .unwrap();
        assert!(matches!(
            PermissionTable::new().merge_settings(&settings),
            Err(AppError::Config(_))
        ));
    }
}
