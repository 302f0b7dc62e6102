use crate::{command_handler::CommandHandler, error::AppError};
use cmdsrc_domain::command::{CommandAction, EntityType};
use std::collections::HashMap;
use std::sync::Arc;

type HandlerKey = (EntityType, CommandAction);

/// 领域处理器注册表
/// - 以 `(entityType, action)` 为键注册处理器
/// - 进程启动时构建，`build()` 之后只读，可在任意多个分发任务间共享
pub struct HandlerRegistry {
    handlers: HashMap<HandlerKey, Arc<dyn CommandHandler>>,
}

/// 注册表构建器（仅在启动阶段使用）
#[derive(Default)]
pub struct HandlerRegistryBuilder {
    handlers: HashMap<HandlerKey, Arc<dyn CommandHandler>>,
}

impl HandlerRegistryBuilder {
    /// 注册领域处理器；同一键重复注册视为配置错误
    pub fn register<H>(
        mut self,
        entity_type: EntityType,
        action: CommandAction,
        handler: Arc<H>,
    ) -> Result<Self, AppError>
    where
        H: CommandHandler + 'static,
    {
        let key = (entity_type, action);
        if self.handlers.contains_key(&key) {
            let (entity_type, action) = key;
            return Err(AppError::AlreadyRegisteredCommand {
                entity_type,
                action,
            });
        }

        self.handlers.insert(key, handler);
        Ok(self)
    }

    pub fn build(self) -> HandlerRegistry {
        HandlerRegistry {
            handlers: self.handlers,
        }
    }
}

impl HandlerRegistry {
    pub fn builder() -> HandlerRegistryBuilder {
        HandlerRegistryBuilder::default()
    }

    /// 解析处理器；未注册属于部署配置缺陷
    pub fn lookup(
        &self,
        entity_type: &EntityType,
        action: CommandAction,
    ) -> Result<Arc<dyn CommandHandler>, AppError> {
        self.handlers
            .get(&(entity_type.clone(), action))
            .cloned()
            .ok_or_else(|| AppError::UnsupportedCommand {
                entity_type: entity_type.clone(),
                action,
            })
    }

    pub fn supports(&self, entity_type: &EntityType, action: CommandAction) -> bool {
        self.handlers.contains_key(&(entity_type.clone(), action))
    }

    /// 启动期校验：所有必需的 `(entityType, action)` 都必须已注册
    pub fn ensure_supports(&self, required: &[(EntityType, CommandAction)]) -> Result<(), AppError> {
        match required
            .iter()
            .find(|(entity_type, action)| !self.supports(entity_type, *action))
        {
            Some((entity_type, action)) => Err(AppError::UnsupportedCommand {
                entity_type: entity_type.clone(),
                action: *action,
            }),
            None => Ok(()),
        }
    }

    /// 已注册的键（有序，只读视图）
    pub fn registered(&self) -> Vec<(EntityType, CommandAction)> {
        let mut keys: Vec<_> = self.handlers.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command_handler::StagedCommand;
    use crate::context::AppContext;
    use async_trait::async_trait;
    use cmdsrc_domain::command::CommandEnvelope;
    use cmdsrc_domain::identifier::EntityIdentifier;

    struct EchoHandler;

    #[async_trait]
    impl CommandHandler for EchoHandler {
        fn handler_name(&self) -> &str {
            "echo"
        }

        async fn execute(
            &self,
            _ctx: &AppContext,
            envelope: &CommandEnvelope,
        ) -> Result<StagedCommand, AppError> {
            Ok(StagedCommand::without_changes(EntityIdentifier::new(
                envelope.target_id().unwrap_or(1),
            )))
        }
    }

    fn charge() -> EntityType {
        EntityType::new("LOANCHARGE").unwrap()
    }

    #[test]
    fn register_and_lookup() {
        let registry = HandlerRegistry::builder()
            .register(charge(), CommandAction::Waive, Arc::new(EchoHandler))
            .unwrap()
            .build();

        let handler = registry.lookup(&charge(), CommandAction::Waive).unwrap();
        assert_eq!(handler.handler_name(), "echo");
        assert!(registry.supports(&charge(), CommandAction::Waive));
        assert_eq!(registry.registered(), vec![(charge(), CommandAction::Waive)]);
    }

    #[test]
    fn unsupported_when_unregistered() {
        let registry = HandlerRegistry::builder().build();
        match registry.lookup(&charge(), CommandAction::Delete) {
            Err(AppError::UnsupportedCommand { entity_type, action }) => {
                assert_eq!(entity_type, charge());
                assert_eq!(action, CommandAction::Delete);
            }
            Err(other) => panic!("unexpected error: {other:?}"),
            Ok(_) => panic!("lookup should fail"),
        }
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let result = HandlerRegistry::builder()
            .register(charge(), CommandAction::Create, Arc::new(EchoHandler))
            .unwrap()
            .register(charge(), CommandAction::Create, Arc::new(EchoHandler));
        assert!(matches!(
            result,
            Err(AppError::AlreadyRegisteredCommand { .. })
        ));
    }

    #[test]
    fn startup_validation_reports_first_missing_pair() {
        let registry = HandlerRegistry::builder()
            .register(charge(), CommandAction::Create, Arc::new(EchoHandler))
            .unwrap()
            .build();

        assert!(
            registry
                .ensure_supports(&[(charge(), CommandAction::Create)])
                .is_ok()
        );
        let err = registry
            .ensure_supports(&[
                (charge(), CommandAction::Create),
                (charge(), CommandAction::Update),
            ])
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::UnsupportedCommand {
                action: CommandAction::Update,
                ..
            }
        ));
    }
}
