//! 贷款费用（cmdsrc-loans）
//!
//! `LOANCHARGE` 聚合接入命令溯源写路径：
//! - `handlers`：CREATE/UPDATE/WAIVE/DELETE 处理器；
//! - `store`：带版本号与行占用的内存存储；
//! - `read`：费用目录与详情查询；
//! - `resource`：`/loans/{loanId}/charges` 接口适配。
//!
//! [`bootstrap`] 按配置组装全部协作方。
//!
pub mod handlers;
pub mod model;
pub mod read;
pub mod resource;
pub mod store;

use chrono::Duration;
use cmdsrc_application::audit_store::CommandAuditStore;
use cmdsrc_application::command_bus::CommandBus;
use cmdsrc_application::config::Settings;
use cmdsrc_application::error::AppError;
use cmdsrc_application::permission::{PermissionGate, PermissionTable};
use cmdsrc_application::security::Authenticator;
use cmdsrc_application::{CommandDispatcher, HandlerRegistry, InMemoryAuditStore, InMemoryQueryBus};
use cmdsrc_domain::command::{CommandAction, EntityType};
use handlers::{
    CreateLoanChargeHandler, DeleteLoanChargeHandler, UpdateLoanChargeHandler,
    WaiveLoanChargeHandler,
};
use read::{
    ChargeReadService, InMemoryChargeReadService, ListApplicableOptions,
    ListApplicableOptionsHandler, RetrieveLoanCharge, RetrieveLoanChargeHandler,
};
use resource::LoanChargesResource;
use std::sync::Arc;
use store::InMemoryLoanChargeStore;
use tracing::info;

/// 实体类型
pub const LOAN_CHARGE: &str = "LOANCHARGE";
/// 读权限沿用贷款资源（`READ_LOAN`）
pub const READ_RESOURCE: &str = "LOAN";

/// 贷款费用的权限表：默认约定 + 配置覆盖
pub fn permission_table(settings: &Settings) -> Result<PermissionTable, AppError> {
    PermissionTable::new()
        .with_read_resource(EntityType::new(LOAN_CHARGE)?, READ_RESOURCE)
        .merge_settings(settings)
}

/// 组装完成的服务集合
pub struct LoanChargeServices {
    pub store: Arc<InMemoryLoanChargeStore>,
    pub read: Arc<InMemoryChargeReadService>,
    pub audit: Arc<InMemoryAuditStore>,
    pub dispatcher: Arc<CommandDispatcher>,
    pub queries: Arc<InMemoryQueryBus>,
    pub gate: PermissionGate,
    pub timeout: Option<Duration>,
}

impl LoanChargeServices {
    /// 以给定的认证方构建接口适配层
    pub fn resource(&self, authenticator: Arc<dyn Authenticator>) -> LoanChargesResource {
        let commands: Arc<dyn CommandBus> = self.dispatcher.clone();
        LoanChargesResource::new(
            authenticator,
            self.gate.clone(),
            commands,
            self.queries.clone(),
            self.timeout,
        )
    }
}

pub fn bootstrap(settings: &Settings) -> Result<LoanChargeServices, AppError> {
    let charge = EntityType::new(LOAN_CHARGE)?;

    let store = Arc::new(InMemoryLoanChargeStore::new());
    let read = Arc::new(InMemoryChargeReadService::new(store.clone()));
    let read_service: Arc<dyn ChargeReadService> = read.clone();

    let registry = HandlerRegistry::builder()
        .register(
            charge.clone(),
            CommandAction::Create,
            Arc::new(CreateLoanChargeHandler::new(store.clone(), read_service.clone())),
        )?
        .register(
            charge.clone(),
            CommandAction::Update,
            Arc::new(UpdateLoanChargeHandler::new(store.clone())),
        )?
        .register(
            charge.clone(),
            CommandAction::Waive,
            Arc::new(WaiveLoanChargeHandler::new(store.clone())),
        )?
        .register(
            charge.clone(),
            CommandAction::Delete,
            Arc::new(DeleteLoanChargeHandler::new(store.clone())),
        )?
        .build();

    let required: Vec<_> = CommandAction::ALL
        .iter()
        .map(|action| (charge.clone(), *action))
        .collect();
    registry.ensure_supports(&required)?;

    let queries = Arc::new(InMemoryQueryBus::new());
    queries.register::<ListApplicableOptions, _>(Arc::new(ListApplicableOptionsHandler::new(
        read_service.clone(),
    )))?;
    queries.register::<RetrieveLoanCharge, _>(Arc::new(RetrieveLoanChargeHandler::new(
        read_service,
    )))?;

    let gate = PermissionGate::new(permission_table(settings)?);
    let audit = Arc::new(InMemoryAuditStore::new());
    let audit_store: Arc<dyn CommandAuditStore> = audit.clone();
    let dispatcher = Arc::new(CommandDispatcher::new(
        gate.clone(),
        Arc::new(registry),
        audit_store,
    ));

    info!(
        handlers = dispatcher.registry().registered().len(),
        queries = ?queries.registered_queries(),
        "loan charge services ready"
    );

    Ok(LoanChargeServices {
        store,
        read,
        audit,
        dispatcher,
        queries,
        gate,
        timeout: settings.dispatch_timeout(),
    })
}
