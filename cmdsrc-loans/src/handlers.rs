//! `LOANCHARGE` 的领域处理器
//!
//! 每个处理器读取最近一次提交的状态、执行业务规则，
//! 然后把结果暂存为 `ChargeUnitOfWork`，由分发器决定提交或回滚。
//!
use crate::model::{LoanCharge, LoanChargeChanges, Money, NewLoanCharge};
use crate::read::ChargeReadService;
use crate::store::{ChargeChange, InMemoryLoanChargeStore};
use crate::LOAN_CHARGE;
use async_trait::async_trait;
use cmdsrc_application::command_handler::{CommandHandler, StagedCommand};
use cmdsrc_application::context::AppContext;
use cmdsrc_application::error::AppError;
use cmdsrc_domain::command::CommandEnvelope;
use cmdsrc_domain::error::DomainError;
use cmdsrc_domain::identifier::EntityIdentifier;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tracing::debug;

const LOAN_REFERENCE: &str = "loanId";

fn identifier(loan_id: i64, id: i64, changes: Map<String, Value>) -> EntityIdentifier {
    EntityIdentifier::new(id)
        .with_reference(LOAN_REFERENCE, loan_id)
        .with_changes(changes)
}

fn loan_principal(store: &InMemoryLoanChargeStore, loan_id: i64) -> Result<Money, DomainError> {
    store
        .loan_principal(loan_id)
        .ok_or_else(|| DomainError::not_found("LOAN", loan_id))
}

/// 读取目标费用（父资源即贷款）
fn load(
    store: &InMemoryLoanChargeStore,
    envelope: &CommandEnvelope,
) -> Result<(i64, LoanCharge), DomainError> {
    let loan_id = envelope.parent().id;
    let id = envelope.require_target()?;
    let charge = store
        .find(loan_id, id)
        .ok_or_else(|| DomainError::not_found(LOAN_CHARGE, id))?;
    Ok((loan_id, charge))
}

pub struct CreateLoanChargeHandler {
    store: Arc<InMemoryLoanChargeStore>,
    read: Arc<dyn ChargeReadService>,
}

impl CreateLoanChargeHandler {
    pub fn new(store: Arc<InMemoryLoanChargeStore>, read: Arc<dyn ChargeReadService>) -> Self {
        Self { store, read }
    }
}

#[async_trait]
impl CommandHandler for CreateLoanChargeHandler {
    fn handler_name(&self) -> &str {
        "create_loan_charge"
    }

    async fn execute(
        &self,
        _ctx: &AppContext,
        envelope: &CommandEnvelope,
    ) -> Result<StagedCommand, AppError> {
        let loan_id = envelope.parent().id;
        let principal = loan_principal(&self.store, loan_id)?;
        let input: NewLoanCharge = envelope.payload_as()?;
        let option = self.read.retrieve_charge(input.charge_id).await?;

        let id = self.store.allocate_id();
        let charge = LoanCharge::create(id, loan_id, principal, &option, input)?;
        debug!(id, charge_id = charge.charge_id(), "loan charge staged for creation");

        let mut changes = Map::new();
        changes.insert("chargeId".into(), json!(charge.charge_id()));
        changes.insert("amount".into(), json!(charge.amount()));
        if let Some(due_date) = charge.due_date() {
            changes.insert("dueDate".into(), json!(due_date));
        }

        Ok(StagedCommand::new(
            identifier(loan_id, id, changes),
            Box::new(self.store.stage(ChargeChange::Insert(charge))),
        ))
    }
}

pub struct UpdateLoanChargeHandler {
    store: Arc<InMemoryLoanChargeStore>,
}

impl UpdateLoanChargeHandler {
    pub fn new(store: Arc<InMemoryLoanChargeStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl CommandHandler for UpdateLoanChargeHandler {
    fn handler_name(&self) -> &str {
        "update_loan_charge"
    }

    async fn execute(
        &self,
        _ctx: &AppContext,
        envelope: &CommandEnvelope,
    ) -> Result<StagedCommand, AppError> {
        let (loan_id, mut charge) = load(&self.store, envelope)?;
        let input: LoanChargeChanges = envelope.payload_as()?;
        let principal = loan_principal(&self.store, loan_id)?;

        let expected = charge.version();
        let changes = charge.update(&input, principal)?;
        let id = charge.id();

        Ok(StagedCommand::new(
            identifier(loan_id, id, changes),
            Box::new(self.store.stage(ChargeChange::Replace { expected, charge })),
        ))
    }
}

pub struct WaiveLoanChargeHandler {
    store: Arc<InMemoryLoanChargeStore>,
}

impl WaiveLoanChargeHandler {
    pub fn new(store: Arc<InMemoryLoanChargeStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl CommandHandler for WaiveLoanChargeHandler {
    fn handler_name(&self) -> &str {
        "waive_loan_charge"
    }

    async fn execute(
        &self,
        _ctx: &AppContext,
        envelope: &CommandEnvelope,
    ) -> Result<StagedCommand, AppError> {
        let (loan_id, mut charge) = load(&self.store, envelope)?;

        let expected = charge.version();
        let changes = charge.waive()?;
        let id = charge.id();

        Ok(StagedCommand::new(
            identifier(loan_id, id, changes),
            Box::new(self.store.stage(ChargeChange::Replace { expected, charge })),
        ))
    }
}

pub struct DeleteLoanChargeHandler {
    store: Arc<InMemoryLoanChargeStore>,
}

impl DeleteLoanChargeHandler {
    pub fn new(store: Arc<InMemoryLoanChargeStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl CommandHandler for DeleteLoanChargeHandler {
    fn handler_name(&self) -> &str {
        "delete_loan_charge"
    }

    async fn execute(
        &self,
        _ctx: &AppContext,
        envelope: &CommandEnvelope,
    ) -> Result<StagedCommand, AppError> {
        let (loan_id, charge) = load(&self.store, envelope)?;
        charge.ensure_deletable()?;

        let id = charge.id();
        Ok(StagedCommand::new(
            identifier(loan_id, id, Map::new()),
            Box::new(self.store.stage(ChargeChange::Remove {
                id,
                expected: charge.version(),
            })),
        ))
    }
}
