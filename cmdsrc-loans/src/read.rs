//! 读路径：费用目录与贷款费用详情
//!
//! 读请求不经过命令分发器，也不产生审计记录。
//!
use crate::LOAN_CHARGE;
use crate::model::{ChargeCalculationType, ChargeOption, ChargeTimeType, LoanCharge, Money};
use crate::store::InMemoryLoanChargeStore;
use async_trait::async_trait;
use chrono::NaiveDate;
use cmdsrc_application::context::AppContext;
use cmdsrc_application::dto::Dto;
use cmdsrc_application::error::AppError;
use cmdsrc_application::query::Query;
use cmdsrc_application::query_handler::QueryHandler;
use cmdsrc_domain::error::DomainError;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;

impl Dto for ChargeOption {}

/// 贷款费用详情
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanChargeDetails {
    pub id: i64,
    pub loan_id: i64,
    pub charge_id: i64,
    pub name: String,
    pub penalty: bool,
    pub charge_time_type: ChargeTimeType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_as_of_date: Option<NaiveDate>,
    pub charge_calculation_type: ChargeCalculationType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percentage: Option<Money>,
    pub currency: String,
    pub amount_or_percentage: Money,
    pub amount: Money,
    pub amount_paid: Money,
    pub amount_waived: Money,
    pub amount_written_off: Money,
    pub amount_outstanding: Money,
    pub waived: bool,
}

impl From<&LoanCharge> for LoanChargeDetails {
    fn from(charge: &LoanCharge) -> Self {
        let percentage = match charge.charge_calculation_type() {
            ChargeCalculationType::PercentOfAmount => Some(charge.amount_or_percentage()),
            ChargeCalculationType::Flat => None,
        };
        Self {
            id: charge.id(),
            loan_id: charge.loan_id(),
            charge_id: charge.charge_id(),
            name: charge.name().to_string(),
            penalty: charge.penalty(),
            charge_time_type: charge.charge_time_type(),
            due_as_of_date: charge.due_date(),
            charge_calculation_type: charge.charge_calculation_type(),
            percentage,
            currency: charge.currency().to_string(),
            amount_or_percentage: charge.amount_or_percentage(),
            amount: charge.amount(),
            amount_paid: charge.amount_paid(),
            amount_waived: charge.amount_waived(),
            amount_written_off: Money::ZERO,
            amount_outstanding: charge.amount_outstanding(),
            waived: charge.is_waived(),
        }
    }
}

/// 贷款费用读模型：详情或新增模板（仅含可选费用）
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanChargeData {
    #[serde(flatten)]
    pub details: Option<LoanChargeDetails>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub charge_options: Vec<ChargeOption>,
}

impl LoanChargeData {
    pub fn template(charge_options: Vec<ChargeOption>) -> Self {
        Self {
            details: None,
            charge_options,
        }
    }
}

impl From<&LoanCharge> for LoanChargeData {
    fn from(charge: &LoanCharge) -> Self {
        Self {
            details: Some(charge.into()),
            charge_options: Vec::new(),
        }
    }
}

impl Dto for LoanChargeData {}

#[async_trait]
pub trait ChargeReadService: Send + Sync {
    /// 可挂到贷款上的费用，按标识升序
    async fn retrieve_loan_applicable_charges(
        &self,
        fee_charges_only: bool,
    ) -> Result<Vec<ChargeOption>, AppError>;

    async fn retrieve_charge(&self, charge_id: i64) -> Result<ChargeOption, AppError>;

    async fn retrieve_loan_charge(
        &self,
        loan_id: i64,
        loan_charge_id: i64,
    ) -> Result<LoanChargeData, AppError>;
}

pub struct InMemoryChargeReadService {
    catalog: DashMap<i64, ChargeOption>,
    store: Arc<InMemoryLoanChargeStore>,
}

impl InMemoryChargeReadService {
    pub fn new(store: Arc<InMemoryLoanChargeStore>) -> Self {
        Self {
            catalog: DashMap::new(),
            store,
        }
    }

    /// 录入或替换费用目录条目
    pub fn define_charge(&self, option: ChargeOption) {
        self.catalog.insert(option.id, option);
    }
}

#[async_trait]
impl ChargeReadService for InMemoryChargeReadService {
    async fn retrieve_loan_applicable_charges(
        &self,
        fee_charges_only: bool,
    ) -> Result<Vec<ChargeOption>, AppError> {
        let mut out: Vec<ChargeOption> = self
            .catalog
            .iter()
            .filter(|c| c.is_loan_applicable() && !(fee_charges_only && c.penalty))
            .map(|c| c.value().clone())
            .collect();
        out.sort_by_key(|c| c.id);
        Ok(out)
    }

    async fn retrieve_charge(&self, charge_id: i64) -> Result<ChargeOption, AppError> {
        self.catalog
            .get(&charge_id)
            .map(|c| c.value().clone())
            .ok_or_else(|| DomainError::not_found("CHARGE", charge_id).into())
    }

    async fn retrieve_loan_charge(
        &self,
        loan_id: i64,
        loan_charge_id: i64,
    ) -> Result<LoanChargeData, AppError> {
        self.store
            .find(loan_id, loan_charge_id)
            .map(|charge| LoanChargeData::from(&charge))
            .ok_or_else(|| DomainError::not_found(LOAN_CHARGE, loan_charge_id).into())
    }
}

/// 可选费用列表
#[derive(Debug, Clone, Copy, Default)]
pub struct ListApplicableOptions {
    pub fee_charges_only: bool,
}

impl Query for ListApplicableOptions {
    const NAME: &'static str = "listApplicableOptions";
    type Dto = Vec<ChargeOption>;
}

#[derive(Debug, Clone, Copy)]
pub struct RetrieveLoanCharge {
    pub loan_id: i64,
    pub loan_charge_id: i64,
}

impl Query for RetrieveLoanCharge {
    const NAME: &'static str = "retrieveLoanCharge";
    type Dto = LoanChargeData;
}

pub struct ListApplicableOptionsHandler {
    read: Arc<dyn ChargeReadService>,
}

impl ListApplicableOptionsHandler {
    pub fn new(read: Arc<dyn ChargeReadService>) -> Self {
        Self { read }
    }
}

#[async_trait]
impl QueryHandler<ListApplicableOptions> for ListApplicableOptionsHandler {
    async fn handle(
        &self,
        _ctx: &AppContext,
        q: ListApplicableOptions,
    ) -> Result<Vec<ChargeOption>, AppError> {
        self.read
            .retrieve_loan_applicable_charges(q.fee_charges_only)
            .await
    }
}

pub struct RetrieveLoanChargeHandler {
    read: Arc<dyn ChargeReadService>,
}

impl RetrieveLoanChargeHandler {
    pub fn new(read: Arc<dyn ChargeReadService>) -> Self {
        Self { read }
    }
}

#[async_trait]
impl QueryHandler<RetrieveLoanCharge> for RetrieveLoanChargeHandler {
    async fn handle(
        &self,
        _ctx: &AppContext,
        q: RetrieveLoanCharge,
    ) -> Result<LoanChargeData, AppError> {
        self.read
            .retrieve_loan_charge(q.loan_id, q.loan_charge_id)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChargeAppliesTo, NewLoanCharge};
    use serde_json::{Value, json};

    fn service() -> InMemoryChargeReadService {
        let store = Arc::new(InMemoryLoanChargeStore::new());
        let read = InMemoryChargeReadService::new(store);
        read.define_charge(
            ChargeOption::builder()
                .id(3)
                .name("Late penalty")
                .penalty(true)
                .amount(Money::from_minor(500))
                .build(),
        );
        read.define_charge(
            ChargeOption::builder()
                .id(1)
                .name("Processing fee")
                .amount(Money::from_minor(2_500))
                .build(),
        );
        read.define_charge(
            ChargeOption::builder()
                .id(2)
                .name("Savings fee")
                .amount(Money::from_minor(100))
                .charge_applies_to(ChargeAppliesTo::Savings)
                .build(),
        );
        read.define_charge(
            ChargeOption::builder()
                .id(4)
                .name("Retired fee")
                .active(false)
                .amount(Money::from_minor(100))
                .build(),
        );
        read
    }

    #[tokio::test]
    async fn applicable_charges_are_sorted_and_filtered() {
        let read = service();
        let all = read.retrieve_loan_applicable_charges(false).await.unwrap();
        assert_eq!(all.iter().map(|c| c.id).collect::<Vec<_>>(), vec![1, 3]);

        let fees = read.retrieve_loan_applicable_charges(true).await.unwrap();
        assert_eq!(fees.iter().map(|c| c.id).collect::<Vec<_>>(), vec![1]);
    }

    #[tokio::test]
    async fn missing_charge_is_not_found() {
        let read = service();
        let err = read.retrieve_charge(99).await.unwrap_err();
        assert_eq!(err.status_class(), 404);
        let err = read.retrieve_loan_charge(10, 55).await.unwrap_err();
        assert_eq!(err.status_class(), 404);
    }

    #[tokio::test]
    async fn details_flatten_into_the_payload() {
        let store = Arc::new(InMemoryLoanChargeStore::new());
        let read = InMemoryChargeReadService::new(store.clone());
        let option = ChargeOption::builder()
            .id(1)
            .name("Processing fee")
            .amount(Money::from_minor(2_500))
            .build();
        store.insert(
            LoanCharge::create(
                55,
                10,
                Money::ZERO,
                &option,
                NewLoanCharge {
                    charge_id: 1,
                    ..Default::default()
                },
            )
            .unwrap(),
        );

        let data = read.retrieve_loan_charge(10, 55).await.unwrap();
        let v: Value = serde_json::to_value(&data).unwrap();
        assert_eq!(v["id"], json!(55));
        assert_eq!(v["amountOutstanding"], json!(25.0));
        assert!(v.get("chargeOptions").is_none());

        let template = serde_json::to_value(LoanChargeData::template(vec![option])).unwrap();
        assert!(template.get("id").is_none());
        assert_eq!(template["chargeOptions"][0]["name"], json!("Processing fee"));
    }
}
