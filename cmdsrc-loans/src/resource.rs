//! 贷款费用接口适配层（`/loans/{loanId}/charges`）
//!
//! 只负责认证、读授权、把请求转成 `CommandEnvelope` 以及序列化响应；
//! 写授权与审计全部由分发器完成。
//!
use crate::LOAN_CHARGE;
use crate::read::{ListApplicableOptions, LoanChargeData, RetrieveLoanCharge};
use chrono::Duration;
use cmdsrc_application::command_bus::CommandBus;
use cmdsrc_application::context::AppContext;
use cmdsrc_application::error::AppError;
use cmdsrc_application::inmemory_query_bus::InMemoryQueryBus;
use cmdsrc_application::permission::PermissionGate;
use cmdsrc_application::query_bus::QueryBus;
use cmdsrc_application::security::Authenticator;
use cmdsrc_application::serialization::{self, QueryParams, ResponseSettings};
use cmdsrc_domain::command::{CommandAction, CommandRequest, EntityType, parse_payload};
use serde_json::Value;
use std::sync::Arc;

/// 可返回给调用方的字段
pub const RESPONSE_DATA_PARAMETERS: &[&str] = &[
    "id",
    "chargeId",
    "name",
    "penalty",
    "chargeTimeType",
    "dueAsOfDate",
    "chargeCalculationType",
    "percentage",
    "amountPercentageAppliedTo",
    "currency",
    "amountWaived",
    "amountWrittenOff",
    "amountOutstanding",
    "amountOrPercentage",
    "amount",
    "amountPaid",
    "chargeOptions",
];

const PARENT_RESOURCE: &str = "loans";
const SUB_RESOURCE: &str = "charges";
const NO_GROUPING: &str = "N/A";

pub struct LoanChargesResource {
    authenticator: Arc<dyn Authenticator>,
    gate: PermissionGate,
    commands: Arc<dyn CommandBus>,
    queries: Arc<InMemoryQueryBus>,
    timeout: Option<Duration>,
}

impl LoanChargesResource {
    pub fn new(
        authenticator: Arc<dyn Authenticator>,
        gate: PermissionGate,
        commands: Arc<dyn CommandBus>,
        queries: Arc<InMemoryQueryBus>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            authenticator,
            gate,
            commands,
            queries,
            timeout,
        }
    }

    /// `GET template`：新增费用所需的可选费用
    pub async fn retrieve_template(&self, params: &QueryParams) -> Result<String, AppError> {
        let ctx = self.authorized_reader().await?;
        let options = self
            .queries
            .dispatch(
                &ctx,
                ListApplicableOptions {
                    fee_charges_only: false,
                },
            )
            .await?;
        serialization::serialize(
            &ResponseSettings::from_query(params),
            &LoanChargeData::template(options),
            RESPONSE_DATA_PARAMETERS,
        )
    }

    /// `GET {loanChargeId}`
    pub async fn retrieve_loan_charge(
        &self,
        loan_id: i64,
        loan_charge_id: i64,
        params: &QueryParams,
    ) -> Result<String, AppError> {
        let ctx = self.authorized_reader().await?;
        let data = self
            .queries
            .dispatch(
                &ctx,
                RetrieveLoanCharge {
                    loan_id,
                    loan_charge_id,
                },
            )
            .await?;
        serialization::serialize(
            &ResponseSettings::from_query(params),
            &data,
            RESPONSE_DATA_PARAMETERS,
        )
    }

    /// `POST`
    pub async fn add_loan_charge(&self, loan_id: i64, body: &str) -> Result<String, AppError> {
        let payload = parse_payload(body)?;
        self.submit(CommandAction::Create, loan_id, None, payload)
            .await
    }

    /// `PUT {loanChargeId}`
    pub async fn update_loan_charge(
        &self,
        loan_id: i64,
        loan_charge_id: i64,
        body: &str,
    ) -> Result<String, AppError> {
        let payload = parse_payload(body)?;
        self.submit(CommandAction::Update, loan_id, Some(loan_charge_id), payload)
            .await
    }

    /// `POST {loanChargeId}?command=waive`
    pub async fn waive_loan_charge(
        &self,
        loan_id: i64,
        loan_charge_id: i64,
        command: Option<&str>,
    ) -> Result<String, AppError> {
        if !is_command(command, "waive") {
            return Err(AppError::UnrecognizedParameter {
                name: "command".into(),
                value: command.unwrap_or_default().to_string(),
            });
        }
        self.submit(
            CommandAction::Waive,
            loan_id,
            Some(loan_charge_id),
            Value::Null,
        )
        .await
    }

    /// `DELETE {loanChargeId}`
    pub async fn delete_loan_charge(
        &self,
        loan_id: i64,
        loan_charge_id: i64,
    ) -> Result<String, AppError> {
        self.submit(
            CommandAction::Delete,
            loan_id,
            Some(loan_charge_id),
            Value::Null,
        )
        .await
    }

    async fn context(&self) -> Result<AppContext, AppError> {
        let principal = self.authenticator.authenticated_user().await?;
        Ok(AppContext::for_principal(principal).with_timeout(self.timeout))
    }

    async fn authorized_reader(&self) -> Result<AppContext, AppError> {
        let ctx = self.context().await?;
        self.gate
            .authorize_read(&ctx.principal, &EntityType::new(LOAN_CHARGE)?)?;
        Ok(ctx)
    }

    async fn submit(
        &self,
        action: CommandAction,
        loan_id: i64,
        target_id: Option<i64>,
        payload: Value,
    ) -> Result<String, AppError> {
        let ctx = self.context().await?;
        let envelope = CommandRequest::builder()
            .action(action)
            .entity_type(LOAN_CHARGE)
            .grouping_key(NO_GROUPING)
            .parent_resource(PARENT_RESOURCE)
            .parent_id(loan_id)
            .sub_resource(SUB_RESOURCE)
            .maybe_target_id(target_id)
            .payload(payload)
            .build()
            .into_envelope()?;

        let identifier = self.commands.submit(&ctx, envelope).await?;
        serialization::serialize_plain(&identifier)
    }
}

/// 查询参数命令名匹配：去除首尾空白后忽略大小写
fn is_command(param: Option<&str>, expected: &str) -> bool {
    param
        .map(str::trim)
        .is_some_and(|p| !p.is_empty() && p.eq_ignore_ascii_case(expected))
}
