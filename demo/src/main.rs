use cmdsrc_application::audit_store::{AuditFilter, CommandAuditStore};
use cmdsrc_application::config::load_settings;
use cmdsrc_application::security::StaticAuthenticator;
use cmdsrc_domain::principal::{ALL_FUNCTIONS, Principal};
use cmdsrc_loans::bootstrap;
use cmdsrc_loans::model::{ChargeOption, ChargeTimeType, LoanCharge, Money, NewLoanCharge};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const LOAN: i64 = 10;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = load_settings()?;
    let services = bootstrap(&settings)?;

    let fee = ChargeOption::builder()
        .id(1)
        .name("Processing fee")
        .amount(Money::from_minor(2_500))
        .build();
    services.read.define_charge(fee.clone());
    services.read.define_charge(
        ChargeOption::builder()
            .id(2)
            .name("Late payment penalty")
            .penalty(true)
            .charge_time_type(ChargeTimeType::SpecifiedDueDate)
            .amount(Money::from_minor(1_000))
            .build(),
    );

    let principal = Money::from_minor(500_000);
    services.store.open_loan(LOAN, principal);
    services.store.insert(LoanCharge::create(
        55,
        LOAN,
        principal,
        &fee,
        NewLoanCharge {
            charge_id: 1,
            ..Default::default()
        },
    )?);

    let admin = services.resource(Arc::new(StaticAuthenticator::new(Principal::new(
        "mifos",
        [ALL_FUNCTIONS],
    ))));
    let clerk = services.resource(Arc::new(StaticAuthenticator::new(Principal::new(
        "clerk",
        ["READ_LOAN"],
    ))));

    let mut pretty = BTreeMap::new();
    pretty.insert("pretty".to_string(), "true".to_string());
    info!("template:\n{}", clerk.retrieve_template(&pretty).await?);

    let created = admin
        .add_loan_charge(LOAN, r#"{"chargeId": 2, "amount": "12.50", "dueDate": "2026-12-01"}"#)
        .await?;
    info!(%created, "charge added");

    let waived = admin.waive_loan_charge(LOAN, 55, Some("waive")).await?;
    info!(%waived, "charge waived");

    if let Err(err) = clerk.waive_loan_charge(LOAN, 55, Some("waive")).await {
        warn!(error = %err, status = err.status_class(), "clerk cannot waive");
    }
    if let Err(err) = admin.waive_loan_charge(LOAN, 55, Some("waive")).await {
        warn!(error = %err, code = err.code(), "second waive rejected");
    }
    if let Err(err) = admin.waive_loan_charge(LOAN, 55, Some("foo")).await {
        warn!(error = %err, "unknown command");
    }

    let mut fields = BTreeMap::new();
    fields.insert("fields".to_string(), "id,amount,amountWaived,amountOutstanding".to_string());
    info!(
        charge = %clerk.retrieve_loan_charge(LOAN, 55, &fields).await?,
        "charge after waive"
    );

    for record in services.audit.list(&AuditFilter::default()).await? {
        info!(
            command_id = %record.command_id(),
            principal = record.principal(),
            action = %record.envelope().action(),
            status = ?record.status(),
            "audit"
        );
    }
    info!(
        audit = %serde_json::to_string_pretty(&services.audit.list(&AuditFilter::default()).await?)?,
        "audit trail"
    );

    Ok(())
}
