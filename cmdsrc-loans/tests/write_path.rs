use anyhow::Result;
use cmdsrc_application::audit_store::{AuditFilter, CommandAuditStore};
use cmdsrc_application::config::Settings;
use cmdsrc_application::context::AppContext;
use cmdsrc_application::error::AppError;
use cmdsrc_application::query_bus::QueryBus;
use cmdsrc_application::security::StaticAuthenticator;
use cmdsrc_domain::audit::AuditStatus;
use cmdsrc_domain::command::{CommandAction, CommandRequest};
use cmdsrc_domain::identifier::EntityIdentifier;
use cmdsrc_domain::principal::{ALL_FUNCTIONS, Principal};
use cmdsrc_domain::value_object::Version;
use cmdsrc_loans::model::{ChargeCalculationType, ChargeOption, LoanCharge, Money, NewLoanCharge};
use cmdsrc_loans::read::ListApplicableOptions;
use cmdsrc_loans::resource::LoanChargesResource;
use cmdsrc_loans::{LoanChargeServices, bootstrap};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinSet;

const LOAN: i64 = 10;
const CHARGE: i64 = 55;

fn services_with(settings: &Settings) -> Result<LoanChargeServices> {
    let services = bootstrap(settings)?;
    let fee = ChargeOption::builder()
        .id(1)
        .name("Processing fee")
        .amount(Money::from_minor(2_500))
        .build();
    services.read.define_charge(fee.clone());
    services.read.define_charge(
        ChargeOption::builder()
            .id(2)
            .name("Late penalty")
            .penalty(true)
            .amount(Money::from_minor(1_000))
            .build(),
    );

    let principal = Money::from_minor(100_000);
    services.store.open_loan(LOAN, principal);
    services.store.insert(LoanCharge::create(
        CHARGE,
        LOAN,
        principal,
        &fee,
        NewLoanCharge {
            charge_id: 1,
            ..Default::default()
        },
    )?);
    Ok(services)
}

fn services() -> Result<LoanChargeServices> {
    services_with(&Settings::default())
}

fn resource_for(services: &LoanChargeServices, principal: Principal) -> LoanChargesResource {
    services.resource(Arc::new(StaticAuthenticator::new(principal)))
}

fn admin() -> Principal {
    Principal::new("mifos", [ALL_FUNCTIONS])
}

fn clerk() -> Principal {
    Principal::new("clerk", ["READ_LOAN"])
}

fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[tokio::test]
async fn create_allocates_fresh_ids_with_one_succeeded_record_each() -> Result<()> {
    let services = services()?;
    let api = resource_for(&services, admin());

    let first: EntityIdentifier =
        serde_json::from_str(&api.add_loan_charge(LOAN, r#"{"chargeId": 1}"#).await?)?;
    let second: EntityIdentifier = serde_json::from_str(
        &api.add_loan_charge(LOAN, r#"{"chargeId": 1, "amount": "40.00"}"#)
            .await?,
    )?;

    assert_ne!(first.entity_id(), second.entity_id());
    assert_ne!(first.entity_id(), CHARGE);
    assert_eq!(first.reference("loanId"), Some(LOAN));

    let records = services
        .audit
        .list(&AuditFilter {
            action: Some(CommandAction::Create),
            ..Default::default()
        })
        .await?;
    assert_eq!(records.len(), 2);
    for (record, id) in records.iter().zip([&first, &second]) {
        assert_eq!(record.status(), AuditStatus::Succeeded);
        assert_eq!(record.result().map(EntityIdentifier::entity_id), Some(id.entity_id()));
        assert_eq!(Some(record.command_id()), id.command_id());
    }

    let created = services.store.find(LOAN, second.entity_id()).expect("created");
    assert_eq!(created.amount(), Money::from_minor(4_000));
    Ok(())
}

#[tokio::test]
async fn missing_target_is_malformed_and_leaves_no_trace() -> Result<()> {
    let services = services()?;

    let err: AppError = CommandRequest::builder()
        .action(CommandAction::Update)
        .entity_type("LOANCHARGE")
        .parent_resource("loans")
        .parent_id(LOAN)
        .sub_resource("charges")
        .build()
        .into_envelope()
        .unwrap_err()
        .into();

    assert!(matches!(err, AppError::MalformedCommand(_)));
    assert_eq!(err.status_class(), 400);
    assert!(services.audit.is_empty());
    assert_eq!(services.store.mutation_count(), 0);
    Ok(())
}

#[tokio::test]
async fn unauthorized_principal_never_mutates() -> Result<()> {
    let services = services()?;
    let api = resource_for(&services, clerk());

    let err = api
        .add_loan_charge(LOAN, r#"{"chargeId": 1}"#)
        .await
        .unwrap_err();
    match err {
        AppError::PermissionDenied { permission, .. } => {
            assert_eq!(permission, "CREATE_LOANCHARGE")
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(services.store.mutation_count(), 0);
    assert!(services.audit.is_empty());
    Ok(())
}

#[tokio::test]
async fn list_applicable_options_is_idempotent() -> Result<()> {
    let services = services()?;
    let ctx = AppContext::for_principal(clerk());

    let first = services
        .queries
        .dispatch(&ctx, ListApplicableOptions::default())
        .await?;
    let second = services
        .queries
        .dispatch(&ctx, ListApplicableOptions::default())
        .await?;
    assert_eq!(first, second);
    assert_eq!(first.iter().map(|c| c.id).collect::<Vec<_>>(), vec![1, 2]);

    let fees_only = services
        .queries
        .dispatch(
            &ctx,
            ListApplicableOptions {
                fee_charges_only: true,
            },
        )
        .await?;
    assert_eq!(fees_only.len(), 1);

    let api = resource_for(&services, clerk());
    let template = api.retrieve_template(&params(&[])).await?;
    assert_eq!(template, api.retrieve_template(&params(&[])).await?);
    assert!(services.audit.is_empty());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_updates_never_lose_an_update() -> Result<()> {
    let services = services()?;
    let api = Arc::new(resource_for(&services, admin()));

    let mut set = JoinSet::new();
    for i in 0..16 {
        let api = api.clone();
        set.spawn(async move {
            let body = format!(r#"{{"amount": {}}}"#, 30 + i);
            api.update_loan_charge(LOAN, CHARGE, &body).await
        });
    }

    let mut succeeded = 0usize;
    let mut conflicted = 0usize;
    while let Some(res) = set.join_next().await {
        match res? {
            Ok(_) => succeeded += 1,
            Err(err) => {
                assert!(err.is_retryable(), "unexpected {err:?}");
                conflicted += 1;
            }
        }
    }

    assert_eq!(succeeded + conflicted, 16);
    assert!(succeeded >= 1);

    let charge = services.store.find(LOAN, CHARGE).expect("charge");
    assert_eq!(charge.version(), Version::from_value(1 + succeeded));
    assert_eq!(services.store.mutation_count(), succeeded as u64);
    assert!(!services.store.is_reserved(CHARGE));

    let updates = services
        .audit
        .list(&AuditFilter {
            action: Some(CommandAction::Update),
            ..Default::default()
        })
        .await?;
    let ok = updates
        .iter()
        .filter(|r| r.status() == AuditStatus::Succeeded)
        .count();
    let failed = updates
        .iter()
        .filter(|r| r.status() == AuditStatus::Failed)
        .count();
    assert_eq!((ok, failed), (succeeded, conflicted));
    Ok(())
}

#[tokio::test]
async fn waive_returns_the_charge_id_and_is_audited() -> Result<()> {
    let services = services()?;
    let api = resource_for(&services, admin());

    let out: EntityIdentifier =
        serde_json::from_str(&api.waive_loan_charge(LOAN, CHARGE, Some("waive")).await?)?;
    assert_eq!(out.entity_id(), CHARGE);
    assert_eq!(out.reference("loanId"), Some(LOAN));

    let command_id = out.command_id().expect("command id");
    let record = services.audit.get(command_id).await?.expect("record");
    assert_eq!(record.status(), AuditStatus::Succeeded);
    assert_eq!(record.principal(), "mifos");
    assert_eq!(record.envelope().action(), CommandAction::Waive);
    assert_eq!(record.envelope().target_id(), Some(CHARGE));
    assert_eq!(record.envelope().parent().id, LOAN);
    assert_eq!(record.envelope().grouping_key(), None);

    let charge = services.store.find(LOAN, CHARGE).expect("charge");
    assert!(charge.is_waived());
    assert_eq!(charge.amount_outstanding(), Money::ZERO);

    let err = api
        .waive_loan_charge(LOAN, CHARGE, Some(" WAIVE "))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "error.msg.loan.charge.already.waived");
    let failed = services
        .audit
        .list(&AuditFilter {
            status: Some(AuditStatus::Failed),
            ..Default::default()
        })
        .await?;
    assert_eq!(failed.len(), 1);
    Ok(())
}

#[tokio::test]
async fn unauthorized_waive_is_denied_without_audit() -> Result<()> {
    let services = services()?;
    let api = resource_for(&services, clerk());

    let err = api
        .waive_loan_charge(LOAN, CHARGE, Some("waive"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::PermissionDenied { .. }));
    assert_eq!(err.status_class(), 403);
    assert!(services.audit.is_empty());
    assert!(!services.store.find(LOAN, CHARGE).expect("charge").is_waived());
    Ok(())
}

#[tokio::test]
async fn unknown_command_param_is_rejected_before_dispatch() -> Result<()> {
    let services = services()?;
    let api = resource_for(&services, admin());

    match api.waive_loan_charge(LOAN, CHARGE, Some("foo")).await {
        Err(AppError::UnrecognizedParameter { name, value }) => {
            assert_eq!(name, "command");
            assert_eq!(value, "foo");
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(matches!(
        api.waive_loan_charge(LOAN, CHARGE, None).await,
        Err(AppError::UnrecognizedParameter { .. })
    ));
    assert!(services.audit.is_empty());
    Ok(())
}

#[tokio::test]
async fn reads_require_read_loan_and_honour_field_selection() -> Result<()> {
    let services = services()?;

    let api = resource_for(&services, clerk());
    let body = api
        .retrieve_loan_charge(LOAN, CHARGE, &params(&[("fields", "id,amount,loanId")]))
        .await?;
    let v: Value = serde_json::from_str(&body)?;
    let keys: Vec<&str> = v
        .as_object()
        .expect("object")
        .keys()
        .map(String::as_str)
        .collect();
    assert_eq!(keys, vec!["amount", "id"]);

    let teller = resource_for(&services, Principal::new("teller", ["WAIVE_LOANCHARGE"]));
    let err = teller
        .retrieve_template(&params(&[]))
        .await
        .unwrap_err();
    match err {
        AppError::PermissionDenied { permission, .. } => assert_eq!(permission, "READ_LOAN"),
        other => panic!("unexpected {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn delete_removes_the_charge() -> Result<()> {
    let services = services()?;
    let api = resource_for(&services, admin());

    api.delete_loan_charge(LOAN, CHARGE).await?;
    let err = api
        .retrieve_loan_charge(LOAN, CHARGE, &params(&[]))
        .await
        .unwrap_err();
    assert_eq!(err.status_class(), 404);
    assert_eq!(services.store.mutation_count(), 1);
    Ok(())
}

#[tokio::test]
async fn unauthenticated_requests_are_rejected() -> Result<()> {
    let services = services()?;
    let api = services.resource(Arc::new(StaticAuthenticator::unauthenticated()));

    let err = api.delete_loan_charge(LOAN, CHARGE).await.unwrap_err();
    assert_eq!(err.status_class(), 401);
    assert!(services.audit.is_empty());
    Ok(())
}

#[tokio::test]
async fn configured_permission_overrides_apply() -> Result<()> {
    let settings = Settings::from_toml_str(
        r#"
        [permissions]
        "LOANCHARGE.WAIVE" = "WAIVE_CHARGES"
        "#,
    )?;
    let services = services_with(&settings)?;

    let old = resource_for(&services, Principal::new("old", ["WAIVE_LOANCHARGE"]));
    assert!(matches!(
        old.waive_loan_charge(LOAN, CHARGE, Some("waive")).await,
        Err(AppError::PermissionDenied { .. })
    ));

    let new = resource_for(&services, Principal::new("new", ["WAIVE_CHARGES"]));
    new.waive_loan_charge(LOAN, CHARGE, Some("waive")).await?;
    Ok(())
}

#[tokio::test]
async fn oversized_percent_charge_is_rejected_without_mutation() -> Result<()> {
    let services = services()?;
    services.read.define_charge(
        ChargeOption::builder()
            .id(7)
            .name("Insurance")
            .amount(Money::from_minor(100))
            .charge_calculation_type(ChargeCalculationType::PercentOfAmount)
            .build(),
    );
    let api = resource_for(&services, admin());

    for amount in ["9999999999999.99", "92233720368547758.07"] {
        let body = format!(r#"{{"chargeId": 7, "amount": "{amount}"}}"#);
        let err = api.add_loan_charge(LOAN, &body).await.unwrap_err();
        assert!(matches!(err.status_class(), 400 | 422), "{amount}: {err}");
    }

    assert_eq!(services.store.charges_for_loan(LOAN).len(), 1);
    assert_eq!(services.store.mutation_count(), 0);
    let succeeded = services
        .audit
        .list(&AuditFilter {
            status: Some(AuditStatus::Succeeded),
            ..Default::default()
        })
        .await?;
    assert!(succeeded.is_empty());
    Ok(())
}

#[tokio::test]
async fn huge_dispatch_timeout_behaves_as_unbounded() -> Result<()> {
    let settings = Settings {
        dispatch_timeout_ms: Some(9_000_000_000_000_000),
        ..Default::default()
    };
    let services = services_with(&settings)?;

    resource_for(&services, admin())
        .delete_loan_charge(LOAN, CHARGE)
        .await?;
    assert!(services.store.find(LOAN, CHARGE).is_none());
    Ok(())
}
