//! 贷款费用模型
//!
//! 只承载命令处理所需的最小字段集与业务规则：
//! 新增、修改、豁免、删除。还款计划等完整贷款模型不在此处。
//!
use bon::Builder;
use chrono::NaiveDate;
use cmdsrc_domain::error::{DomainError, DomainResult};
use cmdsrc_domain::value_object::{ValueObject, Version};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value, json};
use std::fmt;
use std::ops::{Add, Sub};

/// 已豁免的费用再次豁免
pub const ERR_ALREADY_WAIVED: &str = "error.msg.loan.charge.already.waived";
/// 已结清的费用无可豁免金额
pub const ERR_ALREADY_PAID: &str = "error.msg.loan.charge.already.paid";
pub const ERR_WAIVED_NOT_UPDATABLE: &str = "error.msg.loan.charge.waived.cannot.be.updated";
pub const ERR_PAID_NOT_UPDATABLE: &str = "error.msg.loan.charge.paid.cannot.be.updated";
pub const ERR_WAIVED_NOT_DELETABLE: &str = "error.msg.loan.charge.waived.cannot.be.deleted";
pub const ERR_PAID_NOT_DELETABLE: &str = "error.msg.loan.charge.paid.cannot.be.deleted";
pub const ERR_NOT_LOAN_APPLICABLE: &str = "error.msg.charge.not.applicable.to.loan";
pub const ERR_OVERPAYMENT: &str = "error.msg.loan.charge.overpayment";

/// 金额（两位小数定点数，以最小单位存储）
///
/// 百分比同样以该表示存放（`2.5` 表示 2.5%）。
/// 取值范围为 ±[`Money::MAX`]，该范围内的值经 JSON 数字往返不丢失精度。
///
/// ```
/// use cmdsrc_loans::model::Money;
///
/// let fee = Money::parse("25.5").unwrap();
/// assert_eq!(fee.minor(), 2550);
/// assert_eq!(fee.to_string(), "25.50");
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);
    /// 15 位有效数字
    pub const MAX: Money = Money(999_999_999_999_999);

    pub const fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    pub const fn minor(&self) -> i64 {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// 解析十进制字符串，最多两位小数
    pub fn parse(raw: &str) -> DomainResult<Self> {
        let invalid = || DomainError::validation("amount", format!("'{raw}' is not a valid amount"));

        let s = raw.trim();
        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let (int, frac) = digits.split_once('.').unwrap_or((digits, ""));
        if int.is_empty() && frac.is_empty() {
            return Err(invalid());
        }
        if !int.bytes().chain(frac.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        let frac = frac.trim_end_matches('0');
        if frac.len() > 2 {
            return Err(DomainError::validation(
                "amount",
                format!("'{raw}' has more than two decimal places"),
            ));
        }

        let units: i64 = if int.is_empty() {
            0
        } else {
            int.parse().map_err(|_| invalid())?
        };
        let cents: i64 = format!("{frac:0<2}").parse().map_err(|_| invalid())?;
        let minor = units
            .checked_mul(100)
            .and_then(|v| v.checked_add(cents))
            .ok_or_else(invalid)?;

        Self::bounded(i128::from(if negative { -minor } else { minor }))
    }

    /// 按百分比计算，四舍五入到分
    pub fn percentage(&self, rate: Money) -> DomainResult<Money> {
        let product = i128::from(self.0) * i128::from(rate.0);
        let half = if product < 0 { -5_000 } else { 5_000 };
        Self::bounded((product + half) / 10_000)
    }

    fn bounded(minor: i128) -> DomainResult<Money> {
        i64::try_from(minor)
            .ok()
            .filter(|v| v.unsigned_abs() <= Self::MAX.0.unsigned_abs())
            .map(Money)
            .ok_or_else(|| {
                DomainError::validation("amount", format!("amount exceeds {}", Self::MAX))
            })
    }

    pub fn as_f64(&self) -> f64 {
        self.0 as f64 / 100.0
    }
}

impl ValueObject for Money {
    type Error = DomainError;

    fn validate(&self) -> Result<(), Self::Error> {
        if self.is_positive() {
            Ok(())
        } else {
            Err(DomainError::validation(
                "amount",
                format!("{self} must be greater than zero"),
            ))
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_f64())
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(serde_json::Number),
            Text(String),
        }

        let raw = match Raw::deserialize(deserializer)? {
            Raw::Number(n) => n.to_string(),
            Raw::Text(s) => s,
        };
        Money::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChargeTimeType {
    #[default]
    Disbursement,
    SpecifiedDueDate,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChargeCalculationType {
    #[default]
    Flat,
    /// 按贷款本金的百分比
    PercentOfAmount,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChargeAppliesTo {
    #[default]
    Loan,
    Savings,
}

/// 费用目录条目（产品层面定义的费用）
#[derive(Builder, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeOption {
    pub id: i64,
    #[builder(into)]
    pub name: String,
    #[builder(default = true)]
    pub active: bool,
    #[builder(default)]
    pub penalty: bool,
    #[builder(into, default = "USD".to_string())]
    pub currency: String,
    pub amount: Money,
    #[builder(default)]
    pub charge_time_type: ChargeTimeType,
    #[builder(default)]
    pub charge_calculation_type: ChargeCalculationType,
    #[builder(default)]
    pub charge_applies_to: ChargeAppliesTo,
}

impl ChargeOption {
    /// 可挂到贷款上的费用：启用且作用于贷款
    pub fn is_loan_applicable(&self) -> bool {
        self.active && self.charge_applies_to == ChargeAppliesTo::Loan
    }
}

/// CREATE 载荷
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewLoanCharge {
    pub charge_id: i64,
    #[serde(default)]
    pub amount: Option<Money>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
}

/// UPDATE 载荷
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LoanChargeChanges {
    #[serde(default)]
    pub amount: Option<Money>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
}

/// 挂在某笔贷款上的费用
#[derive(Debug, Clone, PartialEq)]
pub struct LoanCharge {
    id: i64,
    loan_id: i64,
    charge_id: i64,
    name: String,
    penalty: bool,
    currency: String,
    charge_time_type: ChargeTimeType,
    charge_calculation_type: ChargeCalculationType,
    amount_or_percentage: Money,
    amount: Money,
    amount_paid: Money,
    amount_waived: Money,
    due_date: Option<NaiveDate>,
    waived: bool,
    version: Version,
}

impl LoanCharge {
    pub fn create(
        id: i64,
        loan_id: i64,
        loan_principal: Money,
        option: &ChargeOption,
        input: NewLoanCharge,
    ) -> DomainResult<Self> {
        if !option.is_loan_applicable() {
            return Err(DomainError::rule(
                ERR_NOT_LOAN_APPLICABLE,
                format!("charge {} cannot be applied to a loan", option.id),
            ));
        }

        let amount_or_percentage = input.amount.unwrap_or(option.amount);
        amount_or_percentage.validate()?;
        check_due_date(option.charge_time_type, input.due_date)?;

        let mut charge = Self {
            id,
            loan_id,
            charge_id: option.id,
            name: option.name.clone(),
            penalty: option.penalty,
            currency: option.currency.clone(),
            charge_time_type: option.charge_time_type,
            charge_calculation_type: option.charge_calculation_type,
            amount_or_percentage,
            amount: Money::ZERO,
            amount_paid: Money::ZERO,
            amount_waived: Money::ZERO,
            due_date: input.due_date,
            waived: false,
            version: Version::new(),
        };
        charge.amount = charge.compute_amount(loan_principal)?;
        Ok(charge)
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn loan_id(&self) -> i64 {
        self.loan_id
    }

    pub fn charge_id(&self) -> i64 {
        self.charge_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn penalty(&self) -> bool {
        self.penalty
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn charge_time_type(&self) -> ChargeTimeType {
        self.charge_time_type
    }

    pub fn charge_calculation_type(&self) -> ChargeCalculationType {
        self.charge_calculation_type
    }

    pub fn amount_or_percentage(&self) -> Money {
        self.amount_or_percentage
    }

    pub fn amount(&self) -> Money {
        self.amount
    }

    pub fn amount_paid(&self) -> Money {
        self.amount_paid
    }

    pub fn amount_waived(&self) -> Money {
        self.amount_waived
    }

    pub fn amount_outstanding(&self) -> Money {
        self.amount - self.amount_paid - self.amount_waived
    }

    pub fn due_date(&self) -> Option<NaiveDate> {
        self.due_date
    }

    pub fn is_waived(&self) -> bool {
        self.waived
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// 由存储在提交时设置
    pub(crate) fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    /// 修改金额或到期日，返回实际发生变化的字段
    pub fn update(
        &mut self,
        input: &LoanChargeChanges,
        loan_principal: Money,
    ) -> DomainResult<Map<String, Value>> {
        if self.waived {
            return Err(DomainError::rule(
                ERR_WAIVED_NOT_UPDATABLE,
                format!("loan charge {} is waived", self.id),
            ));
        }
        if self.amount_paid.is_positive() {
            return Err(DomainError::rule(
                ERR_PAID_NOT_UPDATABLE,
                format!("loan charge {} has payments", self.id),
            ));
        }

        let mut changes = Map::new();
        if let Some(amount) = input.amount {
            amount.validate()?;
            if amount != self.amount_or_percentage {
                let previous = self.amount_or_percentage;
                self.amount_or_percentage = amount;
                match self.compute_amount(loan_principal) {
                    Ok(computed) => self.amount = computed,
                    Err(err) => {
                        self.amount_or_percentage = previous;
                        return Err(err);
                    }
                }
                changes.insert("amount".into(), json!(amount));
            }
        }
        if let Some(due_date) = input.due_date {
            check_due_date(self.charge_time_type, Some(due_date))?;
            if Some(due_date) != self.due_date {
                self.due_date = Some(due_date);
                changes.insert("dueDate".into(), json!(due_date));
            }
        }
        Ok(changes)
    }

    /// 豁免全部未结金额
    pub fn waive(&mut self) -> DomainResult<Map<String, Value>> {
        if self.waived {
            return Err(DomainError::rule(
                ERR_ALREADY_WAIVED,
                format!("loan charge {} is already waived", self.id),
            ));
        }
        let outstanding = self.amount_outstanding();
        if !outstanding.is_positive() {
            return Err(DomainError::rule(
                ERR_ALREADY_PAID,
                format!("loan charge {} has nothing outstanding", self.id),
            ));
        }

        self.amount_waived = self.amount_waived + outstanding;
        self.waived = true;

        let mut changes = Map::new();
        changes.insert("amountWaived".into(), json!(self.amount_waived));
        changes.insert("waived".into(), json!(true));
        Ok(changes)
    }

    /// 记录还款；不得超过未结金额
    pub fn record_payment(&mut self, amount: Money) -> DomainResult<()> {
        amount.validate()?;
        if amount > self.amount_outstanding() {
            return Err(DomainError::rule(
                ERR_OVERPAYMENT,
                format!(
                    "payment {amount} exceeds outstanding {}",
                    self.amount_outstanding()
                ),
            ));
        }
        self.amount_paid = self.amount_paid + amount;
        Ok(())
    }

    pub fn ensure_deletable(&self) -> DomainResult<()> {
        if self.waived {
            return Err(DomainError::rule(
                ERR_WAIVED_NOT_DELETABLE,
                format!("loan charge {} is waived", self.id),
            ));
        }
        if self.amount_paid.is_positive() {
            return Err(DomainError::rule(
                ERR_PAID_NOT_DELETABLE,
                format!("loan charge {} has payments", self.id),
            ));
        }
        Ok(())
    }

    /// 计算后的金额同样必须为正
    fn compute_amount(&self, loan_principal: Money) -> DomainResult<Money> {
        let amount = match self.charge_calculation_type {
            ChargeCalculationType::Flat => self.amount_or_percentage,
            ChargeCalculationType::PercentOfAmount => {
                loan_principal.percentage(self.amount_or_percentage)?
            }
        };
        amount.validate()?;
        Ok(amount)
    }
}

fn check_due_date(time_type: ChargeTimeType, due_date: Option<NaiveDate>) -> DomainResult<()> {
    match (time_type, due_date) {
        (ChargeTimeType::SpecifiedDueDate, None) => Err(DomainError::validation(
            "dueDate",
            "required for a specified due date charge",
        )),
        (ChargeTimeType::Disbursement, Some(_)) => Err(DomainError::validation(
            "dueDate",
            "not allowed for a disbursement charge",
        )),
        _ => Ok(()),
    }
}
