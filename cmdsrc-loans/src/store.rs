//! 贷款费用存储（内存实现）
//!
//! 以版本号做乐观并发控制，并在准备阶段占用目标行：
//! 同一费用的并发写入只有一个能进入提交，其余得到 `Locked` 或 `VersionConflict`。
//! 读取始终看到最近一次提交的状态。
//!
use crate::LOAN_CHARGE;
use crate::model::{LoanCharge, Money};
use async_trait::async_trait;
use cmdsrc_application::command_handler::UnitOfWork;
use cmdsrc_application::error::AppError;
use cmdsrc_domain::error::DomainError;
use cmdsrc_domain::value_object::Version;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use tracing::{debug, warn};

struct Row {
    charge: LoanCharge,
    reserved: bool,
}

pub struct InMemoryLoanChargeStore {
    rows: DashMap<i64, Row>,
    /// 贷款标识 → 本金
    loans: DashMap<i64, Money>,
    next_id: AtomicI64,
    mutations: AtomicU64,
}

impl Default for InMemoryLoanChargeStore {
    fn default() -> Self {
        Self {
            rows: DashMap::new(),
            loans: DashMap::new(),
            next_id: AtomicI64::new(1),
            mutations: AtomicU64::new(0),
        }
    }
}

impl InMemoryLoanChargeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_loan(&self, loan_id: i64, principal: Money) {
        self.loans.insert(loan_id, principal);
    }

    pub fn loan_principal(&self, loan_id: i64) -> Option<Money> {
        self.loans.get(&loan_id).map(|p| *p)
    }

    /// 最近一次提交的快照
    pub fn find(&self, loan_id: i64, id: i64) -> Option<LoanCharge> {
        self.rows
            .get(&id)
            .filter(|row| row.charge.loan_id() == loan_id)
            .map(|row| row.charge.clone())
    }

    /// 某笔贷款下的全部费用（按标识升序）
    pub fn charges_for_loan(&self, loan_id: i64) -> Vec<LoanCharge> {
        let mut out: Vec<LoanCharge> = self
            .rows
            .iter()
            .filter(|row| row.charge.loan_id() == loan_id)
            .map(|row| row.charge.clone())
            .collect();
        out.sort_by_key(LoanCharge::id);
        out
    }

    /// 分配新的费用标识（单调递增，不复用）
    pub fn allocate_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// 直接写入已提交状态（初始化数据）
    pub fn insert(&self, mut charge: LoanCharge) {
        if charge.version().is_new() {
            charge.set_version(charge.version().next());
        }
        self.next_id.fetch_max(charge.id() + 1, Ordering::SeqCst);
        self.rows.insert(
            charge.id(),
            Row {
                charge,
                reserved: false,
            },
        );
    }

    /// 已提交的变更次数
    pub fn mutation_count(&self) -> u64 {
        self.mutations.load(Ordering::SeqCst)
    }

    pub fn is_reserved(&self, id: i64) -> bool {
        self.rows.get(&id).is_some_and(|row| row.reserved)
    }

    /// 暂存一项变更，交由分发器驱动两阶段提交
    pub fn stage(self: &Arc<Self>, change: ChargeChange) -> ChargeUnitOfWork {
        ChargeUnitOfWork {
            store: Arc::clone(self),
            change: Some(change),
            prepared: false,
        }
    }

    fn reserve(&self, id: i64, expected: Version) -> Result<(), DomainError> {
        let mut row = self
            .rows
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found(LOAN_CHARGE, id))?;
        if row.reserved {
            return Err(DomainError::Locked {
                entity: LOAN_CHARGE.into(),
                id,
            });
        }
        if row.charge.version() != expected {
            return Err(DomainError::VersionConflict {
                entity: LOAN_CHARGE.into(),
                id,
                expected,
                actual: row.charge.version(),
            });
        }
        row.reserved = true;
        Ok(())
    }

    fn release(&self, id: i64) {
        if let Some(mut row) = self.rows.get_mut(&id) {
            row.reserved = false;
        }
    }

    fn apply(&self, change: ChargeChange) {
        match change {
            ChargeChange::Insert(mut charge) => {
                charge.set_version(charge.version().next());
                self.rows.insert(
                    charge.id(),
                    Row {
                        charge,
                        reserved: false,
                    },
                );
            }
            ChargeChange::Replace {
                expected,
                mut charge,
            } => {
                let Some(mut row) = self.rows.get_mut(&charge.id()) else {
                    warn!(id = charge.id(), "reserved row vanished before commit");
                    return;
                };
                charge.set_version(expected.next());
                row.charge = charge;
                row.reserved = false;
            }
            ChargeChange::Remove { id, .. } => {
                self.rows.remove(&id);
            }
        }
        self.mutations.fetch_add(1, Ordering::SeqCst);
    }
}

/// 对单条费用的变更
#[derive(Debug, Clone)]
pub enum ChargeChange {
    Insert(LoanCharge),
    /// 以读取时的版本 `expected` 替换整行
    Replace { expected: Version, charge: LoanCharge },
    Remove { id: i64, expected: Version },
}

impl ChargeChange {
    fn target(&self) -> i64 {
        match self {
            ChargeChange::Insert(charge) | ChargeChange::Replace { charge, .. } => charge.id(),
            ChargeChange::Remove { id, .. } => *id,
        }
    }

    fn holds_reservation(&self) -> bool {
        !matches!(self, ChargeChange::Insert(_))
    }
}

/// 费用变更的两阶段提交单元
///
/// 准备后被丢弃（未提交也未回滚）时释放占用。
pub struct ChargeUnitOfWork {
    store: Arc<InMemoryLoanChargeStore>,
    change: Option<ChargeChange>,
    prepared: bool,
}

#[async_trait]
impl UnitOfWork for ChargeUnitOfWork {
    async fn prepare(&mut self) -> Result<(), AppError> {
        let Some(change) = self.change.as_ref() else {
            return Ok(());
        };
        let id = change.target();
        match change {
            ChargeChange::Insert(_) => {
                if self.store.rows.contains_key(&id) {
                    return Err(DomainError::InvalidState {
                        reason: format!("loan charge {id} already exists"),
                    }
                    .into());
                }
            }
            ChargeChange::Replace { expected, .. } | ChargeChange::Remove { expected, .. } => {
                self.store.reserve(id, *expected)?;
            }
        }
        self.prepared = true;
        debug!(id, "loan charge change prepared");
        Ok(())
    }

    fn commit(mut self: Box<Self>) {
        if let Some(change) = self.change.take() {
            self.store.apply(change);
        }
    }

    fn rollback(mut self: Box<Self>) {
        if let Some(change) = self.change.take() {
            if self.prepared && change.holds_reservation() {
                self.store.release(change.target());
            }
        }
    }
}

impl Drop for ChargeUnitOfWork {
    fn drop(&mut self) {
        if let Some(change) = self.change.take() {
            if self.prepared && change.holds_reservation() {
                self.store.release(change.target());
            }
        }
    }
}
