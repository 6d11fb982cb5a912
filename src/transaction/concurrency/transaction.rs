// Transaction
//
// Represents an active database transaction under strict two-phase
// locking: the state moves Growing -> Shrinking on the first qualifying
// unlock, and every held lock is tracked per granularity so the lock
// manager can validate and the transaction manager can release.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use thiserror::Error;

use crate::common::types::{Rid, TableOid, TxnId};
use crate::transaction::concurrency::lock_manager::LockMode;

/// Transaction isolation levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
}

/// Transaction states under strict 2PL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Growing,
    Shrinking,
    Committed,
    Aborted,
}

/// Why the lock manager aborted a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    LockOnShrinking,
    LockSharedOnReadUncommitted,
    UpgradeConflict,
    IncompatibleUpgrade,
    AttemptedIntentionLockOnRow,
    TableLockNotPresent,
    AttemptedUnlockButNoLockHeld,
    TableUnlockedBeforeUnlockingRows,
    Deadlock,
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            AbortReason::LockOnShrinking => "lock requested while shrinking",
            AbortReason::LockSharedOnReadUncommitted => {
                "shared lock requested under READ UNCOMMITTED"
            }
            AbortReason::UpgradeConflict => "another transaction is already upgrading",
            AbortReason::IncompatibleUpgrade => "incompatible lock upgrade",
            AbortReason::AttemptedIntentionLockOnRow => "intention lock requested on a row",
            AbortReason::TableLockNotPresent => "row lock without a covering table lock",
            AbortReason::AttemptedUnlockButNoLockHeld => "unlock without a held lock",
            AbortReason::TableUnlockedBeforeUnlockingRows => "table unlocked before its rows",
            AbortReason::Deadlock => "deadlock victim",
        };
        write!(f, "{}", text)
    }
}

/// Errors surfaced by the transaction and lock layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error("transaction {0} aborted: {1}")]
    Abort(TxnId, AbortReason),

    #[error("transaction {0} is not active")]
    InvalidState(TxnId),

    #[error("internal transaction error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, TransactionError>;

/// Held-lock bookkeeping, one set per granularity and mode.
#[derive(Debug, Default)]
pub struct LockSets {
    pub shared_tables: HashSet<TableOid>,
    pub exclusive_tables: HashSet<TableOid>,
    pub intention_shared_tables: HashSet<TableOid>,
    pub intention_exclusive_tables: HashSet<TableOid>,
    pub shared_intention_exclusive_tables: HashSet<TableOid>,
    pub shared_rows: HashMap<TableOid, HashSet<Rid>>,
    pub exclusive_rows: HashMap<TableOid, HashSet<Rid>>,
}

pub struct Transaction {
    id: TxnId,
    isolation_level: IsolationLevel,
    state: Mutex<TransactionState>,
    lock_sets: Mutex<LockSets>,
}

impl Transaction {
    pub fn new(id: TxnId, isolation_level: IsolationLevel) -> Self {
        Self {
            id,
            isolation_level,
            state: Mutex::new(TransactionState::Growing),
            lock_sets: Mutex::new(LockSets::default()),
        }
    }

    pub fn id(&self) -> TxnId {
        self.id
    }

    pub fn isolation_level(&self) -> IsolationLevel {
        self.isolation_level
    }

    pub fn state(&self) -> TransactionState {
        *self.state.lock()
    }

    pub fn set_state(&self, state: TransactionState) {
        *self.state.lock() = state;
    }

    /// Enter Shrinking unless the transaction already reached a terminal
    /// state.
    pub fn begin_shrinking(&self) {
        let mut state = self.state.lock();
        if *state != TransactionState::Committed && *state != TransactionState::Aborted {
            *state = TransactionState::Shrinking;
        }
    }

    pub fn with_lock_sets<R>(&self, f: impl FnOnce(&mut LockSets) -> R) -> R {
        f(&mut self.lock_sets.lock())
    }

    pub fn record_table_lock(&self, mode: LockMode, oid: TableOid, held: bool) {
        let mut sets = self.lock_sets.lock();
        let set = match mode {
            LockMode::Shared => &mut sets.shared_tables,
            LockMode::Exclusive => &mut sets.exclusive_tables,
            LockMode::IntentionShared => &mut sets.intention_shared_tables,
            LockMode::IntentionExclusive => &mut sets.intention_exclusive_tables,
            LockMode::SharedIntentionExclusive => &mut sets.shared_intention_exclusive_tables,
        };
        if held {
            set.insert(oid);
        } else {
            set.remove(&oid);
        }
    }

    pub fn record_row_lock(&self, mode: LockMode, oid: TableOid, rid: Rid, held: bool) {
        let mut sets = self.lock_sets.lock();
        let map = match mode {
            LockMode::Shared => &mut sets.shared_rows,
            LockMode::Exclusive => &mut sets.exclusive_rows,
            _ => return,
        };
        if held {
            map.entry(oid).or_default().insert(rid);
        } else if let Some(rows) = map.get_mut(&oid) {
            rows.remove(&rid);
            if rows.is_empty() {
                map.remove(&oid);
            }
        }
    }

    /// True when the transaction still holds row locks on the table.
    pub fn holds_row_locks_on(&self, oid: TableOid) -> bool {
        let sets = self.lock_sets.lock();
        sets.shared_rows.get(&oid).map_or(false, |rows| !rows.is_empty())
            || sets.exclusive_rows.get(&oid).map_or(false, |rows| !rows.is_empty())
    }

    /// True when the table is held in a mode that covers exclusive row
    /// access (X, IX or SIX).
    pub fn holds_exclusive_capable_table_lock(&self, oid: TableOid) -> bool {
        let sets = self.lock_sets.lock();
        sets.exclusive_tables.contains(&oid)
            || sets.intention_exclusive_tables.contains(&oid)
            || sets.shared_intention_exclusive_tables.contains(&oid)
    }

    pub fn holds_table_lock(&self, oid: TableOid) -> bool {
        let sets = self.lock_sets.lock();
        sets.shared_tables.contains(&oid)
            || sets.exclusive_tables.contains(&oid)
            || sets.intention_shared_tables.contains(&oid)
            || sets.intention_exclusive_tables.contains(&oid)
            || sets.shared_intention_exclusive_tables.contains(&oid)
    }

    /// True when the row is still held in Shared mode (an upgrade to X
    /// moves it out of the shared set).
    pub fn holds_shared_row_lock(&self, oid: TableOid, rid: Rid) -> bool {
        let sets = self.lock_sets.lock();
        sets.shared_rows.get(&oid).map_or(false, |rows| rows.contains(&rid))
    }

    /// True when the table is still held in IntentionShared mode.
    pub fn holds_intention_shared_table_lock(&self, oid: TableOid) -> bool {
        self.lock_sets.lock().intention_shared_tables.contains(&oid)
    }

    pub fn holds_row_lock(&self, oid: TableOid, rid: Rid) -> bool {
        let sets = self.lock_sets.lock();
        sets.shared_rows.get(&oid).map_or(false, |rows| rows.contains(&rid))
            || sets.exclusive_rows.get(&oid).map_or(false, |rows| rows.contains(&rid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_transaction_is_growing() {
        let txn = Transaction::new(1, IsolationLevel::RepeatableRead);
        assert_eq!(txn.id(), 1);
        assert_eq!(txn.state(), TransactionState::Growing);
        assert_eq!(txn.isolation_level(), IsolationLevel::RepeatableRead);
    }

    #[test]
    fn test_shrinking_does_not_override_terminal_states() {
        let txn = Transaction::new(2, IsolationLevel::ReadCommitted);
        txn.begin_shrinking();
        assert_eq!(txn.state(), TransactionState::Shrinking);

        txn.set_state(TransactionState::Committed);
        txn.begin_shrinking();
        assert_eq!(txn.state(), TransactionState::Committed);

        let txn = Transaction::new(3, IsolationLevel::ReadCommitted);
        txn.set_state(TransactionState::Aborted);
        txn.begin_shrinking();
        assert_eq!(txn.state(), TransactionState::Aborted);
    }

    #[test]
    fn test_lock_set_bookkeeping() {
        let txn = Transaction::new(4, IsolationLevel::RepeatableRead);
        txn.record_table_lock(LockMode::IntentionExclusive, 10, true);
        assert!(txn.holds_table_lock(10));
        assert!(txn.holds_exclusive_capable_table_lock(10));

        let rid = Rid::new(5, 1);
        txn.record_row_lock(LockMode::Exclusive, 10, rid, true);
        assert!(txn.holds_row_locks_on(10));
        assert!(txn.holds_row_lock(10, rid));

        txn.record_row_lock(LockMode::Exclusive, 10, rid, false);
        assert!(!txn.holds_row_locks_on(10));

        txn.record_table_lock(LockMode::IntentionExclusive, 10, false);
        assert!(!txn.holds_table_lock(10));
    }
}
