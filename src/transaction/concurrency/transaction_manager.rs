// Transaction Manager
//
// Issues transaction ids, tracks active transactions, and drives
// commit/abort: both transition the state and hand every held lock back
// to the lock manager.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::common::types::TxnId;
use crate::transaction::concurrency::lock_manager::LockManager;
use crate::transaction::concurrency::transaction::{
    IsolationLevel, Result, Transaction, TransactionError, TransactionState,
};

pub struct TransactionManager {
    next_txn_id: AtomicU32,
    lock_manager: Arc<LockManager>,
    active_transactions: Mutex<HashMap<TxnId, Arc<Transaction>>>,
}

impl TransactionManager {
    /// Create the manager and register it with the lock manager's
    /// deadlock detector.
    pub fn new(lock_manager: Arc<LockManager>) -> Arc<Self> {
        let manager = Arc::new(Self {
            next_txn_id: AtomicU32::new(1),
            lock_manager,
            active_transactions: Mutex::new(HashMap::new()),
        });
        manager.lock_manager.bind_transaction_manager(&manager);
        manager
    }

    /// Begin a new transaction in the Growing state.
    pub fn begin(&self, isolation_level: IsolationLevel) -> Arc<Transaction> {
        let txn_id = self.next_txn_id.fetch_add(1, Ordering::SeqCst);
        let txn = Arc::new(Transaction::new(txn_id, isolation_level));
        self.active_transactions.lock().insert(txn_id, txn.clone());
        txn
    }

    pub fn get_transaction(&self, txn_id: TxnId) -> Option<Arc<Transaction>> {
        self.active_transactions.lock().get(&txn_id).cloned()
    }

    /// Commit: terminal state first, then release every lock.
    pub fn commit(&self, txn: &Arc<Transaction>) -> Result<()> {
        match txn.state() {
            TransactionState::Committed | TransactionState::Aborted => {
                return Err(TransactionError::InvalidState(txn.id()));
            }
            _ => {}
        }
        txn.set_state(TransactionState::Committed);
        self.lock_manager.release_all_locks(txn);
        self.active_transactions.lock().remove(&txn.id());
        Ok(())
    }

    /// Abort: also valid for transactions the deadlock detector already
    /// flipped to Aborted; their locks still need releasing.
    pub fn abort(&self, txn: &Arc<Transaction>) -> Result<()> {
        if txn.state() == TransactionState::Committed {
            return Err(TransactionError::InvalidState(txn.id()));
        }
        txn.set_state(TransactionState::Aborted);
        self.lock_manager.release_all_locks(txn);
        self.active_transactions.lock().remove(&txn.id());
        Ok(())
    }

    pub fn active_transaction_ids(&self) -> Vec<TxnId> {
        self.active_transactions.lock().keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn test_manager() -> Arc<TransactionManager> {
        TransactionManager::new(LockManager::new(Duration::from_millis(50)))
    }

    #[test]
    fn test_begin_assigns_monotonic_ids() {
        let manager = test_manager();
        let t1 = manager.begin(IsolationLevel::ReadCommitted);
        let t2 = manager.begin(IsolationLevel::RepeatableRead);
        assert_eq!(t1.id(), 1);
        assert_eq!(t2.id(), 2);
        assert!(manager.get_transaction(1).is_some());
        assert!(manager.get_transaction(2).is_some());
    }

    #[test]
    fn test_commit_and_double_commit() {
        let manager = test_manager();
        let txn = manager.begin(IsolationLevel::ReadCommitted);
        manager.commit(&txn).unwrap();
        assert_eq!(txn.state(), TransactionState::Committed);
        assert!(manager.get_transaction(txn.id()).is_none());
        assert_eq!(manager.commit(&txn), Err(TransactionError::InvalidState(txn.id())));
    }

    #[test]
    fn test_abort_of_deadlock_victim_is_allowed() {
        let manager = test_manager();
        let txn = manager.begin(IsolationLevel::RepeatableRead);
        txn.set_state(TransactionState::Aborted);
        manager.abort(&txn).unwrap();
        assert_eq!(txn.state(), TransactionState::Aborted);
        assert!(manager.get_transaction(txn.id()).is_none());
    }
}
