use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use taigadb::common::types::Rid;
use taigadb::transaction::concurrency::lock_manager::{LockManager, LockMode};
use taigadb::transaction::concurrency::transaction::{
    AbortReason, IsolationLevel, TransactionError, TransactionState,
};
use taigadb::transaction::concurrency::transaction_manager::TransactionManager;

fn setup() -> (Arc<LockManager>, Arc<TransactionManager>) {
    let lock_manager = LockManager::new(Duration::from_millis(20));
    let txn_manager = TransactionManager::new(lock_manager.clone());
    (lock_manager, txn_manager)
}

const TABLE_A: u32 = 1;

#[test]
fn test_shared_locks_coexist() {
    let (lm, tm) = setup();
    let t1 = tm.begin(IsolationLevel::RepeatableRead);
    let t2 = tm.begin(IsolationLevel::RepeatableRead);

    lm.lock_table(&t1, LockMode::Shared, TABLE_A).unwrap();
    lm.lock_table(&t2, LockMode::Shared, TABLE_A).unwrap();
    assert!(t1.holds_table_lock(TABLE_A));
    assert!(t2.holds_table_lock(TABLE_A));

    tm.commit(&t1).unwrap();
    tm.commit(&t2).unwrap();
}

#[test]
fn test_intention_shared_locks_coexist() {
    let (lm, tm) = setup();
    let t1 = tm.begin(IsolationLevel::RepeatableRead);
    let t2 = tm.begin(IsolationLevel::RepeatableRead);

    lm.lock_table(&t1, LockMode::IntentionShared, TABLE_A).unwrap();
    lm.lock_table(&t2, LockMode::IntentionShared, TABLE_A).unwrap();

    tm.commit(&t1).unwrap();
    tm.commit(&t2).unwrap();
}

#[test]
fn test_exclusive_blocks_until_shared_released() {
    let (lm, tm) = setup();
    let t1 = tm.begin(IsolationLevel::RepeatableRead);
    let t2 = tm.begin(IsolationLevel::RepeatableRead);

    lm.lock_table(&t1, LockMode::Shared, TABLE_A).unwrap();

    let acquired = Arc::new(AtomicBool::new(false));
    let waiter = {
        let lm = lm.clone();
        let t2 = t2.clone();
        let acquired = acquired.clone();
        thread::spawn(move || {
            lm.lock_table(&t2, LockMode::Exclusive, TABLE_A).unwrap();
            acquired.store(true, Ordering::SeqCst);
        })
    };

    thread::sleep(Duration::from_millis(100));
    assert!(!acquired.load(Ordering::SeqCst), "X must wait behind S");

    lm.unlock_table(&t1, TABLE_A).unwrap();
    waiter.join().unwrap();
    assert!(acquired.load(Ordering::SeqCst));
    // REPEATABLE READ: the S unlock moved t1 to Shrinking.
    assert_eq!(t1.state(), TransactionState::Shrinking);

    tm.commit(&t1).unwrap();
    tm.commit(&t2).unwrap();
}

#[test]
fn test_lock_on_shrinking_aborts() {
    let (lm, tm) = setup();
    let txn = tm.begin(IsolationLevel::RepeatableRead);

    lm.lock_table(&txn, LockMode::Shared, TABLE_A).unwrap();
    lm.unlock_table(&txn, TABLE_A).unwrap();
    assert_eq!(txn.state(), TransactionState::Shrinking);

    let err = lm.lock_table(&txn, LockMode::Shared, TABLE_A).unwrap_err();
    assert_eq!(err, TransactionError::Abort(txn.id(), AbortReason::LockOnShrinking));
    assert_eq!(txn.state(), TransactionState::Aborted);
}

#[test]
fn test_read_committed_shrinks_only_on_exclusive_unlock() {
    let (lm, tm) = setup();
    let txn = tm.begin(IsolationLevel::ReadCommitted);

    lm.lock_table(&txn, LockMode::Shared, TABLE_A).unwrap();
    lm.unlock_table(&txn, TABLE_A).unwrap();
    assert_eq!(txn.state(), TransactionState::Growing);

    lm.lock_table(&txn, LockMode::Exclusive, TABLE_A).unwrap();
    lm.unlock_table(&txn, TABLE_A).unwrap();
    assert_eq!(txn.state(), TransactionState::Shrinking);
}

#[test]
fn test_read_uncommitted_rejects_shared() {
    let (lm, tm) = setup();
    let txn = tm.begin(IsolationLevel::ReadUncommitted);

    let err = lm.lock_table(&txn, LockMode::Shared, TABLE_A).unwrap_err();
    assert_eq!(
        err,
        TransactionError::Abort(txn.id(), AbortReason::LockSharedOnReadUncommitted)
    );
}

#[test]
fn test_upgrade_shared_to_exclusive() {
    let (lm, tm) = setup();
    let txn = tm.begin(IsolationLevel::RepeatableRead);

    lm.lock_table(&txn, LockMode::Shared, TABLE_A).unwrap();
    lm.lock_table(&txn, LockMode::Exclusive, TABLE_A).unwrap();
    assert!(txn.with_lock_sets(|sets| sets.shared_tables.is_empty()));
    assert!(txn.holds_exclusive_capable_table_lock(TABLE_A));

    tm.commit(&txn).unwrap();
}

#[test]
fn test_incompatible_upgrade_aborts() {
    let (lm, tm) = setup();
    let txn = tm.begin(IsolationLevel::RepeatableRead);

    lm.lock_table(&txn, LockMode::Shared, TABLE_A).unwrap();
    let err = lm.lock_table(&txn, LockMode::IntentionShared, TABLE_A).unwrap_err();
    assert_eq!(err, TransactionError::Abort(txn.id(), AbortReason::IncompatibleUpgrade));
}

#[test]
fn test_upgrade_waits_behind_other_holders() {
    let (lm, tm) = setup();
    let t1 = tm.begin(IsolationLevel::RepeatableRead);
    let t2 = tm.begin(IsolationLevel::RepeatableRead);

    lm.lock_table(&t1, LockMode::Shared, TABLE_A).unwrap();
    lm.lock_table(&t2, LockMode::Shared, TABLE_A).unwrap();

    let upgraded = Arc::new(AtomicBool::new(false));
    let upgrader = {
        let lm = lm.clone();
        let t1 = t1.clone();
        let upgraded = upgraded.clone();
        thread::spawn(move || {
            lm.lock_table(&t1, LockMode::Exclusive, TABLE_A).unwrap();
            upgraded.store(true, Ordering::SeqCst);
        })
    };

    thread::sleep(Duration::from_millis(100));
    assert!(!upgraded.load(Ordering::SeqCst), "upgrade must wait for t2's S");

    lm.unlock_table(&t2, TABLE_A).unwrap();
    upgrader.join().unwrap();
    assert!(upgraded.load(Ordering::SeqCst));

    tm.commit(&t1).unwrap();
    tm.commit(&t2).unwrap();
}

#[test]
fn test_fifo_fairness_no_overtaking() {
    // t2's X waits behind t1's S; t3's later IS must not overtake the X.
    let (lm, tm) = setup();
    let t1 = tm.begin(IsolationLevel::RepeatableRead);
    let t2 = tm.begin(IsolationLevel::RepeatableRead);
    let t3 = tm.begin(IsolationLevel::RepeatableRead);

    lm.lock_table(&t1, LockMode::Shared, TABLE_A).unwrap();

    let x_acquired = Arc::new(AtomicBool::new(false));
    let x_waiter = {
        let lm = lm.clone();
        let t2 = t2.clone();
        let x_acquired = x_acquired.clone();
        thread::spawn(move || {
            lm.lock_table(&t2, LockMode::Exclusive, TABLE_A).unwrap();
            x_acquired.store(true, Ordering::SeqCst);
        })
    };
    thread::sleep(Duration::from_millis(50));

    let is_acquired = Arc::new(AtomicBool::new(false));
    let is_waiter = {
        let lm = lm.clone();
        let t3 = t3.clone();
        let is_acquired = is_acquired.clone();
        thread::spawn(move || {
            lm.lock_table(&t3, LockMode::IntentionShared, TABLE_A).unwrap();
            is_acquired.store(true, Ordering::SeqCst);
        })
    };

    thread::sleep(Duration::from_millis(100));
    assert!(!x_acquired.load(Ordering::SeqCst));
    assert!(
        !is_acquired.load(Ordering::SeqCst),
        "IS arrived after X and must not overtake it"
    );

    lm.unlock_table(&t1, TABLE_A).unwrap();
    x_waiter.join().unwrap();
    assert!(x_acquired.load(Ordering::SeqCst));
    assert!(!is_acquired.load(Ordering::SeqCst));

    lm.unlock_table(&t2, TABLE_A).unwrap();
    is_waiter.join().unwrap();
    assert!(is_acquired.load(Ordering::SeqCst));
}

#[test]
fn test_row_lock_requires_covering_table_lock() {
    let (lm, tm) = setup();
    let txn = tm.begin(IsolationLevel::RepeatableRead);
    let rid = Rid::new(5, 3);

    let err = lm.lock_row(&txn, LockMode::Exclusive, TABLE_A, rid).unwrap_err();
    assert_eq!(err, TransactionError::Abort(txn.id(), AbortReason::TableLockNotPresent));
}

#[test]
fn test_intention_lock_on_row_rejected() {
    let (lm, tm) = setup();
    let txn = tm.begin(IsolationLevel::RepeatableRead);
    let rid = Rid::new(5, 3);

    let err = lm.lock_row(&txn, LockMode::IntentionShared, TABLE_A, rid).unwrap_err();
    assert_eq!(
        err,
        TransactionError::Abort(txn.id(), AbortReason::AttemptedIntentionLockOnRow)
    );
}

#[test]
fn test_table_unlock_blocked_by_row_locks() {
    let (lm, tm) = setup();
    let txn = tm.begin(IsolationLevel::RepeatableRead);
    let rid = Rid::new(5, 3);

    lm.lock_table(&txn, LockMode::IntentionExclusive, TABLE_A).unwrap();
    lm.lock_row(&txn, LockMode::Exclusive, TABLE_A, rid).unwrap();

    let err = lm.unlock_table(&txn, TABLE_A).unwrap_err();
    assert_eq!(
        err,
        TransactionError::Abort(txn.id(), AbortReason::TableUnlockedBeforeUnlockingRows)
    );
}

#[test]
fn test_unlock_without_lock_aborts() {
    let (lm, tm) = setup();
    let txn = tm.begin(IsolationLevel::RepeatableRead);

    let err = lm.unlock_table(&txn, 777).unwrap_err();
    assert_eq!(
        err,
        TransactionError::Abort(txn.id(), AbortReason::AttemptedUnlockButNoLockHeld)
    );
}

#[test]
fn test_deadlock_detector_aborts_youngest() {
    let (lm, tm) = setup();
    let t1 = tm.begin(IsolationLevel::RepeatableRead);
    let t2 = tm.begin(IsolationLevel::RepeatableRead);
    let r1 = Rid::new(9, 1);
    let r2 = Rid::new(9, 2);

    lm.lock_table(&t1, LockMode::IntentionExclusive, TABLE_A).unwrap();
    lm.lock_table(&t2, LockMode::IntentionExclusive, TABLE_A).unwrap();
    lm.lock_row(&t1, LockMode::Exclusive, TABLE_A, r1).unwrap();
    lm.lock_row(&t2, LockMode::Exclusive, TABLE_A, r2).unwrap();

    // t1 wants r2 (held by t2), t2 wants r1 (held by t1): a cycle. The
    // detector must abort t2, the younger transaction.
    let older = {
        let lm = lm.clone();
        let t1 = t1.clone();
        thread::spawn(move || lm.lock_row(&t1, LockMode::Exclusive, TABLE_A, r2))
    };
    thread::sleep(Duration::from_millis(30));
    let younger = {
        let lm = lm.clone();
        let t2 = t2.clone();
        thread::spawn(move || lm.lock_row(&t2, LockMode::Exclusive, TABLE_A, r1))
    };

    let younger_result = younger.join().unwrap();
    assert_eq!(
        younger_result,
        Err(TransactionError::Abort(t2.id(), AbortReason::Deadlock))
    );
    assert_eq!(t2.state(), TransactionState::Aborted);

    // Releasing the victim's locks unblocks the survivor.
    tm.abort(&t2).unwrap();
    older.join().unwrap().unwrap();
    assert_eq!(t1.state(), TransactionState::Growing);
    tm.commit(&t1).unwrap();
}
