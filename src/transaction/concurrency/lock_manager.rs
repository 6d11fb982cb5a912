// Lock Manager
//
// Hierarchical two-granularity locking (IS/IX/S/SIX/X on tables, S/X on
// rows) with strictly FIFO request queues, a single in-flight upgrade per
// queue, and a background thread that breaks deadlock cycles by aborting
// the youngest participant.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

use once_cell::sync::OnceCell;
use parking_lot::{Condvar, Mutex};

use crate::common::types::{Rid, TableOid, TxnId};
use crate::transaction::concurrency::transaction::{
    AbortReason, IsolationLevel, Result, Transaction, TransactionError, TransactionState,
};
use crate::transaction::concurrency::transaction_manager::TransactionManager;

/// Lock modes in the multi-granularity hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    IntentionShared,
    IntentionExclusive,
    Shared,
    SharedIntentionExclusive,
    Exclusive,
}

impl LockMode {
    /// The compatibility matrix.
    pub fn compatible_with(self, other: LockMode) -> bool {
        use LockMode::*;
        match (self, other) {
            (IntentionShared, Exclusive) | (Exclusive, IntentionShared) => false,
            (IntentionShared, _) | (_, IntentionShared) => true,
            (IntentionExclusive, IntentionExclusive) => true,
            (Shared, Shared) => true,
            _ => false,
        }
    }

    /// The permitted upgrade lattice: IS -> {S, X, IX, SIX},
    /// S -> {X, SIX}, IX -> {X, SIX}, SIX -> X.
    pub fn upgradable_to(self, target: LockMode) -> bool {
        use LockMode::*;
        match self {
            IntentionShared => {
                matches!(target, Shared | Exclusive | IntentionExclusive | SharedIntentionExclusive)
            }
            Shared | IntentionExclusive => {
                matches!(target, Exclusive | SharedIntentionExclusive)
            }
            SharedIntentionExclusive => matches!(target, Exclusive),
            Exclusive => false,
        }
    }
}

/// What a request locks: a whole table or a single row of one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LockTarget {
    Table(TableOid),
    Row(TableOid, Rid),
}

#[derive(Debug, Clone)]
struct LockRequest {
    txn_id: TxnId,
    mode: LockMode,
    granted: bool,
}

#[derive(Default)]
struct QueueState {
    requests: Vec<LockRequest>,
    upgrading: Option<TxnId>,
}

/// One FIFO queue per locked object. A waiting request is granted only
/// when it is compatible with every granted request and no earlier waiter
/// remains, which keeps grants starvation-free.
struct LockRequestQueue {
    state: Mutex<QueueState>,
    cv: Condvar,
}

impl LockRequestQueue {
    fn new() -> Self {
        Self { state: Mutex::new(QueueState::default()), cv: Condvar::new() }
    }
}

/// What an ungranted transaction is blocked on, recorded per detector
/// tick so the victim's queue can be woken.
#[derive(Debug, Clone, Copy)]
enum WaitTarget {
    Table(TableOid),
    Row(Rid),
}

struct LockManagerCore {
    table_lock_map: Mutex<HashMap<TableOid, Arc<LockRequestQueue>>>,
    row_lock_map: Mutex<HashMap<Rid, Arc<LockRequestQueue>>>,
    txn_registry: OnceCell<Weak<TransactionManager>>,
}

pub struct LockManager {
    core: Arc<LockManagerCore>,
    shutdown: Arc<(Mutex<bool>, Condvar)>,
    detector: Mutex<Option<JoinHandle<()>>>,
}

impl LockManager {
    /// Create the lock manager and start its cycle-detection thread,
    /// which runs every `cycle_detection_interval`.
    pub fn new(cycle_detection_interval: Duration) -> Arc<Self> {
        let core = Arc::new(LockManagerCore {
            table_lock_map: Mutex::new(HashMap::new()),
            row_lock_map: Mutex::new(HashMap::new()),
            txn_registry: OnceCell::new(),
        });
        let shutdown = Arc::new((Mutex::new(false), Condvar::new()));

        let manager = Arc::new(Self {
            core: core.clone(),
            shutdown: shutdown.clone(),
            detector: Mutex::new(None),
        });

        let handle = std::thread::spawn(move || loop {
            {
                let (flag, cv) = &*shutdown;
                let mut stop = flag.lock();
                if !*stop {
                    cv.wait_for(&mut stop, cycle_detection_interval);
                }
                if *stop {
                    break;
                }
            }
            core.run_cycle_detection();
        });
        *manager.detector.lock() = Some(handle);
        manager
    }

    /// Wire up the transaction registry the detector aborts victims
    /// through.
    pub fn bind_transaction_manager(&self, txn_manager: &Arc<TransactionManager>) {
        let _ = self.core.txn_registry.set(Arc::downgrade(txn_manager));
    }

    /// Run one cycle-detection pass synchronously.
    pub fn run_cycle_detection(&self) {
        self.core.run_cycle_detection();
    }

    pub fn lock_table(&self, txn: &Arc<Transaction>, mode: LockMode, oid: TableOid) -> Result<()> {
        self.check_table_request(txn, mode)?;
        let queue = {
            let mut map = self.core.table_lock_map.lock();
            map.entry(oid).or_insert_with(|| Arc::new(LockRequestQueue::new())).clone()
        };
        self.acquire(txn, mode, LockTarget::Table(oid), &queue)
    }

    pub fn lock_row(
        &self,
        txn: &Arc<Transaction>,
        mode: LockMode,
        oid: TableOid,
        rid: Rid,
    ) -> Result<()> {
        self.check_row_request(txn, mode, oid)?;
        let queue = {
            let mut map = self.core.row_lock_map.lock();
            map.entry(rid).or_insert_with(|| Arc::new(LockRequestQueue::new())).clone()
        };
        self.acquire(txn, mode, LockTarget::Row(oid, rid), &queue)
    }

    pub fn unlock_table(&self, txn: &Arc<Transaction>, oid: TableOid) -> Result<()> {
        let queue = {
            let map = self.core.table_lock_map.lock();
            map.get(&oid).cloned()
        };
        let queue = match queue {
            Some(queue) => queue,
            None => return Err(abort_txn(txn, AbortReason::AttemptedUnlockButNoLockHeld)),
        };

        // Every row lock under this table must go first.
        if txn.holds_row_locks_on(oid) {
            return Err(abort_txn(txn, AbortReason::TableUnlockedBeforeUnlockingRows));
        }

        let removed = {
            let mut state = queue.state.lock();
            match state.requests.iter().position(|r| r.txn_id == txn.id() && r.granted) {
                Some(pos) => {
                    let request = state.requests.remove(pos);
                    queue.cv.notify_all();
                    Some(request.mode)
                }
                None => None,
            }
        };

        match removed {
            Some(mode) => {
                if shrinks(txn.isolation_level(), mode) {
                    txn.begin_shrinking();
                }
                txn.record_table_lock(mode, oid, false);
                Ok(())
            }
            None => Err(abort_txn(txn, AbortReason::AttemptedUnlockButNoLockHeld)),
        }
    }

    pub fn unlock_row(&self, txn: &Arc<Transaction>, oid: TableOid, rid: Rid) -> Result<()> {
        let queue = {
            let map = self.core.row_lock_map.lock();
            map.get(&rid).cloned()
        };
        let queue = match queue {
            Some(queue) => queue,
            None => return Err(abort_txn(txn, AbortReason::AttemptedUnlockButNoLockHeld)),
        };

        let removed = {
            let mut state = queue.state.lock();
            match state.requests.iter().position(|r| r.txn_id == txn.id() && r.granted) {
                Some(pos) => {
                    let request = state.requests.remove(pos);
                    queue.cv.notify_all();
                    Some(request.mode)
                }
                None => None,
            }
        };

        match removed {
            Some(mode) => {
                if shrinks(txn.isolation_level(), mode) {
                    txn.begin_shrinking();
                }
                txn.record_row_lock(mode, oid, rid, false);
                Ok(())
            }
            None => Err(abort_txn(txn, AbortReason::AttemptedUnlockButNoLockHeld)),
        }
    }

    /// Drop every lock a finished transaction still holds, waking the
    /// queues. Terminal transactions skip the 2PL state transition.
    pub fn release_all_locks(&self, txn: &Arc<Transaction>) {
        let (rows, tables) = txn.with_lock_sets(|sets| {
            let mut rows: Vec<(LockMode, TableOid, Rid)> = Vec::new();
            for (oid, rids) in &sets.shared_rows {
                rows.extend(rids.iter().map(|r| (LockMode::Shared, *oid, *r)));
            }
            for (oid, rids) in &sets.exclusive_rows {
                rows.extend(rids.iter().map(|r| (LockMode::Exclusive, *oid, *r)));
            }
            let mut tables: Vec<(LockMode, TableOid)> = Vec::new();
            tables.extend(sets.shared_tables.iter().map(|o| (LockMode::Shared, *o)));
            tables.extend(sets.exclusive_tables.iter().map(|o| (LockMode::Exclusive, *o)));
            tables.extend(sets.intention_shared_tables.iter().map(|o| (LockMode::IntentionShared, *o)));
            tables.extend(
                sets.intention_exclusive_tables.iter().map(|o| (LockMode::IntentionExclusive, *o)),
            );
            tables.extend(
                sets.shared_intention_exclusive_tables
                    .iter()
                    .map(|o| (LockMode::SharedIntentionExclusive, *o)),
            );
            (rows, tables)
        });

        for (mode, oid, rid) in rows {
            let queue = self.core.row_lock_map.lock().get(&rid).cloned();
            if let Some(queue) = queue {
                let mut state = queue.state.lock();
                if let Some(pos) = state.requests.iter().position(|r| r.txn_id == txn.id()) {
                    state.requests.remove(pos);
                    queue.cv.notify_all();
                }
            }
            txn.record_row_lock(mode, oid, rid, false);
        }
        for (mode, oid) in tables {
            let queue = self.core.table_lock_map.lock().get(&oid).cloned();
            if let Some(queue) = queue {
                let mut state = queue.state.lock();
                if let Some(pos) = state.requests.iter().position(|r| r.txn_id == txn.id()) {
                    state.requests.remove(pos);
                    queue.cv.notify_all();
                }
            }
            txn.record_table_lock(mode, oid, false);
        }
    }

    // ---- request validation ----

    fn check_table_request(&self, txn: &Arc<Transaction>, mode: LockMode) -> Result<()> {
        use LockMode::*;
        match txn.isolation_level() {
            IsolationLevel::ReadUncommitted => {
                if matches!(mode, Shared | IntentionShared | SharedIntentionExclusive) {
                    return Err(abort_txn(txn, AbortReason::LockSharedOnReadUncommitted));
                }
                if txn.state() == TransactionState::Shrinking
                    && matches!(mode, Exclusive | IntentionExclusive)
                {
                    return Err(abort_txn(txn, AbortReason::LockOnShrinking));
                }
            }
            IsolationLevel::ReadCommitted => {
                if txn.state() == TransactionState::Shrinking
                    && !matches!(mode, IntentionShared | Shared)
                {
                    return Err(abort_txn(txn, AbortReason::LockOnShrinking));
                }
            }
            IsolationLevel::RepeatableRead => {
                if txn.state() == TransactionState::Shrinking {
                    return Err(abort_txn(txn, AbortReason::LockOnShrinking));
                }
            }
        }
        Ok(())
    }

    fn check_row_request(
        &self,
        txn: &Arc<Transaction>,
        mode: LockMode,
        oid: TableOid,
    ) -> Result<()> {
        match mode {
            LockMode::IntentionShared
            | LockMode::IntentionExclusive
            | LockMode::SharedIntentionExclusive => {
                return Err(abort_txn(txn, AbortReason::AttemptedIntentionLockOnRow));
            }
            LockMode::Exclusive => {
                if !txn.holds_exclusive_capable_table_lock(oid) {
                    return Err(abort_txn(txn, AbortReason::TableLockNotPresent));
                }
            }
            // A shared row lock carries no table-lock precondition.
            LockMode::Shared => {}
        }

        match txn.isolation_level() {
            IsolationLevel::ReadUncommitted => {
                if mode == LockMode::Shared {
                    return Err(abort_txn(txn, AbortReason::LockSharedOnReadUncommitted));
                }
                if txn.state() == TransactionState::Shrinking && mode == LockMode::Exclusive {
                    return Err(abort_txn(txn, AbortReason::LockOnShrinking));
                }
            }
            IsolationLevel::ReadCommitted => {
                if txn.state() == TransactionState::Shrinking && mode != LockMode::Shared {
                    return Err(abort_txn(txn, AbortReason::LockOnShrinking));
                }
            }
            IsolationLevel::RepeatableRead => {
                if txn.state() == TransactionState::Shrinking {
                    return Err(abort_txn(txn, AbortReason::LockOnShrinking));
                }
            }
        }
        Ok(())
    }

    // ---- queue protocol ----

    /// Enqueue (or upgrade) a request, block until granted, and record the
    /// lock. A wake-up that finds the transaction aborted unwinds the
    /// request and fails with a deadlock abort.
    fn acquire(
        &self,
        txn: &Arc<Transaction>,
        mode: LockMode,
        target: LockTarget,
        queue: &Arc<LockRequestQueue>,
    ) -> Result<()> {
        let mut state = queue.state.lock();
        let mut upgrading = false;

        if let Some(pos) = state.requests.iter().position(|r| r.txn_id == txn.id()) {
            let held = state.requests[pos].mode;
            if held == mode {
                return Ok(());
            }
            if state.upgrading.is_some() {
                drop(state);
                return Err(abort_txn(txn, AbortReason::UpgradeConflict));
            }
            if !held.upgradable_to(mode) {
                drop(state);
                return Err(abort_txn(txn, AbortReason::IncompatibleUpgrade));
            }

            // Replace the held request: the upgrade goes ahead of every
            // waiter but behind everything already granted.
            state.requests.remove(pos);
            match target {
                LockTarget::Table(oid) => txn.record_table_lock(held, oid, false),
                LockTarget::Row(oid, rid) => txn.record_row_lock(held, oid, rid, false),
            }
            let insert_pos = state
                .requests
                .iter()
                .position(|r| !r.granted)
                .unwrap_or(state.requests.len());
            state
                .requests
                .insert(insert_pos, LockRequest { txn_id: txn.id(), mode, granted: false });
            state.upgrading = Some(txn.id());
            upgrading = true;
        } else {
            state.requests.push(LockRequest { txn_id: txn.id(), mode, granted: false });
        }

        while !grantable(&state, txn.id(), mode) {
            queue.cv.wait(&mut state);
            if txn.state() == TransactionState::Aborted {
                if upgrading {
                    state.upgrading = None;
                }
                if let Some(pos) = state.requests.iter().position(|r| r.txn_id == txn.id()) {
                    state.requests.remove(pos);
                }
                queue.cv.notify_all();
                drop(state);
                return Err(TransactionError::Abort(txn.id(), AbortReason::Deadlock));
            }
        }

        if upgrading {
            state.upgrading = None;
        }
        if let Some(request) = state.requests.iter_mut().find(|r| r.txn_id == txn.id()) {
            request.granted = true;
        }
        match target {
            LockTarget::Table(oid) => txn.record_table_lock(mode, oid, true),
            LockTarget::Row(oid, rid) => txn.record_row_lock(mode, oid, rid, true),
        }
        // A non-exclusive grant may admit compatible waiters behind it.
        if mode != LockMode::Exclusive {
            queue.cv.notify_all();
        }
        Ok(())
    }
}

impl Drop for LockManager {
    fn drop(&mut self) {
        {
            let (flag, cv) = &*self.shutdown;
            *flag.lock() = true;
            cv.notify_all();
        }
        if let Some(handle) = self.detector.lock().take() {
            let _ = handle.join();
        }
    }
}

/// Grant test: every request ahead of ours must already be granted and
/// compatible with the requested mode.
fn grantable(state: &QueueState, txn_id: TxnId, mode: LockMode) -> bool {
    for request in &state.requests {
        if request.txn_id == txn_id {
            return true;
        }
        if !request.granted {
            return false;
        }
        if !mode.compatible_with(request.mode) {
            return false;
        }
    }
    false
}

/// The 2PL shrink rule: REPEATABLE READ shrinks on any S/X unlock, the
/// weaker levels only on X.
fn shrinks(isolation_level: IsolationLevel, mode: LockMode) -> bool {
    match isolation_level {
        IsolationLevel::RepeatableRead => {
            matches!(mode, LockMode::Shared | LockMode::Exclusive)
        }
        IsolationLevel::ReadCommitted | IsolationLevel::ReadUncommitted => {
            mode == LockMode::Exclusive
        }
    }
}

fn abort_txn(txn: &Arc<Transaction>, reason: AbortReason) -> TransactionError {
    txn.set_state(TransactionState::Aborted);
    TransactionError::Abort(txn.id(), reason)
}

impl LockManagerCore {
    /// One detector tick: snapshot the waits-for graph under the map and
    /// queue latches, then abort the youngest transaction of every cycle
    /// and wake the queue it is blocked on.
    fn run_cycle_detection(&self) {
        let mut waits_for: BTreeMap<TxnId, Vec<TxnId>> = BTreeMap::new();
        let mut waits_on: HashMap<TxnId, WaitTarget> = HashMap::new();

        {
            let table_map = self.table_lock_map.lock();
            let row_map = self.row_lock_map.lock();

            for (oid, queue) in table_map.iter() {
                let state = queue.state.lock();
                collect_edges(&state, &mut waits_for, |txn_id| {
                    waits_on.insert(txn_id, WaitTarget::Table(*oid));
                });
            }
            for (rid, queue) in row_map.iter() {
                let state = queue.state.lock();
                collect_edges(&state, &mut waits_for, |txn_id| {
                    waits_on.insert(txn_id, WaitTarget::Row(*rid));
                });
            }
        }

        loop {
            let victim = match find_cycle_victim(&waits_for) {
                Some(victim) => victim,
                None => break,
            };
            log::debug!("deadlock cycle found; aborting youngest transaction {}", victim);

            if let Some(manager) = self.txn_registry.get().and_then(Weak::upgrade) {
                if let Some(txn) = manager.get_transaction(victim) {
                    txn.set_state(TransactionState::Aborted);
                }
            }

            waits_for.remove(&victim);
            for edges in waits_for.values_mut() {
                edges.retain(|&t| t != victim);
            }

            // Wake the victim's queue so its blocked thread observes the
            // abort and unwinds.
            if let Some(target) = waits_on.get(&victim) {
                let queue = match target {
                    WaitTarget::Table(oid) => self.table_lock_map.lock().get(oid).cloned(),
                    WaitTarget::Row(rid) => self.row_lock_map.lock().get(rid).cloned(),
                };
                if let Some(queue) = queue {
                    let _state = queue.state.lock();
                    queue.cv.notify_all();
                }
            }
        }
    }
}

/// Each ungranted request waits for every request granted ahead of it in
/// the same queue.
fn collect_edges(
    state: &QueueState,
    waits_for: &mut BTreeMap<TxnId, Vec<TxnId>>,
    mut record_wait: impl FnMut(TxnId),
) {
    let mut granted: Vec<TxnId> = Vec::new();
    for request in &state.requests {
        if request.granted {
            granted.push(request.txn_id);
        } else {
            record_wait(request.txn_id);
            for &holder in &granted {
                waits_for.entry(request.txn_id).or_default().push(holder);
                waits_for.entry(holder).or_default();
            }
        }
    }
}

/// DFS from each transaction in ascending id order, visiting successors
/// in ascending order. On a back-edge, the victim is the youngest
/// transaction on the active path.
fn find_cycle_victim(waits_for: &BTreeMap<TxnId, Vec<TxnId>>) -> Option<TxnId> {
    let mut safe: HashSet<TxnId> = HashSet::new();
    for &start in waits_for.keys() {
        let mut active: HashSet<TxnId> = HashSet::new();
        if dfs(start, waits_for, &mut safe, &mut active) {
            return active.iter().copied().max();
        }
    }
    None
}

fn dfs(
    txn_id: TxnId,
    waits_for: &BTreeMap<TxnId, Vec<TxnId>>,
    safe: &mut HashSet<TxnId>,
    active: &mut HashSet<TxnId>,
) -> bool {
    if safe.contains(&txn_id) {
        return false;
    }
    if !active.insert(txn_id) {
        return true;
    }
    let mut successors = waits_for.get(&txn_id).cloned().unwrap_or_default();
    successors.sort_unstable();
    successors.dedup();
    for next in successors {
        if dfs(next, waits_for, safe, active) {
            return true;
        }
    }
    active.remove(&txn_id);
    safe.insert(txn_id);
    false
}
