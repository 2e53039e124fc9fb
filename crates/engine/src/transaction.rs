//! Single-writer transaction coordinator: snapshot-on-first-touch, deferred
//! operation log, replay-to-commit, restore-to-rollback.

use litestore_core::error::{Error, Result};
use litestore_core::value::Value;
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// Whether a buffered write replaces or extends a table's contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Replace the table's full contents.
    Overwrite,
    /// Extend the table's existing contents.
    Append,
}

/// One buffered mutation, deferred until commit.
#[derive(Debug, Clone)]
pub enum Operation {
    /// A `write` call.
    Write {
        /// Target table.
        table: String,
        /// Records to write.
        data: Vec<Value>,
        /// Overwrite or append.
        mode: WriteMode,
    },
    /// A `delete` call.
    Delete {
        /// Target table.
        table: String,
        /// Parsed-at-replay-time filter object.
        filter: Value,
    },
    /// A `bulkWrite` call.
    BulkWrite {
        /// Target table.
        table: String,
        /// Raw bulk operation descriptors, interpreted by the caller.
        operations: Vec<Value>,
    },
}

/// `Idle` or `Active`; only one transaction may be open at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// No transaction in progress.
    Idle,
    /// A transaction is open and buffering operations.
    Active,
}

struct CoordinatorState {
    status: TransactionState,
    operations: Vec<Operation>,
    snapshots: BTreeMap<String, Vec<Value>>,
}

/// Owns the single active transaction, if any.
pub struct TransactionCoordinator {
    state: Mutex<CoordinatorState>,
}

impl Default for TransactionCoordinator {
    fn default() -> Self {
        TransactionCoordinator {
            state: Mutex::new(CoordinatorState {
                status: TransactionState::Idle,
                operations: Vec::new(),
                snapshots: BTreeMap::new(),
            }),
        }
    }
}

impl TransactionCoordinator {
    /// Construct an idle coordinator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a transaction is currently open.
    pub fn is_active(&self) -> bool {
        self.state.lock().status == TransactionState::Active
    }

    /// Open a transaction. Fails with `Conflict` if one is already active.
    pub fn begin(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.status == TransactionState::Active {
            return Err(Error::conflict("a transaction is already in progress"));
        }
        state.status = TransactionState::Active;
        state.operations.clear();
        state.snapshots.clear();
        Ok(())
    }

    /// Buffer `op`. The caller must have already called `save_snapshot` for
    /// every table the op touches, per the coordinator's invariant.
    pub fn add_operation(&self, op: Operation) -> Result<()> {
        let mut state = self.state.lock();
        if state.status != TransactionState::Active {
            return Err(Error::conflict("no transaction is in progress"));
        }
        state.operations.push(op);
        Ok(())
    }

    /// Snapshot `table`'s current records, once. Later calls for the same
    /// table within this transaction are no-ops (first call wins).
    pub fn save_snapshot(&self, table: &str, records: Vec<Value>) -> Result<()> {
        let mut state = self.state.lock();
        if state.status != TransactionState::Active {
            return Err(Error::conflict("no transaction is in progress"));
        }
        state.snapshots.entry(table.to_string()).or_insert(records);
        Ok(())
    }

    /// The snapshot captured for `table`, if this transaction has touched it.
    /// Readers during an active transaction use this to see pre-transaction
    /// state.
    pub fn snapshot_for(&self, table: &str) -> Option<Vec<Value>> {
        self.state.lock().snapshots.get(table).cloned()
    }

    /// Replay every buffered operation through the caller-supplied mutation
    /// functions, in order. On the first failure, the coordinator unwinds to
    /// `Idle` without reverting any already-applied op; the caller must
    /// invoke `rollback` separately (before this call) if restoration is
    /// still desired — by the time `commit` fails partway, the coordinator
    /// has already dropped its snapshots here, so `rollback` must be called
    /// before `commit`, not after a failed one.
    pub fn commit(
        &self,
        mut write_fn: impl FnMut(&str, &[Value], WriteMode) -> Result<()>,
        mut delete_fn: impl FnMut(&str, &Value) -> Result<()>,
        mut bulk_fn: impl FnMut(&str, &[Value]) -> Result<()>,
    ) -> Result<()> {
        let operations = {
            let mut state = self.state.lock();
            if state.status != TransactionState::Active {
                return Err(Error::conflict("no transaction is in progress"));
            }
            state.operations.clone()
        };

        let replay_result = (|| -> Result<()> {
            for op in &operations {
                match op {
                    Operation::Write { table, data, mode } => write_fn(table, data, *mode)?,
                    Operation::Delete { table, filter } => delete_fn(table, filter)?,
                    Operation::BulkWrite { table, operations } => bulk_fn(table, operations)?,
                }
            }
            Ok(())
        })();

        let mut state = self.state.lock();
        state.status = TransactionState::Idle;
        state.operations.clear();
        state.snapshots.clear();
        replay_result
    }

    /// Restore every snapshotted table via `restore_fn` (table name, saved
    /// records), then reset to `Idle`. Always resets to `Idle`, even if
    /// `restore_fn` fails partway, per the propagation policy.
    pub fn rollback(&self, mut restore_fn: impl FnMut(&str, &[Value]) -> Result<()>) -> Result<()> {
        let snapshots = {
            let mut state = self.state.lock();
            if state.status != TransactionState::Active {
                return Err(Error::conflict("no transaction is in progress"));
            }
            std::mem::take(&mut state.snapshots)
        };

        let restore_result = (|| -> Result<()> {
            for (table, records) in &snapshots {
                restore_fn(table, records)?;
            }
            Ok(())
        })();

        let mut state = self.state.lock();
        state.status = TransactionState::Idle;
        state.operations.clear();
        state.snapshots.clear();
        restore_result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_twice_conflicts() {
        let coordinator = TransactionCoordinator::new();
        coordinator.begin().unwrap();
        assert!(coordinator.begin().unwrap_err().is_conflict());
    }

    #[test]
    fn snapshot_first_call_wins() {
        let coordinator = TransactionCoordinator::new();
        coordinator.begin().unwrap();
        coordinator.save_snapshot("users", vec![Value::Int(1)]).unwrap();
        coordinator.save_snapshot("users", vec![Value::Int(2)]).unwrap();
        assert_eq!(coordinator.snapshot_for("users"), Some(vec![Value::Int(1)]));
    }

    #[test]
    fn commit_replays_ops_in_order_and_resets_to_idle() {
        let coordinator = TransactionCoordinator::new();
        coordinator.begin().unwrap();
        coordinator.save_snapshot("users", vec![]).unwrap();
        coordinator
            .add_operation(Operation::Write { table: "users".into(), data: vec![Value::Int(1)], mode: WriteMode::Append })
            .unwrap();
        coordinator
            .add_operation(Operation::Delete { table: "users".into(), filter: Value::empty_object() })
            .unwrap();

        let mut writes = Vec::new();
        let mut deletes = Vec::new();
        coordinator
            .commit(
                |table, data, mode| {
                    writes.push((table.to_string(), data.to_vec(), mode));
                    Ok(())
                },
                |table, _filter| {
                    deletes.push(table.to_string());
                    Ok(())
                },
                |_table, _ops| Ok(()),
            )
            .unwrap();

        assert_eq!(writes.len(), 1);
        assert_eq!(deletes, vec!["users".to_string()]);
        assert!(!coordinator.is_active());
    }

    #[test]
    fn commit_failure_still_resets_to_idle() {
        let coordinator = TransactionCoordinator::new();
        coordinator.begin().unwrap();
        coordinator.save_snapshot("users", vec![]).unwrap();
        coordinator
            .add_operation(Operation::Write { table: "users".into(), data: vec![], mode: WriteMode::Append })
            .unwrap();

        let result = coordinator.commit(
            |_, _, _| Err(Error::invalid_input("boom")),
            |_, _| Ok(()),
            |_, _| Ok(()),
        );
        assert!(result.is_err());
        assert!(!coordinator.is_active());
    }

    #[test]
    fn rollback_restores_each_snapshotted_table_and_resets() {
        let coordinator = TransactionCoordinator::new();
        coordinator.begin().unwrap();
        coordinator.save_snapshot("users", vec![Value::Int(1), Value::Int(2)]).unwrap();

        let mut restored = Vec::new();
        coordinator
            .rollback(|table, records| {
                restored.push((table.to_string(), records.to_vec()));
                Ok(())
            })
            .unwrap();

        assert_eq!(restored, vec![("users".to_string(), vec![Value::Int(1), Value::Int(2)])]);
        assert!(!coordinator.is_active());
    }

    #[test]
    fn operations_outside_transaction_conflict() {
        let coordinator = TransactionCoordinator::new();
        let err = coordinator
            .add_operation(Operation::Delete { table: "users".into(), filter: Value::empty_object() })
            .unwrap_err();
        assert!(err.is_conflict());
    }
}
