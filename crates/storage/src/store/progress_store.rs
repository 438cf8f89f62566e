#![forbid(unsafe_code)]

use super::{SqliteStore, StoreError, days, history, plans};
use rp_core::ids::PlanId;
use rp_core::{HistoryRecord, Plan, PlanDay};
use rusqlite::{Connection, Transaction};
use std::collections::BTreeMap;

/// Data-access contract for started plans, their day table and completion history.
/// No business rules beyond referential integrity live here.
pub trait ProgressStore {
    fn get_plan(&self, id: &PlanId) -> Result<Option<Plan>, StoreError>;

    /// Started plans ordered by id.
    fn list_plans(&self) -> Result<Vec<Plan>, StoreError>;

    /// Insert or full replace by id. Never cascades into days or history.
    fn upsert_plan(&mut self, plan: &Plan) -> Result<(), StoreError>;

    /// Deletes the plan together with its days and history.
    fn delete_plan(&mut self, id: &PlanId) -> Result<bool, StoreError>;

    /// Ordered by day number.
    fn get_days(&self, plan_id: &PlanId) -> Result<Vec<PlanDay>, StoreError>;

    /// Atomically swaps the whole day table of a plan.
    fn replace_days(&mut self, plan_id: &PlanId, days: &[PlanDay]) -> Result<(), StoreError>;

    fn get_history(
        &self,
        plan_id: &PlanId,
        iteration: u32,
    ) -> Result<BTreeMap<u32, HistoryRecord>, StoreError>;

    fn upsert_history(&mut self, record: &HistoryRecord) -> Result<(), StoreError>;

    /// Every iteration, ordered by (iteration, day).
    fn get_all_history(&self, plan_id: &PlanId) -> Result<Vec<HistoryRecord>, StoreError>;

    /// Drops history of days past `max_day`; returns the number of removed rows.
    fn delete_history_beyond(&mut self, plan_id: &PlanId, max_day: u32)
    -> Result<usize, StoreError>;
}

/// A store that can run several operations as one atomic unit.
pub trait TransactionalStore: ProgressStore {
    /// Runs `f` inside a write transaction; an `Err` from `f` rolls everything back.
    fn atomically<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        E: From<StoreError>,
        F: FnOnce(&mut dyn ProgressStore) -> Result<T, E>;

    /// Runs `f` against one consistent snapshot.
    fn snapshot<T, E, F>(&self, f: F) -> Result<T, E>
    where
        E: From<StoreError>,
        F: FnOnce(&dyn ProgressStore) -> Result<T, E>;
}

/// `ProgressStore` view over an open transaction.
pub struct StoreTx<'conn> {
    tx: Transaction<'conn>,
}

impl<'conn> StoreTx<'conn> {
    pub(super) fn new(tx: Transaction<'conn>) -> Self {
        Self { tx }
    }

    pub(super) fn conn(&self) -> &Connection {
        &self.tx
    }

    pub fn commit(self) -> Result<(), StoreError> {
        self.tx.commit()?;
        Ok(())
    }
}

impl ProgressStore for StoreTx<'_> {
    fn get_plan(&self, id: &PlanId) -> Result<Option<Plan>, StoreError> {
        plans::get_plan(self.conn(), id)
    }

    fn list_plans(&self) -> Result<Vec<Plan>, StoreError> {
        plans::list_plans(self.conn())
    }

    fn upsert_plan(&mut self, plan: &Plan) -> Result<(), StoreError> {
        plans::upsert_plan(self.conn(), plan)
    }

    fn delete_plan(&mut self, id: &PlanId) -> Result<bool, StoreError> {
        plans::delete_plan(self.conn(), id)
    }

    fn get_days(&self, plan_id: &PlanId) -> Result<Vec<PlanDay>, StoreError> {
        days::get_days(self.conn(), plan_id)
    }

    fn replace_days(&mut self, plan_id: &PlanId, days: &[PlanDay]) -> Result<(), StoreError> {
        days::replace_days(self.conn(), plan_id, days)
    }

    fn get_history(
        &self,
        plan_id: &PlanId,
        iteration: u32,
    ) -> Result<BTreeMap<u32, HistoryRecord>, StoreError> {
        history::get_history(self.conn(), plan_id, iteration)
    }

    fn upsert_history(&mut self, record: &HistoryRecord) -> Result<(), StoreError> {
        history::upsert_history(self.conn(), record)
    }

    fn get_all_history(&self, plan_id: &PlanId) -> Result<Vec<HistoryRecord>, StoreError> {
        history::get_all_history(self.conn(), plan_id)
    }

    fn delete_history_beyond(
        &mut self,
        plan_id: &PlanId,
        max_day: u32,
    ) -> Result<usize, StoreError> {
        history::delete_history_beyond(self.conn(), plan_id, max_day)
    }
}

impl ProgressStore for SqliteStore {
    fn get_plan(&self, id: &PlanId) -> Result<Option<Plan>, StoreError> {
        plans::get_plan(&self.conn, id)
    }

    fn list_plans(&self) -> Result<Vec<Plan>, StoreError> {
        plans::list_plans(&self.conn)
    }

    fn upsert_plan(&mut self, plan: &Plan) -> Result<(), StoreError> {
        plans::upsert_plan(&self.conn, plan)
    }

    fn delete_plan(&mut self, id: &PlanId) -> Result<bool, StoreError> {
        plans::delete_plan(&self.conn, id)
    }

    fn get_days(&self, plan_id: &PlanId) -> Result<Vec<PlanDay>, StoreError> {
        days::get_days(&self.conn, plan_id)
    }

    fn replace_days(&mut self, plan_id: &PlanId, days: &[PlanDay]) -> Result<(), StoreError> {
        let tx = self.begin_write()?;
        days::replace_days(tx.conn(), plan_id, days)?;
        tx.commit()
    }

    fn get_history(
        &self,
        plan_id: &PlanId,
        iteration: u32,
    ) -> Result<BTreeMap<u32, HistoryRecord>, StoreError> {
        history::get_history(&self.conn, plan_id, iteration)
    }

    fn upsert_history(&mut self, record: &HistoryRecord) -> Result<(), StoreError> {
        history::upsert_history(&self.conn, record)
    }

    fn get_all_history(&self, plan_id: &PlanId) -> Result<Vec<HistoryRecord>, StoreError> {
        history::get_all_history(&self.conn, plan_id)
    }

    fn delete_history_beyond(
        &mut self,
        plan_id: &PlanId,
        max_day: u32,
    ) -> Result<usize, StoreError> {
        history::delete_history_beyond(&self.conn, plan_id, max_day)
    }
}

impl TransactionalStore for SqliteStore {
    fn atomically<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        E: From<StoreError>,
        F: FnOnce(&mut dyn ProgressStore) -> Result<T, E>,
    {
        let mut tx = self.begin_write()?;
        let value = f(&mut tx)?;
        tx.commit()?;
        Ok(value)
    }

    fn snapshot<T, E, F>(&self, f: F) -> Result<T, E>
    where
        E: From<StoreError>,
        F: FnOnce(&dyn ProgressStore) -> Result<T, E>,
    {
        let tx = self.begin_read()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }
}
