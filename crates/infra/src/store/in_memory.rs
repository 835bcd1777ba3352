use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use storefront_core::{AlertId, Entity, MovementId, ProductId};
use storefront_inventory::{AlertResolution, AlertType, InventoryRecord, StockAlert, StockMovement};

use super::r#trait::{CommitReceipt, InventoryCommit, InventoryStore, LedgerSnapshot, StoreError};

#[derive(Debug, Default)]
struct State {
    records: HashMap<ProductId, InventoryRecord>,
    ledgers: HashMap<ProductId, Vec<StockMovement>>,
    alerts: BTreeMap<AlertId, StockAlert>,
    last_movement_id: u64,
    last_alert_id: u64,
}

impl State {
    fn has_open_alert(&self, product_id: ProductId, alert_type: AlertType, except: &[AlertId]) -> bool {
        self.alerts.values().any(|a| {
            a.is_open()
                && a.product_id == product_id
                && a.alert_type == alert_type
                && !except.contains(&a.id)
        })
    }

    /// Reject a commit to an existing record before touching anything.
    fn check(&self, commit: &InventoryCommit) -> Result<(), StoreError> {
        commit.validate()?;
        let product_id = commit.record.product_id();
        let stored = self
            .records
            .get(&product_id)
            .ok_or_else(|| StoreError::NotFound(format!("inventory record for product {product_id}")))?;

        if stored.quantity_on_hand() != commit.expected_quantity {
            return Err(StoreError::Conflict(format!(
                "product {product_id}: expected quantity {}, found {}",
                commit.expected_quantity,
                stored.quantity_on_hand()
            )));
        }

        let resolving: Vec<AlertId> = commit.alerts.resolve.iter().map(|(id, _)| *id).collect();
        for id in &resolving {
            match self.alerts.get(id) {
                Some(a) if a.product_id == product_id => {}
                Some(_) => {
                    return Err(StoreError::Invalid(format!(
                        "alert {id} does not belong to product {product_id}"
                    )));
                }
                None => return Err(StoreError::NotFound(format!("alert {id}"))),
            }
        }

        for new in &commit.alerts.open {
            if self.has_open_alert(product_id, new.alert_type, &resolving) {
                return Err(StoreError::Conflict(format!(
                    "product {product_id} already has an open {} alert",
                    new.alert_type
                )));
            }
        }
        Ok(())
    }

    fn check_insert(&self, commit: &InventoryCommit) -> Result<(), StoreError> {
        commit.validate()?;
        let product_id = *commit.record.id();
        if self.records.contains_key(&product_id) {
            return Err(StoreError::AlreadyExists(format!(
                "inventory record for product {product_id}"
            )));
        }
        if commit.expected_quantity != 0 || !commit.alerts.resolve.is_empty() {
            return Err(StoreError::Invalid(format!(
                "product {product_id}: a new record starts from zero with no alerts to resolve"
            )));
        }
        Ok(())
    }

    fn apply(&mut self, commit: InventoryCommit) -> CommitReceipt {
        let InventoryCommit {
            record,
            movement,
            alerts,
            ..
        } = commit;
        let product_id = record.product_id();
        let mut receipt = CommitReceipt::default();

        if let Some(m) = movement {
            self.last_movement_id += 1;
            let stored = m.into_stored(MovementId::new(self.last_movement_id));
            self.ledgers.entry(product_id).or_default().push(stored.clone());
            receipt.movement = Some(stored);
        }

        for (id, resolution) in alerts.resolve {
            if let Some(alert) = self.alerts.get_mut(&id) {
                if alert.resolve(&resolution) {
                    receipt.resolved.push(id);
                }
            }
        }

        for new in alerts.open {
            self.last_alert_id += 1;
            let stored = new.into_stored(AlertId::new(self.last_alert_id));
            self.alerts.insert(*stored.id(), stored.clone());
            receipt.opened.push(stored);
        }

        self.records.insert(product_id, record);
        receipt
    }
}

/// In-memory inventory store.
///
/// Intended for tests/dev. One lock guards all state, so every commit is
/// trivially atomic.
#[derive(Debug, Default)]
pub struct InMemoryInventoryStore {
    state: RwLock<State>,
}

impl InMemoryInventoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Storage("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Storage("lock poisoned".to_string()))
    }
}

impl InventoryStore for InMemoryInventoryStore {
    fn insert_record(&self, commit: InventoryCommit) -> Result<CommitReceipt, StoreError> {
        let mut state = self.write()?;
        state.check_insert(&commit)?;
        Ok(state.apply(commit))
    }

    fn get_record(&self, product_id: ProductId) -> Result<Option<InventoryRecord>, StoreError> {
        Ok(self.read()?.records.get(&product_id).cloned())
    }

    fn list_records(&self) -> Result<Vec<InventoryRecord>, StoreError> {
        let state = self.read()?;
        let mut records: Vec<InventoryRecord> = state.records.values().cloned().collect();
        records.sort_by_key(|r| r.product_id());
        Ok(records)
    }

    fn commit(&self, commit: InventoryCommit) -> Result<CommitReceipt, StoreError> {
        let mut state = self.write()?;
        state.check(&commit)?;
        Ok(state.apply(commit))
    }

    fn movements(&self, product_id: ProductId, limit: usize) -> Result<Vec<StockMovement>, StoreError> {
        let state = self.read()?;
        Ok(state
            .ledgers
            .get(&product_id)
            .map(|ledger| ledger.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    fn ledger(&self, product_id: ProductId) -> Result<Vec<StockMovement>, StoreError> {
        Ok(self.read()?.ledgers.get(&product_id).cloned().unwrap_or_default())
    }

    fn ledger_snapshot(&self, product_id: ProductId) -> Result<Option<LedgerSnapshot>, StoreError> {
        let state = self.read()?;
        Ok(state.records.get(&product_id).map(|record| LedgerSnapshot {
            record: record.clone(),
            movements: state.ledgers.get(&product_id).cloned().unwrap_or_default(),
        }))
    }

    fn open_alerts(&self, product_id: ProductId) -> Result<Vec<StockAlert>, StoreError> {
        let state = self.read()?;
        Ok(state
            .alerts
            .values()
            .filter(|a| a.is_open() && a.product_id == product_id)
            .cloned()
            .collect())
    }

    fn active_alerts(
        &self,
        alert_type: Option<AlertType>,
        limit: usize,
    ) -> Result<Vec<StockAlert>, StoreError> {
        let state = self.read()?;
        Ok(state
            .alerts
            .values()
            .rev()
            .filter(|a| a.is_open() && alert_type.is_none_or(|t| a.alert_type == t))
            .take(limit)
            .cloned()
            .collect())
    }

    fn get_alert(&self, alert_id: AlertId) -> Result<Option<StockAlert>, StoreError> {
        Ok(self.read()?.alerts.get(&alert_id).cloned())
    }

    fn resolve_alert(&self, alert_id: AlertId, resolution: AlertResolution) -> Result<bool, StoreError> {
        let mut state = self.write()?;
        let alert = state
            .alerts
            .get_mut(&alert_id)
            .ok_or_else(|| StoreError::NotFound(format!("alert {alert_id}")))?;
        Ok(alert.resolve(&resolution))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use storefront_inventory::{AlertPlan, InventorySettings, MovementType, NewAlert, NewMovement};

    fn registered(store: &InMemoryInventoryStore, threshold: i64) -> InventoryRecord {
        let record = InventoryRecord::new(
            ProductId::new(),
            InventorySettings::tracked(threshold).unwrap(),
            Utc::now(),
        );
        store
            .insert_record(InventoryCommit::without_movement(record.clone(), AlertPlan::default()))
            .unwrap();
        record
    }

    fn movement(record: &InventoryRecord, before: i64, delta: i64) -> NewMovement {
        NewMovement {
            product_id: record.product_id(),
            delta,
            quantity_before: before,
            quantity_after: before + delta,
            movement_type: MovementType::Purchase,
            reference: None,
            note: None,
            actor: None,
            created_at: Utc::now(),
        }
    }

    fn receive(store: &InMemoryInventoryStore, record: &mut InventoryRecord, delta: i64) -> CommitReceipt {
        let (before, _) = record.apply_delta(delta, Utc::now()).unwrap();
        store
            .commit(InventoryCommit {
                record: record.clone(),
                expected_quantity: before,
                movement: Some(movement(record, before, delta)),
                alerts: AlertPlan::default(),
            })
            .unwrap()
    }

    #[test]
    fn insert_twice_is_rejected() {
        let store = InMemoryInventoryStore::new();
        let record = registered(&store, 5);
        assert!(matches!(
            store.insert_record(InventoryCommit::without_movement(record, AlertPlan::default())),
            Err(StoreError::AlreadyExists(_))
        ));
    }

    #[test]
    fn insert_writes_record_opening_movement_and_alert_together() {
        let store = InMemoryInventoryStore::new();
        let mut record = InventoryRecord::new(
            ProductId::new(),
            InventorySettings::tracked(10).unwrap(),
            Utc::now(),
        );
        let product_id = record.product_id();
        record.apply_delta(4, Utc::now()).unwrap();

        let receipt = store
            .insert_record(InventoryCommit {
                record: record.clone(),
                expected_quantity: 0,
                movement: Some(movement(&record, 0, 4)),
                alerts: AlertPlan {
                    open: vec![NewAlert {
                        product_id,
                        alert_type: AlertType::LowStock,
                        quantity_at_open: 4,
                        opened_at: Utc::now(),
                    }],
                    resolve: vec![],
                },
            })
            .unwrap();

        assert_eq!(receipt.movement.map(|m| m.quantity_after), Some(4));
        assert_eq!(receipt.opened.len(), 1);
        let snapshot = store.ledger_snapshot(product_id).unwrap().unwrap();
        assert_eq!(snapshot.record.quantity_on_hand(), 4);
        assert_eq!(snapshot.movements.len(), 1);
        assert_eq!(store.open_alerts(product_id).unwrap().len(), 1);
    }

    #[test]
    fn insert_that_does_not_start_from_zero_writes_nothing() {
        let store = InMemoryInventoryStore::new();
        let mut record = InventoryRecord::new(
            ProductId::new(),
            InventorySettings::tracked(0).unwrap(),
            Utc::now(),
        );
        let product_id = record.product_id();
        record.apply_delta(5, Utc::now()).unwrap();

        let err = store
            .insert_record(InventoryCommit {
                record: record.clone(),
                expected_quantity: 2,
                movement: Some(movement(&record, 2, 3)),
                alerts: AlertPlan::default(),
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
        assert!(store.get_record(product_id).unwrap().is_none());
        assert!(store.ledger(product_id).unwrap().is_empty());
        assert!(store.ledger_snapshot(product_id).unwrap().is_none());
    }

    #[test]
    fn commit_assigns_increasing_movement_ids() {
        let store = InMemoryInventoryStore::new();
        let mut record = registered(&store, 5);

        let first = receive(&store, &mut record, 10).movement.unwrap();
        let second = receive(&store, &mut record, 3).movement.unwrap();
        assert!(second.id > first.id);

        let newest_first = store.movements(record.product_id(), 10).unwrap();
        assert_eq!(newest_first[0].id, second.id);
        let ledger = store.ledger(record.product_id()).unwrap();
        assert_eq!(ledger[0].id, first.id);
        assert_eq!(
            store.get_record(record.product_id()).unwrap().unwrap().quantity_on_hand(),
            13
        );
    }

    #[test]
    fn stale_expected_quantity_is_a_conflict_and_writes_nothing() {
        let store = InMemoryInventoryStore::new();
        let mut record = registered(&store, 5);
        receive(&store, &mut record, 10);

        // Writer that still believes the shelf is empty.
        let mut stale = InventoryRecord::new(record.product_id(), *record.settings(), Utc::now());
        let (before, _) = stale.apply_delta(4, Utc::now()).unwrap();
        let err = store
            .commit(InventoryCommit {
                record: stale.clone(),
                expected_quantity: before,
                movement: Some(movement(&stale, before, 4)),
                alerts: AlertPlan::default(),
            })
            .unwrap_err();

        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(store.ledger(record.product_id()).unwrap().len(), 1);
        assert_eq!(
            store.get_record(record.product_id()).unwrap().unwrap().quantity_on_hand(),
            10
        );
    }

    #[test]
    fn quantity_change_without_movement_is_invalid() {
        let store = InMemoryInventoryStore::new();
        let mut record = registered(&store, 5);
        record.apply_delta(10, Utc::now()).unwrap();

        let err = store
            .commit(InventoryCommit {
                record,
                expected_quantity: 0,
                movement: None,
                alerts: AlertPlan::default(),
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
    }

    #[test]
    fn second_open_alert_of_a_type_is_refused() {
        let store = InMemoryInventoryStore::new();
        let record = registered(&store, 5);
        let open = || AlertPlan {
            open: vec![NewAlert {
                product_id: record.product_id(),
                alert_type: AlertType::OutOfStock,
                quantity_at_open: 0,
                opened_at: Utc::now(),
            }],
            resolve: vec![],
        };

        let receipt = store
            .commit(InventoryCommit::without_movement(record.clone(), open()))
            .unwrap();
        assert_eq!(receipt.opened.len(), 1);

        let err = store
            .commit(InventoryCommit::without_movement(record.clone(), open()))
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(store.open_alerts(record.product_id()).unwrap().len(), 1);
    }

    #[test]
    fn resolve_alert_reports_whether_it_changed_anything() {
        let store = InMemoryInventoryStore::new();
        let record = registered(&store, 5);
        let receipt = store
            .commit(InventoryCommit::without_movement(
                record.clone(),
                AlertPlan {
                    open: vec![NewAlert {
                        product_id: record.product_id(),
                        alert_type: AlertType::LowStock,
                        quantity_at_open: 2,
                        opened_at: Utc::now(),
                    }],
                    resolve: vec![],
                },
            ))
            .unwrap();
        let id = receipt.opened[0].id;

        let resolution = AlertResolution::manual(None, Some("restocked".into()), Utc::now());
        assert!(store.resolve_alert(id, resolution.clone()).unwrap());
        assert!(!store.resolve_alert(id, resolution.clone()).unwrap());
        assert!(store.active_alerts(None, 10).unwrap().is_empty());
        assert!(matches!(
            store.resolve_alert(AlertId::new(999), resolution),
            Err(StoreError::NotFound(_))
        ));
    }
}
