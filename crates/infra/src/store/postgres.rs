//! Postgres-backed inventory store.
//!
//! Every write runs in one transaction: `SET LOCAL lock_timeout`, `SELECT ...
//! FOR UPDATE` on the product's inventory row, then the record update, the
//! ledger insert and the alert writes. The row lock serializes writers across
//! processes; the in-process `KeyedLock` only covers one service instance.
//!
//! [`InventoryStore`] is synchronous, so each call is driven to completion on
//! the current tokio runtime. Callers must be inside a multi-threaded runtime
//! (a worker or a `spawn_blocking` thread).
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database | `55P03` | `Unavailable` | Row lock not acquired within `lock_timeout` |
//! | Database | `40001`, `40P01` | `Conflict` | Serialization failure / deadlock |
//! | Database | `23505` | `Conflict` | Concurrent open of the same alert type |
//! | Database | `23505` on `inventory` | `AlreadyExists` | Product registered twice |
//! | Database | `23514` | `Invalid` | Ledger arithmetic check constraint |
//! | PoolTimedOut / Io | N/A | `Unavailable` | Connection pressure |
//! | Other | Any other | `Storage` | Everything else |

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{debug, instrument};
use uuid::Uuid;

use storefront_core::{AlertId, MovementId, ProductId, UserId};
use storefront_inventory::{
    AlertResolution, AlertType, InventoryRecord, InventorySettings, MovementReference, MovementType,
    NewMovement, StockAlert, StockMovement,
};

use super::r#trait::{CommitReceipt, InventoryCommit, InventoryStore, LedgerSnapshot, StoreError};

/// DDL for the three inventory tables. Idempotent.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS inventory (
    product_id          UUID PRIMARY KEY,
    quantity_on_hand    BIGINT NOT NULL DEFAULT 0,
    tracking_enabled    BOOLEAN NOT NULL DEFAULT TRUE,
    low_stock_threshold BIGINT NOT NULL DEFAULT 0 CHECK (low_stock_threshold >= 0),
    allow_backorders    BOOLEAN NOT NULL DEFAULT FALSE,
    status              TEXT NOT NULL,
    updated_at          TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS stock_movements (
    id              BIGSERIAL PRIMARY KEY,
    product_id      UUID NOT NULL REFERENCES inventory (product_id),
    delta           BIGINT NOT NULL CHECK (delta <> 0),
    quantity_before BIGINT NOT NULL,
    quantity_after  BIGINT NOT NULL,
    movement_type   TEXT NOT NULL,
    reference_type  TEXT,
    reference_id    TEXT,
    note            TEXT,
    actor           UUID,
    created_at      TIMESTAMPTZ NOT NULL,
    CHECK (quantity_after = quantity_before + delta)
);

CREATE INDEX IF NOT EXISTS stock_movements_product_idx
    ON stock_movements (product_id, id);

CREATE TABLE IF NOT EXISTS stock_alerts (
    id               BIGSERIAL PRIMARY KEY,
    product_id       UUID NOT NULL REFERENCES inventory (product_id),
    alert_type       TEXT NOT NULL,
    quantity_at_open BIGINT NOT NULL,
    resolved         BOOLEAN NOT NULL DEFAULT FALSE,
    opened_at        TIMESTAMPTZ NOT NULL,
    resolved_at      TIMESTAMPTZ,
    resolved_by      UUID,
    notes            TEXT
);

CREATE UNIQUE INDEX IF NOT EXISTS stock_alerts_one_open_idx
    ON stock_alerts (product_id, alert_type) WHERE NOT resolved;
"#;

const MOVEMENT_COLUMNS: &str = "id, product_id, delta, quantity_before, quantity_after, movement_type, \
     reference_type, reference_id, note, actor, created_at";

const ALERT_COLUMNS: &str = "id, product_id, alert_type, quantity_at_open, resolved, opened_at, \
     resolved_at, resolved_by, notes";

const RECORD_COLUMNS: &str = "product_id, quantity_on_hand, tracking_enabled, low_stock_threshold, \
     allow_backorders, updated_at";

#[derive(Debug, Clone)]
pub struct PostgresInventoryStore {
    pool: Arc<PgPool>,
    lock_timeout: Duration,
}

impl PostgresInventoryStore {
    pub fn new(pool: PgPool, lock_timeout: Duration) -> Self {
        Self {
            pool: Arc::new(pool),
            lock_timeout,
        }
    }

    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }

    /// Run `fut` to completion from synchronous code.
    fn block_on<T>(&self, fut: impl Future<Output = Result<T, StoreError>>) -> Result<T, StoreError> {
        let handle = Handle::try_current().map_err(|_| {
            StoreError::Unavailable(
                "PostgresInventoryStore requires a tokio runtime; call it from within one".to_string(),
            )
        })?;
        match handle.runtime_flavor() {
            RuntimeFlavor::MultiThread => tokio::task::block_in_place(|| handle.block_on(fut)),
            _ => Err(StoreError::Unavailable(
                "PostgresInventoryStore requires a multi-threaded tokio runtime".to_string(),
            )),
        }
    }

    async fn begin_locked(&self, operation: &str) -> Result<Transaction<'static, Postgres>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        // SET does not take bind parameters; the value is a formatted integer.
        sqlx::query(&format!("SET LOCAL lock_timeout = '{}ms'", self.lock_timeout.as_millis()))
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        Ok(tx)
    }

    #[instrument(skip(self, commit), fields(product_id = %commit.record.product_id()), err)]
    async fn insert_commit(&self, commit: InventoryCommit) -> Result<CommitReceipt, StoreError> {
        commit.validate()?;
        let product_id = commit.record.product_id();
        if commit.expected_quantity != 0 || !commit.alerts.resolve.is_empty() {
            return Err(StoreError::Invalid(format!(
                "product {product_id}: a new record starts from zero with no alerts to resolve"
            )));
        }

        let mut tx = self.begin_locked("insert_record").await?;
        let record = &commit.record;
        let settings = record.settings();
        sqlx::query(
            r#"
            INSERT INTO inventory (
                product_id, quantity_on_hand, tracking_enabled,
                low_stock_threshold, allow_backorders, status, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(product_id.as_uuid())
        .bind(record.quantity_on_hand())
        .bind(settings.tracking_enabled())
        .bind(settings.low_stock_threshold())
        .bind(settings.allow_backorders())
        .bind(record.status().as_str())
        .bind(record.updated_at())
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::AlreadyExists(format!("inventory record for product {product_id}"))
            } else {
                map_sqlx_error("insert_inventory", e)
            }
        })?;

        let receipt = write_ledger_and_alerts(&mut tx, commit).await?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(receipt)
    }

    #[instrument(skip(self, commit), fields(product_id = %commit.record.product_id()), err)]
    async fn apply_commit(&self, commit: InventoryCommit) -> Result<CommitReceipt, StoreError> {
        commit.validate()?;
        let product_id = commit.record.product_id();
        let mut tx = self.begin_locked("commit").await?;

        let stored: i64 = sqlx::query("SELECT quantity_on_hand FROM inventory WHERE product_id = $1 FOR UPDATE")
            .bind(product_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("lock_inventory", e))?
            .ok_or_else(|| StoreError::NotFound(format!("inventory record for product {product_id}")))?
            .try_get("quantity_on_hand")
            .map_err(|e| corrupt("inventory", e))?;
        if stored != commit.expected_quantity {
            // Dropping the transaction rolls it back.
            return Err(StoreError::Conflict(format!(
                "product {product_id}: expected quantity {}, found {stored}",
                commit.expected_quantity
            )));
        }

        let record = &commit.record;
        let settings = record.settings();
        sqlx::query(
            r#"
            UPDATE inventory
            SET quantity_on_hand = $2, tracking_enabled = $3, low_stock_threshold = $4,
                allow_backorders = $5, status = $6, updated_at = $7
            WHERE product_id = $1
            "#,
        )
        .bind(product_id.as_uuid())
        .bind(record.quantity_on_hand())
        .bind(settings.tracking_enabled())
        .bind(settings.low_stock_threshold())
        .bind(settings.allow_backorders())
        .bind(record.status().as_str())
        .bind(record.updated_at())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_inventory", e))?;

        let receipt = write_ledger_and_alerts(&mut tx, commit).await?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        debug!(
            movement = ?receipt.movement.as_ref().map(|m| m.id),
            opened = receipt.opened.len(),
            resolved = receipt.resolved.len(),
            "commit applied"
        );
        Ok(receipt)
    }

    async fn fetch_record(&self, product_id: ProductId) -> Result<Option<InventoryRecord>, StoreError> {
        sqlx::query(&format!("SELECT {RECORD_COLUMNS} FROM inventory WHERE product_id = $1"))
            .bind(product_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_record", e))?
            .as_ref()
            .map(record_from_row)
            .transpose()
    }

    async fn fetch_records(&self) -> Result<Vec<InventoryRecord>, StoreError> {
        let rows = sqlx::query(&format!("SELECT {RECORD_COLUMNS} FROM inventory ORDER BY product_id"))
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_records", e))?;
        rows.iter().map(record_from_row).collect()
    }

    async fn fetch_movements(&self, product_id: ProductId, limit: usize) -> Result<Vec<StockMovement>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {MOVEMENT_COLUMNS} FROM stock_movements WHERE product_id = $1 ORDER BY id DESC LIMIT $2"
        ))
        .bind(product_id.as_uuid())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("movements", e))?;
        rows.iter().map(movement_from_row).collect()
    }

    async fn fetch_ledger(&self, product_id: ProductId) -> Result<Vec<StockMovement>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {MOVEMENT_COLUMNS} FROM stock_movements WHERE product_id = $1 ORDER BY id ASC"
        ))
        .bind(product_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("ledger", e))?;
        rows.iter().map(movement_from_row).collect()
    }

    /// Record and ledger inside one repeatable-read snapshot.
    async fn fetch_snapshot(&self, product_id: ProductId) -> Result<Option<LedgerSnapshot>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("ledger_snapshot", e))?;

        let Some(row) = sqlx::query(&format!("SELECT {RECORD_COLUMNS} FROM inventory WHERE product_id = $1"))
            .bind(product_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("ledger_snapshot", e))?
        else {
            return Ok(None);
        };
        let record = record_from_row(&row)?;

        let rows = sqlx::query(&format!(
            "SELECT {MOVEMENT_COLUMNS} FROM stock_movements WHERE product_id = $1 ORDER BY id ASC"
        ))
        .bind(product_id.as_uuid())
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("ledger_snapshot", e))?;
        let movements = rows.iter().map(movement_from_row).collect::<Result<Vec<_>, _>>()?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(Some(LedgerSnapshot { record, movements }))
    }

    async fn fetch_open_alerts(&self, product_id: ProductId) -> Result<Vec<StockAlert>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {ALERT_COLUMNS} FROM stock_alerts WHERE product_id = $1 AND NOT resolved ORDER BY id"
        ))
        .bind(product_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("open_alerts", e))?;
        rows.iter().map(alert_from_row).collect()
    }

    async fn fetch_active_alerts(
        &self,
        alert_type: Option<AlertType>,
        limit: usize,
    ) -> Result<Vec<StockAlert>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {ALERT_COLUMNS} FROM stock_alerts \
             WHERE NOT resolved AND ($1::TEXT IS NULL OR alert_type = $1) \
             ORDER BY id DESC LIMIT $2"
        ))
        .bind(alert_type.map(|t| t.as_str()))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("active_alerts", e))?;
        rows.iter().map(alert_from_row).collect()
    }

    async fn fetch_alert(&self, alert_id: AlertId) -> Result<Option<StockAlert>, StoreError> {
        sqlx::query(&format!("SELECT {ALERT_COLUMNS} FROM stock_alerts WHERE id = $1"))
            .bind(alert_id_param(alert_id)?)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_alert", e))?
            .as_ref()
            .map(alert_from_row)
            .transpose()
    }

    #[instrument(skip(self, resolution), fields(alert_id = %alert_id), err)]
    async fn resolve_one(&self, alert_id: AlertId, resolution: AlertResolution) -> Result<bool, StoreError> {
        let mut tx = self.begin_locked("resolve_alert").await?;
        let (_, changed) = resolve_alert_in(&mut tx, alert_id, &resolution)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("alert {alert_id}")))?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(changed)
    }
}

impl InventoryStore for PostgresInventoryStore {
    fn insert_record(&self, commit: InventoryCommit) -> Result<CommitReceipt, StoreError> {
        self.block_on(self.insert_commit(commit))
    }

    fn get_record(&self, product_id: ProductId) -> Result<Option<InventoryRecord>, StoreError> {
        self.block_on(self.fetch_record(product_id))
    }

    fn list_records(&self) -> Result<Vec<InventoryRecord>, StoreError> {
        self.block_on(self.fetch_records())
    }

    fn commit(&self, commit: InventoryCommit) -> Result<CommitReceipt, StoreError> {
        self.block_on(self.apply_commit(commit))
    }

    fn movements(&self, product_id: ProductId, limit: usize) -> Result<Vec<StockMovement>, StoreError> {
        self.block_on(self.fetch_movements(product_id, limit))
    }

    fn ledger(&self, product_id: ProductId) -> Result<Vec<StockMovement>, StoreError> {
        self.block_on(self.fetch_ledger(product_id))
    }

    fn ledger_snapshot(&self, product_id: ProductId) -> Result<Option<LedgerSnapshot>, StoreError> {
        self.block_on(self.fetch_snapshot(product_id))
    }

    fn open_alerts(&self, product_id: ProductId) -> Result<Vec<StockAlert>, StoreError> {
        self.block_on(self.fetch_open_alerts(product_id))
    }

    fn active_alerts(
        &self,
        alert_type: Option<AlertType>,
        limit: usize,
    ) -> Result<Vec<StockAlert>, StoreError> {
        self.block_on(self.fetch_active_alerts(alert_type, limit))
    }

    fn get_alert(&self, alert_id: AlertId) -> Result<Option<StockAlert>, StoreError> {
        self.block_on(self.fetch_alert(alert_id))
    }

    fn resolve_alert(&self, alert_id: AlertId, resolution: AlertResolution) -> Result<bool, StoreError> {
        self.block_on(self.resolve_one(alert_id, resolution))
    }
}

/// Movement, alert resolutions and alert opens of one commit, in that order.
async fn write_ledger_and_alerts(
    tx: &mut Transaction<'static, Postgres>,
    commit: InventoryCommit,
) -> Result<CommitReceipt, StoreError> {
    let product_id = commit.record.product_id();
    let mut receipt = CommitReceipt::default();

    if let Some(movement) = commit.movement {
        let id = insert_movement(tx, &movement).await?;
        receipt.movement = Some(movement.into_stored(id));
    }

    for (alert_id, resolution) in &commit.alerts.resolve {
        match resolve_alert_in(tx, *alert_id, resolution).await? {
            Some((owner, changed)) if owner == product_id => {
                if changed {
                    receipt.resolved.push(*alert_id);
                }
            }
            Some(_) => {
                return Err(StoreError::Invalid(format!(
                    "alert {alert_id} does not belong to product {product_id}"
                )));
            }
            None => return Err(StoreError::NotFound(format!("alert {alert_id}"))),
        }
    }

    for alert in commit.alerts.open {
        let id: i64 = sqlx::query(
            r#"
            INSERT INTO stock_alerts (product_id, alert_type, quantity_at_open, opened_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(alert.product_id.as_uuid())
        .bind(alert.alert_type.as_str())
        .bind(alert.quantity_at_open)
        .bind(alert.opened_at)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("insert_alert", e))?
        .try_get("id")
        .map_err(|e| corrupt("stock_alerts", e))?;
        receipt.opened.push(alert.into_stored(alert_id_from(id)?));
    }

    Ok(receipt)
}

async fn insert_movement(
    tx: &mut Transaction<'static, Postgres>,
    movement: &NewMovement,
) -> Result<MovementId, StoreError> {
    let (reference_type, reference_id) = match &movement.reference {
        Some(r) => (Some(r.reference_type.as_str()), Some(r.reference_id.as_str())),
        None => (None, None),
    };

    let id: i64 = sqlx::query(
        r#"
        INSERT INTO stock_movements (
            product_id, delta, quantity_before, quantity_after, movement_type,
            reference_type, reference_id, note, actor, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING id
        "#,
    )
    .bind(movement.product_id.as_uuid())
    .bind(movement.delta)
    .bind(movement.quantity_before)
    .bind(movement.quantity_after)
    .bind(movement.movement_type.as_str())
    .bind(reference_type)
    .bind(reference_id)
    .bind(movement.note.as_deref())
    .bind(movement.actor.map(|a| *a.as_uuid()))
    .bind(movement.created_at)
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_movement", e))?
    .try_get("id")
    .map_err(|e| corrupt("stock_movements", e))?;

    movement_id_from(id)
}

/// Resolve one alert inside `tx`. `None` for an unknown id; otherwise the
/// owning product and whether this call changed the row.
async fn resolve_alert_in(
    tx: &mut Transaction<'static, Postgres>,
    alert_id: AlertId,
    resolution: &AlertResolution,
) -> Result<Option<(ProductId, bool)>, StoreError> {
    let id = alert_id_param(alert_id)?;
    let Some(row) = sqlx::query("SELECT product_id, resolved FROM stock_alerts WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("lock_alert", e))?
    else {
        return Ok(None);
    };
    let owner: Uuid = row.try_get("product_id").map_err(|e| corrupt("stock_alerts", e))?;
    let resolved: bool = row.try_get("resolved").map_err(|e| corrupt("stock_alerts", e))?;
    if resolved {
        return Ok(Some((ProductId::from_uuid(owner), false)));
    }

    sqlx::query(
        r#"
        UPDATE stock_alerts
        SET resolved = TRUE, resolved_at = $2, resolved_by = $3, notes = $4
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(resolution.resolved_at)
    .bind(resolution.resolved_by.map(|u| *u.as_uuid()))
    .bind(resolution.note.as_deref())
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("resolve_alert", e))?;
    Ok(Some((ProductId::from_uuid(owner), true)))
}

fn alert_id_param(alert_id: AlertId) -> Result<i64, StoreError> {
    i64::try_from(alert_id.get()).map_err(|_| StoreError::NotFound(format!("alert {alert_id}")))
}

fn movement_id_from(id: i64) -> Result<MovementId, StoreError> {
    u64::try_from(id)
        .map(MovementId::new)
        .map_err(|_| corrupt("stock_movements", format!("negative id {id}")))
}

fn alert_id_from(id: i64) -> Result<AlertId, StoreError> {
    u64::try_from(id)
        .map(AlertId::new)
        .map_err(|_| corrupt("stock_alerts", format!("negative id {id}")))
}

fn corrupt(what: &str, err: impl core::fmt::Display) -> StoreError {
    StoreError::Storage(format!("failed to decode {what} row: {err}"))
}

fn record_from_row(row: &PgRow) -> Result<InventoryRecord, StoreError> {
    let product_id: Uuid = row.try_get("product_id").map_err(|e| corrupt("inventory", e))?;
    let quantity: i64 = row.try_get("quantity_on_hand").map_err(|e| corrupt("inventory", e))?;
    let tracking: bool = row.try_get("tracking_enabled").map_err(|e| corrupt("inventory", e))?;
    let threshold: i64 = row.try_get("low_stock_threshold").map_err(|e| corrupt("inventory", e))?;
    let backorders: bool = row.try_get("allow_backorders").map_err(|e| corrupt("inventory", e))?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at").map_err(|e| corrupt("inventory", e))?;

    let settings = InventorySettings::new(tracking, threshold, backorders).map_err(|e| corrupt("inventory", e))?;
    Ok(InventoryRecord::from_parts(
        ProductId::from_uuid(product_id),
        quantity,
        settings,
        updated_at,
    ))
}

fn movement_from_row(row: &PgRow) -> Result<StockMovement, StoreError> {
    let bad = |e: sqlx::Error| corrupt("stock_movements", e);
    let id: i64 = row.try_get("id").map_err(bad)?;
    let product_id: Uuid = row.try_get("product_id").map_err(bad)?;
    let movement_type: String = row.try_get("movement_type").map_err(bad)?;
    let reference_type: Option<String> = row.try_get("reference_type").map_err(bad)?;
    let reference_id: Option<String> = row.try_get("reference_id").map_err(bad)?;
    let actor: Option<Uuid> = row.try_get("actor").map_err(bad)?;

    Ok(StockMovement {
        id: movement_id_from(id)?,
        product_id: ProductId::from_uuid(product_id),
        delta: row.try_get("delta").map_err(bad)?,
        quantity_before: row.try_get("quantity_before").map_err(bad)?,
        quantity_after: row.try_get("quantity_after").map_err(bad)?,
        movement_type: movement_type
            .parse::<MovementType>()
            .map_err(|e| corrupt("stock_movements", e))?,
        reference: match (reference_type, reference_id) {
            (Some(t), Some(r)) => Some(MovementReference::new(t, r)),
            _ => None,
        },
        note: row.try_get("note").map_err(bad)?,
        actor: actor.map(UserId::from_uuid),
        created_at: row.try_get("created_at").map_err(bad)?,
    })
}

fn alert_from_row(row: &PgRow) -> Result<StockAlert, StoreError> {
    let bad = |e: sqlx::Error| corrupt("stock_alerts", e);
    let id: i64 = row.try_get("id").map_err(bad)?;
    let product_id: Uuid = row.try_get("product_id").map_err(bad)?;
    let alert_type: String = row.try_get("alert_type").map_err(bad)?;
    let resolved_by: Option<Uuid> = row.try_get("resolved_by").map_err(bad)?;

    Ok(StockAlert {
        id: alert_id_from(id)?,
        product_id: ProductId::from_uuid(product_id),
        alert_type: alert_type
            .parse::<AlertType>()
            .map_err(|e| corrupt("stock_alerts", e))?,
        quantity_at_open: row.try_get("quantity_at_open").map_err(bad)?,
        resolved: row.try_get("resolved").map_err(bad)?,
        opened_at: row.try_get("opened_at").map_err(bad)?,
        resolved_at: row.try_get("resolved_at").map_err(bad)?,
        resolved_by: resolved_by.map(UserId::from_uuid),
        notes: row.try_get("notes").map_err(bad)?,
    })
}

/// Map SQLx errors to the store taxonomy.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                // lock_not_available
                Some("55P03") => StoreError::Unavailable(msg),
                // serialization_failure, deadlock_detected, unique_violation
                Some("40001") | Some("40P01") | Some("23505") => StoreError::Conflict(msg),
                // check_violation
                Some("23514") => StoreError::Invalid(msg),
                _ => StoreError::Storage(msg),
            }
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
            StoreError::Unavailable(format!("connection unavailable in {operation}: {err}"))
        }
        sqlx::Error::PoolClosed => StoreError::Storage(format!("connection pool closed in {operation}")),
        _ => StoreError::Storage(format!("sqlx error in {operation}: {err}")),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        return db_err.code().as_deref() == Some("23505");
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::postgres::PgPoolOptions;

    fn unreachable_store() -> PostgresInventoryStore {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_millis(200))
            .connect_lazy("postgres://storefront@127.0.0.1:1/storefront")
            .unwrap();
        PostgresInventoryStore::new(pool, Duration::from_millis(100))
    }

    #[test]
    fn connection_errors_are_retryable() {
        assert!(matches!(
            map_sqlx_error("get_record", sqlx::Error::PoolTimedOut),
            StoreError::Unavailable(_)
        ));
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert!(matches!(map_sqlx_error("commit", sqlx::Error::Io(io)), StoreError::Unavailable(_)));
        assert!(matches!(
            map_sqlx_error("get_record", sqlx::Error::RowNotFound),
            StoreError::Storage(_)
        ));
        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
    }

    #[tokio::test]
    async fn current_thread_runtime_is_refused_without_panicking() {
        let store = unreachable_store();
        let err = store.get_record(ProductId::new()).unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));

        // No runtime at all on a plain thread.
        let detached = store.clone();
        let err = std::thread::spawn(move || detached.list_records())
            .join()
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn unreachable_database_is_unavailable() {
        let store = unreachable_store();
        let err = store.get_record(ProductId::new()).unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)), "got {err:?}");
    }

    #[test]
    fn schema_keeps_one_open_alert_per_type() {
        assert!(SCHEMA.contains("stock_alerts_one_open_idx"));
        assert!(SCHEMA.contains("WHERE NOT resolved"));
        assert!(SCHEMA.contains("CHECK (quantity_after = quantity_before + delta)"));
    }
}
