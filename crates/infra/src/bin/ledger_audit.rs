//! Verify every product's movement ledger against its on-hand quantity.
//!
//! Exits non-zero when any ledger fails to replay.

use anyhow::{Context, bail};
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

use storefront_infra::store::{InventoryStore, PostgresInventoryStore};
use storefront_infra::{InventoryConfig, InventoryService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    storefront_observability::init();

    let config = InventoryConfig::from_env();
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

    let pool = PgPoolOptions::new()
        .max_connections(4)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;
    let store = PostgresInventoryStore::new(pool, config.lock_timeout);
    store.ensure_schema().await.context("failed to prepare schema")?;

    let service = InventoryService::new(store, config);
    let inconsistent = tokio::task::spawn_blocking(move || audit_all(&service))
        .await
        .context("ledger audit task failed")??;

    if inconsistent > 0 {
        bail!("{inconsistent} inconsistent ledger(s)");
    }
    info!("all ledgers consistent");
    Ok(())
}

fn audit_all(service: &InventoryService<PostgresInventoryStore>) -> anyhow::Result<usize> {
    let records = service.store().list_records()?;
    info!(products = records.len(), "auditing ledgers");

    let mut inconsistent = 0usize;
    for record in records {
        let product_id = record.product_id();
        let audit = service
            .verify_ledger(product_id)
            .with_context(|| format!("auditing product {product_id}"))?;
        if !audit.is_consistent() {
            inconsistent += 1;
            warn!(
                product_id = %product_id,
                movements = audit.movement_count,
                replayed = audit.replayed_quantity,
                on_hand = audit.on_hand,
                breaks = ?audit.breaks,
                "ledger inconsistent"
            );
        }
    }
    Ok(inconsistent)
}
