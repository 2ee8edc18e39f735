//! # Reservation Sweeper
//!
//! Releases stock holds abandoned by a sale that never reached its
//! transaction (crashed request, dropped connection).
//!
//! ```text
//!   every sweep_interval_secs:
//!       release_expired(now - reservation_ttl_secs)
//!            │
//!            └── holds committed in the meantime are skipped by the ledger
//! ```

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use nexus_db::{Database, DbResult, Reservation};

use crate::config::InventoryConfig;

/// Stops the sweeper task.
pub struct SweeperHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    pub async fn shutdown(self) {
        if self.shutdown_tx.send(()).await.is_err() {
            debug!("Sweeper already stopped");
        }
        if let Err(e) = self.task.await {
            warn!(error = %e, "Sweeper task ended abnormally");
        }
    }
}

pub struct ReservationSweeper {
    db: Database,
    ttl: chrono::Duration,
    interval: Duration,
}

impl ReservationSweeper {
    pub fn new(db: Database, config: &InventoryConfig) -> Self {
        ReservationSweeper {
            db,
            ttl: chrono::Duration::seconds(config.reservation_ttl_secs as i64),
            interval: Duration::from_secs(config.sweep_interval_secs.max(1)),
        }
    }

    /// Releases holds older than the TTL as of `now`.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> DbResult<Vec<Reservation>> {
        let released = self.db.inventory().release_expired(now - self.ttl).await?;

        for hold in &released {
            info!(
                hold_id = %hold.id,
                product_id = %hold.product_id,
                store_id = %hold.store_id,
                quantity = hold.quantity,
                "Released expired stock hold"
            );
        }

        Ok(released)
    }

    pub fn start(self) -> SweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!(
                interval_secs = self.interval.as_secs(),
                ttl_secs = self.ttl.num_seconds(),
                "Reservation sweeper started"
            );

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.sweep_at(Utc::now()).await {
                            error!(error = %e, "Reservation sweep failed");
                        }
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }

            info!("Reservation sweeper stopped");
        });

        SweeperHandle { shutdown_tx, task }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_core::{Product, DEFAULT_LOW_STOCK_THRESHOLD};
    use nexus_db::{new_id, DbConfig};

    async fn stocked(db: &Database) -> (String, String) {
        let store = db.stores().create("BLR01", "Bengaluru", None, None).await.unwrap();
        let now = Utc::now();
        let product = Product {
            id: new_id(),
            sku: "LAP-001".into(),
            barcode: None,
            name: "Laptop".into(),
            brand: None,
            model: None,
            category: None,
            description: None,
            price_cents: 50_000_00,
            cost_cents: None,
            low_stock_threshold: DEFAULT_LOW_STOCK_THRESHOLD,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        let product = db.products().insert(&product).await.unwrap();
        db.inventory().set_stock(&product.id, &store.id, 10, None).await.unwrap();
        (product.id, store.id)
    }

    #[tokio::test]
    async fn test_sweep_releases_only_uncommitted_holds() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let (product_id, store_id) = stocked(&db).await;

        let abandoned = db.inventory().reserve(&product_id, &store_id, 3).await.unwrap();
        let sold = db.inventory().reserve(&product_id, &store_id, 2).await.unwrap();
        db.inventory().commit(&sold).await.unwrap();

        let sweeper = ReservationSweeper::new(db.clone(), &InventoryConfig::default());

        let early = sweeper.sweep_at(Utc::now()).await.unwrap();
        assert!(early.is_empty());

        let later = Utc::now() + chrono::Duration::seconds(InventoryConfig::default().reservation_ttl_secs as i64 + 1);
        let released = sweeper.sweep_at(later).await.unwrap();
        assert_eq!(released.len(), 1);
        assert_eq!(released[0].id, abandoned.id);

        let level = db.inventory().level(&product_id, &store_id).await.unwrap().unwrap();
        assert_eq!(level.stock, 8);
        assert_eq!(level.reserved, 0);
        assert_eq!(db.inventory().outstanding_holds().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sweeper_task_stops_on_shutdown() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let handle = ReservationSweeper::new(db, &InventoryConfig::default()).start();
        handle.shutdown().await;
    }
}
