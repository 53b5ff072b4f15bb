//! Postgres-backed reservation store.
//!
//! The per-item exclusive section maps to a transaction that locks the
//! item's row with `SELECT ... FOR UPDATE`; staged writes become ordinary
//! statements inside that transaction, so commit is atomic and dropping the
//! section rolls everything back. The schema carries declarative backstops
//! for the engine's rules: a `CHECK` on stock bounds, a partial unique index
//! for the one-active-lease rule, and a `UNIQUE` reservation column on
//! purchases.
//!
//! ## Error mapping
//!
//! | Postgres condition                  | `StoreError` |
//! |-------------------------------------|--------------|
//! | `23505` unique violation            | `Conflict`   |
//! | `40001` serialization failure       | `Conflict`   |
//! | `40P01` deadlock detected           | `Conflict`   |
//! | `23514` check violation             | `Constraint` |
//! | `23503` foreign key violation       | `Constraint` |
//! | pool closed, decoding, anything else| `Storage`    |

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;

use dropshop_core::{HolderId, ItemId, PurchaseId, ReservationId};
use dropshop_inventory::{Item, StockLevel};
use dropshop_reservations::{Purchase, Reservation, ReservationStatus};

use super::r#trait::{ItemSection, ReservationStore, StoreError};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS items (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL,
        price_cents BIGINT NOT NULL CHECK (price_cents > 0),
        image_url TEXT,
        starts_at TIMESTAMPTZ NOT NULL,
        total_stock INTEGER NOT NULL CHECK (total_stock > 0),
        available_stock INTEGER NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        CHECK (available_stock >= 0 AND available_stock <= total_stock)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS reservations (
        id UUID PRIMARY KEY,
        item_id UUID NOT NULL REFERENCES items(id),
        holder_id UUID NOT NULL,
        status TEXT NOT NULL CHECK (status IN ('active', 'completed', 'expired')),
        expires_at TIMESTAMPTZ NOT NULL,
        created_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS reservations_one_active_per_holder_item
        ON reservations (holder_id, item_id)
        WHERE status = 'active'
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS reservations_active_by_deadline
        ON reservations (expires_at)
        WHERE status = 'active'
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS purchases (
        id UUID PRIMARY KEY,
        holder_id UUID NOT NULL,
        item_id UUID NOT NULL REFERENCES items(id),
        reservation_id UUID NOT NULL UNIQUE REFERENCES reservations(id),
        purchased_at TIMESTAMPTZ NOT NULL
    )
    "#,
];

/// Postgres [`ReservationStore`]. Cheap to clone; clones share the pool.
#[derive(Debug, Clone)]
pub struct PostgresReservationStore {
    pool: Arc<PgPool>,
}

impl PostgresReservationStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Create tables and indexes if they do not exist yet.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        }
        Ok(())
    }
}

#[async_trait]
impl ReservationStore for PostgresReservationStore {
    type Section = PostgresItemSection;

    #[instrument(skip(self, item), fields(item_id = %item.id), err)]
    async fn insert_item(&self, item: &Item) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO items
                (id, name, price_cents, image_url, starts_at, total_stock, available_stock, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(item.id.as_uuid())
        .bind(&item.name)
        .bind(item.price_cents as i64)
        .bind(&item.image_url)
        .bind(item.starts_at)
        .bind(item.total_stock() as i32)
        .bind(item.available_stock() as i32)
        .bind(item.created_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_item", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(item_id = %item_id), err)]
    async fn get_item(&self, item_id: ItemId) -> Result<Option<Item>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE id = $1"
        ))
        .bind(item_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_item", e))?;
        row.map(|r| item_from_row(&r)).transpose()
    }

    #[instrument(skip(self), err)]
    async fn list_items(&self) -> Result<Vec<Item>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM items ORDER BY created_at DESC"
        ))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_items", e))?;
        rows.iter().map(item_from_row).collect()
    }

    #[instrument(skip(self), fields(reservation_id = %reservation_id), err)]
    async fn get_reservation(
        &self,
        reservation_id: ReservationId,
    ) -> Result<Option<Reservation>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE id = $1"
        ))
        .bind(reservation_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_reservation", e))?;
        row.map(|r| reservation_from_row(&r)).transpose()
    }

    #[instrument(skip(self), fields(holder_id = %holder_id, item_id = %item_id), err)]
    async fn find_active_reservation(
        &self,
        holder_id: HolderId,
        item_id: ItemId,
    ) -> Result<Option<Reservation>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations
             WHERE holder_id = $1 AND item_id = $2 AND status = 'active'"
        ))
        .bind(holder_id.as_uuid())
        .bind(item_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_active_reservation", e))?;
        row.map(|r| reservation_from_row(&r)).transpose()
    }

    #[instrument(skip(self), err)]
    async fn find_timed_out(&self, now: DateTime<Utc>) -> Result<Vec<Reservation>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations
             WHERE status = 'active' AND expires_at < $1
             ORDER BY expires_at ASC"
        ))
        .bind(now)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_timed_out", e))?;
        rows.iter().map(reservation_from_row).collect()
    }

    #[instrument(skip(self), fields(holder_id = %holder_id), err)]
    async fn list_purchases_by_holder(
        &self,
        holder_id: HolderId,
    ) -> Result<Vec<Purchase>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {PURCHASE_COLUMNS} FROM purchases
             WHERE holder_id = $1 ORDER BY purchased_at DESC"
        ))
        .bind(holder_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_purchases_by_holder", e))?;
        rows.iter().map(purchase_from_row).collect()
    }

    #[instrument(skip(self), fields(item_id = %item_id, limit), err)]
    async fn recent_purchases(
        &self,
        item_id: ItemId,
        limit: usize,
    ) -> Result<Vec<Purchase>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {PURCHASE_COLUMNS} FROM purchases
             WHERE item_id = $1 ORDER BY purchased_at DESC LIMIT $2"
        ))
        .bind(item_id.as_uuid())
        .bind(limit as i64)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("recent_purchases", e))?;
        rows.iter().map(purchase_from_row).collect()
    }

    #[instrument(skip(self), fields(item_id = %item_id), err)]
    async fn enter_item(&self, item_id: ItemId) -> Result<PostgresItemSection, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("enter_item", e))?;

        // The row lock is the per-item exclusive section: concurrent
        // sections on the same item queue here, other items are unaffected.
        let row = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE id = $1 FOR UPDATE"
        ))
        .bind(item_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("enter_item", e))?;

        let Some(row) = row else {
            return Err(StoreError::NotFound(format!("item {item_id}")));
        };
        let item = item_from_row(&row)?;

        Ok(PostgresItemSection {
            tx,
            item,
            staged_item: None,
            staged_reservations: Vec::new(),
            staged_purchases: Vec::new(),
        })
    }
}

/// Exclusive unit of work over one item, backed by a row-locking transaction.
pub struct PostgresItemSection {
    tx: Transaction<'static, Postgres>,
    item: Item,
    staged_item: Option<Item>,
    staged_reservations: Vec<Reservation>,
    staged_purchases: Vec<Purchase>,
}

#[async_trait]
impl ItemSection for PostgresItemSection {
    fn item(&self) -> &Item {
        &self.item
    }

    async fn active_reservation_for(
        &mut self,
        holder_id: HolderId,
    ) -> Result<Option<Reservation>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations
             WHERE holder_id = $1 AND item_id = $2 AND status = 'active'"
        ))
        .bind(holder_id.as_uuid())
        .bind(self.item.id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("active_reservation_for", e))?;
        row.map(|r| reservation_from_row(&r)).transpose()
    }

    async fn reservation(
        &mut self,
        reservation_id: ReservationId,
    ) -> Result<Option<Reservation>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE id = $1"
        ))
        .bind(reservation_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("reservation", e))?;
        row.map(|r| reservation_from_row(&r)).transpose()
    }

    fn stage_item(&mut self, item: Item) {
        self.staged_item = Some(item);
    }

    fn stage_reservation(&mut self, reservation: Reservation) {
        self.staged_reservations.push(reservation);
    }

    fn stage_purchase(&mut self, purchase: Purchase) {
        self.staged_purchases.push(purchase);
    }

    #[instrument(skip(self), fields(item_id = %self.item.id), err)]
    async fn commit(mut self) -> Result<(), StoreError> {
        if let Some(item) = &self.staged_item {
            // available_stock is the only column the engine ever updates.
            sqlx::query("UPDATE items SET available_stock = $2 WHERE id = $1")
                .bind(item.id.as_uuid())
                .bind(item.available_stock() as i32)
                .execute(&mut *self.tx)
                .await
                .map_err(|e| map_sqlx_error("commit_item", e))?;
        }

        for reservation in &self.staged_reservations {
            sqlx::query(
                r#"
                INSERT INTO reservations (id, item_id, holder_id, status, expires_at, created_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (id) DO UPDATE SET status = EXCLUDED.status
                "#,
            )
            .bind(reservation.id.as_uuid())
            .bind(reservation.item_id.as_uuid())
            .bind(reservation.holder_id.as_uuid())
            .bind(reservation.status.as_str())
            .bind(reservation.expires_at)
            .bind(reservation.created_at)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("commit_reservation", e))?;
        }

        for purchase in &self.staged_purchases {
            sqlx::query(
                r#"
                INSERT INTO purchases (id, holder_id, item_id, reservation_id, purchased_at)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(purchase.id.as_uuid())
            .bind(purchase.holder_id.as_uuid())
            .bind(purchase.item_id.as_uuid())
            .bind(purchase.reservation_id.as_uuid())
            .bind(purchase.purchased_at)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("commit_purchase", e))?;
        }

        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit", e))
    }
}

const ITEM_COLUMNS: &str =
    "id, name, price_cents, image_url, starts_at, total_stock, available_stock, created_at";
const RESERVATION_COLUMNS: &str = "id, item_id, holder_id, status, expires_at, created_at";
const PURCHASE_COLUMNS: &str = "id, holder_id, item_id, reservation_id, purchased_at";

fn item_from_row(row: &PgRow) -> Result<Item, StoreError> {
    let id: uuid::Uuid = try_column(row, "id")?;
    let total_stock: i32 = try_column(row, "total_stock")?;
    let available_stock: i32 = try_column(row, "available_stock")?;
    let price_cents: i64 = try_column(row, "price_cents")?;

    let total = u32::try_from(total_stock)
        .map_err(|_| StoreError::Storage(format!("item {id}: negative total_stock")))?;
    let available = u32::try_from(available_stock)
        .map_err(|_| StoreError::Storage(format!("item {id}: negative available_stock")))?;
    let stock = StockLevel::restore(total, available)
        .map_err(|e| StoreError::Storage(format!("item {id}: {e}")))?;
    let price_cents = u64::try_from(price_cents)
        .map_err(|_| StoreError::Storage(format!("item {id}: negative price_cents")))?;

    Ok(Item {
        id: ItemId::from_uuid(id),
        name: try_column(row, "name")?,
        price_cents,
        image_url: try_column(row, "image_url")?,
        starts_at: try_column(row, "starts_at")?,
        stock,
        created_at: try_column(row, "created_at")?,
    })
}

fn reservation_from_row(row: &PgRow) -> Result<Reservation, StoreError> {
    let id: uuid::Uuid = try_column(row, "id")?;
    let item_id: uuid::Uuid = try_column(row, "item_id")?;
    let holder_id: uuid::Uuid = try_column(row, "holder_id")?;
    let status: String = try_column(row, "status")?;

    Ok(Reservation {
        id: ReservationId::from_uuid(id),
        item_id: ItemId::from_uuid(item_id),
        holder_id: HolderId::from_uuid(holder_id),
        status: parse_status(&status)?,
        expires_at: try_column(row, "expires_at")?,
        created_at: try_column(row, "created_at")?,
    })
}

fn purchase_from_row(row: &PgRow) -> Result<Purchase, StoreError> {
    let id: uuid::Uuid = try_column(row, "id")?;
    let holder_id: uuid::Uuid = try_column(row, "holder_id")?;
    let item_id: uuid::Uuid = try_column(row, "item_id")?;
    let reservation_id: uuid::Uuid = try_column(row, "reservation_id")?;

    Ok(Purchase {
        id: PurchaseId::from_uuid(id),
        holder_id: HolderId::from_uuid(holder_id),
        item_id: ItemId::from_uuid(item_id),
        reservation_id: ReservationId::from_uuid(reservation_id),
        purchased_at: try_column(row, "purchased_at")?,
    })
}

fn try_column<'r, T>(row: &'r PgRow, column: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(column)
        .map_err(|e| StoreError::Storage(format!("failed to decode column {column}: {e}")))
}

fn parse_status(raw: &str) -> Result<ReservationStatus, StoreError> {
    match raw {
        "active" => Ok(ReservationStatus::Active),
        "completed" => Ok(ReservationStatus::Completed),
        "expired" => Ok(ReservationStatus::Expired),
        other => Err(StoreError::Storage(format!(
            "unknown reservation status '{other}'"
        ))),
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let message = format!("database error in {operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                // Unique violation: another writer won the race on the
                // one-active-lease index or the purchase uniqueness rule.
                // Retrying re-reads under the row lock and surfaces the
                // domain outcome cleanly.
                Some("23505") => StoreError::Conflict(message),
                // Serialization failure under stricter isolation levels.
                Some("40001") => StoreError::Conflict(message),
                // Deadlock detected; one participant retries.
                Some("40P01") => StoreError::Conflict(message),
                // Check violation: the stock-bounds backstop fired.
                Some("23514") => StoreError::Constraint(message),
                // Foreign key violation.
                Some("23503") => StoreError::Constraint(message),
                _ => StoreError::Storage(message),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Storage(format!("connection pool closed during {operation}"))
        }
        sqlx::Error::RowNotFound => {
            StoreError::NotFound(format!("row missing during {operation}"))
        }
        other => StoreError::Storage(format!("database failure in {operation}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_status_round_trips_known_values() {
        for status in [
            ReservationStatus::Active,
            ReservationStatus::Completed,
            ReservationStatus::Expired,
        ] {
            assert_eq!(parse_status(status.as_str()).unwrap(), status);
        }
    }

    #[test]
    fn parse_status_rejects_unknown_values() {
        let result = parse_status("pending");
        assert!(matches!(result, Err(StoreError::Storage(_))));
    }
}
