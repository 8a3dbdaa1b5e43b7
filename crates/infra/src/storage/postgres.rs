//! Postgres-backed order store.
//!
//! ## Schema
//!
//! `bootstrap()` creates (if missing):
//!
//! - `orders`: one row per order number; `user_id` is nullable because the
//!   scheduler may learn about an order before anyone claims it
//! - `balances`: one row per user, created on the first credit
//!
//! ## Atomicity
//!
//! `set_order` runs in a single transaction: the current row is locked with
//! `SELECT ... FOR UPDATE`, the transition is checked, the upsert is applied
//! and the balance is credited before commit. Two concurrent writers for the
//! same number are serialized by the row lock, so a balance is credited at
//! most once per order.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Storage` (retryable by the caller) |
//! | Database (other) | Any other | `Storage` |
//! | PoolClosed | N/A | `Storage` |
//! | Other | N/A | `Storage` |

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use loyalty_core::{Balance, Order, OrderAction, OrderNumber, OrderStatus, UserId};

use super::{check_registration, check_transition, OrderStore, StoreError};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS orders (
        number        TEXT PRIMARY KEY,
        user_id       UUID NULL,
        status        TEXT NOT NULL,
        action        TEXT NOT NULL DEFAULT 'add',
        accrual       NUMERIC(12, 2) NOT NULL DEFAULT 0,
        uploaded_at   TIMESTAMPTZ NOT NULL DEFAULT now(),
        processed_at  TIMESTAMPTZ NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS orders_user_uploaded_idx
        ON orders (user_id, uploaded_at)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS balances (
        user_id    UUID PRIMARY KEY,
        current    NUMERIC(12, 2) NOT NULL DEFAULT 0,
        withdrawn  NUMERIC(12, 2) NOT NULL DEFAULT 0
    )
    "#,
];

/// Postgres order store.
#[derive(Debug, Clone)]
pub struct PostgresOrderStore {
    pool: Arc<PgPool>,
}

impl PostgresOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Connect to `database_uri` with a small pool.
    pub async fn connect(database_uri: &str) -> Result<Self, StoreError> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(database_uri)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create tables and indexes if they do not exist yet.
    #[instrument(skip(self), err)]
    pub async fn bootstrap(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("bootstrap", e))?;
        }
        Ok(())
    }

    async fn begin(&self, operation: &str) -> Result<Transaction<'_, Postgres>, StoreError> {
        self.pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error(operation, e))
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    #[instrument(skip(self, order), fields(order = %order.number), err)]
    async fn register_order(&self, order: &Order) -> Result<(), StoreError> {
        let mut tx = self.begin("register_order").await?;

        let existing = sqlx::query("SELECT user_id FROM orders WHERE number = $1 FOR UPDATE")
            .bind(order.number.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("register_order", e))?;

        let uploader = order.user_id.map(Uuid::from);
        match existing {
            Some(row) => {
                let owner: Option<Uuid> = row
                    .try_get("user_id")
                    .map_err(|e| map_sqlx_error("register_order", e))?;
                if owner.is_some() {
                    return Err(check_registration(
                        &order.number,
                        owner.map(UserId::from_uuid),
                        order.user_id,
                    ));
                }
                sqlx::query("UPDATE orders SET user_id = $2, uploaded_at = $3 WHERE number = $1")
                    .bind(order.number.as_str())
                    .bind(uploader)
                    .bind(order.uploaded_at)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| map_sqlx_error("register_order", e))?;
            }
            None => {
                sqlx::query(
                    r#"
                    INSERT INTO orders (number, user_id, status, action, accrual, uploaded_at)
                    VALUES ($1, $2, $3, $4, $5, $6)
                    "#,
                )
                .bind(order.number.as_str())
                .bind(uploader)
                .bind(order.status.as_str())
                .bind(order.action.as_str())
                .bind(order.accrual)
                .bind(order.uploaded_at)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("register_order", e))?;
            }
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("register_order", e))
    }

    #[instrument(skip(self, order), fields(order = %order.number, status = %order.status), err)]
    async fn set_order(&self, order: &Order) -> Result<(), StoreError> {
        let mut tx = self.begin("set_order").await?;

        let current = sqlx::query("SELECT status FROM orders WHERE number = $1 FOR UPDATE")
            .bind(order.number.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_order", e))?;
        let previous = match current {
            Some(row) => {
                let raw: String = row
                    .try_get("status")
                    .map_err(|e| map_sqlx_error("set_order", e))?;
                Some(parse_status(&raw)?)
            }
            None => None,
        };
        check_transition(&order.number, previous, order.status)?;

        let row = sqlx::query(
            r#"
            INSERT INTO orders (number, user_id, status, action, accrual, uploaded_at, processed_at)
            VALUES ($1, $2, $3, $4, $5, $6, now())
            ON CONFLICT (number) DO UPDATE SET
                status = EXCLUDED.status,
                action = EXCLUDED.action,
                accrual = EXCLUDED.accrual,
                processed_at = now()
            RETURNING user_id
            "#,
        )
        .bind(order.number.as_str())
        .bind(order.user_id.map(Uuid::from))
        .bind(order.status.as_str())
        .bind(order.action.as_str())
        .bind(order.accrual)
        .bind(order.uploaded_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("set_order", e))?;

        let owner: Option<Uuid> = row
            .try_get("user_id")
            .map_err(|e| map_sqlx_error("set_order", e))?;

        if order.credits_balance() && previous != Some(OrderStatus::Processed) {
            if let Some(user_id) = owner {
                sqlx::query(
                    r#"
                    INSERT INTO balances (user_id, current, withdrawn)
                    VALUES ($1, $2, 0)
                    ON CONFLICT (user_id) DO UPDATE SET
                        current = balances.current + EXCLUDED.current
                    "#,
                )
                .bind(user_id)
                .bind(order.accrual)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("set_order", e))?;
            }
        }

        tx.commit().await.map_err(|e| map_sqlx_error("set_order", e))
    }

    #[instrument(skip(self), fields(order = %number), err)]
    async fn get_order(&self, number: &OrderNumber) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT number, user_id, status, action, accrual, uploaded_at, processed_at
            FROM orders
            WHERE number = $1
            "#,
        )
        .bind(number.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_order", e))?;

        row.map(|r| OrderRow::from_pg(&r).and_then(OrderRow::into_order))
            .transpose()
    }

    #[instrument(skip(self), fields(user_id = %user_id), err)]
    async fn list_user_orders(&self, user_id: UserId) -> Result<Vec<Order>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT number, user_id, status, action, accrual, uploaded_at, processed_at
            FROM orders
            WHERE user_id = $1
            ORDER BY uploaded_at ASC
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_user_orders", e))?;

        let mut orders = Vec::with_capacity(rows.len());
        for row in rows {
            orders.push(OrderRow::from_pg(&row)?.into_order()?);
        }
        Ok(orders)
    }

    #[instrument(skip(self), fields(user_id = %user_id), err)]
    async fn balance(&self, user_id: UserId) -> Result<Balance, StoreError> {
        let row = sqlx::query("SELECT current, withdrawn FROM balances WHERE user_id = $1")
            .bind(user_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("balance", e))?;

        let Some(row) = row else {
            return Ok(Balance::empty(user_id));
        };
        Ok(Balance {
            user_id,
            current: row
                .try_get("current")
                .map_err(|e| map_sqlx_error("balance", e))?,
            withdrawn: row
                .try_get("withdrawn")
                .map_err(|e| map_sqlx_error("balance", e))?,
        })
    }
}

struct OrderRow {
    number: String,
    user_id: Option<Uuid>,
    status: String,
    action: String,
    accrual: Decimal,
    uploaded_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
}

impl OrderRow {
    fn from_pg(row: &sqlx::postgres::PgRow) -> Result<Self, StoreError> {
        let read = |e| map_sqlx_error("decode order row", e);
        Ok(OrderRow {
            number: row.try_get("number").map_err(read)?,
            user_id: row.try_get("user_id").map_err(read)?,
            status: row.try_get("status").map_err(read)?,
            action: row.try_get("action").map_err(read)?,
            accrual: row.try_get("accrual").map_err(read)?,
            uploaded_at: row.try_get("uploaded_at").map_err(read)?,
            processed_at: row.try_get("processed_at").map_err(read)?,
        })
    }

    fn into_order(self) -> Result<Order, StoreError> {
        Ok(Order {
            number: OrderNumber::new(self.number)
                .map_err(|e| StoreError::Storage(format!("stored order number: {e}")))?,
            user_id: self.user_id.map(UserId::from_uuid),
            status: parse_status(&self.status)?,
            action: OrderAction::from_str(&self.action)
                .map_err(|e| StoreError::Storage(format!("stored order action: {e}")))?,
            accrual: self.accrual,
            uploaded_at: self.uploaded_at,
            processed_at: self.processed_at,
        })
    }
}

fn parse_status(raw: &str) -> Result<OrderStatus, StoreError> {
    OrderStatus::from_str(raw).map_err(|e| StoreError::Storage(format!("stored order status: {e}")))
}

/// Map SQLx errors to `StoreError`.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let code = db_err.code().map(|c| c.into_owned()).unwrap_or_default();
            StoreError::Storage(format!(
                "database error in {operation} ({code}): {}",
                db_err.message()
            ))
        }
        sqlx::Error::PoolClosed => {
            StoreError::Storage(format!("connection pool closed in {operation}"))
        }
        _ => StoreError::Storage(format!("sqlx error in {operation}: {err}")),
    }
}
