//! Postgres-backed stock ledger.
//!
//! Every mutation is one SQL statement, so the row lock Postgres takes for
//! the statement is the only synchronization involved:
//!
//! | Operation | Statement |
//! |-----------|-----------|
//! | replenish | `INSERT .. ON CONFLICT (id) DO UPDATE SET quantity = products.quantity + EXCLUDED.quantity` |
//! | reserve   | `UPDATE .. SET quantity = quantity - $2 WHERE id = $1 AND quantity >= $2` |
//! | find      | `SELECT id, quantity .. WHERE id = $1` |
//!
//! ## Error Mapping
//!
//! | Outcome | LedgerError |
//! |---------|-------------|
//! | lookup returned no row | `NotFound` |
//! | Database (any code, incl. `23514` check violation) | `Storage` |
//! | PoolClosed / PoolTimedOut / Io / other | `Storage` |

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool, Row};
use tracing::{Span, error, instrument};

use stockgate_core::{ProductId, Quantity};
use stockgate_inventory::{LedgerError, LedgerResult, Product, Replenished, StockLedger};

const CREATE_PRODUCTS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS products (
        id BIGINT PRIMARY KEY,
        quantity BIGINT NOT NULL CHECK (quantity >= 0)
    )
"#;

/// Ledger over the `products` table.
///
/// `Clone` is cheap; clones share the pool.
#[derive(Debug, Clone)]
pub struct PostgresStockLedger {
    pool: Arc<PgPool>,
}

impl PostgresStockLedger {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Create the `products` table if it does not exist yet.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> LedgerResult<()> {
        sqlx::query(CREATE_PRODUCTS_TABLE)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }

    /// Close the underlying pool (graceful shutdown).
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl StockLedger for PostgresStockLedger {
    #[instrument(
        skip(self),
        fields(product_id = %id, quantity = %quantity, level = tracing::field::Empty)
    )]
    async fn replenish(&self, id: ProductId, quantity: Quantity) -> LedgerResult<Replenished> {
        let row = sqlx::query(
            r#"
            INSERT INTO products (id, quantity)
            VALUES ($1, $2)
            ON CONFLICT (id)
            DO UPDATE SET quantity = products.quantity + EXCLUDED.quantity
            RETURNING quantity
            "#,
        )
        .bind(id.get())
        .bind(quantity.get())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("replenish", e))?;

        let level: i64 = row
            .try_get("quantity")
            .map_err(|e| map_sqlx_error("replenish", e))?;

        Span::current().record("level", level);
        Ok(Replenished {
            rows_affected: 1,
            quantity: level,
        })
    }

    #[instrument(skip(self), fields(product_id = %id, quantity = %quantity))]
    async fn reserve(&self, id: ProductId, quantity: Quantity) -> LedgerResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE products
            SET quantity = quantity - $2
            WHERE id = $1 AND quantity >= $2
            "#,
        )
        .bind(id.get())
        .bind(quantity.get())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("reserve", e))?;

        Ok(result.rows_affected())
    }

    #[instrument(skip(self), fields(product_id = %id))]
    async fn find_by_id(&self, id: ProductId) -> LedgerResult<Product> {
        let row = sqlx::query("SELECT id, quantity FROM products WHERE id = $1")
            .bind(id.get())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_by_id", e))?;

        let Some(row) = row else {
            return Err(LedgerError::NotFound(id));
        };

        let product = ProductRow::from_row(&row)
            .map_err(|e| map_sqlx_error("find_by_id", e))?
            .into_product()?;
        Ok(product)
    }
}

/// Raw `products` row as stored.
#[derive(Debug)]
struct ProductRow {
    id: i64,
    quantity: i64,
}

impl<'r> FromRow<'r, PgRow> for ProductRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ProductRow {
            id: row.try_get("id")?,
            quantity: row.try_get("quantity")?,
        })
    }
}

impl ProductRow {
    fn into_product(self) -> LedgerResult<Product> {
        let id = ProductId::new(self.id)
            .map_err(|e| LedgerError::Storage(format!("corrupt products row: {e}")))?;
        Ok(Product::new(id, self.quantity))
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> LedgerError {
    let msg = match &err {
        sqlx::Error::Database(db_err) => format!(
            "database error in {operation} (code {}): {}",
            db_err.code().as_deref().unwrap_or("none"),
            db_err.message()
        ),
        sqlx::Error::PoolClosed => format!("connection pool closed in {operation}"),
        sqlx::Error::PoolTimedOut => format!("connection pool timed out in {operation}"),
        _ => format!("sqlx error in {operation}: {err}"),
    };
    error!(operation, error = %msg, "ledger store failure");
    LedgerError::Storage(msg)
}
