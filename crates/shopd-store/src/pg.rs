//! PostgreSQL [`RowStore`].
//!
//! Runtime sqlx queries only (no compile-time checked macros) so the crate
//! builds without a live database. Schema lives in `migrations/` and is
//! applied with [`PgStore::migrate`]; the CHECK constraints there mirror the
//! domain invariants so even a buggy writer cannot persist an illegal row.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use shopd_schemas::{Order, OrderStatus, PaymentStatus, Product};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::{
    CommitOutcome, OrderFilter, OrderRecord, ProductFilter, ProductRecord, RowStore,
    TransitionCommit,
};

pub const ENV_DB_URL: &str = "SHOPD_DATABASE_URL";

/// Connectivity + schema presence, for the daemon status endpoint.
#[derive(Debug, Clone)]
pub struct PgStoreStatus {
    pub ok: bool,
    pub has_orders_table: bool,
}

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to Postgres using SHOPD_DATABASE_URL.
    pub async fn connect_from_env() -> Result<Self> {
        let url = std::env::var(ENV_DB_URL)
            .with_context(|| format!("missing env var {ENV_DB_URL}"))?;

        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(&url)
            .await
            .context("failed to connect to Postgres")?;

        Ok(Self { pool })
    }

    /// Run embedded SQLx migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("db migrate failed")?;
        Ok(())
    }

    /// Simple status query (connectivity + schema presence).
    pub async fn status(&self) -> Result<PgStoreStatus> {
        let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
            .fetch_one(&self.pool)
            .await
            .context("status connectivity query failed")?;
        let ok = one == 1;

        let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
            r#"
            select exists (
                select 1
                from information_schema.tables
                where table_schema='public' and table_name='orders'
            )
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .context("status table-exists query failed")?;

        Ok(PgStoreStatus {
            ok,
            has_orders_table: exists,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn product_from_row(row: &PgRow) -> Result<ProductRecord> {
    Ok(ProductRecord {
        product: Product {
            id: row.try_get("id")?,
            brand: row.try_get("brand")?,
            model: row.try_get("model")?,
            category: row.try_get("category")?,
            specs: row.try_get("specs")?,
            featured: row.try_get("featured")?,
            price_cents: row.try_get("price_cents")?,
            stock: row.try_get("stock")?,
            reserved: row.try_get("reserved")?,
            created_at: row.try_get("created_at")?,
        },
        version: row.try_get("row_version")?,
    })
}

fn order_from_row(row: &PgRow) -> Result<OrderRecord> {
    let status_raw: String = row.try_get("status")?;
    let status = OrderStatus::parse(&status_raw)
        .ok_or_else(|| anyhow!("invalid order status in db: {status_raw}"))?;
    let payment_raw: String = row.try_get("payment_status")?;
    let payment_status = PaymentStatus::parse(&payment_raw)
        .ok_or_else(|| anyhow!("invalid payment status in db: {payment_raw}"))?;

    Ok(OrderRecord {
        order: Order {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            product_id: row.try_get("product_id")?,
            product_name: row.try_get("product_name")?,
            quantity: row.try_get("quantity")?,
            unit_price_cents: row.try_get("unit_price_cents")?,
            total_amount_cents: row.try_get("total_amount_cents")?,
            advance_amount_cents: row.try_get("advance_amount_cents")?,
            customer_name: row.try_get("customer_name")?,
            phone: row.try_get("phone")?,
            address: row.try_get("address")?,
            status,
            payment_status,
            admin_notes: row.try_get("admin_notes")?,
            created_at: row.try_get("created_at")?,
            verified_at: row.try_get("verified_at")?,
            paid_at: row.try_get("paid_at")?,
            completed_at: row.try_get("completed_at")?,
        },
        version: row.try_get("row_version")?,
    })
}

const SELECT_PRODUCT: &str = r#"
select id, brand, model, category, specs, featured, price_cents,
       stock, reserved, row_version, created_at
from products
"#;

const SELECT_ORDER: &str = r#"
select id, user_id, product_id, product_name, quantity,
       unit_price_cents, total_amount_cents, advance_amount_cents,
       customer_name, phone, address, status, payment_status, admin_notes,
       row_version, created_at, verified_at, paid_at, completed_at
from orders
"#;

#[async_trait]
impl RowStore for PgStore {
    async fn insert_product(&self, product: &Product) -> Result<()> {
        sqlx::query(
            r#"
            insert into products (
              id, brand, model, category, specs, featured, price_cents,
              stock, reserved, created_at
            ) values (
              $1, $2, $3, $4, $5, $6, $7, $8, $9, $10
            )
            "#,
        )
        .bind(product.id)
        .bind(&product.brand)
        .bind(&product.model)
        .bind(&product.category)
        .bind(&product.specs)
        .bind(product.featured)
        .bind(product.price_cents)
        .bind(product.stock)
        .bind(product.reserved)
        .bind(product.created_at)
        .execute(&self.pool)
        .await
        .context("insert_product failed")?;

        Ok(())
    }

    async fn fetch_product(&self, product_id: Uuid) -> Result<Option<ProductRecord>> {
        let row = sqlx::query(&format!("{SELECT_PRODUCT} where id = $1"))
            .bind(product_id)
            .fetch_optional(&self.pool)
            .await
            .context("fetch_product failed")?;

        row.as_ref().map(product_from_row).transpose()
    }

    async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>> {
        let rows = sqlx::query(&format!(
            r#"
            {SELECT_PRODUCT}
            where ($1::text is null or category = $1)
              and ($2::text is null or brand = $2)
              and ($3::boolean is null or featured = $3)
              and ($4::bigint is null or price_cents >= $4)
              and ($5::bigint is null or price_cents <= $5)
            order by created_at desc, id
            "#
        ))
        .bind(filter.category.as_deref())
        .bind(filter.brand.as_deref())
        .bind(filter.featured)
        .bind(filter.min_price_cents)
        .bind(filter.max_price_cents)
        .fetch_all(&self.pool)
        .await
        .context("list_products failed")?;

        rows.iter()
            .map(|row| product_from_row(row).map(|rec| rec.product))
            .collect()
    }

    async fn insert_order(&self, order: &Order) -> Result<()> {
        sqlx::query(
            r#"
            insert into orders (
              id, user_id, product_id, product_name, quantity,
              unit_price_cents, total_amount_cents, advance_amount_cents,
              customer_name, phone, address, status, payment_status,
              admin_notes, created_at
            ) values (
              $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15
            )
            "#,
        )
        .bind(order.id)
        .bind(order.user_id)
        .bind(order.product_id)
        .bind(&order.product_name)
        .bind(order.quantity)
        .bind(order.unit_price_cents)
        .bind(order.total_amount_cents)
        .bind(order.advance_amount_cents)
        .bind(&order.customer_name)
        .bind(&order.phone)
        .bind(&order.address)
        .bind(order.status.as_str())
        .bind(order.payment_status.as_str())
        .bind(&order.admin_notes)
        .bind(order.created_at)
        .execute(&self.pool)
        .await
        .context("insert_order failed")?;

        Ok(())
    }

    async fn fetch_order(&self, order_id: Uuid) -> Result<Option<OrderRecord>> {
        let row = sqlx::query(&format!("{SELECT_ORDER} where id = $1"))
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await
            .context("fetch_order failed")?;

        row.as_ref().map(order_from_row).transpose()
    }

    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>> {
        let rows = sqlx::query(&format!(
            r#"
            {SELECT_ORDER}
            where ($1::uuid is null or user_id = $1)
            order by created_at desc, id
            "#
        ))
        .bind(filter.user_id)
        .fetch_all(&self.pool)
        .await
        .context("list_orders failed")?;

        rows.iter()
            .map(|row| order_from_row(row).map(|rec| rec.order))
            .collect()
    }

    async fn commit_transition(&self, commit: &TransitionCommit) -> Result<CommitOutcome> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("commit_transition: begin failed")?;

        // Only the mutable order columns are in the UPDATE list; identity and
        // amount columns cannot drift no matter what the caller passes.
        let o = &commit.order;
        let res = sqlx::query(
            r#"
            update orders
            set status = $1,
                payment_status = $2,
                admin_notes = $3,
                verified_at = $4,
                paid_at = $5,
                completed_at = $6,
                row_version = row_version + 1
            where id = $7 and row_version = $8
            "#,
        )
        .bind(o.status.as_str())
        .bind(o.payment_status.as_str())
        .bind(&o.admin_notes)
        .bind(o.verified_at)
        .bind(o.paid_at)
        .bind(o.completed_at)
        .bind(o.id)
        .bind(commit.expected_order_version)
        .execute(&mut *tx)
        .await
        .context("commit_transition: order update failed")?;

        if res.rows_affected() != 1 {
            tx.rollback()
                .await
                .context("commit_transition: rollback failed")?;
            return Ok(CommitOutcome::Conflict);
        }

        if let Some(c) = &commit.counters {
            let res = sqlx::query(
                r#"
                update products
                set stock = $1,
                    reserved = $2,
                    row_version = row_version + 1
                where id = $3 and row_version = $4
                "#,
            )
            .bind(c.stock)
            .bind(c.reserved)
            .bind(c.product_id)
            .bind(c.expected_version)
            .execute(&mut *tx)
            .await
            .context("commit_transition: counter update failed")?;

            if res.rows_affected() != 1 {
                tx.rollback()
                    .await
                    .context("commit_transition: rollback failed")?;
                return Ok(CommitOutcome::Conflict);
            }
        }

        tx.commit()
            .await
            .context("commit_transition: commit failed")?;
        Ok(CommitOutcome::Committed)
    }

    async fn update_order_notes(
        &self,
        order_id: Uuid,
        expected_version: i64,
        notes: &str,
    ) -> Result<CommitOutcome> {
        let res = sqlx::query(
            r#"
            update orders
            set admin_notes = $1,
                row_version = row_version + 1
            where id = $2 and row_version = $3
            "#,
        )
        .bind(notes)
        .bind(order_id)
        .bind(expected_version)
        .execute(&self.pool)
        .await
        .context("update_order_notes failed")?;

        Ok(if res.rows_affected() == 1 {
            CommitOutcome::Committed
        } else {
            CommitOutcome::Conflict
        })
    }
}
