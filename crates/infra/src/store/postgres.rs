//! Postgres-backed billing store.
//!
//! Read-write transactions run at `SERIALIZABLE`; stock reservation is a single
//! conditional `UPDATE ... WHERE stock >= $qty`, and id counters are locked with
//! `SELECT ... FOR UPDATE`, so concurrent operations either serialize or fail
//! with a retryable conflict.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (serialization failure / deadlock) | `40001` / `40P01` | `Conflict` |
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (foreign key / check violation) | `23503` / `23514` | `Constraint` |
//! | Database (other) | any other | `Backend` |
//! | PoolTimedOut / PoolClosed / Io / Tls | N/A | `Unavailable` |
//! | ColumnDecode / ColumnNotFound / Decode | N/A | `Corrupt` |

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

use billbook_core::{
    CustomerId, DomainError, EntityKind, InvoiceId, Money, ProductId, SellerId,
};
use billbook_events::{Activity, ActorRole};
use billbook_inventory::Product;
use billbook_invoicing::{
    Invoice, InvoiceFilter, InvoiceItem, InvoiceItemId, InvoiceParts, InvoiceStatus,
};
use billbook_parties::{Credential, Customer, Seller};

use super::r#trait::{BillingStore, InvoiceSummary, ReserveOutcome, StoreError, StoreTx};
use crate::config::DatabaseConfig;

/// Idempotent schema, applied by [`PgStore::ensure_schema`].
pub const SCHEMA: &str = include_str!("../../migrations/0001_billbook.sql");

/// Postgres-backed billing store.
///
/// Uses the SQLx connection pool, which is `Send + Sync`; cloning is cheap.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: Arc<PgPool>,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Open a pool from configuration.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl BillingStore for PgStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_isolation", e))?;
        Ok(Box::new(PgTx { tx }))
    }

    async fn begin_read(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL READ COMMITTED READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_isolation", e))?;
        Ok(Box::new(PgTx { tx }))
    }
}

/// An open Postgres transaction. Dropping it rolls back.
pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

fn table(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Seller => "sellers",
        EntityKind::Customer => "customers",
        EntityKind::Product => "products",
        EntityKind::Invoice => "invoices",
    }
}

/// Escape `%`, `_` and `\` so user text matches literally inside `ILIKE`.
fn like_pattern(needle: &str) -> String {
    let mut out = String::with_capacity(needle.len() + 2);
    out.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}

const SELLER_COLUMNS: &str = "id, name, email, address, phone, credential";
const CUSTOMER_COLUMNS: &str = "id, seller_id, name, email, phone, address";
const PRODUCT_COLUMNS: &str = "id, seller_id, name, price_cents, description, stock";
const INVOICE_COLUMNS: &str =
    "i.id, i.seller_id, i.customer_id, i.created_at, i.due_date, i.status, i.tax_cents, i.amount_cents";

#[async_trait]
impl StoreTx for PgTx {
    #[instrument(skip(self), err)]
    async fn counter_value(&mut self, kind: EntityKind) -> Result<Option<u32>, StoreError> {
        let value: Option<i64> =
            sqlx::query_scalar("SELECT last_value FROM id_counters WHERE kind = $1 FOR UPDATE")
                .bind(kind.as_str())
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(|e| map_sqlx_error("counter_value", e))?;
        value.map(to_u32).transpose()
    }

    async fn store_counter(&mut self, kind: EntityKind, value: u32) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO id_counters (kind, last_value)
            VALUES ($1, $2)
            ON CONFLICT (kind) DO UPDATE SET last_value = EXCLUDED.last_value
            "#,
        )
        .bind(kind.as_str())
        .bind(i64::from(value))
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("store_counter", e))?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn max_allocated_suffix(&mut self, kind: EntityKind) -> Result<Option<u32>, StoreError> {
        let sql = format!("SELECT id FROM {} WHERE id LIKE $1", table(kind));
        let ids: Vec<String> = sqlx::query_scalar(&sql)
            .bind(format!("{}%", kind.prefix()))
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("max_allocated_suffix", e))?;
        let max = ids.iter().filter_map(|id| kind.parse_suffix(id)).max();
        debug!(%kind, scanned = ids.len(), ?max, "reconciled id counter from existing rows");
        Ok(max)
    }

    async fn id_exists(&mut self, kind: EntityKind, number: u32) -> Result<bool, StoreError> {
        let sql = format!("SELECT EXISTS (SELECT 1 FROM {} WHERE id = $1)", table(kind));
        sqlx::query_scalar(&sql)
            .bind(kind.format(number))
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("id_exists", e))
    }

    async fn insert_seller(&mut self, seller: &Seller) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO sellers (id, name, email, address, phone, credential)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(seller.id.to_string())
        .bind(&seller.name)
        .bind(&seller.email)
        .bind(&seller.address)
        .bind(&seller.phone)
        .bind(seller.credential.expose())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_seller", e))?;
        Ok(())
    }

    async fn get_seller(&mut self, id: SellerId) -> Result<Option<Seller>, StoreError> {
        let sql = format!("SELECT {SELLER_COLUMNS} FROM sellers WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("get_seller", e))?;
        row.as_ref().map(decode_seller).transpose()
    }

    async fn find_seller_by_email(&mut self, email: &str) -> Result<Option<Seller>, StoreError> {
        let sql = format!("SELECT {SELLER_COLUMNS} FROM sellers WHERE email = $1");
        let row = sqlx::query(&sql)
            .bind(email)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("find_seller_by_email", e))?;
        row.as_ref().map(decode_seller).transpose()
    }

    async fn update_seller(&mut self, seller: &Seller) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE sellers
            SET name = $2, email = $3, address = $4, phone = $5
            WHERE id = $1
            "#,
        )
        .bind(seller.id.to_string())
        .bind(&seller.name)
        .bind(&seller.email)
        .bind(&seller.address)
        .bind(&seller.phone)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_seller", e))?;
        Ok(())
    }

    async fn delete_seller(&mut self, id: SellerId) -> Result<(), StoreError> {
        for sql in [
            "DELETE FROM products WHERE seller_id = $1",
            "DELETE FROM customers WHERE seller_id = $1",
            "DELETE FROM sellers WHERE id = $1",
        ] {
            sqlx::query(sql)
                .bind(id.to_string())
                .execute(&mut *self.tx)
                .await
                .map_err(|e| map_sqlx_error("delete_seller", e))?;
        }
        Ok(())
    }

    async fn seller_invoice_count(&mut self, id: SellerId) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM invoices WHERE seller_id = $1")
            .bind(id.to_string())
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("seller_invoice_count", e))?;
        Ok(count.max(0) as u64)
    }

    async fn insert_customer(&mut self, customer: &Customer) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO customers (id, seller_id, name, email, phone, address)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(customer.id.to_string())
        .bind(customer.seller_id.to_string())
        .bind(&customer.name)
        .bind(&customer.email)
        .bind(&customer.phone)
        .bind(&customer.address)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_customer", e))?;
        Ok(())
    }

    async fn update_customer(&mut self, customer: &Customer) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE customers
            SET name = $2, email = $3, phone = $4, address = $5
            WHERE id = $1
            "#,
        )
        .bind(customer.id.to_string())
        .bind(&customer.name)
        .bind(&customer.email)
        .bind(&customer.phone)
        .bind(&customer.address)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_customer", e))?;
        Ok(())
    }

    async fn delete_customer(&mut self, id: CustomerId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM customers WHERE id = $1")
            .bind(id.to_string())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_customer", e))?;
        Ok(())
    }

    async fn get_customer(&mut self, id: CustomerId) -> Result<Option<Customer>, StoreError> {
        let sql = format!("SELECT {CUSTOMER_COLUMNS} FROM customers WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("get_customer", e))?;
        row.as_ref().map(decode_customer).transpose()
    }

    async fn find_customer_by_email(&mut self, email: &str) -> Result<Option<Customer>, StoreError> {
        let sql = format!("SELECT {CUSTOMER_COLUMNS} FROM customers WHERE email = $1");
        let row = sqlx::query(&sql)
            .bind(email)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("find_customer_by_email", e))?;
        row.as_ref().map(decode_customer).transpose()
    }

    async fn list_customers(&mut self, seller_id: SellerId) -> Result<Vec<Customer>, StoreError> {
        let sql = format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE seller_id = $1 \
             ORDER BY length(id), id"
        );
        let rows = sqlx::query(&sql)
            .bind(seller_id.to_string())
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("list_customers", e))?;
        rows.iter().map(decode_customer).collect()
    }

    async fn customer_invoice_count(&mut self, id: CustomerId) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM invoices WHERE customer_id = $1")
            .bind(id.to_string())
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("customer_invoice_count", e))?;
        Ok(count.max(0) as u64)
    }

    async fn insert_product(&mut self, product: &Product) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO products (id, seller_id, name, price_cents, description, stock)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(product.id.to_string())
        .bind(product.seller_id.to_string())
        .bind(&product.name)
        .bind(product.price.cents())
        .bind(&product.description)
        .bind(product.stock)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_product", e))?;
        Ok(())
    }

    async fn update_product_details(&mut self, product: &Product) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE products
            SET name = $2, price_cents = $3, description = $4
            WHERE id = $1
            "#,
        )
        .bind(product.id.to_string())
        .bind(&product.name)
        .bind(product.price.cents())
        .bind(&product.description)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_product_details", e))?;
        Ok(())
    }

    async fn delete_product(&mut self, id: ProductId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id.to_string())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_product", e))?;
        Ok(())
    }

    async fn get_product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("get_product", e))?;
        row.as_ref().map(decode_product).transpose()
    }

    async fn list_products(&mut self, seller_id: SellerId) -> Result<Vec<Product>, StoreError> {
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE seller_id = $1 ORDER BY length(id), id"
        );
        let rows = sqlx::query(&sql)
            .bind(seller_id.to_string())
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("list_products", e))?;
        rows.iter().map(decode_product).collect()
    }

    async fn product_reference_count(&mut self, id: ProductId) -> Result<u64, StoreError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM invoice_items WHERE product_id = $1")
                .bind(id.to_string())
                .fetch_one(&mut *self.tx)
                .await
                .map_err(|e| map_sqlx_error("product_reference_count", e))?;
        Ok(count.max(0) as u64)
    }

    #[instrument(skip(self), fields(product_id = %id), err)]
    async fn reserve_stock(
        &mut self,
        id: ProductId,
        quantity: i64,
    ) -> Result<ReserveOutcome, StoreError> {
        let remaining: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE products
            SET stock = stock - $1
            WHERE id = $2 AND stock >= $1
            RETURNING stock
            "#,
        )
        .bind(quantity)
        .bind(id.to_string())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("reserve_stock", e))?;

        if let Some(remaining) = remaining {
            return Ok(ReserveOutcome::Reserved { remaining });
        }

        let available: Option<i64> = sqlx::query_scalar("SELECT stock FROM products WHERE id = $1")
            .bind(id.to_string())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("reserve_stock_lookup", e))?;
        Ok(match available {
            Some(available) => ReserveOutcome::Insufficient { available },
            None => ReserveOutcome::UnknownProduct,
        })
    }

    #[instrument(skip(self), fields(product_id = %id), err)]
    async fn release_stock(
        &mut self,
        id: ProductId,
        quantity: i64,
    ) -> Result<Option<i64>, StoreError> {
        sqlx::query_scalar("UPDATE products SET stock = stock + $1 WHERE id = $2 RETURNING stock")
            .bind(quantity)
            .bind(id.to_string())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("release_stock", e))
    }

    #[instrument(skip(self, invoice), fields(invoice_id = %invoice.id()), err)]
    async fn insert_invoice(&mut self, invoice: &Invoice) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO invoices (
                id, seller_id, customer_id, created_at, due_date, status, tax_cents, amount_cents
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(invoice.id().to_string())
        .bind(invoice.seller_id().to_string())
        .bind(invoice.customer_id().to_string())
        .bind(invoice.created_at())
        .bind(invoice.due_date())
        .bind(invoice.status().as_str())
        .bind(invoice.tax().cents())
        .bind(invoice.amount().cents())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_invoice", e))?;

        self.insert_items(invoice).await
    }

    #[instrument(skip(self, invoice), fields(invoice_id = %invoice.id()), err)]
    async fn update_invoice(&mut self, invoice: &Invoice) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE invoices
            SET due_date = $2, status = $3, tax_cents = $4, amount_cents = $5
            WHERE id = $1
            "#,
        )
        .bind(invoice.id().to_string())
        .bind(invoice.due_date())
        .bind(invoice.status().as_str())
        .bind(invoice.tax().cents())
        .bind(invoice.amount().cents())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_invoice", e))?;

        sqlx::query("DELETE FROM invoice_items WHERE invoice_id = $1")
            .bind(invoice.id().to_string())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("update_invoice_items", e))?;

        self.insert_items(invoice).await
    }

    async fn delete_invoice(&mut self, id: InvoiceId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM invoices WHERE id = $1")
            .bind(id.to_string())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_invoice", e))?;
        Ok(())
    }

    async fn get_invoice(&mut self, id: InvoiceId) -> Result<Option<Invoice>, StoreError> {
        let sql = format!("SELECT {INVOICE_COLUMNS} FROM invoices i WHERE i.id = $1");
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("get_invoice", e))?;
        let Some(row) = row else {
            return Ok(None);
        };
        let mut items = self.load_items(&[id.to_string()]).await?;
        let items = items.remove(&id.to_string()).unwrap_or_default();
        decode_invoice(&row, items).map(Some)
    }

    #[instrument(skip(self, filter), fields(seller_id = %seller_id), err)]
    async fn list_invoices(
        &mut self,
        seller_id: SellerId,
        filter: &InvoiceFilter,
    ) -> Result<Vec<Invoice>, StoreError> {
        let sql = format!(
            r#"
            SELECT {INVOICE_COLUMNS}
            FROM invoices i
            JOIN customers c ON c.id = i.customer_id
            WHERE i.seller_id = $1
                AND ($2::text IS NULL OR i.id ILIKE $2)
                AND ($3::text IS NULL OR c.name ILIKE $3 OR c.email ILIKE $3)
                AND ($4::text IS NULL OR i.status = $4)
                AND ($5::timestamptz IS NULL OR i.created_at >= $5)
                AND ($6::timestamptz IS NULL OR i.created_at <= $6)
                AND ($7::bigint IS NULL OR i.amount_cents >= $7)
                AND ($8::bigint IS NULL OR i.amount_cents <= $8)
                AND ($9::text IS NULL OR i.customer_id = $9)
            ORDER BY i.created_at DESC, length(i.id) DESC, i.id DESC
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(seller_id.to_string())
            .bind(filter.id_needle().map(like_pattern))
            .bind(filter.customer_needle().map(like_pattern))
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.created.start_bound())
            .bind(filter.created.end_bound())
            .bind(filter.min_amount.map(Money::cents))
            .bind(filter.max_amount.map(Money::cents))
            .bind(filter.customer_id.map(|id| id.to_string()))
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("list_invoices", e))?;

        let ids: Vec<String> = rows
            .iter()
            .map(|r| r.try_get::<String, _>("id"))
            .collect::<Result<_, _>>()
            .map_err(|e| map_sqlx_error("list_invoices", e))?;
        let mut items = self.load_items(&ids).await?;

        rows.iter()
            .zip(ids.iter())
            .map(|(row, id)| decode_invoice(row, items.remove(id).unwrap_or_default()))
            .collect()
    }

    async fn invoice_summaries(
        &mut self,
        seller_id: SellerId,
    ) -> Result<Vec<InvoiceSummary>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, customer_id, status, amount_cents, created_at
            FROM invoices
            WHERE seller_id = $1
            "#,
        )
        .bind(seller_id.to_string())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("invoice_summaries", e))?;

        rows.iter()
            .map(|row| {
                Ok(InvoiceSummary {
                    id: parse_id(&get::<String>(row, "id")?)?,
                    customer_id: parse_id(&get::<String>(row, "customer_id")?)?,
                    status: parse_status(&get::<String>(row, "status")?)?,
                    amount: Money::from_cents(get(row, "amount_cents")?),
                    created_at: get(row, "created_at")?,
                })
            })
            .collect()
    }

    #[instrument(skip(self), err)]
    async fn mark_overdue(&mut self, as_of: NaiveDate) -> Result<Vec<InvoiceId>, StoreError> {
        let ids: Vec<String> = sqlx::query_scalar(
            r#"
            UPDATE invoices
            SET status = 'overdue'
            WHERE status = 'pending' AND due_date IS NOT NULL AND due_date < $1
            RETURNING id
            "#,
        )
        .bind(as_of)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("mark_overdue", e))?;
        ids.iter().map(|id| parse_id(id)).collect()
    }

    async fn append_activity(&mut self, activity: &Activity) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO activities (id, actor_id, actor_role, action_type, description, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(activity.id)
        .bind(&activity.actor_id)
        .bind(activity.actor_role.as_str())
        .bind(&activity.action_type)
        .bind(&activity.description)
        .bind(activity.timestamp)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("append_activity", e))?;
        Ok(())
    }

    async fn recent_activities(
        &mut self,
        actor_id: &str,
        limit: usize,
    ) -> Result<Vec<Activity>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, actor_id, actor_role, action_type, description, created_at
            FROM activities
            WHERE actor_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(actor_id)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("recent_activities", e))?;

        rows.iter()
            .map(|row| {
                let role: String = get(row, "actor_role")?;
                Ok(Activity {
                    id: get(row, "id")?,
                    actor_id: get(row, "actor_id")?,
                    actor_role: ActorRole::parse(&role).map_err(corrupt)?,
                    action_type: get(row, "action_type")?,
                    description: get(row, "description")?,
                    timestamp: get(row, "created_at")?,
                })
            })
            .collect()
    }

    #[instrument(skip(self), err)]
    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }
}

impl PgTx {
    async fn insert_items(&mut self, invoice: &Invoice) -> Result<(), StoreError> {
        for (position, item) in invoice.items().iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO invoice_items (
                    id, invoice_id, position, product_id, quantity, unit_price_cents, discount_cents
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(*item.id.as_uuid())
            .bind(invoice.id().to_string())
            .bind(i32::try_from(position).unwrap_or(i32::MAX))
            .bind(item.product_id.to_string())
            .bind(item.quantity)
            .bind(item.unit_price.cents())
            .bind(item.discount.cents())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_invoice_item", e))?;
        }
        Ok(())
    }

    /// Items for the given invoices, grouped by invoice id in line order.
    async fn load_items(
        &mut self,
        invoice_ids: &[String],
    ) -> Result<HashMap<String, Vec<InvoiceItem>>, StoreError> {
        if invoice_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = sqlx::query(
            r#"
            SELECT id, invoice_id, product_id, quantity, unit_price_cents, discount_cents
            FROM invoice_items
            WHERE invoice_id = ANY($1)
            ORDER BY invoice_id, position
            "#,
        )
        .bind(invoice_ids)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("load_items", e))?;

        let mut grouped: HashMap<String, Vec<InvoiceItem>> = HashMap::new();
        for row in &rows {
            let invoice_id: String = get(row, "invoice_id")?;
            let item = InvoiceItem {
                id: InvoiceItemId::from_uuid(get::<Uuid>(row, "id")?),
                product_id: parse_id(&get::<String>(row, "product_id")?)?,
                quantity: get(row, "quantity")?,
                unit_price: Money::from_cents(get(row, "unit_price_cents")?),
                discount: Money::from_cents(get(row, "discount_cents")?),
            };
            grouped.entry(invoice_id).or_default().push(item);
        }
        Ok(grouped)
    }
}

// row decoding

fn get<'r, T>(row: &'r PgRow, column: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(column)
        .map_err(|e| StoreError::Corrupt(format!("column {column}: {e}")))
}

fn corrupt(err: DomainError) -> StoreError {
    StoreError::Corrupt(err.to_string())
}

fn parse_id<T: FromStr<Err = DomainError>>(raw: &str) -> Result<T, StoreError> {
    raw.parse().map_err(corrupt)
}

fn parse_status(raw: &str) -> Result<InvoiceStatus, StoreError> {
    InvoiceStatus::parse(raw).map_err(corrupt)
}

fn to_u32(value: i64) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("counter out of range: {value}")))
}

fn decode_seller(row: &PgRow) -> Result<Seller, StoreError> {
    Ok(Seller {
        id: parse_id(&get::<String>(row, "id")?)?,
        name: get(row, "name")?,
        email: get(row, "email")?,
        address: get(row, "address")?,
        phone: get(row, "phone")?,
        credential: Credential::new(get::<String>(row, "credential")?),
    })
}

fn decode_customer(row: &PgRow) -> Result<Customer, StoreError> {
    Ok(Customer {
        id: parse_id(&get::<String>(row, "id")?)?,
        seller_id: parse_id(&get::<String>(row, "seller_id")?)?,
        name: get(row, "name")?,
        email: get(row, "email")?,
        phone: get(row, "phone")?,
        address: get(row, "address")?,
    })
}

fn decode_product(row: &PgRow) -> Result<Product, StoreError> {
    Ok(Product {
        id: parse_id(&get::<String>(row, "id")?)?,
        seller_id: parse_id(&get::<String>(row, "seller_id")?)?,
        name: get(row, "name")?,
        price: Money::from_cents(get(row, "price_cents")?),
        description: get(row, "description")?,
        stock: get(row, "stock")?,
    })
}

fn decode_invoice(row: &PgRow, items: Vec<InvoiceItem>) -> Result<Invoice, StoreError> {
    let created_at: DateTime<Utc> = get(row, "created_at")?;
    let parts = InvoiceParts {
        id: parse_id(&get::<String>(row, "id")?)?,
        seller_id: parse_id(&get::<String>(row, "seller_id")?)?,
        customer_id: parse_id(&get::<String>(row, "customer_id")?)?,
        created_at,
        due_date: get(row, "due_date")?,
        status: parse_status(&get::<String>(row, "status")?)?,
        tax: Money::from_cents(get(row, "tax_cents")?),
        amount: Money::from_cents(get(row, "amount_cents")?),
        items,
    };
    Invoice::restore(parts).map_err(corrupt)
}

/// Map SQLx errors to `StoreError`.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                // serialization_failure / deadlock_detected
                Some("40001") | Some("40P01") => StoreError::Conflict(msg),
                // unique_violation
                Some("23505") => StoreError::Conflict(msg),
                // foreign_key_violation / check_violation
                Some("23503") | Some("23514") => StoreError::Constraint(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::Unavailable(format!("connection pool timed out in {operation}"))
        }
        sqlx::Error::PoolClosed => {
            StoreError::Unavailable(format!("connection pool closed in {operation}"))
        }
        sqlx::Error::Io(e) => StoreError::Unavailable(format!("io error in {operation}: {e}")),
        sqlx::Error::Tls(e) => StoreError::Unavailable(format!("tls error in {operation}: {e}")),
        e @ (sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::Decode(_)) => StoreError::Corrupt(format!("{operation}: {e}")),
        other => StoreError::Backend(format!("sqlx error in {operation}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("inv-0"), "%inv-0%");
        assert_eq!(like_pattern("50%_off\\"), "%50\\%\\_off\\\\%");
    }

    #[test]
    fn schema_covers_every_table() {
        for table in [
            "sellers",
            "customers",
            "products",
            "invoices",
            "invoice_items",
            "activities",
            "id_counters",
        ] {
            assert!(
                SCHEMA.contains(&format!("CREATE TABLE IF NOT EXISTS {table} ")),
                "missing table {table}"
            );
        }
        assert!(SCHEMA.contains("CHECK (stock >= 0)"));
        assert!(SCHEMA.contains("ON DELETE CASCADE"));
    }

    #[test]
    fn counter_tables_match_entity_kinds() {
        assert_eq!(table(EntityKind::Invoice), "invoices");
        assert_eq!(table(EntityKind::Seller), "sellers");
    }
}
