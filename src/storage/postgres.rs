use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, QueryBuilder, Row, Transaction};
use std::time::Duration;
use uuid::Uuid;

use super::schema::SCHEMA;
use super::{effective_limit, validate_id, OrderStore};
use crate::errors::{StoreError, StoreResult};
use crate::models::{Delivery, Item, Order, Payment};

// ============================================================================
// Postgres Order Store
// ============================================================================
//
// Four relations: orders (header), deliveries and payments (1:1 by
// order_uid) and items (N:1, ordered by `position`).
//
// Writes: one transaction per aggregate. Header, delivery and payment are
// upserted with every column overwritten on conflict; items are deleted and
// re-inserted so the stored set always equals the latest write. Any error
// drops the transaction, which rolls it back.
//
// Reads: one REPEATABLE READ, READ ONLY transaction so header, children and
// items come from the same snapshot even while a writer commits.
//
// ============================================================================

/// Postgres caps bind parameters at 65535 per statement; items bind 13 each.
const ITEM_CHUNK: usize = 1000;

/// Serializes concurrent schema bootstraps from several instances.
const SCHEMA_LOCK_KEY: i64 = 0x6f72_6465_7273;

#[derive(Clone, Debug)]
pub struct PostgresStoreConfig {
    pub dsn: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    /// Open the pool and bootstrap the schema.
    pub async fn connect(config: &PostgresStoreConfig) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.dsn)
            .await?;

        let store = Self { pool };
        store.bootstrap().await?;
        tracing::info!(max_connections = config.max_connections, "Postgres store ready");
        Ok(store)
    }

    async fn bootstrap(&self) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(SCHEMA_LOCK_KEY)
            .execute(&mut *tx)
            .await?;
        for statement in SCHEMA {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        tracing::info!(statements = SCHEMA.len(), "Schema bootstrap complete");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    async fn save(&self, order: &Order) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        upsert_header(&mut tx, order).await?;
        upsert_delivery(&mut tx, order.order_uid, &order.delivery).await?;
        upsert_payment(&mut tx, order.order_uid, &order.payment).await?;
        replace_items(&mut tx, order.order_uid, &order.items).await?;

        tx.commit().await?;

        tracing::debug!(
            order_uid = %order.order_uid,
            items = order.items.len(),
            "Order saved"
        );
        Ok(())
    }

    async fn find(&self, id: &str) -> StoreResult<Option<Order>> {
        let order_uid = validate_id(id)?;

        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;

        let header = sqlx::query(
            "SELECT track_number, entry, locale, internal_signature, customer_id,
                    delivery_service, shardkey, sm_id, date_created
             FROM orders WHERE order_uid = $1",
        )
        .bind(order_uid)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(header) = header else {
            tracing::debug!(order_uid = %order_uid, "Order not found");
            return Ok(None);
        };

        let delivery = sqlx::query(
            "SELECT del_name, phone, zip, city, address, region, email
             FROM deliveries WHERE order_uid = $1",
        )
        .bind(order_uid)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::MissingRow { order_uid, relation: "deliveries" })?;

        let payment = sqlx::query(
            "SELECT transaction_id, request_id, currency, provider, amount, payment_dt,
                    bank, delivery_cost, goods_total, custom_fee
             FROM payments WHERE order_uid = $1",
        )
        .bind(order_uid)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::MissingRow { order_uid, relation: "payments" })?;

        let item_rows = sqlx::query(
            "SELECT chrt_id, track_number, price, rid, item_name, sale, item_size,
                    total_price, nm_id, brand, status
             FROM items WHERE order_uid = $1 ORDER BY position",
        )
        .bind(order_uid)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        let items = item_rows.iter().map(item_from_row).collect::<Result<Vec<_>, _>>()?;

        Ok(Some(Order {
            order_uid,
            track_number: header.try_get("track_number")?,
            entry: header.try_get("entry")?,
            delivery: delivery_from_row(&delivery)?,
            payment: payment_from_row(&payment)?,
            items,
            locale: header.try_get("locale")?,
            internal_signature: header.try_get("internal_signature")?,
            customer_id: header.try_get("customer_id")?,
            delivery_service: header.try_get("delivery_service")?,
            shardkey: header.try_get("shardkey")?,
            sm_id: header.try_get("sm_id")?,
            date_created: header.try_get("date_created")?,
        }))
    }

    async fn recent_ids(&self, limit: i64) -> StoreResult<Vec<Uuid>> {
        let rows = sqlx::query("SELECT order_uid FROM orders ORDER BY date_created DESC LIMIT $1")
            .bind(effective_limit(limit))
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| row.try_get::<Uuid, _>("order_uid").map_err(StoreError::from))
            .collect()
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// ============================================================================
// Write helpers
// ============================================================================

async fn upsert_header(tx: &mut Transaction<'_, Postgres>, order: &Order) -> StoreResult<()> {
    sqlx::query(
        "INSERT INTO orders (
            order_uid, track_number, entry, locale, internal_signature,
            customer_id, delivery_service, shardkey, sm_id, date_created
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT (order_uid) DO UPDATE SET
            track_number       = EXCLUDED.track_number,
            entry              = EXCLUDED.entry,
            locale             = EXCLUDED.locale,
            internal_signature = EXCLUDED.internal_signature,
            customer_id        = EXCLUDED.customer_id,
            delivery_service   = EXCLUDED.delivery_service,
            shardkey           = EXCLUDED.shardkey,
            sm_id              = EXCLUDED.sm_id,
            date_created       = EXCLUDED.date_created",
    )
    .bind(order.order_uid)
    .bind(&order.track_number)
    .bind(&order.entry)
    .bind(&order.locale)
    .bind(&order.internal_signature)
    .bind(&order.customer_id)
    .bind(&order.delivery_service)
    .bind(order.shardkey)
    .bind(order.sm_id)
    .bind(order.date_created)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn upsert_delivery(
    tx: &mut Transaction<'_, Postgres>,
    order_uid: Uuid,
    delivery: &Delivery,
) -> StoreResult<()> {
    sqlx::query(
        "INSERT INTO deliveries (order_uid, del_name, phone, zip, city, address, region, email)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (order_uid) DO UPDATE SET
            del_name = EXCLUDED.del_name,
            phone    = EXCLUDED.phone,
            zip      = EXCLUDED.zip,
            city     = EXCLUDED.city,
            address  = EXCLUDED.address,
            region   = EXCLUDED.region,
            email    = EXCLUDED.email",
    )
    .bind(order_uid)
    .bind(&delivery.name)
    .bind(&delivery.phone)
    .bind(&delivery.zip)
    .bind(&delivery.city)
    .bind(&delivery.address)
    .bind(&delivery.region)
    .bind(&delivery.email)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn upsert_payment(
    tx: &mut Transaction<'_, Postgres>,
    order_uid: Uuid,
    payment: &Payment,
) -> StoreResult<()> {
    sqlx::query(
        "INSERT INTO payments (
            order_uid, transaction_id, request_id, currency, provider,
            amount, payment_dt, bank, delivery_cost, goods_total, custom_fee
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        ON CONFLICT (order_uid) DO UPDATE SET
            transaction_id = EXCLUDED.transaction_id,
            request_id     = EXCLUDED.request_id,
            currency       = EXCLUDED.currency,
            provider       = EXCLUDED.provider,
            amount         = EXCLUDED.amount,
            payment_dt     = EXCLUDED.payment_dt,
            bank           = EXCLUDED.bank,
            delivery_cost  = EXCLUDED.delivery_cost,
            goods_total    = EXCLUDED.goods_total,
            custom_fee     = EXCLUDED.custom_fee",
    )
    .bind(order_uid)
    .bind(&payment.transaction)
    .bind(&payment.request_id)
    .bind(&payment.currency)
    .bind(&payment.provider)
    .bind(payment.amount)
    .bind(payment.payment_dt)
    .bind(&payment.bank)
    .bind(payment.delivery_cost)
    .bind(payment.goods_total)
    .bind(payment.custom_fee)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn replace_items(
    tx: &mut Transaction<'_, Postgres>,
    order_uid: Uuid,
    items: &[Item],
) -> StoreResult<()> {
    sqlx::query("DELETE FROM items WHERE order_uid = $1")
        .bind(order_uid)
        .execute(&mut **tx)
        .await?;

    for (chunk_index, chunk) in items.chunks(ITEM_CHUNK).enumerate() {
        let mut builder = QueryBuilder::<Postgres>::new(
            "INSERT INTO items (
                order_uid, position, chrt_id, track_number, price, rid, item_name,
                sale, item_size, total_price, nm_id, brand, status
            ) ",
        );
        builder.push_values(chunk.iter().enumerate(), |mut row, (offset, item)| {
            let position = (chunk_index * ITEM_CHUNK + offset) as i32;
            row.push_bind(order_uid)
                .push_bind(position)
                .push_bind(item.chrt_id)
                .push_bind(item.track_number.as_str())
                .push_bind(item.price)
                .push_bind(item.rid.as_str())
                .push_bind(item.name.as_str())
                .push_bind(item.sale)
                .push_bind(item.size.as_str())
                .push_bind(item.total_price)
                .push_bind(item.nm_id)
                .push_bind(item.brand.as_str())
                .push_bind(item.status);
        });
        builder.build().execute(&mut **tx).await?;
    }
    Ok(())
}

// ============================================================================
// Row mapping
// ============================================================================

fn delivery_from_row(row: &PgRow) -> Result<Delivery, sqlx::Error> {
    Ok(Delivery {
        name: row.try_get("del_name")?,
        phone: row.try_get("phone")?,
        zip: row.try_get("zip")?,
        city: row.try_get("city")?,
        address: row.try_get("address")?,
        region: row.try_get("region")?,
        email: row.try_get("email")?,
    })
}

fn payment_from_row(row: &PgRow) -> Result<Payment, sqlx::Error> {
    Ok(Payment {
        transaction: row.try_get("transaction_id")?,
        request_id: row.try_get("request_id")?,
        currency: row.try_get("currency")?,
        provider: row.try_get("provider")?,
        amount: row.try_get("amount")?,
        payment_dt: row.try_get("payment_dt")?,
        bank: row.try_get("bank")?,
        delivery_cost: row.try_get("delivery_cost")?,
        goods_total: row.try_get("goods_total")?,
        custom_fee: row.try_get("custom_fee")?,
    })
}

fn item_from_row(row: &PgRow) -> Result<Item, sqlx::Error> {
    Ok(Item {
        chrt_id: row.try_get("chrt_id")?,
        track_number: row.try_get("track_number")?,
        price: row.try_get("price")?,
        rid: row.try_get("rid")?,
        name: row.try_get("item_name")?,
        sale: row.try_get("sale")?,
        size: row.try_get("item_size")?,
        total_price: row.try_get("total_price")?,
        nm_id: row.try_get("nm_id")?,
        brand: row.try_get("brand")?,
        status: row.try_get("status")?,
    })
}

// ============================================================================
// Integration tests
// ============================================================================
//
// Need a disposable database:
//   TEST_PG_DSN=postgres://... cargo test -- --ignored
//
// ============================================================================
