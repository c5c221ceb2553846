// Idempotent bootstrap, executed statement by statement on every start.
//
// Column types mirror the Rust model exactly: sqlx decodes strictly, so an
// `i32` field needs INTEGER and an `i64` field needs BIGINT.
pub(super) const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS orders (
        order_uid          UUID PRIMARY KEY,
        track_number       TEXT NOT NULL,
        entry              TEXT NOT NULL,
        locale             TEXT NOT NULL,
        internal_signature TEXT,
        customer_id        TEXT NOT NULL,
        delivery_service   TEXT NOT NULL,
        shardkey           BIGINT NOT NULL,
        sm_id              INTEGER NOT NULL,
        date_created       TIMESTAMPTZ NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS orders_date_created_idx ON orders (date_created DESC)",
    "CREATE TABLE IF NOT EXISTS deliveries (
        order_uid UUID PRIMARY KEY REFERENCES orders (order_uid) ON DELETE CASCADE,
        del_name  TEXT NOT NULL,
        phone     TEXT NOT NULL,
        zip       TEXT NOT NULL,
        city      TEXT NOT NULL,
        address   TEXT NOT NULL,
        region    TEXT NOT NULL,
        email     TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS payments (
        order_uid      UUID PRIMARY KEY REFERENCES orders (order_uid) ON DELETE CASCADE,
        transaction_id TEXT NOT NULL,
        request_id     TEXT NOT NULL,
        currency       TEXT NOT NULL,
        provider       TEXT NOT NULL,
        amount         BIGINT NOT NULL,
        payment_dt     BIGINT NOT NULL,
        bank           TEXT NOT NULL,
        delivery_cost  BIGINT NOT NULL,
        goods_total    BIGINT NOT NULL,
        custom_fee     BIGINT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS items (
        order_uid    UUID NOT NULL REFERENCES orders (order_uid) ON DELETE CASCADE,
        position     INTEGER NOT NULL,
        chrt_id      BIGINT NOT NULL,
        track_number TEXT NOT NULL,
        price        BIGINT NOT NULL,
        rid          TEXT NOT NULL,
        item_name    TEXT NOT NULL,
        sale         INTEGER NOT NULL,
        item_size    TEXT NOT NULL,
        total_price  BIGINT NOT NULL,
        nm_id        BIGINT NOT NULL,
        brand        TEXT NOT NULL,
        status       INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS items_order_uid_idx ON items (order_uid, position)",
];
