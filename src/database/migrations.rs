//! The handful of `CREATE TABLE` statements the Ledger Store needs. Unlike
//! the teacher's `database::migrations`, this crate doesn't ship a generic
//! versioned migration runner (that framework is out of scope here) — just
//! the schema this crate's `LedgerStore` impl reads and writes.

use super::Database;

pub async fn run_migrations(db: &Database) {
    for statement in SCHEMA {
        sqlx::query(statement).execute(db).await.unwrap();
    }
}

const SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS transactions (
        id uuid PRIMARY KEY,
        app_id uuid,
        request_event_id uuid,
        type integer NOT NULL,
        state integer NOT NULL,
        amount_msat bigint NOT NULL,
        fee_msat bigint,
        fee_reserve_msat bigint NOT NULL DEFAULT 0,
        payment_request text,
        payment_hash text NOT NULL,
        preimage text,
        description text,
        description_hash text,
        expires_at timestamptz,
        settled_at timestamptz,
        failure_reason text,
        self_payment boolean NOT NULL DEFAULT false,
        metadata jsonb,
        boostagram jsonb,
        created_at timestamptz NOT NULL,
        updated_at timestamptz NOT NULL
    )"#,
    "CREATE INDEX IF NOT EXISTS transactions_hash_idx ON transactions (type, payment_hash)",
    "CREATE INDEX IF NOT EXISTS transactions_app_idx ON transactions (app_id, created_at)",
    "CREATE INDEX IF NOT EXISTS transactions_pending_idx ON transactions (type, state, created_at) WHERE state = 0",
    r#"CREATE UNIQUE INDEX IF NOT EXISTS transactions_settled_hash_idx
        ON transactions (type, payment_hash) WHERE state = 1"#,
];
