//! Durable persistence for [`Transaction`] rows. Follows the teacher's
//! `payment`/`invoice` `queries` submodules: hand-written SQL through `sqlx`,
//! `query_as` into row structs that convert via `into_entity`. Exposed behind
//! a trait so tests can run against an in-memory double instead of Postgres,
//! the way the broader example pack favors fakes behind a shared trait.

use crate::amount::{MilliSats, Sats};
use crate::app::AppId;
use crate::transaction::{PaymentHash, Transaction, TransactionId, TransactionState, TransactionType};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use const_format::formatcp;
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("database error: {0}")]
    Database(String),
    #[error(transparent)]
    Conflict(#[from] crate::concurrency::ConflictError),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BalanceAggregates {
    pub settled_incoming: MilliSats,
    pub settled_outgoing_with_fees: MilliSats,
    pub pending_outgoing_with_reserve: MilliSats,
}

impl BalanceAggregates {
    /// `Σ incoming − Σ outgoing − Σ pending`, per the isolated-app invariant.
    pub fn available(&self) -> MilliSats {
        self.settled_incoming - self.settled_outgoing_with_fees - self.pending_outgoing_with_reserve
    }
}

#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub app_id: Option<AppId>,
    pub r#type: Option<TransactionType>,
    pub from: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: i64,
    pub offset: i64,
    /// Include non-settled outgoing rows (normally only settled rows match).
    pub unpaid_outgoing: bool,
    /// Include non-settled incoming rows.
    pub unpaid_incoming: bool,
}

/// Durable storage for the ledger. Implementations must guarantee that
/// [`LedgerStore::insert_pending_pair`] is atomic (both rows visible or
/// neither) and that [`LedgerStore::update_settled_or_failed`] only applies
/// when the stored row is still `pending` (optimistic concurrency, mirroring
/// the teacher's `balance::update`).
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn find_by_hash(
        &self,
        r#type: TransactionType,
        hash: &PaymentHash,
        state: Option<TransactionState>,
    ) -> Result<Option<Transaction>, LedgerError>;

    async fn get(&self, id: TransactionId) -> Result<Option<Transaction>, LedgerError>;

    async fn list(&self, filter: ListFilter) -> Result<Vec<Transaction>, LedgerError>;

    async fn insert_pending(&self, tx: Transaction) -> Result<Transaction, LedgerError>;

    /// Inserts both rows of a self-payment keysend in a single unit of work,
    /// closing the crash-orphan gap between the outgoing and incoming sides.
    async fn insert_pending_pair(
        &self,
        outgoing: Transaction,
        incoming: Transaction,
    ) -> Result<(Transaction, Transaction), LedgerError>;

    /// Persists a row that has just transitioned out of `pending`. Fails with
    /// [`LedgerError::Conflict`] if the stored row is no longer `pending`
    /// (another writer already settled/failed it).
    async fn update_settled_or_failed(&self, tx: &Transaction) -> Result<(), LedgerError>;

    /// Pending rows created within `window`, for the Reconciler's batch pass.
    async fn list_recent_pending(
        &self,
        r#type: TransactionType,
        since: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, LedgerError>;

    async fn balance_aggregates(&self, app_id: AppId) -> Result<BalanceAggregates, LedgerError>;

    /// Sum of settled outgoing `amount_msat + fee_msat`, in sats, for budget
    /// accounting, since `window_start` (or all time if `None`).
    async fn budget_usage_sat(
        &self,
        app_id: AppId,
        window_start: Option<DateTime<Utc>>,
    ) -> Result<Sats, LedgerError>;
}

// ---------------------------------------------------------------------------
// Postgres implementation
// ---------------------------------------------------------------------------

pub struct PostgresLedger {
    db: crate::database::Database,
}

impl PostgresLedger {
    pub fn new(db: crate::database::Database) -> Self {
        Self { db }
    }
}

const COLUMNS: &str = "id, app_id, request_event_id, type, state, amount_msat, fee_msat, \
    fee_reserve_msat, payment_request, payment_hash, preimage, description, description_hash, \
    expires_at, settled_at, failure_reason, self_payment, metadata, boostagram, created_at, updated_at";

#[async_trait]
impl LedgerStore for PostgresLedger {
    async fn find_by_hash(
        &self,
        r#type: TransactionType,
        hash: &PaymentHash,
        state: Option<TransactionState>,
    ) -> Result<Option<Transaction>, LedgerError> {
        let row = if let Some(state) = state {
            sqlx::query_as::<_, TransactionRow>(formatcp!(
                "SELECT {} FROM transactions WHERE type = $1 AND payment_hash = $2 AND state = $3 \
                 ORDER BY settled_at DESC NULLS LAST, created_at DESC LIMIT 1",
                COLUMNS
            ))
            .bind(type_to_i32(r#type))
            .bind(&hash.0)
            .bind(state_to_i32(state))
            .fetch_optional(&self.db)
            .await
        } else {
            sqlx::query_as::<_, TransactionRow>(formatcp!(
                "SELECT {} FROM transactions WHERE type = $1 AND payment_hash = $2 \
                 ORDER BY settled_at DESC NULLS LAST, created_at DESC LIMIT 1",
                COLUMNS
            ))
            .bind(type_to_i32(r#type))
            .bind(&hash.0)
            .fetch_optional(&self.db)
            .await
        }
        .map_err(|e| LedgerError::Database(e.to_string()))?;
        Ok(row.map(TransactionRow::into_entity))
    }

    async fn get(&self, id: TransactionId) -> Result<Option<Transaction>, LedgerError> {
        sqlx::query_as::<_, TransactionRow>(formatcp!(
            "SELECT {} FROM transactions WHERE id = $1",
            COLUMNS
        ))
        .bind(id.0)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| LedgerError::Database(e.to_string()))
        .map(|row| row.map(TransactionRow::into_entity))
    }

    async fn list(&self, filter: ListFilter) -> Result<Vec<Transaction>, LedgerError> {
        // Hand-written, following the teacher's `payment::queries::list` shape.
        // The WHERE clause is assembled at runtime (this crate has no
        // query-builder dependency, same as the teacher) so that the settled/
        // unpaid and time-range predicates apply before LIMIT/OFFSET — doing
        // the filtering in Rust after a capped fetch would drop matching rows
        // off an already-paginated page.
        let mut clauses = Vec::new();
        let mut idx = 1;
        if filter.app_id.is_some() {
            clauses.push(format!("app_id = ${idx}"));
            idx += 1;
        }
        if filter.r#type.is_some() {
            clauses.push(format!("type = ${idx}"));
            idx += 1;
        }
        if filter.from.is_some() {
            clauses.push(format!("created_at >= ${idx}"));
            idx += 1;
        }
        if filter.until.is_some() {
            clauses.push(format!("created_at <= ${idx}"));
            idx += 1;
        }
        let settled_state = state_to_i32(TransactionState::Settled);
        clauses.push(format!(
            "(state = {settled_state} OR (type = 0 AND ${idx}) OR (type = 1 AND ${}))",
            idx + 1
        ));
        idx += 2;
        let limit_idx = idx;
        let offset_idx = idx + 1;

        let sql = format!(
            "SELECT {COLUMNS} FROM transactions WHERE {} \
             ORDER BY updated_at DESC LIMIT ${limit_idx} OFFSET ${offset_idx}",
            clauses.join(" AND "),
        );

        let mut query = sqlx::query_as::<_, TransactionRow>(&sql);
        if let Some(app_id) = filter.app_id {
            query = query.bind(app_id.0);
        }
        if let Some(r#type) = filter.r#type {
            query = query.bind(type_to_i32(r#type));
        }
        if let Some(from) = filter.from {
            query = query.bind(from);
        }
        if let Some(until) = filter.until {
            query = query.bind(until);
        }
        let rows = query
            .bind(filter.unpaid_incoming)
            .bind(filter.unpaid_outgoing)
            .bind(filter.limit.max(1))
            .bind(filter.offset)
            .fetch_all(&self.db)
            .await
            .map_err(|e| LedgerError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(TransactionRow::into_entity).collect())
    }

    async fn insert_pending(&self, tx: Transaction) -> Result<Transaction, LedgerError> {
        insert_row(&self.db, &tx)
            .await
            .map_err(|e| LedgerError::Database(e.to_string()))?;
        Ok(tx)
    }

    async fn insert_pending_pair(
        &self,
        outgoing: Transaction,
        incoming: Transaction,
    ) -> Result<(Transaction, Transaction), LedgerError> {
        let mut data_tx = self
            .db
            .begin()
            .await
            .map_err(|e| LedgerError::Database(e.to_string()))?;
        insert_row(&mut *data_tx, &outgoing)
            .await
            .map_err(|e| LedgerError::Database(e.to_string()))?;
        insert_row(&mut *data_tx, &incoming)
            .await
            .map_err(|e| LedgerError::Database(e.to_string()))?;
        data_tx
            .commit()
            .await
            .map_err(|e| LedgerError::Database(e.to_string()))?;
        Ok((outgoing, incoming))
    }

    async fn update_settled_or_failed(&self, tx: &Transaction) -> Result<(), LedgerError> {
        let result = sqlx::query(
            "UPDATE transactions SET state = $1, fee_msat = $2, fee_reserve_msat = $3, \
             preimage = $4, settled_at = $5, failure_reason = $6, self_payment = $7, \
             boostagram = $8, updated_at = $9 \
             WHERE id = $10 AND state = $11 RETURNING id",
        )
        .bind(state_to_i32(tx.state))
        .bind(tx.fee_msat.map(|a| a.0))
        .bind(tx.fee_reserve_msat.0)
        .bind(tx.preimage.as_ref().map(|p| p.0.clone()))
        .bind(tx.settled_at)
        .bind(&tx.failure_reason)
        .bind(tx.self_payment)
        .bind(&tx.boostagram)
        .bind(tx.updated_at)
        .bind(tx.id.0)
        .bind(state_to_i32(TransactionState::Pending))
        .fetch_optional(&self.db)
        .await
        .map_err(|e| LedgerError::Database(e.to_string()))?;

        result
            .map(|_| ())
            .ok_or_else(|| LedgerError::Conflict(crate::concurrency::ConflictError))
    }

    async fn list_recent_pending(
        &self,
        r#type: TransactionType,
        since: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, LedgerError> {
        let rows = sqlx::query_as::<_, TransactionRow>(formatcp!(
            "SELECT {} FROM transactions WHERE type = $1 AND state = $2 AND created_at > $3",
            COLUMNS
        ))
        .bind(type_to_i32(r#type))
        .bind(state_to_i32(TransactionState::Pending))
        .bind(since)
        .fetch_all(&self.db)
        .await
        .map_err(|e| LedgerError::Database(e.to_string()))?;
        Ok(rows.into_iter().map(TransactionRow::into_entity).collect())
    }

    async fn balance_aggregates(&self, app_id: AppId) -> Result<BalanceAggregates, LedgerError> {
        let settled_incoming = sum_msat(
            &self.db,
            "SELECT SUM(amount_msat) AS sum FROM transactions \
             WHERE app_id = $1 AND type = 0 AND state = 1",
            app_id,
        )
        .await?;
        let settled_outgoing_with_fees = sum_msat(
            &self.db,
            "SELECT SUM(amount_msat + COALESCE(fee_msat, 0)) AS sum FROM transactions \
             WHERE app_id = $1 AND type = 1 AND state = 1",
            app_id,
        )
        .await?;
        let pending_outgoing_with_reserve = sum_msat(
            &self.db,
            "SELECT SUM(amount_msat + fee_reserve_msat) AS sum FROM transactions \
             WHERE app_id = $1 AND type = 1 AND state = 0",
            app_id,
        )
        .await?;
        Ok(BalanceAggregates {
            settled_incoming,
            settled_outgoing_with_fees,
            pending_outgoing_with_reserve,
        })
    }

    async fn budget_usage_sat(
        &self,
        app_id: AppId,
        window_start: Option<DateTime<Utc>>,
    ) -> Result<Sats, LedgerError> {
        let since = window_start.unwrap_or_else(|| Utc.timestamp_opt(0, 0).unwrap());
        let msat = sqlx::query_as::<_, crate::database::SumRow<Option<i64>>>(
            "SELECT SUM(amount_msat + COALESCE(fee_msat, 0)) AS sum FROM transactions \
             WHERE app_id = $1 AND type = 1 AND state = 1 AND created_at >= $2",
        )
        .bind(app_id.0)
        .bind(since)
        .fetch_one(&self.db)
        .await
        .map_err(|e| LedgerError::Database(e.to_string()))?
        .sum
        .unwrap_or(0);
        Ok(MilliSats(msat).sats_floor())
    }
}

async fn sum_msat<'e, E>(executor: E, sql: &str, app_id: AppId) -> Result<MilliSats, LedgerError>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    let row = sqlx::query_as::<_, crate::database::SumRow<Option<i64>>>(sql)
        .bind(app_id.0)
        .fetch_one(executor)
        .await
        .map_err(|e| LedgerError::Database(e.to_string()))?;
    Ok(MilliSats(row.sum.unwrap_or(0)))
}

async fn insert_row<'e, E>(executor: E, tx: &Transaction) -> Result<(), sqlx::Error>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    sqlx::query(formatcp!(
        "INSERT INTO transactions ({}) VALUES \
         ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21)",
        COLUMNS
    ))
    .bind(tx.id.0)
    .bind(tx.app_id.map(|a| a.0))
    .bind(tx.request_event_id)
    .bind(type_to_i32(tx.r#type))
    .bind(state_to_i32(tx.state))
    .bind(tx.amount_msat.0)
    .bind(tx.fee_msat.map(|a| a.0))
    .bind(tx.fee_reserve_msat.0)
    .bind(&tx.payment_request)
    .bind(&tx.payment_hash.0)
    .bind(tx.preimage.as_ref().map(|p| p.0.clone()))
    .bind(&tx.description)
    .bind(&tx.description_hash)
    .bind(tx.expires_at)
    .bind(tx.settled_at)
    .bind(&tx.failure_reason)
    .bind(tx.self_payment)
    .bind(&tx.metadata)
    .bind(&tx.boostagram)
    .bind(tx.created_at)
    .bind(tx.updated_at)
    .execute(executor)
    .await?;
    Ok(())
}

fn type_to_i32(t: TransactionType) -> i32 {
    match t {
        TransactionType::Incoming => 0,
        TransactionType::Outgoing => 1,
    }
}

fn i32_to_type(i: i32) -> TransactionType {
    match i {
        0 => TransactionType::Incoming,
        1 => TransactionType::Outgoing,
        _ => unreachable!("invalid transaction type {i}"),
    }
}

fn state_to_i32(s: TransactionState) -> i32 {
    match s {
        TransactionState::Pending => 0,
        TransactionState::Settled => 1,
        TransactionState::Failed => 2,
    }
}

fn i32_to_state(i: i32) -> TransactionState {
    match i {
        0 => TransactionState::Pending,
        1 => TransactionState::Settled,
        2 => TransactionState::Failed,
        _ => unreachable!("invalid transaction state {i}"),
    }
}

#[derive(sqlx::FromRow, Debug)]
struct TransactionRow {
    id: Uuid,
    app_id: Option<Uuid>,
    request_event_id: Option<Uuid>,
    r#type: i32,
    state: i32,
    amount_msat: i64,
    fee_msat: Option<i64>,
    fee_reserve_msat: i64,
    payment_request: Option<String>,
    payment_hash: String,
    preimage: Option<String>,
    description: Option<String>,
    description_hash: Option<String>,
    expires_at: Option<DateTime<Utc>>,
    settled_at: Option<DateTime<Utc>>,
    failure_reason: Option<String>,
    self_payment: bool,
    metadata: Option<Value>,
    boostagram: Option<Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TransactionRow {
    fn into_entity(self) -> Transaction {
        Transaction {
            id: TransactionId(self.id),
            app_id: self.app_id.map(AppId),
            request_event_id: self.request_event_id,
            r#type: i32_to_type(self.r#type),
            state: i32_to_state(self.state),
            amount_msat: MilliSats(self.amount_msat),
            fee_msat: self.fee_msat.map(MilliSats),
            fee_reserve_msat: MilliSats(self.fee_reserve_msat),
            payment_request: self.payment_request,
            payment_hash: PaymentHash(self.payment_hash),
            preimage: self.preimage.map(crate::transaction::Preimage),
            description: self.description,
            description_hash: self.description_hash,
            expires_at: self.expires_at,
            settled_at: self.settled_at,
            failure_reason: self.failure_reason,
            self_payment: self.self_payment,
            metadata: self.metadata,
            boostagram: self.boostagram,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

fn matches_filter(tx: &Transaction, filter: &ListFilter) -> bool {
    if let Some(app_id) = filter.app_id {
        if tx.app_id != Some(app_id) {
            return false;
        }
    }
    if let Some(want_type) = filter.r#type {
        if tx.r#type != want_type {
            return false;
        }
    }
    if let Some(from) = filter.from {
        if tx.created_at < from {
            return false;
        }
    }
    if let Some(until) = filter.until {
        if tx.created_at > until {
            return false;
        }
    }
    let include_unsettled = match tx.r#type {
        TransactionType::Outgoing => filter.unpaid_outgoing,
        TransactionType::Incoming => filter.unpaid_incoming,
    };
    tx.is_settled() || include_unsettled
}

// ---------------------------------------------------------------------------
// In-memory fake, for tests
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryLedger {
    rows: Mutex<HashMap<Uuid, Transaction>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedger {
    async fn find_by_hash(
        &self,
        r#type: TransactionType,
        hash: &PaymentHash,
        state: Option<TransactionState>,
    ) -> Result<Option<Transaction>, LedgerError> {
        let rows = self.rows.lock().await;
        let mut matching: Vec<&Transaction> = rows
            .values()
            .filter(|tx| {
                tx.r#type == r#type
                    && tx.payment_hash == *hash
                    && state.map_or(true, |s| tx.state == s)
            })
            .collect();
        matching.sort_by_key(|tx| (tx.settled_at, tx.created_at));
        Ok(matching.last().map(|tx| (*tx).clone()))
    }

    async fn get(&self, id: TransactionId) -> Result<Option<Transaction>, LedgerError> {
        Ok(self.rows.lock().await.get(&id.0).cloned())
    }

    async fn list(&self, filter: ListFilter) -> Result<Vec<Transaction>, LedgerError> {
        let rows = self.rows.lock().await;
        let mut matched: Vec<Transaction> = rows
            .values()
            .filter(|tx| matches_filter(tx, &filter))
            .cloned()
            .collect();
        matched.sort_by_key(|tx| std::cmp::Reverse(tx.updated_at));
        let offset = filter.offset.max(0) as usize;
        let limit = if filter.limit <= 0 { usize::MAX } else { filter.limit as usize };
        Ok(matched.into_iter().skip(offset).take(limit).collect())
    }

    async fn insert_pending(&self, tx: Transaction) -> Result<Transaction, LedgerError> {
        self.rows.lock().await.insert(tx.id.0, tx.clone());
        Ok(tx)
    }

    async fn insert_pending_pair(
        &self,
        outgoing: Transaction,
        incoming: Transaction,
    ) -> Result<(Transaction, Transaction), LedgerError> {
        let mut rows = self.rows.lock().await;
        rows.insert(outgoing.id.0, outgoing.clone());
        rows.insert(incoming.id.0, incoming.clone());
        Ok((outgoing, incoming))
    }

    async fn update_settled_or_failed(&self, tx: &Transaction) -> Result<(), LedgerError> {
        let mut rows = self.rows.lock().await;
        match rows.get(&tx.id.0) {
            Some(existing) if existing.is_pending() => {
                rows.insert(tx.id.0, tx.clone());
                Ok(())
            }
            Some(_) => Err(LedgerError::Conflict(crate::concurrency::ConflictError)),
            None => Err(LedgerError::Database(format!("no such transaction {:?}", tx.id))),
        }
    }

    async fn list_recent_pending(
        &self,
        r#type: TransactionType,
        since: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, LedgerError> {
        let rows = self.rows.lock().await;
        Ok(rows
            .values()
            .filter(|tx| tx.r#type == r#type && tx.is_pending() && tx.created_at > since)
            .cloned()
            .collect())
    }

    async fn balance_aggregates(&self, app_id: AppId) -> Result<BalanceAggregates, LedgerError> {
        let rows = self.rows.lock().await;
        let mut aggregates = BalanceAggregates::default();
        for tx in rows.values().filter(|tx| tx.app_id == Some(app_id)) {
            match (tx.r#type, tx.state) {
                (TransactionType::Incoming, TransactionState::Settled) => {
                    aggregates.settled_incoming += tx.amount_msat
                }
                (TransactionType::Outgoing, TransactionState::Settled) => {
                    aggregates.settled_outgoing_with_fees +=
                        tx.amount_msat + tx.fee_msat.unwrap_or(MilliSats::ZERO)
                }
                (TransactionType::Outgoing, TransactionState::Pending) => {
                    aggregates.pending_outgoing_with_reserve +=
                        tx.amount_msat + tx.fee_reserve_msat
                }
                _ => {}
            }
        }
        Ok(aggregates)
    }

    async fn budget_usage_sat(
        &self,
        app_id: AppId,
        window_start: Option<DateTime<Utc>>,
    ) -> Result<Sats, LedgerError> {
        let rows = self.rows.lock().await;
        let total: i64 = rows
            .values()
            .filter(|tx| {
                tx.app_id == Some(app_id)
                    && tx.r#type == TransactionType::Outgoing
                    && tx.is_settled()
                    && window_start.map_or(true, |start| tx.created_at >= start)
            })
            .map(|tx| (tx.amount_msat + tx.fee_msat.unwrap_or(MilliSats::ZERO)).0)
            .sum();
        Ok(MilliSats(total).sats_floor())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::transaction::Transaction;

    fn new_tx(r#type: TransactionType, app_id: AppId, amount: MilliSats) -> Transaction {
        Transaction::new_pending(
            r#type,
            Some(app_id),
            None,
            amount,
            MilliSats(10_000),
            None,
            PaymentHash(format!("{:064x}", 1)),
            None,
            None,
            None,
            None,
            None,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn balance_aggregates_separate_direction_and_state() {
        let ledger = InMemoryLedger::new();
        let app = AppId(Uuid::new_v4());

        let mut incoming = new_tx(TransactionType::Incoming, app, MilliSats(100_000));
        incoming.mark_settled(
            crate::transaction::Preimage::from_bytes(&[1u8; 32]),
            MilliSats(0),
            false,
            Utc::now(),
        )
        .unwrap();
        ledger.insert_pending(incoming).await.unwrap();

        let outgoing = new_tx(TransactionType::Outgoing, app, MilliSats(30_000));
        ledger.insert_pending(outgoing).await.unwrap();

        let aggregates = ledger.balance_aggregates(app).await.unwrap();
        assert_eq!(aggregates.settled_incoming, MilliSats(100_000));
        assert_eq!(aggregates.pending_outgoing_with_reserve, MilliSats(40_000));
        assert_eq!(aggregates.available(), MilliSats(60_000));
    }

    #[tokio::test]
    async fn update_settled_or_failed_rejects_non_pending_rows() {
        let ledger = InMemoryLedger::new();
        let app = AppId(Uuid::new_v4());
        let tx = ledger
            .insert_pending(new_tx(TransactionType::Outgoing, app, MilliSats(1000)))
            .await
            .unwrap();

        let mut settled = tx.clone();
        settled
            .mark_settled(
                crate::transaction::Preimage::from_bytes(&[2u8; 32]),
                MilliSats(0),
                false,
                Utc::now(),
            )
            .unwrap();
        ledger.update_settled_or_failed(&settled).await.unwrap();

        let mut refailed = settled.clone();
        refailed.state = TransactionState::Failed;
        let err = ledger.update_settled_or_failed(&refailed).await;
        assert!(matches!(err, Err(LedgerError::Conflict(_))));
    }
}
