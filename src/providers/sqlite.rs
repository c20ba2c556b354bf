use std::path::Path;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use diesel_async::pooled_connection::bb8::{Pool, PooledConnection};
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::sync_connection_wrapper::SyncConnectionWrapper;
use diesel_async::RunQueryDsl;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use rust_decimal::Decimal;
use time::Date;

use crate::domains::ledger::{
    format_date, parse_date, ticker_key, Activity, Holding, HoldingPatch, Memory, Message,
    NewActivity, NewHolding, NewMemory, NewTransaction, RecordId, Role, Transaction,
    TransactionPatch,
};
use crate::error::{Result, YellowTrackerError};
use crate::interfaces::store::LedgerStore;

mod schema;
use schema::{activities, holdings, memories, messages, transactions};

const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

type SqliteAsyncConn = SyncConnectionWrapper<SqliteConnection>;
type SqlitePool = Pool<SqliteAsyncConn>;
type SqlitePooledConn<'a> = PooledConnection<'a, SqliteAsyncConn>;

#[derive(Queryable)]
struct MessageRow {
    id: i32,
    user_id: String,
    role: String,
    content: String,
    timestamp: i64,
}

#[derive(Insertable)]
#[diesel(table_name = messages)]
struct NewMessageRow<'a> {
    user_id: &'a str,
    role: &'a str,
    content: &'a str,
    timestamp: i64,
}

#[derive(Queryable)]
struct TransactionRow {
    id: i32,
    user_id: String,
    date: String,
    kind: String,
    amount: String,
    currency: String,
    category: Option<String>,
    description: Option<String>,
    payment_method: Option<String>,
    payment_source: Option<String>,
}

#[derive(Insertable)]
#[diesel(table_name = transactions)]
struct NewTransactionRow<'a> {
    user_id: &'a str,
    date: String,
    kind: &'a str,
    amount: String,
    currency: &'a str,
    category: Option<&'a str>,
    description: Option<&'a str>,
    payment_method: Option<&'a str>,
    payment_source: Option<&'a str>,
}

#[derive(AsChangeset)]
#[diesel(table_name = transactions)]
struct TransactionChangeset<'a> {
    date: Option<String>,
    kind: Option<&'a str>,
    amount: Option<String>,
    currency: Option<&'a str>,
    category: Option<&'a str>,
    description: Option<&'a str>,
    payment_method: Option<&'a str>,
    payment_source: Option<&'a str>,
}

#[derive(Queryable)]
struct HoldingRow {
    id: i32,
    user_id: String,
    asset_type: String,
    ticker: String,
    _ticker_key: String,
    name: Option<String>,
    shares: String,
    avg_cost: String,
    currency: String,
    platform: Option<String>,
    notes: Option<String>,
    last_updated: i64,
}

#[derive(Insertable)]
#[diesel(table_name = holdings)]
struct NewHoldingRow<'a> {
    user_id: &'a str,
    asset_type: &'a str,
    ticker: &'a str,
    ticker_key: String,
    name: Option<&'a str>,
    shares: String,
    avg_cost: String,
    currency: &'a str,
    platform: Option<&'a str>,
    notes: Option<&'a str>,
    last_updated: i64,
}

#[derive(AsChangeset)]
#[diesel(table_name = holdings)]
struct HoldingChangeset<'a> {
    asset_type: Option<&'a str>,
    name: Option<&'a str>,
    shares: Option<String>,
    avg_cost: Option<String>,
    currency: Option<&'a str>,
    platform: Option<&'a str>,
    notes: Option<&'a str>,
    last_updated: i64,
}

#[derive(Queryable)]
struct ActivityRow {
    id: i32,
    user_id: String,
    date: String,
    activity_type: String,
    ticker: Option<String>,
    shares: Option<String>,
    price_per_unit: Option<String>,
    total_amount: Option<String>,
    currency: String,
    platform: Option<String>,
    realized_gain: Option<String>,
    notes: Option<String>,
}

#[derive(Insertable)]
#[diesel(table_name = activities)]
struct NewActivityRow<'a> {
    user_id: &'a str,
    date: String,
    activity_type: &'a str,
    ticker: Option<&'a str>,
    shares: Option<String>,
    price_per_unit: Option<String>,
    total_amount: Option<String>,
    currency: &'a str,
    platform: Option<&'a str>,
    realized_gain: Option<String>,
    notes: Option<&'a str>,
}

#[derive(Queryable)]
struct MemoryRow {
    id: i32,
    user_id: String,
    fact: String,
    category: String,
    created_at: i64,
}

#[derive(Insertable)]
#[diesel(table_name = memories)]
struct NewMemoryRow<'a> {
    user_id: &'a str,
    fact: &'a str,
    category: &'a str,
    created_at: i64,
}

/// SQLite ledger using a bb8 pool of diesel-async connections. Decimals and
/// dates are stored as text so no precision is lost.
#[derive(Clone)]
pub struct SqliteLedgerStore {
    pool: SqlitePool,
}

impl SqliteLedgerStore {
    pub async fn new(sqlite_path: impl AsRef<str>) -> Result<Self> {
        let sqlite_path = sqlite_path.as_ref();
        ensure_parent_dir(sqlite_path)?;
        run_migrations(sqlite_path).await?;

        let manager = AsyncDieselConnectionManager::<SqliteAsyncConn>::new(sqlite_path);
        let pool: SqlitePool = Pool::builder()
            .build(manager)
            .await
            .map_err(|e| YellowTrackerError::Storage(e.to_string()))?;
        Ok(Self { pool })
    }

    async fn conn(&self) -> Result<SqlitePooledConn<'_>> {
        self.pool
            .get()
            .await
            .map_err(|e| YellowTrackerError::Storage(e.to_string()))
    }
}

fn storage(e: diesel::result::Error) -> YellowTrackerError {
    YellowTrackerError::Storage(e.to_string())
}

fn now_ts() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

fn decimal(raw: &str) -> Result<Decimal> {
    Decimal::from_str(raw)
        .map_err(|e| YellowTrackerError::Storage(format!("invalid decimal '{raw}': {e}")))
}

fn opt_decimal(raw: Option<String>) -> Result<Option<Decimal>> {
    raw.as_deref().map(decimal).transpose()
}

fn stored_date(raw: &str) -> Result<Date> {
    parse_date(raw).map_err(|e| YellowTrackerError::Storage(e.to_string()))
}

fn map_message(row: MessageRow) -> Result<Message> {
    Ok(Message {
        id: row.id,
        user_id: row.user_id,
        role: row
            .role
            .parse()
            .map_err(|e: YellowTrackerError| YellowTrackerError::Storage(e.to_string()))?,
        content: row.content,
        timestamp: row.timestamp,
    })
}

fn map_transaction(row: TransactionRow) -> Result<Transaction> {
    Ok(Transaction {
        id: row.id,
        user_id: row.user_id,
        date: stored_date(&row.date)?,
        kind: row
            .kind
            .parse()
            .map_err(|e: YellowTrackerError| YellowTrackerError::Storage(e.to_string()))?,
        amount: decimal(&row.amount)?,
        currency: row.currency,
        category: row.category,
        description: row.description,
        payment_method: row.payment_method,
        payment_source: row.payment_source,
    })
}

fn map_holding(row: HoldingRow) -> Result<Holding> {
    Ok(Holding {
        id: row.id,
        user_id: row.user_id,
        asset_type: row.asset_type,
        ticker: row.ticker,
        name: row.name,
        shares: decimal(&row.shares)?,
        avg_cost: decimal(&row.avg_cost)?,
        currency: row.currency,
        platform: row.platform,
        notes: row.notes,
        last_updated: row.last_updated,
    })
}

fn map_activity(row: ActivityRow) -> Result<Activity> {
    Ok(Activity {
        id: row.id,
        user_id: row.user_id,
        date: stored_date(&row.date)?,
        // Unknown stored types fall back to "other" rather than failing the read.
        activity_type: row.activity_type.parse().unwrap_or_default(),
        ticker: row.ticker,
        shares: opt_decimal(row.shares)?,
        price_per_unit: opt_decimal(row.price_per_unit)?,
        total_amount: opt_decimal(row.total_amount)?,
        currency: row.currency,
        platform: row.platform,
        realized_gain: opt_decimal(row.realized_gain)?,
        notes: row.notes,
    })
}

fn map_memory(row: MemoryRow) -> Memory {
    Memory {
        id: row.id,
        user_id: row.user_id,
        fact: row.fact,
        category: row.category.parse().unwrap_or_default(),
        created_at: row.created_at,
    }
}

#[async_trait]
impl LedgerStore for SqliteLedgerStore {
    async fn append_message(&self, user_id: &str, role: Role, content: &str) -> Result<RecordId> {
        let row = NewMessageRow {
            user_id,
            role: role.as_str(),
            content,
            timestamp: now_ts(),
        };
        let mut conn = self.conn().await?;
        diesel::insert_into(messages::table)
            .values(&row)
            .returning(messages::id)
            .get_result(&mut conn)
            .await
            .map_err(storage)
    }

    async fn recent_messages(&self, user_id: &str, limit: usize) -> Result<Vec<Message>> {
        let mut conn = self.conn().await?;
        let mut query = messages::table
            .filter(messages::user_id.eq(user_id))
            .order((messages::timestamp.desc(), messages::id.desc()))
            .into_boxed();
        if limit > 0 {
            query = query.limit(limit as i64);
        }
        let rows: Vec<MessageRow> = query.load(&mut conn).await.map_err(storage)?;
        let mut history = rows
            .into_iter()
            .map(map_message)
            .collect::<Result<Vec<_>>>()?;
        history.reverse();
        Ok(history)
    }

    async fn create_transaction(&self, user_id: &str, tx: &NewTransaction) -> Result<RecordId> {
        let row = NewTransactionRow {
            user_id,
            date: format_date(tx.date),
            kind: tx.kind.as_str(),
            amount: tx.amount.to_string(),
            currency: &tx.currency,
            category: tx.category.as_deref(),
            description: tx.description.as_deref(),
            payment_method: tx.payment_method.as_deref(),
            payment_source: tx.payment_source.as_deref(),
        };
        let mut conn = self.conn().await?;
        diesel::insert_into(transactions::table)
            .values(&row)
            .returning(transactions::id)
            .get_result(&mut conn)
            .await
            .map_err(storage)
    }

    async fn update_transaction(
        &self,
        user_id: &str,
        id: RecordId,
        patch: &TransactionPatch,
    ) -> Result<bool> {
        let changes = TransactionChangeset {
            date: patch.date.map(format_date),
            kind: patch.kind.as_ref().map(|k| k.as_str()),
            amount: patch.amount.map(|a| a.to_string()),
            currency: patch.currency.as_deref(),
            category: patch.category.as_deref(),
            description: patch.description.as_deref(),
            payment_method: patch.payment_method.as_deref(),
            payment_source: patch.payment_source.as_deref(),
        };
        let target = transactions::table
            .filter(transactions::user_id.eq(user_id))
            .filter(transactions::id.eq(id));
        let mut conn = self.conn().await?;

        if *patch == TransactionPatch::default() {
            // Nothing to set; diesel rejects empty changesets.
            let found: Option<i32> = target
                .select(transactions::id)
                .first(&mut conn)
                .await
                .optional()
                .map_err(storage)?;
            return Ok(found.is_some());
        }

        let updated = diesel::update(target)
            .set(&changes)
            .execute(&mut conn)
            .await
            .map_err(storage)?;
        Ok(updated > 0)
    }

    async fn delete_transaction(&self, user_id: &str, id: RecordId) -> Result<bool> {
        let mut conn = self.conn().await?;
        let deleted = diesel::delete(
            transactions::table
                .filter(transactions::user_id.eq(user_id))
                .filter(transactions::id.eq(id)),
        )
        .execute(&mut conn)
        .await
        .map_err(storage)?;
        Ok(deleted > 0)
    }

    async fn transactions_since(&self, user_id: &str, since: Date) -> Result<Vec<Transaction>> {
        let mut conn = self.conn().await?;
        let rows: Vec<TransactionRow> = transactions::table
            .filter(transactions::user_id.eq(user_id))
            .filter(transactions::date.ge(format_date(since)))
            .order((transactions::date.desc(), transactions::id.desc()))
            .load(&mut conn)
            .await
            .map_err(storage)?;
        rows.into_iter().map(map_transaction).collect()
    }

    async fn create_holding(&self, user_id: &str, holding: &NewHolding) -> Result<RecordId> {
        let row = NewHoldingRow {
            user_id,
            asset_type: &holding.asset_type,
            ticker: &holding.ticker,
            ticker_key: ticker_key(&holding.ticker),
            name: holding.name.as_deref(),
            shares: holding.shares.to_string(),
            avg_cost: holding.avg_cost.to_string(),
            currency: &holding.currency,
            platform: holding.platform.as_deref(),
            notes: holding.notes.as_deref(),
            last_updated: now_ts(),
        };
        let mut conn = self.conn().await?;
        diesel::insert_into(holdings::table)
            .values(&row)
            .returning(holdings::id)
            .get_result(&mut conn)
            .await
            .map_err(storage)
    }

    async fn update_holding(
        &self,
        user_id: &str,
        id: RecordId,
        patch: &HoldingPatch,
    ) -> Result<bool> {
        let changes = HoldingChangeset {
            asset_type: patch.asset_type.as_deref(),
            name: patch.name.as_deref(),
            shares: patch.shares.map(|s| s.to_string()),
            avg_cost: patch.avg_cost.map(|c| c.to_string()),
            currency: patch.currency.as_deref(),
            platform: patch.platform.as_deref(),
            notes: patch.notes.as_deref(),
            last_updated: now_ts(),
        };
        let mut conn = self.conn().await?;
        let updated = diesel::update(
            holdings::table
                .filter(holdings::user_id.eq(user_id))
                .filter(holdings::id.eq(id)),
        )
        .set(&changes)
        .execute(&mut conn)
        .await
        .map_err(storage)?;
        Ok(updated > 0)
    }

    async fn delete_holding(&self, user_id: &str, id: RecordId) -> Result<bool> {
        let mut conn = self.conn().await?;
        let deleted = diesel::delete(
            holdings::table
                .filter(holdings::user_id.eq(user_id))
                .filter(holdings::id.eq(id)),
        )
        .execute(&mut conn)
        .await
        .map_err(storage)?;
        Ok(deleted > 0)
    }

    async fn holdings(&self, user_id: &str) -> Result<Vec<Holding>> {
        let mut conn = self.conn().await?;
        let rows: Vec<HoldingRow> = holdings::table
            .filter(holdings::user_id.eq(user_id))
            .order(holdings::id.asc())
            .load(&mut conn)
            .await
            .map_err(storage)?;
        rows.into_iter().map(map_holding).collect()
    }

    async fn holding_by_ticker(&self, user_id: &str, ticker: &str) -> Result<Option<Holding>> {
        let mut conn = self.conn().await?;
        let row: Option<HoldingRow> = holdings::table
            .filter(holdings::user_id.eq(user_id))
            .filter(holdings::ticker_key.eq(ticker_key(ticker)))
            .order(holdings::id.asc())
            .first(&mut conn)
            .await
            .optional()
            .map_err(storage)?;
        row.map(map_holding).transpose()
    }

    async fn create_activity(&self, user_id: &str, activity: &NewActivity) -> Result<RecordId> {
        let row = NewActivityRow {
            user_id,
            date: format_date(activity.date),
            activity_type: activity.activity_type.as_str(),
            ticker: activity.ticker.as_deref(),
            shares: activity.shares.map(|v| v.to_string()),
            price_per_unit: activity.price_per_unit.map(|v| v.to_string()),
            total_amount: activity.total_amount.map(|v| v.to_string()),
            currency: &activity.currency,
            platform: activity.platform.as_deref(),
            realized_gain: activity.realized_gain.map(|v| v.to_string()),
            notes: activity.notes.as_deref(),
        };
        let mut conn = self.conn().await?;
        diesel::insert_into(activities::table)
            .values(&row)
            .returning(activities::id)
            .get_result(&mut conn)
            .await
            .map_err(storage)
    }

    async fn activities_since(&self, user_id: &str, since: Date) -> Result<Vec<Activity>> {
        let mut conn = self.conn().await?;
        let rows: Vec<ActivityRow> = activities::table
            .filter(activities::user_id.eq(user_id))
            .filter(activities::date.ge(format_date(since)))
            .order((activities::date.desc(), activities::id.desc()))
            .load(&mut conn)
            .await
            .map_err(storage)?;
        rows.into_iter().map(map_activity).collect()
    }

    async fn save_memory(&self, user_id: &str, memory: &NewMemory) -> Result<RecordId> {
        let row = NewMemoryRow {
            user_id,
            fact: &memory.fact,
            category: memory.category.as_str(),
            created_at: now_ts(),
        };
        let mut conn = self.conn().await?;
        diesel::insert_into(memories::table)
            .values(&row)
            .returning(memories::id)
            .get_result(&mut conn)
            .await
            .map_err(storage)
    }

    async fn memories(&self, user_id: &str) -> Result<Vec<Memory>> {
        let mut conn = self.conn().await?;
        let rows: Vec<MemoryRow> = memories::table
            .filter(memories::user_id.eq(user_id))
            .order(memories::id.asc())
            .load(&mut conn)
            .await
            .map_err(storage)?;
        Ok(rows.into_iter().map(map_memory).collect())
    }

    async fn delete_memory(&self, user_id: &str, id: RecordId) -> Result<bool> {
        let mut conn = self.conn().await?;
        let deleted = diesel::delete(
            memories::table
                .filter(memories::user_id.eq(user_id))
                .filter(memories::id.eq(id)),
        )
        .execute(&mut conn)
        .await
        .map_err(storage)?;
        Ok(deleted > 0)
    }
}

fn ensure_parent_dir(path: &str) -> Result<()> {
    let path = Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| YellowTrackerError::Storage(e.to_string()))?;
    }
    Ok(())
}

async fn run_migrations(database_url: &str) -> Result<()> {
    let database_url = database_url.to_string();
    tokio::task::spawn_blocking(move || {
        let mut conn = SqliteConnection::establish(&database_url)
            .map_err(|e| YellowTrackerError::Storage(e.to_string()))?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|e| YellowTrackerError::Storage(e.to_string()))?;
        Ok::<_, YellowTrackerError>(())
    })
    .await
    .map_err(|e| YellowTrackerError::Runtime(e.to_string()))??;
    Ok(())
}
