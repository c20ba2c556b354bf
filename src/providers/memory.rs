use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use time::Date;
use tokio::sync::RwLock;

use crate::domains::ledger::{
    ticker_key, Activity, Holding, HoldingPatch, Memory, Message, NewActivity, NewHolding,
    NewMemory, NewTransaction, RecordId, Role, Transaction, TransactionPatch,
};
use crate::error::{Result, YellowTrackerError};
use crate::interfaces::store::LedgerStore;

#[derive(Default)]
struct Tables {
    next_id: RecordId,
    messages: Vec<Message>,
    transactions: Vec<Transaction>,
    holdings: Vec<Holding>,
    activities: Vec<Activity>,
    memories: Vec<Memory>,
}

impl Tables {
    fn allocate(&mut self) -> RecordId {
        self.next_id += 1;
        self.next_id
    }
}

/// Ledger kept in process memory. Ids are shared across all entity kinds.
#[derive(Default)]
pub struct InMemoryLedgerStore {
    tables: RwLock<Tables>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn now_ts() -> Result<i64> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| YellowTrackerError::Runtime(e.to_string()))?
        .as_secs() as i64)
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn append_message(&self, user_id: &str, role: Role, content: &str) -> Result<RecordId> {
        let timestamp = now_ts()?;
        let mut guard = self.tables.write().await;
        let id = guard.allocate();
        guard.messages.push(Message {
            id,
            user_id: user_id.to_string(),
            role,
            content: content.to_string(),
            timestamp,
        });
        Ok(id)
    }

    async fn recent_messages(&self, user_id: &str, limit: usize) -> Result<Vec<Message>> {
        let guard = self.tables.read().await;
        let mut messages: Vec<Message> = guard
            .messages
            .iter()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect();
        if limit > 0 && messages.len() > limit {
            messages = messages.split_off(messages.len() - limit);
        }
        Ok(messages)
    }

    async fn create_transaction(&self, user_id: &str, tx: &NewTransaction) -> Result<RecordId> {
        let mut guard = self.tables.write().await;
        let id = guard.allocate();
        guard.transactions.push(Transaction {
            id,
            user_id: user_id.to_string(),
            date: tx.date,
            kind: tx.kind,
            amount: tx.amount,
            currency: tx.currency.clone(),
            category: tx.category.clone(),
            description: tx.description.clone(),
            payment_method: tx.payment_method.clone(),
            payment_source: tx.payment_source.clone(),
        });
        Ok(id)
    }

    async fn update_transaction(
        &self,
        user_id: &str,
        id: RecordId,
        patch: &TransactionPatch,
    ) -> Result<bool> {
        let mut guard = self.tables.write().await;
        let Some(tx) = guard
            .transactions
            .iter_mut()
            .find(|t| t.id == id && t.user_id == user_id)
        else {
            return Ok(false);
        };
        patch.apply(tx);
        Ok(true)
    }

    async fn delete_transaction(&self, user_id: &str, id: RecordId) -> Result<bool> {
        let mut guard = self.tables.write().await;
        let before = guard.transactions.len();
        guard
            .transactions
            .retain(|t| !(t.id == id && t.user_id == user_id));
        Ok(guard.transactions.len() < before)
    }

    async fn transactions_since(&self, user_id: &str, since: Date) -> Result<Vec<Transaction>> {
        let guard = self.tables.read().await;
        let mut rows: Vec<Transaction> = guard
            .transactions
            .iter()
            .filter(|t| t.user_id == user_id && t.date >= since)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.date.cmp(&a.date).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    async fn create_holding(&self, user_id: &str, holding: &NewHolding) -> Result<RecordId> {
        let last_updated = now_ts()?;
        let mut guard = self.tables.write().await;
        let id = guard.allocate();
        guard.holdings.push(Holding {
            id,
            user_id: user_id.to_string(),
            asset_type: holding.asset_type.clone(),
            ticker: holding.ticker.clone(),
            name: holding.name.clone(),
            shares: holding.shares,
            avg_cost: holding.avg_cost,
            currency: holding.currency.clone(),
            platform: holding.platform.clone(),
            notes: holding.notes.clone(),
            last_updated,
        });
        Ok(id)
    }

    async fn update_holding(
        &self,
        user_id: &str,
        id: RecordId,
        patch: &HoldingPatch,
    ) -> Result<bool> {
        let last_updated = now_ts()?;
        let mut guard = self.tables.write().await;
        let Some(holding) = guard
            .holdings
            .iter_mut()
            .find(|h| h.id == id && h.user_id == user_id)
        else {
            return Ok(false);
        };
        patch.apply(holding);
        holding.last_updated = last_updated;
        Ok(true)
    }

    async fn delete_holding(&self, user_id: &str, id: RecordId) -> Result<bool> {
        let mut guard = self.tables.write().await;
        let before = guard.holdings.len();
        guard
            .holdings
            .retain(|h| !(h.id == id && h.user_id == user_id));
        Ok(guard.holdings.len() < before)
    }

    async fn holdings(&self, user_id: &str) -> Result<Vec<Holding>> {
        let guard = self.tables.read().await;
        Ok(guard
            .holdings
            .iter()
            .filter(|h| h.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn holding_by_ticker(&self, user_id: &str, ticker: &str) -> Result<Option<Holding>> {
        let key = ticker_key(ticker);
        let guard = self.tables.read().await;
        Ok(guard
            .holdings
            .iter()
            .find(|h| h.user_id == user_id && ticker_key(&h.ticker) == key)
            .cloned())
    }

    async fn create_activity(&self, user_id: &str, activity: &NewActivity) -> Result<RecordId> {
        let mut guard = self.tables.write().await;
        let id = guard.allocate();
        guard.activities.push(Activity {
            id,
            user_id: user_id.to_string(),
            date: activity.date,
            activity_type: activity.activity_type,
            ticker: activity.ticker.clone(),
            shares: activity.shares,
            price_per_unit: activity.price_per_unit,
            total_amount: activity.total_amount,
            currency: activity.currency.clone(),
            platform: activity.platform.clone(),
            realized_gain: activity.realized_gain,
            notes: activity.notes.clone(),
        });
        Ok(id)
    }

    async fn activities_since(&self, user_id: &str, since: Date) -> Result<Vec<Activity>> {
        let guard = self.tables.read().await;
        let mut rows: Vec<Activity> = guard
            .activities
            .iter()
            .filter(|a| a.user_id == user_id && a.date >= since)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.date.cmp(&a.date).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    async fn save_memory(&self, user_id: &str, memory: &NewMemory) -> Result<RecordId> {
        let created_at = now_ts()?;
        let mut guard = self.tables.write().await;
        let id = guard.allocate();
        guard.memories.push(Memory {
            id,
            user_id: user_id.to_string(),
            fact: memory.fact.clone(),
            category: memory.category,
            created_at,
        });
        Ok(id)
    }

    async fn memories(&self, user_id: &str) -> Result<Vec<Memory>> {
        let guard = self.tables.read().await;
        Ok(guard
            .memories
            .iter()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn delete_memory(&self, user_id: &str, id: RecordId) -> Result<bool> {
        let mut guard = self.tables.write().await;
        let before = guard.memories.len();
        guard
            .memories
            .retain(|m| !(m.id == id && m.user_id == user_id));
        Ok(guard.memories.len() < before)
    }
}
