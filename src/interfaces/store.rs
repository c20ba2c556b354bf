use async_trait::async_trait;
use time::Date;

use crate::domains::ledger::{
    Activity, Holding, HoldingPatch, Memory, Message, NewActivity, NewHolding, NewMemory,
    NewTransaction, RecordId, Role, Transaction, TransactionPatch,
};
use crate::error::Result;

/// Persistent record storage for the five ledger entities.
///
/// Plain CRUD only: uniqueness of holdings per ticker and every other ledger
/// rule live in the action engine. Update and delete return `false` when no
/// record with that id belongs to the user.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn append_message(&self, user_id: &str, role: Role, content: &str) -> Result<RecordId>;
    /// The newest `limit` messages, oldest first.
    async fn recent_messages(&self, user_id: &str, limit: usize) -> Result<Vec<Message>>;

    async fn create_transaction(&self, user_id: &str, tx: &NewTransaction) -> Result<RecordId>;
    async fn update_transaction(
        &self,
        user_id: &str,
        id: RecordId,
        patch: &TransactionPatch,
    ) -> Result<bool>;
    async fn delete_transaction(&self, user_id: &str, id: RecordId) -> Result<bool>;
    /// Transactions dated on or after `since`, newest first.
    async fn transactions_since(&self, user_id: &str, since: Date) -> Result<Vec<Transaction>>;

    async fn create_holding(&self, user_id: &str, holding: &NewHolding) -> Result<RecordId>;
    async fn update_holding(
        &self,
        user_id: &str,
        id: RecordId,
        patch: &HoldingPatch,
    ) -> Result<bool>;
    async fn delete_holding(&self, user_id: &str, id: RecordId) -> Result<bool>;
    async fn holdings(&self, user_id: &str) -> Result<Vec<Holding>>;
    /// Case-insensitive ticker lookup.
    async fn holding_by_ticker(&self, user_id: &str, ticker: &str) -> Result<Option<Holding>>;

    async fn create_activity(&self, user_id: &str, activity: &NewActivity) -> Result<RecordId>;
    /// Activity dated on or after `since`, newest first.
    async fn activities_since(&self, user_id: &str, since: Date) -> Result<Vec<Activity>>;

    async fn save_memory(&self, user_id: &str, memory: &NewMemory) -> Result<RecordId>;
    async fn memories(&self, user_id: &str) -> Result<Vec<Memory>>;
    async fn delete_memory(&self, user_id: &str, id: RecordId) -> Result<bool>;
}
