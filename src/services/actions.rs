use std::sync::Arc;

use rust_decimal::Decimal;
use time::Date;
use tracing::{debug, info, warn};

use crate::domains::actions::{Action, ActivityDraft, HoldingDraft};
use crate::domains::holding::{self, ReconcilePlan, TradeLeg};
use crate::domains::ledger::{ActivityType, HoldingPatch, RecordId};
use crate::error::{Result, YellowTrackerError};
use crate::interfaces::store::LedgerStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    Applied,
    /// Nothing was written; the reason is already logged.
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    MissingRecordId,
    RecordNotFound,
    NoOp,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionFailure {
    pub index: usize,
    pub action: &'static str,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionReport {
    pub applied: usize,
    pub skipped: usize,
    pub failures: Vec<ActionFailure>,
}

impl ExecutionReport {
    pub fn record_failure(&mut self, index: usize, action: &'static str, reason: String) {
        self.failures.push(ActionFailure {
            index,
            action,
            reason,
        });
    }
}

/// Applies translated actions to the ledger one at a time, in order.
///
/// There is no transaction spanning the batch: a failing action is reported
/// and the remaining actions still run.
pub struct ActionExecutor {
    store: Arc<dyn LedgerStore>,
}

impl ActionExecutor {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub async fn execute_all(
        &self,
        user_id: &str,
        actions: &[Action],
        today: Date,
    ) -> ExecutionReport {
        let mut report = ExecutionReport::default();
        for (index, action) in actions.iter().enumerate() {
            match self.execute(user_id, action, today).await {
                Ok(ActionOutcome::Applied) => report.applied += 1,
                Ok(ActionOutcome::Skipped(_)) => report.skipped += 1,
                Err(err) => {
                    warn!(user_id, action = action.name(), index, error = %err, "action failed");
                    report.record_failure(index, action.name(), err.to_string());
                }
            }
        }
        report
    }

    pub async fn execute(
        &self,
        user_id: &str,
        action: &Action,
        today: Date,
    ) -> Result<ActionOutcome> {
        match action {
            Action::CreateTransaction(draft) => {
                let id = self
                    .store
                    .create_transaction(user_id, &draft.clone().into_new(today))
                    .await?;
                debug!(user_id, record_id = id, "transaction created");
                Ok(ActionOutcome::Applied)
            }
            Action::UpdateTransaction { record_id, patch } => {
                let Some(id) = require_id(user_id, action, *record_id) else {
                    return Ok(ActionOutcome::Skipped(SkipReason::MissingRecordId));
                };
                let found = self.store.update_transaction(user_id, id, patch).await?;
                Ok(found_outcome(user_id, action, id, found))
            }
            Action::DeleteTransaction { record_id } => {
                let Some(id) = require_id(user_id, action, *record_id) else {
                    return Ok(ActionOutcome::Skipped(SkipReason::MissingRecordId));
                };
                let found = self.store.delete_transaction(user_id, id).await?;
                Ok(found_outcome(user_id, action, id, found))
            }
            Action::CreateHolding(draft) => self.upsert_holding(user_id, draft).await,
            Action::UpdateHolding { record_id, patch } => {
                let Some(id) = require_id(user_id, action, *record_id) else {
                    return Ok(ActionOutcome::Skipped(SkipReason::MissingRecordId));
                };
                self.patch_holding(user_id, action, id, patch).await
            }
            Action::DeleteHolding { record_id } => {
                let Some(id) = require_id(user_id, action, *record_id) else {
                    return Ok(ActionOutcome::Skipped(SkipReason::MissingRecordId));
                };
                let found = self.store.delete_holding(user_id, id).await?;
                Ok(found_outcome(user_id, action, id, found))
            }
            Action::CreateActivity(draft) => self.record_activity(user_id, draft, today).await,
            Action::SaveMemory(draft) => {
                let fact = draft.fact.trim();
                if fact.is_empty() {
                    return Err(YellowTrackerError::Runtime("memory fact is empty".to_string()));
                }
                let mut memory = draft.clone().into_new();
                memory.fact = fact.to_string();
                let id = self.store.save_memory(user_id, &memory).await?;
                debug!(user_id, record_id = id, "memory saved");
                Ok(ActionOutcome::Applied)
            }
            Action::None => Ok(ActionOutcome::Skipped(SkipReason::NoOp)),
        }
    }

    /// At most one holding per ticker: an existing one absorbs the draft.
    async fn upsert_holding(&self, user_id: &str, draft: &HoldingDraft) -> Result<ActionOutcome> {
        if draft.ticker.trim().is_empty() {
            return Err(YellowTrackerError::Runtime("holding ticker is empty".to_string()));
        }
        let patch = draft.as_patch();
        validate_holding_patch(&patch)?;

        match self.store.holding_by_ticker(user_id, &draft.ticker).await? {
            Some(existing) => {
                debug!(
                    user_id,
                    ticker = %existing.ticker,
                    record_id = existing.id,
                    "merging into existing holding"
                );
                if patch.is_empty() {
                    return Ok(ActionOutcome::Skipped(SkipReason::NoOp));
                }
                let action = Action::CreateHolding(draft.clone());
                self.patch_holding(user_id, &action, existing.id, &patch).await
            }
            None => {
                if !draft.shares.is_some_and(|s| s > Decimal::ZERO) {
                    return Err(YellowTrackerError::Runtime(
                        "new holding needs a positive share count".to_string(),
                    ));
                }
                let id = self
                    .store
                    .create_holding(user_id, &draft.clone().into_new())
                    .await?;
                debug!(user_id, ticker = %draft.ticker.trim(), record_id = id, "holding created");
                Ok(ActionOutcome::Applied)
            }
        }
    }

    /// A patch that takes shares to zero closes the position.
    async fn patch_holding(
        &self,
        user_id: &str,
        action: &Action,
        id: RecordId,
        patch: &HoldingPatch,
    ) -> Result<ActionOutcome> {
        validate_holding_patch(patch)?;
        let found = if patch.shares == Some(Decimal::ZERO) {
            info!(user_id, record_id = id, "holding set to zero shares, closing");
            self.store.delete_holding(user_id, id).await?
        } else {
            self.store.update_holding(user_id, id, patch).await?
        };
        Ok(found_outcome(user_id, action, id, found))
    }

    async fn record_activity(
        &self,
        user_id: &str,
        draft: &ActivityDraft,
        today: Date,
    ) -> Result<ActionOutcome> {
        let id = self
            .store
            .create_activity(user_id, &draft.to_new(today))
            .await?;
        debug!(user_id, record_id = id, activity = %draft.activity_type, "activity recorded");

        match TradeLeg::from_activity(draft) {
            Some(leg) => self.reconcile(user_id, &leg).await?,
            None if is_trade(draft) => {
                warn!(
                    user_id,
                    record_id = id,
                    "trade without a ticker or positive shares, holding unchanged"
                );
            }
            None => {}
        }
        Ok(ActionOutcome::Applied)
    }

    async fn reconcile(&self, user_id: &str, leg: &TradeLeg) -> Result<()> {
        let existing = self.store.holding_by_ticker(user_id, &leg.ticker).await?;
        match holding::plan(existing.as_ref(), leg)? {
            ReconcilePlan::Update {
                id,
                shares,
                avg_cost,
            } => {
                let patch = HoldingPatch {
                    shares: Some(shares),
                    avg_cost,
                    ..Default::default()
                };
                self.store.update_holding(user_id, id, &patch).await?;
                debug!(
                    user_id,
                    ticker = %leg.ticker,
                    record_id = id,
                    %shares,
                    "holding reconciled"
                );
            }
            ReconcilePlan::Open(new) => {
                let id = self.store.create_holding(user_id, &new).await?;
                debug!(user_id, ticker = %leg.ticker, record_id = id, "holding opened by buy");
            }
            ReconcilePlan::Close { id, oversold } => {
                if oversold {
                    warn!(
                        user_id,
                        ticker = %leg.ticker,
                        record_id = id,
                        "sell exceeds held shares, closing position"
                    );
                }
                self.store.delete_holding(user_id, id).await?;
                debug!(user_id, ticker = %leg.ticker, record_id = id, "holding closed");
            }
            ReconcilePlan::NothingToSell => {
                warn!(user_id, ticker = %leg.ticker, "sell for a ticker with no holding");
            }
        }
        Ok(())
    }
}

fn is_trade(draft: &ActivityDraft) -> bool {
    matches!(draft.activity_type, ActivityType::Buy | ActivityType::Sell)
}

fn require_id(user_id: &str, action: &Action, record_id: Option<RecordId>) -> Option<RecordId> {
    if record_id.is_none() {
        debug!(user_id, action = action.name(), "no record id, skipping");
    }
    record_id
}

fn found_outcome(user_id: &str, action: &Action, id: RecordId, found: bool) -> ActionOutcome {
    if found {
        ActionOutcome::Applied
    } else {
        debug!(user_id, action = action.name(), record_id = id, "record not found");
        ActionOutcome::Skipped(SkipReason::RecordNotFound)
    }
}

fn validate_holding_patch(patch: &HoldingPatch) -> Result<()> {
    if patch.shares.is_some_and(|s| s < Decimal::ZERO) {
        return Err(YellowTrackerError::Runtime(
            "holding shares cannot be negative".to_string(),
        ));
    }
    if patch.avg_cost.is_some_and(|c| c < Decimal::ZERO) {
        return Err(YellowTrackerError::Runtime(
            "holding avg_cost cannot be negative".to_string(),
        ));
    }
    Ok(())
}
