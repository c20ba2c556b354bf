use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;

use crate::config::Config;
use crate::domains::ledger::{Holding, Message, RecordId};
use crate::error::Result;
use crate::factories::tracker_factory::{TrackerParts, YellowTrackerFactory};
use crate::interfaces::providers::{AssetClass, PriceProvider};
use crate::interfaces::store::LedgerStore;
use crate::services::conversation::{ConversationService, InboundMessage, TurnReply};

pub const WELCOME_TEXT: &str = "Hey! I'm Yellow Tracker, your personal finance assistant.

Just talk to me naturally about your money:

Expenses & Income
\"spent $30 on lunch\"
\"got paid $5000 salary\"
\"that was with my Chase card\"

Investments
\"I bought 10 shares of Apple at $180\"
\"I own 0.5 BTC\"
\"sold half my Tesla\"

Questions
\"how much did I spend on food this week?\"
\"what's my portfolio worth?\"
\"show me my recent transactions\"

I'll remember everything and learn your preferences over time. Let's go!";

/// A holding with its best-effort market quote. Values stay in the
/// holding's own currency; nothing is converted or summed across currencies.
#[derive(Debug, Clone, Serialize)]
pub struct PortfolioLine {
    pub holding: Holding,
    pub price: Option<Decimal>,
    pub market_value: Option<Decimal>,
}

/// App context built once at startup and shared by every transport.
pub struct YellowTracker {
    conversation: ConversationService,
    store: Arc<dyn LedgerStore>,
    prices: Arc<dyn PriceProvider>,
}

impl YellowTracker {
    pub async fn from_config(config: Config) -> Result<Self> {
        let parts = YellowTrackerFactory::create_from_config(config).await?;
        Ok(Self::from_parts(parts))
    }

    pub fn from_parts(parts: TrackerParts) -> Self {
        Self {
            conversation: parts.conversation,
            store: parts.store,
            prices: parts.prices,
        }
    }

    pub async fn process(&self, user_id: &str, message: InboundMessage) -> Result<TurnReply> {
        self.conversation.handle(user_id, message).await
    }

    pub async fn history(&self, user_id: &str, limit: usize) -> Result<Vec<Message>> {
        self.store.recent_messages(user_id, limit).await
    }

    pub async fn holdings(&self, user_id: &str) -> Result<Vec<Holding>> {
        self.store.holdings(user_id).await
    }

    pub async fn price(&self, ticker: &str, class: AssetClass) -> Option<Decimal> {
        self.prices.price(ticker, class).await
    }

    pub async fn portfolio(&self, user_id: &str) -> Result<Vec<PortfolioLine>> {
        let holdings = self.store.holdings(user_id).await?;
        let quotes = futures::future::join_all(holdings.iter().map(|h| {
            self.prices
                .price(&h.ticker, AssetClass::from_asset_type(&h.asset_type))
        }))
        .await;
        Ok(holdings
            .into_iter()
            .zip(quotes)
            .map(|(holding, price)| PortfolioLine {
                market_value: price.and_then(|p| p.checked_mul(holding.shares)),
                price,
                holding,
            })
            .collect())
    }

    pub async fn forget_memory(&self, user_id: &str, id: RecordId) -> Result<bool> {
        self.store.delete_memory(user_id, id).await
    }

    pub fn welcome(&self) -> &'static str {
        WELCOME_TEXT
    }

    /// Connections are released when the last handle to the store drops.
    pub fn shutdown(self) {
        info!("yellow tracker shutting down");
        drop(self);
    }
}
