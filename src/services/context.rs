use std::sync::Arc;

use rust_decimal::Decimal;
use time::{macros::format_description, Date, Duration, OffsetDateTime};

use crate::domains::ledger::{format_date, Activity, Holding, Memory, Transaction};
use crate::error::Result;
use crate::interfaces::providers::ChatTurn;
use crate::interfaces::store::LedgerStore;

pub const HISTORY_LIMIT: usize = 50;
pub const TRANSACTION_WINDOW_DAYS: i64 = 90;
pub const TRANSACTIONS_RENDERED: usize = 30;
pub const ACTIVITY_WINDOW_DAYS: i64 = 365;
pub const ACTIVITIES_RENDERED: usize = 20;

pub const NO_TRANSACTIONS: &str = "No recent transactions.";
pub const NO_HOLDINGS: &str = "No holdings.";
pub const NO_ACTIVITY: &str = "No recent investment activity.";
pub const NO_MEMORIES: &str = "No stored memories yet.";

const MISSING: &str = "-";

/// Everything the translator sees for one turn, rebuilt from the store on
/// every inbound message.
#[derive(Debug, Clone)]
pub struct UserContext {
    /// Oldest first.
    pub history: Vec<ChatTurn>,
    pub narrative: String,
    pub system_prompt: String,
}

pub struct ContextAssembler {
    store: Arc<dyn LedgerStore>,
    assistant_name: String,
    currencies: Vec<String>,
}

impl ContextAssembler {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        assistant_name: String,
        currencies: Vec<String>,
    ) -> Self {
        Self {
            store,
            assistant_name,
            currencies,
        }
    }

    /// Read-only: performs no writes against the store.
    pub async fn assemble(&self, user_id: &str, now: OffsetDateTime) -> Result<UserContext> {
        let today = now.date();
        let tx_since = days_before(today, TRANSACTION_WINDOW_DAYS);
        let activity_since = days_before(today, ACTIVITY_WINDOW_DAYS);

        let (messages, transactions, holdings, activities, memories) = tokio::try_join!(
            self.store.recent_messages(user_id, HISTORY_LIMIT),
            self.store.transactions_since(user_id, tx_since),
            self.store.holdings(user_id),
            self.store.activities_since(user_id, activity_since),
            self.store.memories(user_id),
        )?;

        let history = messages
            .into_iter()
            .map(|m| ChatTurn {
                role: m.role,
                content: m.content,
            })
            .collect();
        let narrative = render_narrative(&transactions, &holdings, &activities, &memories);
        let system_prompt = self.system_prompt(&narrative, now);

        Ok(UserContext {
            history,
            narrative,
            system_prompt,
        })
    }

    pub fn system_prompt(&self, narrative: &str, now: OffsetDateTime) -> String {
        let stamp = now
            .format(format_description!("[year]-[month]-[day] [hour]:[minute]"))
            .unwrap_or_else(|_| format_date(now.date()));
        let currencies = self.currencies.join(", ");
        let default_currency = self
            .currencies
            .first()
            .map(String::as_str)
            .unwrap_or("USD");
        format!(
            r#"You are {name}, a personal AI financial assistant. You help the user track their expenses, income, investments, and overall financial life through natural conversation.

## YOUR CAPABILITIES
You can:
1. Log expenses and income (transactions)
2. Update or delete previous transactions
3. Track investment holdings (stocks, crypto, ETFs, bonds, etc.)
4. Log investment activity (buys, sells, dividends, staking rewards, interest, etc.)
5. Answer questions about spending, portfolio, trends
6. Remember facts and preferences about the user
7. Provide financial insights and summaries

## USER'S FINANCIAL STATE

{narrative}

## HOW TO RESPOND

You must ALWAYS respond with valid JSON in this exact format:
{{
  "actions": [
    {{
      "type": "create_transaction" | "update_transaction" | "delete_transaction" | "create_holding" | "update_holding" | "delete_holding" | "create_activity" | "save_memory" | "none",
      "data": {{ ... relevant fields ... }},
      "record_id": "only for updates/deletes"
    }}
  ],
  "response": "Your natural conversational response to the user"
}}

### Action Types and Data:

**create_transaction**: {{type, amount, currency, category, description, payment_method, payment_source, date}}
**update_transaction**: {{record_id required, plus any fields to update}}
**delete_transaction**: {{record_id required}}
**create_holding**: {{asset_type, ticker, name, shares, avg_cost, currency, platform, notes}}
**update_holding**: {{record_id required, plus any fields to update}}
**delete_holding**: {{record_id required}}
**create_activity**: {{activity_type, ticker, shares, price_per_unit, total_amount, currency, platform, realized_gain, notes, date}}
**save_memory**: {{fact, category: preference|pattern|personal|financial}}
**none**: No action needed, just responding

### Categories for Transactions:
Expenses: food, transport, housing, utilities, shopping, entertainment, health, travel, education, personal care, gifts, subscriptions, insurance, taxes, fees, business, family, pets, other expense
Income: salary, freelance, business income, investments, rental income, gifts received, refunds, other income

### Activity Types:
buy, sell, dividend, interest, staking reward, lending income, airdrop, transfer in, transfer out, fee, other

### Asset Types:
stock, crypto, etf, bond, commodity, real estate, other

## IMPORTANT BEHAVIORS

1. **Be conversational**: Respond naturally, not robotically.
2. **Infer intelligently**: If user says "that was with my Amex", understand they're updating the last transaction.
3. **Use context**: Reference past transactions and holdings when relevant.
4. **Ask for clarification** when truly needed, but make reasonable assumptions when you can.
5. **Remember things**: If user mentions something worth remembering (preferences, recurring expenses, etc.), save it to memory.
6. **Multiple actions**: You can perform multiple actions in one response if needed.
7. **Currency handling**: User's currencies are {currencies}. Default to {default_currency} if unclear.
8. **European decimals**: 31,50 means 31.50

Current date: {stamp}
"#,
            name = self.assistant_name,
        )
    }
}

fn days_before(today: Date, days: i64) -> Date {
    today.checked_sub(Duration::days(days)).unwrap_or(Date::MIN)
}

pub fn render_narrative(
    transactions: &[Transaction],
    holdings: &[Holding],
    activities: &[Activity],
    memories: &[Memory],
) -> String {
    format!(
        "### Recent Transactions (expenses/income):\n{}\n\n\
         ### Investment Holdings:\n{}\n\n\
         ### Recent Investment Activity:\n{}\n\n\
         ### Memories (things you know about this user):\n{}",
        section(
            transactions
                .iter()
                .take(TRANSACTIONS_RENDERED)
                .map(transaction_line),
            NO_TRANSACTIONS,
        ),
        section(holdings.iter().map(holding_line), NO_HOLDINGS),
        section(activities.iter().take(ACTIVITIES_RENDERED).map(activity_line), NO_ACTIVITY),
        section(memories.iter().map(memory_line), NO_MEMORIES),
    )
}

fn section(lines: impl Iterator<Item = String>, placeholder: &str) -> String {
    let lines: Vec<String> = lines.collect();
    if lines.is_empty() {
        placeholder.to_string()
    } else {
        lines.join("\n")
    }
}

pub fn transaction_line(tx: &Transaction) -> String {
    let payment = match (&tx.payment_method, &tx.payment_source) {
        (None, None) => MISSING.to_string(),
        (method, source) => [method.as_deref(), source.as_deref()]
            .iter()
            .flatten()
            .copied()
            .collect::<Vec<_>>()
            .join(" "),
    };
    format!(
        "- {}: {} {} {} - {} - {} (Payment: {}) [ID: {}]",
        format_date(tx.date),
        tx.kind,
        num(tx.amount),
        tx.currency,
        text(&tx.category),
        text(&tx.description),
        payment,
        tx.id,
    )
}

pub fn holding_line(holding: &Holding) -> String {
    format!(
        "- {} ({}): {} units @ avg {} {} on {} [ID: {}]",
        holding.ticker,
        holding.asset_type,
        num(holding.shares),
        num(holding.avg_cost),
        holding.currency,
        text(&holding.platform),
        holding.id,
    )
}

pub fn activity_line(activity: &Activity) -> String {
    format!(
        "- {}: {} {} {} @ {} = {} {}",
        format_date(activity.date),
        activity.activity_type,
        opt_num(activity.shares),
        text(&activity.ticker),
        opt_num(activity.price_per_unit),
        opt_num(activity.total_amount),
        activity.currency,
    )
}

pub fn memory_line(memory: &Memory) -> String {
    format!("- [{}] {}", memory.category, memory.fact)
}

fn num(value: Decimal) -> String {
    value.normalize().to_string()
}

fn opt_num(value: Option<Decimal>) -> String {
    value.map(num).unwrap_or_else(|| MISSING.to_string())
}

fn text(value: &Option<String>) -> &str {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(MISSING)
}
