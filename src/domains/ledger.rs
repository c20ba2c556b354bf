//! Ledger entities. Every record is scoped by an opaque `user_id`; identifiers
//! are assigned by the store on creation.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::{macros::format_description, Date};

use crate::error::{Result, YellowTrackerError};

pub type RecordId = i32;

pub const DEFAULT_CURRENCY: &str = "USD";
pub const DEFAULT_ASSET_TYPE: &str = "stock";

const DATE_FORMAT: &[time::format_description::FormatItem<'static>] =
    format_description!("[year]-[month]-[day]");

pub fn parse_date(raw: &str) -> Result<Date> {
    let trimmed = raw.trim();
    // Accept full timestamps by keeping only the calendar date.
    let head = trimmed.get(..10).unwrap_or(trimmed);
    Date::parse(head, DATE_FORMAT)
        .map_err(|e| YellowTrackerError::Serialization(format!("invalid date '{raw}': {e}")))
}

pub fn format_date(date: Date) -> String {
    date.format(DATE_FORMAT)
        .unwrap_or_else(|_| date.to_string())
}

/// Serde adapter for optional `YYYY-MM-DD` dates.
pub mod opt_date {
    use super::*;

    pub fn serialize<S: Serializer>(
        value: &Option<Date>,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        match value {
            Some(date) => serializer.serialize_some(&format_date(*date)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Option<Date>, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw {
            Some(value) if !value.trim().is_empty() => parse_date(&value)
                .map(Some)
                .map_err(serde::de::Error::custom),
            _ => Ok(None),
        }
    }
}

/// Serde adapter that writes dates as `YYYY-MM-DD`.
pub mod date {
    use super::*;

    pub fn serialize<S: Serializer>(
        value: &Date,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_date(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Date, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_date(&raw).map_err(serde::de::Error::custom)
    }
}

/// Upper-cased ticker; holdings are unique per (user, ticker key).
pub fn ticker_key(ticker: &str) -> String {
    ticker.trim().to_uppercase()
}

macro_rules! string_enum {
    ($name:ident, $fallback:expr, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = YellowTrackerError;

            fn from_str(value: &str) -> Result<Self> {
                let normalized = value.trim().to_lowercase().replace(['_', '-'], " ");
                match normalized.as_str() {
                    $($text => Ok($name::$variant),)+
                    _ => $fallback(value),
                }
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(
                &self,
                serializer: S,
            ) -> std::result::Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(
                deserializer: D,
            ) -> std::result::Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

string_enum!(Role, |v: &str| Err(YellowTrackerError::Serialization(format!("unknown role '{v}'"))), {
    User => "user",
    Assistant => "assistant",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionType {
    Expense,
    Income,
}

string_enum!(TransactionType, |v: &str| Err(YellowTrackerError::Serialization(format!("unknown transaction type '{v}'"))), {
    Expense => "expense",
    Income => "income",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActivityType {
    Buy,
    Sell,
    Dividend,
    Interest,
    StakingReward,
    LendingIncome,
    Airdrop,
    TransferIn,
    TransferOut,
    Fee,
    #[default]
    Other,
}

string_enum!(ActivityType, |_: &str| Ok(ActivityType::Other), {
    Buy => "buy",
    Sell => "sell",
    Dividend => "dividend",
    Interest => "interest",
    StakingReward => "staking reward",
    LendingIncome => "lending income",
    Airdrop => "airdrop",
    TransferIn => "transfer in",
    TransferOut => "transfer out",
    Fee => "fee",
    Other => "other",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MemoryCategory {
    Preference,
    Pattern,
    #[default]
    Personal,
    Financial,
}

string_enum!(MemoryCategory, |_: &str| Ok(MemoryCategory::Personal), {
    Preference => "preference",
    Pattern => "pattern",
    Personal => "personal",
    Financial => "financial",
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: RecordId,
    pub user_id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: RecordId,
    pub user_id: String,
    #[serde(with = "date")]
    pub date: Date,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub amount: Decimal,
    pub currency: String,
    pub category: Option<String>,
    pub description: Option<String>,
    pub payment_method: Option<String>,
    pub payment_source: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    pub date: Date,
    pub kind: TransactionType,
    pub amount: Decimal,
    pub currency: String,
    pub category: Option<String>,
    pub description: Option<String>,
    pub payment_method: Option<String>,
    pub payment_source: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TransactionPatch {
    #[serde(default, with = "opt_date")]
    pub date: Option<Date>,
    #[serde(rename = "type")]
    pub kind: Option<TransactionType>,
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub payment_method: Option<String>,
    pub payment_source: Option<String>,
}

impl TransactionPatch {
    pub fn apply(&self, tx: &mut Transaction) {
        if let Some(date) = self.date {
            tx.date = date;
        }
        if let Some(kind) = self.kind {
            tx.kind = kind;
        }
        if let Some(amount) = self.amount {
            tx.amount = amount;
        }
        if let Some(currency) = &self.currency {
            tx.currency = currency.clone();
        }
        merge(&mut tx.category, &self.category);
        merge(&mut tx.description, &self.description);
        merge(&mut tx.payment_method, &self.payment_method);
        merge(&mut tx.payment_source, &self.payment_source);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub id: RecordId,
    pub user_id: String,
    pub asset_type: String,
    pub ticker: String,
    pub name: Option<String>,
    pub shares: Decimal,
    pub avg_cost: Decimal,
    pub currency: String,
    pub platform: Option<String>,
    pub notes: Option<String>,
    pub last_updated: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewHolding {
    pub asset_type: String,
    pub ticker: String,
    pub name: Option<String>,
    pub shares: Decimal,
    pub avg_cost: Decimal,
    pub currency: String,
    pub platform: Option<String>,
    pub notes: Option<String>,
}

/// Partial holding update. The ticker is the identity key and is never patched.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct HoldingPatch {
    pub asset_type: Option<String>,
    pub name: Option<String>,
    pub shares: Option<Decimal>,
    pub avg_cost: Option<Decimal>,
    pub currency: Option<String>,
    pub platform: Option<String>,
    pub notes: Option<String>,
}

impl HoldingPatch {
    pub fn is_empty(&self) -> bool {
        *self == HoldingPatch::default()
    }

    pub fn apply(&self, holding: &mut Holding) {
        if let Some(asset_type) = &self.asset_type {
            holding.asset_type = asset_type.clone();
        }
        if let Some(shares) = self.shares {
            holding.shares = shares;
        }
        if let Some(avg_cost) = self.avg_cost {
            holding.avg_cost = avg_cost;
        }
        if let Some(currency) = &self.currency {
            holding.currency = currency.clone();
        }
        merge(&mut holding.name, &self.name);
        merge(&mut holding.platform, &self.platform);
        merge(&mut holding.notes, &self.notes);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: RecordId,
    pub user_id: String,
    #[serde(with = "date")]
    pub date: Date,
    pub activity_type: ActivityType,
    pub ticker: Option<String>,
    pub shares: Option<Decimal>,
    pub price_per_unit: Option<Decimal>,
    pub total_amount: Option<Decimal>,
    pub currency: String,
    pub platform: Option<String>,
    pub realized_gain: Option<Decimal>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewActivity {
    pub date: Date,
    pub activity_type: ActivityType,
    pub ticker: Option<String>,
    pub shares: Option<Decimal>,
    pub price_per_unit: Option<Decimal>,
    pub total_amount: Option<Decimal>,
    pub currency: String,
    pub platform: Option<String>,
    pub realized_gain: Option<Decimal>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    pub id: RecordId,
    pub user_id: String,
    pub fact: String,
    pub category: MemoryCategory,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewMemory {
    pub fact: String,
    pub category: MemoryCategory,
}

fn merge(target: &mut Option<String>, value: &Option<String>) {
    if let Some(value) = value {
        *target = Some(value.clone());
    }
}
