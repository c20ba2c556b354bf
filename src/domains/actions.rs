//! The closed set of ledger actions the translator can request, and parsing of
//! the translator's raw text into a reply plus actions.

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use time::Date;

use crate::domains::ledger::{
    opt_date, ActivityType, HoldingPatch, MemoryCategory, NewActivity, NewHolding, NewMemory,
    NewTransaction, RecordId, TransactionPatch, TransactionType, DEFAULT_ASSET_TYPE,
    DEFAULT_CURRENCY,
};
use crate::error::{Result, YellowTrackerError};

pub const DEFAULT_REPLY: &str = "Done!";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TransactionDraft {
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub amount: Decimal,
    pub currency: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub payment_method: Option<String>,
    pub payment_source: Option<String>,
    #[serde(default, with = "opt_date")]
    pub date: Option<Date>,
}

impl TransactionDraft {
    pub fn into_new(self, today: Date) -> NewTransaction {
        NewTransaction {
            date: self.date.unwrap_or(today),
            kind: self.kind,
            amount: self.amount,
            currency: self
                .currency
                .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
            category: self.category,
            description: self.description,
            payment_method: self.payment_method,
            payment_source: self.payment_source,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HoldingDraft {
    pub asset_type: Option<String>,
    pub ticker: String,
    pub name: Option<String>,
    pub shares: Option<Decimal>,
    pub avg_cost: Option<Decimal>,
    pub currency: Option<String>,
    pub platform: Option<String>,
    pub notes: Option<String>,
}

impl HoldingDraft {
    pub fn as_patch(&self) -> HoldingPatch {
        HoldingPatch {
            asset_type: self.asset_type.clone(),
            name: self.name.clone(),
            shares: self.shares,
            avg_cost: self.avg_cost,
            currency: self.currency.clone(),
            platform: self.platform.clone(),
            notes: self.notes.clone(),
        }
    }

    pub fn into_new(self) -> NewHolding {
        NewHolding {
            asset_type: self
                .asset_type
                .unwrap_or_else(|| DEFAULT_ASSET_TYPE.to_string()),
            ticker: self.ticker.trim().to_string(),
            name: self.name,
            shares: self.shares.unwrap_or(Decimal::ZERO),
            avg_cost: self.avg_cost.unwrap_or(Decimal::ZERO),
            currency: self
                .currency
                .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
            platform: self.platform,
            notes: self.notes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ActivityDraft {
    #[serde(default)]
    pub activity_type: ActivityType,
    pub ticker: Option<String>,
    pub shares: Option<Decimal>,
    pub price_per_unit: Option<Decimal>,
    pub total_amount: Option<Decimal>,
    pub currency: Option<String>,
    pub platform: Option<String>,
    pub realized_gain: Option<Decimal>,
    pub notes: Option<String>,
    #[serde(default, with = "opt_date")]
    pub date: Option<Date>,
    /// Only used when a buy opens a new holding.
    pub asset_type: Option<String>,
}

impl ActivityDraft {
    pub fn to_new(&self, today: Date) -> NewActivity {
        NewActivity {
            date: self.date.unwrap_or(today),
            activity_type: self.activity_type,
            ticker: self.ticker.clone(),
            shares: self.shares,
            price_per_unit: self.price_per_unit,
            total_amount: self.total_amount,
            currency: self
                .currency
                .clone()
                .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
            platform: self.platform.clone(),
            realized_gain: self.realized_gain,
            notes: self.notes.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MemoryDraft {
    pub fact: String,
    #[serde(default)]
    pub category: MemoryCategory,
}

impl MemoryDraft {
    pub fn into_new(self) -> NewMemory {
        NewMemory {
            fact: self.fact,
            category: self.category,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    CreateTransaction(TransactionDraft),
    UpdateTransaction {
        record_id: Option<RecordId>,
        patch: TransactionPatch,
    },
    DeleteTransaction {
        record_id: Option<RecordId>,
    },
    CreateHolding(HoldingDraft),
    UpdateHolding {
        record_id: Option<RecordId>,
        patch: HoldingPatch,
    },
    DeleteHolding {
        record_id: Option<RecordId>,
    },
    CreateActivity(ActivityDraft),
    SaveMemory(MemoryDraft),
    None,
}

#[derive(Deserialize)]
struct RawAction {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    record_id: Value,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::CreateTransaction(_) => "create_transaction",
            Action::UpdateTransaction { .. } => "update_transaction",
            Action::DeleteTransaction { .. } => "delete_transaction",
            Action::CreateHolding(_) => "create_holding",
            Action::UpdateHolding { .. } => "update_holding",
            Action::DeleteHolding { .. } => "delete_holding",
            Action::CreateActivity(_) => "create_activity",
            Action::SaveMemory(_) => "save_memory",
            Action::None => "none",
        }
    }

    pub fn from_value(value: Value) -> Result<Self> {
        let raw: RawAction = serde_json::from_value(value)
            .map_err(|e| YellowTrackerError::Serialization(e.to_string()))?;
        let mut data = match raw.data {
            Value::Null => Value::Object(Default::default()),
            other => other,
        };
        // Some translators tuck the id inside the payload instead of alongside it.
        let record_id_value = match raw.record_id {
            Value::Null => data
                .as_object_mut()
                .and_then(|obj| obj.remove("record_id"))
                .unwrap_or(Value::Null),
            other => other,
        };

        let action = match raw.kind.trim() {
            "create_transaction" => Action::CreateTransaction(decode(data)?),
            "update_transaction" => Action::UpdateTransaction {
                record_id: parse_record_id(&record_id_value)?,
                patch: decode(data)?,
            },
            "delete_transaction" => Action::DeleteTransaction {
                record_id: parse_record_id(&record_id_value)?,
            },
            "create_holding" => Action::CreateHolding(decode(data)?),
            "update_holding" => Action::UpdateHolding {
                record_id: parse_record_id(&record_id_value)?,
                patch: decode(data)?,
            },
            "delete_holding" => Action::DeleteHolding {
                record_id: parse_record_id(&record_id_value)?,
            },
            "create_activity" => Action::CreateActivity(decode(data)?),
            "save_memory" => Action::SaveMemory(decode(data)?),
            "none" | "" => Action::None,
            other => {
                return Err(YellowTrackerError::Serialization(format!(
                    "unknown action type '{other}'"
                )))
            }
        };
        Ok(action)
    }
}

fn decode<T: for<'de> Deserialize<'de>>(data: Value) -> Result<T> {
    serde_json::from_value(data).map_err(|e| YellowTrackerError::Serialization(e.to_string()))
}

fn parse_record_id(value: &Value) -> Result<Option<RecordId>> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => s
            .trim()
            .parse::<RecordId>()
            .map(Some)
            .map_err(|_| YellowTrackerError::Serialization(format!("invalid record_id '{s}'"))),
        Value::Number(n) => n
            .as_i64()
            .and_then(|id| RecordId::try_from(id).ok())
            .map(Some)
            .ok_or_else(|| YellowTrackerError::Serialization(format!("invalid record_id {n}"))),
        other => Err(YellowTrackerError::Serialization(format!(
            "invalid record_id {other}"
        ))),
    }
}

/// An action entry that could not be decoded into any `Action` variant.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedAction {
    pub index: usize,
    pub kind: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TranslatorOutput {
    Structured {
        reply: String,
        actions: Vec<Action>,
        rejected: Vec<RejectedAction>,
    },
    /// Not the expected JSON envelope; the raw text becomes the reply.
    Unstructured(String),
}

impl TranslatorOutput {
    pub fn parse(raw: &str) -> Self {
        let body = strip_code_fence(raw);
        let Ok(Value::Object(mut envelope)) = serde_json::from_str::<Value>(body) else {
            return TranslatorOutput::Unstructured(raw.to_string());
        };

        let entries = match envelope.remove("actions") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(entries)) => entries,
            Some(_) => return TranslatorOutput::Unstructured(raw.to_string()),
        };
        let reply = match envelope.remove("response") {
            Some(Value::String(text)) => text,
            _ => DEFAULT_REPLY.to_string(),
        };

        let mut actions = Vec::new();
        let mut rejected = Vec::new();
        for (index, entry) in entries.into_iter().enumerate() {
            let kind = entry
                .get("type")
                .and_then(|v| v.as_str())
                .map(|v| v.to_string());
            match Action::from_value(entry) {
                Ok(action) => actions.push(action),
                Err(err) => rejected.push(RejectedAction {
                    index,
                    kind,
                    reason: err.to_string(),
                }),
            }
        }

        TranslatorOutput::Structured {
            reply,
            actions,
            rejected,
        }
    }

    pub fn reply(&self) -> &str {
        match self {
            TranslatorOutput::Structured { reply, .. } => reply,
            TranslatorOutput::Unstructured(text) => text,
        }
    }
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(rest) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") on the opening line.
    match rest.find('\n') {
        Some(pos) => rest[pos + 1..].trim(),
        None => rest.trim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use time::Month;

    fn today() -> Date {
        Date::from_calendar_date(2026, Month::October, 14).unwrap()
    }

    #[test]
    fn parses_envelope_with_mixed_actions() {
        let raw = json!({
            "actions": [
                {"type": "create_transaction", "data": {"type": "expense", "amount": 31.5, "category": "food"}},
                {"type": "update_transaction", "data": {"payment_method": "card"}, "record_id": "12"},
                {"type": "delete_holding", "data": {}, "record_id": 7},
                {"type": "teleport", "data": {}},
                {"type": "none", "data": {}}
            ],
            "response": "Logged it."
        })
        .to_string();

        let TranslatorOutput::Structured {
            reply,
            actions,
            rejected,
        } = TranslatorOutput::parse(&raw)
        else {
            panic!("expected structured output");
        };
        assert_eq!(reply, "Logged it.");
        assert_eq!(actions.len(), 4);
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].index, 3);
        assert_eq!(rejected[0].kind.as_deref(), Some("teleport"));

        match &actions[0] {
            Action::CreateTransaction(draft) => {
                let new = draft.clone().into_new(today());
                assert_eq!(new.amount, Decimal::new(315, 1));
                assert_eq!(new.currency, "USD");
                assert_eq!(new.date, today());
            }
            other => panic!("unexpected action {other:?}"),
        }
        assert_eq!(
            actions[1],
            Action::UpdateTransaction {
                record_id: Some(12),
                patch: TransactionPatch {
                    payment_method: Some("card".to_string()),
                    ..Default::default()
                },
            }
        );
        assert_eq!(actions[2], Action::DeleteHolding { record_id: Some(7) });
        assert_eq!(actions[3], Action::None);
    }

    #[test]
    fn missing_record_id_decodes_as_none() {
        let action = Action::from_value(json!({"type": "delete_transaction"})).unwrap();
        assert_eq!(action, Action::DeleteTransaction { record_id: None });

        let action = Action::from_value(
            json!({"type": "update_holding", "data": {"record_id": "3", "notes": "long term"}}),
        )
        .unwrap();
        match action {
            Action::UpdateHolding { record_id, patch } => {
                assert_eq!(record_id, Some(3));
                assert_eq!(patch.notes.as_deref(), Some("long term"));
            }
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn plain_text_is_unstructured() {
        let output = TranslatorOutput::parse("Sure, I can help with that!");
        assert_eq!(
            output,
            TranslatorOutput::Unstructured("Sure, I can help with that!".to_string())
        );
        assert_eq!(output.reply(), "Sure, I can help with that!");

        let output = TranslatorOutput::parse(r#"{"actions": "oops", "response": "x"}"#);
        assert!(matches!(output, TranslatorOutput::Unstructured(_)));

        let output = TranslatorOutput::parse("[1, 2, 3]");
        assert!(matches!(output, TranslatorOutput::Unstructured(_)));
    }

    #[test]
    fn fenced_json_and_default_reply() {
        let raw = "```json\n{\"actions\": [{\"type\": \"save_memory\", \"data\": {\"fact\": \"Paid monthly\"}}]}\n```";
        let TranslatorOutput::Structured { reply, actions, .. } = TranslatorOutput::parse(raw)
        else {
            panic!("expected structured output");
        };
        assert_eq!(reply, DEFAULT_REPLY);
        assert_eq!(
            actions,
            vec![Action::SaveMemory(MemoryDraft {
                fact: "Paid monthly".to_string(),
                category: MemoryCategory::Personal,
            })]
        );
    }

    #[test]
    fn holding_draft_defaults() {
        let draft: HoldingDraft =
            serde_json::from_value(json!({"ticker": " btc ", "shares": "0.5"})).unwrap();
        let new = draft.into_new();
        assert_eq!(new.ticker, "btc");
        assert_eq!(new.asset_type, "stock");
        assert_eq!(new.shares, Decimal::new(5, 1));
        assert_eq!(new.avg_cost, Decimal::ZERO);
    }
}
