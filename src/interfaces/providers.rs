use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domains::ledger::Role;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Raw image bytes, sent upstream as a jpeg data URL.
#[derive(Debug, Clone)]
pub struct ImageInput {
    pub bytes: Vec<u8>,
}

/// The intent translator: conversation plus rendered context in, raw model
/// text out. The image, when present, belongs to the last user turn.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn chat(
        &self,
        history: &[ChatTurn],
        system_prompt: &str,
        image: Option<&ImageInput>,
    ) -> Result<String>;
}

#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe_audio(&self, audio_bytes: Vec<u8>, input_format: &str) -> Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetClass {
    Stock,
    Crypto,
}

impl AssetClass {
    pub fn from_asset_type(asset_type: &str) -> Self {
        if asset_type.trim().eq_ignore_ascii_case("crypto") {
            AssetClass::Crypto
        } else {
            AssetClass::Stock
        }
    }
}

/// Best-effort market price lookup; `None` when unavailable.
#[async_trait]
pub trait PriceProvider: Send + Sync {
    async fn price(&self, ticker: &str, class: AssetClass) -> Option<Decimal>;
}
