#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use yellow_tracker::config::Config;
use yellow_tracker::error::{Result, YellowTrackerError};
use yellow_tracker::factories::tracker_factory::{TrackerParts, YellowTrackerFactory};
use yellow_tracker::interfaces::providers::{
    AssetClass, ChatTurn, ImageInput, LlmProvider, PriceProvider, Transcriber,
};
use yellow_tracker::interfaces::store::LedgerStore;
use yellow_tracker::providers::memory::InMemoryLedgerStore;

/// One recorded translator call.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub history: Vec<ChatTurn>,
    pub system_prompt: String,
    pub had_image: bool,
}

/// Replays scripted translator outputs in order; `Err` entries simulate
/// upstream failures.
pub struct QueueLlmProvider {
    queue: Mutex<VecDeque<Result<String>>>,
    pub calls: Mutex<Vec<RecordedCall>>,
}

impl QueueLlmProvider {
    pub fn new(queue: Vec<Result<String>>) -> Self {
        Self {
            queue: Mutex::new(VecDeque::from(queue)),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn replies(replies: &[&str]) -> Self {
        Self::new(replies.iter().map(|r| Ok(r.to_string())).collect())
    }

    pub async fn recorded(&self) -> Vec<RecordedCall> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl LlmProvider for QueueLlmProvider {
    async fn chat(
        &self,
        history: &[ChatTurn],
        system_prompt: &str,
        image: Option<&ImageInput>,
    ) -> Result<String> {
        self.calls.lock().await.push(RecordedCall {
            history: history.to_vec(),
            system_prompt: system_prompt.to_string(),
            had_image: image.is_some(),
        });
        let mut guard = self.queue.lock().await;
        guard.pop_front().unwrap_or_else(|| {
            Err(YellowTrackerError::Http("no scripted reply left".to_string()))
        })
    }
}

pub struct StaticTranscriber {
    pub result: std::result::Result<String, String>,
}

#[async_trait]
impl Transcriber for StaticTranscriber {
    async fn transcribe_audio(&self, _audio_bytes: Vec<u8>, _input_format: &str) -> Result<String> {
        self.result
            .clone()
            .map_err(YellowTrackerError::Http)
    }
}

pub struct FixedPrices {
    pub price: Option<Decimal>,
}

#[async_trait]
impl PriceProvider for FixedPrices {
    async fn price(&self, _ticker: &str, _class: AssetClass) -> Option<Decimal> {
        self.price
    }
}

pub struct Harness {
    pub store: Arc<InMemoryLedgerStore>,
    pub translator: Arc<QueueLlmProvider>,
    pub parts: TrackerParts,
}

pub fn harness(translator: QueueLlmProvider) -> Harness {
    harness_with(translator, None)
}

pub fn harness_with(
    translator: QueueLlmProvider,
    transcriber: Option<StaticTranscriber>,
) -> Harness {
    let store = Arc::new(InMemoryLedgerStore::new());
    let translator = Arc::new(translator);
    let ledger: Arc<dyn LedgerStore> = store.clone();
    let llm: Arc<dyn LlmProvider> = translator.clone();
    let transcriber = transcriber.map(|t| Arc::new(t) as Arc<dyn Transcriber>);
    let parts = YellowTrackerFactory::assemble(
        &Config::default(),
        ledger,
        llm,
        transcriber,
        Arc::new(FixedPrices {
            price: Some(Decimal::from(200)),
        }),
    );
    Harness {
        store,
        translator,
        parts,
    }
}
