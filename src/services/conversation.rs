use std::collections::HashMap;
use std::sync::Arc;

use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::domains::actions::{Action, RejectedAction, TranslatorOutput};
use crate::domains::ledger::Role;
use crate::error::Result;
use crate::interfaces::providers::{ChatTurn, ImageInput, LlmProvider, Transcriber};
use crate::interfaces::store::LedgerStore;
use crate::services::actions::{ActionExecutor, ExecutionReport};
use crate::services::context::ContextAssembler;

pub const IMAGE_MARKER: &str = "[User sent an image]";
pub const DEFAULT_IMAGE_CAPTION: &str = "Please extract transaction data from this receipt/image.";
pub const VOICE_FAILURE_REPLY: &str =
    "Sorry, I couldn't process that voice message. Please try again.";

#[derive(Debug, Clone)]
pub enum InboundMessage {
    Text(String),
    Voice { bytes: Vec<u8>, format: String },
    Photo { bytes: Vec<u8>, caption: Option<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStatus {
    /// Reply and actions came back in the expected envelope.
    Structured,
    /// The raw translator text became the reply; nothing was executed.
    Unstructured,
    TranslationFailed,
    TranscriptionFailed,
}

#[derive(Debug, Clone)]
pub struct TurnReply {
    pub text: String,
    pub status: TurnStatus,
    pub report: ExecutionReport,
}

impl TurnReply {
    fn new(text: String, status: TurnStatus) -> Self {
        Self {
            text,
            status,
            report: ExecutionReport::default(),
        }
    }
}

/// Runs one inbound message through context assembly, translation, action
/// execution and persistence.
///
/// Turns for the same user are serialized so that holding reconciliation
/// never races a concurrent turn. Different users proceed in parallel.
pub struct ConversationService {
    store: Arc<dyn LedgerStore>,
    assembler: ContextAssembler,
    executor: ActionExecutor,
    translator: Arc<dyn LlmProvider>,
    transcriber: Option<Arc<dyn Transcriber>>,
    user_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ConversationService {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        assembler: ContextAssembler,
        translator: Arc<dyn LlmProvider>,
        transcriber: Option<Arc<dyn Transcriber>>,
    ) -> Self {
        Self {
            executor: ActionExecutor::new(store.clone()),
            store,
            assembler,
            translator,
            transcriber,
            user_locks: Mutex::new(HashMap::new()),
        }
    }

    pub async fn handle(&self, user_id: &str, message: InboundMessage) -> Result<TurnReply> {
        let (content, image) = match message {
            InboundMessage::Text(text) => (text, None),
            InboundMessage::Voice { bytes, format } => match self.transcribe(bytes, &format).await {
                Some(text) => (text, None),
                None => {
                    return Ok(TurnReply::new(
                        VOICE_FAILURE_REPLY.to_string(),
                        TurnStatus::TranscriptionFailed,
                    ))
                }
            },
            InboundMessage::Photo { bytes, caption } => {
                let caption = caption
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty())
                    .unwrap_or_else(|| DEFAULT_IMAGE_CAPTION.to_string());
                let image = ImageInput { bytes };
                (format!("{IMAGE_MARKER}\n\n{caption}"), Some(image))
            }
        };

        let lock = self.user_lock(user_id).await;
        let result = {
            let _guard = lock.lock().await;
            self.run_turn(user_id, content, image.as_ref(), OffsetDateTime::now_utc())
                .await
        };
        self.release_user_lock(user_id, lock).await;
        result
    }

    async fn transcribe(&self, bytes: Vec<u8>, format: &str) -> Option<String> {
        let Some(transcriber) = &self.transcriber else {
            warn!("voice message received but no transcriber is configured");
            return None;
        };
        match transcriber.transcribe_audio(bytes, format).await {
            Ok(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
            Ok(_) => {
                warn!("transcription returned no text");
                None
            }
            Err(err) => {
                error!(error = %err, "voice transcription failed");
                None
            }
        }
    }

    async fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.user_locks.lock().await;
        locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drops the map entry once no other turn for the user holds or awaits it.
    async fn release_user_lock(&self, user_id: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.user_locks.lock().await;
        drop(lock);
        if locks
            .get(user_id)
            .is_some_and(|entry| Arc::strong_count(entry) == 1)
        {
            locks.remove(user_id);
        }
    }

    async fn run_turn(
        &self,
        user_id: &str,
        content: String,
        image: Option<&ImageInput>,
        now: OffsetDateTime,
    ) -> Result<TurnReply> {
        let context = self.assembler.assemble(user_id, now).await?;
        let mut history = context.history;
        history.push(ChatTurn::user(content.clone()));
        self.store
            .append_message(user_id, Role::User, &content)
            .await?;

        let raw = match self
            .translator
            .chat(&history, &context.system_prompt, image)
            .await
        {
            Ok(raw) => raw,
            Err(err) => {
                error!(user_id, error = %err, "translation failed");
                return Ok(TurnReply::new(
                    format!("Sorry, I encountered an error: {err}"),
                    TurnStatus::TranslationFailed,
                ));
            }
        };

        let reply = match TranslatorOutput::parse(&raw) {
            TranslatorOutput::Structured {
                reply,
                actions,
                rejected,
            } => {
                let mut report = ExecutionReport::default();
                for rejection in &rejected {
                    warn!(
                        user_id,
                        index = rejection.index,
                        action = rejection.kind.as_deref().unwrap_or("unknown"),
                        reason = %rejection.reason,
                        "discarding undecodable action"
                    );
                    report.record_failure(rejection.index, "undecodable", rejection.reason.clone());
                }
                let executed = self.executor.execute_all(user_id, &actions, now.date()).await;
                let positions = decoded_positions(actions.len(), &rejected);
                report.applied = executed.applied;
                report.skipped = executed.skipped;
                report.failures.extend(executed.failures.into_iter().map(|mut failure| {
                    if let Some(position) = positions.get(failure.index) {
                        failure.index = *position;
                    }
                    failure
                }));
                report.failures.sort_by_key(|failure| failure.index);
                info!(
                    user_id,
                    actions = actions.iter().filter(|a| !matches!(a, Action::None)).count(),
                    applied = report.applied,
                    failed = report.failures.len(),
                    "turn executed"
                );
                TurnReply {
                    text: reply,
                    status: TurnStatus::Structured,
                    report,
                }
            }
            TranslatorOutput::Unstructured(text) => {
                warn!(
                    user_id,
                    "translator output is not the action envelope, replying with raw text"
                );
                TurnReply::new(text, TurnStatus::Unstructured)
            }
        };

        self.store
            .append_message(user_id, Role::Assistant, &reply.text)
            .await?;
        Ok(reply)
    }
}

/// Raw entry position of each decoded action, so every failure in a report
/// points into the translator's original `actions` array.
fn decoded_positions(decoded: usize, rejected: &[RejectedAction]) -> Vec<usize> {
    (0..decoded + rejected.len())
        .filter(|index| !rejected.iter().any(|r| r.index == *index))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    use crate::providers::memory::InMemoryLedgerStore;

    struct CannedTranslator(String);

    #[async_trait]
    impl LlmProvider for CannedTranslator {
        async fn chat(
            &self,
            _history: &[ChatTurn],
            _system_prompt: &str,
            _image: Option<&ImageInput>,
        ) -> Result<String> {
            Ok(self.0.clone())
        }
    }

    fn service(reply: String) -> ConversationService {
        let store: Arc<dyn LedgerStore> = Arc::new(InMemoryLedgerStore::new());
        let assembler =
            ContextAssembler::new(store.clone(), "Yellow".to_string(), vec!["USD".to_string()]);
        ConversationService::new(store, assembler, Arc::new(CannedTranslator(reply)), None)
    }

    #[tokio::test]
    async fn user_locks_are_released_after_each_turn() {
        let service = service("{\"response\": \"ok\"}".to_string());
        for n in 0..50 {
            let user_id = format!("user-{n}");
            service
                .handle(&user_id, InboundMessage::Text("hi".to_string()))
                .await
                .unwrap();
        }
        assert!(service.user_locks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn failure_indices_point_at_raw_entries() {
        let reply = json!({
            "actions": [
                {"type": "create_transaction", "data": {"amount": "lots"}},
                {"type": "save_memory", "data": {"fact": "Paid on the 1st"}},
                {"type": "create_holding", "data": {"ticker": "TSLA", "shares": -3}}
            ],
            "response": "Noted."
        })
        .to_string();
        let turn = service(reply)
            .handle("u", InboundMessage::Text("hi".to_string()))
            .await
            .unwrap();
        assert_eq!(turn.report.applied, 1);
        let indices: Vec<usize> = turn.report.failures.iter().map(|f| f.index).collect();
        assert_eq!(indices, vec![0, 2]);
        assert_eq!(turn.report.failures[0].action, "undecodable");
        assert_eq!(turn.report.failures[1].action, "create_holding");
    }

    #[test]
    fn decoded_positions_skip_rejected_entries() {
        let rejected = vec![RejectedAction {
            index: 1,
            kind: None,
            reason: "bad".to_string(),
        }];
        assert_eq!(decoded_positions(2, &rejected), vec![0, 2]);
        assert_eq!(decoded_positions(2, &[]), vec![0, 1]);
    }
}
