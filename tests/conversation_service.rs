mod common;

use std::sync::Arc;

use rust_decimal::Decimal;
use serde_json::json;

use common::{harness, harness_with, QueueLlmProvider, StaticTranscriber};
use yellow_tracker::domains::ledger::Role;
use yellow_tracker::error::YellowTrackerError;
use yellow_tracker::interfaces::store::LedgerStore;
use yellow_tracker::services::conversation::{
    InboundMessage, TurnStatus, DEFAULT_IMAGE_CAPTION, VOICE_FAILURE_REPLY,
};

fn text(value: &str) -> InboundMessage {
    InboundMessage::Text(value.to_string())
}

#[tokio::test]
async fn structured_reply_executes_actions_and_persists_both_turns() {
    let reply = json!({
        "actions": [{"type": "create_transaction", "data": {
            "type": "expense", "amount": 30, "category": "food", "description": "Lunch"
        }}],
        "response": "Logged $30 for lunch."
    })
    .to_string();
    let h = harness(QueueLlmProvider::replies(&[&reply]));

    let turn = h.parts.conversation.handle("u", text("spent $30 on lunch")).await.unwrap();
    assert_eq!(turn.status, TurnStatus::Structured);
    assert_eq!(turn.text, "Logged $30 for lunch.");
    assert_eq!(turn.report.applied, 1);

    let messages = h.store.recent_messages("u", 10).await.unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, Role::User);
    assert_eq!(messages[0].content, "spent $30 on lunch");
    assert_eq!(messages[1].role, Role::Assistant);
    assert_eq!(messages[1].content, "Logged $30 for lunch.");

    let calls = h.translator.recorded().await;
    assert_eq!(calls.len(), 1);
    let last = calls[0].history.last().unwrap();
    assert_eq!(last.content, "spent $30 on lunch");
    assert!(calls[0].system_prompt.contains("No recent transactions."));
}

#[tokio::test]
async fn context_is_rebuilt_every_turn() {
    let first = json!({
        "actions": [{"type": "create_holding", "data": {"ticker": "ETH", "shares": 2, "asset_type": "crypto"}}],
        "response": "Tracking ETH."
    })
    .to_string();
    let h = harness(QueueLlmProvider::replies(&[&first, "{\"response\": \"You hold 2 ETH.\"}"]));

    h.parts.conversation.handle("u", text("I own 2 ETH")).await.unwrap();
    let turn = h.parts.conversation.handle("u", text("what do I hold?")).await.unwrap();
    assert_eq!(turn.text, "You hold 2 ETH.");

    let calls = h.translator.recorded().await;
    assert!(calls[1].system_prompt.contains("- ETH (crypto): 2 units @ avg 0 USD"));
    assert_eq!(calls[1].history.len(), 3);
    assert_eq!(calls[1].history[1].content, "Tracking ETH.");
}

#[tokio::test]
async fn malformed_output_only_persists_the_message_pair() {
    let h = harness(QueueLlmProvider::replies(&["Sure! I noted that down."]));
    let turn = h.parts.conversation.handle("u", text("spent 12 on coffee")).await.unwrap();

    assert_eq!(turn.status, TurnStatus::Unstructured);
    assert_eq!(turn.text, "Sure! I noted that down.");
    assert_eq!(h.store.recent_messages("u", 10).await.unwrap().len(), 2);
    let since = time::macros::date!(2000 - 01 - 01);
    assert!(h.store.transactions_since("u", since).await.unwrap().is_empty());
    assert!(h.store.holdings("u").await.unwrap().is_empty());
    assert!(h.store.activities_since("u", since).await.unwrap().is_empty());
    assert!(h.store.memories("u").await.unwrap().is_empty());
}

#[tokio::test]
async fn undecodable_actions_are_reported_but_the_rest_run() {
    let reply = json!({
        "actions": [
            {"type": "create_transaction", "data": {"amount": "lots"}},
            {"type": "save_memory", "data": {"fact": "Salary lands on the 1st", "category": "financial"}}
        ],
        "response": "Noted."
    })
    .to_string();
    let h = harness(QueueLlmProvider::replies(&[&reply]));
    let turn = h.parts.conversation.handle("u", text("remember payday")).await.unwrap();

    assert_eq!(turn.status, TurnStatus::Structured);
    assert_eq!(turn.report.failures.len(), 1);
    assert_eq!(turn.report.applied, 1);
    assert_eq!(h.store.memories("u").await.unwrap().len(), 1);
}

#[tokio::test]
async fn translator_failure_apologises_without_a_reply_record() {
    let h = harness(QueueLlmProvider::new(vec![Err(YellowTrackerError::Http(
        "upstream timed out".to_string(),
    ))]));
    let turn = h.parts.conversation.handle("u", text("hello")).await.unwrap();

    assert_eq!(turn.status, TurnStatus::TranslationFailed);
    assert!(turn.text.starts_with("Sorry, I encountered an error:"));
    assert!(turn.text.contains("upstream timed out"));
    let messages = h.store.recent_messages("u", 10).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].role, Role::User);
}

#[tokio::test]
async fn photo_turn_carries_marker_and_image() {
    let h = harness(QueueLlmProvider::replies(&["{\"actions\": [], \"response\": \"Got it.\"}"]));
    let turn = h
        .parts
        .conversation
        .handle(
            "u",
            InboundMessage::Photo {
                bytes: vec![0xFF, 0xD8, 0xFF],
                caption: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(turn.text, "Got it.");

    let calls = h.translator.recorded().await;
    assert!(calls[0].had_image);
    let content = &calls[0].history.last().unwrap().content;
    assert_eq!(content, &format!("[User sent an image]\n\n{DEFAULT_IMAGE_CAPTION}"));
    let stored = h.store.recent_messages("u", 1).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].role, Role::Assistant);
}

#[tokio::test]
async fn voice_is_transcribed_then_treated_as_text() {
    let h = harness_with(
        QueueLlmProvider::replies(&["{\"response\": \"Logged.\"}"]),
        Some(StaticTranscriber {
            result: Ok("got paid 5000 salary".to_string()),
        }),
    );
    let turn = h
        .parts
        .conversation
        .handle(
            "u",
            InboundMessage::Voice {
                bytes: b"ogg".to_vec(),
                format: "ogg".to_string(),
            },
        )
        .await
        .unwrap();
    assert_eq!(turn.text, "Logged.");
    let messages = h.store.recent_messages("u", 10).await.unwrap();
    assert_eq!(messages[0].content, "got paid 5000 salary");
}

#[tokio::test]
async fn failed_transcription_persists_nothing() {
    let h = harness_with(
        QueueLlmProvider::replies(&[]),
        Some(StaticTranscriber {
            result: Err("bad audio".to_string()),
        }),
    );
    let turn = h
        .parts
        .conversation
        .handle(
            "u",
            InboundMessage::Voice {
                bytes: vec![1, 2],
                format: "ogg".to_string(),
            },
        )
        .await
        .unwrap();
    assert_eq!(turn.status, TurnStatus::TranscriptionFailed);
    assert_eq!(turn.text, VOICE_FAILURE_REPLY);
    assert!(h.store.recent_messages("u", 10).await.unwrap().is_empty());
    assert!(h.translator.recorded().await.is_empty());
}

#[tokio::test]
async fn concurrent_buys_for_one_user_do_not_lose_updates() {
    let buy = |price: i64| {
        json!({
            "actions": [{"type": "create_activity", "data": {
                "activity_type": "buy", "ticker": "AAPL", "shares": 10, "price_per_unit": price
            }}],
            "response": "Bought."
        })
        .to_string()
    };
    let replies: Vec<String> = vec![buy(100), buy(200)];
    let h = harness(QueueLlmProvider::new(replies.into_iter().map(Ok).collect()));
    let service = Arc::new(h.parts.conversation);

    let a = {
        let service = service.clone();
        tokio::spawn(async move { service.handle("u", text("buy 10 AAPL")).await })
    };
    let b = {
        let service = service.clone();
        tokio::spawn(async move { service.handle("u", text("buy 10 more AAPL")).await })
    };
    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();

    let holding = h.store.holding_by_ticker("u", "AAPL").await.unwrap().unwrap();
    assert_eq!(holding.shares, Decimal::from(20));
    assert_eq!(holding.avg_cost, Decimal::from(150));
    assert_eq!(h.store.holdings("u").await.unwrap().len(), 1);
}
