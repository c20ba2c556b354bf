use httpmock::Method::POST;
use httpmock::MockServer;
use serde_json::json;

use yellow_tracker::error::YellowTrackerError;
use yellow_tracker::interfaces::providers::{ChatTurn, ImageInput, LlmProvider, Transcriber};
use yellow_tracker::providers::openai::OpenAiProvider;

fn completion(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "created": 1,
        "model": "gpt-4o-mini",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }]
    })
}

#[tokio::test]
async fn chat_sends_system_prompt_and_history() {
    let server = MockServer::start_async().await;
    let chat_mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/chat/completions")
                .header("authorization", "Bearer key")
                .body_contains("USER'S FINANCIAL STATE")
                .body_contains("spent 30 on lunch");
            then.status(200)
                .json_body(completion("{\"actions\": [], \"response\": \"ok\"}"));
        })
        .await;

    let provider = OpenAiProvider::new(
        "key".to_string(),
        Some("gpt-4o-mini".to_string()),
        Some(server.base_url()),
        Some(5),
    )
    .unwrap();
    let history = vec![
        ChatTurn::user("hi"),
        ChatTurn::assistant("hello"),
        ChatTurn::user("spent 30 on lunch"),
    ];
    let text = provider
        .chat(&history, "## USER'S FINANCIAL STATE", None)
        .await
        .unwrap();
    assert_eq!(text, "{\"actions\": [], \"response\": \"ok\"}");
    chat_mock.assert_async().await;
}

#[tokio::test]
async fn image_is_sent_as_jpeg_data_url() {
    let server = MockServer::start_async().await;
    let chat_mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/chat/completions")
                .body_contains("data:image/jpeg;base64,AQID")
                .body_contains("image_url");
            then.status(200).json_body(completion("receipt read"));
        })
        .await;

    let provider = OpenAiProvider::new(
        "key".to_string(),
        None,
        Some(server.base_url()),
        None,
    )
    .unwrap();
    let image = ImageInput {
        bytes: vec![1, 2, 3],
    };
    let text = provider
        .chat(&[ChatTurn::user("[User sent an image]\n\nreceipt")], "sys", Some(&image))
        .await
        .unwrap();
    assert_eq!(text, "receipt read");
    chat_mock.assert_async().await;
}

#[tokio::test]
async fn upstream_errors_surface_as_http_errors() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(400).json_body(json!({
                "error": {"message": "bad model", "type": "invalid_request_error", "param": null, "code": null}
            }));
        })
        .await;

    let provider = OpenAiProvider::new("key".to_string(), None, Some(server.base_url()), Some(2))
        .unwrap();
    let err = provider
        .chat(&[ChatTurn::user("hi")], "sys", None)
        .await
        .unwrap_err();
    assert!(matches!(err, YellowTrackerError::Http(_)));
}

#[tokio::test]
async fn transcription_via_httpmock() {
    let server = MockServer::start_async().await;
    let audio_mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/audio/transcriptions");
            then.status(200).json_body(json!({"text": "spent twenty on groceries"}));
        })
        .await;

    let transcriber = OpenAiProvider::transcriber(
        "key".to_string(),
        None,
        Some(server.base_url()),
        None,
    )
    .unwrap();
    assert_eq!(transcriber.model(), "whisper-large-v3");
    let text = transcriber
        .transcribe_audio(b"OggS".to_vec(), "ogg")
        .await
        .unwrap();
    assert_eq!(text, "spent twenty on groceries");
    audio_mock.assert_async().await;
}
