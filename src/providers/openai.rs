use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};

use async_openai::{
    config::OpenAIConfig,
    types::{
        audio::{AudioInput, AudioResponseFormat, CreateTranscriptionRequestArgs},
        chat::{
            ChatCompletionRequestAssistantMessageArgs,
            ChatCompletionRequestAssistantMessageContent, ChatCompletionRequestMessage,
            ChatCompletionRequestMessageContentPartImage,
            ChatCompletionRequestMessageContentPartText, ChatCompletionRequestSystemMessageArgs,
            ChatCompletionRequestUserMessageArgs, ChatCompletionRequestUserMessageContent,
            ChatCompletionRequestUserMessageContentPart, CreateChatCompletionRequestArgs,
            ImageDetail, ImageUrl,
        },
        InputSource,
    },
    Client,
};

use crate::config::{DEFAULT_MODEL, DEFAULT_TRANSCRIPTION_BASE_URL, DEFAULT_TRANSCRIPTION_MODEL};
use crate::domains::ledger::Role;
use crate::error::{Result, YellowTrackerError};
use crate::interfaces::providers::{ChatTurn, ImageInput, LlmProvider, Transcriber};

const DEFAULT_TIMEOUT_SECONDS: u64 = 60;
const MAX_TOKENS: u32 = 4096;

/// Client for any OpenAI-compatible endpoint: chat completions for
/// translation, audio transcriptions for voice notes.
#[derive(Clone)]
pub struct OpenAiProvider {
    model: String,
    client: Client<OpenAIConfig>,
}

impl OpenAiProvider {
    pub fn new(
        api_key: String,
        model: Option<String>,
        base_url: Option<String>,
        timeout_seconds: Option<u64>,
    ) -> Result<Self> {
        let model = model.unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let base_url = base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string());
        Self::build(api_key, model, base_url, timeout_seconds)
    }

    /// Whisper transcription defaults to Groq's OpenAI-compatible API.
    pub fn transcriber(
        api_key: String,
        model: Option<String>,
        base_url: Option<String>,
        timeout_seconds: Option<u64>,
    ) -> Result<Self> {
        let model = model.unwrap_or_else(|| DEFAULT_TRANSCRIPTION_MODEL.to_string());
        let base_url = base_url.unwrap_or_else(|| DEFAULT_TRANSCRIPTION_BASE_URL.to_string());
        Self::build(api_key, model, base_url, timeout_seconds)
    }

    fn build(
        api_key: String,
        model: String,
        base_url: String,
        timeout_seconds: Option<u64>,
    ) -> Result<Self> {
        let config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(base_url);
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(
                timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECONDS).max(1),
            ))
            .build()
            .map_err(|e| YellowTrackerError::Config(e.to_string()))?;
        Ok(Self {
            model,
            client: Client::with_config(config).with_http_client(http_client),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_system_message(system_prompt: &str) -> Result<Option<ChatCompletionRequestMessage>> {
        if system_prompt.is_empty() {
            return Ok(None);
        }
        let message = ChatCompletionRequestSystemMessageArgs::default()
            .content(system_prompt)
            .build()
            .map_err(|e| YellowTrackerError::Runtime(e.to_string()))?;
        Ok(Some(ChatCompletionRequestMessage::System(message)))
    }

    fn build_user_text_message(prompt: &str) -> Result<ChatCompletionRequestMessage> {
        let message = ChatCompletionRequestUserMessageArgs::default()
            .content(ChatCompletionRequestUserMessageContent::Text(
                prompt.to_string(),
            ))
            .build()
            .map_err(|e| YellowTrackerError::Runtime(e.to_string()))?;
        Ok(ChatCompletionRequestMessage::User(message))
    }

    fn build_assistant_message(text: &str) -> Result<ChatCompletionRequestMessage> {
        let message = ChatCompletionRequestAssistantMessageArgs::default()
            .content(ChatCompletionRequestAssistantMessageContent::Text(
                text.to_string(),
            ))
            .build()
            .map_err(|e| YellowTrackerError::Runtime(e.to_string()))?;
        Ok(ChatCompletionRequestMessage::Assistant(message))
    }

    fn build_user_image_message(
        prompt: &str,
        image: &ImageInput,
    ) -> Result<ChatCompletionRequestMessage> {
        let encoded = general_purpose::STANDARD.encode(&image.bytes);
        let image_url = format!("data:image/jpeg;base64,{}", encoded);
        let parts = vec![
            ChatCompletionRequestUserMessageContentPart::ImageUrl(
                ChatCompletionRequestMessageContentPartImage {
                    image_url: ImageUrl {
                        url: image_url,
                        detail: Some(ImageDetail::Auto),
                    },
                },
            ),
            ChatCompletionRequestUserMessageContentPart::Text(
                ChatCompletionRequestMessageContentPartText {
                    text: prompt.to_string(),
                },
            ),
        ];

        let message = ChatCompletionRequestUserMessageArgs::default()
            .content(ChatCompletionRequestUserMessageContent::Array(parts))
            .build()
            .map_err(|e| YellowTrackerError::Runtime(e.to_string()))?;
        Ok(ChatCompletionRequestMessage::User(message))
    }

    fn build_messages(
        history: &[ChatTurn],
        system_prompt: &str,
        image: Option<&ImageInput>,
    ) -> Result<Vec<ChatCompletionRequestMessage>> {
        let mut messages = Vec::with_capacity(history.len() + 1);
        if let Some(system) = Self::build_system_message(system_prompt)? {
            messages.push(system);
        }
        let last = history.len().saturating_sub(1);
        for (idx, turn) in history.iter().enumerate() {
            let message = match (turn.role, image) {
                (Role::User, Some(image)) if idx == last => {
                    Self::build_user_image_message(&turn.content, image)?
                }
                (Role::User, _) => Self::build_user_text_message(&turn.content)?,
                (Role::Assistant, _) => Self::build_assistant_message(&turn.content)?,
            };
            messages.push(message);
        }
        Ok(messages)
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn chat(
        &self,
        history: &[ChatTurn],
        system_prompt: &str,
        image: Option<&ImageInput>,
    ) -> Result<String> {
        let messages = Self::build_messages(history, system_prompt, image)?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(self.model.clone())
            .max_completion_tokens(MAX_TOKENS)
            .messages(messages)
            .build()
            .map_err(|e| YellowTrackerError::Runtime(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| YellowTrackerError::Http(e.to_string()))?;

        let message = response
            .choices
            .first()
            .ok_or_else(|| YellowTrackerError::Http("No choices returned".to_string()))?
            .message
            .content
            .clone()
            .unwrap_or_default();
        Ok(message)
    }
}

#[async_trait]
impl Transcriber for OpenAiProvider {
    async fn transcribe_audio(&self, audio_bytes: Vec<u8>, input_format: &str) -> Result<String> {
        let file = AudioInput {
            source: InputSource::VecU8 {
                filename: format!("audio.{}", input_format),
                vec: audio_bytes,
            },
        };

        let request = CreateTranscriptionRequestArgs::default()
            .file(file)
            .model(self.model.clone())
            .response_format(AudioResponseFormat::Json)
            .build()
            .map_err(|e| YellowTrackerError::Runtime(e.to_string()))?;

        let response = self
            .client
            .audio()
            .transcription()
            .create(request)
            .await
            .map_err(|e| YellowTrackerError::Http(e.to_string()))?;

        Ok(response.text)
    }
}
