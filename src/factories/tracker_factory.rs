use std::sync::Arc;

use tracing::info;

use crate::config::Config;
use crate::error::{Result, YellowTrackerError};
use crate::interfaces::providers::{LlmProvider, PriceProvider, Transcriber};
use crate::interfaces::store::LedgerStore;
use crate::providers::memory::InMemoryLedgerStore;
use crate::providers::openai::OpenAiProvider;
use crate::providers::prices::MarketPriceProvider;
use crate::providers::sqlite::SqliteLedgerStore;
use crate::services::context::ContextAssembler;
use crate::services::conversation::ConversationService;

/// The wired-up collaborators behind one tracker instance.
pub struct TrackerParts {
    pub conversation: ConversationService,
    pub store: Arc<dyn LedgerStore>,
    pub prices: Arc<dyn PriceProvider>,
}

pub struct YellowTrackerFactory;

impl YellowTrackerFactory {
    pub async fn create_from_config(config: Config) -> Result<TrackerParts> {
        let openai = config
            .openai
            .clone()
            .ok_or_else(|| YellowTrackerError::Config("Missing openai configuration".to_string()))?;
        let api_key = openai
            .api_key
            .filter(|key| !key.trim().is_empty())
            .or_else(|| {
                // Local OpenAI-compatible servers usually ignore the key.
                openai.base_url.as_ref().map(|_| "local".to_string())
            })
            .ok_or_else(|| YellowTrackerError::Config("Missing OpenAI API key".to_string()))?;
        let translator: Arc<dyn LlmProvider> = Arc::new(OpenAiProvider::new(
            api_key,
            openai.model,
            openai.base_url,
            openai.timeout_seconds,
        )?);

        let mut transcriber: Option<Arc<dyn Transcriber>> = None;
        if let Some(section) = config.transcription.clone() {
            if let Some(key) = section.api_key.filter(|key| !key.trim().is_empty()) {
                let provider = OpenAiProvider::transcriber(
                    key,
                    section.model,
                    section.base_url,
                    section.timeout_seconds,
                )?;
                transcriber = Some(Arc::new(provider));
            }
        }
        if transcriber.is_none() {
            info!("no transcription api key configured, voice messages are disabled");
        }

        let store = Self::create_store(&config).await?;
        let prices: Arc<dyn PriceProvider> =
            Arc::new(MarketPriceProvider::new(config.prices.as_ref())?);

        Ok(Self::assemble(&config, store, translator, transcriber, prices))
    }

    pub async fn create_store(config: &Config) -> Result<Arc<dyn LedgerStore>> {
        if config.is_ephemeral() {
            info!("using in-memory ledger");
            return Ok(Arc::new(InMemoryLedgerStore::new()));
        }
        let path = config.sqlite_path();
        info!(path = %path, "opening sqlite ledger");
        Ok(Arc::new(SqliteLedgerStore::new(&path).await?))
    }

    /// Wires explicit collaborators; the config only supplies assistant settings.
    pub fn assemble(
        config: &Config,
        store: Arc<dyn LedgerStore>,
        translator: Arc<dyn LlmProvider>,
        transcriber: Option<Arc<dyn Transcriber>>,
        prices: Arc<dyn PriceProvider>,
    ) -> TrackerParts {
        let assembler = ContextAssembler::new(
            store.clone(),
            config.assistant_name(),
            config.currencies(),
        );
        let conversation =
            ConversationService::new(store.clone(), assembler, translator, transcriber);
        TrackerParts {
            conversation,
            store,
            prices,
        }
    }
}
