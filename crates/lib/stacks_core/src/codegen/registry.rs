//! Provider selection and memoization.
//!
//! One provider instance is built per kind, on first use. Concurrent first
//! callers share a single construction; a failed construction is retried by
//! the next caller.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::OnceCell;
use tracing::info;

use super::claude::ClaudeProvider;
use super::config::CodegenSettings;
use super::gemini::GeminiProvider;
use super::openai::OpenAiProvider;
use super::{CodegenError, CodegenProvider, ProviderKind};

/// Builds provider instances.
#[async_trait]
pub trait ProviderFactory: Send + Sync {
    async fn build(&self, kind: ProviderKind) -> Result<Arc<dyn CodegenProvider>, CodegenError>;
}

/// Builds HTTP providers from [`CodegenSettings`].
pub struct SettingsFactory {
    settings: CodegenSettings,
}

impl SettingsFactory {
    pub fn new(settings: CodegenSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl ProviderFactory for SettingsFactory {
    async fn build(&self, kind: ProviderKind) -> Result<Arc<dyn CodegenProvider>, CodegenError> {
        let timeout = self.settings.request_timeout;
        let provider: Arc<dyn CodegenProvider> = match kind {
            ProviderKind::OpenAi => Arc::new(OpenAiProvider::new(self.settings.openai.clone(), timeout)?),
            ProviderKind::Claude => Arc::new(ClaudeProvider::new(self.settings.claude.clone(), timeout)?),
            ProviderKind::Gemini => Arc::new(GeminiProvider::new(self.settings.gemini.clone(), timeout)?),
        };
        Ok(provider)
    }
}

fn kind_to_u8(kind: ProviderKind) -> u8 {
    match kind {
        ProviderKind::Gemini => 0,
        ProviderKind::OpenAi => 1,
        ProviderKind::Claude => 2,
    }
}

fn kind_from_u8(v: u8) -> ProviderKind {
    match v {
        1 => ProviderKind::OpenAi,
        2 => ProviderKind::Claude,
        _ => ProviderKind::Gemini,
    }
}

type ProviderCell = Arc<OnceCell<Arc<dyn CodegenProvider>>>;

/// The active provider kind plus one lazily built instance per kind.
pub struct ProviderRegistry {
    selected: AtomicU8,
    instances: DashMap<ProviderKind, ProviderCell>,
    factory: Arc<dyn ProviderFactory>,
}

impl ProviderRegistry {
    pub fn new(selected: ProviderKind, factory: Arc<dyn ProviderFactory>) -> Self {
        Self {
            selected: AtomicU8::new(kind_to_u8(selected)),
            instances: DashMap::new(),
            factory,
        }
    }

    /// Registry building real providers, starting with `settings.provider`.
    pub fn from_settings(settings: CodegenSettings) -> Self {
        let selected = settings.provider;
        Self::new(selected, Arc::new(SettingsFactory::new(settings)))
    }

    pub fn selected(&self) -> ProviderKind {
        kind_from_u8(self.selected.load(Ordering::Acquire))
    }

    /// Switch the provider used by subsequent requests.
    pub fn select(&self, kind: ProviderKind) {
        let previous = kind_from_u8(self.selected.swap(kind_to_u8(kind), Ordering::AcqRel));
        if previous != kind {
            info!(from = %previous, to = %kind, "Codegen provider switched");
        }
    }

    /// Get (building on first use) the provider for `kind`.
    pub async fn get(&self, kind: ProviderKind) -> Result<Arc<dyn CodegenProvider>, CodegenError> {
        // Clone the cell out so no map guard is held across the await.
        let cell = self
            .instances
            .entry(kind)
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .value()
            .clone();

        let provider = cell
            .get_or_try_init(|| async {
                info!(provider = %kind, "Initializing codegen provider");
                self.factory.build(kind).await
            })
            .await?;
        Ok(provider.clone())
    }

    /// The provider for the currently selected kind.
    pub async fn current(&self) -> Result<Arc<dyn CodegenProvider>, CodegenError> {
        self.get(self.selected()).await
    }
}
