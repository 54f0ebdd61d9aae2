use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Result;
use ewiw_contracts::chat::{ContextTurn, VideoRef};
use ewiw_contracts::images::ImagePayload;

use crate::config::EngineConfig;

mod dryrun;
mod gemini;
mod replicate;

pub use dryrun::{DryrunEditProvider, DryrunVideoProvider};
pub use gemini::GeminiEditProvider;
pub use replicate::{friendly_video_error, ReplicateVideoProvider};

/// One call to the image editing service: the image to edit, the
/// instruction, and the conversation so far in chronological order.
#[derive(Debug, Clone)]
pub struct EditRequest {
    pub image: ImagePayload,
    pub prompt: String,
    pub history: Vec<ContextTurn>,
}

#[derive(Debug, Clone)]
pub struct EditResponse {
    /// Model commentary, if it sent any.
    pub text: Option<String>,
    pub image: Option<ImagePayload>,
    /// Why the model stopped (`STOP`, `IMAGE_SAFETY`, ...), when reported.
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct VideoRequest {
    pub image: ImagePayload,
    pub prompt: String,
    /// Product key the design is shown on (`hoodie`, `bottle`, ...).
    pub product_context: String,
    /// Where to mirror the rendered file, if anywhere.
    pub output_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct VideoOutput {
    pub video_url: VideoRef,
    pub local_path: Option<PathBuf>,
}

pub trait NamedProvider {
    fn name(&self) -> &str;
}

pub trait EditProvider: NamedProvider + Send + Sync {
    fn edit(&self, request: &EditRequest) -> Result<EditResponse>;
}

pub trait VideoProvider: NamedProvider + Send + Sync {
    fn generate(&self, request: &VideoRequest) -> Result<VideoOutput>;
}

pub struct ProviderRegistry<P: ?Sized> {
    providers: BTreeMap<String, Box<P>>,
}

impl<P: ?Sized> Default for ProviderRegistry<P> {
    fn default() -> Self {
        Self {
            providers: BTreeMap::new(),
        }
    }
}

impl<P: ?Sized + NamedProvider> ProviderRegistry<P> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Box<P>) {
        self.providers
            .insert(provider.name().to_string(), provider);
    }

    pub fn get(&self, name: &str) -> Option<&P> {
        self.providers.get(name).map(|provider| provider.as_ref())
    }

    pub fn names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }
}

pub type EditProviderRegistry = ProviderRegistry<dyn EditProvider>;
pub type VideoProviderRegistry = ProviderRegistry<dyn VideoProvider>;

pub fn default_edit_providers(config: &EngineConfig) -> EditProviderRegistry {
    let mut providers = EditProviderRegistry::new();
    providers.register(Box::new(DryrunEditProvider));
    providers.register(Box::new(GeminiEditProvider::new(
        &config.edit_model,
        config.transport,
    )));
    providers
}

pub fn default_video_providers(config: &EngineConfig) -> VideoProviderRegistry {
    let mut providers = VideoProviderRegistry::new();
    providers.register(Box::new(DryrunVideoProvider));
    providers.register(Box::new(ReplicateVideoProvider::new(
        &config.video_model,
        config.transport,
    )));
    providers
}
