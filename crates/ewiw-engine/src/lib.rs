use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use ewiw_contracts::auth::AuthSession;
use ewiw_contracts::catalog::ProductCatalog;
use ewiw_contracts::chat::{
    assemble_context, extract_reference, resolve_reference, Message, ReferenceKind, VideoRef,
};
use ewiw_contracts::events::event_payload;
use ewiw_contracts::images::{ImageId, ImagePayload, NewImage};
use serde_json::json;
use thiserror::Error;

pub mod config;
mod http;
pub mod mockup;
pub mod providers;
pub mod session;

pub use config::{CredentialReport, EngineConfig, TransportSettings};
pub use http::error_chain_text;
pub use session::{ChatDirectory, ChatSession, ChatSummary, TurnPhase, WELCOME_MESSAGE};

use providers::{
    default_edit_providers, default_video_providers, friendly_video_error, EditProviderRegistry,
    EditRequest, EditResponse, VideoOutput, VideoProviderRegistry, VideoRequest,
};

pub const NEED_IMAGE_MESSAGE: &str = "Please upload an image first for me to work with.";
pub const EMPTY_INSTRUCTION_MESSAGE: &str =
    "Tell me what you'd like to change about the image and I'll edit it.";
pub const NO_PREVIOUS_EDIT_MESSAGE: &str =
    "There is no previous edit yet. Describe a change to the current image instead.";
pub const NO_CURRENT_IMAGE_MESSAGE: &str =
    "I'm not sure which image you mean. Use /images to list them and /use <id> to pick one.";
pub const UPLOAD_MESSAGE: &str = "Uploaded an image for processing";
pub const UPLOAD_PROMPT: &str =
    "Process this image and prepare it for design purposes. Enhance it if needed.";
pub const UPLOAD_ERROR_MESSAGE: &str =
    "Sorry, there was an error processing your image. Please try again.";
pub const EDITED_MESSAGE: &str = "Image processed successfully.";
pub const VIDEO_READY_MESSAGE: &str = "Here's a short promotional video of your design.";
const MANUAL_VIDEO_PROMPT: &str = "Showcase this design";

/// Raw bytes handed in by the user, before validation.
#[derive(Debug, Clone)]
pub struct Upload {
    pub bytes: Vec<u8>,
    pub file_name: Option<String>,
}

impl Upload {
    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes =
            fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        let file_name = path
            .file_name()
            .and_then(|value| value.to_str())
            .map(str::to_string);
        Ok(Self { bytes, file_name })
    }
}

#[derive(Debug, Error)]
pub enum TurnError {
    #[error("sign in before editing images")]
    Unauthenticated,
    #[error("chat {chat_id} is still working on the previous turn ({phase})")]
    Busy { chat_id: String, phase: TurnPhase },
    #[error("no image with id '{0}' in this chat")]
    UnknownImage(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoOutcome {
    Disabled,
    Generated(VideoRef),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    EmptyInstruction,
    NeedsImage,
    ReferenceNotFound(ReferenceKind),
    InvalidUpload,
    Uploaded {
        image_id: ImageId,
        processed: Option<Box<TurnOutcome>>,
    },
    Edited {
        image_id: ImageId,
        video: VideoOutcome,
    },
    TextOnly,
    EditFailed(String),
    Video(VideoOutcome),
}

impl TurnOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnOutcome::EmptyInstruction => "empty_instruction",
            TurnOutcome::NeedsImage => "needs_image",
            TurnOutcome::ReferenceNotFound(_) => "reference_not_found",
            TurnOutcome::InvalidUpload => "invalid_upload",
            TurnOutcome::Uploaded { .. } => "uploaded",
            TurnOutcome::Edited { .. } => "edited",
            TurnOutcome::TextOnly => "text_only",
            TurnOutcome::EditFailed(_) => "edit_failed",
            TurnOutcome::Video(_) => "video",
        }
    }
}

/// What one call into the engine did: its result, the messages it posted
/// (in order), and the phases the session went through.
#[derive(Debug, Clone)]
pub struct TurnReport {
    pub outcome: TurnOutcome,
    pub messages: Vec<Message>,
    pub phases: Vec<TurnPhase>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EditPurpose {
    Instruction,
    PrepareUpload,
}

#[derive(Default)]
struct TurnLog {
    messages: Vec<Message>,
    phases: Vec<TurnPhase>,
}

/// Runs chat turns against a session: resolves which image an instruction
/// means, sends it with the conversation so far to the edit provider, records
/// the result, then optionally renders a video of it.
pub struct ChatEngine {
    config: EngineConfig,
    auth: AuthSession,
    catalog: ProductCatalog,
    edit_providers: EditProviderRegistry,
    video_providers: VideoProviderRegistry,
}

impl ChatEngine {
    pub fn new(config: EngineConfig, auth: AuthSession) -> Result<Self> {
        let edit_providers = default_edit_providers(&config);
        let video_providers = default_video_providers(&config);
        Self::with_registries(config, auth, edit_providers, video_providers)
    }

    pub fn with_registries(
        config: EngineConfig,
        auth: AuthSession,
        edit_providers: EditProviderRegistry,
        video_providers: VideoProviderRegistry,
    ) -> Result<Self> {
        if edit_providers.get(&config.edit_provider).is_none() {
            bail!(
                "unknown edit provider '{}'; expected one of: {}",
                config.edit_provider,
                edit_providers.names().join(", ")
            );
        }
        if video_providers.get(&config.video_provider).is_none() {
            bail!(
                "unknown video provider '{}'; expected one of: {}",
                config.video_provider,
                video_providers.names().join(", ")
            );
        }
        Ok(Self {
            config,
            auth,
            catalog: ProductCatalog::default(),
            edit_providers,
            video_providers,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn auth(&self) -> &AuthSession {
        &self.auth
    }

    pub fn set_auth(&mut self, auth: AuthSession) {
        self.auth = auth;
    }

    pub fn catalog(&self) -> &ProductCatalog {
        &self.catalog
    }

    /// Handles one typed instruction.
    pub fn submit(&self, session: &mut ChatSession, text: &str) -> Result<TurnReport, TurnError> {
        self.ensure_ready(session)?;
        let mut log = TurnLog::default();
        let instruction = text.trim();
        if instruction.is_empty() {
            self.say(session, &mut log, Message::system(EMPTY_INSTRUCTION_MESSAGE));
            return Ok(self.finish(session, log, TurnOutcome::EmptyInstruction));
        }

        let user = self.say(session, &mut log, Message::user(instruction));
        session.record(
            "turn_started",
            event_payload(json!({
                "kind": "edit",
                "message_id": user.id,
                "text": instruction,
            })),
        );
        let history_len = session.transcript().len().saturating_sub(1);
        let outcome = self.run_edit(
            session,
            &mut log,
            instruction,
            history_len,
            EditPurpose::Instruction,
        );
        Ok(self.finish(session, log, outcome))
    }

    /// Registers an uploaded image, makes it current and, when configured,
    /// runs a preparation edit over it.
    pub fn upload(&self, session: &mut ChatSession, upload: Upload) -> Result<TurnReport, TurnError> {
        self.ensure_ready(session)?;
        let mut log = TurnLog::default();
        let payload = match ImagePayload::from_upload_bytes(upload.bytes) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!(chat_id = %session.id(), error = %err, "rejected upload");
                self.say(session, &mut log, Message::system(UPLOAD_ERROR_MESSAGE));
                return Ok(self.finish(session, log, TurnOutcome::InvalidUpload));
            }
        };

        let image_id = self.register_image(session, NewImage::uploaded(payload, upload.file_name));
        session.set_current(image_id.clone());
        let user = self.say(
            session,
            &mut log,
            Message::user(UPLOAD_MESSAGE).with_image(image_id.clone()),
        );
        session.record(
            "turn_started",
            event_payload(json!({
                "kind": "upload",
                "message_id": user.id,
                "image_id": image_id,
            })),
        );

        let processed = if self.config.process_uploads {
            let history_len = session.transcript().len().saturating_sub(1);
            Some(Box::new(self.run_edit(
                session,
                &mut log,
                UPLOAD_PROMPT,
                history_len,
                EditPurpose::PrepareUpload,
            )))
        } else {
            None
        };
        Ok(self.finish(
            session,
            log,
            TurnOutcome::Uploaded {
                image_id,
                processed,
            },
        ))
    }

    /// Renders a video of the current image on request.
    pub fn generate_video(&self, session: &mut ChatSession) -> Result<TurnReport, TurnError> {
        self.ensure_ready(session)?;
        let mut log = TurnLog::default();
        let Some(image_id) = session.current_image().map(|record| record.id.clone()) else {
            self.say(session, &mut log, Message::system(NEED_IMAGE_MESSAGE));
            return Ok(self.finish(session, log, TurnOutcome::NeedsImage));
        };
        session.record(
            "turn_started",
            event_payload(json!({ "kind": "video", "image_id": image_id })),
        );
        let video = self.render_video(session, &mut log, &image_id, MANUAL_VIDEO_PROMPT);
        Ok(self.finish(session, log, TurnOutcome::Video(video)))
    }

    /// Points later edits at a specific image (`/use`).
    pub fn use_image(&self, session: &mut ChatSession, id: &str) -> Result<ImageId, TurnError> {
        self.ensure_ready(session)?;
        let image_id = session.select_image(id)?.id.clone();
        session.record(
            "current_image_changed",
            event_payload(json!({ "image_id": image_id })),
        );
        Ok(image_id)
    }

    /// Composites the current image onto the selected product and swatch.
    pub fn render_preview(&self, session: &ChatSession, path: Option<&Path>) -> Result<PathBuf> {
        let Some(record) = session.current_image() else {
            bail!("no current image to preview");
        };
        let product = self
            .catalog
            .get(session.product())
            .with_context(|| format!("product '{}' missing from catalog", session.product()))?;
        if !product.supports_color(session.swatch()) {
            tracing::warn!(
                product = %product.key,
                swatch = session.swatch(),
                "swatch not offered for this product"
            );
        }
        let mockup = mockup::render_mockup(&record.payload, product, session.swatch())?;
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => session.dir().join("previews").join(format!(
                "{}_{}_{}.png",
                record.id,
                product.key,
                session.swatch()
            )),
        };
        mockup::save_mockup(&mockup, &path)?;
        session.record(
            "preview_rendered",
            event_payload(json!({
                "image_id": record.id,
                "product": product.key.as_str(),
                "swatch": session.swatch(),
                "path": path.to_string_lossy(),
            })),
        );
        Ok(path)
    }

    fn ensure_ready(&self, session: &ChatSession) -> Result<(), TurnError> {
        if !self.auth.is_authenticated {
            return Err(TurnError::Unauthenticated);
        }
        if session.is_processing() {
            return Err(TurnError::Busy {
                chat_id: session.id().to_string(),
                phase: session.phase(),
            });
        }
        Ok(())
    }

    fn run_edit(
        &self,
        session: &mut ChatSession,
        log: &mut TurnLog,
        instruction: &str,
        history_len: usize,
        purpose: EditPurpose,
    ) -> TurnOutcome {
        self.enter(session, log, TurnPhase::Resolving);
        if session.images().is_empty() {
            self.say(session, log, Message::system(NEED_IMAGE_MESSAGE));
            return TurnOutcome::NeedsImage;
        }

        let (prompt, _) = extract_reference(instruction);
        let resolution = resolve_reference(instruction, session.images(), session.current_image_id());
        let kind = resolution.kind;
        let Some((source_id, source)) = resolution
            .record
            .map(|record| (record.id.clone(), record.payload.clone()))
        else {
            let reply = match kind {
                ReferenceKind::Previous => NO_PREVIOUS_EDIT_MESSAGE,
                _ => NO_CURRENT_IMAGE_MESSAGE,
            };
            self.say(session, log, Message::system(reply));
            return TurnOutcome::ReferenceNotFound(kind);
        };
        session.record(
            "reference_resolved",
            event_payload(json!({
                "kind": kind.as_str(),
                "image_id": source_id,
            })),
        );

        self.enter(session, log, TurnPhase::Assembling);
        let messages = session.transcript().messages();
        let history = assemble_context(&messages[..history_len.min(messages.len())], session.images());

        self.enter(session, log, TurnPhase::Editing);
        let request = EditRequest {
            image: source,
            prompt,
            history,
        };
        match self.edit_image(&request) {
            Err(err) => {
                self.enter(session, log, TurnPhase::Failed);
                let detail = error_chain_text(&err, 240);
                tracing::warn!(chat_id = %session.id(), error = %detail, "edit failed");
                session.record(
                    "edit_failed",
                    event_payload(json!({
                        "source_image_id": source_id,
                        "error": detail,
                    })),
                );
                let reply = match purpose {
                    EditPurpose::PrepareUpload => UPLOAD_ERROR_MESSAGE.to_string(),
                    EditPurpose::Instruction => {
                        format!("Sorry, I couldn't edit the image: {detail}")
                    }
                };
                self.say(session, log, Message::system(reply));
                TurnOutcome::EditFailed(detail)
            }
            Ok(EditResponse {
                text,
                image: None,
                finish_reason,
            }) => {
                self.enter(session, log, TurnPhase::Failed);
                session.record(
                    "edit_failed",
                    event_payload(json!({
                        "source_image_id": source_id,
                        "error": "response contained no image",
                        "text": text,
                        "finish_reason": finish_reason,
                    })),
                );
                let reply = match purpose {
                    EditPurpose::PrepareUpload => UPLOAD_ERROR_MESSAGE.to_string(),
                    EditPurpose::Instruction => {
                        missing_image_reply(text.as_deref(), finish_reason.as_deref())
                    }
                };
                self.say(session, log, Message::system(reply));
                TurnOutcome::TextOnly
            }
            Ok(EditResponse {
                text,
                image: Some(payload),
                ..
            }) => {
                self.enter(session, log, TurnPhase::Succeeded);
                let image_id = self.register_image(session, NewImage::generated(payload));
                session.set_current(image_id.clone());
                session.record(
                    "edit_succeeded",
                    event_payload(json!({
                        "source_image_id": source_id,
                        "image_id": image_id,
                        "history_turns": request.history.len(),
                    })),
                );
                let text = text.unwrap_or_else(|| EDITED_MESSAGE.to_string());
                self.say(session, log, Message::system(text).with_image(image_id.clone()));
                let video = if self.config.auto_video {
                    self.render_video(session, log, &image_id, &request.prompt)
                } else {
                    VideoOutcome::Disabled
                };
                TurnOutcome::Edited { image_id, video }
            }
        }
    }

    fn edit_image(&self, request: &EditRequest) -> Result<EditResponse> {
        let provider = self
            .edit_providers
            .get(&self.config.edit_provider)
            .with_context(|| format!("edit provider '{}' not registered", self.config.edit_provider))?;
        provider
            .edit(request)
            .with_context(|| format!("{} edit request failed", provider.name()))
    }

    fn generate_with_provider(&self, request: &VideoRequest) -> Result<VideoOutput> {
        let provider = self
            .video_providers
            .get(&self.config.video_provider)
            .with_context(|| {
                format!("video provider '{}' not registered", self.config.video_provider)
            })?;
        provider.generate(request)
    }

    fn render_video(
        &self,
        session: &mut ChatSession,
        log: &mut TurnLog,
        image_id: &ImageId,
        prompt: &str,
    ) -> VideoOutcome {
        let Some(image) = session.images().get(image_id).map(|record| record.payload.clone()) else {
            tracing::warn!(chat_id = %session.id(), image_id = %image_id, "video source image missing");
            return VideoOutcome::Failed(format!("image {image_id} not found"));
        };
        self.enter(session, log, TurnPhase::Videoing);
        let request = VideoRequest {
            image,
            prompt: prompt.to_string(),
            product_context: session.product().as_str().to_string(),
            output_dir: self
                .config
                .download_videos
                .then(|| session.dir().join("videos")),
        };
        match self.generate_with_provider(&request) {
            Ok(output) => {
                self.enter(session, log, TurnPhase::VideoSucceeded);
                session.record(
                    "video_succeeded",
                    event_payload(json!({
                        "image_id": image_id,
                        "video_url": output.video_url.as_str(),
                        "local_path": output.local_path.as_ref().map(|path| path.to_string_lossy()),
                    })),
                );
                self.say(
                    session,
                    log,
                    Message::system(VIDEO_READY_MESSAGE).with_video(output.video_url.clone()),
                );
                VideoOutcome::Generated(output.video_url)
            }
            Err(err) => {
                self.enter(session, log, TurnPhase::VideoFailed);
                let detail = friendly_video_error(&error_chain_text(&err, 512));
                tracing::warn!(chat_id = %session.id(), error = %detail, "video generation failed");
                session.record(
                    "video_failed",
                    event_payload(json!({ "image_id": image_id, "error": detail })),
                );
                self.say(
                    session,
                    log,
                    Message::system(format!(
                        "Your design is ready, but I couldn't create a video for it: {detail}"
                    )),
                );
                VideoOutcome::Failed(detail)
            }
        }
    }

    /// Stores an image and mirrors it to `<chat>/images/<id>.<ext>`.
    fn register_image(&self, session: &mut ChatSession, image: NewImage) -> ImageId {
        let image_id = session.images_mut().put(image);
        let Some(record) = session.images().get(&image_id) else {
            return image_id;
        };
        let path = session
            .dir()
            .join("images")
            .join(format!("{}.{}", record.id, record.payload.extension()));
        let written = path
            .parent()
            .map(fs::create_dir_all)
            .transpose()
            .and_then(|_| fs::write(&path, &record.payload.bytes));
        let path_value = match written {
            Ok(()) => Some(path.to_string_lossy().to_string()),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "failed to write image file");
                None
            }
        };
        session.record(
            "image_registered",
            event_payload(json!({
                "image_id": record.id,
                "origin": record.origin.as_str(),
                "label": record.label,
                "mime_type": record.payload.mime_type,
                "path": path_value,
            })),
        );
        image_id
    }

    fn enter(&self, session: &mut ChatSession, log: &mut TurnLog, phase: TurnPhase) {
        tracing::debug!(chat_id = %session.id(), %phase, "turn phase");
        session.set_phase(phase);
        log.phases.push(phase);
    }

    fn say(&self, session: &mut ChatSession, log: &mut TurnLog, message: Message) -> Message {
        let posted = session.post(message);
        log.messages.push(posted.clone());
        posted
    }

    fn finish(&self, session: &mut ChatSession, mut log: TurnLog, outcome: TurnOutcome) -> TurnReport {
        session.set_phase(TurnPhase::Idle);
        log.phases.push(TurnPhase::Idle);
        session.record(
            "turn_finished",
            event_payload(json!({
                "outcome": outcome.as_str(),
                "phases": log.phases.iter().map(TurnPhase::as_str).collect::<Vec<_>>(),
                "messages": log.messages.len(),
            })),
        );
        TurnReport {
            outcome,
            messages: log.messages,
            phases: log.phases,
        }
    }
}

fn missing_image_reply(text: Option<&str>, finish_reason: Option<&str>) -> String {
    let mut reply = "Sorry, I couldn't edit the image: no edited image came back".to_string();
    if let Some(reason) = finish_reason.filter(|reason| *reason != "STOP") {
        reply.push_str(&format!(" (finish reason {reason})"));
    }
    reply.push('.');
    if let Some(text) = text {
        reply.push_str(&format!(" The model said: {text}"));
    }
    reply
}
