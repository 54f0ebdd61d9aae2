use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use ewiw_contracts::catalog::{ProductType, DEFAULT_SWATCH};
use ewiw_contracts::chat::{Message, Transcript};
use ewiw_contracts::events::{event_payload, EventPayload, EventWriter};
use ewiw_contracts::images::{ImageId, ImageRecord, ImageStore};
use serde_json::json;

use crate::TurnError;

pub const WELCOME_MESSAGE: &str = "Welcome! Upload an image or describe what you want to design.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Idle,
    Resolving,
    Assembling,
    Editing,
    Succeeded,
    Failed,
    Videoing,
    VideoSucceeded,
    VideoFailed,
}

impl TurnPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnPhase::Idle => "idle",
            TurnPhase::Resolving => "resolving",
            TurnPhase::Assembling => "assembling",
            TurnPhase::Editing => "editing",
            TurnPhase::Succeeded => "succeeded",
            TurnPhase::Failed => "failed",
            TurnPhase::Videoing => "videoing",
            TurnPhase::VideoSucceeded => "video_succeeded",
            TurnPhase::VideoFailed => "video_failed",
        }
    }
}

impl fmt::Display for TurnPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything one chat owns: its images, its transcript, the image later
/// edits apply to, and where the current turn is.
#[derive(Debug)]
pub struct ChatSession {
    id: String,
    title: String,
    created_at: DateTime<Utc>,
    dir: PathBuf,
    images: ImageStore,
    transcript: Transcript,
    current_image: Option<ImageId>,
    phase: TurnPhase,
    product: ProductType,
    swatch: String,
    events: EventWriter,
}

impl ChatSession {
    pub fn open(out_dir: &Path, id: &str, title: &str) -> Result<Self> {
        let dir = out_dir.join(id);
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create chat directory {}", dir.display()))?;
        let events = EventWriter::new(dir.join("events.jsonl"), id);
        let mut session = Self {
            id: id.to_string(),
            title: title.to_string(),
            created_at: Utc::now(),
            dir,
            images: ImageStore::new(),
            transcript: Transcript::new(),
            current_image: None,
            phase: TurnPhase::Idle,
            product: ProductType::default(),
            swatch: DEFAULT_SWATCH.to_string(),
            events,
        };
        session.events.emit(
            "session_started",
            event_payload(json!({
                "title": session.title,
                "created_at": session.created_at.to_rfc3339(),
            })),
        )?;
        session.post(Message::system(WELCOME_MESSAGE));
        Ok(session)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn images(&self) -> &ImageStore {
        &self.images
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn events(&self) -> &EventWriter {
        &self.events
    }

    pub fn current_image_id(&self) -> Option<&ImageId> {
        self.current_image.as_ref()
    }

    pub fn current_image(&self) -> Option<&ImageRecord> {
        self.current_image
            .as_ref()
            .and_then(|id| self.images.get(id))
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    pub fn is_processing(&self) -> bool {
        self.phase != TurnPhase::Idle
    }

    pub fn is_generating_video(&self) -> bool {
        self.phase == TurnPhase::Videoing
    }

    pub fn product(&self) -> ProductType {
        self.product
    }

    pub fn set_product(&mut self, product: ProductType) {
        self.product = product;
    }

    pub fn swatch(&self) -> &str {
        &self.swatch
    }

    pub fn set_swatch(&mut self, color: &str) {
        self.swatch = color.trim().to_ascii_lowercase();
    }

    /// Points later edits at an image already in this chat.
    pub fn select_image(&mut self, id: &str) -> Result<&ImageRecord, TurnError> {
        let Some(record) = self.images.get(id.trim()) else {
            return Err(TurnError::UnknownImage(id.trim().to_string()));
        };
        self.current_image = Some(record.id.clone());
        Ok(record)
    }

    pub(crate) fn images_mut(&mut self) -> &mut ImageStore {
        &mut self.images
    }

    pub(crate) fn set_current(&mut self, id: ImageId) {
        self.current_image = Some(id);
    }

    pub(crate) fn set_phase(&mut self, phase: TurnPhase) {
        self.phase = phase;
    }

    /// Appends to the transcript and returns a copy of what was posted. A
    /// reference to an unknown image is dropped rather than failing the turn.
    pub(crate) fn post(&mut self, mut message: Message) -> Message {
        if let Some(image_id) = message.image_ref.as_ref() {
            if !self.images.contains(image_id) {
                tracing::warn!(chat_id = %self.id, image_id = %image_id, "dropping dangling image reference");
                message.image_ref = None;
            }
        }
        let posted = message.clone();
        if let Err(err) = self.transcript.append(message, &self.images) {
            tracing::warn!(chat_id = %self.id, error = %err, "message rejected by transcript");
        }
        posted
    }

    /// Best-effort event log write; failures are logged and the turn goes on.
    pub(crate) fn record(&self, event_type: &str, payload: EventPayload) {
        if let Err(err) = self.events.emit(event_type, payload) {
            tracing::warn!(chat_id = %self.id, event_type, error = %err, "event log write failed");
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSummary {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub message_count: usize,
    pub image_count: usize,
    pub active: bool,
}

/// In-memory list of chats under one output directory, with one of them
/// active at a time.
#[derive(Debug)]
pub struct ChatDirectory {
    out_dir: PathBuf,
    sessions: Vec<ChatSession>,
    active: Option<usize>,
    next_seq: u64,
}

impl ChatDirectory {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
            sessions: Vec::new(),
            active: None,
            next_seq: 1,
        }
    }

    /// Opens a new chat and makes it the active one.
    pub fn create(&mut self, title: Option<&str>) -> Result<&mut ChatSession> {
        let mut id = format!("chat_{}", self.next_seq);
        while self.sessions.iter().any(|session| session.id == id) {
            self.next_seq += 1;
            id = format!("chat_{}", self.next_seq);
        }
        self.next_seq += 1;
        let title = title
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or("New Chat");
        let session = ChatSession::open(&self.out_dir, &id, title)?;
        self.sessions.push(session);
        let idx = self.sessions.len() - 1;
        self.active = Some(idx);
        Ok(&mut self.sessions[idx])
    }

    pub fn list(&self) -> Vec<ChatSummary> {
        self.sessions
            .iter()
            .enumerate()
            .map(|(idx, session)| ChatSummary {
                id: session.id.clone(),
                title: session.title.clone(),
                created_at: session.created_at,
                message_count: session.transcript.len(),
                image_count: session.images.len(),
                active: self.active == Some(idx),
            })
            .collect()
    }

    pub fn select(&mut self, id: &str) -> bool {
        match self.sessions.iter().position(|session| session.id == id.trim()) {
            Some(idx) => {
                self.active = Some(idx);
                true
            }
            None => false,
        }
    }

    pub fn active(&self) -> Option<&ChatSession> {
        self.active.and_then(|idx| self.sessions.get(idx))
    }

    pub fn active_mut(&mut self) -> Option<&mut ChatSession> {
        self.active.and_then(|idx| self.sessions.get_mut(idx))
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
