use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;
use uuid::Uuid;

use crate::images::{ImageId, ImageStore};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TranscriptError {
    #[error("message references unknown image '{0}'")]
    DanglingImageRef(ImageId),
    #[error("invalid video reference '{0}': expected an http(s) URL or a server-relative path")]
    InvalidVideoRef(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    User,
    System,
}

impl Sender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sender::User => "user",
            Sender::System => "system",
        }
    }
}

/// Location of a rendered video: an absolute http(s) URL or a path relative
/// to the serving host (`/videos/...`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VideoRef(String);

impl VideoRef {
    pub fn parse(raw: &str) -> Result<Self, TranscriptError> {
        let trimmed = raw.trim();
        if trimmed.starts_with('/') && !trimmed.starts_with("//") && trimmed.len() > 1 {
            return Ok(Self(trimmed.to_string()));
        }
        match Url::parse(trimmed) {
            Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => {
                Ok(Self(trimmed.to_string()))
            }
            _ => Err(TranscriptError::InvalidVideoRef(raw.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_remote(&self) -> bool {
        !self.0.starts_with('/')
    }
}

impl fmt::Display for VideoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub content: String,
    pub sender: Sender,
    pub timestamp: DateTime<Utc>,
    pub image_ref: Option<ImageId>,
    pub video_ref: Option<VideoRef>,
}

impl Message {
    pub fn new(sender: Sender, content: impl Into<String>) -> Self {
        let simple = Uuid::new_v4().simple().to_string();
        Self {
            id: format!("msg_{}", &simple[..12]),
            content: content.into(),
            sender,
            timestamp: Utc::now(),
            image_ref: None,
            video_ref: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Sender::User, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Sender::System, content)
    }

    pub fn with_image(mut self, image_id: ImageId) -> Self {
        self.image_ref = Some(image_id);
        self
    }

    pub fn with_video(mut self, video: VideoRef) -> Self {
        self.video_ref = Some(video);
        self
    }

    pub fn has_text(&self) -> bool {
        !self.content.trim().is_empty()
    }
}

/// Ordered, append-only list of the messages in one chat.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `message`, refusing image references the store cannot resolve.
    pub fn append(
        &mut self,
        message: Message,
        store: &ImageStore,
    ) -> Result<&Message, TranscriptError> {
        if let Some(image_id) = message.image_ref.as_ref() {
            if !store.contains(image_id) {
                return Err(TranscriptError::DanglingImageRef(image_id.clone()));
            }
        }
        self.messages.push(message);
        Ok(&self.messages[self.messages.len() - 1])
    }

    pub fn messages(&self) -> &[Message] {
        self.messages.as_slice()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
