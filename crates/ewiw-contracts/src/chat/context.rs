use serde::{Deserialize, Serialize};

use super::message::{Message, Sender};
use crate::images::{ImageId, ImagePayload, ImageStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Model,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnRole::User => "user",
            TurnRole::Model => "model",
        }
    }
}

impl From<Sender> for TurnRole {
    fn from(sender: Sender) -> Self {
        match sender {
            Sender::User => TurnRole::User,
            Sender::System => TurnRole::Model,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextPart {
    Text(String),
    Image {
        image_id: ImageId,
        payload: ImagePayload,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextTurn {
    pub message_id: String,
    pub role: TurnRole,
    pub parts: Vec<ContextPart>,
}

impl ContextTurn {
    pub fn text(&self) -> Option<&str> {
        self.parts.iter().find_map(|part| match part {
            ContextPart::Text(text) => Some(text.as_str()),
            ContextPart::Image { .. } => None,
        })
    }

    pub fn image_count(&self) -> usize {
        self.parts
            .iter()
            .filter(|part| matches!(part, ContextPart::Image { .. }))
            .count()
    }
}

/// Turns a transcript snapshot into the multi-turn history sent to the
/// image editing service.
///
/// One turn per message, in transcript order. Text comes before the image
/// within a turn. An image reference the store cannot resolve is dropped with
/// a warning; a message left with neither text nor image is skipped.
pub fn assemble_context(messages: &[Message], store: &ImageStore) -> Vec<ContextTurn> {
    let mut turns = Vec::with_capacity(messages.len());
    for message in messages {
        let mut parts = Vec::with_capacity(2);
        if message.has_text() {
            parts.push(ContextPart::Text(message.content.trim().to_string()));
        }
        if let Some(image_id) = message.image_ref.as_ref() {
            match store.get(image_id) {
                Some(record) => parts.push(ContextPart::Image {
                    image_id: record.id.clone(),
                    payload: record.payload.clone(),
                }),
                None => tracing::warn!(
                    message_id = %message.id,
                    image_id = %image_id,
                    "skipping unresolved image reference in chat history"
                ),
            }
        }
        if parts.is_empty() {
            continue;
        }
        turns.push(ContextTurn {
            message_id: message.id.clone(),
            role: TurnRole::from(message.sender),
            parts,
        });
    }
    turns
}
