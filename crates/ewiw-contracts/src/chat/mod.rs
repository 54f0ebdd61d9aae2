mod command_registry;
mod context;
mod intent_parser;
mod message;
mod reference;

pub use command_registry::CHAT_HELP_COMMANDS;
pub use context::{assemble_context, ContextPart, ContextTurn, TurnRole};
pub use intent_parser::{parse_intent, Intent};
pub use message::{Message, Sender, Transcript, TranscriptError, VideoRef};
pub use reference::{
    extract_reference, resolve_reference, ReferenceKind, ReferenceRule, Resolution,
    COLOR_TOKENS, REFERENCE_RULES,
};
