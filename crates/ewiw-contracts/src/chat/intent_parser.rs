use std::collections::BTreeMap;

use serde_json::Value;

use super::command_registry::{CommandSpec, NO_ARG_COMMANDS, RAW_ARG_COMMANDS, SINGLE_PATH_COMMANDS};

#[derive(Debug, Clone, PartialEq)]
pub struct Intent {
    pub action: String,
    pub raw: String,
    pub prompt: Option<String>,
    pub command_args: BTreeMap<String, Value>,
}

impl Intent {
    fn new(action: &str, raw: &str) -> Self {
        Self {
            action: action.to_string(),
            raw: raw.to_string(),
            prompt: None,
            command_args: BTreeMap::new(),
        }
    }
}

fn find_action(command: &str, specs: &[CommandSpec]) -> Option<&'static str> {
    specs
        .iter()
        .find(|spec| spec.command == command)
        .map(|spec| spec.action)
}

fn parse_path_args(arg: &str) -> Vec<String> {
    if arg.trim().is_empty() {
        return Vec::new();
    }
    match shell_words::split(arg) {
        Ok(parts) => parts
            .into_iter()
            .filter(|value| !value.is_empty())
            .collect(),
        Err(_) => arg
            .split_whitespace()
            .map(str::to_string)
            .filter(|value| !value.is_empty())
            .collect(),
    }
}

fn parse_single_path_arg(arg: &str) -> String {
    let parts = parse_path_args(arg);
    match parts.len() {
        0 => String::new(),
        1 => parts[0].clone(),
        _ => parts.join(" "),
    }
}

/// Splits one line of chat input into a slash command or an edit
/// instruction. Anything that is not a slash command is an `edit`.
pub fn parse_intent(text: &str) -> Intent {
    let raw_trimmed = text.trim();
    if raw_trimmed.is_empty() {
        return Intent::new("noop", text);
    }

    if let Some(slash_tail) = raw_trimmed.strip_prefix('/') {
        let command_len = slash_tail
            .chars()
            .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
            .count();
        if command_len > 0 {
            let command = slash_tail[..command_len].to_ascii_lowercase();
            let arg = slash_tail[command_len..].trim();

            if let Some(spec) = RAW_ARG_COMMANDS.iter().find(|spec| spec.command == command) {
                let mut intent = Intent::new(spec.action, text);
                intent
                    .command_args
                    .insert(spec.key.to_string(), Value::String(arg.to_string()));
                return intent;
            }

            if let Some(action) = find_action(&command, SINGLE_PATH_COMMANDS) {
                let mut intent = Intent::new(action, text);
                intent.command_args.insert(
                    "path".to_string(),
                    Value::String(parse_single_path_arg(arg)),
                );
                return intent;
            }

            if let Some(action) = find_action(&command, NO_ARG_COMMANDS) {
                return Intent::new(action, text);
            }

            let mut intent = Intent::new("unknown", text);
            intent
                .command_args
                .insert("command".to_string(), Value::String(command));
            intent
                .command_args
                .insert("arg".to_string(), Value::String(arg.to_string()));
            return intent;
        }
    }

    let mut intent = Intent::new("edit", text);
    intent.prompt = Some(raw_trimmed.to_string());
    intent
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::parse_intent;

    #[test]
    fn plain_text_is_an_edit_instruction() {
        let intent = parse_intent("  make the logo red  ");
        assert_eq!(intent.action, "edit");
        assert_eq!(intent.prompt.as_deref(), Some("make the logo red"));
    }

    #[test]
    fn blank_input_is_noop() {
        assert_eq!(parse_intent("   ").action, "noop");
    }

    #[test]
    fn parse_upload_quoted_path() {
        let intent = parse_intent("/upload \"/tmp/my logo.png\"");
        assert_eq!(intent.action, "upload");
        assert_eq!(intent.command_args["path"], json!("/tmp/my logo.png"));
    }

    #[test]
    fn parse_preview_without_path() {
        let intent = parse_intent("/preview");
        assert_eq!(intent.action, "preview");
        assert_eq!(intent.command_args["path"], json!(""));
    }

    #[test]
    fn parse_raw_arg_commands() {
        let product = parse_intent("/product hoodie");
        assert_eq!(product.action, "set_product");
        assert_eq!(product.command_args["product"], json!("hoodie"));

        let color = parse_intent("/Color navy");
        assert_eq!(color.action, "set_color");
        assert_eq!(color.command_args["color"], json!("navy"));

        let current = parse_intent("/use gen_1234abcd");
        assert_eq!(current.action, "set_current_image");
        assert_eq!(current.command_args["image_id"], json!("gen_1234abcd"));

        let chat = parse_intent("/new Custom Water Bottle");
        assert_eq!(chat.action, "new_chat");
        assert_eq!(chat.command_args["title"], json!("Custom Water Bottle"));

        let switch = parse_intent("/switch chat_2");
        assert_eq!(switch.action, "switch_chat");
        assert_eq!(switch.command_args["chat_id"], json!("chat_2"));
    }

    #[test]
    fn parse_no_arg_commands() {
        assert_eq!(parse_intent("/images").action, "list_images");
        assert_eq!(parse_intent("/history").action, "history");
        assert_eq!(parse_intent("/products").action, "list_products");
        assert_eq!(parse_intent("/video").action, "video");
        assert_eq!(parse_intent("/chats").action, "list_chats");
        assert_eq!(parse_intent("/help").action, "help");
    }

    #[test]
    fn parse_unknown_command() {
        let intent = parse_intent("/magic foo bar");
        assert_eq!(intent.action, "unknown");
        assert_eq!(intent.command_args["command"], json!("magic"));
        assert_eq!(intent.command_args["arg"], json!("foo bar"));
    }

    #[test]
    fn lone_slash_is_an_edit() {
        let intent = parse_intent("/ add a slash");
        assert_eq!(intent.action, "edit");
    }
}
