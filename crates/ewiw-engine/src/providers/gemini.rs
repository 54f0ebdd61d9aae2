use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use ewiw_contracts::chat::{ContextPart, ContextTurn};
use ewiw_contracts::images::ImagePayload;
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::{json, Value};

use super::{EditProvider, EditRequest, EditResponse, NamedProvider};
use crate::config::TransportSettings;
use crate::http::{
    api_base_from_env, is_retryable_transport_error, non_empty_env, response_json_or_error,
    truncate_text,
};

const EDIT_SUFFIX: &str = " Please generate an edited version of this image.";

pub struct GeminiEditProvider {
    api_base: String,
    model: String,
    http: HttpClient,
    transport: TransportSettings,
}

impl GeminiEditProvider {
    pub fn new(model: &str, transport: TransportSettings) -> Self {
        Self {
            api_base: api_base_from_env(
                "GEMINI_API_BASE",
                "https://generativelanguage.googleapis.com/v1beta",
            ),
            model: model.trim().to_string(),
            http: HttpClient::new(),
            transport: transport.clamped(),
        }
    }

    fn api_key() -> Option<String> {
        non_empty_env("GEMINI_API_KEY").or_else(|| non_empty_env("GOOGLE_API_KEY"))
    }

    fn endpoint(&self) -> String {
        let model_path = if self.model.starts_with("models/") {
            self.model.clone()
        } else {
            format!("models/{}", self.model)
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    fn history_turn(turn: &ContextTurn) -> Value {
        let parts: Vec<Value> = turn
            .parts
            .iter()
            .map(|part| match part {
                ContextPart::Text(text) => json!({ "text": text }),
                ContextPart::Image { payload, .. } => inline_part(payload),
            })
            .collect();
        json!({ "role": turn.role.as_str(), "parts": parts })
    }

    fn build_payload(request: &EditRequest) -> Value {
        let mut contents: Vec<Value> = request.history.iter().map(Self::history_turn).collect();
        contents.push(json!({
            "role": "user",
            "parts": [
                inline_part(&request.image),
                { "text": format!("{}{}", request.prompt.trim(), EDIT_SUFFIX) },
            ],
        }));
        json!({
            "contents": contents,
            "generationConfig": {
                "temperature": 0.4,
                "topK": 32,
                "topP": 0.95,
                "maxOutputTokens": 8192,
                "responseModalities": ["TEXT", "IMAGE"],
            },
        })
    }

    fn post_with_transport_retries(
        &self,
        endpoint: &str,
        api_key: &str,
        payload: &Value,
    ) -> Result<HttpResponse> {
        let max_retries = self.transport.retries;
        for attempt in 0..=max_retries {
            let response = self
                .http
                .post(endpoint)
                .query(&[("key", api_key)])
                .timeout(Duration::from_secs_f64(self.transport.request_timeout_s))
                .json(payload)
                .send();

            match response {
                Ok(ok) => return Ok(ok),
                Err(raw) => {
                    let err = anyhow::Error::new(raw)
                        .context(format!("Gemini request failed ({endpoint})"));
                    if !is_retryable_transport_error(&err) || attempt >= max_retries {
                        return Err(err);
                    }
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_retries,
                        "Gemini transport retry after transient request failure"
                    );
                    let delay_s = self.transport.retry_backoff_s * (attempt as f64 + 1.0);
                    thread::sleep(Duration::from_secs_f64(delay_s));
                }
            }
        }

        bail!("Gemini request failed ({endpoint}): retries exhausted")
    }

    fn parse_response(payload: &Value) -> Result<EditResponse> {
        if let Some(error) = payload.get("error") {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            bail!("Gemini API error: {}", truncate_text(&message, 512));
        }
        if let Some(reason) = payload
            .get("promptFeedback")
            .and_then(|feedback| feedback.get("blockReason"))
            .and_then(Value::as_str)
        {
            bail!("Gemini blocked the request: {reason}");
        }
        let candidates = payload
            .get("candidates")
            .and_then(Value::as_array)
            .filter(|rows| !rows.is_empty())
            .ok_or_else(|| anyhow::anyhow!("No response generated from Gemini API"))?;

        let mut texts: Vec<String> = Vec::new();
        let mut image: Option<ImagePayload> = None;
        let finish_reason = candidates
            .iter()
            .find_map(|candidate| candidate.get("finishReason").and_then(Value::as_str))
            .map(str::to_string);
        for candidate in candidates {
            let parts = candidate
                .get("content")
                .and_then(|content| content.get("parts"))
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            for part in parts {
                if let Some(text) = part.get("text").and_then(Value::as_str) {
                    if !text.trim().is_empty() {
                        texts.push(text.trim().to_string());
                    }
                    continue;
                }
                if image.is_some() {
                    continue;
                }
                let Some(inline) = part
                    .get("inlineData")
                    .or_else(|| part.get("inline_data"))
                    .and_then(Value::as_object)
                else {
                    continue;
                };
                let data = inline
                    .get("data")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                if data.is_empty() {
                    continue;
                }
                let bytes = BASE64
                    .decode(data.as_bytes())
                    .context("Gemini image base64 decode failed")?;
                let mime_type = inline
                    .get("mimeType")
                    .or_else(|| inline.get("mime_type"))
                    .and_then(Value::as_str)
                    .unwrap_or("image/png");
                image = Some(ImagePayload::new(mime_type, bytes));
            }
        }

        let text = (!texts.is_empty()).then(|| texts.join("\n"));
        Ok(EditResponse {
            text,
            image,
            finish_reason,
        })
    }
}

fn inline_part(payload: &ImagePayload) -> Value {
    json!({
        "inlineData": {
            "mimeType": payload.mime_type,
            "data": payload.base64_data(),
        }
    })
}

impl NamedProvider for GeminiEditProvider {
    fn name(&self) -> &str {
        "gemini"
    }
}

impl EditProvider for GeminiEditProvider {
    fn edit(&self, request: &EditRequest) -> Result<EditResponse> {
        let Some(api_key) = Self::api_key() else {
            bail!("GEMINI_API_KEY not set");
        };
        let endpoint = self.endpoint();
        let payload = Self::build_payload(request);
        tracing::debug!(
            model = %self.model,
            history_turns = request.history.len(),
            "sending Gemini edit request"
        );
        let response = self.post_with_transport_retries(&endpoint, &api_key, &payload)?;
        let parsed = response_json_or_error("Gemini", response)?;
        Self::parse_response(&parsed)
    }
}

#[cfg(test)]
mod tests {
    use ewiw_contracts::chat::TurnRole;
    use ewiw_contracts::images::ImageId;

    use super::*;

    fn request() -> EditRequest {
        EditRequest {
            image: ImagePayload::new("image/png", vec![1, 2, 3]),
            prompt: "make it blue".to_string(),
            history: vec![
                ContextTurn {
                    message_id: "msg_a".to_string(),
                    role: TurnRole::User,
                    parts: vec![
                        ContextPart::Text("here is my logo".to_string()),
                        ContextPart::Image {
                            image_id: ImageId::new("up_00000001"),
                            payload: ImagePayload::new("image/jpeg", vec![9]),
                        },
                    ],
                },
                ContextTurn {
                    message_id: "msg_b".to_string(),
                    role: TurnRole::Model,
                    parts: vec![ContextPart::Text("Looks great.".to_string())],
                },
            ],
        }
    }

    #[test]
    fn payload_puts_history_before_the_current_turn() {
        let payload = GeminiEditProvider::build_payload(&request());
        let contents = payload["contents"].as_array().cloned().unwrap_or_default();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[0]["parts"][0]["text"], "here is my logo");
        assert_eq!(contents[0]["parts"][1]["inlineData"]["mimeType"], "image/jpeg");
        assert_eq!(contents[1]["role"], "model");

        let current = &contents[2];
        assert_eq!(current["parts"][0]["inlineData"]["data"], "AQID");
        assert_eq!(
            current["parts"][1]["text"],
            "make it blue Please generate an edited version of this image."
        );
        assert_eq!(
            payload["generationConfig"]["responseModalities"],
            json!(["TEXT", "IMAGE"])
        );
        assert_eq!(payload["generationConfig"]["topK"], 32);
    }

    #[test]
    fn parse_response_collects_text_and_first_image() -> anyhow::Result<()> {
        let payload = json!({
            "candidates": [{
                "content": {"parts": [
                    {"text": "Here you go."},
                    {"inlineData": {"mimeType": "image/png", "data": "AQID"}},
                    {"inlineData": {"mimeType": "image/png", "data": "BAUG"}}
                ]}
            }]
        });
        let response = GeminiEditProvider::parse_response(&payload)?;
        assert_eq!(response.text.as_deref(), Some("Here you go."));
        let image = response.image.expect("image part");
        assert_eq!(image.bytes, vec![1, 2, 3]);
        Ok(())
    }

    #[test]
    fn parse_response_without_parts_reports_finish_reason() -> anyhow::Result<()> {
        let payload = json!({"candidates": [{"finishReason": "IMAGE_SAFETY"}]});
        let response = GeminiEditProvider::parse_response(&payload)?;
        assert!(response.image.is_none());
        assert!(response.text.is_none());
        assert_eq!(response.finish_reason.as_deref(), Some("IMAGE_SAFETY"));
        Ok(())
    }

    #[test]
    fn parse_response_rejects_errors_and_empty_candidates() {
        let err = GeminiEditProvider::parse_response(&json!({"error": {"message": "quota"}}))
            .unwrap_err();
        assert!(err.to_string().contains("quota"));
        let blocked = json!({"promptFeedback": {"blockReason": "SAFETY"}});
        assert!(GeminiEditProvider::parse_response(&blocked).is_err());
        assert!(GeminiEditProvider::parse_response(&json!({"candidates": []})).is_err());
    }

    #[test]
    fn endpoint_prefixes_models_path() {
        let provider = GeminiEditProvider::new("gemini-2.0-flash-exp", TransportSettings::default());
        assert!(provider
            .endpoint()
            .ends_with("/models/gemini-2.0-flash-exp:generateContent"));
    }
}
