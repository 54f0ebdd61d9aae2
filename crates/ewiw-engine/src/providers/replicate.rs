use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use ewiw_contracts::chat::VideoRef;
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use super::{NamedProvider, VideoOutput, VideoProvider, VideoRequest};
use crate::config::TransportSettings;
use crate::http::{api_base_from_env, non_empty_env, response_json_or_error, truncate_text};

pub struct ReplicateVideoProvider {
    api_base: String,
    model: String,
    http: HttpClient,
    transport: TransportSettings,
}

impl ReplicateVideoProvider {
    pub fn new(model: &str, transport: TransportSettings) -> Self {
        Self {
            api_base: api_base_from_env("REPLICATE_API_BASE", "https://api.replicate.com/v1"),
            model: model.trim().to_string(),
            http: HttpClient::new(),
            transport: transport.clamped(),
        }
    }

    fn api_key() -> Option<String> {
        non_empty_env("REPLICATE_API_TOKEN").or_else(|| non_empty_env("REPLICATE_API_KEY"))
    }

    fn predictions_endpoint(&self) -> String {
        format!("{}/models/{}/predictions", self.api_base, self.model)
    }

    fn enhance_prompt(prompt: &str, product_context: &str) -> String {
        let prompt = prompt.trim();
        let product = product_context.trim();
        if product.is_empty() {
            return prompt.to_string();
        }
        format!(
            "{prompt} for a {product}. Create a realistic, detailed video showing the {product} from multiple angles."
        )
    }

    fn build_input(request: &VideoRequest) -> Map<String, Value> {
        let mut input = Map::new();
        input.insert("image".to_string(), json!(request.image.to_data_url()));
        input.insert(
            "prompt".to_string(),
            json!(Self::enhance_prompt(&request.prompt, &request.product_context)),
        );
        input.insert("max_area".to_string(), json!("832x480"));
        input.insert("fast_mode".to_string(), json!("Balanced"));
        input.insert("lora_scale".to_string(), json!(1));
        input.insert("num_frames".to_string(), json!(81));
        input.insert("sample_shift".to_string(), json!(3));
        input.insert("sample_steps".to_string(), json!(30));
        input.insert("frames_per_second".to_string(), json!(16));
        input.insert("sample_guide_scale".to_string(), json!(5));
        input
    }

    fn poll_prediction(&self, poll_url: &str, api_key: &str) -> Result<Value> {
        let started = Instant::now();
        loop {
            let response = self
                .http
                .get(poll_url)
                .bearer_auth(api_key)
                .send()
                .with_context(|| format!("Replicate poll request failed ({poll_url})"))?;
            let payload = response_json_or_error("Replicate poll", response)?;
            let status = prediction_status(&payload);
            if status == "succeeded" {
                return Ok(payload);
            }
            if matches!(status.as_str(), "failed" | "canceled") {
                bail!("Replicate prediction failed: {}", prediction_error(&payload));
            }
            if started.elapsed().as_secs_f64() >= self.transport.poll_timeout_s {
                bail!(
                    "Replicate polling timed out after {:.1}s",
                    self.transport.poll_timeout_s
                );
            }
            thread::sleep(Duration::from_secs_f64(self.transport.poll_interval_s));
        }
    }

    /// Pulls the video location out of a prediction's `output`, which may be
    /// a bare string, a list of strings, or an object with a `url` field.
    fn extract_video_url(output: &Value) -> Option<String> {
        match output {
            Value::String(url) => Some(url.trim().to_string()).filter(|url| !url.is_empty()),
            Value::Array(rows) => rows.iter().find_map(Self::extract_video_url),
            Value::Object(obj) => obj
                .get("url")
                .and_then(Self::extract_video_url)
                .or_else(|| obj.values().find_map(scan_for_http)),
            _ => None,
        }
    }

    fn download_video(&self, url: &str, output_dir: &Path) -> Result<PathBuf> {
        let response = self
            .http
            .get(url)
            .timeout(Duration::from_secs_f64(self.transport.request_timeout_s))
            .send()
            .with_context(|| format!("failed downloading Replicate video ({url})"))?;
        if !response.status().is_success() {
            let code = response.status().as_u16();
            let body = response.text().unwrap_or_default();
            bail!(
                "Replicate video download failed ({code}): {}",
                truncate_text(&body, 512)
            );
        }
        let bytes = response
            .bytes()
            .context("failed reading Replicate video bytes")?;
        fs::create_dir_all(output_dir)
            .with_context(|| format!("failed to create {}", output_dir.display()))?;
        let path = output_dir.join(format!("video_{}.mp4", Uuid::new_v4()));
        fs::write(&path, &bytes).with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }
}

/// Server-relative path a downloaded video is served under.
fn served_video_ref(path: &Path) -> Result<VideoRef> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("video path has no file name: {}", path.display()))?;
    Ok(VideoRef::parse(&format!("/videos/{file_name}"))?)
}

fn prediction_status(payload: &Value) -> String {
    payload
        .get("status")
        .and_then(Value::as_str)
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default()
}

fn prediction_error(payload: &Value) -> String {
    payload
        .get("error")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| truncate_text(&payload.to_string(), 512))
}

fn scan_for_http(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if text.trim().starts_with("http") => Some(text.trim().to_string()),
        Value::Array(rows) => rows.iter().find_map(scan_for_http),
        Value::Object(obj) => obj.values().find_map(scan_for_http),
        _ => None,
    }
}

/// Rewrites the raw failure from the video service into a message fit for
/// the chat transcript.
pub fn friendly_video_error(raw: &str) -> String {
    if raw.contains("Invalid version") || raw.contains("not permitted") {
        return "The Replicate API token is invalid or has insufficient permissions. Please check your API token.".to_string();
    }
    if raw.contains("rate limit") {
        return "You've reached the rate limit for the Replicate API. Please try again later."
            .to_string();
    }
    if raw.contains("Credit balance") {
        return "Your Replicate account has insufficient credits. Please check your Replicate account.".to_string();
    }
    if raw.contains("timed out") {
        return "Video generation took too long. Please try again with a simpler prompt or image."
            .to_string();
    }
    raw.trim().to_string()
}

impl NamedProvider for ReplicateVideoProvider {
    fn name(&self) -> &str {
        "replicate"
    }
}

impl VideoProvider for ReplicateVideoProvider {
    fn generate(&self, request: &VideoRequest) -> Result<VideoOutput> {
        let Some(api_key) = Self::api_key() else {
            bail!("REPLICATE_API_TOKEN not set");
        };
        let endpoint = self.predictions_endpoint();
        let payload = json!({ "input": Value::Object(Self::build_input(request)) });
        tracing::debug!(model = %self.model, product = %request.product_context, "starting Replicate prediction");
        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(&api_key)
            .header("Prefer", "wait")
            .timeout(Duration::from_secs_f64(self.transport.poll_timeout_s))
            .json(&payload)
            .send()
            .with_context(|| format!("Replicate request failed ({endpoint})"))?;
        let mut prediction = response_json_or_error("Replicate", response)?;
        let status = prediction_status(&prediction);
        if status != "succeeded" {
            if matches!(status.as_str(), "starting" | "processing") {
                let poll_url = prediction
                    .get("urls")
                    .and_then(Value::as_object)
                    .and_then(|obj| obj.get("get"))
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|value| !value.is_empty())
                    .map(str::to_string)
                    .ok_or_else(|| anyhow::anyhow!("Replicate prediction missing poll URL"))?;
                prediction = self.poll_prediction(&poll_url, &api_key)?;
            } else {
                bail!("Replicate prediction failed: {}", prediction_error(&prediction));
            }
        }

        let url = prediction
            .get("output")
            .and_then(Self::extract_video_url)
            .ok_or_else(|| anyhow::anyhow!("No video URL was returned from the generation process"))?;
        let remote = VideoRef::parse(&url)?;

        let (video_url, local_path) = match request.output_dir.as_deref() {
            Some(dir) if remote.is_remote() => match self.download_video(remote.as_str(), dir) {
                Ok(path) => (served_video_ref(&path)?, Some(path)),
                Err(err) => {
                    tracing::warn!(error = %err, "keeping remote video URL; download failed");
                    (remote, None)
                }
            },
            _ => (remote, None),
        };

        Ok(VideoOutput {
            video_url,
            local_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use ewiw_contracts::images::ImagePayload;

    use super::*;

    #[test]
    fn enhance_prompt_mentions_product_twice() {
        assert_eq!(
            ReplicateVideoProvider::enhance_prompt("rotate slowly", "hoodie"),
            "rotate slowly for a hoodie. Create a realistic, detailed video showing the hoodie from multiple angles."
        );
        assert_eq!(ReplicateVideoProvider::enhance_prompt(" spin ", ""), "spin");
    }

    #[test]
    fn build_input_carries_model_settings() {
        let input = ReplicateVideoProvider::build_input(&VideoRequest {
            image: ImagePayload::new("image/png", vec![1, 2, 3]),
            prompt: "spin".to_string(),
            product_context: "bottle".to_string(),
            output_dir: None,
        });
        assert_eq!(input["image"], "data:image/png;base64,AQID");
        assert_eq!(input["num_frames"], 81);
        assert_eq!(input["max_area"], "832x480");
        assert!(input["prompt"].as_str().unwrap_or_default().contains("bottle"));
    }

    #[test]
    fn downloaded_videos_are_served_from_videos_path() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("videos").join("video_abc.mp4");
        let served = served_video_ref(&path)?;
        assert_eq!(served.as_str(), "/videos/video_abc.mp4");
        assert!(!served.is_remote());
        Ok(())
    }

    #[test]
    fn extract_video_url_handles_output_shapes() {
        let extract = ReplicateVideoProvider::extract_video_url;
        assert_eq!(
            extract(&json!("https://cdn.test/a.mp4")).as_deref(),
            Some("https://cdn.test/a.mp4")
        );
        assert_eq!(
            extract(&json!(["https://cdn.test/b.mp4", "https://cdn.test/c.mp4"])).as_deref(),
            Some("https://cdn.test/b.mp4")
        );
        assert_eq!(
            extract(&json!({"url": "https://cdn.test/d.mp4"})).as_deref(),
            Some("https://cdn.test/d.mp4")
        );
        assert_eq!(
            extract(&json!({"files": {"video": "https://cdn.test/e.mp4"}})).as_deref(),
            Some("https://cdn.test/e.mp4")
        );
        assert_eq!(extract(&json!(null)), None);
        assert_eq!(extract(&json!([])), None);
    }

    #[test]
    fn predictions_endpoint_is_model_scoped() {
        let provider =
            ReplicateVideoProvider::new("wavespeedai/wan-2.1-i2v-480p", TransportSettings::default());
        assert!(provider
            .predictions_endpoint()
            .ends_with("/models/wavespeedai/wan-2.1-i2v-480p/predictions"));
    }

    #[test]
    fn friendly_video_error_maps_known_failures() {
        assert!(friendly_video_error("Invalid version or not permitted").contains("invalid"));
        assert!(friendly_video_error("hit rate limit").contains("rate limit"));
        assert!(friendly_video_error("Credit balance too low").contains("credits"));
        assert!(friendly_video_error("Replicate polling timed out after 300.0s").contains("too long"));
        assert_eq!(friendly_video_error(" something else "), "something else");
    }
}
