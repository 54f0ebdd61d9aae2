use std::env;
use std::path::PathBuf;

use crate::http::non_empty_env;

pub const DEFAULT_EDIT_MODEL: &str = "gemini-2.0-flash-exp";
pub const DEFAULT_VIDEO_MODEL: &str = "wavespeedai/wan-2.1-i2v-480p";

/// HTTP behaviour shared by the remote providers. Values are clamped on
/// construction so a bad flag cannot produce a zero timeout or a retry storm.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransportSettings {
    pub request_timeout_s: f64,
    pub retries: usize,
    pub retry_backoff_s: f64,
    pub poll_interval_s: f64,
    pub poll_timeout_s: f64,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            request_timeout_s: 90.0,
            retries: 2,
            retry_backoff_s: 1.2,
            poll_interval_s: 1.0,
            poll_timeout_s: 300.0,
        }
    }
}

impl TransportSettings {
    pub fn clamped(self) -> Self {
        Self {
            request_timeout_s: self.request_timeout_s.clamp(15.0, 300.0),
            retries: self.retries.min(4),
            retry_backoff_s: self.retry_backoff_s.clamp(0.1, 10.0),
            poll_interval_s: self.poll_interval_s.clamp(0.2, 5.0),
            poll_timeout_s: self.poll_timeout_s.clamp(10.0, 600.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub out_dir: PathBuf,
    pub edit_provider: String,
    pub edit_model: String,
    pub video_provider: String,
    pub video_model: String,
    /// Render a promotional video after every successful edit.
    pub auto_video: bool,
    /// Run an edit pass over each upload right after it is registered.
    pub process_uploads: bool,
    /// Mirror generated videos into `<chat>/videos/`.
    pub download_videos: bool,
    pub transport: TransportSettings,
}

impl EngineConfig {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
            edit_provider: "gemini".to_string(),
            edit_model: non_empty_env("GEMINI_IMAGE_MODEL")
                .unwrap_or_else(|| DEFAULT_EDIT_MODEL.to_string()),
            video_provider: "replicate".to_string(),
            video_model: non_empty_env("REPLICATE_VIDEO_MODEL")
                .unwrap_or_else(|| DEFAULT_VIDEO_MODEL.to_string()),
            auto_video: true,
            process_uploads: true,
            download_videos: false,
            transport: TransportSettings::default(),
        }
    }

    /// Offline configuration backed by the dry-run providers.
    pub fn dryrun(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            edit_provider: "dryrun".to_string(),
            video_provider: "dryrun".to_string(),
            ..Self::new(out_dir)
        }
    }
}

/// Which provider credentials are present, for `ewiw health`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialReport {
    pub gemini_api_key_configured: bool,
    pub replicate_api_token_configured: bool,
}

impl CredentialReport {
    pub fn from_env() -> Self {
        let present = |keys: &[&str]| {
            keys.iter().any(|key| {
                env::var(key)
                    .map(|value| !value.trim().is_empty())
                    .unwrap_or(false)
            })
        };
        Self {
            gemini_api_key_configured: present(&["GEMINI_API_KEY", "GOOGLE_API_KEY"]),
            replicate_api_token_configured: present(&["REPLICATE_API_TOKEN", "REPLICATE_API_KEY"]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_settings_clamp_to_safe_ranges() {
        let wild = TransportSettings {
            request_timeout_s: 1.0,
            retries: 40,
            retry_backoff_s: 100.0,
            poll_interval_s: 0.0,
            poll_timeout_s: 10_000.0,
        }
        .clamped();
        assert_eq!(wild.request_timeout_s, 15.0);
        assert_eq!(wild.retries, 4);
        assert_eq!(wild.retry_backoff_s, 10.0);
        assert_eq!(wild.poll_interval_s, 0.2);
        assert_eq!(wild.poll_timeout_s, 600.0);
        assert_eq!(
            TransportSettings::default().clamped(),
            TransportSettings::default()
        );
    }

    #[test]
    fn dryrun_config_swaps_only_providers() {
        let config = EngineConfig::dryrun("/tmp/out");
        assert_eq!(config.edit_provider, "dryrun");
        assert_eq!(config.video_provider, "dryrun");
        assert!(config.auto_video);
        assert!(config.process_uploads);
        assert!(!config.download_videos);
    }
}
