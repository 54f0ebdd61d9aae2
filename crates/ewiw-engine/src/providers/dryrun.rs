use std::io::Cursor;

use anyhow::{Context, Result};
use ewiw_contracts::chat::VideoRef;
use ewiw_contracts::images::ImagePayload;
use image::{ImageFormat, Rgb, RgbImage};
use sha2::{Digest, Sha256};

use super::{
    EditProvider, EditRequest, EditResponse, NamedProvider, VideoOutput, VideoProvider,
    VideoRequest,
};

const DRYRUN_EDGE: u32 = 256;

/// Offline editor: answers every request with a solid-colour PNG whose
/// colour is derived from the prompt and the source image.
pub struct DryrunEditProvider;

impl NamedProvider for DryrunEditProvider {
    fn name(&self) -> &str {
        "dryrun"
    }
}

impl EditProvider for DryrunEditProvider {
    fn edit(&self, request: &EditRequest) -> Result<EditResponse> {
        let (r, g, b) = color_from_prompt(&request.prompt, &request.image.bytes);
        let image = RgbImage::from_pixel(DRYRUN_EDGE, DRYRUN_EDGE, Rgb([r, g, b]));
        let mut out = Cursor::new(Vec::new());
        image
            .write_to(&mut out, ImageFormat::Png)
            .context("failed to encode dry-run image")?;
        Ok(EditResponse {
            text: Some(format!(
                "Dry run edit ({} prior turns): {}",
                request.history.len(),
                request.prompt
            )),
            image: Some(ImagePayload::new("image/png", out.into_inner())),
            finish_reason: None,
        })
    }
}

/// Offline video renderer: returns a deterministic server-relative path.
pub struct DryrunVideoProvider;

impl NamedProvider for DryrunVideoProvider {
    fn name(&self) -> &str {
        "dryrun"
    }
}

impl VideoProvider for DryrunVideoProvider {
    fn generate(&self, request: &VideoRequest) -> Result<VideoOutput> {
        let mut hasher = Sha256::new();
        hasher.update(request.prompt.as_bytes());
        hasher.update(request.product_context.as_bytes());
        hasher.update(&request.image.bytes);
        let digest = hasher.finalize();
        let video_url = VideoRef::parse(&format!("/videos/dryrun-{}.mp4", hex::encode(&digest[..4])))?;
        Ok(VideoOutput {
            video_url,
            local_path: None,
        })
    }
}

fn color_from_prompt(prompt: &str, source: &[u8]) -> (u8, u8, u8) {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    hasher.update(source);
    let digest = hasher.finalize();
    (digest[0], digest[1], digest[2])
}
