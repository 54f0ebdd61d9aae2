use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use thiserror::Error;

const DEFAULT_MIME_TYPE: &str = "image/jpeg";

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("image data is empty")]
    Empty,
    #[error("malformed data URL: {0}")]
    MalformedDataUrl(String),
    #[error("invalid base64 image data: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("unrecognised image format")]
    UnknownFormat,
}

/// Raw image bytes plus their MIME type.
///
/// Images travel between the chat, the store and the providers as data URLs
/// (`data:image/png;base64,...`); this is the decoded form of one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl ImagePayload {
    pub fn new(mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            bytes,
        }
    }

    /// Accepts `data:<mime>;base64,<data>` or bare base64, which is taken
    /// to be JPEG.
    pub fn from_data_url(raw: &str) -> Result<Self, ImageError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ImageError::Empty);
        }

        let (mime_type, encoded) = if let Some(rest) = trimmed.strip_prefix("data:") {
            let Some((header, data)) = rest.split_once(',') else {
                return Err(ImageError::MalformedDataUrl(
                    "missing ',' separator".to_string(),
                ));
            };
            let Some(mime) = header.strip_suffix(";base64") else {
                return Err(ImageError::MalformedDataUrl(format!(
                    "unsupported encoding in header '{header}'"
                )));
            };
            let mime = mime.trim();
            let mime = if mime.is_empty() {
                DEFAULT_MIME_TYPE
            } else {
                mime
            };
            (mime.to_string(), data)
        } else if let Some((_, data)) = trimmed.split_once(',') {
            (DEFAULT_MIME_TYPE.to_string(), data)
        } else {
            (DEFAULT_MIME_TYPE.to_string(), trimmed)
        };

        let compact: String = encoded.chars().filter(|ch| !ch.is_whitespace()).collect();
        if compact.is_empty() {
            return Err(ImageError::Empty);
        }
        let bytes = BASE64.decode(compact.as_bytes())?;
        Ok(Self { mime_type, bytes })
    }

    /// Builds a payload from an uploaded file, sniffing the real format
    /// instead of trusting the file name.
    pub fn from_upload_bytes(bytes: Vec<u8>) -> Result<Self, ImageError> {
        if bytes.is_empty() {
            return Err(ImageError::Empty);
        }
        let mime_type = sniff_mime_type(&bytes).ok_or(ImageError::UnknownFormat)?;
        Ok(Self {
            mime_type: mime_type.to_string(),
            bytes,
        })
    }

    pub fn base64_data(&self) -> String {
        BASE64.encode(&self.bytes)
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64_data())
    }

    pub fn extension(&self) -> &'static str {
        match self.mime_type.to_ascii_lowercase().as_str() {
            "image/png" => "png",
            "image/webp" => "webp",
            "image/gif" => "gif",
            "image/bmp" => "bmp",
            "image/jpeg" | "image/jpg" => "jpg",
            _ => "bin",
        }
    }
}

pub fn sniff_mime_type(bytes: &[u8]) -> Option<&'static str> {
    image::guess_format(bytes)
        .ok()
        .map(|format| format.to_mime_type())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{ImageFormat, Rgb, RgbImage};

    use super::*;

    fn tiny_png() -> Vec<u8> {
        let image = RgbImage::from_pixel(2, 2, Rgb([10, 20, 30]));
        let mut out = Cursor::new(Vec::new());
        image
            .write_to(&mut out, ImageFormat::Png)
            .expect("encode png");
        out.into_inner()
    }

    #[test]
    fn parses_data_url_with_mime_prefix() {
        let payload = ImagePayload::from_data_url("data:image/png;base64,AQID").unwrap();
        assert_eq!(payload.mime_type, "image/png");
        assert_eq!(payload.bytes, vec![1, 2, 3]);
    }

    #[test]
    fn bare_base64_defaults_to_jpeg() {
        let payload = ImagePayload::from_data_url("AQID").unwrap();
        assert_eq!(payload.mime_type, "image/jpeg");
        assert_eq!(payload.bytes, vec![1, 2, 3]);
    }

    #[test]
    fn data_url_whitespace_is_ignored() {
        let payload = ImagePayload::from_data_url("  data:image/webp;base64,AQ\nID  ").unwrap();
        assert_eq!(payload.mime_type, "image/webp");
        assert_eq!(payload.bytes, vec![1, 2, 3]);
    }

    #[test]
    fn rejects_non_base64_data_urls() {
        let err = ImagePayload::from_data_url("data:image/svg+xml;utf8,<svg/>").unwrap_err();
        assert!(matches!(err, ImageError::MalformedDataUrl(_)));

        let err = ImagePayload::from_data_url("data:image/png;base64,").unwrap_err();
        assert!(matches!(err, ImageError::Empty));

        let err = ImagePayload::from_data_url("data:image/png;base64,!!!").unwrap_err();
        assert!(matches!(err, ImageError::Base64(_)));
    }

    #[test]
    fn renders_data_url() {
        let payload = ImagePayload::new("image/png", vec![1, 2, 3]);
        assert_eq!(payload.to_data_url(), "data:image/png;base64,AQID");
        assert_eq!(payload.extension(), "png");
    }

    #[test]
    fn upload_bytes_are_sniffed() {
        let payload = ImagePayload::from_upload_bytes(tiny_png()).unwrap();
        assert_eq!(payload.mime_type, "image/png");

        let err = ImagePayload::from_upload_bytes(b"not an image".to_vec()).unwrap_err();
        assert!(matches!(err, ImageError::UnknownFormat));

        let err = ImagePayload::from_upload_bytes(Vec::new()).unwrap_err();
        assert!(matches!(err, ImageError::Empty));
    }
}
