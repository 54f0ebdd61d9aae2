mod payload;
mod store;

pub use payload::{sniff_mime_type, ImageError, ImagePayload};
pub use store::{ImageId, ImageOrigin, ImageRecord, ImageStore, NewImage};
