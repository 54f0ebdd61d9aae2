use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::payload::ImagePayload;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageId(String);

impl ImageId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    fn generate(origin: ImageOrigin) -> Self {
        let simple = Uuid::new_v4().simple().to_string();
        Self(format!("{}_{}", origin.id_prefix(), &simple[..8]))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl AsRef<str> for ImageId {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ImageId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageOrigin {
    Uploaded,
    Generated,
}

impl ImageOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageOrigin::Uploaded => "uploaded",
            ImageOrigin::Generated => "generated",
        }
    }

    fn id_prefix(&self) -> &'static str {
        match self {
            ImageOrigin::Uploaded => "up",
            ImageOrigin::Generated => "gen",
        }
    }
}

impl fmt::Display for ImageOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input to [`ImageStore::put`]; the store assigns `id` and `created_at`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewImage {
    pub payload: ImagePayload,
    pub origin: ImageOrigin,
    pub label: Option<String>,
}

impl NewImage {
    pub fn uploaded(payload: ImagePayload, label: Option<String>) -> Self {
        Self {
            payload,
            origin: ImageOrigin::Uploaded,
            label: label
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
        }
    }

    pub fn generated(payload: ImagePayload) -> Self {
        Self {
            payload,
            origin: ImageOrigin::Generated,
            label: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageRecord {
    pub id: ImageId,
    pub payload: ImagePayload,
    pub origin: ImageOrigin,
    pub label: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Append-only collection of the images seen in one chat session.
///
/// Records are never updated or removed, and the store only hands out
/// shared references, so an id stays valid for the life of the session.
/// `created_at` is strictly increasing in insertion order even when the
/// wall clock does not move between two inserts.
#[derive(Debug, Clone, Default)]
pub struct ImageStore {
    records: Vec<ImageRecord>,
}

impl ImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, image: NewImage) -> ImageId {
        let mut id = ImageId::generate(image.origin);
        while self.contains(&id) {
            id = ImageId::generate(image.origin);
        }

        let mut created_at = Utc::now();
        if let Some(last) = self.records.last() {
            if created_at <= last.created_at {
                created_at = last.created_at + Duration::microseconds(1);
            }
        }

        self.records.push(ImageRecord {
            id: id.clone(),
            payload: image.payload,
            origin: image.origin,
            label: image.label,
            created_at,
        });
        id
    }

    pub fn get(&self, id: impl AsRef<str>) -> Option<&ImageRecord> {
        let id = id.as_ref();
        self.records.iter().find(|record| record.id.as_str() == id)
    }

    pub fn contains(&self, id: impl AsRef<str>) -> bool {
        self.get(id).is_some()
    }

    pub fn all(&self) -> &[ImageRecord] {
        self.records.as_slice()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn first(&self) -> Option<&ImageRecord> {
        self.records.first()
    }

    pub fn earliest(&self, origin: ImageOrigin) -> Option<&ImageRecord> {
        self.records.iter().find(|record| record.origin == origin)
    }

    pub fn latest(&self, origin: ImageOrigin) -> Option<&ImageRecord> {
        self.records.iter().rev().find(|record| record.origin == origin)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn payload(byte: u8) -> ImagePayload {
        ImagePayload::new("image/png", vec![byte])
    }

    #[test]
    fn put_assigns_unique_ids_in_insertion_order() {
        let mut store = ImageStore::new();
        let ids: Vec<ImageId> = (0..20)
            .map(|idx| store.put(NewImage::generated(payload(idx))))
            .collect();

        let unique: HashSet<&ImageId> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
        assert_eq!(
            store
                .all()
                .iter()
                .map(|record| record.id.clone())
                .collect::<Vec<ImageId>>(),
            ids
        );
    }

    #[test]
    fn created_at_strictly_increases() {
        let mut store = ImageStore::new();
        for idx in 0..50 {
            store.put(NewImage::generated(payload(idx)));
        }
        for pair in store.all().windows(2) {
            assert!(pair[0].created_at < pair[1].created_at);
        }
    }

    #[test]
    fn ids_carry_origin_prefix() {
        let mut store = ImageStore::new();
        let up = store.put(NewImage::uploaded(payload(1), Some("logo.png".to_string())));
        let gen = store.put(NewImage::generated(payload(2)));
        assert!(up.as_str().starts_with("up_"));
        assert!(gen.as_str().starts_with("gen_"));
    }

    #[test]
    fn earliest_and_latest_filter_by_origin() {
        let mut store = ImageStore::new();
        let g1 = store.put(NewImage::generated(payload(1)));
        let u1 = store.put(NewImage::uploaded(payload(2), None));
        let u2 = store.put(NewImage::uploaded(payload(3), None));
        let g2 = store.put(NewImage::generated(payload(4)));

        assert_eq!(store.first().map(|record| &record.id), Some(&g1));
        assert_eq!(
            store.earliest(ImageOrigin::Uploaded).map(|record| &record.id),
            Some(&u1)
        );
        assert_eq!(
            store.latest(ImageOrigin::Uploaded).map(|record| &record.id),
            Some(&u2)
        );
        assert_eq!(
            store.latest(ImageOrigin::Generated).map(|record| &record.id),
            Some(&g2)
        );
    }

    #[test]
    fn get_unknown_id_is_none() {
        let mut store = ImageStore::new();
        store.put(NewImage::generated(payload(1)));
        assert!(store.get("gen_missing").is_none());
        assert!(!store.contains("gen_missing"));
    }

    #[test]
    fn blank_upload_labels_are_dropped() {
        let image = NewImage::uploaded(payload(1), Some("   ".to_string()));
        assert_eq!(image.label, None);
    }
}
