use crate::images::{ImageId, ImageOrigin, ImageRecord, ImageStore};

/// Colour words that may single out an image by its label ("the red one").
pub const COLOR_TOKENS: &[&str] = &[
    "black", "white", "gray", "silver", "blue", "navy", "red", "green", "yellow", "orange",
    "purple", "pink", "brown", "beige", "gold", "teal",
];

const REVERT_TOKENS: &[&str] = &["revert"];

const REVERT_FILLER: &[&str] = &[
    "please", "just", "now", "back", "to", "the", "my", "original", "first", "previous", "last",
    "image", "version", "one", "it", "and", "then",
];

const REVERT_PROMPT: &str =
    "Return this exact image unchanged, without applying any further edits.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    Original,
    Previous,
    Color,
    Current,
}

impl ReferenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceKind::Original => "original",
            ReferenceKind::Previous => "previous",
            ReferenceKind::Color => "color",
            ReferenceKind::Current => "current",
        }
    }
}

enum RuleOutcome<'a> {
    Resolved(Option<&'a ImageRecord>),
    FallThrough,
}

type Selector = for<'a> fn(&'a ImageStore, &[String], Option<&ImageId>) -> RuleOutcome<'a>;

/// One row of the resolution table. A rule fires when any of its patterns is
/// a word of the instruction; an empty pattern list always fires.
pub struct ReferenceRule {
    pub kind: ReferenceKind,
    pub patterns: &'static [&'static str],
    select: Selector,
}

impl ReferenceRule {
    pub fn matches(&self, words: &[String]) -> bool {
        self.patterns.is_empty()
            || words
                .iter()
                .any(|word| self.patterns.contains(&word.as_str()))
    }
}

/// Evaluated top to bottom; the first rule that fires and does not fall
/// through decides the result.
pub const REFERENCE_RULES: &[ReferenceRule] = &[
    ReferenceRule {
        kind: ReferenceKind::Original,
        patterns: &["original", "first"],
        select: select_original,
    },
    ReferenceRule {
        kind: ReferenceKind::Previous,
        patterns: &["previous", "last"],
        select: select_previous,
    },
    ReferenceRule {
        kind: ReferenceKind::Color,
        patterns: COLOR_TOKENS,
        select: select_by_color,
    },
    ReferenceRule {
        kind: ReferenceKind::Current,
        patterns: &[],
        select: select_current,
    },
];

#[derive(Debug, Clone, Copy)]
pub struct Resolution<'a> {
    pub kind: ReferenceKind,
    pub record: Option<&'a ImageRecord>,
}

impl<'a> Resolution<'a> {
    pub fn image_id(&self) -> Option<&'a ImageId> {
        self.record.map(|record| &record.id)
    }
}

/// Works out which stored image an instruction is talking about.
pub fn resolve_reference<'a>(
    text: &str,
    store: &'a ImageStore,
    current: Option<&ImageId>,
) -> Resolution<'a> {
    let words = words(text);
    for rule in REFERENCE_RULES {
        if !rule.matches(&words) {
            continue;
        }
        if let RuleOutcome::Resolved(record) = (rule.select)(store, &words, current) {
            return Resolution {
                kind: rule.kind,
                record,
            };
        }
    }
    Resolution {
        kind: ReferenceKind::Current,
        record: None,
    }
}

/// Reports the explicit reference an instruction makes, if any, and returns
/// the text to forward as the edit prompt. The "revert to ..." phrase is
/// stripped and the rest of the instruction kept; a bare revert becomes an
/// explicit reproduce-unchanged request.
pub fn extract_reference(text: &str) -> (String, Option<ReferenceKind>) {
    let words = words(text);
    let kind = REFERENCE_RULES
        .iter()
        .filter(|rule| !rule.patterns.is_empty())
        .find(|rule| rule.matches(&words))
        .map(|rule| rule.kind);

    match strip_revert_phrase(text) {
        Some(rest) if rest.is_empty() => (REVERT_PROMPT.to_string(), kind),
        Some(rest) => (rest, kind),
        None => (text.trim().to_string(), kind),
    }
}

/// Drops the revert word and the filler that names its target ("to the
/// original and"). Returns `None` when the text has no revert word, and an
/// empty string when nothing but filler is left.
fn strip_revert_phrase(text: &str) -> Option<String> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let is_filler = |token: &str| REVERT_FILLER.contains(&bare(token).as_str());
    let at = tokens
        .iter()
        .position(|token| REVERT_TOKENS.contains(&bare(token).as_str()))?;

    let mut end = at + 1;
    while end < tokens.len() && is_filler(tokens[end]) {
        end += 1;
    }
    let mut start = at;
    while start > 0 && is_filler(tokens[start - 1]) {
        start -= 1;
    }

    let kept: Vec<&str> = tokens[..start]
        .iter()
        .chain(&tokens[end..])
        .copied()
        .collect();
    if kept
        .iter()
        .all(|&token| bare(token).is_empty() || is_filler(token))
    {
        return Some(String::new());
    }
    Some(kept.join(" ").trim_matches(|ch: char| ch == ',' || ch == ';').trim().to_string())
}

fn bare(token: &str) -> String {
    normalize_word(
        &token
            .trim_matches(|ch: char| !ch.is_alphanumeric())
            .to_lowercase(),
    )
}

fn words(text: &str) -> Vec<String> {
    text.split(|ch: char| !ch.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(|word| normalize_word(&word.to_lowercase()))
        .collect()
}

fn normalize_word(word: &str) -> String {
    match word {
        "grey" => "gray".to_string(),
        other => other.to_string(),
    }
}

fn select_original<'a>(
    store: &'a ImageStore,
    _words: &[String],
    _current: Option<&ImageId>,
) -> RuleOutcome<'a> {
    RuleOutcome::Resolved(store.earliest(ImageOrigin::Uploaded).or_else(|| store.first()))
}

fn select_previous<'a>(
    store: &'a ImageStore,
    _words: &[String],
    _current: Option<&ImageId>,
) -> RuleOutcome<'a> {
    RuleOutcome::Resolved(store.latest(ImageOrigin::Generated))
}

fn select_by_color<'a>(
    store: &'a ImageStore,
    words: &[String],
    _current: Option<&ImageId>,
) -> RuleOutcome<'a> {
    let colors: Vec<&String> = words
        .iter()
        .filter(|word| COLOR_TOKENS.contains(&word.as_str()))
        .collect();
    let hit = store.all().iter().rev().find(|record| {
        record.label.as_deref().is_some_and(|label| {
            let label_words = self::words(label);
            colors.iter().any(|color| label_words.contains(*color))
        })
    });
    match hit {
        Some(record) => RuleOutcome::Resolved(Some(record)),
        None => RuleOutcome::FallThrough,
    }
}

fn select_current<'a>(
    store: &'a ImageStore,
    _words: &[String],
    current: Option<&ImageId>,
) -> RuleOutcome<'a> {
    let record = current.and_then(|id| {
        let found = store.get(id);
        if found.is_none() {
            tracing::warn!(image_id = %id, "current image id is not in the image store");
        }
        found
    });
    RuleOutcome::Resolved(record)
}

#[cfg(test)]
mod tests {
    use crate::images::{ImagePayload, NewImage};

    use super::*;

    fn payload() -> ImagePayload {
        ImagePayload::new("image/png", vec![0])
    }

    /// Store with one upload labelled "logo" followed by one generated edit.
    fn logo_then_edit() -> (ImageStore, ImageId, ImageId) {
        let mut store = ImageStore::new();
        let u1 = store.put(NewImage::uploaded(payload(), Some("logo".to_string())));
        let g1 = store.put(NewImage::generated(payload()));
        (store, u1, g1)
    }

    fn resolved<'a>(resolution: Resolution<'a>) -> Option<&'a ImageId> {
        resolution.image_id()
    }

    #[test]
    fn original_and_previous_pick_positional_images() {
        let (store, u1, g1) = logo_then_edit();
        assert_eq!(
            resolved(resolve_reference("revert to the original", &store, Some(&g1))),
            Some(&u1)
        );
        assert_eq!(
            resolved(resolve_reference("use the previous one", &store, Some(&u1))),
            Some(&g1)
        );
    }

    #[test]
    fn unmatched_color_falls_through_to_current() {
        let (store, _u1, g1) = logo_then_edit();
        let resolution = resolve_reference("make it light blue", &store, Some(&g1));
        assert_eq!(resolution.kind, ReferenceKind::Current);
        assert_eq!(resolved(resolution), Some(&g1));
    }

    #[test]
    fn original_wins_over_previous() {
        let (store, u1, g1) = logo_then_edit();
        let resolution =
            resolve_reference("go back from the previous to the original", &store, Some(&g1));
        assert_eq!(resolution.kind, ReferenceKind::Original);
        assert_eq!(resolved(resolution), Some(&u1));
    }

    #[test]
    fn matching_is_case_insensitive_and_word_bounded() {
        let (store, u1, g1) = logo_then_edit();
        assert_eq!(
            resolved(resolve_reference("Use The ORIGINAL!", &store, Some(&g1))),
            Some(&u1)
        );
        // "elastic" and "firstly" are not the words "last" / "first".
        let resolution = resolve_reference("make the band elastic, firstly", &store, Some(&u1));
        assert_eq!(resolution.kind, ReferenceKind::Current);
        assert_eq!(resolved(resolution), Some(&u1));
    }

    #[test]
    fn original_falls_back_to_earliest_record_without_uploads() {
        let mut store = ImageStore::new();
        let g1 = store.put(NewImage::generated(payload()));
        let g2 = store.put(NewImage::generated(payload()));
        assert_eq!(
            resolved(resolve_reference("the first one", &store, Some(&g2))),
            Some(&g1)
        );
    }

    #[test]
    fn original_prefers_oldest_upload() {
        let mut store = ImageStore::new();
        let _g0 = store.put(NewImage::generated(payload()));
        let u1 = store.put(NewImage::uploaded(payload(), None));
        let _u2 = store.put(NewImage::uploaded(payload(), None));
        assert_eq!(
            resolved(resolve_reference("original please", &store, None)),
            Some(&u1)
        );
    }

    #[test]
    fn previous_without_generated_images_is_none() {
        let mut store = ImageStore::new();
        let u1 = store.put(NewImage::uploaded(payload(), None));
        let resolution = resolve_reference("undo the last change", &store, Some(&u1));
        assert_eq!(resolution.kind, ReferenceKind::Previous);
        assert!(resolution.record.is_none());
    }

    #[test]
    fn color_matches_record_label() {
        let mut store = ImageStore::new();
        let red = store.put(NewImage::uploaded(payload(), Some("red-bottle.png".to_string())));
        let grey = store.put(NewImage::uploaded(payload(), Some("Grey Hoodie.jpg".to_string())));
        let g1 = store.put(NewImage::generated(payload()));

        let resolution = resolve_reference("put the red design on it", &store, Some(&g1));
        assert_eq!(resolution.kind, ReferenceKind::Color);
        assert_eq!(resolved(resolution), Some(&red));
        assert_eq!(
            resolved(resolve_reference("use the gray one", &store, Some(&g1))),
            Some(&grey)
        );
    }

    #[test]
    fn color_ties_pick_newest_label_match() {
        let mut store = ImageStore::new();
        let _old = store.put(NewImage::uploaded(payload(), Some("blue v1".to_string())));
        let new = store.put(NewImage::uploaded(payload(), Some("blue v2".to_string())));
        assert_eq!(
            resolved(resolve_reference("the blue design", &store, None)),
            Some(&new)
        );
    }

    #[test]
    fn empty_store_resolves_to_none() {
        let store = ImageStore::new();
        for text in ["original", "previous", "red", "anything", ""] {
            assert!(resolve_reference(text, &store, None).record.is_none(), "{text}");
        }
    }

    #[test]
    fn dangling_current_resolves_to_none() {
        let (store, _u1, _g1) = logo_then_edit();
        let ghost = ImageId::from("gen_ghost");
        assert!(resolve_reference("brighter", &store, Some(&ghost))
            .record
            .is_none());
    }

    #[test]
    fn resolution_is_deterministic() {
        let (store, _u1, g1) = logo_then_edit();
        for text in ["original", "previous", "logo in blue", "sharper"] {
            let first = resolved(resolve_reference(text, &store, Some(&g1))).cloned();
            for _ in 0..10 {
                assert_eq!(
                    resolved(resolve_reference(text, &store, Some(&g1))).cloned(),
                    first
                );
            }
        }
    }

    #[test]
    fn rule_table_is_ordered_by_priority() {
        let kinds: Vec<ReferenceKind> = REFERENCE_RULES.iter().map(|rule| rule.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ReferenceKind::Original,
                ReferenceKind::Previous,
                ReferenceKind::Color,
                ReferenceKind::Current,
            ]
        );
    }

    #[test]
    fn extract_reference_rewrites_revert() {
        let (cleaned, kind) = extract_reference("Revert to the original");
        assert_eq!(kind, Some(ReferenceKind::Original));
        assert_eq!(cleaned, REVERT_PROMPT);
    }

    #[test]
    fn bare_revert_has_no_reference_kind() {
        let (cleaned, kind) = extract_reference("please revert");
        assert_eq!(cleaned, REVERT_PROMPT);
        assert_eq!(kind, None);
    }

    #[test]
    fn revert_keeps_the_rest_of_the_instruction() {
        let (cleaned, kind) = extract_reference("revert to the original and add a gold star");
        assert_eq!(cleaned, "add a gold star");
        assert_eq!(kind, Some(ReferenceKind::Original));

        let (cleaned, _) = extract_reference("Revert back to the first one, then make it blue");
        assert_eq!(cleaned, "make it blue");
    }

    #[test]
    fn extract_reference_keeps_plain_instructions() {
        let (cleaned, kind) = extract_reference("  add a small star  ");
        assert_eq!(cleaned, "add a small star");
        assert_eq!(kind, None);

        let (cleaned, kind) = extract_reference("make the previous one red");
        assert_eq!(cleaned, "make the previous one red");
        assert_eq!(kind, Some(ReferenceKind::Previous));
    }
}
