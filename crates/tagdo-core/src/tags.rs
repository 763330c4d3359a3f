use std::sync::LazyLock;

use regex::Regex;

/// Most suggestions offered while a tag is being typed.
pub const MAX_SUGGESTIONS: usize = 6;

static TAG_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"#([\p{L}\p{Nd}_-]+)").expect("Invalid tag regex pattern")
});

static STRIP_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s?#[\p{L}\p{Nd}_-]+").expect("Invalid tag strip regex pattern")
});

static SPACE_RUN_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" {2,}").expect("Invalid space run regex pattern"));

static FRAGMENT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(^|\s)#([\p{L}\p{Nd}_-]*)\s?$").expect("Invalid tag fragment regex pattern")
});

/// Lowercase, de-duplicated tags in order of first appearance.
pub fn extract_tags(raw: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for caps in TAG_REGEX.captures_iter(raw) {
        let tag = caps[1].to_lowercase();
        if !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}

/// Display text for `raw`: every tag token goes (with at most one whitespace
/// character in front of it), space runs collapse, and the ends are trimmed.
/// A `#` with no token characters after it stays.
pub fn strip_tags(raw: &str) -> String {
    let removed = STRIP_REGEX.replace_all(raw, "");
    let collapsed = SPACE_RUN_REGEX.replace_all(&removed, " ");
    collapsed.trim().to_string()
}

/// The partial tag at the end of `input`, if the user is in the middle of
/// typing one. `"buy #gro"` gives `Some("gro")`, `"buy #"` gives `Some("")`.
pub fn tag_fragment(input: &str) -> Option<String> {
    FRAGMENT_REGEX
        .captures(input)
        .map(|caps| caps[2].to_lowercase())
}

pub fn suggest_tags(input: &str, known: &[String]) -> Vec<String> {
    let Some(fragment) = tag_fragment(input) else {
        return vec![];
    };

    known
        .iter()
        .filter(|tag| fragment.is_empty() || tag.starts_with(&fragment))
        .take(MAX_SUGGESTIONS)
        .cloned()
        .collect()
}

/// Replaces the trailing fragment with `#tag ` so typing can continue.
pub fn apply_suggestion(input: &str, tag: &str) -> Option<String> {
    let caps = FRAGMENT_REGEX.captures(input)?;
    let whole = caps.get(0)?;
    let sep = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
    Some(format!("{}{sep}#{tag} ", &input[..whole.start()]))
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    // Dense in `#`, token characters and whitespace so tags actually occur.
    const TAGGY_TEXT: &str = "[ \\t#a-zA-Z0-9_.\\-ÜжЖé日]{0,60}";

    proptest! {
        #[test]
        fn prop_stripped_text_has_no_tag_token(raw in TAGGY_TEXT) {
            let stripped = strip_tags(&raw);
            prop_assert!(!TAG_REGEX.is_match(&stripped), "{:?} stripped to {:?}", raw, stripped);
        }

        #[test]
        fn prop_stripped_arbitrary_text_has_no_tag_token(raw in "\\PC*") {
            prop_assert!(!TAG_REGEX.is_match(&strip_tags(&raw)));
        }

        #[test]
        fn prop_extracted_tags_are_unique_and_non_empty(raw in TAGGY_TEXT) {
            let tags = extract_tags(&raw);
            for (idx, tag) in tags.iter().enumerate() {
                prop_assert!(!tag.is_empty());
                prop_assert!(!tags[..idx].contains(tag));
            }
        }

        #[test]
        fn prop_suggestions_are_capped_known_tags(
            raw in TAGGY_TEXT,
            known in proptest::collection::vec("[a-z]{1,6}", 0..12)
        ) {
            let suggestions = suggest_tags(&raw, &known);
            prop_assert!(suggestions.len() <= MAX_SUGGESTIONS);
            for tag in &suggestions {
                prop_assert!(known.contains(tag));
            }
        }
    }
}
