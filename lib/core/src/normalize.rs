//! Text normalization applied to catalog descriptions before indexing.

/// Lowercase `text` and strip ASCII punctuation.
///
/// Whitespace and alphanumerics (including non-ASCII letters) are kept as is.
#[inline]
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .filter(|c| !c.is_ascii_punctuation())
        .collect()
}
