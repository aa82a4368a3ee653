//! Name normalization and word-overlap confidence
//!
//! Metadata sources use [`name_match_confidence`] to reject wrong search
//! hits before fetching them, and [`first_confident_match`] to keep scanning
//! past a rejected top hit instead of failing outright.

use tracing::debug;

/// Trim and collapse internal whitespace runs to single spaces
pub fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Replace every run of non-letter characters with a single space
pub fn strip_non_alpha(text: &str) -> String {
    let spaced: String = text
        .chars()
        .map(|c| if c.is_alphabetic() { c } else { ' ' })
        .collect();
    normalize(&spaced)
}

/// Lowercased letter-only words of `text`
pub fn split_words(text: &str) -> Vec<String> {
    strip_non_alpha(text)
        .to_lowercase()
        .split(' ')
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// Confidence in [0, 1] that `candidate` names the same thing as `target`
///
/// Counts target words present among the candidate's words and returns the
/// larger of the two coverage fractions, so a long title fully containing a
/// short name (or the reverse) still scores high. Repeated target words each
/// count, so the raw ratio can exceed 1; the result is capped there. Empty
/// inputs never match anything, including each other.
pub fn name_match_confidence(candidate: &str, target: &str) -> f64 {
    let candidate_words = split_words(candidate);
    let target_words = split_words(target);

    if candidate_words.is_empty() || target_words.is_empty() {
        return 0.0;
    }

    let intersect = target_words
        .iter()
        .filter(|word| candidate_words.contains(word))
        .count() as f64;

    f64::max(
        intersect / target_words.len() as f64,
        intersect / candidate_words.len() as f64,
    )
    .min(1.0)
}

/// First candidate, in order, whose title scores at least `threshold`
///
/// Returns the candidate with its confidence.
pub fn first_confident_match<'a, T, F>(
    target: &str,
    candidates: &'a [T],
    title: F,
    threshold: f64,
) -> Option<(&'a T, f64)>
where
    F: Fn(&T) -> &str,
{
    for candidate in candidates {
        let candidate_title = title(candidate);
        let confidence = name_match_confidence(candidate_title, target);
        if confidence < threshold {
            debug!(
                target_name = %target,
                candidate = %candidate_title,
                confidence = format!("{:.2}%", confidence * 100.0),
                "Rejecting search result"
            );
            continue;
        }
        debug!(
            target_name = %target,
            candidate = %candidate_title,
            confidence = format!("{:.2}%", confidence * 100.0),
            "Accepting search result"
        );
        return Some((candidate, confidence));
    }
    None
}
