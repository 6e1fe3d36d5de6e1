//! Comment quality gate.
//!
//! Invoked by the ingestion layer before a comment or reply is offered to
//! the scoring engine. Rejections never reach `apply_activity`, so a
//! filtered comment earns nothing without counting as an error.

/// Minimum length of a comment after trimming.
const MIN_COMMENT_CHARS: usize = 8;
/// A comment must use at least this fraction of distinct characters.
const MIN_DISTINCT_RATIO: f64 = 0.25;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentVerdict {
    pub valid: bool,
    pub reason: Option<&'static str>,
}

impl CommentVerdict {
    fn ok() -> Self {
        Self {
            valid: true,
            reason: None,
        }
    }

    fn reject(reason: &'static str) -> Self {
        Self {
            valid: false,
            reason: Some(reason),
        }
    }
}

/// Check a comment for the obvious low-effort patterns: too short, one word
/// repeated, or hammering a handful of characters.
pub fn validate_comment(text: &str) -> CommentVerdict {
    let trimmed = text.trim();
    let chars: Vec<char> = trimmed.chars().collect();

    if chars.len() < MIN_COMMENT_CHARS {
        return CommentVerdict::reject("too_short");
    }

    let words: Vec<&str> = trimmed.split_whitespace().collect();
    if words.len() > 1 {
        let first = words[0].to_lowercase();
        if words.iter().all(|w| w.to_lowercase() == first) {
            return CommentVerdict::reject("repetitive");
        }
    }

    let mut distinct: Vec<char> = chars
        .iter()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_lowercase())
        .collect();
    distinct.sort_unstable();
    distinct.dedup();
    let non_ws = chars.iter().filter(|c| !c.is_whitespace()).count();
    if non_ws > 0 && (distinct.len() as f64) / (non_ws as f64) < MIN_DISTINCT_RATIO {
        return CommentVerdict::reject("low_entropy");
    }

    CommentVerdict::ok()
}
