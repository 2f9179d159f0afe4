//! MQTT topic filter matching.
//!
//! Supports the two wildcard markers used in subscription filters:
//!
//! - `+` occupies a whole segment and matches exactly one non-empty segment
//! - `#` occupies the final segment and matches one or more trailing characters,
//!   including further `/`-separated segments
//!
//! Any other character in a pattern is literal. Filters the broker would reject
//! (a `#` that is not last, a marker glued to other characters) never match.

const SINGLE_LEVEL: &str = "+";
const MULTI_LEVEL: &str = "#";

/// Returns true if `topic` satisfies `pattern`.
///
/// An absent or empty pattern never matches.
pub fn matches(topic: &str, pattern: Option<&str>) -> bool {
    let Some(pattern) = pattern.filter(|p| !p.is_empty()) else {
        return false;
    };

    if pattern == topic {
        return true;
    }

    if !has_wildcard(pattern) {
        return false;
    }

    match_segments(topic, pattern).unwrap_or(false)
}

/// True if the pattern contains a wildcard marker anywhere.
pub fn has_wildcard(pattern: &str) -> bool {
    pattern.contains('+') || pattern.contains('#')
}

/// Segment-wise match. `None` means the pattern itself is malformed.
fn match_segments(topic: &str, pattern: &str) -> Option<bool> {
    let mut topic_rest = Some(topic);
    let mut segments = pattern.split('/').peekable();

    while let Some(segment) = segments.next() {
        match segment {
            MULTI_LEVEL => {
                if segments.peek().is_some() {
                    return None;
                }
                // `#` needs at least one character left to consume
                return Some(topic_rest.is_some_and(|rest| !rest.is_empty()));
            }
            SINGLE_LEVEL => {
                let Some(rest) = topic_rest else {
                    return Some(false);
                };
                let (head, tail) = split_first_level(rest);
                if head.is_empty() {
                    return Some(false);
                }
                topic_rest = tail;
            }
            literal => {
                if literal.contains('+') || literal.contains('#') {
                    return None;
                }
                let Some(rest) = topic_rest else {
                    return Some(false);
                };
                let (head, tail) = split_first_level(rest);
                if head != literal {
                    return Some(false);
                }
                topic_rest = tail;
            }
        }
    }

    Some(topic_rest.is_none())
}

fn split_first_level(topic: &str) -> (&str, Option<&str>) {
    match topic.split_once('/') {
        Some((head, tail)) => (head, Some(tail)),
        None => (topic, None),
    }
}
