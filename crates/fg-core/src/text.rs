//! Deny-list term matching
//!
//! Single-word terms match as whole words; multi-word terms ("phrases")
//! match as normalized substrings. Matching is case-insensitive and
//! tolerant of punctuation and whitespace runs, which is what page titles
//! and extracted body text actually look like.

// =============================================================================
// Normalization
// =============================================================================

#[inline]
fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Lowercase and reduce to alphanumeric/underscore tokens joined by single
/// spaces. "Buy    NOW!!" becomes "buy now".
fn reduce(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_token = false;
    for b in text.bytes() {
        if is_word_byte(b) {
            out.push(b.to_ascii_lowercase() as char);
            in_token = true;
        } else if in_token {
            out.push(' ');
            in_token = false;
        }
    }
    if out.ends_with(' ') {
        out.pop();
    }
    out
}

/// Lowercase and collapse whitespace runs only, keeping punctuation.
fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace()
        .map(|w| w.to_ascii_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

// =============================================================================
// Word Matching
// =============================================================================

/// Whole-word match: the reduced term must appear as a complete token of
/// the reduced haystack.
fn word_matches(term: &str, haystack: &str) -> bool {
    let needle = reduce(term);
    if needle.is_empty() {
        return false;
    }

    if reduce(haystack).split(' ').any(|tok| tok == needle) {
        return true;
    }

    // Fallback: raw substring, still requiring non-word boundaries on both
    // sides. Catches tokens glued together by characters `reduce` treats
    // as separators inside the term itself.
    let lower = haystack.to_ascii_lowercase();
    let raw = term.trim().to_ascii_lowercase();
    if raw.is_empty() {
        return false;
    }
    let bytes = lower.as_bytes();
    let mut from = 0;
    while let Some(rel) = lower[from..].find(&raw) {
        let start = from + rel;
        let end = start + raw.len();
        let left_ok = start == 0 || !is_word_byte(bytes[start - 1]);
        let right_ok = end >= bytes.len() || !is_word_byte(bytes[end]);
        if left_ok && right_ok {
            return true;
        }
        // Advance past the first char of the match, staying on a char
        // boundary for non-ASCII haystacks.
        let step = lower[start..].chars().next().map_or(1, char::len_utf8);
        from = start + step;
    }
    false
}

// =============================================================================
// Phrase Matching
// =============================================================================

/// Phrase match: the reduced phrase must appear as a contiguous substring
/// of the reduced haystack, with a whitespace-collapse-only fallback.
fn phrase_matches(phrase: &str, haystack: &str) -> bool {
    let needle = reduce(phrase);
    if needle.is_empty() {
        return false;
    }
    if reduce(haystack).contains(&needle) {
        return true;
    }
    collapse_whitespace(haystack).contains(&collapse_whitespace(phrase))
}

// =============================================================================
// Public API
// =============================================================================

/// Does `term` match anywhere in `text`?
///
/// Terms containing whitespace are phrases; everything else is a single
/// word.
pub fn term_matches(term: &str, text: &str) -> bool {
    let trimmed = term.trim();
    if trimmed.is_empty() {
        return false;
    }
    if trimmed.split_whitespace().nth(1).is_some() {
        phrase_matches(trimmed, text)
    } else {
        word_matches(trimmed, text)
    }
}

/// Where a banned term was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextField {
    Title,
    Body,
}

/// A banned term found in page text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermHit<'a> {
    pub term: &'a str,
    pub field: TextField,
}

/// Scan title and body for the first matching term. Short-circuits on the
/// first hit; no attempt is made to find all matches.
pub fn scan<'a, I>(terms: I, title: &str, body: &str) -> Option<TermHit<'a>>
where
    I: IntoIterator<Item = &'a str>,
{
    for term in terms {
        if term_matches(term, title) {
            return Some(TermHit {
                term,
                field: TextField::Title,
            });
        }
        if term_matches(term, body) {
            return Some(TermHit {
                term,
                field: TextField::Body,
            });
        }
    }
    None
}
