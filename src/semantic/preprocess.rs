//! Text preprocessing shared by the embedding tiers and the keyword index.
//!
//! - `tokenize`: lower-case, split on non-alphanumeric, drop tokens of 2 chars or fewer
//! - `words`: same split without the length filter (word-vector lookup)
//! - `truncate_chars`: char-safe prefix used to bound long fields
//! - `join_field`: collapse a list field (keywords, people) into one text blob

/// Tokens of this many characters or fewer carry no signal.
const MIN_TOKEN_CHARS: usize = 2;

/// Separator used when a list field is embedded as a single text.
pub const FIELD_SEPARATOR: &str = ", ";

/// Tokenize text for hashing, keyword indexing and hybrid queries.
pub fn tokenize(text: &str) -> Vec<String> {
    words(text)
        .into_iter()
        .filter(|token| token.chars().count() > MIN_TOKEN_CHARS)
        .collect()
}

/// Split text into lower-cased words without dropping short ones.
pub fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_lowercase())
        .collect()
}

/// Take at most `max_chars` characters, never splitting a UTF-8 sequence.
pub fn truncate_chars(content: &str, max_chars: usize) -> &str {
    match content.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &content[..byte_idx],
        None => content,
    }
}

/// Join the non-blank items of a list field. Returns `None` when nothing is left.
pub fn join_field(items: &[String]) -> Option<String> {
    let parts: Vec<&str> = items
        .iter()
        .map(|item| item.trim())
        .filter(|item| !item.is_empty())
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(FIELD_SEPARATOR))
    }
}
