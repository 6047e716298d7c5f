pub const DEFAULT_SEPARATOR: &str = "[SEP]";

/// Split a protocol into sequences on a literal separator.
/// Pieces are trimmed and empty pieces dropped; an empty separator keeps the text whole.
pub fn split_sequences(text: &str, separator: &str) -> Vec<String> {
    if separator.is_empty() {
        let whole = text.trim();
        return if whole.is_empty() {
            Vec::new()
        } else {
            vec![whole.to_string()]
        };
    }

    text.split(separator)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
