//! Caller key normalization.

/// Trims, lowercases, and truncates `raw` to at most `max_len` characters.
///
/// Distinct keys that only differ past the truncation point share one counter.
// TODO: decide whether over-long keys should keep a digest of the dropped tail; today unrelated
// callers sharing a long prefix are limited together.
pub fn normalize_key(raw: &str, max_len: usize) -> String {
	raw.trim().to_lowercase().chars().take(max_len).collect()
}
