//! Display-name sanitization.

/// Maximum display-name length, in characters.
pub const NAME_MAX_CHARS: usize = 10;

/// Name used when sanitization leaves nothing.
pub const FALLBACK_NAME: &str = "PLAYER";

/// Trims surrounding whitespace, caps at [`NAME_MAX_CHARS`] characters,
/// and falls back to [`FALLBACK_NAME`] when nothing remains.
///
/// Counts characters rather than bytes so multi-byte names keep their
/// full budget. Idempotent: sanitizing a sanitized name is a no-op.
///
/// ```
/// use crowdstage_core::sanitize_name;
///
/// assert_eq!(sanitize_name("  Alice  "), "Alice");
/// assert_eq!(sanitize_name("0123456789ABC"), "0123456789");
/// assert_eq!(sanitize_name("   "), "PLAYER");
/// ```
#[must_use]
pub fn sanitize_name(raw: &str) -> String {
    let capped: String = raw.trim().chars().take(NAME_MAX_CHARS).collect();
    // Truncation can expose trailing whitespace that was interior before.
    let capped = capped.trim_end();
    if capped.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        capped.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn trims_and_caps() {
        assert_eq!(sanitize_name(" Bob "), "Bob");
        assert_eq!(sanitize_name("exactly10!!"), "exactly10!");
    }

    #[test]
    fn empty_falls_back() {
        assert_eq!(sanitize_name(""), FALLBACK_NAME);
        assert_eq!(sanitize_name(" \t\n"), FALLBACK_NAME);
    }

    #[test]
    fn counts_characters_not_bytes() {
        let name = "あいうえおかきくけこさ"; // 11 chars, 33 bytes
        let out = sanitize_name(name);
        assert_eq!(out.chars().count(), NAME_MAX_CHARS);
    }

    proptest! {
        #[test]
        fn idempotent(raw in ".*") {
            let once = sanitize_name(&raw);
            prop_assert_eq!(sanitize_name(&once), once);
        }

        #[test]
        fn output_length_in_bounds(raw in ".*") {
            let out = sanitize_name(&raw);
            let len = out.chars().count();
            prop_assert!(len >= 1 && len <= NAME_MAX_CHARS);
        }
    }
}
