use unicode_normalization::UnicodeNormalization;

const COMBINING_MARKS: std::ops::RangeInclusive<char> = '\u{0300}'..='\u{036f}';

/// Canonical form used for ids, prefix matching and route tokens.
///
/// Lower-cases, decomposes to NFD and drops the combining diacritical marks
/// block, so `"Çelës"` and `"celes"` compare equal.
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
        .nfd()
        .filter(|ch| !COMBINING_MARKS.contains(ch))
        // Dropping U+034F can merge two mark runs; reorder them once more.
        .nfd()
        .collect()
}

/// First character of the canonical form, if any.
pub fn first_letter(text: &str) -> Option<char> {
    normalize(text).chars().next()
}
