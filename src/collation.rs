//! Albanian alphabet ordering at base sensitivity.
//!
//! Digraphs (`dh`, `gj`, `ll`, `nj`, `rr`, `sh`, `th`, `xh`, `zh`) are single
//! letters, `ç` follows `c` and `ë` follows `e`. Case is ignored at the
//! primary level; ties fall back to the canonical text and then the raw text
//! so that the order is total.

use std::cmp::Ordering;
use std::collections::HashMap;

use once_cell::sync::Lazy;
use unicode_normalization::UnicodeNormalization;

use crate::normalize::normalize;

const ALPHABET: [&str; 36] = [
    "a", "b", "c", "ç", "d", "dh", "e", "ë", "f", "g", "gj", "h", "i", "j", "k", "l", "ll", "m",
    "n", "nj", "o", "p", "q", "r", "rr", "s", "sh", "t", "th", "u", "v", "x", "xh", "y", "z", "zh",
];

const DIGIT_BASE: u32 = 1;
const LETTER_BASE: u32 = 100;
const FOREIGN_BASE: u32 = 1_000;

static LETTER_WEIGHTS: Lazy<HashMap<&'static str, u32>> = Lazy::new(|| {
    ALPHABET
        .iter()
        .enumerate()
        .map(|(idx, letter)| (*letter, LETTER_BASE + idx as u32))
        .collect()
});

/// Precomputed sort key; compare many strings through this instead of
/// [`compare`] to avoid re-deriving weights.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CollationKey {
    primary: Vec<u32>,
    canonical: String,
    raw: String,
}

impl CollationKey {
    pub fn new(text: &str) -> Self {
        Self {
            primary: primary_weights(text),
            canonical: normalize(text),
            raw: text.to_string(),
        }
    }
}

pub fn sort_key(text: &str) -> CollationKey {
    CollationKey::new(text)
}

pub fn compare(a: &str, b: &str) -> Ordering {
    CollationKey::new(a).cmp(&CollationKey::new(b))
}

/// Sorts strings in place by collation order.
pub fn sort_strings(values: &mut [String]) {
    values.sort_by_cached_key(|value| CollationKey::new(value));
}

fn primary_weights(text: &str) -> Vec<u32> {
    let chars: Vec<char> = text.to_lowercase().nfc().collect();
    let mut weights = Vec::with_capacity(chars.len());
    let mut idx = 0;
    while idx < chars.len() {
        if let Some(&next) = chars.get(idx + 1) {
            let pair: String = [chars[idx], next].iter().collect();
            if let Some(&weight) = LETTER_WEIGHTS.get(pair.as_str()) {
                weights.push(weight);
                idx += 2;
                continue;
            }
        }
        if let Some(weight) = char_weight(chars[idx]) {
            weights.push(weight);
        }
        idx += 1;
    }
    weights
}

fn char_weight(ch: char) -> Option<u32> {
    let mut buf = [0u8; 4];
    if let Some(&weight) = LETTER_WEIGHTS.get(&*ch.encode_utf8(&mut buf)) {
        return Some(weight);
    }
    if let Some(digit) = ch.to_digit(10) {
        return Some(DIGIT_BASE + digit);
    }
    if !ch.is_alphanumeric() {
        return None;
    }
    let base = normalize(ch.encode_utf8(&mut buf)).chars().next().unwrap_or(ch);
    let mut base_buf = [0u8; 4];
    match LETTER_WEIGHTS.get(&*base.encode_utf8(&mut base_buf)) {
        Some(&weight) => Some(weight),
        None => Some(FOREIGN_BASE + base as u32),
    }
}
