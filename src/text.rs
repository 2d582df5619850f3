// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! String helpers: emoji filtering and hex encoding.

use std::ops::RangeInclusive;

/// Decides whether the renderer can draw a pictographic character.
pub trait EmojiSupport: Send + Sync {
    fn supports(&self, c: char) -> bool;
}

/// Code points that are drawn as pictographs when present.
const PICTOGRAPHIC_RANGES: [RangeInclusive<u32>; 6] = [
    0x2190..=0x21FF,
    0x2300..=0x23FF,
    0x25A0..=0x27BF,
    0x2900..=0x297F,
    0x2B00..=0x2BFF,
    0x1F000..=0x1FFFF,
];

/// Emoji blocks covered by the bundled emoji font.
const SUPPORTED_RANGES: [RangeInclusive<u32>; 12] = [
    0x2190..=0x21FF,
    0x2300..=0x23FF,
    0x25A0..=0x25FF,
    0x2600..=0x27BF,
    0x2900..=0x297F,
    0x2B00..=0x2BFF,
    0x1F000..=0x1F2FF,
    0x1F300..=0x1F5FF,
    0x1F600..=0x1F64F,
    0x1F680..=0x1F6FF,
    0x1F900..=0x1F9FF,
    0x1F1E6..=0x1F1FF,
];

/// Range-table emoji coverage.
///
/// Characters outside the pictographic blocks (letters, digits, joiners,
/// variation selectors, keycap combiners) are always supported.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultEmojiSupport;

impl EmojiSupport for DefaultEmojiSupport {
    fn supports(&self, c: char) -> bool {
        let cp = c as u32;
        if !PICTOGRAPHIC_RANGES.iter().any(|r| r.contains(&cp)) {
            return true;
        }
        SUPPORTED_RANGES.iter().any(|r| r.contains(&cp))
    }
}

pub fn contains_unsupported_emoji(s: &str, support: &dyn EmojiSupport) -> bool {
    s.chars().any(|c| !support.supports(c))
}

pub fn strip_unsupported_emoji(s: &str, support: &dyn EmojiSupport) -> String {
    s.chars().filter(|&c| support.supports(c)).collect()
}

/// Uppercase hex, two digits per byte. Used for device push tokens.
pub fn hex_string(bytes: &[u8]) -> String {
    hex::encode_upper(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NothingSupported;

    impl EmojiSupport for NothingSupported {
        fn supports(&self, c: char) -> bool {
            c.is_ascii()
        }
    }

    #[test]
    fn test_default_support() {
        let support = DefaultEmojiSupport;
        assert!(!contains_unsupported_emoji("🚲 Bike Ride ☀️ 👍🏽", &support));
        assert!(!contains_unsupported_emoji("🇺🇸 1️⃣", &support));
        assert!(contains_unsupported_emoji("🩰", &support));
        assert!(contains_unsupported_emoji("ok 🟠", &support));
    }

    #[test]
    fn test_strip_unsupported_emoji() {
        let support = DefaultEmojiSupport;
        assert_eq!(strip_unsupported_emoji("🩰 dance 🎉", &support), " dance 🎉");
        assert_eq!(strip_unsupported_emoji("🎉 party", &NothingSupported), " party");
    }

    #[test]
    fn test_hex_string() {
        assert_eq!(hex_string(&[0x00, 0x0f, 0xab, 0xff]), "000FABFF");
        assert_eq!(hex_string(&[]), "");
    }
}
