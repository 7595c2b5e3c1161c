//! Input validation and normalisation utilities

use regex::Regex;
use std::sync::OnceLock;

/// Longest emoji sequence, in chars, tried when aliasing
const MAX_EMOJI_CHARS: usize = 10;

/// Blank means empty or whitespace only
pub fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

/// Whether the value looks like a mainland China mobile number
pub fn is_mobile(value: &str) -> bool {
    static MOBILE_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = MOBILE_REGEX
        .get_or_init(|| Regex::new(r"^1[3-9]\d{9}$").expect("Failed to compile mobile regex"));

    regex.is_match(value)
}

/// Normalise a provider nickname for storage.
///
/// Absent or blank names become an empty string. Emoji are replaced by their
/// `:shortcode:` alias so the value fits columns without 4-byte UTF-8 support.
pub fn sanitize_nickname(nick_name: Option<&str>) -> String {
    match nick_name {
        Some(name) if !is_blank(name) => emoji_to_alias(name),
        _ => String::new(),
    }
}

/// Alias suffix for a Fitzpatrick skin tone modifier
fn skin_tone_alias(c: char) -> Option<&'static str> {
    match c {
        '\u{1F3FB}' => Some("type_1_2"),
        '\u{1F3FC}' => Some("type_3"),
        '\u{1F3FD}' => Some("type_4"),
        '\u{1F3FE}' => Some("type_5"),
        '\u{1F3FF}' => Some("type_6"),
        _ => None,
    }
}

/// Variation selector or combining keycap following an ASCII keycap base
fn starts_keycap(c: char) -> bool {
    matches!(c, '\u{FE0F}' | '\u{20E3}')
}

fn emoji_to_alias(text: &str) -> String {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let end_of = |i: usize| chars.get(i).map_or(text.len(), |(offset, _)| *offset);

    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < chars.len() {
        let (start, first) = chars[i];

        if first.is_ascii() && !chars.get(i + 1).is_some_and(|(_, next)| starts_keycap(*next)) {
            out.push(first);
            i += 1;
            continue;
        }

        // Longest match first so ZWJ, flag and keycap sequences win over
        // their parts. Skin tones are matched separately below.
        let longest = MAX_EMOJI_CHARS.min(chars.len() - i);
        let matched = (1..=longest).rev().find_map(|len| {
            if chars[i..i + len]
                .iter()
                .any(|(_, c)| skin_tone_alias(*c).is_some())
            {
                return None;
            }
            emojis::get(&text[start..end_of(i + len)])
                .and_then(|emoji| emoji.shortcode())
                .map(|shortcode| (len, shortcode))
        });

        match matched {
            Some((len, shortcode)) => {
                i += len;
                out.push(':');
                out.push_str(shortcode);
                if let Some(tone) = chars.get(i).and_then(|(_, c)| skin_tone_alias(*c)) {
                    out.push('|');
                    out.push_str(tone);
                    i += 1;
                }
                out.push(':');
            }
            // A modifier without a base emoji carries nothing worth keeping.
            None if skin_tone_alias(first).is_some() => i += 1,
            None => {
                out.push(first);
                i += 1;
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_mobile() {
        assert!(is_mobile("13800000000"));
        assert!(is_mobile("19912345678"));
        assert!(!is_mobile("12800000000"));
        assert!(!is_mobile("1380000000"));
        assert!(!is_mobile("138000000001"));
        assert!(!is_mobile("not-a-phone"));
        assert!(!is_mobile(""));
    }

    #[test]
    fn test_is_blank() {
        assert!(is_blank(""));
        assert!(is_blank(" \t\n"));
        assert!(!is_blank(" a "));
    }

    #[test]
    fn test_sanitize_nickname_blank() {
        assert_eq!(sanitize_nickname(None), "");
        assert_eq!(sanitize_nickname(Some("   ")), "");
    }

    #[test]
    fn test_sanitize_nickname_keeps_plain_text() {
        assert_eq!(sanitize_nickname(Some("Bob")), "Bob");
        assert_eq!(sanitize_nickname(Some("小明")), "小明");
    }

    #[test]
    fn test_sanitize_nickname_aliases_emoji() {
        assert_eq!(sanitize_nickname(Some("Bob😄")), "Bob:smile:");
        assert_eq!(sanitize_nickname(Some("😄 hi 😄")), ":smile: hi :smile:");
    }

    #[test]
    fn test_sanitize_nickname_aliases_skin_tones() {
        assert_eq!(sanitize_nickname(Some("👍🏽")), ":+1|type_4:");
        assert_eq!(sanitize_nickname(Some("ok👍🏻!")), "ok:+1|type_1_2:!");
        assert_eq!(sanitize_nickname(Some("a🏽b")), "ab");
    }

    #[test]
    fn test_sanitize_nickname_aliases_keycaps() {
        assert_eq!(sanitize_nickname(Some("1\u{FE0F}\u{20E3}")), ":one:");
        assert_eq!(sanitize_nickname(Some("#\u{FE0F}\u{20E3} 1")), ":hash: 1");
        assert_eq!(sanitize_nickname(Some("a1b#")), "a1b#");
    }
}
