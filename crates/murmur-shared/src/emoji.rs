//! Single-emoji validation for reactions.
//!
//! A reaction must be exactly one emoji grapheme. That covers plain pictographs,
//! skin-tone and presentation modifiers, ZWJ sequences (family, profession),
//! keycaps and flag pairs.

use crate::error::ReactionError;

const ZWJ: char = '\u{200D}';
const VS15: char = '\u{FE0E}';
const VS16: char = '\u{FE0F}';
const KEYCAP: char = '\u{20E3}';

fn is_pictograph(c: char) -> bool {
    matches!(c as u32,
        0x00A9 | 0x00AE | 0x203C | 0x2049 | 0x2122 | 0x2139
        | 0x2194..=0x2199 | 0x21A9..=0x21AA
        | 0x231A..=0x231B | 0x2328 | 0x23CF | 0x23E9..=0x23F3 | 0x23F8..=0x23FA
        | 0x24C2 | 0x25AA..=0x25AB | 0x25B6 | 0x25C0 | 0x25FB..=0x25FE
        | 0x2600..=0x27BF
        | 0x2934..=0x2935 | 0x2B05..=0x2B07 | 0x2B1B..=0x2B1C | 0x2B50 | 0x2B55
        | 0x3030 | 0x303D | 0x3297 | 0x3299
        | 0x1F000..=0x1F0FF
        | 0x1F10D..=0x1F1AD
        | 0x1F200..=0x1F2FF
        | 0x1F300..=0x1F5FF
        | 0x1F600..=0x1F64F
        | 0x1F680..=0x1F6FF
        | 0x1F7E0..=0x1F7FF
        | 0x1F900..=0x1F9FF
        | 0x1FA70..=0x1FAFF
    )
}

fn is_skin_tone(c: char) -> bool {
    ('\u{1F3FB}'..='\u{1F3FF}').contains(&c)
}

fn is_regional_indicator(c: char) -> bool {
    ('\u{1F1E6}'..='\u{1F1FF}').contains(&c)
}

fn is_tag(c: char) -> bool {
    ('\u{E0020}'..='\u{E007F}').contains(&c)
}

fn is_keycap_base(c: char) -> bool {
    c.is_ascii_digit() || c == '#' || c == '*'
}

/// Length in chars of one emoji element starting at `chars[0]`, including any
/// trailing modifiers. `Err` when `chars[0]` cannot start an emoji.
fn element_len(chars: &[char]) -> Result<usize, ReactionError> {
    let first = chars[0];
    let mut i = 1;

    if is_regional_indicator(first) {
        return match chars.get(1) {
            Some(c) if is_regional_indicator(*c) => Ok(2),
            _ => Err(ReactionError::NotEmoji(first)),
        };
    }

    if is_keycap_base(first) {
        if chars.get(i) == Some(&VS16) {
            i += 1;
        }
        return match chars.get(i) {
            Some(&KEYCAP) => Ok(i + 1),
            _ => Err(ReactionError::NotEmoji(first)),
        };
    }

    if !is_pictograph(first) {
        return Err(ReactionError::NotEmoji(first));
    }

    while let Some(&c) = chars.get(i) {
        if c == VS15 || c == VS16 || is_skin_tone(c) || is_tag(c) {
            i += 1;
        } else {
            break;
        }
    }
    Ok(i)
}

/// Count the emoji graphemes in `s`, failing on the first non-emoji char.
fn count_emoji(s: &str) -> Result<usize, ReactionError> {
    let chars: Vec<char> = s.chars().collect();
    let mut count = 0;
    let mut i = 0;

    while i < chars.len() {
        i += element_len(&chars[i..])?;
        // Joined elements belong to the same grapheme
        while chars.get(i) == Some(&ZWJ) {
            match chars.get(i + 1) {
                Some(_) => i += 1 + element_len(&chars[i + 1..])?,
                None => return Err(ReactionError::NotEmoji(ZWJ)),
            }
        }
        count += 1;
    }
    Ok(count)
}

/// Accepts `reaction` only if it is exactly one emoji.
pub fn validate_reaction(reaction: &str) -> Result<(), ReactionError> {
    if reaction.is_empty() {
        return Err(ReactionError::Empty);
    }
    match count_emoji(reaction)? {
        1 => Ok(()),
        n => Err(ReactionError::TooManyCharacters(n)),
    }
}
