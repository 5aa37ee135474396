//! Input restriction rules applied to text before it enters the document.

/// Rewrites text about to be inserted, given the chars adjacent to the
/// insertion point within the same block. Returning the input unchanged is
/// always valid.
pub trait TextRestrictRule: Send + Sync {
    fn restrict(&self, text: &str, left: &str, right: &str) -> String;
}

/// Coarse char classes driving the spacing rule. Only transitions between
/// classes matter, never the concrete chars.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CharClass {
    /// No char (start/end of context).
    Null,
    Space,
    /// CJK and other caseless scripts, plus symbols.
    Normal,
    Digit,
    /// Latin and other cased letters, plus ASCII punctuation that binds
    /// to them.
    Alpha,
    LatinPunct,
    FullwidthPunct,
}

fn classify(c: char) -> CharClass {
    use CharClass::*;
    if c.is_whitespace() {
        return Space;
    }
    if c.is_ascii() {
        return match c {
            ',' | '?' | '!' | '.' => LatinPunct,
            '0'..='9' => Digit,
            '$' | '+' | '<' | '=' | '>' | '^' | '`' | '|' | '~' => Normal,
            _ => Alpha,
        };
    }
    if c.is_uppercase() || c.is_lowercase() {
        Alpha
    } else if c.is_alphabetic() {
        Normal
    } else if c.is_numeric() {
        Digit
    } else {
        FullwidthPunct
    }
}

/// Emit `c`'s contribution given the classes of its neighbors: a typed
/// space survives only between word-ish runs or after Latin punctuation,
/// word chars pick up a separating space against the run they follow, and
/// an ideograph also claims one against a following word char. A word char
/// never claims a space against a *following* ideograph here; that space
/// arrives when the ideograph itself is processed, so typing a word one
/// key at a time does not grow a space after every keystroke.
fn emit_windowed(c1: CharClass, c: char, c3: CharClass, out: &mut String) {
    use CharClass::*;
    match classify(c) {
        Space => {
            let keep = (matches!(c1, Digit | Alpha) && matches!(c3, Digit | Alpha | Null | Normal))
                || (c1 == LatinPunct && c3 != LatinPunct);
            if keep {
                out.push(' ');
            }
        }
        Digit | Alpha => {
            if matches!(c1, LatinPunct | Normal) {
                out.push(' ');
            }
            out.push(c);
        }
        Normal => {
            if matches!(c1, LatinPunct | Digit | Alpha) {
                out.push(' ');
            }
            out.push(c);
            if matches!(c3, Digit | Alpha) {
                out.push(' ');
            }
        }
        LatinPunct => {
            out.push(c);
            if !matches!(c3, Null | Space | LatinPunct | FullwidthPunct) {
                out.push(' ');
            }
        }
        FullwidthPunct => out.push(c),
        Null => {}
    }
}

/// Keeps one ASCII space between adjacent CJK and Latin/digit runs and
/// collapses redundant spaces around them.
///
/// Each input char is judged in a 3-char window: the last *emitted* char
/// (seeded from the left context), the char itself, and the next input
/// char (the right context's first char for the last one). Feeding the
/// emitted side back in makes the rewrite idempotent.
#[derive(Debug, Default)]
pub struct CjkSpacingRule;

impl TextRestrictRule for CjkSpacingRule {
    fn restrict(&self, text: &str, left: &str, right: &str) -> String {
        if text.is_empty() {
            return String::new();
        }
        let bound = right.chars().next().map_or(CharClass::Null, classify);
        let mut out = String::with_capacity(text.len() + 2);
        let mut prev = left.chars().next_back().map_or(CharClass::Null, classify);
        let mut iter = text.chars().peekable();
        while let Some(c) = iter.next() {
            let next = iter.peek().map_or(bound, |&n| classify(n));
            emit_windowed(prev, c, next, &mut out);
            prev = out.chars().next_back().map_or(CharClass::Null, classify);
        }
        out
    }
}
