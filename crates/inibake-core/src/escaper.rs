//! Literal ↔ token escaping for values stored in `key=value` lines.
//!
//! | Literal | Token |
//! |---------|-------|
//! | `#`     | `##`  |
//! | `,`     | `#$c` |
//! | `%`     | `#$p` |
//! | `"`     | `#$q` |
//! | space   | `#$s` |
//! | tab     | `#$t` |
//! | CRLF    | `#$x` |
//!
//! Spaces are only escaped in *full* mode and `%` only in *percent* mode.
//! Registry helpers at the bottom of this module are pure codecs with no
//! engine state.
//!
//! # Example
//!
//! ```
//! use inibake_core::escaper::{escape, unescape};
//!
//! assert_eq!(escape("a,b", false, false), "a#$cb");
//! assert_eq!(unescape("a#$cb", false, false), "a,b");
//! ```

use crate::error::ScriptError;

/// Separator between items of a packed multi-string value.
pub const MULTI_STRING_SEPARATOR: &str = "#$z";

/// Escapes `text` so it survives operand splitting and INI storage.
pub fn escape(text: &str, full: bool, percent: bool) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '#' => out.push_str("##"),
            ',' => out.push_str("#$c"),
            '"' => out.push_str("#$q"),
            '\t' => out.push_str("#$t"),
            '\r' if chars.peek() == Some(&'\n') => {
                chars.next();
                out.push_str("#$x");
            }
            ' ' if full => out.push_str("#$s"),
            '%' if percent => out.push_str("#$p"),
            _ => out.push(c),
        }
    }
    out
}

/// Reverses [`escape`] for the same flags.
///
/// Unknown `#$?` sequences are left as they are.
pub fn unescape(text: &str, full: bool, percent: bool) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '#' {
            out.push(c);
            continue;
        }
        match chars.peek().copied() {
            Some('#') => {
                chars.next();
                out.push('#');
            }
            Some('$') => {
                chars.next();
                let replacement = match chars.peek().map(|c| c.to_ascii_lowercase()) {
                    Some('c') => Some(","),
                    Some('q') => Some("\""),
                    Some('t') => Some("\t"),
                    Some('x') => Some("\r\n"),
                    Some('s') if full => Some(" "),
                    Some('p') if percent => Some("%"),
                    _ => None,
                };
                match replacement {
                    Some(s) => {
                        chars.next();
                        out.push_str(s);
                    }
                    None => out.push_str("#$"),
                }
            }
            _ => out.push('#'),
        }
    }
    out
}

/// Escapes `text` and wraps it in double quotes when it still contains
/// characters the operand splitter would act on.
pub fn quote_escape(text: &str, full: bool, percent: bool) -> String {
    let escaped = escape(text, full, percent);
    if escaped.contains([' ', ',', '%']) {
        format!("\"{}\"", escaped)
    } else {
        escaped
    }
}

/// Wraps an operand in quotes if it would not survive splitting as-is.
///
/// Used when rebuilding source text from already-split operands.
pub fn quote_operand(operand: &str) -> String {
    if operand.is_empty() || operand.contains([',', ' ', '\t']) {
        format!("\"{}\"", operand)
    } else {
        operand.to_string()
    }
}

/// Packs bytes as uppercase hex pairs, e.g. `0A,FF`.
///
/// With `escape` set the separator is `#$c` so the result can be used as a
/// single operand.
pub fn pack_reg_binary(bytes: &[u8], escape: bool) -> String {
    let separator = if escape { "#$c" } else { "," };
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(separator)
}

/// Parses hex pairs separated by `,` or `#$c`.
pub fn unpack_reg_binary(packed: &str) -> Result<Vec<u8>, ScriptError> {
    let normalized = packed.replace("#$c", ",").replace("#$C", ",");
    if normalized.trim().is_empty() {
        return Ok(Vec::new());
    }
    normalized
        .split(',')
        .map(|pair| {
            let pair = pair.trim();
            if pair.len() != 2 {
                return Err(ScriptError::execution(format!(
                    "[{}] is not a valid binary byte",
                    pair
                )));
            }
            u8::from_str_radix(pair, 16).map_err(|_| {
                ScriptError::execution(format!("[{}] is not a valid binary byte", pair))
            })
        })
        .collect()
}

/// Joins multi-string items with [`MULTI_STRING_SEPARATOR`].
pub fn pack_reg_multi_string<S: AsRef<str>>(items: &[S]) -> String {
    items
        .iter()
        .map(|s| s.as_ref())
        .collect::<Vec<_>>()
        .join(MULTI_STRING_SEPARATOR)
}

/// Splits a packed multi-string back into items.
pub fn unpack_reg_multi_string(packed: &str) -> Vec<String> {
    packed
        .split(MULTI_STRING_SEPARATOR)
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_comma_in_normal_mode() {
        assert_eq!(escape("a,b", false, false), "a#$cb");
        assert_eq!(unescape("a#$cb", false, false), "a,b");
    }

    #[test]
    fn escape_sharp_first() {
        assert_eq!(escape("#$c", false, false), "##$c");
        assert_eq!(unescape("##$c", false, false), "#$c");
    }

    #[test]
    fn full_mode_escapes_spaces() {
        assert_eq!(escape("a b", false, false), "a b");
        assert_eq!(escape("a b", true, false), "a#$sb");
        assert_eq!(unescape("a#$sb", true, false), "a b");
    }

    #[test]
    fn percent_mode_escapes_percent() {
        assert_eq!(escape("%A%", false, false), "%A%");
        assert_eq!(escape("%A%", false, true), "#$pA#$p");
        assert_eq!(unescape("#$pA#$p", false, true), "%A%");
        assert_eq!(unescape("#$pA#$p", false, false), "#$pA#$p");
    }

    #[test]
    fn crlf_and_tab() {
        assert_eq!(escape("a\r\nb\tc", false, false), "a#$xb#$tc");
        assert_eq!(unescape("a#$xb#$tc", false, false), "a\r\nb\tc");
        // A lone CR is not a line break token.
        assert_eq!(escape("a\rb", false, false), "a\rb");
    }

    #[test]
    fn unescape_is_case_insensitive_on_token_letter() {
        assert_eq!(unescape("#$Q#$C", false, false), "\",");
    }

    #[test]
    fn unknown_sequences_pass_through() {
        assert_eq!(unescape("#$z", true, true), "#$z");
        assert_eq!(unescape("#1", true, true), "#1");
        assert_eq!(unescape("end#", true, true), "end#");
        assert_eq!(unescape("end#$", true, true), "end#$");
    }

    #[test]
    fn quote_escape_wraps_when_needed() {
        assert_eq!(quote_escape("plain", false, false), "plain");
        assert_eq!(quote_escape("two words", false, false), "\"two words\"");
        assert_eq!(quote_escape("50%", false, false), "\"50%\"");
        assert_eq!(quote_escape("50%", false, true), "50#$p");
        assert_eq!(quote_escape("a,b", false, false), "a#$cb");
    }

    #[test]
    fn quote_operand_rebuilds_source() {
        assert_eq!(quote_operand("Echo"), "Echo");
        assert_eq!(quote_operand("a b"), "\"a b\"");
        assert_eq!(quote_operand(""), "\"\"");
    }

    #[test]
    fn reg_binary_packing() {
        let bytes = [0x00, 0x0A, 0xFF];
        assert_eq!(pack_reg_binary(&bytes, false), "00,0A,FF");
        assert_eq!(pack_reg_binary(&bytes, true), "00#$c0A#$cFF");
        assert_eq!(unpack_reg_binary("00,0A,FF").unwrap(), bytes);
        assert_eq!(unpack_reg_binary("00#$c0a#$cff").unwrap(), bytes);
        assert!(unpack_reg_binary("").unwrap().is_empty());
        assert!(unpack_reg_binary("0G").is_err());
        assert!(unpack_reg_binary("123").is_err());
    }

    #[test]
    fn reg_multi_string_packing() {
        let items = vec!["C:\\Windows".to_string(), "Temp".to_string()];
        let packed = pack_reg_multi_string(&items);
        assert_eq!(packed, "C:\\Windows#$zTemp");
        assert_eq!(unpack_reg_multi_string(&packed), items);
    }
}
