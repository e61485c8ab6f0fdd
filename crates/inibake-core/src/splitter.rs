//! Quote-aware operand splitting.
//!
//! A code line is a comma separated list: `Opcode,Operand1,Operand2,...`.
//! An operand that starts with `"` runs to the matching closing quote and may
//! contain commas; the quotes are stripped. A doubled `""` inside a quoted
//! operand is kept verbatim. A line whose last operand is a lone `\`
//! continues on the next physical line.

use crate::error::ScriptError;

/// One logical line read from a section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLine {
    Blank,
    Comment(String),
    Code {
        /// Trimmed source text; continuation lines are joined with `\n`.
        raw: String,
        operands: Vec<String>,
    },
}

/// Returns true for lines starting with `//`, `#` or `;`.
pub fn is_comment(line: &str) -> bool {
    line.starts_with("//") || line.starts_with('#') || line.starts_with(';')
}

/// Splits one physical line into operands.
pub fn split_operands(line: &str) -> Result<Vec<String>, ScriptError> {
    if line.matches('"').count() % 2 == 1 {
        return Err(ScriptError::grammar("Double-quote's number should be even").with_raw(line));
    }

    let mut operands = Vec::new();
    let mut remainder = Some(line);
    while let Some(rest) = remainder {
        let (operand, next) = next_operand(rest).map_err(|e| e.with_raw(line))?;
        operands.push(operand);
        remainder = next;
    }
    Ok(operands)
}

fn next_operand(text: &str) -> Result<(String, Option<&str>), ScriptError> {
    let text = text.trim();

    let Some(quoted) = text.strip_prefix('"') else {
        let (token, rest) = match text.find(',') {
            Some(idx) => (&text[..idx], Some(&text[idx + 1..])),
            None => (text, None),
        };
        let token = token.trim();
        if token.contains('"') {
            return Err(ScriptError::grammar(format!(
                "Double-quote must open an operand, found inside [{}]",
                token
            )));
        }
        return Ok((token.to_string(), rest));
    };

    // Locate the closing quote, skipping doubled quotes.
    let mut search_from = 0;
    let close = loop {
        match quoted[search_from..].find('"') {
            None => return Err(ScriptError::grammar("Double-quote's number should be even")),
            Some(offset) => {
                let at = search_from + offset;
                if quoted[at + 1..].starts_with('"') {
                    search_from = at + 2;
                } else {
                    break at;
                }
            }
        }
    };

    let token = quoted[..close].to_string();
    let after = &quoted[close + 1..];
    match after.find(',') {
        None => {
            if !after.trim().is_empty() {
                return Err(ScriptError::grammar(format!(
                    "Syntax error: unexpected [{}] after closing double-quote",
                    after.trim()
                )));
            }
            Ok((token, None))
        }
        Some(idx) => {
            let between = after[..idx].trim();
            if !between.is_empty() {
                return Err(ScriptError::grammar(format!(
                    "Syntax error: unexpected [{}] after closing double-quote",
                    between
                )));
            }
            Ok((token, Some(&after[idx + 1..])))
        }
    }
}

/// Reads the logical line starting at `lines[*idx]`.
///
/// On return `*idx` points at the last physical line consumed, so the
/// caller advances by one to reach the next logical line.
pub fn read_line<S: AsRef<str>>(lines: &[S], idx: &mut usize) -> Result<SourceLine, ScriptError> {
    let mut raw = lines[*idx].as_ref().trim().to_string();
    if raw.is_empty() {
        return Ok(SourceLine::Blank);
    }
    if is_comment(&raw) {
        return Ok(SourceLine::Comment(raw));
    }

    let mut operands = split_operands(&raw)?;
    while operands.last().map(String::as_str) == Some("\\") && raw.ends_with(",\\") {
        if *idx + 1 >= lines.len() {
            return Err(
                ScriptError::grammar("Last command of a section cannot end with '\\'").with_raw(raw),
            );
        }
        let next = lines[*idx + 1].as_ref().trim();
        if next.is_empty() || is_comment(next) {
            return Err(ScriptError::grammar("Valid command should be placed after '\\'").with_raw(raw));
        }
        operands.pop();
        operands.extend(split_operands(next)?);
        raw.push('\n');
        raw.push_str(next);
        *idx += 1;
    }

    Ok(SourceLine::Code { raw, operands })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(line: &str) -> Vec<String> {
        split_operands(line).unwrap()
    }

    #[test]
    fn comment_prefixes() {
        assert!(is_comment("// note"));
        assert!(is_comment("# note"));
        assert!(is_comment("; note"));
        assert!(!is_comment("/path/to/tool,arg"));
        assert!(!is_comment("Echo,// not a comment"));
    }

    #[test]
    fn plain_operands_are_trimmed() {
        assert_eq!(split("Echo, Hello ,World"), vec!["Echo", "Hello", "World"]);
    }

    #[test]
    fn quoted_operand_keeps_commas() {
        assert_eq!(
            split("TXTAddLine,a.txt,\"   Return SetError(@error,0,0)\",Append"),
            vec!["TXTAddLine", "a.txt", "   Return SetError(@error,0,0)", "Append"]
        );
    }

    #[test]
    fn doubled_quotes_are_kept() {
        assert_eq!(split("Echo,\"Hello\"\"World\""), vec!["Echo", "Hello\"\"World"]);
    }

    #[test]
    fn trailing_comma_yields_empty_operand() {
        assert_eq!(split("Echo,"), vec!["Echo", ""]);
        assert_eq!(split("Echo,\"\""), vec!["Echo", ""]);
    }

    #[test]
    fn odd_quote_count_fails_anywhere() {
        assert!(split_operands("\"Echo,a").is_err());
        assert!(split_operands("Echo,\"a").is_err());
        assert!(split_operands("Echo,a,b\"").is_err());
    }

    #[test]
    fn quote_mid_token_fails() {
        let err = split_operands("Echo,ab\"c\"d").unwrap_err();
        assert!(err.is_grammar());
    }

    #[test]
    fn text_after_closing_quote_fails() {
        assert!(split_operands("Echo,\"a\"b,c").is_err());
        assert!(split_operands("Echo,\"a\"  ,c").is_ok());
    }

    #[test]
    fn blank_and_comment_lines() {
        let lines = ["   ", "// note", "# note", "; note"];
        let mut idx = 0;
        assert_eq!(read_line(&lines, &mut idx).unwrap(), SourceLine::Blank);
        for i in 1..lines.len() {
            idx = i;
            assert!(matches!(read_line(&lines, &mut idx).unwrap(), SourceLine::Comment(_)));
        }
    }

    #[test]
    fn continuation_joins_lines() {
        let lines = ["Echo,A,\\", "B,\\", "C", "Echo,D"];
        let mut idx = 0;
        match read_line(&lines, &mut idx).unwrap() {
            SourceLine::Code { raw, operands } => {
                assert_eq!(operands, vec!["Echo", "A", "B", "C"]);
                assert_eq!(raw, "Echo,A,\\\nB,\\\nC");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(idx, 2);
    }

    #[test]
    fn continuation_on_last_line_fails() {
        let lines = ["Echo,A,\\"];
        let mut idx = 0;
        assert!(read_line(&lines, &mut idx).unwrap_err().is_grammar());
    }

    #[test]
    fn continuation_into_comment_fails() {
        let lines = ["Echo,A,\\", "// nope"];
        let mut idx = 0;
        assert!(read_line(&lines, &mut idx).is_err());
    }

    #[test]
    fn quoted_backslash_is_not_continuation() {
        let lines = ["Echo,\"\\\"", "Echo,B"];
        let mut idx = 0;
        match read_line(&lines, &mut idx).unwrap() {
            SourceLine::Code { operands, .. } => assert_eq!(operands, vec!["Echo", "\\"]),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(idx, 0);
    }
}
