//! Structural scanning for shell expressions
//!
//! Everything here works on raw text with a small state machine that tracks
//! string literals and bracket depth. Nothing is evaluated.

use crate::error::{ParseError, Result};

/// Quote and nesting state while walking a command
#[derive(Debug, Default)]
pub(crate) struct ScanState {
    quote: Option<char>,
    escaped: bool,
    depth: i32,
}

impl ScanState {
    /// Advance over `ch`
    ///
    /// # Returns
    /// * `bool` - `true` if `ch` is structural, i.e. outside any string literal
    ///   and not itself a quote delimiter
    pub(crate) fn step(&mut self, ch: char) -> bool {
        if let Some(q) = self.quote {
            if self.escaped {
                self.escaped = false;
            } else if ch == '\\' {
                self.escaped = true;
            } else if ch == q {
                self.quote = None;
            }
            return false;
        }

        match ch {
            '"' | '\'' => {
                self.quote = Some(ch);
                false
            }
            '(' | '{' | '[' => {
                self.depth += 1;
                true
            }
            ')' | '}' | ']' => {
                self.depth -= 1;
                true
            }
            _ => true,
        }
    }

    pub(crate) fn depth(&self) -> i32 {
        self.depth
    }

    pub(crate) fn in_string(&self) -> bool {
        self.quote.is_some()
    }
}

/// Trim, drop one trailing `;` and collapse whitespace runs outside string literals
pub fn normalize(command: &str) -> String {
    let trimmed = command.trim();
    let trimmed = trimmed.strip_suffix(';').unwrap_or(trimmed).trim_end();

    let mut out = String::with_capacity(trimmed.len());
    let mut state = ScanState::default();
    let mut pending_space = false;

    for ch in trimmed.chars() {
        let structural = state.step(ch);
        if structural && ch.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        out.push(ch);
    }

    out
}

/// Split `a(..).b(..).c(..)` into its method call fragments
///
/// A fragment ends at the `)` that brings nesting back to zero outside a
/// string. Fragments must be joined by `.`; anything else is an error.
pub fn split_chain(text: &str) -> Result<Vec<String>> {
    let mut fragments = Vec::new();
    let mut state = ScanState::default();
    let mut start = 0usize;
    let mut expect_dot = false;
    let mut opened = false;

    for (idx, ch) in text.char_indices() {
        if expect_dot {
            if ch.is_whitespace() {
                continue;
            }
            if ch == '.' {
                expect_dot = false;
                start = idx + 1;
                continue;
            }
            return Err(ParseError::InvalidMethodCall(text[idx..].to_string()).into());
        }

        let structural = state.step(ch);
        if !structural {
            continue;
        }
        if state.depth() < 0 {
            return Err(ParseError::UnbalancedDelimiters(text.to_string()).into());
        }
        if ch == '(' {
            opened = true;
        }
        if ch == ')' && state.depth() == 0 && opened {
            fragments.push(text[start..=idx].trim().to_string());
            expect_dot = true;
            opened = false;
        }
    }

    if state.in_string() || state.depth() != 0 {
        return Err(ParseError::UnbalancedDelimiters(text.to_string()).into());
    }
    if !expect_dot {
        let rest = text[start..].trim();
        let offending = if rest.is_empty() { text } else { rest };
        return Err(ParseError::InvalidMethodCall(offending.to_string()).into());
    }

    Ok(fragments)
}

/// Split `name(inner)` into `("name", "inner")`
pub fn parse_method_call(fragment: &str) -> Result<(String, String)> {
    let fragment = fragment.trim();
    let invalid = || ParseError::InvalidMethodCall(fragment.to_string());

    let open = fragment.find('(').ok_or_else(invalid)?;
    let inner = fragment[open + 1..].strip_suffix(')').ok_or_else(invalid)?;
    let name = fragment[..open].trim();

    if name.is_empty() || !name.chars().all(is_identifier_char) {
        return Err(invalid().into());
    }

    Ok((name.to_string(), inner.to_string()))
}

/// Split an argument list on top-level commas
///
/// Commas inside strings or nested `{}`/`[]`/`()` do not split. Blank input
/// gives no arguments and a trailing comma is ignored.
pub fn split_args(inner: &str) -> Result<Vec<String>> {
    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut args = Vec::new();
    let mut state = ScanState::default();
    let mut start = 0usize;

    for (idx, ch) in inner.char_indices() {
        let structural = state.step(ch);
        if structural && state.depth() < 0 {
            return Err(ParseError::UnbalancedDelimiters(inner.to_string()).into());
        }
        if structural && ch == ',' && state.depth() == 0 {
            args.push(inner[start..idx].trim().to_string());
            start = idx + 1;
        }
    }

    if state.in_string() || state.depth() != 0 {
        return Err(ParseError::UnbalancedDelimiters(inner.to_string()).into());
    }

    let last = inner[start..].trim();
    if !last.is_empty() {
        args.push(last.to_string());
    }

    if args.iter().any(String::is_empty) {
        return Err(ParseError::InvalidLiteral {
            literal: inner.to_string(),
            reason: "empty argument".to_string(),
        }
        .into());
    }

    Ok(args)
}

pub(crate) fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}
