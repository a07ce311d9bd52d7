//! Normalizer for the relaxed graph-description dialect.
//!
//! Graph descriptions are commonly written in a relaxed JSON surface:
//! unquoted keys and scalar values, `=` instead of `:`, optional commas, and
//! `#` line comments. [`normalize`] rewrites such text into strict JSON for
//! the serde layer; input that is already strict JSON passes through with
//! the same meaning, and trailing commas are tolerated.
//!
//! ```text
//! nodes = [ { type = builtin  label = mixer } ]        # relaxed
//! "nodes": [ { "type": "builtin", "label": "mixer" } ]
//! ```

use crate::error::GraphError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Last {
    /// Start of input or right after `{`, `[`.
    Opener,
    /// Right after an object key (a `:`/`=` must follow).
    Key,
    /// Right after `:`/`=` (a value must follow).
    Sep,
    /// Right after a complete value or closing bracket.
    Value,
}

/// Rewrites relaxed description text into strict JSON.
pub fn normalize(text: &str) -> Result<String, GraphError> {
    let mut out = String::with_capacity(text.len() + text.len() / 4);
    let mut chars = text.char_indices().peekable();
    let mut stack: Vec<char> = Vec::new();
    let mut last = Last::Opener;

    while let Some((start, c)) = chars.next() {
        match c {
            c if c.is_whitespace() => {}
            '#' => {
                for (_, c) in chars.by_ref() {
                    if c == '\n' {
                        break;
                    }
                }
            }
            '{' | '[' => {
                if last == Last::Value {
                    out.push(',');
                }
                stack.push(c);
                out.push(c);
                last = Last::Opener;
            }
            '}' | ']' => {
                if !matches!(last, Last::Value | Last::Opener) {
                    return Err(GraphError::Description(format!(
                        "missing value before '{c}' at byte {start}"
                    )));
                }
                if stack.pop().map(matching) != Some(c) {
                    return Err(GraphError::Description(format!(
                        "unbalanced '{c}' at byte {start}"
                    )));
                }
                out.push(c);
                last = Last::Value;
            }
            ':' | '=' => {
                if last != Last::Key {
                    return Err(GraphError::Description(format!(
                        "unexpected '{c}' at byte {start}"
                    )));
                }
                out.push(':');
                last = Last::Sep;
            }
            ',' => {
                if last != Last::Value {
                    return Err(GraphError::Description(format!(
                        "unexpected ',' at byte {start}"
                    )));
                }
                // Dropped here; re-emitted in front of the next token.
            }
            '"' => {
                if last == Last::Value {
                    out.push(',');
                }
                let mut literal = String::from('"');
                let mut escaped = false;
                let mut closed = false;
                for (_, c) in chars.by_ref() {
                    literal.push(c);
                    if escaped {
                        escaped = false;
                    } else if c == '\\' {
                        escaped = true;
                    } else if c == '"' {
                        closed = true;
                        break;
                    }
                }
                if !closed {
                    return Err(GraphError::Description("unterminated string".into()));
                }
                out.push_str(&literal);
                last = token_role(&stack, &mut chars);
            }
            _ => {
                // Bare word: runs until whitespace or structure.
                if last == Last::Value {
                    out.push(',');
                }
                let mut word = String::from(c);
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_whitespace()
                        || matches!(c, '{' | '}' | '[' | ']' | ':' | '=' | ',' | '#' | '"')
                    {
                        break;
                    }
                    word.push(c);
                    chars.next();
                }
                out.push_str(&bare_word_to_json(&word));
                last = token_role(&stack, &mut chars);
            }
        }
    }

    if !stack.is_empty() {
        return Err(GraphError::Description("unbalanced brackets".into()));
    }
    Ok(out)
}

fn matching(open: char) -> char {
    if open == '{' {
        '}'
    } else {
        ']'
    }
}

/// Decides whether the token just emitted is an object key or a value.
///
/// Inside an object a token followed by `:` or `=` is a key; everywhere
/// else it is a value. Consumes only whitespace and comments while peeking.
fn token_role(stack: &[char], chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>) -> Last {
    if stack.last() != Some(&'{') {
        return Last::Value;
    }
    loop {
        match chars.peek() {
            Some(&(_, c)) if c.is_whitespace() => {
                chars.next();
            }
            Some(&(_, '#')) => {
                for (_, c) in chars.by_ref() {
                    if c == '\n' {
                        break;
                    }
                }
            }
            Some(&(_, ':')) | Some(&(_, '=')) => return Last::Key,
            _ => return Last::Value,
        }
    }
}

/// Renders a bare word as a strict JSON token.
fn bare_word_to_json(word: &str) -> String {
    match word {
        "true" | "false" | "null" => word.to_owned(),
        _ if serde_json::from_str::<serde_json::Number>(word).is_ok() => word.to_owned(),
        _ => serde_json::to_string(word).expect("string serialization is infallible"),
    }
}
