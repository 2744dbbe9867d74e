//! Splitting a leading JSON object off a literal run

use serde_json::Value;

/// Outcome of looking for a result payload at the start of a literal
#[derive(Debug, PartialEq)]
pub(crate) enum Attachment<'a> {
    /// A complete object was parsed; `rest` is the prose after it
    Attached { value: Value, rest: &'a str },
    /// An object has started but its braces are not balanced yet
    Pending,
    /// No usable object; the literal is plain prose
    Rejected,
}

/// Byte offset just past the `}` that closes the object opening at `s[0]`.
///
/// Braces inside string literals (including escaped quotes) are ignored.
/// Returns `None` when the input ends before the object closes.
fn balanced_object_end(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in s.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i + c.len_utf8());
                }
            }
            _ => {}
        }
    }
    None
}

/// Try to split a JSON object off the front of `literal`.
///
/// `at_end` says whether this literal is the last thing in the text; only then
/// can an unbalanced object still be completed by text that has not arrived.
pub(crate) fn split_leading_json(literal: &str, at_end: bool) -> Attachment<'_> {
    let trimmed = literal.trim_start();
    if !trimmed.starts_with('{') {
        return Attachment::Rejected;
    }

    let Some(end) = balanced_object_end(trimmed) else {
        return if at_end {
            Attachment::Pending
        } else {
            Attachment::Rejected
        };
    };

    match serde_json::from_str::<Value>(&trimmed[..end]) {
        Ok(value) if value.is_object() => Attachment::Attached {
            value,
            rest: trimmed[end..].trim_start(),
        },
        Ok(_) => Attachment::Rejected,
        Err(e) => {
            tracing::debug!("tool result payload is not valid JSON: {}", e);
            Attachment::Rejected
        }
    }
}
