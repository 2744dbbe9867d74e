//! Directive lexer
//!
//! Grammar: `{% <name>_<action> "<text>" [<integer>] %}`, optionally preceded
//! and followed by one newline. Special tool completions use a single-quoted
//! tool id instead of display text, and the bare keywords `tool_description`,
//! `end_tool_description` and `endtool` delimit the block that follows them.

use regex::Regex;
use std::sync::LazyLock;

static DIRECTIVE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"\n?\{%\s*([A-Za-z][A-Za-z0-9_]*)(?:\s+(?:"((?:[^"\\]|\\.)*)"|'([^']*)'))?(?:\s+(\d+))?\s*%\}\n?"#,
    )
    .expect("directive pattern is valid")
});

/// Anything that can still grow into a directive once more text arrives
static PARTIAL_DIRECTIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^\{%\s*(?:[A-Za-z][A-Za-z0-9_]*(?:\s+(?:"(?:[^"\\]|\\.)*(?:\\|"\s*\d*\s*)?|'[^']*(?:'\s*\d*\s*)?|\d+\s*))?\s*%?)?$"#,
    )
    .expect("partial directive pattern is valid")
});

/// Longest unterminated directive withheld while streaming, in bytes
const MAX_HELD_DIRECTIVE: usize = 512;

/// Lifecycle step named by a directive suffix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Start,
    Progress,
    Complete,
}

impl Action {
    fn split(name: &str) -> Option<(&str, Action)> {
        [
            ("_start", Action::Start),
            ("_progress", Action::Progress),
            ("_complete", Action::Complete),
        ]
        .into_iter()
        .find_map(|(suffix, action)| {
            name.strip_suffix(suffix)
                .filter(|base| !base.is_empty())
                .map(|base| (base, action))
        })
    }
}

/// What a directive instructs the parser to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectiveKind {
    /// One-shot announcement
    Status,
    /// `reasoning_*` or a tool lifecycle step
    Lifecycle { name: String, action: Action },
    /// `tool_description`
    DescriptionOpen,
    /// `end_tool_description`
    DescriptionClose,
    /// `endtool`
    EndTool,
}

/// A single recognized directive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub kind: DirectiveKind,
    /// Display text, unescaped
    pub text: String,
    /// Tool id from the single-quoted form
    pub tool_id: Option<String>,
    /// Trailing integer argument
    pub number: Option<u32>,
}

impl Directive {
    /// Base name for lifecycle directives
    pub fn name(&self) -> Option<&str> {
        match self.kind {
            DirectiveKind::Lifecycle { ref name, .. } => Some(name),
            _ => None,
        }
    }

    fn classify(name: &str) -> Option<DirectiveKind> {
        match name {
            "status" => Some(DirectiveKind::Status),
            "tool_description" => Some(DirectiveKind::DescriptionOpen),
            "end_tool_description" => Some(DirectiveKind::DescriptionClose),
            "endtool" => Some(DirectiveKind::EndTool),
            _ => Action::split(name).map(|(base, action)| DirectiveKind::Lifecycle {
                name: base.to_string(),
                action,
            }),
        }
    }
}

/// A piece of the reply text: prose or a directive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'a> {
    Literal(&'a str),
    Directive(Directive),
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(next @ ('"' | '\\')) => out.push(next),
                Some(next) => {
                    out.push('\\');
                    out.push(next);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Offset of a trailing `{%` that may still become a directive
fn partial_directive_start(tail: &str) -> Option<usize> {
    tail.match_indices("{%")
        .map(|(open, _)| open)
        .find(|&open| {
            tail.len() - open <= MAX_HELD_DIRECTIVE && PARTIAL_DIRECTIVE.is_match(&tail[open..])
        })
}

/// Split text into literal runs and directives.
///
/// Directive-shaped markers with an unknown bare name stay part of the
/// surrounding literal. With `hold_back_tail`, a trailing `{%` that can still
/// grow into a directive (or a lone trailing `{`) is withheld, so a directive
/// that is still streaming in never shows up as prose. A `{%` that can no
/// longer become one, or that runs past `MAX_HELD_DIRECTIVE`, is prose.
pub fn tokenize(text: &str, hold_back_tail: bool) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut literal_start = 0;

    for caps in DIRECTIVE_PATTERN.captures_iter(text) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        let Some(kind) = caps.get(1).and_then(|m| Directive::classify(m.as_str())) else {
            tracing::trace!(marker = whole.as_str(), "unrecognized directive kept as text");
            continue;
        };

        if whole.start() > literal_start {
            segments.push(Segment::Literal(&text[literal_start..whole.start()]));
        }
        segments.push(Segment::Directive(Directive {
            kind,
            text: caps.get(2).map(|m| unescape(m.as_str())).unwrap_or_default(),
            tool_id: caps.get(3).map(|m| m.as_str().to_string()),
            number: caps.get(4).and_then(|m| m.as_str().parse().ok()),
        }));
        literal_start = whole.end();
    }

    let mut tail = &text[literal_start..];
    if hold_back_tail {
        if let Some(open) = partial_directive_start(tail) {
            tail = &tail[..open];
        } else if let Some(stripped) = tail.strip_suffix('{') {
            tail = stripped;
        }
    }
    if !tail.is_empty() {
        segments.push(Segment::Literal(tail));
    }

    segments
}
