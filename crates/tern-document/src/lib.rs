//! tern-document: parser for the agent's reply text
//!
//! Assistant replies are a single growing string that interleaves prose with
//! `{% name_action "text" %}` directives. This crate turns that string into an
//! ordered list of text, status, reasoning and tool nodes, and attaches the JSON
//! results that follow special tool completions to the tool that produced them.
//!
//! Parsing is a pure function of the accumulated text, so callers simply
//! re-parse on every delta.

mod attach;
pub mod directive;
pub mod node;
pub mod parser;

pub use directive::{Action, Directive, DirectiveKind, Segment};
pub use node::{Document, DocumentNode, ProgressStep, ReasoningBlock, ToolState};
pub use parser::{DEFAULT_SPECIAL_TOOLS, DocumentParser, ParserOptions, parse, parse_complete};
