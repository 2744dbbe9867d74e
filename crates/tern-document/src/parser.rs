//! Document parser
//!
//! Walks the tokenized reply text once, keeping at most one open reasoning
//! block. Tool directives inside an open reasoning block belong to it; all
//! others become standalone tool nodes, placed where their first directive
//! appears and updated in place by later directives with the same name.
//!
//! The parser keeps no state between calls. Feeding it the text of a growing
//! reply yields node lists whose prefixes agree, which is what lets the
//! caller re-parse after every delta.

use std::collections::HashMap;

use crate::{
    attach::{Attachment, split_leading_json},
    directive::{Action, Directive, DirectiveKind, Segment, tokenize},
    node::{Document, DocumentNode, ProgressStep, ReasoningBlock, ToolState},
};

/// Tools whose completion marker may be followed by a JSON result
pub const DEFAULT_SPECIAL_TOOLS: &[&str] = &[
    "create_flight_itinerary",
    "search_flights",
    "generate_image",
    "update_panel",
    "save_to_memory",
];

const REASONING: &str = "reasoning";

/// Parser configuration
#[derive(Debug, Clone)]
pub struct ParserOptions {
    /// Tool names eligible for result attachment
    pub special_tools: Vec<String>,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            special_tools: DEFAULT_SPECIAL_TOOLS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ParserOptions {
    /// Add extra special tool names on top of the defaults
    pub fn with_special_tools<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            let name = name.into();
            if !self.special_tools.contains(&name) {
                self.special_tools.push(name);
            }
        }
        self
    }
}

/// Parser for directive-annotated reply text
#[derive(Debug, Clone, Default)]
pub struct DocumentParser {
    options: ParserOptions,
}

impl DocumentParser {
    pub fn new(options: ParserOptions) -> Self {
        Self { options }
    }

    /// Parse text that may still be streaming.
    ///
    /// Partial directives and unbalanced result payloads at the very end are
    /// held back until more text arrives.
    pub fn parse(&self, text: &str) -> Document {
        ParsePass::new(&self.options, true).run(text)
    }

    /// Parse text that is known to be final; nothing is held back.
    pub fn parse_complete(&self, text: &str) -> Document {
        ParsePass::new(&self.options, false).run(text)
    }
}

/// Parse streaming text with the default options
pub fn parse(text: &str) -> Document {
    DocumentParser::default().parse(text)
}

/// Parse final text with the default options
pub fn parse_complete(text: &str) -> Document {
    DocumentParser::default().parse_complete(text)
}

/// Where a tool state lives in the node list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ToolSlot {
    Standalone(usize),
    Nested { node: usize, tool: usize },
}

struct ParsePass<'o> {
    options: &'o ParserOptions,
    streaming: bool,
    nodes: Vec<DocumentNode>,
    open_reasoning: Option<usize>,
    /// Standalone tool nodes still waiting for their completion, by name
    open_tools: HashMap<String, usize>,
    /// Special tool that just completed and may receive a result payload
    attach_target: Option<ToolSlot>,
    in_description: bool,
}

impl<'o> ParsePass<'o> {
    fn new(options: &'o ParserOptions, streaming: bool) -> Self {
        Self {
            options,
            streaming,
            nodes: Vec::new(),
            open_reasoning: None,
            open_tools: HashMap::new(),
            attach_target: None,
            in_description: false,
        }
    }

    fn run(mut self, text: &str) -> Document {
        let segments = tokenize(text, self.streaming);
        let count = segments.len();

        for (i, segment) in segments.into_iter().enumerate() {
            match segment {
                Segment::Literal(literal) => self.on_literal(literal, i + 1 == count),
                Segment::Directive(directive) => self.on_directive(directive),
            }
        }
        if !self.streaming {
            self.release_target();
        }

        Document { nodes: self.nodes }
    }

    fn is_special(&self, name: &str) -> bool {
        self.options.special_tools.iter().any(|s| s == name)
    }

    fn on_literal(&mut self, literal: &str, is_last: bool) {
        if self.in_description {
            if let Some(slot) = self.attach_target {
                if let Some(tool) = self.tool_mut(slot) {
                    tool.description = literal.trim().to_string();
                }
                return;
            }
        }

        let Some(slot) = self.attach_target else {
            self.push_text(literal);
            return;
        };

        if literal.trim().is_empty() {
            return;
        }

        match split_leading_json(literal, is_last && self.streaming) {
            Attachment::Attached { value, rest } => {
                if let Some(tool) = self.tool_mut(slot) {
                    tool.result_data = Some(value);
                }
                self.release_target();
                self.push_text(rest);
            }
            Attachment::Pending => {}
            Attachment::Rejected => {
                self.release_target();
                self.push_text(literal);
            }
        }
    }

    fn on_directive(&mut self, directive: Directive) {
        match directive.kind {
            DirectiveKind::DescriptionOpen => {
                self.in_description = self.attach_target.is_some();
            }
            DirectiveKind::DescriptionClose => {
                self.in_description = false;
            }
            DirectiveKind::EndTool => {
                self.in_description = false;
                self.release_target();
            }
            DirectiveKind::Status => {
                self.in_description = false;
                self.release_target();
                self.nodes.push(DocumentNode::Status {
                    content: directive.text,
                });
            }
            DirectiveKind::Lifecycle { ref name, action } => {
                self.in_description = false;
                self.release_target();
                if name == REASONING {
                    self.on_reasoning(action, &directive);
                } else {
                    let slot = self.on_tool(name, action, &directive);
                    if action == Action::Complete && self.is_special(name) {
                        if let Some(tool) = self.tool_mut(slot) {
                            tool.awaiting_result = true;
                        }
                        self.attach_target = Some(slot);
                    }
                }
            }
        }
    }

    fn on_reasoning(&mut self, action: Action, directive: &Directive) {
        match (action, self.open_reasoning) {
            (Action::Start, Some(index)) => {
                if let Some(block) = self.reasoning_mut(index) {
                    block.text = directive.text.clone();
                }
            }
            (Action::Start, None) => {
                self.open_reasoning = Some(self.nodes.len());
                self.nodes.push(DocumentNode::Reasoning(ReasoningBlock {
                    text: directive.text.clone(),
                    ..Default::default()
                }));
            }
            (Action::Progress, Some(index)) => {
                if let Some(block) = self.reasoning_mut(index) {
                    if !directive.text.is_empty() {
                        block.text = directive.text.clone();
                    }
                    if directive.number.is_some() {
                        block.tokens = directive.number;
                    }
                }
            }
            (Action::Progress, None) => {
                self.open_reasoning = Some(self.nodes.len());
                self.nodes.push(DocumentNode::Reasoning(ReasoningBlock {
                    text: directive.text.clone(),
                    tokens: directive.number,
                    ..Default::default()
                }));
            }
            (Action::Complete, Some(index)) => {
                if let Some(block) = self.reasoning_mut(index) {
                    block.is_complete = true;
                    block.complete_text = directive.text.clone();
                }
                self.open_reasoning = None;
            }
            (Action::Complete, None) => {
                self.nodes.push(DocumentNode::Reasoning(ReasoningBlock {
                    text: directive.text.clone(),
                    is_complete: true,
                    complete_text: directive.text.clone(),
                    ..Default::default()
                }));
            }
        }
    }

    fn on_tool(&mut self, name: &str, action: Action, directive: &Directive) -> ToolSlot {
        let slot = match self.open_reasoning {
            Some(node) => self.nested_slot(node, name, action, directive),
            None => self.standalone_slot(name, action, directive),
        };

        if let Some(tool) = self.tool_mut(slot) {
            apply(tool, action, directive);
        }

        if action == Action::Complete && matches!(slot, ToolSlot::Standalone(_)) {
            self.open_tools.remove(name);
        }
        slot
    }

    fn nested_slot(
        &mut self,
        node: usize,
        name: &str,
        action: Action,
        directive: &Directive,
    ) -> ToolSlot {
        let Some(block) = self.reasoning_mut(node) else {
            return ToolSlot::Nested { node, tool: 0 };
        };
        let tool = match block
            .tools
            .iter()
            .position(|t| t.name == name && !t.is_complete)
        {
            Some(tool) => tool,
            None => {
                block.tools.push(ToolState::new(name, initial_description(action, directive)));
                block.tools.len() - 1
            }
        };
        ToolSlot::Nested { node, tool }
    }

    fn standalone_slot(&mut self, name: &str, action: Action, directive: &Directive) -> ToolSlot {
        if let Some(&index) = self.open_tools.get(name) {
            return ToolSlot::Standalone(index);
        }
        let index = self.nodes.len();
        self.open_tools.insert(name.to_string(), index);
        self.nodes.push(DocumentNode::Tool(ToolState::new(
            name,
            initial_description(action, directive),
        )));
        ToolSlot::Standalone(index)
    }

    /// Stop expecting a result payload for the last completed special tool
    fn release_target(&mut self) {
        if let Some(slot) = self.attach_target.take() {
            if let Some(tool) = self.tool_mut(slot) {
                tool.awaiting_result = false;
            }
        }
    }

    fn push_text(&mut self, literal: &str) {
        if literal.trim().is_empty() {
            return;
        }
        if let Some(DocumentNode::Text { content }) = self.nodes.last_mut() {
            content.push_str(literal);
            return;
        }
        self.nodes.push(DocumentNode::Text {
            content: literal.to_string(),
        });
    }

    fn reasoning_mut(&mut self, index: usize) -> Option<&mut ReasoningBlock> {
        match self.nodes.get_mut(index) {
            Some(DocumentNode::Reasoning(block)) => Some(block),
            _ => None,
        }
    }

    fn tool_mut(&mut self, slot: ToolSlot) -> Option<&mut ToolState> {
        match slot {
            ToolSlot::Standalone(index) => match self.nodes.get_mut(index) {
                Some(DocumentNode::Tool(tool)) => Some(tool),
                _ => None,
            },
            ToolSlot::Nested { node, tool } => self
                .reasoning_mut(node)
                .and_then(|block| block.tools.get_mut(tool)),
        }
    }
}

fn initial_description(action: Action, directive: &Directive) -> &str {
    match action {
        Action::Start => &directive.text,
        Action::Progress | Action::Complete => "",
    }
}

fn apply(tool: &mut ToolState, action: Action, directive: &Directive) {
    match action {
        Action::Start => {
            if !directive.text.is_empty() {
                tool.description = directive.text.clone();
            }
        }
        Action::Progress => {
            tool.progress_steps.push(ProgressStep {
                text: directive.text.clone(),
                progress: directive.number.map(|n| n.min(100) as u8),
            });
        }
        Action::Complete => {
            tool.is_complete = true;
            tool.complete_text = directive.text.clone();
            if directive.tool_id.is_some() {
                tool.tool_id = directive.tool_id.clone();
            }
        }
    }
}
