//! Document node types

use serde::{Deserialize, Serialize};

/// One progress narration line of a tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressStep {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
}

/// State of one tool invocation as narrated in the text
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolState {
    pub name: String,
    pub description: String,
    pub progress_steps: Vec<ProgressStep>,
    pub is_complete: bool,
    pub complete_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_data: Option<serde_json::Value>,
    /// Completed, but a result payload may still follow in the text
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub awaiting_result: bool,
}

impl ToolState {
    pub(crate) fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            ..Default::default()
        }
    }

    /// Latest reported progress percentage
    pub fn latest_progress(&self) -> Option<u8> {
        self.progress_steps.iter().rev().find_map(|s| s.progress)
    }
}

/// A collapsible reasoning region with its nested tool calls
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReasoningBlock {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<u32>,
    pub is_complete: bool,
    pub complete_text: String,
    pub tools: Vec<ToolState>,
}

/// One node of a parsed reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DocumentNode {
    Text { content: String },
    Status { content: String },
    Reasoning(ReasoningBlock),
    Tool(ToolState),
}

impl DocumentNode {
    /// Short name of the node kind
    pub fn kind(&self) -> &'static str {
        match self {
            DocumentNode::Text { .. } => "text",
            DocumentNode::Status { .. } => "status",
            DocumentNode::Reasoning(_) => "reasoning",
            DocumentNode::Tool(_) => "tool",
        }
    }

    /// Whether later text can still change this node
    pub fn is_open(&self) -> bool {
        match self {
            DocumentNode::Text { .. } => true,
            DocumentNode::Status { .. } => false,
            DocumentNode::Reasoning(block) => !block.is_complete,
            DocumentNode::Tool(tool) => !tool.is_complete || tool.awaiting_result,
        }
    }
}

/// Ordered nodes of one parsed reply
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    pub nodes: Vec<DocumentNode>,
}

impl Document {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DocumentNode> {
        self.nodes.iter()
    }

    /// Top-level tool nodes, in order
    pub fn tools(&self) -> impl Iterator<Item = &ToolState> {
        self.nodes.iter().filter_map(|n| match n {
            DocumentNode::Tool(tool) => Some(tool),
            _ => None,
        })
    }

    /// Reasoning blocks, in order
    pub fn reasoning_blocks(&self) -> impl Iterator<Item = &ReasoningBlock> {
        self.nodes.iter().filter_map(|n| match n {
            DocumentNode::Reasoning(block) => Some(block),
            _ => None,
        })
    }

    /// Most recent tool with the given name, top-level or nested
    pub fn find_tool(&self, name: &str) -> Option<&ToolState> {
        self.nodes.iter().rev().find_map(|n| match n {
            DocumentNode::Tool(tool) if tool.name == name => Some(tool),
            DocumentNode::Reasoning(block) => block.tools.iter().rev().find(|t| t.name == name),
            _ => None,
        })
    }

    /// Concatenated prose of all text nodes
    pub fn plain_text(&self) -> String {
        self.nodes
            .iter()
            .filter_map(|n| match n {
                DocumentNode::Text { content } => Some(content.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

impl<'a> IntoIterator for &'a Document {
    type Item = &'a DocumentNode;
    type IntoIter = std::slice::Iter<'a, DocumentNode>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.iter()
    }
}
