//! Template content tree.
//!
//! Version content is stored as JSON:
//!
//! ```json
//! { "type": "doc", "content": [
//!     { "type": "heading", "attrs": { "level": 1 }, "content": [
//!         { "type": "text", "text": "Invoice for " },
//!         { "type": "injectable", "attrs": { "code": "client_name" } }
//!     ]},
//!     { "type": "image", "attrs": { "src": "https://cdn.example.com/logo.png" } },
//!     { "type": "page_break" }
//! ]}
//! ```
//!
//! [`validate_content`] reports every problem at once; [`parse_content`]
//! turns valid JSON into a [`Document`].

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

pub const INVALID_ROOT: &str = "INVALID_ROOT";
pub const MISSING_TYPE: &str = "MISSING_TYPE";
pub const UNKNOWN_NODE: &str = "UNKNOWN_NODE";
pub const MISSING_CODE: &str = "MISSING_CODE";
pub const INVALID_HEADING_LEVEL: &str = "INVALID_HEADING_LEVEL";
pub const MISSING_IMAGE_SOURCE: &str = "MISSING_IMAGE_SOURCE";

/// One validation problem, located by a JSON path such as
/// `$.content[2].content[0]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentViolation {
    pub code: &'static str,
    pub path: String,
    pub message: String,
}

impl ContentViolation {
    fn new(code: &'static str, path: &str, message: impl Into<String>) -> Self {
        Self {
            code,
            path: path.to_string(),
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Typed tree
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mark {
    Bold,
    Italic,
    Underline,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    Url(String),
    /// Code of an image-typed injectable.
    Code(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Paragraph(Vec<Node>),
    Heading { level: u8, children: Vec<Node> },
    Text { text: String, marks: Vec<Mark> },
    Injectable { code: String, format: Option<String> },
    Image { source: ImageSource, width: Option<String> },
    PageBreak,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    pub blocks: Vec<Node>,
}

impl Document {
    /// Codes referenced by injectable and image nodes, in document order,
    /// without duplicates.
    pub fn referenced_codes(&self) -> Vec<String> {
        let mut out = Vec::new();
        walk(&self.blocks, &mut |node| {
            let code = match node {
                Node::Injectable { code, .. } => Some(code),
                Node::Image {
                    source: ImageSource::Code(code),
                    ..
                } => Some(code),
                _ => None,
            };
            if let Some(code) = code {
                if !out.contains(code) {
                    out.push(code.clone());
                }
            }
        });
        out
    }

    /// Per-code format chosen in the content. The first node naming a
    /// format for a code wins.
    pub fn selected_formats(&self) -> HashMap<String, String> {
        let mut out = HashMap::new();
        walk(&self.blocks, &mut |node| {
            if let Node::Injectable {
                code,
                format: Some(format),
            } = node
            {
                out.entry(code.clone()).or_insert_with(|| format.clone());
            }
        });
        out
    }
}

fn walk<'a>(nodes: &'a [Node], visit: &mut impl FnMut(&'a Node)) {
    for node in nodes {
        visit(node);
        match node {
            Node::Paragraph(children) | Node::Heading { children, .. } => walk(children, visit),
            _ => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Validation and parsing
// ---------------------------------------------------------------------------

/// Check the whole tree and return every violation found.
pub fn validate_content(content: &Value) -> Vec<ContentViolation> {
    let mut violations = Vec::new();
    let _ = parse_root(content, &mut violations);
    violations
}

/// Parse content into a [`Document`], or return all violations.
pub fn parse_content(content: &Value) -> Result<Document, Vec<ContentViolation>> {
    let mut violations = Vec::new();
    let doc = parse_root(content, &mut violations);
    match doc {
        Some(doc) if violations.is_empty() => Ok(doc),
        _ => Err(violations),
    }
}

fn parse_root(content: &Value, violations: &mut Vec<ContentViolation>) -> Option<Document> {
    let is_doc = content.get("type").and_then(Value::as_str) == Some("doc");
    let Some(children) = content.get("content").and_then(Value::as_array).filter(|_| is_doc)
    else {
        violations.push(ContentViolation::new(
            INVALID_ROOT,
            "$",
            "root must be an object with type 'doc' and a 'content' array",
        ));
        return None;
    };
    Some(Document {
        blocks: parse_children(children, "$", violations),
    })
}

fn parse_children(children: &[Value], parent: &str, violations: &mut Vec<ContentViolation>) -> Vec<Node> {
    children
        .iter()
        .enumerate()
        .filter_map(|(i, child)| parse_node(child, &format!("{parent}.content[{i}]"), violations))
        .collect()
}

fn attr<'a>(node: &'a Value, name: &str) -> Option<&'a Value> {
    node.get("attrs").and_then(|a| a.get(name))
}

fn non_empty_str<'a>(value: Option<&'a Value>) -> Option<&'a str> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn parse_node(node: &Value, path: &str, violations: &mut Vec<ContentViolation>) -> Option<Node> {
    let Some(node_type) = node.get("type").and_then(Value::as_str) else {
        violations.push(ContentViolation::new(MISSING_TYPE, path, "node has no 'type'"));
        return None;
    };

    let children: &[Value] = node
        .get("content")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[]);

    match node_type {
        "paragraph" => Some(Node::Paragraph(parse_children(children, path, violations))),
        "heading" => {
            let level = attr(node, "level")
                .and_then(Value::as_u64)
                .filter(|l| (1..=6).contains(l));
            let nested = parse_children(children, path, violations);
            match level {
                Some(level) => Some(Node::Heading {
                    level: level as u8,
                    children: nested,
                }),
                None => {
                    violations.push(ContentViolation::new(
                        INVALID_HEADING_LEVEL,
                        path,
                        "heading attrs.level must be an integer from 1 to 6",
                    ));
                    None
                }
            }
        }
        "text" => {
            let text = node.get("text").and_then(Value::as_str).unwrap_or_default();
            let marks = node
                .get("marks")
                .and_then(Value::as_array)
                .map(|marks| {
                    marks
                        .iter()
                        .filter_map(|m| match m.get("type").and_then(Value::as_str) {
                            Some("bold") => Some(Mark::Bold),
                            Some("italic") => Some(Mark::Italic),
                            Some("underline") => Some(Mark::Underline),
                            _ => None,
                        })
                        .collect()
                })
                .unwrap_or_default();
            Some(Node::Text {
                text: text.to_string(),
                marks,
            })
        }
        "injectable" => match non_empty_str(attr(node, "code")) {
            Some(code) => Some(Node::Injectable {
                code: code.to_string(),
                format: non_empty_str(attr(node, "format")).map(str::to_string),
            }),
            None => {
                violations.push(ContentViolation::new(
                    MISSING_CODE,
                    path,
                    "injectable node requires attrs.code",
                ));
                None
            }
        },
        "image" => {
            let source = non_empty_str(attr(node, "src"))
                .map(|src| ImageSource::Url(src.to_string()))
                .or_else(|| non_empty_str(attr(node, "code")).map(|c| ImageSource::Code(c.to_string())));
            match source {
                Some(source) => Some(Node::Image {
                    source,
                    width: non_empty_str(attr(node, "width")).map(str::to_string),
                }),
                None => {
                    violations.push(ContentViolation::new(
                        MISSING_IMAGE_SOURCE,
                        path,
                        "image node requires attrs.src or attrs.code",
                    ));
                    None
                }
            }
        }
        "page_break" => Some(Node::PageBreak),
        other => {
            violations.push(ContentViolation::new(
                UNKNOWN_NODE,
                path,
                format!("unknown node type '{other}'"),
            ));
            None
        }
    }
}
