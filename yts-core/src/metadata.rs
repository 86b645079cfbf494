//! Envelope metadata: Message, Status and Invocation trees.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Namespace injected into every Status envelope. Callers must not supply it.
pub const STATUS_XMLNS: &str = "urn:ytstenut:status";

/// Reserved aspect: a proxy's first call, answered with the adapter's
/// collected properties.
pub const COLLECT_PROPERTIES: &str = "collect-properties";

const ROOT_MESSAGE: &str = "message";
const ROOT_STATUS: &str = "status";
const TYPE_INVOCATION: &str = "invocation";

/// One node of an envelope tree: tag name, attributes, ordered children.
/// Attribute keys are unique by construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub children: Vec<Node>,
}

impl Node {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            attributes: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn set_attribute(&mut self, name: &str, value: &str) {
        self.attributes.insert(name.to_owned(), value.to_owned());
    }

    /// First child with the given tag name, if any.
    pub fn find_child(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(|c| c.name == name)
    }
}

/// Envelope kind, derived from the root tag (and the `type` attribute for
/// invocations, which ride on a `message` root).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeKind {
    Message,
    Status,
    Invocation,
}

/// Direction of an invocation envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Call,
    Event,
    Response,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Call => "call",
            Direction::Event => "event",
            Direction::Response => "response",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "call" => Some(Direction::Call),
            "event" => Some(Direction::Event),
            "response" => Some(Direction::Response),
            _ => None,
        }
    }
}

/// Construction failure for envelopes with required attributes.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),
}

/// Parse failure: malformed text or an envelope we do not recognize.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unknown envelope root `{0}`")]
    UnknownRoot(String),
    #[error("invalid invocation arguments")]
    BadArguments,
}

/// An envelope: a tree plus a read-only marker. Wire-received envelopes are
/// read-only; mutating one is a contract violation and asserts.
#[derive(Debug, Clone)]
pub struct Metadata {
    root: Node,
    read_only: bool,
}

impl Metadata {
    /// One-shot, fire-and-forget message envelope.
    pub fn message(attributes: &[(&str, &str)]) -> Self {
        let mut root = Node::new(ROOT_MESSAGE);
        for (k, v) in attributes {
            root.set_attribute(k, v);
        }
        Self {
            root,
            read_only: false,
        }
    }

    /// Status envelope. Carries `xmlns`, `capability`, `activity` and
    /// `from-service`; the namespace is injected here and reserved.
    pub fn status(
        capability: &str,
        activity: &str,
        from_service: &str,
        attributes: &[(&str, &str)],
    ) -> Result<Self, MetadataError> {
        if capability.is_empty() {
            return Err(MetadataError::InvalidParameter("capability"));
        }
        if activity.is_empty() {
            return Err(MetadataError::InvalidParameter("activity"));
        }
        if from_service.is_empty() {
            return Err(MetadataError::InvalidParameter("from-service"));
        }
        if attributes.iter().any(|(k, _)| *k == "xmlns") {
            return Err(MetadataError::InvalidParameter("xmlns is reserved"));
        }
        let mut root = Node::new(ROOT_STATUS);
        root.set_attribute("xmlns", STATUS_XMLNS);
        root.set_attribute("capability", capability);
        root.set_attribute("activity", activity);
        root.set_attribute("from-service", from_service);
        for (k, v) in attributes {
            root.set_attribute(k, v);
        }
        Ok(Self {
            root,
            read_only: false,
        })
    }

    /// Invocation envelope: a `message` with `type='invocation'`. Arguments
    /// are serialized and percent-escaped into the `arguments` attribute.
    pub fn invocation(
        invocation_id: &str,
        capability: &str,
        aspect: &str,
        arguments: Option<&Value>,
        direction: Direction,
    ) -> Self {
        let mut root = Node::new(ROOT_MESSAGE);
        root.set_attribute("type", TYPE_INVOCATION);
        root.set_attribute("invocation", invocation_id);
        root.set_attribute("capability", capability);
        root.set_attribute("aspect", aspect);
        root.set_attribute("direction", direction.as_str());
        if let Some(value) = arguments {
            root.set_attribute("arguments", &escape_value(value));
        }
        Self {
            root,
            read_only: false,
        }
    }

    /// Parse the textual form. The result is read-only.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let root: Node = serde_json::from_str(text)?;
        Self::from_node(root)
    }

    /// Wrap a decoded tree, validating the root tag. The result is read-only.
    pub fn from_node(root: Node) -> Result<Self, ParseError> {
        match root.name.as_str() {
            ROOT_MESSAGE | ROOT_STATUS => Ok(Self {
                root,
                read_only: true,
            }),
            other => Err(ParseError::UnknownRoot(other.to_owned())),
        }
    }

    pub fn kind(&self) -> EnvelopeKind {
        match self.root.name.as_str() {
            ROOT_STATUS => EnvelopeKind::Status,
            _ if self.root.attribute("type") == Some(TYPE_INVOCATION) => EnvelopeKind::Invocation,
            _ => EnvelopeKind::Message,
        }
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.root.attribute(name)
    }

    /// Add or replace a root attribute. Asserts on wire-received envelopes.
    pub fn add_attribute(&mut self, name: &str, value: &str) {
        assert!(
            !self.read_only,
            "add_attribute on a read-only (wire-received) envelope"
        );
        self.root.set_attribute(name, value);
    }

    pub fn children(&self) -> &[Node] {
        &self.root.children
    }

    /// Append a child node. Asserts on wire-received envelopes.
    pub fn add_child(&mut self, child: Node) {
        assert!(
            !self.read_only,
            "add_child on a read-only (wire-received) envelope"
        );
        self.root.children.push(child);
    }

    pub fn find_child(&self, name: &str) -> Option<&Node> {
        self.root.find_child(name)
    }

    /// Deep structural equality: same kind, same attributes, same children
    /// in the same order. The read-only flag does not participate.
    pub fn is_equal(&self, other: &Metadata) -> bool {
        self.root == other.root
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn into_root(self) -> Node {
        self.root
    }

    // Invocation accessors. None on non-invocation envelopes.

    pub fn invocation_id(&self) -> Option<&str> {
        self.invocation_attr("invocation")
    }

    pub fn capability(&self) -> Option<&str> {
        match self.kind() {
            EnvelopeKind::Status => self.attribute("capability"),
            EnvelopeKind::Invocation => self.attribute("capability"),
            EnvelopeKind::Message => None,
        }
    }

    pub fn aspect(&self) -> Option<&str> {
        self.invocation_attr("aspect")
    }

    pub fn direction(&self) -> Option<Direction> {
        self.invocation_attr("direction").and_then(Direction::from_str)
    }

    /// Deserialize the `arguments` attribute, if present.
    pub fn arguments(&self) -> Result<Option<Value>, ParseError> {
        let raw = match self.invocation_attr("arguments") {
            Some(raw) => raw,
            None => return Ok(None),
        };
        let text = unescape(raw).ok_or(ParseError::BadArguments)?;
        let value = serde_json::from_str(&text).map_err(|_| ParseError::BadArguments)?;
        Ok(Some(value))
    }

    fn invocation_attr(&self, name: &str) -> Option<&str> {
        if self.kind() == EnvelopeKind::Invocation {
            self.attribute(name)
        } else {
            None
        }
    }
}

impl fmt::Display for Metadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = serde_json::to_string(&self.root).map_err(|_| fmt::Error)?;
        f.write_str(&text)
    }
}

/// Serialize a value and percent-escape it for embedding as an attribute.
pub fn escape_value(value: &Value) -> String {
    let text = value.to_string();
    let mut out = String::with_capacity(text.len());
    for &b in text.as_bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(b as char)
            }
            _ => {
                out.push('%');
                out.push(hex_digit(b >> 4));
                out.push(hex_digit(b & 0x0f));
            }
        }
    }
    out
}

fn hex_digit(n: u8) -> char {
    char::from_digit(u32::from(n), 16)
        .map(|c| c.to_ascii_uppercase())
        .unwrap_or('0')
}

/// Undo percent-escaping. None on truncated or non-UTF-8 sequences.
pub fn unescape(input: &str) -> Option<String> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hi = (bytes.get(i + 1).copied()? as char).to_digit(16)?;
            let lo = (bytes.get(i + 2).copied()? as char).to_digit(16)?;
            out.push(((hi << 4) | lo) as u8);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}
