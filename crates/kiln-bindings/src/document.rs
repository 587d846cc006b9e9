//! Structured documents and their JSON wire format
//!
//! [`Node`] is the tree exchanged with the value bridge. Objects are kept as
//! ordered pairs so that encoding and decoding preserve member order, and
//! numbers keep their integer/float subtype (`1` and `1.0` stay distinct).

use std::fmt;

use kiln_sdk::{format_number, BridgeError, BridgeResult};
use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{self, Serialize, SerializeMap, SerializeSeq, Serializer};

// ============================================================================
// Node
// ============================================================================

/// Structured document node
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// `null`
    Null,
    /// Boolean
    Bool(bool),
    /// Integer number
    Int(i64),
    /// Floating-point number
    Float(f64),
    /// UTF-8 string
    String(String),
    /// Ordered list
    Array(Vec<Node>),
    /// Ordered key/value pairs; keys may be any node
    Object(Vec<(Node, Node)>),
}

impl Node {
    /// Kind name for diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            Node::Null => "null",
            Node::Bool(_) => "bool",
            Node::Int(_) => "int",
            Node::Float(_) => "float",
            Node::String(_) => "string",
            Node::Array(_) => "array",
            Node::Object(_) => "object",
        }
    }

    /// Object member by string key (first match)
    pub fn get(&self, key: &str) -> Option<&Node> {
        match self {
            Node::Object(pairs) => pairs.iter().find_map(|(k, v)| match k {
                Node::String(s) if s == key => Some(v),
                _ => None,
            }),
            _ => None,
        }
    }

    /// Array elements
    pub fn as_array(&self) -> Option<&[Node]> {
        match self {
            Node::Array(items) => Some(items),
            _ => None,
        }
    }

    /// String payload
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Node::String(s) => Some(s),
            _ => None,
        }
    }

    /// Key text used on the wire; composite and null keys have none
    fn wire_key(&self) -> Option<String> {
        match self {
            Node::String(s) => Some(s.clone()),
            Node::Int(i) => Some(i.to_string()),
            Node::Float(n) => Some(format_number(*n)),
            Node::Bool(b) => Some(b.to_string()),
            Node::Null | Node::Array(_) | Node::Object(_) => None,
        }
    }
}

impl From<bool> for Node {
    fn from(b: bool) -> Self {
        Node::Bool(b)
    }
}

impl From<i64> for Node {
    fn from(i: i64) -> Self {
        Node::Int(i)
    }
}

impl From<f64> for Node {
    fn from(n: f64) -> Self {
        Node::Float(n)
    }
}

impl From<&str> for Node {
    fn from(s: &str) -> Self {
        Node::String(s.to_string())
    }
}

impl From<String> for Node {
    fn from(s: String) -> Self {
        Node::String(s)
    }
}

// ============================================================================
// Serde
// ============================================================================

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Node::Null => serializer.serialize_unit(),
            Node::Bool(b) => serializer.serialize_bool(*b),
            Node::Int(i) => serializer.serialize_i64(*i),
            Node::Float(n) if !n.is_finite() => Err(<S::Error as ser::Error>::custom(format!(
                "number {} has no JSON representation",
                format_number(*n)
            ))),
            Node::Float(n) => serializer.serialize_f64(*n),
            Node::String(s) => serializer.serialize_str(s),
            Node::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Node::Object(pairs) => {
                let mut map = serializer.serialize_map(Some(pairs.len()))?;
                for (key, value) in pairs {
                    let key = key.wire_key().ok_or_else(|| {
                        <S::Error as ser::Error>::custom(format!("{} object key", key.kind()))
                    })?;
                    map.serialize_entry(&key, value)?;
                }
                map.end()
            }
        }
    }
}

struct NodeVisitor;

impl<'de> Visitor<'de> for NodeVisitor {
    type Value = Node;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a JSON value")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Node, E> {
        Ok(Node::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<Node, E> {
        Ok(Node::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Node, D::Error> {
        Node::deserialize(deserializer)
    }

    fn visit_bool<E: de::Error>(self, b: bool) -> Result<Node, E> {
        Ok(Node::Bool(b))
    }

    fn visit_i64<E: de::Error>(self, i: i64) -> Result<Node, E> {
        Ok(Node::Int(i))
    }

    fn visit_u64<E: de::Error>(self, u: u64) -> Result<Node, E> {
        Ok(match i64::try_from(u) {
            Ok(i) => Node::Int(i),
            Err(_) => Node::Float(u as f64),
        })
    }

    fn visit_f64<E: de::Error>(self, n: f64) -> Result<Node, E> {
        Ok(Node::Float(n))
    }

    fn visit_str<E: de::Error>(self, s: &str) -> Result<Node, E> {
        Ok(Node::String(s.to_string()))
    }

    fn visit_string<E: de::Error>(self, s: String) -> Result<Node, E> {
        Ok(Node::String(s))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Node, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element::<Node>()? {
            items.push(item);
        }
        Ok(Node::Array(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Node, A::Error> {
        let mut pairs = Vec::with_capacity(map.size_hint().unwrap_or(0));
        while let Some((key, value)) = map.next_entry::<String, Node>()? {
            pairs.push((Node::String(key), value));
        }
        Ok(Node::Object(pairs))
    }
}

impl<'de> Deserialize<'de> for Node {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Node, D::Error> {
        deserializer.deserialize_any(NodeVisitor)
    }
}

// ============================================================================
// Wire format
// ============================================================================

/// JSON output layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    /// Single line, no insignificant whitespace
    #[default]
    Compact,
    /// Indented, one member per line
    Pretty,
}

/// Encode a document as JSON.
///
/// # Arguments
///
/// * `node` - The document to encode
/// * `format` - Output layout
///
/// # Returns
///
/// The JSON text, or `NotDocumentCastable` if the document contains a
/// non-finite float or a null/composite object key.
///
/// # Example
///
/// ```ignore
/// let doc = Node::Object(vec![("a".into(), Node::Int(1))]);
/// assert_eq!(encode(&doc, Format::Compact)?, r#"{"a":1}"#);
/// ```
pub fn encode(node: &Node, format: Format) -> BridgeResult<String> {
    let result = match format {
        Format::Compact => serde_json::to_string(node),
        Format::Pretty => serde_json::to_string_pretty(node),
    };
    result.map_err(|e| BridgeError::NotDocumentCastable(e.to_string()))
}

/// Decode JSON text into a document.
///
/// Malformed input is an `Argument` error.
pub fn decode(text: &str) -> BridgeResult<Node> {
    serde_json::from_str(text).map_err(|e| BridgeError::Argument(format!("malformed JSON: {}", e)))
}
