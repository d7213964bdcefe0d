//! Serialized document nodes
//!
//! Generic named tree used for every payload the engine touches: a single
//! delta's data, an event inside a collection, a whole revision. Each node
//! has a type tag, ordered scalar properties, and ordered children.
//!
//! Author: Moroya Sakamoto

#[cfg(feature = "json")]
use serde::{Deserialize, Serialize};

const FNV_OFFSET: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

/// Fold bytes into an FNV-1a state
#[inline]
pub(crate) fn fnv1a(h: &mut u64, bytes: &[u8]) {
    for &b in bytes {
        *h ^= b as u64;
        *h = h.wrapping_mul(FNV_PRIME);
    }
}

/// Fresh FNV-1a state
#[inline]
pub(crate) fn fnv1a_start() -> u64 {
    FNV_OFFSET
}

/// Scalar property value
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "json", derive(Serialize, Deserialize))]
pub enum Value {
    Str(String),
    Int(i32),
    Int64(i64),
    Bool(bool),
    Float(f64),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Integer view; floats truncate, bools map to 0/1
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v as i64),
            Value::Int64(v) => Some(*v),
            Value::Bool(b) => Some(*b as i64),
            Value::Float(f) => Some(*f as i64),
            Value::Str(s) => s.trim().parse().ok(),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Int64(v) => Some(*v as f64),
            Value::Float(f) => Some(*f),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Str(s) => s.trim().parse().ok(),
        }
    }

    /// Boolean view; strings accept "true"/"1"
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(v) => Some(*v != 0),
            Value::Int64(v) => Some(*v != 0),
            Value::Float(f) => Some(*f != 0.0),
            Value::Str(s) => match s.trim() {
                "true" | "1" => Some(true),
                "false" | "0" | "" => Some(false),
                _ => None,
            },
        }
    }

    /// Human-readable rendering for delta descriptions
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            Value::Int(v) => v.to_string(),
            Value::Int64(v) => v.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Float(f) => f.to_string(),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(String::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

/// Named tree node with scalar properties and child nodes
#[derive(Debug, Clone)]
#[cfg_attr(feature = "json", derive(Serialize, Deserialize))]
pub struct SerializedNode {
    tag: String,
    properties: Vec<(String, Value)>,
    children: Vec<SerializedNode>,
}

impl SerializedNode {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: String::from(tag),
            properties: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_property(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.set_property(name, value);
        self
    }

    pub fn with_child(mut self, child: SerializedNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_children(mut self, children: impl IntoIterator<Item = SerializedNode>) -> Self {
        self.children.extend(children);
        self
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn has_type(&self, tag: &str) -> bool {
        self.tag == tag
    }

    /// Set a property, replacing an existing one in place
    pub fn set_property(&mut self, name: &str, value: impl Into<Value>) {
        let value = value.into();
        match self.properties.iter_mut().find(|(n, _)| n == name) {
            Some((_, slot)) => *slot = value,
            None => self.properties.push((String::from(name), value)),
        }
    }

    pub fn remove_property(&mut self, name: &str) -> Option<Value> {
        let pos = self.properties.iter().position(|(n, _)| n == name)?;
        Some(self.properties.remove(pos).1)
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.property(name).is_some()
    }

    /// String property, `default` when missing or not a string
    pub fn get_str<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.property(name).and_then(Value::as_str).unwrap_or(default)
    }

    pub fn get_i64(&self, name: &str, default: i64) -> i64 {
        self.property(name).and_then(Value::as_i64).unwrap_or(default)
    }

    pub fn get_f64(&self, name: &str, default: f64) -> f64 {
        self.property(name).and_then(Value::as_f64).unwrap_or(default)
    }

    pub fn get_bool(&self, name: &str, default: bool) -> bool {
        self.property(name).and_then(Value::as_bool).unwrap_or(default)
    }

    pub fn properties(&self) -> &[(String, Value)] {
        &self.properties
    }

    pub fn append_child(&mut self, child: SerializedNode) {
        self.children.push(child);
    }

    pub fn children(&self) -> &[SerializedNode] {
        &self.children
    }

    pub fn num_children(&self) -> usize {
        self.children.len()
    }

    /// Children carrying the given tag, in order
    pub fn children_with_type<'a>(
        &'a self,
        tag: &'a str,
    ) -> impl Iterator<Item = &'a SerializedNode> + 'a {
        self.children.iter().filter(move |c| c.tag == tag)
    }

    pub fn child_with_type(&self, tag: &str) -> Option<&SerializedNode> {
        self.children.iter().find(|c| c.tag == tag)
    }

    /// No properties and no children
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty() && self.children.is_empty()
    }

    /// Deep equality: tags equal, same property set regardless of order,
    /// children pairwise equivalent in order.
    pub fn is_equivalent_to(&self, other: &SerializedNode) -> bool {
        if self.tag != other.tag
            || self.properties.len() != other.properties.len()
            || self.children.len() != other.children.len()
        {
            return false;
        }

        let props_match = self
            .properties
            .iter()
            .all(|(name, value)| other.property(name) == Some(value));

        props_match
            && self
                .children
                .iter()
                .zip(other.children.iter())
                .all(|(a, b)| a.is_equivalent_to(b))
    }

    /// FNV-1a over tag, name-sorted properties and children
    pub fn content_hash(&self) -> u64 {
        let mut h = fnv1a_start();
        self.hash_into(&mut h);
        h
    }

    fn hash_into(&self, h: &mut u64) {
        fnv1a(h, self.tag.as_bytes());
        let mut props: Vec<&(String, Value)> = self.properties.iter().collect();
        props.sort_by(|a, b| a.0.cmp(&b.0));
        for (name, value) in props {
            fnv1a(h, name.as_bytes());
            match value {
                Value::Str(s) => fnv1a(h, s.as_bytes()),
                Value::Int(v) => fnv1a(h, &v.to_le_bytes()),
                Value::Int64(v) => fnv1a(h, &v.to_le_bytes()),
                Value::Bool(b) => fnv1a(h, &[*b as u8]),
                Value::Float(f) => fnv1a(h, &f.to_le_bytes()),
            }
        }
        for child in &self.children {
            child.hash_into(h);
        }
    }

    #[cfg(feature = "json")]
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    #[cfg(feature = "json")]
    pub fn from_json(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl PartialEq for SerializedNode {
    fn eq(&self, other: &Self) -> bool {
        self.is_equivalent_to(other)
    }
}
