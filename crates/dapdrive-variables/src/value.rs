//! The rendered variable tree and primitive parsing.

use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{json, Value};

/// A parsed primitive value.
///
/// The adapter renders every value as text; this is the driver's typed
/// reading of that text, used for JSON projection, content hashing and
/// diffing.
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    /// `null` / `None` / `nil`.
    Null,
    /// `undefined`.
    Undefined,
    /// A boolean rendering.
    Bool(bool),
    /// An integral rendering, accepted only when the type hints a number.
    Int(i64),
    /// A floating rendering, accepted only when the type hints a number.
    Float(f64),
    /// A quoted string with the surrounding quotes stripped.
    Str(String),
    /// Anything else, kept verbatim.
    Raw(String),
}

impl Primitive {
    /// Parses the adapter's textual rendering of a value.
    pub fn parse(text: &str, type_name: Option<&str>) -> Self {
        let trimmed = text.trim();
        match trimmed {
            "null" | "None" | "nil" => return Primitive::Null,
            "undefined" => return Primitive::Undefined,
            "true" | "True" => return Primitive::Bool(true),
            "false" | "False" => return Primitive::Bool(false),
            _ => {}
        }
        if type_name.is_some_and(type_hints_number) {
            if let Ok(i) = trimmed.parse::<i64>() {
                return Primitive::Int(i);
            }
            if let Ok(f) = trimmed.parse::<f64>() {
                return Primitive::Float(f);
            }
        }
        if trimmed.len() >= 2 {
            for quote in ['"', '\''] {
                if trimmed.starts_with(quote) && trimmed.ends_with(quote) {
                    return Primitive::Str(trimmed[1..trimmed.len() - 1].to_string());
                }
            }
        }
        Primitive::Raw(trimmed.to_string())
    }

    /// JSON projection of the primitive.
    pub fn to_json(&self) -> Value {
        match self {
            Primitive::Null | Primitive::Undefined => Value::Null,
            Primitive::Bool(b) => json!(b),
            Primitive::Int(i) => json!(i),
            Primitive::Float(f) => json!(f),
            Primitive::Str(s) | Primitive::Raw(s) => json!(s),
        }
    }

    /// Canonical text used in content hashes.
    pub fn hash_text(&self) -> String {
        match self {
            Primitive::Null => "null".to_string(),
            Primitive::Undefined => "undefined".to_string(),
            Primitive::Bool(b) => b.to_string(),
            Primitive::Int(i) => i.to_string(),
            Primitive::Float(f) => f.to_string(),
            Primitive::Str(s) | Primitive::Raw(s) => s.clone(),
        }
    }
}

/// Number-ish type names accepted for numeric parsing.
fn type_hints_number(type_name: &str) -> bool {
    const HINTS: &[&str] = &[
        "int", "long", "short", "byte", "sbyte", "double", "float", "decimal", "single", "number",
        "num", "i8", "i16", "i32", "i64", "u8", "u16", "u32", "u64", "f32", "f64", "usize", "isize",
    ];
    let lowered = type_name.to_ascii_lowercase();
    HINTS.iter().any(|hint| lowered.contains(hint))
}

/// A collection rendering: element type, reported count and the expanded
/// item prefix.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionValue {
    /// Element type when derivable from the collection type.
    pub element_type: Option<String>,
    /// Reported element count, which may exceed `items.len()`.
    pub count: usize,
    /// Expanded items, capped at the configured item limit.
    pub items: Vec<VariableValue>,
}

/// The shape of a rendered value.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderedValue {
    /// A leaf.
    Primitive(Primitive),
    /// A composite rendered member-by-member.
    Object(IndexMap<String, VariableValue>),
    /// A sequence-like composite.
    Collection(CollectionValue),
}

/// One node of the rendered variable tree.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableValue {
    /// Variable type as reported by the adapter.
    pub type_name: Option<String>,
    /// The rendered value.
    pub value: RenderedValue,
    /// The adapter's reference handle, when the value is composite.
    pub reference: Option<i64>,
    /// Set when expansion hit a reference already visited in this snapshot.
    pub cyclic: bool,
    /// Set when the value was replaced by a `[see: <path>]` reference.
    pub deduplicated: bool,
}

impl VariableValue {
    /// A leaf node.
    pub fn primitive(primitive: Primitive, type_name: Option<String>) -> Self {
        Self { type_name, value: RenderedValue::Primitive(primitive), reference: None, cyclic: false, deduplicated: false }
    }

    /// JSON projection used for events, hashing scope and diffs.
    pub fn to_json(&self) -> Value {
        let rendered = match &self.value {
            RenderedValue::Primitive(p) => p.to_json(),
            RenderedValue::Object(members) => {
                let mut map = serde_json::Map::new();
                for (name, member) in members {
                    map.insert(name.clone(), member.to_json());
                }
                Value::Object(map)
            }
            RenderedValue::Collection(collection) => {
                let items: Vec<Value> = collection.items.iter().map(VariableValue::to_json).collect();
                let mut map = serde_json::Map::new();
                if let Some(element_type) = &collection.element_type {
                    map.insert("elementType".to_string(), json!(element_type));
                }
                map.insert("count".to_string(), json!(collection.count));
                map.insert("items".to_string(), Value::Array(items));
                Value::Object(map)
            }
        };

        let mut node = serde_json::Map::new();
        if let Some(type_name) = &self.type_name {
            node.insert("type".to_string(), json!(type_name));
        }
        node.insert("value".to_string(), rendered);
        if self.cyclic {
            node.insert("cyclic".to_string(), json!(true));
        }
        if self.deduplicated {
            node.insert("deduplicated".to_string(), json!(true));
        }
        Value::Object(node)
    }
}

impl Serialize for VariableValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let json = self.to_json();
        let Value::Object(map) = &json else {
            return json.serialize(serializer);
        };
        let mut state = serializer.serialize_map(Some(map.len()))?;
        for (key, value) in map {
            state.serialize_entry(key, value)?;
        }
        state.end()
    }
}
