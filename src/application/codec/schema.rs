//! JSON schema subset used by the OCPP-J payload schemas
//!
//! Schemas are compiled once when the catalog is built. Compilation rejects
//! keywords the validator does not understand, so a schema can never be
//! silently under-enforced.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::DateTime;
use serde_json::{Map, Value};
use thiserror::Error;

/// Schema draft the payload schemas of a protocol version are written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// draft-04, used by the OCPP 1.6 schemas (`id`)
    Draft04,
    /// draft-06, used by the OCPP 2.0.1 schemas (`$id`, vendor `comment` / `javaType`)
    Draft06,
}

impl Dialect {
    fn id_keyword(&self) -> &'static str {
        match self {
            Self::Draft04 => "id",
            Self::Draft06 => "$id",
        }
    }

    fn is_annotation(&self, keyword: &str) -> bool {
        match keyword {
            "$schema" | "title" | "description" | "default" | "definitions" => true,
            "id" => *self == Self::Draft04,
            "$id" | "comment" | "javaType" | "$comment" | "examples" => *self == Self::Draft06,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Schema is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("Unsupported keyword '{keyword}' at {path}")]
    UnsupportedKeyword { path: String, keyword: String },

    #[error("Invalid value for '{keyword}' at {path}")]
    InvalidKeyword { path: String, keyword: String },

    #[error("Unresolvable reference '{reference}' at {path}")]
    UnresolvedReference { path: String, reference: String },
}

/// Schema keyword a payload failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    Type,
    Required,
    AdditionalProperties,
    Enum,
    MinLength,
    MaxLength,
    Minimum,
    Maximum,
    Format,
    MinItems,
    MaxItems,
}

impl Keyword {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Type => "type",
            Self::Required => "required",
            Self::AdditionalProperties => "additionalProperties",
            Self::Enum => "enum",
            Self::MinLength => "minLength",
            Self::MaxLength => "maxLength",
            Self::Minimum => "minimum",
            Self::Maximum => "maximum",
            Self::Format => "format",
            Self::MinItems => "minItems",
            Self::MaxItems => "maxItems",
        }
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single schema violation.
///
/// `pointer` is the JSON pointer of the offending member; for `required`
/// it points at the missing property itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub pointer: String,
    pub keyword: Keyword,
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pointer = if self.pointer.is_empty() { "/" } else { &self.pointer };
        write!(f, "{}: {} ({})", pointer, self.message, self.keyword)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JsonType {
    Object,
    Array,
    String,
    Integer,
    Number,
    Boolean,
    Null,
}

impl JsonType {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "object" => Self::Object,
            "array" => Self::Array,
            "string" => Self::String,
            "integer" => Self::Integer,
            "number" => Self::Number,
            "boolean" => Self::Boolean,
            "null" => Self::Null,
            _ => return None,
        })
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Object => "object",
            Self::Array => "array",
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Null => "null",
        }
    }

    fn matches(&self, value: &Value) -> bool {
        match self {
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
            Self::String => value.is_string(),
            Self::Integer => match value {
                Value::Number(n) => {
                    n.is_i64() || n.is_u64() || n.as_f64().map_or(false, |f| f.fract() == 0.0)
                }
                _ => false,
            },
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Null => value.is_null(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    DateTime,
    Uri,
}

impl Format {
    fn check(&self, s: &str) -> bool {
        match self {
            Self::DateTime => DateTime::parse_from_rfc3339(s).is_ok(),
            Self::Uri => match s.split_once(':') {
                Some((scheme, _)) => {
                    !scheme.is_empty()
                        && scheme
                            .chars()
                            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
                        && !s.chars().any(char::is_whitespace)
                }
                None => false,
            },
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::DateTime => "date-time",
            Self::Uri => "uri",
        }
    }
}

#[derive(Debug, Clone)]
struct Node {
    reference: Option<String>,
    types: Vec<JsonType>,
    properties: BTreeMap<String, Node>,
    required: Vec<String>,
    additional_properties: bool,
    enumeration: Option<Vec<Value>>,
    min_length: Option<u64>,
    max_length: Option<u64>,
    minimum: Option<f64>,
    maximum: Option<f64>,
    format: Option<Format>,
    items: Option<Box<Node>>,
    min_items: Option<u64>,
    max_items: Option<u64>,
}

impl Node {
    fn expects_number(&self) -> bool {
        self.types
            .iter()
            .any(|t| matches!(t, JsonType::Number | JsonType::Integer))
            && !self.types.contains(&JsonType::String)
    }
}

impl Default for Node {
    fn default() -> Self {
        Self {
            reference: None,
            types: Vec::new(),
            properties: BTreeMap::new(),
            required: Vec::new(),
            additional_properties: true,
            enumeration: None,
            min_length: None,
            max_length: None,
            minimum: None,
            maximum: None,
            format: None,
            items: None,
            min_items: None,
            max_items: None,
        }
    }
}

/// A compiled payload schema
#[derive(Debug, Clone)]
pub struct Schema {
    id: Option<String>,
    root: Node,
    definitions: HashMap<String, Node>,
}

impl Schema {
    pub fn parse(source: &str, dialect: Dialect) -> Result<Self, SchemaError> {
        let value: Value =
            serde_json::from_str(source).map_err(|e| SchemaError::InvalidJson(e.to_string()))?;
        Self::compile(&value, dialect)
    }

    pub fn compile(value: &Value, dialect: Dialect) -> Result<Self, SchemaError> {
        let object = as_object(value, "#", "$schema")?;

        let id = match object.get(dialect.id_keyword()) {
            Some(Value::String(id)) => Some(id.clone()),
            Some(_) => {
                return Err(SchemaError::InvalidKeyword {
                    path: "#".into(),
                    keyword: dialect.id_keyword().into(),
                })
            }
            None => None,
        };

        let mut definitions = HashMap::new();
        if let Some(defs) = object.get("definitions") {
            for (name, def) in as_object(defs, "#", "definitions")? {
                let path = format!("#/definitions/{}", name);
                definitions.insert(name.clone(), compile_node(def, &path, dialect)?);
            }
        }

        let root = compile_node(value, "#", dialect)?;
        let schema = Self {
            id,
            root,
            definitions,
        };
        schema.check_references(&schema.root, "#")?;
        for (name, node) in &schema.definitions {
            schema.check_references(node, &format!("#/definitions/{}", name))?;
        }
        Ok(schema)
    }

    /// `id` / `$id` of the schema document
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Validate `value`, returning every violation found.
    pub fn validate(&self, value: &Value) -> Vec<Violation> {
        let mut violations = Vec::new();
        self.validate_node(&self.root, value, "", &mut violations);
        violations
    }

    /// Rewrite numeric strings as JSON numbers where the schema expects a
    /// number. Decimal values serialize as strings.
    pub fn coerce_numbers(&self, value: &mut Value) {
        self.coerce_node(&self.root, value);
    }

    fn coerce_node(&self, node: &Node, value: &mut Value) {
        if let Some(target) = node
            .reference
            .as_ref()
            .and_then(|name| self.definitions.get(name))
        {
            self.coerce_node(target, value);
            return;
        }

        match value {
            Value::String(_) if node.expects_number() => {
                let number = value
                    .as_str()
                    .and_then(|s| serde_json::from_str::<serde_json::Number>(s).ok());
                if let Some(number) = number {
                    *value = Value::Number(number);
                }
            }
            Value::Object(members) => {
                for (name, member) in members.iter_mut() {
                    if let Some(child) = node.properties.get(name) {
                        self.coerce_node(child, member);
                    }
                }
            }
            Value::Array(items) => {
                if let Some(item_schema) = &node.items {
                    for item in items.iter_mut() {
                        self.coerce_node(item_schema, item);
                    }
                }
            }
            _ => {}
        }
    }

    fn check_references(&self, node: &Node, path: &str) -> Result<(), SchemaError> {
        if let Some(reference) = &node.reference {
            if !self.definitions.contains_key(reference) {
                return Err(SchemaError::UnresolvedReference {
                    path: path.to_string(),
                    reference: format!("#/definitions/{}", reference),
                });
            }
        }
        for (name, child) in &node.properties {
            self.check_references(child, &format!("{}/properties/{}", path, name))?;
        }
        if let Some(items) = &node.items {
            self.check_references(items, &format!("{}/items", path))?;
        }
        Ok(())
    }

    fn validate_node(&self, node: &Node, value: &Value, pointer: &str, out: &mut Vec<Violation>) {
        if let Some(target) = node
            .reference
            .as_ref()
            .and_then(|name| self.definitions.get(name))
        {
            self.validate_node(target, value, pointer, out);
            return;
        }

        if !node.types.is_empty() && !node.types.iter().any(|t| t.matches(value)) {
            let expected: Vec<&str> = node.types.iter().map(JsonType::name).collect();
            out.push(Violation {
                pointer: pointer.to_string(),
                keyword: Keyword::Type,
                message: format!("expected {}, found {}", expected.join(" or "), kind_of(value)),
            });
            return;
        }

        if let Some(allowed) = &node.enumeration {
            if !allowed.contains(value) {
                out.push(Violation {
                    pointer: pointer.to_string(),
                    keyword: Keyword::Enum,
                    message: format!("{} is not one of the allowed values", value),
                });
            }
        }

        match value {
            Value::Object(members) => self.validate_object(node, members, pointer, out),
            Value::Array(items) => self.validate_array(node, items, pointer, out),
            Value::String(s) => validate_string(node, s, pointer, out),
            Value::Number(n) => {
                if let Some(n) = n.as_f64() {
                    validate_number(node, n, pointer, out);
                }
            }
            _ => {}
        }
    }

    fn validate_object(
        &self,
        node: &Node,
        members: &Map<String, Value>,
        pointer: &str,
        out: &mut Vec<Violation>,
    ) {
        for name in &node.required {
            if !members.contains_key(name) {
                out.push(Violation {
                    pointer: child_pointer(pointer, name),
                    keyword: Keyword::Required,
                    message: format!("required property '{}' is missing", name),
                });
            }
        }

        for (name, member) in members {
            let member_pointer = child_pointer(pointer, name);
            match node.properties.get(name) {
                Some(child) => self.validate_node(child, member, &member_pointer, out),
                None if !node.additional_properties => out.push(Violation {
                    pointer: member_pointer,
                    keyword: Keyword::AdditionalProperties,
                    message: format!("property '{}' is not allowed", name),
                }),
                None => {}
            }
        }
    }

    fn validate_array(&self, node: &Node, items: &[Value], pointer: &str, out: &mut Vec<Violation>) {
        let len = items.len() as u64;
        if let Some(min) = node.min_items {
            if len < min {
                out.push(Violation {
                    pointer: pointer.to_string(),
                    keyword: Keyword::MinItems,
                    message: format!("{} items, at least {} required", len, min),
                });
            }
        }
        if let Some(max) = node.max_items {
            if len > max {
                out.push(Violation {
                    pointer: pointer.to_string(),
                    keyword: Keyword::MaxItems,
                    message: format!("{} items, at most {} allowed", len, max),
                });
            }
        }
        if let Some(item_schema) = &node.items {
            for (index, item) in items.iter().enumerate() {
                let item_pointer = format!("{}/{}", pointer, index);
                self.validate_node(item_schema, item, &item_pointer, out);
            }
        }
    }
}

fn validate_string(node: &Node, s: &str, pointer: &str, out: &mut Vec<Violation>) {
    let len = s.chars().count() as u64;
    if let Some(min) = node.min_length {
        if len < min {
            out.push(Violation {
                pointer: pointer.to_string(),
                keyword: Keyword::MinLength,
                message: format!("length {} is shorter than {}", len, min),
            });
        }
    }
    if let Some(max) = node.max_length {
        if len > max {
            out.push(Violation {
                pointer: pointer.to_string(),
                keyword: Keyword::MaxLength,
                message: format!("length {} exceeds {}", len, max),
            });
        }
    }
    if let Some(format) = node.format {
        if !format.check(s) {
            out.push(Violation {
                pointer: pointer.to_string(),
                keyword: Keyword::Format,
                message: format!("'{}' is not a valid {}", s, format.name()),
            });
        }
    }
}

fn validate_number(node: &Node, n: f64, pointer: &str, out: &mut Vec<Violation>) {
    if let Some(min) = node.minimum {
        if n < min {
            out.push(Violation {
                pointer: pointer.to_string(),
                keyword: Keyword::Minimum,
                message: format!("{} is less than {}", n, min),
            });
        }
    }
    if let Some(max) = node.maximum {
        if n > max {
            out.push(Violation {
                pointer: pointer.to_string(),
                keyword: Keyword::Maximum,
                message: format!("{} is greater than {}", n, max),
            });
        }
    }
}

fn compile_node(value: &Value, path: &str, dialect: Dialect) -> Result<Node, SchemaError> {
    let object = as_object(value, path, "schema")?;
    let mut node = Node::default();

    for (keyword, arg) in object {
        let invalid = || SchemaError::InvalidKeyword {
            path: path.to_string(),
            keyword: keyword.clone(),
        };

        match keyword.as_str() {
            "$ref" => {
                let target = arg.as_str().ok_or_else(&invalid)?;
                let name = target.strip_prefix("#/definitions/").ok_or_else(|| {
                    SchemaError::UnresolvedReference {
                        path: path.to_string(),
                        reference: target.to_string(),
                    }
                })?;
                node.reference = Some(name.to_string());
            }
            "type" => {
                node.types = match arg {
                    Value::String(name) => vec![JsonType::parse(name).ok_or_else(&invalid)?],
                    Value::Array(names) => names
                        .iter()
                        .map(|n| n.as_str().and_then(JsonType::parse).ok_or_else(&invalid))
                        .collect::<Result<_, _>>()?,
                    _ => return Err(invalid()),
                };
            }
            "properties" => {
                for (name, child) in as_object(arg, path, keyword)? {
                    let child_path = format!("{}/properties/{}", path, name);
                    node.properties
                        .insert(name.clone(), compile_node(child, &child_path, dialect)?);
                }
            }
            "required" => {
                node.required = arg
                    .as_array()
                    .ok_or_else(&invalid)?
                    .iter()
                    .map(|n| n.as_str().map(str::to_string).ok_or_else(&invalid))
                    .collect::<Result<_, _>>()?;
            }
            "additionalProperties" => {
                node.additional_properties = arg.as_bool().ok_or_else(&invalid)?;
            }
            "enum" => node.enumeration = Some(arg.as_array().ok_or_else(&invalid)?.clone()),
            "minLength" => node.min_length = Some(arg.as_u64().ok_or_else(&invalid)?),
            "maxLength" => node.max_length = Some(arg.as_u64().ok_or_else(&invalid)?),
            "minimum" => node.minimum = Some(arg.as_f64().ok_or_else(&invalid)?),
            "maximum" => node.maximum = Some(arg.as_f64().ok_or_else(&invalid)?),
            "minItems" => node.min_items = Some(arg.as_u64().ok_or_else(&invalid)?),
            "maxItems" => node.max_items = Some(arg.as_u64().ok_or_else(&invalid)?),
            "format" => {
                node.format = match arg.as_str().ok_or_else(&invalid)? {
                    "date-time" => Some(Format::DateTime),
                    "uri" => Some(Format::Uri),
                    _ => return Err(invalid()),
                };
            }
            "items" => {
                let item_path = format!("{}/items", path);
                node.items = Some(Box::new(compile_node(arg, &item_path, dialect)?));
            }
            other if dialect.is_annotation(other) => {}
            other => {
                return Err(SchemaError::UnsupportedKeyword {
                    path: path.to_string(),
                    keyword: other.to_string(),
                })
            }
        }
    }

    Ok(node)
}

fn as_object<'a>(
    value: &'a Value,
    path: &str,
    keyword: &str,
) -> Result<&'a Map<String, Value>, SchemaError> {
    value.as_object().ok_or_else(|| SchemaError::InvalidKeyword {
        path: path.to_string(),
        keyword: keyword.to_string(),
    })
}

fn child_pointer(parent: &str, name: &str) -> String {
    format!("{}/{}", parent, name.replace('~', "~0").replace('/', "~1"))
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
