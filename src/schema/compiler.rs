//! JSON-Schema to constraint node compiler
//!
//! Recursive descent over a schema document. Every branch of the grammar maps
//! to exactly one `ConstraintNode` constructor; anything unrecognised degrades
//! to an unconstrained string instead of failing.

use std::collections::HashSet;

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::error::{LocalLmError, Result};

use super::node::{CompiledSchema, ConstraintNode, Property};

/// Only local definitions can be referenced
const DEFINITIONS_PREFIX: &str = "#/definitions/";

/// Compile a schema document held as text
pub fn compile_str(text: &str) -> Result<CompiledSchema> {
    let doc: Value = serde_json::from_str(text)
        .map_err(|e| LocalLmError::InvalidSchema(format!("not valid JSON: {}", e)))?;
    compile(&doc)
}

/// Compile a schema document into a root node and its named dependencies.
///
/// Each entry of `definitions` is compiled exactly once and stored under its
/// own name; every `$ref` compiles to a `Reference` to that entry.
pub fn compile(doc: &Value) -> Result<CompiledSchema> {
    let root = doc
        .as_object()
        .ok_or_else(|| LocalLmError::InvalidSchema("schema root must be a JSON object".to_string()))?;

    let definitions = match root.get("definitions") {
        Some(Value::Object(defs)) => Some(defs),
        Some(_) => {
            return Err(LocalLmError::InvalidSchema(
                "definitions must be a JSON object".to_string(),
            ));
        }
        None => None,
    };

    let mut compiler = Compiler::new(definitions);

    let mut dependencies = IndexMap::new();
    if let Some(defs) = definitions {
        for (name, definition) in defs {
            let node = compiler.compile_node(definition, Some(name.as_str()))?;
            dependencies.insert(name.clone(), node);
        }
    }

    let root_node = compiler.compile_node(doc, None)?;

    Ok(CompiledSchema {
        root: root_node,
        dependencies,
    })
}

/// Per-invocation compile state
struct Compiler<'a> {
    definitions: Option<&'a Map<String, Value>>,
    used_names: HashSet<String>,
    anonymous_count: usize,
}

impl<'a> Compiler<'a> {
    fn new(definitions: Option<&'a Map<String, Value>>) -> Self {
        let used_names = definitions
            .map(|defs| defs.keys().cloned().collect())
            .unwrap_or_default();
        Self {
            definitions,
            used_names,
            anonymous_count: 0,
        }
    }

    fn compile_node(&mut self, schema: &Value, name_hint: Option<&str>) -> Result<ConstraintNode> {
        let Some(map) = schema.as_object() else {
            log::debug!("Non-object subschema {} compiled as string", schema);
            return Ok(ConstraintNode::String);
        };

        if let Some(reference) = map.get("$ref") {
            return self.compile_reference(reference);
        }

        let naming = match name_hint {
            Some(name) => Naming::Definition(name),
            None => map
                .get("title")
                .and_then(Value::as_str)
                .map_or(Naming::Anonymous, Naming::Title),
        };

        let branches = map
            .get("anyOf")
            .or_else(|| map.get("oneOf"))
            .and_then(Value::as_array);
        if let Some(branches) = branches
            && !branches.is_empty()
        {
            return self.compile_union(branches, naming);
        }

        if let Some(value) = map.get("const") {
            let values = enum_values(std::slice::from_ref(value));
            return Ok(ConstraintNode::Enum {
                name: self.node_name(naming, "Enum"),
                values,
            });
        }

        if let Some(Value::Array(options)) = map.get("enum") {
            let values = enum_values(options);
            if !values.is_empty() {
                return Ok(ConstraintNode::Enum {
                    name: self.node_name(naming, "Enum"),
                    values,
                });
            }
        }

        match schema_type(map) {
            Some("string") => Ok(ConstraintNode::String),
            Some("number") => Ok(ConstraintNode::Number),
            Some("integer") => Ok(ConstraintNode::Integer),
            Some("boolean") => Ok(ConstraintNode::Boolean),
            Some("array") => self.compile_array(map),
            Some("object") => self.compile_object(map, naming),
            other => {
                log::debug!("Unrecognised schema type {:?}, falling back to string", other);
                Ok(ConstraintNode::String)
            }
        }
    }

    fn compile_reference(&self, reference: &Value) -> Result<ConstraintNode> {
        let pointer = reference
            .as_str()
            .ok_or_else(|| LocalLmError::InvalidSchema("$ref must be a string".to_string()))?;

        let name = pointer.strip_prefix(DEFINITIONS_PREFIX).ok_or_else(|| {
            LocalLmError::InvalidSchema(format!(
                "$ref '{}' must point into {}",
                pointer, DEFINITIONS_PREFIX
            ))
        })?;

        let known = self.definitions.is_some_and(|defs| defs.contains_key(name));
        if !known {
            return Err(LocalLmError::InvalidSchema(format!(
                "$ref '{}' names an unknown definition",
                pointer
            )));
        }

        Ok(ConstraintNode::Reference { name: name.to_string() })
    }

    fn compile_union(&mut self, branches: &[Value], naming: Naming<'_>) -> Result<ConstraintNode> {
        let literals: Vec<String> = branches.iter().filter_map(single_enum_value).collect();

        if literals.len() == branches.len() {
            return Ok(ConstraintNode::Enum {
                name: self.node_name(naming, "Enum"),
                values: literals,
            });
        }

        let name = self.node_name(naming, "Union");
        let mut variants = Vec::with_capacity(branches.len());
        for branch in branches {
            variants.push(self.compile_node(branch, None)?);
        }

        Ok(ConstraintNode::Union { name, variants })
    }

    fn compile_array(&mut self, map: &Map<String, Value>) -> Result<ConstraintNode> {
        let element = match map.get("items") {
            Some(items @ Value::Object(_)) => self.compile_node(items, None)?,
            _ => ConstraintNode::String,
        };

        Ok(ConstraintNode::Array {
            element: Box::new(element),
            min_items: map.get("minItems").and_then(Value::as_u64),
            max_items: map.get("maxItems").and_then(Value::as_u64),
        })
    }

    fn compile_object(&mut self, map: &Map<String, Value>, naming: Naming<'_>) -> Result<ConstraintNode> {
        let name = self.node_name(naming, "Object");

        let required: Vec<&str> = map
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let mut properties = Vec::new();
        if let Some(Value::Object(fields)) = map.get("properties") {
            for (field, field_schema) in fields {
                let node = self.compile_node(field_schema, None)?;
                let description = field_schema
                    .get("description")
                    .and_then(Value::as_str)
                    .map(str::to_string);

                properties.push(Property {
                    name: field.clone(),
                    node,
                    description,
                    optional: !required.contains(&field.as_str()),
                });
            }
        }

        Ok(ConstraintNode::Object { name, properties })
    }

    /// Name a node. Definition keys are used as-is; a title that is already
    /// taken in this compile gets a `_{n}` suffix; anything else is minted
    /// as `{kind}{n}`.
    fn node_name(&mut self, naming: Naming<'_>, kind: &str) -> String {
        match naming {
            Naming::Definition(name) => {
                self.used_names.insert(name.to_string());
                name.to_string()
            }
            Naming::Title(title) => {
                if self.used_names.insert(title.to_string()) {
                    return title.to_string();
                }
                (2..)
                    .map(|n| format!("{}_{}", title, n))
                    .find(|candidate| self.used_names.insert(candidate.clone()))
                    .unwrap_or_else(|| title.to_string())
            }
            Naming::Anonymous => loop {
                self.anonymous_count += 1;
                let candidate = format!("{}{}", kind, self.anonymous_count);
                if self.used_names.insert(candidate.clone()) {
                    return candidate;
                }
            },
        }
    }
}

/// Where a node's name comes from
#[derive(Debug, Clone, Copy)]
enum Naming<'s> {
    /// Key under `definitions`, reserved before compiling starts
    Definition(&'s str),
    /// Schema-level `title`
    Title(&'s str),
    Anonymous,
}

/// The `type` keyword; for a list of types the first non-null one wins
fn schema_type(map: &Map<String, Value>) -> Option<&str> {
    match map.get("type")? {
        Value::String(t) => Some(t.as_str()),
        Value::Array(types) => types.iter().filter_map(Value::as_str).find(|t| *t != "null"),
        _ => None,
    }
}

/// `{"enum": [x]}` or `{"const": x}` branch of an anyOf
fn single_enum_value(branch: &Value) -> Option<String> {
    let map = branch.as_object()?;
    if let Some(Value::Array(options)) = map.get("enum")
        && options.len() == 1
    {
        return enum_values(options).into_iter().next();
    }
    map.get("const")
        .and_then(|value| enum_values(std::slice::from_ref(value)).into_iter().next())
}

fn enum_values(options: &[Value]) -> Vec<String> {
    options
        .iter()
        .filter_map(|option| match option {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Null => Some("null".to_string()),
            other => {
                log::warn!("Skipping non-scalar enum value {}", other);
                None
            }
        })
        .collect()
}
