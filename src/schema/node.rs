//! Constraint node types
//!
//! The closed, typed form of a JSON-Schema fragment that the model runtime
//! enforces while generating.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One node of a compiled schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConstraintNode {
    String,
    Number,
    Integer,
    Boolean,
    Array {
        element: Box<ConstraintNode>,
        #[serde(skip_serializing_if = "Option::is_none")]
        min_items: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        max_items: Option<u64>,
    },
    Object {
        name: String,
        properties: Vec<Property>,
    },
    Enum {
        name: String,
        values: Vec<String>,
    },
    Union {
        name: String,
        variants: Vec<ConstraintNode>,
    },
    Reference {
        name: String,
    },
}

impl ConstraintNode {
    /// Name carried by the node, if its variant has one
    pub fn name(&self) -> Option<&str> {
        match self {
            ConstraintNode::Object { name, .. }
            | ConstraintNode::Enum { name, .. }
            | ConstraintNode::Union { name, .. }
            | ConstraintNode::Reference { name } => Some(name),
            _ => None,
        }
    }

    /// Short label for diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            ConstraintNode::String => "string",
            ConstraintNode::Number => "number",
            ConstraintNode::Integer => "integer",
            ConstraintNode::Boolean => "boolean",
            ConstraintNode::Array { .. } => "array",
            ConstraintNode::Object { .. } => "object",
            ConstraintNode::Enum { .. } => "enum",
            ConstraintNode::Union { .. } => "union",
            ConstraintNode::Reference { .. } => "reference",
        }
    }

    /// Push every reference name reachable from this node
    fn collect_references<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            ConstraintNode::Reference { name } => out.push(name),
            ConstraintNode::Array { element, .. } => element.collect_references(out),
            ConstraintNode::Object { properties, .. } => {
                for property in properties {
                    property.node.collect_references(out);
                }
            }
            ConstraintNode::Union { variants, .. } => {
                for variant in variants {
                    variant.collect_references(out);
                }
            }
            _ => {}
        }
    }
}

/// A named field of an object node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    pub node: ConstraintNode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub optional: bool,
}

/// Output of one compile: a root node plus the named nodes it refers to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledSchema {
    pub root: ConstraintNode,
    pub dependencies: IndexMap<String, ConstraintNode>,
}

impl CompiledSchema {
    /// Look up a dependency by name
    pub fn resolve(&self, name: &str) -> Option<&ConstraintNode> {
        self.dependencies.get(name)
    }

    /// All reference names in the schema that have no dependency entry.
    ///
    /// Empty for anything the compiler produced.
    pub fn unresolved_references(&self) -> Vec<String> {
        let mut refs = Vec::new();
        self.root.collect_references(&mut refs);
        for node in self.dependencies.values() {
            node.collect_references(&mut refs);
        }

        let mut missing: Vec<String> = Vec::new();
        for name in refs {
            if !self.dependencies.contains_key(name) && !missing.iter().any(|m| m == name) {
                missing.push(name.to_string());
            }
        }
        missing
    }
}
