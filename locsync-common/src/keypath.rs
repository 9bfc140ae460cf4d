//! Dot-path key utilities for language-pack documents
//!
//! A language pack is a JSON document that is either a flat map of dotted
//! keys to strings or an arbitrarily nested object. These helpers flatten a
//! nested document into dotted paths (preserving document order), re-nest a
//! flat key list back into a tree, and compute the canonical export order
//! from a project's template.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Whether an exported document is a flat dotted-key map or a nested tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentShape {
    Flat,
    Tree,
}

impl DocumentShape {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentShape::Flat => "flat",
            DocumentShape::Tree => "tree",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "flat" => Some(DocumentShape::Flat),
            "tree" => Some(DocumentShape::Tree),
            _ => None,
        }
    }
}

/// Result of flattening a language-pack document.
#[derive(Debug, Clone)]
pub struct FlattenedDocument {
    /// (dotted key, text) pairs in document order
    pub pairs: Vec<(String, String)>,
    /// Detected shape of the source document
    pub shape: DocumentShape,
    /// Leaves skipped because they were not strings (numbers, bools, ...)
    pub skipped_non_string: usize,
}

/// Flatten a language-pack document into dotted-path keys.
///
/// Returns `None` if the document is not a JSON object at the top level.
/// A document with at least one nested object value is `tree`; otherwise it
/// is `flat`. Non-string leaves are skipped and counted, never an error —
/// a bad row degrades to a count.
pub fn flatten_document(doc: &Value) -> Option<FlattenedDocument> {
    let map = doc.as_object()?;

    let mut flattened = FlattenedDocument {
        pairs: Vec::new(),
        shape: DocumentShape::Flat,
        skipped_non_string: 0,
    };
    flatten_into(map, "", &mut flattened);
    Some(flattened)
}

fn flatten_into(map: &Map<String, Value>, prefix: &str, out: &mut FlattenedDocument) {
    for (key, value) in map {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        match value {
            Value::String(text) => out.pairs.push((path, text.clone())),
            Value::Object(nested) => {
                out.shape = DocumentShape::Tree;
                flatten_into(nested, &path, out);
            }
            _ => out.skipped_non_string += 1,
        }
    }
}

/// Re-nest flat (dotted key, text) pairs into a tree document.
///
/// Pairs are inserted in the given order. A key that conflicts with an
/// earlier leaf along its path (e.g. `"a"` then `"a.b"`) replaces the leaf
/// with an object; the later write wins.
pub fn nest_document(pairs: &[(String, String)]) -> Value {
    let mut root = Map::new();
    for (key, text) in pairs {
        let segments: Vec<&str> = key.split('.').collect();
        insert_nested(&mut root, &segments, text);
    }
    Value::Object(root)
}

fn insert_nested(map: &mut Map<String, Value>, segments: &[&str], text: &str) {
    match segments {
        [] => {}
        [leaf] => {
            map.insert(leaf.to_string(), Value::String(text.to_string()));
        }
        [head, rest @ ..] => {
            let child = map
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !child.is_object() {
                *child = Value::Object(Map::new());
            }
            if let Value::Object(nested) = child {
                insert_nested(nested, rest, text);
            }
        }
    }
}

/// Order catalog keys canonically for export: template items first in their
/// recorded positions, then any catalog keys absent from the template in
/// sorted key order so repeated exports are byte-stable.
pub fn canonical_order(template: &[String], keys: &[String]) -> Vec<String> {
    let mut ordered = Vec::with_capacity(keys.len());
    for item in template {
        if keys.iter().any(|k| k == item) {
            ordered.push(item.clone());
        }
    }
    let mut remaining: Vec<String> = keys
        .iter()
        .filter(|k| !template.contains(k))
        .cloned()
        .collect();
    remaining.sort();
    ordered.extend(remaining);
    ordered
}
