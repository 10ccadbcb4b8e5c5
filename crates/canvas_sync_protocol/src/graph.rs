//! Canvas graph elements and deltas.

use crate::error::ApplyError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// A node or an edge of the canvas.
///
/// The sync engine only interprets `id`. `body` is the element's opaque
/// payload. `working` carries editor-only transient metadata (in-progress
/// drafts and the like); it is stripped before diffing and never enters the
/// transaction log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    /// Element ID, unique within its collection.
    pub id: String,
    /// Opaque payload.
    #[serde(default)]
    pub body: Value,
    /// Editor-only transient metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working: Option<Value>,
}

impl Element {
    /// Creates an element without transient metadata.
    pub fn new(id: impl Into<String>, body: Value) -> Self {
        Self {
            id: id.into(),
            body,
            working: None,
        }
    }

    /// Attaches transient metadata.
    #[must_use]
    pub fn with_working(mut self, working: Value) -> Self {
        self.working = Some(working);
        self
    }

    /// Returns a copy without transient metadata.
    #[must_use]
    pub fn stripped(&self) -> Self {
        Self {
            id: self.id.clone(),
            body: self.body.clone(),
            working: None,
        }
    }
}

/// Which collection an element belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    /// A graph node.
    Node,
    /// A graph edge.
    Edge,
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementKind::Node => f.write_str("node"),
            ElementKind::Edge => f.write_str("edge"),
        }
    }
}

/// The editor's node/edge collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    /// Nodes in editor order.
    #[serde(default)]
    pub nodes: Vec<Element>,
    /// Edges in editor order.
    #[serde(default)]
    pub edges: Vec<Element>,
}

impl Graph {
    /// Creates a graph from its collections.
    pub fn new(nodes: Vec<Element>, edges: Vec<Element>) -> Self {
        Self { nodes, edges }
    }

    /// Returns true if the graph has no nodes and no edges.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    /// Returns a copy with all transient metadata removed.
    #[must_use]
    pub fn strip_working(&self) -> Self {
        Self {
            nodes: self.nodes.iter().map(Element::stripped).collect(),
            edges: self.edges.iter().map(Element::stripped).collect(),
        }
    }

    /// Looks up a node by ID.
    pub fn node(&self, id: &str) -> Option<&Element> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Looks up an edge by ID.
    pub fn edge(&self, id: &str) -> Option<&Element> {
        self.edges.iter().find(|e| e.id == id)
    }

    /// Applies a delta, returning the resulting graph.
    ///
    /// Application is all-or-nothing: on error `self` is untouched and no
    /// partial result escapes.
    ///
    /// # Errors
    ///
    /// Returns an error if the delta adds an existing element or updates or
    /// removes a missing one.
    pub fn apply(&self, delta: &GraphDelta) -> Result<Graph, ApplyError> {
        let mut next = self.clone();
        delta.nodes.apply_to(&mut next.nodes, ElementKind::Node)?;
        delta.edges.apply_to(&mut next.edges, ElementKind::Edge)?;
        Ok(next)
    }
}

/// Changes to one element collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementDelta {
    /// Elements that did not exist before.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub added: Vec<Element>,
    /// Elements whose content changed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub updated: Vec<Element>,
    /// IDs of elements that were removed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub removed: Vec<String>,
}

impl ElementDelta {
    /// Returns true if nothing changed.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }

    /// Returns the number of element changes.
    pub fn len(&self) -> usize {
        self.added.len() + self.updated.len() + self.removed.len()
    }

    fn apply_to(&self, elements: &mut Vec<Element>, kind: ElementKind) -> Result<(), ApplyError> {
        for id in &self.removed {
            let pos = position(elements, id).ok_or_else(|| ApplyError::Missing {
                kind,
                id: id.clone(),
            })?;
            elements.remove(pos);
        }

        for element in &self.updated {
            let pos = position(elements, &element.id).ok_or_else(|| ApplyError::Missing {
                kind,
                id: element.id.clone(),
            })?;
            elements[pos] = element.clone();
        }

        for element in &self.added {
            if position(elements, &element.id).is_some() {
                return Err(ApplyError::AlreadyExists {
                    kind,
                    id: element.id.clone(),
                });
            }
            elements.push(element.clone());
        }

        Ok(())
    }
}

fn position(elements: &[Element], id: &str) -> Option<usize> {
    elements.iter().position(|e| e.id == id)
}

/// A transaction payload: the node and edge changes of one capture.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphDelta {
    /// Node changes.
    #[serde(default)]
    pub nodes: ElementDelta,
    /// Edge changes.
    #[serde(default)]
    pub edges: ElementDelta,
}

impl GraphDelta {
    /// Returns true if the delta changes nothing.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    /// Returns the total number of element changes.
    pub fn len(&self) -> usize {
        self.nodes.len() + self.edges.len()
    }

    /// Decodes a delta from a raw transaction payload.
    ///
    /// # Errors
    ///
    /// Returns [`ApplyError::Undecodable`] if the payload has the wrong shape.
    pub fn from_value(payload: &Value) -> Result<Self, ApplyError> {
        if !payload.is_object() {
            return Err(ApplyError::Undecodable(format!(
                "expected an object, found {}",
                json_type(payload)
            )));
        }
        Self::deserialize(payload).map_err(|e| ApplyError::Undecodable(e.to_string()))
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
