//! An immutable arena tree and the node handles used to navigate it.
//!
//! A [`Document`] stores its nodes in document order; a [`NodeHandle`] pairs a
//! shared reference to the document with an index into that arena, so handles
//! are cheap to clone and compare. Trees built from a document node have the
//! document at index 0; trees built for parentless nodes (an element created
//! into a temporary variable, for example) have that node at index 0.

mod builder;
mod parse;

pub use builder::TreeBuilder;
pub use parse::parse_document;

use crate::qname::{NamespaceBinding, QName, XML_NAMESPACE};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

static NEXT_DOCUMENT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Document,
    Element,
    Attribute,
    Text,
    Comment,
    ProcessingInstruction,
    Namespace,
}

#[derive(Debug, Clone)]
pub(crate) struct NodeData {
    pub(crate) kind: NodeKind,
    /// Element/attribute name, PI target or namespace prefix (as the local part).
    pub(crate) name: Option<QName>,
    /// Content of text, comment, PI, attribute and namespace nodes.
    pub(crate) value: String,
    pub(crate) parent: Option<usize>,
    pub(crate) children: Vec<usize>,
    pub(crate) attributes: Vec<usize>,
    pub(crate) namespaces: Vec<usize>,
}

impl NodeData {
    pub(crate) fn new(kind: NodeKind, name: Option<QName>, value: String, parent: Option<usize>) -> Self {
        Self {
            kind,
            name,
            value,
            parent,
            children: Vec::new(),
            attributes: Vec::new(),
            namespaces: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub struct Document {
    id: u64,
    nodes: Vec<NodeData>,
    base_uri: Option<String>,
}

impl Document {
    pub(crate) fn from_nodes(nodes: Vec<NodeData>, base_uri: Option<String>) -> Self {
        Self {
            id: NEXT_DOCUMENT_ID.fetch_add(1, AtomicOrdering::Relaxed),
            nodes,
            base_uri,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn base_uri(&self) -> Option<&str> {
        self.base_uri.as_deref()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The first node of the arena: the document node, or the parentless
    /// node the tree was built for.
    pub fn root(self: &Arc<Self>) -> Option<NodeHandle> {
        (!self.nodes.is_empty()).then(|| NodeHandle {
            doc: Arc::clone(self),
            index: 0,
        })
    }
}

/// A reference to one node of a [`Document`].
#[derive(Clone)]
pub struct NodeHandle {
    doc: Arc<Document>,
    index: usize,
}

impl NodeHandle {
    fn data(&self) -> &NodeData {
        &self.doc.nodes[self.index]
    }

    fn at(&self, index: usize) -> NodeHandle {
        NodeHandle {
            doc: Arc::clone(&self.doc),
            index,
        }
    }

    pub fn document(&self) -> &Arc<Document> {
        &self.doc
    }

    pub fn kind(&self) -> NodeKind {
        self.data().kind
    }

    pub fn is_element(&self) -> bool {
        self.kind() == NodeKind::Element
    }

    /// The node name: element and attribute names, the PI target, or the
    /// namespace prefix. `None` for documents, text and comments.
    pub fn name(&self) -> Option<&QName> {
        self.data().name.as_ref()
    }

    pub fn local_name(&self) -> &str {
        self.name().map(|q| q.local.as_str()).unwrap_or("")
    }

    pub fn string_value(&self) -> String {
        match self.kind() {
            NodeKind::Document | NodeKind::Element => {
                let mut out = String::new();
                for node in self.descendants() {
                    if node.kind() == NodeKind::Text {
                        out.push_str(&node.data().value);
                    }
                }
                out
            }
            _ => self.data().value.clone(),
        }
    }

    pub fn parent(&self) -> Option<NodeHandle> {
        self.data().parent.map(|p| self.at(p))
    }

    pub fn children(&self) -> impl Iterator<Item = NodeHandle> + '_ {
        self.data().children.iter().map(move |&c| self.at(c))
    }

    pub fn attributes(&self) -> impl Iterator<Item = NodeHandle> + '_ {
        self.data().attributes.iter().map(move |&a| self.at(a))
    }

    /// Namespace nodes declared on this element.
    pub fn namespaces(&self) -> impl Iterator<Item = NodeHandle> + '_ {
        self.data().namespaces.iter().map(move |&n| self.at(n))
    }

    pub fn attribute(&self, name: &QName) -> Option<String> {
        self.attributes()
            .find(|a| a.name() == Some(name))
            .map(|a| a.data().value.clone())
    }

    /// Descendants in document order, excluding attributes and namespaces.
    pub fn descendants(&self) -> Descendants {
        let mut stack: Vec<usize> = self.data().children.clone();
        stack.reverse();
        Descendants {
            doc: Arc::clone(&self.doc),
            stack,
        }
    }

    pub fn ancestors(&self) -> impl Iterator<Item = NodeHandle> {
        std::iter::successors(self.parent(), |n| n.parent())
    }

    /// The outermost ancestor-or-self.
    pub fn root(&self) -> NodeHandle {
        self.ancestors().last().unwrap_or_else(|| self.clone())
    }

    /// The binding a namespace node represents.
    pub fn namespace_binding(&self) -> Option<NamespaceBinding> {
        (self.kind() == NodeKind::Namespace)
            .then(|| NamespaceBinding::new(self.local_name(), self.data().value.clone()))
    }

    /// All namespace bindings in scope for an element, innermost first
    /// declaration winning. The `xml` binding is implicit and not included.
    pub fn in_scope_namespaces(&self) -> Vec<NamespaceBinding> {
        let mut out: Vec<NamespaceBinding> = Vec::new();
        let mut current = Some(self.clone());
        while let Some(node) = current {
            for ns in node.namespaces().filter_map(|n| n.namespace_binding()) {
                if !out.iter().any(|b| b.prefix == ns.prefix) {
                    out.push(ns);
                }
            }
            current = node.parent();
        }
        out.retain(|b| !(b.prefix.is_empty() && b.uri.is_empty()));
        out
    }

    /// The base URI, taking `xml:base` attributes on this node and its
    /// ancestors into account.
    pub fn base_uri(&self) -> Option<String> {
        let inherited = match self.parent() {
            Some(parent) => parent.base_uri(),
            None => self.doc.base_uri.clone(),
        };
        if self.kind() != NodeKind::Element {
            return inherited;
        }
        match self.attribute(&QName::new("xml", XML_NAMESPACE, "base")) {
            Some(local) => Some(resolve_uri(&local, inherited.as_deref())),
            None => inherited,
        }
    }

    pub fn is_same_node(&self, other: &NodeHandle) -> bool {
        Arc::ptr_eq(&self.doc, &other.doc) && self.index == other.index
    }

    /// Position within the arena; document order within one tree.
    pub fn index(&self) -> usize {
        self.index
    }
}

/// Resolves `relative` against `base`, returning `relative` unchanged when it
/// is already absolute or no usable base exists.
pub fn resolve_uri(relative: &str, base: Option<&str>) -> String {
    if url::Url::parse(relative).is_ok() {
        return relative.to_string();
    }
    base.and_then(|b| url::Url::parse(b).ok())
        .and_then(|b| b.join(relative).ok())
        .map(|u| u.to_string())
        .unwrap_or_else(|| relative.to_string())
}

pub struct Descendants {
    doc: Arc<Document>,
    stack: Vec<usize>,
}

impl Iterator for Descendants {
    type Item = NodeHandle;

    fn next(&mut self) -> Option<NodeHandle> {
        let index = self.stack.pop()?;
        let children = &self.doc.nodes[index].children;
        self.stack.extend(children.iter().rev());
        Some(NodeHandle {
            doc: Arc::clone(&self.doc),
            index,
        })
    }
}

impl PartialEq for NodeHandle {
    fn eq(&self, other: &Self) -> bool {
        self.is_same_node(other)
    }
}

impl Eq for NodeHandle {}

impl Hash for NodeHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.doc.id.hash(state);
        self.index.hash(state);
    }
}

impl PartialOrd for NodeHandle {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NodeHandle {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.doc.id, self.index).cmp(&(other.doc.id, other.index))
    }
}

impl fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{:?}({}#{})", self.kind(), name, self.index),
            None => write!(f, "{:?}(#{})", self.kind(), self.index),
        }
    }
}
