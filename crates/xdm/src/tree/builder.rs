use super::{Document, NodeData, NodeHandle, NodeKind};
use crate::error::{Result, XdmError};
use crate::item::Item;
use crate::qname::{NamespaceBinding, QName, XML_NAMESPACE, XMLNS_NAMESPACE};
use crate::receiver::{Receiver, copy_node};
use std::sync::Arc;

/// A [`Receiver`] that builds an arena [`Document`].
///
/// The tree is rooted either at a document node (when the first event is
/// `start_document`) or at whatever single node the first event creates.
#[derive(Debug, Default)]
pub struct TreeBuilder {
    nodes: Vec<NodeData>,
    /// Open document/element nodes, with a flag recording whether child
    /// content has been written to each.
    open: Vec<(usize, bool)>,
    /// Nested `start_document` calls inside content are transparent.
    absorbed_documents: usize,
    last_was_atomic: bool,
    base_uri: Option<String>,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_uri(mut self, base_uri: Option<String>) -> Self {
        self.base_uri = base_uri;
        self
    }

    /// Completes the tree and returns its root node.
    pub fn finish(self) -> Result<NodeHandle> {
        if !self.open.is_empty() {
            return Err(XdmError::Unbalanced(format!(
                "{} node(s) still open at end of tree",
                self.open.len()
            )));
        }
        let doc = Arc::new(Document::from_nodes(self.nodes, self.base_uri));
        doc.root()
            .ok_or_else(|| XdmError::Unbalanced("no nodes were written".to_string()))
    }

    fn add(&mut self, kind: NodeKind, name: Option<QName>, value: String) -> Result<usize> {
        let parent = self.open.last().map(|&(p, _)| p);
        if parent.is_none() && !self.nodes.is_empty() {
            return Err(XdmError::Unbalanced(
                "a tree can only have one top-level node".to_string(),
            ));
        }
        let index = self.nodes.len();
        self.nodes.push(NodeData::new(kind, name, value, parent));
        if let Some(p) = parent {
            match kind {
                NodeKind::Attribute => self.nodes[p].attributes.push(index),
                NodeKind::Namespace => self.nodes[p].namespaces.push(index),
                _ => {
                    self.nodes[p].children.push(index);
                    if let Some(top) = self.open.last_mut() {
                        top.1 = true;
                    }
                }
            }
        }
        Ok(index)
    }

    /// Checks that an attribute or namespace may be attached to the open
    /// node, returning the element index (or `None` for a parentless node).
    fn attachment_point(&self, name: &str) -> Result<Option<usize>> {
        match self.open.last() {
            None => Ok(None),
            Some(&(index, content_started)) => {
                if self.nodes[index].kind == NodeKind::Document {
                    Err(XdmError::attribute_on_document(name))
                } else if content_started {
                    Err(XdmError::attribute_after_children(name))
                } else {
                    Ok(Some(index))
                }
            }
        }
    }

    /// The URI bound to `prefix` at `element`, searching outwards.
    fn bound_uri(&self, element: usize, prefix: &str) -> Option<&str> {
        let mut current = Some(element);
        while let Some(index) = current {
            let node = &self.nodes[index];
            for &ns in &node.namespaces {
                let ns = &self.nodes[ns];
                if ns.name.as_ref().is_some_and(|n| n.local == prefix) {
                    return Some(ns.value.as_str());
                }
            }
            current = node.parent;
        }
        None
    }

    /// Declares `prefix` on `element` unless it is already bound to `uri`.
    fn ensure_namespace(&mut self, element: usize, prefix: &str, uri: &str) -> Result<()> {
        if prefix == "xml" {
            return Ok(());
        }
        let current = self.bound_uri(element, prefix).unwrap_or("");
        if current == uri {
            return Ok(());
        }
        let own_declaration = self.nodes[element].namespaces.iter().copied().find(|&ns| {
            self.nodes[ns]
                .name
                .as_ref()
                .is_some_and(|n| n.local == prefix)
        });
        match own_declaration {
            // A prefix already claimed by the element's own name keeps its binding.
            Some(_) if self.nodes[element].name.as_ref().is_some_and(|n| n.prefix == prefix) => {}
            Some(ns) => self.nodes[ns].value = uri.to_string(),
            None => {
                let index = self.nodes.len();
                self.nodes.push(NodeData::new(
                    NodeKind::Namespace,
                    Some(QName::local(prefix)),
                    uri.to_string(),
                    Some(element),
                ));
                self.nodes[element].namespaces.push(index);
            }
        }
        Ok(())
    }

    /// Chooses a prefix for a namespaced attribute that does not clash with a
    /// different binding already made on `element`. Generated prefixes are
    /// `ns0`, `ns1`, ...
    fn attribute_name_in_scope(&self, element: usize, name: &QName) -> QName {
        if name.uri.is_empty() || name.uri == XML_NAMESPACE {
            return name.clone();
        }
        let clashes = |prefix: &str| {
            prefix.is_empty()
                || self.nodes[element]
                    .name
                    .as_ref()
                    .is_some_and(|n| n.prefix == prefix && n.uri != name.uri)
                || self.nodes[element].namespaces.iter().any(|&ns| {
                    let ns = &self.nodes[ns];
                    ns.name.as_ref().is_some_and(|n| n.local == prefix) && ns.value != name.uri
                })
        };
        if !clashes(&name.prefix) {
            return name.clone();
        }
        let mut n = 0;
        loop {
            let candidate = format!("ns{}", n);
            if !clashes(&candidate)
                && self
                    .bound_uri(element, &candidate)
                    .is_none_or(|uri| uri == name.uri)
            {
                return name.with_prefix(candidate);
            }
            n += 1;
        }
    }

    fn event(&mut self) {
        self.last_was_atomic = false;
    }
}

impl Receiver for TreeBuilder {
    fn start_document(&mut self) -> Result<()> {
        self.event();
        if self.nodes.is_empty() {
            self.add(NodeKind::Document, None, String::new())?;
            self.open.push((0, false));
        } else {
            self.absorbed_documents += 1;
        }
        Ok(())
    }

    fn end_document(&mut self) -> Result<()> {
        self.event();
        if self.absorbed_documents > 0 {
            self.absorbed_documents -= 1;
            return Ok(());
        }
        match self.open.pop() {
            Some((index, _)) if self.nodes[index].kind == NodeKind::Document => Ok(()),
            _ => Err(XdmError::Unbalanced("end_document without matching start".to_string())),
        }
    }

    fn start_element(&mut self, name: &QName) -> Result<()> {
        self.event();
        let index = self.add(NodeKind::Element, Some(name.clone()), String::new())?;
        self.open.push((index, false));
        if !name.uri.is_empty() || !name.prefix.is_empty() {
            self.ensure_namespace(index, &name.prefix, &name.uri)?;
        } else if self.bound_uri(index, "").is_some_and(|u| !u.is_empty()) {
            self.ensure_namespace(index, "", "")?;
        }
        Ok(())
    }

    fn namespace(&mut self, binding: &NamespaceBinding) -> Result<()> {
        self.event();
        if binding.uri == XMLNS_NAMESPACE || binding.prefix == "xmlns" {
            return Ok(());
        }
        match self.attachment_point(&binding.prefix)? {
            Some(element) => self.ensure_namespace(element, &binding.prefix, &binding.uri),
            None => self
                .add(
                    NodeKind::Namespace,
                    Some(QName::local(binding.prefix.clone())),
                    binding.uri.clone(),
                )
                .map(|_| ()),
        }
    }

    fn attribute(&mut self, name: &QName, value: &str) -> Result<()> {
        self.event();
        match self.attachment_point(&name.display_name())? {
            Some(element) => {
                let name = self.attribute_name_in_scope(element, name);
                let existing = self.nodes[element]
                    .attributes
                    .iter()
                    .copied()
                    .find(|&a| self.nodes[a].name.as_ref() == Some(&name));
                match existing {
                    Some(a) => self.nodes[a].value = value.to_string(),
                    None => {
                        self.add(NodeKind::Attribute, Some(name.clone()), value.to_string())?;
                    }
                }
                if !name.uri.is_empty() && name.uri != XML_NAMESPACE {
                    self.ensure_namespace(element, &name.prefix, &name.uri)?;
                }
                Ok(())
            }
            None => self
                .add(NodeKind::Attribute, Some(name.clone()), value.to_string())
                .map(|_| ()),
        }
    }

    fn end_element(&mut self) -> Result<()> {
        self.event();
        match self.open.pop() {
            Some((index, _)) if self.nodes[index].kind == NodeKind::Element => Ok(()),
            _ => Err(XdmError::Unbalanced("end_element without matching start".to_string())),
        }
    }

    fn characters(&mut self, text: &str) -> Result<()> {
        self.event();
        if text.is_empty() {
            return Ok(());
        }
        let previous_text = self
            .open
            .last()
            .and_then(|&(parent, _)| self.nodes[parent].children.last().copied())
            .filter(|&last| self.nodes[last].kind == NodeKind::Text);
        if let Some(last) = previous_text {
            self.nodes[last].value.push_str(text);
            return Ok(());
        }
        self.add(NodeKind::Text, None, text.to_string()).map(|_| ())
    }

    fn comment(&mut self, text: &str) -> Result<()> {
        self.event();
        self.add(NodeKind::Comment, None, text.to_string()).map(|_| ())
    }

    fn processing_instruction(&mut self, target: &str, data: &str) -> Result<()> {
        self.event();
        self.add(
            NodeKind::ProcessingInstruction,
            Some(QName::local(target)),
            data.to_string(),
        )
        .map(|_| ())
    }

    fn system_id(&self) -> Option<String> {
        self.base_uri.clone()
    }

    fn set_system_id(&mut self, system_id: Option<String>) {
        if self.nodes.is_empty() {
            self.base_uri = system_id;
        }
    }

    fn append(&mut self, item: &Item, copy_namespaces: bool) -> Result<()> {
        match item {
            Item::Node(node) => copy_node(node, self, copy_namespaces),
            Item::Atomic(value) => {
                if self.last_was_atomic {
                    self.characters(" ")?;
                }
                self.characters(&value.to_string_value())?;
                self.last_was_atomic = true;
                Ok(())
            }
        }
    }
}
