//! The push-mode event protocol used to construct result trees.
use crate::error::{Result, XdmError};
use crate::item::{Item, Sequence};
use crate::qname::{NamespaceBinding, QName};
use crate::tree::{NodeHandle, NodeKind, TreeBuilder};

/// Receives well-nested tree-construction events.
///
/// Implementations reject attributes and namespaces that arrive after child
/// content (XTDE0410) or directly inside a document node (XTDE0420).
pub trait Receiver {
    fn start_document(&mut self) -> Result<()>;
    fn end_document(&mut self) -> Result<()>;
    fn start_element(&mut self, name: &QName) -> Result<()>;
    fn namespace(&mut self, binding: &NamespaceBinding) -> Result<()>;
    fn attribute(&mut self, name: &QName, value: &str) -> Result<()>;
    fn end_element(&mut self) -> Result<()>;
    fn characters(&mut self, text: &str) -> Result<()>;
    fn comment(&mut self, text: &str) -> Result<()>;
    fn processing_instruction(&mut self, target: &str, data: &str) -> Result<()>;

    /// The base URI of the tree under construction, if one is fixed.
    fn system_id(&self) -> Option<String> {
        None
    }

    /// Sets the base URI used for trees that have not been started yet.
    fn set_system_id(&mut self, _system_id: Option<String>) {}

    /// Appends an arbitrary item: nodes are copied, atomic values are written
    /// as text.
    fn append(&mut self, item: &Item, copy_namespaces: bool) -> Result<()> {
        match item {
            Item::Node(node) => copy_node(node, self, copy_namespaces),
            Item::Atomic(value) => self.characters(&value.to_string_value()),
        }
    }
}

/// Writes a deep copy of `node` to `out`. With `copy_namespaces` unset only
/// the namespace of the element's own name is emitted.
pub fn copy_node<R: Receiver + ?Sized>(node: &NodeHandle, out: &mut R, copy_namespaces: bool) -> Result<()> {
    match node.kind() {
        NodeKind::Document => {
            out.start_document()?;
            for child in node.children() {
                copy_node(&child, out, copy_namespaces)?;
            }
            out.end_document()
        }
        NodeKind::Element => {
            let name = node.name().cloned().unwrap_or_default();
            out.start_element(&name)?;
            if copy_namespaces {
                for binding in node.in_scope_namespaces() {
                    out.namespace(&binding)?;
                }
            } else if !name.uri.is_empty() {
                out.namespace(&NamespaceBinding::new(name.prefix.clone(), name.uri.clone()))?;
            }
            for attr in node.attributes() {
                copy_node(&attr, out, copy_namespaces)?;
            }
            for child in node.children() {
                copy_node(&child, out, copy_namespaces)?;
            }
            out.end_element()
        }
        NodeKind::Attribute => {
            let name = node.name().cloned().unwrap_or_default();
            out.attribute(&name, &node.string_value())
        }
        NodeKind::Text => out.characters(&node.string_value()),
        NodeKind::Comment => out.comment(&node.string_value()),
        NodeKind::ProcessingInstruction => {
            out.processing_instruction(node.local_name(), &node.string_value())
        }
        NodeKind::Namespace => match node.namespace_binding() {
            Some(binding) => out.namespace(&binding),
            None => Ok(()),
        },
    }
}

/// Collects the events it receives into a sequence of items. Top-level
/// events each produce a new parentless node; appended items are kept as
/// they are, preserving node identity.
#[derive(Default)]
pub struct SequenceOutputter {
    items: Vec<Item>,
    tree: Option<TreeBuilder>,
    level: usize,
    base_uri: Option<String>,
}

impl SequenceOutputter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_uri(mut self, base_uri: Option<String>) -> Self {
        self.base_uri = base_uri;
        self
    }

    pub fn into_sequence(self) -> Sequence {
        Sequence::from_items(self.items)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.level == 0
    }

    fn open(&mut self) -> &mut TreeBuilder {
        let base = self.base_uri.clone();
        self.tree.get_or_insert_with(|| TreeBuilder::new().with_base_uri(base))
    }

    fn close(&mut self) -> Result<()> {
        if let Some(tree) = self.tree.take() {
            self.items.push(Item::Node(tree.finish()?));
        }
        Ok(())
    }

    /// Routes a single event either into the open tree or into a new
    /// parentless node.
    fn leaf<F>(&mut self, event: F) -> Result<()>
    where
        F: FnOnce(&mut TreeBuilder) -> Result<()>,
    {
        event(self.open())?;
        if self.level == 0 {
            self.close()?;
        }
        Ok(())
    }
}

impl Receiver for SequenceOutputter {
    fn start_document(&mut self) -> Result<()> {
        self.open().start_document()?;
        self.level += 1;
        Ok(())
    }

    fn end_document(&mut self) -> Result<()> {
        let tree = self
            .tree
            .as_mut()
            .ok_or_else(|| XdmError::Unbalanced("end_document without start".to_string()))?;
        tree.end_document()?;
        self.level = self.level.saturating_sub(1);
        if self.level == 0 {
            self.close()?;
        }
        Ok(())
    }

    fn start_element(&mut self, name: &QName) -> Result<()> {
        self.open().start_element(name)?;
        self.level += 1;
        Ok(())
    }

    fn namespace(&mut self, binding: &NamespaceBinding) -> Result<()> {
        self.leaf(|t| t.namespace(binding))
    }

    fn attribute(&mut self, name: &QName, value: &str) -> Result<()> {
        self.leaf(|t| t.attribute(name, value))
    }

    fn end_element(&mut self) -> Result<()> {
        let tree = self
            .tree
            .as_mut()
            .ok_or_else(|| XdmError::Unbalanced("end_element without start".to_string()))?;
        tree.end_element()?;
        self.level = self.level.saturating_sub(1);
        if self.level == 0 {
            self.close()?;
        }
        Ok(())
    }

    fn characters(&mut self, text: &str) -> Result<()> {
        if text.is_empty() && self.level == 0 {
            return Ok(());
        }
        self.leaf(|t| t.characters(text))
    }

    fn comment(&mut self, text: &str) -> Result<()> {
        self.leaf(|t| t.comment(text))
    }

    fn processing_instruction(&mut self, target: &str, data: &str) -> Result<()> {
        self.leaf(|t| t.processing_instruction(target, data))
    }

    fn system_id(&self) -> Option<String> {
        match &self.tree {
            Some(tree) if self.level > 0 => tree.system_id(),
            _ => self.base_uri.clone(),
        }
    }

    fn set_system_id(&mut self, system_id: Option<String>) {
        if self.level == 0 {
            self.base_uri = system_id;
        }
    }

    fn append(&mut self, item: &Item, copy_namespaces: bool) -> Result<()> {
        if self.level == 0 {
            self.items.push(item.clone());
            Ok(())
        } else {
            self.open().append(item, copy_namespaces)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atomic::AtomicValue;

    #[test]
    fn test_sequence_outputter_keeps_atomics() {
        let mut out = SequenceOutputter::new();
        out.append(&Item::Atomic(AtomicValue::Integer(1)), true).unwrap();
        out.append(&Item::Atomic(AtomicValue::Integer(2)), true).unwrap();
        let seq = out.into_sequence();
        assert_eq!(seq.len(), 2);
        assert!(!seq.items()[0].is_node());
    }

    #[test]
    fn test_sequence_outputter_builds_parentless_nodes() {
        let mut out = SequenceOutputter::new();
        out.start_element(&QName::local("a")).unwrap();
        out.attribute(&QName::local("x"), "1").unwrap();
        out.characters("hi").unwrap();
        out.end_element().unwrap();
        out.characters("tail").unwrap();
        let seq = out.into_sequence();
        assert_eq!(seq.len(), 2);
        let element = seq.items()[0].as_node().unwrap();
        assert_eq!(element.kind(), NodeKind::Element);
        assert!(element.parent().is_none());
        assert_eq!(element.string_value(), "hi");
        assert_eq!(seq.items()[1].as_node().unwrap().kind(), NodeKind::Text);
    }

    #[test]
    fn test_copy_node_suppresses_namespaces() {
        let doc = crate::tree::parse_document(r#"<a xmlns:x="urn:x" xmlns:y="urn:y"><x:b/></a>"#, None).unwrap();
        let a = doc.children().next().unwrap();
        let mut out = SequenceOutputter::new();
        copy_node(&a, &mut out, false).unwrap();
        let copy = out.into_sequence().items()[0].as_node().unwrap().clone();
        assert!(copy.in_scope_namespaces().is_empty());
        let b = copy.children().next().unwrap();
        assert_eq!(b.in_scope_namespaces(), vec![NamespaceBinding::new("x", "urn:x")]);
    }
}
