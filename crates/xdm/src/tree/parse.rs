// Loading source documents with roxmltree
use super::{NodeHandle, TreeBuilder};
use crate::error::Result;
use crate::qname::{NamespaceBinding, QName, XML_NAMESPACE};
use crate::receiver::Receiver;
use roxmltree::{Node, NodeType};

/// Parses `text` into a document tree whose document node is returned.
pub fn parse_document(text: &str, base_uri: Option<&str>) -> Result<NodeHandle> {
    let doc = roxmltree::Document::parse(text)?;
    let mut builder = TreeBuilder::new().with_base_uri(base_uri.map(str::to_string));
    builder.start_document()?;
    for child in doc.root().children() {
        emit(child, &mut builder)?;
    }
    builder.end_document()?;
    log::debug!("Parsed source document ({} bytes)", text.len());
    builder.finish()
}

fn prefix_for(node: Node<'_, '_>, uri: Option<&str>) -> String {
    match uri {
        None => String::new(),
        Some(XML_NAMESPACE) => "xml".to_string(),
        Some(uri) => node.lookup_prefix(uri).unwrap_or("").to_string(),
    }
}

fn emit(node: Node<'_, '_>, out: &mut TreeBuilder) -> Result<()> {
    match node.node_type() {
        NodeType::Element => {
            let tag = node.tag_name();
            let uri = tag.namespace();
            let name = QName::new(prefix_for(node, uri), uri.unwrap_or(""), tag.name());
            out.start_element(&name)?;

            let parent_namespaces: Vec<(Option<&str>, &str)> = node
                .parent_element()
                .map(|p| p.namespaces().map(|ns| (ns.name(), ns.uri())).collect())
                .unwrap_or_default();
            for ns in node.namespaces() {
                if !parent_namespaces.contains(&(ns.name(), ns.uri())) {
                    out.namespace(&NamespaceBinding::new(ns.name().unwrap_or(""), ns.uri()))?;
                }
            }

            for attr in node.attributes() {
                let uri = attr.namespace();
                let name = QName::new(prefix_for(node, uri), uri.unwrap_or(""), attr.name());
                out.attribute(&name, attr.value())?;
            }
            for child in node.children() {
                emit(child, out)?;
            }
            out.end_element()
        }
        NodeType::Text => out.characters(node.text().unwrap_or("")),
        NodeType::Comment => out.comment(node.text().unwrap_or("")),
        NodeType::PI => match node.pi() {
            Some(pi) => out.processing_instruction(pi.target, pi.value.unwrap_or("")),
            None => Ok(()),
        },
        NodeType::Root => Ok(()),
    }
}
