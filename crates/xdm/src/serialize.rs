//! XML serialization of result trees using quick-xml.
use crate::error::{Result, XdmError};
use crate::tree::{NodeHandle, NodeKind};
use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesPI, BytesStart, BytesText, Event};

/// Serializes a node (and its subtree) as XML text, without a declaration.
pub fn serialize(node: &NodeHandle) -> Result<String> {
    let mut writer = Writer::new(Vec::new());
    write_node(&mut writer, node)?;
    String::from_utf8(writer.into_inner()).map_err(|e| XdmError::Serialization(e.to_string()))
}

fn write_event(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<()> {
    writer
        .write_event(event)
        .map_err(|e| XdmError::Serialization(e.to_string()))
}

fn write_node(writer: &mut Writer<Vec<u8>>, node: &NodeHandle) -> Result<()> {
    match node.kind() {
        NodeKind::Document => {
            for child in node.children() {
                write_node(writer, &child)?;
            }
            Ok(())
        }
        NodeKind::Element => {
            let name = node.name().map(|q| q.display_name()).unwrap_or_default();
            let mut start = BytesStart::new(name.as_str());
            for ns in node.namespaces().filter_map(|n| n.namespace_binding()) {
                let key = if ns.prefix.is_empty() {
                    "xmlns".to_string()
                } else {
                    format!("xmlns:{}", ns.prefix)
                };
                start.push_attribute((key.as_str(), ns.uri.as_str()));
            }
            for attr in node.attributes() {
                let key = attr.name().map(|q| q.display_name()).unwrap_or_default();
                let value = attr.string_value();
                start.push_attribute((key.as_str(), value.as_str()));
            }
            if node.children().next().is_none() {
                return write_event(writer, Event::Empty(start));
            }
            write_event(writer, Event::Start(start))?;
            for child in node.children() {
                write_node(writer, &child)?;
            }
            write_event(writer, Event::End(BytesEnd::new(name.as_str())))
        }
        NodeKind::Text | NodeKind::Attribute | NodeKind::Namespace => {
            let text = node.string_value();
            write_event(writer, Event::Text(BytesText::new(&text)))
        }
        NodeKind::Comment => {
            let text = node.string_value();
            write_event(writer, Event::Comment(BytesText::from_escaped(text.as_str())))
        }
        NodeKind::ProcessingInstruction => {
            let data = node.string_value();
            let content = if data.is_empty() {
                node.local_name().to_string()
            } else {
                format!("{} {}", node.local_name(), data)
            };
            write_event(writer, Event::PI(BytesPI::new(content.as_str())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::parse_document;

    #[test]
    fn test_round_trip() {
        let src = r#"<a xmlns:p="urn:p" x="1"><p:b>t &amp; u</p:b><!--c--><?go now?><e/></a>"#;
        let doc = parse_document(src, None).unwrap();
        assert_eq!(serialize(&doc).unwrap(), src);
    }
}
