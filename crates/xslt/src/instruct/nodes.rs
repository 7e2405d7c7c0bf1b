//! Node construction: `xsl:element`, `xsl:attribute`, `xsl:copy`,
//! `xsl:copy-of`, `xsl:document`, `xsl:value-of`, `xsl:comment` and
//! `xsl:processing-instruction`.
//!
//! Every constructor pushes events to the context's receiver. Computed
//! names are resolved at run time against the namespace context captured
//! when the instruction was compiled.
use super::attribute_sets::UseAttributeSets;
use crate::context::XPathContext;
use crate::error::{Location, Result, XsltError};
use crate::expr::Expr;
use trellis_xdm::{
    AtomicValue, Item, NamespaceBinding, NamespaceResolver, NodeHandle, NodeKind, QName,
    StaticNamespaces, XML_NAMESPACE, XMLNS_NAMESPACE, copy_node, is_ncname, split_qname,
};

/// The name of a constructed element or attribute.
#[derive(Debug, Clone)]
pub enum NodeName {
    Fixed(QName),
    /// `name="{...}"`, optionally with `namespace="{...}"`.
    Computed {
        name: Box<Expr>,
        namespace: Option<Box<Expr>>,
        namespaces: StaticNamespaces,
    },
}

impl NodeName {
    pub fn computed(name: Expr, namespaces: StaticNamespaces) -> Self {
        NodeName::Computed {
            name: Box::new(name),
            namespace: None,
            namespaces,
        }
    }

    pub fn with_namespace(self, uri: Expr) -> Self {
        match self {
            NodeName::Computed { name, namespaces, .. } => NodeName::Computed {
                name,
                namespace: Some(Box::new(uri)),
                namespaces,
            },
            fixed => fixed,
        }
    }

    fn children(&self) -> Vec<&Expr> {
        match self {
            NodeName::Fixed(_) => vec![],
            NodeName::Computed { name, namespace, .. } => {
                let mut out = vec![&**name];
                out.extend(namespace.as_deref());
                out
            }
        }
    }

    fn children_mut(&mut self) -> Vec<&mut Expr> {
        match self {
            NodeName::Fixed(_) => vec![],
            NodeName::Computed { name, namespace, .. } => {
                let mut out = vec![&mut **name];
                out.extend(namespace.as_deref_mut());
                out
            }
        }
    }
}

/// Evaluates the `name` expression to a trimmed lexical QName.
fn lexical_name<'e>(name: &'e Expr, ctx: &XPathContext<'e>, code: &str, what: &str) -> Result<String> {
    match name.evaluate_item(ctx)? {
        Some(Item::Atomic(AtomicValue::String(s) | AtomicValue::UntypedAtomic(s))) => Ok(s.trim().to_string()),
        Some(_) => Err(XsltError::dynamic(code, format!("Computed {} name has incorrect type", what))),
        None => Err(XsltError::dynamic(code, format!("Invalid {} name (empty sequence)", what))),
    }
}

fn is_valid_uri(uri: &str) -> bool {
    if uri.is_empty() || url::Url::parse(uri).is_ok() {
        return true;
    }
    !uri.chars().any(|c| c.is_whitespace() || matches!(c, '<' | '>' | '"' | '{' | '}'))
}

/// Evaluates a `namespace` attribute.
fn namespace_uri<'e>(namespace: &'e Expr, ctx: &XPathContext<'e>, code: &str) -> Result<String> {
    if let Some(literal) = namespace.as_literal() {
        return Ok(literal.string_join(""));
    }
    let uri = namespace.evaluate_as_string(ctx, "")?;
    if !is_valid_uri(&uri) {
        return Err(XsltError::dynamic(code, "The value of the namespace attribute must be a valid URI"));
    }
    Ok(uri)
}

/// Resolves a computed element name.
fn element_name<'e>(name: &'e NodeName, ctx: &XPathContext<'e>) -> Result<QName> {
    let (name, namespace, namespaces) = match name {
        NodeName::Fixed(q) => return Ok(q.clone()),
        NodeName::Computed { name, namespace, namespaces } => (name, namespace, namespaces),
    };
    let raw = lexical_name(name, ctx, "XTDE0820", "element")?;
    let (prefix, local) = split_qname(&raw).map_err(|_| {
        let message = if raw.is_empty() {
            "Supplied element name is a zero-length string".to_string()
        } else {
            format!("Invalid element name: '{}'", raw)
        };
        XsltError::dynamic("XTDE0820", message)
    })?;
    let mut prefix = prefix.to_string();
    let uri = match namespace {
        None => namespaces.uri_for_prefix(&prefix, true).ok_or_else(|| {
            XsltError::dynamic("XTDE0830", format!("Undeclared prefix in element name: {}", prefix))
        })?,
        Some(ns) => {
            let uri = namespace_uri(ns, ctx, "XTDE0835")?;
            if uri.is_empty() {
                prefix.clear();
            }
            if prefix == "xmlns" {
                prefix = "x-xmlns".to_string();
            }
            uri
        }
    };
    if uri == XMLNS_NAMESPACE {
        return Err(XsltError::dynamic("XTDE0835", format!("Cannot create element in namespace {}", uri)));
    }
    check_xml_prefix(&prefix, &uri, "XTDE0835")?;
    Ok(QName::new(prefix, uri, local))
}

/// Resolves a computed attribute name.
fn attribute_name<'e>(name: &'e NodeName, ctx: &XPathContext<'e>) -> Result<QName> {
    let (name, namespace, namespaces) = match name {
        NodeName::Fixed(q) => return Ok(q.clone()),
        NodeName::Computed { name, namespace, namespaces } => (name, namespace, namespaces),
    };
    let raw = match name.evaluate_item(ctx)? {
        Some(Item::Atomic(AtomicValue::String(s) | AtomicValue::UntypedAtomic(s))) => s.trim().to_string(),
        _ => {
            return Err(XsltError::type_error(
                "XPTY0004",
                "Attribute name must be either a string or a QName",
            ));
        }
    };
    let (prefix, local) = split_qname(&raw)
        .map_err(|_| XsltError::dynamic("XTDE0850", format!("Invalid attribute name: {}", raw)))?;
    let mut prefix = prefix.to_string();
    if namespace.is_none() {
        if raw == "xmlns" {
            return Err(XsltError::dynamic("XTDE0855", format!("Invalid attribute name: {}", raw)));
        }
        if prefix == "xmlns" {
            return Err(XsltError::dynamic("XTDE0860", format!("Invalid attribute name: {}", raw)));
        }
    } else if prefix == "xmlns" {
        prefix.clear();
    }
    let uri = match namespace {
        None if prefix.is_empty() => String::new(),
        None => namespaces.uri_for_prefix(&prefix, false).ok_or_else(|| {
            XsltError::dynamic("XTDE0860", format!("Undeclared prefix in attribute name: {}", prefix))
        })?,
        Some(ns) => {
            let uri = namespace_uri(ns, ctx, "XTDE0865")?;
            if uri.is_empty() {
                prefix.clear();
            } else if prefix.is_empty() {
                prefix = namespaces
                    .prefixes()
                    .into_iter()
                    .find(|p| !p.is_empty() && namespaces.uri_for_prefix(p, false).as_deref() == Some(uri.as_str()))
                    .unwrap_or_else(|| "ns0".to_string());
            }
            uri
        }
    };
    if uri == XMLNS_NAMESPACE {
        return Err(XsltError::dynamic("XTDE0835", format!("Cannot create attribute in namespace {}", uri)));
    }
    Ok(QName::new(prefix, uri, local))
}

fn check_xml_prefix(prefix: &str, uri: &str, code: &str) -> Result<()> {
    if (uri == XML_NAMESPACE) == (prefix == "xml") {
        return Ok(());
    }
    let message = if prefix == "xml" {
        format!("When the prefix is 'xml', the namespace URI must be {}", XML_NAMESPACE)
    } else {
        format!("When the namespace URI is {}, the prefix must be 'xml'", XML_NAMESPACE)
    };
    Err(XsltError::dynamic(code, message))
}

/// `xsl:element` and literal result elements.
#[derive(Debug, Clone)]
pub struct ElementCreator {
    pub name: NodeName,
    /// Namespace nodes written in addition to the one the name needs.
    pub namespaces: Vec<NamespaceBinding>,
    pub attribute_sets: UseAttributeSets,
    pub content: Box<Expr>,
    pub location: Option<Location>,
}

impl ElementCreator {
    pub fn new(name: NodeName, content: Expr) -> Self {
        Self {
            name,
            namespaces: Vec::new(),
            attribute_sets: UseAttributeSets::default(),
            content: Box::new(content),
            location: None,
        }
    }

    /// A literal result element.
    pub fn fixed(name: QName, content: Expr) -> Self {
        Self::new(NodeName::Fixed(name), content)
    }

    pub fn with_namespace(mut self, binding: NamespaceBinding) -> Self {
        self.namespaces.push(binding);
        self
    }

    pub fn with_attribute_sets(mut self, names: Vec<QName>) -> Self {
        self.attribute_sets = UseAttributeSets::new(names);
        self
    }

    pub fn children(&self) -> Vec<&Expr> {
        let mut out = self.name.children();
        out.push(&*self.content);
        out
    }

    pub fn children_mut(&mut self) -> Vec<&mut Expr> {
        let mut out = self.name.children_mut();
        out.push(&mut *self.content);
        out
    }

    pub fn process<'e>(&'e self, ctx: &XPathContext<'e>) -> Result<()> {
        let name = element_name(&self.name, ctx)?;
        {
            let mut out = ctx.receiver().borrow_mut();
            out.start_element(&name)?;
            if !name.uri.is_empty() || !name.prefix.is_empty() {
                out.namespace(&NamespaceBinding::new(name.prefix.clone(), name.uri.clone()))?;
            }
            for binding in &self.namespaces {
                out.namespace(binding)?;
            }
        }
        self.attribute_sets.expand(ctx)?;
        self.content.process(ctx)?;
        ctx.receiver().borrow_mut().end_element()?;
        Ok(())
    }
}

/// `xsl:attribute`.
#[derive(Debug, Clone)]
pub struct AttributeCreator {
    pub name: NodeName,
    pub select: Box<Expr>,
    /// Joins the items of the value; a single space when `select` is used,
    /// nothing for a sequence constructor.
    pub separator: String,
    pub location: Option<Location>,
}

impl AttributeCreator {
    pub fn new(name: NodeName, select: Expr) -> Self {
        Self {
            name,
            select: Box::new(select),
            separator: " ".to_string(),
            location: None,
        }
    }

    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    pub fn children(&self) -> Vec<&Expr> {
        let mut out = self.name.children();
        out.push(&*self.select);
        out
    }

    pub fn children_mut(&mut self) -> Vec<&mut Expr> {
        let mut out = self.name.children_mut();
        out.push(&mut *self.select);
        out
    }

    pub fn process<'e>(&'e self, ctx: &XPathContext<'e>) -> Result<()> {
        let name = attribute_name(&self.name, ctx)?;
        let value = self.select.evaluate_as_string(ctx, &self.separator)?;
        ctx.receiver().borrow_mut().attribute(&name, &value)?;
        Ok(())
    }
}

/// `xsl:copy`: a shallow copy of the context item.
#[derive(Debug, Clone)]
pub struct ShallowCopy {
    pub content: Box<Expr>,
    pub copy_namespaces: bool,
    /// Expanded only when the context item is an element.
    pub attribute_sets: UseAttributeSets,
}

impl ShallowCopy {
    pub fn new(content: Expr) -> Self {
        Self {
            content: Box::new(content),
            copy_namespaces: true,
            attribute_sets: UseAttributeSets::default(),
        }
    }

    pub fn with_attribute_sets(mut self, names: Vec<QName>) -> Self {
        self.attribute_sets = UseAttributeSets::new(names);
        self
    }

    pub fn process<'e>(&'e self, ctx: &XPathContext<'e>) -> Result<()> {
        let item = ctx
            .focus()
            .map(|f| f.item.clone())
            .ok_or_else(|| XsltError::type_error("XTTE0945", "Cannot use xsl:copy when the context item is absent"))?;
        let node = match item {
            Item::Node(node) => node,
            atomic => return Ok(ctx.receiver().borrow_mut().append(&atomic, true)?),
        };
        match node.kind() {
            NodeKind::Element => {
                let name = node.name().cloned().unwrap_or_default();
                {
                    let mut out = ctx.receiver().borrow_mut();
                    out.start_element(&name)?;
                    if self.copy_namespaces {
                        for binding in node.in_scope_namespaces() {
                            out.namespace(&binding)?;
                        }
                    } else if !name.uri.is_empty() {
                        out.namespace(&NamespaceBinding::new(name.prefix.clone(), name.uri.clone()))?;
                    }
                }
                self.attribute_sets.expand(ctx)?;
                self.content.process(ctx)?;
                ctx.receiver().borrow_mut().end_element()?;
            }
            NodeKind::Document => {
                ctx.receiver().borrow_mut().start_document()?;
                self.content.process(ctx)?;
                ctx.receiver().borrow_mut().end_document()?;
            }
            // Leaf kinds carry no content; the sequence constructor is not
            // evaluated for them.
            _ => copy_node(&node, &mut *ctx.receiver().borrow_mut(), self.copy_namespaces)?,
        }
        Ok(())
    }
}

/// `xsl:copy-of`: deep copies of the selected nodes, atomic values as text.
#[derive(Debug, Clone)]
pub struct CopyOf {
    pub select: Box<Expr>,
    pub copy_namespaces: bool,
    pub static_base_uri: Option<String>,
    pub location: Option<Location>,
}

impl CopyOf {
    pub fn new(select: Expr) -> Self {
        Self {
            select: Box::new(select),
            copy_namespaces: true,
            static_base_uri: None,
            location: None,
        }
    }

    /// The base URI given to a copied element or document: its own, or the
    /// instruction's when the source has none.
    fn base_uri_for(&self, node: &NodeHandle) -> Option<String> {
        node.base_uri().or_else(|| self.static_base_uri.clone())
    }

    pub fn process<'e>(&'e self, ctx: &XPathContext<'e>) -> Result<()> {
        let mut iter = self.select.iterate(ctx)?;
        while let Some(item) = iter.next()? {
            let mut out = ctx.receiver().borrow_mut();
            match &item {
                Item::Node(node) if matches!(node.kind(), NodeKind::Element | NodeKind::Document) => {
                    let saved = out.system_id();
                    out.set_system_id(self.base_uri_for(node));
                    let copied = copy_node(node, &mut *out, self.copy_namespaces);
                    out.set_system_id(saved);
                    copied?;
                }
                Item::Node(node) => copy_node(node, &mut *out, self.copy_namespaces)?,
                Item::Atomic(_) => out.append(&item, self.copy_namespaces)?,
            }
        }
        Ok(())
    }
}

/// `xsl:document`.
#[derive(Debug, Clone)]
pub struct DocumentInstr {
    pub content: Box<Expr>,
}

impl DocumentInstr {
    pub fn new(content: Expr) -> Self {
        Self {
            content: Box::new(content),
        }
    }

    pub fn process<'e>(&'e self, ctx: &XPathContext<'e>) -> Result<()> {
        ctx.receiver().borrow_mut().start_document()?;
        self.content.process(ctx)?;
        ctx.receiver().borrow_mut().end_document()?;
        Ok(())
    }
}

/// `xsl:value-of` and `xsl:text`.
#[derive(Debug, Clone)]
pub struct ValueOf {
    pub select: Box<Expr>,
    pub separator: String,
}

impl ValueOf {
    pub fn new(select: Expr) -> Self {
        Self {
            select: Box::new(select),
            separator: " ".to_string(),
        }
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self::new(Expr::string(value))
    }

    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    pub fn process<'e>(&'e self, ctx: &XPathContext<'e>) -> Result<()> {
        let value = self.select.evaluate_as_string(ctx, &self.separator)?;
        ctx.receiver().borrow_mut().characters(&value)?;
        Ok(())
    }
}

/// `xsl:comment`.
#[derive(Debug, Clone)]
pub struct CommentInstr {
    pub select: Box<Expr>,
}

impl CommentInstr {
    pub fn new(select: Expr) -> Self {
        Self {
            select: Box::new(select),
        }
    }

    pub fn process<'e>(&'e self, ctx: &XPathContext<'e>) -> Result<()> {
        let text = self.select.evaluate_as_string(ctx, " ")?;
        ctx.receiver().borrow_mut().comment(&fix_comment(&text))?;
        Ok(())
    }
}

/// Breaks up `--` and a trailing `-`, which cannot appear in a comment.
fn fix_comment(text: &str) -> String {
    let mut out = text.replace("--", "- -");
    while out.contains("--") {
        out = out.replace("--", "- -");
    }
    if out.ends_with('-') {
        out.push(' ');
    }
    out
}

/// `xsl:processing-instruction`.
#[derive(Debug, Clone)]
pub struct ProcessingInstructionInstr {
    pub name: Box<Expr>,
    pub select: Box<Expr>,
}

impl ProcessingInstructionInstr {
    pub fn new(name: Expr, select: Expr) -> Self {
        Self {
            name: Box::new(name),
            select: Box::new(select),
        }
    }

    fn target<'e>(&'e self, ctx: &XPathContext<'e>) -> Result<String> {
        let name = match self.name.evaluate_item(ctx)? {
            Some(Item::Atomic(AtomicValue::String(s) | AtomicValue::UntypedAtomic(s))) => s.trim().to_string(),
            _ => return Err(XsltError::dynamic("XQDY0041", "Processing instruction name is not a string")),
        };
        if !is_ncname(&name) {
            return Err(XsltError::dynamic(
                "XTDE0890",
                format!("Processing instruction name '{}' is not a valid NCName", name),
            ));
        }
        if name.eq_ignore_ascii_case("xml") {
            return Err(XsltError::dynamic(
                "XTDE0890",
                "Processing instructions cannot be named 'xml' in any combination of upper/lower case",
            ));
        }
        Ok(name)
    }

    pub fn process<'e>(&'e self, ctx: &XPathContext<'e>) -> Result<()> {
        let target = self.target(ctx)?;
        let data = self.select.evaluate_as_string(ctx, " ")?;
        let mut data = data.trim_start().to_string();
        while data.contains("?>") {
            data = data.replace("?>", "? >");
        }
        ctx.receiver().borrow_mut().processing_instruction(&target, &data)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::with_context;
    use trellis_xdm::{Sequence, parse_document, serialize};

    fn render(seq: &Sequence) -> String {
        seq.iter()
            .map(|i| match i {
                Item::Node(n) => serialize(n).unwrap(),
                Item::Atomic(a) => a.to_string_value(),
            })
            .collect()
    }

    fn computed(name: &str) -> NodeName {
        NodeName::computed(Expr::string(name), StaticNamespaces::new().bind("p", "urn:p"))
    }

    #[test]
    fn test_element_with_attribute_and_text() {
        let content = Expr::Block(crate::instruct::block::Block::new(vec![
            Expr::Attribute(AttributeCreator::new(NodeName::Fixed(QName::local("id")), Expr::xpath("(1, 2)").unwrap())),
            Expr::ValueOf(ValueOf::text("hi")),
        ]));
        let e = ElementCreator::new(computed("p:item"), content);
        with_context(|ctx| {
            let out = ctx.capture(|c| e.process(c)).unwrap();
            assert_eq!(render(&out), r#"<p:item xmlns:p="urn:p" id="1 2">hi</p:item>"#);
        });
    }

    #[test]
    fn test_computed_element_name_errors() {
        let cases = [("", "XTDE0820"), ("1abc", "XTDE0820"), ("q:item", "XTDE0830")];
        with_context(|ctx| {
            for (name, code) in cases {
                let e = ElementCreator::new(computed(name), Expr::empty());
                assert_eq!(ctx.capture(|c| e.process(c)).unwrap_err().code(), code, "{}", name);
            }
            let xml = ElementCreator::new(computed("x").with_namespace(Expr::string(XML_NAMESPACE)), Expr::empty());
            assert_eq!(ctx.capture(|c| xml.process(c)).unwrap_err().code(), "XTDE0835");
        });
    }

    #[test]
    fn test_computed_attribute_name_errors() {
        let cases = [("xmlns", "XTDE0855"), ("xmlns:a", "XTDE0860"), ("q:a", "XTDE0860"), ("a b", "XTDE0850")];
        with_context(|ctx| {
            for (name, code) in cases {
                let a = AttributeCreator::new(computed(name), Expr::empty());
                assert_eq!(ctx.capture(|c| a.process(c)).unwrap_err().code(), code, "{}", name);
            }
        });
    }

    #[test]
    fn test_namespace_attribute_overrides_prefix() {
        let e = ElementCreator::new(computed("p:item").with_namespace(Expr::string("")), Expr::empty());
        let a = AttributeCreator::new(computed("a").with_namespace(Expr::string("urn:p")), Expr::string("v"));
        with_context(|ctx| {
            let out = ctx.capture(|c| e.process(c)).unwrap();
            assert_eq!(render(&out), "<item/>");
            let out = ctx.capture(|c| a.process(c)).unwrap();
            let attr = out.first().and_then(Item::as_node).unwrap();
            assert_eq!(attr.name().unwrap().prefix, "p");
            assert_eq!(attr.name().unwrap().uri, "urn:p");
        });
    }

    #[test]
    fn test_copy_is_shallow_and_copy_of_is_deep() {
        let doc = parse_document(r#"<a x="1"><b/></a>"#, Some("file:///in.xml")).unwrap();
        let a = doc.children().next().unwrap();
        let shallow = ShallowCopy::new(Expr::ValueOf(ValueOf::text("new")));
        let deep = CopyOf::new(Expr::ContextItem);
        with_context(|ctx| {
            let ctx = ctx.with_focus(Item::Node(a.clone()), 1, Some(1));
            assert_eq!(render(&ctx.capture(|c| shallow.process(c)).unwrap()), "<a>new</a>");
            let copied = ctx.capture(|c| deep.process(c)).unwrap();
            assert_eq!(render(&copied), r#"<a x="1"><b/></a>"#);
            let node = copied.first().and_then(Item::as_node).unwrap();
            assert!(!node.is_same_node(&a));
            assert_eq!(node.base_uri().as_deref(), Some("file:///in.xml"));
        });
    }

    #[test]
    fn test_copy_without_context_item() {
        let copy = ShallowCopy::new(Expr::empty());
        with_context(|ctx| {
            assert_eq!(ctx.capture(|c| copy.process(c)).unwrap_err().code(), "XTTE0945");
        });
    }

    #[test]
    fn test_comment_and_processing_instruction_text_is_fixed() {
        assert_eq!(fix_comment("a--b-"), "a- -b- ");
        assert_eq!(fix_comment("---"), "- - - ");
        let pi = ProcessingInstructionInstr::new(Expr::string("xml-stylesheet"), Expr::string("  a?>b"));
        let bad = ProcessingInstructionInstr::new(Expr::string("XmL"), Expr::empty());
        with_context(|ctx| {
            let out = ctx.capture(|c| pi.process(c)).unwrap();
            let node = out.first().and_then(Item::as_node).unwrap();
            assert_eq!(node.string_value(), "a? >b");
            assert_eq!(ctx.capture(|c| bad.process(c)).unwrap_err().code(), "XTDE0890");
        });
    }

    #[test]
    fn test_document_instruction_wraps_content() {
        let d = DocumentInstr::new(Expr::Element(ElementCreator::fixed(QName::local("r"), Expr::empty())));
        with_context(|ctx| {
            let out = ctx.capture(|c| d.process(c)).unwrap();
            let node = out.first().and_then(Item::as_node).unwrap();
            assert_eq!(node.kind(), NodeKind::Document);
            assert_eq!(render(&out), "<r/>");
        });
    }
}
