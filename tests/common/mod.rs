#![allow(dead_code)]

use std::rc::Rc;
use trellis::xdm::{QName, StaticNamespaces, parse_document, serialize};
use trellis::xslt::instruct::block::Block;
use trellis::xslt::instruct::nodes::ValueOf;
use trellis::{Executable, Expr, MessageListener, Pattern, TransformConfig, Transformer, XsltError};

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn q(local: &str) -> QName {
    QName::local(local)
}

/// Parses an XPath expression in no namespace context.
pub fn xp(text: &str) -> Expr {
    Expr::xpath(text).unwrap_or_else(|e| panic!("bad expression {}: {}", text, e))
}

pub fn block(children: Vec<Expr>) -> Expr {
    Expr::Block(Block::new(children))
}

/// `xsl:value-of select="..."`
pub fn value_of(select: &str) -> Expr {
    Expr::ValueOf(ValueOf::new(xp(select)))
}

pub fn text(value: &str) -> Expr {
    Expr::ValueOf(ValueOf::text(value))
}

pub fn pattern(text: &str) -> Pattern {
    Pattern::parse(text, &StaticNamespaces::new()).unwrap_or_else(|e| panic!("bad pattern {}: {}", text, e))
}

/// Runs the named template `name` and serializes the result document.
pub fn call_named(exec: &Executable, name: &str) -> Result<String, XsltError> {
    run(exec, None, TransformConfig::default().with_initial_template(name))
}

/// Applies templates to `source` in the default mode.
pub fn apply_to(exec: &Executable, source: &str) -> Result<String, XsltError> {
    run(exec, Some(source), TransformConfig::default())
}

pub fn run(exec: &Executable, source: Option<&str>, config: TransformConfig) -> Result<String, XsltError> {
    run_with_listener(exec, source, config, None)
}

pub fn run_with_listener(
    exec: &Executable,
    source: Option<&str>,
    config: TransformConfig,
    listener: Option<Rc<dyn MessageListener>>,
) -> Result<String, XsltError> {
    init_logging();
    let source = match source {
        Some(text) => Some(parse_document(text, Some("file:///test/source.xml"))?),
        None => None,
    };
    let mut transformer = Transformer::new(exec, config);
    if let Some(listener) = listener {
        transformer = transformer.with_message_listener(listener);
    }
    let result = transformer.transform(source.as_ref())?;
    Ok(serialize(&result)?)
}
