mod common;

use common::{apply_to, block, call_named, init_logging, pattern, q, text, xp};
use trellis::xdm::{QName, StaticNamespaces, serialize};
use trellis::xslt::expr::parse_xpath;
use trellis::xslt::instruct::choose::Choose;
use trellis::xslt::instruct::nodes::{AttributeCreator, ElementCreator, NodeName, ShallowCopy, ValueOf};
use trellis::xslt::instruct::result_document::ResultDocument;
use trellis::xslt::instruct::variables::GlobalVariable;
use trellis::{
    AttributeSet, ExecutableBuilder, Expr, TemplateDefinition, TransformConfig, Transformer, UserFunction,
    UserFunctionParameter,
};

fn ns() -> StaticNamespaces {
    StaticNamespaces::new().bind("f", "urn:f")
}

fn fx(text: &str) -> Expr {
    parse_xpath(text, &ns()).unwrap_or_else(|e| panic!("bad expression {}: {}", text, e))
}

fn f(local: &str) -> QName {
    QName::new("f", "urn:f", local)
}

fn attribute(name: &str, select: Expr) -> Expr {
    Expr::Attribute(AttributeCreator::new(NodeName::Fixed(q(name)), select))
}

#[test]
fn test_recursive_function_from_xpath() {
    let fact = UserFunction::new(
        f("fact"),
        vec![UserFunctionParameter::new(q("n"))],
        Expr::Choose(Choose::new(vec![
            (xp("$n <= 1"), Expr::integer(1)),
            (Expr::boolean(true), fx("$n * f:fact($n - 1)")),
        ])),
    );
    let exec = ExecutableBuilder::new()
        .function(fact)
        .template(TemplateDefinition::named(q("main"), Expr::ValueOf(ValueOf::new(fx("f:fact(5)")))))
        .build()
        .unwrap();
    assert_eq!(call_named(&exec, "main").unwrap(), "120");
}

#[test]
fn test_function_sees_globals_and_node_arguments() {
    let label = UserFunction::new(
        f("label"),
        vec![UserFunctionParameter::new(q("node"))],
        xp("concat('[', string($node/@id), ':', $sep, ']')"),
    );
    let exec = ExecutableBuilder::new()
        .global(GlobalVariable::variable(q("sep"), Expr::string("x")))
        .function(label)
        .template(TemplateDefinition::matching(
            pattern("/"),
            Expr::ValueOf(ValueOf::new(fx("f:label(list/item[2])"))),
        ))
        .build()
        .unwrap();
    let source = r#"<list><item id="a"/><item id="b"/></list>"#;
    assert_eq!(apply_to(&exec, source).unwrap(), "[b:x]");
}

#[test]
fn test_function_call_errors() {
    let double = || UserFunction::new(f("double"), vec![UserFunctionParameter::new(q("n"))], xp("$n * 2"));
    let wrong_arity = ExecutableBuilder::new()
        .function(double())
        .template(TemplateDefinition::named(q("main"), fx("f:double()")))
        .build()
        .unwrap_err();
    assert_eq!(wrong_arity.code(), "XPST0017");

    let focus = UserFunction::new(f("here"), vec![], xp("name(.)"));
    let exec = ExecutableBuilder::new()
        .function(focus)
        .template(TemplateDefinition::matching(pattern("/"), Expr::ValueOf(ValueOf::new(fx("f:here()")))))
        .build()
        .unwrap();
    assert_eq!(apply_to(&exec, "<a/>").unwrap_err().code(), "XPDY0002");
}

#[test]
fn test_attribute_sets_expand_before_content() {
    let exec = ExecutableBuilder::new()
        .attribute_set(AttributeSet::new(
            q("base"),
            block(vec![attribute("a", Expr::string("1")), attribute("b", Expr::string("1"))]),
        ))
        .attribute_set(AttributeSet::new(q("extra"), attribute("b", Expr::string("2"))).using(vec![q("base")]))
        .template(TemplateDefinition::named(
            q("main"),
            Expr::Element(
                ElementCreator::fixed(q("e"), attribute("a", Expr::string("3"))).with_attribute_sets(vec![q("extra")]),
            ),
        ))
        .build()
        .unwrap();
    assert_eq!(call_named(&exec, "main").unwrap(), r#"<e a="3" b="2"/>"#);
}

#[test]
fn test_attribute_set_on_copy_uses_callers_focus() {
    let exec = ExecutableBuilder::new()
        .attribute_set(AttributeSet::new(q("named"), attribute("from", xp("name(.)"))))
        .template(TemplateDefinition::matching(
            pattern("item"),
            Expr::Copy(ShallowCopy::new(text("x")).with_attribute_sets(vec![q("named")])),
        ))
        .build()
        .unwrap();
    assert_eq!(apply_to(&exec, "<item/>").unwrap(), r#"<item from="item">x</item>"#);
}

#[test]
fn test_attribute_set_static_errors() {
    let unknown = ExecutableBuilder::new()
        .template(TemplateDefinition::named(
            q("main"),
            Expr::Element(ElementCreator::fixed(q("e"), Expr::empty()).with_attribute_sets(vec![q("missing")])),
        ))
        .build()
        .unwrap_err();
    assert_eq!(unknown.code(), "XTSE0710");
    let cycle = ExecutableBuilder::new()
        .attribute_set(AttributeSet::new(q("a"), Expr::empty()).using(vec![q("a")]))
        .build()
        .unwrap_err();
    assert_eq!(cycle.code(), "XTSE0720");
}

fn result_documents(body: Expr) -> Result<trellis::TransformResult, trellis::XsltError> {
    init_logging();
    let exec = ExecutableBuilder::new()
        .template(TemplateDefinition::named(q("main"), body))
        .build()
        .unwrap();
    let config = TransformConfig {
        base_output_uri: Some("file:///out/main.xml".to_string()),
        ..TransformConfig::default().with_initial_template("main")
    };
    Transformer::new(&exec, config).transform_with_results(None)
}

#[test]
fn test_result_documents_are_collected() {
    let body = block(vec![
        Expr::ResultDocument(ResultDocument::new(
            Some(Expr::string("part/a.xml")),
            Expr::Element(ElementCreator::fixed(q("e"), text("A"))),
        )),
        Expr::ResultDocument(ResultDocument::new(None, text("B"))),
        text("main"),
    ]);
    let result = result_documents(body).unwrap();
    assert_eq!(serialize(&result.principal).unwrap(), "main");
    let uris: Vec<&str> = result.result_documents.keys().map(String::as_str).collect();
    assert_eq!(uris, ["file:///out/part/a.xml", "file:///out/result2"]);
    assert_eq!(serialize(&result.result_documents["file:///out/part/a.xml"]).unwrap(), "<e>A</e>");
    assert_eq!(serialize(&result.result_documents["file:///out/result2"]).unwrap(), "B");
}

#[test]
fn test_result_document_uri_written_twice() {
    let write = || Expr::ResultDocument(ResultDocument::new(Some(Expr::string("a.xml")), text("x")));
    let err = result_documents(block(vec![write(), write()])).unwrap_err();
    assert_eq!(err.code(), "XTDE1490");
}
