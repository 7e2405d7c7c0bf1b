mod common;

use common::{apply_to, block, call_named, pattern, q, text, value_of, xp};
use trellis::xdm::{NamespaceBinding, QName, StaticNamespaces};
use trellis::xslt::instruct::nodes::{
    AttributeCreator, CommentInstr, CopyOf, ElementCreator, NodeName, ProcessingInstructionInstr, ShallowCopy,
};
use trellis::xslt::instruct::templates::{ApplyTemplates, ModeRef};
use trellis::{ExecutableBuilder, Expr, TemplateDefinition};

fn main_only(body: Expr) -> trellis::Executable {
    ExecutableBuilder::new()
        .template(TemplateDefinition::named(q("main"), body))
        .build()
        .unwrap()
}

fn computed_element(name: &str) -> Expr {
    Expr::Element(ElementCreator::new(
        NodeName::computed(Expr::string(name), StaticNamespaces::new()),
        Expr::empty(),
    ))
}

fn computed_attribute(name: &str) -> Expr {
    Expr::Element(ElementCreator::fixed(
        q("e"),
        Expr::Attribute(AttributeCreator::new(
            NodeName::computed(Expr::string(name), StaticNamespaces::new()),
            Expr::string("v"),
        )),
    ))
}

#[test]
fn test_literal_result_tree() {
    let body = Expr::Element(
        ElementCreator::fixed(
            QName::new("r", "urn:result", "root"),
            block(vec![
                Expr::Attribute(AttributeCreator::new(NodeName::Fixed(q("id")), xp("1 + 1"))),
                Expr::Element(ElementCreator::fixed(QName::new("r", "urn:result", "child"), text("x"))),
            ]),
        )
        .with_namespace(NamespaceBinding::new("o", "urn:other")),
    );
    assert_eq!(
        call_named(&main_only(body), "main").unwrap(),
        r#"<r:root xmlns:r="urn:result" xmlns:o="urn:other" id="2"><r:child>x</r:child></r:root>"#
    );
}

#[test]
fn test_invalid_computed_names() {
    let cases = [
        (computed_element("1bad"), "XTDE0820"),
        (computed_element("u:x"), "XTDE0830"),
        (computed_attribute("xmlns"), "XTDE0855"),
        (computed_attribute("a b"), "XTDE0850"),
    ];
    for (body, code) in cases {
        let err = call_named(&main_only(body), "main").unwrap_err();
        assert_eq!(err.code(), code, "{}", err);
    }
}

#[test]
fn test_computed_name_with_namespace() {
    let name = NodeName::computed(Expr::string("p:item"), StaticNamespaces::new())
        .with_namespace(Expr::string("urn:p"));
    let body = Expr::Element(ElementCreator::new(name, Expr::empty()));
    assert_eq!(
        call_named(&main_only(body), "main").unwrap(),
        r#"<p:item xmlns:p="urn:p"/>"#
    );
}

#[test]
fn test_attribute_after_content_is_rejected() {
    let body = Expr::Element(ElementCreator::fixed(
        q("e"),
        block(vec![
            text("content"),
            Expr::Attribute(AttributeCreator::new(NodeName::Fixed(q("late")), Expr::string("v"))),
        ]),
    ));
    assert_eq!(call_named(&main_only(body), "main").unwrap_err().code(), "XTDE0410");
}

#[test]
fn test_identity_transform_with_shallow_copy() {
    let copy = ShallowCopy::new(block(vec![
        Expr::ApplyTemplates(ApplyTemplates::new(Some(xp("@*")), ModeRef::Default)),
        Expr::ApplyTemplates(ApplyTemplates::new(None, ModeRef::Default)),
    ]));
    let exec = ExecutableBuilder::new()
        .template(TemplateDefinition::matching(pattern("node() | @*"), Expr::Copy(copy)))
        .build()
        .unwrap();
    let source = r#"<a x="1"><b>text</b><!--note--><c/></a>"#;
    assert_eq!(apply_to(&exec, source).unwrap(), source);
}

#[test]
fn test_copy_of_makes_deep_copies() {
    let exec = ExecutableBuilder::new()
        .template(TemplateDefinition::matching(
            pattern("/"),
            Expr::Element(ElementCreator::fixed(q("out"), Expr::CopyOf(CopyOf::new(xp("list/item"))))),
        ))
        .build()
        .unwrap();
    let source = r#"<list><item n="1"><v>a</v></item><item n="2"/></list>"#;
    assert_eq!(
        apply_to(&exec, source).unwrap(),
        r#"<out><item n="1"><v>a</v></item><item n="2"/></out>"#
    );
}

#[test]
fn test_comment_and_processing_instruction() {
    let body = block(vec![
        Expr::Comment(CommentInstr::new(Expr::string("a--b-"))),
        Expr::ProcessingInstruction(ProcessingInstructionInstr::new(Expr::string("go"), Expr::string("  x?>y"))),
        value_of("'done'"),
    ]);
    assert_eq!(
        call_named(&main_only(body), "main").unwrap(),
        "<!--a- -b- --><?go x? >y?>done"
    );
}
