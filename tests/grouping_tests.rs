mod common;

use common::{apply_to, block, pattern, q, value_of, xp};
use trellis::xdm::StaticNamespaces;
use trellis::xslt::instruct::for_each_group::{ForEachGroup, GroupingAlgorithm};
use trellis::xslt::instruct::nodes::{AttributeCreator, ElementCreator, NodeName};
use trellis::xslt::sort::SortKeyDefinition;
use trellis::{ExecutableBuilder, Expr, TemplateDefinition};

/// `<g key="{current-grouping-key()}">{string-join(current-group(), ',')}</g>`
fn group_element() -> Expr {
    Expr::Element(ElementCreator::fixed(
        q("g"),
        block(vec![
            Expr::Attribute(AttributeCreator::new(NodeName::Fixed(q("key")), xp("current-grouping-key()"))),
            value_of("string-join(current-group(), ',')"),
        ]),
    ))
}

fn on_root(body: ForEachGroup) -> trellis::Executable {
    ExecutableBuilder::new()
        .template(TemplateDefinition::matching(pattern("/"), Expr::ForEachGroup(body)))
        .build()
        .unwrap()
}

#[test]
fn test_group_by_keeps_first_appearance_order() {
    let exec = on_root(ForEachGroup::new(
        xp("items/i"),
        GroupingAlgorithm::By(Box::new(xp("@k"))),
        group_element(),
    ));
    let source = r#"<items><i k="x">1</i><i k="y">2</i><i k="x">3</i></items>"#;
    assert_eq!(
        apply_to(&exec, source).unwrap(),
        r#"<g key="x">1,3</g><g key="y">2</g>"#
    );
}

#[test]
fn test_group_adjacent() {
    let exec = on_root(ForEachGroup::new(
        xp("r/p"),
        GroupingAlgorithm::Adjacent(Box::new(xp("."))),
        group_element(),
    ));
    let source = "<r><p>1</p><p>1</p><p>2</p><p>1</p></r>";
    assert_eq!(
        apply_to(&exec, source).unwrap(),
        r#"<g key="1">1,1</g><g key="2">2</g><g key="1">1</g>"#
    );
}

#[test]
fn test_group_starting_with() {
    let starting = pattern("h");
    let exec = on_root(ForEachGroup::new(
        xp("doc/*"),
        GroupingAlgorithm::StartingWith(starting),
        Expr::Element(ElementCreator::fixed(q("section"), value_of("count(current-group())"))),
    ));
    let source = "<doc><p/><h/><p/><p/><h/></doc>";
    assert_eq!(
        apply_to(&exec, source).unwrap(),
        "<section>1</section><section>3</section><section>1</section>"
    );
}

#[test]
fn test_group_ending_with() {
    let exec = on_root(ForEachGroup::new(
        xp("doc/*"),
        GroupingAlgorithm::EndingWith(pattern("end")),
        Expr::Element(ElementCreator::fixed(q("chunk"), value_of("string-join(current-group(), ',')"))),
    ));
    let source = "<doc><x>a</x><end>1</end><end>2</end><x>b</x><x>c</x></doc>";
    assert_eq!(
        apply_to(&exec, source).unwrap(),
        "<chunk>a,1</chunk><chunk>2</chunk><chunk>b,c</chunk>"
    );
}

#[test]
fn test_groups_sorted_by_key() {
    let exec = on_root(
        ForEachGroup::new(xp("items/i"), GroupingAlgorithm::By(Box::new(xp("@k"))), group_element())
            .sorted_by(SortKeyDefinition::new(xp("current-grouping-key()")).descending()),
    );
    let source = r#"<items><i k="a">1</i><i k="c">2</i><i k="b">3</i><i k="a">4</i></items>"#;
    assert_eq!(
        apply_to(&exec, source).unwrap(),
        r#"<g key="c">2</g><g key="b">3</g><g key="a">1,4</g>"#
    );
}

#[test]
fn test_adjacent_key_must_be_single() {
    let exec = on_root(ForEachGroup::new(
        xp("items/i"),
        GroupingAlgorithm::Adjacent(Box::new(xp("@missing"))),
        group_element(),
    ));
    let err = apply_to(&exec, r#"<items><i/></items>"#).unwrap_err();
    assert_eq!(err.code(), "XTTE1100");
}

#[test]
fn test_computed_element_inside_group() {
    let name = NodeName::computed(xp("concat('k-', current-grouping-key())"), StaticNamespaces::new());
    let exec = on_root(ForEachGroup::new(
        xp("items/i"),
        GroupingAlgorithm::By(Box::new(xp("@k"))),
        Expr::Element(ElementCreator::new(name, value_of("count(current-group())"))),
    ));
    let source = r#"<items><i k="x"/><i k="x"/><i k="y"/></items>"#;
    assert_eq!(apply_to(&exec, source).unwrap(), "<k-x>2</k-x><k-y>1</k-y>");
}
