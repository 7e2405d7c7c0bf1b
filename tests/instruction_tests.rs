mod common;

use common::{block, call_named, q, run, run_with_listener, text, value_of, xp};
use std::rc::Rc;
use trellis::xslt::instruct::choose::Choose;
use trellis::xslt::instruct::for_each::ForEach;
use trellis::xslt::instruct::message::Message;
use trellis::xslt::instruct::variables::{GlobalVariable, Let};
use trellis::xslt::sort::{SortDataType, SortKeyDefinition};
use trellis::{CollectingMessageListener, ExecutableBuilder, Expr, TemplateDefinition, TransformConfig};

fn main_only(body: Expr) -> trellis::Executable {
    ExecutableBuilder::new()
        .template(TemplateDefinition::named(q("main"), body))
        .build()
        .unwrap()
}

#[test]
fn test_choose_takes_first_true_branch() {
    let exec = main_only(Expr::Choose(Choose::new(vec![
        (xp("1 = 2"), text("first")),
        (xp("2 = 2"), text("second")),
        (xp("3 = 3"), text("third")),
    ])));
    assert_eq!(call_named(&exec, "main").unwrap(), "second");
}

#[test]
fn test_if_without_true_branch_writes_nothing() {
    let exec = main_only(block(vec![
        text("["),
        Expr::Choose(Choose::conditional(xp("1 = 2"), text("never"))),
        text("]"),
    ]));
    assert_eq!(call_named(&exec, "main").unwrap(), "[]");
}

#[test]
fn test_block_nesting_is_associative() {
    let left = block(vec![block(vec![text("a"), text("b")]), text("c")]);
    let right = block(vec![text("a"), block(vec![text("b"), text("c")])]);
    let flat = block(vec![text("a"), text("b"), text("c")]);
    let outputs: Vec<String> = [left, right, flat]
        .into_iter()
        .map(|body| call_named(&main_only(body), "main").unwrap())
        .collect();
    assert_eq!(outputs, ["abc", "abc", "abc"]);
}

#[test]
fn test_error_in_untaken_branch_is_deferred() {
    let body = Expr::Choose(Choose::new(vec![
        (xp("$fail = 'yes'"), value_of("1 idiv 0")),
        (Expr::boolean(true), text("fine")),
    ]));
    let exec = ExecutableBuilder::new()
        .global(GlobalVariable::param(q("fail"), Expr::string("no")))
        .template(TemplateDefinition::named(q("main"), body))
        .build()
        .unwrap();
    assert_eq!(call_named(&exec, "main").unwrap(), "fine");

    let config = TransformConfig::default()
        .with_initial_template("main")
        .with_parameter("fail", "yes");
    assert_eq!(run(&exec, None, config).unwrap_err().code(), "FOAR0001");
}

#[test]
fn test_for_each_sorted_numerically_descending() {
    let each = ForEach::new(xp("/list/n"), value_of("concat(., ';')")).sorted_by(
        SortKeyDefinition::new(xp("."))
            .descending()
            .with_data_type(SortDataType::Number),
    );
    let exec = ExecutableBuilder::new()
        .template(TemplateDefinition::matching(common::pattern("/"), Expr::ForEach(each)))
        .build()
        .unwrap();
    let source = "<list><n>10</n><n>9</n><n>100</n></list>";
    assert_eq!(common::apply_to(&exec, source).unwrap(), "100;10;9;");
}

#[test]
fn test_let_scopes_over_its_action() {
    let exec = main_only(Expr::Let(Let::new(q("x"), xp("2 + 3"), value_of("$x * 2"))));
    assert_eq!(call_named(&exec, "main").unwrap(), "10");
}

#[test]
fn test_terminating_message_stops_transformation() {
    let listener = Rc::new(CollectingMessageListener::new());
    let exec = main_only(block(vec![
        Expr::Message(Message::new(Expr::string("warming up"))),
        Expr::Message(Message::new(xp("concat('stop at ', 3)")).terminating()),
        text("unreachable"),
    ]));
    let config = TransformConfig::default().with_initial_template("main");
    let err = run_with_listener(&exec, None, config, Some(listener.clone())).unwrap_err();
    assert!(err.is_termination());
    assert_eq!(listener.messages(), ["warming up", "stop at 3"]);
}
