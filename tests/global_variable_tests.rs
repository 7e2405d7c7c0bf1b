mod common;

use common::{block, call_named, init_logging, q, run, run_with_listener, value_of, xp};
use std::cell::RefCell;
use std::rc::Rc;
use trellis::xdm::{AtomicType, Sequence, SequenceOutputter};
use trellis::xslt::context::{OutputRef, XPathContext};
use trellis::xslt::instruct::message::Message;
use trellis::xslt::instruct::variables::GlobalVariable;
use trellis::{
    CollectingMessageListener, Controller, ExecutableBuilder, Expr, SequenceType, TemplateDefinition,
    TransformConfig,
};

/// `$g` announces each evaluation through `xsl:message`.
fn noisy_global() -> GlobalVariable {
    GlobalVariable::variable(
        q("g"),
        block(vec![Expr::Message(Message::new(Expr::string("evaluating g"))), xp("6 * 7")]),
    )
}

#[test]
fn test_global_is_evaluated_once() {
    let listener = Rc::new(CollectingMessageListener::new());
    let exec = ExecutableBuilder::new()
        .global(noisy_global())
        .template(TemplateDefinition::named(q("main"), value_of("($g, $g, $g)")))
        .build()
        .unwrap();
    let config = TransformConfig::default().with_initial_template("main");
    let output = run_with_listener(&exec, None, config, Some(listener.clone())).unwrap();
    assert_eq!(output, "42 42 42");
    assert_eq!(listener.messages(), ["evaluating g"]);
}

#[test]
fn test_repeated_reads_share_one_value() {
    init_logging();
    let exec = ExecutableBuilder::new().global(noisy_global()).build().unwrap();
    let controller = Rc::new(
        Controller::new(&exec, TransformConfig::default(), None)
            .with_message_listener(Rc::new(CollectingMessageListener::new())),
    );
    let out: OutputRef = Rc::new(RefCell::new(SequenceOutputter::new()));
    let ctx = XPathContext::new(controller, out);
    let g = exec.global_variable(0).unwrap();
    let first = g.evaluate_variable(&ctx).unwrap();
    let second = g.evaluate_variable(&ctx).unwrap();
    assert!(Sequence::same_value(&first, &second));
}

#[test]
fn test_circular_globals_are_reported() {
    let exec = ExecutableBuilder::new()
        .global(GlobalVariable::variable(q("a"), xp("$b + 1")))
        .global(GlobalVariable::variable(q("b"), xp("$a + 1")))
        .template(TemplateDefinition::named(q("main"), value_of("$a")))
        .build()
        .unwrap();
    let err = call_named(&exec, "main").unwrap_err();
    assert_eq!(err.code(), "XTDE0640");
}

#[test]
fn test_supplied_parameter_is_converted_to_declared_type() {
    let exec = ExecutableBuilder::new()
        .global(
            GlobalVariable::param(q("n"), Expr::integer(1))
                .with_type(SequenceType::single_atomic(AtomicType::Integer)),
        )
        .template(TemplateDefinition::named(q("main"), value_of("$n + 1")))
        .build()
        .unwrap();
    assert_eq!(call_named(&exec, "main").unwrap(), "2");

    let config = TransformConfig::default()
        .with_initial_template("main")
        .with_parameter("n", "41");
    assert_eq!(run(&exec, None, config).unwrap(), "42");
}

#[test]
fn test_required_stylesheet_parameter() {
    let exec = ExecutableBuilder::new()
        .global(GlobalVariable::param(q("p"), Expr::empty()).required())
        .template(TemplateDefinition::named(q("main"), value_of("$p")))
        .build()
        .unwrap();
    assert_eq!(call_named(&exec, "main").unwrap_err().code(), "XTDE0050");
}

#[test]
fn test_config_loaded_from_json() {
    let exec = ExecutableBuilder::new()
        .global(GlobalVariable::param(q("who"), Expr::string("nobody")))
        .template(TemplateDefinition::named(q("hello"), value_of("concat('hello ', $who)")))
        .build()
        .unwrap();
    let output = trellis::transform_to_string(
        &exec,
        None,
        r#"{"initial-template": "hello", "parameters": {"who": "world"}}"#,
    )
    .unwrap();
    assert_eq!(output, "hello world");
}
