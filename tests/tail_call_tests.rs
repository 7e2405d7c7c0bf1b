mod common;

use common::{apply_to, block, call_named, pattern, q, text, value_of, xp};
use trellis::xslt::instruct::choose::Choose;
use trellis::xslt::instruct::templates::{ApplyTemplates, CallTemplate, ModeRef, WithParam};
use trellis::xslt::instruct::variables::LocalParam;
use trellis::{ExecutableBuilder, Expr, SequenceType, TemplateDefinition};

fn call(name: &str, n: &str) -> Expr {
    Expr::CallTemplate(CallTemplate::new(q(name)).with_param(WithParam::new(q("n"), 0, xp(n))))
}

/// `countdown($n)`: optionally writes `$n`, then recurses until zero.
fn countdown(echo: bool) -> Expr {
    let mut body = vec![Expr::LocalParam(LocalParam::new(q("n")))];
    if echo {
        body.push(value_of("$n"));
    }
    body.push(Expr::Choose(Choose::new(vec![
        (xp("$n > 0"), call("countdown", "$n - 1")),
        (Expr::boolean(true), text("done")),
    ])));
    block(body)
}

#[test]
fn test_deep_recursion_runs_in_constant_stack() {
    let exec = ExecutableBuilder::new()
        .template(TemplateDefinition::named(q("countdown"), countdown(false)))
        .template(TemplateDefinition::named(q("main"), call("countdown", "100000")))
        .build()
        .unwrap();
    assert_eq!(call_named(&exec, "main").unwrap(), "done");
}

fn apply(select: &str, mode: ModeRef, n: &str) -> Expr {
    let mut a = ApplyTemplates::new(Some(xp(select)), mode);
    a.params.push(WithParam::new(q("n"), 0, xp(n)));
    Expr::ApplyTemplates(a)
}

#[test]
fn test_deep_apply_templates_recursion_runs_in_constant_stack() {
    let recurse = block(vec![
        Expr::LocalParam(LocalParam::new(q("n"))),
        Expr::Choose(Choose::new(vec![
            (xp("$n > 0"), apply(".", ModeRef::Current, "$n - 1")),
            (Expr::boolean(true), text("done")),
        ])),
    ]);
    let exec = ExecutableBuilder::new()
        .template(TemplateDefinition::matching(pattern("/"), apply("r", ModeRef::Named(q("m")), "100000")))
        .template(TemplateDefinition::matching(pattern("r"), recurse).in_mode(q("m")))
        .build()
        .unwrap();
    assert_eq!(apply_to(&exec, "<r/>").unwrap(), "done");
}

#[test]
fn test_output_before_tail_call_keeps_its_order() {
    let exec = ExecutableBuilder::new()
        .template(TemplateDefinition::named(q("countdown"), countdown(true)))
        .template(TemplateDefinition::named(q("main"), call("countdown", "5")))
        .build()
        .unwrap();
    assert_eq!(call_named(&exec, "main").unwrap(), "543210done");
}

#[test]
fn test_typed_template_result_is_not_a_tail_call() {
    let exec = ExecutableBuilder::new()
        .template(TemplateDefinition::named(q("countdown"), countdown(true)).with_type(SequenceType::ANY))
        .template(TemplateDefinition::named(q("main"), call("countdown", "3")))
        .build()
        .unwrap();
    assert_eq!(call_named(&exec, "main").unwrap(), "3210done");
}

#[test]
fn test_required_param_missing() {
    let exec = ExecutableBuilder::new()
        .template(TemplateDefinition::named(
            q("needs"),
            block(vec![Expr::LocalParam(LocalParam::new(q("n")).required()), value_of("$n")]),
        ))
        .template(TemplateDefinition::named(q("main"), Expr::CallTemplate(CallTemplate::new(q("needs")))))
        .build()
        .unwrap();
    assert_eq!(call_named(&exec, "main").unwrap_err().code(), "XTDE0700");
}
