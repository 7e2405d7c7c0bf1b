//! A `nom`-based parser for the XPath 2.0 subset used inside instructions.
use super::functions::{FunctionCall, SystemFunction, UserFunctionCall};
use super::xpath::{
    Arithmetic, ArithmeticOp, Axis, AxisStep, CompareOp, Comparison, ErrorExpr, NodeTest, VariableRef,
};
use super::Expr;
use crate::error::{Result, XsltError};
use crate::instruct::block::Block;
use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, digit0, digit1, multispace0, one_of, satisfy},
    combinator::{map, not, opt, peek, recognize, value},
    multi::{many0, separated_list0, separated_list1},
    sequence::{delimited, pair, preceded, terminated},
};
use rust_decimal::Decimal;
use std::str::FromStr;
use trellis_xdm::{AtomicValue, NamespaceResolver, NodeKind, QName, Sequence};

// --- Main Public Parser ---

/// Parses `text` and resolves every prefixed name against `namespaces`.
pub fn parse_xpath(text: &str, namespaces: &dyn NamespaceResolver) -> Result<Expr> {
    let mut expr = match expression(text.trim()) {
        Ok(("", expr)) => expr,
        Ok((rest, _)) => return Err(syntax_error(text, &format!("unexpected '{}'", rest))),
        Err(e) => return Err(syntax_error(text, &e.to_string())),
    };
    resolve_names(&mut expr, namespaces)?;
    Ok(expr)
}

fn syntax_error(text: &str, detail: &str) -> XsltError {
    XsltError::static_error(
        "XPST0003",
        format!("Syntax error in expression '{}': {}", text, detail),
    )
}

// --- Combinators & Helpers ---

pub(crate) fn ws<'a, F, O, E>(inner: F) -> impl Parser<&'a str, Output = O, Error = E>
where
    F: Parser<&'a str, Output = O, Error = E>,
    E: nom::error::ParseError<&'a str>,
{
    delimited(multispace0, inner, multispace0)
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.')
}

/// A reserved word, which must not run on into a longer name.
fn keyword<'a>(word: &'static str) -> impl Parser<&'a str, Output = &'a str, Error = nom::error::Error<&'a str>> {
    terminated(tag(word), not(satisfy(is_name_char)))
}

fn left_assoc<'a, O>(
    input: &'a str,
    operand: fn(&'a str) -> IResult<&'a str, Expr>,
    operator: fn(&'a str) -> IResult<&'a str, O>,
    combine: fn(O, Expr, Expr) -> Expr,
) -> IResult<&'a str, Expr> {
    let (input, first) = operand(input)?;
    let (input, rest) = many0(pair(ws(operator), operand)).parse(input)?;
    Ok((
        input,
        rest.into_iter().fold(first, |lhs, (op, rhs)| combine(op, lhs, rhs)),
    ))
}

// --- Expression Parsers (in order of precedence) ---

fn expression(input: &str) -> IResult<&str, Expr> {
    map(separated_list1(ws(char(',')), expr_single), |mut items| {
        if items.len() == 1 {
            items.swap_remove(0)
        } else {
            Expr::Block(Block::new(items))
        }
    })
    .parse(input)
}

fn expr_single(input: &str) -> IResult<&str, Expr> {
    or_expr(input)
}

fn or_op(input: &str) -> IResult<&str, ()> {
    value((), keyword("or")).parse(input)
}

fn and_op(input: &str) -> IResult<&str, ()> {
    value((), keyword("and")).parse(input)
}

fn or_expr(input: &str) -> IResult<&str, Expr> {
    left_assoc(input, and_expr, or_op, |_, a, b| Expr::Or(Box::new(a), Box::new(b)))
}

fn and_expr(input: &str) -> IResult<&str, Expr> {
    left_assoc(input, comparison_expr, and_op, |_, a, b| {
        Expr::And(Box::new(a), Box::new(b))
    })
}

fn comparison_op(input: &str) -> IResult<&str, (CompareOp, bool)> {
    alt((
        value((CompareOp::Ne, true), tag("!=")),
        value((CompareOp::Le, true), tag("<=")),
        value((CompareOp::Ge, true), tag(">=")),
        value((CompareOp::Eq, true), tag("=")),
        value((CompareOp::Lt, true), tag("<")),
        value((CompareOp::Gt, true), tag(">")),
        value((CompareOp::Eq, false), keyword("eq")),
        value((CompareOp::Ne, false), keyword("ne")),
        value((CompareOp::Lt, false), keyword("lt")),
        value((CompareOp::Le, false), keyword("le")),
        value((CompareOp::Gt, false), keyword("gt")),
        value((CompareOp::Ge, false), keyword("ge")),
    ))
    .parse(input)
}

fn comparison_expr(input: &str) -> IResult<&str, Expr> {
    let (input, lhs) = range_expr(input)?;
    let (input, rest) = opt(pair(ws(comparison_op), range_expr)).parse(input)?;
    Ok((
        input,
        match rest {
            Some(((op, general), rhs)) => Expr::Compare(Comparison::new(op, general, lhs, rhs)),
            None => lhs,
        },
    ))
}

fn range_expr(input: &str) -> IResult<&str, Expr> {
    let (input, from) = additive_expr(input)?;
    let (input, to) = opt(preceded(ws(keyword("to")), additive_expr)).parse(input)?;
    Ok((
        input,
        match to {
            Some(to) => Expr::Range(Box::new(from), Box::new(to)),
            None => from,
        },
    ))
}

fn additive_op(input: &str) -> IResult<&str, ArithmeticOp> {
    alt((
        value(ArithmeticOp::Plus, char('+')),
        value(ArithmeticOp::Minus, char('-')),
    ))
    .parse(input)
}

fn multiplicative_op(input: &str) -> IResult<&str, ArithmeticOp> {
    alt((
        value(ArithmeticOp::Times, char('*')),
        value(ArithmeticOp::IDiv, keyword("idiv")),
        value(ArithmeticOp::Div, keyword("div")),
        value(ArithmeticOp::Mod, keyword("mod")),
    ))
    .parse(input)
}

fn arithmetic(op: ArithmeticOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Arithmetic(Arithmetic::new(op, lhs, rhs))
}

fn additive_expr(input: &str) -> IResult<&str, Expr> {
    left_assoc(input, multiplicative_expr, additive_op, arithmetic)
}

fn multiplicative_expr(input: &str) -> IResult<&str, Expr> {
    left_assoc(input, unary_expr, multiplicative_op, arithmetic)
}

fn unary_expr(input: &str) -> IResult<&str, Expr> {
    let (input, signs) = many0(ws(one_of("+-"))).parse(input)?;
    let (input, expr) = path_expr(input)?;
    let negations = signs.iter().filter(|&&c| c == '-').count();
    if negations % 2 == 1 {
        Ok((input, Expr::Negate(Box::new(expr))))
    } else {
        Ok((input, expr))
    }
}

// --- Path Parsers ---

fn descendant_or_self(start: Expr) -> Expr {
    Expr::Path(
        Box::new(start),
        Box::new(Expr::Axis(AxisStep::new(Axis::DescendantOrSelf, NodeTest::Kind(None)))),
    )
}

fn path_expr(input: &str) -> IResult<&str, Expr> {
    let (input, _) = multispace0(input)?;
    if let Ok((rest, _)) = tag::<&str, &str, nom::error::Error<&str>>("//").parse(input) {
        return relative_path(rest, Some(descendant_or_self(Expr::Root)));
    }
    if let Ok((rest, _)) = char::<&str, nom::error::Error<&str>>('/').parse(input) {
        // A lone "/" selects the root.
        return match relative_path(rest, Some(Expr::Root)) {
            Err(nom::Err::Error(_)) => Ok((rest, Expr::Root)),
            other => other,
        };
    }
    relative_path(input, None)
}

fn relative_path(input: &str, start: Option<Expr>) -> IResult<&str, Expr> {
    let (input, first) = step_expr(input)?;
    let (input, rest) = many0(pair(ws(alt((tag("//"), tag("/")))), step_expr)).parse(input)?;
    let mut path = match start {
        Some(start) => Expr::Path(Box::new(start), Box::new(first)),
        None => first,
    };
    for (separator, step) in rest {
        if separator == "//" {
            path = descendant_or_self(path);
        }
        path = Expr::Path(Box::new(path), Box::new(step));
    }
    Ok((input, path))
}

pub(crate) fn predicate(input: &str) -> IResult<&str, Expr> {
    delimited(ws(char('[')), expression, ws(char(']'))).parse(input)
}

fn step_expr(input: &str) -> IResult<&str, Expr> {
    let (input, base) = alt((primary_expr, axis_step)).parse(input)?;
    let (input, predicates) = many0(predicate).parse(input)?;
    Ok((
        input,
        predicates
            .into_iter()
            .fold(base, |b, p| Expr::Filter(Box::new(b), Box::new(p))),
    ))
}

fn axis(input: &str) -> IResult<&str, Axis> {
    terminated(
        alt((
            value(Axis::Child, tag("child")),
            value(Axis::DescendantOrSelf, tag("descendant-or-self")),
            value(Axis::Descendant, tag("descendant")),
            value(Axis::Attribute, tag("attribute")),
            value(Axis::SelfAxis, tag("self")),
            value(Axis::Parent, tag("parent")),
            value(Axis::Namespace, tag("namespace")),
        )),
        ws(tag("::")),
    )
    .parse(input)
}

fn axis_step(input: &str) -> IResult<&str, Expr> {
    alt((
        value(
            Expr::Axis(AxisStep::new(Axis::Parent, NodeTest::Kind(None))),
            tag(".."),
        ),
        map(preceded(ws(char('@')), node_test), |test| {
            Expr::Axis(AxisStep::new(Axis::Attribute, test))
        }),
        map(pair(opt(axis), node_test), |(axis, test)| {
            Expr::Axis(AxisStep::new(axis.unwrap_or(Axis::Child), test))
        }),
    ))
    .parse(input)
}

fn kind_test(input: &str) -> IResult<&str, NodeTest> {
    map(
        terminated(
            alt((
                tag("document-node"),
                tag("element"),
                tag("attribute"),
                tag("text"),
                tag("comment"),
                tag("processing-instruction"),
                tag("namespace-node"),
                tag("node"),
            )),
            pair(ws(char('(')), char(')')),
        ),
        |kind: &str| {
            NodeTest::Kind(match kind {
                "document-node" => Some(NodeKind::Document),
                "element" => Some(NodeKind::Element),
                "attribute" => Some(NodeKind::Attribute),
                "text" => Some(NodeKind::Text),
                "comment" => Some(NodeKind::Comment),
                "processing-instruction" => Some(NodeKind::ProcessingInstruction),
                "namespace-node" => Some(NodeKind::Namespace),
                _ => None,
            })
        },
    )
    .parse(input)
}

pub(crate) fn node_test(input: &str) -> IResult<&str, NodeTest> {
    alt((
        kind_test,
        map(preceded(tag("*:"), nc_name), |local: &str| {
            NodeTest::LocalWildcard(local.to_string())
        }),
        value(NodeTest::Wildcard, char('*')),
        map(terminated(nc_name, tag(":*")), |prefix: &str| {
            NodeTest::NamespaceWildcard(prefix.to_string())
        }),
        map(qname, NodeTest::Name),
    ))
    .parse(input)
}

// --- Primary Expressions ---

fn primary_expr(input: &str) -> IResult<&str, Expr> {
    ws(alt((
        numeric_literal,
        map(string_literal, |s: String| Expr::string(s)),
        variable_reference,
        parenthesized,
        function_call,
        value(Expr::ContextItem, terminated(char('.'), not(char('.')))),
    )))
    .parse(input)
}

fn parenthesized(input: &str) -> IResult<&str, Expr> {
    map(
        delimited(ws(char('(')), opt(expression), ws(char(')'))),
        |inner| inner.unwrap_or_else(Expr::empty),
    )
    .parse(input)
}

fn numeric_literal(input: &str) -> IResult<&str, Expr> {
    let (rest, text) = recognize((
        alt((
            recognize((digit1, opt((char('.'), digit0)))),
            recognize((char('.'), digit1)),
        )),
        opt((one_of("eE"), opt(one_of("+-")), digit1)),
    ))
    .parse(input)?;
    let invalid = || nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Float));
    let value = if text.contains(['e', 'E']) {
        AtomicValue::Double(text.parse().map_err(|_| invalid())?)
    } else if text.contains('.') {
        AtomicValue::Decimal(Decimal::from_str(text.trim_end_matches('.')).map_err(|_| invalid())?)
    } else {
        match text.parse::<i64>() {
            Ok(i) => AtomicValue::Integer(i),
            Err(_) => AtomicValue::Decimal(Decimal::from_str(text).map_err(|_| invalid())?),
        }
    };
    Ok((rest, Expr::Literal(Sequence::singleton(value))))
}

fn quoted<'a>(quote: char) -> impl FnMut(&'a str) -> IResult<&'a str, String> {
    move |input| {
        let doubled = if quote == '"' { "\"\"" } else { "''" };
        let (input, body) = delimited(
            char(quote),
            recognize(many0(alt((take_while1(move |c| c != quote), tag(doubled))))),
            char(quote),
        )
        .parse(input)?;
        Ok((input, body.replace(doubled, &quote.to_string())))
    }
}

fn string_literal(input: &str) -> IResult<&str, String> {
    alt((quoted('\''), quoted('"'))).parse(input)
}

pub(crate) fn nc_name(input: &str) -> IResult<&str, &str> {
    recognize(pair(satisfy(is_name_start), take_while(is_name_char))).parse(input)
}

/// A lexical QName; the namespace URI is filled in by [`resolve_names`].
fn qname(input: &str) -> IResult<&str, QName> {
    map(
        pair(nc_name, opt(preceded(char(':'), nc_name))),
        |(first, second)| match second {
            Some(local) => QName::new(first, "", local),
            None => QName::local(first),
        },
    )
    .parse(input)
}

fn variable_reference(input: &str) -> IResult<&str, Expr> {
    map(preceded(char('$'), qname), |name| {
        Expr::VariableRef(VariableRef::new(name))
    })
    .parse(input)
}

fn is_kind_test_name(name: &str) -> bool {
    matches!(
        name,
        "text"
            | "node"
            | "comment"
            | "processing-instruction"
            | "document-node"
            | "element"
            | "attribute"
            | "namespace-node"
    )
}

fn function_call(input: &str) -> IResult<&str, Expr> {
    let (rest, name) = qname(input)?;
    let (rest, _) = peek(ws(char('('))).parse(rest)?;
    if name.prefix.is_empty() && is_kind_test_name(&name.local) {
        return Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Verify,
        )));
    }
    let (rest, args) = delimited(
        ws(char('(')),
        separated_list0(ws(char(',')), expr_single),
        ws(char(')')),
    )
    .parse(rest)?;
    // Stylesheet functions are bound when the executable is built; unknown
    // system functions are reported once parsing has finished.
    if !name.prefix.is_empty() && name.prefix != "fn" {
        return Ok((rest, Expr::UserFunctionCall(UserFunctionCall::new(name, args))));
    }
    Ok((
        rest,
        match SystemFunction::lookup(&name.local, args.len()) {
            Ok(function) => Expr::FunctionCall(FunctionCall::new(function, args)),
            Err(e) => Expr::Error(ErrorExpr::new(e)),
        },
    ))
}

// --- Name Resolution ---

pub(crate) fn uri_for(prefix: &str, namespaces: &dyn NamespaceResolver) -> Result<String> {
    namespaces.uri_for_prefix(prefix, false).ok_or_else(|| {
        XsltError::static_error(
            "XPST0081",
            format!("Namespace prefix '{}' has not been declared", prefix),
        )
    })
}

fn resolve_prefix(name: &mut QName, namespaces: &dyn NamespaceResolver) -> Result<()> {
    if !name.prefix.is_empty() {
        name.uri = uri_for(&name.prefix, namespaces)?;
    }
    Ok(())
}

pub(crate) fn resolve_names(expr: &mut Expr, namespaces: &dyn NamespaceResolver) -> Result<()> {
    match expr {
        Expr::Axis(step) => match &mut step.test {
            NodeTest::Name(name) => resolve_prefix(name, namespaces)?,
            NodeTest::NamespaceWildcard(prefix) => *prefix = uri_for(prefix, namespaces)?,
            _ => {}
        },
        Expr::VariableRef(v) => resolve_prefix(&mut v.name, namespaces)?,
        Expr::UserFunctionCall(f) => resolve_prefix(&mut f.name, namespaces)?,
        Expr::Error(e) if e.error.is_static_error() => return Err(e.error.clone()),
        _ => {}
    }
    for child in expr.children_mut() {
        resolve_names(child, namespaces)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_xdm::StaticNamespaces;

    fn parse(text: &str) -> Expr {
        parse_xpath(text, &StaticNamespaces::new()).unwrap()
    }

    #[test]
    fn test_parse_simple_path() {
        let expr = parse("a/b");
        let Expr::Path(start, step) = expr else {
            panic!("expected a path");
        };
        assert!(matches!(*start, Expr::Axis(AxisStep { axis: Axis::Child, .. })));
        assert!(matches!(*step, Expr::Axis(AxisStep { test: NodeTest::Name(ref n), .. }) if n.local == "b"));
    }

    #[test]
    fn test_operator_precedence() {
        let Expr::Arithmetic(sum) = parse("1 + 2 * 3") else {
            panic!("expected arithmetic");
        };
        assert_eq!(sum.op, ArithmeticOp::Plus);
        assert!(matches!(*sum.rhs, Expr::Arithmetic(Arithmetic { op: ArithmeticOp::Times, .. })));
        assert!(matches!(parse("1 to 3"), Expr::Range(..)));
        assert!(matches!(parse("$a = 1 or $b eq 2"), Expr::Or(..)));
    }

    #[test]
    fn test_literals() {
        assert_eq!(parse("'it''s'").as_literal().unwrap().string_join(""), "it's");
        assert!(matches!(
            parse("2.50").as_literal().and_then(|v| v.first().cloned()),
            Some(trellis_xdm::Item::Atomic(AtomicValue::Decimal(_)))
        ));
        assert!(matches!(
            parse("1e3").as_literal().and_then(|v| v.first().cloned()),
            Some(trellis_xdm::Item::Atomic(AtomicValue::Double(_)))
        ));
        assert!(parse("()").is_empty_literal());
    }

    #[test]
    fn test_comma_builds_block() {
        let Expr::Block(block) = parse("1, 'two', $x") else {
            panic!("expected a block");
        };
        assert_eq!(block.children.len(), 3);
    }

    #[test]
    fn test_keywords_need_word_boundaries() {
        assert!(matches!(parse("order"), Expr::Axis(_)));
        assert!(matches!(parse("divide div 2"), Expr::Arithmetic(_)));
    }

    #[test]
    fn test_absolute_paths_and_predicates() {
        assert!(matches!(parse("/"), Expr::Root));
        assert!(matches!(parse("//item[1]"), Expr::Path(..)));
        assert!(matches!(parse("@id"), Expr::Axis(AxisStep { axis: Axis::Attribute, .. })));
        assert!(matches!(parse("item[@id = '3']"), Expr::Filter(..)));
    }

    #[test]
    fn test_prefix_resolution() {
        let ns = StaticNamespaces::new().bind("p", "urn:p");
        let Expr::Axis(step) = parse_xpath("p:item", &ns).unwrap() else {
            panic!("expected an axis step");
        };
        assert_eq!(step.test, NodeTest::Name(QName::new("p", "urn:p", "item")));
        let err = parse_xpath("q:item", &ns).unwrap_err();
        assert_eq!(err.code(), "XPST0081");
    }

    #[test]
    fn test_unknown_function_is_static_error() {
        let err = parse_xpath("no-such(1)", &StaticNamespaces::new()).unwrap_err();
        assert_eq!(err.code(), "XPST0017");
        let err = parse_xpath("1 +", &StaticNamespaces::new()).unwrap_err();
        assert_eq!(err.code(), "XPST0003");
    }

    #[test]
    fn test_prefixed_call_is_stylesheet_function() {
        let ns = StaticNamespaces::new().bind("f", "urn:f");
        let Expr::UserFunctionCall(call) = parse_xpath("f:double(2, $x)", &ns).unwrap() else {
            panic!("expected a stylesheet function call");
        };
        assert_eq!(call.name, QName::new("f", "urn:f", "double"));
        assert_eq!(call.args.len(), 2);
        assert!(call.target.is_none());
        assert!(matches!(parse_xpath("fn:count(())", &ns).unwrap(), Expr::FunctionCall(_)));
        assert_eq!(parse_xpath("g:double(2)", &ns).unwrap_err().code(), "XPST0081");
    }
}
